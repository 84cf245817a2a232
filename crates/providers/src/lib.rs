//! LLM Provider implementations for deskpilot.
//!
//! All providers implement the `deskpilot_core::Provider` trait.
//! The router builds the one selected by configuration.

pub mod anthropic;
pub mod bedrock;
mod http;
pub mod retry;
pub mod router;
pub mod vertex;

pub use anthropic::AnthropicProvider;
pub use bedrock::BedrockProvider;
pub use router::build_from_config;
pub use vertex::VertexProvider;
