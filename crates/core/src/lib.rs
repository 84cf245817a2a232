//! # deskpilot Core
//!
//! Domain types, traits, and error definitions for the deskpilot agent.
//! This crate has **no transport dependencies**: it defines the transcript
//! model, the tool and provider seams, and the event-recording interface that
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the sampling loop is a trait here. Implementations
//! live in their respective crates, so the loop can be exercised with scripted
//! providers and in-process tools in tests.

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, RecorderError, Result, ToolError};
pub use event::{AgentEvent, AgentEventKind, EventBus, EventRecorder};
pub use message::{
    CacheControl, ContentBlock, Conversation, ConversationId, ImageSource, Message,
    MessageContent, Role, ToolResultBlock, ToolResultContent, TurnKind,
};
pub use provider::{
    ApiExchange, ApiRequestRecord, ApiResponseRecord, Provider, ProviderRequest,
    ProviderResponse, SystemPrompt, Usage,
};
pub use tool::{BuiltinToolSpec, Tool, ToolDescriptor, ToolRegistry, ToolResult};
