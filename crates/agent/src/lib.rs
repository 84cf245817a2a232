//! The agentic sampling loop of deskpilot.
//!
//! The loop follows a **send → act → report** cycle:
//!
//! 1. **Shape** the transcript (cache markers or screenshot pruning)
//! 2. **Send** it with the system prompt and tool list to the provider
//! 3. **Append** the assistant turn, running every requested tool
//! 4. **Report** all results back in one user turn and go to step 1
//!
//! It ends when the model asks for no tools, when the session's timeout
//! predicate fires, or when the provider call fails. Remote tool servers are
//! closed on every one of those paths.

pub mod context;
pub mod dispatch;
pub mod loop_runner;
pub mod prompt;
pub mod session;

pub use context::{DEFAULT_CACHE_HINTS, place_cache_hints, prune_images};
pub use dispatch::ToolDispatcher;
pub use loop_runner::{LoopConfig, LoopOutcome, SamplingLoop, StopReason};
pub use prompt::{PromptContext, system_prompt};
pub use session::{NoopCallbacks, SessionCallbacks, SessionContext};
