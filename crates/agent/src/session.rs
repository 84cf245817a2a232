//! Per-session context passed into the sampling loop.
//!
//! Everything the loop reports to the outside world goes through here: the
//! presentation callbacks, the cancellation predicate, and the optional event
//! recorder.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::warn;

use deskpilot_core::event::{AgentEvent, EventRecorder};
use deskpilot_core::message::ContentBlock;
use deskpilot_core::provider::ApiExchange;
use deskpilot_core::tool::ToolResult;

/// Output longer than this is shortened before it goes into an event.
const EVENT_RESULT_LIMIT: usize = 1000;
const EVENT_RESULT_KEEP: usize = 500;

/// Presentation hooks. All methods default to doing nothing.
pub trait SessionCallbacks: Send + Sync {
    /// Called once per block of each assistant turn, in order.
    fn on_content(&self, _block: &ContentBlock) {}

    /// Called once per dispatched tool call.
    fn on_tool_output(&self, _result: &ToolResult, _tool_use_id: &str) {}

    /// Called exactly once per provider call, whatever the outcome.
    fn on_api_response(&self, _exchange: &ApiExchange) {}
}

/// Callbacks that ignore everything.
pub struct NoopCallbacks;

impl SessionCallbacks for NoopCallbacks {}

type TimeoutPredicate = Box<dyn Fn() -> bool + Send + Sync>;

pub struct SessionContext {
    callbacks: Arc<dyn SessionCallbacks>,
    is_timeout: TimeoutPredicate,
    recorder: Option<Arc<dyn EventRecorder>>,
    task_id: Option<String>,
}

impl SessionContext {
    pub fn new(callbacks: Arc<dyn SessionCallbacks>) -> Self {
        Self {
            callbacks,
            is_timeout: Box::new(|| false),
            recorder: None,
            task_id: None,
        }
    }

    /// Install the predicate checked before every provider call.
    pub fn with_timeout(mut self, is_timeout: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.is_timeout = Box::new(is_timeout);
        self
    }

    /// Time out once `deadline` has passed.
    pub fn with_deadline(self, deadline: Instant) -> Self {
        self.with_timeout(move || Instant::now() >= deadline)
    }

    /// Record tool-call events. Both a recorder and a task id are required.
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>, task_id: impl Into<String>) -> Self {
        self.recorder = Some(recorder);
        self.task_id = Some(task_id.into());
        self
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub(crate) fn timed_out(&self) -> bool {
        (self.is_timeout)()
    }

    pub(crate) fn callbacks(&self) -> &dyn SessionCallbacks {
        self.callbacks.as_ref()
    }

    fn record(&self, event: impl FnOnce(String) -> AgentEvent) {
        let (Some(recorder), Some(task_id)) = (&self.recorder, &self.task_id) else {
            return;
        };
        let event = event(task_id.clone());
        if let Err(e) = recorder.record_event(&event) {
            warn!(kind = ?event.kind(), error = %e, "Failed to record tool event");
        }
    }

    pub(crate) fn record_tool_start(&self, tool_name: &str, args: &serde_json::Value) {
        self.record(|task_id| AgentEvent::ToolCallStart {
            task_id,
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            args: args.clone(),
        });
    }

    pub(crate) fn record_tool_end(&self, tool_name: &str, result: &ToolResult) {
        self.record(|task_id| AgentEvent::ToolCallEnd {
            task_id,
            timestamp: Utc::now(),
            tool_name: tool_name.to_string(),
            success: !result.is_error(),
            error: result.error_text().map(str::to_string),
            result: result_summary(result),
        });
    }
}

/// What an end event reports as the result.
pub(crate) fn result_summary(result: &ToolResult) -> Option<String> {
    if let Some(error) = result.error_text() {
        return Some(error.to_string());
    }
    if let Some(output) = result.output_text() {
        if output.chars().count() > EVENT_RESULT_LIMIT {
            let head: String = output.chars().take(EVENT_RESULT_KEEP).collect();
            return Some(format!("{head}... (truncated)"));
        }
        return Some(output.to_string());
    }
    result
        .base64_image
        .as_deref()
        .filter(|i| !i.is_empty())
        .map(|_| "[Screenshot Taken]".to_string())
}
