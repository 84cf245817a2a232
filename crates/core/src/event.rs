//! Tool-call events for an external evaluator.
//!
//! The sampling loop records one event before and one after every tool
//! dispatch. Recording is best-effort: a recorder error is logged by the loop
//! and never aborts the task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::RecorderError;

/// The two kinds of events emitted around a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventKind {
    ToolCallStart,
    ToolCallEnd,
}

/// An event recorded around a tool dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentEvent {
    ToolCallStart {
        task_id: String,
        timestamp: DateTime<Utc>,
        tool_name: String,
        args: serde_json::Value,
    },

    ToolCallEnd {
        task_id: String,
        timestamp: DateTime<Utc>,
        tool_name: String,
        success: bool,
        error: Option<String>,
        /// Output summary, error text, or a screenshot marker
        result: Option<String>,
    },
}

impl AgentEvent {
    pub fn kind(&self) -> AgentEventKind {
        match self {
            Self::ToolCallStart { .. } => AgentEventKind::ToolCallStart,
            Self::ToolCallEnd { .. } => AgentEventKind::ToolCallEnd,
        }
    }

    pub fn tool_name(&self) -> &str {
        match self {
            Self::ToolCallStart { tool_name, .. } | Self::ToolCallEnd { tool_name, .. } => tool_name,
        }
    }
}

/// Sink for tool-call events.
pub trait EventRecorder: Send + Sync {
    fn record_event(&self, event: &AgentEvent) -> Result<(), RecorderError>;
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub, so a log writer
/// and a live display can both follow the same session.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventRecorder for EventBus {
    fn record_event(&self, event: &AgentEvent) -> Result<(), RecorderError> {
        self.publish(event.clone());
        Ok(())
    }
}
