//! JSON-lines persistence of tool-call events.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::warn;

use deskpilot_core::event::AgentEvent;

/// Append every event from `rx` to `path`, one JSON object per line.
///
/// The task ends once every sender of the bus is dropped.
pub fn spawn_event_log(
    mut rx: broadcast::Receiver<Arc<AgentEvent>>,
    path: PathBuf,
) -> JoinHandle<anyhow::Result<usize>> {
    tokio::spawn(async move {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut written = 0;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let mut line = serde_json::to_string(event.as_ref())?;
                    line.push('\n');
                    file.write_all(line.as_bytes()).await?;
                    written += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, path = %path.display(), "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        file.flush().await?;
        Ok(written)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use deskpilot_core::event::{EventBus, EventRecorder};

    #[tokio::test]
    async fn writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let bus = EventBus::new(8);
        let handle = spawn_event_log(bus.subscribe(), path.clone());
        bus.record_event(&AgentEvent::ToolCallStart {
            task_id: "t1".into(),
            timestamp: Utc::now(),
            tool_name: "bash".into(),
            args: serde_json::json!({"command": "pwd"}),
        })
        .unwrap();
        bus.record_event(&AgentEvent::ToolCallEnd {
            task_id: "t1".into(),
            timestamp: Utc::now(),
            tool_name: "bash".into(),
            success: true,
            error: None,
            result: Some("/root".into()),
        })
        .unwrap();
        drop(bus);

        assert_eq!(handle.await.unwrap().unwrap(), 2);
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let end: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(end["kind"], "tool_call_end");
        assert_eq!(end["result"], "/root");
    }
}
