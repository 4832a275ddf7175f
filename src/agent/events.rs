//! Session events: a per-iteration feed for operator-facing transcripts

use crate::agent::core::Termination;
use crate::tools::ToolStatus;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// One step of a running session, emitted in loop order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A task was appended as a user turn
    TaskStarted { task: String },
    /// The completion service is being called (1-based within the task)
    ModelRequested { iteration: usize },
    /// The model asked for a tool and it is about to run
    ToolInvoked {
        call_id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// The tool finished and its result was appended
    ToolCompleted {
        call_id: String,
        name: String,
        status: ToolStatus,
        payload: String,
        truncated: bool,
    },
    /// The response carried more invocation candidates than the one acted on
    CandidatesDropped { count: usize },
    /// The task ended normally or was cancelled
    Finished { termination: Termination },
    /// The completion service failed and the session was aborted
    Failed { message: String },
}

pub(crate) fn send_event(tx: &Option<UnboundedSender<SessionEvent>>, event: SessionEvent) {
    if let Some(tx) = tx {
        // Receiver gone means nobody is watching; the loop carries on.
        let _ = tx.send(event);
    }
}
