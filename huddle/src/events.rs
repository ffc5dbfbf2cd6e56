//! Event stream emitted by the engine for observers.
//!
//! Events are a closed tagged-variant set so an observer (CLI printer, UI)
//! can match exhaustively. Delivery is one-way and fire-and-forget: engine
//! correctness never depends on anyone consuming them, and observers must
//! not assume delivery is synchronous with the step that produced it.

use serde::{Deserialize, Serialize};

use crate::core::types::Phase;

/// Outcome classification of one tool dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
    PendingApproval,
}

/// One observable engine event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A message was appended to the transcript.
    MessageAppended {
        sender: String,
        turn: u32,
        phase: Phase,
    },
    /// A tool call was dispatched on behalf of a speaker.
    ToolProgress {
        tool: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        status: ToolStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bytes: Option<u64>,
    },
    /// One step of a phase advance completed.
    Progress { stage: String },
    /// Phase advance finished: the pointer moved and a checkpoint exists.
    AdvanceComplete { phase: Phase, checkpoint: u32 },
    /// Phase advance failed, or advanced with warnings when `partial`.
    AdvanceError { message: String, partial: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_a_tag() {
        let event = Event::ToolProgress {
            tool: "file_write".to_string(),
            path: Some("src/lib.rs".to_string()),
            status: ToolStatus::PendingApproval,
            bytes: Some(42),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "tool_progress");
        assert_eq!(json["status"], "pending_approval");
    }
}
