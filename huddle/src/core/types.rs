//! Shared deterministic types for the session engine.
//!
//! These types define stable contracts between engine components. They should
//! not depend on external state or I/O and must serialize deterministically,
//! since several of them are persisted (transcript, session state, task list).

use serde::{Deserialize, Serialize};

/// Collaboration phase, in fixed lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Refinement,
    Planning,
    PreReview,
    Implementation,
    Review,
}

impl Phase {
    /// The phase that follows this one, or `None` after `Review`.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Refinement => Some(Phase::Planning),
            Phase::Planning => Some(Phase::PreReview),
            Phase::PreReview => Some(Phase::Implementation),
            Phase::Implementation => Some(Phase::Review),
            Phase::Review => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Refinement => "refinement",
            Phase::Planning => "planning",
            Phase::PreReview => "pre-review",
            Phase::Implementation => "implementation",
            Phase::Review => "review",
        }
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Pending,
    InProgress,
    Complete,
    Paused,
}

/// Marker recording a phase transition in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseBoundary {
    pub from_phase: Phase,
    pub to_phase: Phase,
}

/// One conversational turn in the append-only transcript.
///
/// Total order is file order; the engine is the only writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub session_id: String,
    pub content: String,
    /// Set when the speaker explicitly yielded via the `pass_turn` tool.
    #[serde(default, skip_serializing_if = "is_false")]
    pub pass_turn: bool,
    /// Set on the synthetic message that marks a phase transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_boundary: Option<PhaseBoundary>,
    /// Execution layer the speaker was working in, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
}

impl Message {
    /// Plain conversational message with no flags set.
    pub fn new(sender: &str, session_id: &str, content: impl Into<String>) -> Self {
        Self {
            sender: sender.to_string(),
            session_id: session_id.to_string(),
            content: content.into(),
            pass_turn: false,
            phase_boundary: None,
            layer: None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A tool invocation requested by a speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Structured output produced by one generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerReply {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

/// Kind of answer the coach expects from the PM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PmResponseType {
    Feedback,
    Decision,
}

/// A question escalated to the human PM via `ask_pm`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmQuestion {
    pub question: String,
    pub response_type: PmResponseType,
    /// 2–5 option labels, present only for `decision` questions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

/// Status of a planned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
}

/// One node in the planned task graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub done_when: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Computed dependency layer, persisted only when explicitly written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
    #[serde(default)]
    pub status: TaskStatus,
}
