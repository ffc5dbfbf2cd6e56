//! Append-only JSONL conversation log.
//!
//! One JSON object per line; total order is file order and is authoritative
//! for turn counting. Malformed lines are skipped on read so that partial
//! corruption of one historical line never blocks replay of the rest.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use crate::core::types::{Message, Phase};

/// Sender recorded on synthetic engine messages (phase boundaries, denial
/// notices). Always excluded from the participant turn count.
pub const SYSTEM_SENDER: &str = "system";

/// Append one message to the transcript.
pub fn append_message(path: &Path, message: &Message) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create transcript dir {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(message).context("serialize message")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open transcript {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append to transcript {}", path.display()))?;
    Ok(())
}

/// Load the full transcript. A missing file is an empty history.
pub fn load_transcript(path: &Path) -> Result<Vec<Message>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read transcript {}", path.display()))?;
    let mut messages = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Message>(line) {
            Ok(message) => messages.push(message),
            Err(err) => {
                warn!(line = idx + 1, %err, "skipping malformed transcript line");
            }
        }
    }
    Ok(messages)
}

/// Count turns taken by non-observer senders.
pub fn participant_turns(messages: &[Message], observer_roles: &[String]) -> u32 {
    messages
        .iter()
        .filter(|m| m.phase_boundary.is_none() && m.sender != SYSTEM_SENDER)
        .filter(|m| !observer_roles.iter().any(|role| role == &m.sender))
        .count() as u32
}

/// Whether a phase-boundary marker into `phase` already exists.
pub fn has_phase_boundary(messages: &[Message], phase: Phase) -> bool {
    messages
        .iter()
        .any(|m| m.phase_boundary.is_some_and(|b| b.to_phase == phase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PhaseBoundary;

    #[test]
    fn append_then_load_preserves_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("transcript.jsonl");

        append_message(&path, &Message::new("p1", "s-1", "first")).expect("append");
        append_message(&path, &Message::new("p2", "s-1", "second")).expect("append");

        let messages = load_transcript(&path).expect("load");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, "p1");
        assert_eq!(messages[1].content, "second");
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("transcript.jsonl");

        append_message(&path, &Message::new("p1", "s-1", "ok")).expect("append");
        fs::write(
            &path,
            format!(
                "{}{}\n",
                fs::read_to_string(&path).expect("read"),
                "{not json"
            ),
        )
        .expect("corrupt");
        append_message(&path, &Message::new("p2", "s-1", "also ok")).expect("append");

        let messages = load_transcript(&path).expect("load");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].sender, "p2");
    }

    #[test]
    fn observer_and_boundary_messages_do_not_count_as_turns() {
        let observers = vec!["coach".to_string()];
        let mut boundary = Message::new("engine", "s-1", "phase advance");
        boundary.phase_boundary = Some(PhaseBoundary {
            from_phase: Phase::Refinement,
            to_phase: Phase::Planning,
        });
        let messages = vec![
            Message::new("p1", "s-1", "a"),
            Message::new("coach", "s-1", "b"),
            boundary,
            Message::new(SYSTEM_SENDER, "s-1", "write denied"),
            Message::new("p2", "s-1", "c"),
        ];
        assert_eq!(participant_turns(&messages, &observers), 2);
        assert!(has_phase_boundary(&messages, Phase::Planning));
        assert!(!has_phase_boundary(&messages, Phase::PreReview));
    }

    #[test]
    fn missing_transcript_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let messages = load_transcript(&temp.path().join("none.jsonl")).expect("load");
        assert!(messages.is_empty());
    }
}
