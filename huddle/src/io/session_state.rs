//! Session state storage for phase and turn-budget bookkeeping.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{Phase, SessionStatus};

/// Persisted bookkeeping for a session (`session.json`).
///
/// Created by external scaffolding, mutated by phase-advance and run
/// bookkeeping, never deleted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionState {
    pub id: String,
    pub description: String,
    pub status: SessionStatus,
    pub phase: Phase,
    pub max_turns: u32,
    /// Execution layer currently being worked, when the plan is layered.
    pub current_layer: Option<u32>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            id: String::new(),
            description: String::new(),
            status: SessionStatus::Pending,
            phase: Phase::Refinement,
            max_turns: 12,
            current_layer: None,
        }
    }
}

/// Load session state from disk.
pub fn load_state(path: &Path) -> Result<SessionState> {
    debug!(path = %path.display(), "loading session state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read session state {}", path.display()))?;
    let state: SessionState = serde_json::from_str(&contents)
        .with_context(|| format!("parse session state {}", path.display()))?;
    debug!(id = %state.id, phase = ?state.phase, "session state loaded");
    Ok(state)
}

/// Atomically write session state to disk (temp file + rename).
pub fn write_state(path: &Path, state: &SessionState) -> Result<()> {
    debug!(path = %path.display(), id = %state.id, phase = ?state.phase, "writing session state");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace session state {}", path.display()))?;
    Ok(())
}
