//! Point-in-time snapshots of the session directory.
//!
//! A checkpoint is a numbered directory under `checkpoints/` holding a copy
//! of every non-excluded session file plus a metadata document. Snapshots
//! are immutable once written; restore replaces the current file set
//! wholesale (clean slate), so files created after the snapshot are dropped
//! and files deleted after it come back.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::types::{Phase, SessionStatus};
use crate::io::paths::CHECKPOINT_EXCLUDED;

const META_FILE: &str = "checkpoint.json";

/// Metadata record stored alongside each snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub number: u32,
    pub phase: Phase,
    pub status: SessionStatus,
    pub max_turns: u32,
    /// Non-observer turns in the transcript at snapshot time.
    pub participant_turns: u32,
    pub created_at: String,
    pub description: String,
    pub trigger: String,
}

/// Inputs for creating a checkpoint; the number is assigned by the manager.
#[derive(Debug, Clone)]
pub struct CheckpointRequest {
    pub phase: Phase,
    pub status: SessionStatus,
    pub max_turns: u32,
    pub participant_turns: u32,
    /// Defaults to "Auto after <trigger>" when `None`.
    pub description: Option<String>,
    pub trigger: String,
}

/// Create a snapshot of `session_dir`. Returns the metadata record.
pub fn create_checkpoint(session_dir: &Path, request: &CheckpointRequest) -> Result<CheckpointMeta> {
    let checkpoints_dir = session_dir.join("checkpoints");
    let number = next_number(&checkpoints_dir)?;
    let snapshot_dir = checkpoints_dir.join(number.to_string());
    fs::create_dir_all(&snapshot_dir)
        .with_context(|| format!("create snapshot dir {}", snapshot_dir.display()))?;

    copy_session_files(session_dir, &snapshot_dir)?;

    let meta = CheckpointMeta {
        number,
        phase: request.phase,
        status: request.status,
        max_turns: request.max_turns,
        participant_turns: request.participant_turns,
        created_at: Utc::now().to_rfc3339(),
        description: request
            .description
            .clone()
            .unwrap_or_else(|| format!("Auto after {}", request.trigger)),
        trigger: request.trigger.clone(),
    };
    write_meta(&snapshot_dir.join(META_FILE), &meta)?;
    info!(number, trigger = %meta.trigger, "checkpoint created");
    Ok(meta)
}

/// All snapshot metadata records, sorted by number.
pub fn list_checkpoints(session_dir: &Path) -> Result<Vec<CheckpointMeta>> {
    let checkpoints_dir = session_dir.join("checkpoints");
    let mut metas = Vec::new();
    for number in snapshot_numbers(&checkpoints_dir)? {
        let meta_path = checkpoints_dir.join(number.to_string()).join(META_FILE);
        let contents = fs::read_to_string(&meta_path)
            .with_context(|| format!("read {}", meta_path.display()))?;
        let meta: CheckpointMeta = serde_json::from_str(&contents)
            .with_context(|| format!("parse {}", meta_path.display()))?;
        metas.push(meta);
    }
    metas.sort_by_key(|m| m.number);
    Ok(metas)
}

/// Restore snapshot `number`, replacing the current session file set.
///
/// Returns the metadata record so the caller can re-apply phase/status/turn
/// bookkeeping.
pub fn restore_checkpoint(session_dir: &Path, number: u32) -> Result<CheckpointMeta> {
    let snapshot_dir = session_dir.join("checkpoints").join(number.to_string());
    if !snapshot_dir.is_dir() {
        return Err(anyhow!("checkpoint {number} does not exist"));
    }
    let meta_path = snapshot_dir.join(META_FILE);
    let contents =
        fs::read_to_string(&meta_path).with_context(|| format!("read {}", meta_path.display()))?;
    let meta: CheckpointMeta = serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", meta_path.display()))?;

    clear_session_files(session_dir)?;
    copy_back(&snapshot_dir, session_dir)?;
    info!(number, "checkpoint restored");
    Ok(meta)
}

/// Sequence number for the next snapshot: max existing + 1, starting at 1.
/// Non-integer directory names are ignored.
fn next_number(checkpoints_dir: &Path) -> Result<u32> {
    Ok(snapshot_numbers(checkpoints_dir)?.into_iter().max().unwrap_or(0) + 1)
}

fn snapshot_numbers(checkpoints_dir: &Path) -> Result<Vec<u32>> {
    if !checkpoints_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut numbers = Vec::new();
    for entry in fs::read_dir(checkpoints_dir)
        .with_context(|| format!("read {}", checkpoints_dir.display()))?
    {
        let entry = entry.context("read checkpoints entry")?;
        if !entry.path().is_dir() {
            continue;
        }
        if let Some(number) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        {
            numbers.push(number);
        }
    }
    Ok(numbers)
}

fn is_excluded(name: &str) -> bool {
    CHECKPOINT_EXCLUDED.contains(&name)
}

fn copy_session_files(session_dir: &Path, snapshot_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(session_dir)
        .with_context(|| format!("read {}", session_dir.display()))?
    {
        let entry = entry.context("read session entry")?;
        let name = entry.file_name();
        let Some(name_str) = name.to_str() else {
            continue;
        };
        if is_excluded(name_str) {
            continue;
        }
        copy_recursive(&entry.path(), &snapshot_dir.join(&name))?;
    }
    Ok(())
}

fn clear_session_files(session_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(session_dir)
        .with_context(|| format!("read {}", session_dir.display()))?
    {
        let entry = entry.context("read session entry")?;
        let name = entry.file_name();
        let Some(name_str) = name.to_str() else {
            continue;
        };
        if is_excluded(name_str) {
            continue;
        }
        let path = entry.path();
        debug!(path = %path.display(), "removing before restore");
        if path.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("remove {}", path.display()))?;
        } else {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
    }
    Ok(())
}

fn copy_back(snapshot_dir: &Path, session_dir: &Path) -> Result<()> {
    for entry in fs::read_dir(snapshot_dir)
        .with_context(|| format!("read {}", snapshot_dir.display()))?
    {
        let entry = entry.context("read snapshot entry")?;
        let name = entry.file_name();
        if name.to_str() == Some(META_FILE) {
            continue;
        }
        copy_recursive(&entry.path(), &session_dir.join(&name))?;
    }
    Ok(())
}

fn copy_recursive(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        fs::create_dir_all(to).with_context(|| format!("create {}", to.display()))?;
        for entry in fs::read_dir(from).with_context(|| format!("read {}", from.display()))? {
            let entry = entry.context("read dir entry")?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::copy(from, to)
        .with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

fn write_meta(path: &Path, meta: &CheckpointMeta) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(meta)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
