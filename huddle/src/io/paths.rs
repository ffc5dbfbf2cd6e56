//! Canonical file layout for a session directory.

use std::path::PathBuf;

/// All canonical paths within a session directory.
///
/// The engine assumes exclusive ownership of this directory: exactly one
/// engine process operates on it at a time.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub transcript_path: PathBuf,
    pub approvals_path: PathBuf,
    pub checkpoints_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub requirements_path: PathBuf,
    pub tasks_path: PathBuf,
    pub diff_summary_path: PathBuf,
    pub review_notes_path: PathBuf,
    pub debug_log_path: PathBuf,
    pub env_path: PathBuf,
}

impl SessionPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let artifacts_dir = root.join("artifacts");
        Self {
            config_path: root.join("config.toml"),
            state_path: root.join("session.json"),
            transcript_path: root.join("transcript.jsonl"),
            approvals_path: root.join("approvals.json"),
            checkpoints_dir: root.join("checkpoints"),
            requirements_path: artifacts_dir.join("requirements.md"),
            tasks_path: artifacts_dir.join("tasks.json"),
            diff_summary_path: artifacts_dir.join("diff_summary.md"),
            review_notes_path: artifacts_dir.join("review_notes.md"),
            debug_log_path: root.join("debug.log"),
            env_path: root.join(".env"),
            artifacts_dir,
            root,
        }
    }
}

/// Names excluded from checkpoint capture and restore: the snapshot storage
/// area itself (no nesting) and the debug log.
pub const CHECKPOINT_EXCLUDED: &[&str] = &["checkpoints", "debug.log"];

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn paths_are_rooted_in_the_session_dir() {
        let paths = SessionPaths::new(Path::new("/tmp/session"));
        assert!(paths.transcript_path.ends_with("transcript.jsonl"));
        assert!(paths.tasks_path.ends_with("artifacts/tasks.json"));
        assert!(paths.checkpoints_dir.starts_with(&paths.root));
    }
}
