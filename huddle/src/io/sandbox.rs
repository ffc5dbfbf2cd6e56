//! Path and size validation gate for file tool calls.
//!
//! Every path-scoped operation resolves against the session root and is
//! checked lexically, so a candidate file does not need to exist. Denials are
//! always a [`SecurityError`], never a generic I/O error: the dispatch
//! boundary turns them into tool-result text, and callers may rely on the
//! variant to tell traversal from policy denial.

use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use glob::{MatchOptions, Pattern};
use thiserror::Error;

use crate::io::config::SandboxConfig;

/// Sandbox denial. Recoverable by design: surfaced as tool-result text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("path '{path}' escapes the session root")]
    Traversal { path: String },
    #[error("path '{path}' is not under a writable path")]
    NotWritable { path: String },
    #[error("path '{path}' is protected")]
    Protected { path: String },
    #[error("content for '{path}' is {size} bytes, exceeding the {limit}-byte limit")]
    Oversize { path: String, size: u64, limit: u64 },
}

/// Configured validation gate, built once per session.
#[derive(Debug, Clone)]
pub struct SandboxGuard {
    root: PathBuf,
    writable: Vec<Pattern>,
    protected: Vec<Pattern>,
    max_file_bytes: u64,
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

impl SandboxGuard {
    pub fn new(root: &Path, config: &SandboxConfig) -> Result<Self, anyhow::Error> {
        let compile = |globs: &[String]| -> Result<Vec<Pattern>, anyhow::Error> {
            globs
                .iter()
                .map(|g| Pattern::new(g).map_err(|err| anyhow::anyhow!("invalid glob '{g}': {err}")))
                .collect()
        };
        // The root must be absolute and normalized, or containment checks
        // against normalized candidates can never strip it as a prefix.
        let absolute = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .context("resolve working directory for the session root")?
                .join(root)
        };
        let root = normalize_lexical(&absolute)
            .ok_or_else(|| anyhow::anyhow!("invalid session root '{}'", absolute.display()))?;
        Ok(Self {
            root,
            writable: compile(&config.writable)?,
            protected: compile(&config.protected)?,
            max_file_bytes: config.max_file_bytes,
        })
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Validate a read. Returns the resolved absolute path.
    pub fn check_read(&self, candidate: &str) -> Result<PathBuf, SecurityError> {
        let (abs, rel) = self.contain(candidate)?;
        self.deny_protected(candidate, &rel)?;
        Ok(abs)
    }

    /// Validate a directory listing. Returns the resolved absolute path.
    pub fn check_list(&self, candidate: &str) -> Result<PathBuf, SecurityError> {
        self.check_read(candidate)
    }

    /// Validate a write before any filesystem mutation.
    ///
    /// Checks containment, the writable allow-list, the protected deny-list
    /// (which always wins), and the content size, in that order.
    pub fn check_write(&self, candidate: &str, content_len: u64) -> Result<PathBuf, SecurityError> {
        let (abs, rel) = self.contain(candidate)?;
        if !self.matches(&self.writable, &rel) {
            return Err(SecurityError::NotWritable {
                path: candidate.to_string(),
            });
        }
        self.deny_protected(candidate, &rel)?;
        self.check_size(candidate, content_len)?;
        Ok(abs)
    }

    /// Validate a write that already carries human approval.
    ///
    /// The approval is the authorization, so the allow-list is skipped; the
    /// containment and size checks are never bypassed.
    pub fn check_approved_write(
        &self,
        candidate: &str,
        content_len: u64,
    ) -> Result<PathBuf, SecurityError> {
        let (abs, _rel) = self.contain(candidate)?;
        self.check_size(candidate, content_len)?;
        Ok(abs)
    }

    fn check_size(&self, candidate: &str, content_len: u64) -> Result<(), SecurityError> {
        if content_len > self.max_file_bytes {
            return Err(SecurityError::Oversize {
                path: candidate.to_string(),
                size: content_len,
                limit: self.max_file_bytes,
            });
        }
        Ok(())
    }

    fn deny_protected(&self, candidate: &str, rel: &Path) -> Result<(), SecurityError> {
        if self.matches(&self.protected, rel) {
            return Err(SecurityError::Protected {
                path: candidate.to_string(),
            });
        }
        Ok(())
    }

    fn matches(&self, patterns: &[Pattern], rel: &Path) -> bool {
        patterns
            .iter()
            .any(|p| p.matches_path_with(rel, GLOB_OPTIONS))
    }

    /// Resolve `candidate` under the root, rejecting any escape.
    ///
    /// Resolution is lexical (`.` and `..` components) so that paths which do
    /// not exist yet can still be validated. Absolute candidates must already
    /// sit under the root.
    fn contain(&self, candidate: &str) -> Result<(PathBuf, PathBuf), SecurityError> {
        let raw = Path::new(candidate);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };

        let normalized = normalize_lexical(&joined).ok_or_else(|| SecurityError::Traversal {
            path: candidate.to_string(),
        })?;

        let rel = normalized
            .strip_prefix(&self.root)
            .map_err(|_| SecurityError::Traversal {
                path: candidate.to_string(),
            })?
            .to_path_buf();
        Ok((normalized, rel))
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
/// `None` when `..` would climb past the start of the path.
fn normalize_lexical(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return None;
                }
            }
            other => normalized.push(other),
        }
    }
    Some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::SandboxConfig;

    fn guard(root: &Path) -> SandboxGuard {
        SandboxGuard::new(
            root,
            &SandboxConfig {
                writable: vec!["src/**".to_string(), "notes.md".to_string()],
                protected: vec!["src/secrets/**".to_string()],
                max_file_bytes: 100,
                require_approval: false,
            },
        )
        .expect("guard")
    }

    #[test]
    fn write_inside_allowed_glob_resolves() {
        let temp = tempfile::tempdir().expect("tempdir");
        let g = guard(temp.path());
        let abs = g.check_write("src/lib.rs", 10).expect("allowed");
        assert!(abs.starts_with(temp.path()));
    }

    #[test]
    fn traversal_is_rejected_even_when_globs_allow_everything() {
        let temp = tempfile::tempdir().expect("tempdir");
        let g = SandboxGuard::new(temp.path(), &SandboxConfig::default()).expect("guard");
        let err = g.check_write("../outside.txt", 1).expect_err("deny");
        assert!(matches!(err, SecurityError::Traversal { .. }));
    }

    #[test]
    fn relative_root_is_resolved_against_the_working_directory() {
        let g = guard(Path::new("."));
        let abs = g.check_write("notes.md", 5).expect("allowed");
        assert!(abs.is_absolute());
        assert!(abs.ends_with("notes.md"));
    }

    #[test]
    fn relative_root_still_rejects_traversal() {
        let g = guard(Path::new("."));
        let err = g.check_write("../outside.txt", 1).expect_err("deny");
        assert!(matches!(err, SecurityError::Traversal { .. }));
    }

    #[test]
    fn inner_dotdot_that_stays_contained_is_fine() {
        let temp = tempfile::tempdir().expect("tempdir");
        let g = guard(temp.path());
        g.check_write("src/a/../lib.rs", 10).expect("contained");
    }

    #[test]
    fn write_outside_allow_list_is_not_writable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let g = guard(temp.path());
        let err = g.check_write("docs/readme.md", 1).expect_err("deny");
        assert!(matches!(err, SecurityError::NotWritable { .. }));
    }

    #[test]
    fn protected_wins_over_allow_list() {
        let temp = tempfile::tempdir().expect("tempdir");
        let g = guard(temp.path());
        let err = g.check_write("src/secrets/key.pem", 1).expect_err("deny");
        assert!(matches!(err, SecurityError::Protected { .. }));
    }

    #[test]
    fn oversize_content_is_rejected_before_any_write() {
        let temp = tempfile::tempdir().expect("tempdir");
        let g = guard(temp.path());
        let err = g.check_write("src/big.rs", 200).expect_err("deny");
        assert_eq!(
            err,
            SecurityError::Oversize {
                path: "src/big.rs".to_string(),
                size: 200,
                limit: 100,
            }
        );
    }

    #[test]
    fn approved_write_skips_allow_list_but_not_containment_or_size() {
        let temp = tempfile::tempdir().expect("tempdir");
        let g = guard(temp.path());

        g.check_approved_write("docs/readme.md", 10)
            .expect("approval authorizes the path");
        let err = g
            .check_approved_write("../outside.txt", 10)
            .expect_err("containment still enforced");
        assert!(matches!(err, SecurityError::Traversal { .. }));
        let err = g
            .check_approved_write("docs/big.md", 200)
            .expect_err("size still enforced");
        assert!(matches!(err, SecurityError::Oversize { .. }));
    }

    #[test]
    fn reads_are_contained_and_respect_protected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let g = guard(temp.path());
        g.check_read("docs/readme.md").expect("reads need no allow-list");
        let err = g.check_read("src/secrets/key.pem").expect_err("deny");
        assert!(matches!(err, SecurityError::Protected { .. }));
        let err = g.check_read("/etc/passwd").expect_err("deny");
        assert!(matches!(err, SecurityError::Traversal { .. }));
    }
}
