//! Durable ledger of gated write requests.
//!
//! The ledger is a single JSON document, fully loaded on open and rewritten
//! wholesale (temp file + rename) on every mutation. Requests are never
//! deleted, only status-transitioned, which makes `total ever created + 1` a
//! safe unique identifier.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::io::sandbox::SandboxGuard;

pub const REQUEST_ID_PREFIX: &str = "req-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
        }
    }
}

/// Caller/config errors. Raised to the immediate caller, never swallowed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("approval request '{id}' not found")]
    NotFound { id: String },
    #[error("approval request '{id}' is already {status}", status = .status.as_str())]
    AlreadyResolved { id: String, status: ApprovalStatus },
}

/// One gated write request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub path: String,
    pub content: String,
    pub content_bytes: u64,
    pub requested_by: String,
    pub tool_input: serde_json::Value,
    pub status: ApprovalStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denial_reason: Option<String>,
    /// An approved write has been executed on disk.
    #[serde(default)]
    pub applied: bool,
    /// A denial has been surfaced back into the conversation.
    #[serde(default)]
    pub injected: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Ledger {
    requests: Vec<ApprovalRequest>,
}

/// Result of applying one approved write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    pub id: String,
    pub path: String,
    pub ok: bool,
    pub detail: String,
}

/// The approval ledger, single source of truth for gated writes.
#[derive(Debug)]
pub struct ApprovalStore {
    path: PathBuf,
    ledger: Ledger,
}

impl ApprovalStore {
    /// Open the ledger at `path`. A missing file is an empty ledger.
    pub fn open(path: &Path) -> Result<Self> {
        let ledger = if path.exists() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read ledger {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parse ledger {}", path.display()))?
        } else {
            Ledger::default()
        };
        debug!(path = %path.display(), requests = ledger.requests.len(), "approval ledger opened");
        Ok(Self {
            path: path.to_path_buf(),
            ledger,
        })
    }

    /// Record a new pending request and persist the ledger.
    ///
    /// Identifiers are monotonic over the lifetime request count and never
    /// reused, even across approve/deny cycles.
    pub fn add(
        &mut self,
        path: &str,
        content: &str,
        requested_by: &str,
        tool_input: serde_json::Value,
    ) -> Result<ApprovalRequest> {
        let id = format!("{REQUEST_ID_PREFIX}{}", self.ledger.requests.len() + 1);
        let request = ApprovalRequest {
            id: id.clone(),
            path: path.to_string(),
            content: content.to_string(),
            content_bytes: content.len() as u64,
            requested_by: requested_by.to_string(),
            tool_input,
            status: ApprovalStatus::Pending,
            created_at: Utc::now().to_rfc3339(),
            resolved_at: None,
            resolved_by: None,
            denial_reason: None,
            applied: false,
            injected: false,
        };
        self.ledger.requests.push(request.clone());
        self.save()?;
        info!(%id, path, "approval request queued");
        Ok(request)
    }

    /// Approve a single pending request.
    pub fn approve(&mut self, id: &str, resolver: &str) -> Result<()> {
        self.resolve(id, resolver, ApprovalStatus::Approved, None)
    }

    /// Deny a single pending request with a reason.
    pub fn deny(&mut self, id: &str, resolver: &str, reason: &str) -> Result<()> {
        self.resolve(id, resolver, ApprovalStatus::Denied, Some(reason.to_string()))
    }

    fn resolve(
        &mut self,
        id: &str,
        resolver: &str,
        status: ApprovalStatus,
        denial_reason: Option<String>,
    ) -> Result<()> {
        let request = self
            .ledger
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ApprovalError::NotFound { id: id.to_string() })?;
        if request.status != ApprovalStatus::Pending {
            return Err(ApprovalError::AlreadyResolved {
                id: id.to_string(),
                status: request.status,
            }
            .into());
        }
        request.status = status;
        request.resolved_at = Some(Utc::now().to_rfc3339());
        request.resolved_by = Some(resolver.to_string());
        request.denial_reason = denial_reason;
        self.save()?;
        info!(%id, status = status.as_str(), "approval request resolved");
        Ok(())
    }

    /// Approve every request that is pending at call time. Returns their ids.
    pub fn approve_all(&mut self, resolver: &str) -> Result<Vec<String>> {
        let now = Utc::now().to_rfc3339();
        let mut approved = Vec::new();
        for request in &mut self.ledger.requests {
            if request.status != ApprovalStatus::Pending {
                continue;
            }
            request.status = ApprovalStatus::Approved;
            request.resolved_at = Some(now.clone());
            request.resolved_by = Some(resolver.to_string());
            approved.push(request.id.clone());
        }
        if !approved.is_empty() {
            self.save()?;
        }
        Ok(approved)
    }

    pub fn pending(&self) -> Vec<&ApprovalRequest> {
        self.filtered(|r| r.status == ApprovalStatus::Pending)
    }

    pub fn approved_unapplied(&self) -> Vec<&ApprovalRequest> {
        self.filtered(|r| r.status == ApprovalStatus::Approved && !r.applied)
    }

    pub fn denied_uninjected(&self) -> Vec<&ApprovalRequest> {
        self.filtered(|r| r.status == ApprovalStatus::Denied && !r.injected)
    }

    pub fn get(&self, id: &str) -> Option<&ApprovalRequest> {
        self.ledger.requests.iter().find(|r| r.id == id)
    }

    /// Mark a denial as surfaced back into the conversation.
    pub fn mark_injected(&mut self, id: &str) -> Result<()> {
        let request = self
            .ledger
            .requests
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ApprovalError::NotFound { id: id.to_string() })?;
        request.injected = true;
        self.save()
    }

    /// Drain the approved-but-unapplied view: re-validate each write through
    /// the guard's approved path, perform it, and mark the request applied.
    ///
    /// Never raises past this boundary for an individual request: a security
    /// or I/O failure degrades that request to a failure record without
    /// aborting the batch.
    pub fn apply_approved_writes(&mut self, guard: &SandboxGuard) -> Result<Vec<ApplyResult>> {
        let indices: Vec<usize> = self
            .ledger
            .requests
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == ApprovalStatus::Approved && !r.applied)
            .map(|(idx, _)| idx)
            .collect();
        let mut results = Vec::new();
        for idx in indices {
            let (id, path, content) = {
                let request = &self.ledger.requests[idx];
                (request.id.clone(), request.path.clone(), request.content.clone())
            };
            match apply_one(guard, &path, &content) {
                Ok(bytes) => {
                    self.ledger.requests[idx].applied = true;
                    results.push(ApplyResult {
                        id,
                        path,
                        ok: true,
                        detail: format!("wrote {bytes} bytes"),
                    });
                }
                Err(err) => {
                    results.push(ApplyResult {
                        id,
                        path,
                        ok: false,
                        detail: err.to_string(),
                    });
                }
            }
        }
        self.save()?;
        Ok(results)
    }

    fn filtered(&self, keep: impl Fn(&ApprovalRequest) -> bool) -> Vec<&ApprovalRequest> {
        self.ledger.requests.iter().filter(|r| keep(r)).collect()
    }

    fn save(&self) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(&self.ledger)?;
        buf.push('\n');
        let parent = self
            .path
            .parent()
            .with_context(|| format!("ledger path missing parent {}", self.path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, buf)
            .with_context(|| format!("write temp ledger {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replace ledger {}", self.path.display()))?;
        Ok(())
    }
}

fn apply_one(guard: &SandboxGuard, path: &str, content: &str) -> Result<usize> {
    let abs = guard.check_approved_write(path, content.len() as u64)?;
    if let Some(parent) = abs.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&abs, content).with_context(|| format!("write {}", abs.display()))?;
    Ok(content.len())
}
