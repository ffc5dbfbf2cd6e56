//! Session configuration stored as `config.toml` in the session directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Session configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing sections default to sensible values; the participant
/// roster is the only part that has no default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub session: SessionSection,
    pub generator: GeneratorConfig,
    pub participants: Vec<Participant>,
    /// Absent means no coach takes turns in this session.
    pub coach: Option<CoachConfig>,
    /// Absent means file tools are not offered to participants.
    pub sandbox: Option<SandboxConfig>,
    pub stop: StopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSection {
    pub id: String,
    pub description: String,
    pub max_turns: u32,
    /// Roles excluded when counting participant turns (checkpoint metadata).
    pub observer_roles: Vec<String>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            id: String::new(),
            description: String::new(),
            max_turns: 12,
            observer_roles: vec!["coach".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Argv for the subprocess-backed generator (e.g. `["codex", "exec"]`).
    pub command: Vec<String>,
    /// Credential handed to the generator process. Supports `env:NAME`
    /// indirection resolved by [`resolve_credential`].
    pub api_key: Option<String>,
    /// Wall-clock budget per generation call in seconds.
    pub timeout_secs: u64,
    /// Truncate generator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            api_key: None,
            timeout_secs: 15 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub name: String,
    /// Role prompt injected ahead of each of this participant's turns.
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoachConfig {
    pub name: String,
    /// Participant turns between coach interjections.
    pub cadence: u32,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Globs (relative to the session root) participants may write under.
    pub writable: Vec<String>,
    /// Deny-list globs; checked after the allow-list and always win.
    pub protected: Vec<String>,
    /// Maximum bytes for a single written file.
    pub max_file_bytes: u64,
    /// Route every write through the human approval queue.
    pub require_approval: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            writable: vec!["**".to_string()],
            protected: Vec::new(),
            max_file_bytes: 256 * 1024,
            require_approval: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StopConfig {
    /// Halt the run when the coach signals the phase is complete.
    pub on_phase_complete: bool,
    /// Halt the run as soon as a write lands in the approval queue.
    pub on_pending_approval: bool,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            on_phase_complete: true,
            on_pending_approval: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session: SessionSection::default(),
            generator: GeneratorConfig::default(),
            participants: Vec::new(),
            coach: None,
            sandbox: None,
            stop: StopConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.session.id.trim().is_empty() {
            return Err(anyhow!("session.id must be set"));
        }
        if self.session.max_turns == 0 {
            return Err(anyhow!("session.max_turns must be > 0"));
        }
        if self.participants.is_empty() {
            return Err(anyhow!("at least one participant is required"));
        }
        if let Some(coach) = &self.coach {
            if coach.cadence == 0 {
                return Err(anyhow!("coach.cadence must be > 0"));
            }
            if coach.name.trim().is_empty() {
                return Err(anyhow!("coach.name must be set"));
            }
        }
        if let Some(sandbox) = &self.sandbox
            && sandbox.max_file_bytes == 0
        {
            return Err(anyhow!("sandbox.max_file_bytes must be > 0"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn participant_names(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.name.as_str()).collect()
    }

    /// Senders excluded from the participant turn count: the configured
    /// observer roles plus the coach, whatever it is named.
    pub fn observer_senders(&self) -> Vec<String> {
        let mut observers = self.session.observer_roles.clone();
        if let Some(coach) = &self.coach
            && !observers.iter().any(|o| o == &coach.name)
        {
            observers.push(coach.name.clone());
        }
        observers
    }
}

/// Load config from a TOML file. The file must exist: a session without a
/// config is a scaffolding error, reported to the operator.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SessionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SessionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// Resolve a credential value, honoring `env:NAME` indirection.
///
/// An indirection token is resolved first against the session-local env file
/// (when present), then against the process environment. Failure to resolve
/// is fatal: a half-configured generator must be reported, not retried.
pub fn resolve_credential(value: &str, env_path: &Path) -> Result<String> {
    let Some(name) = value.strip_prefix("env:") else {
        return Ok(value.to_string());
    };
    if env_path.exists() {
        let vars = dotenvy::from_path_iter(env_path)
            .with_context(|| format!("read env file {}", env_path.display()))?;
        for entry in vars {
            let (key, val) = entry.with_context(|| format!("parse {}", env_path.display()))?;
            if key == name {
                return Ok(val);
            }
        }
    }
    std::env::var(name)
        .map_err(|_| anyhow!("credential '{name}' not found in {} or the environment", env_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::two_participant_config;

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = two_participant_config("s-1");
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn validation_rejects_empty_roster() {
        let mut cfg = two_participant_config("s-1");
        cfg.participants.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_zero_cadence() {
        let mut cfg = two_participant_config("s-1");
        cfg.coach = Some(CoachConfig {
            name: "coach".to_string(),
            cadence: 0,
            role: String::new(),
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn plain_credentials_pass_through() {
        let temp = tempfile::tempdir().expect("tempdir");
        let resolved =
            resolve_credential("sk-plain", &temp.path().join(".env")).expect("resolve");
        assert_eq!(resolved, "sk-plain");
    }

    #[test]
    fn env_file_wins_over_process_env() {
        let temp = tempfile::tempdir().expect("tempdir");
        let env_path = temp.path().join(".env");
        std::fs::write(&env_path, "HUDDLE_TEST_KEY=from-file\n").expect("write env");
        let resolved = resolve_credential("env:HUDDLE_TEST_KEY", &env_path).expect("resolve");
        assert_eq!(resolved, "from-file");
    }

    #[test]
    fn unresolved_indirection_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve_credential("env:HUDDLE_NO_SUCH_KEY", &temp.path().join(".env"))
            .expect_err("should fail");
        assert!(err.to_string().contains("HUDDLE_NO_SUCH_KEY"));
    }
}
