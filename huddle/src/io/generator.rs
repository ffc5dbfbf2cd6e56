//! Generator abstraction for text and tool-call production.
//!
//! The [`Generator`] trait decouples the engine from the model transport.
//! The engine receives participant output as already-completed text; retries,
//! backoff, and timeout policy toward the backend all belong to the
//! implementation behind this trait. Tests use scripted generators that
//! return predetermined replies without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::core::types::SpeakerReply;
use crate::io::process::run_command_with_timeout;
use crate::tools::ToolSpec;

/// Parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Working directory for the generator process.
    pub workdir: PathBuf,
    /// Fully assembled prompt for the speaker.
    pub prompt: String,
    /// Tool set available to the speaker for this call.
    pub tools: Vec<ToolSpec>,
    /// Maximum time to wait for the reply.
    pub timeout: Duration,
    /// Truncate generator output beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over text-generation backends.
pub trait Generator {
    /// Produce the speaker's reply for the assembled prompt.
    fn generate(&self, request: &GenerateRequest) -> Result<SpeakerReply>;
}

/// Generator that spawns a configured command, feeding the prompt (plus the
/// tool schemas as a JSON header) on stdin and parsing a [`SpeakerReply`]
/// JSON document from stdout.
pub struct CommandGenerator {
    command: Vec<String>,
    api_key: Option<String>,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>, api_key: Option<String>) -> Result<Self> {
        if command.is_empty() || command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        Ok(Self { command, api_key })
    }
}

impl Generator for CommandGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<SpeakerReply> {
        info!(command = %self.command[0], workdir = %request.workdir.display(), "invoking generator");

        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..]).current_dir(&request.workdir);
        if let Some(key) = &self.api_key {
            cmd.env("HUDDLE_API_KEY", key);
        }

        let tools_header =
            serde_json::to_string(&request.tools).context("serialize tool schemas")?;
        let stdin = format!("{tools_header}\n{}", request.prompt);

        let output = run_command_with_timeout(
            cmd,
            Some(stdin.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run generator command")?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generator timed out after {:?}", request.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator failed with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply: SpeakerReply = serde_json::from_str(stdout.trim())
            .context("parse generator reply as JSON")?;
        debug!(tool_calls = reply.tool_calls.len(), "generator reply parsed");
        Ok(reply)
    }
}
