//! Phase advance: artifact extraction, automatic checkpoint, pointer move.
//!
//! Advance is a non-turn operation triggered externally once the coach has
//! signaled phase completion (or the PM decided to move on). It extracts the
//! leaving phase's artifacts from the transcript via the generation backend,
//! snapshots the session directory, and only then moves the phase pointer.
//! Extraction failures downgrade to warnings carried on the outcome (the
//! `partial` flag); only checkpoint or state-write failures abort the
//! advance itself.

use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::layering::assign_layers;
use crate::core::types::{Phase, SessionStatus};
use crate::events::Event;
use crate::io::artifacts::{parse_tasks, write_tasks, write_text_artifact};
use crate::io::checkpoint::{CheckpointRequest, create_checkpoint};
use crate::io::config::SessionConfig;
use crate::io::generator::{GenerateRequest, Generator};
use crate::io::paths::SessionPaths;
use crate::io::prompt::{PromptEngine, render_history};
use crate::io::session_state::{load_state, write_state};
use crate::io::transcript::{load_transcript, participant_turns};

/// What a completed advance produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// The phase the session is now in.
    pub phase: Phase,
    pub checkpoint: u32,
    /// Non-empty when the pointer advanced but extraction was incomplete.
    pub warnings: Vec<String>,
}

/// Advance the session to the next phase.
///
/// Advancing out of the final phase extracts the review notes and marks the
/// session complete instead of failing.
pub fn advance_phase(
    paths: &SessionPaths,
    config: &SessionConfig,
    generator: &dyn Generator,
    on_event: &mut dyn FnMut(&Event),
) -> Result<AdvanceOutcome> {
    let mut state = load_state(&paths.state_path)?;
    let transcript = load_transcript(&paths.transcript_path)?;
    let history = render_history(&transcript);
    let prompts = PromptEngine::new();

    let mut warnings = Vec::new();
    let leaving = state.phase;
    info!(session = %state.id, phase = ?leaving, "advancing phase");

    let mut extract = |stage: &str, instruction: &str| -> Result<String, String> {
        (on_event)(&Event::Progress {
            stage: stage.to_string(),
        });
        let result = prompts
            .render_extract(instruction, &history)
            .and_then(|prompt| {
                generator.generate(&GenerateRequest {
                    workdir: paths.root.clone(),
                    prompt,
                    tools: Vec::new(),
                    timeout: Duration::from_secs(config.generator.timeout_secs),
                    output_limit_bytes: config.generator.output_limit_bytes,
                })
            });
        match result {
            Ok(reply) if reply.text.trim().is_empty() => {
                Err(format!("{stage}: extraction produced no text"))
            }
            Ok(reply) => Ok(reply.text),
            Err(err) => {
                warn!(stage, error = %err, "extraction failed");
                Err(format!("{stage}: {err:#}"))
            }
        }
    };

    match leaving {
        Phase::Refinement => {
            match extract(
                "requirements summary",
                "Summarize the agreed requirements from the conversation below \
                 as a concise markdown document.",
            ) {
                Ok(text) => write_text_artifact(&paths.requirements_path, &text)?,
                Err(warning) => warnings.push(warning),
            }
        }
        Phase::Planning | Phase::PreReview => {
            match extract(
                "task list",
                "Extract the agreed task list from the conversation below as a \
                 JSON document of the form {\"tasks\": [{\"id\", \"description\", \
                 \"depends_on\", \"done_when\", \"assignee\"}]}. Output only JSON.",
            ) {
                Ok(text) => match parse_tasks(&text).and_then(|tasks| {
                    assign_layers(&tasks)?;
                    Ok(tasks)
                }) {
                    Ok(tasks) => write_tasks(&paths.tasks_path, &tasks)?,
                    Err(err) => warnings.push(format!("task list: {err:#}")),
                },
                Err(warning) => warnings.push(warning),
            }
        }
        Phase::Implementation => {
            match extract(
                "diff summary",
                "Summarize what was changed during implementation, per file, \
                 from the conversation below.",
            ) {
                Ok(text) => write_text_artifact(&paths.diff_summary_path, &text)?,
                Err(warning) => warnings.push(warning),
            }
        }
        Phase::Review => {
            match extract(
                "review notes",
                "Extract the review findings from the conversation below as a \
                 markdown list of issues and sign-offs.",
            ) {
                Ok(text) => write_text_artifact(&paths.review_notes_path, &text)?,
                Err(warning) => warnings.push(warning),
            }
        }
    }

    let meta = create_checkpoint(
        &paths.root,
        &CheckpointRequest {
            phase: leaving,
            status: state.status,
            max_turns: state.max_turns,
            participant_turns: participant_turns(&transcript, &config.observer_senders()),
            description: None,
            trigger: leaving.as_str().to_string(),
        },
    )?;

    match leaving.next() {
        Some(next) => {
            state.phase = next;
            state.status = SessionStatus::InProgress;
        }
        None => {
            state.status = SessionStatus::Complete;
        }
    }
    state.current_layer = None;
    write_state(&paths.state_path, &state)?;

    let outcome = AdvanceOutcome {
        phase: state.phase,
        checkpoint: meta.number,
        warnings,
    };
    if outcome.warnings.is_empty() {
        (on_event)(&Event::AdvanceComplete {
            phase: outcome.phase,
            checkpoint: outcome.checkpoint,
        });
    } else {
        (on_event)(&Event::AdvanceError {
            message: outcome.warnings.join("; "),
            partial: true,
        });
    }
    Ok(outcome)
}
