//! The turn loop: round-robin scheduler plus phase state machine.
//!
//! The loop is strictly sequential: one generation call, one tool-dispatch
//! batch, one transcript append per step. Message log order is authoritative;
//! the participant turn count is derived from the transcript on load, never
//! stored separately. Generation failures are fatal to the run and propagate
//! unmodified. Tool failures become result text and never abort the run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::schedule::{Speaker, next_speaker};
use crate::core::types::{Message, Phase, PhaseBoundary, PmQuestion, SessionStatus};
use crate::events::Event;
use crate::io::approvals::ApprovalStore;
use crate::io::config::SessionConfig;
use crate::io::generator::{GenerateRequest, Generator};
use crate::io::paths::SessionPaths;
use crate::io::prompt::{PromptEngine, PromptInputs, render_history};
use crate::io::sandbox::SandboxGuard;
use crate::io::session_state::{SessionState, load_state, write_state};
use crate::io::transcript::{SYSTEM_SENDER, append_message, load_transcript, participant_turns};
use crate::policy::{SessionPolicy, build_policy};
use crate::tools::{
    Dispatch, ParticipantToolContext, ToolEffect, dispatch_coach_tool, dispatch_participant_tool,
};

/// Why the run returned control to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Halt {
    /// The turn budget is spent.
    Complete,
    /// A gated write is waiting for a human decision.
    PausedForApproval { request_id: String },
    /// The coach escalated a question to the PM.
    PausedForPm { question: PmQuestion },
    /// The coach declared the phase goal met.
    PhaseComplete { summary: String },
    /// The external pause flag was set between turns.
    Paused,
}

/// Collaborators supplied by the caller for one run.
pub struct EngineDeps<'a> {
    pub generator: &'a dyn Generator,
    /// Cooperative pause, consulted between turns, never mid-turn.
    pub pause: Option<&'a AtomicBool>,
    pub on_event: &'a mut dyn FnMut(&Event),
}

/// Drive the session until a halt condition is reached.
///
/// Resuming after a pause is re-invoking this with the session directory in
/// whatever state the pause left it.
pub fn run_session(
    paths: &SessionPaths,
    config: &SessionConfig,
    deps: &mut EngineDeps<'_>,
) -> Result<Halt> {
    let mut state = load_state(&paths.state_path)?;
    let mut transcript = load_transcript(&paths.transcript_path)?;
    let observers = config.observer_senders();

    let mut approvals = ApprovalStore::open(&paths.approvals_path)?;
    let guard = match &config.sandbox {
        Some(sandbox) => Some(SandboxGuard::new(&paths.root, sandbox)?),
        None => None,
    };

    inject_denials(paths, config, &mut approvals, &mut transcript)?;

    let policy = build_policy(config, paths, &state, &transcript)?;
    let mut kickoff = policy.kickoff.clone();

    let prompts = PromptEngine::new();
    let mut turn_count = participant_turns(&transcript, &observers);
    let mut coach_spoke_last = transcript
        .last()
        .is_some_and(|m| Some(m.sender.as_str()) == coach_name(config));
    info!(
        session = %state.id,
        phase = ?state.phase,
        turn_count,
        max_turns = policy.max_turns,
        "engine run starting"
    );

    loop {
        if deps.pause.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return halt_paused(paths, &mut state, Halt::Paused);
        }
        if turn_count >= policy.max_turns {
            state.status = SessionStatus::Complete;
            write_state(&paths.state_path, &state)?;
            return Ok(Halt::Complete);
        }

        let speaker = next_speaker(
            turn_count,
            config.participants.len(),
            policy.coach.as_ref().map(|c| c.cadence),
            coach_spoke_last,
        );

        let (sender, role, prompt, tools) = match speaker {
            Speaker::Participant(index) => {
                let participant = &config.participants[index];
                // The marker lands together with the kickoff it records, so a
                // pause before any turn leaves both for the next run.
                if kickoff.is_some() && state.phase != Phase::Refinement {
                    append_phase_marker(paths, config, &mut transcript, state.phase)?;
                }
                let inputs = prompt_inputs(participant.name.clone(), participant.role.clone(),
                    config, &policy, &mut kickoff, &transcript);
                (
                    participant.name.clone(),
                    "participant",
                    prompts.render_participant(&inputs)?,
                    policy.participant_tools.clone(),
                )
            }
            Speaker::Coach => {
                let coach = policy
                    .coach
                    .as_ref()
                    .context("coach scheduled without coach config")?;
                // Kickoff stays queued for the next participant turn; the
                // coach prompt has no kickoff section.
                let inputs = prompt_inputs(coach.name.clone(), coach.role.clone(),
                    config, &policy, &mut None, &transcript);
                (
                    coach.name.clone(),
                    "coach",
                    prompts.render_coach(&inputs)?,
                    policy.coach_tools.clone().unwrap_or_default(),
                )
            }
        };
        debug!(%sender, role, turn_count, "consulting speaker");

        // Generation failures are fatal; retry policy belongs to the backend.
        let reply = deps.generator.generate(&GenerateRequest {
            workdir: paths.root.clone(),
            prompt,
            tools,
            timeout: Duration::from_secs(config.generator.timeout_secs),
            output_limit_bytes: config.generator.output_limit_bytes,
        })?;

        let mut dispatches: Vec<Dispatch> = Vec::new();
        for call in &reply.tool_calls {
            let dispatch = match speaker {
                Speaker::Participant(_) => {
                    let mut ctx = ParticipantToolContext {
                        sender: &sender,
                        guard: guard.as_ref(),
                        approvals: &mut approvals,
                        require_approval: config
                            .sandbox
                            .as_ref()
                            .is_some_and(|s| s.require_approval),
                    };
                    dispatch_participant_tool(call, &mut ctx)
                }
                Speaker::Coach => dispatch_coach_tool(call),
            };
            dispatches.push(dispatch);
        }

        let mut content = reply.text.clone();
        let mut pass_turn = false;
        for dispatch in &dispatches {
            if !content.is_empty() {
                content.push_str("\n\n");
            }
            content.push_str(&format!("[{}] {}", dispatch.tool, dispatch.result));
            if dispatch.effect == ToolEffect::PassTurn {
                pass_turn = true;
            }
        }

        let mut message = Message::new(&sender, &state.id, content);
        message.pass_turn = pass_turn;
        message.layer = state.current_layer;
        append_message(&paths.transcript_path, &message)?;
        transcript.push(message);

        (deps.on_event)(&Event::MessageAppended {
            sender: sender.clone(),
            turn: turn_count,
            phase: state.phase,
        });
        for dispatch in &dispatches {
            (deps.on_event)(&Event::ToolProgress {
                tool: dispatch.tool.clone(),
                path: dispatch.path.clone(),
                status: dispatch.status,
                bytes: dispatch.bytes,
            });
        }

        // Stop conditions, in priority order.
        if policy.stop_on_pending_approval
            && let Some(request_id) = dispatches.iter().find_map(|d| match &d.effect {
                ToolEffect::PendingApproval { request_id } => Some(request_id.clone()),
                _ => None,
            })
        {
            return halt_paused(paths, &mut state, Halt::PausedForApproval { request_id });
        }
        if policy.stop_on_phase_complete
            && let Some(summary) = dispatches.iter().find_map(|d| match &d.effect {
                ToolEffect::PhaseComplete { summary } => Some(summary.clone()),
                _ => None,
            })
        {
            return Ok(Halt::PhaseComplete { summary });
        }
        if let Some(question) = dispatches.iter().find_map(|d| match &d.effect {
            ToolEffect::AskPm(question) => Some(question.clone()),
            _ => None,
        }) {
            return halt_paused(paths, &mut state, Halt::PausedForPm { question });
        }

        match speaker {
            Speaker::Participant(_) => {
                coach_spoke_last = false;
                turn_count += 1;
            }
            Speaker::Coach => {
                coach_spoke_last = true;
            }
        }
    }
}

fn halt_paused(paths: &SessionPaths, state: &mut SessionState, halt: Halt) -> Result<Halt> {
    state.status = SessionStatus::Paused;
    write_state(&paths.state_path, state)?;
    Ok(halt)
}

fn prompt_inputs(
    name: String,
    role: String,
    config: &SessionConfig,
    policy: &SessionPolicy,
    kickoff: &mut Option<String>,
    transcript: &[Message],
) -> PromptInputs {
    PromptInputs {
        name,
        session_id: config.session.id.clone(),
        role,
        kickoff: kickoff.take(),
        requirements: policy.requirements.clone(),
        task_summary: policy.task_summary.clone(),
        diff_summary: policy.diff_summary.clone(),
        history: render_history(transcript),
    }
}

fn coach_name(config: &SessionConfig) -> Option<&str> {
    config.coach.as_ref().map(|c| c.name.as_str())
}

/// Surface resolved denials back into the conversation, exactly once each.
fn inject_denials(
    paths: &SessionPaths,
    config: &SessionConfig,
    approvals: &mut ApprovalStore,
    transcript: &mut Vec<Message>,
) -> Result<()> {
    let denied: Vec<_> = approvals
        .denied_uninjected()
        .into_iter()
        .map(|r| (r.id.clone(), r.path.clone(), r.denial_reason.clone()))
        .collect();
    for (id, path, reason) in denied {
        let reason = reason.unwrap_or_else(|| "no reason given".to_string());
        let message = Message::new(
            SYSTEM_SENDER,
            &config.session.id,
            format!("write to '{path}' was denied: {reason}"),
        );
        append_message(&paths.transcript_path, &message)?;
        transcript.push(message);
        approvals.mark_injected(&id)?;
    }
    Ok(())
}

/// Mark the first turn of a non-initial phase so the kickoff is never
/// injected again on later runs.
fn append_phase_marker(
    paths: &SessionPaths,
    config: &SessionConfig,
    transcript: &mut Vec<Message>,
    phase: Phase,
) -> Result<()> {
    let from_phase = transcript
        .iter()
        .rev()
        .find_map(|m| m.phase_boundary.map(|b| b.to_phase))
        .unwrap_or(Phase::Refinement);
    let mut message = Message::new(SYSTEM_SENDER, &config.session.id, "");
    message.phase_boundary = Some(PhaseBoundary {
        from_phase,
        to_phase: phase,
    });
    append_message(&paths.transcript_path, &message)?;
    transcript.push(message);
    Ok(())
}
