//! Session policy assembly.
//!
//! A policy is built once per engine run and never mutated during it. It
//! bundles the turn budget, stop conditions, tool sets, and the textual
//! artifacts carried from earlier phases. Artifact absence is not an error;
//! the corresponding field stays `None` and the prompt simply omits that
//! section.

use anyhow::Result;
use tracing::debug;

use crate::core::layering::assign_layers;
use crate::core::types::{Message, Phase};
use crate::io::artifacts::{load_tasks, load_text_artifact, render_task_summary};
use crate::io::config::{CoachConfig, SessionConfig};
use crate::io::paths::SessionPaths;
use crate::io::session_state::SessionState;
use crate::io::transcript::has_phase_boundary;
use crate::tools::{ToolSpec, coach_tools, participant_tools};

/// Immutable per-run configuration consumed by the engine.
#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub max_turns: u32,
    pub coach: Option<CoachConfig>,
    pub stop_on_phase_complete: bool,
    pub stop_on_pending_approval: bool,
    pub participant_tools: Vec<ToolSpec>,
    /// `None` when no coach is configured; never an empty stand-in.
    pub coach_tools: Option<Vec<ToolSpec>>,
    pub requirements: Option<String>,
    pub task_summary: Option<String>,
    pub diff_summary: Option<String>,
    /// Present only while the current phase's kickoff has not reached the
    /// group yet, so it is injected at most once per phase.
    pub kickoff: Option<String>,
}

/// Compose the policy for one engine run.
pub fn build_policy(
    config: &SessionConfig,
    paths: &SessionPaths,
    state: &SessionState,
    history: &[Message],
) -> Result<SessionPolicy> {
    let requirements = load_text_artifact(&paths.requirements_path)?;
    let diff_summary = load_text_artifact(&paths.diff_summary_path)?;

    let tasks = load_tasks(&paths.tasks_path)?;
    let task_summary = if tasks.is_empty() {
        None
    } else {
        let layers = assign_layers(&tasks)?;
        let summary = render_task_summary(&tasks, &layers, state.current_layer);
        if summary.is_empty() { None } else { Some(summary) }
    };

    let kickoff = if kickoff_delivered(history, state.phase) {
        None
    } else {
        Some(kickoff_text(state.phase, &state.description))
    };

    let policy = SessionPolicy {
        max_turns: state.max_turns,
        coach: config.coach.clone(),
        stop_on_phase_complete: config.stop.on_phase_complete,
        stop_on_pending_approval: config.stop.on_pending_approval,
        participant_tools: participant_tools(config.sandbox.is_some()),
        coach_tools: config.coach.as_ref().map(|_| coach_tools()),
        requirements,
        task_summary,
        diff_summary,
        kickoff,
    };
    debug!(
        phase = ?state.phase,
        kickoff = policy.kickoff.is_some(),
        task_summary = policy.task_summary.is_some(),
        "policy assembled"
    );
    Ok(policy)
}

/// Whether the kickoff for `phase` already reached the group. Non-initial
/// phases leave a boundary marker when their kickoff is delivered; the
/// initial phase has no marker, so any prior conversation means the kickoff
/// went out with the first turn.
fn kickoff_delivered(history: &[Message], phase: Phase) -> bool {
    if phase == Phase::Refinement {
        history.iter().any(|m| m.phase_boundary.is_none())
    } else {
        has_phase_boundary(history, phase)
    }
}

fn kickoff_text(phase: Phase, description: &str) -> String {
    let intro = match phase {
        Phase::Refinement => {
            "The session is starting. Work with the group to refine the goal \
             below into concrete, testable requirements."
        }
        Phase::Planning => {
            "Requirements are settled. Break the work into tasks with explicit \
             dependencies and a done criterion each."
        }
        Phase::PreReview => {
            "The plan is drafted. Challenge it before implementation starts: \
             missing tasks, wrong dependencies, unclear done criteria."
        }
        Phase::Implementation => {
            "The plan is approved. Implement the tasks for your assigned \
             layer, lowest layers first."
        }
        Phase::Review => {
            "Implementation is done. Review the changes against the \
             requirements and the done criteria."
        }
    };
    if description.trim().is_empty() {
        intro.to_string()
    } else {
        format!("{intro}\n\nSession goal: {}", description.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PhaseBoundary;
    use crate::io::artifacts::{write_tasks, write_text_artifact};
    use crate::test_support::{task, two_participant_config};

    fn state(phase: Phase) -> SessionState {
        SessionState {
            id: "s1".to_string(),
            description: "build the widget".to_string(),
            phase,
            max_turns: 8,
            ..SessionState::default()
        }
    }

    fn boundary_into(phase: Phase) -> Message {
        let mut message = Message::new("system", "s1", "");
        message.phase_boundary = Some(PhaseBoundary {
            from_phase: Phase::Refinement,
            to_phase: phase,
        });
        message
    }

    #[test]
    fn missing_artifacts_leave_fields_unset() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        let config = two_participant_config("s1");
        let policy =
            build_policy(&config, &paths, &state(Phase::Refinement), &[]).expect("policy");
        assert_eq!(policy.requirements, None);
        assert_eq!(policy.task_summary, None);
        assert_eq!(policy.diff_summary, None);
    }

    #[test]
    fn present_artifacts_are_carried() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        write_text_artifact(&paths.requirements_path, "must frobnicate").expect("write");
        write_tasks(&paths.tasks_path, &[task("a", &[]), task("b", &["a"])]).expect("write");
        let config = two_participant_config("s1");

        let policy = build_policy(&config, &paths, &state(Phase::Planning), &[]).expect("policy");
        assert_eq!(policy.requirements.as_deref(), Some("must frobnicate"));
        let summary = policy.task_summary.expect("summary");
        assert!(summary.contains("## Layer 0"));
        assert!(summary.contains("- b"));
    }

    #[test]
    fn task_summary_filters_to_the_current_layer() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        write_tasks(&paths.tasks_path, &[task("a", &[]), task("b", &["a"])]).expect("write");
        let config = two_participant_config("s1");
        let mut layered = state(Phase::Implementation);
        layered.current_layer = Some(1);

        let policy = build_policy(&config, &paths, &layered, &[]).expect("policy");
        let summary = policy.task_summary.expect("summary");
        assert!(summary.contains("- b"));
        assert!(!summary.contains("- a"));
    }

    #[test]
    fn kickoff_is_suppressed_once_the_phase_boundary_exists() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        let config = two_participant_config("s1");

        let fresh = build_policy(&config, &paths, &state(Phase::Planning), &[]).expect("policy");
        assert!(fresh.kickoff.is_some());

        let history = vec![boundary_into(Phase::Planning)];
        let resumed =
            build_policy(&config, &paths, &state(Phase::Planning), &history).expect("policy");
        assert_eq!(resumed.kickoff, None);
    }

    #[test]
    fn initial_phase_kickoff_is_not_reinjected_after_conversation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        let config = two_participant_config("s1");

        let fresh =
            build_policy(&config, &paths, &state(Phase::Refinement), &[]).expect("policy");
        assert!(fresh.kickoff.is_some());

        let history = vec![Message::new("p1", "s1", "let's scope this")];
        let resumed =
            build_policy(&config, &paths, &state(Phase::Refinement), &history).expect("policy");
        assert_eq!(resumed.kickoff, None);
    }

    #[test]
    fn file_tools_require_a_sandbox() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        let mut config = two_participant_config("s1");
        config.sandbox = None;

        let policy =
            build_policy(&config, &paths, &state(Phase::Refinement), &[]).expect("policy");
        let names: Vec<&str> = policy
            .participant_tools
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(names, vec!["pass_turn"]);
    }

    #[test]
    fn coach_tools_are_absent_not_empty_without_a_coach() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        let mut config = two_participant_config("s1");
        config.coach = None;
        let no_coach =
            build_policy(&config, &paths, &state(Phase::Refinement), &[]).expect("policy");
        assert!(no_coach.coach_tools.is_none());

        config.coach = Some(CoachConfig {
            name: "coach".to_string(),
            cadence: 2,
            role: String::new(),
        });
        let with_coach =
            build_policy(&config, &paths, &state(Phase::Refinement), &[]).expect("policy");
        assert!(with_coach.coach_tools.is_some_and(|tools| !tools.is_empty()));
    }
}
