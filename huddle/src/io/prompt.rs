//! Prompt assembly for speakers and artifact extraction.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::Message;

const PARTICIPANT_TEMPLATE: &str = include_str!("prompts/participant.md");
const COACH_TEMPLATE: &str = include_str!("prompts/coach.md");
const EXTRACT_TEMPLATE: &str = include_str!("prompts/extract.md");

/// Everything a speaker prompt is assembled from.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    pub name: String,
    pub session_id: String,
    pub role: String,
    pub kickoff: Option<String>,
    pub requirements: Option<String>,
    pub task_summary: Option<String>,
    pub diff_summary: Option<String>,
    pub history: String,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("participant", PARTICIPANT_TEMPLATE)
            .expect("participant template should be valid");
        env.add_template("coach", COACH_TEMPLATE)
            .expect("coach template should be valid");
        env.add_template("extract", EXTRACT_TEMPLATE)
            .expect("extract template should be valid");
        Self { env }
    }

    pub fn render_participant(&self, inputs: &PromptInputs) -> Result<String> {
        let template = self.env.get_template("participant")?;
        let rendered = template.render(context! {
            name => inputs.name,
            session_id => inputs.session_id,
            role => inputs.role.trim(),
            kickoff => non_empty(inputs.kickoff.as_deref()),
            requirements => non_empty(inputs.requirements.as_deref()),
            task_summary => non_empty(inputs.task_summary.as_deref()),
            diff_summary => non_empty(inputs.diff_summary.as_deref()),
            history => non_empty(Some(&inputs.history)),
        })?;
        Ok(rendered)
    }

    pub fn render_coach(&self, inputs: &PromptInputs) -> Result<String> {
        let template = self.env.get_template("coach")?;
        let rendered = template.render(context! {
            name => inputs.name,
            session_id => inputs.session_id,
            role => inputs.role.trim(),
            requirements => non_empty(inputs.requirements.as_deref()),
            task_summary => non_empty(inputs.task_summary.as_deref()),
            history => non_empty(Some(&inputs.history)),
        })?;
        Ok(rendered)
    }

    pub fn render_extract(&self, instruction: &str, history: &str) -> Result<String> {
        let template = self.env.get_template("extract")?;
        let rendered = template.render(context! {
            instruction => instruction.trim(),
            history => history,
        })?;
        Ok(rendered)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Render the prior message history as prompt text, one turn per block.
pub fn render_history(messages: &[Message]) -> String {
    let mut lines = Vec::new();
    for message in messages {
        if let Some(boundary) = message.phase_boundary {
            lines.push(format!(
                "--- phase: {} -> {} ---",
                boundary.from_phase.as_str(),
                boundary.to_phase.as_str()
            ));
            continue;
        }
        lines.push(format!("{}: {}", message.sender, message.content));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Phase, PhaseBoundary};

    fn inputs() -> PromptInputs {
        PromptInputs {
            name: "eng-1".to_string(),
            session_id: "s-1".to_string(),
            role: "You build the backend.".to_string(),
            kickoff: None,
            requirements: None,
            task_summary: None,
            diff_summary: None,
            history: String::new(),
        }
    }

    #[test]
    fn participant_prompt_includes_role_and_placeholder_history() {
        let engine = PromptEngine::new();
        let rendered = engine.render_participant(&inputs()).expect("render");
        assert!(rendered.contains("eng-1"));
        assert!(rendered.contains("You build the backend."));
        assert!(rendered.contains("(no prior messages)"));
        assert!(!rendered.contains("# Phase kickoff"));
    }

    #[test]
    fn kickoff_section_appears_only_when_set() {
        let engine = PromptEngine::new();
        let mut with_kickoff = inputs();
        with_kickoff.kickoff = Some("Planning starts now.".to_string());
        let rendered = engine.render_participant(&with_kickoff).expect("render");
        assert!(rendered.contains("# Phase kickoff"));
        assert!(rendered.contains("Planning starts now."));
    }

    #[test]
    fn history_renders_boundaries_as_separators() {
        let mut boundary = Message::new("engine", "s-1", "advance");
        boundary.phase_boundary = Some(PhaseBoundary {
            from_phase: Phase::Refinement,
            to_phase: Phase::Planning,
        });
        let history = render_history(&[
            Message::new("p1", "s-1", "hello"),
            boundary,
            Message::new("p2", "s-1", "world"),
        ]);
        assert_eq!(
            history,
            "p1: hello\n--- phase: refinement -> planning ---\np2: world"
        );
    }
}
