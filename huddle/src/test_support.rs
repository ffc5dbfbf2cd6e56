//! Shared fixtures for unit and binary tests.
//!
//! Compiled into the crate for its own tests and exported behind the
//! `test-support` feature for the `tests/` binaries.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::types::{SpeakerReply, Task, TaskStatus, ToolCall};
use crate::io::config::{
    GeneratorConfig, Participant, SessionConfig, SessionSection, StopConfig, write_config,
};
use crate::io::generator::{GenerateRequest, Generator};
use crate::io::paths::SessionPaths;
use crate::io::session_state::{SessionState, write_state};

/// A task with the given dependencies and placeholder text fields.
pub fn task(id: &str, deps: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        description: format!("task {id}"),
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
        done_when: format!("{id} is done"),
        assignee: None,
        notes: None,
        layer: None,
        status: TaskStatus::Pending,
    }
}

/// A minimal valid config: participants `p1` and `p2`, no coach, no sandbox.
pub fn two_participant_config(id: &str) -> SessionConfig {
    SessionConfig {
        session: SessionSection {
            id: id.to_string(),
            description: "test session".to_string(),
            ..SessionSection::default()
        },
        generator: GeneratorConfig::default(),
        participants: vec![
            Participant {
                name: "p1".to_string(),
                role: "first engineer".to_string(),
            },
            Participant {
                name: "p2".to_string(),
                role: "second engineer".to_string(),
            },
        ],
        coach: None,
        sandbox: None,
        stop: StopConfig::default(),
    }
}

/// A plain text reply with no tool calls.
pub fn reply(text: &str) -> SpeakerReply {
    SpeakerReply {
        text: text.to_string(),
        tool_calls: Vec::new(),
    }
}

/// A reply carrying one tool call.
pub fn reply_with_tool(text: &str, tool: &str, input: serde_json::Value) -> SpeakerReply {
    SpeakerReply {
        text: text.to_string(),
        tool_calls: vec![ToolCall {
            name: tool.to_string(),
            input,
        }],
    }
}

/// Generator that plays back a fixed reply sequence, failing when exhausted.
/// Prompts are recorded so tests can assert on what each speaker saw.
pub struct ScriptedGenerator {
    replies: RefCell<VecDeque<SpeakerReply>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<SpeakerReply>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest) -> Result<SpeakerReply> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator exhausted"))
    }
}

/// A scaffolded session directory in a tempdir.
pub struct TestSession {
    pub temp: tempfile::TempDir,
    pub paths: SessionPaths,
    pub config: SessionConfig,
}

impl TestSession {
    /// Scaffold a session, letting the caller adjust the config first.
    ///
    /// Panics on scaffolding failure, which is fine in tests.
    pub fn new(id: &str, mutate: impl FnOnce(&mut SessionConfig)) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = SessionPaths::new(temp.path());
        let mut config = two_participant_config(id);
        mutate(&mut config);
        write_config(&paths.config_path, &config).expect("write config");

        let state = SessionState {
            id: id.to_string(),
            description: config.session.description.clone(),
            status: crate::core::types::SessionStatus::InProgress,
            max_turns: config.session.max_turns,
            ..SessionState::default()
        };
        write_state(&paths.state_path, &state).expect("write state");

        Self {
            temp,
            paths,
            config,
        }
    }
}
