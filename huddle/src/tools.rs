//! Tool schemas and the dispatch boundary.
//!
//! Every tool invocation produces exactly one result string and never raises
//! past this boundary: failures are encoded as result text starting with
//! [`TOOL_ERROR_PREFIX`]. File tools route through the sandbox guard or the
//! approval queue; coach tools turn into phase-control effects the engine
//! acts on.

use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::core::types::{PmQuestion, PmResponseType, ToolCall};
use crate::events::ToolStatus;
use crate::io::approvals::ApprovalStore;
use crate::io::sandbox::SandboxGuard;

/// Prefix that marks a tool result as a failure.
pub const TOOL_ERROR_PREFIX: &str = "ERROR:";

/// Schema for one tool, as exposed to the generation collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn spec(name: &str, description: &str, parameters: Value) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// Tool set for participants. File tools are present only when a sandbox
/// is configured.
pub fn participant_tools(sandboxed: bool) -> Vec<ToolSpec> {
    let mut tools = vec![spec(
        "pass_turn",
        "Yield the rest of your turn.",
        json!({
            "type": "object",
            "properties": { "reason": { "type": "string" } },
            "required": ["reason"]
        }),
    )];
    if sandboxed {
        tools.push(spec(
            "file_read",
            "Read a file inside the session directory.",
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }),
        ));
        tools.push(spec(
            "file_write",
            "Write a file inside the session directory (may require approval).",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["path", "content"]
            }),
        ));
        tools.push(spec(
            "file_list",
            "List a directory inside the session directory.",
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            }),
        ));
    }
    tools
}

/// Tool set for the coach. Callers distinguish "no coach" (no tool set at
/// all) from this set by the policy's `Option`.
pub fn coach_tools() -> Vec<ToolSpec> {
    vec![
        spec(
            "signal_phase_complete",
            "Declare the current phase's goal met.",
            json!({
                "type": "object",
                "properties": { "summary": { "type": "string" } },
                "required": ["summary"]
            }),
        ),
        spec(
            "ask_pm",
            "Escalate a question to the human PM.",
            json!({
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "response_type": { "type": "string", "enum": ["feedback", "decision"] },
                    "options": {
                        "type": "array",
                        "items": { "type": "string" },
                        "minItems": 2,
                        "maxItems": 5
                    }
                },
                "required": ["question", "response_type"]
            }),
        ),
    ]
}

/// Phase-control side effect of a dispatched tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEffect {
    None,
    PassTurn,
    PendingApproval { request_id: String },
    PhaseComplete { summary: String },
    AskPm(PmQuestion),
}

/// Result of dispatching one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub tool: String,
    pub result: String,
    pub effect: ToolEffect,
    pub status: ToolStatus,
    pub path: Option<String>,
    pub bytes: Option<u64>,
}

impl Dispatch {
    fn ok(tool: &str, result: String) -> Self {
        Self {
            tool: tool.to_string(),
            result,
            effect: ToolEffect::None,
            status: ToolStatus::Ok,
            path: None,
            bytes: None,
        }
    }

    fn error(tool: &str, message: impl std::fmt::Display) -> Self {
        Self {
            tool: tool.to_string(),
            result: format!("{TOOL_ERROR_PREFIX} {message}"),
            effect: ToolEffect::None,
            status: ToolStatus::Error,
            path: None,
            bytes: None,
        }
    }
}

/// Mutable collaborators a participant dispatch may touch.
pub struct ParticipantToolContext<'a> {
    pub sender: &'a str,
    /// `None` when no sandbox is configured (file tools unavailable).
    pub guard: Option<&'a SandboxGuard>,
    pub approvals: &'a mut ApprovalStore,
    pub require_approval: bool,
}

/// Dispatch one participant tool call.
pub fn dispatch_participant_tool(
    call: &ToolCall,
    ctx: &mut ParticipantToolContext<'_>,
) -> Dispatch {
    debug!(tool = %call.name, sender = %ctx.sender, "dispatching participant tool");
    match call.name.as_str() {
        "pass_turn" => {
            let reason = str_field(&call.input, "reason").unwrap_or_default();
            let mut dispatch = Dispatch::ok("pass_turn", format!("turn passed: {reason}"));
            dispatch.effect = ToolEffect::PassTurn;
            dispatch
        }
        "file_read" => with_guard(call, ctx.guard, |guard, path| {
            let abs = guard.check_read(path)?;
            let contents = fs::read_to_string(&abs)
                .map_err(|err| format!("read {}: {err}", abs.display()))?;
            let mut dispatch = Dispatch::ok("file_read", contents.clone());
            dispatch.path = Some(path.to_string());
            dispatch.bytes = Some(contents.len() as u64);
            Ok(dispatch)
        }),
        "file_list" => with_guard(call, ctx.guard, |guard, path| {
            let abs = guard.check_list(path)?;
            let mut names = Vec::new();
            let entries =
                fs::read_dir(&abs).map_err(|err| format!("list {}: {err}", abs.display()))?;
            for entry in entries {
                let entry = entry.map_err(|err| format!("list {}: {err}", abs.display()))?;
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
            names.sort();
            let mut dispatch = Dispatch::ok("file_list", names.join("\n"));
            dispatch.path = Some(path.to_string());
            Ok(dispatch)
        }),
        "file_write" => dispatch_file_write(call, ctx),
        other => Dispatch::error(other, format!("unknown tool '{other}'")),
    }
}

fn dispatch_file_write(call: &ToolCall, ctx: &mut ParticipantToolContext<'_>) -> Dispatch {
    let Some(guard) = ctx.guard else {
        return Dispatch::error("file_write", "file tools are not available in this session");
    };
    let Some(path) = str_field(&call.input, "path") else {
        return Dispatch::error("file_write", "missing required field 'path'");
    };
    let Some(content) = str_field(&call.input, "content") else {
        return Dispatch::error("file_write", "missing required field 'content'");
    };
    let size = content.len() as u64;

    // Validate up front so obviously-denied writes never clutter the queue.
    let abs = match guard.check_write(&path, size) {
        Ok(abs) => abs,
        Err(err) => {
            let mut dispatch = Dispatch::error("file_write", err);
            dispatch.path = Some(path);
            return dispatch;
        }
    };

    if ctx.require_approval {
        return match ctx
            .approvals
            .add(&path, &content, ctx.sender, call.input.clone())
        {
            Ok(request) => Dispatch {
                tool: "file_write".to_string(),
                result: format!(
                    "write to '{path}' is pending approval ({})",
                    request.id
                ),
                effect: ToolEffect::PendingApproval {
                    request_id: request.id,
                },
                status: ToolStatus::PendingApproval,
                path: Some(path),
                bytes: Some(size),
            },
            Err(err) => Dispatch::error("file_write", err),
        };
    }

    if let Some(parent) = abs.parent()
        && let Err(err) = fs::create_dir_all(parent)
    {
        return Dispatch::error("file_write", format!("create {}: {err}", parent.display()));
    }
    if let Err(err) = fs::write(&abs, &content) {
        return Dispatch::error("file_write", format!("write {}: {err}", abs.display()));
    }
    let mut dispatch = Dispatch::ok("file_write", format!("wrote {size} bytes to '{path}'"));
    dispatch.path = Some(path);
    dispatch.bytes = Some(size);
    dispatch
}

/// Dispatch one coach tool call.
pub fn dispatch_coach_tool(call: &ToolCall) -> Dispatch {
    debug!(tool = %call.name, "dispatching coach tool");
    match call.name.as_str() {
        "signal_phase_complete" => {
            let summary = str_field(&call.input, "summary").unwrap_or_default();
            let mut dispatch =
                Dispatch::ok("signal_phase_complete", "phase completion signaled".to_string());
            dispatch.effect = ToolEffect::PhaseComplete { summary };
            dispatch
        }
        "ask_pm" => dispatch_ask_pm(call),
        other => Dispatch::error(other, format!("unknown tool '{other}'")),
    }
}

fn dispatch_ask_pm(call: &ToolCall) -> Dispatch {
    let Some(question) = str_field(&call.input, "question") else {
        return Dispatch::error("ask_pm", "missing required field 'question'");
    };
    let response_type = match str_field(&call.input, "response_type").as_deref() {
        Some("feedback") => PmResponseType::Feedback,
        Some("decision") => PmResponseType::Decision,
        Some(other) => {
            return Dispatch::error("ask_pm", format!("unknown response_type '{other}'"));
        }
        None => return Dispatch::error("ask_pm", "missing required field 'response_type'"),
    };
    let options: Vec<String> = call
        .input
        .get("options")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    match response_type {
        PmResponseType::Decision if !(2..=5).contains(&options.len()) => {
            return Dispatch::error(
                "ask_pm",
                "decision questions require between 2 and 5 options",
            );
        }
        PmResponseType::Feedback if !options.is_empty() => {
            return Dispatch::error("ask_pm", "feedback questions take no options");
        }
        _ => {}
    }

    let mut dispatch = Dispatch::ok("ask_pm", "question escalated to the PM".to_string());
    dispatch.effect = ToolEffect::AskPm(PmQuestion {
        question,
        response_type,
        options,
    });
    dispatch
}

fn with_guard(
    call: &ToolCall,
    guard: Option<&SandboxGuard>,
    op: impl FnOnce(&SandboxGuard, &str) -> Result<Dispatch, DispatchFailure>,
) -> Dispatch {
    let Some(guard) = guard else {
        return Dispatch::error(&call.name, "file tools are not available in this session");
    };
    let Some(path) = str_field(&call.input, "path") else {
        return Dispatch::error(&call.name, "missing required field 'path'");
    };
    match op(guard, &path) {
        Ok(dispatch) => dispatch,
        Err(failure) => {
            let mut dispatch = Dispatch::error(&call.name, failure);
            dispatch.path = Some(path);
            dispatch
        }
    }
}

/// Internal failure carrier so sandbox denials and I/O messages share one
/// conversion path into result text.
enum DispatchFailure {
    Security(crate::io::sandbox::SecurityError),
    Other(String),
}

impl std::fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchFailure::Security(err) => write!(f, "{err}"),
            DispatchFailure::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<crate::io::sandbox::SecurityError> for DispatchFailure {
    fn from(err: crate::io::sandbox::SecurityError) -> Self {
        DispatchFailure::Security(err)
    }
}

impl From<String> for DispatchFailure {
    fn from(msg: String) -> Self {
        DispatchFailure::Other(msg)
    }
}

fn str_field(input: &Value, field: &str) -> Option<String> {
    input.get(field).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::SandboxConfig;

    fn call(name: &str, input: Value) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            input,
        }
    }

    fn context<'a>(
        guard: Option<&'a SandboxGuard>,
        approvals: &'a mut ApprovalStore,
        require_approval: bool,
    ) -> ParticipantToolContext<'a> {
        ParticipantToolContext {
            sender: "p1",
            guard,
            approvals,
            require_approval,
        }
    }

    #[test]
    fn tool_sets_match_the_session_shape() {
        let bare: Vec<String> = participant_tools(false)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(bare, vec!["pass_turn"]);

        let sandboxed: Vec<String> = participant_tools(true)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(sandboxed, vec!["pass_turn", "file_read", "file_write", "file_list"]);

        let coach: Vec<String> = coach_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(coach, vec!["signal_phase_complete", "ask_pm"]);
    }

    #[test]
    fn pass_turn_yields_the_effect() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut approvals = ApprovalStore::open(&temp.path().join("approvals.json")).expect("open");
        let mut ctx = context(None, &mut approvals, false);
        let dispatch =
            dispatch_participant_tool(&call("pass_turn", json!({"reason": "done"})), &mut ctx);
        assert_eq!(dispatch.effect, ToolEffect::PassTurn);
        assert_eq!(dispatch.status, ToolStatus::Ok);
    }

    #[test]
    fn oversize_write_fails_with_error_marker_and_writes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let guard = SandboxGuard::new(
            temp.path(),
            &SandboxConfig {
                max_file_bytes: 100,
                require_approval: false,
                ..SandboxConfig::default()
            },
        )
        .expect("guard");
        let mut approvals = ApprovalStore::open(&temp.path().join("approvals.json")).expect("open");
        let mut ctx = context(Some(&guard), &mut approvals, false);

        let content = "x".repeat(200);
        let dispatch = dispatch_participant_tool(
            &call("file_write", json!({"path": "big.txt", "content": content})),
            &mut ctx,
        );
        assert!(dispatch.result.starts_with(TOOL_ERROR_PREFIX));
        assert_eq!(dispatch.status, ToolStatus::Error);
        assert!(!temp.path().join("big.txt").exists());
    }

    #[test]
    fn gated_write_queues_an_approval_instead_of_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let guard = SandboxGuard::new(temp.path(), &SandboxConfig::default()).expect("guard");
        let mut approvals = ApprovalStore::open(&temp.path().join("approvals.json")).expect("open");
        let mut ctx = context(Some(&guard), &mut approvals, true);

        let dispatch = dispatch_participant_tool(
            &call("file_write", json!({"path": "notes.md", "content": "hello"})),
            &mut ctx,
        );
        assert_eq!(dispatch.status, ToolStatus::PendingApproval);
        assert_eq!(
            dispatch.effect,
            ToolEffect::PendingApproval {
                request_id: "req-1".to_string()
            }
        );
        assert!(!temp.path().join("notes.md").exists());
        assert_eq!(approvals.pending().len(), 1);
    }

    #[test]
    fn ungated_write_lands_on_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let guard = SandboxGuard::new(temp.path(), &SandboxConfig::default()).expect("guard");
        let mut approvals = ApprovalStore::open(&temp.path().join("approvals.json")).expect("open");
        let mut ctx = context(Some(&guard), &mut approvals, false);

        let dispatch = dispatch_participant_tool(
            &call("file_write", json!({"path": "notes.md", "content": "hello"})),
            &mut ctx,
        );
        assert_eq!(dispatch.status, ToolStatus::Ok);
        assert_eq!(
            fs::read_to_string(temp.path().join("notes.md")).expect("read"),
            "hello"
        );
    }

    #[test]
    fn file_read_returns_contents_and_byte_count() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("readme.md"), "content").expect("write");
        let guard = SandboxGuard::new(temp.path(), &SandboxConfig::default()).expect("guard");
        let mut approvals = ApprovalStore::open(&temp.path().join("approvals.json")).expect("open");
        let mut ctx = context(Some(&guard), &mut approvals, false);

        let dispatch =
            dispatch_participant_tool(&call("file_read", json!({"path": "readme.md"})), &mut ctx);
        assert_eq!(dispatch.result, "content");
        assert_eq!(dispatch.bytes, Some(7));
    }

    #[test]
    fn unknown_tool_is_an_error_result_not_a_panic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut approvals = ApprovalStore::open(&temp.path().join("approvals.json")).expect("open");
        let mut ctx = context(None, &mut approvals, false);
        let dispatch = dispatch_participant_tool(&call("launch_missiles", json!({})), &mut ctx);
        assert!(dispatch.result.starts_with(TOOL_ERROR_PREFIX));
    }

    #[test]
    fn ask_pm_decision_requires_two_to_five_options() {
        let ok = dispatch_coach_tool(&call(
            "ask_pm",
            json!({"question": "pick one", "response_type": "decision", "options": ["a", "b"]}),
        ));
        assert!(matches!(ok.effect, ToolEffect::AskPm(_)));

        let too_few = dispatch_coach_tool(&call(
            "ask_pm",
            json!({"question": "pick one", "response_type": "decision", "options": ["a"]}),
        ));
        assert!(too_few.result.starts_with(TOOL_ERROR_PREFIX));

        let feedback = dispatch_coach_tool(&call(
            "ask_pm",
            json!({"question": "thoughts?", "response_type": "feedback"}),
        ));
        let ToolEffect::AskPm(question) = feedback.effect else {
            panic!("expected AskPm effect");
        };
        assert_eq!(question.response_type, PmResponseType::Feedback);
        assert!(question.options.is_empty());
    }

    #[test]
    fn signal_phase_complete_carries_the_summary() {
        let dispatch = dispatch_coach_tool(&call(
            "signal_phase_complete",
            json!({"summary": "requirements are settled"}),
        ));
        assert_eq!(
            dispatch.effect,
            ToolEffect::PhaseComplete {
                summary: "requirements are settled".to_string()
            }
        );
    }
}
