//! Multi-party session orchestration CLI.
//!
//! Thin presentation wrapper over the `huddle` library: argument parsing,
//! event rendering, and stable exit codes. Engine correctness never depends
//! on anything in this file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};

use huddle::advance::advance_phase;
use huddle::core::layering::{assign_layers, max_layer};
use huddle::core::types::SessionStatus;
use huddle::engine::{EngineDeps, Halt, run_session};
use huddle::events::{Event, ToolStatus};
use huddle::exit_codes;
use huddle::io::approvals::ApprovalStore;
use huddle::io::artifacts::load_tasks;
use huddle::io::checkpoint::{CheckpointRequest, create_checkpoint, list_checkpoints, restore_checkpoint};
use huddle::io::config::{
    Participant, SessionConfig, load_config, resolve_credential, write_config,
};
use huddle::io::generator::CommandGenerator;
use huddle::io::paths::SessionPaths;
use huddle::io::sandbox::SandboxGuard;
use huddle::io::session_state::{SessionState, load_state, write_state};
use huddle::io::transcript::{load_transcript, participant_turns};
use huddle::logging;

#[derive(Parser)]
#[command(
    name = "huddle",
    version,
    about = "Multi-party, turn-based session orchestration engine"
)]
struct Cli {
    /// Session directory.
    #[arg(short, long, default_value = ".", global = true)]
    dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold a minimal session directory.
    Init {
        /// Session identifier.
        #[arg(long)]
        id: String,
        /// Free-text goal for the session.
        #[arg(long, default_value = "")]
        description: String,
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the turn loop until a halt condition.
    Run,
    /// Advance to the next phase: extract artifacts, checkpoint, move pointer.
    Advance,
    /// Validate the task list and print the execution layers.
    Plan,
    /// Inspect and resolve gated write requests.
    Approvals {
        #[command(subcommand)]
        command: ApprovalsCommand,
    },
    /// Snapshot and restore session state.
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },
    /// Print a one-screen session summary.
    Status,
}

#[derive(Subcommand)]
enum ApprovalsCommand {
    /// List pending requests.
    List,
    /// Approve one pending request.
    Approve {
        id: String,
        /// Resolver name recorded on the request.
        #[arg(long, default_value = "pm")]
        by: String,
    },
    /// Deny one pending request with a reason.
    Deny {
        id: String,
        reason: String,
        #[arg(long, default_value = "pm")]
        by: String,
    },
    /// Approve every currently pending request.
    ApproveAll {
        #[arg(long, default_value = "pm")]
        by: String,
    },
    /// Execute approved-but-unapplied writes through the sandbox.
    Apply,
}

#[derive(Subcommand)]
enum CheckpointCommand {
    /// Snapshot the session directory now.
    Create {
        #[arg(long)]
        description: Option<String>,
    },
    /// List snapshots by number.
    List,
    /// Restore a snapshot, replacing current session files.
    Restore { number: u32 },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let paths = SessionPaths::new(&cli.dir);
    logging::init(Some(&paths.debug_log_path));
    match run(cli, paths) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn run(cli: Cli, paths: SessionPaths) -> Result<i32> {
    match cli.command {
        Command::Init {
            id,
            description,
            force,
        } => cmd_init(&paths, &id, &description, force),
        Command::Run => cmd_run(&paths),
        Command::Advance => cmd_advance(&paths),
        Command::Plan => cmd_plan(&paths),
        Command::Approvals { command } => cmd_approvals(&paths, command),
        Command::Checkpoint { command } => cmd_checkpoint(&paths, command),
        Command::Status => cmd_status(&paths),
    }
}

fn cmd_init(paths: &SessionPaths, id: &str, description: &str, force: bool) -> Result<i32> {
    if paths.config_path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }
    std::fs::create_dir_all(&paths.artifacts_dir)
        .with_context(|| format!("create {}", paths.artifacts_dir.display()))?;

    let mut config = SessionConfig::default();
    config.session.id = id.to_string();
    config.session.description = description.to_string();
    config.participants = vec![
        Participant {
            name: "p1".to_string(),
            role: "engineer".to_string(),
        },
        Participant {
            name: "p2".to_string(),
            role: "engineer".to_string(),
        },
    ];
    write_config(&paths.config_path, &config)?;

    let state = SessionState {
        id: id.to_string(),
        description: description.to_string(),
        max_turns: config.session.max_turns,
        ..SessionState::default()
    };
    write_state(&paths.state_path, &state)?;
    println!("initialized session '{id}' in {}", paths.root.display());
    Ok(exit_codes::OK)
}

fn cmd_run(paths: &SessionPaths) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let api_key = match &config.generator.api_key {
        Some(value) => Some(resolve_credential(value, &paths.env_path)?),
        None => None,
    };
    let generator = CommandGenerator::new(config.generator.command.clone(), api_key)?;

    let mut deps = EngineDeps {
        generator: &generator,
        pause: None,
        on_event: &mut print_event,
    };
    let halt = run_session(paths, &config, &mut deps)?;
    Ok(match halt {
        Halt::Complete => {
            println!("session complete: turn budget spent");
            exit_codes::OK
        }
        Halt::PhaseComplete { summary } => {
            println!("phase complete: {summary}");
            println!("run `huddle advance` to move to the next phase");
            exit_codes::PHASE_COMPLETE
        }
        Halt::PausedForApproval { request_id } => {
            println!("paused: write {request_id} awaits approval");
            println!("resolve with `huddle approvals approve {request_id}` (or deny), then `huddle approvals apply` and re-run");
            exit_codes::PAUSED_APPROVAL
        }
        Halt::PausedForPm { question } => {
            println!("paused for PM ({:?}): {}", question.response_type, question.question);
            for (index, option) in question.options.iter().enumerate() {
                println!("  {}. {option}", index + 1);
            }
            exit_codes::PAUSED_PM
        }
        Halt::Paused => {
            println!("paused by external request");
            exit_codes::OK
        }
    })
}

fn cmd_advance(paths: &SessionPaths) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let api_key = match &config.generator.api_key {
        Some(value) => Some(resolve_credential(value, &paths.env_path)?),
        None => None,
    };
    let generator = CommandGenerator::new(config.generator.command.clone(), api_key)?;

    let outcome = advance_phase(paths, &config, &generator, &mut print_event)?;
    println!(
        "advanced to {} (checkpoint {})",
        outcome.phase.as_str(),
        outcome.checkpoint
    );
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(exit_codes::OK)
}

fn cmd_plan(paths: &SessionPaths) -> Result<i32> {
    let tasks = load_tasks(&paths.tasks_path)?;
    if tasks.is_empty() {
        println!("no tasks planned yet");
        return Ok(exit_codes::OK);
    }
    let layers = assign_layers(&tasks)?;
    let top = max_layer(&layers).unwrap_or(0);
    for layer in 0..=top {
        println!("layer {layer}:");
        for task in &tasks {
            if layers.get(&task.id) == Some(&layer) {
                println!("  {} - {}", task.id, task.description);
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_approvals(paths: &SessionPaths, command: ApprovalsCommand) -> Result<i32> {
    let mut store = ApprovalStore::open(&paths.approvals_path)?;
    match command {
        ApprovalsCommand::List => {
            let pending = store.pending();
            if pending.is_empty() {
                println!("no pending requests");
            }
            for request in pending {
                println!(
                    "{}  {}  {} bytes  by {}",
                    request.id, request.path, request.content_bytes, request.requested_by
                );
            }
        }
        ApprovalsCommand::Approve { id, by } => {
            store.approve(&id, &by)?;
            println!("approved {id}");
        }
        ApprovalsCommand::Deny { id, reason, by } => {
            store.deny(&id, &by, &reason)?;
            println!("denied {id}: {reason}");
        }
        ApprovalsCommand::ApproveAll { by } => {
            let approved = store.approve_all(&by)?;
            println!("approved {} request(s)", approved.len());
        }
        ApprovalsCommand::Apply => {
            let config = load_config(&paths.config_path)?;
            let sandbox = config
                .sandbox
                .as_ref()
                .context("no [sandbox] configured; nothing gates writes")?;
            let guard = SandboxGuard::new(&paths.root, sandbox)?;
            let results = store.apply_approved_writes(&guard)?;
            if results.is_empty() {
                println!("nothing to apply");
            }
            for result in &results {
                if result.ok {
                    println!("applied {}: {}", result.id, result.path);
                } else {
                    eprintln!("failed {}: {}", result.id, result.detail);
                }
            }
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_checkpoint(paths: &SessionPaths, command: CheckpointCommand) -> Result<i32> {
    match command {
        CheckpointCommand::Create { description } => {
            let config = load_config(&paths.config_path)?;
            let state = load_state(&paths.state_path)?;
            let transcript = load_transcript(&paths.transcript_path)?;
            let meta = create_checkpoint(
                &paths.root,
                &CheckpointRequest {
                    phase: state.phase,
                    status: state.status,
                    max_turns: state.max_turns,
                    participant_turns: participant_turns(&transcript, &config.observer_senders()),
                    description,
                    trigger: "manual".to_string(),
                },
            )?;
            println!("created checkpoint {}", meta.number);
        }
        CheckpointCommand::List => {
            let metas = list_checkpoints(&paths.root)?;
            if metas.is_empty() {
                println!("no checkpoints");
            }
            for meta in metas {
                println!(
                    "{}  {}  {}  {}",
                    meta.number,
                    meta.phase.as_str(),
                    meta.created_at,
                    meta.description
                );
            }
        }
        CheckpointCommand::Restore { number } => {
            let meta = restore_checkpoint(&paths.root, number)?;
            // Re-apply the snapshot's bookkeeping over whatever was restored.
            let mut state = load_state(&paths.state_path)?;
            state.phase = meta.phase;
            state.status = meta.status;
            state.max_turns = meta.max_turns;
            write_state(&paths.state_path, &state)?;
            println!(
                "restored checkpoint {} ({}, {} participant turns)",
                meta.number,
                meta.phase.as_str(),
                meta.participant_turns
            );
        }
    }
    Ok(exit_codes::OK)
}

fn cmd_status(paths: &SessionPaths) -> Result<i32> {
    let state = load_state(&paths.state_path)?;
    let config = load_config(&paths.config_path)?;
    let transcript = load_transcript(&paths.transcript_path)?;
    let turns = participant_turns(&transcript, &config.observer_senders());
    let store = ApprovalStore::open(&paths.approvals_path)?;

    println!("session:  {}", state.id);
    println!("phase:    {}", state.phase.as_str());
    println!("status:   {}", status_str(state.status));
    println!("turns:    {turns}/{}", state.max_turns);
    if let Some(layer) = state.current_layer {
        println!("layer:    {layer}");
    }
    println!("pending approvals: {}", store.pending().len());
    Ok(exit_codes::OK)
}

fn status_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "pending",
        SessionStatus::InProgress => "in-progress",
        SessionStatus::Complete => "complete",
        SessionStatus::Paused => "paused",
    }
}

/// Render one engine event to stdout.
fn print_event(event: &Event) {
    match event {
        Event::MessageAppended { sender, turn, .. } => {
            println!("{}[turn {turn}] {sender}{}", sender_style(sender), RESET);
        }
        Event::ToolProgress {
            tool,
            path,
            status,
            bytes,
        } => {
            let path = path.as_deref().unwrap_or("-");
            let bytes = bytes.map(|b| format!(" {b}B")).unwrap_or_default();
            let status = match status {
                ToolStatus::Ok => "ok",
                ToolStatus::Error => "error",
                ToolStatus::PendingApproval => "pending approval",
            };
            println!("  {tool} {path}{bytes}: {status}");
        }
        Event::Progress { stage } => println!("extracting {stage}..."),
        Event::AdvanceComplete { phase, checkpoint } => {
            println!("advance complete: {} (checkpoint {checkpoint})", phase.as_str());
        }
        Event::AdvanceError { message, partial } => {
            if *partial {
                eprintln!("advanced with warnings: {message}");
            } else {
                eprintln!("advance failed: {message}");
            }
        }
    }
}

const RESET: &str = "\x1b[0m";
const SENDER_COLORS: &[&str] = &[
    "\x1b[36m", // cyan
    "\x1b[33m", // yellow
    "\x1b[35m", // magenta
    "\x1b[32m", // green
    "\x1b[34m", // blue
];

/// Stable sender color: a pure lookup, no process-wide mutable table.
fn sender_style(sender: &str) -> &'static str {
    let sum: usize = sender.bytes().map(usize::from).sum();
    SENDER_COLORS[sum % SENDER_COLORS.len()]
}
