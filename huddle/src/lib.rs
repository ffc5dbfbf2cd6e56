//! Multi-party, turn-based session orchestration engine.
//!
//! A session moves a group of automated "engineer" participants, plus an
//! optional coach, through a fixed collaboration lifecycle: requirements
//! refinement, planning, pre-review, implementation, review. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (types, turn assignment,
//!   dependency layering). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (transcript, approvals,
//!   checkpoints, sandboxed file access, process execution). Isolated to
//!   enable scripted fakes in tests.
//!
//! Orchestration modules ([`engine`], [`advance`], [`policy`], [`tools`])
//! coordinate core logic with I/O to implement the session lifecycle.

pub mod advance;
pub mod core;
pub mod engine;
pub mod events;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod policy;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
