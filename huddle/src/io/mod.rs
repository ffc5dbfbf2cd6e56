//! Side-effecting operations for the session engine.

pub mod approvals;
pub mod artifacts;
pub mod checkpoint;
pub mod config;
pub mod generator;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod sandbox;
pub mod session_state;
pub mod transcript;
