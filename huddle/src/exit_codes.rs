//! Stable exit codes for huddle CLI commands.

/// Command succeeded; for `run`, the turn budget completed normally.
pub const OK: i32 = 0;
/// Command failed due to invalid config/state/arguments or other errors.
pub const INVALID: i32 = 1;
/// `huddle run` halted because the coach signaled phase completion.
pub const PHASE_COMPLETE: i32 = 2;
/// `huddle run` halted on a write waiting for human approval.
pub const PAUSED_APPROVAL: i32 = 3;
/// `huddle run` halted on a question escalated to the PM.
pub const PAUSED_PM: i32 = 4;
