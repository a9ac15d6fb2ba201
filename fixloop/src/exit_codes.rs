//! Stable exit codes for fixloop CLI commands.

use crate::core::types::TerminalStatus;

/// Checks pass and the review is clean.
pub const CONVERGED: i32 = 0;
/// Budget exhausted, stagnated, aborted, or invalid configuration.
pub const FAILED: i32 = 1;
/// The operator interrupted the run.
pub const INTERRUPTED: i32 = 130;

pub fn for_status(status: &TerminalStatus) -> i32 {
    match status {
        TerminalStatus::Converged => CONVERGED,
        TerminalStatus::Interrupted => INTERRUPTED,
        TerminalStatus::Exhausted { .. }
        | TerminalStatus::Stagnated { .. }
        | TerminalStatus::Aborted { .. } => FAILED,
    }
}
