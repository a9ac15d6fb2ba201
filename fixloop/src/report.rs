//! Final run report and rollback instructions.

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

use crate::controller::RunOutcome;
use crate::core::types::TerminalStatus;
use crate::io::artifacts::ArtifactStore;

/// Commands a human can use to inspect or undo everything the run changed.
pub fn rollback_instructions(start_rev: Option<&str>) -> Vec<String> {
    match start_rev {
        Some(sha) => vec![
            format!("To see all changes made: git diff {sha}"),
            format!("To revert all changes:   git checkout {sha} -- ."),
        ],
        None => vec!["No starting revision was recorded; rollback reference unavailable.".to_string()],
    }
}

/// Log the terminal status; failures always repeat the rollback instructions.
pub fn emit(outcome: &RunOutcome) {
    match &outcome.status {
        TerminalStatus::Converged => {
            info!(iterations = outcome.iterations, "{}", outcome.status);
            return;
        }
        TerminalStatus::Interrupted => warn!(iterations = outcome.iterations, "{}", outcome.status),
        _ => error!(iterations = outcome.iterations, "{}", outcome.status),
    }
    for line in closing_lines(outcome) {
        warn!("{line}");
    }
}

/// Lines printed after a failed run: the working-tree state, then rollback.
pub fn closing_lines(outcome: &RunOutcome) -> Vec<String> {
    let mut lines = Vec::new();
    if outcome.uncommitted_changes {
        lines.push("The working tree has uncommitted changes left by this run.".to_string());
    }
    lines.extend(rollback_instructions(outcome.start_rev.as_deref()));
    lines
}

/// Append one line per run to the run-timestamps history.
pub fn record_timestamps(
    store: &ArtifactStore,
    started: DateTime<Local>,
    finished: DateTime<Local>,
    outcome: &RunOutcome,
) -> anyhow::Result<()> {
    let secs = (finished - started).num_seconds();
    store.append(
        &store.paths().run_timestamps,
        &format!(
            "- {} -> {} ({secs}s): {} after {} iteration(s)\n",
            started.format("%Y-%m-%d %H:%M:%S"),
            finished.format("%Y-%m-%d %H:%M:%S"),
            outcome.status.label(),
            outcome.iterations
        ),
    )
}
