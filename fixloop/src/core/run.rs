//! Run-level state owned by the controller.

use crate::core::types::{Phase, TerminalStatus, Verdict};

/// State of one loop invocation.
///
/// Created when the controller starts and discarded when it returns; only the
/// artifacts outlive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    /// Revision captured before the first check, used for rollback.
    pub start_rev: Option<String>,
    /// Current iteration (1-based once the first check starts).
    pub iteration: u32,
    pub max_iterations: u32,
    pub status: Option<TerminalStatus>,
}

impl RunState {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            start_rev: None,
            iteration: 0,
            max_iterations,
            status: None,
        }
    }

    /// Advance the iteration counter. Returns false once the budget is spent.
    pub fn begin_iteration(&mut self) -> bool {
        self.iteration += 1;
        self.iteration <= self.max_iterations
    }

    pub fn finish(&mut self, status: TerminalStatus) -> TerminalStatus {
        self.status = Some(status.clone());
        status
    }
}

/// Outcome of a single CHECK -> {FIX | REVIEW -> RESOLVE} pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRecord {
    pub iteration: u32,
    pub phase: Phase,
    pub check_exit: Option<i32>,
    pub filtered_error: Option<String>,
    pub verdict: Option<Verdict>,
    pub fix_attempts: u32,
}

impl IterationRecord {
    pub fn new(iteration: u32) -> Self {
        Self {
            iteration,
            phase: Phase::Check,
            check_exit: None,
            filtered_error: None,
            verdict: None,
            fix_attempts: 0,
        }
    }

    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_allows_exactly_max_iterations() {
        let mut run = RunState::new(3);
        assert!(run.begin_iteration());
        assert!(run.begin_iteration());
        assert!(run.begin_iteration());
        assert!(!run.begin_iteration());
        assert_eq!(run.iteration, 4);
    }

    #[test]
    fn finish_records_status() {
        let mut run = RunState::new(1);
        let status = run.finish(TerminalStatus::Converged);
        assert_eq!(status, TerminalStatus::Converged);
        assert_eq!(run.status, Some(TerminalStatus::Converged));
    }
}
