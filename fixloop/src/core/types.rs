//! Shared deterministic types for the convergence loop.
//!
//! These types define stable contracts between core components and the
//! controller. They must not depend on external state or I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Loop phase the controller is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    Fix,
    Review,
    Resolve,
    /// Blocking interactive sub-session handed to the operator.
    Clarify,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Check => "check",
            Phase::Fix => "fix",
            Phase::Review => "review",
            Phase::Resolve => "resolve",
            Phase::Clarify => "clarify",
        }
    }
}

/// Parsed verdict of a review pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    NoIssues,
    IssuesFound(String),
    /// Empty, failed or legacy-phrased review output. Carries the raw text so a
    /// policy can still hand it to the resolve phase.
    AmbiguousLegacy(String),
}

/// How an [`Verdict::AmbiguousLegacy`] review is folded into control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguousPolicy {
    /// Keep looping as if the review reported issues.
    Issues,
    /// Accept the review as clean and converge.
    NoIssues,
}

impl Verdict {
    /// Apply the ambiguity policy, producing either `NoIssues` or `IssuesFound`.
    pub fn resolve(self, policy: AmbiguousPolicy) -> Verdict {
        match (self, policy) {
            (Verdict::AmbiguousLegacy(_), AmbiguousPolicy::NoIssues) => Verdict::NoIssues,
            (Verdict::AmbiguousLegacy(text), AmbiguousPolicy::Issues) => Verdict::IssuesFound(text),
            (other, _) => other,
        }
    }
}

/// Closed classification of a failed agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Known flaky failure; retried once with the identical prompt.
    Transient,
    /// The run cannot continue (missing binary, auth, capacity).
    Fatal,
    Unknown,
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Converged,
    Exhausted { max_iterations: u32 },
    Stagnated { iteration: u32, count: u32 },
    Aborted { reason: String },
    Interrupted,
}

impl TerminalStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalStatus::Converged)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TerminalStatus::Converged => "converged",
            TerminalStatus::Exhausted { .. } => "exhausted",
            TerminalStatus::Stagnated { .. } => "stagnated",
            TerminalStatus::Aborted { .. } => "aborted",
            TerminalStatus::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalStatus::Converged => write!(f, "converged: checks pass and review is clean"),
            TerminalStatus::Exhausted { max_iterations } => {
                write!(f, "exhausted: reached max iterations ({max_iterations})")
            }
            TerminalStatus::Stagnated { iteration, count } => write!(
                f,
                "stagnated: no progress for {count} consecutive iterations (stopped at iteration {iteration})"
            ),
            TerminalStatus::Aborted { reason } => write!(f, "aborted: {reason}"),
            TerminalStatus::Interrupted => write!(f, "interrupted by user"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_policy_maps_to_explicit_verdicts() {
        let ambiguous = Verdict::AmbiguousLegacy("maybe".to_string());
        assert_eq!(
            ambiguous.clone().resolve(AmbiguousPolicy::Issues),
            Verdict::IssuesFound("maybe".to_string())
        );
        assert_eq!(ambiguous.resolve(AmbiguousPolicy::NoIssues), Verdict::NoIssues);
    }

    #[test]
    fn policy_leaves_explicit_verdicts_alone() {
        assert_eq!(
            Verdict::NoIssues.resolve(AmbiguousPolicy::Issues),
            Verdict::NoIssues
        );
        let found = Verdict::IssuesFound("x".to_string());
        assert_eq!(found.clone().resolve(AmbiguousPolicy::NoIssues), found);
    }

    #[test]
    fn only_converged_is_success() {
        assert!(TerminalStatus::Converged.is_success());
        assert!(!TerminalStatus::Interrupted.is_success());
        assert!(
            !TerminalStatus::Stagnated {
                iteration: 6,
                count: 3
            }
            .is_success()
        );
    }
}
