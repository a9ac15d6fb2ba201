//! Safety intersection gate for externally visible mutations.
//!
//! Only identifiers present in both the scope captured when issues were first
//! fetched and the agent's claimed-resolved list may reach a mutating call.

use std::collections::BTreeSet;

/// Result of gating a claim against the run's scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateDecision {
    /// `scope ∩ claimed`: the only ids that may be actioned.
    pub safe: BTreeSet<String>,
    /// Claimed ids outside the scope, kept for audit logging.
    pub discarded: BTreeSet<String>,
}

pub fn authorize(scope: &BTreeSet<String>, claimed: &BTreeSet<String>) -> BTreeSet<String> {
    scope.intersection(claimed).cloned().collect()
}

pub fn gate(scope: &BTreeSet<String>, claimed: &BTreeSet<String>) -> GateDecision {
    GateDecision {
        safe: authorize(scope, claimed),
        discarded: claimed.difference(scope).cloned().collect(),
    }
}

/// Parse a one-identifier-per-line file body. Blank lines and surrounding
/// whitespace are ignored.
pub fn parse_id_lines(text: &str) -> BTreeSet<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn empty_inputs_yield_empty_result() {
        assert!(authorize(&set(&["A"]), &set(&[])).is_empty());
        assert!(authorize(&set(&[]), &set(&["A"])).is_empty());
        assert!(authorize(&set(&[]), &set(&[])).is_empty());
    }

    #[test]
    fn result_is_subset_of_both_inputs() {
        let scope = set(&["A", "B", "C", "E"]);
        let claimed = set(&["B", "C", "D", "F"]);
        let safe = authorize(&scope, &claimed);
        assert!(safe.is_subset(&scope));
        assert!(safe.is_subset(&claimed));
        assert_eq!(safe, authorize(&scope, &claimed));
    }

    /// Verifies that claims outside the scope are discarded, never actioned.
    #[test]
    fn gate_splits_safe_and_discarded_claims() {
        let decision = gate(&set(&["A", "B", "C"]), &set(&["B", "C", "D"]));
        assert_eq!(decision.safe, set(&["B", "C"]));
        assert_eq!(decision.discarded, set(&["D"]));
    }

    #[test]
    fn parse_id_lines_trims_and_dedups() {
        let ids = parse_id_lines("  PRRT_1 \n\nPRRT_2\nPRRT_1\n");
        assert_eq!(ids, set(&["PRRT_1", "PRRT_2"]));
    }
}
