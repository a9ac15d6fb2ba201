//! Line-based truncation of historical artifacts.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

/// Thresholds for historical artifact compaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompactionPolicy {
    /// Artifacts longer than this are cut down to `tail_lines`.
    pub threshold_lines: usize,
    pub tail_lines: usize,
    /// Artifacts longer than this are cut down to `emergency_tail_lines`.
    pub emergency_threshold_lines: usize,
    pub emergency_tail_lines: usize,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            threshold_lines: 150,
            tail_lines: 50,
            emergency_threshold_lines: 200,
            emergency_tail_lines: 25,
        }
    }
}

impl CompactionPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.tail_lines == 0 || self.emergency_tail_lines == 0 {
            return Err(anyhow!("compaction tail lengths must be > 0"));
        }
        if self.tail_lines >= self.threshold_lines {
            return Err(anyhow!(
                "compaction.tail_lines ({}) must be < compaction.threshold_lines ({})",
                self.tail_lines,
                self.threshold_lines
            ));
        }
        if self.emergency_threshold_lines <= self.threshold_lines {
            return Err(anyhow!(
                "compaction.emergency_threshold_lines must be > compaction.threshold_lines"
            ));
        }
        if self.emergency_tail_lines > self.tail_lines {
            return Err(anyhow!(
                "compaction.emergency_tail_lines must be <= compaction.tail_lines"
            ));
        }
        Ok(())
    }
}

/// Result of applying a policy to artifact text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compaction {
    Unchanged,
    Truncated {
        before_lines: usize,
        after_lines: usize,
        emergency: bool,
        text: String,
    },
}

/// Apply `policy` to `text`, keeping only the most recent lines.
///
/// `force_emergency` cuts anything longer than the emergency tail, even below
/// the normal threshold; used after the agent reports a context overflow.
pub fn compact_text(text: &str, policy: &CompactionPolicy, force_emergency: bool) -> Compaction {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();
    let limit = if force_emergency {
        policy.emergency_tail_lines
    } else {
        policy.threshold_lines
    };
    if total <= limit {
        return Compaction::Unchanged;
    }
    let emergency = force_emergency || total > policy.emergency_threshold_lines;
    let keep = if emergency {
        policy.emergency_tail_lines
    } else {
        policy.tail_lines
    };
    if keep >= total {
        return Compaction::Unchanged;
    }
    let mut out = lines[total - keep..].join("\n");
    out.push('\n');
    Compaction::Truncated {
        before_lines: total,
        after_lines: keep,
        emergency,
        text: out,
    }
}

/// Last `n` lines of `text`, newline terminated.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    let mut out = lines[start..].join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {i}\n")).collect()
    }

    #[test]
    fn default_policy_is_valid() {
        CompactionPolicy::default().validate().expect("valid");
    }

    #[test]
    fn rejects_tail_not_below_threshold() {
        let policy = CompactionPolicy {
            tail_lines: 150,
            ..CompactionPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn rejects_emergency_tail_larger_than_tail() {
        let policy = CompactionPolicy {
            emergency_tail_lines: 60,
            ..CompactionPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn at_or_below_threshold_is_a_noop() {
        let policy = CompactionPolicy::default();
        assert_eq!(compact_text(&numbered(150), &policy, false), Compaction::Unchanged);
        assert_eq!(compact_text("", &policy, false), Compaction::Unchanged);
    }

    /// Verifies that normal compaction keeps exactly the configured tail and
    /// that the kept lines are the newest ones.
    #[test]
    fn above_threshold_keeps_recent_tail() {
        let policy = CompactionPolicy::default();
        let Compaction::Truncated {
            before_lines,
            after_lines,
            emergency,
            text,
        } = compact_text(&numbered(160), &policy, false)
        else {
            panic!("expected truncation");
        };
        assert_eq!(before_lines, 160);
        assert_eq!(after_lines, 50);
        assert!(!emergency);
        assert_eq!(text.lines().count(), 50);
        assert_eq!(text.lines().next(), Some("line 111"));
        assert!(numbered(160).ends_with(&text));
    }

    #[test]
    fn above_emergency_threshold_truncates_deeper() {
        let policy = CompactionPolicy::default();
        let Compaction::Truncated { text, emergency, .. } =
            compact_text(&numbered(500), &policy, false)
        else {
            panic!("expected truncation");
        };
        assert!(emergency);
        assert_eq!(text.lines().count(), 25);
        assert_eq!(text.lines().last(), Some("line 500"));
    }

    #[test]
    fn forced_emergency_uses_emergency_tail() {
        let policy = CompactionPolicy::default();
        let Compaction::Truncated { after_lines, .. } = compact_text(&numbered(151), &policy, true)
        else {
            panic!("expected truncation");
        };
        assert_eq!(after_lines, 25);
    }

    /// Verifies an overflow shrinks history that scheduled compaction
    /// already brought under the threshold.
    #[test]
    fn forced_emergency_applies_below_threshold() {
        let policy = CompactionPolicy::default();
        let Compaction::Truncated { text, emergency, .. } =
            compact_text(&numbered(50), &policy, true)
        else {
            panic!("expected truncation");
        };
        assert!(emergency);
        assert_eq!(text.lines().count(), 25);
        assert_eq!(text.lines().last(), Some("line 50"));
        assert_eq!(compact_text(&numbered(25), &policy, true), Compaction::Unchanged);
    }

    #[test]
    fn inverted_policy_does_not_panic() {
        let policy = CompactionPolicy {
            threshold_lines: 10,
            tail_lines: 40,
            emergency_threshold_lines: 500,
            emergency_tail_lines: 5,
        };
        assert_eq!(compact_text(&numbered(20), &policy, false), Compaction::Unchanged);
    }

    #[test]
    fn compacted_output_is_stable_on_second_pass() {
        let policy = CompactionPolicy::default();
        let Compaction::Truncated { text, .. } = compact_text(&numbered(300), &policy, false)
        else {
            panic!("expected truncation");
        };
        assert_eq!(compact_text(&text, &policy, false), Compaction::Unchanged);
    }

    #[test]
    fn tail_lines_handles_short_input() {
        assert_eq!(tail_lines("a\nb\n", 5), "a\nb\n");
        assert_eq!(tail_lines("a\nb\nc\n", 2), "b\nc\n");
        assert_eq!(tail_lines("", 2), "");
    }
}
