//! Parsing of agent review output and trailing markers.

use crate::core::types::Verdict;

/// Sentinel a review must emit (alone) to report a clean change set.
pub const NO_ISSUES: &str = "NO_ISSUES";

const LEGACY_CLEAN_PHRASE: &str = "no critical issues found";
const CONFIDENCE_PREFIX: &str = "CONFIDENCE:";

/// Classify the content of a review file.
pub fn parse_verdict(text: &str) -> Verdict {
    let trimmed = text.trim();
    if trimmed == NO_ISSUES {
        return Verdict::NoIssues;
    }
    if trimmed.is_empty() {
        return Verdict::AmbiguousLegacy(String::new());
    }
    let lowered = trimmed.to_lowercase();
    // Headings do not count as findings.
    let content_lines = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .count();
    if lowered.contains(LEGACY_CLEAN_PHRASE) && content_lines <= 1 {
        return Verdict::AmbiguousLegacy(trimmed.to_string());
    }
    Verdict::IssuesFound(trimmed.to_string())
}

/// Classify a review from agent stdout when no review file was written.
///
/// Only the trailing marker counts: a last non-empty line equal to the
/// sentinel means no issues, anything else is ambiguous.
pub fn parse_stdout_verdict(stdout: &str) -> Verdict {
    match last_content_line(stdout) {
        Some(NO_ISSUES) => Verdict::NoIssues,
        _ => Verdict::AmbiguousLegacy(stdout.trim().to_string()),
    }
}

/// Extract a trailing `CONFIDENCE: <value>` marker in the range 0..=1.
pub fn parse_confidence(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(3)
        .find_map(|line| {
            let rest = line.strip_prefix(CONFIDENCE_PREFIX)?;
            let value: f64 = rest.trim().parse().ok()?;
            (0.0..=1.0).contains(&value).then_some(value)
        })
}

fn last_content_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|line| !line.is_empty())
}
