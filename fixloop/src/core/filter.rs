//! Excerpting of long check logs for the fix prompt.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Logs up to this many lines are passed through whole.
pub const MAX_FILTERED_LINES: usize = 300;
pub const CONTEXT_LINES: usize = 3;
pub const TAIL_LINES: usize = 80;

static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(error[:\[ ]|fatal|failed|panic|exception|undefined reference|cannot find|no such file|not found|segfault|abort|compilation failed|build failed|assert)",
    )
    .expect("error pattern is a valid regex")
});

/// Build the filtered excerpt of `raw`.
///
/// `log_name` is shown in the header so the agent knows where the full output
/// lives.
pub fn filter_check_log(raw: &str, log_name: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let total = lines.len();
    if total <= MAX_FILTERED_LINES {
        return raw.to_string();
    }

    let mut keep = BTreeSet::new();
    for (i, line) in lines.iter().enumerate() {
        if ERROR_LINE.is_match(line) {
            let start = i.saturating_sub(CONTEXT_LINES);
            let end = (i + CONTEXT_LINES + 1).min(total);
            keep.extend(start..end);
        }
    }

    let mut out: Vec<String> = vec![
        format!("=== FILTERED CHECK OUTPUT (full log: {log_name}, {total} lines) ==="),
        String::new(),
        "--- Error/failure lines with context ---".to_string(),
    ];
    let budget = MAX_FILTERED_LINES - TAIL_LINES - out.len() - 2;
    out.extend(keep.into_iter().take(budget).map(|i| lines[i].to_string()));
    out.push(String::new());
    out.push(format!("--- Last {TAIL_LINES} lines ---"));
    out.extend(lines[total - TAIL_LINES..].iter().map(|line| line.to_string()));

    let mut text = out.join("\n");
    text.push('\n');
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_logs_pass_through() {
        let raw = "ok\nerror: x\n";
        assert_eq!(filter_check_log(raw, "checks.log"), raw);
    }

    /// Verifies that a long log keeps the matching line, its context and the
    /// final tail, and stays within the line budget.
    #[test]
    fn long_log_keeps_errors_context_and_tail() {
        let mut lines: Vec<String> = (0..1000).map(|i| format!("noise {i}")).collect();
        lines[100] = "error: mismatched types".to_string();
        let raw = lines.join("\n");

        let filtered = filter_check_log(&raw, ".fixloop/checks.log");
        assert!(filtered.starts_with(
            "=== FILTERED CHECK OUTPUT (full log: .fixloop/checks.log, 1000 lines) ==="
        ));
        assert!(filtered.contains("noise 97\nnoise 98\nnoise 99\nerror: mismatched types\nnoise 101"));
        assert!(!filtered.contains("noise 96\n"));
        assert!(filtered.contains("--- Last 80 lines ---"));
        assert!(filtered.trim_end().ends_with("noise 999"));
        assert!(filtered.lines().count() <= MAX_FILTERED_LINES);
    }

    #[test]
    fn flood_of_errors_is_capped() {
        let raw: String = (0..2000).map(|i| format!("FAILED test_{i}\n")).collect();
        let filtered = filter_check_log(&raw, "checks.log");
        assert!(filtered.lines().count() <= MAX_FILTERED_LINES);
        assert!(filtered.contains("FAILED test_1999"));
    }
}
