//! Oscillation detection over check-output fingerprints.
//!
//! The history is an append-only list of `fingerprint:iteration` lines. A
//! fingerprint that already appears in the history means the last fix did not
//! change the failure at all.

use crate::core::fingerprint::fingerprint;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub fingerprint: String,
    pub iteration: u32,
}

impl HistoryEntry {
    /// Serialized form, one entry per line.
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.fingerprint, self.iteration)
    }
}

/// In-memory view of the fingerprint history file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OscillationHistory {
    entries: Vec<HistoryEntry>,
}

impl OscillationHistory {
    /// Parse the on-disk representation. Malformed lines are skipped.
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(|line| {
                let (fp, iter) = line.trim().rsplit_once(':')?;
                let iteration = iter.parse().ok()?;
                if fp.is_empty() {
                    return None;
                }
                Some(HistoryEntry {
                    fingerprint: fp.to_string(),
                    iteration,
                })
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Record the output of `iteration` and report the most recent earlier
    /// iteration with identical output, if any.
    ///
    /// The entry is appended whether or not it matched. The returned entry is
    /// the one the caller must persist.
    pub fn record_and_check(&mut self, iteration: u32, raw_output: &[u8]) -> (HistoryEntry, Option<u32>) {
        let current = fingerprint(raw_output);
        let previous = self
            .entries
            .iter()
            .rev()
            .find(|entry| entry.fingerprint == current)
            .map(|entry| entry.iteration);
        let entry = HistoryEntry {
            fingerprint: current,
            iteration,
        };
        self.entries.push(entry.clone());
        (entry, previous)
    }
}

/// Advisory text injected into the next fix prompt after a repeat.
pub fn oscillation_warning(previous_iteration: u32) -> String {
    format!(
        "WARNING: Check output is IDENTICAL to iteration {previous_iteration}. \
         You are going in circles. The previous approach did not change the result. \
         You MUST try a fundamentally DIFFERENT strategy."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_is_never_a_repeat() {
        let mut history = OscillationHistory::default();
        let (_, previous) = history.record_and_check(1, b"error: boom");
        assert_eq!(previous, None);
    }

    #[test]
    fn identical_output_reports_latest_matching_iteration() {
        let mut history = OscillationHistory::default();
        history.record_and_check(1, b"same");
        history.record_and_check(2, b"different");
        history.record_and_check(3, b"same");
        let (_, previous) = history.record_and_check(4, b"same");
        assert_eq!(previous, Some(3));
        assert_eq!(history.entries().len(), 4);
    }

    #[test]
    fn distinct_outputs_never_repeat() {
        let mut history = OscillationHistory::default();
        for (i, out) in ["a", "b", "c", "d"].iter().enumerate() {
            let (_, previous) = history.record_and_check(i as u32 + 1, out.as_bytes());
            assert_eq!(previous, None);
        }
    }

    #[test]
    fn parse_reads_back_serialized_lines_and_skips_garbage() {
        let mut history = OscillationHistory::default();
        let (entry, _) = history.record_and_check(7, b"out");
        let text = format!("{}\nnot-an-entry\n:3\nabc:x\n", entry.to_line());

        let parsed = OscillationHistory::parse(&text);
        assert_eq!(parsed.entries(), &[entry]);
    }

    #[test]
    fn repeat_is_detected_across_a_reload() {
        let mut first = OscillationHistory::default();
        let (entry, _) = first.record_and_check(1, b"same failure");

        let mut reloaded = OscillationHistory::parse(&format!("{}\n", entry.to_line()));
        let (_, previous) = reloaded.record_and_check(2, b"same failure");
        assert_eq!(previous, Some(1));
    }

    #[test]
    fn warning_names_previous_iteration() {
        assert!(oscillation_warning(4).contains("IDENTICAL to iteration 4"));
    }
}
