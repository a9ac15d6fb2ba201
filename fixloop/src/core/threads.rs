//! Review-thread selection and rendering for tracker resolution mode.

use serde::{Deserialize, Serialize};

use crate::core::fingerprint::fingerprint_set;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadComment {
    pub author: String,
    pub body: String,
    /// RFC 3339 timestamp; compared as a string.
    pub created_at: String,
}

/// An unresolved review thread as fetched from the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewThread {
    pub id: String,
    pub path: Option<String>,
    pub line: Option<u64>,
    pub comments: Vec<ThreadComment>,
}

impl ReviewThread {
    fn latest_activity(&self) -> &str {
        self.comments
            .iter()
            .map(|c| c.created_at.as_str())
            .max()
            .unwrap_or("")
    }
}

/// Threads kept for this run and the ids left out by the limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSelection {
    pub kept: Vec<ReviewThread>,
    pub skipped: Vec<String>,
}

/// Keep at most `max` threads, most recently active first.
///
/// Ties on activity are broken by id so the choice is stable between fetches.
pub fn select_threads(mut threads: Vec<ReviewThread>, max: usize) -> ThreadSelection {
    if threads.len() <= max {
        return ThreadSelection {
            kept: threads,
            skipped: Vec::new(),
        };
    }
    threads.sort_by(|a, b| {
        (b.latest_activity(), b.id.as_str()).cmp(&(a.latest_activity(), a.id.as_str()))
    });
    let skipped = threads.split_off(max).into_iter().map(|t| t.id).collect();
    ThreadSelection {
        kept: threads,
        skipped,
    }
}

/// Render threads as the agent sees them.
///
/// Continuation lines of a comment are indented so no body line can pose as
/// an `ID:` line.
pub fn format_threads(threads: &[ReviewThread]) -> String {
    let mut out = Vec::new();
    for (i, thread) in threads.iter().enumerate() {
        out.push(format!("--- Thread #{} ---", i + 1));
        out.push(format!("ID: {}", thread.id));
        out.push(format!("File: {}", thread.path.as_deref().unwrap_or("N/A")));
        if let Some(line) = thread.line {
            out.push(format!("Line: {line}"));
        }
        for comment in &thread.comments {
            let mut lines = comment.body.lines();
            out.push(format!("[{}]: {}", comment.author, lines.next().unwrap_or("")));
            out.extend(lines.map(|line| format!("    {line}")));
        }
        out.push(String::new());
    }
    out.join("\n")
}

/// Fingerprint of the outstanding thread ids.
pub fn outstanding_fingerprint(threads: &[ReviewThread]) -> String {
    fingerprint_set(threads.iter().map(|t| t.id.as_str()))
}
