//! Local review phase: diff the run's changes, ask the agent for a verdict.

use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::Local;
use tracing::{info, instrument, warn};

use crate::core::context::is_review_excluded;
use crate::core::review::{NO_ISSUES, parse_stdout_verdict, parse_verdict};
use crate::core::types::{FailureClass, Verdict};
use crate::io::agent::AgentInvoker;
use crate::io::artifacts::{ARTIFACT_DIR, ArtifactStore};
use crate::io::config::FixloopConfig;
use crate::io::executor::{AgentRequest, Executor, REVIEW_TOOLS};
use crate::io::git::Git;
use crate::io::prompt::{PromptEngine, ReviewPrompt};

/// Result of one review pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    /// Raw verdict; the ambiguity policy is applied by the caller.
    pub verdict: Verdict,
    pub failure: Option<FailureClass>,
    pub context_overflow: bool,
    /// Files the review covered.
    pub files: Vec<String>,
}

/// Everything the review phase reads from.
pub struct ReviewInputs<'a> {
    pub store: &'a ArtifactStore,
    pub git: &'a Git,
    pub prompts: &'a PromptEngine,
    pub config: &'a FixloopConfig,
    pub start_rev: Option<&'a str>,
    pub iteration: u32,
}

/// Review all changes since the starting revision.
///
/// An empty change set is clean without an agent call. The verdict text is
/// left in `review_current.md` and appended to the review history.
#[instrument(skip_all, fields(iteration = inputs.iteration))]
pub fn run_local_review<E: Executor>(
    invoker: &mut AgentInvoker<'_, E>,
    inputs: &ReviewInputs<'_>,
) -> Result<ReviewOutcome> {
    let store = inputs.store;
    let paths = store.paths();
    let files: Vec<String> = inputs
        .git
        .changed_files(inputs.start_rev, ARTIFACT_DIR)?
        .into_iter()
        .filter(|path| !is_review_excluded(path))
        .collect();

    if files.is_empty() {
        info!("no reviewable changes since start; skipping review");
        store.write(&paths.review_current, &format!("{NO_ISSUES}\n"))?;
        append_review_entry(store, inputs.iteration, NO_ISSUES)?;
        return Ok(ReviewOutcome {
            verdict: Verdict::NoIssues,
            failure: None,
            context_overflow: false,
            files,
        });
    }

    let diff = build_review_diff(inputs.git, inputs.start_rev, &files)?;
    store.write(&paths.changes_diff, &diff)?;
    let diff_path = paths.relative(&paths.changes_diff);
    let diff_attached = diff.len() as u64 <= inputs.config.auto_attach_threshold_bytes;
    if !diff_attached {
        info!(bytes = diff.len(), "diff too large to attach; agent reads it on demand");
    }

    let prompt = inputs.prompts.render_review(&ReviewPrompt {
        iteration: inputs.iteration,
        diff_path: diff_path.clone(),
        diff_attached,
        changed_files: files.clone(),
        review_file: paths.relative(&paths.review_current),
    })?;
    let mut request = AgentRequest::new(&paths.root, prompt, REVIEW_TOOLS);
    request.model = inputs.config.agent.model.clone();
    request.timeout = inputs.config.agent_timeout();
    request.output_limit_bytes = inputs.config.output_limit_bytes;
    if diff_attached {
        request.attachments.push(diff_path);
    }

    let invocation = invoker.invoke_safe(&request)?;
    if !invocation.succeeded() {
        warn!("review agent failed; verdict is ambiguous");
        append_review_entry(store, inputs.iteration, "_Review agent failed._")?;
        return Ok(ReviewOutcome {
            verdict: Verdict::AmbiguousLegacy(String::new()),
            failure: invocation.failure,
            context_overflow: invocation.context_overflow,
            files,
        });
    }

    let verdict = match store.read(&paths.review_current)? {
        Some(text) if !text.trim().is_empty() => parse_verdict(&text),
        _ => {
            warn!("review file missing or empty; falling back to agent output");
            parse_stdout_verdict(&invocation.outcome.stdout)
        }
    };
    let text = match &verdict {
        Verdict::NoIssues => NO_ISSUES.to_string(),
        Verdict::IssuesFound(text) | Verdict::AmbiguousLegacy(text) => text.clone(),
    };
    // The resolve phase reads findings from the review file.
    store.write(&paths.review_current, &format!("{text}\n"))?;
    append_review_entry(store, inputs.iteration, &text)?;
    info!(verdict = verdict_label(&verdict), "review complete");
    Ok(ReviewOutcome {
        verdict,
        failure: None,
        context_overflow: false,
        files,
    })
}

pub fn append_review_entry(store: &ArtifactStore, iteration: u32, body: &str) -> Result<()> {
    let body = if body.trim().is_empty() {
        "_Empty review._"
    } else {
        body.trim()
    };
    store.append(
        &store.paths().review,
        &format!(
            "## Iteration {iteration} - Review ({})\n\n{body}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        ),
    )
}

fn verdict_label(verdict: &Verdict) -> &'static str {
    match verdict {
        Verdict::NoIssues => "no-issues",
        Verdict::IssuesFound(_) => "issues-found",
        Verdict::AmbiguousLegacy(_) => "ambiguous",
    }
}

/// Diff of `files` against `base` plus new-file diffs for untracked files.
pub fn build_review_diff(git: &Git, base: Option<&str>, files: &[String]) -> Result<String> {
    let mut diff = strip_excluded_sections(&git.diff_since(base)?);
    let untracked = git.untracked_files()?;
    for path in files.iter().filter(|f| untracked.contains(f)) {
        diff.push_str(&untracked_file_diff(git.workdir(), path));
    }
    Ok(diff)
}

/// Drop per-file sections of a unified diff whose path is review-excluded.
fn strip_excluded_sections(diff: &str) -> String {
    let mut out = String::new();
    let mut keep = true;
    for line in diff.split_inclusive('\n') {
        if let Some(header) = line.strip_prefix("diff --git ") {
            let path = header
                .split_whitespace()
                .last()
                .and_then(|b| b.strip_prefix("b/"))
                .unwrap_or_default();
            keep = !is_review_excluded(path);
        }
        if keep {
            out.push_str(line);
        }
    }
    out
}

fn untracked_file_diff(root: &Path, path: &str) -> String {
    let Ok(bytes) = fs::read(root.join(path)) else {
        return String::new();
    };
    let Ok(text) = String::from_utf8(bytes) else {
        return format!("diff --git a/{path} b/{path}\nnew file mode 100644\nBinary files /dev/null and b/{path} differ\n");
    };
    let lines: Vec<&str> = text.lines().collect();
    let mut out = format!(
        "diff --git a/{path} b/{path}\nnew file mode 100644\n--- /dev/null\n+++ b/{path}\n@@ -0,0 +1,{} @@\n",
        lines.len()
    );
    for line in lines {
        out.push('+');
        out.push_str(line);
        out.push('\n');
    }
    out
}
