//! Issue-tracker adapter over the GitHub CLI.
//!
//! The loop only needs three things from the tracker: which pull request the
//! branch belongs to, its unresolved review threads, and a way to resolve one
//! thread. All of it goes through `gh`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::core::threads::{ReviewThread, ThreadComment};
use crate::io::git::Git;
use crate::io::process::{CommandLine, ExecOutcome, execute, find_executable};

const OUTPUT_LIMIT_BYTES: usize = 5_000_000;

const THREADS_QUERY: &str = "query($owner: String!, $repo: String!, $number: Int!) { \
    repository(owner: $owner, name: $repo) { pullRequest(number: $number) { \
    reviewThreads(first: 100) { nodes { isResolved id path line \
    comments(last: 10) { nodes { author { login } body createdAt } } } } } } }";

const RESOLVE_MUTATION: &str = "mutation($threadId: ID!) { \
    resolveReviewThread(input: {threadId: $threadId}) { thread { id } } }";

/// Pull request the current branch belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub url: String,
    pub owner: String,
    pub repo: String,
}

impl PullRequest {
    /// Compound key the thread cache is versioned by.
    pub fn cache_key(&self) -> String {
        format!("{}/{}/{}", self.owner, self.repo, self.number)
    }

    pub fn label(&self) -> String {
        format!("#{} ({})", self.number, self.url)
    }
}

pub trait IssueTracker {
    /// Fail when the tracker cannot be used at all (missing CLI, no auth).
    fn preflight(&self) -> Result<()>;
    /// Pull request for the current branch, if any.
    fn locate(&self) -> Result<Option<PullRequest>>;
    /// Unresolved review threads of `pr`.
    fn fetch_open_threads(&self, pr: &PullRequest) -> Result<Vec<ReviewThread>>;
    /// Resolve one thread. `Ok(false)` when the tracker refused.
    fn mark_resolved(&self, thread_id: &str) -> Result<bool>;
}

/// [`IssueTracker`] backed by the `gh` CLI.
#[derive(Debug, Clone)]
pub struct GhTracker {
    workdir: PathBuf,
    timeout: Duration,
}

impl GhTracker {
    pub fn new(workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workdir: workdir.into(),
            timeout,
        }
    }

    fn gh(&self, args: &[&str]) -> Result<ExecOutcome> {
        let mut argv = vec!["gh".to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        execute(
            &CommandLine::Argv(argv),
            &self.workdir,
            self.timeout,
            OUTPUT_LIMIT_BYTES,
        )
        .with_context(|| format!("run gh {}", args.first().copied().unwrap_or_default()))
    }
}

impl IssueTracker for GhTracker {
    fn preflight(&self) -> Result<()> {
        if find_executable("gh", &self.workdir).is_none() {
            return Err(anyhow!("gh CLI not found on PATH"));
        }
        let out = self.gh(&["auth", "status"])?;
        if !out.success() {
            return Err(anyhow!("gh is not authenticated: {}", out.stderr.trim()));
        }
        Ok(())
    }

    #[instrument(skip_all)]
    fn locate(&self) -> Result<Option<PullRequest>> {
        let Some(branch) = Git::new(&self.workdir).current_branch()? else {
            warn!("detached HEAD; no pull request to review");
            return Ok(None);
        };
        let out = self.gh(&[
            "pr",
            "view",
            &branch,
            "--json",
            "number,url,headRepository,headRepositoryOwner",
        ])?;
        if !out.success() {
            info!(branch = %branch, "no pull request for branch");
            return Ok(None);
        }
        let pr = parse_pr_view(&out.stdout)
            .with_context(|| format!("parse gh pr view output for {branch}"))?;
        debug!(number = pr.number, "located pull request");
        Ok(Some(pr))
    }

    #[instrument(skip_all, fields(pr = pr.number))]
    fn fetch_open_threads(&self, pr: &PullRequest) -> Result<Vec<ReviewThread>> {
        let query = format!("query={THREADS_QUERY}");
        let owner = format!("owner={}", pr.owner);
        let repo = format!("repo={}", pr.repo);
        let number = format!("number={}", pr.number);
        let out = self.gh(&[
            "api", "graphql", "-f", &query, "-F", &owner, "-F", &repo, "-F", &number,
        ])?;
        if !out.success() {
            return Err(anyhow!("fetch review threads failed: {}", out.stderr.trim()));
        }
        parse_threads_response(&out.stdout).context("parse review threads response")
    }

    fn mark_resolved(&self, thread_id: &str) -> Result<bool> {
        let query = format!("query={RESOLVE_MUTATION}");
        let id = format!("threadId={thread_id}");
        let out = self.gh(&["api", "graphql", "-f", &query, "-F", &id])?;
        if !out.success() {
            warn!(thread_id, exit_code = out.exit_code, "failed to resolve thread");
        }
        Ok(out.success())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrView {
    number: u64,
    url: String,
    head_repository: Named,
    head_repository_owner: Login,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

#[derive(Deserialize)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize)]
struct GqlResponse {
    data: GqlData,
}

#[derive(Deserialize)]
struct GqlData {
    repository: GqlRepository,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlRepository {
    pull_request: GqlPullRequest,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlPullRequest {
    review_threads: Nodes<GqlThread>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlThread {
    id: String,
    is_resolved: bool,
    path: Option<String>,
    line: Option<u64>,
    comments: Nodes<GqlComment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlComment {
    author: Option<Login>,
    #[serde(default)]
    body: Option<String>,
    created_at: String,
}

fn parse_pr_view(json: &str) -> Result<PullRequest> {
    let view: PrView = serde_json::from_str(json)?;
    if view.url.is_empty() {
        return Err(anyhow!("pull request url is empty"));
    }
    Ok(PullRequest {
        number: view.number,
        url: view.url,
        owner: view.head_repository_owner.login,
        repo: view.head_repository.name,
    })
}

/// Unresolved threads from a `reviewThreads` GraphQL response.
fn parse_threads_response(json: &str) -> Result<Vec<ReviewThread>> {
    let response: GqlResponse = serde_json::from_str(json)?;
    Ok(response
        .data
        .repository
        .pull_request
        .review_threads
        .nodes
        .into_iter()
        .filter(|thread| !thread.is_resolved)
        .map(|thread| ReviewThread {
            id: thread.id,
            path: thread.path,
            line: thread.line,
            comments: thread
                .comments
                .nodes
                .into_iter()
                .map(|c| ThreadComment {
                    author: c.author.map_or_else(|| "unknown".to_string(), |a| a.login),
                    body: c.body.unwrap_or_default(),
                    created_at: c.created_at,
                })
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pr_view_json() {
        let pr = parse_pr_view(
            r#"{"number":42,"url":"https://github.com/acme/app/pull/42",
                "headRepository":{"name":"app"},"headRepositoryOwner":{"login":"acme"}}"#,
        )
        .expect("parse");
        assert_eq!(pr.cache_key(), "acme/app/42");
        assert_eq!(pr.label(), "#42 (https://github.com/acme/app/pull/42)");
    }

    #[test]
    fn rejects_pr_view_without_repository() {
        assert!(parse_pr_view(r#"{"number":1,"url":"u"}"#).is_err());
    }

    /// Verifies resolved threads are dropped and missing authors are named.
    #[test]
    fn parses_threads_keeping_unresolved() {
        let json = r#"{"data":{"repository":{"pullRequest":{"reviewThreads":{"nodes":[
            {"id":"T1","isResolved":false,"path":"src/a.rs","line":3,
             "comments":{"nodes":[{"author":{"login":"rev"},"body":"fix","createdAt":"2026-01-01T00:00:00Z"}]}},
            {"id":"T2","isResolved":true,"path":null,"line":null,"comments":{"nodes":[]}},
            {"id":"T3","isResolved":false,"path":null,"line":null,
             "comments":{"nodes":[{"author":null,"body":"ghost","createdAt":"2026-01-02T00:00:00Z"}]}}
        ]}}}}}"#;
        let threads = parse_threads_response(json).expect("parse");
        let ids: Vec<&str> = threads.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["T1", "T3"]);
        assert_eq!(threads[0].line, Some(3));
        assert_eq!(threads[1].comments[0].author, "unknown");
    }
}
