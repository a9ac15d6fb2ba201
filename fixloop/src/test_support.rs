//! Test-only fakes for the agent, the check command and the tracker, plus a
//! throwaway git repository.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::threads::{ReviewThread, ThreadComment};
use crate::io::check::{CheckRequest, CheckResult, CheckRunner};
use crate::io::executor::{AgentRequest, Executor};
use crate::io::interactive::{ClarifyRequest, Clarifier};
use crate::io::process::ExecOutcome;
use crate::io::tracker::{IssueTracker, PullRequest};

/// One scripted agent response and the files it writes before returning.
#[derive(Debug, Clone)]
pub struct ScriptedAgent {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// `(path relative to the request workdir, contents)`.
    pub writes: Vec<(String, String)>,
}

impl ScriptedAgent {
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            writes: Vec::new(),
        }
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
            writes: Vec::new(),
        }
    }

    /// Also write `contents` to `path` when this response is played.
    pub fn writing(mut self, path: &str, contents: &str) -> Self {
        self.writes.push((path.to_string(), contents.to_string()));
        self
    }
}

/// [`Executor`] that plays queued responses in order and records requests.
pub struct ScriptedExecutor {
    queue: RefCell<VecDeque<ScriptedAgent>>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedExecutor {
    pub fn new(responses: Vec<ScriptedAgent>) -> Self {
        Self {
            queue: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &AgentRequest) -> Result<ExecOutcome> {
        self.requests.borrow_mut().push(request.clone());
        let next = self
            .queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted executor exhausted"))?;
        for (path, contents) in &next.writes {
            let target = request.workdir.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, contents)
                .with_context(|| format!("scripted write {}", target.display()))?;
        }
        Ok(ExecOutcome {
            exit_code: next.exit_code,
            stdout: next.stdout,
            stderr: next.stderr,
            timed_out: false,
        })
    }
}

/// [`CheckRunner`] that returns queued `(exit_code, output)` pairs.
pub struct ScriptedCheckRunner {
    queue: RefCell<VecDeque<(i32, String)>>,
    runs: RefCell<u32>,
}

impl ScriptedCheckRunner {
    pub fn new(results: Vec<(i32, &str)>) -> Self {
        Self {
            queue: RefCell::new(
                results
                    .into_iter()
                    .map(|(code, out)| (code, out.to_string()))
                    .collect(),
            ),
            runs: RefCell::new(0),
        }
    }

    pub fn runs(&self) -> u32 {
        *self.runs.borrow()
    }
}

impl CheckRunner for ScriptedCheckRunner {
    fn run(&self, _request: &CheckRequest) -> Result<CheckResult> {
        *self.runs.borrow_mut() += 1;
        let (exit_code, output) = self
            .queue
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted check runner exhausted"))?;
        Ok(CheckResult { exit_code, output })
    }
}

/// [`IssueTracker`] with a fixed pull request and scripted thread lists.
///
/// Each fetch pops the next queued list; the last one repeats forever.
pub struct ScriptedTracker {
    pr: Option<PullRequest>,
    fetches: RefCell<VecDeque<Vec<ReviewThread>>>,
    last: RefCell<Vec<ReviewThread>>,
    fetch_count: RefCell<u32>,
    resolved: RefCell<Vec<String>>,
    refuse: BTreeSet<String>,
}

impl ScriptedTracker {
    pub fn new(fetches: Vec<Vec<ReviewThread>>) -> Self {
        Self {
            pr: Some(test_pull_request()),
            fetches: RefCell::new(fetches.into()),
            last: RefCell::new(Vec::new()),
            fetch_count: RefCell::new(0),
            resolved: RefCell::new(Vec::new()),
            refuse: BTreeSet::new(),
        }
    }

    /// A tracker that finds no pull request for the branch.
    pub fn without_pr() -> Self {
        Self {
            pr: None,
            ..Self::new(Vec::new())
        }
    }

    /// Make `mark_resolved` report failure for `id`.
    pub fn refusing(mut self, id: &str) -> Self {
        self.refuse.insert(id.to_string());
        self
    }

    /// Ids passed to `mark_resolved`, in call order.
    pub fn resolved(&self) -> Vec<String> {
        self.resolved.borrow().clone()
    }

    pub fn fetch_count(&self) -> u32 {
        *self.fetch_count.borrow()
    }
}

impl IssueTracker for ScriptedTracker {
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    fn locate(&self) -> Result<Option<PullRequest>> {
        Ok(self.pr.clone())
    }

    fn fetch_open_threads(&self, _pr: &PullRequest) -> Result<Vec<ReviewThread>> {
        *self.fetch_count.borrow_mut() += 1;
        if let Some(next) = self.fetches.borrow_mut().pop_front() {
            *self.last.borrow_mut() = next;
        }
        Ok(self.last.borrow().clone())
    }

    fn mark_resolved(&self, thread_id: &str) -> Result<bool> {
        self.resolved.borrow_mut().push(thread_id.to_string());
        Ok(!self.refuse.contains(thread_id))
    }
}

/// [`Clarifier`] that records prompts and optionally writes a file, as an
/// operator would.
pub struct ScriptedClarifier {
    prompts: RefCell<Vec<String>>,
    writes: Vec<(String, String)>,
}

impl ScriptedClarifier {
    pub fn new() -> Self {
        Self {
            prompts: RefCell::new(Vec::new()),
            writes: Vec::new(),
        }
    }

    pub fn writing(mut self, path: &str, contents: &str) -> Self {
        self.writes.push((path.to_string(), contents.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Default for ScriptedClarifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Clarifier for ScriptedClarifier {
    fn clarify(&self, request: &ClarifyRequest) -> Result<i32> {
        self.prompts.borrow_mut().push(request.prompt.clone());
        for (path, contents) in &self.writes {
            fs::write(request.workdir.join(path), contents)?;
        }
        Ok(0)
    }
}

pub fn test_pull_request() -> PullRequest {
    PullRequest {
        number: 7,
        url: "https://github.com/acme/app/pull/7".to_string(),
        owner: "acme".to_string(),
        repo: "app".to_string(),
    }
}

/// Unresolved thread with a single comment.
pub fn thread(id: &str, body: &str) -> ReviewThread {
    ReviewThread {
        id: id.to_string(),
        path: Some("src/lib.rs".to_string()),
        line: Some(1),
        comments: vec![ThreadComment {
            author: "reviewer".to_string(),
            body: body.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }],
    }
}

/// Temporary git repository with one commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q", "-b", "main"])?;
        repo.git(&["config", "user.email", "fixloop@example.com"])?;
        repo.git(&["config", "user.name", "fixloop"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        repo.write(".gitignore", ".fixloop/\n")?;
        repo.write("src/lib.rs", "pub fn answer() -> u32 {\n    41\n}\n")?;
        repo.commit("initial")?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel: &str, contents: &str) -> Result<()> {
        let target = self.path().join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, contents).with_context(|| format!("write {}", target.display()))
    }

    pub fn read(&self, rel: &str) -> Result<String> {
        let target = self.path().join(rel);
        fs::read_to_string(&target).with_context(|| format!("read {}", target.display()))
    }

    /// Stage everything and commit.
    pub fn commit(&self, message: &str) -> Result<()> {
        self.git(&["add", "-A"])?;
        self.git(&["commit", "-q", "-m", message])
    }

    pub fn git(&self, args: &[&str]) -> Result<()> {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !out.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&out.stderr).trim()
            ));
        }
        Ok(())
    }
}
