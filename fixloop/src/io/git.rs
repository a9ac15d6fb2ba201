//! Git adapter for the loop.
//!
//! Git is only queried: current revision, diffs against the starting revision,
//! and the working-tree state used for progress detection. The loop never
//! commits or checks out on its own.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::core::context::is_artifact_path;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True if `workdir` is inside a git work tree.
    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Full SHA of HEAD, or `None` when the repository has no commits yet.
    #[instrument(skip_all)]
    pub fn head_revision(&self) -> Result<Option<String>> {
        let out = self.run(&["rev-parse", "HEAD"])?;
        if !out.status.success() {
            warn!("HEAD does not resolve; rollback reference unavailable");
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&out.stdout).trim().to_string();
        debug!(sha = %sha, "head revision");
        Ok(Some(sha))
    }

    /// Current branch name, `None` on detached HEAD.
    pub fn current_branch(&self) -> Result<Option<String>> {
        let out = self.run_capture(&["branch", "--show-current"])?;
        let name = out.trim();
        Ok((!name.is_empty()).then(|| name.to_string()))
    }

    /// Unified diff of the working tree against `base` (HEAD when `None`).
    pub fn diff_since(&self, base: Option<&str>) -> Result<String> {
        self.run_capture(&["diff", base.unwrap_or("HEAD")])
    }

    /// `git diff --stat` of the working tree against `base` (HEAD when `None`).
    pub fn diff_stat_since(&self, base: Option<&str>) -> Result<String> {
        self.run_capture(&["diff", "--stat", base.unwrap_or("HEAD")])
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Working-tree status with entries under `artifact_dir` removed.
    pub fn status_excluding(&self, artifact_dir: &str) -> Result<Vec<StatusEntry>> {
        Ok(self
            .status_porcelain()?
            .into_iter()
            .filter(|entry| !is_artifact_path(Path::new(&entry.path), artifact_dir))
            .collect())
    }

    /// True if nothing outside `artifact_dir` differs from HEAD.
    pub fn is_clean_except(&self, artifact_dir: &str) -> Result<bool> {
        Ok(self.status_excluding(artifact_dir)?.is_empty())
    }

    /// Untracked, non-ignored files.
    pub fn untracked_files(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&["ls-files", "--others", "--exclude-standard"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Files changed since `base` plus untracked files, sorted, artifact dir excluded.
    #[instrument(skip_all)]
    pub fn changed_files(&self, base: Option<&str>, artifact_dir: &str) -> Result<Vec<String>> {
        let mut files = BTreeSet::new();
        let diffed = self.run(&["diff", "--name-only", base.unwrap_or("HEAD")])?;
        if diffed.status.success() {
            files.extend(
                String::from_utf8_lossy(&diffed.stdout)
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        files.extend(self.untracked_files()?);
        let files: Vec<String> = files
            .into_iter()
            .filter(|path| !is_artifact_path(Path::new(path), artifact_dir))
            .collect();
        debug!(count = files.len(), "changed files");
        Ok(files)
    }

    /// Hash of the working-tree state outside `artifact_dir`: status entries,
    /// the diff against HEAD, and untracked file contents.
    pub fn tree_fingerprint(&self, artifact_dir: &str) -> Result<String> {
        let mut hasher = Sha256::new();
        let entries = self.status_excluding(artifact_dir)?;
        for entry in &entries {
            hasher.update(format!("{} {}\n", entry.code, entry.path).as_bytes());
        }
        let exclude = format!(":(exclude){artifact_dir}");
        let diff = self.run(&["diff", "HEAD", "--", ".", &exclude])?;
        if diff.status.success() {
            hasher.update(&diff.stdout);
        }
        for entry in entries.iter().filter(|e| e.is_untracked()) {
            let path = self.workdir.join(&entry.path);
            if let Ok(bytes) = fs::read(&path) {
                hasher.update(&bytes);
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: unquote(path.trim()),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry {
        code,
        path: unquote(&path),
    })
}

/// Git quotes paths with spaces or special characters.
fn unquote(path: &str) -> String {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
        assert!(e.is_untracked());
    }

    #[test]
    fn parses_modified_line() {
        let e = parse_status_line(" M src/main.rs").expect("parse");
        assert_eq!(e.code, " M");
        assert_eq!(e.path, "src/main.rs");
        assert!(!e.is_untracked());
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn strips_quotes_from_paths_with_spaces() {
        let e = parse_status_line("?? \"my file.txt\"").expect("parse");
        assert_eq!(e.path, "my file.txt");
    }
}
