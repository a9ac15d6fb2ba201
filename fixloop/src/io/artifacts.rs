//! Run-scoped artifact files under `.fixloop/`.
//!
//! Every artifact has a declared role that fixes its lifecycle:
//! - historical files are append-only until compacted,
//! - iteration scratch files are removed at the start of every pass,
//! - run files are removed when a new run starts,
//! - rotated logs keep exactly one previous generation.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::compaction::{Compaction, CompactionPolicy, compact_text};
use crate::core::fingerprint::fingerprint;
use crate::core::safety::parse_id_lines;

pub const ARTIFACT_DIR: &str = ".fixloop";

/// Lifecycle of an artifact file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRole {
    /// Compacted on every pass.
    Historical,
    /// Removed at the start of every pass.
    Iteration,
    /// Removed at the start of every run.
    Run,
    /// Moved to `<name>.prev.log` at the start of every run.
    Rotated,
}

/// Every named artifact and its role.
pub const ARTIFACTS: &[(&str, ArtifactRole)] = &[
    ("review.md", ArtifactRole::Historical),
    ("build_history.md", ArtifactRole::Historical),
    ("run_timestamps.md", ArtifactRole::Historical),
    ("review_current.md", ArtifactRole::Iteration),
    ("review_recent.md", ArtifactRole::Iteration),
    ("checks.log", ArtifactRole::Iteration),
    ("checks_filtered.log", ArtifactRole::Iteration),
    ("changes.diff", ArtifactRole::Iteration),
    (".resolved_threads", ArtifactRole::Iteration),
    ("agent.log", ArtifactRole::Run),
    ("session.log", ArtifactRole::Run),
    (".checks_hashes", ArtifactRole::Run),
    (".threads_cache", ArtifactRole::Run),
    (".threads_cache_key", ArtifactRole::Run),
    (".start_rev", ArtifactRole::Run),
    (".threads_in_scope", ArtifactRole::Run),
    ("fixloop.log", ArtifactRole::Rotated),
];

/// Resolved artifact locations for one project root.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub root: PathBuf,
    pub dir: PathBuf,
    pub review: PathBuf,
    pub review_current: PathBuf,
    pub review_recent: PathBuf,
    pub build_history: PathBuf,
    pub checks_log: PathBuf,
    pub checks_filtered: PathBuf,
    pub checks_hashes: PathBuf,
    pub agent_log: PathBuf,
    pub run_log: PathBuf,
    pub session_log: PathBuf,
    pub threads_cache: PathBuf,
    pub threads_cache_key: PathBuf,
    pub start_rev: PathBuf,
    pub threads_in_scope: PathBuf,
    pub resolved_threads: PathBuf,
    pub changes_diff: PathBuf,
    pub run_timestamps: PathBuf,
    pub archive: PathBuf,
}

impl ArtifactPaths {
    pub fn new(root: &Path) -> Self {
        let dir = root.join(ARTIFACT_DIR);
        Self {
            root: root.to_path_buf(),
            review: dir.join("review.md"),
            review_current: dir.join("review_current.md"),
            review_recent: dir.join("review_recent.md"),
            build_history: dir.join("build_history.md"),
            checks_log: dir.join("checks.log"),
            checks_filtered: dir.join("checks_filtered.log"),
            checks_hashes: dir.join(".checks_hashes"),
            agent_log: dir.join("agent.log"),
            run_log: dir.join("fixloop.log"),
            session_log: dir.join("session.log"),
            threads_cache: dir.join(".threads_cache"),
            threads_cache_key: dir.join(".threads_cache_key"),
            start_rev: dir.join(".start_rev"),
            threads_in_scope: dir.join(".threads_in_scope"),
            resolved_threads: dir.join(".resolved_threads"),
            changes_diff: dir.join("changes.diff"),
            run_timestamps: dir.join("run_timestamps.md"),
            archive: dir.join("archive"),
            dir,
        }
    }

    /// `path` relative to the project root, as the agent sees it.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn with_role(&self, role: ArtifactRole) -> impl Iterator<Item = PathBuf> + '_ {
        ARTIFACTS
            .iter()
            .filter(move |(_, r)| *r == role)
            .map(|(name, _)| self.dir.join(name))
    }
}

/// `fixloop.log` -> `fixloop.prev.log`.
pub fn previous_generation(path: &Path) -> PathBuf {
    path.with_extension("prev.log")
}

/// File operations on the artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    paths: ArtifactPaths,
}

impl ArtifactStore {
    pub fn new(root: &Path) -> Self {
        Self {
            paths: ArtifactPaths::new(root),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.dir)
            .with_context(|| format!("create artifact dir {}", self.paths.dir.display()))
    }

    /// Copy every top-level artifact into `archive/<stamp>/`.
    ///
    /// Returns the archive directory, or `None` when there was nothing to copy.
    #[instrument(skip_all, fields(stamp))]
    pub fn archive(&self, stamp: &str) -> Result<Option<PathBuf>> {
        if !self.paths.dir.exists() {
            return Ok(None);
        }
        let target = self.paths.archive.join(stamp);
        let mut copied = 0usize;
        for entry in fs::read_dir(&self.paths.dir)
            .with_context(|| format!("read {}", self.paths.dir.display()))?
        {
            let entry = entry.context("read artifact dir entry")?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if copied == 0 {
                fs::create_dir_all(&target)
                    .with_context(|| format!("create archive dir {}", target.display()))?;
            }
            fs::copy(&path, target.join(entry.file_name()))
                .with_context(|| format!("archive {}", path.display()))?;
            copied += 1;
        }
        if copied == 0 {
            return Ok(None);
        }
        info!(copied, archive = %target.display(), "archived previous artifacts");
        Ok(Some(target))
    }

    /// Remove files that must not leak from a previous run and rotate the
    /// run log.
    pub fn reset_run(&self) -> Result<()> {
        for path in self.paths.with_role(ArtifactRole::Run) {
            self.remove(&path)?;
        }
        for path in self.paths.with_role(ArtifactRole::Rotated) {
            if !path.exists() {
                continue;
            }
            let previous = previous_generation(&path);
            fs::rename(&path, &previous).with_context(|| {
                format!("rotate {} to {}", path.display(), previous.display())
            })?;
            debug!(log = %previous.display(), "rotated previous run log");
        }
        self.reset_iteration()
    }

    /// Remove current-iteration scratch files.
    pub fn reset_iteration(&self) -> Result<()> {
        for path in self.paths.with_role(ArtifactRole::Iteration) {
            self.remove(&path)?;
        }
        Ok(())
    }

    pub fn read(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    pub fn write(&self, path: &Path, contents: &str) -> Result<()> {
        fs::write(path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn append(&self, path: &Path, contents: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open {}", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("append {}", path.display()))
    }

    /// Write a single-value artifact, refusing to overwrite it.
    pub fn write_once(&self, path: &Path, value: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .with_context(|| format!("{} is write-once for this run", path.display()))?;
        file.write_all(format!("{value}\n").as_bytes())
            .with_context(|| format!("write {}", path.display()))
    }

    pub fn read_single(&self, path: &Path) -> Result<Option<String>> {
        Ok(self
            .read(path)?
            .map(|text| text.trim().to_string())
            .filter(|value| !value.is_empty()))
    }

    pub fn remove(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }

    pub fn read_ids(&self, path: &Path) -> Result<BTreeSet<String>> {
        Ok(self
            .read(path)?
            .map(|text| parse_id_lines(&text))
            .unwrap_or_default())
    }

    pub fn write_ids(&self, path: &Path, ids: &BTreeSet<String>) -> Result<()> {
        let mut body = String::new();
        for id in ids {
            body.push_str(id);
            body.push('\n');
        }
        self.write(path, &body)
    }

    /// Cached content for `key`, if the stored key hash matches and the cache
    /// is non-empty.
    pub fn read_cache(&self, key: &str) -> Result<Option<String>> {
        let Some(stored) = self.read_single(&self.paths.threads_cache_key)? else {
            return Ok(None);
        };
        if stored != fingerprint(key.as_bytes()) {
            debug!("cache key mismatch");
            return Ok(None);
        }
        Ok(self
            .read(&self.paths.threads_cache)?
            .filter(|text| !text.trim().is_empty()))
    }

    pub fn write_cache(&self, key: &str, contents: &str) -> Result<()> {
        self.write(&self.paths.threads_cache, contents)?;
        self.write(
            &self.paths.threads_cache_key,
            &format!("{}\n", fingerprint(key.as_bytes())),
        )
    }

    /// Drop the key so the next read refetches.
    pub fn invalidate_cache(&self) -> Result<()> {
        self.remove(&self.paths.threads_cache_key)
    }

    /// Compact one artifact in place. Unchanged files are not rewritten.
    pub fn compact(
        &self,
        path: &Path,
        policy: &CompactionPolicy,
        force_emergency: bool,
    ) -> Result<Compaction> {
        let Some(text) = self.read(path)? else {
            return Ok(Compaction::Unchanged);
        };
        let result = compact_text(&text, policy, force_emergency);
        if let Compaction::Truncated {
            before_lines,
            after_lines,
            emergency,
            text,
        } = &result
        {
            self.write(path, text)?;
            if *emergency {
                warn!(
                    artifact = %self.paths.relative(path),
                    before_lines,
                    after_lines,
                    "emergency compaction"
                );
            } else {
                info!(
                    artifact = %self.paths.relative(path),
                    before_lines,
                    after_lines,
                    "compacted artifact"
                );
            }
        }
        Ok(result)
    }

    /// Compact every historical artifact.
    pub fn compact_history(&self, policy: &CompactionPolicy, force_emergency: bool) -> Result<()> {
        for path in self.paths.with_role(ArtifactRole::Historical) {
            self.compact(&path, policy, force_emergency)?;
        }
        Ok(())
    }

    /// Append the artifact directory to an existing `.gitignore` if missing.
    pub fn ensure_gitignored(&self) -> Result<bool> {
        let gitignore = self.paths.root.join(".gitignore");
        let Some(contents) = self.read(&gitignore)? else {
            return Ok(false);
        };
        let entry = format!("{ARTIFACT_DIR}/");
        let present = contents
            .lines()
            .map(str::trim)
            .any(|line| line == entry || line == ARTIFACT_DIR || line == format!("/{entry}"));
        if present {
            return Ok(false);
        }
        let mut addition = String::new();
        if !contents.is_empty() && !contents.ends_with('\n') {
            addition.push('\n');
        }
        addition.push_str(&entry);
        addition.push('\n');
        self.append(&gitignore, &addition)?;
        info!("added {entry} to .gitignore");
        Ok(true)
    }

    /// Guard used before anything else writes: the directory must be a directory.
    pub fn check_layout(&self) -> Result<()> {
        if self.paths.dir.exists() && !self.paths.dir.is_dir() {
            return Err(anyhow!(
                "{} exists but is not a directory",
                self.paths.dir.display()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        store.ensure_dir().expect("dir");
        (temp, store)
    }

    #[test]
    fn write_once_refuses_second_write() {
        let (_temp, store) = store();
        let path = store.paths().start_rev.clone();
        store.write_once(&path, "abc123").expect("first write");
        assert!(store.write_once(&path, "def456").is_err());
        assert_eq!(store.read_single(&path).expect("read"), Some("abc123".to_string()));
    }

    #[test]
    fn reset_iteration_removes_only_scratch_files() {
        let (_temp, store) = store();
        let p = store.paths().clone();
        store.write(&p.review_current, "issues").expect("write");
        store.write(&p.changes_diff, "diff").expect("write");
        store.write(&p.review, "history").expect("write");
        store.write(&p.checks_hashes, "h:1\n").expect("write");

        store.reset_iteration().expect("reset");
        assert!(!p.review_current.exists());
        assert!(!p.changes_diff.exists());
        assert!(p.review.exists());
        assert!(p.checks_hashes.exists());
    }

    #[test]
    fn reset_run_clears_hashes_and_start_rev() {
        let (_temp, store) = store();
        let p = store.paths().clone();
        store.write(&p.checks_hashes, "h:1\n").expect("write");
        store.write_once(&p.start_rev, "abc").expect("write");
        store.write(&p.build_history, "keep").expect("write");

        store.reset_run().expect("reset");
        assert!(!p.checks_hashes.exists());
        assert!(!p.start_rev.exists());
        assert!(p.build_history.exists());
    }

    /// Verifies the run log keeps one previous generation instead of growing.
    #[test]
    fn reset_run_rotates_run_log_and_drops_thread_cache() {
        let (_temp, store) = store();
        let p = store.paths().clone();
        let previous = previous_generation(&p.run_log);
        store.write(&previous, "two runs ago\n").expect("write");
        store.write(&p.run_log, "last run\n").expect("write");
        store.write_cache("acme/app/7", "[]").expect("cache");

        store.reset_run().expect("reset");
        assert!(!p.run_log.exists());
        assert_eq!(store.read(&previous).expect("read").as_deref(), Some("last run\n"));
        assert!(!p.threads_cache.exists());
        assert_eq!(store.read_cache("acme/app/7").expect("read"), None);

        store.reset_run().expect("reset without log");
        assert_eq!(store.read(&previous).expect("read").as_deref(), Some("last run\n"));
    }

    #[test]
    fn compact_history_covers_every_historical_artifact() {
        let (_temp, store) = store();
        let p = store.paths().clone();
        let policy = CompactionPolicy::default();
        let long: String = (0..170).map(|i| format!("{i}\n")).collect();
        for path in [&p.review, &p.build_history, &p.run_timestamps] {
            store.write(path, &long).expect("write");
        }
        store.write(&p.agent_log, &long).expect("write");

        store.compact_history(&policy, false).expect("compact");
        for path in [&p.review, &p.build_history, &p.run_timestamps] {
            let text = store.read(path).expect("read").expect("exists");
            assert_eq!(text.lines().count(), policy.tail_lines);
        }
        let agent_log = store.read(&p.agent_log).expect("read").expect("exists");
        assert_eq!(agent_log.lines().count(), 170);
    }

    #[test]
    fn ids_round_trip_through_files() {
        let (_temp, store) = store();
        let path = store.paths().threads_in_scope.clone();
        let ids: BTreeSet<String> = ["B", "A"].iter().map(|s| s.to_string()).collect();
        store.write_ids(&path, &ids).expect("write");
        assert_eq!(store.read(&path).expect("read").as_deref(), Some("A\nB\n"));
        assert_eq!(store.read_ids(&path).expect("read"), ids);
        assert!(store.read_ids(&store.paths().resolved_threads).expect("missing").is_empty());
    }

    /// Verifies the cache is only served for the key it was written under.
    #[test]
    fn cache_is_versioned_by_key_hash() {
        let (_temp, store) = store();
        store.write_cache("acme/app/7", "[1]").expect("write");
        assert_eq!(store.read_cache("acme/app/7").expect("read").as_deref(), Some("[1]"));
        assert_eq!(store.read_cache("acme/app/8").expect("read"), None);

        store.invalidate_cache().expect("invalidate");
        assert_eq!(store.read_cache("acme/app/7").expect("read"), None);
    }

    #[test]
    fn empty_cache_counts_as_miss() {
        let (_temp, store) = store();
        store.write_cache("k", "  \n").expect("write");
        assert_eq!(store.read_cache("k").expect("read"), None);
    }

    #[test]
    fn compact_rewrites_only_when_over_threshold() {
        let (_temp, store) = store();
        let policy = CompactionPolicy::default();
        let path = store.paths().review.clone();

        let short: String = (0..10).map(|i| format!("{i}\n")).collect();
        store.write(&path, &short).expect("write");
        assert_eq!(store.compact(&path, &policy, false).expect("compact"), Compaction::Unchanged);
        assert_eq!(store.read(&path).expect("read").as_deref(), Some(short.as_str()));

        let long: String = (0..170).map(|i| format!("{i}\n")).collect();
        store.write(&path, &long).expect("write");
        store.compact(&path, &policy, false).expect("compact");
        let after = store.read(&path).expect("read").expect("exists");
        assert_eq!(after.lines().count(), policy.tail_lines);
        assert!(long.ends_with(&after));
    }

    #[test]
    fn archive_copies_files_into_stamped_dir() {
        let (_temp, store) = store();
        store.write(&store.paths().review, "r").expect("write");
        store.write(&store.paths().checks_log, "c").expect("write");

        let target = store.archive("20260101_120000").expect("archive").expect("dir");
        assert!(target.ends_with("archive/20260101_120000"));
        assert_eq!(fs::read_to_string(target.join("review.md")).expect("read"), "r");
        assert!(target.join("checks.log").exists());
    }

    #[test]
    fn archive_of_empty_dir_is_none() {
        let (_temp, store) = store();
        assert_eq!(store.archive("x").expect("archive"), None);
    }

    #[test]
    fn gitignore_entry_added_once() {
        let (temp, store) = store();
        let gitignore = temp.path().join(".gitignore");
        fs::write(&gitignore, "target").expect("write");

        assert!(store.ensure_gitignored().expect("first"));
        assert!(!store.ensure_gitignored().expect("second"));
        assert_eq!(fs::read_to_string(&gitignore).expect("read"), "target\n.fixloop/\n");
    }

    #[test]
    fn gitignore_not_created_when_absent() {
        let (temp, store) = store();
        assert!(!store.ensure_gitignored().expect("ensure"));
        assert!(!temp.path().join(".gitignore").exists());
    }
}
