//! Pull-request thread mode: fetch outstanding threads, fix them, resolve
//! only those the run was asked to handle.
//!
//! The set of threads in scope is persisted the first time any are fetched.
//! Every claim the agent makes is intersected with that file before anything
//! is resolved on the tracker.

use std::collections::BTreeSet;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::safety::{GateDecision, gate};
use crate::core::threads::{ReviewThread, select_threads};
use crate::io::artifacts::ArtifactStore;
use crate::io::tracker::{IssueTracker, PullRequest};

/// Threads the loop should work on this iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outstanding {
    pub pr: PullRequest,
    pub threads: Vec<ReviewThread>,
    /// True on the fetch that established the scope.
    pub scope_established: bool,
}

/// What happened to the agent's resolution claims.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolutionReport {
    pub claimed: BTreeSet<String>,
    pub decision: GateDecision,
    /// Ids the tracker confirmed as resolved.
    pub resolved: Vec<String>,
}

pub struct ThreadSession<'a> {
    tracker: &'a dyn IssueTracker,
    store: &'a ArtifactStore,
    max_threads: usize,
    pr: Option<Option<PullRequest>>,
}

impl<'a> ThreadSession<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, store: &'a ArtifactStore, max_threads: usize) -> Self {
        Self {
            tracker,
            store,
            max_threads,
            pr: None,
        }
    }

    /// Pull request for the branch, looked up once per run.
    pub fn pull_request(&mut self) -> Result<Option<PullRequest>> {
        if let Some(pr) = &self.pr {
            return Ok(pr.clone());
        }
        let pr = self.tracker.locate()?;
        match &pr {
            Some(pr) => info!(pr = %pr.label(), "reviewing pull request threads"),
            None => info!("no pull request for this branch; using local review"),
        }
        self.pr = Some(pr.clone());
        Ok(pr)
    }

    /// In-scope unresolved threads, or `None` when there is no pull request
    /// or nothing left to do.
    #[instrument(skip_all)]
    pub fn outstanding(&mut self) -> Result<Option<Outstanding>> {
        let Some(pr) = self.pull_request()? else {
            return Ok(None);
        };
        let fetched = self.fetch_limited(&pr)?;
        let paths = self.store.paths();

        let mut scope_established = false;
        let scope = match self.scope()? {
            Some(scope) => scope,
            None if fetched.is_empty() => return Ok(None),
            None => {
                let ids: BTreeSet<String> = fetched.iter().map(|t| t.id.clone()).collect();
                self.store.write_ids(&paths.threads_in_scope, &ids)?;
                info!(count = ids.len(), "thread scope established");
                scope_established = true;
                ids
            }
        };

        let (threads, ignored): (Vec<_>, Vec<_>) =
            fetched.into_iter().partition(|t| scope.contains(&t.id));
        if !ignored.is_empty() {
            let ids: Vec<&str> = ignored.iter().map(|t| t.id.as_str()).collect();
            info!(?ids, "ignoring threads opened after scope was set");
        }
        if threads.is_empty() {
            return Ok(None);
        }
        Ok(Some(Outstanding {
            pr,
            threads,
            scope_established,
        }))
    }

    /// Persisted scope, if established.
    pub fn scope(&self) -> Result<Option<BTreeSet<String>>> {
        let path = &self.store.paths().threads_in_scope;
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.store.read_ids(path)?))
    }

    /// Gate the agent's claims against the persisted scope and resolve the
    /// safe ones. The claim file is cleared and the cache invalidated.
    #[instrument(skip_all)]
    pub fn resolve_claimed(&mut self) -> Result<ResolutionReport> {
        let paths = self.store.paths();
        let claimed = self.store.read_ids(&paths.resolved_threads)?;
        let scope = self.scope()?.unwrap_or_default();
        let decision = gate(&scope, &claimed);
        if !decision.discarded.is_empty() {
            warn!(
                discarded = ?decision.discarded,
                "discarding resolution claims outside the thread scope"
            );
        }

        let mut resolved = Vec::new();
        for id in &decision.safe {
            if self.tracker.mark_resolved(id)? {
                debug!(thread_id = %id, "resolved thread");
                resolved.push(id.clone());
            }
        }
        if !decision.safe.is_empty() {
            info!(
                claimed = claimed.len(),
                resolved = resolved.len(),
                "resolved review threads"
            );
        }

        self.store.remove(&paths.resolved_threads)?;
        self.store.invalidate_cache()?;
        Ok(ResolutionReport {
            claimed,
            decision,
            resolved,
        })
    }

    fn fetch_limited(&self, pr: &PullRequest) -> Result<Vec<ReviewThread>> {
        let key = pr.cache_key();
        if let Some(cached) = self.store.read_cache(&key)? {
            match serde_json::from_str::<Vec<ReviewThread>>(&cached) {
                Ok(threads) => {
                    debug!(count = threads.len(), "using cached threads");
                    return Ok(threads);
                }
                Err(err) => warn!(%err, "thread cache unreadable; refetching"),
            }
        }
        let fetched = self.tracker.fetch_open_threads(pr)?;
        let selection = select_threads(fetched, self.max_threads);
        if !selection.skipped.is_empty() {
            warn!(
                limit = self.max_threads,
                skipped = ?selection.skipped,
                "more unresolved threads than the limit; oldest left for a later run"
            );
        }
        self.store
            .write_cache(&key, &serde_json::to_string(&selection.kept)?)?;
        Ok(selection.kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTracker, thread};

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        store.ensure_dir().expect("dir");
        (temp, store)
    }

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_pull_request_means_nothing_outstanding() {
        let (_temp, store) = store();
        let tracker = ScriptedTracker::without_pr();
        let mut session = ThreadSession::new(&tracker, &store, 5);
        assert_eq!(session.outstanding().expect("outstanding"), None);
        assert_eq!(session.scope().expect("scope"), None);
    }

    /// Verifies later threads never widen the persisted scope.
    #[test]
    fn scope_is_written_once() {
        let (_temp, store) = store();
        let tracker = ScriptedTracker::new(vec![
            vec![thread("A", "a")],
            vec![thread("A", "a"), thread("Z", "new")],
        ]);
        let mut session = ThreadSession::new(&tracker, &store, 5);

        let first = session.outstanding().expect("first").expect("threads");
        assert!(first.scope_established);
        store.invalidate_cache().expect("invalidate");

        let second = session.outstanding().expect("second").expect("threads");
        assert!(!second.scope_established);
        assert_eq!(second.threads.len(), 1);
        assert_eq!(session.scope().expect("scope"), Some(ids(&["A"])));
    }

    #[test]
    fn cached_threads_skip_the_tracker() {
        let (_temp, store) = store();
        let tracker = ScriptedTracker::new(vec![vec![thread("A", "a")]]);
        let mut session = ThreadSession::new(&tracker, &store, 5);
        session.outstanding().expect("first");
        session.outstanding().expect("second");
        assert_eq!(tracker.fetch_count(), 1);
    }

    #[test]
    fn limit_keeps_max_threads() {
        let (_temp, store) = store();
        let threads = (0..7).map(|i| thread(&format!("T{i}"), "x")).collect();
        let tracker = ScriptedTracker::new(vec![threads]);
        let mut session = ThreadSession::new(&tracker, &store, 5);
        let outstanding = session.outstanding().expect("fetch").expect("threads");
        assert_eq!(outstanding.threads.len(), 5);
        assert_eq!(session.scope().expect("scope").expect("set").len(), 5);
    }

    /// Verifies a claim outside the scope is never resolved.
    #[test]
    fn claims_are_gated_by_scope() {
        let (_temp, store) = store();
        let tracker = ScriptedTracker::new(vec![vec![
            thread("A", "a"),
            thread("B", "b"),
            thread("C", "c"),
        ]]);
        let mut session = ThreadSession::new(&tracker, &store, 5);
        session.outstanding().expect("fetch");
        store
            .write(&store.paths().resolved_threads, "B\nC\nD\n")
            .expect("claims");

        let report = session.resolve_claimed().expect("resolve");
        assert_eq!(tracker.resolved(), vec!["B", "C"]);
        assert_eq!(report.decision.safe, ids(&["B", "C"]));
        assert_eq!(report.decision.discarded, ids(&["D"]));
        assert!(!store.paths().resolved_threads.exists());
    }

    #[test]
    fn refused_resolution_is_not_reported() {
        let (_temp, store) = store();
        let tracker = ScriptedTracker::new(vec![vec![thread("A", "a"), thread("B", "b")]])
            .refusing("B");
        let mut session = ThreadSession::new(&tracker, &store, 5);
        session.outstanding().expect("fetch");
        store.write(&store.paths().resolved_threads, "A\nB\n").expect("claims");

        let report = session.resolve_claimed().expect("resolve");
        assert_eq!(report.resolved, vec!["A"]);
    }

    #[test]
    fn claims_without_scope_resolve_nothing() {
        let (_temp, store) = store();
        let tracker = ScriptedTracker::new(Vec::new());
        let mut session = ThreadSession::new(&tracker, &store, 5);
        store.write(&store.paths().resolved_threads, "A\n").expect("claims");

        let report = session.resolve_claimed().expect("resolve");
        assert!(tracker.resolved().is_empty());
        assert_eq!(report.decision.discarded, ids(&["A"]));
    }
}
