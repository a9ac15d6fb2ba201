//! Convergence loop controller.
//!
//! Sequences CHECK -> {FIX | REVIEW -> RESOLVE} passes until the check command
//! passes and the review is clean, the iteration budget runs out, progress
//! stalls, or the run is aborted or interrupted.
//!
//! Each pass fully writes its artifacts before the next begins. The cancel
//! flag is honored between phases only; a running subprocess is never killed
//! from here.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{debug, error, info, instrument, warn};

use crate::core::compaction::tail_lines;
use crate::core::context::{ContextPlan, SizedFile, is_review_excluded, plan_context};
use crate::core::fingerprint::composite;
use crate::core::oscillation::{OscillationHistory, oscillation_warning};
use crate::core::review::parse_confidence;
use crate::core::run::{IterationRecord, RunState};
use crate::core::stagnation::StagnationDetector;
use crate::core::threads::{ReviewThread, format_threads, outstanding_fingerprint};
use crate::core::types::{FailureClass, Phase, TerminalStatus, Verdict};
use crate::io::agent::{AgentInvoker, Invocation};
use crate::io::artifacts::{ARTIFACT_DIR, ArtifactStore};
use crate::io::check::{CheckRequest, CheckRunner, record_check_output};
use crate::io::config::FixloopConfig;
use crate::io::executor::{AgentRequest, Executor, FIX_TOOLS};
use crate::io::git::Git;
use crate::io::interactive::{ClarifyRequest, Clarifier};
use crate::io::prompt::{
    ClarifyPrompt, FixPrompt, PromptEngine, ResolvePrompt, ResolveThreadsPrompt,
};
use crate::io::tracker::IssueTracker;
use crate::pr_threads::{Outstanding, ThreadSession};
use crate::report::record_timestamps;
use crate::review::{ReviewInputs, run_local_review};

/// External processes the loop drives.
pub struct Collaborators<'a, E: Executor, C: CheckRunner> {
    pub executor: &'a E,
    pub checks: &'a C,
    /// Present only in pull-request thread mode.
    pub tracker: Option<&'a dyn IssueTracker>,
    /// Present only when clarify is enabled and a terminal is attached.
    pub clarifier: Option<&'a dyn Clarifier>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub status: TerminalStatus,
    /// Iterations started, capped at the budget.
    pub iterations: u32,
    pub start_rev: Option<String>,
    /// Files outside the artifact directory differ from HEAD at the end.
    pub uncommitted_changes: bool,
}

/// Per-run setup: archive, reset run-scoped files, compact leftovers and keep
/// the artifact directory out of version control.
///
/// Must run before logging opens the session log.
pub fn prepare_run(store: &ArtifactStore, config: &FixloopConfig, stamp: &str) -> Result<()> {
    store.check_layout()?;
    store.ensure_dir()?;
    if config.archive_artifacts {
        store.archive(stamp)?;
    }
    store.reset_run()?;
    if config.compact_artifacts {
        store.compact_history(&config.compaction, false)?;
    }
    store.ensure_gitignored()?;
    Ok(())
}

/// Run the loop to a terminal status.
///
/// Internal failures (artifact I/O, a check command that cannot be spawned)
/// end the run as aborted rather than escaping as errors, so the final report
/// is always produced.
pub fn run_loop<E: Executor, C: CheckRunner>(
    root: &Path,
    config: &FixloopConfig,
    deps: Collaborators<'_, E, C>,
    cancel: &AtomicBool,
) -> RunOutcome {
    let started = Local::now();
    let store = ArtifactStore::new(root);
    let prompts = match config
        .validate()
        .context("invalid configuration")
        .and_then(|()| PromptEngine::new())
    {
        Ok(prompts) => prompts,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run cannot start");
            return RunOutcome {
                status: TerminalStatus::Aborted {
                    reason: format!("{err:#}"),
                },
                iterations: 0,
                start_rev: None,
                uncommitted_changes: false,
            };
        }
    };

    let mut controller = Controller {
        root,
        config,
        store: &store,
        git: Git::new(root),
        prompts,
        invoker: AgentInvoker::new(
            deps.executor,
            &store,
            config.agent.signatures.clone(),
            Duration::from_millis(config.agent.sequential_delay_ms),
        ),
        checks: deps.checks,
        threads: deps
            .tracker
            .map(|tracker| ThreadSession::new(tracker, &store, config.tracker.max_threads)),
        clarifier: deps.clarifier,
        cancel,
        run: RunState::new(config.max_iterations),
        record: IterationRecord::new(0),
        stagnation: StagnationDetector::new(),
        oscillation: None,
    };

    let status = match controller.drive() {
        Ok(status) => status,
        Err(err) => {
            error!(error = %format!("{err:#}"), "run aborted by internal error");
            TerminalStatus::Aborted {
                reason: format!("{err:#}"),
            }
        }
    };
    let status = controller.run.finish(status);
    // No further subprocesses once the operator has cancelled.
    let uncommitted_changes = status != TerminalStatus::Interrupted
        && match controller.git.is_clean_except(ARTIFACT_DIR) {
            Ok(clean) => !clean,
            Err(err) => {
                debug!(%err, "working tree status unavailable");
                false
            }
        };
    let outcome = RunOutcome {
        status,
        iterations: controller.run.iteration.min(config.max_iterations),
        start_rev: controller.run.start_rev.clone(),
        uncommitted_changes,
    };
    if let Err(err) = controller.finish(&outcome, started) {
        warn!(error = %format!("{err:#}"), "failed to record run summary");
    }
    outcome
}

/// Where the controller goes next.
enum Next {
    Check,
    Fix,
    Review,
    Resolve(Findings),
    Clarify(ClarifyPrompt),
    Done(TerminalStatus),
}

/// Issues the resolve phase must address.
enum Findings {
    Local(String),
    Threads(Outstanding),
}

struct Controller<'a, E: Executor, C: CheckRunner> {
    root: &'a Path,
    config: &'a FixloopConfig,
    store: &'a ArtifactStore,
    git: Git,
    prompts: PromptEngine,
    invoker: AgentInvoker<'a, E>,
    checks: &'a C,
    threads: Option<ThreadSession<'a>>,
    clarifier: Option<&'a dyn Clarifier>,
    cancel: &'a AtomicBool,
    run: RunState,
    record: IterationRecord,
    stagnation: StagnationDetector,
    /// Warning for the next fix prompt.
    oscillation: Option<String>,
}

impl<E: Executor, C: CheckRunner> Controller<'_, E, C> {
    fn drive(&mut self) -> Result<TerminalStatus> {
        self.store.ensure_dir()?;
        self.capture_start_rev()?;

        let mut next = Next::Check;
        loop {
            if let Next::Done(status) = next {
                return Ok(status);
            }
            if self.cancelled() {
                info!(iteration = self.run.iteration, "interrupt received; stopping");
                return Ok(TerminalStatus::Interrupted);
            }
            if self.config.compact_artifacts {
                self.store.compact_history(&self.config.compaction, false)?;
            }
            next = match next {
                Next::Check => self.check()?,
                Next::Fix => self.fix()?,
                Next::Review => self.review()?,
                Next::Resolve(findings) => self.resolve(findings)?,
                Next::Clarify(prompt) => self.clarify(prompt)?,
                Next::Done(status) => Next::Done(status),
            };
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Stop right after a blocking call if an interrupt arrived during it.
    fn interrupted_during_call(&self) -> Option<Next> {
        self.cancelled().then(|| {
            info!(iteration = self.run.iteration, "interrupt received during agent call; stopping");
            Next::Done(TerminalStatus::Interrupted)
        })
    }

    fn capture_start_rev(&mut self) -> Result<()> {
        let path = &self.store.paths().start_rev;
        if let Some(existing) = self.store.read_single(path)? {
            debug!(start_rev = %existing, "reusing recorded starting revision");
            self.run.start_rev = Some(existing);
            return Ok(());
        }
        let rev = self.git.head_revision()?;
        if let Some(sha) = &rev {
            self.store.write_once(path, sha)?;
            info!(start_rev = %sha, "captured starting revision");
        }
        self.run.start_rev = rev;
        Ok(())
    }

    #[instrument(skip_all, fields(iteration = self.run.iteration + 1))]
    fn check(&mut self) -> Result<Next> {
        if !self.run.begin_iteration() {
            return Ok(Next::Done(TerminalStatus::Exhausted {
                max_iterations: self.run.max_iterations,
            }));
        }
        let iteration = self.run.iteration;
        self.record = IterationRecord::new(iteration);
        self.store.reset_iteration()?;
        info!(iteration, max = self.run.max_iterations, "running check command");

        let result = self.checks.run(&CheckRequest {
            workdir: self.root.to_path_buf(),
            timeout: self.config.check_timeout(),
            output_limit_bytes: self.config.output_limit_bytes,
        })?;
        let filtered = record_check_output(self.store, &result)?;
        self.record.check_exit = Some(result.exit_code);
        self.oscillation = self.record_fingerprint(iteration, &result.output)?;

        if result.passed() {
            info!("checks passed");
            return Ok(Next::Review);
        }
        if result.not_found() && iteration == 1 {
            return Ok(Next::Done(TerminalStatus::Aborted {
                reason: format!("check command not found: {}", self.config.check_cmd),
            }));
        }
        warn!(exit_code = result.exit_code, "checks failed");
        self.record.filtered_error = Some(filtered);
        Ok(Next::Fix)
    }

    /// Append this check's fingerprint; returns the warning on a repeat.
    fn record_fingerprint(&self, iteration: u32, output: &str) -> Result<Option<String>> {
        let path = &self.store.paths().checks_hashes;
        let mut history = OscillationHistory::parse(&self.store.read(path)?.unwrap_or_default());
        let (entry, previous) = history.record_and_check(iteration, output.as_bytes());
        self.store.append(path, &format!("{}\n", entry.to_line()))?;
        Ok(previous.map(|prev| {
            warn!(previous = prev, "check output identical to an earlier iteration");
            oscillation_warning(prev)
        }))
    }

    #[instrument(skip_all, fields(iteration = self.run.iteration))]
    fn fix(&mut self) -> Result<Next> {
        self.record.enter(Phase::Fix);
        let store = self.store;
        let paths = store.paths();
        let (plan, large_files) = self.changed_context()?;
        let prompt = self.prompts.render_fix(&FixPrompt {
            iteration: self.run.iteration,
            oscillation: self.oscillation.take(),
            checks_filtered: paths.relative(&paths.checks_filtered),
            checks_log: paths.relative(&paths.checks_log),
            review_history: paths.review.exists().then(|| paths.relative(&paths.review)),
            build_history: paths
                .build_history
                .exists()
                .then(|| paths.relative(&paths.build_history)),
            manifest: plan.manifest(),
            large_files,
            large_file_lines: self.config.large_file_lines,
            artifact_dir: ARTIFACT_DIR.to_string(),
        })?;
        let mut attachments = vec![paths.relative(&paths.checks_filtered)];
        attachments.extend(plan.attachments().iter().cloned());
        let request = self.agent_request(prompt, attachments);

        let before = self.tree()?;
        let invocation = self.invoker.invoke_safe(&request)?;
        if let Some(next) = self.interrupted_during_call() {
            return Ok(next);
        }
        self.record.fix_attempts += 1;
        if let Some(next) = self.handle_failure(&invocation)? {
            return Ok(next);
        }
        let changed = self.tree()? != before;
        self.record_build_attempt(Phase::Fix, &invocation, changed)?;
        if let Some(next) = self.note_effect(invocation.succeeded(), changed) {
            return Ok(next);
        }
        let issue = self.record.filtered_error.clone().unwrap_or_default();
        Ok(self.clarify_or(Phase::Fix, &invocation, issue, Next::Check))
    }

    #[instrument(skip_all, fields(iteration = self.run.iteration))]
    fn review(&mut self) -> Result<Next> {
        self.record.enter(Phase::Review);
        let outstanding = match self.threads.as_mut() {
            Some(session) => session.outstanding()?,
            None => None,
        };
        if let Some(outstanding) = outstanding {
            if outstanding.scope_established {
                self.observe_progress(&outstanding.threads)?;
            }
            info!(
                threads = outstanding.threads.len(),
                pr = %outstanding.pr.label(),
                "unresolved review threads"
            );
            self.record.verdict = Some(Verdict::IssuesFound(format_threads(&outstanding.threads)));
            return Ok(Next::Resolve(Findings::Threads(outstanding)));
        }

        let outcome = run_local_review(
            &mut self.invoker,
            &ReviewInputs {
                store: self.store,
                git: &self.git,
                prompts: &self.prompts,
                config: self.config,
                start_rev: self.run.start_rev.as_deref(),
                iteration: self.run.iteration,
            },
        )?;
        if let Some(next) = self.interrupted_during_call() {
            return Ok(next);
        }
        if outcome.failure == Some(FailureClass::Fatal) {
            return Ok(Next::Done(TerminalStatus::Aborted {
                reason: "fatal review agent failure".to_string(),
            }));
        }
        if outcome.context_overflow {
            self.emergency_compaction()?;
        }
        if let Verdict::AmbiguousLegacy(_) = &outcome.verdict {
            warn!(
                policy = ?self.config.review.ambiguous,
                "review verdict is ambiguous; applying configured policy"
            );
        }
        let verdict = outcome.verdict.resolve(self.config.review.ambiguous);
        self.record.verdict = Some(verdict.clone());
        match verdict {
            Verdict::NoIssues => Ok(Next::Done(TerminalStatus::Converged)),
            Verdict::IssuesFound(text) | Verdict::AmbiguousLegacy(text) if text.trim().is_empty() => {
                warn!("review produced no findings to resolve; checking again");
                Ok(Next::Check)
            }
            Verdict::IssuesFound(text) | Verdict::AmbiguousLegacy(text) => {
                Ok(Next::Resolve(Findings::Local(text)))
            }
        }
    }

    fn resolve(&mut self, findings: Findings) -> Result<Next> {
        self.record.enter(Phase::Resolve);
        match findings {
            Findings::Local(text) => self.resolve_local(text),
            Findings::Threads(outstanding) => self.resolve_threads(outstanding),
        }
    }

    /// Up to `resolve_attempts` invocations, stopping at the first that
    /// changes the tree.
    #[instrument(skip_all, fields(iteration = self.run.iteration))]
    fn resolve_local(&mut self, findings: String) -> Result<Next> {
        let store = self.store;
        let paths = store.paths();
        let iteration = self.run.iteration;
        let attempts = self.config.agent.resolve_attempts;
        let mut last: Option<Invocation> = None;
        let mut changed = false;

        for attempt in 1..=attempts {
            if attempt > 1 && self.cancelled() {
                return Ok(Next::Done(TerminalStatus::Interrupted));
            }
            let recent = match self.store.read(&paths.review)? {
                Some(history) => {
                    self.store.write(
                        &paths.review_recent,
                        &tail_lines(&history, self.config.compaction.tail_lines),
                    )?;
                    Some(paths.relative(&paths.review_recent))
                }
                None => None,
            };
            let prompt = self.prompts.render_resolve(&ResolvePrompt {
                iteration,
                attempt,
                review_file: paths.relative(&paths.review_current),
                review_recent: recent,
                previous_attempt_failed: attempt > 1,
                artifact_dir: ARTIFACT_DIR.to_string(),
            })?;
            let request = self.agent_request(prompt, vec![paths.relative(&paths.review_current)]);

            let before = self.tree()?;
            let invocation = self.invoker.invoke_safe(&request)?;
            if let Some(next) = self.interrupted_during_call() {
                return Ok(next);
            }
            self.record.fix_attempts += 1;
            if let Some(next) = self.handle_failure(&invocation)? {
                return Ok(next);
            }
            changed = self.tree()? != before;
            self.record_build_attempt(Phase::Resolve, &invocation, changed)?;
            self.store.append(
                &paths.review,
                &format!(
                    "### Iteration {iteration} - Resolution ({})\n\nAttempt {attempt}: {}\n\n",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    if changed { "files changed." } else { "no files changed." }
                ),
            )?;
            if let Some(next) = self.note_effect(invocation.succeeded(), changed) {
                return Ok(next);
            }
            last = Some(invocation);
            if changed {
                break;
            }
        }
        if !changed {
            warn!(attempts, "review findings left unaddressed this iteration");
        }
        Ok(match last {
            Some(invocation) => self.clarify_or(Phase::Resolve, &invocation, findings, Next::Check),
            None => Next::Check,
        })
    }

    #[instrument(skip_all, fields(iteration = self.run.iteration))]
    fn resolve_threads(&mut self, outstanding: Outstanding) -> Result<Next> {
        let store = self.store;
        let paths = store.paths();
        let formatted = format_threads(&outstanding.threads);
        self.store.write(&paths.review_current, &formatted)?;
        self.store.remove(&paths.resolved_threads)?;

        let prompt = self.prompts.render_resolve_threads(&ResolveThreadsPrompt {
            iteration: self.run.iteration,
            pr_label: outstanding.pr.label(),
            threads: formatted.clone(),
            resolved_file: paths.relative(&paths.resolved_threads),
            artifact_dir: ARTIFACT_DIR.to_string(),
        })?;
        let request = self.agent_request(prompt, Vec::new());

        let before = self.tree()?;
        let invocation = self.invoker.invoke_safe(&request)?;
        // Claims are never resolved once the operator has cancelled.
        if let Some(next) = self.interrupted_during_call() {
            return Ok(next);
        }
        self.record.fix_attempts += 1;
        if let Some(next) = self.handle_failure(&invocation)? {
            return Ok(next);
        }
        let changed = self.tree()? != before;
        self.record_build_attempt(Phase::Resolve, &invocation, changed)?;

        let Some(session) = self.threads.as_mut() else {
            return Ok(Next::Check);
        };
        let report = session.resolve_claimed()?;
        let remaining = session
            .outstanding()?
            .map(|o| o.threads)
            .unwrap_or_default();

        let count = self.observe_progress(&remaining)?;
        if self.stagnation.is_stagnant() {
            return Ok(Next::Done(TerminalStatus::Stagnated {
                iteration: self.run.iteration,
                count,
            }));
        }
        let acted = changed || !report.decision.safe.is_empty();
        if let Some(next) = self.note_effect(invocation.succeeded(), acted) {
            return Ok(next);
        }
        Ok(self.clarify_or(Phase::Resolve, &invocation, formatted, Next::Check))
    }

    fn clarify(&mut self, input: ClarifyPrompt) -> Result<Next> {
        self.record.enter(Phase::Clarify);
        let Some(clarifier) = self.clarifier else {
            return Ok(Next::Check);
        };
        let prompt = self.prompts.render_clarify(&input)?;
        let code = clarifier.clarify(&ClarifyRequest {
            workdir: self.root.to_path_buf(),
            prompt,
            model: self.config.agent.model.clone(),
        })?;
        if code != 0 {
            warn!(exit_code = code, "interactive session exited with failure");
        }
        Ok(Next::Check)
    }

    /// Composite of outstanding threads and tree state, folded into the
    /// stagnation counter.
    fn observe_progress(&mut self, threads: &[ReviewThread]) -> Result<u32> {
        let fingerprint = composite(&outstanding_fingerprint(threads), &self.tree()?);
        let count = self.stagnation.update(&fingerprint);
        if count > 0 {
            warn!(count, "no progress on review threads");
        }
        Ok(count)
    }

    /// Emergency compaction on overflow; a fatal failure ends the run.
    fn handle_failure(&self, invocation: &Invocation) -> Result<Option<Next>> {
        if invocation.context_overflow {
            self.emergency_compaction()?;
        }
        if invocation.failure != Some(FailureClass::Fatal) {
            return Ok(None);
        }
        let detail = invocation
            .outcome
            .combined()
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("no output")
            .to_string();
        Ok(Some(Next::Done(TerminalStatus::Aborted {
            reason: format!(
                "fatal agent failure (exit {}): {detail}",
                invocation.outcome.exit_code
            ),
        })))
    }

    fn emergency_compaction(&self) -> Result<()> {
        warn!("agent exceeded its context window; compacting history");
        self.store.compact_history(&self.config.compaction, true)
    }

    /// Fold an invocation's effect into the toolless streak; abort at the limit.
    fn note_effect(&mut self, succeeded: bool, acted: bool) -> Option<Next> {
        let streak = self.invoker.record_effect(succeeded, acted);
        let limit = self.config.agent.max_toolless_attempts;
        (streak >= limit).then(|| {
            Next::Done(TerminalStatus::Aborted {
                reason: format!("agent reported success {streak} times without changing any files"),
            })
        })
    }

    /// Enter CLARIFY when the agent reported low confidence.
    fn clarify_or(&self, phase: Phase, invocation: &Invocation, issue: String, otherwise: Next) -> Next {
        if !self.config.clarify.enabled || self.clarifier.is_none() || !invocation.succeeded() {
            return otherwise;
        }
        match parse_confidence(&invocation.outcome.stdout) {
            Some(confidence) if confidence < self.config.clarify.confidence_threshold => {
                warn!(confidence, phase = phase.as_str(), "low agent confidence; handing over");
                Next::Clarify(ClarifyPrompt {
                    iteration: self.run.iteration,
                    phase: phase.as_str().to_string(),
                    confidence: format!("{confidence:.2}"),
                    issue,
                })
            }
            Some(_) => otherwise,
            None => {
                warn!(phase = phase.as_str(), "agent output has no confidence marker");
                otherwise
            }
        }
    }

    fn agent_request(&self, prompt: String, attachments: Vec<String>) -> AgentRequest {
        let mut request = AgentRequest::new(self.root, prompt, FIX_TOOLS);
        request.attachments = attachments;
        request.model = self.config.agent.model.clone();
        request.timeout = self.config.agent_timeout();
        request.output_limit_bytes = self.config.output_limit_bytes;
        request
    }

    fn tree(&self) -> Result<String> {
        self.git.tree_fingerprint(ARTIFACT_DIR)
    }

    /// Attachment plan for files changed since the start, plus the ones
    /// too long to read in one go.
    fn changed_context(&self) -> Result<(ContextPlan, Vec<String>)> {
        let files = self
            .git
            .changed_files(self.run.start_rev.as_deref(), ARTIFACT_DIR)?;
        let mut sized = Vec::new();
        let mut large = Vec::new();
        for path in files.into_iter().filter(|p| !is_review_excluded(p)) {
            let full = self.root.join(&path);
            let Ok(meta) = fs::metadata(&full) else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let lines = fs::read_to_string(&full).map_or(0, |text| text.lines().count());
            if lines > self.config.large_file_lines {
                large.push(path.clone());
            }
            sized.push(SizedFile {
                path,
                bytes: meta.len(),
            });
        }
        let plan = plan_context(&sized, self.config.auto_attach_threshold_bytes);
        if let ContextPlan::Manifest { total_bytes, .. } = &plan {
            info!(total_bytes, "changed files over attach threshold; sending manifest");
        }
        Ok((plan, large))
    }

    fn record_build_attempt(&self, phase: Phase, invocation: &Invocation, changed: bool) -> Result<()> {
        let mut entry = format!(
            "## Iteration {} {} attempt {} ({})\n\n",
            self.run.iteration,
            phase.as_str(),
            self.record.fix_attempts,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        if changed {
            match self.git.diff_stat_since(self.run.start_rev.as_deref()) {
                Ok(stat) if !stat.trim().is_empty() => {
                    entry.push_str("```\n");
                    entry.push_str(stat.trim_end());
                    entry.push_str("\n```\n");
                }
                Ok(_) => entry.push_str("Files changed (untracked only).\n"),
                Err(err) => {
                    debug!(%err, "diff stat unavailable");
                    entry.push_str("Files changed.\n");
                }
            }
        } else if !invocation.succeeded() {
            entry.push_str(&format!(
                "FAILED: agent exited with code {}\n",
                invocation.outcome.exit_code
            ));
        } else {
            entry.push_str("FAILED to apply fixes (no files changed)\n");
        }
        entry.push('\n');
        self.store.append(&self.store.paths().build_history, &entry)
    }

    fn finish(&self, outcome: &RunOutcome, started: chrono::DateTime<Local>) -> Result<()> {
        let paths = self.store.paths();
        if outcome.status.is_success() {
            self.store.append(
                &paths.review,
                &format!(
                    "### Iteration {} - Resolution ({})\n\n- No issues found.\n\n",
                    outcome.iterations,
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                ),
            )?;
            self.store.remove(&paths.review_current)?;
            self.store.remove(&paths.start_rev)?;
        }
        record_timestamps(self.store, started, Local::now(), outcome)
    }
}
