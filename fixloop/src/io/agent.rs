//! Agent invocation with transcript logging and the single safe retry.

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Local;
use tracing::{debug, info, instrument, warn};

use crate::core::classifier::FailureSignatures;
use crate::core::types::FailureClass;
use crate::io::artifacts::ArtifactStore;
use crate::io::executor::{AgentRequest, Executor};
use crate::io::process::ExecOutcome;

/// Result of [`AgentInvoker::invoke_safe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub outcome: ExecOutcome,
    /// Classification of the final failure; `None` on success.
    pub failure: Option<FailureClass>,
    pub retried: bool,
    /// The failure text matched a context-overflow signature.
    pub context_overflow: bool,
}

impl Invocation {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Invokes the agent through an [`Executor`], one call at a time.
pub struct AgentInvoker<'a, E: Executor> {
    executor: &'a E,
    store: &'a ArtifactStore,
    signatures: FailureSignatures,
    delay: Duration,
    last_call: Option<Instant>,
    toolless_streak: u32,
}

impl<'a, E: Executor> AgentInvoker<'a, E> {
    pub fn new(
        executor: &'a E,
        store: &'a ArtifactStore,
        signatures: FailureSignatures,
        delay: Duration,
    ) -> Self {
        Self {
            executor,
            store,
            signatures,
            delay,
            last_call: None,
            toolless_streak: 0,
        }
    }

    /// Invoke once and append the exchange to the transcript.
    pub fn invoke(&mut self, request: &AgentRequest) -> Result<ExecOutcome> {
        self.pace();
        let started = Local::now();
        let outcome = self.executor.exec(request)?;
        self.last_call = Some(Instant::now());
        self.store
            .append(&self.store.paths().agent_log, &transcript(request, &outcome, started))?;
        Ok(outcome)
    }

    /// Invoke, retrying once with the identical request when the failure is
    /// classified as transient.
    #[instrument(skip_all)]
    pub fn invoke_safe(&mut self, request: &AgentRequest) -> Result<Invocation> {
        let mut outcome = self.invoke(request)?;
        let mut retried = false;
        let mut failure = self.classify(&outcome);
        if failure == Some(FailureClass::Transient) {
            info!("transient agent failure, retrying once");
            retried = true;
            outcome = self.invoke(request)?;
            failure = self.classify(&outcome);
        }
        let context_overflow =
            failure.is_some() && self.signatures.is_context_overflow(&outcome.combined());
        if let Some(class) = failure {
            warn!(?class, exit_code = outcome.exit_code, retried, "agent invocation failed");
        }
        Ok(Invocation {
            outcome,
            failure,
            retried,
            context_overflow,
        })
    }

    /// Fold one invocation's effect into the toolless counter and return it.
    ///
    /// Only a successful invocation that left the tree unchanged counts.
    pub fn record_effect(&mut self, succeeded: bool, tree_changed: bool) -> u32 {
        if succeeded && !tree_changed {
            self.toolless_streak += 1;
            warn!(streak = self.toolless_streak, "agent reported success without changing files");
        } else if tree_changed {
            self.toolless_streak = 0;
        }
        self.toolless_streak
    }

    pub fn toolless_streak(&self) -> u32 {
        self.toolless_streak
    }

    fn classify(&self, outcome: &ExecOutcome) -> Option<FailureClass> {
        if outcome.success() {
            return None;
        }
        if outcome.not_found() {
            return Some(FailureClass::Fatal);
        }
        Some(self.signatures.classify(&outcome.combined()))
    }

    fn pace(&self) {
        let Some(last) = self.last_call else {
            return;
        };
        let elapsed = last.elapsed();
        if elapsed < self.delay {
            let wait = self.delay - elapsed;
            debug!(wait_ms = wait.as_millis() as u64, "pacing agent invocations");
            thread::sleep(wait);
        }
    }
}

fn transcript(
    request: &AgentRequest,
    outcome: &ExecOutcome,
    started: chrono::DateTime<Local>,
) -> String {
    let mut buf = format!(
        "=== agent invocation {} ===\ntools: {}\n",
        started.format("%Y-%m-%d %H:%M:%S"),
        request.tools.join(",")
    );
    if let Some(model) = &request.model {
        buf.push_str(&format!("model: {model}\n"));
    }
    if !request.attachments.is_empty() {
        buf.push_str(&format!("attachments: {}\n", request.attachments.join(" ")));
    }
    buf.push_str("--- prompt ---\n");
    buf.push_str(&request.prompt);
    buf.push_str("\n--- stdout ---\n");
    buf.push_str(&outcome.stdout);
    buf.push_str("\n--- stderr ---\n");
    buf.push_str(&outcome.stderr);
    buf.push_str(&format!("\n--- exit code: {} ---\n\n", outcome.exit_code));
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::executor::FIX_TOOLS;
    use crate::test_support::{ScriptedAgent, ScriptedExecutor};

    fn setup() -> (tempfile::TempDir, ArtifactStore) {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        store.ensure_dir().expect("dir");
        (temp, store)
    }

    /// Verifies a transient failure is retried exactly once with the same prompt.
    #[test]
    fn transient_failure_retried_once() {
        let (temp, store) = setup();
        let executor = ScriptedExecutor::new(vec![
            ScriptedAgent::fail(1, "Error: could not find the exact text in a.rs"),
            ScriptedAgent::ok("done"),
        ]);
        let mut invoker =
            AgentInvoker::new(&executor, &store, FailureSignatures::default(), Duration::ZERO);
        let request = AgentRequest::new(temp.path(), "fix", FIX_TOOLS);

        let result = invoker.invoke_safe(&request).expect("invoke");
        assert!(result.succeeded());
        assert!(result.retried);
        let calls = executor.requests();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
    }

    #[test]
    fn second_transient_failure_is_surfaced() {
        let (temp, store) = setup();
        let executor = ScriptedExecutor::new(vec![
            ScriptedAgent::fail(1, "could not find the exact text"),
            ScriptedAgent::fail(1, "could not find the exact text"),
        ]);
        let mut invoker =
            AgentInvoker::new(&executor, &store, FailureSignatures::default(), Duration::ZERO);

        let result = invoker
            .invoke_safe(&AgentRequest::new(temp.path(), "fix", FIX_TOOLS))
            .expect("invoke");
        assert_eq!(result.failure, Some(FailureClass::Transient));
        assert_eq!(executor.requests().len(), 2);
    }

    #[test]
    fn unknown_failure_not_retried() {
        let (temp, store) = setup();
        let executor = ScriptedExecutor::new(vec![ScriptedAgent::fail(2, "something else")]);
        let mut invoker =
            AgentInvoker::new(&executor, &store, FailureSignatures::default(), Duration::ZERO);

        let result = invoker
            .invoke_safe(&AgentRequest::new(temp.path(), "fix", FIX_TOOLS))
            .expect("invoke");
        assert_eq!(result.failure, Some(FailureClass::Unknown));
        assert!(!result.retried);
        assert_eq!(executor.requests().len(), 1);
    }

    #[test]
    fn overflow_is_flagged() {
        let (temp, store) = setup();
        let executor = ScriptedExecutor::new(vec![ScriptedAgent::fail(1, "429 long context")]);
        let mut invoker =
            AgentInvoker::new(&executor, &store, FailureSignatures::default(), Duration::ZERO);

        let result = invoker
            .invoke_safe(&AgentRequest::new(temp.path(), "fix", FIX_TOOLS))
            .expect("invoke");
        assert!(result.context_overflow);
    }

    #[test]
    fn transcript_records_prompt_and_output() {
        let (temp, store) = setup();
        let executor = ScriptedExecutor::new(vec![ScriptedAgent::ok("patched a.rs")]);
        let mut invoker =
            AgentInvoker::new(&executor, &store, FailureSignatures::default(), Duration::ZERO);
        let mut request = AgentRequest::new(temp.path(), "please fix", FIX_TOOLS);
        request.attachments = vec!["a.rs".to_string()];
        invoker.invoke(&request).expect("invoke");

        let log = store
            .read(&store.paths().agent_log)
            .expect("read")
            .expect("log exists");
        assert!(log.contains("--- prompt ---\nplease fix"));
        assert!(log.contains("patched a.rs"));
        assert!(log.contains("attachments: a.rs"));
        assert!(log.contains("--- exit code: 0 ---"));
    }

    #[test]
    fn toolless_streak_counts_successes_without_changes() {
        let (_temp, store) = setup();
        let executor = ScriptedExecutor::new(Vec::new());
        let mut invoker =
            AgentInvoker::new(&executor, &store, FailureSignatures::default(), Duration::ZERO);
        assert_eq!(invoker.record_effect(true, false), 1);
        assert_eq!(invoker.record_effect(false, false), 1);
        assert_eq!(invoker.record_effect(true, false), 2);
        assert_eq!(invoker.record_effect(true, true), 0);
    }
}
