//! Executor abstraction for agent invocation.
//!
//! The [`Executor`] trait decouples the loop from the actual agent backend
//! (currently the `pi` CLI). Tests use scripted executors that return
//! predetermined outputs without spawning processes.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::io::process::{CommandLine, ExecOutcome, execute};

/// Tools the agent may use while fixing checks or resolving review findings.
pub const FIX_TOOLS: &[&str] = &["read", "edit", "write", "bash", "grep", "find", "ls"];
/// Tools the agent may use while reviewing: no editing, no shell.
pub const REVIEW_TOOLS: &[&str] = &["read", "write", "grep", "find", "ls"];

/// Parameters for an executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    pub prompt: String,
    /// Permitted tool capabilities.
    pub tools: Vec<String>,
    /// Files attached to the prompt, relative to `workdir`.
    pub attachments: Vec<String>,
    pub model: Option<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl AgentRequest {
    pub fn new(workdir: impl Into<PathBuf>, prompt: impl Into<String>, tools: &[&str]) -> Self {
        Self {
            workdir: workdir.into(),
            prompt: prompt.into(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            attachments: Vec::new(),
            model: None,
            timeout: Duration::from_secs(60 * 60),
            output_limit_bytes: 1_000_000,
        }
    }
}

/// Abstraction over agent execution backends.
pub trait Executor {
    /// Run the agent once. A non-zero exit is returned as data.
    fn exec(&self, request: &AgentRequest) -> Result<ExecOutcome>;
}

/// Executor that spawns the `pi` coding agent in print mode.
#[derive(Debug, Clone)]
pub struct PiExecutor {
    program: String,
    extra_args: Vec<String>,
}

impl PiExecutor {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    /// Full argv: `<program> [extra] -p --tools a,b [--model m] @file... <prompt>`.
    pub fn argv(&self, request: &AgentRequest) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(self.extra_args.iter().cloned());
        argv.push("-p".to_string());
        argv.push("--tools".to_string());
        argv.push(request.tools.join(","));
        if let Some(model) = &request.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        argv.extend(request.attachments.iter().map(|path| format!("@{path}")));
        argv.push(request.prompt.clone());
        argv
    }
}

impl Executor for PiExecutor {
    #[instrument(skip_all, fields(program = %self.program, attachments = request.attachments.len()))]
    fn exec(&self, request: &AgentRequest) -> Result<ExecOutcome> {
        info!(tools = %request.tools.join(","), "invoking agent");
        let outcome = execute(
            &CommandLine::Argv(self.argv(request)),
            &request.workdir,
            request.timeout,
            request.output_limit_bytes,
        )
        .with_context(|| format!("run {}", self.program))?;
        if outcome.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "agent timed out");
        } else if !outcome.success() {
            warn!(exit_code = outcome.exit_code, "agent exited with failure");
        } else {
            debug!("agent completed");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_places_attachments_before_prompt() {
        let exec = PiExecutor::new("pi", vec!["--no-session".to_string()]);
        let mut request = AgentRequest::new("/tmp", "fix it", FIX_TOOLS);
        request.attachments = vec![".fixloop/checks_filtered.log".to_string()];
        request.model = Some("sonnet".to_string());

        assert_eq!(
            exec.argv(&request),
            vec![
                "pi",
                "--no-session",
                "-p",
                "--tools",
                "read,edit,write,bash,grep,find,ls",
                "--model",
                "sonnet",
                "@.fixloop/checks_filtered.log",
                "fix it",
            ]
        );
    }

    #[test]
    fn review_tools_cannot_edit_or_run_commands() {
        assert!(!REVIEW_TOOLS.contains(&"edit"));
        assert!(!REVIEW_TOOLS.contains(&"bash"));
    }

    #[cfg(unix)]
    #[test]
    fn missing_agent_program_reports_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let exec = PiExecutor::new("no-such-agent-binary-xyz", Vec::new());
        let out = exec
            .exec(&AgentRequest::new(temp.path(), "hi", FIX_TOOLS))
            .expect("exec");
        assert!(out.not_found());
    }
}
