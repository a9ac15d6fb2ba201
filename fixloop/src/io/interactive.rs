//! Blocking interactive agent session for the CLARIFY state.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClarifyRequest {
    pub workdir: PathBuf,
    pub prompt: String,
    pub model: Option<String>,
}

/// Hands control to the operator until the session exits.
pub trait Clarifier {
    /// Block until the session ends and return its exit code.
    fn clarify(&self, request: &ClarifyRequest) -> Result<i32>;
}

/// Runs the agent without print mode, inheriting the terminal.
#[derive(Debug, Clone)]
pub struct InteractiveAgent {
    program: String,
    extra_args: Vec<String>,
}

impl InteractiveAgent {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
        }
    }

    /// Interactive sessions need a terminal on stdin.
    pub fn available() -> bool {
        std::io::stdin().is_terminal()
    }
}

impl Clarifier for InteractiveAgent {
    #[instrument(skip_all, fields(program = %self.program))]
    fn clarify(&self, request: &ClarifyRequest) -> Result<i32> {
        info!("starting interactive session; exit it to resume the loop");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args);
        if let Some(model) = &request.model {
            cmd.arg("--model").arg(model);
        }
        let status = cmd
            .arg(&request.prompt)
            .current_dir(&request.workdir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| format!("run interactive {}", self.program))?;
        let code = status.code().unwrap_or(-1);
        info!(exit_code = code, "interactive session ended");
        Ok(code)
    }
}
