//! Check command runner.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::filter::filter_check_log;
use crate::io::artifacts::ArtifactStore;
use crate::io::process::{CommandLine, EXIT_NOT_FOUND, execute};

#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub workdir: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Exit code plus combined stdout/stderr of one check run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub exit_code: i32,
    pub output: String,
}

impl CheckResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    pub fn not_found(&self) -> bool {
        self.exit_code == EXIT_NOT_FOUND
    }
}

pub trait CheckRunner {
    fn run(&self, request: &CheckRequest) -> Result<CheckResult>;
}

/// Runs the configured verification command.
#[derive(Debug, Clone)]
pub struct CommandCheckRunner {
    command: CommandLine,
}

impl CommandCheckRunner {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

impl CheckRunner for CommandCheckRunner {
    #[instrument(skip_all, fields(command = %self.command.display()))]
    fn run(&self, request: &CheckRequest) -> Result<CheckResult> {
        let outcome = execute(
            &self.command,
            &request.workdir,
            request.timeout,
            request.output_limit_bytes,
        )?;
        let mut output = outcome.combined();
        if outcome.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "check command timed out");
            output.push_str(&format!(
                "\n[check command timed out after {}s]\n",
                request.timeout.as_secs()
            ));
        }
        Ok(CheckResult {
            exit_code: outcome.exit_code,
            output,
        })
    }
}

/// Write the raw log and the filtered excerpt for the fix prompt.
pub fn record_check_output(store: &ArtifactStore, result: &CheckResult) -> Result<String> {
    let paths = store.paths();
    store.write(&paths.checks_log, &result.output)?;
    let filtered = filter_check_log(&result.output, &paths.relative(&paths.checks_log));
    store.write(&paths.checks_filtered, &filtered)?;
    let total = result.output.lines().count();
    let kept = filtered.lines().count();
    if kept < total {
        info!(total, kept, "filtered check log");
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn command_runner_reports_exit_and_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = CommandCheckRunner::new(CommandLine::Argv(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo checking; echo 'error: bad' >&2; exit 1".to_string(),
        ]));
        let result = runner
            .run(&CheckRequest {
                workdir: temp.path().to_path_buf(),
                timeout: Duration::from_secs(10),
                output_limit_bytes: 10_000,
            })
            .expect("run");
        assert!(!result.passed());
        assert_eq!(result.output, "checking\nerror: bad\n");
    }

    #[test]
    fn record_writes_raw_and_filtered_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        store.ensure_dir().expect("dir");
        let result = CheckResult {
            exit_code: 1,
            output: "line\n".repeat(400),
        };

        let filtered = record_check_output(&store, &result).expect("record");
        let raw = store.read(&store.paths().checks_log).expect("read").expect("raw");
        assert_eq!(raw.lines().count(), 400);
        assert!(filtered.contains("full log: .fixloop/checks.log, 400 lines"));
        assert_eq!(
            store.read(&store.paths().checks_filtered).expect("read").as_deref(),
            Some(filtered.as_str())
        );
    }
}
