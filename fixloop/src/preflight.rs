//! Checks that must pass before the loop starts.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::io::config::FixloopConfig;
use crate::io::git::Git;
use crate::io::process::{CommandLine, CommandLineError, find_executable};
use crate::io::tracker::IssueTracker;

/// Configuration or environment problem that keeps the loop from starting.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("{} is not inside a git work tree", .0.display())]
    NotRepository(PathBuf),
    #[error("check command is invalid: {0}")]
    InvalidCheckCommand(#[from] CommandLineError),
    #[error("check command not found: {0}")]
    CheckNotFound(String),
    #[error("check command is not executable: {0}")]
    CheckNotExecutable(String),
    #[error("agent program not found: {0}")]
    AgentNotFound(String),
    #[error("issue tracker unavailable: {0:#}")]
    Tracker(anyhow::Error),
}

/// Verify the repository, the check command, the agent program and, in
/// thread mode, the tracker.
pub fn preflight(
    root: &Path,
    config: &FixloopConfig,
    tracker: Option<&dyn IssueTracker>,
) -> Result<(), PreflightError> {
    if !Git::new(root).is_repository() {
        return Err(PreflightError::NotRepository(root.to_path_buf()));
    }

    let argv = CommandLine::Text(config.check_cmd.clone()).argv()?;
    let program = &argv[0];
    let Some(path) = find_executable(program, root) else {
        return Err(PreflightError::CheckNotFound(program.clone()));
    };
    if !is_executable(&path) {
        return Err(PreflightError::CheckNotExecutable(program.clone()));
    }
    debug!(check = %path.display(), "check command resolved");

    if find_executable(&config.agent.program, root).is_none() {
        return Err(PreflightError::AgentNotFound(config.agent.program.clone()));
    }
    if let Some(tracker) = tracker {
        tracker.preflight().map_err(PreflightError::Tracker)?;
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    fn config(check_cmd: &str) -> FixloopConfig {
        let mut config = FixloopConfig::default();
        config.check_cmd = check_cmd.to_string();
        config.agent.program = "sh".to_string();
        config
    }

    #[test]
    fn outside_repository_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = preflight(temp.path(), &config("sh"), None).unwrap_err();
        assert!(matches!(err, PreflightError::NotRepository(_)));
    }

    #[test]
    fn missing_check_script_is_rejected() {
        let repo = TestRepo::new().expect("repo");
        let err = preflight(repo.path(), &config("./scripts/ci.sh"), None).unwrap_err();
        assert!(matches!(err, PreflightError::CheckNotFound(ref p) if p == "./scripts/ci.sh"));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_check_script_is_rejected() {
        let repo = TestRepo::new().expect("repo");
        repo.write("ci.sh", "#!/bin/sh\nexit 0\n").expect("write");
        let err = preflight(repo.path(), &config("./ci.sh"), None).unwrap_err();
        assert!(matches!(err, PreflightError::CheckNotExecutable(_)));
    }

    #[test]
    fn empty_check_command_is_invalid() {
        let repo = TestRepo::new().expect("repo");
        let err = preflight(repo.path(), &config("   "), None).unwrap_err();
        assert!(matches!(
            err,
            PreflightError::InvalidCheckCommand(CommandLineError::Empty)
        ));
    }

    #[test]
    fn missing_agent_is_rejected() {
        let repo = TestRepo::new().expect("repo");
        let mut cfg = config("sh -c true");
        cfg.agent.program = "no-such-agent-binary-xyz".to_string();
        let err = preflight(repo.path(), &cfg, None).unwrap_err();
        assert!(matches!(err, PreflightError::AgentNotFound(_)));
    }

    #[test]
    fn shell_check_passes() {
        let repo = TestRepo::new().expect("repo");
        preflight(repo.path(), &config("sh -c true"), None).expect("preflight");
    }
}
