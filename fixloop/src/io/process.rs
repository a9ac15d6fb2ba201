//! Helpers for running child processes with timeouts and bounded output.

use std::env;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Exit code reported when the executable does not exist.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Exit code reported when the executable exists but cannot be run.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
/// Exit code reported for an empty or unparseable command string.
pub const EXIT_USAGE: i32 = 2;
/// Exit code reported when the command was killed after its timeout.
pub const EXIT_TIMED_OUT: i32 = 124;

/// A command given either as argv or as a string to split with shell-word rules.
///
/// Splitting is not a shell: pipes and redirections are passed through as
/// plain arguments. Wrap in `sh -c` explicitly when they are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Argv(Vec<String>),
    Text(String),
}

impl CommandLine {
    pub fn argv(&self) -> Result<Vec<String>, CommandLineError> {
        let argv = match self {
            CommandLine::Argv(argv) => argv.clone(),
            CommandLine::Text(text) => shlex::split(text).ok_or(CommandLineError::Syntax)?,
        };
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(CommandLineError::Empty);
        }
        Ok(argv)
    }

    pub fn display(&self) -> String {
        match self {
            CommandLine::Argv(argv) => argv.join(" "),
            CommandLine::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandLineError {
    #[error("no command provided")]
    Empty,
    #[error("invalid command syntax")]
    Syntax,
}

/// Result of [`execute`]. Non-zero exits are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn not_found(&self) -> bool {
        self.exit_code == EXIT_NOT_FOUND
    }

    /// stdout followed by stderr, as a check log would show them.
    pub fn combined(&self) -> String {
        let mut text = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        text
    }

    fn sentinel(exit_code: i32, stderr: String) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr,
            timed_out: false,
        }
    }
}

/// Run `command` in `workdir`, never failing on a non-zero exit.
///
/// Missing executables map to [`EXIT_NOT_FOUND`] and malformed command strings
/// to [`EXIT_USAGE`]. Errors are returned only for I/O failures of the runner
/// itself.
#[instrument(skip_all, fields(command = %command.display()))]
pub fn execute(
    command: &CommandLine,
    workdir: &Path,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<ExecOutcome> {
    let argv = match command.argv() {
        Ok(argv) => argv,
        Err(err) => {
            warn!(%err, "rejecting command");
            return Ok(ExecOutcome::sentinel(EXIT_USAGE, err.to_string()));
        }
    };
    // Relative paths like `./scripts/ci.sh` are relative to the project, not to us.
    let program = Path::new(&argv[0]);
    let program = if argv[0].contains('/') && program.is_relative() {
        workdir.join(program)
    } else {
        program.to_path_buf()
    };
    let mut cmd = Command::new(program);
    cmd.args(&argv[1..]).current_dir(workdir);

    match run_command_with_timeout(cmd, None, timeout, output_limit_bytes) {
        Ok(output) => {
            let mut stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            stdout.push_str(&output.stdout_truncated_notice(&argv[0]));
            let mut stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            stderr.push_str(&output.stderr_truncated_notice(&argv[0]));
            let exit_code = if output.timed_out {
                EXIT_TIMED_OUT
            } else {
                exit_code_of(output.status)
            };
            Ok(ExecOutcome {
                exit_code,
                stdout,
                stderr,
                timed_out: output.timed_out,
            })
        }
        Err(err) => match spawn_error_kind(&err) {
            Some(ErrorKind::NotFound) => Ok(ExecOutcome::sentinel(
                EXIT_NOT_FOUND,
                format!("command not found: {}", argv[0]),
            )),
            Some(ErrorKind::PermissionDenied) => Ok(ExecOutcome::sentinel(
                EXIT_NOT_EXECUTABLE,
                format!("command not executable: {}", argv[0]),
            )),
            _ => Err(err),
        },
    }
}

/// Locate `program` the way a spawn would: relative to `workdir` when it has a
/// path separator, otherwise on `PATH`.
pub fn find_executable(program: &str, workdir: &Path) -> Option<PathBuf> {
    if program.contains('/') {
        let candidate = workdir.join(program);
        return candidate.is_file().then_some(candidate);
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn spawn_error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.downcast_ref::<std::io::Error>().map(std::io::Error::kind)
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_truncated_notice(&self, label: &str) -> String {
        if self.stdout_truncated > 0 {
            format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            )
        } else {
            String::new()
        }
    }

    pub fn stderr_truncated_notice(&self, label: &str) -> String {
        if self.stderr_truncated > 0 {
            format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            )
        } else {
            String::new()
        }
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// A spawn failure is returned with the underlying `std::io::Error` as its root.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(anyhow::Error::new(e));
        }
    };

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}
