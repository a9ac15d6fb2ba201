//! Tracing setup for a fixloop run.
//!
//! - **stderr**: compact, human-oriented progress lines.
//! - **`.fixloop/fixloop.log`**: the same events for this run; the previous
//!   run is rotated to `fixloop.prev.log` during setup.
//! - **`.fixloop/session.log`**: this run only (`session_<timestamp>.log` in
//!   debug mode so earlier sessions are kept).
//!
//! `RUST_LOG` overrides the default filter.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::io::artifacts::ArtifactPaths;

/// Initialize the global subscriber and return the session log path.
///
/// The artifact directory must exist.
pub fn init(paths: &ArtifactPaths, debug: bool) -> Result<PathBuf> {
    let default = if debug { "fixloop=debug" } else { "fixloop=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let run_log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.run_log)
        .with_context(|| format!("open {}", paths.run_log.display()))?;
    let session_path = if debug {
        paths.dir.join(format!(
            "session_{}.log",
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    } else {
        paths.session_log.clone()
    };
    let session = File::create(&session_path)
        .with_context(|| format!("create {}", session_path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(run_log)))
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(session)))
        .try_init()
        .map_err(|err| anyhow!("initialize tracing: {err}"))?;
    Ok(session_path)
}
