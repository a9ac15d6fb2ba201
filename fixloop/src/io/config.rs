//! Loop configuration stored in `fixloop.toml` at the project root.
//!
//! Precedence is CLI flag, then `FIXLOOP_*` environment variable (both handled
//! by clap), then this file, then built-in defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::classifier::FailureSignatures;
use crate::core::compaction::CompactionPolicy;
use crate::core::types::AmbiguousPolicy;

pub const CONFIG_FILE: &str = "fixloop.toml";

/// Loop configuration (TOML).
///
/// Missing fields default to the values in [`Default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FixloopConfig {
    /// Verification command, split with shell-word rules.
    pub check_cmd: String,
    pub max_iterations: u32,
    pub check_timeout_secs: u64,
    /// Bytes of stdout/stderr kept per subprocess.
    pub output_limit_bytes: usize,
    /// Copy previous artifacts to `.fixloop/archive/<stamp>/` before a run.
    pub archive_artifacts: bool,
    pub compact_artifacts: bool,
    /// Changed files above this combined size are listed instead of attached.
    pub auto_attach_threshold_bytes: u64,
    /// Changed files longer than this get a read-in-chunks warning.
    pub large_file_lines: usize,
    pub debug: bool,
    pub agent: AgentConfig,
    pub compaction: CompactionPolicy,
    pub review: ReviewConfig,
    pub tracker: TrackerConfig,
    pub clarify: ClarifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub program: String,
    pub model: Option<String>,
    /// Arguments inserted before the generated ones.
    pub extra_args: Vec<String>,
    pub timeout_secs: u64,
    /// Pause between consecutive agent invocations.
    pub sequential_delay_ms: u64,
    /// Consecutive successful-but-no-change invocations before aborting.
    pub max_toolless_attempts: u32,
    /// Resolve invocations per iteration while the tree stays unchanged.
    pub resolve_attempts: u32,
    pub signatures: FailureSignatures,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "pi".to_string(),
            model: None,
            extra_args: Vec::new(),
            timeout_secs: 60 * 60,
            sequential_delay_ms: 1000,
            max_toolless_attempts: 3,
            resolve_attempts: 3,
            signatures: FailureSignatures::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReviewConfig {
    pub ambiguous: AmbiguousPolicy,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            ambiguous: AmbiguousPolicy::Issues,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Resolve pull-request review threads instead of only reviewing locally.
    pub enabled: bool,
    pub max_threads: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_threads: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClarifyConfig {
    pub enabled: bool,
    /// Reported confidence below this hands control to the operator.
    pub confidence_threshold: f64,
}

impl Default for ClarifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            confidence_threshold: 0.5,
        }
    }
}

impl Default for FixloopConfig {
    fn default() -> Self {
        Self {
            check_cmd: "./scripts/ci.sh".to_string(),
            max_iterations: 10,
            check_timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
            archive_artifacts: false,
            compact_artifacts: true,
            auto_attach_threshold_bytes: 200 * 1024,
            large_file_lines: 2000,
            debug: false,
            agent: AgentConfig::default(),
            compaction: CompactionPolicy::default(),
            review: ReviewConfig::default(),
            tracker: TrackerConfig::default(),
            clarify: ClarifyConfig::default(),
        }
    }
}

impl FixloopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.check_cmd.trim().is_empty() {
            return Err(anyhow!("check_cmd must not be empty"));
        }
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.check_timeout_secs == 0 || self.agent.timeout_secs == 0 {
            return Err(anyhow!("timeouts must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.agent.program.trim().is_empty() {
            return Err(anyhow!("agent.program must not be empty"));
        }
        if self.agent.max_toolless_attempts == 0 || self.agent.resolve_attempts == 0 {
            return Err(anyhow!(
                "agent.max_toolless_attempts and agent.resolve_attempts must be > 0"
            ));
        }
        if self.tracker.max_threads == 0 {
            return Err(anyhow!("tracker.max_threads must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.clarify.confidence_threshold) {
            return Err(anyhow!("clarify.confidence_threshold must be within 0..=1"));
        }
        self.compaction.validate()
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }

    /// Fold command-line/environment values over the file values.
    pub fn apply_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(cmd) = &overrides.check_cmd {
            self.check_cmd = cmd.clone();
        }
        if let Some(max) = overrides.max_iterations {
            self.max_iterations = max;
        }
        if let Some(model) = &overrides.model {
            self.agent.model = Some(model.clone());
        }
        if let Some(max) = overrides.max_threads {
            self.tracker.max_threads = max;
        }
        if let Some(policy) = overrides.ambiguous_review {
            self.review.ambiguous = policy;
        }
        self.archive_artifacts |= overrides.archive_artifacts;
        self.compact_artifacts &= !overrides.no_compact;
        self.tracker.enabled |= overrides.pr_review;
        self.clarify.enabled |= overrides.clarify;
        self.debug |= overrides.debug;
    }
}

/// Values supplied on the command line or via environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub check_cmd: Option<String>,
    pub max_iterations: Option<u32>,
    pub model: Option<String>,
    pub max_threads: Option<usize>,
    pub ambiguous_review: Option<AmbiguousPolicy>,
    pub archive_artifacts: bool,
    pub no_compact: bool,
    pub pr_review: bool,
    pub clarify: bool,
    pub debug: bool,
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FixloopConfig::default()`.
pub fn load_config(path: &Path) -> Result<FixloopConfig> {
    if !path.exists() {
        let cfg = FixloopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FixloopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FixloopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
