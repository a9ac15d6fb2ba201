//! `fixloop` command-line entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};

use fixloop::controller::{Collaborators, prepare_run, run_loop};
use fixloop::core::types::AmbiguousPolicy;
use fixloop::exit_codes;
use fixloop::io::artifacts::ArtifactStore;
use fixloop::io::check::CommandCheckRunner;
use fixloop::io::config::{CONFIG_FILE, FixloopConfig, RunOverrides, load_config, write_config};
use fixloop::io::executor::PiExecutor;
use fixloop::io::interactive::{Clarifier, InteractiveAgent};
use fixloop::io::process::CommandLine;
use fixloop::io::tracker::{GhTracker, IssueTracker};
use fixloop::logging;
use fixloop::preflight::preflight;
use fixloop::report;

#[derive(Parser)]
#[command(
    name = "fixloop",
    version,
    about = "Run a coding agent until checks pass and review is clean"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the check/fix/review loop in the current repository.
    Run(RunArgs),
    /// Write a default `fixloop.toml`.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Project root (defaults to the current directory).
    #[arg(long, env = "FIXLOOP_ROOT")]
    root: Option<PathBuf>,
    /// Verification command, split with shell-word rules.
    #[arg(long, env = "FIXLOOP_CHECK_CMD")]
    check_cmd: Option<String>,
    #[arg(long = "max-iters", env = "FIXLOOP_MAX_ITERS")]
    max_iterations: Option<u32>,
    #[arg(long, env = "FIXLOOP_MODEL")]
    model: Option<String>,
    /// Most pull-request threads handled in one run.
    #[arg(long, env = "FIXLOOP_MAX_PR_THREADS")]
    max_threads: Option<usize>,
    /// How an ambiguous review verdict is treated.
    #[arg(long, value_parser = parse_policy, env = "FIXLOOP_AMBIGUOUS_REVIEW")]
    ambiguous_review: Option<AmbiguousPolicy>,
    #[arg(long, env = "FIXLOOP_ARCHIVE_ARTIFACTS")]
    archive_artifacts: bool,
    #[arg(long, env = "FIXLOOP_NO_COMPACT")]
    no_compact: bool,
    /// Resolve unresolved review threads on the branch's pull request.
    #[arg(long, env = "FIXLOOP_PR_REVIEW")]
    pr_review: bool,
    /// Hand low-confidence attempts to an interactive session.
    #[arg(long, env = "FIXLOOP_CLARIFY")]
    clarify: bool,
    #[arg(short, long, env = "FIXLOOP_DEBUG")]
    debug: bool,
}

impl RunArgs {
    fn overrides(&self) -> RunOverrides {
        RunOverrides {
            check_cmd: self.check_cmd.clone(),
            max_iterations: self.max_iterations,
            model: self.model.clone(),
            max_threads: self.max_threads,
            ambiguous_review: self.ambiguous_review,
            archive_artifacts: self.archive_artifacts,
            no_compact: self.no_compact,
            pr_review: self.pr_review,
            clarify: self.clarify,
            debug: self.debug,
        }
    }
}

fn parse_policy(value: &str) -> Result<AmbiguousPolicy, String> {
    match value {
        "issues" => Ok(AmbiguousPolicy::Issues),
        "no-issues" => Ok(AmbiguousPolicy::NoIssues),
        other => Err(format!("expected `issues` or `no-issues`, got `{other}`")),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::FAILED as u8)
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Init { force } => cmd_init(force).map(|()| exit_codes::CONVERGED),
    }
}

fn cmd_init(force: bool) -> Result<()> {
    let path = std::env::current_dir()
        .context("resolve current directory")?
        .join(CONFIG_FILE);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(&path, &FixloopConfig::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("resolve current directory")?,
    };
    let mut config = load_config(&root.join(CONFIG_FILE))?;
    config.apply_overrides(&args.overrides());
    config.validate().context("invalid configuration")?;

    let tracker = GhTracker::new(&root, config.check_timeout());
    let tracker_ref: Option<&dyn IssueTracker> = if config.tracker.enabled {
        Some(&tracker)
    } else {
        None
    };
    preflight(&root, &config, tracker_ref)?;

    let store = ArtifactStore::new(&root);
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    prepare_run(&store, &config, &stamp)?;
    if let Err(err) = logging::init(store.paths(), config.debug) {
        eprintln!("logging unavailable: {err:#}");
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .context("install interrupt handler")?;

    let executor = PiExecutor::new(&config.agent.program, config.agent.extra_args.clone());
    let checks = CommandCheckRunner::new(CommandLine::Text(config.check_cmd.clone()));
    let interactive = InteractiveAgent::new(&config.agent.program, config.agent.extra_args.clone());
    let clarifier: Option<&dyn Clarifier> =
        if config.clarify.enabled && InteractiveAgent::available() {
            Some(&interactive)
        } else {
            None
        };
    if config.clarify.enabled && clarifier.is_none() {
        tracing::warn!("clarify requested but stdin is not a terminal; disabled");
    }

    let outcome = run_loop(
        &root,
        &config,
        Collaborators {
            executor: &executor,
            checks: &checks,
            tracker: tracker_ref,
            clarifier,
        },
        &cancel,
    );
    report::emit(&outcome);
    Ok(exit_codes::for_status(&outcome.status))
}
