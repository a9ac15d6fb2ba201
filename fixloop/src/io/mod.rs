//! I/O adapters: processes, git, artifacts, configuration and the agent.

pub mod agent;
pub mod artifacts;
pub mod check;
pub mod config;
pub mod executor;
pub mod git;
pub mod interactive;
pub mod process;
pub mod prompt;
pub mod tracker;
