//! Unattended convergence loop around a coding agent.
//!
//! The loop runs a verification command, hands failures to the agent, reviews
//! the resulting changes, and repeats until the command passes and the review
//! is clean, with bounded retries and stagnation detection. The architecture
//! enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (fingerprints, detectors, the
//!   safety gate, verdict parsing). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (processes, git, artifacts, the
//!   agent and the issue tracker). Isolated behind traits for tests.
//!
//! Orchestration modules ([`controller`], [`review`], [`pr_threads`],
//! [`report`], [`preflight`]) coordinate core logic with I/O.

pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pr_threads;
pub mod preflight;
pub mod report;
pub mod review;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
