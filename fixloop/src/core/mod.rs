//! Deterministic, pure logic shared by the loop controller.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod compaction;
pub mod context;
pub mod filter;
pub mod fingerprint;
pub mod oscillation;
pub mod review;
pub mod run;
pub mod safety;
pub mod stagnation;
pub mod threads;
pub mod types;
