//! Deterministic classification of failed agent invocations.
//!
//! Agent error text is an external contract that drifts between releases, so
//! the signatures live in configuration rather than in code.

use serde::{Deserialize, Serialize};

use crate::core::types::FailureClass;

/// Case-insensitive substrings recognized in agent output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FailureSignatures {
    /// Failures worth exactly one identical retry.
    pub transient: Vec<String>,
    /// Failures that end the run.
    pub fatal: Vec<String>,
    /// Failures caused by an oversized prompt; trigger emergency compaction.
    pub overflow: Vec<String>,
}

impl Default for FailureSignatures {
    fn default() -> Self {
        Self {
            transient: vec![
                "could not find the exact text".to_string(),
                "could not find edit target".to_string(),
                "oldtext not found".to_string(),
            ],
            fatal: vec![
                "no capacity".to_string(),
                "invalid api key".to_string(),
                "401 unauthorized".to_string(),
            ],
            overflow: vec![
                "long context".to_string(),
                "context length".to_string(),
                "context_length_exceeded".to_string(),
                "prompt is too long".to_string(),
            ],
        }
    }
}

impl FailureSignatures {
    /// Classify the combined output of a failed invocation. Fatal wins over
    /// transient when both match.
    pub fn classify(&self, output: &str) -> FailureClass {
        let lowered = output.to_lowercase();
        if matches_any(&lowered, &self.fatal) {
            FailureClass::Fatal
        } else if matches_any(&lowered, &self.transient) {
            FailureClass::Transient
        } else {
            FailureClass::Unknown
        }
    }

    pub fn is_context_overflow(&self, output: &str) -> bool {
        matches_any(&output.to_lowercase(), &self.overflow)
    }
}

fn matches_any(lowered: &str, signatures: &[String]) -> bool {
    signatures
        .iter()
        .filter(|sig| !sig.trim().is_empty())
        .any(|sig| lowered.contains(&sig.to_lowercase()))
}
