//! Stagnation tracking for issue-tracker resolution mode.

/// Consecutive no-progress observations that end the run.
pub const STAGNATION_LIMIT: u32 = 3;

/// Counts consecutive identical progress fingerprints.
///
/// The first observation only establishes a baseline and returns zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagnationDetector {
    last: Option<String>,
    count: u32,
}

impl StagnationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare against the previous fingerprint and return the updated count.
    pub fn update(&mut self, current: &str) -> u32 {
        if self.last.as_deref() == Some(current) {
            self.count += 1;
        } else {
            self.count = 0;
            self.last = Some(current.to_string());
        }
        self.count
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_stagnant(&self) -> bool {
        self.count >= STAGNATION_LIMIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_observation_returns_zero() {
        let mut detector = StagnationDetector::new();
        assert_eq!(detector.update("fp"), 0);
        assert!(!detector.is_stagnant());
    }

    /// Verifies three identical observations after the baseline count 1, 2, 3
    /// and that the third one trips the limit.
    #[test]
    fn identical_fingerprints_count_up_to_limit() {
        let mut detector = StagnationDetector::new();
        detector.update("fp");
        assert_eq!(detector.update("fp"), 1);
        assert_eq!(detector.update("fp"), 2);
        assert!(!detector.is_stagnant());
        assert_eq!(detector.update("fp"), 3);
        assert!(detector.is_stagnant());
    }

    #[test]
    fn differing_fingerprint_resets_to_zero() {
        let mut detector = StagnationDetector::new();
        detector.update("a");
        detector.update("a");
        detector.update("a");
        assert_eq!(detector.update("b"), 0);
        assert_eq!(detector.count(), 0);
        assert_eq!(detector.update("b"), 1);
    }
}
