//! Progress reporting for evaluation runs
//!
//! Evaluation calls back once per completed chunk of samples with a running
//! tally, which the CLI prints as "Processed N/T samples...".
//!
//! # Usage
//!
//! ```rust,ignore
//! use patchnet::progress::Progress;
//!
//! let mut report = |p: &Progress| eprintln!("{}", p.display_message());
//! evaluator.evaluate(&samples, &mut report)?;
//! ```

/// Progress of a chunked run over samples
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    /// Samples processed so far
    pub current: usize,
    /// Total samples
    pub total: usize,
    /// Correct predictions so far, if the run is counting them
    pub correct: Option<usize>,
    /// Current phase/stage name
    pub phase: String,
    /// Human-readable message
    pub message: String,
}

impl Progress {
    /// Create a new progress instance
    #[must_use]
    pub fn new(current: usize, total: usize) -> Self {
        Self {
            current,
            total,
            correct: None,
            phase: String::new(),
            message: format!("Processed {current}/{total} samples..."),
        }
    }

    /// Create progress with a phase name
    #[must_use]
    pub fn with_phase(current: usize, total: usize, phase: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            ..Self::new(current, total)
        }
    }

    /// Attach the running count of correct predictions
    #[must_use]
    pub fn with_correct(mut self, correct: usize) -> Self {
        self.correct = Some(correct);
        self
    }

    /// Set the message
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get progress percentage (0.0 to 100.0)
    #[must_use]
    pub fn percent(&self) -> f32 {
        self.fraction() * 100.0
    }

    /// Get normalized progress (0.0 to 1.0)
    #[must_use]
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f32 / self.total as f32
        }
    }

    /// Running accuracy in percent over the samples processed so far
    #[must_use]
    pub fn running_accuracy(&self) -> Option<f64> {
        match (self.correct, self.current) {
            (Some(_), 0) | (None, _) => None,
            (Some(c), n) => Some(100.0 * c as f64 / n as f64),
        }
    }

    /// Check if operation is complete
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }

    /// Get human-readable message
    #[must_use]
    pub fn display_message(&self) -> &str {
        &self.message
    }
}

/// Progress callback type
pub type ProgressCallback<'a> = &'a mut dyn FnMut(&Progress);

/// No-op progress callback
pub fn null_callback(_progress: &Progress) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_new() {
        let p = Progress::new(1000, 10000);
        assert_eq!(p.current, 1000);
        assert_eq!(p.total, 10000);
        assert_eq!(p.display_message(), "Processed 1000/10000 samples...");
        assert!(p.correct.is_none());
    }

    #[test]
    fn test_progress_with_phase() {
        let p = Progress::with_phase(5, 10, "eval");
        assert_eq!(p.phase, "eval");
        assert_eq!(p.display_message(), "Processed 5/10 samples...");
    }

    #[test]
    fn test_progress_percent() {
        let p = Progress::new(25, 100);
        assert!((p.percent() - 25.0).abs() < 0.001);
        assert!((p.fraction() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_progress_percent_zero_total() {
        let p = Progress::new(0, 0);
        assert_eq!(p.percent(), 0.0);
        assert!(p.is_complete());
    }

    #[test]
    fn test_progress_is_complete() {
        assert!(!Progress::new(9, 10).is_complete());
        assert!(Progress::new(10, 10).is_complete());
    }

    #[test]
    fn test_running_accuracy() {
        assert_eq!(Progress::new(4, 10).running_accuracy(), None);
        assert_eq!(Progress::new(0, 10).with_correct(0).running_accuracy(), None);
        let acc = Progress::new(4, 10).with_correct(3).running_accuracy();
        assert!(acc.map_or(false, |a| (a - 75.0).abs() < 1e-9));
    }

    #[test]
    fn test_progress_message_builder() {
        let p = Progress::new(1, 2).message("custom");
        assert_eq!(p.display_message(), "custom");
    }

    #[test]
    fn test_null_callback() {
        null_callback(&Progress::new(1, 1));
    }

    #[test]
    fn test_callback_invocation() {
        let mut seen = Vec::new();
        {
            let mut record = |p: &Progress| seen.push(p.current);
            let callback: ProgressCallback<'_> = &mut record;
            callback(&Progress::new(1000, 2500));
            callback(&Progress::new(2000, 2500));
        }
        assert_eq!(seen, vec![1000, 2000]);
    }
}
