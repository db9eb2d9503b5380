//! Accuracy evaluation over labelled images
//!
//! Samples are processed in chunks of `report_every`. Images within a chunk
//! are classified in parallel (feature `parallel`); per-chunk counts are
//! summed and the progress callback fires once a chunk is complete. The
//! first fatal error (bad label, wrong image side) aborts the whole run.

use serde::Serialize;

use crate::error::PatchNetResult;
use crate::model::{Image, RawInferenceEngine};
use crate::parallel::{parallel_count, parallel_try_map};
use crate::progress::{Progress, ProgressCallback};
use crate::{trace_enter, trace_event};

/// Samples between progress callbacks
pub const DEFAULT_REPORT_EVERY: usize = 1000;

/// An image with its ground-truth class
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledImage {
    /// Input image
    pub image: Image,
    /// Class index in `[0, num_classes)`
    pub label: usize,
}

impl LabeledImage {
    /// Pair an image with its label
    #[must_use]
    pub const fn new(image: Image, label: usize) -> Self {
        Self { image, label }
    }
}

/// Correct/total counts of one evaluation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EvalReport {
    /// Samples whose predicted class equals the label
    pub correct: usize,
    /// Samples evaluated
    pub total: usize,
}

impl EvalReport {
    /// Accuracy as a fraction in `[0, 1]`, 0 for an empty run
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    /// Accuracy in percent
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        100.0 * self.fraction()
    }

    /// Combine with the counts of a disjoint run
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            correct: self.correct + other.correct,
            total: self.total + other.total,
        }
    }
}

impl core::fmt::Display for EvalReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Raw Test set: Accuracy: {}/{} ({:.0}%)",
            self.correct,
            self.total,
            self.accuracy()
        )
    }
}

/// Chunked accuracy evaluation for one engine
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    engine: &'a RawInferenceEngine,
    report_every: usize,
}

impl<'a> Evaluator<'a> {
    /// Evaluate with `engine`, reporting every [`DEFAULT_REPORT_EVERY`] samples
    #[must_use]
    pub const fn new(engine: &'a RawInferenceEngine) -> Self {
        Self {
            engine,
            report_every: DEFAULT_REPORT_EVERY,
        }
    }

    /// Set the chunk size; 0 is treated as 1
    #[must_use]
    pub fn with_report_every(mut self, report_every: usize) -> Self {
        self.report_every = report_every.max(1);
        self
    }

    /// Samples per chunk
    #[must_use]
    pub const fn report_every(&self) -> usize {
        self.report_every
    }

    /// Count correct predictions over `samples`
    ///
    /// `progress` receives the cumulative count after each chunk, including
    /// a final short chunk.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PatchNetError::Label`] for a label outside the class
    /// range, or the engine's error for a malformed image.
    pub fn evaluate(
        &self,
        samples: &[LabeledImage],
        progress: ProgressCallback<'_>,
    ) -> PatchNetResult<EvalReport> {
        let _guard = trace_enter!("evaluate");
        let total = samples.len();
        let mut report = EvalReport::default();

        let mut start = 0;
        while start < total {
            let end = (start + self.report_every).min(total);
            let _chunk = trace_enter!("eval_chunk", start, end);
            let correct = parallel_count(start..end, |i| self.is_correct(&samples[i]))?;
            report = report.merge(EvalReport {
                correct,
                total: end - start,
            });

            trace_event!(processed = end, correct = report.correct, "evaluated chunk");
            progress(&Progress::with_phase(end, total, "eval").with_correct(report.correct));
            start = end;
        }

        Ok(report)
    }

    /// Evaluate without progress reporting
    ///
    /// # Errors
    ///
    /// Same as [`Evaluator::evaluate`].
    pub fn evaluate_quiet(&self, samples: &[LabeledImage]) -> PatchNetResult<EvalReport> {
        self.evaluate(samples, &mut crate::progress::null_callback)
    }

    /// Predicted class of every sample, in input order
    ///
    /// # Errors
    ///
    /// Same as [`Evaluator::evaluate`].
    pub fn predictions(&self, samples: &[LabeledImage]) -> PatchNetResult<Vec<usize>> {
        parallel_try_map(0..samples.len(), |i| {
            self.engine.check_label(samples[i].label)?;
            self.engine.classify(&samples[i].image)
        })
    }

    fn is_correct(&self, sample: &LabeledImage) -> PatchNetResult<bool> {
        self.engine.check_label(sample.label)?;
        Ok(self.engine.classify(&sample.image)? == sample.label)
    }
}

/// Agreement between a reference engine and a candidate on the same samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParityReport {
    /// Samples on which both engines predicted the same class
    pub agree: usize,
    /// Samples compared
    pub total: usize,
    /// Correct predictions of the reference engine
    pub reference_correct: usize,
    /// Correct predictions of the candidate engine
    pub candidate_correct: usize,
}

impl ParityReport {
    /// Run both engines over `samples`
    ///
    /// # Errors
    ///
    /// Same as [`Evaluator::evaluate`], for either engine.
    pub fn compare(
        reference: &RawInferenceEngine,
        candidate: &RawInferenceEngine,
        samples: &[LabeledImage],
    ) -> PatchNetResult<Self> {
        let _guard = trace_enter!("parity");
        let reference_pred = Evaluator::new(reference).predictions(samples)?;
        let candidate_pred = Evaluator::new(candidate).predictions(samples)?;

        let mut report = Self {
            total: samples.len(),
            ..Self::default()
        };
        for ((sample, &r), &c) in samples.iter().zip(&reference_pred).zip(&candidate_pred) {
            report.agree += usize::from(r == c);
            report.reference_correct += usize::from(r == sample.label);
            report.candidate_correct += usize::from(c == sample.label);
        }
        Ok(report)
    }

    /// Reference engine's counts
    #[must_use]
    pub const fn reference(&self) -> EvalReport {
        EvalReport {
            correct: self.reference_correct,
            total: self.total,
        }
    }

    /// Candidate engine's counts
    #[must_use]
    pub const fn candidate(&self) -> EvalReport {
        EvalReport {
            correct: self.candidate_correct,
            total: self.total,
        }
    }

    /// Fraction of samples with matching predictions
    #[must_use]
    pub fn agreement(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.agree as f64 / self.total as f64
        }
    }

    /// Candidate accuracy minus reference accuracy, in percentage points
    #[must_use]
    pub fn accuracy_delta_pp(&self) -> f64 {
        self.candidate().accuracy() - self.reference().accuracy()
    }

    /// Check whether the accuracies differ by at most `tolerance_pp` points
    #[must_use]
    pub fn within(&self, tolerance_pp: f64) -> bool {
        self.accuracy_delta_pp().abs() <= tolerance_pp
    }
}
