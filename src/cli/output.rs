//! Output formatters for patchnet-cli
//!
//! Every command renders either a human-readable text block or a JSON
//! document (`--json`).

use std::fmt::Write;

use serde_json::json;

use crate::eval::{EvalReport, ParityReport};
use crate::model::{Prediction, QuantizationScheme, QuantizationStats};

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Plain text
    #[default]
    Text,
    /// JSON format
    Json,
}

impl OutputFormat {
    /// Pick the format from the global `--json` flag
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// One row of `predict` output
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    /// Sample index in the input file
    pub index: usize,
    /// Ground-truth label
    pub label: usize,
    /// Engine output
    pub prediction: Prediction,
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Format an accuracy report
#[must_use]
pub fn format_eval(report: &EvalReport, quantized: bool, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => report.to_string(),
        OutputFormat::Json => pretty(&json!({
            "quantized": quantized,
            "correct": report.correct,
            "total": report.total,
            "accuracy": report.accuracy(),
        })),
    }
}

/// Format a parity report against a tolerance
#[must_use]
pub fn format_parity(report: &ParityReport, tolerance_pp: f64, format: OutputFormat) -> String {
    let within = report.within(tolerance_pp);
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "Reference: {}/{} ({:.2}%)",
                report.reference_correct,
                report.total,
                report.reference().accuracy()
            );
            let _ = writeln!(
                out,
                "Quantized: {}/{} ({:.2}%)",
                report.candidate_correct,
                report.total,
                report.candidate().accuracy()
            );
            let _ = writeln!(
                out,
                "Agreement: {}/{} ({:.2}%)",
                report.agree,
                report.total,
                100.0 * report.agreement()
            );
            let _ = write!(
                out,
                "Delta: {:+.2} pp (tolerance {tolerance_pp:.2} pp) {}",
                report.accuracy_delta_pp(),
                if within { "PASS" } else { "FAIL" }
            );
            out
        }
        OutputFormat::Json => pretty(&json!({
            "agree": report.agree,
            "total": report.total,
            "reference_correct": report.reference_correct,
            "quantized_correct": report.candidate_correct,
            "accuracy_delta_pp": report.accuracy_delta_pp(),
            "tolerance_pp": tolerance_pp,
            "within_tolerance": within,
        })),
    }
}

/// Format per-tensor quantization statistics
#[must_use]
pub fn format_quantize(
    scheme: &QuantizationScheme,
    stats: &[(String, QuantizationStats)],
    packed_bytes: usize,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "Scheme: {} levels over {} ({} bits, step {}, {} rounding)",
                scheme.levels,
                scheme.range,
                scheme.bits(),
                scheme.step(),
                scheme.rounding
            );
            let _ = writeln!(
                out,
                "{:<12} {:>12} {:>12} {:>10} {:>10}",
                "tensor", "mse", "max_err", "saturated", "sqnr_db"
            );
            for (name, s) in stats {
                let _ = writeln!(
                    out,
                    "{name:<12} {:>12.3e} {:>12.4} {:>10} {:>10.2}",
                    s.mse, s.max_abs_error, s.saturated, s.sqnr_db
                );
            }
            let _ = write!(out, "Packed size: {packed_bytes} bytes");
            out
        }
        OutputFormat::Json => {
            let tensors: Vec<_> = stats
                .iter()
                .map(|(name, s)| {
                    json!({
                        "name": name,
                        "mse": s.mse,
                        "max_abs_error": s.max_abs_error,
                        "saturated": s.saturated,
                        "sqnr_db": s.sqnr_db,
                    })
                })
                .collect();
            pretty(&json!({
                "levels": scheme.levels,
                "range": scheme.range,
                "rounding": scheme.rounding,
                "bits": scheme.bits(),
                "packed_bytes": packed_bytes,
                "tensors": tensors,
            }))
        }
    }
}

/// Format predictions, one line per sample
#[must_use]
pub fn format_predictions(rows: &[PredictionRow], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => rows
            .iter()
            .map(|row| {
                let log_probs: Vec<String> = row
                    .prediction
                    .log_probs
                    .iter()
                    .map(|lp| format!("{lp:.4}"))
                    .collect();
                format!(
                    "#{} label={} pred={} [{}]",
                    row.index,
                    row.label,
                    row.prediction.class,
                    log_probs.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::Json => {
            let items: Vec<_> = rows
                .iter()
                .map(|row| {
                    json!({
                        "index": row.index,
                        "label": row.label,
                        "class": row.prediction.class,
                        "log_probs": row.prediction.log_probs,
                    })
                })
                .collect();
            pretty(&serde_json::Value::Array(items))
        }
    }
}
