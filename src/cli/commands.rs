//! Command implementations for patchnet-cli
//!
//! Each command is a plain function over parsed arguments; `run` dispatches
//! to it and the binary only reports the outcome.

use std::io;
use std::path::Path;
use std::time::Instant;

use crate::eval::{Evaluator, LabeledImage, ParityReport};
use crate::format::{self, ParameterFile};
use crate::model::{NetworkConfig, ParameterSet, RawInferenceEngine};
use crate::parallel::configure_thread_pool;
use crate::progress::Progress;

use super::args::{Args, Command, EvalArgs, ModelArgs, ParityArgs, PredictArgs, QuantizeArgs};
use super::output::{
    format_eval, format_parity, format_predictions, format_quantize, OutputFormat, PredictionRow,
};

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Library error
    #[error("{0}")]
    PatchNet(#[from] crate::PatchNetError),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

/// Command execution result
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded
    pub success: bool,
    /// Rendered output, already printed unless `--quiet`
    pub message: String,
}

impl CommandResult {
    /// Create a success result
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Create a failure result
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Run CLI with parsed arguments
///
/// # Errors
///
/// Returns the first error hit while loading inputs or running inference.
pub fn run(args: Args) -> CliResult<CommandResult> {
    let result = match &args.command {
        Command::Eval(e) => run_eval(e, &args)?,
        Command::Parity(p) => run_parity(p, &args)?,
        Command::Quantize(q) => run_quantize(q, &args)?,
        Command::Predict(p) => run_predict(p, &args)?,
    };
    if !args.quiet || args.json {
        println!("{}", result.message);
    }
    Ok(result)
}

fn output_format(global: &Args) -> OutputFormat {
    OutputFormat::from_json_flag(global.json)
}

fn info(global: &Args, message: impl AsRef<str>) {
    if global.verbose && !global.quiet {
        eprintln!("[INFO] {}", message.as_ref());
    }
}

fn ensure_exists(path: &Path) -> CliResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::FileNotFound(path.display().to_string()))
    }
}

/// Load and validate a parameter file under the flags' configuration
///
/// The file's concatenation order overrides the default unless
/// `--concat-order` pins one, in which case the file must match it.
///
/// # Errors
///
/// Returns [`CliError::FileNotFound`], or the library's format/shape error,
/// or a config error when the file's order differs from the pinned order.
pub fn load_model(model: &ModelArgs) -> CliResult<(NetworkConfig, ParameterFile, ParameterSet)> {
    ensure_exists(&model.params)?;
    let file = format::load_parameters(&model.params)?;
    let config = match model.concat_order {
        Some(pinned) => {
            let config = model.config()?.with_concat_order(pinned.into());
            file.check_order(&config)?;
            config
        }
        None => file.configure(model.config()?),
    };
    let params = file.to_parameters()?;
    params.validate(&config)?;
    Ok((config, file, params))
}

fn load_samples(path: &Path, config: &NetworkConfig) -> CliResult<Vec<LabeledImage>> {
    ensure_exists(path)?;
    Ok(format::load_samples(path, config.image_side)?)
}

fn build_engine(
    config: NetworkConfig,
    params: &ParameterSet,
    quantize: bool,
) -> CliResult<RawInferenceEngine> {
    let engine = if quantize {
        RawInferenceEngine::quantized(config, params)?
    } else {
        RawInferenceEngine::from_parameters(config, params)?
    };
    Ok(engine)
}

/// Run eval command
///
/// # Errors
///
/// See [`run`].
pub fn run_eval(args: &EvalArgs, global: &Args) -> CliResult<CommandResult> {
    let start = Instant::now();
    let threads = configure_thread_pool(args.threads)?;
    info(global, format!("Worker threads: {threads}"));

    let (config, _, params) = load_model(&args.model)?;
    info(
        global,
        format!(
            "Loaded {} parameters ({}), {} levels over {}",
            params.parameter_count(),
            config.concat_order,
            config.quantization.levels,
            config.quantization.range
        ),
    );
    let samples = load_samples(&args.samples, &config)?;
    let engine = build_engine(config, &params, !args.no_quantize)?;

    let show_progress = !global.quiet && !global.json;
    let mut on_progress = |p: &Progress| {
        if show_progress {
            eprintln!("{}", p.display_message());
        }
    };
    let report = Evaluator::new(&engine)
        .with_report_every(args.report_every)
        .evaluate(&samples, &mut on_progress)?;

    info(
        global,
        format!("Evaluated {} samples in {:.2?}", report.total, start.elapsed()),
    );
    Ok(CommandResult::success(format_eval(
        &report,
        !args.no_quantize,
        output_format(global),
    )))
}

/// Run parity command
///
/// Fails (exit code 1) when the accuracy delta exceeds `--tolerance`.
///
/// # Errors
///
/// See [`run`].
pub fn run_parity(args: &ParityArgs, global: &Args) -> CliResult<CommandResult> {
    if !(args.tolerance.is_finite() && args.tolerance >= 0.0) {
        return Err(CliError::InvalidArgument(format!(
            "tolerance must be a non-negative number, got {}",
            args.tolerance
        )));
    }
    configure_thread_pool(args.threads)?;

    let (config, _, params) = load_model(&args.model)?;
    let samples = load_samples(&args.samples, &config)?;
    let reference = build_engine(config, &params, false)?;
    let quantized = build_engine(config, &params, true)?;

    let report = ParityReport::compare(&reference, &quantized, &samples)?;
    let message = format_parity(&report, args.tolerance, output_format(global));
    if report.within(args.tolerance) {
        Ok(CommandResult::success(message))
    } else {
        Ok(CommandResult::failure(message))
    }
}

/// Run quantize command
///
/// # Errors
///
/// See [`run`].
pub fn run_quantize(args: &QuantizeArgs, global: &Args) -> CliResult<CommandResult> {
    let (config, file, params) = load_model(&args.model)?;
    let scheme = config.quantization;
    let quantized = params.quantize(&scheme);
    let stats = params.quantization_stats(&scheme);

    if let Some(output) = &args.output {
        let out_file = ParameterFile::from_parameters(&quantized.dequantize(), file.concat_order);
        format::save_parameters(output, &out_file)?;
        info(global, format!("Wrote {}", output.display()));
    }

    Ok(CommandResult::success(format_quantize(
        &scheme,
        &stats,
        quantized.packed_bytes(),
        output_format(global),
    )))
}

/// Run predict command
///
/// # Errors
///
/// Returns [`CliError::InvalidArgument`] for an `--index` past the end of the
/// sample file; otherwise see [`run`].
pub fn run_predict(args: &PredictArgs, global: &Args) -> CliResult<CommandResult> {
    let (config, _, params) = load_model(&args.model)?;
    let samples = load_samples(&args.samples, &config)?;
    let engine = build_engine(config, &params, true)?;

    let indices: Vec<usize> = match args.index {
        Some(i) if i >= samples.len() => {
            return Err(CliError::InvalidArgument(format!(
                "index {i} out of range for {} samples",
                samples.len()
            )))
        }
        Some(i) => vec![i],
        None => (0..samples.len()).collect(),
    };

    let rows = indices
        .into_iter()
        .map(|index| {
            let sample = &samples[index];
            Ok(PredictionRow {
                index,
                label: sample.label,
                prediction: engine.predict(&sample.image)?,
            })
        })
        .collect::<CliResult<Vec<_>>>()?;

    Ok(CommandResult::success(format_predictions(
        &rows,
        output_format(global),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConcatOrder, Image};
    use clap::Parser;
    use std::path::PathBuf;

    struct Fixture {
        _dir: tempfile::TempDir,
        params: PathBuf,
        samples: PathBuf,
        output: PathBuf,
    }

    /// Model that always predicts class 2, plus samples labelled 2, 2, 5
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().map_or_else(|e| panic!("{e}"), |d| d);
        let config = NetworkConfig::default();
        let mut params = ParameterSet::zeros(&config);
        params.head.bias.data[2] = 0.5;
        params.patch.weight.data[0] = 0.3;

        let params_path = dir.path().join("params.json");
        let file = ParameterFile::from_parameters(&params, ConcatOrder::RowMajor);
        format::save_parameters(&params_path, &file).map_or_else(|e| panic!("{e}"), |()| ());

        let samples_path = dir.path().join("samples.json");
        let samples: Vec<LabeledImage> = [2, 2, 5]
            .iter()
            .map(|&l| LabeledImage::new(Image::zeros(28), l))
            .collect();
        format::save_samples(&samples_path, &samples).map_or_else(|e| panic!("{e}"), |()| ());

        Fixture {
            params: params_path,
            samples: samples_path,
            output: dir.path().join("quantized.json"),
            _dir: dir,
        }
    }

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["patchnet-cli", "--quiet"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).map_or_else(|e| panic!("{e}"), |a| a)
    }

    fn path(p: &Path) -> &str {
        p.to_str().unwrap_or_else(|| panic!("non-utf8 path"))
    }

    #[test]
    fn test_run_eval() {
        let fx = fixture();
        let args = parse(&["eval", "-p", path(&fx.params), "-s", path(&fx.samples)]);
        let result = run(args).map_or_else(|e| panic!("{e}"), |r| r);
        assert!(result.success);
        assert_eq!(result.message, "Raw Test set: Accuracy: 2/3 (67%)");
    }

    #[test]
    fn test_run_eval_json_unquantized() {
        let fx = fixture();
        let args = parse(&[
            "--json",
            "eval",
            "-p",
            path(&fx.params),
            "-s",
            path(&fx.samples),
            "--no-quantize",
            "--report-every",
            "1",
        ]);
        let result = run(args).map_or_else(|e| panic!("{e}"), |r| r);
        let parsed: serde_json::Value =
            serde_json::from_str(&result.message).map_or_else(|e| panic!("{e}"), |v| v);
        assert_eq!(parsed["correct"], 2);
        assert_eq!(parsed["quantized"], false);
    }

    #[test]
    fn test_run_parity_passes() {
        let fx = fixture();
        let args = parse(&["parity", "-p", path(&fx.params), "-s", path(&fx.samples)]);
        let result = run(args).map_or_else(|e| panic!("{e}"), |r| r);
        assert!(result.success);
        assert!(result.message.ends_with("PASS"));
    }

    #[test]
    fn test_run_parity_rejects_negative_tolerance() {
        let fx = fixture();
        let args = parse(&[
            "parity",
            "-p",
            path(&fx.params),
            "-s",
            path(&fx.samples),
            "--tolerance=-1",
        ]);
        assert!(matches!(run(args), Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn test_run_quantize_writes_grid_values() {
        let fx = fixture();
        let args = parse(&[
            "quantize",
            "-p",
            path(&fx.params),
            "-o",
            path(&fx.output),
        ]);
        let result = run(args).map_or_else(|e| panic!("{e}"), |r| r);
        assert!(result.message.contains("fc3.bias"));

        let written = format::load_parameters(&fx.output).map_or_else(|e| panic!("{e}"), |f| f);
        // 0.3 -> 0.25, 0.5 stays on the grid
        assert_eq!(written.fc1_weight[0][0], 0.25);
        assert_eq!(written.fc3_bias[2], 0.5);
    }

    #[test]
    fn test_run_predict_index() {
        let fx = fixture();
        let args = parse(&[
            "predict",
            "-p",
            path(&fx.params),
            "-s",
            path(&fx.samples),
            "--index",
            "2",
        ]);
        let result = run(args).map_or_else(|e| panic!("{e}"), |r| r);
        assert!(result.message.starts_with("#2 label=5 pred=2"));

        let args = parse(&[
            "predict",
            "-p",
            path(&fx.params),
            "-s",
            path(&fx.samples),
            "--index",
            "3",
        ]);
        assert!(matches!(run(args), Err(CliError::InvalidArgument(_))));
    }

    #[test]
    fn test_pinned_concat_order_must_match_file() {
        let fx = fixture();
        let args = parse(&[
            "eval", "-p", path(&fx.params), "-s", path(&fx.samples), "--concat-order", "row-major",
        ]);
        assert!(run(args).map_or(false, |r| r.success));

        let args = parse(&[
            "eval", "-p", path(&fx.params), "-s", path(&fx.samples), "--concat-order", "column-major",
        ]);
        assert!(matches!(
            run(args),
            Err(CliError::PatchNet(crate::PatchNetError::Config(_)))
        ));
    }

    #[test]
    fn test_missing_file() {
        let fx = fixture();
        let args = parse(&["eval", "-p", "/nonexistent/params.json", "-s", path(&fx.samples)]);
        assert!(matches!(run(args), Err(CliError::FileNotFound(_))));
    }

    #[test]
    fn test_mismatched_parameters_error() {
        let fx = fixture();
        std::fs::write(
            &fx.params,
            r#"{"fc1_weight": [[0.0]], "fc1_bias": [0.0], "fc2_weight": [[0.0]],
                "fc2_bias": [0.0], "fc3_weight": [[0.0]], "fc3_bias": [0.0]}"#,
        )
        .map_or_else(|e| panic!("{e}"), |()| ());
        let args = parse(&["eval", "-p", path(&fx.params), "-s", path(&fx.samples)]);
        assert!(matches!(
            run(args),
            Err(CliError::PatchNet(crate::PatchNetError::Shape(_)))
        ));
    }
}
