//! Command-line argument parsing for patchnet-cli
//!
//! Uses clap derive macros; every structure is unit-testable with
//! `Args::try_parse_from`.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

use crate::model::{Activation, ConcatOrder, NetworkConfig, QuantizationScheme, RoundingMode};
use crate::{eval::DEFAULT_REPORT_EVERY, PatchNetResult};

/// patchnet-cli: quantized raw inference for the patch classifier
#[derive(Parser, Debug, Clone)]
#[command(name = "patchnet-cli")]
#[command(version)]
#[command(about = "Quantized scalar inference for a patch-based digit classifier", long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (show timing info)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (suppress progress and non-essential output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as JSON (machine-readable)
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Measure accuracy on a labelled sample file
    Eval(EvalArgs),

    /// Compare quantized against unquantized accuracy
    Parity(ParityArgs),

    /// Quantize a parameter file and report per-tensor error
    Quantize(QuantizeArgs),

    /// Print log-probabilities for samples
    Predict(PredictArgs),
}

/// Parameter file plus the settings that shape the engine
#[derive(ClapArgs, Debug, Clone)]
pub struct ModelArgs {
    /// JSON parameter file
    #[arg(short, long)]
    pub params: PathBuf,

    /// Number of quantization levels
    #[arg(long, default_value_t = 16)]
    pub levels: u32,

    /// Width of the representable weight interval
    #[arg(long, default_value_t = 2.0)]
    pub range: f32,

    /// Tie-breaking rule when rounding to a level
    #[arg(long, value_enum, default_value_t = RoundingArg::HalfAwayFromZero)]
    pub rounding: RoundingArg,

    /// Activation on the final layer before log-softmax
    #[arg(long, value_enum, default_value_t = HeadActivationArg::Identity)]
    pub head_activation: HeadActivationArg,

    /// Require this concatenation order (default: use the file's)
    #[arg(long, value_enum)]
    pub concat_order: Option<ConcatOrderArg>,
}

impl ModelArgs {
    /// Network configuration described by these flags
    ///
    /// # Errors
    ///
    /// Returns a config error for an invalid quantization scheme.
    pub fn config(&self) -> PatchNetResult<NetworkConfig> {
        let scheme = QuantizationScheme::new(self.levels, self.range)?
            .with_rounding(self.rounding.into());
        Ok(NetworkConfig::default()
            .with_quantization(scheme)
            .with_head_activation(self.head_activation.into()))
    }
}

/// Arguments for eval command
#[derive(Parser, Debug, Clone)]
pub struct EvalArgs {
    /// Model settings
    #[command(flatten)]
    pub model: ModelArgs,

    /// JSON sample file
    #[arg(short, long)]
    pub samples: PathBuf,

    /// Samples between progress lines
    #[arg(long, default_value_t = DEFAULT_REPORT_EVERY)]
    pub report_every: usize,

    /// Number of worker threads (default: auto)
    #[arg(long)]
    pub threads: Option<u32>,

    /// Evaluate the unquantized parameters
    #[arg(long)]
    pub no_quantize: bool,
}

/// Arguments for parity command
#[derive(Parser, Debug, Clone)]
pub struct ParityArgs {
    /// Model settings
    #[command(flatten)]
    pub model: ModelArgs,

    /// JSON sample file
    #[arg(short, long)]
    pub samples: PathBuf,

    /// Allowed accuracy difference in percentage points
    #[arg(long, default_value_t = 3.0)]
    pub tolerance: f64,

    /// Number of worker threads (default: auto)
    #[arg(long)]
    pub threads: Option<u32>,
}

/// Arguments for quantize command
#[derive(Parser, Debug, Clone)]
pub struct QuantizeArgs {
    /// Model settings
    #[command(flatten)]
    pub model: ModelArgs,

    /// Write the dequantized parameters to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for predict command
#[derive(Parser, Debug, Clone)]
pub struct PredictArgs {
    /// Model settings
    #[command(flatten)]
    pub model: ModelArgs,

    /// JSON sample file
    #[arg(short, long)]
    pub samples: PathBuf,

    /// Only this sample (default: all)
    #[arg(long)]
    pub index: Option<usize>,
}

/// Rounding rule options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingArg {
    /// Ties move away from zero
    #[default]
    HalfAwayFromZero,
    /// Ties move to the even level
    HalfToEven,
}

impl From<RoundingArg> for RoundingMode {
    fn from(arg: RoundingArg) -> Self {
        match arg {
            RoundingArg::HalfAwayFromZero => Self::HalfAwayFromZero,
            RoundingArg::HalfToEven => Self::HalfToEven,
        }
    }
}

/// Head activation options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeadActivationArg {
    /// Raw logits
    #[default]
    Identity,
    /// Rectified logits
    Relu,
}

impl From<HeadActivationArg> for Activation {
    fn from(arg: HeadActivationArg) -> Self {
        match arg {
            HeadActivationArg::Identity => Self::Identity,
            HeadActivationArg::Relu => Self::Relu,
        }
    }
}

/// Concatenation order options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatOrderArg {
    /// Rows outer (v1)
    RowMajor,
    /// Columns outer (v2)
    ColumnMajor,
}

impl From<ConcatOrderArg> for ConcatOrder {
    fn from(arg: ConcatOrderArg) -> Self {
        match arg {
            ConcatOrderArg::RowMajor => Self::RowMajor,
            ConcatOrderArg::ColumnMajor => Self::ColumnMajor,
        }
    }
}
