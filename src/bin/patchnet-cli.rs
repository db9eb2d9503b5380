//! patchnet-cli: evaluate, compare and quantize patch classifier parameters
//!
//! Thin shell over `patchnet::cli`; everything testable lives in the library.

use clap::Parser;
use patchnet::cli::{run, Args};

fn main() {
    #[cfg(feature = "tracing")]
    init_tracing();

    let args = Args::parse();

    match run(args) {
        Ok(result) => {
            if !result.success {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
