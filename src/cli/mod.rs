//! CLI module for patchnet
//!
//! All logic lives here so it can be tested without spawning a process.
//! The binary (`src/bin/patchnet-cli.rs`) only parses arguments and calls
//! [`run`].
//!
//! ```text
//! src/cli/
//! ├── mod.rs       # This file - module exports
//! ├── args.rs      # Argument parsing with clap
//! ├── commands.rs  # Command implementations
//! └── output.rs    # Text and JSON formatters
//! ```

pub mod args;
pub mod commands;
pub mod output;

pub use args::{Args, Command};
pub use commands::{run, CliError, CliResult, CommandResult};
pub use output::OutputFormat;
