//! Command-line interface for docforge.
//!
//! Provides the `local` and `batch` commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
