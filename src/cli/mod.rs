//! Command line interface for kodegen_bundler_pkg.
//!
//! Argument parsing, subcommand dispatch and colored operator output.

mod args;
pub mod commands;
mod output;

pub use args::{Args, Command, NotarizeArgs, NotaryArgs, PackageArgs, is_team_id};
pub use commands::execute_command;
pub use output::OutputManager;

use crate::error::{CliError, Result};

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}

/// Parse arguments without executing (for testing)
pub fn parse_args() -> Args {
    Args::parse_args()
}

/// Validate arguments without executing (for testing)
pub fn validate_args(args: &Args) -> std::result::Result<(), CliError> {
    args.validate()
}
