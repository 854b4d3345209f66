//! kodegen_bundler_pkg - signed, notarized macOS installer packages.
//!
//! The exit status identifies the failing pipeline stage, see
//! [`kodegen_bundler_pkg::error::PackagerError::exit_code`].

use kodegen_bundler_pkg::cli;
use kodegen_bundler_pkg::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Create output manager for error display (never quiet for fatal errors)
            let output = OutputManager::new(false, false);
            output.error(&format!("Fatal error: {e}"));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    output.indent(&suggestion);
                }
            }

            process::exit(e.exit_code());
        }
    }
}
