//! `doctor`: report which Apple tools are available.

use crate::cli::OutputManager;
use crate::error::{CliError, Result};
use crate::packager::tool::{Invocation, SystemToolRunner, run_checked};
use crate::packager::tool_detection::detect_tools;

/// `xcrun` subcommands the pipeline needs
const XCRUN_TOOLS: &[&str] = &["notarytool", "stapler"];

/// Execute `doctor`
pub(super) async fn execute_doctor(output: &OutputManager) -> Result<()> {
    output.section("Required tools");

    let mut missing = None;
    for status in detect_tools() {
        match &status.path {
            Some(path) => output.success(&format!("{} ({})", status.name, path.display())),
            None => {
                output.warn(&format!("{} not found in PATH", status.name));
                missing.get_or_insert(status.name.to_string());
            }
        }
    }

    if missing.is_none() {
        for &tool in XCRUN_TOOLS {
            let inv = Invocation::new("xcrun").args(["--find", tool]);
            match run_checked(&SystemToolRunner, &inv).await {
                Ok(found) => output.success(&format!("{} ({})", tool, found.stdout.trim())),
                Err(failure) => {
                    log::debug!("{}", failure);
                    output.warn(&format!("xcrun cannot find {}", tool));
                    missing.get_or_insert(tool.to_string());
                }
            }
        }
    }

    match missing {
        Some(tool) => Err(CliError::ToolNotFound { tool }.into()),
        None => {
            output.success("All tools available");
            Ok(())
        }
    }
}
