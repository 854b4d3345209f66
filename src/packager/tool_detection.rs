//! External tool detection.
//!
//! Every stage depends on an Apple command line tool. Checking them all up
//! front means a missing tool is reported before anything is signed, rather
//! than after minutes of packaging.

use crate::error::CliError;
use std::path::PathBuf;

/// Tools the pipeline invokes, in pipeline order.
///
/// `notarytool` and `stapler` are reached through `xcrun`.
pub const REQUIRED_TOOLS: &[&str] = &["codesign", "pkgbuild", "productbuild", "pkgutil", "xcrun"];

/// Lookup result for one tool.
#[derive(Debug, Clone)]
pub struct ToolStatus {
    /// Tool name
    pub name: &'static str,
    /// Resolved path, `None` when not on `PATH`
    pub path: Option<PathBuf>,
}

impl ToolStatus {
    /// Whether the tool was found.
    pub fn available(&self) -> bool {
        self.path.is_some()
    }
}

/// Look up every required tool.
pub fn detect_tools() -> Vec<ToolStatus> {
    REQUIRED_TOOLS
        .iter()
        .map(|&name| match which::which(name) {
            Ok(path) => {
                log::debug!("Found {} at: {}", name, path.display());
                ToolStatus {
                    name,
                    path: Some(path),
                }
            }
            Err(e) => {
                log::debug!("{} not found in PATH: {}", name, e);
                ToolStatus { name, path: None }
            }
        })
        .collect()
}

/// Fail with the first missing tool.
pub fn preflight() -> Result<(), CliError> {
    match detect_tools().into_iter().find(|t| !t.available()) {
        Some(missing) => Err(CliError::ToolNotFound {
            tool: missing.name.to_string(),
        }),
        None => Ok(()),
    }
}
