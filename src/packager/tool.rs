//! External tool invocation.
//!
//! Every stage talks to the platform tools (`codesign`, `pkgbuild`,
//! `productbuild`, `pkgutil`, `xcrun notarytool`, `xcrun stapler`) through the
//! [`ToolRunner`] trait. [`SystemToolRunner`] spawns real processes; tests
//! substitute a recording fake.

use crate::error::ToolFailure;
use std::ffi::OsString;
use std::future::Future;
use std::path::Path;

/// A single external command: program plus arguments.
///
/// Arguments are kept as [`OsString`] so bundle paths reach the tools byte
/// for byte, including names that are not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name, resolved through `PATH`
    pub program: String,
    /// Arguments in order
    pub args: Vec<OsString>,
}

impl Invocation {
    /// Start an invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    pub fn path(self, path: &Path) -> Self {
        self.arg(path)
    }

    /// Subcommand of `xcrun`, e.g. `notarytool` or `stapler`.
    pub fn xcrun(tool: &str) -> Self {
        Self::new("xcrun").arg(tool)
    }

    /// Human-readable command line for logs and error messages.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(&arg);
                line.push('"');
            } else {
                line.push_str(&arg);
            }
        }
        line
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` if terminated by a signal
    pub status: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Convert into a [`ToolFailure`] describing `invocation`.
    pub fn into_failure(self, invocation: &Invocation) -> ToolFailure {
        ToolFailure {
            command: invocation.command_line(),
            status: self.status,
            stdout: self.stdout,
            stderr: self.stderr,
        }
    }
}

/// Failure to launch a command at all (binary missing, permission denied).
pub fn launch_failure(invocation: &Invocation, error: &std::io::Error) -> ToolFailure {
    ToolFailure {
        command: invocation.command_line(),
        status: None,
        stdout: String::new(),
        stderr: format!("failed to launch {}: {}", invocation.program, error),
    }
}

/// Runs external commands on behalf of the pipeline stages.
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` to completion and capture its output.
    ///
    /// A non-zero exit is reported through [`ToolOutput::status`], not as an
    /// `Err`; `Err` means the process could not be started.
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = std::io::Result<ToolOutput>> + Send;
}

/// Run `invocation` and turn both launch errors and non-zero exits into a
/// [`ToolFailure`].
pub async fn run_checked<R: ToolRunner>(
    runner: &R,
    invocation: &Invocation,
) -> Result<ToolOutput, ToolFailure> {
    let output = runner
        .run(invocation)
        .await
        .map_err(|e| launch_failure(invocation, &e))?;

    if output.success() {
        Ok(output)
    } else {
        Err(output.into_failure(invocation))
    }
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolRunner;

impl ToolRunner for SystemToolRunner {
    async fn run(&self, invocation: &Invocation) -> std::io::Result<ToolOutput> {
        log::debug!("Running: {}", invocation.command_line());

        let output = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .kill_on_drop(true)
            .output()
            .await?;

        let result = ToolOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            log::debug!(
                "{} exited with {:?}: {}",
                invocation.program,
                result.status,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}
