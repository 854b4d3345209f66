//! Error types for the release packager.
//!
//! One error enum per pipeline stage, wrapped by [`PackagerError`] which adds
//! configuration/CLI failures, exit-code mapping and recovery suggestions.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for packager operations
pub type Result<T> = std::result::Result<T, PackagerError>;

/// Exit status for invalid arguments or configuration
pub const EXIT_USAGE: i32 = 2;
/// Exit status when `SignArtifacts` fails
pub const EXIT_SIGNING: i32 = 10;
/// Exit status when `BuildComponentPackage` fails
pub const EXIT_PACKAGING: i32 = 11;
/// Exit status when `BuildDistribution` fails
pub const EXIT_DISTRIBUTION: i32 = 12;
/// Exit status when notarization is rejected or fails
pub const EXIT_NOTARIZATION: i32 = 13;
/// Exit status when the notarization wait elapses or is cancelled
pub const EXIT_TIMEOUT: i32 = 14;
/// Exit status when stapling fails
pub const EXIT_STAPLE: i32 = 15;
/// Exit status when Ctrl-C stops the run before notarization
pub const EXIT_INTERRUPTED: i32 = 130;

/// Main error type for all packager operations
#[derive(Error, Debug)]
pub enum PackagerError {
    /// Signing stage errors
    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    /// Component packaging stage errors
    #[error("Component packaging failed: {0}")]
    Packaging(#[from] PackagingError),

    /// Distribution stage errors
    #[error("Distribution build failed: {0}")]
    Distribution(#[from] DistributionError),

    /// Notarization stage errors
    #[error("Notarization failed: {0}")]
    Notarization(#[from] NotarizationError),

    /// Notarization wait elapsed or was cancelled
    #[error("Notarization timed out: {0}")]
    Timeout(#[from] TimeoutError),

    /// Stapling stage errors
    #[error("Stapling failed: {0}")]
    Staple(#[from] StapleError),

    /// Packager.toml errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// File system error with path context
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// Operation being performed (e.g. "writing release report")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: std::io::Error,
    },

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Ctrl-C arrived before or during a local stage
    #[error("Interrupted during {stage}; no later stage ran")]
    Interrupted {
        /// Stage that was running or about to start
        stage: &'static str,
    },
}

/// Captured output of an external tool that exited unsuccessfully.
///
/// `Display` reproduces the tool's own diagnostics unchanged so the operator
/// sees exactly what `codesign`, `productbuild` or `notarytool` reported.
#[derive(Debug, Clone)]
pub struct ToolFailure {
    /// Command line that was executed
    pub command: String,
    /// Exit code, `None` when the process could not be launched or was killed
    pub status: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "`{}` exited with status {}", self.command, code)?,
            None => write!(f, "`{}` did not run to completion", self.command)?,
        }
        let stderr = self.stderr.trim_end();
        let stdout = self.stdout.trim_end();
        if !stderr.is_empty() {
            write!(f, "\n{}", stderr)?;
        }
        if !stdout.is_empty() {
            write!(f, "\n{}", stdout)?;
        }
        Ok(())
    }
}

/// `SignArtifacts` errors
#[derive(Error, Debug)]
pub enum SigningError {
    /// Application bundle does not exist
    #[error("application bundle not found: {}", path.display())]
    BundleNotFound {
        /// Expected bundle path
        path: PathBuf,
    },

    /// Bundle layout could not be understood
    #[error("invalid application bundle {}: {reason}", path.display())]
    InvalidBundle {
        /// Bundle path
        path: PathBuf,
        /// Reason for the error
        reason: String,
    },

    /// Entitlements policy file is missing
    #[error("entitlements file not found: {}", path.display())]
    MissingEntitlements {
        /// Configured entitlements path
        path: PathBuf,
    },

    /// Entitlements policy file is not a property list
    #[error("entitlements file {} is not a valid property list: {reason}", path.display())]
    InvalidEntitlements {
        /// Configured entitlements path
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// Bundle already carries a stapled notarization ticket
    #[error(
        "{} already carries a stapled notarization ticket; re-signing would invalidate it (pass --force-resign to discard it)",
        path.display()
    )]
    AlreadyStapled {
        /// Bundle path
        path: PathBuf,
    },

    /// codesign rejected an artifact
    #[error("signature rejected for {}: {failure}", artifact.display())]
    Rejected {
        /// Artifact being signed
        artifact: PathBuf,
        /// codesign diagnostics
        failure: ToolFailure,
    },

    /// Signed bundle did not pass strict verification
    #[error("signature verification failed for {}: {failure}", path.display())]
    VerificationFailed {
        /// Bundle path
        path: PathBuf,
        /// codesign diagnostics
        failure: ToolFailure,
    },

    /// Filesystem error while preparing the bundle
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// Operation being performed
        context: &'static str,
        /// Path being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: std::io::Error,
    },
}

/// `BuildComponentPackage` errors
#[derive(Error, Debug)]
pub enum PackagingError {
    /// Identifier already used by another component in this run
    #[error("package identifier '{identifier}' is already used by another component")]
    IdentifierCollision {
        /// Duplicated identifier
        identifier: String,
    },

    /// Identifier is not a reverse-domain name
    #[error("package identifier '{identifier}' is not a reverse-domain name (e.g. com.example.app)")]
    InvalidIdentifier {
        /// Offending identifier
        identifier: String,
    },

    /// No minimum OS version was configured
    #[error("component '{identifier}' has no minimum macOS version")]
    MissingMinimumOs {
        /// Component identifier
        identifier: String,
    },

    /// Install location must be absolute
    #[error("install location for '{identifier}' must be absolute, got {}", location.display())]
    RelativeInstallLocation {
        /// Component identifier
        identifier: String,
        /// Configured location
        location: PathBuf,
    },

    /// pkgbuild failed
    #[error("pkgbuild failed for '{identifier}': {failure}")]
    Tool {
        /// Component identifier
        identifier: String,
        /// pkgbuild diagnostics
        failure: ToolFailure,
    },

    /// Filesystem error while staging
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// Operation being performed
        context: &'static str,
        /// Path being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: std::io::Error,
    },
}

/// `BuildDistribution` errors
#[derive(Error, Debug)]
pub enum DistributionError {
    /// No component packages were supplied
    #[error("a distribution needs at least one component package")]
    NoComponents,

    /// Components carry different versions
    #[error("component '{identifier}' has version {found}, expected {expected}")]
    VersionMismatch {
        /// Component identifier
        identifier: String,
        /// Version of the first component
        expected: String,
        /// Version found on this component
        found: String,
    },

    /// Manifest template could not be parsed or rendered
    #[error("malformed distribution manifest: {reason}")]
    MalformedManifest {
        /// Reason for the error
        reason: String,
    },

    /// Manifest references a component that was not built
    #[error("distribution manifest references missing component '{identifier}'")]
    MissingComponent {
        /// Referenced identifier
        identifier: String,
    },

    /// A built component is never referenced by the manifest
    #[error("component '{identifier}' is not referenced by the distribution manifest")]
    UnreferencedComponent {
        /// Component identifier
        identifier: String,
    },

    /// productbuild failed
    #[error("productbuild failed: {0}")]
    Tool(ToolFailure),

    /// The built product archive carries no valid signature
    #[error("distribution package {} is not signed: {failure}", path.display())]
    Unsigned {
        /// Package path
        path: PathBuf,
        /// pkgutil diagnostics
        failure: ToolFailure,
    },

    /// Filesystem error
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// Operation being performed
        context: &'static str,
        /// Path being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: std::io::Error,
    },
}

/// `Notarize` errors
#[derive(Error, Debug)]
pub enum NotarizationError {
    /// The service rejected the submission
    #[error("submission {submission_id} was rejected: {reason}")]
    Rejected {
        /// Notary submission id
        submission_id: String,
        /// Status summary and issues reported by the service
        reason: String,
    },

    /// API key file does not exist
    #[error("notarization API key not found: {}", path.display())]
    MissingApiKey {
        /// Configured key path
        path: PathBuf,
    },

    /// notarytool failed
    #[error("notarytool failed: {0}")]
    Tool(ToolFailure),

    /// notarytool printed something that is not the expected JSON
    #[error("unexpected notarytool output: {reason}")]
    UnexpectedOutput {
        /// Parser message
        reason: String,
        /// Raw output
        output: String,
    },

    /// Filesystem error around the package or key file
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// Operation being performed
        context: &'static str,
        /// Path being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: std::io::Error,
    },
}

/// Notarization wait elapsed or was abandoned
#[derive(Debug)]
pub struct TimeoutError {
    /// Submission id, if the upload completed before the wait ended
    pub submission_id: Option<String>,
    /// Time spent waiting
    pub waited: std::time::Duration,
    /// True when the wait was cancelled rather than elapsed
    pub cancelled: bool,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let how = if self.cancelled { "cancelled" } else { "gave up" };
        match &self.submission_id {
            Some(id) => write!(
                f,
                "{} waiting for submission {} after {:.0}s",
                how,
                id,
                self.waited.as_secs_f64()
            ),
            None => write!(
                f,
                "{} before the upload completed after {:.0}s",
                how,
                self.waited.as_secs_f64()
            ),
        }
    }
}

impl std::error::Error for TimeoutError {}

/// `Staple` errors
#[derive(Error, Debug)]
pub enum StapleError {
    /// Receipt was not issued for this package
    #[error(
        "notarization receipt {submission_id} does not match {}: receipt is for sha256 {expected}, package is {actual}",
        path.display()
    )]
    ReceiptMismatch {
        /// Package path
        path: PathBuf,
        /// Submission id on the receipt
        submission_id: String,
        /// Checksum recorded on the receipt
        expected: String,
        /// Checksum of the package on disk
        actual: String,
    },

    /// Receipt does not report an accepted submission
    #[error("submission {submission_id} was not accepted (status: {status})")]
    NotAccepted {
        /// Submission id
        submission_id: String,
        /// Reported status
        status: String,
    },

    /// stapler staple failed
    #[error("stapler failed: {0}")]
    Tool(ToolFailure),

    /// stapler validate failed after stapling
    #[error("stapled package {} did not validate: {failure}", path.display())]
    ValidationFailed {
        /// Package path
        path: PathBuf,
        /// stapler diagnostics
        failure: ToolFailure,
    },

    /// Filesystem error
    #[error("{context} {}: {error}", path.display())]
    Fs {
        /// Operation being performed
        context: &'static str,
        /// Path being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: std::io::Error,
    },
}

/// Packager.toml errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file missing
    #[error("configuration file not found: {}", path.display())]
    NotFound {
        /// Expected path
        path: PathBuf,
    },

    /// Config file could not be parsed
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// Config path
        path: PathBuf,
        /// TOML error
        #[source]
        source: toml::de::Error,
    },

    /// Config file parsed but is unusable
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Reason for the error
        reason: String,
    },

    /// Relative path could not be resolved
    #[error("failed to resolve path {}: {source}", path.display())]
    Resolve {
        /// Path being resolved
        path: PathBuf,
        /// IO error
        #[source]
        source: std::io::Error,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },

    /// Required external tool is not installed
    #[error("Required tool not found in PATH: {tool}")]
    ToolNotFound {
        /// Tool name
        tool: String,
    },
}

impl PackagerError {
    /// Process exit status for this error.
    ///
    /// Each pipeline stage has its own status so CI can tell which stage halted the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            PackagerError::Signing(_) => EXIT_SIGNING,
            PackagerError::Packaging(_) => EXIT_PACKAGING,
            PackagerError::Distribution(_) => EXIT_DISTRIBUTION,
            PackagerError::Notarization(_) => EXIT_NOTARIZATION,
            PackagerError::Timeout(_) => EXIT_TIMEOUT,
            PackagerError::Staple(_) => EXIT_STAPLE,
            PackagerError::Config(_) | PackagerError::Cli(_) => EXIT_USAGE,
            PackagerError::Interrupted { .. } => EXIT_INTERRUPTED,
            _ => 1,
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PackagerError::Signing(SigningError::MissingEntitlements { .. }) => vec![
                "Set product.entitlements in Packager.toml to an existing .plist file".to_string(),
            ],
            PackagerError::Signing(SigningError::AlreadyStapled { .. }) => vec![
                "Rebuild the application bundle, or pass --force-resign to discard the ticket"
                    .to_string(),
            ],
            PackagerError::Signing(SigningError::Rejected { .. }) => vec![
                "Check that the signing identity is installed: security find-identity -v -p codesigning"
                    .to_string(),
                "Pass --app-identity with the full certificate name if the team id is ambiguous"
                    .to_string(),
            ],
            PackagerError::Packaging(PackagingError::MissingMinimumOs { .. }) => vec![
                "Set product.minimum_system_version (or per component) in Packager.toml"
                    .to_string(),
            ],
            PackagerError::Distribution(DistributionError::Tool(_)) => vec![
                "Check the installer identity: security find-identity -v".to_string(),
            ],
            PackagerError::Notarization(NotarizationError::Rejected { .. }) => vec![
                "Fix the reported issues, then rebuild and resubmit".to_string(),
            ],
            PackagerError::Notarization(_) | PackagerError::Timeout(_) => vec![
                "The signed distribution package is still valid".to_string(),
                "Resubmit it with: kodegen_bundler_pkg notarize <package.unnotarized.pkg>"
                    .to_string(),
            ],
            PackagerError::Staple(_) => vec![
                "Run the notarize subcommand against the .unnotarized.pkg to obtain a fresh receipt"
                    .to_string(),
            ],
            PackagerError::Interrupted { .. } => vec![
                "Nothing was submitted for notarization; run the same command again"
                    .to_string(),
            ],
            PackagerError::Cli(CliError::ToolNotFound { .. }) => vec![
                "Install the Xcode command line tools: xcode-select --install".to_string(),
                "Run kodegen_bundler_pkg doctor to list missing tools".to_string(),
            ],
            _ => vec![],
        }
    }
}

/// An I/O error annotated with the operation and path that produced it.
///
/// Converts into the `Fs` variant of every stage error, so `?` picks the
/// right variant from the function's return type.
#[derive(Debug)]
pub struct FsError {
    /// Operation being performed
    pub context: &'static str,
    /// Path being accessed
    pub path: PathBuf,
    /// The underlying I/O error
    pub error: std::io::Error,
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying bundle".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>)
    -> std::result::Result<T, FsError>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(
        self,
        context: &'static str,
        path: impl Into<PathBuf>,
    ) -> std::result::Result<T, FsError> {
        self.map_err(|error| FsError {
            context,
            path: path.into(),
            error,
        })
    }
}

macro_rules! impl_from_fs {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<FsError> for $ty {
                fn from(FsError { context, path, error }: FsError) -> Self {
                    Self::Fs { context, path, error }
                }
            }
        )*
    };
}

impl_from_fs!(
    PackagerError,
    SigningError,
    PackagingError,
    DistributionError,
    NotarizationError,
    StapleError,
);

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> ToolFailure {
        ToolFailure {
            command: "codesign --sign TEAM App.app".to_string(),
            status: Some(1),
            stdout: String::new(),
            stderr: "App.app: errSecInternalComponent\n".to_string(),
        }
    }

    #[test]
    fn test_tool_failure_shows_output_verbatim() {
        let text = failure().to_string();
        assert!(text.contains("exited with status 1"));
        assert!(text.ends_with("App.app: errSecInternalComponent"));
    }

    #[test]
    fn test_exit_code_per_stage() {
        let signing: PackagerError = SigningError::MissingEntitlements {
            path: PathBuf::from("e.plist"),
        }
        .into();
        assert_eq!(signing.exit_code(), EXIT_SIGNING);

        let timeout: PackagerError = TimeoutError {
            submission_id: None,
            waited: std::time::Duration::from_secs(3),
            cancelled: true,
        }
        .into();
        assert_eq!(timeout.exit_code(), EXIT_TIMEOUT);

        let staple: PackagerError = StapleError::Tool(failure()).into();
        assert_eq!(staple.exit_code(), EXIT_STAPLE);

        let interrupted = PackagerError::Interrupted {
            stage: "BuildComponentPackage",
        };
        assert_eq!(interrupted.exit_code(), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_timeout_message_names_submission() {
        let err = TimeoutError {
            submission_id: Some("2efe2717-52ef-43a5-96dc-0797e4ca1041".to_string()),
            waited: std::time::Duration::from_secs(3600),
            cancelled: false,
        };
        let text = err.to_string();
        assert!(text.contains("gave up"));
        assert!(text.contains("2efe2717-52ef-43a5-96dc-0797e4ca1041"));
    }

    #[test]
    fn test_notarization_failures_suggest_resubmission() {
        let err: PackagerError = NotarizationError::Tool(failure()).into();
        assert!(
            err.recovery_suggestions()
                .iter()
                .any(|s| s.contains("notarize"))
        );
    }
}
