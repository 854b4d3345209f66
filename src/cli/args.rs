//! Command line argument parsing and validation.
//!
//! Every credential has an environment fallback so CI can inject secrets
//! without putting them on the command line.

use crate::config::DEFAULT_CONFIG_FILE;
use crate::error::CliError;
use crate::packager::model::{ApiCredentials, PrivateKeySource, SigningIdentity};
use crate::packager::notarize::WaitPolicy;
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// Signed, notarized macOS installer packages from pre-built bundles
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_pkg",
    version,
    about = "Signed, notarized and stapled macOS installer packages",
    long_about = "Turn pre-built .app bundles into one signed, notarized, stapled .pkg.

Pipeline: SignArtifacts → BuildComponentPackage → BuildDistribution → Notarize → Staple

Usage:
  kodegen_bundler_pkg package 2.1.0 --team-id ABCDE12345
  kodegen_bundler_pkg notarize dist/Viewer-2.1.0.unnotarized.pkg
  kodegen_bundler_pkg doctor"
)]
pub struct Args {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Show verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign, package, notarize and staple a release
    Package(PackageArgs),

    /// Notarize and staple an already-built distribution package
    Notarize(NotarizeArgs),

    /// Check that the required Apple tools are installed
    Doctor,
}

impl Command {
    /// Subcommand name for messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Package(_) => "package",
            Command::Notarize(_) => "notarize",
            Command::Doctor => "doctor",
        }
    }
}

/// Arguments of `package`
#[derive(clap::Args, Debug, Clone)]
pub struct PackageArgs {
    /// Release version (semantic version, e.g. 2.1.0)
    #[arg(value_name = "VERSION")]
    pub version: String,

    /// Apple developer team id
    #[arg(long, env = "APPLE_TEAM_ID")]
    pub team_id: String,

    /// Packager configuration file
    #[arg(short, long, env = "KODEGEN_PKG_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Code signing identity (defaults to the team id)
    #[arg(long, value_name = "IDENTITY")]
    pub app_identity: Option<String>,

    /// Installer signing identity (defaults to the team id)
    #[arg(long, value_name = "IDENTITY")]
    pub installer_identity: Option<String>,

    /// Override product.output_dir
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Discard stapled tickets on input bundles and re-sign them
    #[arg(long)]
    pub force_resign: bool,

    /// Notarization credentials and wait policy
    #[command(flatten)]
    pub notary: NotaryArgs,
}

/// Arguments of `notarize`
#[derive(clap::Args, Debug, Clone)]
pub struct NotarizeArgs {
    /// Signed distribution package (`*.unnotarized.pkg`)
    #[arg(value_name = "PACKAGE")]
    pub package: PathBuf,

    /// Notarization credentials and wait policy
    #[command(flatten)]
    pub notary: NotaryArgs,
}

/// App Store Connect API key and wait policy
#[derive(clap::Args, Debug, Clone)]
pub struct NotaryArgs {
    /// API issuer id
    #[arg(long, env = "APPLE_API_ISSUER")]
    pub api_issuer: String,

    /// API key id
    #[arg(long, env = "APPLE_API_KEY")]
    pub api_key_id: String,

    /// Path to the AuthKey_*.p8 private key
    #[arg(long, env = "APPLE_API_KEY_PATH", value_name = "FILE")]
    pub api_key_path: Option<PathBuf>,

    /// Private key contents (takes precedence over --api-key-path)
    #[arg(long, env = "APPLE_API_KEY_CONTENT", hide_env_values = true, value_name = "PEM")]
    pub api_key_content: Option<String>,

    /// Give up waiting for notarization after this many seconds
    #[arg(long, value_name = "SECS")]
    pub notary_timeout: Option<u64>,

    /// Seconds between notarization status polls
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,
}

impl NotaryArgs {
    /// Resolve the private key source and build credentials.
    pub fn credentials(&self) -> Result<ApiCredentials, CliError> {
        let key = match (&self.api_key_content, &self.api_key_path) {
            (Some(content), _) if !content.trim().is_empty() => {
                PrivateKeySource::Inline(SecretString::new(content.clone().into()))
            }
            (_, Some(path)) => PrivateKeySource::File(path.clone()),
            _ => {
                return Err(CliError::MissingArgument {
                    argument: "--api-key-path (or APPLE_API_KEY_PATH / APPLE_API_KEY_CONTENT)"
                        .to_string(),
                });
            }
        };

        Ok(ApiCredentials {
            issuer_id: self.api_issuer.clone(),
            key_id: self.api_key_id.clone(),
            key,
        })
    }

    /// Apply `--notary-timeout` / `--poll-interval` over `base`.
    pub fn wait_policy(&self, base: WaitPolicy) -> WaitPolicy {
        WaitPolicy {
            timeout: self
                .notary_timeout
                .map(Duration::from_secs)
                .unwrap_or(base.timeout),
            poll_interval: self
                .poll_interval
                .map(Duration::from_secs)
                .unwrap_or(base.poll_interval),
        }
    }

    fn validate(&self) -> Result<(), CliError> {
        if self.api_issuer.trim().is_empty() {
            return Err(CliError::MissingArgument {
                argument: "--api-issuer".to_string(),
            });
        }
        if self.api_key_id.trim().is_empty() {
            return Err(CliError::MissingArgument {
                argument: "--api-key-id".to_string(),
            });
        }
        if self.notary_timeout == Some(0) {
            return Err(CliError::InvalidArguments {
                reason: "--notary-timeout must be greater than zero".to_string(),
            });
        }
        if self.poll_interval == Some(0) {
            return Err(CliError::InvalidArguments {
                reason: "--poll-interval must be greater than zero".to_string(),
            });
        }
        self.credentials().map(|_| ())
    }
}

impl PackageArgs {
    /// Parsed release version.
    pub fn release_version(&self) -> Result<semver::Version, CliError> {
        semver::Version::parse(&self.version).map_err(|e| CliError::InvalidArguments {
            reason: format!("'{}' is not a semantic version: {}", self.version, e),
        })
    }

    /// Signing identity from the team id and optional overrides.
    pub fn identity(&self) -> SigningIdentity {
        let mut identity = SigningIdentity::from_team(self.team_id.as_str());
        if let Some(app) = &self.app_identity {
            identity = identity.with_application(app.as_str());
        }
        if let Some(installer) = &self.installer_identity {
            identity = identity.with_installer(installer.as_str());
        }
        identity
    }
}

/// Whether `team_id` has the shape of an Apple team id (10 uppercase alphanumerics).
pub fn is_team_id(team_id: &str) -> bool {
    team_id.len() == 10
        && team_id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), CliError> {
        match &self.command {
            Command::Package(package) => {
                package.release_version()?;
                if !is_team_id(&package.team_id) {
                    return Err(CliError::InvalidArguments {
                        reason: format!(
                            "team id '{}' must be 10 uppercase letters or digits",
                            package.team_id
                        ),
                    });
                }
                package.notary.validate()
            }
            Command::Notarize(notarize) => {
                if !notarize.package.is_file() {
                    return Err(CliError::InvalidArguments {
                        reason: format!("package not found: {}", notarize.package.display()),
                    });
                }
                notarize.notary.validate()
            }
            Command::Doctor => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(args).expect("arguments parse")
    }

    const NOTARY: &[&str] = &[
        "--api-issuer",
        "69a6de7e-0000-47e3-e053-5b8c7c11a4d1",
        "--api-key-id",
        "ABC123DEFG",
        "--api-key-path",
        "AuthKey_ABC123DEFG.p8",
    ];

    fn package_args(version: &str, team: &str) -> Vec<String> {
        let mut args = vec![
            "kodegen_bundler_pkg".to_string(),
            "package".to_string(),
            version.to_string(),
            "--team-id".to_string(),
            team.to_string(),
        ];
        args.extend(NOTARY.iter().map(|s| s.to_string()));
        args
    }

    #[test]
    fn test_package_arguments() {
        let args = Args::try_parse_from(package_args("2.1.0", "ABCDE12345")).expect("parse");
        args.validate().expect("valid");
        match args.command {
            Command::Package(package) => {
                assert_eq!(package.release_version().expect("version").to_string(), "2.1.0");
                assert_eq!(package.identity().installer, "ABCDE12345");
                assert!(matches!(
                    package.notary.credentials().expect("credentials").key,
                    PrivateKeySource::File(_)
                ));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_version_is_rejected() {
        let args = Args::try_parse_from(package_args("2.1", "ABCDE12345")).expect("parse");
        assert!(matches!(
            args.validate(),
            Err(CliError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_invalid_team_id_is_rejected() {
        let args = Args::try_parse_from(package_args("2.1.0", "abcde")).expect("parse");
        assert!(matches!(
            args.validate(),
            Err(CliError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_identity_overrides() {
        let mut argv = package_args("2.1.0", "ABCDE12345");
        argv.extend([
            "--app-identity".to_string(),
            "Developer ID Application: Example (ABCDE12345)".to_string(),
        ]);
        let args = Args::try_parse_from(argv).expect("parse");
        let Command::Package(package) = args.command else {
            panic!("expected package command");
        };
        let identity = package.identity();
        assert_eq!(identity.application, "Developer ID Application: Example (ABCDE12345)");
        assert_eq!(identity.installer, "ABCDE12345");
    }

    #[test]
    fn test_wait_policy_flags() {
        let mut argv = package_args("2.1.0", "ABCDE12345");
        argv.extend(["--notary-timeout".to_string(), "600".to_string()]);
        let args = Args::try_parse_from(argv).expect("parse");
        let Command::Package(package) = args.command else {
            panic!("expected package command");
        };
        let policy = package.notary.wait_policy(WaitPolicy::default());
        assert_eq!(policy.timeout, Duration::from_secs(600));
        assert_eq!(policy.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_team_id_shape() {
        assert!(is_team_id("ABCDE12345"));
        assert!(!is_team_id("abcde12345"));
        assert!(!is_team_id("ABCDE1234"));
    }

    #[test]
    fn test_doctor_needs_no_credentials() {
        let args = parse(&["kodegen_bundler_pkg", "doctor"]);
        assert_eq!(args.command.name(), "doctor");
        args.validate().expect("valid");
    }
}
