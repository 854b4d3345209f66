//! Pipeline-local data model.
//!
//! Each stage consumes the previous stage's output type, so the sequencing
//! contract (sign → component → distribution → notarize → staple) is carried
//! by the types themselves:
//!
//! ```text
//! ApplicationBundle ─sign─▶ SignedBundle ─pkgbuild─▶ ComponentPackage
//!   ─productbuild─▶ DistributionPackage ─notarytool─▶ NotarizationReceipt
//!   ─stapler─▶ FinalPackage
//! ```

use crate::error::SigningError;
use secrecy::SecretString;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Directory extensions that are code containers of their own.
const NESTED_CONTAINER_EXTENSIONS: &[&str] = &["app", "appex", "bundle", "framework", "plugin", "xpc"];

/// Kind of signable artifact found inside a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Shared library or loadable Mach-O bundle (`.dylib`, `.so`, `MH_DYLIB`, `MH_BUNDLE`)
    DynamicLibrary,
    /// Helper executable other than the main one
    Executable,
    /// Nested code container (`.framework`, `.app`, `.xpc`, ...)
    NestedBundle,
    /// The executable named by `CFBundleExecutable`
    MainExecutable,
}

/// A signable file or directory inside an [`ApplicationBundle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifact {
    /// Absolute path
    pub path: PathBuf,
    /// What kind of artifact this is
    pub kind: ArtifactKind,
}

impl BinaryArtifact {
    fn depth(&self) -> usize {
        self.path.components().count()
    }
}

/// A built, unsigned application bundle.
#[derive(Debug, Clone)]
pub struct ApplicationBundle {
    /// Path to the `.app` directory
    pub path: PathBuf,
    /// Platform from `CFBundleSupportedPlatforms`, `MacOSX` when absent
    pub platform: String,
    /// Every binary artifact inside the bundle, in discovery order
    pub artifacts: Vec<BinaryArtifact>,
}

impl ApplicationBundle {
    /// Walk a bundle directory and classify its binary artifacts.
    pub fn discover(path: &Path) -> Result<Self, SigningError> {
        if !path.is_dir() {
            return Err(SigningError::BundleNotFound {
                path: path.to_path_buf(),
            });
        }

        let info_plist = path.join("Contents/Info.plist");
        let info = plist::Value::from_file(&info_plist).map_err(|e| SigningError::InvalidBundle {
            path: path.to_path_buf(),
            reason: format!("cannot read Contents/Info.plist: {}", e),
        })?;
        let info = info.as_dictionary().ok_or_else(|| SigningError::InvalidBundle {
            path: path.to_path_buf(),
            reason: "Contents/Info.plist is not a dictionary".to_string(),
        })?;

        let executable_name = info
            .get("CFBundleExecutable")
            .and_then(|v| v.as_string())
            .ok_or_else(|| SigningError::InvalidBundle {
                path: path.to_path_buf(),
                reason: "Info.plist has no CFBundleExecutable".to_string(),
            })?;
        let main_executable = path.join("Contents/MacOS").join(executable_name);
        if !main_executable.is_file() {
            return Err(SigningError::InvalidBundle {
                path: path.to_path_buf(),
                reason: format!("main executable {} is missing", main_executable.display()),
            });
        }

        let platform = info
            .get("CFBundleSupportedPlatforms")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.as_string())
            .unwrap_or("MacOSX")
            .to_string();

        let mut artifacts = Vec::new();
        for entry in WalkDir::new(path).follow_links(false).min_depth(1) {
            let entry = entry.map_err(|e| SigningError::InvalidBundle {
                path: path.to_path_buf(),
                reason: format!("cannot walk bundle: {}", e),
            })?;
            let entry_path = entry.path();

            if entry.file_type().is_dir() {
                if has_extension(entry_path, NESTED_CONTAINER_EXTENSIONS) {
                    artifacts.push(BinaryArtifact {
                        path: entry_path.to_path_buf(),
                        kind: ArtifactKind::NestedBundle,
                    });
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            if entry_path == main_executable {
                artifacts.push(BinaryArtifact {
                    path: main_executable.clone(),
                    kind: ArtifactKind::MainExecutable,
                });
                continue;
            }

            if let Some(kind) = classify_file(entry_path) {
                artifacts.push(BinaryArtifact {
                    path: entry_path.to_path_buf(),
                    kind,
                });
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            platform,
            artifacts,
        })
    }

    /// Artifacts in inside-out signing order.
    ///
    /// Dynamic libraries first, then helper executables, then nested
    /// containers, each deepest path first; the main executable last. The
    /// bundle container itself is signed after all of these.
    pub fn signing_order(&self) -> Vec<&BinaryArtifact> {
        let rank = |kind: ArtifactKind| match kind {
            ArtifactKind::DynamicLibrary => 0,
            ArtifactKind::Executable => 1,
            ArtifactKind::NestedBundle => 2,
            ArtifactKind::MainExecutable => 3,
        };

        let mut ordered: Vec<&BinaryArtifact> = self.artifacts.iter().collect();
        ordered.sort_by(|a, b| {
            rank(a.kind)
                .cmp(&rank(b.kind))
                .then_with(|| b.depth().cmp(&a.depth()))
                .then_with(|| a.path.cmp(&b.path))
        });
        ordered
    }

    /// Artifacts of one kind.
    pub fn artifacts_of(&self, kind: ArtifactKind) -> impl Iterator<Item = &BinaryArtifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }

    /// Where `stapler` stores a bundle's ticket.
    pub fn stapled_ticket_path(&self) -> PathBuf {
        self.path.join("Contents/CodeResources")
    }

    /// File name of the bundle, e.g. `MyApp.app`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Classify a regular file by extension, falling back to its Mach-O header.
fn classify_file(path: &Path) -> Option<ArtifactKind> {
    if has_extension(path, &["dylib", "so"]) {
        return Some(ArtifactKind::DynamicLibrary);
    }

    match macho_file_type(path)? {
        goblin::mach::header::MH_DYLIB | goblin::mach::header::MH_BUNDLE => {
            Some(ArtifactKind::DynamicLibrary)
        }
        goblin::mach::header::MH_EXECUTE => Some(ArtifactKind::Executable),
        _ => None,
    }
}

/// Read the Mach-O `filetype` of a file, or `None` if it is not Mach-O.
///
/// Only the 4-byte magic is read for non-Mach-O files, so resources are cheap to skip.
fn macho_file_type(path: &Path) -> Option<u32> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path).ok()?;
    file.read_exact(&mut magic).ok()?;

    let magic = u32::from_be_bytes(magic);
    let is_macho = matches!(
        magic,
        goblin::mach::header::MH_MAGIC
            | goblin::mach::header::MH_CIGAM
            | goblin::mach::header::MH_MAGIC_64
            | goblin::mach::header::MH_CIGAM_64
            | goblin::mach::fat::FAT_MAGIC
    );
    if !is_macho {
        return None;
    }

    let buffer = std::fs::read(path).ok()?;
    match goblin::mach::Mach::parse(&buffer).ok()? {
        goblin::mach::Mach::Binary(macho) => Some(macho.header.filetype),
        goblin::mach::Mach::Fat(fat) => match fat.get(0).ok()? {
            goblin::mach::SingleArch::MachO(macho) => Some(macho.header.filetype),
            goblin::mach::SingleArch::Archive(_) => None,
        },
    }
}

/// A bundle whose artifacts and container have been signed.
#[derive(Debug, Clone)]
pub struct SignedBundle {
    /// The bundle that was signed
    pub bundle: ApplicationBundle,
    /// Paths in the order they were signed; the container is last
    pub signing_order: Vec<PathBuf>,
}

/// Identifier, version and install target of one component package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Reverse-domain identifier, unique per run
    pub identifier: String,
    /// Release version
    pub version: semver::Version,
    /// Absolute install location, e.g. `/Applications`
    pub install_location: PathBuf,
    /// Minimum macOS version, e.g. `11.0`
    pub minimum_os_version: Option<String>,
}

/// A flat component package built by `pkgbuild`.
#[derive(Debug, Clone)]
pub struct ComponentPackage {
    /// Path to the `.pkg` file
    pub path: PathBuf,
    /// Descriptor it was built from
    pub descriptor: PackageDescriptor,
    /// SHA-256 of the package file
    pub sha256: String,
}

impl ComponentPackage {
    /// File name of the component package.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A signed product archive built by `productbuild`.
#[derive(Debug, Clone)]
pub struct DistributionPackage {
    /// Path to the `.pkg` file
    pub path: PathBuf,
    /// Release version, unknown for packages picked up from disk
    pub version: Option<semver::Version>,
    /// Component packages merged into it
    pub components: Vec<ComponentPackage>,
    /// Rendered manifest used for the build
    pub manifest: Option<PathBuf>,
    /// SHA-256 of the signed package file
    pub sha256: String,
}

impl DistributionPackage {
    /// Wrap an already-built distribution package for resubmission.
    pub async fn existing(path: &Path) -> std::io::Result<Self> {
        let sha256 = super::checksum::calculate_sha256(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            version: None,
            components: Vec::new(),
            manifest: None,
            sha256,
        })
    }
}

/// Status reported by the notarization service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotarizationStatus {
    /// Still being processed
    InProgress,
    /// Notarized
    Accepted,
    /// Processed with blocking issues
    Invalid,
    /// Refused by the service
    Rejected,
    /// Any status this tool does not know
    Other(String),
}

impl NotarizationStatus {
    /// Parse the status string printed by `notarytool`.
    pub fn parse(status: &str) -> Self {
        match status {
            "In Progress" => Self::InProgress,
            "Accepted" => Self::Accepted,
            "Invalid" => Self::Invalid,
            "Rejected" => Self::Rejected,
            other => Self::Other(other.to_string()),
        }
    }

    /// Status string as printed by `notarytool`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "In Progress",
            Self::Accepted => "Accepted",
            Self::Invalid => "Invalid",
            Self::Rejected => "Rejected",
            Self::Other(s) => s,
        }
    }
}

/// Outcome of an accepted notarization.
#[derive(Debug, Clone)]
pub struct NotarizationReceipt {
    /// Submission id assigned by the service
    pub submission_id: String,
    /// Final status
    pub status: NotarizationStatus,
    /// SHA-256 of the package that was submitted
    pub package_sha256: String,
    /// Service message, if any
    pub message: Option<String>,
}

/// A notarized package with its ticket stapled.
#[derive(Debug, Clone)]
pub struct FinalPackage {
    /// Path to the finished `.pkg`
    pub path: PathBuf,
    /// SHA-256 after stapling
    pub sha256: String,
    /// Receipt that was stapled
    pub receipt: NotarizationReceipt,
}

/// Certificates used for signing.
///
/// Identities are resolved by `codesign`/`productbuild` as a common-name
/// substring restricted to the matching certificate policy, so the team id
/// alone selects the Developer ID Application certificate for code and the
/// Developer ID Installer certificate for packages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningIdentity {
    /// Apple developer team id
    pub team_id: String,
    /// Identity passed to `codesign --sign`
    pub application: String,
    /// Identity passed to `productbuild --sign`
    pub installer: String,
}

impl SigningIdentity {
    /// Identity that resolves both certificates from the team id.
    pub fn from_team(team_id: impl Into<String>) -> Self {
        let team_id = team_id.into();
        Self {
            application: team_id.clone(),
            installer: team_id.clone(),
            team_id,
        }
    }

    /// Override the code signing identity.
    pub fn with_application(mut self, identity: impl Into<String>) -> Self {
        self.application = identity.into();
        self
    }

    /// Override the installer signing identity.
    pub fn with_installer(mut self, identity: impl Into<String>) -> Self {
        self.installer = identity.into();
        self
    }
}

/// Where the notarization private key comes from.
#[derive(Debug)]
pub enum PrivateKeySource {
    /// `AuthKey_*.p8` file on disk
    File(PathBuf),
    /// PEM contents held in memory
    Inline(SecretString),
}

/// App Store Connect API credentials for `notarytool`.
#[derive(Debug)]
pub struct ApiCredentials {
    /// Issuer id (UUID)
    pub issuer_id: String,
    /// Key id
    pub key_id: String,
    /// Private key
    pub key: PrivateKeySource,
}
