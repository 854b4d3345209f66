//! `BuildComponentPackage`: one flat `pkgbuild` package per signed bundle.

use crate::error::{ErrorExt, PackagingError};
use crate::packager::checksum::calculate_sha256;
use crate::packager::fs::{copy_dir, create_dir_all};
use crate::packager::model::{ComponentPackage, PackageDescriptor, SignedBundle};
use crate::packager::tool::{Invocation, ToolRunner, run_checked};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static REVERSE_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+$").expect("reverse-domain regex is valid")
});

/// Whether `identifier` looks like `com.example.app`.
pub fn is_reverse_domain(identifier: &str) -> bool {
    REVERSE_DOMAIN.is_match(identifier)
}

/// Package identifiers claimed so far in this run.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    claimed: HashSet<String>,
}

impl IdentifierRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `identifier`, failing if another component already holds it.
    pub fn claim(&mut self, identifier: &str) -> Result<(), PackagingError> {
        if !self.claimed.insert(identifier.to_string()) {
            return Err(PackagingError::IdentifierCollision {
                identifier: identifier.to_string(),
            });
        }
        Ok(())
    }
}

/// Check identifier shape, minimum OS and install location.
pub fn validate_descriptor(descriptor: &PackageDescriptor) -> Result<(), PackagingError> {
    if !is_reverse_domain(&descriptor.identifier) {
        return Err(PackagingError::InvalidIdentifier {
            identifier: descriptor.identifier.clone(),
        });
    }

    match descriptor.minimum_os_version.as_deref() {
        Some(v) if !v.trim().is_empty() => {}
        _ => {
            return Err(PackagingError::MissingMinimumOs {
                identifier: descriptor.identifier.clone(),
            });
        }
    }

    if !descriptor.install_location.is_absolute() {
        return Err(PackagingError::RelativeInstallLocation {
            identifier: descriptor.identifier.clone(),
            location: descriptor.install_location.clone(),
        });
    }

    Ok(())
}

/// Where the component package for `identifier` is written.
pub fn component_path(components_dir: &Path, identifier: &str) -> PathBuf {
    components_dir.join(format!("{}.pkg", identifier))
}

/// Build a component package rooted at the signed bundle.
///
/// The bundle is staged into a private temporary root so that `pkgbuild`
/// sees exactly one payload item, installed as
/// `<install_location>/<Bundle>.app`.
pub async fn build_component_package<R: ToolRunner>(
    runner: &R,
    signed: &SignedBundle,
    descriptor: PackageDescriptor,
    components_dir: &Path,
    registry: &mut IdentifierRegistry,
) -> Result<ComponentPackage, PackagingError> {
    validate_descriptor(&descriptor)?;
    registry.claim(&descriptor.identifier)?;

    let stage = tempfile::Builder::new()
        .prefix("pkg-root-")
        .tempdir()
        .fs_context("creating staging root", std::env::temp_dir())?;

    let staged_bundle = stage.path().join(signed.bundle.file_name());
    copy_dir(&signed.bundle.path, &staged_bundle)
        .await
        .fs_context("staging bundle", &staged_bundle)?;

    create_dir_all(components_dir, false)
        .await
        .fs_context("creating components directory", components_dir)?;

    let output = component_path(components_dir, &descriptor.identifier);
    let inv = pkgbuild_invocation(stage.path(), &descriptor, &output);

    log::info!(
        "Building component package {} {}",
        descriptor.identifier,
        descriptor.version
    );
    run_checked(runner, &inv)
        .await
        .map_err(|failure| PackagingError::Tool {
            identifier: descriptor.identifier.clone(),
            failure,
        })?;

    let sha256 = calculate_sha256(&output)
        .await
        .fs_context("hashing component package", &output)?;

    Ok(ComponentPackage {
        path: output,
        descriptor,
        sha256,
    })
}

/// Build the `pkgbuild` invocation for a staged root.
pub fn pkgbuild_invocation(root: &Path, descriptor: &PackageDescriptor, output: &Path) -> Invocation {
    let mut inv = Invocation::new("pkgbuild")
        .arg("--root")
        .path(root)
        .arg("--identifier")
        .arg(descriptor.identifier.as_str())
        .arg("--version")
        .arg(descriptor.version.to_string())
        .arg("--install-location")
        .path(&descriptor.install_location);
    if let Some(min_os) = &descriptor.minimum_os_version {
        inv = inv.arg("--min-os-version").arg(min_os.as_str());
    }
    inv.path(output)
}
