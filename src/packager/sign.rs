//! `SignArtifacts`: inside-out code signing of an application bundle.

use crate::error::{ErrorExt, SigningError};
use crate::packager::model::{
    ApplicationBundle, ArtifactKind, BinaryArtifact, SignedBundle, SigningIdentity,
};
use crate::packager::tool::{Invocation, ToolRunner, run_checked};
use std::path::{Path, PathBuf};

/// Nested containers that own a main executable. Signing the container
/// re-signs that executable, so it must be given the entitlements again.
const EXECUTABLE_CONTAINER_EXTENSIONS: &[&str] = &["app", "appex", "xpc"];

/// Options for one signing run.
#[derive(Debug, Clone)]
pub struct SignOptions<'a> {
    /// Identity passed to `codesign --sign`
    pub identity: &'a SigningIdentity,
    /// Entitlements policy applied to executables and the container
    pub entitlements: &'a Path,
    /// Discard an existing stapled ticket instead of refusing to re-sign
    pub force_resign: bool,
}

/// Check that the entitlements file exists and is a property list dictionary.
pub fn check_entitlements(path: &Path) -> Result<(), SigningError> {
    if !path.is_file() {
        return Err(SigningError::MissingEntitlements {
            path: path.to_path_buf(),
        });
    }

    let value = plist::Value::from_file(path).map_err(|e| SigningError::InvalidEntitlements {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    if value.as_dictionary().is_none() {
        return Err(SigningError::InvalidEntitlements {
            path: path.to_path_buf(),
            reason: "top-level value is not a dictionary".to_string(),
        });
    }

    Ok(())
}

/// Build the `codesign` invocation for one artifact.
///
/// Hardened runtime and a secure timestamp are always enabled; notarization
/// requires both.
pub fn codesign_invocation(
    path: &Path,
    identity: &SigningIdentity,
    entitlements: Option<&Path>,
) -> Invocation {
    let mut inv = Invocation::new("codesign").args(["--force", "--timestamp", "--options", "runtime"]);
    if let Some(entitlements) = entitlements {
        inv = inv.arg("--entitlements").path(entitlements);
    }
    inv.arg("--sign").arg(identity.application.as_str()).path(path)
}

/// Whether `artifact` is signed with the entitlements policy.
///
/// Executables are, and so are nested `.app`/`.appex`/`.xpc` containers.
/// Libraries, frameworks and loadable bundles never carry entitlements.
pub fn takes_entitlements(artifact: &BinaryArtifact) -> bool {
    match artifact.kind {
        ArtifactKind::Executable | ArtifactKind::MainExecutable => true,
        ArtifactKind::DynamicLibrary => false,
        ArtifactKind::NestedBundle => artifact
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| {
                EXECUTABLE_CONTAINER_EXTENSIONS
                    .iter()
                    .any(|x| x.eq_ignore_ascii_case(e))
            }),
    }
}

/// Sign every artifact in `bundle`, then the bundle itself.
///
/// Dynamic libraries are signed before anything that loads them and the
/// container is signed last, so no signature is ever sealed over an
/// unsigned or stale nested artifact.
///
/// # Arguments
/// * `runner` - Tool runner used for `codesign`
/// * `bundle` - Discovered application bundle
/// * `options` - Identity, entitlements and re-sign policy
///
/// # Returns
/// * `Ok(SignedBundle)` - Every artifact signed and the bundle verified
/// * `Err(SigningError)` - First rejected artifact, or a precondition failure
///   detected before `codesign` ran
pub async fn sign_artifacts<R: ToolRunner>(
    runner: &R,
    bundle: ApplicationBundle,
    options: &SignOptions<'_>,
) -> Result<SignedBundle, SigningError> {
    check_entitlements(options.entitlements)?;

    let ticket = bundle.stapled_ticket_path();
    if ticket.exists() {
        if !options.force_resign {
            return Err(SigningError::AlreadyStapled {
                path: bundle.path.clone(),
            });
        }
        log::warn!(
            "Discarding stapled ticket in {} before re-signing",
            bundle.path.display()
        );
        tokio::fs::remove_file(&ticket)
            .await
            .fs_context("removing stapled ticket", &ticket)?;
    }

    let mut signing_order: Vec<PathBuf> = Vec::with_capacity(bundle.artifacts.len() + 1);

    for artifact in bundle.signing_order() {
        let entitlements = takes_entitlements(artifact).then_some(options.entitlements);
        sign_path(runner, &artifact.path, options.identity, entitlements).await?;
        signing_order.push(artifact.path.clone());
    }

    sign_path(runner, &bundle.path, options.identity, Some(options.entitlements)).await?;
    signing_order.push(bundle.path.clone());

    verify(runner, &bundle.path).await?;

    log::info!(
        "Signed {} ({} artifacts)",
        bundle.path.display(),
        signing_order.len()
    );

    Ok(SignedBundle {
        bundle,
        signing_order,
    })
}

async fn sign_path<R: ToolRunner>(
    runner: &R,
    path: &Path,
    identity: &SigningIdentity,
    entitlements: Option<&Path>,
) -> Result<(), SigningError> {
    log::debug!("Signing {}", path.display());
    let inv = codesign_invocation(path, identity, entitlements);
    run_checked(runner, &inv)
        .await
        .map_err(|failure| SigningError::Rejected {
            artifact: path.to_path_buf(),
            failure,
        })?;
    Ok(())
}

/// Strict deep verification of a signed bundle.
pub async fn verify<R: ToolRunner>(runner: &R, bundle: &Path) -> Result<(), SigningError> {
    let inv = Invocation::new("codesign")
        .args(["--verify", "--deep", "--strict", "--verbose=2"])
        .path(bundle);
    run_checked(runner, &inv)
        .await
        .map_err(|failure| SigningError::VerificationFailed {
            path: bundle.to_path_buf(),
            failure,
        })?;
    Ok(())
}
