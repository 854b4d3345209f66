//! `Staple`: attach the notarization ticket so the package validates offline.

use crate::error::{ErrorExt, StapleError};
use crate::packager::checksum::calculate_sha256;
use crate::packager::distribution::final_path;
use crate::packager::model::{
    DistributionPackage, FinalPackage, NotarizationReceipt, NotarizationStatus,
};
use crate::packager::tool::{Invocation, ToolRunner, run_checked};

/// Check that `receipt` was issued for exactly the bytes of `package`.
///
/// Returns the package's current SHA-256.
pub async fn check_receipt(
    package: &DistributionPackage,
    receipt: &NotarizationReceipt,
) -> Result<String, StapleError> {
    if receipt.status != NotarizationStatus::Accepted {
        return Err(StapleError::NotAccepted {
            submission_id: receipt.submission_id.clone(),
            status: receipt.status.as_str().to_string(),
        });
    }

    let actual = calculate_sha256(&package.path)
        .await
        .fs_context("hashing package", &package.path)?;

    if actual != receipt.package_sha256 {
        return Err(StapleError::ReceiptMismatch {
            path: package.path.clone(),
            submission_id: receipt.submission_id.clone(),
            expected: receipt.package_sha256.clone(),
            actual,
        });
    }

    Ok(actual)
}

/// Staple `receipt` onto `package` and validate the result.
///
/// The returned package still carries its `.unnotarized` name; [`promote`]
/// gives it the final name once everything that describes the release has
/// been written.
pub async fn staple<R: ToolRunner>(
    runner: &R,
    package: DistributionPackage,
    receipt: NotarizationReceipt,
) -> Result<FinalPackage, StapleError> {
    check_receipt(&package, &receipt).await?;

    log::info!(
        "Stapling ticket for submission {} to {}",
        receipt.submission_id,
        package.path.display()
    );
    let inv = Invocation::xcrun("stapler").arg("staple").path(&package.path);
    run_checked(runner, &inv).await.map_err(StapleError::Tool)?;

    let validate = Invocation::xcrun("stapler").arg("validate").path(&package.path);
    run_checked(runner, &validate)
        .await
        .map_err(|failure| StapleError::ValidationFailed {
            path: package.path.clone(),
            failure,
        })?;

    let sha256 = calculate_sha256(&package.path)
        .await
        .fs_context("hashing stapled package", &package.path)?;

    Ok(FinalPackage {
        path: package.path,
        sha256,
        receipt,
    })
}

/// Rename a stapled, validated package to `<name>-<version>.pkg`.
///
/// A file without the `.unnotarized` marker is always a complete release
/// artifact, so this is the last step of a run.
pub async fn promote(package: FinalPackage) -> Result<FinalPackage, StapleError> {
    let destination = final_path(&package.path);
    if destination != package.path {
        tokio::fs::rename(&package.path, &destination)
            .await
            .fs_context("renaming stapled package", &destination)?;
    }

    Ok(FinalPackage {
        path: destination,
        ..package
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(status: NotarizationStatus, sha: &str) -> NotarizationReceipt {
        NotarizationReceipt {
            submission_id: "2efe2717-52ef-43a5-96dc-0797e4ca1041".to_string(),
            status,
            package_sha256: sha.to_string(),
            message: None,
        }
    }

    #[tokio::test]
    async fn test_receipt_for_other_bytes_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Viewer-2.1.0.unnotarized.pkg");
        std::fs::write(&path, b"signed package").expect("write");
        let package = DistributionPackage::existing(&path).await.expect("package");

        let err = check_receipt(&package, &receipt(NotarizationStatus::Accepted, &"f".repeat(64)))
            .await
            .expect_err("mismatch");
        assert!(matches!(err, StapleError::ReceiptMismatch { .. }));
    }

    #[tokio::test]
    async fn test_receipt_must_be_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Viewer-2.1.0.unnotarized.pkg");
        std::fs::write(&path, b"signed package").expect("write");
        let package = DistributionPackage::existing(&path).await.expect("package");

        let err = check_receipt(&package, &receipt(NotarizationStatus::Invalid, &package.sha256))
            .await
            .expect_err("not accepted");
        assert!(matches!(err, StapleError::NotAccepted { .. }));
    }

    #[tokio::test]
    async fn test_promote_drops_unnotarized_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Viewer-2.1.0.unnotarized.pkg");
        std::fs::write(&path, b"stapled package").expect("write");
        let stapled = FinalPackage {
            path: path.clone(),
            sha256: "a".repeat(64),
            receipt: receipt(NotarizationStatus::Accepted, &"a".repeat(64)),
        };

        let promoted = promote(stapled).await.expect("promote");
        assert_eq!(promoted.path, dir.path().join("Viewer-2.1.0.pkg"));
        assert!(promoted.path.exists());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_matching_receipt() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Viewer-2.1.0.unnotarized.pkg");
        std::fs::write(&path, b"signed package").expect("write");
        let package = DistributionPackage::existing(&path).await.expect("package");

        let sha = check_receipt(&package, &receipt(NotarizationStatus::Accepted, &package.sha256))
            .await
            .expect("match");
        assert_eq!(sha, package.sha256);
    }
}
