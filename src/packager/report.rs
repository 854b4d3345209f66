//! Release report written next to the finished package.
//!
//! CI uploads the report with the package so the published checksum and the
//! notarization submission can be traced back to one run.

use crate::error::{ErrorExt, PackagerError};
use crate::packager::model::{ComponentPackage, FinalPackage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One component package merged into the release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentEntry {
    /// Package identifier
    pub identifier: String,
    /// Install location
    pub install_location: PathBuf,
    /// SHA-256 of the component package
    pub sha256: String,
}

impl From<&ComponentPackage> for ComponentEntry {
    fn from(component: &ComponentPackage) -> Self {
        Self {
            identifier: component.descriptor.identifier.clone(),
            install_location: component.descriptor.install_location.clone(),
            sha256: component.sha256.clone(),
        }
    }
}

/// Summary of a completed release.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseReport {
    /// Release version, absent for resubmitted packages
    pub version: Option<semver::Version>,
    /// Final package path
    pub package: PathBuf,
    /// SHA-256 of the stapled package
    pub sha256: String,
    /// Notarization submission id
    pub submission_id: String,
    /// Components merged into the package
    pub components: Vec<ComponentEntry>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the package was stapled
    pub completed_at: DateTime<Utc>,
}

impl ReleaseReport {
    /// Build the report for a finished package.
    pub fn new(
        version: Option<semver::Version>,
        components: &[ComponentPackage],
        package: &FinalPackage,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version,
            package: package.path.clone(),
            sha256: package.sha256.clone(),
            submission_id: package.receipt.submission_id.clone(),
            components: components.iter().map(ComponentEntry::from).collect(),
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Report path for a final package: `Foo-1.0.0.pkg` → `Foo-1.0.0.json`.
    pub fn path_for(package: &Path) -> PathBuf {
        package.with_extension("json")
    }

    /// Write the report as pretty JSON, atomically.
    pub async fn write(&self, path: &Path) -> Result<(), PackagerError> {
        let serialized = serde_json::to_string_pretty(self)?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, serialized)
            .await
            .fs_context("writing release report", &temp_path)?;
        tokio::fs::rename(&temp_path, path)
            .await
            .fs_context("renaming release report", path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packager::model::{NotarizationReceipt, NotarizationStatus, PackageDescriptor};

    #[tokio::test]
    async fn test_report_written_next_to_package() {
        let dir = tempfile::tempdir().expect("tempdir");
        let package_path = dir.path().join("Viewer-2.1.0.pkg");

        let component = ComponentPackage {
            path: dir.path().join("components/com.example.viewer.pkg"),
            descriptor: PackageDescriptor {
                identifier: "com.example.viewer".to_string(),
                version: semver::Version::new(2, 1, 0),
                install_location: PathBuf::from("/Applications"),
                minimum_os_version: Some("11.0".to_string()),
            },
            sha256: "a".repeat(64),
        };
        let package = FinalPackage {
            path: package_path.clone(),
            sha256: "b".repeat(64),
            receipt: NotarizationReceipt {
                submission_id: "2efe2717-52ef-43a5-96dc-0797e4ca1041".to_string(),
                status: NotarizationStatus::Accepted,
                package_sha256: "c".repeat(64),
                message: None,
            },
        };

        let report = ReleaseReport::new(
            Some(semver::Version::new(2, 1, 0)),
            &[component],
            &package,
            Utc::now(),
        );
        let path = ReleaseReport::path_for(&package_path);
        report.write(&path).await.expect("write report");

        assert_eq!(path, dir.path().join("Viewer-2.1.0.json"));
        let loaded: ReleaseReport =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(loaded.submission_id, "2efe2717-52ef-43a5-96dc-0797e4ca1041");
        assert_eq!(loaded.components[0].identifier, "com.example.viewer");
        assert_eq!(loaded.version, Some(semver::Version::new(2, 1, 0)));
    }
}
