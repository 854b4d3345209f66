//! `BuildDistribution`: merge component packages into one signed product archive.
//!
//! The distribution manifest is a Handlebars template rendered with the
//! release version, product title, minimum OS and the component list. Rendering
//! is deterministic (declaration order, no timestamps) so identical inputs
//! always produce an identical manifest.

use crate::error::{DistributionError, ErrorExt};
use crate::packager::checksum::calculate_sha256;
use crate::packager::model::{ComponentPackage, DistributionPackage, SigningIdentity};
use crate::packager::tool::{Invocation, ToolRunner, run_checked};
use handlebars::Handlebars;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Built-in manifest used when no template is configured.
pub const DEFAULT_TEMPLATE: &str = include_str!("../../templates/distribution.xml.hbs");

/// Suffix of a signed package that has not been notarized and stapled yet.
pub const UNNOTARIZED_SUFFIX: &str = ".unnotarized.pkg";

static PKG_REF_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<pkg-ref\b[^>]*?\bid\s*=\s*"([^"]+)""#).expect("pkg-ref regex is valid")
});

/// Inputs of one distribution build.
#[derive(Debug, Clone)]
pub struct DistributionOptions<'a> {
    /// Product name used in file names
    pub name: &'a str,
    /// Installer window title
    pub title: &'a str,
    /// Minimum macOS version for the volume check; first component's when absent
    pub minimum_os_version: Option<&'a str>,
    /// Custom Handlebars template
    pub template: Option<&'a Path>,
    /// Identity passed to `productbuild --sign`
    pub identity: &'a SigningIdentity,
    /// Directory holding the component packages
    pub components_dir: &'a Path,
    /// Directory receiving the product archive
    pub output_dir: &'a Path,
}

#[derive(Debug, Serialize)]
struct ManifestComponent<'a> {
    identifier: &'a str,
    version: String,
    install_location: String,
    file_name: String,
}

#[derive(Debug, Serialize)]
struct ManifestContext<'a> {
    title: &'a str,
    version: String,
    min_os: &'a str,
    components: Vec<ManifestComponent<'a>>,
}

/// Path of the signed but not yet notarized package.
pub fn unnotarized_path(output_dir: &Path, name: &str, version: &semver::Version) -> PathBuf {
    output_dir.join(format!("{}-{}{}", name, version, UNNOTARIZED_SUFFIX))
}

/// Path a package gets once its ticket is stapled.
///
/// `Foo-1.0.0.unnotarized.pkg` becomes `Foo-1.0.0.pkg`; any other name is
/// kept with its extension replaced by `.pkg`.
pub fn final_path(unnotarized: &Path) -> PathBuf {
    let file_name = unnotarized
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match file_name.strip_suffix(UNNOTARIZED_SUFFIX) {
        Some(stem) => unnotarized.with_file_name(format!("{}.pkg", stem)),
        None => unnotarized.with_extension("pkg"),
    }
}

/// Check that every component carries the same version and return it.
pub fn common_version(
    components: &[ComponentPackage],
) -> Result<semver::Version, DistributionError> {
    let first = components.first().ok_or(DistributionError::NoComponents)?;
    let expected = &first.descriptor.version;

    for component in &components[1..] {
        if component.descriptor.version != *expected {
            return Err(DistributionError::VersionMismatch {
                identifier: component.descriptor.identifier.clone(),
                expected: expected.to_string(),
                found: component.descriptor.version.to_string(),
            });
        }
    }

    Ok(expected.clone())
}

/// Render the distribution manifest.
///
/// Strict mode is enabled so a template referencing an unknown field fails
/// instead of silently rendering an empty string.
pub fn render_manifest(
    template: &str,
    title: &str,
    minimum_os_version: &str,
    components: &[ComponentPackage],
) -> Result<String, DistributionError> {
    let version = common_version(components)?;

    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars
        .register_template_string("distribution.xml", template)
        .map_err(|e| DistributionError::MalformedManifest {
            reason: format!("failed to parse template: {}", e),
        })?;

    let context = ManifestContext {
        title,
        version: version.to_string(),
        min_os: minimum_os_version,
        components: components
            .iter()
            .map(|c| ManifestComponent {
                identifier: &c.descriptor.identifier,
                version: c.descriptor.version.to_string(),
                install_location: c.descriptor.install_location.display().to_string(),
                file_name: c.file_name(),
            })
            .collect(),
    };

    handlebars
        .render("distribution.xml", &context)
        .map_err(|e| DistributionError::MalformedManifest {
            reason: format!("failed to render template: {}", e),
        })
}

/// Check a rendered manifest against the components being merged.
pub fn validate_manifest(
    manifest: &str,
    components: &[ComponentPackage],
) -> Result<(), DistributionError> {
    if !manifest.contains("<installer-gui-script") {
        return Err(DistributionError::MalformedManifest {
            reason: "missing <installer-gui-script> root element".to_string(),
        });
    }

    let present: BTreeSet<&str> = components
        .iter()
        .map(|c| c.descriptor.identifier.as_str())
        .collect();
    let referenced: BTreeSet<&str> = PKG_REF_ID
        .captures_iter(manifest)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();

    if let Some(missing) = referenced.iter().find(|id| !present.contains(*id)) {
        return Err(DistributionError::MissingComponent {
            identifier: missing.to_string(),
        });
    }

    // declaration order, so the first unreferenced component is reported
    if let Some(unreferenced) = components
        .iter()
        .find(|c| !referenced.contains(c.descriptor.identifier.as_str()))
    {
        return Err(DistributionError::UnreferencedComponent {
            identifier: unreferenced.descriptor.identifier.clone(),
        });
    }

    Ok(())
}

/// Merge component packages into a signed distribution package.
///
/// Writes `<output_dir>/<name>-<version>.unnotarized.pkg`. The package keeps
/// that name until a notarization ticket has been stapled onto it.
pub async fn build_distribution<R: ToolRunner>(
    runner: &R,
    components: Vec<ComponentPackage>,
    options: &DistributionOptions<'_>,
) -> Result<DistributionPackage, DistributionError> {
    let version = common_version(&components)?;

    let template = match options.template {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .fs_context("reading distribution template", path)?,
        None => DEFAULT_TEMPLATE.to_string(),
    };

    let minimum_os_version = options
        .minimum_os_version
        .map(str::to_string)
        .or_else(|| {
            components
                .first()
                .and_then(|c| c.descriptor.minimum_os_version.clone())
        })
        .unwrap_or_default();

    let manifest = render_manifest(&template, options.title, &minimum_os_version, &components)?;
    validate_manifest(&manifest, &components)?;

    tokio::fs::create_dir_all(options.output_dir)
        .await
        .fs_context("creating output directory", options.output_dir)?;

    let manifest_path = options.components_dir.join("distribution.xml");
    tokio::fs::write(&manifest_path, &manifest)
        .await
        .fs_context("writing distribution manifest", &manifest_path)?;

    let output = unnotarized_path(options.output_dir, options.name, &version);
    let inv = Invocation::new("productbuild")
        .arg("--distribution")
        .path(&manifest_path)
        .arg("--package-path")
        .path(options.components_dir)
        .arg("--sign")
        .arg(options.identity.installer.as_str())
        .arg("--timestamp")
        .path(&output);

    log::info!("Building distribution package {}", output.display());
    run_checked(runner, &inv)
        .await
        .map_err(DistributionError::Tool)?;

    let check = Invocation::new("pkgutil").arg("--check-signature").path(&output);
    run_checked(runner, &check)
        .await
        .map_err(|failure| DistributionError::Unsigned {
            path: output.clone(),
            failure,
        })?;

    let sha256 = calculate_sha256(&output)
        .await
        .fs_context("hashing distribution package", &output)?;

    Ok(DistributionPackage {
        path: output,
        version: Some(version),
        components,
        manifest: Some(manifest_path),
        sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packager::model::PackageDescriptor;

    fn component(identifier: &str, version: &str) -> ComponentPackage {
        ComponentPackage {
            path: PathBuf::from(format!("/tmp/components/{}.pkg", identifier)),
            descriptor: PackageDescriptor {
                identifier: identifier.to_string(),
                version: semver::Version::parse(version).expect("version"),
                install_location: PathBuf::from("/Applications"),
                minimum_os_version: Some("11.0".to_string()),
            },
            sha256: "0".repeat(64),
        }
    }

    #[test]
    fn test_default_manifest_references_every_component() {
        let components = vec![
            component("com.example.viewer", "2.1.0"),
            component("com.example.helper", "2.1.0"),
        ];
        let manifest =
            render_manifest(DEFAULT_TEMPLATE, "Viewer", "11.0", &components).expect("render");

        assert!(manifest.contains(r#"<pkg-ref id="com.example.viewer" version="2.1.0""#));
        assert!(manifest.contains(">com.example.helper.pkg</pkg-ref>"));
        assert!(manifest.contains(r#"<os-version min="11.0"/>"#));
        validate_manifest(&manifest, &components).expect("valid manifest");
    }

    #[test]
    fn test_manifest_rendering_is_deterministic() {
        let components = vec![
            component("com.example.viewer", "2.1.0"),
            component("com.example.helper", "2.1.0"),
        ];
        let first = render_manifest(DEFAULT_TEMPLATE, "Viewer", "11.0", &components).expect("render");
        let second =
            render_manifest(DEFAULT_TEMPLATE, "Viewer", "11.0", &components).expect("render");
        assert_eq!(first, second);
    }

    #[test]
    fn test_version_mismatch() {
        let components = vec![
            component("com.example.viewer", "2.1.0"),
            component("com.example.helper", "2.0.9"),
        ];
        let err = common_version(&components).expect_err("mismatch");
        match err {
            DistributionError::VersionMismatch {
                identifier,
                expected,
                found,
            } => {
                assert_eq!(identifier, "com.example.helper");
                assert_eq!(expected, "2.1.0");
                assert_eq!(found, "2.0.9");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_no_components() {
        assert!(matches!(
            common_version(&[]),
            Err(DistributionError::NoComponents)
        ));
    }

    #[test]
    fn test_manifest_referencing_absent_component() {
        let components = vec![component("com.example.viewer", "2.1.0")];
        let manifest = r#"<installer-gui-script minSpecVersion="2">
            <pkg-ref id="com.example.viewer"/>
            <pkg-ref id="com.example.missing"/>
        </installer-gui-script>"#;
        let err = validate_manifest(manifest, &components).expect_err("missing");
        assert!(
            matches!(err, DistributionError::MissingComponent { identifier } if identifier == "com.example.missing")
        );
    }

    #[test]
    fn test_manifest_skipping_component() {
        let components = vec![
            component("com.example.viewer", "2.1.0"),
            component("com.example.helper", "2.1.0"),
        ];
        let manifest = r#"<installer-gui-script><pkg-ref id="com.example.viewer"/></installer-gui-script>"#;
        let err = validate_manifest(manifest, &components).expect_err("unreferenced");
        assert!(matches!(err, DistributionError::UnreferencedComponent { .. }));
    }

    #[test]
    fn test_manifest_without_root_element() {
        let components = vec![component("com.example.viewer", "2.1.0")];
        let err = validate_manifest("<pkg-ref id=\"com.example.viewer\"/>", &components)
            .expect_err("malformed");
        assert!(matches!(err, DistributionError::MalformedManifest { .. }));
    }

    #[test]
    fn test_template_with_unknown_field_is_malformed() {
        let components = vec![component("com.example.viewer", "2.1.0")];
        let err = render_manifest("{{publisher}}", "Viewer", "11.0", &components)
            .expect_err("strict mode");
        assert!(matches!(err, DistributionError::MalformedManifest { .. }));
    }

    #[test]
    fn test_final_path_drops_unnotarized_marker() {
        assert_eq!(
            final_path(Path::new("/dist/Viewer-2.1.0.unnotarized.pkg")),
            PathBuf::from("/dist/Viewer-2.1.0.pkg")
        );
        assert_eq!(
            unnotarized_path(Path::new("/dist"), "Viewer", &semver::Version::new(2, 1, 0)),
            PathBuf::from("/dist/Viewer-2.1.0.unnotarized.pkg")
        );
    }
}
