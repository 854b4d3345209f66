//! `Packager.toml` loading and validation.
//!
//! ```toml
//! [product]
//! name = "Viewer"
//! title = "Viewer for macOS"
//! entitlements = "macos/entitlements.plist"
//! minimum_system_version = "11.0"
//!
//! [[component]]
//! bundle = "target/release/bundle/macos/Viewer.app"
//! identifier = "com.example.viewer"
//!
//! [notarization]
//! timeout_secs = 3600
//! poll_interval_secs = 30
//! ```
//!
//! Relative paths are resolved against the directory holding the file, so
//! the packager behaves the same from any working directory.

use crate::error::ConfigError;
use crate::packager::model::PackageDescriptor;
use crate::packager::notarize::WaitPolicy;
use path_absolutize::Absolutize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "Packager.toml";

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_install_location() -> PathBuf {
    PathBuf::from("/Applications")
}

/// Parsed `Packager.toml`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackagerConfig {
    /// Product-wide settings
    pub product: ProductConfig,
    /// One entry per application bundle, in manifest order
    #[serde(rename = "component", default)]
    pub components: Vec<ComponentConfig>,
    /// Notarization wait policy
    #[serde(default)]
    pub notarization: NotarizationConfig,
}

/// `[product]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductConfig {
    /// Name used in package file names
    pub name: String,
    /// Installer title, defaults to `name`
    #[serde(default)]
    pub title: Option<String>,
    /// Where packages and the report are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Entitlements policy applied to every bundle
    pub entitlements: PathBuf,
    /// Custom Handlebars distribution manifest
    #[serde(default)]
    pub distribution_template: Option<PathBuf>,
    /// Default minimum macOS version for components
    #[serde(default)]
    pub minimum_system_version: Option<String>,
    /// Default install location for components
    #[serde(default = "default_install_location")]
    pub install_location: PathBuf,
}

/// `[[component]]` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentConfig {
    /// Pre-built `.app` bundle
    pub bundle: PathBuf,
    /// Reverse-domain package identifier
    pub identifier: String,
    /// Overrides `product.install_location`
    #[serde(default)]
    pub install_location: Option<PathBuf>,
    /// Overrides `product.minimum_system_version`
    #[serde(default)]
    pub minimum_system_version: Option<String>,
}

/// `[notarization]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotarizationConfig {
    /// Upper bound on the wait, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Delay between status polls, in seconds
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

impl PackagerConfig {
    /// Load, resolve and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::parse(&content, path)?;

        let absolute = path.absolutize().map_err(|source| ConfigError::Resolve {
            path: path.to_path_buf(),
            source,
        })?;
        let base = absolute.parent().unwrap_or_else(|| Path::new("/"));
        config.resolve_paths(base)?;
        config.validate()?;

        log::debug!(
            "Loaded {} with {} component(s)",
            path.display(),
            config.components.len()
        );
        Ok(config)
    }

    /// Parse config text; `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Make every relative path absolute against `base`.
    pub fn resolve_paths(&mut self, base: &Path) -> Result<(), ConfigError> {
        self.product.output_dir = resolve(&self.product.output_dir, base)?;
        self.product.entitlements = resolve(&self.product.entitlements, base)?;
        if let Some(template) = &self.product.distribution_template {
            self.product.distribution_template = Some(resolve(template, base)?);
        }
        for component in &mut self.components {
            component.bundle = resolve(&component.bundle, base)?;
        }
        Ok(())
    }

    /// Reject configurations that cannot produce a package at all.
    ///
    /// Identifier shape, uniqueness and minimum OS are left to the packaging
    /// stage so they fail with that stage's error and exit status.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.product.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                reason: "product.name must not be empty".to_string(),
            });
        }
        if self.product.name.contains('/') {
            return Err(ConfigError::Invalid {
                reason: format!("product.name '{}' must not contain '/'", self.product.name),
            });
        }
        if self.components.is_empty() {
            return Err(ConfigError::Invalid {
                reason: "at least one [[component]] is required".to_string(),
            });
        }
        if self.notarization.poll_interval_secs == Some(0) {
            return Err(ConfigError::Invalid {
                reason: "notarization.poll_interval_secs must be greater than zero".to_string(),
            });
        }
        if self.notarization.timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                reason: "notarization.timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Installer title.
    pub fn title(&self) -> &str {
        self.product.title.as_deref().unwrap_or(&self.product.name)
    }

    /// Descriptor for `component` at `version`, with product defaults applied.
    pub fn descriptor(&self, component: &ComponentConfig, version: &semver::Version) -> PackageDescriptor {
        PackageDescriptor {
            identifier: component.identifier.clone(),
            version: version.clone(),
            install_location: component
                .install_location
                .clone()
                .unwrap_or_else(|| self.product.install_location.clone()),
            minimum_os_version: component
                .minimum_system_version
                .clone()
                .or_else(|| self.product.minimum_system_version.clone()),
        }
    }

    /// Wait policy from the `[notarization]` table.
    pub fn wait_policy(&self) -> WaitPolicy {
        let defaults = WaitPolicy::default();
        WaitPolicy {
            timeout: self
                .notarization
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            poll_interval: self
                .notarization
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
        }
    }
}

fn resolve(path: &Path, base: &Path) -> Result<PathBuf, ConfigError> {
    path.absolutize_from(base)
        .map(|p| p.into_owned())
        .map_err(|source| ConfigError::Resolve {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[product]
name = "Viewer"
entitlements = "macos/entitlements.plist"
minimum_system_version = "11.0"

[[component]]
bundle = "build/Viewer.app"
identifier = "com.example.viewer"

[[component]]
bundle = "/opt/build/Helper.app"
identifier = "com.example.helper"
install_location = "/Library/Application Support/Viewer"
minimum_system_version = "12.0"

[notarization]
poll_interval_secs = 10
"#;

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Packager.toml");
        std::fs::write(&path, SAMPLE).expect("write");

        let config = PackagerConfig::load(&path).expect("load");
        assert_eq!(config.product.output_dir, dir.path().join("dist"));
        assert_eq!(
            config.product.entitlements,
            dir.path().join("macos/entitlements.plist")
        );
        assert_eq!(config.components[0].bundle, dir.path().join("build/Viewer.app"));
        assert_eq!(config.components[1].bundle, PathBuf::from("/opt/build/Helper.app"));
    }

    #[test]
    fn test_descriptor_applies_product_defaults() {
        let config = PackagerConfig::parse(SAMPLE, Path::new("Packager.toml")).expect("parse");
        let version = semver::Version::new(2, 1, 0);

        let viewer = config.descriptor(&config.components[0], &version);
        assert_eq!(viewer.install_location, PathBuf::from("/Applications"));
        assert_eq!(viewer.minimum_os_version.as_deref(), Some("11.0"));

        let helper = config.descriptor(&config.components[1], &version);
        assert_eq!(
            helper.install_location,
            PathBuf::from("/Library/Application Support/Viewer")
        );
        assert_eq!(helper.minimum_os_version.as_deref(), Some("12.0"));
    }

    #[test]
    fn test_wait_policy_overrides() {
        let config = PackagerConfig::parse(SAMPLE, Path::new("Packager.toml")).expect("parse");
        let policy = config.wait_policy();
        assert_eq!(policy.timeout, Duration::from_secs(3600));
        assert_eq!(policy.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = PackagerConfig::load(&dir.path().join("Packager.toml")).expect_err("missing");
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = PackagerConfig::parse(
            "[product]\nname = \"Viewer\"\nentitlements = \"e.plist\"\nsigning = true\n",
            Path::new("Packager.toml"),
        )
        .expect_err("unknown key");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_components_required() {
        let config = PackagerConfig::parse(
            "[product]\nname = \"Viewer\"\nentitlements = \"e.plist\"\n",
            Path::new("Packager.toml"),
        )
        .expect("parse");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
