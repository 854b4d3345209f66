//! # kodegen_bundler_pkg
//!
//! Signed, notarized and stapled macOS installer packages from pre-built
//! application bundles.
//!
//! One run executes a strictly sequential pipeline:
//!
//! 1. **SignArtifacts**: `codesign` every nested library and executable,
//!    inside-out, with hardened runtime and a fixed entitlements policy
//! 2. **BuildComponentPackage**: one `pkgbuild` component per bundle
//! 3. **BuildDistribution**: merge components with `productbuild` under a
//!    rendered distribution manifest, signed with the installer identity
//! 4. **Notarize**: `notarytool submit` and wait for the verdict
//! 5. **Staple**: `stapler staple` + `stapler validate`
//!
//! The first failing stage stops the run and determines the exit status.
//!
//! ## Usage
//!
//! ```bash
//! kodegen_bundler_pkg package 2.1.0 --team-id ABCDE12345
//! kodegen_bundler_pkg notarize dist/Viewer-2.1.0.unnotarized.pkg
//! kodegen_bundler_pkg doctor
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod cli;
pub mod config;
pub mod error;
pub mod packager;

pub use cli::Args;
pub use config::PackagerConfig;
pub use error::{PackagerError, Result};
pub use packager::{ReleasePackager, ReleasePlan, SystemToolRunner, ToolRunner};
