//! macOS release packaging pipeline.
//!
//! Turns pre-built application bundles into one signed, notarized and
//! stapled installer package by driving the platform tools:
//!
//! | Stage | Module | Tool |
//! |---|---|---|
//! | `SignArtifacts` | [`sign`] | `codesign` |
//! | `BuildComponentPackage` | [`component`] | `pkgbuild` |
//! | `BuildDistribution` | [`distribution`] | `productbuild`, `pkgutil` |
//! | `Notarize` | [`notarize`] | `xcrun notarytool` |
//! | `Staple` | [`staple`] | `xcrun stapler` |
//!
//! [`pipeline::ReleasePackager`] runs them in order.

pub mod checksum;
pub mod component;
pub mod credentials;
pub mod distribution;
pub mod fs;
pub mod model;
pub mod notarize;
pub mod pipeline;
pub mod report;
pub mod sign;
pub mod staple;
pub mod tool;
pub mod tool_detection;

pub use model::{
    ApiCredentials, ApplicationBundle, ArtifactKind, BinaryArtifact, ComponentPackage,
    DistributionPackage, FinalPackage, NotarizationReceipt, NotarizationStatus,
    PackageDescriptor, PrivateKeySource, SignedBundle, SigningIdentity,
};
pub use notarize::WaitPolicy;
pub use pipeline::{ComponentPlan, ReleaseOutcome, ReleasePackager, ReleasePlan};
pub use tool::{Invocation, SystemToolRunner, ToolOutput, ToolRunner};
