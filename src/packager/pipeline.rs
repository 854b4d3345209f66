//! The five-stage release pipeline.
//!
//! [`ReleasePackager`] runs `SignArtifacts → BuildComponentPackage →
//! BuildDistribution → Notarize → Staple` strictly in order. Each stage takes
//! the previous stage's output by value, and the first failure is returned
//! unchanged so the caller can map it to that stage's exit status.

use crate::cli::OutputManager;
use crate::config::PackagerConfig;
use crate::error::{ErrorExt, NotarizationError, PackagerError, PackagingError, Result};
use crate::packager::component::{self, IdentifierRegistry};
use crate::packager::distribution::{self, DistributionOptions, final_path};
use crate::packager::fs::create_dir_all;
use crate::packager::model::{
    ApiCredentials, ApplicationBundle, ComponentPackage, DistributionPackage, FinalPackage,
    NotarizationReceipt, PackageDescriptor, SignedBundle, SigningIdentity,
};
use crate::packager::notarize::{self, WaitPolicy};
use crate::packager::report::ReleaseReport;
use crate::packager::sign::{self, SignOptions};
use crate::packager::staple;
use crate::packager::tool::ToolRunner;
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const STAGES: usize = 5;

/// One bundle and the package it becomes.
#[derive(Debug, Clone)]
pub struct ComponentPlan {
    /// Pre-built `.app` bundle
    pub bundle: PathBuf,
    /// Package descriptor for it
    pub descriptor: PackageDescriptor,
}

/// Everything a full release run needs besides credentials.
#[derive(Debug, Clone)]
pub struct ReleasePlan {
    /// Product name used in file names
    pub name: String,
    /// Installer title
    pub title: String,
    /// Release version
    pub version: semver::Version,
    /// Entitlements policy
    pub entitlements: PathBuf,
    /// Custom distribution manifest template
    pub template: Option<PathBuf>,
    /// Minimum macOS version for the distribution volume check
    pub minimum_os_version: Option<String>,
    /// Output directory
    pub output_dir: PathBuf,
    /// Components in manifest order
    pub components: Vec<ComponentPlan>,
    /// Discard stapled tickets instead of refusing to re-sign
    pub force_resign: bool,
    /// Notarization wait policy
    pub wait: WaitPolicy,
}

impl ReleasePlan {
    /// Plan a release of `version` from a loaded config.
    pub fn from_config(config: &PackagerConfig, version: semver::Version) -> Self {
        let components = config
            .components
            .iter()
            .map(|c| ComponentPlan {
                bundle: c.bundle.clone(),
                descriptor: config.descriptor(c, &version),
            })
            .collect();

        Self {
            name: config.product.name.clone(),
            title: config.title().to_string(),
            version,
            entitlements: config.product.entitlements.clone(),
            template: config.product.distribution_template.clone(),
            minimum_os_version: config.product.minimum_system_version.clone(),
            output_dir: config.product.output_dir.clone(),
            components,
            force_resign: false,
            wait: config.wait_policy(),
        }
    }

    /// Directory the component packages are written to.
    pub fn components_dir(&self) -> PathBuf {
        self.output_dir.join("components")
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    /// The stapled package
    pub package: FinalPackage,
    /// Release report path
    pub report: PathBuf,
}

/// Runs the release pipeline through a [`ToolRunner`].
#[derive(Debug)]
pub struct ReleasePackager<R: ToolRunner> {
    runner: R,
    identity: SigningIdentity,
    output: OutputManager,
}

impl<R: ToolRunner> ReleasePackager<R> {
    /// Create a packager signing with `identity`.
    pub fn new(runner: R, identity: SigningIdentity, output: OutputManager) -> Self {
        Self {
            runner,
            identity,
            output,
        }
    }

    /// The tool runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Signing identity in use.
    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    /// `SignArtifacts` for one bundle.
    pub async fn sign_artifacts(
        &self,
        bundle: ApplicationBundle,
        entitlements: &Path,
        force_resign: bool,
    ) -> Result<SignedBundle> {
        let options = SignOptions {
            identity: &self.identity,
            entitlements,
            force_resign,
        };
        let signed = sign::sign_artifacts(&self.runner, bundle, &options).await?;
        self.output.success(&format!(
            "Signed {} ({} artifacts, inside-out)",
            signed.bundle.file_name(),
            signed.signing_order.len()
        ));
        Ok(signed)
    }

    /// `BuildComponentPackage` for one signed bundle.
    pub async fn build_component_package(
        &self,
        signed: &SignedBundle,
        descriptor: PackageDescriptor,
        components_dir: &Path,
        registry: &mut IdentifierRegistry,
    ) -> Result<ComponentPackage> {
        let package = component::build_component_package(
            &self.runner,
            signed,
            descriptor,
            components_dir,
            registry,
        )
        .await?;
        self.output.success(&format!(
            "Built component {} → {}",
            package.descriptor.identifier,
            package.file_name()
        ));
        self.output.indent(&format!("sha256 {}", package.sha256));
        Ok(package)
    }

    /// `BuildDistribution` over all component packages.
    pub async fn build_distribution(
        &self,
        components: Vec<ComponentPackage>,
        options: &DistributionOptions<'_>,
    ) -> Result<DistributionPackage> {
        let package = distribution::build_distribution(&self.runner, components, options).await?;
        self.output
            .success(&format!("Built signed distribution {}", package.path.display()));
        self.output.indent(&format!("sha256 {}", package.sha256));
        Ok(package)
    }

    /// `Notarize`: submit and wait, honoring `cancel`.
    pub async fn notarize(
        &self,
        package: &DistributionPackage,
        credentials: &ApiCredentials,
        policy: &WaitPolicy,
        cancel: &CancellationToken,
    ) -> Result<NotarizationReceipt> {
        self.output.progress(&format!(
            "Waiting for notarization (timeout {}s, polling every {}s)",
            policy.timeout.as_secs(),
            policy.poll_interval.as_secs()
        ));
        let receipt =
            notarize::notarize(&self.runner, package, credentials, policy, cancel).await?;
        self.output
            .success(&format!("Notarization accepted (submission {})", receipt.submission_id));
        Ok(receipt)
    }

    /// `Staple`: attach the ticket and give the package its final name.
    pub async fn staple(
        &self,
        package: DistributionPackage,
        receipt: NotarizationReceipt,
    ) -> Result<FinalPackage> {
        let stapled = staple::staple(&self.runner, package, receipt).await?;
        let finished = staple::promote(stapled).await?;
        self.output
            .success(&format!("Stapled and validated {}", finished.path.display()));
        Ok(finished)
    }

    /// Run all five stages for `plan`.
    ///
    /// Halts at the first failing stage; nothing after it runs. Cancelling
    /// `cancel` stops the local stages with [`PackagerError::Interrupted`]
    /// and the notarization wait with a cancelled timeout.
    pub async fn run(
        &self,
        plan: &ReleasePlan,
        credentials: &ApiCredentials,
        cancel: &CancellationToken,
    ) -> Result<ReleaseOutcome> {
        let started_at = Utc::now();

        const SIGN: &str = "SignArtifacts";
        self.output.stage(1, STAGES, SIGN);
        sign::check_entitlements(&plan.entitlements)?;
        let mut signed = Vec::with_capacity(plan.components.len());
        for component in &plan.components {
            let bundle = ApplicationBundle::discover(&component.bundle)?;
            signed.push(
                interruptible(
                    SIGN,
                    cancel,
                    self.sign_artifacts(bundle, &plan.entitlements, plan.force_resign),
                )
                .await?,
            );
        }

        const PACKAGE: &str = "BuildComponentPackage";
        ensure_running(PACKAGE, cancel)?;
        self.output.stage(2, STAGES, PACKAGE);
        let components_dir = plan.components_dir();
        create_dir_all(&components_dir, true)
            .await
            .fs_context("preparing components directory", &components_dir)
            .map_err(PackagingError::from)?;
        let mut registry = IdentifierRegistry::new();
        let mut components = Vec::with_capacity(signed.len());
        for (bundle, component) in signed.iter().zip(&plan.components) {
            components.push(
                interruptible(
                    PACKAGE,
                    cancel,
                    self.build_component_package(
                        bundle,
                        component.descriptor.clone(),
                        &components_dir,
                        &mut registry,
                    ),
                )
                .await?,
            );
        }

        const DISTRIBUTION: &str = "BuildDistribution";
        ensure_running(DISTRIBUTION, cancel)?;
        self.output.stage(3, STAGES, DISTRIBUTION);
        let options = DistributionOptions {
            name: &plan.name,
            title: &plan.title,
            minimum_os_version: plan.minimum_os_version.as_deref(),
            template: plan.template.as_deref(),
            identity: &self.identity,
            components_dir: &components_dir,
            output_dir: &plan.output_dir,
        };
        let package = interruptible(
            DISTRIBUTION,
            cancel,
            self.build_distribution(components, &options),
        )
        .await?;

        self.finish(package, credentials, &plan.wait, cancel, started_at)
            .await
    }

    /// Notarize and staple an already-built distribution package.
    ///
    /// This is the recovery path after a notarization failure or timeout:
    /// the signed `.unnotarized.pkg` is still valid and need not be rebuilt.
    pub async fn resubmit(
        &self,
        path: &Path,
        credentials: &ApiCredentials,
        policy: &WaitPolicy,
        cancel: &CancellationToken,
    ) -> Result<ReleaseOutcome> {
        let started_at = Utc::now();
        let package = DistributionPackage::existing(path)
            .await
            .fs_context("reading distribution package", path)
            .map_err(NotarizationError::from)?;
        self.output
            .info(&format!("Resubmitting {}", package.path.display()));
        self.finish(package, credentials, policy, cancel, started_at)
            .await
    }

    async fn finish(
        &self,
        package: DistributionPackage,
        credentials: &ApiCredentials,
        policy: &WaitPolicy,
        cancel: &CancellationToken,
        started_at: chrono::DateTime<Utc>,
    ) -> Result<ReleaseOutcome> {
        ensure_running("Notarize", cancel)?;
        self.output.stage(4, STAGES, "Notarize");
        let receipt = self.notarize(&package, credentials, policy, cancel).await?;

        self.output.stage(5, STAGES, "Staple");
        let version = package.version.clone();
        let components = package.components.clone();
        let stapled = staple::staple(&self.runner, package, receipt).await?;

        // the report exists before any file carries the final name
        let final_package = FinalPackage {
            path: final_path(&stapled.path),
            ..stapled.clone()
        };
        let report = ReleaseReport::new(version, &components, &final_package, started_at);
        let report_path = ReleaseReport::path_for(&final_package.path);
        report.write(&report_path).await?;
        self.output
            .verbose(&format!("Release report written to {}", report_path.display()));

        let finished = staple::promote(stapled).await?;
        self.output
            .success(&format!("Stapled and validated {}", finished.path.display()));

        Ok(ReleaseOutcome {
            package: finished,
            report: report_path,
        })
    }
}

/// Fail with [`PackagerError::Interrupted`] once `cancel` has fired.
fn ensure_running(stage: &'static str, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        log::warn!("Interrupted before {}", stage);
        return Err(PackagerError::Interrupted { stage });
    }
    Ok(())
}

/// Run one step of a local stage unless `cancel` fires first.
///
/// Dropping the step kills the tool it is waiting on.
async fn interruptible<T>(
    stage: &'static str,
    cancel: &CancellationToken,
    step: impl Future<Output = Result<T>>,
) -> Result<T> {
    ensure_running(stage, cancel)?;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            log::warn!("Interrupted during {}", stage);
            Err(PackagerError::Interrupted { stage })
        }
        result = step => result,
    }
}
