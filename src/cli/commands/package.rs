//! `package`: the full five-stage release.

use crate::cli::{OutputManager, PackageArgs};
use crate::config::PackagerConfig;
use crate::error::{ConfigError, Result};
use crate::packager::tool_detection::preflight;
use crate::packager::{ReleasePackager, ReleasePlan, SystemToolRunner};
use path_absolutize::Absolutize;
use tokio_util::sync::CancellationToken;

/// Execute `package`
pub(super) async fn execute_package(
    args: &PackageArgs,
    output: &OutputManager,
    cancel: &CancellationToken,
) -> Result<()> {
    let version = args.release_version()?;

    preflight()?;
    output.verbose("All required tools found");

    let mut config = PackagerConfig::load(&args.config)?;
    if let Some(dir) = &args.output_dir {
        config.product.output_dir = dir
            .absolutize()
            .map_err(|source| ConfigError::Resolve {
                path: dir.clone(),
                source,
            })?
            .into_owned();
    }

    let mut plan = ReleasePlan::from_config(&config, version);
    plan.force_resign = args.force_resign;
    plan.wait = args.notary.wait_policy(plan.wait);

    let credentials = args.notary.credentials()?;
    let identity = args.identity();

    output.section(&format!("Packaging {} {}", plan.name, plan.version));
    output.verbose(&format!("Code signing identity: {}", identity.application));
    output.verbose(&format!("Installer signing identity: {}", identity.installer));
    for component in &plan.components {
        output.indent(&format!(
            "{} ← {}",
            component.descriptor.identifier,
            component.bundle.display()
        ));
    }

    let packager = ReleasePackager::new(SystemToolRunner, identity, output.clone());
    let outcome = packager.run(&plan, &credentials, cancel).await?;

    output.println("");
    output.success(&format!("Release ready: {}", outcome.package.path.display()));
    output.indent(&format!("sha256 {}", outcome.package.sha256));
    output.indent(&format!("report {}", outcome.report.display()));
    Ok(())
}
