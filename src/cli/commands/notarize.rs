//! `notarize`: resubmit an already-built distribution package.

use crate::cli::{NotarizeArgs, OutputManager};
use crate::error::Result;
use crate::packager::notarize::WaitPolicy;
use crate::packager::tool_detection::preflight;
use crate::packager::{ReleasePackager, SigningIdentity, SystemToolRunner};
use tokio_util::sync::CancellationToken;

/// Execute `notarize`
pub(super) async fn execute_notarize(
    args: &NotarizeArgs,
    output: &OutputManager,
    cancel: &CancellationToken,
) -> Result<()> {
    preflight()?;

    let credentials = args.notary.credentials()?;
    let policy = args.notary.wait_policy(WaitPolicy::default());

    // nothing is signed on this path
    let packager = ReleasePackager::new(SystemToolRunner, SigningIdentity::default(), output.clone());
    let outcome = packager
        .resubmit(&args.package, &credentials, &policy, cancel)
        .await?;

    output.println("");
    output.success(&format!("Release ready: {}", outcome.package.path.display()));
    output.indent(&format!("sha256 {}", outcome.package.sha256));
    output.indent(&format!("report {}", outcome.report.display()));
    Ok(())
}
