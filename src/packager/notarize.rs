//! `Notarize`: submit a distribution package and wait for the verdict.
//!
//! Submission and polling are separate `notarytool` calls so that the wait is
//! under this process's control: it is bounded by [`WaitPolicy::timeout`] and
//! can be abandoned through a [`CancellationToken`]. Neither path touches the
//! package, which stays valid for a later resubmission.

use crate::error::{ErrorExt, NotarizationError, PackagerError, TimeoutError};
use crate::packager::checksum::calculate_sha256;
use crate::packager::credentials::ScopedApiKey;
use crate::packager::model::{
    ApiCredentials, DistributionPackage, NotarizationReceipt, NotarizationStatus,
};
use crate::packager::tool::{Invocation, ToolRunner, run_checked};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default upper bound on the notarization wait.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 60);
/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for the notarization service, and how often to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Give up after this long, measured from the start of the upload
    pub timeout: Duration,
    /// Delay between `notarytool info` calls
    pub poll_interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogResponse {
    #[serde(default)]
    status_summary: Option<String>,
    #[serde(default)]
    issues: Option<Vec<LogIssue>>,
}

#[derive(Debug, Deserialize)]
struct LogIssue {
    message: String,
    #[serde(default)]
    path: Option<String>,
}

fn parse_json<'a, T: Deserialize<'a>>(output: &'a str) -> Result<T, NotarizationError> {
    serde_json::from_str(output.trim()).map_err(|e| NotarizationError::UnexpectedOutput {
        reason: e.to_string(),
        output: output.to_string(),
    })
}

/// `notarytool` authentication arguments for an API key.
fn with_auth(inv: Invocation, credentials: &ApiCredentials, key: &ScopedApiKey) -> Invocation {
    inv.arg("--key")
        .path(key.path())
        .arg("--key-id")
        .arg(credentials.key_id.as_str())
        .arg("--issuer")
        .arg(credentials.issuer_id.as_str())
        .args(["--output-format", "json"])
}

/// Build the rejection reason from a `notarytool log` document.
///
/// The status summary comes first, followed by every issue message (with
/// the offending path when the log names one).
pub fn rejection_reason(log_json: &str) -> Option<String> {
    let log: LogResponse = serde_json::from_str(log_json.trim()).ok()?;

    let mut parts = Vec::new();
    if let Some(summary) = log.status_summary.filter(|s| !s.is_empty()) {
        parts.push(summary);
    }
    for issue in log.issues.unwrap_or_default() {
        match issue.path {
            Some(path) => parts.push(format!("{} ({})", issue.message, path)),
            None => parts.push(issue.message),
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("; "))
    }
}

fn timed_out(submission_id: Option<&str>, started: Instant, cancelled: bool) -> PackagerError {
    TimeoutError {
        submission_id: submission_id.map(str::to_string),
        waited: started.elapsed(),
        cancelled,
    }
    .into()
}

/// Submit `package` for notarization and block until the service decides.
///
/// # Arguments
/// * `runner` - Tool runner used for `xcrun notarytool`
/// * `package` - Signed distribution package; never modified
/// * `credentials` - App Store Connect API key
/// * `policy` - Timeout and poll interval
/// * `cancel` - Abandons the wait when triggered
///
/// # Returns
/// * `Ok(NotarizationReceipt)` - The service accepted the package
/// * `Err(PackagerError::Notarization)` - Rejected, or `notarytool` failed
/// * `Err(PackagerError::Timeout)` - The wait elapsed or was cancelled
pub async fn notarize<R: ToolRunner>(
    runner: &R,
    package: &DistributionPackage,
    credentials: &ApiCredentials,
    policy: &WaitPolicy,
    cancel: &CancellationToken,
) -> Result<NotarizationReceipt, PackagerError> {
    let started = Instant::now();
    let deadline = started + policy.timeout;

    let package_sha256 = calculate_sha256(&package.path)
        .await
        .fs_context("hashing package", &package.path)
        .map_err(NotarizationError::from)?;

    // Key material exists on disk only for the duration of this call.
    let key = ScopedApiKey::materialize(credentials)?;

    let submit = with_auth(
        Invocation::xcrun("notarytool").arg("submit").path(&package.path),
        credentials,
        &key,
    );

    log::info!("Submitting {} for notarization", package.path.display());
    let output = tokio::select! {
        _ = cancel.cancelled() => return Err(timed_out(None, started, true)),
        result = tokio::time::timeout_at(deadline, run_checked(runner, &submit)) => match result {
            Ok(output) => output.map_err(NotarizationError::Tool)?,
            Err(_) => return Err(timed_out(None, started, false)),
        },
    };
    let submission: SubmitResponse = parse_json(&output.stdout)?;
    log::info!(
        "Submission {} created{}",
        submission.id,
        submission
            .message
            .as_deref()
            .map(|m| format!(": {}", m))
            .unwrap_or_default()
    );

    let id = submission.id;
    loop {
        let info = with_auth(
            Invocation::xcrun("notarytool").arg("info").arg(id.as_str()),
            credentials,
            &key,
        );

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(timed_out(Some(&id), started, true)),
            result = tokio::time::timeout_at(deadline, run_checked(runner, &info)) => match result {
                Ok(output) => output.map_err(NotarizationError::Tool)?,
                Err(_) => return Err(timed_out(Some(&id), started, false)),
            },
        };
        let response: InfoResponse = parse_json(&output.stdout)?;
        let status = NotarizationStatus::parse(&response.status);

        match status {
            NotarizationStatus::InProgress => {
                log::info!("Submission {} still in progress", id);
            }
            NotarizationStatus::Accepted => {
                log::info!("Submission {} accepted", id);
                return Ok(NotarizationReceipt {
                    submission_id: id,
                    status,
                    package_sha256,
                    message: response.message,
                });
            }
            NotarizationStatus::Invalid | NotarizationStatus::Rejected => {
                let fetched = tokio::select! {
                    _ = cancel.cancelled() => None,
                    result = tokio::time::timeout_at(
                        deadline,
                        fetch_rejection_reason(runner, &id, credentials, &key),
                    ) => result.unwrap_or_else(|_| {
                        log::warn!("Timed out fetching notarization log for {}", id);
                        None
                    }),
                };
                let reason = fetched
                    .or(response.message)
                    .unwrap_or_else(|| status.as_str().to_string());
                return Err(NotarizationError::Rejected {
                    submission_id: id,
                    reason,
                }
                .into());
            }
            NotarizationStatus::Other(other) => {
                return Err(NotarizationError::UnexpectedOutput {
                    reason: format!("unknown submission status '{}'", other),
                    output: output.stdout,
                }
                .into());
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out(Some(&id), started, false));
        }
        let nap = policy.poll_interval.min(deadline - now);

        tokio::select! {
            _ = cancel.cancelled() => return Err(timed_out(Some(&id), started, true)),
            _ = tokio::time::sleep(nap) => {}
        }
    }
}

/// Fetch the developer log of a failed submission and summarize it.
///
/// A failure to fetch the log is not itself an error; the caller falls back
/// to the status message.
async fn fetch_rejection_reason<R: ToolRunner>(
    runner: &R,
    id: &str,
    credentials: &ApiCredentials,
    key: &ScopedApiKey,
) -> Option<String> {
    let log_inv = Invocation::xcrun("notarytool")
        .arg("log")
        .arg(id)
        .arg("--key")
        .path(key.path())
        .arg("--key-id")
        .arg(credentials.key_id.as_str())
        .arg("--issuer")
        .arg(credentials.issuer_id.as_str());

    match run_checked(runner, &log_inv).await {
        Ok(output) => rejection_reason(&output.stdout),
        Err(failure) => {
            log::warn!("Could not fetch notarization log for {}: {}", id, failure);
            None
        }
    }
}
