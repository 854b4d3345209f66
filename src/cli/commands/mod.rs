//! Command execution.
//!
//! Each subcommand returns `Result<()>`; this module turns the outcome into a
//! process exit status, printing the error and its recovery suggestions.

mod doctor;
mod notarize;
mod package;

use crate::cli::{Args, Command, OutputManager};
use crate::error::{PackagerError, Result};
use tokio_util::sync::CancellationToken;

use doctor::execute_doctor;
use notarize::execute_notarize;
use package::execute_package;

/// Execute the parsed command and return the process exit status
pub async fn execute_command(args: Args) -> Result<i32> {
    let output = OutputManager::new(args.verbose, args.quiet);

    if let Err(validation_error) = args.validate() {
        let error = PackagerError::from(validation_error);
        report_failure(&output, args.command.name(), &error);
        return Ok(error.exit_code());
    }

    let cancel = cancel_on_interrupt();

    let result = match &args.command {
        Command::Package(package) => execute_package(package, &output, &cancel).await,
        Command::Notarize(notarize) => execute_notarize(notarize, &output, &cancel).await,
        Command::Doctor => execute_doctor(&output).await,
    };

    match result {
        Ok(()) => Ok(0),
        Err(e) => {
            report_failure(&output, args.command.name(), &e);
            Ok(e.exit_code())
        }
    }
}

/// Token cancelled on Ctrl-C.
///
/// The local stages stop at once with an interrupted error. During the
/// notarization wait the package is left untouched so it can be resubmitted.
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received, stopping the run");
            token.cancel();
        }
    });
    cancel
}

fn report_failure(output: &OutputManager, command: &str, error: &PackagerError) {
    output.error(&format!("Command '{}' failed: {}", command, error));

    let suggestions = error.recovery_suggestions();
    if !suggestions.is_empty() && !output.is_quiet() {
        output.println("\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            output.indent(&format!("• {}", suggestion));
        }
    }
}
