//! Wiring of one invocation: command line, CI platform and AWS backends.

use crate::cli::Cli;
use crate::console::{ConsoleReporter, summary_json};
use crate::errors::{CliError, EXIT_OK};
use crate::package::package_source;
use crate::shutdown::{cancel_after, install_signal_handlers};
use buildrelay_aws::AwsBackend;
use buildrelay_ci::CIContext;
use buildrelay_core::{Collaborators, EnvironmentCollector, Relay, RunInput, RunOutcome};
use std::io::Write;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run the relay against the given collaborators.
///
/// Settings are validated before the working tree is packaged or any remote
/// service is contacted.
///
/// # Errors
/// Returns configuration and packaging errors, and any fatal lifecycle
/// error.
pub async fn relay(
    cli: &Cli,
    ci: &CIContext,
    platform_pattern: Option<&str>,
    services: Collaborators<'_>,
    cancel: &CancellationToken,
) -> Result<RunOutcome, CliError> {
    let config = cli.relay_config(ci)?;
    config.validate()?;

    let collector = EnvironmentCollector::new(
        platform_pattern
            .into_iter()
            .chain(cli.env_pattern.as_deref()),
    )?;
    let mut overrides = collector.collect();
    debug!(collected = overrides.len(), explicit = cli.env.len(), "Collected environment");
    overrides.extend(cli.env.iter().cloned());

    let template = cli.template()?;

    let root = cli.source_dir.clone();
    let exclude = vec![config.artifact_dir.clone()];
    let source_archive = tokio::task::spawn_blocking(move || package_source(&root, &exclude))
        .await
        .map_err(|e| CliError::Package {
            path: cli.source_dir.display().to_string(),
            message: e.to_string(),
        })??;

    let input = RunInput {
        source_archive,
        overrides,
        template,
    };
    Ok(Relay::new(&config, services).run(input, cancel).await?)
}

/// Run one invocation against AWS and return the process exit code.
///
/// Missing settings fail before AWS configuration is loaded.
///
/// # Errors
/// Returns any error from [`relay`], and [`CliError::Relay`] with a
/// `BuildFailed` error when the build did not succeed.
pub async fn execute(cli: Cli) -> Result<i32, CliError> {
    let provider = buildrelay_ci::detect();
    let ci = provider.context().clone();
    info!(ci = %ci, "Detected CI platform");

    // Settings errors are reported before the credential chain is consulted.
    cli.relay_config(&ci)?.validate()?;
    let backend = AwsBackend::from_env().await;
    let cancel = CancellationToken::new();
    install_signal_handlers(cancel.clone());
    if let Some(secs) = cli.timeout {
        cancel_after(cancel.clone(), Duration::from_secs(secs));
    }

    let reporter = ConsoleReporter::stdio();
    let services = Collaborators {
        builds: &backend.builds,
        logs: &backend.logs,
        sources: &backend.store,
        archive: &backend.store,
        artifacts: &backend.store,
        reporter: &reporter,
    };

    let outcome = relay(&cli, &ci, provider.env_pattern(), services, &cancel).await;
    // Stop the signal and timeout tasks.
    cancel.cancel();

    match outcome? {
        RunOutcome::Submitted(handle) => {
            if cli.json {
                emit(&serde_json::json!({ "buildId": handle.build_id }));
            } else {
                emit_line(&handle.build_id);
            }
            Ok(EXIT_OK)
        }
        RunOutcome::Completed(outcome) => {
            if cli.json {
                emit(&summary_json(&outcome));
            }
            outcome.into_result()?;
            Ok(EXIT_OK)
        }
    }
}

fn emit(value: &serde_json::Value) {
    emit_line(&value.to_string());
}

fn emit_line(line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = writeln!(out, "{line}");
}
