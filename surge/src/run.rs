use std::sync::Arc;

use surge_core::surge_metrics::Registry;
use surge_core::{HttpWorkUnit, Scheduler, register_builtin_metrics, validate_thresholds};
use surge_http::{HttpClient, HttpClientOptions};
use tokio_util::sync::CancellationToken;

use crate::cli::{RunArgs, ValidateArgs};
use crate::config_file::{self, LoadedConfig, Overrides};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let overrides = Overrides {
        base_url: args.base_url.clone(),
        vus_cap: args.vus_cap,
        graceful_stop: args.graceful_stop,
    };
    let config = config_file::load(&args.config, &overrides)
        .await
        .map_err(RunError::InvalidInput)?;
    out.print_header(&args.config, &config);

    let LoadedConfig { run, target } = config;
    let scheduler = Scheduler::new(run, Arc::new(Registry::default()))?;
    let client = Arc::new(HttpClient::new(HttpClientOptions::default()));
    let work = Arc::new(HttpWorkUnit::new(client, target)?);

    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_handler(cancel.clone());

    let report = scheduler
        .start_with_progress(work, cancel, out.progress())
        .await;
    interrupt.abort();
    let report = report?;

    out.print_summary(&report).map_err(RunError::RuntimeError)?;
    Ok(ExitCode::from_report(&report))
}

/// Loads a config and checks it the same way `run` would, without sending traffic.
pub async fn validate(args: ValidateArgs) -> Result<ExitCode, RunError> {
    let overrides = Overrides {
        base_url: args.base_url,
        ..Overrides::default()
    };
    let LoadedConfig { run, target } = config_file::load(&args.config, &overrides)
        .await
        .map_err(RunError::InvalidInput)?;

    let registry = Registry::default();
    register_builtin_metrics(&registry).map_err(|e| RunError::RuntimeError(e.into()))?;
    validate_thresholds(&run.thresholds, &registry)?;

    println!(
        "config ok: {} stages ({}s), {} thresholds, {} endpoints, target {}",
        run.stages.len(),
        run.total_duration().as_secs(),
        run.thresholds.len(),
        target.endpoints.len(),
        target.base_url
    );
    Ok(ExitCode::Success)
}

fn spawn_interrupt_handler(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupt received; stopping run");
                cancel.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "failed to listen for ctrl-c"),
        }
    })
}
