use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use clap::Parser;
use flexmon::api::AppState;
use flexmon::adapters::start_api_server;
use flexmon::cli::{self, Cli, Commands};
use flexmon::config::AppConfig;
use flexmon::error::{FlexmonError, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod main_runtime;

use main_runtime::{build_runtime, init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    if let Err(errors) = config.validate() {
        return Err(FlexmonError::Configuration(errors.join("; ")));
    }

    match &cli.command {
        Commands::Execute {
            kind,
            wait,
            max_wait,
        } => {
            init_logging_simple();
            let runtime = build_runtime(&config).await?;
            let handle = runtime.flex.execute_kind(*kind).await?;
            cli::print_job(&handle);

            if let (true, Some(reference)) = (*wait, handle.reference.as_deref()) {
                let records = runtime
                    .flex
                    .get_data(reference, true, max_wait.map(Duration::from_secs))
                    .await?;
                cli::print_records(&records);
            }
        }
        Commands::Fetch {
            reference,
            wait,
            max_wait,
        } => {
            init_logging_simple();
            let runtime = build_runtime(&config).await?;
            match runtime
                .flex
                .get_data(reference, *wait, max_wait.map(Duration::from_secs))
                .await
            {
                Ok(records) => cli::print_records(&records),
                Err(FlexmonError::NotReady { reference }) => {
                    println!("  Report {} is still being generated, retry later.", reference);
                }
                Err(e) => return Err(e),
            }
        }
        Commands::Metrics {
            reference,
            start,
            end,
            max_wait,
        } => {
            init_logging_simple();
            let runtime = build_runtime(&config).await?;
            let records = runtime
                .flex
                .get_data(reference, true, max_wait.map(Duration::from_secs))
                .await?;

            let (period_start, period_end) = metrics_window(*start, *end)?;
            let metrics = runtime
                .flex
                .compute_metrics(&records.records, period_start, period_end);
            cli::print_metrics(&metrics);
        }
        Commands::Health { target } => {
            init_logging_simple();
            let runtime = build_runtime(&config).await?;
            let results = runtime.monitor.force_check(target.as_deref()).await?;
            cli::print_health(&results, &runtime.monitor.summary());
        }
        Commands::Serve { port } => {
            init_logging(&config.logging);
            run_server(&config, port.unwrap_or(config.server.port)).await?;
        }
    }

    Ok(())
}

/// Resolve the metrics period; defaults to the 90 days ending today
fn metrics_window(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)> {
    let end = end.unwrap_or_else(|| Utc::now().date_naive());
    let start = start.unwrap_or(end - ChronoDuration::days(90));
    if start > end {
        return Err(FlexmonError::Configuration(format!(
            "period start {} is after end {}",
            start, end
        )));
    }

    Ok((
        start.and_time(chrono::NaiveTime::MIN).and_utc(),
        end.and_time(chrono::NaiveTime::MIN).and_utc(),
    ))
}

async fn run_server(config: &AppConfig, port: u16) -> Result<()> {
    info!("Starting flexmon server");

    let runtime = build_runtime(config).await?;
    let monitor = Arc::clone(&runtime.monitor);
    monitor.start_monitoring(Duration::from_secs(config.health.check_interval_secs));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    let state = AppState::new(runtime.flex, Arc::clone(&monitor), runtime.metrics);
    let served = start_api_server(state, port, shutdown).await;

    monitor.stop_monitoring();
    info!("flexmon stopped");
    served
}
