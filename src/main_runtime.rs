use flexmon::adapters::FlexWebClient;
use flexmon::broker::build_connection;
use flexmon::config::{AppConfig, LoggingConfig};
use flexmon::error::Result;
use flexmon::flex::FlexQueryService;
use flexmon::services::Metrics;
use flexmon::supervisor::{HealthMonitor, MonitorConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Services shared by every command
pub struct Runtime {
    pub flex: Arc<FlexQueryService>,
    pub monitor: Arc<HealthMonitor>,
    pub metrics: Arc<Metrics>,
}

pub async fn build_runtime(config: &AppConfig) -> Result<Runtime> {
    let metrics = Arc::new(Metrics::new());

    let transport = Arc::new(FlexWebClient::new(&config.flex)?);
    let flex = FlexQueryService::new(transport, config).with_metrics(Arc::clone(&metrics));

    let monitor = HealthMonitor::new(MonitorConfig::from(&config.health))
        .with_metrics(Arc::clone(&metrics));
    for target in &config.health.targets {
        let connection = build_connection(target)?;
        monitor.register(&target.id, connection).await;
        info!("Monitoring {} target {}", target.kind, target.id);
    }
    if config.health.targets.is_empty() {
        warn!("No health targets configured");
    }

    Ok(Runtime {
        flex: Arc::new(flex),
        monitor: Arc::new(monitor),
        metrics,
    })
}

pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},flexmon={}", config.level, config.level)));

    // `rolling::daily` panics if it cannot create the initial file, so check writability first
    let file_layer = config.dir.as_deref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }

        let test_path = std::path::Path::new(log_dir).join(".flexmon_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                let file_appender = tracing_appender::rolling::daily(log_dir, "flexmon.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Process-lifetime guard
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    let (console_text, console_json) = if config.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_text)
        .with(console_json)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, config.dir.as_deref()) {
        eprintln!("Logging to: {}/flexmon.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();
}
