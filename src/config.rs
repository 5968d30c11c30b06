use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::domain::ReportKind;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub flex: FlexConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlexConfig {
    /// Statement service endpoint (without the `/FlexStatementService.*` suffix)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Flex web service token
    #[serde(default)]
    pub token: Option<String>,
    /// Protocol version sent as `v`
    #[serde(default = "default_version")]
    pub version: u32,
    /// Query ids per report kind
    #[serde(default)]
    pub queries: QueryMappings,
    /// TCP connect timeout per remote call
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Whole-request timeout per remote call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://gdcdyn.interactivebrokers.com/Universal/servlet".to_string()
}

fn default_version() -> u32 {
    3
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    120
}

fn default_user_agent() -> String {
    "flexmon/0.1".to_string()
}

impl Default for FlexConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            version: default_version(),
            queries: QueryMappings::default(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct QueryMappings {
    #[serde(default)]
    pub trades: Option<String>,
    #[serde(default)]
    pub positions: Option<String>,
    #[serde(default)]
    pub cash: Option<String>,
}

impl QueryMappings {
    /// Configured query id for a report kind, ignoring blank values
    pub fn query_id(&self, kind: ReportKind) -> Option<&str> {
        let id = match kind {
            ReportKind::Trades => self.trades.as_deref(),
            ReportKind::Positions => self.positions.as_deref(),
            ReportKind::Cash => self.cash.as_deref(),
        };
        id.map(str::trim).filter(|id| !id.is_empty())
    }
}

/// Completion waiter tuning.
///
/// The defaults are tuned for the Flex statement service, whose generation
/// time ranges from seconds to many minutes.
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Delay while the statement is not ready, for the first `initial_attempts`
    #[serde(default = "default_initial_interval")]
    pub initial_interval_secs: u64,
    #[serde(default = "default_initial_attempts")]
    pub initial_attempts: u32,
    /// Delay from `initial_attempts` up to `medium_until_attempt`
    #[serde(default = "default_medium_interval")]
    pub medium_interval_secs: u64,
    #[serde(default = "default_medium_until")]
    pub medium_until_attempt: u32,
    /// Capped delay for every later attempt
    #[serde(default = "default_long_interval")]
    pub long_interval_secs: u64,
    /// First transport retry delay, doubled on each consecutive failure
    #[serde(default = "default_transport_base_delay")]
    pub transport_base_delay_ms: u64,
    #[serde(default = "default_transport_max_delay")]
    pub transport_max_delay_ms: u64,
    /// Consecutive transport failures tolerated before giving up
    #[serde(default = "default_max_transport_retries")]
    pub max_transport_retries: u32,
    /// End-to-end budget used when the caller does not pass one
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    /// Minimum spacing between "still waiting" log lines
    #[serde(default = "default_progress_interval")]
    pub progress_interval_secs: u64,
    /// Error-message phrases meaning "accepted but not generated yet"
    #[serde(default = "default_not_ready_phrases")]
    pub not_ready_phrases: Vec<String>,
}

fn default_initial_interval() -> u64 {
    10
}

fn default_initial_attempts() -> u32 {
    6
}

fn default_medium_interval() -> u64 {
    15
}

fn default_medium_until() -> u32 {
    18
}

fn default_long_interval() -> u64 {
    20
}

fn default_transport_base_delay() -> u64 {
    1_000
}

fn default_transport_max_delay() -> u64 {
    30_000
}

fn default_max_transport_retries() -> u32 {
    5
}

fn default_max_wait() -> u64 {
    600
}

fn default_progress_interval() -> u64 {
    30
}

fn default_not_ready_phrases() -> Vec<String> {
    [
        "statement not yet available",
        "statement is being generated",
        "statement generation in progress",
        "report generation in progress",
        "statement not ready",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_secs: default_initial_interval(),
            initial_attempts: default_initial_attempts(),
            medium_interval_secs: default_medium_interval(),
            medium_until_attempt: default_medium_until(),
            long_interval_secs: default_long_interval(),
            transport_base_delay_ms: default_transport_base_delay(),
            transport_max_delay_ms: default_transport_max_delay(),
            max_transport_retries: default_max_transport_retries(),
            max_wait_secs: default_max_wait(),
            progress_interval_secs: default_progress_interval(),
            not_ready_phrases: default_not_ready_phrases(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Interval between monitoring rounds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Reconnect attempts per target before reporting it unhealthy without retrying
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
    /// Account access slower than this is a quality warning
    #[serde(default = "default_slow_response_ms")]
    pub slow_response_ms: u64,
    /// Connections to monitor
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

fn default_check_interval() -> u64 {
    60
}

fn default_max_recovery_attempts() -> u32 {
    3
}

fn default_slow_response_ms() -> u64 {
    5_000
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            max_recovery_attempts: default_max_recovery_attempts(),
            slow_response_ms: default_slow_response_ms(),
            targets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    /// Adapter kind; only `paper` ships with this crate
    #[serde(default = "default_target_kind")]
    pub kind: String,
    /// Symbol used for the market data sub-check
    #[serde(default)]
    pub symbol: Option<String>,
}

fn default_target_kind() -> String {
    "paper".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rotating log file
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("flex.version", 3)?
            .set_default("health.check_interval_secs", 60)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FLEXMON_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (FLEXMON__FLEX__TOKEN, etc.)
            .add_source(
                Environment::with_prefix("FLEXMON")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.flex.base_url.trim().is_empty() {
            errors.push("flex.base_url must not be empty".to_string());
        }

        let polling = &self.polling;
        if polling.initial_attempts > polling.medium_until_attempt {
            errors.push(
                "polling.initial_attempts must not exceed polling.medium_until_attempt".to_string(),
            );
        }
        if polling.initial_interval_secs == 0
            || polling.medium_interval_secs == 0
            || polling.long_interval_secs == 0
        {
            errors.push("polling intervals must be positive".to_string());
        }
        if polling.transport_base_delay_ms > polling.transport_max_delay_ms {
            errors.push(
                "polling.transport_base_delay_ms must not exceed transport_max_delay_ms"
                    .to_string(),
            );
        }
        if polling.not_ready_phrases.iter().all(|p| p.trim().is_empty()) {
            errors.push("polling.not_ready_phrases must contain at least one phrase".to_string());
        }

        if self.health.check_interval_secs == 0 {
            errors.push("health.check_interval_secs must be positive".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for target in &self.health.targets {
            if !seen.insert(target.id.as_str()) {
                errors.push(format!("duplicate health target id: {}", target.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.flex.version, 3);
        assert_eq!(config.health.max_recovery_attempts, 3);
        assert_eq!(config.polling.max_wait_secs, 600);
    }

    #[test]
    fn test_blank_query_id_is_unconfigured() {
        let queries = QueryMappings {
            trades: Some("  ".to_string()),
            positions: Some("998877".to_string()),
            cash: None,
        };
        assert_eq!(queries.query_id(ReportKind::Trades), None);
        assert_eq!(queries.query_id(ReportKind::Positions), Some("998877"));
        assert_eq!(queries.query_id(ReportKind::Cash), None);
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::default();
        config.polling.initial_attempts = 50;
        config.health.check_interval_secs = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
