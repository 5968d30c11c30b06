//! Timed sub-checks against a connected target and their classification.

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::broker::MonitoredConnection;
use crate::domain::{ConnectionHealth, SubCheck};

pub const ACCOUNT_ACCESS: &str = "account_access";
pub const MARKET_DATA: &str = "market_data";
pub const POSITIONS_ACCESS: &str = "positions_access";

/// Fraction of passing sub-checks needed for Degraded rather than Unhealthy
pub const DEGRADED_SUCCESS_RATIO: f64 = 0.7;

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Runs the account, market data and positions sub-checks
#[derive(Debug, Clone)]
pub struct HealthProbe {
    slow_response: Duration,
}

impl HealthProbe {
    pub fn new(slow_response: Duration) -> Self {
        Self { slow_response }
    }

    /// Run every sub-check; failures are recorded, never propagated
    pub async fn run(&self, connection: &dyn MonitoredConnection) -> BTreeMap<String, SubCheck> {
        let account = self.account_access(connection).await;
        let market = self.market_data(connection).await;
        let positions = self.positions_access(connection).await;

        BTreeMap::from([
            (ACCOUNT_ACCESS.to_string(), account),
            (MARKET_DATA.to_string(), market),
            (POSITIONS_ACCESS.to_string(), positions),
        ])
    }

    async fn account_access(&self, connection: &dyn MonitoredConnection) -> SubCheck {
        let started = Instant::now();
        match connection.account_summary().await {
            Ok(account) => {
                let latency = elapsed_ms(started);
                let slow = started.elapsed() > self.slow_response;
                let check = SubCheck::passed(latency)
                    .with_note("account_id", &account.account_id)
                    .with_warning(slow);
                if slow {
                    check.with_note("warning", "slow response")
                } else {
                    check
                }
            }
            Err(e) => SubCheck::failed(e.to_string()),
        }
    }

    async fn market_data(&self, connection: &dyn MonitoredConnection) -> SubCheck {
        let symbol = connection.probe_symbol().to_string();
        let started = Instant::now();
        match connection.quote(&symbol).await {
            Ok(quote) => {
                let poor = quote.is_poor();
                SubCheck::passed(elapsed_ms(started))
                    .with_note("symbol", &symbol)
                    .with_note("bid", quote.bid)
                    .with_note("ask", quote.ask)
                    .with_note("data_quality", if poor { "poor" } else { "good" })
                    .with_warning(poor)
            }
            Err(e) => SubCheck::failed(e.to_string()).with_note("symbol", &symbol),
        }
    }

    async fn positions_access(&self, connection: &dyn MonitoredConnection) -> SubCheck {
        let started = Instant::now();
        match connection.positions().await {
            Ok(positions) => {
                SubCheck::passed(elapsed_ms(started)).with_note("position_count", positions.len())
            }
            Err(e) => SubCheck::failed(e.to_string()),
        }
    }
}

/// Classify a connected target from its sub-check outcomes.
///
/// Everything passing without warnings is Healthy. Otherwise the target is
/// Degraded while at least 70% of sub-checks pass, rounded to the nearest
/// whole check (two of three qualifies), and Unhealthy below that.
pub fn classify(details: &BTreeMap<String, SubCheck>) -> ConnectionHealth {
    if details.is_empty() {
        return ConnectionHealth::Unknown;
    }

    let total = details.len();
    let passed = details.values().filter(|c| c.success).count();
    let warned = details.values().any(|c| c.success && c.quality_warning);

    if passed == total && !warned {
        return ConnectionHealth::Healthy;
    }

    let required = (total as f64 * DEGRADED_SUCCESS_RATIO).round() as usize;
    if passed >= required.max(1) {
        ConnectionHealth::Degraded
    } else {
        ConnectionHealth::Unhealthy
    }
}
