use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::domain::ConnectionState;
use crate::error::Result;

/// Account snapshot returned by the account sub-check
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub net_liquidation: f64,
}

/// Top-of-book quote returned by the market data sub-check
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
}

impl Quote {
    /// Non-positive prices mean the feed is stale or unsubscribed
    pub fn is_poor(&self) -> bool {
        self.bid <= 0.0 || self.ask <= 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub quantity: f64,
}

/// A live broker connection the health monitor can probe
#[async_trait]
pub trait MonitoredConnection: Send + Sync {
    /// Which adapter backs this connection
    fn kind(&self) -> BrokerKind;

    /// Symbol used for the market data sub-check
    fn probe_symbol(&self) -> &str;

    async fn connection_state(&self) -> Result<ConnectionState>;

    async fn account_summary(&self) -> Result<AccountSnapshot>;

    async fn quote(&self, symbol: &str) -> Result<Quote>;

    async fn positions(&self) -> Result<Vec<PositionSnapshot>>;

    /// Re-establish a dropped session
    async fn reconnect(&self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerKind {
    Paper,
}

impl BrokerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrokerKind::Paper => "paper",
        }
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" | "sim" => Ok(BrokerKind::Paper),
            other => Err(format!("unsupported target kind '{}', must be: paper", other)),
        }
    }
}
