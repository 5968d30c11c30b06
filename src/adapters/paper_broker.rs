//! In-process broker connection.
//!
//! Serves deterministic account, quote and position data and lets callers
//! drop the session, inject errors and control whether reconnects succeed.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::broker::{AccountSnapshot, BrokerKind, MonitoredConnection, PositionSnapshot, Quote};
use crate::domain::ConnectionState;
use crate::error::{FlexmonError, Result};

#[derive(Debug)]
struct PaperState {
    state: ConnectionState,
    reconnect_succeeds: bool,
    reconnects: u32,
    bid: f64,
    ask: f64,
    positions: Vec<PositionSnapshot>,
    positions_error: Option<String>,
}

pub struct PaperBroker {
    id: String,
    symbol: String,
    inner: RwLock<PaperState>,
}

impl PaperBroker {
    pub fn new(id: &str, symbol: &str) -> Self {
        Self {
            id: id.to_string(),
            symbol: symbol.to_string(),
            inner: RwLock::new(PaperState {
                state: ConnectionState::Connected,
                reconnect_succeeds: true,
                reconnects: 0,
                bid: 100.00,
                ask: 100.05,
                positions: Vec::new(),
                positions_error: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn set_state(&self, state: ConnectionState) {
        debug!("Paper broker {} state -> {:?}", self.id, state);
        self.inner.write().await.state = state;
    }

    pub async fn set_reconnect_succeeds(&self, succeeds: bool) {
        self.inner.write().await.reconnect_succeeds = succeeds;
    }

    pub async fn set_quote(&self, bid: f64, ask: f64) {
        let mut inner = self.inner.write().await;
        inner.bid = bid;
        inner.ask = ask;
    }

    pub async fn set_positions(&self, positions: Vec<PositionSnapshot>) {
        self.inner.write().await.positions = positions;
    }

    /// Make the positions sub-check fail with `error`, or succeed again with `None`
    pub async fn fail_positions(&self, error: Option<&str>) {
        self.inner.write().await.positions_error = error.map(str::to_string);
    }

    /// Reconnect calls seen so far
    pub async fn reconnects(&self) -> u32 {
        self.inner.read().await.reconnects
    }

    async fn ensure_connected(&self) -> Result<()> {
        match &self.inner.read().await.state {
            ConnectionState::Connected => Ok(()),
            _ => Err(FlexmonError::Internal(format!(
                "paper broker {} is not connected",
                self.id
            ))),
        }
    }
}

#[async_trait]
impl MonitoredConnection for PaperBroker {
    fn kind(&self) -> BrokerKind {
        BrokerKind::Paper
    }

    fn probe_symbol(&self) -> &str {
        &self.symbol
    }

    async fn connection_state(&self) -> Result<ConnectionState> {
        Ok(self.inner.read().await.state.clone())
    }

    async fn account_summary(&self) -> Result<AccountSnapshot> {
        self.ensure_connected().await?;
        Ok(AccountSnapshot {
            account_id: format!("PAPER-{}", self.id),
            net_liquidation: 100_000.0,
        })
    }

    async fn quote(&self, symbol: &str) -> Result<Quote> {
        self.ensure_connected().await?;
        let inner = self.inner.read().await;
        Ok(Quote {
            symbol: symbol.to_string(),
            bid: inner.bid,
            ask: inner.ask,
        })
    }

    async fn positions(&self) -> Result<Vec<PositionSnapshot>> {
        self.ensure_connected().await?;
        let inner = self.inner.read().await;
        match &inner.positions_error {
            Some(err) => Err(FlexmonError::Internal(err.clone())),
            None => Ok(inner.positions.clone()),
        }
    }

    async fn reconnect(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.reconnects += 1;

        if inner.reconnect_succeeds {
            inner.state = ConnectionState::Connected;
            info!("Paper broker {} reconnected", self.id);
            Ok(())
        } else {
            Err(FlexmonError::Internal(format!(
                "paper broker {} refused reconnect",
                self.id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnected_broker_rejects_calls() {
        let broker = PaperBroker::new("primary", "AAPL");
        assert!(broker.account_summary().await.is_ok());

        broker.set_state(ConnectionState::Disconnected).await;
        assert!(broker.account_summary().await.is_err());
        assert!(broker.quote("AAPL").await.is_err());
    }

    #[tokio::test]
    async fn test_reconnect_restores_session() {
        let broker = PaperBroker::new("primary", "AAPL");
        broker.set_state(ConnectionState::Disconnected).await;

        broker.set_reconnect_succeeds(false).await;
        assert!(broker.reconnect().await.is_err());
        assert_eq!(
            broker.connection_state().await.unwrap(),
            ConnectionState::Disconnected
        );

        broker.set_reconnect_succeeds(true).await;
        broker.reconnect().await.unwrap();
        assert_eq!(broker.connection_state().await.unwrap(), ConnectionState::Connected);
        assert_eq!(broker.reconnects().await, 2);
    }
}
