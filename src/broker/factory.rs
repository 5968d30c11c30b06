use std::sync::Arc;

use crate::adapters::PaperBroker;
use crate::config::TargetConfig;
use crate::error::{FlexmonError, Result};

use super::{BrokerKind, MonitoredConnection};

const DEFAULT_PROBE_SYMBOL: &str = "AAPL";

/// Create the connection for one configured health target
pub fn build_connection(target: &TargetConfig) -> Result<Arc<dyn MonitoredConnection>> {
    let kind: BrokerKind = target
        .kind
        .parse()
        .map_err(|e: String| FlexmonError::Configuration(format!("target {}: {}", target.id, e)))?;

    let symbol = target
        .symbol
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_PROBE_SYMBOL);

    match kind {
        BrokerKind::Paper => Ok(Arc::new(PaperBroker::new(&target.id, symbol))),
    }
}
