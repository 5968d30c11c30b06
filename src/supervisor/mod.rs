//! Connection supervision
//!
//! Probes broker connections, classifies their health, attempts bounded
//! auto-recovery and publishes classification changes.

pub mod monitor;
pub mod probe;

pub use monitor::{HealthCallback, HealthMonitor, MonitorConfig};
pub use probe::{classify, HealthProbe};
