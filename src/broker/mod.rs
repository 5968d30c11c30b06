pub mod factory;
mod traits;

pub use factory::build_connection;
pub use traits::{AccountSnapshot, BrokerKind, MonitoredConnection, PositionSnapshot, Quote};
