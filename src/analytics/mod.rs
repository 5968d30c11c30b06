pub mod performance;

pub use performance::{compute_metrics, PerformanceMetrics};
