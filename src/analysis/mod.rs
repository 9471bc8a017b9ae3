//! Reliability statistics and trend inference over recorded test history.

pub mod metrics;
pub mod trend;

pub use metrics::{compute_metrics, TestHealthMetrics};
pub use trend::{classify_trend, Trend};
