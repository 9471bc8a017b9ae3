//! Threshold-based health alerts.

pub mod alerts;

pub use alerts::{check_health, trend_alert};

/// Severity levels for health alerts, least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Metric names carried on alerts.
pub mod metric {
    pub const RETRY_RATE: &str = "retryRate";
    pub const AVERAGE_DURATION: &str = "averageDurationMs";
    pub const STABILITY_SCORE: &str = "stabilityScore";
    pub const FAILURE_RATE: &str = "failureRate";
    pub const DURATION_TREND: &str = "durationTrend";
}

/// A threshold crossing for one metric of one test.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub severity: Severity,
    pub test_name: String,
    pub message: String,
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
}

impl Alert {
    /// How far past its threshold the value sits, as a ratio (>= 1 when crossed).
    /// Stability alerts fire when the value is *below* threshold, so the ratio inverts.
    pub fn excess_ratio(&self) -> f64 {
        let (num, den) = if self.metric == metric::STABILITY_SCORE {
            (self.threshold, self.value)
        } else {
            (self.value, self.threshold)
        };
        if den > 0.0 {
            num / den
        } else {
            f64::INFINITY
        }
    }
}
