//! Point-in-time reliability and performance statistics for one test.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::trend::{classify_trend, Trend};
use crate::storage::{TestRunRecord, TestStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestHealthMetrics {
    pub test_name: String,
    pub total_runs: u32,
    pub passed_runs: u32,
    pub failed_runs: u32,
    pub flaky_runs: u32,
    pub skipped_runs: u32,
    pub total_retries: u64,
    pub average_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    /// Retries per run. Exceeds 1 when runs retry more than once on average.
    pub retry_rate: f64,
    /// `max(0, passRate - 0.5 * flakyRate)`, always within `[0, 1]`.
    pub stability_score: f64,
    pub duration_trend: Trend,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
}

impl TestHealthMetrics {
    /// Failed runs over total runs.
    pub fn failure_rate(&self) -> f64 {
        f64::from(self.failed_runs) / f64::from(self.total_runs)
    }

    /// Passed runs over total runs. Flaky runs do not count as passes.
    pub fn pass_rate(&self) -> f64 {
        f64::from(self.passed_runs) / f64::from(self.total_runs)
    }

    pub fn flaky_rate(&self) -> f64 {
        f64::from(self.flaky_runs) / f64::from(self.total_runs)
    }
}

/// Compute metrics over a test's chronological run records.
///
/// Returns `None` for an empty history: no data is not the same as healthy.
pub fn compute_metrics(test_name: &str, runs: &[TestRunRecord]) -> Option<TestHealthMetrics> {
    let first = runs.first()?;

    let mut passed_runs = 0u32;
    let mut failed_runs = 0u32;
    let mut flaky_runs = 0u32;
    let mut skipped_runs = 0u32;
    let mut total_retries = 0u64;
    let mut total_duration = 0.0;
    let mut min_duration_ms = first.duration_ms;
    let mut max_duration_ms = first.duration_ms;
    let mut last_failure: Option<DateTime<Utc>> = None;
    let mut last_success: Option<DateTime<Utc>> = None;

    for run in runs {
        match run.status {
            TestStatus::Passed => {
                passed_runs += 1;
                last_success = Some(latest(last_success, run.timestamp));
            }
            TestStatus::Failed => {
                failed_runs += 1;
                last_failure = Some(latest(last_failure, run.timestamp));
            }
            TestStatus::Flaky => flaky_runs += 1,
            TestStatus::Skipped => skipped_runs += 1,
        }
        total_retries += u64::from(run.retries);
        total_duration += run.duration_ms;
        min_duration_ms = min_duration_ms.min(run.duration_ms);
        max_duration_ms = max_duration_ms.max(run.duration_ms);
    }

    // Non-zero: `runs` has at least one element.
    let total = runs.len() as f64;
    let durations: Vec<f64> = runs.iter().map(|r| r.duration_ms).collect();

    let mut metrics = TestHealthMetrics {
        test_name: test_name.to_string(),
        total_runs: u32::try_from(runs.len()).unwrap_or(u32::MAX),
        passed_runs,
        failed_runs,
        flaky_runs,
        skipped_runs,
        total_retries,
        average_duration_ms: total_duration / total,
        min_duration_ms,
        max_duration_ms,
        retry_rate: total_retries as f64 / total,
        stability_score: 0.0,
        duration_trend: classify_trend(&durations),
        last_failure,
        last_success,
    };
    metrics.stability_score = (metrics.pass_rate() - 0.5 * metrics.flaky_rate()).max(0.0);
    Some(metrics)
}

fn latest(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> DateTime<Utc> {
    match current {
        Some(ts) if ts > candidate => ts,
        _ => candidate,
    }
}
