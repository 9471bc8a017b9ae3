//! Read-only views over recorded history: flaky, slow and failing tests.
//!
//! Each view recomputes metrics for every known test, keeps the ones past the
//! relevant threshold and sorts worst first.

use std::cmp::Ordering;

use crate::analysis::{compute_metrics, TestHealthMetrics};
use crate::config::HealthThresholds;
use crate::storage::TestHistory;

/// Tests whose retry rate meets the flaky threshold, highest retry rate first.
pub fn flaky_tests(history: &TestHistory, thresholds: &HealthThresholds) -> Vec<TestHealthMetrics> {
    select(
        history,
        |m| m.retry_rate >= thresholds.flaky_threshold,
        |m| m.retry_rate,
    )
}

/// Tests whose average duration meets the slow threshold, slowest first.
pub fn slow_tests(history: &TestHistory, thresholds: &HealthThresholds) -> Vec<TestHealthMetrics> {
    select(
        history,
        |m| m.average_duration_ms >= thresholds.slow_test_threshold_ms,
        |m| m.average_duration_ms,
    )
}

/// Tests whose failure rate meets the failure threshold, highest rate first.
pub fn failing_tests(
    history: &TestHistory,
    thresholds: &HealthThresholds,
) -> Vec<TestHealthMetrics> {
    select(
        history,
        |m| m.failure_rate() >= thresholds.failure_rate_threshold,
        |m| m.failure_rate(),
    )
}

fn select(
    history: &TestHistory,
    keep: impl Fn(&TestHealthMetrics) -> bool,
    key: impl Fn(&TestHealthMetrics) -> f64,
) -> Vec<TestHealthMetrics> {
    let mut selected: Vec<TestHealthMetrics> = history
        .iter()
        .filter_map(|(name, runs)| compute_metrics(name, runs))
        .filter(|m| keep(m))
        .collect();
    // Stable sort: equal keys stay in test-name order.
    selected.sort_by(|a, b| key(b).partial_cmp(&key(a)).unwrap_or(Ordering::Equal));
    selected
}
