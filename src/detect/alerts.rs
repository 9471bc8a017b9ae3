//! Alert engine: four independent threshold checks per test, plus trend notices.

use crate::analysis::{TestHealthMetrics, Trend};
use crate::config::HealthThresholds;
use crate::detect::{metric, Alert, Severity};

/// Stability below this is critical regardless of the configured threshold.
const CRITICAL_STABILITY: f64 = 0.5;
/// Failure rate at or above this is critical regardless of the configured threshold.
const CRITICAL_FAILURE_RATE: f64 = 0.5;

/// Check one test's metrics against the thresholds. Yields 0 to 4 alerts,
/// in the order retry rate, duration, stability, failure rate.
pub fn check_health(metrics: &TestHealthMetrics, thresholds: &HealthThresholds) -> Vec<Alert> {
    let mut alerts = Vec::new();
    let name = &metrics.test_name;

    let retry_rate = metrics.retry_rate;
    if retry_rate >= thresholds.flaky_threshold {
        let severity = if retry_rate >= 2.0 * thresholds.flaky_threshold {
            Severity::Critical
        } else {
            Severity::Warning
        };
        alerts.push(Alert {
            severity,
            test_name: name.clone(),
            message: format!(
                "Retry rate {} meets or exceeds {} threshold",
                percent(retry_rate),
                percent(thresholds.flaky_threshold)
            ),
            metric: metric::RETRY_RATE.to_string(),
            value: retry_rate,
            threshold: thresholds.flaky_threshold,
        });
    }

    let avg = metrics.average_duration_ms;
    if avg >= thresholds.slow_test_threshold_ms {
        let severity = if avg >= 2.0 * thresholds.slow_test_threshold_ms {
            Severity::Critical
        } else {
            Severity::Warning
        };
        alerts.push(Alert {
            severity,
            test_name: name.clone(),
            message: format!(
                "Average duration {} meets or exceeds {} threshold",
                millis(avg),
                millis(thresholds.slow_test_threshold_ms)
            ),
            metric: metric::AVERAGE_DURATION.to_string(),
            value: avg,
            threshold: thresholds.slow_test_threshold_ms,
        });
    }

    let stability = metrics.stability_score;
    if stability < thresholds.stability_threshold {
        let severity = if stability < CRITICAL_STABILITY {
            Severity::Critical
        } else {
            Severity::Warning
        };
        alerts.push(Alert {
            severity,
            test_name: name.clone(),
            message: format!(
                "Stability score {} is below {} threshold",
                percent(stability),
                percent(thresholds.stability_threshold)
            ),
            metric: metric::STABILITY_SCORE.to_string(),
            value: stability,
            threshold: thresholds.stability_threshold,
        });
    }

    let failure_rate = metrics.failure_rate();
    if failure_rate >= thresholds.failure_rate_threshold {
        let severity = if failure_rate >= CRITICAL_FAILURE_RATE {
            Severity::Critical
        } else {
            Severity::Warning
        };
        alerts.push(Alert {
            severity,
            test_name: name.clone(),
            message: format!(
                "Failure rate {} meets or exceeds {} threshold",
                percent(failure_rate),
                percent(thresholds.failure_rate_threshold)
            ),
            metric: metric::FAILURE_RATE.to_string(),
            value: failure_rate,
            threshold: thresholds.failure_rate_threshold,
        });
    }

    alerts
}

/// Informational notice when a test's durations are trending upward.
pub fn trend_alert(metrics: &TestHealthMetrics) -> Option<Alert> {
    if metrics.duration_trend != Trend::Degrading {
        return None;
    }
    Some(Alert {
        severity: Severity::Info,
        test_name: metrics.test_name.clone(),
        message: format!(
            "Duration trending upward (avg {}, max {})",
            millis(metrics.average_duration_ms),
            millis(metrics.max_duration_ms)
        ),
        metric: metric::DURATION_TREND.to_string(),
        value: metrics.average_duration_ms,
        threshold: 0.0,
    })
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

fn millis(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.1}s", ms / 1000.0)
    } else {
        format!("{:.0}ms", ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> TestHealthMetrics {
        TestHealthMetrics {
            test_name: "checkout".to_string(),
            total_runs: 10,
            passed_runs: 10,
            failed_runs: 0,
            flaky_runs: 0,
            skipped_runs: 0,
            total_retries: 0,
            average_duration_ms: 100.0,
            min_duration_ms: 100.0,
            max_duration_ms: 100.0,
            retry_rate: 0.0,
            stability_score: 1.0,
            duration_trend: Trend::Stable,
            last_failure: None,
            last_success: None,
        }
    }

    fn find<'a>(alerts: &'a [Alert], metric: &str) -> Option<&'a Alert> {
        alerts.iter().find(|a| a.metric == metric)
    }

    #[test]
    fn test_healthy_test_has_no_alerts() {
        assert!(check_health(&metrics(), &HealthThresholds::default()).is_empty());
    }

    #[test]
    fn test_retry_rate_tiers() {
        let t = HealthThresholds::default();
        let mut m = metrics();

        m.retry_rate = 0.19;
        assert!(find(&check_health(&m, &t), metric::RETRY_RATE).is_none());

        m.retry_rate = 0.2;
        let alerts = check_health(&m, &t);
        let alert = find(&alerts, metric::RETRY_RATE).unwrap();
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.threshold, 0.2);
        assert_eq!(alert.value, 0.2);

        m.retry_rate = 0.4;
        assert_eq!(
            find(&check_health(&m, &t), metric::RETRY_RATE).unwrap().severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_duration_tiers() {
        let t = HealthThresholds::default();
        let mut m = metrics();

        m.average_duration_ms = 30_000.0;
        let alerts = check_health(&m, &t);
        let alert = find(&alerts, metric::AVERAGE_DURATION).unwrap();
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.message, "Average duration 30.0s meets or exceeds 30.0s threshold");

        m.average_duration_ms = 60_000.0;
        assert_eq!(
            find(&check_health(&m, &t), metric::AVERAGE_DURATION).unwrap().severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_stability_tiers() {
        let t = HealthThresholds::default();
        let mut m = metrics();

        m.stability_score = 0.8;
        assert!(find(&check_health(&m, &t), metric::STABILITY_SCORE).is_none());

        m.stability_score = 0.6;
        assert_eq!(
            find(&check_health(&m, &t), metric::STABILITY_SCORE).unwrap().severity,
            Severity::Warning
        );

        m.stability_score = 0.49;
        assert_eq!(
            find(&check_health(&m, &t), metric::STABILITY_SCORE).unwrap().severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_failure_rate_tiers() {
        let t = HealthThresholds::default();
        let mut m = metrics();

        m.failed_runs = 1;
        let alerts = check_health(&m, &t);
        let alert = find(&alerts, metric::FAILURE_RATE).unwrap();
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.message, "Failure rate 10.0% meets or exceeds 10.0% threshold");

        m.failed_runs = 5;
        assert_eq!(
            find(&check_health(&m, &t), metric::FAILURE_RATE).unwrap().severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_all_four_checks_are_independent() {
        let mut m = metrics();
        m.retry_rate = 1.0;
        m.average_duration_ms = 90_000.0;
        m.stability_score = 0.1;
        m.failed_runs = 8;

        let alerts = check_health(&m, &HealthThresholds::default());
        let names: Vec<&str> = alerts.iter().map(|a| a.metric.as_str()).collect();
        assert_eq!(
            names,
            vec![
                metric::RETRY_RATE,
                metric::AVERAGE_DURATION,
                metric::STABILITY_SCORE,
                metric::FAILURE_RATE
            ]
        );
        assert!(alerts.iter().all(|a| a.severity == Severity::Critical));
        assert!(alerts.iter().all(|a| a.test_name == "checkout"));
    }

    #[test]
    fn test_custom_thresholds_shift_tiers() {
        let t = HealthThresholds::new(0.05, 1000.0, 0.95, 0.02).unwrap();
        let mut m = metrics();
        m.retry_rate = 0.08;
        m.average_duration_ms = 1500.0;

        let alerts = check_health(&m, &t);
        assert_eq!(find(&alerts, metric::RETRY_RATE).unwrap().severity, Severity::Warning);
        assert_eq!(
            find(&alerts, metric::AVERAGE_DURATION).unwrap().threshold,
            1000.0
        );
    }

    #[test]
    fn test_trend_alert_only_when_degrading() {
        let mut m = metrics();
        assert!(trend_alert(&m).is_none());

        m.duration_trend = Trend::Improving;
        assert!(trend_alert(&m).is_none());

        m.duration_trend = Trend::Degrading;
        let alert = trend_alert(&m).unwrap();
        assert_eq!(alert.severity, Severity::Info);
        assert_eq!(alert.metric, metric::DURATION_TREND);
    }

    #[test]
    fn test_excess_ratio_direction() {
        let mut m = metrics();
        m.stability_score = 0.4;
        m.retry_rate = 0.6;
        let alerts = check_health(&m, &HealthThresholds::default());

        let stability = find(&alerts, metric::STABILITY_SCORE).unwrap();
        assert!((stability.excess_ratio() - 2.0).abs() < 1e-9);
        let retry = find(&alerts, metric::RETRY_RATE).unwrap();
        assert!((retry.excess_ratio() - 3.0).abs() < 1e-9);
    }
}
