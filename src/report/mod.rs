//! Aggregate health reports: build from history, persist as JSON.

pub mod console;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{compute_metrics, TestHealthMetrics};
use crate::config::HealthThresholds;
use crate::detect::{check_health, trend_alert, Alert};
use crate::storage::{write_json_atomic, write_json_new, StorageError, TestHistory};

/// File name of the always-current report.
pub const LATEST_REPORT_FILE: &str = "health-report-latest.json";

/// Snapshot of suite health at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub report_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total_tests: u32,
    pub healthy_tests: u32,
    pub flaky_tests: u32,
    pub slow_tests: u32,
    pub failing_tests: u32,
    /// `healthy_tests / total_tests`; 0 when there are no tests.
    pub overall_health: f64,
    pub thresholds: HealthThresholds,
    pub metrics: Vec<TestHealthMetrics>,
    pub alerts: Vec<Alert>,
}

/// Build a report over every test in `history`. Tests without runs are skipped.
pub fn build_report(history: &TestHistory, thresholds: &HealthThresholds) -> HealthReport {
    let mut metrics = Vec::with_capacity(history.len());
    let mut alerts = Vec::new();
    let (mut healthy, mut flaky, mut slow, mut failing) = (0u32, 0u32, 0u32, 0u32);

    for (name, runs) in history {
        let Some(m) = compute_metrics(name, runs) else {
            continue;
        };

        alerts.extend(check_health(&m, thresholds));
        alerts.extend(trend_alert(&m));

        if m.stability_score >= thresholds.stability_threshold {
            healthy += 1;
        }
        if m.retry_rate >= thresholds.flaky_threshold {
            flaky += 1;
        }
        if m.average_duration_ms >= thresholds.slow_test_threshold_ms {
            slow += 1;
        }
        if m.failure_rate() >= thresholds.failure_rate_threshold {
            failing += 1;
        }
        metrics.push(m);
    }

    let total = u32::try_from(metrics.len()).unwrap_or(u32::MAX);
    let overall_health = if total > 0 {
        f64::from(healthy) / f64::from(total)
    } else {
        0.0
    };

    HealthReport {
        report_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        total_tests: total,
        healthy_tests: healthy,
        flaky_tests: flaky,
        slow_tests: slow,
        failing_tests: failing,
        overall_health,
        thresholds: *thresholds,
        metrics,
        alerts,
    }
}

/// Writes reports into a directory: one timestamped file per report plus `latest`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn latest_path(&self) -> PathBuf {
        self.dir.join(LATEST_REPORT_FILE)
    }

    /// Persist `report` atomically. Returns the timestamped file path.
    ///
    /// Stamped files are never overwritten: a name collision within the same
    /// microsecond falls back to a name carrying the report id.
    pub fn write(&self, report: &HealthReport) -> Result<PathBuf, StorageError> {
        let stamp = report.generated_at.format("%Y%m%dT%H%M%S%.6fZ");
        let mut stamped = self.dir.join(format!("health-report-{}.json", stamp));
        match write_json_new(&stamped, report) {
            Err(e) if e.is_already_exists() => {
                stamped = self.dir.join(format!(
                    "health-report-{}-{}.json",
                    stamp,
                    report.report_id.simple()
                ));
                write_json_new(&stamped, report)?;
            }
            other => other?,
        }
        write_json_atomic(&self.latest_path(), report)?;
        Ok(stamped)
    }

    /// Read back the most recent report, if one exists and parses.
    pub fn read_latest(&self) -> Option<HealthReport> {
        let content = std::fs::read_to_string(self.latest_path()).ok()?;
        serde_json::from_str(&content).ok()
    }
}
