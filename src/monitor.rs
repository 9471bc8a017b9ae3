//! The monitor instance callers construct and pass around explicitly.
//!
//! A `HealthMonitor` owns validated thresholds, a history store and a report
//! writer. Nothing is global: tests and tools build as many independent
//! monitors as they need, each pointed at its own files.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::analysis::{compute_metrics, TestHealthMetrics};
use crate::config::{ConfigError, HealthThresholds, MonitorConfig};
use crate::query;
use crate::report::{build_report, HealthReport, ReportWriter};
use crate::storage::{HistoryStore, StorageError, TestHistory, TestRunRecord, TestStatus};

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    thresholds: HealthThresholds,
    store: HistoryStore,
    reports: ReportWriter,
}

impl HealthMonitor {
    /// Validate `config` and build a monitor. Invalid thresholds are fatal.
    pub fn new(config: &MonitorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            thresholds: config.thresholds,
            store: HistoryStore::new(&config.storage),
            reports: ReportWriter::new(config.storage.report_dir.clone()),
        })
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.thresholds
    }

    pub fn report_writer(&self) -> &ReportWriter {
        &self.reports
    }

    /// Ingest one completed test execution.
    ///
    /// Storage failures are logged, never returned: monitoring must not fail
    /// the test run it observes. Returns whether the record was persisted.
    pub fn record(
        &self,
        test_name: &str,
        status: TestStatus,
        duration_ms: f64,
        retries: u32,
        timestamp: DateTime<Utc>,
        error: Option<String>,
    ) -> bool {
        let mut record = TestRunRecord::new(test_name, status, duration_ms, retries, timestamp);
        record.error = error;
        self.record_run(record)
    }

    /// Like [`record`](Self::record), taking a prepared record.
    pub fn record_run(&self, record: TestRunRecord) -> bool {
        let test_name = record.test_name.clone();
        match self.store.record(record) {
            Ok(()) => true,
            Err(e) => {
                warn!(%test_name, error = %e, "failed to record test run");
                false
            }
        }
    }

    /// Full history, as stored.
    pub fn history(&self) -> TestHistory {
        self.store.load()
    }

    pub fn history_for(&self, test_name: &str) -> Vec<TestRunRecord> {
        self.store.history_for(test_name)
    }

    /// Metrics for one test, or `None` if it has never been recorded.
    pub fn metrics_for(&self, test_name: &str) -> Option<TestHealthMetrics> {
        compute_metrics(test_name, &self.history_for(test_name))
    }

    /// Build the aggregate report and persist it.
    ///
    /// Persistence failures are logged; the in-memory report is returned either way.
    pub fn generate_health_report(&self) -> HealthReport {
        let history = self.store.load();
        let report = build_report(&history, &self.thresholds);
        info!(
            tests = report.total_tests,
            alerts = report.alerts.len(),
            overall_health = report.overall_health,
            "generated health report"
        );

        match self.reports.write(&report) {
            Ok(path) => info!(path = %path.display(), "health report saved"),
            Err(e) => warn!(error = %e, "failed to save health report"),
        }
        report
    }

    pub fn flaky_tests(&self) -> Vec<TestHealthMetrics> {
        query::flaky_tests(&self.store.load(), &self.thresholds)
    }

    pub fn slow_tests(&self) -> Vec<TestHealthMetrics> {
        query::slow_tests(&self.store.load(), &self.thresholds)
    }

    pub fn failing_tests(&self) -> Vec<TestHealthMetrics> {
        query::failing_tests(&self.store.load(), &self.thresholds)
    }

    /// Erase all recorded history. Maintenance only.
    pub fn clear_history(&self) -> Result<(), StorageError> {
        self.store.clear()?;
        info!(path = %self.store.path().display(), "test history cleared");
        Ok(())
    }
}
