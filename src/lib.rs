//! flakewatch -- test-reliability monitoring.
//!
//! Records the outcome of every test execution into a bounded per-test
//! history, derives reliability and performance metrics from it, classifies
//! degraded tests into severity-tiered alerts and produces aggregate health
//! reports for humans and CI pipelines.
//!
//! ```no_run
//! use flakewatch::{HealthMonitor, MonitorConfig, TestStatus};
//!
//! let monitor = HealthMonitor::new(&MonitorConfig::default())?;
//! monitor.record("login flow", TestStatus::Passed, 1250.0, 0, chrono::Utc::now(), None);
//! let report = monitor.generate_health_report();
//! println!("overall health: {:.0}%", report.overall_health * 100.0);
//! # Ok::<(), flakewatch::config::ConfigError>(())
//! ```

pub mod analysis;
pub mod config;
pub mod detect;
pub mod monitor;
pub mod query;
pub mod report;
pub mod storage;

pub use analysis::{TestHealthMetrics, Trend};
pub use config::{HealthThresholds, MonitorConfig};
pub use detect::{Alert, Severity};
pub use monitor::HealthMonitor;
pub use report::HealthReport;
pub use storage::{TestRunRecord, TestStatus};
