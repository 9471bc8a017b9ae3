//! Human-readable report and query summaries.

use std::cmp::Ordering;
use std::fmt::Write as _;

use super::HealthReport;
use crate::analysis::TestHealthMetrics;
use crate::detect::{Alert, Severity};

/// Alerts shown per severity tier in the console summary.
pub const TOP_ALERTS: usize = 5;

/// Format a report as a console summary: overall health, category counts and
/// the worst critical and warning alerts.
pub fn format_summary(report: &HealthReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n=== Test Health Report ===");
    let _ = writeln!(
        out,
        "Generated:      {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "Overall health: {:.1}%", report.overall_health * 100.0);
    let _ = writeln!(
        out,
        "Tests:          {} total | {} healthy | {} flaky | {} slow | {} failing",
        report.total_tests,
        report.healthy_tests,
        report.flaky_tests,
        report.slow_tests,
        report.failing_tests
    );

    push_tier(&mut out, "Critical alerts", &report.alerts, Severity::Critical);
    push_tier(&mut out, "Warnings", &report.alerts, Severity::Warning);

    let info = report
        .alerts
        .iter()
        .filter(|a| a.severity == Severity::Info)
        .count();
    if info > 0 {
        let _ = writeln!(out, "\n{} informational notice(s) in the JSON report.", info);
    }
    if report.alerts.is_empty() && report.total_tests > 0 {
        let _ = writeln!(out, "\nNo alerts. All tests within thresholds.");
    }
    if report.total_tests == 0 {
        let _ = writeln!(out, "\nNo test history recorded yet.");
    }
    out
}

fn push_tier(out: &mut String, title: &str, alerts: &[Alert], severity: Severity) {
    let mut tier: Vec<&Alert> = alerts.iter().filter(|a| a.severity == severity).collect();
    if tier.is_empty() {
        return;
    }
    tier.sort_by(|a, b| {
        b.excess_ratio()
            .partial_cmp(&a.excess_ratio())
            .unwrap_or(Ordering::Equal)
    });

    let _ = writeln!(out, "\n{} ({}):", title, tier.len());
    for alert in tier.iter().take(TOP_ALERTS) {
        let _ = writeln!(out, " - [{}] {}", alert.test_name, alert.message);
    }
    if tier.len() > TOP_ALERTS {
        let _ = writeln!(out, "   ... and {} more", tier.len() - TOP_ALERTS);
    }
}

/// Tabular listing of per-test metrics for the query commands.
pub fn format_metrics_table(title: &str, metrics: &[TestHealthMetrics]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", title);
    if metrics.is_empty() {
        let _ = writeln!(out, "None.");
        return out;
    }
    let _ = writeln!(
        out,
        "{:<40} | {:>5} | {:>8} | {:>8} | {:>9} | {:>10} | Trend",
        "Test", "Runs", "Retry", "Fail", "Stability", "Avg (ms)"
    );
    let _ = writeln!(
        out,
        "{:-<40}-|-{:->5}-|-{:->8}-|-{:->8}-|-{:->9}-|-{:->10}-|-{:-<9}",
        "", "", "", "", "", "", ""
    );
    for m in metrics {
        let _ = writeln!(
            out,
            "{:<40} | {:>5} | {:>7.1}% | {:>7.1}% | {:>8.1}% | {:>10.0} | {}",
            truncate(&m.test_name, 40),
            m.total_runs,
            m.retry_rate * 100.0,
            m.failure_rate() * 100.0,
            m.stability_score * 100.0,
            m.average_duration_ms,
            m.duration_trend
        );
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
