use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use flakewatch::config::{MonitorConfig, ResolvedConfig};
use flakewatch::report::console;
use flakewatch::{HealthMonitor, TestHealthMetrics, TestRunRecord, TestStatus};

#[derive(Parser)]
#[command(
    name = "flakewatch",
    about = "Test-reliability monitoring: flaky, slow and failing test detection",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (overrides FLAKEWATCH_CONFIG and ./flakewatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a health report, print a summary and write the JSON files
    Report {
        /// Print the full JSON report instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// Record one completed test execution
    Record {
        /// Test name
        #[arg(long)]
        test: String,

        /// Outcome: passed, failed, skipped or flaky
        #[arg(long)]
        status: TestStatus,

        /// Duration in milliseconds
        #[arg(long)]
        duration_ms: f64,

        /// Retries needed before the final outcome
        #[arg(long, default_value = "0")]
        retries: u32,

        /// Error message for failed runs
        #[arg(long)]
        error: Option<String>,

        /// RFC 3339 completion time (defaults to now)
        #[arg(long)]
        timestamp: Option<DateTime<Utc>>,
    },

    /// List flaky tests, highest retry rate first
    Flaky {
        #[arg(long)]
        json: bool,
    },

    /// List slow tests, slowest first
    Slow {
        #[arg(long)]
        json: bool,
    },

    /// List failing tests, highest failure rate first
    Failing {
        #[arg(long)]
        json: bool,
    },

    /// Show metrics for a single test
    Metrics {
        /// Test name
        #[arg(long)]
        test: String,

        #[arg(long)]
        json: bool,
    },

    /// Erase all recorded history
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let resolved = match &cli.config {
        Some(path) => {
            let config = MonitorConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            ResolvedConfig {
                config,
                loaded_from: Some(path.clone()),
                skipped: Vec::new(),
            }
        }
        None => MonitorConfig::resolve(),
    };

    // Logging settings live in the config, so lookup diagnostics are
    // replayed once the subscriber exists.
    init_tracing(&resolved.config, cli.json_logs);
    resolved.log();
    let config = resolved.config;

    let monitor = HealthMonitor::new(&config).context("invalid flakewatch configuration")?;

    match cli.command {
        Commands::Report { json } => {
            tracing::info!("Generating health report");
            let report = run_blocking(&monitor, |m| m.generate_health_report()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", console::format_summary(&report));
                println!("Report written to {}", monitor.report_writer().latest_path().display());
            }
        }
        Commands::Record {
            test,
            status,
            duration_ms,
            retries,
            error,
            timestamp,
        } => {
            let mut record = TestRunRecord::new(
                test,
                status,
                duration_ms,
                retries,
                timestamp.unwrap_or_else(Utc::now),
            );
            record.error = error;
            tracing::debug!(test = %record.test_name, %status, "Recording test run");
            // Failure is logged inside the monitor; recording never fails the caller.
            run_blocking(&monitor, move |m| m.record_run(record)).await?;
        }
        Commands::Flaky { json } => {
            let tests = run_blocking(&monitor, |m| m.flaky_tests()).await?;
            print_metrics("Flaky tests", &tests, json)?;
        }
        Commands::Slow { json } => {
            let tests = run_blocking(&monitor, |m| m.slow_tests()).await?;
            print_metrics("Slow tests", &tests, json)?;
        }
        Commands::Failing { json } => {
            let tests = run_blocking(&monitor, |m| m.failing_tests()).await?;
            print_metrics("Failing tests", &tests, json)?;
        }
        Commands::Metrics { test, json } => {
            let name = test.clone();
            let metrics = run_blocking(&monitor, move |m| m.metrics_for(&name)).await?;
            match (metrics, json) {
                (Some(m), true) => println!("{}", serde_json::to_string_pretty(&m)?),
                (Some(m), false) => print!("{}", console::format_metrics_table(&test, &[m])),
                (None, true) => println!("null"),
                (None, false) => println!("No data recorded for '{}'.", test),
            }
        }
        Commands::Clear => {
            run_blocking(&monitor, |m| m.clear_history()).await??;
            println!("Test history cleared.");
        }
    }

    Ok(())
}

fn init_tracing(config: &MonitorConfig, json_flag: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json_flag || config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Run blocking store work off the async runtime.
async fn run_blocking<T, F>(monitor: &HealthMonitor, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&HealthMonitor) -> T + Send + 'static,
{
    let monitor = monitor.clone();
    Ok(tokio::task::spawn_blocking(move || f(&monitor)).await?)
}

fn print_metrics(title: &str, metrics: &[TestHealthMetrics], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(metrics)?);
    } else {
        print!("{}", console::format_metrics_table(title, metrics));
    }
    Ok(())
}
