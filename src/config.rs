//! TOML configuration for flakewatch.
//!
//! Thresholds, storage locations and logging are read from a layered source:
//! the `FLAKEWATCH_CONFIG` environment variable, then `./flakewatch.toml`,
//! then compiled-in defaults. Values are validated once, when a
//! [`HealthMonitor`](crate::monitor::HealthMonitor) is constructed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "FLAKEWATCH_CONFIG";

/// Config file picked up from the working directory when no override is set.
pub const LOCAL_CONFIG_FILE: &str = "flakewatch.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid threshold `{name}` = {value}: {reason}")]
    InvalidThreshold {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
    #[error("invalid storage setting `{name}`: {reason}")]
    InvalidStorage {
        name: &'static str,
        reason: &'static str,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for a monitor instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub thresholds: HealthThresholds,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MonitorConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Try to load configuration from, in order:
    /// 1. The path specified by the `FLAKEWATCH_CONFIG` environment variable.
    /// 2. `flakewatch.toml` in the current directory.
    /// 3. Fall back to compiled-in defaults.
    ///
    /// Skipped files are logged immediately. Callers that install their
    /// subscriber later should use [`MonitorConfig::resolve`] instead.
    pub fn load_or_default() -> Self {
        let resolved = Self::resolve();
        resolved.log();
        resolved.config
    }

    /// Layered lookup without logging; the outcome records what was skipped.
    pub fn resolve() -> ResolvedConfig {
        Self::resolve_from(
            std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
            Path::new(LOCAL_CONFIG_FILE),
        )
    }

    /// Layered lookup over explicit candidates: `env_path` first, then
    /// `local_path` if it exists, then defaults.
    pub fn resolve_from(env_path: Option<PathBuf>, local_path: &Path) -> ResolvedConfig {
        let mut skipped = Vec::new();

        if let Some(path) = env_path {
            match Self::load(&path) {
                Ok(config) => return ResolvedConfig::loaded(config, path, skipped),
                Err(error) => skipped.push(SkippedConfig {
                    origin: CONFIG_ENV_VAR,
                    error,
                }),
            }
        }

        if local_path.exists() {
            match Self::load(local_path) {
                Ok(config) => {
                    return ResolvedConfig::loaded(config, local_path.to_path_buf(), skipped)
                }
                Err(error) => skipped.push(SkippedConfig {
                    origin: LOCAL_CONFIG_FILE,
                    error,
                }),
            }
        }

        ResolvedConfig {
            config: Self::default(),
            loaded_from: None,
            skipped,
        }
    }

    /// Check every section. Called once at monitor construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.storage.validate()
    }
}

/// A config file that was found but could not be used.
#[derive(Debug)]
pub struct SkippedConfig {
    /// `FLAKEWATCH_CONFIG` or `flakewatch.toml`.
    pub origin: &'static str,
    pub error: ConfigError,
}

/// Outcome of the layered config lookup.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub config: MonitorConfig,
    /// File the config came from; `None` means compiled-in defaults.
    pub loaded_from: Option<PathBuf>,
    pub skipped: Vec<SkippedConfig>,
}

impl ResolvedConfig {
    fn loaded(config: MonitorConfig, path: PathBuf, skipped: Vec<SkippedConfig>) -> Self {
        Self {
            config,
            loaded_from: Some(path),
            skipped,
        }
    }

    /// Report fallbacks and the chosen source through `tracing`.
    pub fn log(&self) {
        for skip in &self.skipped {
            warn!(
                origin = skip.origin,
                error = %skip.error,
                "{} could not be loaded, falling back",
                skip.origin
            );
        }
        match &self.loaded_from {
            Some(path) => info!(path = %path.display(), "loaded flakewatch configuration"),
            None => debug!("no config file found, using compiled-in defaults"),
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Alerting thresholds. Immutable for the lifetime of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthThresholds {
    /// Retry rate (retries per run) at which a test counts as flaky.
    #[serde(alias = "flaky_threshold")]
    pub flaky_threshold: f64,
    /// Average duration in milliseconds at which a test counts as slow.
    #[serde(alias = "slow_test_threshold_ms")]
    pub slow_test_threshold_ms: f64,
    /// Stability score below which a test is unhealthy.
    #[serde(alias = "stability_threshold")]
    pub stability_threshold: f64,
    /// Failed-run ratio at which a test counts as failing.
    #[serde(alias = "failure_rate_threshold")]
    pub failure_rate_threshold: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            flaky_threshold: 0.2,
            slow_test_threshold_ms: 30_000.0,
            stability_threshold: 0.8,
            failure_rate_threshold: 0.1,
        }
    }
}

impl HealthThresholds {
    /// Build a validated threshold set.
    pub fn new(
        flaky_threshold: f64,
        slow_test_threshold_ms: f64,
        stability_threshold: f64,
        failure_rate_threshold: f64,
    ) -> Result<Self, ConfigError> {
        let thresholds = Self {
            flaky_threshold,
            slow_test_threshold_ms,
            stability_threshold,
            failure_rate_threshold,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("flaky_threshold", self.flaky_threshold)?;
        non_negative("slow_test_threshold_ms", self.slow_test_threshold_ms)?;
        ratio("stability_threshold", self.stability_threshold)?;
        ratio("failure_rate_threshold", self.failure_rate_threshold)?;
        Ok(())
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::InvalidThreshold {
            name,
            value,
            reason: "must be a finite number",
        });
    }
    if value < 0.0 {
        return Err(ConfigError::InvalidThreshold {
            name,
            value,
            reason: "must not be negative",
        });
    }
    Ok(())
}

fn ratio(name: &'static str, value: f64) -> Result<(), ConfigError> {
    non_negative(name, value)?;
    if value > 1.0 {
        return Err(ConfigError::InvalidThreshold {
            name,
            value,
            reason: "must be a ratio between 0 and 1",
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Where history and reports live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the per-test execution history.
    pub history_path: PathBuf,
    /// Directory receiving timestamped and `latest` health reports.
    pub report_dir: PathBuf,
    /// Most recent runs kept per test; older runs are evicted first.
    pub max_runs_per_test: usize,
    /// How long `record` waits for the cross-process history lock.
    pub lock_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from("test-results/history/test-history.json"),
            report_dir: PathBuf::from("test-results/reports"),
            max_runs_per_test: 100,
            lock_timeout_ms: 10_000,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_runs_per_test == 0 {
            return Err(ConfigError::InvalidStorage {
                name: "max_runs_per_test",
                reason: "must keep at least one run per test",
            });
        }
        if self.history_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidStorage {
                name: "history_path",
                reason: "must not be empty",
            });
        }
        if self.report_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidStorage {
                name: "report_dir",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = MonitorConfig::default();

        assert_eq!(cfg.thresholds.flaky_threshold, 0.2);
        assert_eq!(cfg.thresholds.slow_test_threshold_ms, 30_000.0);
        assert_eq!(cfg.thresholds.stability_threshold, 0.8);
        assert_eq!(cfg.thresholds.failure_rate_threshold, 0.1);

        assert_eq!(
            cfg.storage.history_path,
            PathBuf::from("test-results/history/test-history.json")
        );
        assert_eq!(cfg.storage.report_dir, PathBuf::from("test-results/reports"));
        assert_eq!(cfg.storage.max_runs_per_test, 100);
        assert_eq!(cfg.storage.lock_timeout_ms, 10_000);

        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);

        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[thresholds]
flaky_threshold = 0.3
slow_test_threshold_ms = 5000
stability_threshold = 0.9
failure_rate_threshold = 0.05

[storage]
history_path = "/var/lib/ci/history.json"
report_dir = "/var/lib/ci/reports"
max_runs_per_test = 50
lock_timeout_ms = 2000

[logging]
level = "debug"
json = true
"#;

        let cfg: MonitorConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.thresholds.flaky_threshold, 0.3);
        assert_eq!(cfg.thresholds.slow_test_threshold_ms, 5000.0);
        assert_eq!(cfg.thresholds.stability_threshold, 0.9);
        assert_eq!(cfg.thresholds.failure_rate_threshold, 0.05);
        assert_eq!(cfg.storage.history_path, PathBuf::from("/var/lib/ci/history.json"));
        assert_eq!(cfg.storage.report_dir, PathBuf::from("/var/lib/ci/reports"));
        assert_eq!(cfg.storage.max_runs_per_test, 50);
        assert_eq!(cfg.storage.lock_timeout_ms, 2000);
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[thresholds]
flaky_threshold = 0.5
"#;

        let cfg: MonitorConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.thresholds.flaky_threshold, 0.5);
        assert_eq!(cfg.thresholds.stability_threshold, 0.8);
        assert_eq!(cfg.storage.max_runs_per_test, 100);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_camel_case_threshold_keys_accepted() {
        let toml_str = r#"
[thresholds]
flakyThreshold = 0.4
slowTestThresholdMs = 1000
"#;

        let cfg: MonitorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.thresholds.flaky_threshold, 0.4);
        assert_eq!(cfg.thresholds.slow_test_threshold_ms, 1000.0);
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let err = HealthThresholds::new(-0.1, 30_000.0, 0.8, 0.1).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidThreshold {
                name: "flaky_threshold",
                ..
            }
        ));

        assert!(HealthThresholds::new(0.2, -1.0, 0.8, 0.1).is_err());
        assert!(HealthThresholds::new(0.2, 30_000.0, -0.8, 0.1).is_err());
        assert!(HealthThresholds::new(0.2, 30_000.0, 0.8, -0.1).is_err());
    }

    #[test]
    fn test_non_finite_and_out_of_range_thresholds_rejected() {
        assert!(HealthThresholds::new(f64::NAN, 30_000.0, 0.8, 0.1).is_err());
        assert!(HealthThresholds::new(0.2, f64::INFINITY, 0.8, 0.1).is_err());
        assert!(HealthThresholds::new(0.2, 30_000.0, 1.5, 0.1).is_err());
        assert!(HealthThresholds::new(0.2, 30_000.0, 0.8, 1.01).is_err());

        // Retry rate is retries per run and may legitimately exceed 1.
        assert!(HealthThresholds::new(2.0, 30_000.0, 0.8, 0.1).is_ok());
    }

    #[test]
    fn test_zero_run_cap_rejected() {
        let mut cfg = MonitorConfig::default();
        cfg.storage.max_runs_per_test = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidStorage {
                name: "max_runs_per_test",
                ..
            })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("flakewatch.toml");
        std::fs::write(
            &path,
            r#"
[storage]
report_dir = "out/reports"
"#,
        )
        .unwrap();

        let cfg = MonitorConfig::load(&path).unwrap();
        assert_eq!(cfg.storage.report_dir, PathBuf::from("out/reports"));
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = MonitorConfig::load(Path::new("/nonexistent/path/flakewatch.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_malformed_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("flakewatch.toml");
        std::fs::write(&path, "[thresholds\nflaky_threshold = ").unwrap();

        let result = MonitorConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_serialization_roundtrip() {
        let cfg = MonitorConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let roundtripped: MonitorConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(cfg.thresholds, roundtripped.thresholds);
        assert_eq!(cfg.storage.history_path, roundtripped.storage.history_path);
        assert_eq!(cfg.storage.max_runs_per_test, roundtripped.storage.max_runs_per_test);
    }

    fn write_config(dir: &Path, name: &str, flaky: f64) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("[thresholds]\nflaky_threshold = {:?}\n", flaky)).unwrap();
        path
    }

    #[test]
    fn test_resolve_prefers_env_path_over_local_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let env_path = write_config(dir.path(), "env.toml", 0.3);
        let local = write_config(dir.path(), "flakewatch.toml", 0.4);

        let resolved = MonitorConfig::resolve_from(Some(env_path.clone()), &local);
        assert_eq!(resolved.config.thresholds.flaky_threshold, 0.3);
        assert_eq!(resolved.loaded_from, Some(env_path));
        assert!(resolved.skipped.is_empty());
    }

    #[test]
    fn test_resolve_falls_back_to_local_file_and_records_why() {
        let dir = tempfile::TempDir::new().unwrap();
        let local = write_config(dir.path(), "flakewatch.toml", 0.4);

        let resolved =
            MonitorConfig::resolve_from(Some(dir.path().join("missing.toml")), &local);
        assert_eq!(resolved.config.thresholds.flaky_threshold, 0.4);
        assert_eq!(resolved.loaded_from, Some(local));
        assert_eq!(resolved.skipped.len(), 1);
        assert_eq!(resolved.skipped[0].origin, CONFIG_ENV_VAR);
        assert!(matches!(resolved.skipped[0].error, ConfigError::Read { .. }));
    }

    #[test]
    fn test_resolve_uses_defaults_when_nothing_loads() {
        let dir = tempfile::TempDir::new().unwrap();
        let local = dir.path().join("flakewatch.toml");
        std::fs::write(&local, "not = [valid").unwrap();

        let resolved =
            MonitorConfig::resolve_from(Some(dir.path().join("missing.toml")), &local);
        assert_eq!(resolved.config.thresholds, HealthThresholds::default());
        assert!(resolved.loaded_from.is_none());
        let origins: Vec<_> = resolved.skipped.iter().map(|s| s.origin).collect();
        assert_eq!(origins, vec![CONFIG_ENV_VAR, LOCAL_CONFIG_FILE]);
        assert!(matches!(resolved.skipped[1].error, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_resolve_without_any_file_is_silent_default() {
        let dir = tempfile::TempDir::new().unwrap();
        let resolved = MonitorConfig::resolve_from(None, &dir.path().join("flakewatch.toml"));
        assert!(resolved.loaded_from.is_none());
        assert!(resolved.skipped.is_empty());
    }
}
