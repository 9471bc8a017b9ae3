//! Execution history storage -- a bounded, per-test append log kept in one JSON file.
//!
//! Every mutation re-serializes the whole store and replaces the file
//! atomically (temp file + rename), so readers never observe a partial write.
//! The load-append-write cycle runs under an exclusive cross-process lock
//! (see [`lock`]) so parallel test workers cannot lose each other's records.

pub mod lock;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use lock::HistoryLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt history file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("timed out after {waited:?} waiting for history lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// True when an exclusive create found the target already present.
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::AlreadyExists
        )
    }
}

/// Outcome of a single test execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Flaky,
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Skipped => "skipped",
            TestStatus::Flaky => "flaky",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "passed" | "pass" => Ok(TestStatus::Passed),
            "failed" | "fail" => Ok(TestStatus::Failed),
            "skipped" | "skip" => Ok(TestStatus::Skipped),
            "flaky" => Ok(TestStatus::Flaky),
            other => Err(format!(
                "unknown test status '{}' (expected passed, failed, skipped or flaky)",
                other
            )),
        }
    }
}

/// One observed test execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunRecord {
    pub test_name: String,
    pub status: TestStatus,
    pub duration_ms: f64,
    pub retries: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TestRunRecord {
    pub fn new(
        test_name: impl Into<String>,
        status: TestStatus,
        duration_ms: f64,
        retries: u32,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            test_name: test_name.into(),
            status,
            duration_ms,
            retries,
            timestamp,
            error: None,
        }
    }

    /// Builder-style setter for `error`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// A run that needed retries to pass is flaky, not a clean pass.
    /// Negative or non-finite durations are clamped to zero.
    pub fn normalized(mut self) -> Self {
        if self.retries > 0 && self.status == TestStatus::Passed {
            self.status = TestStatus::Flaky;
        }
        if !self.duration_ms.is_finite() || self.duration_ms < 0.0 {
            self.duration_ms = 0.0;
        }
        self
    }
}

/// Chronological run records keyed by test name.
pub type TestHistory = BTreeMap<String, Vec<TestRunRecord>>;

/// Durable, bounded history of test executions.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    lock_path: PathBuf,
    max_runs_per_test: usize,
    lock_timeout: Duration,
}

impl HistoryStore {
    pub fn new(config: &StorageConfig) -> Self {
        let mut lock_path = config.history_path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path: config.history_path.clone(),
            lock_path: PathBuf::from(lock_path),
            max_runs_per_test: config.max_runs_per_test.max(1),
            lock_timeout: Duration::from_millis(config.lock_timeout_ms),
        }
    }

    /// Path of the history file.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append a run to its test's history and persist the store.
    ///
    /// Holds the history lock across load, append, trim and write.
    pub fn record(&self, record: TestRunRecord) -> Result<(), StorageError> {
        let record = record.normalized();
        let _lock = HistoryLock::acquire(&self.lock_path, self.lock_timeout)?;

        let mut history = match self.try_load() {
            Ok(history) => history,
            Err(StorageError::Corrupt { path, source }) => {
                warn!(
                    path = %path.display(),
                    error = %source,
                    "history file is corrupt, starting fresh"
                );
                self.quarantine_corrupt();
                TestHistory::new()
            }
            Err(e) => return Err(e),
        };

        let test_name = record.test_name.clone();
        let runs = history.entry(test_name.clone()).or_default();
        runs.push(record);
        trim_oldest(runs, self.max_runs_per_test);
        let kept = runs.len();

        write_json_atomic(&self.path, &history)?;
        debug!(%test_name, runs = kept, "recorded test run");
        Ok(())
    }

    /// Read the full store. Missing or corrupt files yield an empty history.
    pub fn load(&self) -> TestHistory {
        match self.try_load() {
            Ok(history) => history,
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not load test history, treating as empty"
                );
                TestHistory::new()
            }
        }
    }

    /// Runs recorded for a single test, oldest first.
    pub fn history_for(&self, test_name: &str) -> Vec<TestRunRecord> {
        self.load().remove(test_name).unwrap_or_default()
    }

    /// Erase all history.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _lock = HistoryLock::acquire(&self.lock_path, self.lock_timeout)?;
        write_json_atomic(&self.path, &TestHistory::new())?;
        debug!(path = %self.path.display(), "cleared test history");
        Ok(())
    }

    fn try_load(&self) -> Result<TestHistory, StorageError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(TestHistory::new()),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };
        serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Move an unreadable history file aside so its bytes survive the rewrite.
    fn quarantine_corrupt(&self) {
        let mut aside = self.path.clone().into_os_string();
        aside.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        let aside = PathBuf::from(aside);
        if let Err(e) = std::fs::rename(&self.path, &aside) {
            warn!(path = %self.path.display(), error = %e, "failed to move corrupt history aside");
        } else {
            warn!(path = %aside.display(), "corrupt history preserved");
        }
    }
}

/// Drop the oldest runs until at most `max` remain.
fn trim_oldest(runs: &mut Vec<TestRunRecord>, max: usize) {
    if runs.len() > max {
        let excess = runs.len() - max;
        runs.drain(..excess);
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let tmp = stage_json(path, value)?;
    tmp.persist(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

/// Like [`write_json_atomic`] but never replaces an existing file.
///
/// Fails with an `AlreadyExists` i/o error if `path` is taken.
pub fn write_json_new<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let tmp = stage_json(path, value)?;
    tmp.persist_noclobber(path)
        .map_err(|e| StorageError::io(path, e.error))?;
    Ok(())
}

/// Write `value` into a synced temp file next to `path`.
fn stage_json<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<tempfile::NamedTempFile, StorageError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

    let json = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
    tmp.write_all(&json).map_err(|e| StorageError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StorageError::io(tmp.path(), e))?;
    Ok(tmp)
}
