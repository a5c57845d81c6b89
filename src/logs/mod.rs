//! Per-run log capture.
//!
//! Every run gets its own directory under the log root, holding `run.log`
//! (diagnostics), `results.log` (one line per finished unit), per-unit
//! transcripts, and `report.json`. A `latest` pointer file in the root
//! names the most recently completed run; it is replaced atomically and
//! only once a run actually finished, so a crashed run never looks
//! current.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::NamedTempFile;

use crate::runner::report::{RunReport, emit_json};
use crate::runner::result::UnitResult;

/// File name of a unit's transcript inside a run directory.
pub fn unit_log_name(unit: usize, testcase: &str) -> String {
    format!("unit-{unit:03}-{testcase}.log")
}

/// Owns the log root and creates per-run directories under it.
#[derive(Debug, Clone)]
pub struct LogManager {
    root: PathBuf,
}

impl LogManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh run directory and open its result stream.
    ///
    /// The directory is named `<suite>-<unix seconds>-<pid>`, with a
    /// numeric suffix when that name is already taken.
    pub fn open_run(&self, suite: &str) -> Result<RunHandle, LogError> {
        fs::create_dir_all(&self.root).map_err(|e| {
            LogError::io(
                format!("could not create log root {}", self.root.display()),
                e,
            )
        })?;

        let started_unix = unix_now();
        let base = format!("{suite}-{started_unix}-{}", std::process::id());
        let mut run_id = base.clone();
        let mut dir = self.root.join(&run_id);
        let mut n = 1;
        while dir.exists() {
            run_id = format!("{base}-{n}");
            dir = self.root.join(&run_id);
            n += 1;
        }
        fs::create_dir(&dir).map_err(|e| {
            LogError::io(format!("could not create run directory {}", dir.display()), e)
        })?;

        let results_path = dir.join("results.log");
        let results_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&results_path)
            .map_err(|e| LogError::io(format!("could not open {}", results_path.display()), e))?;

        tracing::info!(run = %run_id, dir = %dir.display(), "run directory opened");

        Ok(RunHandle {
            root: self.root.clone(),
            dir,
            run_id,
            started_unix,
            results_log,
            finalized: false,
        })
    }

    /// Resolve the most recently completed run directory.
    pub fn latest(&self) -> Result<PathBuf, LogError> {
        let pointer = self.root.join("latest");
        let name = match fs::read_to_string(&pointer) {
            Ok(name) => name,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LogError::no_runs(&self.root));
            }
            Err(e) => {
                return Err(LogError::io(
                    format!("could not read {}", pointer.display()),
                    e,
                ));
            }
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(LogError::no_runs(&self.root));
        }
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(LogError {
                kind: LogErrorKind::NoRuns,
                message: format!(
                    "latest run '{name}' is missing from {}",
                    self.root.display()
                ),
                detail: None,
            });
        }
        Ok(dir)
    }
}

/// An open run directory.
///
/// Records results as they arrive and finalizes the latest pointer once
/// the run closes. Dropping an unclosed handle on the normal path still
/// finalizes; dropping during a panic does not.
#[derive(Debug)]
pub struct RunHandle {
    root: PathBuf,
    dir: PathBuf,
    run_id: String,
    started_unix: u64,
    results_log: File,
    finalized: bool,
}

impl RunHandle {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started_unix(&self) -> u64 {
        self.started_unix
    }

    /// Path of the diagnostic log file inside the run directory.
    pub fn run_log_path(&self) -> PathBuf {
        self.dir.join("run.log")
    }

    /// Path of a unit's transcript file inside the run directory.
    pub fn unit_log(&self, unit: usize, testcase: &str) -> PathBuf {
        self.dir.join(unit_log_name(unit, testcase))
    }

    /// Append one line to `results.log`, flushed immediately so a killed
    /// run still leaves every finished unit on disk.
    pub fn record(&mut self, result: &UnitResult) {
        let line = result_line(result);
        let wrote = writeln!(self.results_log, "{line}").and_then(|()| self.results_log.flush());
        if let Err(err) = wrote {
            tracing::warn!(error = %err, "could not append to results.log");
        }
        tracing::debug!(unit = result.unit, status = %result.status, "unit logged");
    }

    /// Write `report.json` and finalize the latest pointer. Returns the
    /// run directory.
    pub fn close(mut self, report: &RunReport) -> Result<PathBuf, LogError> {
        let path = self.dir.join("report.json");
        fs::write(&path, emit_json(report))
            .map_err(|e| LogError::io(format!("could not write {}", path.display()), e))?;
        self.finalized = true;
        finalize_pointer(&self.root, &self.run_id)?;
        tracing::info!(run = %self.run_id, "run closed");
        Ok(self.dir.clone())
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        // A run that panicked mid-flight must not become the latest run.
        if self.finalized || std::thread::panicking() {
            return;
        }
        if let Err(err) = finalize_pointer(&self.root, &self.run_id) {
            tracing::warn!(error = %err, "could not finalize latest pointer");
        }
    }
}

/// Atomically point `<root>/latest` at the given run directory name.
fn finalize_pointer(root: &Path, run_id: &str) -> Result<(), LogError> {
    let mut staged = NamedTempFile::new_in(root)
        .map_err(|e| LogError::io("could not stage latest pointer", e))?;
    writeln!(staged, "{run_id}").map_err(|e| LogError::io("could not write latest pointer", e))?;
    staged
        .persist(root.join("latest"))
        .map_err(|e| LogError::io("could not replace latest pointer", e.error))?;
    Ok(())
}

fn result_line(result: &UnitResult) -> String {
    let mut line = format!(
        "unit={} testcase={} status={} attempts={} duration_ms={}",
        result.unit,
        result.testcase,
        result.status,
        result.attempts,
        result.duration.as_millis()
    );
    if let Some(row) = result.row {
        line.push_str(&format!(" row={row}"));
    }
    if !result.devices.is_empty() {
        line.push_str(&format!(" devices={}", result.devices.join(",")));
    }
    if let Some(error) = &result.error {
        line.push_str(&format!(" error=\"{error}\""));
    }
    line
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Error from the log layer.
#[derive(Debug)]
pub struct LogError {
    pub kind: LogErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl LogError {
    fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self {
            kind: LogErrorKind::Io,
            message: message.into(),
            detail: Some(err.to_string()),
        }
    }

    fn no_runs(root: &Path) -> Self {
        Self {
            kind: LogErrorKind::NoRuns,
            message: format!("no runs recorded under {}", root.display()),
            detail: None,
        }
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Classification of log errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogErrorKind {
    /// A log file or directory could not be created or written.
    Io,
    /// No completed run exists under the log root.
    NoRuns,
}

impl fmt::Display for LogErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "log I/O failed"),
            Self::NoRuns => write!(f, "no runs recorded"),
        }
    }
}

impl std::error::Error for LogError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use crate::runner::executor::{RunSummary, StatusCounts};
    use crate::runner::report::to_report;
    use crate::runner::result::{UnitError, UnitErrorKind};

    fn sample_report(suite: &str, run_id: &str) -> RunReport {
        let summary = RunSummary {
            suite: suite.to_string(),
            results: vec![UnitResult::passed(0, "ping_mesh", Duration::from_millis(120))],
            counts: StatusCounts {
                total: 1,
                passed: 1,
                ..StatusCounts::default()
            },
            duration: Duration::from_millis(120),
            aborted: false,
        };
        to_report(&summary, run_id, 1_700_000_000)
    }

    #[test]
    fn unit_log_name_pads_the_index() {
        assert_eq!(unit_log_name(0, "ping_mesh"), "unit-000-ping_mesh.log");
        assert_eq!(unit_log_name(42, "exec_check"), "unit-042-exec_check.log");
    }

    #[test]
    fn open_run_creates_directory_and_result_stream() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());
        let handle = manager.open_run("smoke").unwrap();

        assert!(handle.dir().is_dir());
        assert!(handle.dir().starts_with(root.path()));
        assert!(handle.run_id().starts_with("smoke-"));
        assert_eq!(
            handle.dir().file_name().and_then(|n| n.to_str()),
            Some(handle.run_id())
        );
        assert!(handle.dir().join("results.log").exists());
        assert_eq!(handle.run_log_path(), handle.dir().join("run.log"));
    }

    #[test]
    fn open_run_twice_yields_distinct_directories() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());
        let first = manager.open_run("smoke").unwrap();
        let second = manager.open_run("smoke").unwrap();
        assert_ne!(first.dir(), second.dir());
        assert!(first.dir().is_dir());
        assert!(second.dir().is_dir());
    }

    #[test]
    fn record_appends_one_line_per_result() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());
        let mut handle = manager.open_run("smoke").unwrap();

        handle.record(&UnitResult::passed(0, "ping_mesh", Duration::from_millis(120)));
        handle.record(
            &UnitResult::failed(
                1,
                "exec_check",
                Duration::from_millis(80),
                UnitError::new(UnitErrorKind::Assertion, "expected status 0"),
            )
            .with_row(Some(2))
            .with_devices(vec!["sw-1".to_string()]),
        );

        let text = fs::read_to_string(handle.dir().join("results.log")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("unit=0"));
        assert!(lines[0].contains("status=passed"));
        assert!(lines[1].contains("status=failed"));
        assert!(lines[1].contains("row=2"));
        assert!(lines[1].contains("devices=sw-1"));
        assert!(lines[1].contains("assertion failed"));
    }

    #[test]
    fn close_writes_report_and_latest_pointer() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());
        let mut handle = manager.open_run("smoke").unwrap();
        handle.record(&UnitResult::passed(0, "ping_mesh", Duration::from_millis(120)));

        let report = sample_report("smoke", handle.run_id());
        let dir = handle.close(&report).unwrap();

        let written = fs::read_to_string(dir.join("report.json")).unwrap();
        let parsed: RunReport = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed.suite, "smoke");
        assert_eq!(parsed.totals.passed, 1);

        assert_eq!(manager.latest().unwrap(), dir);
    }

    #[test]
    fn latest_pointer_tracks_the_newest_closed_run() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());

        let first = manager.open_run("smoke").unwrap();
        let first_report = sample_report("smoke", first.run_id());
        first.close(&first_report).unwrap();

        let second = manager.open_run("smoke").unwrap();
        let second_report = sample_report("smoke", second.run_id());
        let second_dir = second.close(&second_report).unwrap();

        assert_eq!(manager.latest().unwrap(), second_dir);
    }

    #[test]
    fn latest_without_any_run_is_a_no_runs_error() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());
        let err = manager.latest().unwrap_err();
        assert_eq!(err.kind, LogErrorKind::NoRuns);
        assert!(err.to_string().starts_with("no runs recorded"));
    }

    #[test]
    fn dropping_an_unclosed_handle_still_finalizes() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());
        let handle = manager.open_run("smoke").unwrap();
        let dir = handle.dir().to_path_buf();
        drop(handle);
        assert_eq!(manager.latest().unwrap(), dir);
    }

    #[test]
    fn panicking_run_never_becomes_latest() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());
        let inner = manager.clone();
        let worker = thread::spawn(move || {
            let _handle = inner.open_run("smoke").unwrap();
            panic!("mid-run crash");
        });
        assert!(worker.join().is_err());
        assert_eq!(manager.latest().unwrap_err().kind, LogErrorKind::NoRuns);
    }

    #[test]
    fn unit_log_path_lives_in_the_run_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = LogManager::new(root.path());
        let handle = manager.open_run("smoke").unwrap();
        let path = handle.unit_log(3, "pull_config");
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("unit-003-pull_config.log")
        );
        assert!(path.starts_with(handle.dir()));
    }
}
