//! Command-level tests: the fixture suite driven through `run_run` the way
//! the binary drives it, with echo sessions standing in for devices.

use std::path::PathBuf;

use netrig::cli::commands::{RunLogSink, RunOptions, run_lastlog, run_run};
use netrig::logs::LogManager;
use netrig::runner::report::RunReport;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn dry_run_options(suite: PathBuf, log_dir: PathBuf) -> RunOptions {
    RunOptions {
        suite,
        topo: None,
        log_dir,
        policy: "continue".to_string(),
        workers: 1,
        timeout: None,
        retries: 1,
        assignment: "first-fit".to_string(),
        dry_run: true,
        params: Vec::new(),
        junit: None,
        debug: false,
    }
}

fn latest_report(log_dir: &std::path::Path) -> RunReport {
    let latest = LogManager::new(log_dir).latest().expect("run recorded");
    let json = std::fs::read_to_string(latest.join("report.json")).expect("report written");
    serde_json::from_str(&json).expect("report parses")
}

// ── run ────────────────────────────────────────────────────

#[test]
fn cli_run_executes_the_fixture_suite() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");

    let all_passed = run_run(
        dry_run_options(fixture("regression.suite"), log_dir.clone()),
        &RunLogSink::default(),
    )
    .expect("fixture suite should plan and run");
    assert!(all_passed);

    // One unit for each plain entry, one per data row.
    let report = latest_report(&log_dir);
    assert_eq!(report.suite, "regression");
    assert!(report.all_passed);
    assert_eq!(report.totals.total, 4);
    assert_eq!(report.totals.passed, 4);

    let testcases: Vec<&str> = report.units.iter().map(|u| u.testcase.as_str()).collect();
    assert_eq!(
        testcases,
        ["session_check", "exec_check", "exec_check", "exec_check"]
    );
    assert_eq!(report.units[2].row, Some(0));
    assert_eq!(report.units[3].row, Some(1));
}

#[test]
fn cli_run_param_overrides_reach_static_and_row_units() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");

    // Echo replies with status 0, so expecting 1 fails every exec_check;
    // session_check has no status parameter and keeps passing.
    let mut options = dry_run_options(fixture("regression.suite"), log_dir.clone());
    options.params = vec!["status=1".to_string()];

    let all_passed = run_run(options, &RunLogSink::default()).unwrap();
    assert!(!all_passed);

    let report = latest_report(&log_dir);
    assert_eq!(report.totals.passed, 1);
    assert_eq!(report.totals.failed, 3);
}

#[test]
fn cli_run_missing_topology_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let suite = dir.path().join("orphan.suite");
    std::fs::write(&suite, "session_check\n").unwrap();

    let err = run_run(
        dry_run_options(suite, dir.path().join("logs")),
        &RunLogSink::default(),
    )
    .unwrap_err();
    assert!(err.contains("orphan.topo.yaml"));
    assert!(err.contains("failed to read"));
}

#[test]
fn cli_run_unsatisfiable_plan_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("thin.topo.yaml"),
        "devices:\n  - { name: probe, role: generator }\n",
    )
    .unwrap();
    let suite = dir.path().join("thin.suite");
    std::fs::write(&suite, "session_check\n").unwrap();

    // session_check needs a node; the topology only has a generator.
    let err = run_run(
        dry_run_options(suite, dir.path().join("logs")),
        &RunLogSink::default(),
    )
    .unwrap_err();
    assert!(err.contains("node"));
}

// ── lastlog ────────────────────────────────────────────────

#[test]
fn cli_lastlog_points_at_the_run_just_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let log_dir = dir.path().join("logs");

    run_run(
        dry_run_options(fixture("regression.suite"), log_dir.clone()),
        &RunLogSink::default(),
    )
    .unwrap();

    let printed = run_lastlog(&log_dir).unwrap();
    let latest = LogManager::new(&log_dir).latest().unwrap();
    assert_eq!(printed.trim_end(), latest.display().to_string());
}

#[test]
fn cli_lastlog_with_no_runs_reports_it() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_lastlog(dir.path()).unwrap_err();
    assert!(err.contains("no runs recorded"));
}
