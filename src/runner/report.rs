use serde::{Deserialize, Serialize};

use crate::runner::executor::RunSummary;
use crate::runner::result::UnitResult;

/// Serializable summary of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub suite: String,
    pub run_id: String,
    pub started_unix: u64,
    pub duration_ms: u64,
    pub aborted: bool,
    pub all_passed: bool,
    pub totals: ReportTotals,
    pub units: Vec<ReportUnit>,
}

/// Result totals by status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTotals {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

/// A single unit's outcome in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportUnit {
    pub unit: usize,
    pub testcase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
    pub status: String,
    pub duration_ms: u64,
    pub attempts: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

/// Error detail in the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportError {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Convert a [`RunSummary`] into a serializable [`RunReport`].
pub fn to_report(summary: &RunSummary, run_id: &str, started_unix: u64) -> RunReport {
    RunReport {
        suite: summary.suite.clone(),
        run_id: run_id.to_string(),
        started_unix,
        duration_ms: summary.duration.as_millis() as u64,
        aborted: summary.aborted,
        all_passed: summary.all_passed(),
        totals: ReportTotals {
            total: summary.counts.total,
            passed: summary.counts.passed,
            failed: summary.counts.failed,
            errored: summary.counts.errored,
            skipped: summary.counts.skipped,
        },
        units: summary.results.iter().map(unit_report).collect(),
    }
}

fn unit_report(result: &UnitResult) -> ReportUnit {
    let error = result.error.as_ref().map(|e| ReportError {
        kind: e.kind.to_string(),
        message: e.message.clone(),
        detail: e.detail.clone(),
    });
    ReportUnit {
        unit: result.unit,
        testcase: result.testcase.clone(),
        row: result.row,
        devices: result.devices.clone(),
        status: result.status.to_string(),
        duration_ms: result.duration.as_millis() as u64,
        attempts: result.attempts,
        error,
        log: result.log.as_ref().map(|p| p.display().to_string()),
    }
}

/// Emit a run report as JSON.
pub fn emit_json(report: &RunReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|e| format!("{{ \"error\": \"{}\" }}", e))
}

/// Emit a run report as YAML.
pub fn emit_yaml(report: &RunReport) -> String {
    serde_yaml::to_string(report).unwrap_or_else(|e| format!("# Error serializing report: {e}"))
}

/// Emit a run report as JUnit XML with actual pass/fail status.
///
/// The whole run maps to one `<testsuite>`; each unit becomes a
/// `<testcase>` with `<failure>` for Failed, `<error>` for Errored, and
/// `<skipped/>` for Skipped.
pub fn emit_junit(report: &RunReport) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let name = xml_escape(&report.suite);
    let tests = report.totals.total;
    let failures = report.totals.failed;
    let errors = report.totals.errored;
    let time_secs = report.duration_ms as f64 / 1000.0;

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#).unwrap();
    writeln!(
        out,
        r#"<testsuites name="{name}" tests="{tests}" failures="{failures}" errors="{errors}" time="{time_secs:.1}">"#
    )
    .unwrap();
    writeln!(
        out,
        r#"  <testsuite name="{name}" tests="{tests}" failures="{failures}" errors="{errors}" time="{time_secs:.1}">"#
    )
    .unwrap();

    for unit in &report.units {
        let case = xml_escape(&unit_name(unit));
        let unit_time = unit.duration_ms as f64 / 1000.0;
        writeln!(
            out,
            r#"    <testcase name="{case}" classname="{name}" time="{unit_time:.1}">"#
        )
        .unwrap();

        if unit.status == "failed" {
            if let Some(err) = &unit.error {
                writeln!(
                    out,
                    r#"      <failure message="{}" type="{}"/>"#,
                    xml_escape(&err.message),
                    xml_escape(&err.kind)
                )
                .unwrap();
            } else {
                writeln!(out, r#"      <failure message="unit failed"/>"#).unwrap();
            }
        }

        if unit.status == "errored" {
            if let Some(err) = &unit.error {
                writeln!(
                    out,
                    r#"      <error message="{}" type="{}"/>"#,
                    xml_escape(&err.message),
                    xml_escape(&err.kind)
                )
                .unwrap();
            } else {
                writeln!(out, r#"      <error message="execution error"/>"#).unwrap();
            }
        }

        if unit.status == "skipped" {
            writeln!(out, r#"      <skipped/>"#).unwrap();
        }

        writeln!(out, "    </testcase>").unwrap();
    }

    writeln!(out, "  </testsuite>").unwrap();
    writeln!(out, "</testsuites>").unwrap();

    out
}

/// Report-facing unit name: the testcase, with the data row when present.
fn unit_name(unit: &ReportUnit) -> String {
    match unit.row {
        Some(row) => format!("{} [row {row}]", unit.testcase),
        None => unit.testcase.clone(),
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::runner::executor::StatusCounts;
    use crate::runner::result::{UnitError, UnitErrorKind};

    fn summary_of(results: Vec<UnitResult>) -> RunSummary {
        let counts = StatusCounts::from_results(&results);
        RunSummary {
            suite: "smoke".to_string(),
            results,
            counts,
            duration: Duration::from_millis(5000),
            aborted: false,
        }
    }

    fn passed_unit(unit: usize, name: &str, ms: u64) -> UnitResult {
        UnitResult::passed(unit, name, Duration::from_millis(ms))
            .with_devices(vec!["sw-1".to_string()])
    }

    fn failed_unit(unit: usize, name: &str) -> UnitResult {
        UnitResult::failed(
            unit,
            name,
            Duration::from_millis(50),
            UnitError::new(UnitErrorKind::Assertion, "expected status 0"),
        )
    }

    fn errored_unit(unit: usize, name: &str) -> UnitResult {
        UnitResult::errored(
            unit,
            name,
            Duration::from_millis(50),
            UnitError::new(UnitErrorKind::Session, "device unreachable: no route")
                .with_detail("connect refused"),
        )
    }

    #[test]
    fn report_from_all_passed_run() {
        let summary = summary_of(vec![passed_unit(0, "ping_mesh", 100), passed_unit(1, "exec_check", 200)]);
        let report = to_report(&summary, "smoke-1700000000-42", 1_700_000_000);
        assert_eq!(report.suite, "smoke");
        assert_eq!(report.run_id, "smoke-1700000000-42");
        assert_eq!(report.started_unix, 1_700_000_000);
        assert!(report.all_passed);
        assert!(!report.aborted);
        assert_eq!(report.units.len(), 2);
        assert!(report.units.iter().all(|u| u.status == "passed"));
        assert!(report.units.iter().all(|u| u.error.is_none()));
    }

    #[test]
    fn report_from_mixed_results() {
        let summary = summary_of(vec![
            passed_unit(0, "a", 100),
            failed_unit(1, "b"),
            UnitResult::skipped(2, "c"),
        ]);
        let report = to_report(&summary, "smoke-1-1", 1);
        assert_eq!(report.units[0].status, "passed");
        assert_eq!(report.units[1].status, "failed");
        assert_eq!(report.units[2].status, "skipped");
        assert!(!report.all_passed);
        assert_eq!(report.totals.total, 3);
        assert_eq!(report.totals.passed, 1);
        assert_eq!(report.totals.failed, 1);
        assert_eq!(report.totals.skipped, 1);
    }

    #[test]
    fn report_includes_error_detail() {
        let summary = summary_of(vec![errored_unit(0, "pull_config")]);
        let report = to_report(&summary, "smoke-1-1", 1);
        let err = report.units[0].error.as_ref().unwrap();
        assert_eq!(err.kind, "session failure");
        assert_eq!(err.message, "device unreachable: no route");
        assert_eq!(err.detail.as_deref(), Some("connect refused"));
    }

    #[test]
    fn report_includes_row_devices_and_attempts() {
        let result = passed_unit(3, "exec_check", 120)
            .with_row(Some(2))
            .with_attempts(2);
        let summary = summary_of(vec![result]);
        let report = to_report(&summary, "smoke-1-1", 1);
        assert_eq!(report.units[0].row, Some(2));
        assert_eq!(report.units[0].devices, ["sw-1"]);
        assert_eq!(report.units[0].attempts, 2);
    }

    #[test]
    fn report_includes_timing() {
        let summary = summary_of(vec![passed_unit(0, "a", 1500)]);
        let report = to_report(&summary, "smoke-1-1", 1);
        assert_eq!(report.duration_ms, 5000);
        assert_eq!(report.units[0].duration_ms, 1500);
    }

    #[test]
    fn emit_json_structure() {
        let summary = summary_of(vec![passed_unit(0, "a", 100)]);
        let report = to_report(&summary, "smoke-1-1", 1);
        let json = emit_json(&report);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["suite"].is_string());
        assert!(parsed["units"].is_array());
        assert!(parsed["totals"]["passed"].is_number());
        assert!(parsed["all_passed"].is_boolean());
        // absent row is omitted, not null
        assert!(parsed["units"][0].get("row").is_none());
    }

    #[test]
    fn emit_json_roundtrip() {
        let summary = summary_of(vec![passed_unit(0, "a", 100), failed_unit(1, "b")]);
        let report = to_report(&summary, "smoke-1-1", 1);
        let parsed: RunReport = serde_json::from_str(&emit_json(&report)).unwrap();
        assert_eq!(parsed.suite, "smoke");
        assert_eq!(parsed.units.len(), 2);
        assert_eq!(parsed.totals.failed, 1);
    }

    #[test]
    fn emit_yaml_includes_summary() {
        let summary = summary_of(vec![
            passed_unit(0, "a", 100),
            failed_unit(1, "b"),
            UnitResult::skipped(2, "c"),
        ]);
        let yaml = emit_yaml(&to_report(&summary, "smoke-1-1", 1));
        assert!(yaml.contains("suite: smoke"));
        assert!(yaml.contains("status: passed"));
        assert!(yaml.contains("status: failed"));
        assert!(yaml.contains("status: skipped"));
        assert!(yaml.contains("all_passed: false"));
    }

    #[test]
    fn junit_all_passed() {
        let summary = summary_of(vec![passed_unit(0, "ping_mesh", 100), passed_unit(1, "exec_check", 200)]);
        let xml = emit_junit(&to_report(&summary, "smoke-1-1", 1));
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains(r#"tests="2""#));
        assert!(xml.contains(r#"failures="0""#));
        assert!(xml.contains(r#"<testcase name="ping_mesh""#));
        assert!(xml.contains(r#"<testcase name="exec_check""#));
        assert!(!xml.contains("<failure"));
        assert!(!xml.contains("<skipped"));
    }

    #[test]
    fn junit_failure_and_error_elements() {
        let summary = summary_of(vec![failed_unit(0, "broken"), errored_unit(1, "unlucky")]);
        let xml = emit_junit(&to_report(&summary, "smoke-1-1", 1));
        assert!(xml.contains(r#"failures="1""#));
        assert!(xml.contains(r#"errors="1""#));
        assert!(xml.contains(r#"<failure message="expected status 0" type="assertion failed"/>"#));
        assert!(xml.contains(r#"<error message="device unreachable: no route" type="session failure"/>"#));
    }

    #[test]
    fn junit_skipped_element() {
        let summary = summary_of(vec![UnitResult::skipped(0, "benched")]);
        let xml = emit_junit(&to_report(&summary, "smoke-1-1", 1));
        assert!(xml.contains("<skipped/>"));
    }

    #[test]
    fn junit_names_data_rows() {
        let summary = summary_of(vec![passed_unit(0, "exec_check", 100).with_row(Some(2))]);
        let xml = emit_junit(&to_report(&summary, "smoke-1-1", 1));
        assert!(xml.contains(r#"<testcase name="exec_check [row 2]""#));
    }

    #[test]
    fn junit_escapes_xml_special_chars() {
        let mut summary = summary_of(vec![failed_unit(0, "cmp<latency>")]);
        summary.suite = "edge & core".to_string();
        let xml = emit_junit(&to_report(&summary, "smoke-1-1", 1));
        assert!(xml.contains("edge &amp; core"));
        assert!(xml.contains("cmp&lt;latency&gt;"));
        assert!(!xml.contains("edge & core"));
    }

    #[test]
    fn junit_timing_in_seconds() {
        let summary = summary_of(vec![passed_unit(0, "a", 1500)]);
        let xml = emit_junit(&to_report(&summary, "smoke-1-1", 1));
        // 5000ms run = 5.0s, 1500ms unit = 1.5s
        assert!(xml.contains(r#"time="5.0""#));
        assert!(xml.contains(r#"time="1.5""#));
    }
}
