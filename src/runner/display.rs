use crate::runner::executor::RunSummary;
use crate::runner::result::{UnitResult, UnitStatus};

/// Format a status label for terminal output.
fn status_label(status: UnitStatus) -> &'static str {
    match status {
        UnitStatus::Passed => "PASSED",
        UnitStatus::Failed => "FAILED",
        UnitStatus::Errored => "ERRORED",
        UnitStatus::Skipped => "SKIPPED",
    }
}

/// Display a progress line for a unit about to bind.
pub fn format_unit_start(label: &str, position: usize, total: usize) -> String {
    format!("  [{position}/{total}] {label} ...")
}

/// Format a unit result as it completes.
pub fn format_unit_result(result: &UnitResult) -> String {
    let status = status_label(result.status);
    let duration_secs = result.duration.as_secs_f64();
    let mut line = if result.attempts > 1 {
        format!(
            "  [{status}] {} ({:.1}s, {} attempts)",
            result.label(),
            duration_secs,
            result.attempts
        )
    } else {
        format!("  [{status}] {} ({:.1}s)", result.label(), duration_secs)
    };

    if result.status.is_failure()
        && let Some(err) = &result.error
    {
        line.push_str(&format!("\n         → {}", err.message));
    }

    if result.status == UnitStatus::Skipped {
        line.push_str("\n         → not run");
    }

    line
}

/// Format the final summary after all units complete.
pub fn format_summary(summary: &RunSummary) -> String {
    let duration_secs = summary.duration.as_secs_f64();
    let mut parts = Vec::new();

    if summary.counts.passed > 0 {
        parts.push(format!("{} passed", summary.counts.passed));
    }
    if summary.counts.failed > 0 {
        parts.push(format!("{} failed", summary.counts.failed));
    }
    if summary.counts.errored > 0 {
        parts.push(format!("{} errored", summary.counts.errored));
    }
    if summary.counts.skipped > 0 {
        parts.push(format!("{} skipped", summary.counts.skipped));
    }

    if parts.is_empty() {
        parts.push("0 units".into());
    }

    let mut line = format!("\nResults: {} ({:.1}s)", parts.join(", "), duration_secs);
    if summary.aborted {
        line.push_str(" [aborted]");
    }
    line
}

/// Format the run header line.
pub fn format_run_header(suite: &str, units: usize) -> String {
    let noun = if units == 1 { "unit" } else { "units" };
    format!("Running {suite} ({units} {noun})...\n")
}
