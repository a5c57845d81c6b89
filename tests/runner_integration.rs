//! Pipeline tests: suite text and topology documents through planning and
//! execution, with echo sessions (or purpose-built behaviors) at the
//! device boundary.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use netrig::plan::{self, AssignmentPolicy, ExecutionPlan, PlanOptions};
use netrig::plugin::echo::EchoBehavior;
use netrig::plugin::{
    DeviceBehavior, DeviceSession, PluginRegistry, SessionError, SessionErrorKind,
};
use netrig::runner::report::{emit_junit, emit_yaml, to_report};
use netrig::runner::{
    FailurePolicy, RunConfig, RunSummary, TestRunner, UnitErrorKind, UnitStatus,
};
use netrig::suite::parse_suite;
use netrig::testcase::TestcaseCatalog;
use netrig::topo::{self, Device, TopoSource, Topology};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn echo_registry() -> PluginRegistry {
    let mut builder = PluginRegistry::builder();
    builder
        .behavior("*", Arc::new(EchoBehavior::new()))
        .unwrap();
    builder.build()
}

fn bench_topology() -> Topology {
    let source = TopoSource::from_yaml(
        "devices:\n  - { name: n1, role: node }\n  - { name: n2, role: node }\n",
    )
    .unwrap();
    topo::resolve(&source).unwrap()
}

fn plan_suite(text: &str, topology: &Topology, options: &PlanOptions) -> ExecutionPlan {
    let suite = parse_suite("pipeline", text).unwrap();
    plan::plan_with(&suite, topology, &TestcaseCatalog::default(), options).unwrap()
}

fn run_plan(
    plan: &ExecutionPlan,
    topology: Topology,
    config: RunConfig,
    registry: PluginRegistry,
) -> RunSummary {
    let mut runner = TestRunner::new(config, Arc::new(registry), Arc::new(topology));
    runner.run(plan, &mut ())
}

// -- Behavior that never opens, for infrastructure failures --

struct UnreachableBehavior;

impl DeviceBehavior for UnreachableBehavior {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn open(&self, device: &Device) -> Result<Box<dyn DeviceSession>, SessionError> {
        Err(SessionError::new(
            SessionErrorKind::Unreachable,
            format!("device '{}' did not answer", device.name),
        ))
    }
}

// -- End-to-end flows --

#[test]
fn e2e_fixture_suite_passes_with_echo_sessions() {
    let text = std::fs::read_to_string(fixture("regression.suite")).unwrap();
    let suite = parse_suite("regression", &text).unwrap();
    let topo_text = std::fs::read_to_string(fixture("regression.topo.yaml")).unwrap();
    let topology = topo::resolve(&TopoSource::from_yaml(&topo_text).unwrap()).unwrap();

    let options = PlanOptions {
        base_dir: fixture("regression.suite").parent().map(Path::to_path_buf),
        ..PlanOptions::default()
    };
    let plan = plan::plan_with(&suite, &topology, &TestcaseCatalog::default(), &options).unwrap();
    assert_eq!(plan.len(), 4);

    let summary = run_plan(&plan, topology, RunConfig::default(), echo_registry());
    assert!(summary.all_passed());
    assert_eq!(summary.counts.passed, 4);
    assert!(
        summary
            .results
            .iter()
            .all(|r| r.status == UnitStatus::Passed)
    );
}

#[test]
fn e2e_data_rows_fan_out_in_file_order() {
    let text = std::fs::read_to_string(fixture("regression.suite")).unwrap();
    let suite = parse_suite("regression", &text).unwrap();
    let topology = bench_topology();

    let options = PlanOptions {
        base_dir: fixture("regression.suite").parent().map(Path::to_path_buf),
        ..PlanOptions::default()
    };
    let plan = plan::plan_with(&suite, &topology, &TestcaseCatalog::default(), &options).unwrap();

    assert_eq!(plan.units[2].row, Some(0));
    assert_eq!(plan.units[2].params.get("command").unwrap(), "show clock");
    assert_eq!(plan.units[3].row, Some(1));
    assert_eq!(
        plan.units[3].params.get("command").unwrap(),
        "show interfaces"
    );
}

#[test]
fn e2e_continue_policy_reports_every_unit() {
    let topology = bench_topology();
    let plan = plan_suite(
        "exec_check command=up status=1\nsession_check\n",
        &topology,
        &PlanOptions::default(),
    );

    let summary = run_plan(&plan, topology, RunConfig::default(), echo_registry());
    assert!(!summary.all_passed());
    assert!(!summary.aborted);
    assert_eq!(summary.counts.failed, 1);
    assert_eq!(summary.counts.passed, 1);

    let failure = &summary.results[0];
    assert_eq!(failure.status, UnitStatus::Failed);
    let error = failure.error.as_ref().unwrap();
    assert_eq!(error.kind, UnitErrorKind::Assertion);
    assert!(error.message.contains("status 0, expected 1"));
}

#[test]
fn e2e_abort_policy_skips_the_rest_of_the_plan() {
    let topology = bench_topology();
    let plan = plan_suite(
        "session_check\nexec_check command=up status=1\nsession_check\n",
        &topology,
        &PlanOptions::default(),
    );

    let config = RunConfig {
        policy: FailurePolicy::Abort,
        ..RunConfig::default()
    };
    let summary = run_plan(&plan, topology, config, echo_registry());

    let statuses: Vec<UnitStatus> = summary.results.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [UnitStatus::Passed, UnitStatus::Failed, UnitStatus::Skipped]
    );
    assert!(summary.aborted);
    assert!(!summary.all_passed());
}

#[test]
fn e2e_unreachable_device_is_errored_and_retried() {
    let topology = bench_topology();
    let plan = plan_suite("session_check\n", &topology, &PlanOptions::default());

    let mut builder = PluginRegistry::builder();
    builder
        .behavior("*", Arc::new(UnreachableBehavior))
        .unwrap();
    let summary = run_plan(&plan, topology, RunConfig::default(), builder.build());

    let result = &summary.results[0];
    assert_eq!(result.status, UnitStatus::Errored);
    // One retry on infrastructure failures by default.
    assert_eq!(result.attempts, 2);
    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind, UnitErrorKind::Session);
    assert!(error.message.contains("did not answer"));
}

#[test]
fn e2e_parallel_wave_spreads_over_disjoint_devices() {
    let topology = bench_topology();
    let options = PlanOptions {
        assignment: AssignmentPolicy::RoundRobin,
        ..PlanOptions::default()
    };
    let plan = plan_suite(
        "session_check parallel\nsession_check parallel\n",
        &topology,
        &options,
    );
    assert_eq!(plan.waves, vec![vec![0, 1]]);
    assert_eq!(plan.units[0].binding.devices("node"), ["n1"]);
    assert_eq!(plan.units[1].binding.devices("node"), ["n2"]);

    let config = RunConfig {
        workers: 2,
        ..RunConfig::default()
    };
    let summary = run_plan(&plan, topology, config, echo_registry());
    assert!(summary.all_passed());
    assert_eq!(summary.results[0].devices, ["n1"]);
    assert_eq!(summary.results[1].devices, ["n2"]);
}

// -- Reports from a finished run --

#[test]
fn e2e_report_emitters_describe_a_mixed_run() {
    let topology = bench_topology();
    let plan = plan_suite(
        "session_check\nexec_check command=up status=1\n",
        &topology,
        &PlanOptions::default(),
    );
    let summary = run_plan(&plan, topology, RunConfig::default(), echo_registry());
    let report = to_report(&summary, "pipeline-1700000000-421", 1_700_000_000);

    let yaml = emit_yaml(&report);
    assert!(yaml.contains("suite: pipeline"));
    assert!(yaml.contains("all_passed: false"));
    assert!(yaml.contains("failed: 1"));

    let xml = emit_junit(&report);
    assert!(xml.contains(r#"<testsuite name="pipeline" tests="2" failures="1" errors="0""#));
    assert!(xml.contains(r#"<testcase name="session_check""#));
    assert!(xml.contains("<failure"));
}
