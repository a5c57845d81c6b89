use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::logs::{LogManager, RunHandle};
use crate::plan::{self, ExecutionUnit};
use crate::plugin::control::{ExecControl, RebootControl};
use crate::plugin::echo::EchoBehavior;
use crate::plugin::rest::RestBehavior;
use crate::plugin::shell::ShellBehavior;
use crate::plugin::{DeviceBehavior, PluginRegistry};
use crate::runner::display::{
    format_run_header, format_summary, format_unit_result, format_unit_start,
};
use crate::runner::report::{emit_junit, to_report};
use crate::runner::{
    DebugAction, DebugGate, FailurePolicy, RunConfig, RunObserver, TestRunner, UnitResult,
};
use crate::suite::parse_suite;
use crate::testcase::{ParamMap, TestcaseCatalog};
use crate::topo::{self, Device, RoleCatalog, TopoSource};

/// Options for the `run` and `debug` commands.
pub struct RunOptions {
    pub suite: PathBuf,
    /// Topology file; defaults to `<suite stem>.topo.yaml` next to the suite.
    pub topo: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub policy: String,
    pub workers: usize,
    /// Per-unit timeout in seconds.
    pub timeout: Option<u64>,
    pub retries: usize,
    pub assignment: String,
    /// Swap every registered behavior for the echo session.
    pub dry_run: bool,
    /// `key=value` overrides, applied over static and row parameters.
    pub params: Vec<String>,
    /// Also write a JUnit XML report to this path.
    pub junit: Option<PathBuf>,
    /// Gate every unit on stdin between binding and execution.
    pub debug: bool,
}

impl RunOptions {
    fn parse_policy(&self) -> Result<FailurePolicy, String> {
        match self.policy.as_str() {
            "continue" => Ok(FailurePolicy::Continue),
            "abort" => Ok(FailurePolicy::Abort),
            other => Err(format!(
                "unknown policy '{other}' (expected: continue, abort)"
            )),
        }
    }

    fn parse_assignment(&self) -> Result<plan::AssignmentPolicy, String> {
        match self.assignment.as_str() {
            "first-fit" => Ok(plan::AssignmentPolicy::FirstFit),
            "round-robin" => Ok(plan::AssignmentPolicy::RoundRobin),
            other => Err(format!(
                "unknown assignment '{other}' (expected: first-fit, round-robin)"
            )),
        }
    }

    fn parse_params(&self) -> Result<ParamMap, String> {
        let mut overrides = ParamMap::new();
        for raw in &self.params {
            let Some((key, value)) = raw.split_once('=') else {
                return Err(format!("malformed --param '{raw}' (expected key=value)"));
            };
            if key.is_empty() {
                return Err(format!("malformed --param '{raw}' (empty key)"));
            }
            overrides.insert(key.to_string(), value.to_string());
        }
        Ok(overrides)
    }

    fn topo_path(&self) -> PathBuf {
        self.topo
            .clone()
            .unwrap_or_else(|| self.suite.with_extension("topo.yaml"))
    }
}

/// Destination of the run's file log.
///
/// The tracing subscriber is installed once, at startup, but the run
/// directory does not exist until planning has succeeded. The file layer
/// writes through this handle; events arriving before [`attach`] are
/// dropped.
///
/// [`attach`]: RunLogSink::attach
#[derive(Clone, Default)]
pub struct RunLogSink {
    file: Arc<OnceLock<File>>,
}

impl RunLogSink {
    /// Route the file layer to `path`. The first attach wins.
    fn attach(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let _ = self.file.set(file);
        Ok(())
    }
}

impl io::Write for RunLogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.file.get() {
            Some(mut file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.get() {
            Some(mut file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for RunLogSink {
    type Writer = RunLogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Install the global tracing subscriber: compact diagnostics on stderr
/// plus, for `run` and `debug`, a plain layer into the run directory's
/// `run.log`.
///
/// Filtering follows `NETRIG_LOG`; the default keeps netrig at info and
/// everything else at warn.
pub fn init_tracing(with_run_log: bool) -> RunLogSink {
    let filter = EnvFilter::try_from_env("NETRIG_LOG")
        .unwrap_or_else(|_| EnvFilter::new("netrig=info,warn"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(io::stderr);
    let base = tracing_subscriber::registry().with(filter).with(stderr_layer);

    let sink = RunLogSink::default();
    if with_run_log {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(sink.clone());
        let _ = base.with(file_layer).try_init();
    } else {
        let _ = base.try_init();
    }
    sink
}

/// The registry the CLI runs with: shell sessions for every role, REST
/// sessions for `rest*` roles, and the `exec` and `reboot` controls.
/// Dry-run keeps the patterns but substitutes echo sessions everywhere.
fn build_registry(dry_run: bool) -> PluginRegistry {
    let shell: Arc<dyn DeviceBehavior> = if dry_run {
        Arc::new(EchoBehavior::new())
    } else {
        Arc::new(ShellBehavior::new())
    };
    let rest: Arc<dyn DeviceBehavior> = if dry_run {
        Arc::new(EchoBehavior::new())
    } else {
        Arc::new(RestBehavior::new())
    };

    let mut builder = PluginRegistry::builder();
    // Fresh builder with distinct fixed patterns: registration cannot collide.
    let _ = builder.behavior("*", shell);
    let _ = builder.behavior("rest*", rest);
    let _ = builder.control("exec", "*", Arc::new(ExecControl));
    let _ = builder.control("reboot", "*", Arc::new(RebootControl::default()));
    builder.build()
}

/// Required attribute names per role, derived from the behaviors the
/// registry would pick for the roles the topology declares.
fn role_requirements(registry: &PluginRegistry, source: &TopoSource) -> RoleCatalog {
    let mut catalog = RoleCatalog::new();
    let mut seen = BTreeSet::new();
    for decl in &source.devices {
        if !seen.insert(decl.role.as_str()) {
            continue;
        }
        let probe = Device {
            name: decl.name.clone(),
            role: decl.role.clone(),
            attrs: BTreeMap::new(),
        };
        // Roles without a matching behavior fail later, at bind time.
        if let Ok(behavior) = registry.behavior_for(&probe) {
            let required = behavior.required_attrs();
            if !required.is_empty() {
                catalog = catalog.require(&decl.role, required);
            }
        }
    }
    catalog
}

fn suite_stem(path: &Path) -> &str {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("suite")
}

/// Prints progress to stdout and appends each result to `results.log`.
struct CliReporter<'a> {
    handle: &'a mut RunHandle,
}

impl RunObserver for CliReporter<'_> {
    fn unit_started(&mut self, unit: &ExecutionUnit, total: usize) {
        println!("{}", format_unit_start(&unit.label(), unit.index + 1, total));
    }

    fn unit_finished(&mut self, result: &UnitResult) {
        println!("{}", format_unit_result(result));
        self.handle.record(result);
    }
}

/// Interactive gate for `netrig debug`: prompts on stderr and reads one
/// command from stdin per bound unit.
pub struct StdinDebugGate;

impl DebugGate for StdinDebugGate {
    fn inspect(&mut self, unit: &ExecutionUnit) -> DebugAction {
        let devices = unit.binding.all_devices().join(", ");
        eprintln!("debug: {} bound to [{devices}]", unit.label());
        loop {
            eprint!("debug [run/skip/abort]> ");
            let _ = io::stderr().flush();
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                // Closed stdin turns the gate into a pass-through.
                Ok(0) | Err(_) => return DebugAction::Continue,
                Ok(_) => {}
            }
            match line.trim() {
                "" | "run" | "r" => return DebugAction::Continue,
                "skip" | "s" => return DebugAction::Skip,
                "abort" | "a" => return DebugAction::Abort,
                other => eprintln!("debug: unknown command '{other}'"),
            }
        }
    }
}

/// Run the `run` (or `debug`) command: resolve the topology, plan the
/// suite, execute it, and record the run under the log directory.
///
/// Returns `Ok(true)` when every unit passed, `Ok(false)` when any unit
/// failed or errored or the run aborted.
///
/// # Errors
///
/// Returns an error string for configuration and planning failures:
/// unreadable files, a malformed topology or suite, an unsatisfiable
/// plan, or a log directory that cannot be written.
pub fn run_run(options: RunOptions, run_log: &RunLogSink) -> Result<bool, String> {
    let policy = options.parse_policy()?;
    let assignment = options.parse_assignment()?;
    let overrides = options.parse_params()?;

    let suite_text = std::fs::read_to_string(&options.suite)
        .map_err(|e| format!("failed to read {}: {e}", options.suite.display()))?;
    let suite = parse_suite(suite_stem(&options.suite), &suite_text)
        .map_err(|e| format!("{}:{e}", options.suite.display()))?;

    let topo_path = options.topo_path();
    let topo_text = std::fs::read_to_string(&topo_path)
        .map_err(|e| format!("failed to read {}: {e}", topo_path.display()))?;
    let source =
        TopoSource::from_yaml(&topo_text).map_err(|e| format!("{}: {e}", topo_path.display()))?;

    let registry = build_registry(options.dry_run);
    let roles = role_requirements(&registry, &source);
    let topology =
        topo::resolve_with(&source, &roles).map_err(|e| format!("{}: {e}", topo_path.display()))?;

    let catalog = TestcaseCatalog::default();
    let plan_options = plan::PlanOptions {
        base_dir: options.suite.parent().map(Path::to_path_buf),
        assignment,
        overrides,
    };
    let plan = plan::plan_with(&suite, &topology, &catalog, &plan_options)
        .map_err(|e| format!("{}: {e}", options.suite.display()))?;

    let logs = LogManager::new(&options.log_dir);
    let mut handle = logs.open_run(&suite.name).map_err(|e| e.to_string())?;
    let run_log_path = handle.run_log_path();
    run_log
        .attach(&run_log_path)
        .map_err(|e| format!("failed to open {}: {e}", run_log_path.display()))?;

    let config = RunConfig {
        policy,
        workers: options.workers,
        timeout: options.timeout.map(Duration::from_secs),
        retry_limit: options.retries,
        transcript_dir: Some(handle.dir().to_path_buf()),
        ..RunConfig::default()
    };
    let mut runner = TestRunner::new(config, Arc::new(registry), Arc::new(topology));
    if options.debug {
        runner = runner.with_gate(Box::new(StdinDebugGate));
    }

    print!("{}", format_run_header(&suite.name, plan.len()));
    let mut reporter = CliReporter {
        handle: &mut handle,
    };
    let summary = runner.run(&plan, &mut reporter);
    println!("{}", format_summary(&summary));

    let report = to_report(&summary, handle.run_id(), handle.started_unix());
    handle.close(&report).map_err(|e| e.to_string())?;

    if let Some(junit_path) = &options.junit {
        std::fs::write(junit_path, emit_junit(&report))
            .map_err(|e| format!("failed to write {}: {e}", junit_path.display()))?;
        eprintln!("junit report written to {}", junit_path.display());
    }

    Ok(summary.all_passed())
}

/// Run the `lastlog` command: print the directory of the latest run.
///
/// # Errors
///
/// Returns an error string when no run has been recorded under the log
/// directory, or the pointer cannot be read.
pub fn run_lastlog(log_dir: &Path) -> Result<String, String> {
    let logs = LogManager::new(log_dir);
    let path = logs.latest().map_err(|e| e.to_string())?;
    Ok(format!("{}\n", path.display()))
}
