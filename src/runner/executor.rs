use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use crate::plan::types::{ExecutionPlan, ExecutionUnit};
use crate::plugin::{PluginRegistry, SessionError};
use crate::runner::broker::SessionBroker;
use crate::runner::context::{SessionSet, TestContext, Transcript};
use crate::runner::result::{UnitError, UnitErrorKind, UnitResult, UnitStatus};
use crate::testcase::Testcase;
use crate::topo::Topology;

/// What to do once a unit finishes Failed or Errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Keep going; every unit gets a result.
    #[default]
    Continue,
    /// Stop dispatching; units not yet started are recorded Skipped.
    Abort,
}

/// Cooperative stop signal, honored at unit boundaries.
///
/// In-flight units run to completion or their timeout; only units not yet
/// started become Skipped.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Decision returned by a [`DebugGate`] for a bound unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    /// Run the unit.
    Continue,
    /// Record the unit Skipped and release its devices.
    Skip,
    /// Skip the unit and stop the run.
    Abort,
}

/// Hook consulted between binding and running a unit.
///
/// The unit's devices are claimed and its sessions are open while the gate
/// decides, so an interactive gate can take its time without losing the
/// bind. Installing a gate forces sequential execution.
pub trait DebugGate: Send + Sync {
    fn inspect(&mut self, unit: &ExecutionUnit) -> DebugAction;
}

/// Receives unit lifecycle notifications while a run progresses.
///
/// The CLI uses this for progress lines and result recording. Methods
/// default to no-ops, and `()` implements the trait for callers that do
/// not care.
pub trait RunObserver {
    /// A unit is about to bind. Not called for skipped units.
    fn unit_started(&mut self, unit: &ExecutionUnit, total: usize) {
        let _ = (unit, total);
    }

    /// A unit reached a terminal status.
    fn unit_finished(&mut self, result: &UnitResult) {
        let _ = result;
    }
}

impl RunObserver for () {}

/// Configuration for a test run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// What to do after a Failed or Errored unit.
    pub policy: FailurePolicy,
    /// Maximum units in flight inside one wave (1 = sequential).
    pub workers: usize,
    /// Overrides every testcase's own timeout when set.
    pub timeout: Option<Duration>,
    /// Extra bind-and-run attempts for Errored units.
    pub retry_limit: usize,
    /// How long binding may wait for devices another unit still holds.
    pub claim_timeout: Duration,
    /// Directory for per-unit transcripts, usually the open run directory.
    pub transcript_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::Continue,
            workers: 1,
            timeout: None,
            retry_limit: 1,
            claim_timeout: Duration::from_secs(30),
            transcript_dir: None,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub suite: String,
    /// One result per planned unit, in plan order.
    pub results: Vec<UnitResult>,
    pub counts: StatusCounts,
    pub duration: Duration,
    pub aborted: bool,
}

impl RunSummary {
    /// Whether the run is an overall success.
    pub fn all_passed(&self) -> bool {
        !self.aborted && self.counts.failed == 0 && self.counts.errored == 0
    }
}

/// Result totals by status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub skipped: usize,
}

impl StatusCounts {
    /// Tally a result list.
    pub fn from_results(results: &[UnitResult]) -> Self {
        let mut counts = Self {
            total: results.len(),
            ..Self::default()
        };
        for result in results {
            match result.status {
                UnitStatus::Passed => counts.passed += 1,
                UnitStatus::Failed => counts.failed += 1,
                UnitStatus::Errored => counts.errored += 1,
                UnitStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }
}

/// The main test runner. Binds devices through the broker, drives testcase
/// phases on worker threads, classifies outcomes, and applies retry and
/// failure policy.
pub struct TestRunner {
    config: RunConfig,
    registry: Arc<PluginRegistry>,
    topology: Arc<Topology>,
    broker: Arc<SessionBroker>,
    abort: AbortHandle,
    gate: Option<Box<dyn DebugGate>>,
}

impl TestRunner {
    /// Create a runner with its own broker and a fresh abort handle.
    pub fn new(config: RunConfig, registry: Arc<PluginRegistry>, topology: Arc<Topology>) -> Self {
        Self {
            config,
            registry,
            topology,
            broker: Arc::new(SessionBroker::new()),
            abort: AbortHandle::new(),
            gate: None,
        }
    }

    /// Install a debug gate. A gated runner executes sequentially.
    pub fn with_gate(mut self, gate: Box<dyn DebugGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// A handle other threads can use to stop the run at the next unit
    /// boundary.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Execute a full plan. This is the primary entry point.
    ///
    /// Waves run in plan order. Within a wave, units run in parallel when
    /// `workers > 1` and no debug gate is installed; results always come
    /// back in plan order.
    pub fn run(&mut self, plan: &ExecutionPlan, observer: &mut dyn RunObserver) -> RunSummary {
        let started = Instant::now();
        let total = plan.len();
        let mut gate = self.gate.take();
        let mut results: Vec<UnitResult> = Vec::with_capacity(total);
        let mut aborted = false;

        tracing::info!(
            suite = %plan.suite,
            units = total,
            workers = self.config.workers,
            "run started"
        );

        for wave in &plan.waves {
            let parallel = self.config.workers > 1 && gate.is_none() && wave.len() > 1;
            if parallel {
                for chunk in wave.chunks(self.config.workers) {
                    aborted = aborted || self.abort.is_aborted();
                    if aborted {
                        for &index in chunk {
                            let unit = &plan.units[index];
                            let result = UnitResult::skipped(unit.index, unit.testcase.name())
                                .with_row(unit.row);
                            self.finish(result, &mut results, &mut aborted, observer);
                        }
                        continue;
                    }
                    for &index in chunk {
                        observer.unit_started(&plan.units[index], total);
                    }
                    let this: &TestRunner = self;
                    let outcomes = thread::scope(|scope| {
                        let handles: Vec<_> = chunk
                            .iter()
                            .map(|&index| {
                                scope.spawn(move || this.execute_unit(&plan.units[index], None))
                            })
                            .collect();
                        handles
                            .into_iter()
                            .map(|handle| handle.join())
                            .collect::<Vec<_>>()
                    });
                    for (&index, outcome) in chunk.iter().zip(outcomes) {
                        let unit = &plan.units[index];
                        let result = outcome.unwrap_or_else(|_| {
                            UnitResult::errored(
                                unit.index,
                                unit.testcase.name(),
                                Duration::ZERO,
                                UnitError::new(UnitErrorKind::Internal, "unit driver panicked"),
                            )
                            .with_row(unit.row)
                        });
                        self.finish(result, &mut results, &mut aborted, observer);
                    }
                }
            } else {
                for &index in wave {
                    aborted = aborted || self.abort.is_aborted();
                    let unit = &plan.units[index];
                    if aborted {
                        let result = UnitResult::skipped(unit.index, unit.testcase.name())
                            .with_row(unit.row);
                        self.finish(result, &mut results, &mut aborted, observer);
                        continue;
                    }
                    observer.unit_started(unit, total);
                    let result = self.execute_unit(unit, gate.as_deref_mut());
                    self.finish(result, &mut results, &mut aborted, observer);
                }
            }
        }

        self.gate = gate;
        let counts = StatusCounts::from_results(&results);
        tracing::info!(
            passed = counts.passed,
            failed = counts.failed,
            errored = counts.errored,
            skipped = counts.skipped,
            aborted,
            "run finished"
        );
        RunSummary {
            suite: plan.suite.clone(),
            results,
            counts,
            duration: started.elapsed(),
            aborted,
        }
    }

    /// Record one terminal result and apply the failure policy.
    fn finish(
        &self,
        result: UnitResult,
        results: &mut Vec<UnitResult>,
        aborted: &mut bool,
        observer: &mut dyn RunObserver,
    ) {
        tracing::info!(
            unit = result.unit,
            testcase = %result.testcase,
            status = %result.status,
            attempts = result.attempts,
            "unit finished"
        );
        if self.config.policy == FailurePolicy::Abort && result.status.is_failure() {
            tracing::warn!(unit = result.unit, "abort policy stops the run");
            *aborted = true;
        }
        observer.unit_finished(&result);
        results.push(result);
    }

    /// Run one unit to a terminal status, retrying Errored attempts.
    ///
    /// Failed verdicts are never retried, and the debug gate is consulted
    /// once, on the first bind.
    fn execute_unit(
        &self,
        unit: &ExecutionUnit,
        mut gate: Option<&mut (dyn DebugGate + 'static)>,
    ) -> UnitResult {
        let budget = self.config.retry_limit + 1;
        let mut attempt = 1;
        loop {
            let gate_now = if attempt == 1 {
                gate.as_deref_mut()
            } else {
                None
            };
            match self.run_attempt(unit, attempt, gate_now) {
                Attempt::Skipped => {
                    return UnitResult::skipped(unit.index, unit.testcase.name())
                        .with_row(unit.row);
                }
                Attempt::Finished(result) => {
                    if result.status == UnitStatus::Errored && attempt < budget {
                        if let Some(error) = &result.error {
                            tracing::warn!(
                                unit = unit.index,
                                attempt,
                                error = %error,
                                "unit errored, retrying"
                            );
                        }
                        attempt += 1;
                        continue;
                    }
                    return result.with_attempts(attempt);
                }
            }
        }
    }

    /// One bind-and-run cycle.
    ///
    /// 1. Claim the unit's devices through the broker
    /// 2. Open one session per bound device
    /// 3. Consult the debug gate (first attempt only)
    /// 4. Drive the phases on a worker thread under the timeout budget
    /// 5. Classify the outcome
    fn run_attempt(
        &self,
        unit: &ExecutionUnit,
        attempt: usize,
        gate: Option<&mut (dyn DebugGate + 'static)>,
    ) -> Attempt {
        let started = Instant::now();
        let case = Arc::clone(&unit.testcase);
        let devices: Vec<String> = unit
            .binding
            .all_devices()
            .iter()
            .map(|d| (*d).to_string())
            .collect();

        tracing::debug!(unit = unit.index, testcase = case.name(), attempt, "unit pending");

        // 1. Claim devices
        let claim = match self.broker.acquire(&devices, self.config.claim_timeout) {
            Ok(claim) => claim,
            Err(err) => {
                let error = UnitError::new(UnitErrorKind::Timeout, err.to_string());
                return Attempt::Finished(errored_result(unit, started, devices, None, error));
            }
        };

        // 2. Open sessions
        let mut sessions = SessionSet::new();
        for role in unit.binding.roles() {
            let mut opened = Vec::new();
            for name in unit.binding.devices(role) {
                let Some(device) = self.topology.device(name) else {
                    let error = UnitError::new(
                        UnitErrorKind::Internal,
                        format!("bound device '{name}' is not in the topology"),
                    );
                    return Attempt::Finished(errored_result(unit, started, devices, None, error));
                };
                let behavior = match self.registry.behavior_for(device) {
                    Ok(behavior) => behavior,
                    Err(err) => {
                        let error = UnitError::new(UnitErrorKind::Resolution, err.to_string());
                        return Attempt::Finished(errored_result(
                            unit, started, devices, None, error,
                        ));
                    }
                };
                match behavior.open(device) {
                    Ok(session) => opened.push(session),
                    Err(err) => {
                        let error = session_unit_error(err);
                        return Attempt::Finished(errored_result(
                            unit, started, devices, None, error,
                        ));
                    }
                }
            }
            sessions.insert(role, opened);
        }

        tracing::debug!(unit = unit.index, devices = ?devices, "unit bound");

        // 3. Debug gate
        if let Some(gate) = gate {
            match gate.inspect(unit) {
                DebugAction::Continue => {}
                DebugAction::Skip => {
                    tracing::info!(unit = unit.index, "unit skipped by debug gate");
                    return Attempt::Skipped;
                }
                DebugAction::Abort => {
                    tracing::warn!(unit = unit.index, "debug gate aborted the run");
                    self.abort.abort();
                    return Attempt::Skipped;
                }
            }
        }

        let mut transcript = match &self.config.transcript_dir {
            Some(dir) => {
                let path = dir.join(crate::logs::unit_log_name(unit.index, case.name()));
                let opened = if attempt == 1 {
                    Transcript::create(&path)
                } else {
                    Transcript::append(&path)
                };
                match opened {
                    Ok(transcript) => transcript,
                    Err(err) => {
                        tracing::warn!(unit = unit.index, error = %err, "transcript unavailable");
                        Transcript::disabled()
                    }
                }
            }
            None => Transcript::disabled(),
        };
        transcript.heading(&format!("{}, attempt {attempt}", unit.label()));
        let log = transcript.path().map(Path::to_path_buf);

        tracing::debug!(unit = unit.index, "unit running");

        // 4. Drive phases on a worker thread
        let timeout = self.config.timeout.unwrap_or_else(|| case.timeout());
        let params = unit.params.clone();
        let binding = unit.binding.clone();
        let registry = Arc::clone(&self.registry);
        let topology = Arc::clone(&self.topology);
        let (tx, rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name(format!("unit-{}", unit.index))
            .spawn(move || {
                let mut sessions = sessions;
                let mut transcript = transcript;
                let outcome = {
                    let mut cx = TestContext::new(
                        &params,
                        &binding,
                        &mut sessions,
                        &registry,
                        &topology,
                        &mut transcript,
                    );
                    run_phases(case.as_ref(), &mut cx)
                };
                // Release devices before reporting so the scheduler can
                // rebind them immediately.
                sessions.close_all();
                drop(sessions);
                drop(claim);
                let _ = tx.send(outcome);
            });
        let worker = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                let error = UnitError::new(
                    UnitErrorKind::Internal,
                    format!("could not spawn unit worker: {err}"),
                );
                return Attempt::Finished(errored_result(unit, started, devices, log, error));
            }
        };

        // 5. Wait for a verdict
        let outcome = match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                // Abandon the worker; its claim releases when it finishes.
                tracing::warn!(
                    unit = unit.index,
                    budget_s = timeout.as_secs_f64(),
                    "unit timed out, worker abandoned"
                );
                let error = UnitError::timeout(timeout);
                return Attempt::Finished(errored_result(unit, started, devices, log, error));
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The worker died without sending; its unwind already
                // released the claim and closed nothing further.
                let error = UnitError::new(UnitErrorKind::Internal, "testcase panicked");
                return Attempt::Finished(errored_result(unit, started, devices, log, error));
            }
        };
        let _ = worker.join();

        let duration = started.elapsed();
        let result = match outcome {
            PhaseOutcome::Passed => UnitResult::passed(unit.index, unit.testcase.name(), duration),
            PhaseOutcome::Failed(error) => {
                UnitResult::failed(unit.index, unit.testcase.name(), duration, error)
            }
            PhaseOutcome::Errored(error) => {
                UnitResult::errored(unit.index, unit.testcase.name(), duration, error)
            }
        };
        Attempt::Finished(attach_log(
            result.with_row(unit.row).with_devices(devices),
            log,
        ))
    }
}

/// Outcome of one bind-and-run cycle.
enum Attempt {
    Finished(UnitResult),
    Skipped,
}

/// Classified outcome of the three phases.
enum PhaseOutcome {
    Passed,
    Failed(UnitError),
    Errored(UnitError),
}

/// Drive setup, body, and teardown, and classify the combined outcome.
///
/// Teardown runs whenever setup was entered. A teardown error escalates a
/// passing unit to Errored but never downgrades a Failed verdict.
fn run_phases(case: &dyn Testcase, cx: &mut TestContext<'_>) -> PhaseOutcome {
    if let Err(err) = case.setup(cx) {
        let error = UnitError::setup(err);
        if let Err(td) = case.teardown(cx) {
            cx.note(&format!("teardown also failed: {td}"));
        }
        return PhaseOutcome::Errored(error);
    }
    let body = case.body(cx);
    let teardown = case.teardown(cx);
    if body.is_err()
        && let Err(td) = &teardown
    {
        cx.note(&format!("teardown also failed: {td}"));
    }
    match (body, teardown) {
        (Err(err), _) if err.is_assertion() => PhaseOutcome::Failed(UnitError::body(err)),
        (Err(err), _) => PhaseOutcome::Errored(UnitError::body(err)),
        (Ok(()), Err(td)) => PhaseOutcome::Errored(UnitError::teardown(td)),
        (Ok(()), Ok(())) => PhaseOutcome::Passed,
    }
}

fn errored_result(
    unit: &ExecutionUnit,
    started: Instant,
    devices: Vec<String>,
    log: Option<PathBuf>,
    error: UnitError,
) -> UnitResult {
    attach_log(
        UnitResult::errored(unit.index, unit.testcase.name(), started.elapsed(), error)
            .with_row(unit.row)
            .with_devices(devices),
        log,
    )
}

fn attach_log(result: UnitResult, log: Option<PathBuf>) -> UnitResult {
    match log {
        Some(path) => result.with_log(path),
        None => result,
    }
}

fn session_unit_error(err: SessionError) -> UnitError {
    let message = err.to_string();
    let mut error = UnitError::new(UnitErrorKind::Session, message);
    if let Some(detail) = err.detail {
        error = error.with_detail(detail);
    }
    error
}
