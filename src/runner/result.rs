use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::testcase::{CaseError, CaseErrorKind};

/// Terminal verdict for one execution unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    /// All phases completed and every assertion held.
    Passed,
    /// The body raised an assertion failure.
    Failed,
    /// Infrastructure prevented a verdict: binding, setup, teardown,
    /// timeout, or a contained panic.
    Errored,
    /// Never started (abort policy or debug skip).
    Skipped,
}

impl UnitStatus {
    /// Whether this status makes the whole run non-successful.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Errored)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
            Self::Errored => write!(f, "errored"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of executing one unit of the plan.
///
/// `attempts` counts bind-and-run cycles, so a unit that errored once and
/// passed on retry reports 2. Skipped units report 0.
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub unit: usize,
    pub testcase: String,
    pub row: Option<usize>,
    /// Devices the unit was bound to, in role order. Empty when binding
    /// never succeeded.
    pub devices: Vec<String>,
    pub status: UnitStatus,
    pub duration: Duration,
    pub attempts: usize,
    pub error: Option<UnitError>,
    /// Per-unit transcript, when the run had a log directory.
    pub log: Option<PathBuf>,
}

impl UnitResult {
    /// Create a passing result.
    pub fn passed(unit: usize, testcase: &str, duration: Duration) -> Self {
        Self {
            unit,
            testcase: testcase.to_owned(),
            row: None,
            devices: Vec::new(),
            status: UnitStatus::Passed,
            duration,
            attempts: 1,
            error: None,
            log: None,
        }
    }

    /// Create a failing result (an assertion did not hold).
    pub fn failed(unit: usize, testcase: &str, duration: Duration, error: UnitError) -> Self {
        Self {
            unit,
            testcase: testcase.to_owned(),
            row: None,
            devices: Vec::new(),
            status: UnitStatus::Failed,
            duration,
            attempts: 1,
            error: Some(error),
            log: None,
        }
    }

    /// Create an errored result (infrastructure, not a verdict).
    pub fn errored(unit: usize, testcase: &str, duration: Duration, error: UnitError) -> Self {
        Self {
            unit,
            testcase: testcase.to_owned(),
            row: None,
            devices: Vec::new(),
            status: UnitStatus::Errored,
            duration,
            attempts: 1,
            error: Some(error),
            log: None,
        }
    }

    /// Create a skipped result with zero duration and zero attempts.
    pub fn skipped(unit: usize, testcase: &str) -> Self {
        Self {
            unit,
            testcase: testcase.to_owned(),
            row: None,
            devices: Vec::new(),
            status: UnitStatus::Skipped,
            duration: Duration::ZERO,
            attempts: 0,
            error: None,
            log: None,
        }
    }

    pub fn with_row(mut self, row: Option<usize>) -> Self {
        self.row = row;
        self
    }

    pub fn with_devices(mut self, devices: Vec<String>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_log(mut self, log: PathBuf) -> Self {
        self.log = Some(log);
        self
    }

    /// Human-readable identity: the testcase name plus the data row, when
    /// the unit came from one.
    pub fn label(&self) -> String {
        match self.row {
            Some(row) => format!("{} [row {row}]", self.testcase),
            None => self.testcase.clone(),
        }
    }
}

/// Error detail for a failed or errored unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitError {
    pub kind: UnitErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl UnitError {
    pub fn new(kind: UnitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Classify an error raised in the setup phase. The inner kind is kept
    /// in the message text.
    pub fn setup(err: CaseError) -> Self {
        Self {
            kind: UnitErrorKind::Setup,
            message: err.to_string(),
            detail: err.detail,
        }
    }

    /// Classify an error raised in the body. Assertion failures stay
    /// assertions; everything else maps onto its infrastructure kind.
    pub fn body(err: CaseError) -> Self {
        let kind = match err.kind {
            CaseErrorKind::Assertion => UnitErrorKind::Assertion,
            CaseErrorKind::Session => UnitErrorKind::Session,
            CaseErrorKind::Resolution => UnitErrorKind::Resolution,
            CaseErrorKind::Internal => UnitErrorKind::Internal,
        };
        Self {
            kind,
            message: err.message,
            detail: err.detail,
        }
    }

    /// Classify an error raised in the teardown phase.
    pub fn teardown(err: CaseError) -> Self {
        Self {
            kind: UnitErrorKind::Teardown,
            message: err.to_string(),
            detail: err.detail,
        }
    }

    /// A unit that produced no verdict within its time budget.
    pub fn timeout(budget: Duration) -> Self {
        Self {
            kind: UnitErrorKind::Timeout,
            message: format!("no verdict within the {:.1}s budget", budget.as_secs_f64()),
            detail: None,
        }
    }
}

impl fmt::Display for UnitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Classification of unit errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitErrorKind {
    /// A checked expectation in the body did not hold.
    Assertion,
    /// A device session broke while the body ran.
    Session,
    /// The registry could not resolve a behavior or control method.
    Resolution,
    /// The setup phase failed before the body could run.
    Setup,
    /// The teardown phase failed after a passing body.
    Teardown,
    /// The unit exceeded its time budget or a device claim deadline.
    Timeout,
    /// A contained panic or another engine-side defect.
    Internal,
}

impl fmt::Display for UnitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assertion => write!(f, "assertion failed"),
            Self::Session => write!(f, "session failure"),
            Self::Resolution => write!(f, "plugin resolution failed"),
            Self::Setup => write!(f, "setup failed"),
            Self::Teardown => write!(f, "teardown failed"),
            Self::Timeout => write!(f, "timed out"),
            Self::Internal => write!(f, "internal error"),
        }
    }
}
