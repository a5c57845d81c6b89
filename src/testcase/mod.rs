pub mod builtin;
pub mod schema;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::plugin::{ControlError, ResolutionError, SessionError};
use crate::runner::context::TestContext;

pub use schema::{ParamSchema, ParamSpec, ParamType, SchemaViolation};

/// Flat parameter-name to value mapping used everywhere parameters flow:
/// suite entries, data rows, execution units, control-method arguments.
pub type ParamMap = BTreeMap<String, String>;

/// Timeout applied to a unit when neither the testcase nor the run
/// configuration overrides it.
pub const DEFAULT_CASE_TIMEOUT: Duration = Duration::from_secs(300);

/// Topology a testcase requires before it can be planned: how many devices
/// of each role, and which roles must be linked.
///
/// Role order is binding order, so requirements are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyNeeds {
    pub roles: Vec<RoleNeed>,
    pub links: Vec<LinkNeed>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleNeed {
    pub role: String,
    pub count: usize,
}

/// Requires at least one topology link between an assigned device of role
/// `a` and an assigned device of role `b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNeed {
    pub a: String,
    pub b: String,
}

impl TopologyNeeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `count` devices of `role`. Chainable.
    pub fn role(mut self, role: &str, count: usize) -> Self {
        self.roles.push(RoleNeed {
            role: role.to_string(),
            count,
        });
        self
    }

    /// Require a link between assigned devices of two roles. Chainable.
    pub fn link(mut self, a: &str, b: &str) -> Self {
        self.links.push(LinkNeed {
            a: a.to_string(),
            b: b.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.links.is_empty()
    }
}

/// Outcome of one testcase phase.
pub type CaseResult = Result<(), CaseError>;

/// Failure raised inside a testcase phase.
///
/// The runner classifies by kind: an `Assertion` from the body is a test
/// failure; anything else, or any error outside the body, is an
/// infrastructure error.
#[derive(Debug, Clone)]
pub struct CaseError {
    pub kind: CaseErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseErrorKind {
    /// A checked expectation did not hold.
    Assertion,
    /// The device session failed (unreachable, command error, closed).
    Session,
    /// The plugin registry could not satisfy a capability.
    Resolution,
    /// Anything else that prevented the phase from completing.
    Internal,
}

impl CaseError {
    pub fn assertion(message: impl Into<String>) -> Self {
        Self {
            kind: CaseErrorKind::Assertion,
            message: message.into(),
            detail: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: CaseErrorKind::Internal,
            message: message.into(),
            detail: None,
        }
    }

    /// Attach captured output or other context to the error.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_assertion(&self) -> bool {
        self.kind == CaseErrorKind::Assertion
    }
}

impl fmt::Display for CaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for CaseError {}

impl fmt::Display for CaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CaseErrorKind::Assertion => "assertion failed",
            CaseErrorKind::Session => "session failure",
            CaseErrorKind::Resolution => "plugin resolution failed",
            CaseErrorKind::Internal => "internal error",
        };
        write!(f, "{text}")
    }
}

impl From<SessionError> for CaseError {
    fn from(err: SessionError) -> Self {
        Self {
            kind: CaseErrorKind::Session,
            message: err.message,
            detail: err.detail,
        }
    }
}

impl From<ControlError> for CaseError {
    fn from(err: ControlError) -> Self {
        Self {
            kind: CaseErrorKind::Session,
            message: err.message,
            detail: err.detail,
        }
    }
}

impl From<ResolutionError> for CaseError {
    fn from(err: ResolutionError) -> Self {
        Self {
            kind: CaseErrorKind::Resolution,
            message: err.to_string(),
            detail: None,
        }
    }
}

/// Assert a condition inside a testcase phase.
///
/// # Errors
///
/// Returns an assertion-kind [`CaseError`] when the condition is false.
pub fn check(condition: bool, message: impl Into<String>) -> CaseResult {
    if condition {
        Ok(())
    } else {
        Err(CaseError::assertion(message))
    }
}

/// The contract every testcase satisfies.
///
/// A testcase declares what it needs (parameter schema, topology roles and
/// links, timeout) and implements up to three phases. `setup` and
/// `teardown` default to no-ops; `teardown` runs even when `setup` or
/// `body` fail, so it must tolerate partial state.
pub trait Testcase: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn schema(&self) -> ParamSchema {
        ParamSchema::new()
    }

    /// Devices and links this testcase must be bound to.
    fn needs(&self) -> TopologyNeeds;

    /// Wall-clock budget for one attempt (all three phases).
    fn timeout(&self) -> Duration {
        DEFAULT_CASE_TIMEOUT
    }

    /// Prepare device state before the body runs.
    ///
    /// # Errors
    ///
    /// Any error here classifies the unit as Errored, never Failed.
    fn setup(&self, cx: &mut TestContext<'_>) -> CaseResult {
        let _ = cx;
        Ok(())
    }

    /// The test proper.
    ///
    /// # Errors
    ///
    /// An assertion-kind error classifies the unit as Failed; any other
    /// error kind classifies it as Errored.
    fn body(&self, cx: &mut TestContext<'_>) -> CaseResult;

    /// Restore device state. Runs on every path once binding succeeded.
    ///
    /// # Errors
    ///
    /// An error here escalates a passing unit to Errored but never
    /// downgrades a Failed verdict.
    fn teardown(&self, cx: &mut TestContext<'_>) -> CaseResult {
        let _ = cx;
        Ok(())
    }
}

/// Named lookup of registered testcases.
///
/// Suites reference testcases by name; embedders register their own
/// implementations next to the built-ins.
pub struct TestcaseCatalog {
    cases: Vec<Arc<dyn Testcase>>,
}

impl TestcaseCatalog {
    /// An empty catalog with no testcases registered.
    pub fn new() -> Self {
        Self { cases: Vec::new() }
    }

    /// Register a testcase.
    ///
    /// # Errors
    ///
    /// Rejects a second registration under an already-taken name.
    pub fn register(&mut self, case: Arc<dyn Testcase>) -> Result<(), CatalogError> {
        if self.get(case.name()).is_some() {
            return Err(CatalogError {
                name: case.name().to_string(),
            });
        }
        self.cases.push(case);
        Ok(())
    }

    /// Find a testcase by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Testcase>> {
        self.cases.iter().find(|c| c.name() == name).cloned()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.cases.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}

impl Default for TestcaseCatalog {
    /// Catalog with the built-in testcases registered.
    fn default() -> Self {
        let mut catalog = Self::new();
        // Fresh catalog, built-in names cannot collide.
        let _ = catalog.register(Arc::new(builtin::ExecCheck));
        let _ = catalog.register(Arc::new(builtin::SessionCheck));
        catalog
    }
}

/// Attempt to register a testcase under an already-taken name.
#[derive(Debug, Clone)]
pub struct CatalogError {
    pub name: String,
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "testcase '{}' is already registered", self.name)
    }
}

impl std::error::Error for CatalogError {}
