use std::fmt;
use std::sync::Arc;

use crate::testcase::{ParamMap, Testcase};

/// An ordered, fully-resolved execution plan: the unit of work handed to
/// the runner.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// Suite name the plan was built from.
    pub suite: String,
    pub units: Vec<ExecutionUnit>,
    /// Indexes into `units`, grouped into concurrency waves. Sequential
    /// execution ignores this; worker-pool execution runs one wave at a
    /// time.
    pub waves: Vec<Vec<usize>>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// One testcase invocation, immutable once planned.
#[derive(Clone)]
pub struct ExecutionUnit {
    /// Position in the plan, 0-based.
    pub index: usize,
    pub testcase: Arc<dyn Testcase>,
    /// Suite entry this unit came from, 0-based.
    pub entry_index: usize,
    /// Source line of that entry in the suite file.
    pub entry_line: usize,
    /// Data row index for data-driven units.
    pub row: Option<usize>,
    /// Merged parameters: schema defaults < static < data row < overrides.
    pub params: ParamMap,
    pub binding: RoleBinding,
    pub parallel: bool,
}

impl ExecutionUnit {
    /// Human-readable unit name for logs and console output.
    pub fn label(&self) -> String {
        match self.row {
            Some(row) => format!("{} [row {}]", self.testcase.name(), row),
            None => self.testcase.name().to_string(),
        }
    }
}

impl fmt::Debug for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("index", &self.index)
            .field("testcase", &self.testcase.name())
            .field("entry_index", &self.entry_index)
            .field("row", &self.row)
            .field("params", &self.params)
            .field("binding", &self.binding)
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// Devices assigned to each role a testcase asked for, in need order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleBinding {
    assignments: Vec<(String, Vec<String>)>,
}

impl RoleBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, role: &str, devices: Vec<String>) {
        self.assignments.push((role.to_string(), devices));
    }

    /// Device names bound to a role; empty when the role was not required.
    pub fn devices(&self, role: &str) -> &[String] {
        self.assignments
            .iter()
            .find(|(r, _)| r == role)
            .map(|(_, d)| d.as_slice())
            .unwrap_or(&[])
    }

    /// The device in a given slot of a role.
    pub fn device(&self, role: &str, slot: usize) -> Option<&str> {
        self.devices(role).get(slot).map(String::as_str)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(r, _)| r.as_str())
    }

    /// Every bound device name, in assignment order.
    pub fn all_devices(&self) -> Vec<&str> {
        self.assignments
            .iter()
            .flat_map(|(_, devices)| devices.iter().map(String::as_str))
            .collect()
    }

    /// True when the two bindings share no device.
    pub fn is_disjoint(&self, other: &RoleBinding) -> bool {
        let mine = self.all_devices();
        other.all_devices().iter().all(|d| !mine.contains(d))
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
