//! Suite planning: merge a suite, a topology, and optional data files into
//! an ordered execution plan.
//!
//! Planning fails fast. The first unsatisfiable entry aborts with the
//! entry index, suite line, and reason; a partial plan is never returned.

pub mod types;

pub use types::{ExecutionPlan, ExecutionUnit, RoleBinding};

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::data::{self, DataRow};
use crate::suite::Suite;
use crate::testcase::{ParamMap, ParamSchema, TestcaseCatalog, TopologyNeeds};
use crate::topo::Topology;

/// How eligible devices are picked for a role need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssignmentPolicy {
    /// First eligible device in topology declaration order.
    #[default]
    FirstFit,
    /// Rotate the starting device per emitted unit. Spreads load across
    /// interchangeable devices while staying deterministic.
    RoundRobin,
}

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Directory data-file references resolve against (the suite file's
    /// directory, usually). Absolute references ignore it.
    pub base_dir: Option<PathBuf>,
    pub assignment: AssignmentPolicy,
    /// Parameters that win over both static and row values.
    pub overrides: ParamMap,
}

/// Plans with default options.
///
/// # Errors
///
/// Returns a [`PlanError`] naming the first unsatisfiable entry.
pub fn plan(
    suite: &Suite,
    topology: &Topology,
    catalog: &TestcaseCatalog,
) -> Result<ExecutionPlan, PlanError> {
    plan_with(suite, topology, catalog, &PlanOptions::default())
}

/// Builds the execution plan: entries in declaration order, one unit per
/// data row (file order) or one unit for a plain entry.
///
/// # Errors
///
/// As [`plan`].
pub fn plan_with(
    suite: &Suite,
    topology: &Topology,
    catalog: &TestcaseCatalog,
    options: &PlanOptions,
) -> Result<ExecutionPlan, PlanError> {
    let mut units: Vec<ExecutionUnit> = Vec::new();
    let mut rotation: usize = 0;

    for (entry_index, entry) in suite.entries.iter().enumerate() {
        let line = entry.span.line;
        let testcase = catalog.get(&entry.testcase).ok_or_else(|| {
            PlanError::at(
                PlanErrorKind::UnknownTestcase,
                entry_index,
                line,
                format!("unknown testcase '{}'", entry.testcase),
            )
        })?;
        let needs = testcase.needs();
        let schema = testcase.schema();

        let rows: Option<Vec<DataRow>> = match &entry.data {
            Some(reference) => {
                let path = resolve_data_path(reference, options.base_dir.as_deref());
                let table = data::load_table(&path).map_err(|e| {
                    PlanError::at(PlanErrorKind::Data, entry_index, line, e.to_string())
                        .with_detail(path.display().to_string())
                })?;
                let expanded = data::expand(&table, &schema).map_err(|e| {
                    PlanError::at(PlanErrorKind::Data, entry_index, line, e.to_string())
                        .with_detail(path.display().to_string())
                })?;
                Some(expanded)
            }
            None => None,
        };

        let emit = |row: Option<&DataRow>,
                    units: &mut Vec<ExecutionUnit>,
                    rotation: &mut usize|
         -> Result<(), PlanError> {
            let binding =
                assign_devices(&needs, topology, options.assignment, *rotation).map_err(
                    |reason| PlanError::at(PlanErrorKind::Topology, entry_index, line, reason),
                )?;
            check_links(&needs, &binding, topology).map_err(|reason| {
                PlanError::at(PlanErrorKind::Topology, entry_index, line, reason)
            })?;
            let params = merge_params(
                &schema,
                &entry.params,
                row.map(|r| &r.values),
                &options.overrides,
            )
            .map_err(|violation| {
                PlanError::at(
                    PlanErrorKind::Parameter,
                    entry_index,
                    line,
                    violation.to_string(),
                )
            })?;

            units.push(ExecutionUnit {
                index: units.len(),
                testcase: Arc::clone(&testcase),
                entry_index,
                entry_line: line,
                row: row.map(|r| r.index),
                params,
                binding,
                parallel: entry.parallel,
            });
            *rotation += 1;
            Ok(())
        };

        match &rows {
            Some(expanded) => {
                for row in expanded {
                    emit(Some(row), &mut units, &mut rotation)?;
                }
            }
            None => emit(None, &mut units, &mut rotation)?,
        }
    }

    let waves = compute_waves(&units);
    tracing::debug!(
        suite = %suite.name,
        units = units.len(),
        waves = waves.len(),
        "execution plan built"
    );

    Ok(ExecutionPlan {
        suite: suite.name.clone(),
        units,
        waves,
    })
}

fn resolve_data_path(reference: &Path, base: Option<&Path>) -> PathBuf {
    match base {
        Some(base) if reference.is_relative() => base.join(reference),
        _ => reference.to_path_buf(),
    }
}

/// Picks devices for every role need. Devices are never shared between
/// roles of one unit.
fn assign_devices(
    needs: &TopologyNeeds,
    topology: &Topology,
    policy: AssignmentPolicy,
    rotation: usize,
) -> Result<RoleBinding, String> {
    let mut binding = RoleBinding::new();
    let mut taken: HashSet<&str> = HashSet::new();

    for need in &needs.roles {
        if need.count == 0 {
            binding.assign(&need.role, Vec::new());
            continue;
        }

        let eligible: Vec<&crate::topo::Device> =
            topology.devices_with_role(&need.role).collect();
        let available = eligible
            .iter()
            .filter(|d| !taken.contains(d.name.as_str()))
            .count();
        let offset = match policy {
            AssignmentPolicy::FirstFit => 0,
            AssignmentPolicy::RoundRobin if eligible.is_empty() => 0,
            AssignmentPolicy::RoundRobin => rotation % eligible.len(),
        };

        let mut chosen = Vec::with_capacity(need.count);
        for i in 0..eligible.len() {
            let device = eligible[(offset + i) % eligible.len()];
            if taken.contains(device.name.as_str()) {
                continue;
            }
            taken.insert(device.name.as_str());
            chosen.push(device.name.clone());
            if chosen.len() == need.count {
                break;
            }
        }
        if chosen.len() < need.count {
            return Err(format!(
                "role '{}' needs {} device(s), {} available",
                need.role, need.count, available
            ));
        }
        binding.assign(&need.role, chosen);
    }
    Ok(binding)
}

fn check_links(
    needs: &TopologyNeeds,
    binding: &RoleBinding,
    topology: &Topology,
) -> Result<(), String> {
    for link in &needs.links {
        let a_devices = binding.devices(&link.a);
        let b_devices = binding.devices(&link.b);
        if a_devices.is_empty() || b_devices.is_empty() {
            return Err(format!(
                "link need '{}'-'{}' references an unassigned role",
                link.a, link.b
            ));
        }
        let connected = a_devices
            .iter()
            .any(|a| b_devices.iter().any(|b| a != b && topology.linked(a, b)));
        if !connected {
            return Err(format!(
                "no link between role '{}' ({}) and role '{}' ({})",
                link.a,
                a_devices.join(", "),
                link.b,
                b_devices.join(", ")
            ));
        }
    }
    Ok(())
}

/// Merge precedence: schema defaults < static entry params < data row <
/// overrides. Validation fills defaults last, so an explicit value at any
/// level beats a default.
fn merge_params(
    schema: &ParamSchema,
    statics: &ParamMap,
    row: Option<&ParamMap>,
    overrides: &ParamMap,
) -> Result<ParamMap, crate::testcase::SchemaViolation> {
    let mut merged = statics.clone();
    if let Some(row) = row {
        for (key, value) in row {
            merged.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    schema.validate(&merged)
}

/// Groups consecutive parallel-safe, pairwise device-disjoint units into
/// waves. Everything else runs alone.
fn compute_waves(units: &[ExecutionUnit]) -> Vec<Vec<usize>> {
    let mut waves: Vec<Vec<usize>> = Vec::new();
    for unit in units {
        if unit.parallel
            && let Some(last) = waves.last_mut()
            && last
                .iter()
                .all(|&i| units[i].parallel && units[i].binding.is_disjoint(&unit.binding))
        {
            last.push(unit.index);
            continue;
        }
        waves.push(vec![unit.index]);
    }
    waves
}

/// Planning failed; no partial plan exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanError {
    pub kind: PlanErrorKind,
    /// 0-based suite entry index, when the failure is entry-scoped.
    pub entry: Option<usize>,
    /// Source line of that entry in the suite file.
    pub line: Option<usize>,
    pub message: String,
    pub detail: Option<String>,
}

impl PlanError {
    fn at(kind: PlanErrorKind, entry: usize, line: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            entry: Some(entry),
            line: Some(line),
            message: message.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanErrorKind {
    UnknownTestcase,
    Topology,
    Parameter,
    Data,
}

impl fmt::Display for PlanErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PlanErrorKind::UnknownTestcase => "unknown testcase",
            PlanErrorKind::Topology => "unmet topology requirement",
            PlanErrorKind::Parameter => "parameter mismatch",
            PlanErrorKind::Data => "data error",
        };
        write!(f, "{text}")
    }
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(line) = self.line {
            write!(f, " (suite line {line})")?;
        }
        Ok(())
    }
}

impl std::error::Error for PlanError {}
