use std::fmt;
use std::sync::Arc;

use crate::plugin::{ControlMethod, DeviceBehavior, RolePattern};
use crate::topo::Device;

/// Reserved capability name under which device behaviors resolve.
pub const SESSION_CAPABILITY: &str = "session";

struct Registration<P: ?Sized> {
    capability: String,
    pattern: RolePattern,
    implementation: Arc<P>,
}

/// Accumulates plugin registrations during engine startup.
///
/// `build` freezes the set into an immutable [`PluginRegistry`]; there is
/// no way to register after the first execution unit runs.
pub struct RegistryBuilder {
    behaviors: Vec<Registration<dyn DeviceBehavior>>,
    controls: Vec<Registration<dyn ControlMethod>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            behaviors: Vec::new(),
            controls: Vec::new(),
        }
    }

    /// Register a device behavior for a role pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AmbiguousPluginError`] when the pattern already has a
    /// behavior registered.
    pub fn behavior(
        &mut self,
        role_pattern: &str,
        implementation: Arc<dyn DeviceBehavior>,
    ) -> Result<(), AmbiguousPluginError> {
        insert(
            &mut self.behaviors,
            SESSION_CAPABILITY,
            role_pattern,
            implementation,
            false,
        )
    }

    /// Register a device behavior, replacing any earlier registration for
    /// the identical pattern.
    pub fn behavior_override(
        &mut self,
        role_pattern: &str,
        implementation: Arc<dyn DeviceBehavior>,
    ) {
        // Override cannot collide, so the insert is infallible.
        let _ = insert(
            &mut self.behaviors,
            SESSION_CAPABILITY,
            role_pattern,
            implementation,
            true,
        );
    }

    /// Register a control method for a capability and role pattern.
    ///
    /// # Errors
    ///
    /// Returns [`AmbiguousPluginError`] when the (capability, pattern) pair
    /// is already registered.
    pub fn control(
        &mut self,
        capability: &str,
        role_pattern: &str,
        implementation: Arc<dyn ControlMethod>,
    ) -> Result<(), AmbiguousPluginError> {
        insert(
            &mut self.controls,
            capability,
            role_pattern,
            implementation,
            false,
        )
    }

    /// Register a control method, replacing any earlier registration for
    /// the identical (capability, pattern) pair.
    pub fn control_override(
        &mut self,
        capability: &str,
        role_pattern: &str,
        implementation: Arc<dyn ControlMethod>,
    ) {
        let _ = insert(
            &mut self.controls,
            capability,
            role_pattern,
            implementation,
            true,
        );
    }

    /// Freeze the registrations into an immutable registry.
    pub fn build(self) -> PluginRegistry {
        tracing::debug!(
            behaviors = self.behaviors.len(),
            controls = self.controls.len(),
            "plugin registry frozen"
        );
        PluginRegistry {
            behaviors: self.behaviors,
            controls: self.controls,
        }
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn insert<P: ?Sized>(
    entries: &mut Vec<Registration<P>>,
    capability: &str,
    pattern: &str,
    implementation: Arc<P>,
    replace: bool,
) -> Result<(), AmbiguousPluginError> {
    let pattern = RolePattern::new(pattern);
    if let Some(at) = entries
        .iter()
        .position(|r| r.capability == capability && r.pattern == pattern)
    {
        if !replace {
            return Err(AmbiguousPluginError {
                capability: capability.to_string(),
                pattern: pattern.to_string(),
            });
        }
        entries.remove(at);
    }
    entries.push(Registration {
        capability: capability.to_string(),
        pattern,
        implementation,
    });
    Ok(())
}

/// The frozen plugin set: read-only during execution, no locking needed.
///
/// Resolution is most-specific-role-wins. An exact pattern outranks any
/// glob; among globs, more pinned literal characters outranks fewer; two
/// distinct matching patterns of equal rank are a hard error.
pub struct PluginRegistry {
    behaviors: Vec<Registration<dyn DeviceBehavior>>,
    controls: Vec<Registration<dyn ControlMethod>>,
}

impl PluginRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Resolve the behavior that drives the given device.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolutionError`] when no behavior matches the device's
    /// role or the match is ambiguous.
    pub fn behavior_for(&self, device: &Device) -> Result<Arc<dyn DeviceBehavior>, ResolutionError> {
        resolve_in(&self.behaviors, SESSION_CAPABILITY, &device.role)
    }

    /// Resolve the control method implementing a capability for a device.
    ///
    /// # Errors
    ///
    /// As [`Self::behavior_for`], reported with the capability name.
    pub fn control_for(
        &self,
        capability: &str,
        device: &Device,
    ) -> Result<Arc<dyn ControlMethod>, ResolutionError> {
        resolve_in(&self.controls, capability, &device.role)
    }
}

fn resolve_in<P: ?Sized>(
    entries: &[Registration<P>],
    capability: &str,
    role: &str,
) -> Result<Arc<P>, ResolutionError> {
    let mut best: Vec<&Registration<P>> = Vec::new();
    let mut best_rank = None;
    for reg in entries {
        if reg.capability != capability || !reg.pattern.matches(role) {
            continue;
        }
        let rank = reg.pattern.rank();
        match best_rank {
            None => {
                best_rank = Some(rank);
                best.push(reg);
            }
            Some(current) if rank > current => {
                best_rank = Some(rank);
                best.clear();
                best.push(reg);
            }
            Some(current) if rank == current => best.push(reg),
            Some(_) => {}
        }
    }
    match best.as_slice() {
        [] => Err(ResolutionError {
            kind: ResolutionErrorKind::NoMatch,
            capability: capability.to_string(),
            role: role.to_string(),
            detail: None,
        }),
        [only] => Ok(Arc::clone(&only.implementation)),
        several => Err(ResolutionError {
            kind: ResolutionErrorKind::Ambiguous,
            capability: capability.to_string(),
            role: role.to_string(),
            detail: Some(
                several
                    .iter()
                    .map(|r| r.pattern.to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        }),
    }
}

/// Registration rejected because the (capability, role pattern) pair is
/// already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousPluginError {
    pub capability: String,
    pub pattern: String,
}

impl fmt::Display for AmbiguousPluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "capability '{}' already has a registration for role pattern '{}'",
            self.capability, self.pattern
        )
    }
}

impl std::error::Error for AmbiguousPluginError {}

/// The registry cannot uniquely satisfy a capability for a device role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionError {
    pub kind: ResolutionErrorKind,
    pub capability: String,
    pub role: String,
    /// For ambiguity: the tied patterns.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionErrorKind {
    NoMatch,
    Ambiguous,
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ResolutionErrorKind::NoMatch => write!(
                f,
                "no plugin for capability '{}' matches role '{}'",
                self.capability, self.role
            ),
            ResolutionErrorKind::Ambiguous => {
                write!(
                    f,
                    "capability '{}' is ambiguous for role '{}'",
                    self.capability, self.role
                )?;
                if let Some(patterns) = &self.detail {
                    write!(f, " (tied patterns: {patterns})")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ResolutionError {}
