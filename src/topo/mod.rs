pub mod source;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use petgraph::graph::{NodeIndex, UnGraph};

pub use source::{DeviceSource, LinkSource, TopoSource};

/// A resolved device: identity, role tag, and scalar attributes.
///
/// Devices are immutable once resolved. Execution units refer to them by
/// name and never own them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub role: String,
    pub attrs: BTreeMap<String, String>,
}

impl Device {
    /// Look up an attribute value.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

/// One side of a link: a device name plus an optional interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub device: String,
    pub interface: Option<String>,
}

impl Endpoint {
    /// Parse `device` or `device:interface` endpoint syntax.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((device, interface)) => Self {
                device: device.to_string(),
                interface: Some(interface.to_string()),
            },
            None => Self {
                device: raw.to_string(),
                interface: None,
            },
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.interface {
            Some(iface) => write!(f, "{}:{}", self.device, iface),
            None => write!(f, "{}", self.device),
        }
    }
}

/// A typed link between two device endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: Option<String>,
    pub kind: String,
    pub a: Endpoint,
    pub b: Endpoint,
}

/// A resolved topology: devices, links, and the connectivity graph.
///
/// Construction goes through [`resolve`]; a `Topology` is never mutated
/// afterwards. Devices keep their declaration order, which planning relies
/// on for deterministic assignment.
#[derive(Debug, Clone)]
pub struct Topology {
    name: String,
    devices: Vec<Device>,
    links: Vec<Link>,
    index: HashMap<String, usize>,
    graph: UnGraph<usize, usize>,
    nodes: Vec<NodeIndex>,
}

impl Topology {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All devices in declaration order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Look up a device by name.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.index.get(name).map(|&i| &self.devices[i])
    }

    /// Devices carrying the given role, in declaration order.
    pub fn devices_with_role<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a Device> {
        self.devices.iter().filter(move |d| d.role == role)
    }

    /// Devices directly linked to the named device, in declaration order.
    pub fn neighbors(&self, name: &str) -> Vec<&Device> {
        let Some(&idx) = self.index.get(name) else {
            return Vec::new();
        };
        let mut found: Vec<usize> = self
            .graph
            .neighbors(self.nodes[idx])
            .map(|n| self.graph[n])
            .collect();
        found.sort_unstable();
        found.dedup();
        found.into_iter().map(|i| &self.devices[i]).collect()
    }

    /// Whether any link connects the two named devices.
    pub fn linked(&self, a: &str, b: &str) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(&ia), Some(&ib)) => self
                .graph
                .find_edge(self.nodes[ia], self.nodes[ib])
                .is_some(),
            _ => false,
        }
    }

    /// All links between two named devices, in declaration order.
    pub fn links_between(&self, a: &str, b: &str) -> Vec<&Link> {
        let (Some(&ia), Some(&ib)) = (self.index.get(a), self.index.get(b)) else {
            return Vec::new();
        };
        let mut found: Vec<usize> = self
            .graph
            .edges_connecting(self.nodes[ia], self.nodes[ib])
            .map(|e| *e.weight())
            .collect();
        found.sort_unstable();
        found.into_iter().map(|i| &self.links[i]).collect()
    }
}

impl PartialEq for Topology {
    fn eq(&self, other: &Self) -> bool {
        // The graph is derived state; structural equality is devices + links.
        self.name == other.name && self.devices == other.devices && self.links == other.links
    }
}

/// Required attribute names per device role.
///
/// The default catalog requires nothing; the CLI populates it from the
/// behaviors it registers so that, for example, REST-driven roles must
/// declare a `base_url`.
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    required: BTreeMap<String, Vec<String>>,
}

impl RoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add required attributes for a role. Chainable.
    pub fn require(mut self, role: &str, attrs: &[&str]) -> Self {
        let entry = self.required.entry(role.to_string()).or_default();
        for attr in attrs {
            if !entry.iter().any(|a| a == attr) {
                entry.push((*attr).to_string());
            }
        }
        self
    }

    /// Attributes required for the given role; empty for unknown roles.
    pub fn required_for(&self, role: &str) -> &[String] {
        self.required.get(role).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Resolve a topology source with no role attribute requirements.
///
/// Pure transform: no partial topologies are produced on failure.
///
/// # Errors
///
/// Returns a [`TopologyError`] for duplicate device names, link endpoints
/// referencing undeclared devices, or non-scalar attribute values.
pub fn resolve(source: &TopoSource) -> Result<Topology, TopologyError> {
    resolve_with(source, &RoleCatalog::default())
}

/// Resolve a topology source, enforcing the catalog's per-role required
/// attributes.
///
/// # Errors
///
/// As [`resolve`], plus `MissingAttribute` when a device lacks an attribute
/// its role requires.
pub fn resolve_with(source: &TopoSource, roles: &RoleCatalog) -> Result<Topology, TopologyError> {
    let name = source
        .name
        .clone()
        .unwrap_or_else(|| "topology".to_string());

    let mut devices = Vec::with_capacity(source.devices.len());
    let mut index = HashMap::with_capacity(source.devices.len());
    for decl in &source.devices {
        if index.contains_key(&decl.name) {
            return Err(TopologyError::new(
                TopologyErrorKind::DuplicateDevice,
                format!("device '{}' is declared more than once", decl.name),
            ));
        }
        let mut attrs = BTreeMap::new();
        for (key, value) in &decl.attrs {
            let Some(text) = scalar_to_string(value) else {
                return Err(TopologyError::new(
                    TopologyErrorKind::InvalidAttribute,
                    format!(
                        "device '{}' attribute '{}' must be a scalar value",
                        decl.name, key
                    ),
                ));
            };
            attrs.insert(key.clone(), text);
        }
        for required in roles.required_for(&decl.role) {
            if !attrs.contains_key(required) {
                return Err(TopologyError::new(
                    TopologyErrorKind::MissingAttribute,
                    format!(
                        "device '{}' (role '{}') is missing required attribute '{}'",
                        decl.name, decl.role, required
                    ),
                ));
            }
        }
        index.insert(decl.name.clone(), devices.len());
        devices.push(Device {
            name: decl.name.clone(),
            role: decl.role.clone(),
            attrs,
        });
    }

    let mut links = Vec::with_capacity(source.links.len());
    for (pos, decl) in source.links.iter().enumerate() {
        let a = Endpoint::parse(&decl.a);
        let b = Endpoint::parse(&decl.b);
        for endpoint in [&a, &b] {
            if !index.contains_key(&endpoint.device) {
                return Err(TopologyError::new(
                    TopologyErrorKind::UnknownDevice,
                    format!(
                        "link {} endpoint '{}' references unknown device '{}'",
                        pos + 1,
                        endpoint,
                        endpoint.device
                    ),
                ));
            }
        }
        links.push(Link {
            name: decl.name.clone(),
            kind: decl.kind.clone(),
            a,
            b,
        });
    }

    let mut graph = UnGraph::with_capacity(devices.len(), links.len());
    let nodes: Vec<NodeIndex> = (0..devices.len()).map(|i| graph.add_node(i)).collect();
    for (pos, link) in links.iter().enumerate() {
        let ia = index[&link.a.device];
        let ib = index[&link.b.device];
        graph.add_edge(nodes[ia], nodes[ib], pos);
    }

    tracing::debug!(
        topology = %name,
        devices = devices.len(),
        links = links.len(),
        "topology resolved"
    );

    Ok(Topology {
        name,
        devices,
        links,
        index,
        graph,
        nodes,
    })
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Error raised while resolving a topology source.
#[derive(Debug, Clone)]
pub struct TopologyError {
    pub kind: TopologyErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl TopologyError {
    pub fn new(kind: TopologyErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TopologyError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyErrorKind {
    Syntax,
    DuplicateDevice,
    UnknownDevice,
    MissingAttribute,
    InvalidAttribute,
}

impl fmt::Display for TopologyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TopologyErrorKind::Syntax => "syntax error",
            TopologyErrorKind::DuplicateDevice => "duplicate device",
            TopologyErrorKind::UnknownDevice => "unknown device",
            TopologyErrorKind::MissingAttribute => "missing attribute",
            TopologyErrorKind::InvalidAttribute => "invalid attribute",
        };
        write!(f, "{text}")
    }
}
