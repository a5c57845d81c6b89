use std::collections::BTreeMap;

use serde::Deserialize;

use crate::topo::{TopologyError, TopologyErrorKind};

/// Raw topology document as authored, before resolution.
///
/// This is the serde face of the topology YAML. Unknown fields are ignored
/// so documents can carry site-local annotations; referential problems are
/// caught later by [`crate::topo::resolve`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopoSource {
    /// Optional topology name; defaults to "topology" when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Declared devices, in declaration order.
    #[serde(default)]
    pub devices: Vec<DeviceSource>,
    /// Declared links between device endpoints.
    #[serde(default)]
    pub links: Vec<LinkSource>,
}

/// One declared device.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSource {
    pub name: String,
    /// Role tag used for plugin resolution and testcase requirements.
    pub role: String,
    /// Arbitrary scalar attributes (addresses, credentials, vendor data).
    #[serde(default)]
    pub attrs: BTreeMap<String, serde_yaml::Value>,
}

/// One declared link. Endpoints are `device` or `device:interface`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkSource {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_link_kind")]
    pub kind: String,
    pub a: String,
    pub b: String,
}

fn default_link_kind() -> String {
    "ethernet".to_string()
}

impl TopoSource {
    /// Parse a topology document from YAML text.
    ///
    /// # Errors
    ///
    /// Returns a [`TopologyError`] with kind `Syntax` when the document is
    /// not well-formed YAML or does not match the expected shape.
    pub fn from_yaml(text: &str) -> Result<Self, TopologyError> {
        serde_yaml::from_str(text).map_err(|e| {
            TopologyError::new(
                TopologyErrorKind::Syntax,
                format!("malformed topology document: {e}"),
            )
        })
    }
}
