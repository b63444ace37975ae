use crate::error::OkapiError;
use crate::route::RoutingEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

fn id_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9._-]+$").unwrap())
}

/// One API an interface (or a module's top level) exposes, with its own
/// routing entries. `interfaceType` is `"proxy"` (participates in request
/// pipelines) or `"system"` (internal, never matched against client
/// requests).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interface {
    pub id: String,

    #[serde(default)]
    pub version: String,

    #[serde(default = "default_interface_type")]
    pub interface_type: String,

    #[serde(default)]
    pub routing_entries: Vec<RoutingEntry>,
}

fn default_interface_type() -> String {
    "proxy".to_string()
}

impl Interface {
    pub fn is_proxy(&self) -> bool {
        self.interface_type == "proxy"
    }

    fn validate(&self) -> Result<(), OkapiError> {
        if self.id.is_empty() {
            return Err(OkapiError::User(
                "interface id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// An upstream HTTP service description: id, interfaces it requires/
/// provides, and the routing entries that select requests for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub requires: Vec<InterfaceRef>,

    #[serde(default)]
    pub provides: Vec<Interface>,

    /// Deprecated top-level routing entries, kept for modules that predate
    /// the `provides` interface list.
    #[serde(default)]
    pub routing_entries: Vec<RoutingEntry>,

    #[serde(default)]
    pub filters: Vec<RoutingEntry>,

    #[serde(default)]
    pub launch_descriptor: Option<serde_json::Value>,

    #[serde(default)]
    pub ui_descriptor: Option<serde_json::Value>,
}

/// A reference to a required interface: id and an optional version range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRef {
    pub id: String,
    #[serde(default)]
    pub version: String,
}

impl ModuleDescriptor {
    /// Validates the id pattern and every provided interface.
    pub fn validate(&self) -> Result<(), OkapiError> {
        if self.id.is_empty() || !id_pattern().is_match(&self.id) {
            return Err(OkapiError::User(format!(
                "module id '{}' must be non-empty and match [a-z0-9._-]+",
                self.id
            )));
        }
        for iface in &self.provides {
            iface.validate()?;
        }
        Ok(())
    }

    /// Every routing entry through which this module participates in a
    /// pipeline: top-level (deprecated) entries, filters, and proxy-typed
    /// provided-interface entries. System interfaces are excluded — they
    /// are never matched against client requests.
    pub fn proxy_routing_entries(&self) -> Vec<&RoutingEntry> {
        let mut entries: Vec<&RoutingEntry> = Vec::new();
        entries.extend(self.routing_entries.iter());
        entries.extend(self.filters.iter());
        for iface in &self.provides {
            if iface.is_proxy() {
                entries.extend(iface.routing_entries.iter());
            }
        }
        entries
    }
}
