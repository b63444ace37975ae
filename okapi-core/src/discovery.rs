use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A running instance of a module (spec.md §3). One module id may map to
/// many instances; created by deploy, removed by undeploy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    pub inst_id: Uuid,
    pub srvc_id: String,
    pub url: String,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub descriptor: Option<serde_json::Value>,
}

impl DeploymentDescriptor {
    pub fn new(srvc_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            inst_id: Uuid::new_v4(),
            srvc_id: srvc_id.into(),
            url: url.into(),
            node_id: None,
            descriptor: None,
        }
    }
}

/// Maps a module id to its running instances. Writes (deploy/undeploy) are
/// serialized through the store; reads are lock-free copy-on-write
/// snapshots (spec.md §4.4).
pub struct DiscoveryManager {
    inner: ArcSwap<HashMap<String, Vec<DeploymentDescriptor>>>,
}

impl DiscoveryManager {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    /// The pipeline uses the first URL; an empty list signals "no running
    /// instance" (spec.md §4.4 — caller maps this to a 404).
    pub fn resolve(&self, module_id: &str) -> Vec<String> {
        self.inner
            .load()
            .get(module_id)
            .map(|deployments| deployments.iter().map(|d| d.url.clone()).collect())
            .unwrap_or_default()
    }

    pub fn deploy(&self, deployment: DeploymentDescriptor) {
        let snap = self.inner.load();
        let mut next: HashMap<String, Vec<DeploymentDescriptor>> = (**snap).clone();
        next.entry(deployment.srvc_id.clone())
            .or_default()
            .push(deployment);
        self.inner.store(Arc::new(next));
    }

    /// Removes a single instance by `inst_id`. Returns `true` if it was
    /// found.
    pub fn undeploy(&self, module_id: &str, inst_id: Uuid) -> bool {
        let snap = self.inner.load();
        let Some(existing) = snap.get(module_id) else {
            return false;
        };
        let before = existing.len();
        let mut next: HashMap<String, Vec<DeploymentDescriptor>> = (**snap).clone();
        if let Some(list) = next.get_mut(module_id) {
            list.retain(|d| d.inst_id != inst_id);
            let removed = list.len() != before;
            if list.is_empty() {
                next.remove(module_id);
            }
            if removed {
                self.inner.store(Arc::new(next));
            }
            removed
        } else {
            false
        }
    }

    pub fn replace_all(&self, deployments: Vec<DeploymentDescriptor>) {
        let mut next: HashMap<String, Vec<DeploymentDescriptor>> = HashMap::new();
        for d in deployments {
            next.entry(d.srvc_id.clone()).or_default().push(d);
        }
        self.inner.store(Arc::new(next));
    }

    pub fn all(&self) -> Vec<DeploymentDescriptor> {
        self.inner
            .load()
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect()
    }
}

impl Default for DiscoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_empty_for_unknown_module() {
        let d = DiscoveryManager::new();
        assert!(d.resolve("m-ghost").is_empty());
    }

    #[test]
    fn test_deploy_then_resolve_first_wins() {
        let d = DiscoveryManager::new();
        d.deploy(DeploymentDescriptor::new("m-echo", "http://10.0.0.1:9000"));
        d.deploy(DeploymentDescriptor::new("m-echo", "http://10.0.0.2:9000"));
        let urls = d.resolve("m-echo");
        assert_eq!(urls[0], "http://10.0.0.1:9000");
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_undeploy_removes_instance() {
        let d = DiscoveryManager::new();
        let dep = DeploymentDescriptor::new("m-echo", "http://10.0.0.1:9000");
        let inst_id = dep.inst_id;
        d.deploy(dep);
        assert!(d.undeploy("m-echo", inst_id));
        assert!(d.resolve("m-echo").is_empty());
        assert!(!d.undeploy("m-echo", inst_id));
    }
}
