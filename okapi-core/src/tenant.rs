use crate::catalog::ModuleCatalog;
use crate::error::OkapiError;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A namespace owning a subset of enabled modules (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    #[serde(default)]
    pub enabled: HashSet<String>,
}

impl Tenant {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: HashSet::new(),
        }
    }
}

/// Per-tenant set of enabled module ids.
pub struct TenantRegistry {
    inner: ArcSwap<HashMap<String, Arc<Tenant>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self {
            inner: ArcSwap::new(Arc::new(HashMap::new())),
        }
    }

    pub fn get(&self, tenant_id: &str) -> Option<Arc<Tenant>> {
        self.inner.load().get(tenant_id).cloned()
    }

    pub fn is_enabled(&self, tenant_id: &str, module_id: &str) -> bool {
        self.get(tenant_id)
            .map(|t| t.enabled.contains(module_id))
            .unwrap_or(false)
    }

    /// Enables `module_id` for `tenant_id`. The module must exist in
    /// `catalog` at enable time — the invariant is checked here and not
    /// re-checked per request (spec.md §3).
    pub fn enable(
        &self,
        tenant_id: &str,
        module_id: &str,
        catalog: &ModuleCatalog,
    ) -> Result<(), OkapiError> {
        if !catalog.contains(module_id) {
            return Err(OkapiError::NotFound(format!(
                "module '{}' does not exist",
                module_id
            )));
        }
        let snap = self.inner.load();
        let mut next: HashMap<String, Arc<Tenant>> = (**snap).clone();
        let mut tenant = next
            .get(tenant_id)
            .map(|t| (**t).clone())
            .unwrap_or_else(|| Tenant::new(tenant_id));
        tenant.enabled.insert(module_id.to_string());
        next.insert(tenant_id.to_string(), Arc::new(tenant));
        self.inner.store(Arc::new(next));
        Ok(())
    }

    pub fn disable(&self, tenant_id: &str, module_id: &str) -> Result<(), OkapiError> {
        let snap = self.inner.load();
        let Some(existing) = snap.get(tenant_id) else {
            return Err(OkapiError::NotFound(format!(
                "tenant '{}' not found",
                tenant_id
            )));
        };
        let mut tenant = (**existing).clone();
        tenant.enabled.remove(module_id);
        let mut next: HashMap<String, Arc<Tenant>> = (**snap).clone();
        next.insert(tenant_id.to_string(), Arc::new(tenant));
        self.inner.store(Arc::new(next));
        Ok(())
    }

    pub fn replace_all(&self, tenants: Vec<Tenant>) {
        let next: HashMap<String, Arc<Tenant>> = tenants
            .into_iter()
            .map(|t| (t.id.clone(), Arc::new(t)))
            .collect();
        self.inner.store(Arc::new(next));
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}
