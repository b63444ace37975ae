use async_trait::async_trait;
use okapi_core::discovery::DeploymentDescriptor;
use okapi_core::error::OkapiError;
use okapi_core::module::ModuleDescriptor;
use okapi_core::tenant::Tenant;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Durable storage contract the core touches through: modules, tenants,
/// and deployments loaded wholesale on reload, plus the single monotonic
/// timestamp record that drives cluster sync (spec.md §6, "Persisted
/// timestamp layout"). The core never issues anything finer-grained than
/// these operations — schema, migrations, and connection management are
/// the backend's concern.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_modules(&self) -> Result<Vec<ModuleDescriptor>, OkapiError>;
    async fn put_module(&self, module: &ModuleDescriptor) -> Result<(), OkapiError>;
    async fn delete_module(&self, id: &str) -> Result<(), OkapiError>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, OkapiError>;
    async fn put_tenant(&self, tenant: &Tenant) -> Result<(), OkapiError>;

    async fn list_deployments(&self) -> Result<Vec<DeploymentDescriptor>, OkapiError>;
    async fn put_deployment(&self, deployment: &DeploymentDescriptor) -> Result<(), OkapiError>;
    async fn delete_deployment(&self, inst_id: Uuid) -> Result<(), OkapiError>;

    /// Current value of the named timestamp record, or -1 if never set.
    async fn current_timestamp(&self, key: &str) -> Result<i64, OkapiError>;

    /// Atomically stores a value strictly greater than `current` (and
    /// than any value previously stored for `key`) and returns it
    /// (spec.md §4.6, `advance`).
    async fn advance(&self, key: &str, current: i64) -> Result<i64, OkapiError>;
}

/// In-memory `Store` for tests: no I/O, no ordering surprises, and a
/// single mutex around all state since tests never contend on it.
#[derive(Default)]
pub struct FakeStore {
    inner: Mutex<FakeStoreInner>,
}

#[derive(Default)]
struct FakeStoreInner {
    modules: HashMap<String, ModuleDescriptor>,
    tenants: HashMap<String, Tenant>,
    deployments: HashMap<Uuid, DeploymentDescriptor>,
    timestamps: HashMap<String, i64>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn list_modules(&self) -> Result<Vec<ModuleDescriptor>, OkapiError> {
        Ok(self.inner.lock().unwrap().modules.values().cloned().collect())
    }

    async fn put_module(&self, module: &ModuleDescriptor) -> Result<(), OkapiError> {
        self.inner
            .lock()
            .unwrap()
            .modules
            .insert(module.id.clone(), module.clone());
        Ok(())
    }

    async fn delete_module(&self, id: &str) -> Result<(), OkapiError> {
        self.inner.lock().unwrap().modules.remove(id);
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, OkapiError> {
        Ok(self.inner.lock().unwrap().tenants.values().cloned().collect())
    }

    async fn put_tenant(&self, tenant: &Tenant) -> Result<(), OkapiError> {
        self.inner
            .lock()
            .unwrap()
            .tenants
            .insert(tenant.id.clone(), tenant.clone());
        Ok(())
    }

    async fn list_deployments(&self) -> Result<Vec<DeploymentDescriptor>, OkapiError> {
        Ok(self.inner.lock().unwrap().deployments.values().cloned().collect())
    }

    async fn put_deployment(&self, deployment: &DeploymentDescriptor) -> Result<(), OkapiError> {
        self.inner
            .lock()
            .unwrap()
            .deployments
            .insert(deployment.inst_id, deployment.clone());
        Ok(())
    }

    async fn delete_deployment(&self, inst_id: Uuid) -> Result<(), OkapiError> {
        self.inner.lock().unwrap().deployments.remove(&inst_id);
        Ok(())
    }

    async fn current_timestamp(&self, key: &str) -> Result<i64, OkapiError> {
        Ok(*self.inner.lock().unwrap().timestamps.get(key).unwrap_or(&-1))
    }

    async fn advance(&self, key: &str, current: i64) -> Result<i64, OkapiError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = *inner.timestamps.get(key).unwrap_or(&-1);
        let new_ts = stored.max(current) + 1;
        inner.timestamps.insert(key.to_string(), new_ts);
        Ok(new_ts)
    }
}
