use crate::store::Store;
use okapi_core::catalog::ModuleCatalog;
use okapi_core::discovery::DiscoveryManager;
use okapi_core::error::OkapiError;
use okapi_core::tenant::TenantRegistry;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const TIMESTAMP_KEY: &str = "modules";

/// Publishes and receives the monotonic reload timestamp on the cluster
/// bus topic named in spec.md §4.6 (`okapi.conf.modules`). Grounded on
/// the watcher's crossbeam-channel notify pattern, generalized from a
/// single-process "cache changed" signal to an inter-node broadcast.
pub trait Bus: Send + Sync {
    fn publish(&self, topic: &str, ts: i64) -> Result<(), OkapiError>;
}

/// In-process bus for single-node deployments and tests: publishing
/// fans out to every subscriber registered via `subscribe`.
#[derive(Default)]
pub struct InMemoryBus {
    subscribers: std::sync::Mutex<Vec<crossbeam_channel::Sender<i64>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<i64> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}

impl Bus for InMemoryBus {
    fn publish(&self, _topic: &str, ts: i64) -> Result<(), OkapiError> {
        let subs = self.subscribers.lock().unwrap();
        for sub in subs.iter() {
            let _ = sub.send(ts);
        }
        Ok(())
    }
}

/// Cluster configuration propagation (spec.md §4.6): owns `localTs` and
/// the in-memory snapshots it keeps converged with the store.
pub struct ClusterSync<S: Store, B: Bus> {
    store: Arc<S>,
    bus: Arc<B>,
    topic: String,
    local_ts: AtomicI64,
    catalog: Arc<ModuleCatalog>,
    tenants: Arc<TenantRegistry>,
    discovery: Arc<DiscoveryManager>,
}

impl<S: Store, B: Bus> ClusterSync<S, B> {
    pub fn new(
        store: Arc<S>,
        bus: Arc<B>,
        topic: impl Into<String>,
        catalog: Arc<ModuleCatalog>,
        tenants: Arc<TenantRegistry>,
        discovery: Arc<DiscoveryManager>,
    ) -> Self {
        Self {
            store,
            bus,
            topic: topic.into(),
            local_ts: AtomicI64::new(-1),
            catalog,
            tenants,
            discovery,
        }
    }

    pub fn local_ts(&self) -> i64 {
        self.local_ts.load(Ordering::SeqCst)
    }

    /// The backing store, for admin handlers that need to write through
    /// before calling `record_mutation`.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Loads every module/tenant/deployment from the store and swaps
    /// them into the in-memory snapshots atomically (spec.md §5,
    /// "reload is an atomic swap of the in-memory snapshot").
    pub async fn reload_from_store(&self) -> Result<(), OkapiError> {
        let modules = self.store.list_modules().await?;
        self.catalog.replace_all(modules);

        let tenants = self.store.list_tenants().await?;
        self.tenants.replace_all(tenants);

        let deployments = self.store.list_deployments().await?;
        self.discovery.replace_all(deployments);

        info!("Reloaded catalog/tenants/deployments from store");
        Ok(())
    }

    /// Call after a store write completes: advances the shared
    /// timestamp and publishes it, per spec.md §4.6, "On catalog
    /// mutation".
    pub async fn record_mutation(&self) -> Result<i64, OkapiError> {
        let new_ts = self.store.advance(TIMESTAMP_KEY, self.local_ts()).await?;
        self.local_ts.store(new_ts, Ordering::SeqCst);
        if let Err(e) = self.bus.publish(&self.topic, new_ts) {
            // Bus failures are logged only — the write already landed in
            // the store and will be picked up lazily (spec.md §7).
            warn!(error = %e, "cluster bus publish failed");
        }
        Ok(new_ts)
    }

    /// Handles a bus message carrying `received_ts`. Ignores messages at
    /// or below `localTs` (self-publish, stale redelivery); reloads from
    /// the store on a strictly newer value (spec.md §4.6, §8 invariant 6).
    pub async fn on_bus_message(&self, received_ts: i64) -> Result<(), OkapiError> {
        if received_ts <= self.local_ts() {
            return Ok(());
        }
        self.reload_from_store().await?;
        self.local_ts.store(received_ts, Ordering::SeqCst);
        Ok(())
    }
}
