use crate::pool::ConnPool;
use okapi_core::config::OkapiConfig;
use okapi_core::discovery::DiscoveryManager;
use okapi_core::catalog::ModuleCatalog;
use okapi_core::tenant::TenantRegistry;
use okapi_store::{Bus, ClusterSync, Store};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{error, info};

/// Shared across every worker thread. `catalog`/`tenants`/`discovery`
/// are each internally copy-on-write (spec.md §4.4), so no outer
/// ArcSwap is needed here — only the `Arc` to share the same instance
/// across threads.
pub struct SharedState {
    pub catalog: Arc<ModuleCatalog>,
    pub tenants: Arc<TenantRegistry>,
    pub discovery: Arc<DiscoveryManager>,
    pub config: Arc<OkapiConfig>,
}

impl SharedState {
    pub fn new(
        catalog: Arc<ModuleCatalog>,
        tenants: Arc<TenantRegistry>,
        discovery: Arc<DiscoveryManager>,
        config: Arc<OkapiConfig>,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            tenants,
            discovery,
            config,
        })
    }
}

/// Spawns one monoio worker thread per core, each with its own runtime,
/// listener (`SO_REUSEPORT`) and connection pool (spec.md §5 — "thread
/// per core", "components not reentrant across loops").
pub fn spawn_workers(shared: Arc<SharedState>, num_workers: usize) -> Vec<std::thread::JoinHandle<()>> {
    let addr = shared.config.proxy.http_addr;
    let mut handles = Vec::with_capacity(num_workers);

    for worker_id in 0..num_workers {
        let shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name(format!("okapi-worker-{}", worker_id))
            .spawn(move || {
                let mut rt = monoio::RuntimeBuilder::<monoio::FusionDriver>::new()
                    .enable_all()
                    .build()
                    .expect("failed to build monoio runtime");
                rt.block_on(worker_loop(worker_id, shared, addr));
            })
            .expect("failed to spawn worker thread");
        handles.push(handle);
    }

    info!(workers = num_workers, %addr, "workers spawned");
    handles
}

async fn worker_loop(worker_id: usize, shared: Arc<SharedState>, addr: std::net::SocketAddr) {
    use monoio::net::TcpListener;

    let listener = TcpListener::bind(addr).unwrap_or_else(|e| {
        panic!("worker {} failed to bind to {}: {}", worker_id, addr, e);
    });
    info!(worker = worker_id, %addr, "worker listening");

    let conn_pool = Rc::new(RefCell::new(ConnPool::new(32)));

    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let _ = stream.set_nodelay(true);
                let shared = Arc::clone(&shared);
                let pool = Rc::clone(&conn_pool);
                monoio::spawn(async move {
                    if let Err(e) = crate::connection::handle_connection(stream, peer_addr, shared, pool).await {
                        tracing::debug!(error = %e, "connection closed");
                    }
                });
            }
            Err(e) => {
                error!(worker = worker_id, error = %e, "accept error");
            }
        }
    }
}

/// Runs on a dedicated thread, blocking on the cluster bus's local
/// subscription and replaying every message into `ClusterSync`
/// (spec.md §4.6). Mirrors the store watcher pattern: one thread, one
/// channel, no polling.
pub fn spawn_bus_listener<S, B>(
    sync: Arc<ClusterSync<S, B>>,
    receiver: crossbeam_channel::Receiver<i64>,
) -> std::thread::JoinHandle<()>
where
    S: Store + Send + Sync + 'static,
    B: Bus + Send + Sync + 'static,
{
    std::thread::Builder::new()
        .name("okapi-bus-listener".to_string())
        .spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build bus listener runtime");
            for received_ts in receiver.iter() {
                rt.block_on(sync.on_bus_message(received_ts));
            }
        })
        .expect("failed to spawn bus listener thread")
}
