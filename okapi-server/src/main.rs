// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Okapi — multi-tenant API gateway
//
//  Architecture: monoio thread-per-core data plane
//  Admin API:    axum on a dedicated tokio thread
//  Config:       YAML file + OKAPI_-prefixed env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use okapi_admin::server::AdminState;
use okapi_core::catalog::ModuleCatalog;
use okapi_core::config::OkapiConfig;
use okapi_core::discovery::DiscoveryManager;
use okapi_core::tenant::TenantRegistry;
use okapi_proxy::worker::{self, SharedState};
use okapi_store::{ClusterSync, InMemoryBus, PostgresStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "okapi", version, about = "Okapi — multi-tenant API gateway")]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG if set.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Okapi starting");

    let config = OkapiConfig::load(cli.config.as_deref().and_then(|p| p.to_str()))?;
    let num_workers = config.effective_workers();
    info!(workers = num_workers, "worker count");

    let config = Arc::new(config);

    let catalog = Arc::new(ModuleCatalog::new());
    let tenants = Arc::new(TenantRegistry::new());
    let discovery = Arc::new(DiscoveryManager::new());

    // ── Store + cluster sync ──
    let tokio_rt = tokio::runtime::Runtime::new()?;
    let (bus, sync) = tokio_rt.block_on(async {
        let pg_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            config.postgres.username,
            config.postgres.password,
            config.postgres.host,
            config.postgres.port,
            config.postgres.database,
        );
        let store = Arc::new(PostgresStore::connect(&pg_url).await?);
        if config.postgres.db_init {
            info!("initializing postgres schema");
            store.init_schema().await?;
        }
        let bus = Arc::new(InMemoryBus::new());
        let sync = Arc::new(ClusterSync::new(
            store,
            Arc::clone(&bus),
            config.cluster.topic.clone(),
            Arc::clone(&catalog),
            Arc::clone(&tenants),
            Arc::clone(&discovery),
        ));
        sync.reload_from_store().await?;
        Ok::<_, anyhow::Error>((bus, sync))
    })?;

    let bus_receiver = bus.subscribe();
    let bus_handle = worker::spawn_bus_listener(Arc::clone(&sync), bus_receiver);

    // ── Admin API on its own tokio thread ──
    let admin_config = config.admin.clone();
    if admin_config.enabled {
        let admin_state = Arc::new(AdminState {
            catalog: Arc::clone(&catalog),
            tenants: Arc::clone(&tenants),
            discovery: Arc::clone(&discovery),
            sync: Arc::clone(&sync),
        });
        std::thread::Builder::new()
            .name("okapi-admin".to_string())
            .spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed to build tokio runtime for admin");
                rt.block_on(async {
                    if let Err(e) = okapi_admin::start_admin(admin_config, admin_state).await {
                        tracing::error!(error = %e, "admin API failed");
                    }
                });
            })
            .expect("failed to spawn admin thread");
        info!(addr = %config.admin.addr, "admin API started");
    }

    // ── Monoio worker threads (data plane) ──
    let shared = SharedState::new(
        Arc::clone(&catalog),
        Arc::clone(&tenants),
        Arc::clone(&discovery),
        Arc::clone(&config),
    );
    let worker_handles = worker::spawn_workers(Arc::clone(&shared), num_workers);

    info!(
        workers = num_workers,
        proxy_addr = %config.proxy.http_addr,
        admin_addr = %config.admin.addr,
        "Okapi is ready — serving traffic"
    );

    setup_signal_handler();
    while !SHUTDOWN.load(Ordering::Relaxed) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    info!("shutdown signal received, stopping");
    drop(worker_handles);
    drop(bus_handle);

    info!("Okapi stopped");
    Ok(())
}

fn setup_signal_handler() {
    for sig in [libc::SIGTERM, libc::SIGINT] {
        unsafe {
            libc::signal(sig, signal_handler as libc::sighandler_t);
        }
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::Relaxed);
}
