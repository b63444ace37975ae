use crate::handlers;
use okapi_core::config::AdminConfig;
use okapi_core::discovery::DiscoveryManager;
use okapi_core::catalog::ModuleCatalog;
use okapi_core::tenant::TenantRegistry;
use okapi_store::{Bus, ClusterSync, Store};
use axum::routing::{delete, get, post, put};
use axum::Router as AxumRouter;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

/// State shared by every admin handler. Generic over the store/bus pair
/// so tests can run against `FakeStore`/`InMemoryBus` while production
/// wires in `PostgresStore`/a real bus (spec.md §6, "out of scope ...
/// the HTTP façade for CRUD on modules/tenants/deployments" — the
/// façade itself is in scope, only its *backends* are pluggable).
pub struct AdminState<S: Store, B: Bus> {
    pub catalog: Arc<ModuleCatalog>,
    pub tenants: Arc<TenantRegistry>,
    pub discovery: Arc<DiscoveryManager>,
    pub sync: Arc<ClusterSync<S, B>>,
}

/// Builds the router without binding a socket, so tests can drive it with
/// `tower::ServiceExt::oneshot`.
pub fn build_admin_router<S, B>(state: Arc<AdminState<S, B>>, cors_origins: &[String]) -> AxumRouter
where
    S: Store + Send + Sync + 'static,
    B: Bus + Send + Sync + 'static,
{
    let cors = if cors_origins.is_empty() {
        CorsLayer::new()
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    AxumRouter::new()
        .route("/health", get(handlers::health::health_check))
        .route("/_/proxy/modules", get(handlers::modules::list_modules))
        .route("/_/proxy/modules", post(handlers::modules::create_module))
        .route("/_/proxy/modules/{id}", get(handlers::modules::get_module))
        .route("/_/proxy/modules/{id}", put(handlers::modules::update_module))
        .route("/_/proxy/modules/{id}", delete(handlers::modules::delete_module))
        .route("/_/proxy/tenants", get(handlers::tenants::list_tenants))
        .route(
            "/_/proxy/tenants/{id}/modules",
            post(handlers::tenants::enable_module),
        )
        .route(
            "/_/proxy/tenants/{id}/modules/{module_id}",
            delete(handlers::tenants::disable_module),
        )
        .route(
            "/_/discovery/modules",
            get(handlers::deployments::list_deployments),
        )
        .route(
            "/_/discovery/modules/{id}",
            post(handlers::deployments::deploy),
        )
        .route(
            "/_/discovery/modules/{id}/{inst_id}",
            delete(handlers::deployments::undeploy),
        )
        .layer(cors)
        .with_state(state)
}

/// Starts the admin API on its own tokio runtime thread, independent of
/// the monoio data plane (spec.md §2, "a separate axum/tokio thread").
pub async fn start_admin<S, B>(
    config: AdminConfig,
    state: Arc<AdminState<S, B>>,
) -> anyhow::Result<()>
where
    S: Store + Send + Sync + 'static,
    B: Bus + Send + Sync + 'static,
{
    if !config.enabled {
        info!("admin API disabled");
        return Ok(());
    }
    let app = build_admin_router(state, &config.cors_origins);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "admin API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
