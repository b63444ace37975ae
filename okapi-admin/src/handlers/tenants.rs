use crate::server::AdminState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use okapi_core::error::OkapiError;
use okapi_core::tenant::Tenant;
use okapi_store::{Bus, Store};
use serde_json::{json, Value};
use std::sync::Arc;

fn status_for(err: &OkapiError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// GET /_/proxy/tenants
pub async fn list_tenants<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let tenants = state
        .sync
        .store()
        .list_tenants()
        .await
        .map_err(|e| (status_for(&e), Json(json!({"error": e.to_string()}))))?;
    Ok(Json(json!(tenants)))
}

/// POST /_/proxy/tenants/:id/modules — body `{"id": "<module id>"}`.
pub async fn enable_module<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
    Path(tenant_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(module_id) = body.get("id").and_then(Value::as_str) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing module id"})),
        );
    };
    if !state.catalog.contains(module_id) {
        let e = OkapiError::NotFound(format!("module '{}' does not exist", module_id));
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }

    let mut tenant: Tenant = state
        .tenants
        .get(&tenant_id)
        .map(|t| (*t).clone())
        .unwrap_or_else(|| Tenant::new(&tenant_id));
    tenant.enabled.insert(module_id.to_string());

    if let Err(e) = state.sync.store().put_tenant(&tenant).await {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if let Err(e) = state.tenants.enable(&tenant_id, module_id, &state.catalog) {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    match state.sync.record_mutation().await {
        Ok(_) => (StatusCode::CREATED, Json(json!(tenant))),
        Err(e) => (status_for(&e), Json(json!({"error": e.to_string()}))),
    }
}

/// DELETE /_/proxy/tenants/:id/modules/:module_id
pub async fn disable_module<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
    Path((tenant_id, module_id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    let Some(existing) = state.tenants.get(&tenant_id) else {
        let e = OkapiError::NotFound(format!("tenant '{}' not found", tenant_id));
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    };
    let mut tenant = (*existing).clone();
    tenant.enabled.remove(&module_id);

    if let Err(e) = state.sync.store().put_tenant(&tenant).await {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if let Err(e) = state.tenants.disable(&tenant_id, &module_id) {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    match state.sync.record_mutation().await {
        Ok(_) => (StatusCode::NO_CONTENT, Json(json!(tenant))),
        Err(e) => (status_for(&e), Json(json!({"error": e.to_string()}))),
    }
}
