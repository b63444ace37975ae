use crate::server::AdminState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use okapi_core::error::OkapiError;
use okapi_core::module::ModuleDescriptor;
use okapi_store::{Bus, Store};
use serde_json::{json, Value};
use std::sync::Arc;

fn status_for(err: &OkapiError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// GET /_/proxy/modules
pub async fn list_modules<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
) -> Json<Value> {
    let list: Vec<ModuleDescriptor> = state
        .catalog
        .list()
        .into_iter()
        .map(|m| (*m).clone())
        .collect();
    Json(json!(list))
}

/// GET /_/proxy/modules/:id
pub async fn get_module<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    match state.catalog.get(&id) {
        Some(m) => (StatusCode::OK, Json(json!(*m))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("module '{}' not found", id)})),
        ),
    }
}

/// POST /_/proxy/modules
pub async fn create_module<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
    Json(module): Json<ModuleDescriptor>,
) -> (StatusCode, Json<Value>) {
    if let Err(e) = module.validate() {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if state.catalog.contains(&module.id) {
        let e = OkapiError::User(format!("module '{}' already exists", module.id));
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if let Err(e) = state.sync.store().put_module(&module).await {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if let Err(e) = state.catalog.insert(module.clone()) {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    match state.sync.record_mutation().await {
        Ok(_) => (StatusCode::CREATED, Json(json!(module))),
        Err(e) => (status_for(&e), Json(json!({"error": e.to_string()}))),
    }
}

/// PUT /_/proxy/modules/:id
pub async fn update_module<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
    Path(id): Path<String>,
    Json(mut module): Json<ModuleDescriptor>,
) -> (StatusCode, Json<Value>) {
    module.id = id;
    if let Err(e) = module.validate() {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if !state.catalog.contains(&module.id) {
        let e = OkapiError::NotFound(format!("module '{}' not found", module.id));
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if let Err(e) = state.sync.store().put_module(&module).await {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if let Err(e) = state.catalog.update(module.clone()) {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    match state.sync.record_mutation().await {
        Ok(_) => (StatusCode::OK, Json(json!(module))),
        Err(e) => (status_for(&e), Json(json!({"error": e.to_string()}))),
    }
}

/// DELETE /_/proxy/modules/:id
pub async fn delete_module<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    if !state.catalog.contains(&id) {
        let e = OkapiError::NotFound(format!("module '{}' not found", id));
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if let Err(e) = state.sync.store().delete_module(&id).await {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    if let Err(e) = state.catalog.delete(&id) {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    match state.sync.record_mutation().await {
        Ok(_) => (StatusCode::NO_CONTENT, Json(json!({}))),
        Err(e) => (status_for(&e), Json(json!({"error": e.to_string()}))),
    }
}
