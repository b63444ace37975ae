use crate::server::AdminState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use okapi_core::discovery::DeploymentDescriptor;
use okapi_core::error::OkapiError;
use okapi_store::{Bus, Store};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

fn status_for(err: &OkapiError) -> StatusCode {
    StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Deserialize)]
pub struct DeployRequest {
    pub url: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// GET /_/discovery/modules
pub async fn list_deployments<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
) -> Json<Value> {
    Json(json!(state.discovery.all()))
}

/// POST /_/discovery/modules/:id
pub async fn deploy<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
    Path(id): Path<String>,
    Json(req): Json<DeployRequest>,
) -> (StatusCode, Json<Value>) {
    if !state.catalog.contains(&id) {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("module '{}' does not exist", id)})),
        );
    }
    let mut deployment = DeploymentDescriptor::new(id, req.url);
    deployment.node_id = req.node_id;

    if let Err(e) = state.sync.store().put_deployment(&deployment).await {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    state.discovery.deploy(deployment.clone());
    match state.sync.record_mutation().await {
        Ok(_) => (StatusCode::CREATED, Json(json!(deployment))),
        Err(e) => (status_for(&e), Json(json!({"error": e.to_string()}))),
    }
}

/// DELETE /_/discovery/modules/:id/:inst_id
pub async fn undeploy<S: Store, B: Bus>(
    State(state): State<Arc<AdminState<S, B>>>,
    Path((id, inst_id)): Path<(String, String)>,
) -> (StatusCode, Json<Value>) {
    let Ok(inst_id) = Uuid::parse_str(&inst_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid instance id"})),
        );
    };
    let exists = state
        .discovery
        .all()
        .iter()
        .any(|d| d.srvc_id == id && d.inst_id == inst_id);
    if !exists {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("instance '{}' not found", inst_id)})),
        );
    }
    if let Err(e) = state.sync.store().delete_deployment(inst_id).await {
        return (status_for(&e), Json(json!({"error": e.to_string()})));
    }
    state.discovery.undeploy(&id, inst_id);
    match state.sync.record_mutation().await {
        Ok(_) => (StatusCode::NO_CONTENT, Json(json!({}))),
        Err(e) => (status_for(&e), Json(json!({"error": e.to_string()}))),
    }
}
