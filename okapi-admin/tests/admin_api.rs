//! Integration tests for the Admin REST API handlers.
//!
//! Uses `tower::ServiceExt::oneshot` to call handlers without binding a real
//! TCP port — every test gets a fresh in-memory state.

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use okapi_admin::{build_admin_router, AdminState};
use okapi_core::catalog::ModuleCatalog;
use okapi_core::discovery::DiscoveryManager;
use okapi_core::tenant::TenantRegistry;
use okapi_store::{ClusterSync, FakeStore, InMemoryBus};
use std::sync::Arc;
use tower::ServiceExt; // .oneshot()

// ── Helpers ───────────────────────────────────────────────────

fn make_state() -> Arc<AdminState<FakeStore, InMemoryBus>> {
    let catalog = Arc::new(ModuleCatalog::new());
    let tenants = Arc::new(TenantRegistry::new());
    let discovery = Arc::new(DiscoveryManager::new());
    let sync = Arc::new(ClusterSync::new(
        Arc::new(FakeStore::new()),
        Arc::new(InMemoryBus::new()),
        "okapi.conf.modules",
        Arc::clone(&catalog),
        Arc::clone(&tenants),
        Arc::clone(&discovery),
    ));
    Arc::new(AdminState {
        catalog,
        tenants,
        discovery,
        sync,
    })
}

fn router(state: &Arc<AdminState<FakeStore, InMemoryBus>>) -> axum::Router {
    build_admin_router(Arc::clone(state), &[])
}

fn json_req(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().method(Method::GET).uri(uri).body(Body::empty()).unwrap()
}

fn delete_req(uri: &str) -> Request<Body> {
    Request::builder().method(Method::DELETE).uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn module_body(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": null,
        "tags": [],
        "env": {},
        "requires": [],
        "provides": [],
        "routing_entries": [],
        "filters": [],
        "launch_descriptor": null,
        "ui_descriptor": null,
    })
}

// ── Health ────────────────────────────────────────────────────

#[tokio::test]
async fn health_check_returns_200() {
    let resp = router(&make_state()).oneshot(get_req("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// ── Modules ───────────────────────────────────────────────────

#[tokio::test]
async fn create_module_returns_201_and_echoes_body() {
    let state = make_state();
    let resp = router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let j = body_json(resp).await;
    assert_eq!(j["id"], "m-echo");
}

#[tokio::test]
async fn create_module_duplicate_id_is_rejected() {
    let state = make_state();
    router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();
    let resp = router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_module_returns_404_when_missing() {
    let resp = router(&make_state()).oneshot(get_req("/_/proxy/modules/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_module_returns_it_after_create() {
    let state = make_state();
    router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();
    let resp = router(&state).oneshot(get_req("/_/proxy/modules/m-echo")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["id"], "m-echo");
}

#[tokio::test]
async fn list_modules_returns_all_created() {
    let state = make_state();
    for id in ["m-a", "m-b"] {
        router(&state)
            .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body(id)))
            .await
            .unwrap();
    }
    let resp = router(&state).oneshot(get_req("/_/proxy/modules")).await.unwrap();
    let j = body_json(resp).await;
    assert_eq!(j.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn delete_module_removes_it() {
    let state = make_state();
    router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();

    let resp = router(&state).oneshot(delete_req("/_/proxy/modules/m-echo")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = router(&state).oneshot(get_req("/_/proxy/modules/m-echo")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_module_keeps_path_id() {
    let state = make_state();
    router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();

    let mut body = module_body("ignored-id");
    body["tags"] = serde_json::json!(["v2"]);
    let resp = router(&state)
        .oneshot(json_req(Method::PUT, "/_/proxy/modules/m-echo", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let j = body_json(resp).await;
    assert_eq!(j["id"], "m-echo");
    assert_eq!(j["tags"], serde_json::json!(["v2"]));
}

// ── Tenants ───────────────────────────────────────────────────

#[tokio::test]
async fn enable_module_requires_existing_module() {
    let state = make_state();
    let resp = router(&state)
        .oneshot(json_req(
            Method::POST,
            "/_/proxy/tenants/t1/modules",
            serde_json::json!({"id": "m-ghost"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn enable_then_disable_module_round_trips() {
    let state = make_state();
    router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();

    let resp = router(&state)
        .oneshot(json_req(
            Method::POST,
            "/_/proxy/tenants/t1/modules",
            serde_json::json!({"id": "m-echo"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    assert!(state.tenants.is_enabled("t1", "m-echo"));

    let resp = router(&state)
        .oneshot(delete_req("/_/proxy/tenants/t1/modules/m-echo"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(!state.tenants.is_enabled("t1", "m-echo"));
}

#[tokio::test]
async fn list_tenants_reflects_enablement() {
    let state = make_state();
    router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();
    router(&state)
        .oneshot(json_req(
            Method::POST,
            "/_/proxy/tenants/t1/modules",
            serde_json::json!({"id": "m-echo"}),
        ))
        .await
        .unwrap();

    let resp = router(&state).oneshot(get_req("/_/proxy/tenants")).await.unwrap();
    let j = body_json(resp).await;
    let tenants = j.as_array().unwrap();
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0]["id"], "t1");
}

// ── Deployments ───────────────────────────────────────────────

#[tokio::test]
async fn deploy_requires_existing_module() {
    let state = make_state();
    let resp = router(&state)
        .oneshot(json_req(
            Method::POST,
            "/_/discovery/modules/m-ghost",
            serde_json::json!({"url": "http://127.0.0.1:9001"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deploy_then_undeploy_round_trips() {
    let state = make_state();
    router(&state)
        .oneshot(json_req(Method::POST, "/_/proxy/modules", module_body("m-echo")))
        .await
        .unwrap();

    let resp = router(&state)
        .oneshot(json_req(
            Method::POST,
            "/_/discovery/modules/m-echo",
            serde_json::json!({"url": "http://127.0.0.1:9001"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let j = body_json(resp).await;
    let inst_id = j["inst_id"].as_str().unwrap().to_string();

    let resp = router(&state).oneshot(get_req("/_/discovery/modules")).await.unwrap();
    let j = body_json(resp).await;
    assert_eq!(j.as_array().unwrap().len(), 1);

    let resp = router(&state)
        .oneshot(delete_req(&format!("/_/discovery/modules/m-echo/{inst_id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = router(&state).oneshot(get_req("/_/discovery/modules")).await.unwrap();
    let j = body_json(resp).await;
    assert!(j.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn undeploy_unknown_instance_returns_404() {
    let state = make_state();
    let resp = router(&state)
        .oneshot(delete_req(&format!(
            "/_/discovery/modules/m-echo/{}",
            uuid::Uuid::new_v4()
        )))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
