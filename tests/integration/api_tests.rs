//! API integration tests

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use indexmap::IndexMap;
use serde_json::{json, Value};
use tower::ServiceExt;

use ils_gateway::{
    api,
    config::{AppConfig, LoggingConfig, LoginConfig, MultiBackendConfig, ServerConfig},
    multibackend::{DriverManager, StaticConfigLoader},
    services::{ils::IlsService, Services},
    AppState,
};

/// Two demo libraries; `main` only serves its own records
fn app() -> Router {
    let multibackend = MultiBackendConfig {
        default_driver: Some("main".to_string()),
        drivers_config_path: Some("drivers".to_string()),
        drivers: IndexMap::from([
            ("main".to_string(), "Demo".to_string()),
            ("branch".to_string(), "Demo".to_string()),
        ]),
        login: LoginConfig {
            drivers: vec!["main".to_string(), "branch".to_string()],
            default_driver: None,
        },
        ..Default::default()
    };
    let loader = StaticConfigLoader::new()
        .with(
            "drivers/main",
            json!({
                "items_per_record": 2,
                "accept_any_source": false,
                "failing_records": ["broken"],
                "patrons": [{ "username": "alice", "password": "secret", "firstname": "Alice" }],
            }),
        )
        .with(
            "drivers/branch",
            json!({
                "items_per_record": 1,
                "accept_any_source": false,
                "patrons": [{ "username": "bob", "password": "secret" }],
            }),
        );

    let ils = IlsService::new(
        multibackend.clone(),
        DriverManager::with_builtin(),
        Arc::new(loader),
    );
    let state = AppState {
        config: Arc::new(AppConfig {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            multibackend,
        }),
        services: Arc::new(Services::new(ils)),
    };
    api::create_router(state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_check() {
    let (status, body) = get(app(), "/api/v1/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_readiness_reports_backends() {
    let (status, body) = get(app(), "/api/v1/ready").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backends"], 2);
}

#[tokio::test]
async fn test_list_backends() {
    let (status, body) = get(app(), "/api/v1/backends").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sources"], json!(["main", "branch"]));
    assert_eq!(body["default_login_driver"], "main");
}

#[tokio::test]
async fn test_login_namespaces_patron() {
    let (status, body) = post(
        app(),
        "/api/v1/auth/login",
        json!({ "username": "branch.bob", "password": "secret" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cat_username"], "branch.bob");
    assert_eq!(body["id"], "branch.bob");
}

#[tokio::test]
async fn test_unprefixed_login_uses_default_login_source() {
    let (status, body) = post(
        app(),
        "/api/v1/auth/login",
        json!({ "username": "alice", "password": "secret" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cat_username"], "main.alice");
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let (status, _) = post(
        app(),
        "/api/v1/auth/login",
        json!({ "username": "main.alice", "password": "wrong" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_validation_error() {
    let (status, body) = post(
        app(),
        "/api/v1/auth/login",
        json!({ "username": "", "password": "secret" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_login_unknown_source() {
    let (status, _) = post(
        app(),
        "/api/v1/auth/login",
        json!({ "username": "nowhere.alice", "password": "secret" }),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_record_status_is_namespaced() {
    let (status, body) = get(app(), "/api/v1/records/main.42/status").await;

    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item["id"] == "main.42"));
}

#[tokio::test]
async fn test_status_of_unknown_source_is_empty() {
    let (status, body) = get(app(), "/api/v1/records/nowhere.42/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_statuses_across_backends() {
    let (status, body) = post(
        app(),
        "/api/v1/records/statuses",
        json!({ "ids": ["branch.2", "main.1", "branch.3"] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let groups = body.as_array().unwrap();
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0][0]["id"], "branch.2");
    assert_eq!(groups[1][0]["id"], "branch.3");
    assert_eq!(groups[2][0]["id"], "main.1");
    assert!(groups.iter().all(|group| group[0]["error"].is_null()));
}

#[tokio::test]
async fn test_failing_backend_yields_placeholders() {
    let (status, body) = post(
        app(),
        "/api/v1/records/statuses",
        json!({ "ids": ["main.1", "main.broken", "branch.2"] }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let groups = body.as_array().unwrap();
    assert_eq!(groups.len(), 3);
    assert_eq!(groups[0][0]["id"], "main.1");
    assert!(groups[0][0]["error"].is_string());
    assert_eq!(groups[1][0]["id"], "main.broken");
    assert!(groups[1][0]["error"].is_string());
    assert_eq!(groups[2][0]["id"], "branch.2");
    assert!(groups[2][0]["error"].is_null());
}

#[tokio::test]
async fn test_hold_on_other_library_is_refused() {
    let (status, body) = post(
        app(),
        "/api/v1/holds",
        json!({
            "id": "branch.7",
            "patron": { "id": "main.alice", "cat_username": "main.alice" },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["sysMessage"], "hold_wrong_user_institution");
}

#[tokio::test]
async fn test_place_hold_own_library() {
    let (status, body) = post(
        app(),
        "/api/v1/holds",
        json!({
            "id": "main.7",
            "patron": { "id": "main.alice", "cat_username": "main.alice" },
            "params": { "pickUpLocation": "Main Library" },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_capabilities() {
    let (status, body) = post(
        app(),
        "/api/v1/capabilities",
        json!({ "method": "placeHold", "params": { "id": "main.7" } }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["supported"], true);

    // Interlibrary loan is not enabled on branch
    let (_, body) = post(
        app(),
        "/api/v1/capabilities",
        json!({ "method": "placeILLRequest", "params": { "id": "branch.7" } }),
    )
    .await;
    assert_eq!(body["supported"], false);
}

#[tokio::test]
async fn test_unknown_capability_is_bad_request() {
    let (status, _) = post(
        app(),
        "/api/v1/capabilities",
        json!({ "method": "launchRocket" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reserves_come_from_default_backend() {
    let (status, body) = get(app(), "/api/v1/reserves?course=c1").await;

    assert_eq!(status, StatusCode::OK);
    let reserves = body.as_array().unwrap();
    assert_eq!(reserves.len(), 1);
    assert_eq!(reserves[0]["BIB_ID"], "main.r1");
}

#[tokio::test]
async fn test_change_password_too_short() {
    let (status, _) = post(
        app(),
        "/api/v1/patron/password",
        json!({
            "patron": { "id": "main.alice", "cat_username": "main.alice" },
            "old_password": "secret",
            "new_password": "x",
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}
