// Connector Gateway -- MCP gateway integration tests
//
// The gateway runs in-process via `oneshot`; the third-party API it proxies
// to is a real axum server bound to 127.0.0.1:0.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::Path;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use connector_gateway::auth::StaticTokenIdentity;
use connector_gateway::mcp::config::InMemoryServiceDirectory;
use connector_gateway::mcp::credentials::InMemorySecretStore;
use connector_gateway::mcp::{Credential, OwnerType, ServiceConfig};
use connector_gateway::state::{build_http_client, AppState};

const TOKEN: &str = "test-token";
const USER: &str = "user-1";

// ── Upstream stub ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Seen {
    authorization: Arc<Mutex<Vec<String>>>,
}

impl Seen {
    fn authorization(&self) -> Vec<String> {
        self.authorization.lock().unwrap().clone()
    }
}

async fn start_server(app: Router) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), handle)
}

/// A tiny helpdesk API: ticket 123 exists, everything else is 404.
async fn start_helpdesk() -> (String, Seen, JoinHandle<()>) {
    let seen = Seen::default();
    let recorder = seen.clone();
    let app = Router::new()
        .route(
            "/api/v2/tickets/{id}",
            get(move |Path(id): Path<String>, headers: HeaderMap| {
                let recorder = recorder.clone();
                async move {
                    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
                        recorder.authorization.lock().unwrap().push(auth.to_string());
                    }
                    if id == "123" {
                        (StatusCode::OK, Json(json!({ "id": 123, "subject": "X" }))).into_response()
                    } else {
                        (StatusCode::NOT_FOUND, "Ticket not found").into_response()
                    }
                }
            }),
        )
        .route(
            "/api/v2/tickets",
            get(|| async { Json(json!([{ "id": 1 }, { "id": 2 }])) }),
        );
    let (url, handle) = start_server(app).await;
    (url, seen, handle)
}

// ── Gateway helpers ─────────────────────────────────────────────────────────

fn freshservice(base: &str) -> ServiceConfig {
    serde_json::from_value(json!({
        "serviceType": "freshservice",
        "endpoint": format!("{base}/api/v2"),
        "tools": [{
            "name": "get_ticket",
            "description": "Fetch one ticket",
            "method": "GET",
            "path": "/tickets/{ticketId}",
            "inputSchema": { "type": "object", "properties": { "ticketId": { "type": "number" } } }
        }],
        "resources": [{
            "uri": "freshservice://tickets",
            "name": "Tickets",
            "path": "/tickets"
        }]
    }))
    .unwrap()
}

fn user_token() -> Credential {
    Credential::new("Bearer abc", "api_key").with_auth_config(json!({ "headerName": "Authorization" }))
}

fn state_with(services: InMemoryServiceDirectory, secrets: Arc<InMemorySecretStore>) -> AppState {
    AppState::from_parts(
        Arc::new(services),
        secrets,
        Arc::new(StaticTokenIdentity::new().with_token(TOKEN, USER)),
        build_http_client().unwrap(),
    )
}

fn mcp_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/mcp")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════
//  Authentication
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn missing_bearer_token_is_401() {
    let state = state_with(InMemoryServiceDirectory::new(), Arc::new(InMemorySecretStore::new()));
    let response = connector_gateway::create_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/mcp")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "method": "tools/list" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "Unauthorized");
}

#[tokio::test]
async fn unknown_token_is_401() {
    let state = state_with(InMemoryServiceDirectory::new(), Arc::new(InMemorySecretStore::new()));
    let response = connector_gateway::create_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/mcp")
                .header("authorization", "Bearer nope")
                .body(Body::from(json!({ "method": "tools/list" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ═══════════════════════════════════════════════════════════════════════════
//  tools/list, resources/list
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn listing_never_consults_credentials_and_is_stable() {
    let secrets = Arc::new(InMemorySecretStore::new());
    let state = state_with(
        InMemoryServiceDirectory::new().with_service(freshservice("http://unused.invalid")),
        secrets.clone(),
    );
    let app = connector_gateway::create_router(state);

    let first = app
        .clone()
        .oneshot(mcp_request(json!({ "method": "tools/list", "serviceType": "freshservice" })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["tools"][0]["name"], "get_ticket");
    assert_eq!(first["tools"][0]["inputSchema"]["type"], "object");

    let second = body_json(
        app.clone()
            .oneshot(mcp_request(json!({ "method": "tools/list", "serviceType": "freshservice" })))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first, second);

    let resources = body_json(
        app.oneshot(mcp_request(json!({ "method": "resources/list", "serviceType": "freshservice" })))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(resources["resources"][0]["uri"], "freshservice://tickets");
    assert_eq!(resources["resources"][0]["mimeType"], "application/json");

    assert_eq!(secrets.lookups(), 0);
}

#[tokio::test]
async fn service_is_inferred_from_job_template() {
    let state = state_with(
        InMemoryServiceDirectory::new()
            .with_service(freshservice("http://unused.invalid"))
            .with_job_template("tpl-1", "freshservice"),
        Arc::new(InMemorySecretStore::new()),
    );
    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({ "method": "tools/list", "jobTemplateId": "tpl-1" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["tools"][0]["name"], "get_ticket");
}

#[tokio::test]
async fn missing_service_type_is_500() {
    let state = state_with(InMemoryServiceDirectory::new(), Arc::new(InMemorySecretStore::new()));
    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({ "method": "tools/list", "jobTemplateId": "unknown" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("serviceType"));
}

#[tokio::test]
async fn unconfigured_service_is_500_naming_the_service() {
    let state = state_with(InMemoryServiceDirectory::new(), Arc::new(InMemorySecretStore::new()));
    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({ "method": "tools/list", "serviceType": "jira" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("jira"));
}

#[tokio::test]
async fn unknown_method_and_bad_json_are_500() {
    let state = state_with(
        InMemoryServiceDirectory::new().with_service(freshservice("http://unused.invalid")),
        Arc::new(InMemorySecretStore::new()),
    );
    let app = connector_gateway::create_router(state);

    let response = app
        .clone()
        .oneshot(mcp_request(json!({ "method": "prompts/list", "serviceType": "freshservice" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("prompts/list"));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/mcp")
                .header("authorization", format!("Bearer {TOKEN}"))
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].is_string());
}

// ═══════════════════════════════════════════════════════════════════════════
//  tools/call, resources/read
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn tool_call_end_to_end() {
    let (base, seen, _server) = start_helpdesk().await;
    let secrets = Arc::new(InMemorySecretStore::new().with_owner_credential(
        "freshservice",
        OwnerType::User,
        USER,
        user_token(),
    ));
    let state = state_with(InMemoryServiceDirectory::new().with_service(freshservice(&base)), secrets);

    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({
            "method": "tools/call",
            "serviceType": "freshservice",
            "params": { "toolName": "get_ticket", "arguments": { "ticketId": 123 } }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["content"][0]["type"], "text");
    assert_eq!(
        body["content"][0]["text"],
        serde_json::to_string_pretty(&json!({ "id": 123, "subject": "X" })).unwrap()
    );
    assert_eq!(seen.authorization(), vec!["Bearer abc".to_string()]);
}

#[tokio::test]
async fn tool_call_accepts_name_alias() {
    let (base, _seen, _server) = start_helpdesk().await;
    let secrets = Arc::new(InMemorySecretStore::new().with_owner_credential(
        "freshservice",
        OwnerType::User,
        USER,
        user_token(),
    ));
    let state = state_with(InMemoryServiceDirectory::new().with_service(freshservice(&base)), secrets);

    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({
            "method": "tools/call",
            "serviceType": "freshservice",
            "params": { "name": "get_ticket", "arguments": { "ticketId": 123 } }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn app_token_wins_over_user_token() {
    let (base, seen, _server) = start_helpdesk().await;
    let secrets = Arc::new(
        InMemorySecretStore::new()
            .with_app_credential("freshservice", Credential::new("shared", "bearer"))
            .with_owner_credential("freshservice", OwnerType::User, USER, user_token()),
    );
    let state = state_with(InMemoryServiceDirectory::new().with_service(freshservice(&base)), secrets);

    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({
            "method": "tools/call",
            "serviceType": "freshservice",
            "params": { "toolName": "get_ticket", "arguments": { "ticketId": 123 } }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(seen.authorization(), vec!["Bearer shared".to_string()]);
}

#[tokio::test]
async fn missing_credential_is_402_token_required() {
    let state = state_with(
        InMemoryServiceDirectory::new().with_service(freshservice("http://unused.invalid")),
        Arc::new(InMemorySecretStore::new()),
    );
    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({
            "method": "tools/call",
            "serviceType": "freshservice",
            "params": { "toolName": "get_ticket", "arguments": { "ticketId": 123 } }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "TOKEN_REQUIRED");
    assert_eq!(body["serviceType"], "freshservice");
    assert_eq!(body["usesAppToken"], false);
    assert!(body["message"].as_str().unwrap().contains("freshservice"));
}

#[tokio::test]
async fn upstream_error_is_propagated_with_body() {
    let (base, _seen, _server) = start_helpdesk().await;
    let secrets = Arc::new(InMemorySecretStore::new().with_owner_credential(
        "freshservice",
        OwnerType::User,
        USER,
        user_token(),
    ));
    let state = state_with(InMemoryServiceDirectory::new().with_service(freshservice(&base)), secrets);

    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({
            "method": "tools/call",
            "serviceType": "freshservice",
            "params": { "toolName": "get_ticket", "arguments": { "ticketId": 999 } }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("404"));
    assert!(error.contains("Ticket not found"));
    assert_eq!(body["upstreamStatus"], 404);
}

#[tokio::test]
async fn unknown_tool_is_500() {
    let secrets = Arc::new(InMemorySecretStore::new().with_owner_credential(
        "freshservice",
        OwnerType::User,
        USER,
        user_token(),
    ));
    let state = state_with(
        InMemoryServiceDirectory::new().with_service(freshservice("http://unused.invalid")),
        secrets,
    );
    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({
            "method": "tools/call",
            "serviceType": "freshservice",
            "params": { "toolName": "delete_ticket" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_json(response).await["error"].as_str().unwrap().contains("delete_ticket"));
}

#[tokio::test]
async fn resource_read_wraps_contents() {
    let (base, _seen, _server) = start_helpdesk().await;
    let secrets = Arc::new(InMemorySecretStore::new().with_owner_credential(
        "freshservice",
        OwnerType::Team,
        "team-9",
        Credential::new("team-secret", "bearer"),
    ));
    let state = state_with(InMemoryServiceDirectory::new().with_service(freshservice(&base)), secrets);

    let response = connector_gateway::create_router(state)
        .oneshot(mcp_request(json!({
            "method": "resources/read",
            "serviceType": "freshservice",
            "ownerType": "team",
            "ownerId": "team-9",
            "params": { "uri": "freshservice://tickets" }
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let contents = &body["contents"][0];
    assert_eq!(contents["uri"], "freshservice://tickets");
    assert_eq!(contents["mimeType"], "application/json");
    let parsed: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(parsed, json!([{ "id": 1 }, { "id": 2 }]));
}

#[tokio::test]
async fn edge_function_path_is_served() {
    let state = state_with(
        InMemoryServiceDirectory::new().with_service(freshservice("http://unused.invalid")),
        Arc::new(InMemorySecretStore::new()),
    );
    let response = connector_gateway::create_router(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/functions/v1/mcp-server")
                .header("authorization", format!("Bearer {TOKEN}"))
                .body(Body::from(
                    json!({ "method": "tools/list", "serviceType": "freshservice" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
