pub mod auth;
pub mod cache;
pub mod config;
pub mod connections;
pub mod crypto;
pub mod handlers;
pub mod languages;
pub mod mcp;
pub mod models;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use utoipa::OpenApi;

use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(title = "ConnectorGateway API", description = "MCP-style proxy to third-party service APIs"),
    paths(
        handlers::health,
        handlers::readiness,
        languages::list_languages,
        mcp::gateway::mcp_handler,
        connections::test_connection,
    ),
    components(schemas(
        models::HealthResponse,
        models::ConnectionTestRequest,
        models::ConnectionTestResponse,
        languages::Language,
        languages::LanguagesResponse,
        mcp::OwnerType,
    )),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "languages", description = "Supported translation languages"),
        (name = "mcp", description = "tools/list, tools/call, resources/list, resources/read"),
        (name = "connections", description = "Credential connectivity checks"),
    )
)]
pub struct ApiDoc;

/// Build the application router with the given state.
/// Extracted from `main()` so integration tests can construct the app
/// without binding to a network port.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/mcp", post(mcp::gateway::mcp_handler))
        // Supabase edge-function path, kept for existing clients.
        .route("/functions/v1/mcp-server", post(mcp::gateway::mcp_handler))
        .route("/api/connections/test", post(connections::test_connection))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_auth));

    Router::new()
        // Health
        .route("/api/health", get(handlers::health))
        .route("/api/health/ready", get(handlers::readiness))
        // Languages
        .route("/api/languages", get(languages::list_languages))
        // OpenAPI
        .route("/api-docs/openapi.json", get(handlers::openapi_json))
        .merge(protected)
        .with_state(state)
}
