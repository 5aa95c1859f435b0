// Connector Gateway -- connection test
// Checks that a stored credential actually reaches the service's API.

use std::time::{Duration, Instant};

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::handlers::ApiError;
use crate::mcp::request::{auth_headers, substitute_placeholders};
use crate::mcp::{Gateway, GatewayOutcome, McpError};
use crate::models::{ConnectionTestRequest, ConnectionTestResponse};
use crate::state::AppState;

pub const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// POST /api/connections/test: probe the service endpoint with the resolved credential.
#[utoipa::path(post, path = "/api/connections/test", tag = "connections",
    request_body = ConnectionTestRequest,
    responses(
        (status = 200, description = "Probe finished (see `ok`)", body = ConnectionTestResponse),
        (status = 402, description = "TOKEN_REQUIRED: no credential configured", body = serde_json::Value),
        (status = 404, description = "Service not configured", body = serde_json::Value)
    )
)]
pub async fn test_connection(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(req): Json<ConnectionTestRequest>,
) -> Response {
    match probe(&state, &user, &req).await {
        Ok(result) => Json(result).into_response(),
        Err(McpError::CredentialNotFound(nf)) => GatewayOutcome::CredentialMissing(nf).into_response(),
        Err(e @ McpError::ServiceTypeMissing) => ApiError::BadRequest(e.to_string()).into_response(),
        Err(e @ McpError::ServiceNotConfigured(_)) => ApiError::NotFound(e.to_string()).into_response(),
        Err(e) => ApiError::Internal(e.to_string()).into_response(),
    }
}

async fn probe(
    state: &AppState,
    user: &AuthenticatedUser,
    req: &ConnectionTestRequest,
) -> Result<ConnectionTestResponse, McpError> {
    let gateway = Gateway::from_state(state);
    let config = gateway
        .load_service(req.service_type.as_deref(), req.job_template_id.as_deref())
        .await?;
    let auth = gateway
        .resolve_auth(&config, user, req.owner_type, req.owner_id.as_deref())
        .await?;

    let url = substitute_placeholders(auth.effective_endpoint(&config), &json!({}));
    let headers = auth_headers(&auth)?;

    tracing::info!(service = %config.service_type, "connection test: probing endpoint");
    let started = Instant::now();
    let result = state
        .client
        .get(&url)
        .headers(headers)
        .timeout(CONNECTION_TEST_TIMEOUT)
        .send()
        .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    Ok(match result {
        Ok(resp) => {
            let status = resp.status();
            ConnectionTestResponse {
                ok: status.is_success(),
                service_type: config.service_type,
                status: Some(status.as_u16()),
                error: None,
                duration_ms,
                checked_at: chrono::Utc::now(),
            }
        }
        Err(e) => {
            let error = if e.is_timeout() {
                format!("Timed out after {}s", CONNECTION_TEST_TIMEOUT.as_secs())
            } else {
                format!("Request failed: {}", e)
            };
            tracing::warn!(service = %config.service_type, "connection test failed: {}", error);
            ConnectionTestResponse {
                ok: false,
                service_type: config.service_type,
                status: None,
                error: Some(error),
                duration_ms,
                checked_at: chrono::Utc::now(),
            }
        }
    })
}
