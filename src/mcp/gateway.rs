// Connector Gateway -- mcp/gateway
//! HTTP entry point for MCP-style calls.
//!
//! One request is one pass: resolve the service, load its configuration,
//! then either list tools/resources or resolve a credential, build the
//! upstream request and dispatch it. Nothing is persisted.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::config::{ServiceConfig, ServiceDirectory};
use super::credentials::{CredentialResolver, OwnerType, ResolvedAuth, SecretStore};
use super::dispatch::Dispatcher;
use super::error::{CredentialNotFound, McpError};
use super::request::{self, Operation};
use crate::auth::AuthenticatedUser;
use crate::state::AppState;

// ── Request ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    pub method: String,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub job_template_id: Option<String>,
    #[serde(default)]
    pub params: CallParams,
    #[serde(default)]
    pub owner_type: Option<OwnerType>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallParams {
    #[serde(default, alias = "name")]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub arguments: Option<Value>,
    #[serde(default)]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpMethod {
    ToolsList,
    ToolsCall,
    ResourcesList,
    ResourcesRead,
}

impl std::str::FromStr for McpMethod {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tools/list" => Ok(McpMethod::ToolsList),
            "tools/call" => Ok(McpMethod::ToolsCall),
            "resources/list" => Ok(McpMethod::ResourcesList),
            "resources/read" => Ok(McpMethod::ResourcesRead),
            other => Err(McpError::UnknownMethod(other.to_string())),
        }
    }
}

// ── Outcome ─────────────────────────────────────────────────────────────────

/// Every gateway response is exactly one of these.
#[derive(Debug)]
pub enum GatewayOutcome {
    Ok(Value),
    /// HTTP 402 `TOKEN_REQUIRED`: the caller should prompt for a token.
    CredentialMissing(CredentialNotFound),
    Failure {
        status: StatusCode,
        message: String,
        details: Option<Value>,
    },
}

impl From<McpError> for GatewayOutcome {
    fn from(err: McpError) -> Self {
        match err {
            McpError::CredentialNotFound(nf) => GatewayOutcome::CredentialMissing(nf),
            McpError::Unauthorized(_) => GatewayOutcome::Failure {
                status: StatusCode::UNAUTHORIZED,
                message: "Unauthorized".to_string(),
                details: None,
            },
            McpError::Upstream { status, ref body } => GatewayOutcome::Failure {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
                details: Some(json!({ "upstreamStatus": status, "upstreamBody": body })),
            },
            other => GatewayOutcome::Failure {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: other.to_string(),
                details: None,
            },
        }
    }
}

impl From<Result<Value, McpError>> for GatewayOutcome {
    fn from(result: Result<Value, McpError>) -> Self {
        match result {
            Ok(value) => GatewayOutcome::Ok(value),
            Err(e) => e.into(),
        }
    }
}

impl IntoResponse for GatewayOutcome {
    fn into_response(self) -> Response {
        match self {
            GatewayOutcome::Ok(value) => (StatusCode::OK, Json(value)).into_response(),
            GatewayOutcome::CredentialMissing(nf) => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "error": "TOKEN_REQUIRED",
                    "message": nf.message,
                    "serviceType": nf.service_type,
                    "usesAppToken": nf.uses_app_token,
                })),
            )
                .into_response(),
            GatewayOutcome::Failure {
                status,
                message,
                details,
            } => {
                tracing::error!(status = status.as_u16(), "MCP gateway error: {}", message);
                let mut body = json!({ "error": message });
                if let Some(Value::Object(extra)) = details {
                    if let Some(obj) = body.as_object_mut() {
                        obj.extend(extra);
                    }
                }
                (status, Json(body)).into_response()
            }
        }
    }
}

// ── Gateway ─────────────────────────────────────────────────────────────────

pub struct Gateway<'a> {
    services: &'a dyn ServiceDirectory,
    secrets: &'a dyn SecretStore,
    client: &'a Client,
}

impl<'a> Gateway<'a> {
    pub fn new(
        services: &'a dyn ServiceDirectory,
        secrets: &'a dyn SecretStore,
        client: &'a Client,
    ) -> Self {
        Self {
            services,
            secrets,
            client,
        }
    }

    pub fn from_state(state: &'a AppState) -> Self {
        Self::new(state.services.as_ref(), state.secrets.as_ref(), &state.client)
    }

    pub async fn handle(&self, caller: &AuthenticatedUser, request: CallRequest) -> GatewayOutcome {
        self.route(caller, request).await.into()
    }

    async fn route(&self, caller: &AuthenticatedUser, request: CallRequest) -> Result<Value, McpError> {
        let config = self
            .load_service(
                request.service_type.as_deref(),
                request.job_template_id.as_deref(),
            )
            .await?;
        let service_type = config.service_type.as_str();

        let method: McpMethod = request.method.parse()?;
        tracing::info!(
            service = %service_type,
            method = %request.method,
            user = %caller.id,
            "MCP gateway: incoming call"
        );

        let arguments = request.params.arguments.clone().unwrap_or_else(|| json!({}));

        match method {
            McpMethod::ToolsList => Ok(json!({ "tools": config.tools })),
            McpMethod::ResourcesList => Ok(json!({ "resources": config.resources })),
            McpMethod::ToolsCall => {
                let name = request
                    .params
                    .tool_name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .ok_or(McpError::MissingParam("toolName"))?;
                self.call(&config, caller, &request, Operation::CallTool(name), &arguments)
                    .await
            }
            McpMethod::ResourcesRead => {
                let uri = request
                    .params
                    .uri
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or(McpError::MissingParam("uri"))?;
                self.call(&config, caller, &request, Operation::ReadResource(uri), &arguments)
                    .await
            }
        }
    }

    /// Resolve the service type and load its configuration.
    /// `serviceType` wins; otherwise it is inferred from the job template's connection.
    pub async fn load_service(
        &self,
        service_type: Option<&str>,
        job_template_id: Option<&str>,
    ) -> Result<ServiceConfig, McpError> {
        let service_type = self.resolve_service_type(service_type, job_template_id).await?;
        self.services
            .service_config(&service_type)
            .await?
            .ok_or(McpError::ServiceNotConfigured(service_type))
    }

    async fn resolve_service_type(
        &self,
        service_type: Option<&str>,
        job_template_id: Option<&str>,
    ) -> Result<String, McpError> {
        if let Some(st) = service_type.filter(|s| !s.is_empty()) {
            return Ok(st.to_string());
        }
        if let Some(tpl) = job_template_id.filter(|s| !s.is_empty()) {
            if let Some(ct) = self.services.connection_type(tpl).await? {
                tracing::debug!(job_template = %tpl, service = %ct, "MCP gateway: service inferred from template");
                return Ok(ct);
            }
        }
        Err(McpError::ServiceTypeMissing)
    }

    pub async fn resolve_auth(
        &self,
        config: &ServiceConfig,
        caller: &AuthenticatedUser,
        owner_type: Option<OwnerType>,
        owner_id: Option<&str>,
    ) -> Result<ResolvedAuth, McpError> {
        CredentialResolver::new(self.secrets)
            .resolve(config, &caller.id, owner_type, owner_id)
            .await
    }

    async fn call(
        &self,
        config: &ServiceConfig,
        caller: &AuthenticatedUser,
        request: &CallRequest,
        operation: Operation<'_>,
        arguments: &Value,
    ) -> Result<Value, McpError> {
        let auth = self
            .resolve_auth(config, caller, request.owner_type, request.owner_id.as_deref())
            .await?;
        let spec = request::build(config, &auth, operation, arguments)?;
        let result = Dispatcher::new(self.client).execute(spec).await?;
        serde_json::to_value(result).map_err(|e| McpError::Store(e.into()))
    }
}

// ── HTTP handler ────────────────────────────────────────────────────────────

/// POST /api/mcp: MCP-style proxy call (requires a verified bearer token).
#[utoipa::path(post, path = "/api/mcp", tag = "mcp",
    request_body = Value,
    responses(
        (status = 200, description = "Tool list, resource list, tool result or resource contents", body = Value),
        (status = 401, description = "Missing or invalid bearer token", body = Value),
        (status = 402, description = "TOKEN_REQUIRED: no credential configured for the service", body = Value),
        (status = 500, description = "Any other failure", body = Value)
    )
)]
pub async fn mcp_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Bytes,
) -> GatewayOutcome {
    let request: CallRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return McpError::InvalidRequest(e.to_string()).into(),
    };
    Gateway::from_state(&state).handle(&user, request).await
}
