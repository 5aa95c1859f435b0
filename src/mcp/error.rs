//! Error taxonomy for the MCP pipeline.

/// No credential could be resolved for a service.
///
/// Carried all the way to the HTTP boundary, where it becomes the
/// `TOKEN_REQUIRED` (402) response instead of a generic error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CredentialNotFound {
    pub service_type: String,
    pub message: String,
    /// Whether the service is set up to run on a shared app-wide token.
    pub uses_app_token: bool,
}

impl CredentialNotFound {
    pub fn new(service_type: &str, uses_app_token: bool) -> Self {
        let message = if uses_app_token {
            format!(
                "The shared {} token has not been configured. Ask an administrator to add it.",
                service_type
            )
        } else {
            format!(
                "No {} token found for your account. Add one in Connections to use this service.",
                service_type
            )
        };
        Self {
            service_type: service_type.to_string(),
            message,
            uses_app_token,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("serviceType is required (directly or via a jobTemplateId linked to a connection)")]
    ServiceTypeMissing,

    #[error("Service '{0}' is not configured")]
    ServiceNotConfigured(String),

    #[error(transparent)]
    CredentialNotFound(#[from] CredentialNotFound),

    #[error("Missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Resource '{0}' not found")]
    ResourceNotFound(String),

    #[error("Invalid HTTP method '{0}' in tool definition")]
    InvalidMethod(String),

    #[error("Invalid header '{0}' in auth config")]
    InvalidHeader(String),

    #[error("Upstream API returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    Store(#[from] anyhow::Error),
}
