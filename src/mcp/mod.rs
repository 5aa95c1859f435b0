// Connector Gateway -- mcp
//! MCP-style proxy to third-party service APIs.
//!
//! A call names a service (directly or through a job template's connection),
//! one of `tools/list`, `tools/call`, `resources/list`, `resources/read`, and
//! method-specific parameters. The pipeline is:
//!
//! **Config** (`config`): declarative `ServiceConfig` (endpoint + tools +
//! resources) loaded through the `ServiceDirectory` seam.
//!
//! **Credentials** (`credentials`): picks exactly one secret per call, app-wide
//! token first, then the explicit owner, then the caller's personal token.
//!
//! **Request** (`request`): turns a tool/resource definition plus arguments
//! into a concrete authenticated HTTP request.
//!
//! **Dispatch** (`dispatch`): sends it and normalizes the upstream JSON into
//! MCP `content` / `contents` shapes.
//!
//! **Gateway** (`gateway`): the HTTP entry point that ties it together and
//! maps failures to the `TOKEN_REQUIRED` / generic error responses.

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod request;

pub use config::{ResourceDefinition, ServiceConfig, ServiceDirectory, ToolDefinition};
pub use credentials::{AuthType, Credential, CredentialResolver, OwnerType, ResolvedAuth, SecretStore};
pub use error::{CredentialNotFound, McpError};
pub use gateway::{CallRequest, Gateway, GatewayOutcome};
