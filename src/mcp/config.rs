// Connector Gateway -- mcp/config
//! Service configuration: which tools and resources an integration exposes,
//! and where its API lives.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

/// Declarative description of one external integration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub service_type: String,
    /// Base endpoint; may itself contain `{placeholders}`.
    pub endpoint: String,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
    #[serde(default)]
    pub uses_app_token: bool,
}

impl ServiceConfig {
    pub fn find_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// First resource whose URI template is a prefix of `uri`.
    pub fn find_resource(&self, uri: &str) -> Option<&ResourceDefinition> {
        self.resources.iter().find(|r| uri.starts_with(&r.uri))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_method")]
    pub method: String,
    /// Relative path template, e.g. `/tickets/{ticketId}`.
    pub path: String,
    #[serde(default = "default_input_schema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// URI prefix, e.g. `freshservice://tickets/`.
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub path: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_input_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn default_mime_type() -> String {
    "application/json".to_string()
}

// ── Lookup seam ─────────────────────────────────────────────────────────────

/// Where service configurations and job-template links come from.
#[async_trait]
pub trait ServiceDirectory: Send + Sync {
    async fn service_config(&self, service_type: &str) -> anyhow::Result<Option<ServiceConfig>>;

    /// `connection_type` of the connection linked to a job template.
    async fn connection_type(&self, job_template_id: &str) -> anyhow::Result<Option<String>>;
}

// ── Postgres ────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct ServiceConfigRow {
    service_type: String,
    endpoint: String,
    tools: Json<Vec<ToolDefinition>>,
    resources: Json<Vec<ResourceDefinition>>,
    uses_app_token: bool,
}

pub struct PgServiceDirectory {
    db: PgPool,
}

impl PgServiceDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ServiceDirectory for PgServiceDirectory {
    async fn service_config(&self, service_type: &str) -> anyhow::Result<Option<ServiceConfig>> {
        let row = sqlx::query_as::<_, ServiceConfigRow>(
            "SELECT service_type, endpoint, tools, resources, uses_app_token \
             FROM mcp_service_configs WHERE service_type = $1",
        )
        .bind(service_type)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|r| ServiceConfig {
            service_type: r.service_type,
            endpoint: r.endpoint,
            tools: r.tools.0,
            resources: r.resources.0,
            uses_app_token: r.uses_app_token,
        }))
    }

    async fn connection_type(&self, job_template_id: &str) -> anyhow::Result<Option<String>> {
        let connection_type = sqlx::query_scalar::<_, String>(
            "SELECT c.connection_type FROM job_templates jt \
             JOIN connections c ON c.id = jt.connection_id \
             WHERE jt.id::text = $1",
        )
        .bind(job_template_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(connection_type)
    }
}

// ── In-memory ───────────────────────────────────────────────────────────────

/// Fixed set of services, used for tests and for running without a database.
#[derive(Default)]
pub struct InMemoryServiceDirectory {
    services: HashMap<String, ServiceConfig>,
    templates: HashMap<String, String>,
}

impl InMemoryServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, config: ServiceConfig) -> Self {
        self.services.insert(config.service_type.clone(), config);
        self
    }

    /// Link a job template to a connection of the given type.
    pub fn with_job_template(mut self, job_template_id: &str, connection_type: &str) -> Self {
        self.templates
            .insert(job_template_id.to_string(), connection_type.to_string());
        self
    }
}

#[async_trait]
impl ServiceDirectory for InMemoryServiceDirectory {
    async fn service_config(&self, service_type: &str) -> anyhow::Result<Option<ServiceConfig>> {
        Ok(self.services.get(service_type).cloned())
    }

    async fn connection_type(&self, job_template_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self.templates.get(job_template_id).cloned())
    }
}
