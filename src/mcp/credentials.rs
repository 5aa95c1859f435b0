// Connector Gateway -- mcp/credentials
//! Credential resolution.
//!
//! Precedence is fixed: the app-wide token for a service always wins; without
//! one, an explicit `(owner_type, owner_id)` is tried before the caller's own
//! `(user, caller_id)` token. Exactly one credential is used per call.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;

use super::config::ServiceConfig;
use super::error::{CredentialNotFound, McpError};
use crate::crypto::SecretCipher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    User,
    Team,
    Account,
}

impl OwnerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerType::User => "user",
            OwnerType::Team => "team",
            OwnerType::Account => "account",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the secret is presented upstream. Unknown tags are kept and sent as bearer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthType {
    ApiKey,
    Basic,
    Oauth,
    Bearer,
    Other(String),
}

impl From<&str> for AuthType {
    fn from(tag: &str) -> Self {
        match tag {
            "api_key" => AuthType::ApiKey,
            "basic" => AuthType::Basic,
            "oauth" => AuthType::Oauth,
            "bearer" => AuthType::Bearer,
            other => AuthType::Other(other.to_string()),
        }
    }
}

/// A stored secret plus the metadata needed to present it.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub secret: String,
    pub auth_type: AuthType,
    /// Free-form, e.g. `{ "headerName": "X-Api-Key" }` or `{ "username": "svc" }`.
    pub auth_config: Value,
    pub endpoint: Option<String>,
}

impl Credential {
    pub fn new(secret: &str, auth_type: &str) -> Self {
        Self {
            secret: secret.to_string(),
            auth_type: AuthType::from(auth_type),
            auth_config: json!({}),
            endpoint: None,
        }
    }

    pub fn with_auth_config(mut self, auth_config: Value) -> Self {
        self.auth_config = auth_config;
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }
}

/// The credential chosen for one call. Carries no provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAuth {
    pub secret: String,
    pub auth_type: AuthType,
    pub auth_config: Value,
    /// `None` means "use the service's default endpoint".
    pub endpoint: Option<String>,
}

impl ResolvedAuth {
    pub fn effective_endpoint<'a>(&'a self, config: &'a ServiceConfig) -> &'a str {
        self.endpoint.as_deref().unwrap_or(&config.endpoint)
    }
}

// ── Store seam ──────────────────────────────────────────────────────────────

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn app_credential(&self, service_type: &str) -> anyhow::Result<Option<Credential>>;

    async fn owner_credential(
        &self,
        service_type: &str,
        owner_type: OwnerType,
        owner_id: &str,
    ) -> anyhow::Result<Option<Credential>>;
}

// ── Resolver ────────────────────────────────────────────────────────────────

pub struct CredentialResolver<'a> {
    store: &'a dyn SecretStore,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(store: &'a dyn SecretStore) -> Self {
        Self { store }
    }

    pub async fn resolve(
        &self,
        service: &ServiceConfig,
        calling_user: &str,
        owner_type: Option<OwnerType>,
        owner_id: Option<&str>,
    ) -> Result<ResolvedAuth, McpError> {
        let service_type = service.service_type.as_str();

        if let Some(cred) = self.store.app_credential(service_type).await? {
            tracing::debug!(service = %service_type, "credentials: using app token");
            return Ok(ResolvedAuth {
                secret: cred.secret,
                auth_type: cred.auth_type,
                auth_config: cred.auth_config,
                endpoint: None,
            });
        }

        let mut candidates: Vec<(OwnerType, &str)> = Vec::with_capacity(2);
        if let (Some(ot), Some(oid)) = (owner_type, owner_id) {
            candidates.push((ot, oid));
        }
        candidates.push((OwnerType::User, calling_user));

        for (ot, oid) in candidates {
            if let Some(cred) = self.store.owner_credential(service_type, ot, oid).await? {
                tracing::debug!(
                    service = %service_type,
                    owner_type = %ot,
                    "credentials: using owner token"
                );
                return Ok(ResolvedAuth {
                    secret: cred.secret,
                    auth_type: cred.auth_type,
                    auth_config: cred.auth_config,
                    endpoint: cred.endpoint,
                });
            }
        }

        tracing::info!(service = %service_type, "credentials: no token configured");
        Err(CredentialNotFound::new(service_type, service.uses_app_token).into())
    }
}

// ── Postgres ────────────────────────────────────────────────────────────────

#[derive(FromRow)]
struct CredentialRow {
    secret: String,
    auth_type: String,
    auth_config: Option<Json<Value>>,
    endpoint: Option<String>,
}

pub struct PgSecretStore {
    db: PgPool,
    cipher: SecretCipher,
}

impl PgSecretStore {
    pub fn new(db: PgPool, cipher: SecretCipher) -> Self {
        Self { db, cipher }
    }

    fn credential_from_row(&self, row: CredentialRow) -> anyhow::Result<Credential> {
        Ok(Credential {
            secret: self.cipher.decrypt(&row.secret)?,
            auth_type: AuthType::from(row.auth_type.as_str()),
            auth_config: row.auth_config.map(|j| j.0).unwrap_or_else(|| json!({})),
            endpoint: row.endpoint.filter(|e| !e.is_empty()),
        })
    }
}

#[async_trait]
impl SecretStore for PgSecretStore {
    async fn app_credential(&self, service_type: &str) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT secret, auth_type, auth_config, NULL::text AS endpoint \
             FROM mcp_app_tokens WHERE service_type = $1 AND secret <> ''",
        )
        .bind(service_type)
        .fetch_optional(&self.db)
        .await?;
        row.map(|r| self.credential_from_row(r)).transpose()
    }

    async fn owner_credential(
        &self,
        service_type: &str,
        owner_type: OwnerType,
        owner_id: &str,
    ) -> anyhow::Result<Option<Credential>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT secret, auth_type, auth_config, endpoint FROM mcp_owner_tokens \
             WHERE service_type = $1 AND owner_type = $2 AND owner_id = $3 AND secret <> ''",
        )
        .bind(service_type)
        .bind(owner_type.as_str())
        .bind(owner_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(|r| self.credential_from_row(r)).transpose()
    }
}

// ── In-memory ───────────────────────────────────────────────────────────────

/// Map-backed store. Counts lookups so callers can assert the resolver was
/// (or was not) consulted.
#[derive(Default)]
pub struct InMemorySecretStore {
    app: HashMap<String, Credential>,
    owner: HashMap<(String, OwnerType, String), Credential>,
    lookups: AtomicUsize,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app_credential(mut self, service_type: &str, cred: Credential) -> Self {
        self.app.insert(service_type.to_string(), cred);
        self
    }

    pub fn with_owner_credential(
        mut self,
        service_type: &str,
        owner_type: OwnerType,
        owner_id: &str,
        cred: Credential,
    ) -> Self {
        self.owner.insert(
            (service_type.to_string(), owner_type, owner_id.to_string()),
            cred,
        );
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn app_credential(&self, service_type: &str) -> anyhow::Result<Option<Credential>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.app.get(service_type).cloned())
    }

    async fn owner_credential(
        &self,
        service_type: &str,
        owner_type: OwnerType,
        owner_id: &str,
    ) -> anyhow::Result<Option<Credential>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .owner
            .get(&(service_type.to_string(), owner_type, owner_id.to_string()))
            .cloned())
    }
}
