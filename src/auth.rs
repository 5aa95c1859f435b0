// Connector Gateway -- auth
// Bearer token authentication middleware.
// Every protected route requires `Authorization: Bearer <token>`, verified by
// the configured identity provider. The verified user is stored in request
// extensions for handlers to pick up via `Extension<AuthenticatedUser>`.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use reqwest::Client;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::mcp::{GatewayOutcome, McpError};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: Option<String>,
}

/// Verifies a bearer token and returns the user it belongs to.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means the token is invalid; `Err` means the provider could not be reached.
    async fn verify(&self, token: &str) -> anyhow::Result<Option<AuthenticatedUser>>;
}

// ── Supabase Auth ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SupabaseUser {
    id: String,
    email: Option<String>,
}

/// Validates JWTs by asking Supabase Auth (`GET /auth/v1/user`).
pub struct SupabaseIdentity {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseIdentity {
    pub fn new(client: Client, base_url: &str, anon_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn verify(&self, token: &str) -> anyhow::Result<Option<AuthenticatedUser>> {
        let resp = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("Supabase auth returned {}", status);
        }

        let user: SupabaseUser = resp.json().await?;
        Ok(Some(AuthenticatedUser {
            id: user.id,
            email: user.email,
        }))
    }
}

// ── Static tokens ───────────────────────────────────────────────────────────

/// Fixed token → user id map, for local development and tests.
/// Parsed from `AUTH_TOKENS="token1=user1,token2=user2"`.
#[derive(Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, String>,
}

impl StaticTokenIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, user_id: &str) -> Self {
        self.tokens.insert(token.to_string(), user_id.to_string());
        self
    }

    pub fn parse(pairs: &str) -> Self {
        let tokens = pairs
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .map(|(t, u)| (t.trim().to_string(), u.trim().to_string()))
            .filter(|(t, u)| !t.is_empty() && !u.is_empty())
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn verify(&self, token: &str) -> anyhow::Result<Option<AuthenticatedUser>> {
        let user = self
            .tokens
            .iter()
            .find(|(known, _)| bool::from(known.as_bytes().ct_eq(token.as_bytes())))
            .map(|(_, user_id)| AuthenticatedUser {
                id: user_id.clone(),
                email: None,
            });
        Ok(user)
    }
}

// ── Middleware ──────────────────────────────────────────────────────────────

fn unauthorized(reason: &str) -> Response {
    GatewayOutcome::from(McpError::Unauthorized(reason.to_string())).into_response()
}

/// Rejects requests without a valid bearer token; otherwise attaches the user.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from);

    let Some(token) = token else {
        tracing::warn!("Auth failed: missing or malformed Authorization header");
        return unauthorized("missing bearer token");
    };

    match state.identity.verify(&token).await {
        Ok(Some(user)) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Ok(None) => {
            tracing::warn!("Auth failed: invalid token");
            unauthorized("invalid token")
        }
        Err(e) => {
            tracing::warn!("Auth failed: identity provider error: {}", e);
            unauthorized("token could not be verified")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_tokens_parse_and_verify() {
        let identity = StaticTokenIdentity::parse("tok-a=U1, tok-b = U2,broken,=nobody");
        assert!(!identity.is_empty());
        assert_eq!(identity.verify("tok-a").await.unwrap().unwrap().id, "U1");
        assert_eq!(identity.verify("tok-b").await.unwrap().unwrap().id, "U2");
        assert!(identity.verify("tok-c").await.unwrap().is_none());
        assert!(identity.verify("").await.unwrap().is_none());
    }

    #[test]
    fn test_empty_spec_yields_no_tokens() {
        assert!(StaticTokenIdentity::parse("").is_empty());
    }
}
