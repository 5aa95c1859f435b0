// Connector Gateway -- state
// Application state shared by all handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::auth::{IdentityProvider, StaticTokenIdentity, SupabaseIdentity};
use crate::cache::{Clock, ExpiringCache, SystemClock};
use crate::config::{GatewayConfig, TranslationApi};
use crate::crypto::SecretCipher;
use crate::languages::Language;
use crate::mcp::config::PgServiceDirectory;
use crate::mcp::credentials::PgSecretStore;
use crate::mcp::{SecretStore, ServiceDirectory};

/// Central application state. Clone-friendly: everything behind Arc.
///
/// Credentials and service configs are read-only per request; the only
/// mutable piece is the supported-languages cache.
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<dyn ServiceDirectory>,
    pub secrets: Arc<dyn SecretStore>,
    pub identity: Arc<dyn IdentityProvider>,
    pub client: Client,
    pub start_time: Instant,
    /// `true` once startup completes.
    pub ready: Arc<AtomicBool>,
    pub translation: Option<TranslationApi>,
    pub languages: Arc<RwLock<ExpiringCache<Vec<Language>>>>,
}

impl AppState {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
        tracing::info!("Backend marked as READY");
    }
}

/// Shared outbound client. Only a connect timeout: upstream calls are not
/// cut short by the gateway.
pub fn build_http_client() -> reqwest::Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .connect_timeout(Duration::from_secs(5))
        .build()
}

impl AppState {
    pub fn new(db: PgPool, config: &GatewayConfig) -> anyhow::Result<Self> {
        let client = build_http_client()?;

        let cipher = SecretCipher::new(config.encryption_key.as_deref());
        if cipher.is_enabled() {
            tracing::info!("CREDENTIAL_ENCRYPTION_KEY configured, stored secrets are decrypted on read");
        }

        let identity: Arc<dyn IdentityProvider> = match &config.supabase {
            Some((url, anon_key)) => {
                tracing::info!("Auth: verifying bearer tokens against Supabase at {}", url);
                Arc::new(SupabaseIdentity::new(client.clone(), url, anon_key))
            }
            None => {
                let tokens = StaticTokenIdentity::parse(config.static_tokens.as_deref().unwrap_or(""));
                if tokens.is_empty() {
                    tracing::warn!("Auth: no SUPABASE_URL and no AUTH_TOKENS, every protected request will be rejected");
                } else {
                    tracing::info!("Auth: using static AUTH_TOKENS (development mode)");
                }
                Arc::new(tokens)
            }
        };

        let mut state = Self::from_parts(
            Arc::new(PgServiceDirectory::new(db.clone())),
            Arc::new(PgSecretStore::new(db, cipher)),
            identity,
            client,
        )
        .with_languages_cache(config.languages_ttl, Arc::new(SystemClock));
        state.translation = config.translation.clone();

        tracing::info!(
            "AppState initialised, translation API: {}",
            state.translation.as_ref().map(|t| t.base_url.as_str()).unwrap_or("none (built-in list)")
        );
        Ok(state)
    }

    /// Assemble state from explicit collaborators (used by `new` and by tests).
    pub fn from_parts(
        services: Arc<dyn ServiceDirectory>,
        secrets: Arc<dyn SecretStore>,
        identity: Arc<dyn IdentityProvider>,
        client: Client,
    ) -> Self {
        Self {
            services,
            secrets,
            identity,
            client,
            start_time: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
            translation: None,
            languages: Arc::new(RwLock::new(ExpiringCache::new(
                Duration::from_secs(24 * 3600),
                Arc::new(SystemClock),
            ))),
        }
    }

    pub fn with_translation(mut self, translation: TranslationApi) -> Self {
        self.translation = Some(translation);
        self
    }

    pub fn with_languages_cache(mut self, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        self.languages = Arc::new(RwLock::new(ExpiringCache::new(ttl, clock)));
        self
    }
}
