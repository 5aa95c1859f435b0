// Connector Gateway -- config
// Runtime configuration from environment variables (.env is loaded by main).

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TranslationApi {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub database_url: String,
    pub port: u16,
    /// `SUPABASE_URL` + `SUPABASE_ANON_KEY`; when absent, static tokens are used.
    pub supabase: Option<(String, String)>,
    /// `AUTH_TOKENS="token=user,..."` for local development.
    pub static_tokens: Option<String>,
    pub encryption_key: Option<String>,
    pub translation: Option<TranslationApi>,
    pub languages_ttl: Duration,
    pub allowed_origins: Vec<String>,
}

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_LANGUAGES_TTL: Duration = Duration::from_secs(24 * 3600);

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

/// Validate an absolute http(s) base URL and strip the trailing slash.
pub fn base_url(name: &str, raw: &str) -> anyhow::Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{} must be http or https, got '{}'", name, parsed.scheme());
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = non_empty_var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL required"))?;

        let port = match non_empty_var("PORT") {
            Some(p) => p.parse()?,
            None => DEFAULT_PORT,
        };

        let supabase = match (non_empty_var("SUPABASE_URL"), non_empty_var("SUPABASE_ANON_KEY")) {
            (Some(url), Some(key)) => Some((base_url("SUPABASE_URL", &url)?, key)),
            _ => None,
        };

        let translation = match non_empty_var("TRANSLATION_API_URL") {
            Some(raw) => Some(TranslationApi {
                base_url: base_url("TRANSLATION_API_URL", &raw)?,
                api_key: non_empty_var("TRANSLATION_API_KEY"),
            }),
            None => None,
        };

        let languages_ttl = match non_empty_var("LANGUAGES_CACHE_SECS") {
            Some(s) => Duration::from_secs(s.parse()?),
            None => DEFAULT_LANGUAGES_TTL,
        };

        let allowed_origins = non_empty_var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![
                    "http://localhost:5173".to_string(),
                    "http://127.0.0.1:5173".to_string(),
                ]
            });

        Ok(Self {
            database_url,
            port,
            supabase,
            static_tokens: non_empty_var("AUTH_TOKENS"),
            encryption_key: non_empty_var("CREDENTIAL_ENCRYPTION_KEY"),
            translation,
            languages_ttl,
            allowed_origins,
        })
    }
}
