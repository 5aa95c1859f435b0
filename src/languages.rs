// Connector Gateway -- languages
//
// Supported UI/translation languages. Fetched from the translation API when
// one is configured and kept in an `ExpiringCache` on `AppState`; otherwise a
// built-in list is served.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::TranslationApi;
use crate::handlers::ApiError;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Language {
    #[serde(alias = "language")]
    pub code: String,
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LanguagesResponse {
    pub languages: Vec<Language>,
    pub cached: bool,
}

const BUILTIN_LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("de", "German"),
    ("fr", "French"),
    ("es", "Spanish"),
    ("it", "Italian"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
];

pub fn builtin_languages() -> Vec<Language> {
    BUILTIN_LANGUAGES
        .iter()
        .map(|(code, name)| Language {
            code: code.to_string(),
            name: name.to_string(),
        })
        .collect()
}

async fn fetch_languages(
    client: &reqwest::Client,
    api: &TranslationApi,
) -> Result<Vec<Language>, String> {
    let mut req = client.get(format!("{}/languages", api.base_url));
    if let Some(key) = &api.api_key {
        req = req.bearer_auth(key);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| format!("Translation API request failed: {}", e))?;
    if !resp.status().is_success() {
        return Err(format!("Translation API returned {}", resp.status()));
    }

    let mut languages: Vec<Language> = resp
        .json()
        .await
        .map_err(|e| format!("Failed to parse languages: {}", e))?;
    for lang in &mut languages {
        lang.code = lang.code.to_lowercase();
    }
    Ok(languages)
}

/// GET /api/languages
#[utoipa::path(get, path = "/api/languages", tag = "languages",
    responses(
        (status = 200, description = "Supported languages", body = LanguagesResponse),
        (status = 502, description = "Translation API unavailable", body = serde_json::Value)
    )
)]
pub async fn list_languages(
    State(state): State<AppState>,
) -> Result<Json<LanguagesResponse>, ApiError> {
    let Some(api) = &state.translation else {
        return Ok(Json(LanguagesResponse {
            languages: builtin_languages(),
            cached: false,
        }));
    };

    if let Some(languages) = state.languages.read().await.get() {
        return Ok(Json(LanguagesResponse {
            languages,
            cached: true,
        }));
    }

    let languages = fetch_languages(&state.client, api)
        .await
        .map_err(ApiError::Upstream)?;
    tracing::info!("languages: fetched {} from translation API", languages.len());
    state.languages.write().await.put(languages.clone());

    Ok(Json(LanguagesResponse {
        languages,
        cached: false,
    }))
}
