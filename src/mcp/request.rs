// Connector Gateway -- mcp/request
//! Builds concrete HTTP requests from tool/resource definitions.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use regex::{Captures, Regex};
use reqwest::Method;
use serde_json::Value;

use super::config::ServiceConfig;
use super::credentials::{AuthType, ResolvedAuth};
use super::error::McpError;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

/// What the caller asked for.
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    CallTool(&'a str),
    ReadResource(&'a str),
}

/// How the dispatcher should shape a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyShape {
    ToolContent,
    ResourceContents { uri: String, mime_type: String },
}

/// A fully-built upstream request.
#[derive(Debug, Clone)]
pub struct HttpRequestSpec {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
    pub reply: ReplyShape,
}

pub fn build(
    config: &ServiceConfig,
    auth: &ResolvedAuth,
    operation: Operation<'_>,
    arguments: &Value,
) -> Result<HttpRequestSpec, McpError> {
    let endpoint = auth.effective_endpoint(config);

    let (method, path, body, reply) = match operation {
        Operation::CallTool(name) => {
            let tool = config
                .find_tool(name)
                .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
            let method = Method::from_bytes(tool.method.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| McpError::InvalidMethod(tool.method.clone()))?;
            let body = if method == Method::GET {
                None
            } else {
                Some(arguments.to_string())
            };
            (method, tool.path.as_str(), body, ReplyShape::ToolContent)
        }
        Operation::ReadResource(uri) => {
            let resource = config
                .find_resource(uri)
                .ok_or_else(|| McpError::ResourceNotFound(uri.to_string()))?;
            let reply = ReplyShape::ResourceContents {
                uri: uri.to_string(),
                mime_type: resource.mime_type.clone(),
            };
            (Method::GET, resource.path.as_str(), None, reply)
        }
    };

    let url = substitute_placeholders(&format!("{}{}", endpoint, path), arguments);

    Ok(HttpRequestSpec {
        method,
        url,
        headers: auth_headers(auth)?,
        body,
        reply,
    })
}

/// Replace every `{key}` with the URL-encoded `arguments[key]`.
/// Placeholders without a matching argument are left as-is.
pub fn substitute_placeholders(template: &str, arguments: &Value) -> String {
    let re = PLACEHOLDER_RE
        .get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder regex is valid"));
    re.replace_all(template, |caps: &Captures| {
        match arguments.get(&caps[1]) {
            Some(value) => urlencoding::encode(&argument_to_string(value)).into_owned(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

fn argument_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// `Content-Type: application/json` plus the auth header for `auth`'s type.
pub fn auth_headers(auth: &ResolvedAuth) -> Result<HeaderMap, McpError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let (name, value) = match &auth.auth_type {
        AuthType::ApiKey => {
            let custom = auth
                .auth_config
                .get("headerName")
                .and_then(Value::as_str)
                .filter(|h| !h.trim().is_empty());
            match custom {
                Some(header) => {
                    let name = HeaderName::from_bytes(header.trim().as_bytes())
                        .map_err(|_| McpError::InvalidHeader(header.to_string()))?;
                    (name, auth.secret.clone())
                }
                None => (AUTHORIZATION, format!("Bearer {}", auth.secret)),
            }
        }
        AuthType::Basic => {
            let username = auth
                .auth_config
                .get("username")
                .and_then(Value::as_str)
                .unwrap_or("");
            let encoded = STANDARD.encode(format!("{}:{}", username, auth.secret));
            (AUTHORIZATION, format!("Basic {}", encoded))
        }
        AuthType::Oauth | AuthType::Bearer | AuthType::Other(_) => {
            (AUTHORIZATION, format!("Bearer {}", auth.secret))
        }
    };

    let value = HeaderValue::from_str(&value)
        .map_err(|_| McpError::InvalidHeader(name.to_string()))?;
    headers.insert(name, value);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ServiceConfig {
        serde_json::from_value(json!({
            "serviceType": "freshservice",
            "endpoint": "https://acme.freshservice.com/api/v2",
            "tools": [
                { "name": "get_ticket", "method": "GET", "path": "/tickets/{id}" },
                { "name": "add_note", "method": "post", "path": "/tickets/{id}/notes" }
            ],
            "resources": [
                { "uri": "freshservice://tickets", "name": "Tickets", "path": "/tickets", "mimeType": "application/json" }
            ]
        }))
        .unwrap()
    }

    fn auth(auth_type: &str, auth_config: Value) -> ResolvedAuth {
        ResolvedAuth {
            secret: "pw".to_string(),
            auth_type: AuthType::from(auth_type),
            auth_config,
            endpoint: None,
        }
    }

    #[test]
    fn test_path_substitution() {
        let spec = build(
            &config(),
            &auth("bearer", json!({})),
            Operation::CallTool("get_ticket"),
            &json!({ "id": 42 }),
        )
        .unwrap();
        assert!(spec.url.ends_with("/tickets/42"));
        assert_eq!(spec.method, Method::GET);
        assert!(spec.body.is_none());
        assert_eq!(spec.reply, ReplyShape::ToolContent);
    }

    #[test]
    fn test_missing_argument_leaves_placeholder_literal() {
        let spec = build(
            &config(),
            &auth("bearer", json!({})),
            Operation::CallTool("get_ticket"),
            &json!({}),
        )
        .unwrap();
        assert!(spec.url.ends_with("/tickets/{id}"));
    }

    #[test]
    fn test_substituted_values_are_url_encoded() {
        assert_eq!(
            substitute_placeholders("/search/{q}/{n}", &json!({ "q": "a b/c", "n": true })),
            "/search/a%20b%2Fc/true"
        );
    }

    #[test]
    fn test_non_get_tool_sends_arguments_as_body() {
        let spec = build(
            &config(),
            &auth("bearer", json!({})),
            Operation::CallTool("add_note"),
            &json!({ "id": 7, "body": "hello" }),
        )
        .unwrap();
        assert_eq!(spec.method, Method::POST);
        assert!(spec.url.ends_with("/tickets/7/notes"));
        let body: Value = serde_json::from_str(spec.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["body"], "hello");
    }

    #[test]
    fn test_unknown_tool_fails() {
        let err = build(
            &config(),
            &auth("bearer", json!({})),
            Operation::CallTool("delete_everything"),
            &json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(name) if name == "delete_everything"));
    }

    #[test]
    fn test_resource_read_matches_prefix() {
        let spec = build(
            &config(),
            &auth("bearer", json!({})),
            Operation::ReadResource("freshservice://tickets/open"),
            &json!({}),
        )
        .unwrap();
        assert_eq!(spec.method, Method::GET);
        assert_eq!(spec.url, "https://acme.freshservice.com/api/v2/tickets");
        assert_eq!(
            spec.reply,
            ReplyShape::ResourceContents {
                uri: "freshservice://tickets/open".to_string(),
                mime_type: "application/json".to_string(),
            }
        );

        let err = build(
            &config(),
            &auth("bearer", json!({})),
            Operation::ReadResource("jira://issues"),
            &json!({}),
        )
        .unwrap_err();
        assert!(matches!(err, McpError::ResourceNotFound(_)));
    }

    #[test]
    fn test_endpoint_override_wins() {
        let mut resolved = auth("bearer", json!({}));
        resolved.endpoint = Some("https://tenant.example/api".to_string());
        let spec = build(&config(), &resolved, Operation::CallTool("get_ticket"), &json!({ "id": 1 }))
            .unwrap();
        assert_eq!(spec.url, "https://tenant.example/api/tickets/1");
    }

    #[test]
    fn test_api_key_with_custom_header() {
        let spec = build(
            &config(),
            &auth("api_key", json!({ "headerName": "X-Api-Key" })),
            Operation::CallTool("get_ticket"),
            &json!({ "id": 1 }),
        )
        .unwrap();
        assert_eq!(spec.headers.get("x-api-key").unwrap(), "pw");
        assert!(spec.headers.get(AUTHORIZATION).is_none());
        assert_eq!(spec.headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_api_key_without_header_name_uses_bearer() {
        let spec = build(
            &config(),
            &auth("api_key", json!({})),
            Operation::CallTool("get_ticket"),
            &json!({ "id": 1 }),
        )
        .unwrap();
        assert_eq!(spec.headers.get(AUTHORIZATION).unwrap(), "Bearer pw");
    }

    #[test]
    fn test_basic_auth_encodes_username_and_secret() {
        let spec = build(
            &config(),
            &auth("basic", json!({ "username": "svc" })),
            Operation::CallTool("get_ticket"),
            &json!({ "id": 1 }),
        )
        .unwrap();
        let expected = format!("Basic {}", STANDARD.encode("svc:pw"));
        assert_eq!(spec.headers.get(AUTHORIZATION).unwrap(), expected.as_str());

        let no_user = build(
            &config(),
            &auth("basic", json!({})),
            Operation::CallTool("get_ticket"),
            &json!({ "id": 1 }),
        )
        .unwrap();
        let expected = format!("Basic {}", STANDARD.encode(":pw"));
        assert_eq!(no_user.headers.get(AUTHORIZATION).unwrap(), expected.as_str());
    }

    #[test]
    fn test_oauth_and_unknown_types_use_bearer() {
        for auth_type in ["oauth", "bearer", "something_else"] {
            let spec = build(
                &config(),
                &auth(auth_type, json!({})),
                Operation::CallTool("get_ticket"),
                &json!({ "id": 1 }),
            )
            .unwrap();
            assert_eq!(spec.headers.get(AUTHORIZATION).unwrap(), "Bearer pw");
        }
    }
}
