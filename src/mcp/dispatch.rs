// Connector Gateway -- mcp/dispatch
//! Sends a built request upstream and normalizes the reply.
//!
//! A single attempt is made. Non-2xx responses become `McpError::Upstream`
//! carrying the status and raw body text.

use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::error::McpError;
use super::request::{HttpRequestSpec, ReplyShape};

/// MCP-shaped success payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NormalizedResult {
    ToolContent { content: Vec<ContentBlock> },
    ResourceContents { contents: Vec<ResourceContent> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

pub struct Dispatcher<'a> {
    client: &'a Client,
}

impl<'a> Dispatcher<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn execute(&self, spec: HttpRequestSpec) -> Result<NormalizedResult, McpError> {
        tracing::info!(method = %spec.method, url = %spec.url, "dispatch: upstream request");

        let mut req = self
            .client
            .request(spec.method.clone(), &spec.url)
            .headers(spec.headers);
        if let Some(body) = spec.body {
            req = req.body(body);
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            tracing::warn!(
                status = status.as_u16(),
                url = %spec.url,
                "dispatch: upstream returned error"
            );
            return Err(McpError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        tracing::debug!(status = status.as_u16(), bytes = text.len(), "dispatch: upstream ok");
        Ok(normalize(&text, spec.reply))
    }
}

/// Pretty-print the upstream body into the shape the caller asked for.
/// Bodies that are not JSON are carried as a JSON string; an empty body is `null`.
pub fn normalize(body: &str, reply: ReplyShape) -> NormalizedResult {
    let value: Value = if body.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
    };
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string());

    match reply {
        ReplyShape::ToolContent => NormalizedResult::ToolContent {
            content: vec![ContentBlock { kind: "text", text }],
        },
        ReplyShape::ResourceContents { uri, mime_type } => NormalizedResult::ResourceContents {
            contents: vec![ResourceContent { uri, mime_type, text }],
        },
    }
}
