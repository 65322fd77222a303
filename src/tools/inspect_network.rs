//! inspect_network tool - issue one HTTP request and report what came back

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;

use super::context::{ToolContext, ToolError};
use super::{Tool, ToolInputSchema, ToolResult};
use crate::config::HttpConfig;

const BODY_PREVIEW_CHARS: usize = 2_000;

/// Build the shared HTTP client from settings
pub(crate) fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client, ToolError> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .user_agent(config.user_agent.clone());
    if !config.system_proxy {
        builder = builder.no_proxy();
    }
    Ok(builder.build()?)
}

/// Read a response body, stopping once `limit` bytes have arrived
pub(crate) async fn read_body_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<(Vec<u8>, bool), ToolError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit.saturating_sub(body.len());
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

#[derive(Debug, Serialize)]
struct NetworkReport {
    url: String,
    final_url: String,
    method: String,
    status: u16,
    status_text: String,
    elapsed_ms: u64,
    headers: BTreeMap<String, String>,
    body_bytes: usize,
    body_truncated: bool,
    body_preview: String,
}

/// Single-request HTTP inspector
pub struct NetworkInspectorTool {
    config: HttpConfig,
    client: OnceCell<reqwest::Client>,
}

impl NetworkInspectorTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            config: ctx.config().http.clone(),
            client: OnceCell::new(),
        }
    }

    pub fn factory(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(ctx))
    }

    async fn client(&self) -> Result<&reqwest::Client, ToolError> {
        self.client.get_or_try_init(|| async { build_http_client(&self.config) }).await
    }

    async fn inspect(&self, input: &Value) -> Result<ToolResult, ToolError> {
        let url = input["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidInput("url is required".to_string()))?;
        let method_name = input["method"].as_str().unwrap_or("GET").to_uppercase();
        let method = reqwest::Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ToolError::InvalidInput(format!("Invalid HTTP method: {}", method_name)))?;

        let mut request = self.client().await?.request(method, url);
        if let Some(headers) = input["headers"].as_object() {
            for (name, value) in headers {
                let value = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                request = request.header(name.as_str(), value);
            }
        }
        if let Some(body) = input["body"].as_str() {
            request = request.body(body.to_string());
        }

        let start = Instant::now();
        let response = request.send().await?;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let status = response.status();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).to_string()))
            .collect();
        let (body, body_truncated) = read_body_capped(response, self.config.max_body_bytes).await?;

        let text = String::from_utf8_lossy(&body);
        let body_preview = match text.char_indices().nth(BODY_PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &text[..cut]),
            None => text.to_string(),
        };

        let report = NetworkReport {
            url: url.to_string(),
            final_url,
            method: method_name,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            elapsed_ms,
            headers,
            body_bytes: body.len(),
            body_truncated,
            body_preview,
        };
        log::debug!("inspect_network {} {} -> {}", report.method, report.url, report.status);

        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| ToolError::InvalidInput(format!("Failed to encode report: {}", e)))?;
        Ok(ToolResult::success(json))
    }
}

#[async_trait]
impl Tool for NetworkInspectorTool {
    fn name(&self) -> &'static str {
        "inspect_network"
    }

    fn schema(&self) -> ToolInputSchema {
        ToolInputSchema::new(
            "inspect_network",
            "Send an HTTP request and report status, timing, headers and a preview of the body",
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "URL to request" },
                "method": { "type": "string", "description": "HTTP method (default GET)" },
                "headers": { "type": "object", "description": "Request headers" },
                "body": { "type": "string", "description": "Request body" }
            },
            "required": ["url"]
        }))
    }

    async fn invoke(&self, input: Value) -> Result<ToolResult, eyre::Error> {
        if let Err(message) = self.schema().validate(&input) {
            return Ok(ToolResult::invalid_input(message));
        }
        Ok(self.inspect(&input).await.unwrap_or_else(ToolResult::from))
    }
}
