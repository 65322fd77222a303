//! inspect_javascript tool - list a page's scripts and search them

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tokio::sync::OnceCell;

use super::context::{ToolContext, ToolError};
use super::inspect_network::{build_http_client, read_body_capped};
use super::{Tool, ToolInputSchema, ToolResult, truncate_output};
use crate::config::HttpConfig;

const MAX_MATCHES: usize = 50;
const MATCH_LINE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
enum Script {
    External { src: String },
    Inline { code: String },
}

/// Extract `<script>` elements in document order; relative sources resolve against `base`
fn extract_scripts(html: &str, base: &reqwest::Url) -> Vec<Script> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("script") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|element| match element.value().attr("src") {
            Some(src) => Script::External {
                src: base.join(src).map(|u| u.to_string()).unwrap_or_else(|_| src.to_string()),
            },
            None => Script::Inline {
                code: element.text().collect(),
            },
        })
        .collect()
}

fn matching_lines(code: &str, pattern: &str) -> Vec<(usize, String)> {
    code.lines()
        .enumerate()
        .filter(|(_, line)| line.contains(pattern))
        .map(|(i, line)| {
            let line = line.trim();
            let shown = match line.char_indices().nth(MATCH_LINE_CHARS) {
                Some((cut, _)) => format!("{}...", &line[..cut]),
                None => line.to_string(),
            };
            (i + 1, shown)
        })
        .collect()
}

/// Page script inspector
pub struct JavaScriptInspectorTool {
    config: HttpConfig,
    max_output_chars: usize,
    client: OnceCell<reqwest::Client>,
}

impl JavaScriptInspectorTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            config: ctx.config().http.clone(),
            max_output_chars: ctx.config().max_output_chars,
            client: OnceCell::new(),
        }
    }

    pub fn factory(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(ctx))
    }

    async fn client(&self) -> Result<&reqwest::Client, ToolError> {
        self.client.get_or_try_init(|| async { build_http_client(&self.config) }).await
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ToolError> {
        let response = self.client().await?.get(url).send().await?.error_for_status()?;
        let (body, _) = read_body_capped(response, self.config.max_body_bytes).await?;
        Ok(String::from_utf8_lossy(&body).to_string())
    }

    async fn inspect(&self, input: &Value) -> Result<ToolResult, ToolError> {
        let url = input["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidInput("url is required".to_string()))?;
        let base = reqwest::Url::parse(url).map_err(|e| ToolError::InvalidInput(format!("Invalid url {}: {}", url, e)))?;
        let pattern = input["pattern"].as_str().filter(|p| !p.is_empty());
        let fetch_external = input["fetch_external"].as_bool().unwrap_or(pattern.is_some());

        let page = self.fetch_text(url).await?;
        let scripts = extract_scripts(&page, &base);
        log::debug!("inspect_javascript {}: {} scripts", url, scripts.len());

        let mut report = vec![format!("Scripts on {}: {}", url, scripts.len())];
        let mut matches = Vec::new();

        for (i, script) in scripts.iter().enumerate() {
            let index = i + 1;
            let code = match script {
                Script::Inline { code } => {
                    report.push(format!("[{}] inline ({} chars)", index, code.chars().count()));
                    Some(code.clone())
                }
                Script::External { src } if fetch_external => match self.fetch_text(src).await {
                    Ok(code) => {
                        report.push(format!("[{}] external {} ({} bytes)", index, src, code.len()));
                        Some(code)
                    }
                    Err(e) => {
                        report.push(format!("[{}] external {} (fetch failed: {})", index, src, e));
                        None
                    }
                },
                Script::External { src } => {
                    report.push(format!("[{}] external {}", index, src));
                    None
                }
            };

            if let (Some(pattern), Some(code)) = (pattern, code) {
                matches.extend(
                    matching_lines(&code, pattern)
                        .into_iter()
                        .map(|(line, text)| format!("  [{}] line {}: {}", index, line, text)),
                );
            }
        }

        if let Some(pattern) = pattern {
            report.push(String::new());
            if matches.is_empty() {
                report.push(format!("No matches for '{}'", pattern));
            } else {
                report.push(format!("Matches for '{}': {}", pattern, matches.len()));
                let total = matches.len();
                report.extend(matches.into_iter().take(MAX_MATCHES));
                if total > MAX_MATCHES {
                    report.push(format!("  ... {} more", total - MAX_MATCHES));
                }
            }
        }

        Ok(ToolResult::success(truncate_output(report.join("\n"), self.max_output_chars)))
    }
}

#[async_trait]
impl Tool for JavaScriptInspectorTool {
    fn name(&self) -> &'static str {
        "inspect_javascript"
    }

    fn schema(&self) -> ToolInputSchema {
        ToolInputSchema::new(
            "inspect_javascript",
            "List the <script> elements of a web page and search their source for a pattern",
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Page URL" },
                "pattern": { "type": "string", "description": "Substring to search for in script source" },
                "fetch_external": {
                    "type": "boolean",
                    "description": "Download external scripts (default: true when a pattern is given)"
                }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolsConfig;
    use crate::tools::ToolErrorKind;
    use crate::tools::inspect_network::test_server::{Reply, serve};
    use serde_json::json;

    const PAGE: &str = r#"<html><head>
<script src="/static/app.js"></script>
<script>window.apiKey = "abc";
console.log("ready");</script>
</head><body><p>hi</p></body></html>"#;

    fn route(_method: &str, path: &str, _body: &str) -> Reply {
        match path {
            "/" => Reply::ok("text/html", PAGE),
            "/static/app.js" => Reply::ok("application/javascript", "function init() {\n  fetch('/api/users');\n}\n"),
            _ => Reply::not_found(),
        }
    }

    fn inspector() -> JavaScriptInspectorTool {
        let mut config = ToolsConfig::default();
        config.http.system_proxy = false;
        config.http.timeout_ms = 5_000;
        let ctx = ToolContext::new(std::env::temp_dir(), "s".to_string()).with_config(config);
        JavaScriptInspectorTool::new(&ctx)
    }

    #[test]
    fn test_extract_scripts() {
        let base = reqwest::Url::parse("http://example.test/page/").unwrap();
        let scripts = extract_scripts(PAGE, &base);
        assert_eq!(scripts.len(), 2);
        assert_eq!(
            scripts[0],
            Script::External {
                src: "http://example.test/static/app.js".to_string()
            }
        );
        assert!(matches!(&scripts[1], Script::Inline { code } if code.contains("apiKey")));
    }

    #[test]
    fn test_matching_lines() {
        let found = matching_lines("a\nfetch(x)\nb\n  fetch(y)", "fetch");
        assert_eq!(found, vec![(2, "fetch(x)".to_string()), (4, "fetch(y)".to_string())]);
    }

    #[tokio::test]
    async fn test_lists_scripts() {
        let base = serve(route).await;
        let result = inspector().invoke(json!({"url": format!("{}/", base)})).await.unwrap();

        assert!(!result.is_error(), "{}", result.text());
        let text = result.text();
        assert!(text.contains("Scripts on"));
        assert!(text.contains("[1] external"));
        assert!(text.contains("[2] inline"));
    }

    #[tokio::test]
    async fn test_pattern_searches_external_and_inline() {
        let base = serve(route).await;
        let result = inspector()
            .invoke(json!({"url": format!("{}/", base), "pattern": "fetch('/api"}))
            .await
            .unwrap();
        let text = result.text();
        assert!(text.contains("Matches for"));
        assert!(text.contains("[1] line 2: fetch('/api/users');"));

        let inline = inspector()
            .invoke(json!({"url": format!("{}/", base), "pattern": "apiKey"}))
            .await
            .unwrap();
        assert!(inline.text().contains("[2] line 1"));
    }

    #[tokio::test]
    async fn test_no_matches() {
        let base = serve(route).await;
        let result = inspector()
            .invoke(json!({"url": format!("{}/", base), "pattern": "eval("}))
            .await
            .unwrap();
        assert!(result.text().contains("No matches for 'eval('"));
    }

    #[tokio::test]
    async fn test_page_error_is_tool_failed() {
        let base = serve(route).await;
        let result = inspector()
            .invoke(json!({"url": format!("{}/missing", base)}))
            .await
            .unwrap();
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolFailed));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let result = inspector().invoke(json!({"url": "not a url"})).await.unwrap();
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidInput));
    }
}
