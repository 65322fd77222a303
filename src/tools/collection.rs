//! Tool collection - the per-session registry and call dispatcher

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarnessError, Result};

use super::context::ToolContext;
use super::groups::{ToolGroup, tool_group};
use super::result::{ToolErrorKind, ToolResult};
use super::schema::ToolInputSchema;
use super::Tool;

/// A tool call requested by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Live tools for one session, built from one `ToolGroup`
///
/// The name index is read-only after construction, so `call` takes `&self`
/// and concurrent calls never contend on the collection itself. Tools that
/// own session state serialize access to it internally.
pub struct ToolCollection {
    version: &'static str,
    beta_flag: Option<&'static str>,
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<&'static str, usize>,
    call_timeout: Option<Duration>,
}

impl ToolCollection {
    /// Instantiate every tool of `group`, failing on duplicate names
    pub fn new(group: &'static ToolGroup, ctx: &ToolContext) -> Result<Self> {
        let tools = group.instantiate(ctx);

        let mut index = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if index.insert(tool.name(), i).is_some() {
                return Err(HarnessError::DuplicateName {
                    name: tool.name().to_string(),
                    version: group.version.to_string(),
                });
            }
        }

        log::info!(
            "Built tool collection {} with {} tools: {}",
            group.version,
            tools.len(),
            tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            version: group.version,
            beta_flag: group.beta_flag,
            tools,
            index,
            call_timeout: ctx.config().call_timeout(),
        })
    }

    /// Look up the group for `version` and build it
    pub fn for_version(version: &str, ctx: &ToolContext) -> Result<Self> {
        Self::new(tool_group(version)?, ctx)
    }

    /// Set the collection-wide per-call deadline
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Remove the collection-wide per-call deadline
    pub fn without_call_timeout(mut self) -> Self {
        self.call_timeout = None;
        self
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    pub fn beta_flag(&self) -> Option<&'static str> {
        self.beta_flag
    }

    /// Schemas of all tools, in catalog order
    pub fn describe_all(&self) -> impl Iterator<Item = ToolInputSchema> + '_ {
        self.tools.iter().map(|t| t.schema())
    }

    /// Provider params for all tools, in catalog order
    pub fn to_params(&self) -> Vec<Value> {
        self.describe_all().map(|s| s.to_api_params()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Dispatch a call by name; never fails
    ///
    /// Unknown names, tool errors, panics, and deadline overruns all come
    /// back as `ToolResult::Error` so the agent can see and react to them.
    pub async fn call(&self, name: &str, input: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = %name, "Call to unknown tool");
            return ToolResult::error(ToolErrorKind::ToolNotFound, format!("Tool {} is invalid", name));
        };

        let started = Instant::now();
        let deadline = tool.call_timeout().or(self.call_timeout);

        // The one broad catch: a panic inside any tool stops here.
        let invocation = AssertUnwindSafe(tool.invoke(input)).catch_unwind();
        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, invocation).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(tool = %name, timeout_ms = limit.as_millis() as u64, "Tool call timed out");
                    return ToolResult::error(
                        ToolErrorKind::Timeout,
                        format!("Tool {} did not finish within {}ms", name, limit.as_millis()),
                    );
                }
            },
            None => invocation.await,
        };

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ToolResult::error(ToolErrorKind::ToolExecutionFailed, failure_message(name, format!("{:#}", e))),
            Err(panic) => ToolResult::error(
                ToolErrorKind::ToolExecutionFailed,
                failure_message(name, format!("panicked: {}", panic_message(&*panic))),
            ),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result.error_kind() {
            Some(kind) => tracing::debug!(tool = %name, kind = %kind, elapsed_ms, "Tool call returned error"),
            None => tracing::debug!(tool = %name, elapsed_ms, "Tool call succeeded"),
        }

        result
    }

    /// Dispatch several calls concurrently, preserving input order
    pub async fn call_all(&self, calls: &[ToolCall]) -> Vec<(String, ToolResult)> {
        let pending = calls.iter().map(|call| async move {
            let result = self.call(&call.name, call.input.clone()).await;
            (call.id.clone(), result)
        });
        futures::future::join_all(pending).await
    }

    /// Tear down every tool in reverse construction order
    ///
    /// Best-effort: a failing teardown does not stop the rest. Failures are
    /// reported once, aggregated, and never returned as an error.
    pub async fn teardown(&self) -> TeardownReport {
        let mut report = TeardownReport::default();

        for tool in self.tools.iter().rev() {
            let outcome = AssertUnwindSafe(tool.teardown()).catch_unwind().await;
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => format!("panicked: {}", panic_message(&*panic)),
            };
            report.failures.push(TeardownFailure {
                tool: tool.name().to_string(),
                message,
            });
        }

        if report.is_clean() {
            log::debug!("Tore down tool collection {}", self.version);
        } else {
            log::warn!("Tool collection {} teardown incomplete: {}", self.version, report);
        }

        report
    }
}

impl fmt::Debug for ToolCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCollection")
            .field("version", &self.version)
            .field("tools", &self.names())
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

/// One tool that failed to tear down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub tool: String,
    pub message: String,
}

/// Aggregated outcome of `ToolCollection::teardown`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_clean() {
            Ok(())
        } else {
            Err(HarnessError::TeardownFailed(self.to_string()))
        }
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .failures
            .iter()
            .map(|failure| format!("{}: {}", failure.tool, failure.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

fn failure_message(tool: &str, detail: String) -> String {
    if detail.trim().is_empty() {
        format!("Tool {} failed without a message", tool)
    } else {
        format!("Tool {} failed: {}", tool, detail)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eyre::eyre;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn schema(&self) -> ToolInputSchema {
            ToolInputSchema::new("echo", "Echo text back").with_schema(serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }))
        }

        async fn invoke(&self, input: Value) -> std::result::Result<ToolResult, eyre::Error> {
            let text = input["text"].as_str().ok_or_else(|| eyre!("text is required"))?;
            Ok(ToolResult::success(text))
        }
    }

    struct PanickingTool;

    #[async_trait]
    impl Tool for PanickingTool {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn schema(&self) -> ToolInputSchema {
            ToolInputSchema::new("explode", "Always panics")
        }

        async fn invoke(&self, _input: Value) -> std::result::Result<ToolResult, eyre::Error> {
            panic!("boom");
        }
    }

    struct SleepyTool;

    #[async_trait]
    impl Tool for SleepyTool {
        fn name(&self) -> &'static str {
            "sleepy"
        }

        fn schema(&self) -> ToolInputSchema {
            ToolInputSchema::new("sleepy", "Sleeps for a while")
        }

        async fn invoke(&self, _input: Value) -> std::result::Result<ToolResult, eyre::Error> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ToolResult::success("woke up"))
        }
    }

    struct QuickDeadlineTool;

    #[async_trait]
    impl Tool for QuickDeadlineTool {
        fn name(&self) -> &'static str {
            "quick"
        }

        fn schema(&self) -> ToolInputSchema {
            ToolInputSchema::new("quick", "Has its own short deadline")
        }

        fn call_timeout(&self) -> Option<Duration> {
            Some(Duration::from_millis(20))
        }

        async fn invoke(&self, _input: Value) -> std::result::Result<ToolResult, eyre::Error> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(ToolResult::empty())
        }
    }

    fn echo(_: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(EchoTool)
    }

    fn explode(_: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(PanickingTool)
    }

    fn sleepy(_: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(SleepyTool)
    }

    fn quick(_: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(QuickDeadlineTool)
    }

    static TEST_GROUP: ToolGroup = ToolGroup {
        version: "test_v1",
        tools: &[echo, explode, sleepy, quick],
        beta_flag: None,
    };

    static DUPLICATE_GROUP: ToolGroup = ToolGroup {
        version: "test_dup",
        tools: &[echo, sleepy, echo],
        beta_flag: None,
    };

    fn ctx() -> (tempfile::TempDir, ToolContext) {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path().to_path_buf(), "test".to_string());
        (dir, ctx)
    }

    #[test]
    fn test_construct_and_describe() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();

        assert_eq!(tools.version(), "test_v1");
        assert_eq!(tools.len(), 4);
        assert!(tools.contains("echo"));
        assert!(!tools.contains("missing"));

        let names: Vec<_> = tools.describe_all().map(|s| s.name).collect();
        assert_eq!(names, vec!["echo", "explode", "sleepy", "quick"]);

        // Restartable
        assert_eq!(tools.describe_all().count(), 4);
        assert_eq!(tools.to_params().len(), 4);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (_dir, ctx) = ctx();
        let err = ToolCollection::new(&DUPLICATE_GROUP, &ctx).unwrap_err();
        assert!(matches!(err, HarnessError::DuplicateName { ref name, .. } if name == "echo"));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let (_dir, ctx) = ctx();
        let err = ToolCollection::for_version("nope", &ctx).unwrap_err();
        assert!(matches!(err, HarnessError::UnknownVersion { .. }));
    }

    #[test]
    fn test_call_timeout_from_config() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();
        assert_eq!(tools.call_timeout, Some(Duration::from_secs(300)));
        assert!(tools.without_call_timeout().call_timeout.is_none());
    }

    #[tokio::test]
    async fn test_call_success() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();

        let result = tools.call("echo", serde_json::json!({"text": "hi"})).await;
        assert!(!result.is_error());
        assert_eq!(result.text(), "hi");
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();

        let result = tools.call("missing", serde_json::json!({})).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolNotFound));
        assert!(result.text().contains("missing"));
    }

    #[tokio::test]
    async fn test_call_tool_error_is_trapped() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();

        let result = tools.call("echo", serde_json::json!({"bad": "input"})).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolExecutionFailed));
        assert!(result.text().contains("text is required"));

        let again = tools.call("echo", serde_json::json!({"text": "again"})).await;
        assert_eq!(again.text(), "again");
    }

    #[tokio::test]
    async fn test_call_panic_is_trapped() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();

        let result = tools.call("explode", serde_json::json!({})).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolExecutionFailed));
        assert!(result.text().contains("boom"));

        let after = tools.call("echo", serde_json::json!({"text": "still alive"})).await;
        assert!(!after.is_error());
    }

    #[tokio::test]
    async fn test_collection_deadline() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx)
            .unwrap()
            .with_call_timeout(Duration::from_millis(50));

        let result = tools.call("sleepy", serde_json::json!({})).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_tool_deadline_overrides_collection() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();

        let started = Instant::now();
        let result = tools.call("quick", serde_json::json!({})).await;
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_call_all_preserves_order() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();

        let calls = vec![
            ToolCall::new("c1", "echo", serde_json::json!({"text": "first"})),
            ToolCall::new("c2", "missing", serde_json::json!({})),
            ToolCall::new("c3", "echo", serde_json::json!({"text": "third"})),
        ];
        let results = tools.call_all(&calls).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, "c1");
        assert_eq!(results[0].1.text(), "first");
        assert_eq!(results[1].1.error_kind(), Some(ToolErrorKind::ToolNotFound));
        assert_eq!(results[2].1.text(), "third");
    }

    static TEARDOWN_LOG: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());
    static TEARDOWN_CALLS: AtomicUsize = AtomicUsize::new(0);

    struct FailingTeardown;

    #[async_trait]
    impl Tool for FailingTeardown {
        fn name(&self) -> &'static str {
            "shell"
        }

        fn schema(&self) -> ToolInputSchema {
            ToolInputSchema::new("shell", "Fails to tear down")
        }

        async fn invoke(&self, _input: Value) -> std::result::Result<ToolResult, eyre::Error> {
            Ok(ToolResult::empty())
        }

        async fn teardown(&self) -> std::result::Result<(), eyre::Error> {
            TEARDOWN_CALLS.fetch_add(1, Ordering::SeqCst);
            TEARDOWN_LOG.lock().unwrap().push("shell");
            Err(eyre!("process already gone"))
        }
    }

    struct CleanTeardown;

    #[async_trait]
    impl Tool for CleanTeardown {
        fn name(&self) -> &'static str {
            "editor"
        }

        fn schema(&self) -> ToolInputSchema {
            ToolInputSchema::new("editor", "Tears down cleanly")
        }

        async fn invoke(&self, _input: Value) -> std::result::Result<ToolResult, eyre::Error> {
            Ok(ToolResult::empty())
        }

        async fn teardown(&self) -> std::result::Result<(), eyre::Error> {
            TEARDOWN_CALLS.fetch_add(1, Ordering::SeqCst);
            TEARDOWN_LOG.lock().unwrap().push("editor");
            Ok(())
        }
    }

    fn failing_teardown(_: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(FailingTeardown)
    }

    fn clean_teardown(_: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(CleanTeardown)
    }

    static TEARDOWN_GROUP: ToolGroup = ToolGroup {
        version: "test_teardown",
        tools: &[clean_teardown, failing_teardown],
        beta_flag: Some("test-beta"),
    };

    #[tokio::test]
    async fn test_teardown_is_best_effort() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEARDOWN_GROUP, &ctx).unwrap();
        assert_eq!(tools.beta_flag(), Some("test-beta"));

        let report = tools.teardown().await;

        assert_eq!(TEARDOWN_CALLS.load(Ordering::SeqCst), 2);
        // Reverse order: the failing shell goes first and the editor still runs
        assert_eq!(*TEARDOWN_LOG.lock().unwrap(), vec!["shell", "editor"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].tool, "shell");
        assert!(report.to_string().contains("process already gone"));

        let err = report.into_result().unwrap_err();
        assert!(matches!(err, HarnessError::TeardownFailed(_)));
    }

    #[tokio::test]
    async fn test_teardown_clean() {
        let (_dir, ctx) = ctx();
        let tools = ToolCollection::new(&TEST_GROUP, &ctx).unwrap();
        let report = tools.teardown().await;
        assert!(report.is_clean());
        assert!(report.into_result().is_ok());
    }
}
