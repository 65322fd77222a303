//! JSON-lines session driver
//!
//! Each input line is a `ToolCall` (`{"id", "name", "input"}`); each output
//! line is the provider `tool_result` block for that call. Lines that do not
//! parse produce an `{"type": "error"}` line and the session continues.

use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Result;
use crate::tools::{TeardownReport, ToolCall, ToolCollection};

/// Dispatch calls until EOF; returns the number of calls dispatched
pub async fn run_session<R, W>(collection: &ToolCollection, reader: R, mut writer: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut dispatched = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<ToolCall>(line) {
            Ok(call) => {
                dispatched += 1;
                collection.call(&call.name, call.input).await.to_api_block(&call.id)
            }
            Err(e) => {
                log::warn!("Skipping malformed session line: {}", e);
                json!({ "type": "error", "message": format!("Invalid tool call: {}", e) })
            }
        };

        let mut out = serde_json::to_vec(&reply)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    log::info!("Session input closed after {} calls", dispatched);
    Ok(dispatched)
}

/// Tear down at the end of a command
///
/// An incomplete teardown is returned for display only; it never fails the
/// command or masks the outcome of the calls that ran.
pub async fn close_collection(collection: &ToolCollection) -> TeardownReport {
    let report = collection.teardown().await;
    if report.is_clean() {
        log::info!("Closed tool collection {}", collection.version());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolContext, ToolGroup, ToolInputSchema, ToolResult, tool_group};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn run(input: &str) -> (usize, Vec<Value>) {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path().to_path_buf(), "s".to_string());
        let collection = ToolCollection::new(tool_group("qa_20250429").unwrap(), &ctx).unwrap();

        let mut output = Vec::new();
        let count = run_session(&collection, input.as_bytes(), &mut output).await.unwrap();
        collection.teardown().await;

        let lines = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (count, lines)
    }

    #[tokio::test]
    async fn test_session_dispatches_each_line() {
        let input = concat!(
            r#"{"id":"t1","name":"assert","input":{"description":"d","actual":1,"expected":1,"comparison":"equals"}}"#,
            "\n\n",
            r#"{"id":"t2","name":"nope","input":{}}"#,
            "\n"
        );
        let (count, lines) = run(input).await;

        assert_eq!(count, 2);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tool_use_id"], "t1");
        assert_eq!(lines[0]["is_error"], false);
        assert_eq!(lines[1]["tool_use_id"], "t2");
        assert_eq!(lines[1]["is_error"], true);
        assert_eq!(lines[1]["content"][0]["text"], "Tool nope is invalid");
    }

    #[tokio::test]
    async fn test_session_survives_malformed_line() {
        let input = "not json\n{\"id\":\"t3\",\"name\":\"assert\",\"input\":{\"description\":\"d\",\"actual\":true,\"comparison\":\"is_true\"}}\n";
        let (count, lines) = run(input).await;

        assert_eq!(count, 1);
        assert_eq!(lines[0]["type"], "error");
        assert_eq!(lines[1]["tool_use_id"], "t3");
    }

    struct StuckProcess;

    #[async_trait]
    impl Tool for StuckProcess {
        fn name(&self) -> &'static str {
            "stuck"
        }

        fn schema(&self) -> ToolInputSchema {
            ToolInputSchema::new("stuck", "Cannot be stopped")
        }

        async fn invoke(&self, _input: Value) -> std::result::Result<ToolResult, eyre::Error> {
            Ok(ToolResult::success("running"))
        }

        async fn teardown(&self) -> std::result::Result<(), eyre::Error> {
            Err(eyre::eyre!("kill refused"))
        }
    }

    fn stuck(_: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(StuckProcess)
    }

    static STUCK: ToolGroup = ToolGroup {
        version: "stuck_v1",
        tools: &[stuck],
        beta_flag: None,
    };

    #[tokio::test]
    async fn test_failed_teardown_does_not_fail_session() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path().to_path_buf(), "s".to_string());
        let collection = ToolCollection::new(&STUCK, &ctx).unwrap();

        let input = "{\"id\":\"t1\",\"name\":\"stuck\",\"input\":{}}\n";
        let mut output = Vec::new();
        let count = run_session(&collection, input.as_bytes(), &mut output).await.unwrap();
        assert_eq!(count, 1);

        let report = close_collection(&collection).await;
        assert!(!report.is_clean());
        assert!(report.to_string().contains("kill refused"));

        let reply: Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(reply["is_error"], false);
    }
}
