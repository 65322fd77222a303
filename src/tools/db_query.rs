//! db_query tool - read-only SQL against the report database

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;

use super::context::{ToolContext, ToolError};
use super::report_store::ReportStore;
use super::{Tool, ToolInputSchema, ToolResult, truncate_output};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1_000;

/// Accept a single SELECT or WITH statement
fn check_read_only(sql: &str) -> Result<&str, ToolError> {
    let sql = sql.trim().trim_end_matches(';').trim_end();
    if sql.is_empty() {
        return Err(ToolError::InvalidInput("sql must not be empty".to_string()));
    }
    if sql.contains(';') {
        return Err(ToolError::InvalidInput("Only a single statement is allowed".to_string()));
    }

    let keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase();
    if keyword != "SELECT" && keyword != "WITH" {
        return Err(ToolError::InvalidInput(format!(
            "Only SELECT and WITH queries are allowed (got {})",
            keyword
        )));
    }
    Ok(sql)
}

/// Queries the report database through a read-only connection
pub struct DbQueryTool {
    db_path: PathBuf,
    max_output_chars: usize,
    store: Arc<StdMutex<Option<ReportStore>>>,
}

impl DbQueryTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            db_path: ctx.config().database.path.clone(),
            max_output_chars: ctx.config().max_output_chars,
            store: Arc::new(StdMutex::new(None)),
        }
    }

    pub fn factory(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(ctx))
    }
}

#[async_trait]
impl Tool for DbQueryTool {
    fn name(&self) -> &'static str {
        "db_query"
    }

    fn schema(&self) -> ToolInputSchema {
        ToolInputSchema::new(
            "db_query",
            "Run a read-only SQL query (SELECT or WITH) against the report database; table test_reports",
        )
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" },
                "limit": { "type": "integer", "description": "Maximum rows to return (default 100)" }
            },
            "required": ["sql"]
        }))
    }

    async fn invoke(&self, input: Value) -> Result<ToolResult, eyre::Error> {
        if let Err(message) = self.schema().validate(&input) {
            return Ok(ToolResult::invalid_input(message));
        }
        let sql = match check_read_only(input["sql"].as_str().unwrap_or_default()) {
            Ok(sql) => sql.to_string(),
            Err(e) => return Ok(e.into()),
        };
        let limit = input["limit"]
            .as_u64()
            .map(|n| (n as usize).clamp(1, MAX_LIMIT))
            .unwrap_or(DEFAULT_LIMIT);

        let store = Arc::clone(&self.store);
        let path = self.db_path.clone();
        log::debug!("db_query: {}", sql);
        let outcome = tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| eyre::eyre!("report store lock poisoned"))?;
            if guard.is_none() {
                *guard = Some(ReportStore::open_read_only(&path)?);
            }
            match guard.as_ref() {
                // One extra row tells a full page apart from a cut-off one
                Some(store) => store.query_json(&sql, limit + 1),
                None => Err(eyre::eyre!("report store unavailable")),
            }
        })
        .await?;

        let mut rows = match outcome {
            Ok(rows) => rows,
            Err(e) => return Ok(ToolResult::failed(format!("Database error: {:#}", e))),
        };
        let limited = rows.len() > limit;
        rows.truncate(limit);
        let mut result = ToolResult::success(truncate_output(
            serde_json::to_string_pretty(&rows)?,
            self.max_output_chars,
        ));
        if limited {
            result = result.with_system(format!("results limited to {} rows", limit));
        }
        Ok(result)
    }

    async fn teardown(&self) -> Result<(), eyre::Error> {
        let mut guard = self.store.lock().map_err(|_| eyre::eyre!("report store lock poisoned"))?;
        guard.take();
        Ok(())
    }
}
