//! db_report tool - record test outcomes and summarize runs

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;

use super::context::{ToolContext, ToolError};
use super::report_store::{ReportStore, TestReport, TestStatus};
use super::{Tool, ToolInputSchema, ToolResult};

enum ReportAction {
    Record(TestReport),
    Summary(String),
}

/// Writes test reports to the session's SQLite database
pub struct DbReporterTool {
    db_path: PathBuf,
    session_id: String,
    /// Opened on first use
    store: Arc<StdMutex<Option<ReportStore>>>,
}

impl DbReporterTool {
    pub fn new(ctx: &ToolContext) -> Self {
        Self {
            db_path: ctx.config().database.path.clone(),
            session_id: ctx.session_id.clone(),
            store: Arc::new(StdMutex::new(None)),
        }
    }

    pub fn factory(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(ctx))
    }

    fn parse(&self, input: &Value) -> Result<ReportAction, ToolError> {
        let run_id = input["run_id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.session_id)
            .to_string();

        match input["action"].as_str() {
            Some("summary") => Ok(ReportAction::Summary(run_id)),
            Some("record") => {
                let test_name = input["test_name"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ToolError::InvalidInput("test_name is required for record".to_string()))?;
                let raw_status = input["status"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidInput("status is required for record".to_string()))?;
                let status = TestStatus::parse(raw_status).ok_or_else(|| {
                    ToolError::InvalidInput(format!(
                        "Invalid status '{}'; expected one of: {}",
                        raw_status,
                        TestStatus::ALL.join(", ")
                    ))
                })?;

                let mut report = TestReport::new(run_id, test_name, status);
                if let Some(details) = input["details"].as_str() {
                    report = report.with_details(details);
                }
                Ok(ReportAction::Record(report))
            }
            other => Err(ToolError::InvalidInput(format!("Unknown action: {:?}", other))),
        }
    }
}

fn execute(store: &ReportStore, action: ReportAction) -> eyre::Result<ToolResult> {
    match action {
        ReportAction::Record(report) => {
            let id = store.record(&report)?;
            log::info!("Recorded {} for {} (run {})", report.status, report.test_name, report.run_id);
            Ok(ToolResult::success(format!(
                "Recorded {} for '{}' in run {} (report #{})",
                report.status, report.test_name, report.run_id, id
            )))
        }
        ReportAction::Summary(run_id) => Ok(ToolResult::success(store.summary(&run_id)?.to_string())),
    }
}

#[async_trait]
impl Tool for DbReporterTool {
    fn name(&self) -> &'static str {
        "db_report"
    }

    fn schema(&self) -> ToolInputSchema {
        ToolInputSchema::new("db_report", "Record test results to the report database, or summarize a run")
            .with_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["record", "summary"] },
                    "test_name": { "type": "string" },
                    "status": { "type": "string", "description": "pass, fail, skip or error" },
                    "details": { "type": "string" },
                    "run_id": { "type": "string", "description": "Defaults to the session id" }
                },
                "required": ["action"]
            }))
    }

    async fn invoke(&self, input: Value) -> Result<ToolResult, eyre::Error> {
        if let Err(message) = self.schema().validate(&input) {
            return Ok(ToolResult::invalid_input(message));
        }
        let action = match self.parse(&input) {
            Ok(action) => action,
            Err(e) => return Ok(e.into()),
        };

        let store = Arc::clone(&self.store);
        let path = self.db_path.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| eyre::eyre!("report store lock poisoned"))?;
            if guard.is_none() {
                *guard = Some(ReportStore::open(&path)?);
            }
            match guard.as_ref() {
                Some(store) => execute(store, action),
                None => Err(eyre::eyre!("report store unavailable")),
            }
        })
        .await?;

        Ok(outcome.unwrap_or_else(|e| ToolResult::failed(format!("Database error: {:#}", e))))
    }

    async fn teardown(&self) -> Result<(), eyre::Error> {
        let mut guard = self.store.lock().map_err(|_| eyre::eyre!("report store lock poisoned"))?;
        if guard.take().is_some() {
            log::debug!("Closed report database {}", self.db_path.display());
        }
        Ok(())
    }
}
