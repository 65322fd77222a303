//! SQLite store for test reports written and read by the database tools

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome recorded for a single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl TestStatus {
    pub const ALL: &'static [&'static str] = &["pass", "fail", "skip", "error"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pass" | "passed" => Some(Self::Pass),
            "fail" | "failed" => Some(Self::Fail),
            "skip" | "skipped" => Some(Self::Skip),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub run_id: String,
    pub test_name: String,
    pub status: TestStatus,
    pub details: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TestReport {
    pub fn new(run_id: impl Into<String>, test_name: impl Into<String>, status: TestStatus) -> Self {
        Self {
            run_id: run_id.into(),
            test_name: test_name.into(),
            status,
            details: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Counts per status for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Run {}: {} tests", self.run_id, self.total)?;
        for (status, count) in &self.by_status {
            write!(f, ", {} {}", count, status)?;
        }
        Ok(())
    }
}

/// Connection to the reports database
pub struct ReportStore {
    db: Connection,
}

impl ReportStore {
    /// Open or create the database, creating parent directories as needed
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }
        let db = Connection::open(path).with_context(|| format!("Failed to open SQLite database: {}", path.display()))?;
        Self::init_schema(&db)?;
        Ok(Self { db })
    }

    /// Open an existing database without write access
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let db = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .with_context(|| format!("Failed to open SQLite database read-only: {}", path.display()))?;
        Ok(Self { db })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS test_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                test_name TEXT NOT NULL,
                status TEXT NOT NULL,
                details TEXT,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_test_reports_run ON test_reports(run_id);
            CREATE INDEX IF NOT EXISTS idx_test_reports_status ON test_reports(status);
            "#,
        )
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    /// Insert a report and return its row id
    pub fn record(&self, report: &TestReport) -> Result<i64> {
        self.db
            .execute(
                "INSERT INTO test_reports (run_id, test_name, status, details, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    report.run_id,
                    report.test_name,
                    report.status.as_str(),
                    report.details,
                    report.recorded_at.to_rfc3339(),
                ],
            )
            .context("Failed to insert test report")?;
        Ok(self.db.last_insert_rowid())
    }

    pub fn summary(&self, run_id: &str) -> Result<RunSummary> {
        let mut stmt = self
            .db
            .prepare("SELECT status, COUNT(*) FROM test_reports WHERE run_id = ?1 GROUP BY status")?;
        let rows = stmt.query_map(params![run_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut summary = RunSummary {
            run_id: run_id.to_string(),
            ..RunSummary::default()
        };
        for row in rows {
            let (status, count) = row?;
            summary.total += count as u64;
            summary.by_status.insert(status, count as u64);
        }
        Ok(summary)
    }

    /// Run a query and return up to `limit` rows as JSON objects keyed by column name
    pub fn query_json(&self, sql: &str, limit: usize) -> Result<Vec<Map<String, Value>>> {
        let mut stmt = self.db.prepare(sql).context("Failed to prepare query")?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while out.len() < limit
            && let Some(row) = rows.next()?
        {
            let mut record = Map::new();
            for (i, name) in columns.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).to_string()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}
