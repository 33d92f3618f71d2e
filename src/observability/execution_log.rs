//! Execution Logger
//!
//! Audit trail of terminal execution outcomes: a bounded in-memory buffer,
//! optionally mirrored to a JSON-lines file.

use crate::contracts::{ExecutionRequest, ExecutionResponse, ExecutionStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

/// Query execution log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub execution_id: String,
    pub domain: String,
    pub intent: String,
    pub warehouse_project: String,
    pub original_query: String,
    /// Text after any repairs; equal to `original_query` when none happened
    pub final_query: String,
    pub status: ExecutionStatus,
    pub repair_attempts: u32,
    pub dry_run: bool,
    pub row_count: usize,
    pub bytes_processed: Option<u64>,
    pub estimated_cost_usd: Option<f64>,
    pub execution_time_ms: u64,
    pub query_id: Option<String>,
    pub error_message: Option<String>,
}

impl QueryLogEntry {
    pub fn new(
        request: &ExecutionRequest,
        response: &ExecutionResponse,
        final_query: &str,
        repair_attempts: u32,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            execution_id: Uuid::new_v4().to_string(),
            domain: request.metadata.domain.clone(),
            intent: request.metadata.intent.clone(),
            warehouse_project: request.warehouse_project.clone(),
            original_query: request.query_text.clone(),
            final_query: final_query.to_string(),
            status: response.status,
            repair_attempts,
            dry_run: request.dry_run,
            row_count: response.row_count,
            bytes_processed: response.bytes_processed,
            estimated_cost_usd: response.estimated_cost_usd,
            execution_time_ms: response.execution_time_ms,
            query_id: response.query_id.clone(),
            error_message: response
                .error_message
                .clone()
                .or_else(|| response.blocked_reason.clone()),
        }
    }
}

/// Execution logger
pub struct ExecutionLogger {
    log_file: Option<PathBuf>,
    entries: Mutex<VecDeque<QueryLogEntry>>,
    max_in_memory_logs: usize,
}

impl ExecutionLogger {
    pub fn new(log_file: Option<PathBuf>, max_in_memory_logs: usize) -> Self {
        Self {
            log_file,
            entries: Mutex::new(VecDeque::with_capacity(max_in_memory_logs.min(1024))),
            max_in_memory_logs,
        }
    }

    pub fn log_file(&self) -> Option<&PathBuf> {
        self.log_file.as_ref()
    }

    /// Record one execution. The in-memory copy is kept even when the file
    /// write fails.
    pub fn log_execution(&self, entry: QueryLogEntry) -> Result<()> {
        {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.push_back(entry.clone());
            while entries.len() > self.max_in_memory_logs {
                entries.pop_front();
            }
        }

        if let Some(ref log_file) = self.log_file {
            let mut file = OpenOptions::new().create(true).append(true).open(log_file)?;
            let json = serde_json::to_string(&entry)?;
            writeln!(file, "{}", json)?;
        }

        Ok(())
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Vec<QueryLogEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn export_logs(&self) -> Result<String> {
        let entries: Vec<QueryLogEntry> = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.iter().cloned().collect()
        };

        let export = serde_json::json!({
            "executions": entries,
            "exported_at": Utc::now().to_rfc3339()
        });
        Ok(serde_json::to_string_pretty(&export)?)
    }
}

impl Default for ExecutionLogger {
    fn default() -> Self {
        Self::new(None, 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::QueryMetadata;

    fn entry(sql: &str, response: &ExecutionResponse) -> QueryLogEntry {
        let request = ExecutionRequest::new(sql, "analytics-prod", QueryMetadata::new("collections", "monthly_count"));
        QueryLogEntry::new(&request, response, sql, 0)
    }

    #[test]
    fn test_buffer_is_bounded_and_newest_first() {
        let logger = ExecutionLogger::new(None, 2);
        for i in 0..3 {
            let sql = format!("SELECT {}", i);
            logger.log_execution(entry(&sql, &ExecutionResponse::dry_run(0, 0.0, 1))).unwrap();
        }

        let recent = logger.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].original_query, "SELECT 2");
        assert_eq!(recent[1].original_query, "SELECT 1");
    }

    #[test]
    fn test_blocked_reason_is_recorded() {
        let response = ExecutionResponse::blocked("Blocked [destructive_keyword]: DROP", 0);
        let logged = entry("DROP TABLE x", &response);
        assert_eq!(logged.status, ExecutionStatus::Blocked);
        assert_eq!(logged.error_message.as_deref(), Some("Blocked [destructive_keyword]: DROP"));
    }

    #[test]
    fn test_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("executions.jsonl");
        let logger = ExecutionLogger::new(Some(path.clone()), 10);

        logger.log_execution(entry("SELECT 1", &ExecutionResponse::dry_run(2048, 0.0, 3))).unwrap();
        logger.log_execution(entry("SELECT 2", &ExecutionResponse::failed("boom", 4))).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: QueryLogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.status, ExecutionStatus::Failed);
        assert_eq!(second.error_message.as_deref(), Some("boom"));
    }
}
