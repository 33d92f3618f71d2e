//! Execution Contracts
//!
//! Request handed in by a query generator and the single terminal response
//! handed back.

use crate::config::{DEFAULT_MAX_RESULTS, DEFAULT_TIMEOUT_SECONDS};
use crate::error::{ExecError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One result row: column name to value, in column order.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Timeout,
    /// Rejected by the safety policy
    Blocked,
    DryRun,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::Blocked => "blocked",
            ExecutionStatus::DryRun => "dry_run",
        };
        f.write_str(label)
    }
}

/// Opaque tags from the generator. Never interpreted by the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub domain: String,
    pub intent: String,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub estimated_cost_bytes: Option<u64>,
    #[serde(default)]
    pub filters_applied: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub aggregation_level: Option<String>,
    #[serde(default)]
    pub time_range: Option<HashMap<String, String>>,
}

impl QueryMetadata {
    pub fn new(domain: impl Into<String>, intent: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            intent: intent.into(),
            generated_at: Utc::now(),
            estimated_cost_bytes: None,
            filters_applied: HashMap::new(),
            aggregation_level: None,
            time_range: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub query_text: String,
    pub warehouse_project: String,
    pub metadata: QueryMetadata,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl ExecutionRequest {
    pub fn new(
        query_text: impl Into<String>,
        warehouse_project: impl Into<String>,
        metadata: QueryMetadata,
    ) -> Self {
        Self {
            query_text: query_text.into(),
            warehouse_project: warehouse_project.into(),
            metadata,
            dry_run: false,
            max_results: DEFAULT_MAX_RESULTS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(ExecError::InvalidRequest("max_results must be positive".to_string()));
        }
        if self.timeout_seconds == 0 {
            return Err(ExecError::InvalidRequest("timeout_seconds must be positive".to_string()));
        }
        Ok(())
    }
}

/// Terminal outcome of one execution. Built once through the per-status
/// constructors, which keep the optional fields consistent with `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub status: ExecutionStatus,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub execution_time_ms: u64,
    pub bytes_processed: Option<u64>,
    pub estimated_cost_usd: Option<f64>,
    /// Present iff status is `Failed` or `Timeout`
    pub error_message: Option<String>,
    /// Present iff status is `Blocked`
    pub blocked_reason: Option<String>,
    pub query_id: Option<String>,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionResponse {
    fn base(status: ExecutionStatus, execution_time_ms: u64) -> Self {
        Self {
            status,
            rows: Vec::new(),
            row_count: 0,
            columns: Vec::new(),
            execution_time_ms,
            bytes_processed: None,
            estimated_cost_usd: None,
            error_message: None,
            blocked_reason: None,
            query_id: None,
            executed_at: Utc::now(),
        }
    }

    pub fn success(
        rows: Vec<Row>,
        columns: Vec<String>,
        bytes_processed: Option<u64>,
        estimated_cost_usd: f64,
        query_id: Option<String>,
        execution_time_ms: u64,
    ) -> Self {
        let columns = if rows.is_empty() {
            Vec::new()
        } else if columns.is_empty() {
            rows[0].keys().cloned().collect()
        } else {
            columns
        };

        Self {
            row_count: rows.len(),
            rows,
            columns,
            bytes_processed,
            estimated_cost_usd: Some(estimated_cost_usd),
            query_id,
            ..Self::base(ExecutionStatus::Success, execution_time_ms)
        }
    }

    pub fn dry_run(bytes_processed: u64, estimated_cost_usd: f64, execution_time_ms: u64) -> Self {
        Self {
            bytes_processed: Some(bytes_processed),
            estimated_cost_usd: Some(estimated_cost_usd),
            ..Self::base(ExecutionStatus::DryRun, execution_time_ms)
        }
    }

    pub fn blocked(reason: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            blocked_reason: Some(reason.into()),
            ..Self::base(ExecutionStatus::Blocked, execution_time_ms)
        }
    }

    pub fn failed(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::base(ExecutionStatus::Failed, execution_time_ms)
        }
    }

    pub fn timeout(message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::base(ExecutionStatus::Timeout, execution_time_ms)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success | ExecutionStatus::DryRun)
    }
}
