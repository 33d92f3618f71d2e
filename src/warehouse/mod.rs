//! Warehouse boundary
//!
//! The `Warehouse` trait is the contract every query engine implements; the
//! `WarehouseGateway` layers dry-run timeouts, transient retry with backoff
//! and cancellation on top of it.

pub mod bigquery;
pub mod error_classifier;
pub mod failure_recovery;
pub mod gateway;

pub use bigquery::{BigQueryClient, BigQueryConfig};
pub use error_classifier::ErrorClassifier;
pub use failure_recovery::{FailureRecovery, RetryPolicy};
pub use gateway::WarehouseGateway;

use crate::contracts::Row;
use crate::error::WarehouseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rows and statistics of a completed query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    pub bytes_processed: Option<u64>,
    pub job_id: Option<String>,
}

/// Entry from the warehouse's own job list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: String,
    pub query: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub state: String,
    pub bytes_processed: Option<u64>,
    pub error: Option<String>,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Engine name, for logs.
    fn name(&self) -> &str;

    /// Validate `sql` and report the bytes it would scan, without running it
    /// and without using cached results.
    async fn dry_run(&self, sql: &str) -> Result<u64, WarehouseError>;

    /// Run `sql`, returning at most `max_results` rows. `timeout` is the
    /// budget left for this attempt.
    async fn execute(
        &self,
        sql: &str,
        timeout: Duration,
        max_results: usize,
    ) -> Result<QueryOutput, WarehouseError>;

    async fn recent_jobs(&self, _limit: usize) -> Result<Vec<JobSummary>, WarehouseError> {
        Ok(Vec::new())
    }
}
