//! Warehouse Gateway
//!
//! Dry-run and execute with classified errors, bounded time and retry of
//! transient failures. `Logic` and `Fatal` failures are handed straight back
//! to the caller; deciding on a repair is not this layer's job.

use crate::error::ClassifiedError;
use crate::warehouse::failure_recovery::{FailureRecovery, RetryPolicy};
use crate::warehouse::{JobSummary, QueryOutput, Warehouse};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct WarehouseGateway {
    warehouse: Arc<dyn Warehouse>,
    recovery: FailureRecovery,
    dry_run_timeout: Duration,
}

impl WarehouseGateway {
    pub fn new(warehouse: Arc<dyn Warehouse>, retry_policy: RetryPolicy, dry_run_timeout: Duration) -> Self {
        Self {
            warehouse,
            recovery: FailureRecovery::with_retry_policy(retry_policy),
            dry_run_timeout,
        }
    }

    pub fn warehouse_name(&self) -> &str {
        self.warehouse.name()
    }

    /// Estimate bytes processed for `sql`.
    ///
    /// Bounded by the shorter of the dry-run timeout and `budget`, so a slow
    /// estimate cannot consume the whole execution budget.
    pub async fn dry_run(
        &self,
        sql: &str,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> Result<u64, ClassifiedError> {
        let timeout = budget.min(self.dry_run_timeout);
        let deadline = Instant::now() + timeout;
        let warehouse = &self.warehouse;

        let bytes = self
            .recovery
            .retry_transient("dry run", deadline, cancel, |_| warehouse.dry_run(sql))
            .await?;

        debug!("Dry run on {} estimated {} bytes", warehouse.name(), bytes);
        Ok(bytes)
    }

    /// Execute `sql`, retrying transient failures until `timeout_seconds`
    /// have elapsed in total.
    pub async fn execute_with_retry(
        &self,
        sql: &str,
        timeout_seconds: u64,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<QueryOutput, ClassifiedError> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(timeout_seconds);
        let warehouse = &self.warehouse;

        let output = self
            .recovery
            .retry_transient("query execution", deadline, cancel, |remaining| {
                warehouse.execute(sql, remaining, max_results)
            })
            .await?;

        info!(
            "Query executed on {}: {} rows, {:?} bytes, {:?}",
            warehouse.name(),
            output.rows.len(),
            output.bytes_processed,
            started.elapsed()
        );
        Ok(output)
    }

    pub async fn recent_jobs(&self, limit: usize) -> Result<Vec<JobSummary>, ClassifiedError> {
        self.warehouse
            .recent_jobs(limit)
            .await
            .map_err(|e| self.recovery.classifier().classify(&e))
    }
}
