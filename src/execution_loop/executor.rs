//! Query Executor
//!
//! Drives one request through validation, dry run, optional execution and
//! the bounded repair loop, and always ends in exactly one
//! `ExecutionResponse`.
//!
//! Every pass re-validates the current text, so a repaired query gets no
//! more trust than the original. Only `Logic` failures trigger a repair, and
//! at most `max_repair_attempts` repairs happen per call.

use crate::config::ExecutorConfig;
use crate::contracts::{ExecutionRequest, ExecutionResponse, QueryMetadata};
use crate::cost::CostModel;
use crate::error::{ClassifiedError, FatalKind};
use crate::execution_loop::state::{ExecutionState, RetryState};
use crate::observability::{ExecutionLogger, QueryLogEntry};
use crate::repair::RepairClient;
use crate::safety::SafetyPolicy;
use crate::warehouse::{JobSummary, Warehouse, WarehouseGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct QueryExecutor {
    policy: SafetyPolicy,
    cost_model: CostModel,
    gateway: WarehouseGateway,
    repair: Arc<dyn RepairClient>,
    config: ExecutorConfig,
    logger: Option<Arc<ExecutionLogger>>,
}

impl QueryExecutor {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        repair: Arc<dyn RepairClient>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            policy: SafetyPolicy::new(),
            cost_model: CostModel::new(config.pricing.clone()),
            gateway: WarehouseGateway::new(warehouse, config.retry.clone(), config.dry_run_timeout),
            repair,
            config,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<ExecutionLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_safety_policy(mut self, policy: SafetyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Build a request using this executor's configured default limits.
    pub fn request(
        &self,
        query_text: impl Into<String>,
        warehouse_project: impl Into<String>,
        metadata: QueryMetadata,
    ) -> ExecutionRequest {
        ExecutionRequest::new(query_text, warehouse_project, metadata)
            .with_max_results(self.config.default_max_results)
            .with_timeout_seconds(self.config.default_timeout_seconds)
    }

    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResponse {
        self.execute_cancellable(request, &CancellationToken::new()).await
    }

    /// Like `execute`, but stops at the next sub-call boundary once `cancel`
    /// fires. A cancelled call ends `Failed` with `execution cancelled`.
    pub async fn execute_cancellable(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> ExecutionResponse {
        let started = Instant::now();
        let mut state = RetryState::new(self.config.max_repair_attempts);
        let mut current = request.query_text.clone();

        info!(
            "Executing query for {}/{} on project {} (dry_run={})",
            request.metadata.domain, request.metadata.intent, request.warehouse_project, request.dry_run
        );

        let response = self
            .run(request, &mut current, &mut state, cancel, started)
            .await;

        info!(
            "Execution finished: status={} repairs={} elapsed={}ms",
            response.status, state.attempt, response.execution_time_ms
        );

        if let Some(logger) = &self.logger {
            let entry = QueryLogEntry::new(request, &response, &current, state.attempt);
            if let Err(e) = logger.log_execution(entry) {
                warn!("Failed to write execution log: {}", e);
            }
        }

        response
    }

    /// The warehouse's own most recent jobs, newest first.
    pub async fn query_history(&self, limit: usize) -> Result<Vec<JobSummary>, ClassifiedError> {
        self.gateway.recent_jobs(limit).await
    }

    async fn run(
        &self,
        request: &ExecutionRequest,
        current: &mut String,
        state: &mut RetryState,
        cancel: &CancellationToken,
        started: Instant,
    ) -> ExecutionResponse {
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        if let Err(e) = request.validate() {
            warn!("Rejected invalid request: {}", e);
            return ExecutionResponse::failed(e.to_string(), elapsed_ms());
        }

        let budget = Duration::from_secs(request.timeout_seconds);

        loop {
            if cancel.is_cancelled() {
                return ExecutionResponse::failed(ClassifiedError::cancelled().message(), elapsed_ms());
            }

            debug!("{} (attempt {})", ExecutionState::Validating, state.attempt);
            let verdict = self.policy.validate(current);
            if !verdict.is_safe {
                let reason = verdict
                    .reason
                    .unwrap_or_else(|| "Blocked: query rejected by safety policy".to_string());
                warn!("{}", reason);
                return ExecutionResponse::blocked(reason, elapsed_ms());
            }

            debug!("{} (attempt {})", ExecutionState::DryRunning, state.attempt);
            let bytes = match self.gateway.dry_run(current, budget, cancel).await {
                Ok(bytes) => bytes,
                Err(err) if err.is_logic() && state.can_repair() => {
                    self.repair_query(current, &err, state, cancel).await;
                    continue;
                }
                Err(err) => {
                    warn!("Dry run failed ({}): {}", err.class(), err.message());
                    let message = if is_cancelled(&err) {
                        err.message().to_string()
                    } else {
                        format!("Query validation failed: {}", err.message())
                    };
                    return ExecutionResponse::failed(message, elapsed_ms());
                }
            };

            let estimated_cost = self.cost_model.estimate(bytes);
            info!("Dry run estimate: {} bytes, ${:.6}", bytes, estimated_cost);

            if request.dry_run {
                return ExecutionResponse::dry_run(bytes, estimated_cost, elapsed_ms());
            }

            debug!("{} (attempt {})", ExecutionState::Executing, state.attempt);
            match self
                .gateway
                .execute_with_retry(current, request.timeout_seconds, request.max_results, cancel)
                .await
            {
                Ok(output) => {
                    let cost = self.cost_model.estimate_optional(output.bytes_processed);
                    return ExecutionResponse::success(
                        output.rows,
                        output.columns,
                        output.bytes_processed,
                        cost,
                        output.job_id,
                        elapsed_ms(),
                    );
                }
                Err(err) if err.is_logic() && state.can_repair() => {
                    self.repair_query(current, &err, state, cancel).await;
                }
                Err(err) if err.is_deadline_exceeded() => {
                    warn!("Query timed out: {}", err.message());
                    return ExecutionResponse::timeout(err.message(), elapsed_ms());
                }
                Err(err) => {
                    warn!("Query execution failed ({}): {}", err.class(), err.message());
                    return ExecutionResponse::failed(err.message(), elapsed_ms());
                }
            }
        }
    }

    /// Replace `current` with the repair client's proposal. A blank, timed
    /// out or cancelled repair leaves `current` unchanged.
    async fn repair_query(
        &self,
        current: &mut String,
        error: &ClassifiedError,
        state: &mut RetryState,
        cancel: &CancellationToken,
    ) {
        state.record_repair(error.message());
        info!(
            "{} attempt {}/{} after logic error: {}",
            ExecutionState::Repairing,
            state.attempt,
            state.max_attempts,
            error.message()
        );

        let proposal = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(
                self.config.repair_timeout,
                self.repair.repair(current, error.message()),
            ) => match result {
                Ok(text) => Some(text),
                Err(_) => {
                    warn!("Repair timed out after {:?}, keeping the current query", self.config.repair_timeout);
                    None
                }
            },
        };

        match proposal {
            Some(text) if !text.trim().is_empty() => {
                if text.trim() == current.trim() {
                    debug!("Repair returned the query unchanged");
                }
                *current = text;
            }
            Some(_) => warn!("Repair returned an empty query, keeping the current query"),
            None => {}
        }
    }
}

fn is_cancelled(error: &ClassifiedError) -> bool {
    matches!(
        error,
        ClassifiedError::Fatal {
            kind: FatalKind::Cancelled,
            ..
        }
    )
}
