#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use sql_execution_agent::{
    ExecutorConfig, JobSummary, QueryExecutor, QueryOutput, RepairClient, Row, Warehouse,
    WarehouseError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn logic_error() -> WarehouseError {
    WarehouseError::api(
        400,
        Some("invalidQuery".to_string()),
        "Syntax error: Unexpected end of script at [1:35]",
    )
}

pub fn transient_error() -> WarehouseError {
    WarehouseError::api(503, Some("backendError".to_string()), "Backend error, try again")
}

pub fn fatal_error() -> WarehouseError {
    WarehouseError::api(403, Some("accessDenied".to_string()), "Access Denied: Project analytics-prod")
}

pub fn sample_output() -> QueryOutput {
    let row: Row = [
        ("month".to_string(), json!("2025-11")),
        ("loan_count".to_string(), json!(42)),
    ]
    .into_iter()
    .collect();

    QueryOutput {
        rows: vec![row],
        columns: vec!["month".to_string(), "loan_count".to_string()],
        bytes_processed: Some(4096),
        job_id: Some("job_mock_1".to_string()),
    }
}

/// Warehouse that replays scripted results and counts calls.
///
/// Once a script runs out, dry runs report `default_bytes` and executions
/// return `sample_output()`, unless a permanent failure was configured.
pub struct MockWarehouse {
    dry_runs: Mutex<VecDeque<Result<u64, WarehouseError>>>,
    executions: Mutex<VecDeque<Result<QueryOutput, WarehouseError>>>,
    dry_run_failure: Option<WarehouseError>,
    execute_failure: Option<WarehouseError>,
    execute_delay: Option<Duration>,
    default_bytes: u64,
    jobs: Vec<JobSummary>,
    dry_run_calls: AtomicUsize,
    execute_calls: AtomicUsize,
    executed_queries: Mutex<Vec<String>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self {
            dry_runs: Mutex::new(VecDeque::new()),
            executions: Mutex::new(VecDeque::new()),
            dry_run_failure: None,
            execute_failure: None,
            execute_delay: None,
            default_bytes: 2048,
            jobs: Vec::new(),
            dry_run_calls: AtomicUsize::new(0),
            execute_calls: AtomicUsize::new(0),
            executed_queries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_bytes(mut self, bytes: u64) -> Self {
        self.default_bytes = bytes;
        self
    }

    pub fn with_dry_runs(self, results: Vec<Result<u64, WarehouseError>>) -> Self {
        *self.dry_runs.lock().unwrap() = results.into();
        self
    }

    pub fn with_executions(self, results: Vec<Result<QueryOutput, WarehouseError>>) -> Self {
        *self.executions.lock().unwrap() = results.into();
        self
    }

    pub fn failing_dry_runs(mut self, error: WarehouseError) -> Self {
        self.dry_run_failure = Some(error);
        self
    }

    pub fn failing_executions(mut self, error: WarehouseError) -> Self {
        self.execute_failure = Some(error);
        self
    }

    /// Every execution sleeps this long before answering.
    pub fn with_execute_delay(mut self, delay: Duration) -> Self {
        self.execute_delay = Some(delay);
        self
    }

    pub fn with_jobs(mut self, jobs: Vec<JobSummary>) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn dry_run_calls(&self) -> usize {
        self.dry_run_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.dry_run_calls() + self.execute_calls()
    }

    pub fn executed_queries(&self) -> Vec<String> {
        self.executed_queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    fn name(&self) -> &str {
        "mock"
    }

    async fn dry_run(&self, _sql: &str) -> Result<u64, WarehouseError> {
        self.dry_run_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.dry_runs.lock().unwrap().pop_front() {
            return scripted;
        }
        match &self.dry_run_failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.default_bytes),
        }
    }

    async fn execute(
        &self,
        sql: &str,
        _timeout: Duration,
        max_results: usize,
    ) -> Result<QueryOutput, WarehouseError> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.executed_queries.lock().unwrap().push(sql.to_string());

        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.executions.lock().unwrap().pop_front();
        let mut output = match scripted {
            Some(result) => result?,
            None => match &self.execute_failure {
                Some(error) => return Err(error.clone()),
                None => sample_output(),
            },
        };
        output.rows.truncate(max_results);
        Ok(output)
    }

    async fn recent_jobs(&self, limit: usize) -> Result<Vec<JobSummary>, WarehouseError> {
        Ok(self.jobs.iter().take(limit).cloned().collect())
    }
}

/// Repair client that replays scripted answers, then echoes its input.
pub struct MockRepair {
    answers: Mutex<VecDeque<String>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockRepair {
    pub fn new(answers: Vec<&str>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().map(String::from).collect()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// `(broken_sql, error_message)` for every call, in order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepairClient for MockRepair {
    async fn repair(&self, broken_sql: &str, error_message: &str) -> String {
        self.calls
            .lock()
            .unwrap()
            .push((broken_sql.to_string(), error_message.to_string()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| broken_sql.to_string())
    }
}

pub fn executor(warehouse: &Arc<MockWarehouse>, repair: &Arc<MockRepair>) -> QueryExecutor {
    executor_with_config(warehouse, repair, ExecutorConfig::default())
}

pub fn executor_with_config(
    warehouse: &Arc<MockWarehouse>,
    repair: &Arc<MockRepair>,
    config: ExecutorConfig,
) -> QueryExecutor {
    QueryExecutor::new(warehouse.clone(), repair.clone(), config)
}
