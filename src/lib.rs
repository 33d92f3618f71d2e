//! SQL Execution Agent
//!
//! Runs generated SQL against a warehouse under a read-only safety policy,
//! with cost estimation, transient retry and a bounded repair loop.

pub mod config;
pub mod contracts;
pub mod cost;
pub mod error;
pub mod execution_loop;
pub mod observability;
pub mod repair;
pub mod safety;
pub mod warehouse;

pub use config::ExecutorConfig;
pub use contracts::{ExecutionRequest, ExecutionResponse, ExecutionStatus, QueryMetadata, Row};
pub use cost::{CostModel, PricingConfig};
pub use error::{ClassifiedError, ErrorClass, ExecError, FatalKind, Result, WarehouseError};
pub use execution_loop::{QueryExecutor, RetryState};
pub use observability::{init_tracing, ExecutionLogger, QueryLogEntry};
pub use repair::{LlmRepairClient, LlmRepairConfig, NoopRepair, RepairClient};
pub use safety::{SafetyPolicy, SafetyRule, SafetyVerdict};
pub use warehouse::{
    BigQueryClient, BigQueryConfig, JobSummary, QueryOutput, RetryPolicy, Warehouse, WarehouseGateway,
};
