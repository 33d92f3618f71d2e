//! Query repair
//!
//! A `RepairClient` proposes a corrected query from a broken one and the
//! warehouse's error message. It never fails: when it has nothing better it
//! hands back the input unchanged.

pub mod llm;

pub use llm::{LlmRepairClient, LlmRepairConfig};

use async_trait::async_trait;

#[async_trait]
pub trait RepairClient: Send + Sync {
    async fn repair(&self, broken_sql: &str, error_message: &str) -> String;
}

/// Repair client that never changes the query.
#[derive(Debug, Clone, Default)]
pub struct NoopRepair;

#[async_trait]
impl RepairClient for NoopRepair {
    async fn repair(&self, broken_sql: &str, _error_message: &str) -> String {
        broken_sql.to_string()
    }
}
