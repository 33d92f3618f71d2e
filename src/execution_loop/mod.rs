pub mod executor;
pub mod state;

pub use executor::QueryExecutor;
pub use state::{ExecutionState, RetryState};
