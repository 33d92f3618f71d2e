//! Per-call execution state.

use std::fmt;

/// Phase of one execution, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Validating,
    DryRunning,
    Executing,
    Repairing,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExecutionState::Validating => "VALIDATING",
            ExecutionState::DryRunning => "DRY_RUNNING",
            ExecutionState::Executing => "EXECUTING",
            ExecutionState::Repairing => "REPAIRING",
        };
        f.write_str(label)
    }
}

/// Repair bookkeeping for one execution. Never shared between calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            last_error: None,
        }
    }

    pub fn can_repair(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Count one repair triggered by `error`.
    pub fn record_repair(&mut self, error: &str) {
        self.attempt += 1;
        self.last_error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repairs_are_bounded() {
        let mut state = RetryState::new(3);
        let mut repairs = 0;
        while state.can_repair() {
            state.record_repair("Syntax error");
            repairs += 1;
        }
        assert_eq!(repairs, 3);
        assert_eq!(state.attempt, 3);
        assert_eq!(state.last_error.as_deref(), Some("Syntax error"));
    }

    #[test]
    fn test_zero_attempts_never_repairs() {
        assert!(!RetryState::new(0).can_repair());
    }
}
