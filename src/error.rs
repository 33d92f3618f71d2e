use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Repair service error: {0}")]
    Repair(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// Reason attached by a warehouse client whose own wait ran past the deadline.
pub const DEADLINE_REASON: &str = "clientDeadlineExceeded";

/// Raw failure reported by a warehouse implementation, before classification.
///
/// `status` and `reason` carry whatever structured information the warehouse
/// returned; the classifier consults them before falling back to the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct WarehouseError {
    pub status: Option<u16>,
    pub reason: Option<String>,
    pub message: String,
    /// The request never produced a response (connect failure, reset, read timeout).
    pub transport: bool,
}

impl WarehouseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: None,
            message: message.into(),
            transport: false,
        }
    }

    pub fn api(status: u16, reason: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            reason,
            message: message.into(),
            transport: false,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            reason: None,
            message: message.into(),
            transport: true,
        }
    }

    /// The job was still running when the caller's deadline passed.
    pub fn deadline(message: impl Into<String>) -> Self {
        Self::new(message).with_reason(DEADLINE_REASON)
    }

    pub fn is_deadline(&self) -> bool {
        self.reason.as_deref() == Some(DEADLINE_REASON)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Why a `ClassifiedError::Fatal` happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    Permanent,
    DeadlineExceeded,
    Cancelled,
}

/// Outcome taxonomy shared by every sub-call of an execution.
///
/// `SafetyViolation` is only produced by the safety policy, never by a warehouse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Logic(String),

    #[error("{0}")]
    SafetyViolation(String),

    #[error("{message}")]
    Fatal { message: String, kind: FatalKind },
}

impl ClassifiedError {
    pub fn fatal(message: impl Into<String>) -> Self {
        ClassifiedError::Fatal {
            message: message.into(),
            kind: FatalKind::Permanent,
        }
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        ClassifiedError::Fatal {
            message: message.into(),
            kind: FatalKind::DeadlineExceeded,
        }
    }

    pub fn cancelled() -> Self {
        ClassifiedError::Fatal {
            message: "execution cancelled".to_string(),
            kind: FatalKind::Cancelled,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClassifiedError::Transient(msg)
            | ClassifiedError::Logic(msg)
            | ClassifiedError::SafetyViolation(msg) => msg,
            ClassifiedError::Fatal { message, .. } => message,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ClassifiedError::Transient(_) => ErrorClass::Transient,
            ClassifiedError::Logic(_) => ErrorClass::Logic,
            ClassifiedError::SafetyViolation(_) => ErrorClass::SafetyViolation,
            ClassifiedError::Fatal { .. } => ErrorClass::Fatal,
        }
    }

    pub fn is_logic(&self) -> bool {
        matches!(self, ClassifiedError::Logic(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ClassifiedError::Transient(_))
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(
            self,
            ClassifiedError::Fatal {
                kind: FatalKind::DeadlineExceeded,
                ..
            }
        )
    }
}

/// Payload-free tag of a `ClassifiedError`, used by the classifier and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Logic,
    SafetyViolation,
    Fatal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => write!(f, "Transient"),
            ErrorClass::Logic => write!(f, "LogicError"),
            ErrorClass::SafetyViolation => write!(f, "SafetyViolation"),
            ErrorClass::Fatal => write!(f, "Fatal"),
        }
    }
}
