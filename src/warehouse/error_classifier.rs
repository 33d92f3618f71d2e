//! Error Classifier
//!
//! Maps raw warehouse failures onto `Transient`, `Logic` or `Fatal`.
//! Structured information (reason code, then HTTP status) wins; message
//! sniffing is used when the warehouse gave neither, or only a bare 400.
//! Anything that matches nothing is `Fatal`. A client-side deadline overrun
//! is `Fatal` with `FatalKind::DeadlineExceeded`.

use crate::error::{ClassifiedError, ErrorClass, WarehouseError};

const LOGIC_REASONS: &[&str] = &["invalidquery"];

const TRANSIENT_REASONS: &[&str] = &[
    "backenderror",
    "internalerror",
    "ratelimitexceeded",
    "jobratelimitexceeded",
    "tableunavailable",
    "unavailable",
    "deadline_exceeded",
];

const FATAL_REASONS: &[&str] = &[
    "accessdenied",
    "quotaexceeded",
    "billingnotenabled",
    "billingtierlimitexceeded",
    "notfound",
    "responsetoolarge",
    "resourcesexceeded",
    "invalid",
    "duplicate",
    "stopped",
];

/// Message fragments of malformed-query failures.
const LOGIC_PATTERNS: &[&str] = &[
    "syntax error",
    "unrecognized name",
    "no matching signature",
    "type mismatch",
    "cannot be applied to",
    "is neither grouped nor aggregated",
    "not grouped",
    "unknown column",
    "column not found",
    "does not have a field",
    "ambiguous column",
    "invalid cast",
    "could not cast",
    "unexpected keyword",
    "expected end of input",
];

/// Message fragments of failures likely to pass on an unchanged retry.
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection reset",
    "connection refused",
    "connection closed",
    "broken pipe",
    "temporarily unavailable",
    "service unavailable",
    "backend error",
    "internal error",
    "rate limit",
    "too many requests",
    "try again",
];

/// Warehouse error classifier
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, error: &WarehouseError) -> ClassifiedError {
        let message = error.message.clone();
        if error.is_deadline() {
            return ClassifiedError::deadline_exceeded(message);
        }
        match self.class_of(error) {
            ErrorClass::Transient => ClassifiedError::Transient(message),
            ErrorClass::Logic => ClassifiedError::Logic(message),
            _ => ClassifiedError::fatal(message),
        }
    }

    pub fn class_of(&self, error: &WarehouseError) -> ErrorClass {
        if error.is_deadline() {
            return ErrorClass::Fatal;
        }

        if let Some(reason) = &error.reason {
            if let Some(class) = classify_reason(reason) {
                return class;
            }
        }

        if let Some(class) = error.status.and_then(classify_status) {
            return class;
        }

        if error.transport {
            return ErrorClass::Transient;
        }

        classify_message(&error.message)
    }
}

fn classify_reason(reason: &str) -> Option<ErrorClass> {
    let reason = reason.to_ascii_lowercase();
    if LOGIC_REASONS.contains(&reason.as_str()) {
        Some(ErrorClass::Logic)
    } else if TRANSIENT_REASONS.contains(&reason.as_str()) {
        Some(ErrorClass::Transient)
    } else if FATAL_REASONS.contains(&reason.as_str()) {
        Some(ErrorClass::Fatal)
    } else {
        None
    }
}

/// `None` for a 400: BigQuery uses it for both malformed queries and bad
/// arguments, so only the message can tell them apart.
fn classify_status(status: u16) -> Option<ErrorClass> {
    match status {
        400 => None,
        408 | 429 | 500 | 502 | 503 | 504 => Some(ErrorClass::Transient),
        _ => Some(ErrorClass::Fatal),
    }
}

fn classify_message(message: &str) -> ErrorClass {
    let lowered = message.to_lowercase();

    if LOGIC_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return ErrorClass::Logic;
    }

    if TRANSIENT_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return ErrorClass::Transient;
    }

    ErrorClass::Fatal
}
