//! Safety Policy
//!
//! Read-only guard run before every dry-run and execution.

pub mod lexer;
pub mod sql_validator;

pub use sql_validator::{SafetyPolicy, SafetyRule, SafetyVerdict, BLOCKED_KEYWORDS};
