//! SQL Safety Validator
//!
//! Read-only policy applied to every query before it reaches the warehouse,
//! including every repaired query. Rules are evaluated in order and the
//! first violation wins:
//!
//! 1. empty or whitespace-only text
//! 2. more than one statement (string literals ignored, one trailing `;` allowed)
//! 3. a statement separator inside a comment
//! 4. a destructive keyword outside string literals, or a mutating node in
//!    the parsed statement tree
//! 5. text not starting with `SELECT` or `WITH`

use crate::error::ClassifiedError;
use crate::safety::lexer;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::parser::Parser;
use std::fmt;
use tracing::debug;

/// Destructive SQL keywords, matched case-insensitively on word boundaries.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "DELETE", "UPDATE", "TRUNCATE", "DROP", "ALTER", "INSERT", "MERGE", "CREATE", "REPLACE",
    "GRANT", "REVOKE",
];

lazy_static! {
    static ref BLOCKED_KEYWORD_PATTERNS: Vec<(&'static str, Regex)> = BLOCKED_KEYWORDS
        .iter()
        .map(|kw| (*kw, Regex::new(&format!(r"(?i)\b{}\b", kw)).expect("static keyword pattern")))
        .collect();
    static ref ALLOWED_PREFIX: Regex =
        Regex::new(r"(?i)^(SELECT|WITH)\b").expect("static prefix pattern");
}

/// The rule a query violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyRule {
    EmptyQuery,
    MultipleStatements,
    CommentedSeparator,
    DestructiveKeyword,
    MutatingStatement,
    DisallowedStatement,
}

impl SafetyRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyRule::EmptyQuery => "empty_query",
            SafetyRule::MultipleStatements => "multiple_statements",
            SafetyRule::CommentedSeparator => "commented_separator",
            SafetyRule::DestructiveKeyword => "destructive_keyword",
            SafetyRule::MutatingStatement => "mutating_statement",
            SafetyRule::DisallowedStatement => "disallowed_statement",
        }
    }
}

impl fmt::Display for SafetyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub is_safe: bool,
    /// Present iff the query is not safe.
    pub reason: Option<String>,
    pub rule: Option<SafetyRule>,
}

impl SafetyVerdict {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            reason: None,
            rule: None,
        }
    }

    pub fn blocked(rule: SafetyRule, detail: impl fmt::Display) -> Self {
        Self {
            is_safe: false,
            reason: Some(format!("Blocked [{}]: {}", rule, detail)),
            rule: Some(rule),
        }
    }

    /// `Err(SafetyViolation)` for an unsafe verdict.
    pub fn into_result(self) -> Result<(), ClassifiedError> {
        match self.reason {
            Some(reason) if !self.is_safe => Err(ClassifiedError::SafetyViolation(reason)),
            _ => Ok(()),
        }
    }
}

/// Result of inspecting the parsed statement tree.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TreeCheck {
    ReadOnly,
    Mutating(String),
    Unparsed,
}

/// Read-only SQL policy. Pure and deterministic.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    statement_tree_check: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyPolicy {
    pub fn new() -> Self {
        Self {
            statement_tree_check: true,
        }
    }

    /// Policy using only the lexical rules.
    pub fn lexical_only() -> Self {
        Self {
            statement_tree_check: false,
        }
    }

    pub fn blocked_keywords() -> &'static [&'static str] {
        BLOCKED_KEYWORDS
    }

    pub fn validate(&self, sql: &str) -> SafetyVerdict {
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            return SafetyVerdict::blocked(SafetyRule::EmptyQuery, "SQL query is empty");
        }

        let without_literals = lexer::strip_literals(sql);

        if contains_multiple_statements(&without_literals) {
            return SafetyVerdict::blocked(
                SafetyRule::MultipleStatements,
                "Query contains multiple statements",
            );
        }

        if lexer::comments(sql).iter().any(|c| c.contains(';')) {
            return SafetyVerdict::blocked(
                SafetyRule::CommentedSeparator,
                "Query contains a statement separator inside a comment",
            );
        }

        if let Some(keyword) = first_blocked_keyword(&without_literals) {
            return SafetyVerdict::blocked(
                SafetyRule::DestructiveKeyword,
                format!("Query contains destructive keyword '{}'", keyword),
            );
        }

        if self.statement_tree_check {
            match inspect_statement_tree(trimmed) {
                TreeCheck::Mutating(kind) => {
                    return SafetyVerdict::blocked(
                        SafetyRule::MutatingStatement,
                        format!("Query contains a mutating operation ({})", kind),
                    );
                }
                TreeCheck::ReadOnly => {}
                TreeCheck::Unparsed => {
                    debug!("Statement tree unavailable, keeping lexical verdict");
                }
            }
        }

        if !ALLOWED_PREFIX.is_match(trimmed) {
            return SafetyVerdict::blocked(
                SafetyRule::DisallowedStatement,
                "Query must start with SELECT or WITH",
            );
        }

        SafetyVerdict::safe()
    }

    /// Validate and convert a violation into `ClassifiedError::SafetyViolation`.
    pub fn check(&self, sql: &str) -> Result<(), ClassifiedError> {
        self.validate(sql).into_result()
    }
}

/// More than one `;`, or a single one that is not the last character.
fn contains_multiple_statements(without_literals: &str) -> bool {
    let cleaned = without_literals.trim();
    let separators: Vec<usize> = cleaned.match_indices(';').map(|(i, _)| i).collect();
    match separators.as_slice() {
        [] => false,
        [only] => *only != cleaned.len() - 1,
        _ => true,
    }
}

fn first_blocked_keyword(text: &str) -> Option<&'static str> {
    BLOCKED_KEYWORD_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(kw, _)| *kw)
}

fn inspect_statement_tree(sql: &str) -> TreeCheck {
    let statements = match Parser::parse_sql(&BigQueryDialect {}, sql) {
        Ok(statements) => statements,
        Err(e) => {
            debug!("SQL parsing failed: {}", e);
            return TreeCheck::Unparsed;
        }
    };

    statements
        .iter()
        .find_map(statement_mutation)
        .map(TreeCheck::Mutating)
        .unwrap_or(TreeCheck::ReadOnly)
}

fn statement_mutation(stmt: &Statement) -> Option<String> {
    let kind = match stmt {
        Statement::Query(query) => return query_mutation(query),
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Merge { .. } => "MERGE",
        Statement::Truncate { .. } => "TRUNCATE",
        Statement::Copy { .. } | Statement::CopyIntoSnowflake { .. } => "COPY",
        Statement::Directory { .. } => "EXPORT",
        Statement::Grant { .. } => "GRANT",
        Statement::Revoke { .. } => "REVOKE",
        Statement::Execute { .. } => "EXECUTE",
        Statement::CreateTable { .. }
        | Statement::CreateView { .. }
        | Statement::CreateVirtualTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateRole { .. }
        | Statement::CreateSchema { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateFunction { .. }
        | Statement::CreateProcedure { .. }
        | Statement::CreateMacro { .. }
        | Statement::CreateStage { .. }
        | Statement::CreateSequence { .. }
        | Statement::CreateType { .. } => "CREATE",
        Statement::AlterTable { .. }
        | Statement::AlterIndex { .. }
        | Statement::AlterView { .. }
        | Statement::AlterRole { .. } => "ALTER",
        Statement::Drop { .. } | Statement::DropFunction { .. } => "DROP",
        _ => return None,
    };
    Some(kind.to_string())
}

fn query_mutation(query: &Query) -> Option<String> {
    if let Some(with) = &query.with {
        if let Some(kind) = with.cte_tables.iter().find_map(|cte| query_mutation(&cte.query)) {
            return Some(kind);
        }
    }
    set_expr_mutation(&query.body)
}

fn set_expr_mutation(expr: &SetExpr) -> Option<String> {
    match expr {
        SetExpr::Select(select) => select.into.as_ref().map(|_| "SELECT INTO".to_string()),
        SetExpr::Query(query) => query_mutation(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_mutation(left).or_else(|| set_expr_mutation(right))
        }
        SetExpr::Insert(stmt) | SetExpr::Update(stmt) => statement_mutation(stmt),
        SetExpr::Values(_) | SetExpr::Table(_) => None,
    }
}
