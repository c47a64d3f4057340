//! Error types for the planning core

use thiserror::Error;

/// Result type alias for planning operations
pub type Result<T> = std::result::Result<T, PlanError>;

/// Main error type for the planning core
///
/// Type errors (`TypeMismatch`, `TypeCheck`) are expected and recovered
/// locally by callers of the strict-typing paths. `Unresolved` and
/// `InvalidArgument` signal invariant breaches in the input plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("unresolved plan or expression: {0}")]
    Unresolved(String),

    #[error("type check failed: {0}")]
    TypeCheck(String),

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PlanError {
    /// Build a `TypeMismatch` naming the offending expression and the
    /// type class it was expected to widen into.
    pub fn mismatch(offending: impl std::fmt::Display, expected: &str) -> Self {
        PlanError::TypeMismatch(format!("expected {expected}, got: {offending}"))
    }
}
