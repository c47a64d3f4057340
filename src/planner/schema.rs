//! Attributes and expression identity

use crate::types::DataType;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_EXPR_ID: AtomicU64 = AtomicU64::new(0);

/// Globally unique identity of an attribute or alias
///
/// Minted from a process-wide monotonic counter; survives renaming, so
/// reference-set operations compare ids rather than names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u64);

impl ExprId {
    /// Mint a fresh id. Thread-safe.
    pub fn next() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A named, typed, nullable output column of a plan node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub id: ExprId,
    /// Optional relation qualifier (e.g. the alias of an enclosing subquery)
    pub qualifier: Option<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
            id: ExprId::next(),
            qualifier: None,
        }
    }

    /// Referential identity check: same column regardless of name,
    /// qualifier, or nullability adjustments.
    pub fn same_by_id(&self, other: &Attribute) -> bool {
        self.id == other.id
    }

    /// Copy of this attribute under a fresh id.
    pub fn new_instance(&self) -> Self {
        Self {
            id: ExprId::next(),
            ..self.clone()
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    pub fn without_qualifier(mut self) -> Self {
        self.qualifier = None;
        self
    }

    pub fn qualified_name(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{}.{}", q, self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.qualified_name(), self.id)
    }
}
