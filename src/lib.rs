//! Logical query planning core
//!
//! Represents SQL logical query plans as immutable trees of operators
//! and expressions, type-checks them with implicit widening, and
//! rewrites them through a rule-based optimizer run to fixed point.
//! Parsing, cataloging, and physical execution live elsewhere: this
//! crate consumes a resolved logical plan and emits an equivalent,
//! cheaper one.

pub mod error;
pub mod optimizer;
pub mod planner;
pub mod tree;
pub mod types;

// Re-export main types
pub use error::{PlanError, Result};
pub use optimizer::{ExecutionStrategy, Optimizer, OptimizerRule, RuleBatch, RuleExecutor};
pub use planner::{
    lit, AggregateFunction, Attribute, BinaryOp, Expr, ExprId, JoinType, LogicalPlan,
    LogicalPlanBuilder, ScalarValue, SortDirection, SortExpr, UnaryOp,
};
pub use tree::TreeNode;
pub use types::{DataType, StructField};
