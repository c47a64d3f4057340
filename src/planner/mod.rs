//! Logical planning: expressions, plans, and predicate utilities

pub mod logical_expr;
pub mod logical_plan;
pub mod predicate;
pub mod schema;

pub use logical_expr::{
    lit, AggregateFunction, BinaryOp, Expr, ScalarValue, SortDirection, SortExpr, UnaryOp,
};
pub use logical_plan::{
    AggregateNode, DistinctNode, EmptyRelationNode, FilterNode, JoinNode, JoinType, LimitNode,
    LocalRelationNode, LogicalPlan, LogicalPlanBuilder, ProjectNode, SetOpNode, SortNode,
    SubqueryNode, WithNode,
};
pub use schema::{Attribute, ExprId};
