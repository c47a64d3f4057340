//! The optimizer's rewrite rules

mod constant_folding;
mod merge;
mod pushdown;
mod simplify_exprs;
mod simplify_predicates;
mod subquery;

pub use constant_folding::{FoldConstantFilters, FoldConstants, FoldLogicalPredicates};
pub use merge::{MergeFilters, MergeProjects, ReduceLimits};
pub use pushdown::{
    PushFiltersThroughAggregates, PushFiltersThroughJoins, PushFiltersThroughProjects,
    PushLimitsThroughUnions, PushProjectsThroughLimits,
};
pub use simplify_exprs::{ReduceAliases, ReduceCasts};
pub use simplify_predicates::{CnfConversion, EliminateCommonPredicates, ReduceNegations};
pub use subquery::EliminateSubqueries;
