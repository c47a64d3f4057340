//! Scoping-node elimination

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::{Expr, LogicalPlan};
use crate::tree::TreeNode;

/// Drop `Subquery` and `With` wrappers and strip qualifiers from
/// attribute references
///
/// Both wrappers exist only to delimit name scopes for the resolver;
/// attribute identity is by id, so once resolution has happened the
/// wrappers and qualifiers carry no information.
pub struct EliminateSubqueries;

impl OptimizerRule for EliminateSubqueries {
    fn name(&self) -> &str {
        "EliminateSubqueries"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let unwrapped = plan.transform_up(&|p| match p {
            LogicalPlan::Subquery(node) => Some(node.input.as_ref().clone()),
            LogicalPlan::With(node) => Some(node.input.as_ref().clone()),
            _ => None,
        });
        Ok(unwrapped.transform_up(&|p| {
            let stripped = p.map_expressions(&strip_qualifiers);
            (stripped != *p).then_some(stripped)
        }))
    }
}

fn strip_qualifiers(expr: &Expr) -> Expr {
    expr.transform_down(&|e| match e {
        Expr::Attribute(a) if a.qualifier.is_some() => {
            Some(Expr::Attribute(a.clone().without_qualifier()))
        }
        _ => None,
    })
}
