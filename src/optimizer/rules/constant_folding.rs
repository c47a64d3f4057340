//! Constant folding rules

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::predicate::{as_and, as_boolean_literal, as_not, as_or};
use crate::planner::{lit, Expr, LocalRelationNode, LogicalPlan};
use crate::tree::TreeNode;

/// Replace any foldable subexpression with a literal of its value
pub struct FoldConstants;

impl OptimizerRule for FoldConstants {
    fn name(&self) -> &str {
        "FoldConstants"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| {
            let folded = p.map_expressions(&fold_expr);
            (folded != *p).then_some(folded)
        }))
    }
}

fn fold_expr(expr: &Expr) -> Expr {
    expr.transform_down(&|e| {
        // Named expressions keep their wrapper so projection output is
        // unaffected; their children still fold.
        if matches!(
            e,
            Expr::Literal { .. }
                | Expr::Alias { .. }
                | Expr::GroupingAlias { .. }
                | Expr::AggregationAlias { .. }
        ) {
            return None;
        }
        if !e.foldable() {
            return None;
        }
        let data_type = e.data_type().ok()?;
        let value = e.eval()?;
        // A conditional can yield a value of a narrower branch type than
        // the expression's declared type; the literal must carry both in
        // agreement.
        let value = match value.data_type() {
            Some(t) if t != data_type => value.cast_to(&data_type)?,
            _ => value,
        };
        Some(Expr::Literal { value, data_type })
    })
}

/// Erase filters with constant conditions
///
/// `Filter(p, TRUE)` keeps every row and becomes `p`; `Filter(p, FALSE)`
/// keeps none and becomes an empty local relation with the same output.
pub struct FoldConstantFilters;

impl OptimizerRule for FoldConstantFilters {
    fn name(&self) -> &str {
        "FoldConstantFilters"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let plan = plan.try_map_children(|c| self.optimize(c))?;
        if let LogicalPlan::Filter(node) = &plan {
            match as_boolean_literal(&node.predicate) {
                Some(true) => return Ok(node.input.as_ref().clone()),
                Some(false) => {
                    return Ok(LogicalPlan::LocalRelation(LocalRelationNode {
                        rows: vec![],
                        output: node.input.output()?,
                    }))
                }
                None => {}
            }
        }
        Ok(plan)
    }
}

/// Boolean-algebra identities over literal operands and duplicated
/// subtrees
pub struct FoldLogicalPredicates;

impl OptimizerRule for FoldLogicalPredicates {
    fn name(&self) -> &str {
        "FoldLogicalPredicates"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| {
            let simplified = p.map_expressions(&|e| e.transform_up(&simplify));
            (simplified != *p).then_some(simplified)
        }))
    }
}

fn simplify(expr: &Expr) -> Option<Expr> {
    if let Some((l, r)) = as_and(expr) {
        if as_boolean_literal(l) == Some(true) {
            return Some(r.clone());
        }
        if as_boolean_literal(r) == Some(true) {
            return Some(l.clone());
        }
        if as_boolean_literal(l) == Some(false) || as_boolean_literal(r) == Some(false) {
            return Some(lit(false));
        }
        if l == r {
            return Some(l.clone());
        }
    }
    if let Some((l, r)) = as_or(expr) {
        if as_boolean_literal(l) == Some(false) {
            return Some(r.clone());
        }
        if as_boolean_literal(r) == Some(false) {
            return Some(l.clone());
        }
        if as_boolean_literal(l) == Some(true) || as_boolean_literal(r) == Some(true) {
            return Some(lit(true));
        }
        if l == r {
            return Some(l.clone());
        }
    }
    if let Some(inner) = as_not(expr) {
        if let Some(b) = as_boolean_literal(inner) {
            return Some(lit(!b));
        }
    }
    if let Expr::If {
        condition,
        then_expr,
        else_expr,
    } = expr
    {
        match as_boolean_literal(condition) {
            Some(true) => return Some((**then_expr).clone()),
            Some(false) => return Some((**else_expr).clone()),
            None => {}
        }
    }
    None
}
