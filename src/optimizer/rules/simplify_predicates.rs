//! Predicate normalization and simplification rules

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::predicate::{
    as_and, as_not, as_or, conjunction, disjunction, split_conjunction, split_disjunction, to_cnf,
};
use crate::planner::{lit, Expr, FilterNode, LogicalPlan, UnaryOp};
use crate::tree::TreeNode;

/// Rewrite every filter condition into conjunctive normal form
pub struct CnfConversion;

impl OptimizerRule for CnfConversion {
    fn name(&self) -> &str {
        "CnfConversion"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| match p {
            LogicalPlan::Filter(node) => {
                let predicate = to_cnf(&node.predicate);
                (predicate != node.predicate).then(|| {
                    LogicalPlan::Filter(FilterNode {
                        input: node.input.clone(),
                        predicate,
                    })
                })
            }
            _ => None,
        }))
    }
}

/// Drop duplicated conjuncts and disjuncts, and conditionals whose
/// branches coincide
pub struct EliminateCommonPredicates;

impl OptimizerRule for EliminateCommonPredicates {
    fn name(&self) -> &str {
        "EliminateCommonPredicates"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| {
            let simplified = p.map_expressions(&|e| e.transform_up(&eliminate));
            (simplified != *p).then_some(simplified)
        }))
    }
}

fn dedup(exprs: Vec<Expr>) -> Vec<Expr> {
    let mut out: Vec<Expr> = Vec::with_capacity(exprs.len());
    for e in exprs {
        if !out.contains(&e) {
            out.push(e);
        }
    }
    out
}

fn eliminate(expr: &Expr) -> Option<Expr> {
    if as_and(expr).is_some() {
        let conjuncts = split_conjunction(expr);
        let deduped = dedup(conjuncts.clone());
        if deduped.len() < conjuncts.len() {
            return conjunction(deduped);
        }
    }
    if as_or(expr).is_some() {
        let disjuncts = split_disjunction(expr);
        let deduped = dedup(disjuncts.clone());
        if deduped.len() < disjuncts.len() {
            return disjunction(deduped);
        }
    }
    if let Expr::If {
        condition,
        then_expr,
        else_expr,
    } = expr
    {
        // Identical branches: the conditional only matters for a NULL
        // condition, which yields NULL. With a non-nullable condition
        // the branch value is the whole story.
        if then_expr == else_expr && !condition.nullable() {
            return Some((**then_expr).clone());
        }
    }
    None
}

/// De Morgan's laws, double negation, comparison flips, and
/// complement-pair shortcuts
pub struct ReduceNegations;

impl OptimizerRule for ReduceNegations {
    fn name(&self) -> &str {
        "ReduceNegations"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| {
            let reduced = p.map_expressions(&|e| e.transform_up(&reduce));
            (reduced != *p).then_some(reduced)
        }))
    }
}

fn reduce(expr: &Expr) -> Option<Expr> {
    if let Some(inner) = as_not(expr) {
        if let Some(x) = as_not(inner) {
            return Some(x.clone());
        }
        if let Some((a, b)) = as_and(inner) {
            return Some(a.clone().not().or(b.clone().not()));
        }
        if let Some((a, b)) = as_or(inner) {
            return Some(a.clone().not().and(b.clone().not()));
        }
        if let Expr::Binary { left, op, right } = inner {
            if let Some(flipped) = op.negated() {
                return Some(Expr::Binary {
                    left: left.clone(),
                    op: flipped,
                    right: right.clone(),
                });
            }
        }
        if let Expr::Unary { op, child } = inner {
            match op {
                UnaryOp::IsNull => return Some(child.as_ref().clone().is_not_null()),
                UnaryOp::IsNotNull => return Some(child.as_ref().clone().is_null()),
                _ => {}
            }
        }
    }
    if let Some((a, b)) = as_and(expr) {
        if as_not(a) == Some(b) || as_not(b) == Some(a) {
            return Some(lit(false));
        }
    }
    if let Some((a, b)) = as_or(expr) {
        if as_not(a) == Some(b) || as_not(b) == Some(a) {
            return Some(lit(true));
        }
    }
    if let Expr::If {
        condition,
        then_expr,
        else_expr,
    } = expr
    {
        if let Some(inner) = as_not(condition) {
            return Some(Expr::If {
                condition: Box::new(inner.clone()),
                then_expr: else_expr.clone(),
                else_expr: then_expr.clone(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::predicate::is_cnf;
    use crate::planner::{Attribute, BinaryOp};
    use crate::types::DataType;

    fn attr(name: &str) -> Expr {
        Expr::Attribute(Attribute::new(name, DataType::Int, false))
    }

    fn nullable_bool(name: &str) -> Expr {
        Expr::Attribute(Attribute::new(name, DataType::Boolean, true))
    }

    #[test]
    fn test_filter_condition_rewritten_to_cnf() {
        let a = attr("a").eq(lit(1i32));
        let b = attr("b").eq(lit(2i32));
        let c = attr("c").eq(lit(3i32));
        let rel = crate::planner::LogicalPlanBuilder::relation(vec![Attribute::new(
            "a",
            DataType::Int,
            false,
        )])
        .build();
        let plan = rel.filter(a.clone().or(b.clone().and(c.clone())));
        let optimized = CnfConversion.optimize(&plan).unwrap();
        match optimized {
            LogicalPlan::Filter(node) => {
                assert!(is_cnf(&node.predicate));
                assert_eq!(node.predicate, a.clone().or(b).and(a.or(c)));
            }
            other => panic!("expected Filter, got {}", other.node_label()),
        }
    }

    #[test]
    fn test_duplicate_conjuncts_dropped() {
        let p = attr("a").gt(lit(0i32));
        assert_eq!(eliminate(&p.clone().and(p.clone())), Some(p.clone()));
        assert_eq!(eliminate(&p.clone().or(p.clone())), Some(p.clone()));
        // Triple with one duplicate collapses to a pair
        let q = attr("b").lt(lit(9i32));
        assert_eq!(
            eliminate(&p.clone().and(q.clone()).and(p.clone())),
            Some(p.and(q))
        );
    }

    #[test]
    fn test_identical_if_branches() {
        let v = attr("v");
        let safe = Expr::if_else(attr("c").gt(lit(0i32)), v.clone(), v.clone());
        assert_eq!(eliminate(&safe), Some(v.clone()));

        // A nullable condition must keep its null propagation
        let guarded = Expr::if_else(nullable_bool("c"), v.clone(), v);
        assert_eq!(eliminate(&guarded), None);
    }

    #[test]
    fn test_double_negation() {
        let p = attr("a").gt(lit(0i32));
        assert_eq!(reduce(&p.clone().not().not()), Some(p));
    }

    #[test]
    fn test_comparison_flips() {
        let flipped = reduce(&attr("a").lt(lit(1i32)).not()).unwrap();
        assert!(matches!(
            flipped,
            Expr::Binary {
                op: BinaryOp::GtEq,
                ..
            }
        ));
        let flipped = reduce(&attr("a").eq(lit(1i32)).not()).unwrap();
        assert!(matches!(
            flipped,
            Expr::Binary {
                op: BinaryOp::NotEq,
                ..
            }
        ));
    }

    #[test]
    fn test_is_null_negation() {
        let a = attr("a");
        assert_eq!(
            reduce(&a.clone().is_null().not()),
            Some(a.clone().is_not_null())
        );
        assert_eq!(reduce(&a.clone().is_not_null().not()), Some(a.is_null()));
    }

    #[test]
    fn test_complement_pairs() {
        let p = attr("a").gt(lit(0i32));
        assert_eq!(reduce(&p.clone().and(p.clone().not())), Some(lit(false)));
        assert_eq!(reduce(&p.clone().or(p.not())), Some(lit(true)));
    }

    #[test]
    fn test_negated_if_condition_swaps_branches() {
        let c = attr("c").gt(lit(0i32));
        let swapped = reduce(&Expr::if_else(c.clone().not(), lit(1i32), lit(2i32))).unwrap();
        assert_eq!(swapped, Expr::if_else(c, lit(2i32), lit(1i32)));
    }
}
