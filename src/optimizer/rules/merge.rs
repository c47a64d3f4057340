//! Rules that collapse adjacent operators of the same kind

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::predicate::{alias_table, substitute};
use crate::planner::schema::{Attribute, ExprId};
use crate::planner::{Expr, FilterNode, LimitNode, LogicalPlan, ProjectNode};
use crate::tree::TreeNode;
use std::collections::HashMap;

/// `Filter(Filter(p, a), b)` becomes `Filter(p, a AND b)`
pub struct MergeFilters;

impl OptimizerRule for MergeFilters {
    fn name(&self) -> &str {
        "MergeFilters"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| {
            let LogicalPlan::Filter(outer) = p else {
                return None;
            };
            let LogicalPlan::Filter(inner) = outer.input.as_ref() else {
                return None;
            };
            Some(LogicalPlan::Filter(FilterNode {
                input: inner.input.clone(),
                predicate: inner.predicate.clone().and(outer.predicate.clone()),
            }))
        }))
    }
}

/// `Limit(Limit(p, n), m)` becomes `Limit(p, If(n < m, n, m))`
///
/// The conditional is left for FoldConstants to collapse; both bounds
/// are foldable literals by the limit typing rule.
pub struct ReduceLimits;

impl OptimizerRule for ReduceLimits {
    fn name(&self) -> &str {
        "ReduceLimits"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| {
            let LogicalPlan::Limit(outer) = p else {
                return None;
            };
            let LogicalPlan::Limit(inner) = outer.input.as_ref() else {
                return None;
            };
            let n = inner.limit.clone();
            let m = outer.limit.clone();
            Some(LogicalPlan::Limit(LimitNode {
                input: inner.input.clone(),
                limit: Expr::if_else(n.clone().lt(m.clone()), n, m),
            }))
        }))
    }
}

/// Collapse stacked projections and drop identity projections
pub struct MergeProjects;

impl OptimizerRule for MergeProjects {
    fn name(&self) -> &str {
        "MergeProjects"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let plan = plan.try_map_children(|c| self.optimize(c))?;
        let LogicalPlan::Project(outer) = &plan else {
            return Ok(plan);
        };

        // Project(p, p.output) is a no-op
        let input_output = outer.input.output()?;
        if projects_its_input(&outer.exprs, &input_output) {
            return Ok(outer.input.as_ref().clone());
        }

        // Project over Project: inline the inner aliases into the outer
        // list and project straight off the grandchild
        if let LogicalPlan::Project(inner) = outer.input.as_ref() {
            if inner.exprs.iter().all(|e| e.is_pure()) {
                let table = alias_table(&inner.exprs);
                let exprs = outer
                    .exprs
                    .iter()
                    .map(|e| inline_named(e, &table))
                    .collect();
                return Ok(LogicalPlan::Project(ProjectNode {
                    input: inner.input.clone(),
                    exprs,
                }));
            }
        }
        Ok(plan)
    }
}

fn projects_its_input(exprs: &[Expr], output: &[Attribute]) -> bool {
    exprs.len() == output.len()
        && exprs.iter().zip(output).all(|(e, a)| match e {
            Expr::Attribute(ea) => ea.id == a.id && ea.name == a.name,
            _ => false,
        })
}

/// Substitute inner alias definitions into an outer projection element,
/// preserving the element's output name and id.
fn inline_named(expr: &Expr, table: &HashMap<ExprId, Expr>) -> Expr {
    if let Expr::Attribute(a) = expr {
        if let Some(definition) = table.get(&a.id) {
            return Expr::Alias {
                child: Box::new(definition.clone()),
                name: a.name.clone(),
                id: a.id,
            };
        }
    }
    substitute(expr, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{lit, LogicalPlanBuilder};
    use crate::types::DataType;

    fn rel_a() -> (LogicalPlan, Attribute) {
        let a = Attribute::new("a", DataType::Int, false);
        let plan = LogicalPlanBuilder::relation(vec![a.clone()]).build();
        (plan, a)
    }

    #[test]
    fn test_merge_filters_keeps_inner_first() {
        let (rel, a) = rel_a();
        let lo = Expr::Attribute(a.clone()).gt(lit(1i32));
        let hi = Expr::Attribute(a).lt(lit(10i32));
        let plan = rel.clone().filter(lo.clone()).filter(hi.clone());

        let optimized = MergeFilters.optimize(&plan).unwrap();
        assert_eq!(optimized, rel.filter(lo.and(hi)));
    }

    #[test]
    fn test_merge_three_filters() {
        let (rel, a) = rel_a();
        let p1 = Expr::Attribute(a.clone()).gt(lit(1i32));
        let p2 = Expr::Attribute(a.clone()).lt(lit(10i32));
        let p3 = Expr::Attribute(a).not_eq(lit(5i32));
        let plan = rel
            .clone()
            .filter(p1.clone())
            .filter(p2.clone())
            .filter(p3.clone());

        let optimized = MergeFilters.optimize(&plan).unwrap();
        assert_eq!(optimized, rel.filter(p1.and(p2).and(p3)));
    }

    #[test]
    fn test_reduce_limits_builds_min() {
        let (rel, _) = rel_a();
        let plan = rel.clone().limit(lit(5i32)).limit(lit(3i32));

        let optimized = ReduceLimits.optimize(&plan).unwrap();
        let expected = rel.limit(Expr::if_else(
            lit(5i32).lt(lit(3i32)),
            lit(5i32),
            lit(3i32),
        ));
        assert_eq!(optimized, expected);
    }

    #[test]
    fn test_identity_projection_removed() {
        let (rel, a) = rel_a();
        let plan = rel.clone().project(vec![Expr::Attribute(a)]).unwrap();
        let optimized = MergeProjects.optimize(&plan).unwrap();
        assert_eq!(optimized, rel);
    }

    #[test]
    fn test_reordered_projection_kept() {
        let a = Attribute::new("a", DataType::Int, false);
        let b = Attribute::new("b", DataType::Int, false);
        let rel = LogicalPlanBuilder::relation(vec![a.clone(), b.clone()]).build();
        let plan = rel
            .project(vec![Expr::Attribute(b), Expr::Attribute(a)])
            .unwrap();
        let optimized = MergeProjects.optimize(&plan).unwrap();
        assert!(matches!(optimized, LogicalPlan::Project(_)));
    }

    #[test]
    fn test_stacked_projects_inline() {
        let (rel, a) = rel_a();
        let inner = Expr::Attribute(a.clone()).add(lit(1i32)).alias("x");
        let x = Expr::Attribute(inner.to_attribute().unwrap());
        let outer = x.add(lit(2i32)).alias("y");
        let (outer_name, outer_id) = match &outer {
            Expr::Alias { name, id, .. } => (name.clone(), *id),
            _ => unreachable!(),
        };

        let plan = rel
            .clone()
            .project(vec![inner])
            .unwrap()
            .project(vec![outer])
            .unwrap();
        let optimized = MergeProjects.optimize(&plan).unwrap();

        let expected_expr = Expr::Alias {
            child: Box::new(Expr::Attribute(a).add(lit(1i32)).add(lit(2i32))),
            name: outer_name,
            id: outer_id,
        };
        assert_eq!(optimized, rel.project(vec![expected_expr]).unwrap());
    }

    #[test]
    fn test_bare_attribute_over_alias_stays_named() {
        let (rel, a) = rel_a();
        let inner = Expr::Attribute(a.clone()).add(lit(1i32)).alias("x");
        let x_attr = inner.to_attribute().unwrap();

        let plan = rel
            .clone()
            .project(vec![inner])
            .unwrap()
            .project(vec![Expr::Attribute(x_attr.clone())])
            .unwrap();
        let optimized = MergeProjects.optimize(&plan).unwrap();

        // The collapsed projection still outputs x under its old id
        assert_eq!(optimized.output().unwrap(), vec![x_attr]);
    }
}
