//! Pushdown rules: move filters, projections, and limits closer to the
//! data source

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::predicate::{alias_table, conjunction, inline_aliases, split_conjunction, substitute};
use crate::planner::schema::ExprId;
use crate::planner::{
    AggregateNode, Expr, FilterNode, JoinNode, JoinType, LimitNode, LogicalPlan, ProjectNode,
    SetOpNode,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Move a filter below a pure projection, inlining the projection's
/// aliases into the condition
pub struct PushFiltersThroughProjects;

impl OptimizerRule for PushFiltersThroughProjects {
    fn name(&self) -> &str {
        "PushFiltersThroughProjects"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let plan = plan.try_map_children(|c| self.optimize(c))?;
        let LogicalPlan::Filter(filter) = &plan else {
            return Ok(plan);
        };
        let LogicalPlan::Project(project) = filter.input.as_ref() else {
            return Ok(plan);
        };
        if !project.exprs.iter().all(|e| e.is_pure()) || !filter.predicate.is_pure() {
            return Ok(plan);
        }
        let predicate = inline_aliases(&filter.predicate, &project.exprs);
        Ok(LogicalPlan::Project(ProjectNode {
            input: Arc::new(LogicalPlan::Filter(FilterNode {
                input: project.input.clone(),
                predicate,
            })),
            exprs: project.exprs.clone(),
        }))
    }
}

/// Split an inner-join filter and attach each conjunct as far down as
/// its references allow
pub struct PushFiltersThroughJoins;

impl OptimizerRule for PushFiltersThroughJoins {
    fn name(&self) -> &str {
        "PushFiltersThroughJoins"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let plan = plan.try_map_children(|c| self.optimize(c))?;
        let LogicalPlan::Filter(filter) = &plan else {
            return Ok(plan);
        };
        let LogicalPlan::Join(join) = filter.input.as_ref() else {
            return Ok(plan);
        };
        if join.join_type != JoinType::Inner {
            return Ok(plan);
        }
        let conjuncts = split_conjunction(&filter.predicate);
        if !conjuncts.iter().all(|c| c.is_pure()) {
            return Ok(plan);
        }

        let left_ids = join.left.output_ids()?;
        let right_ids = join.right.output_ids()?;

        let mut left_only = Vec::new();
        let mut right_only = Vec::new();
        let mut remaining = Vec::new();
        for conjunct in conjuncts {
            let refs = conjunct.references();
            if refs.is_subset(&left_ids) {
                left_only.push(conjunct);
            } else if refs.is_subset(&right_ids) {
                right_only.push(conjunct);
            } else {
                remaining.push(conjunct);
            }
        }

        let attach = |input: &Arc<LogicalPlan>, predicates: Vec<Expr>| -> Arc<LogicalPlan> {
            match conjunction(predicates) {
                Some(predicate) => Arc::new(LogicalPlan::Filter(FilterNode {
                    input: input.clone(),
                    predicate,
                })),
                None => input.clone(),
            }
        };

        let condition = conjunction(
            join.condition
                .iter()
                .cloned()
                .chain(remaining)
                .collect::<Vec<_>>(),
        );
        Ok(LogicalPlan::Join(JoinNode {
            left: attach(&join.left, left_only),
            right: attach(&join.right, right_only),
            join_type: JoinType::Inner,
            condition,
        }))
    }
}

/// Push the aggregate-free conjuncts of a filter below the aggregation,
/// expanding grouping aliases back to the grouping expressions
pub struct PushFiltersThroughAggregates;

impl OptimizerRule for PushFiltersThroughAggregates {
    fn name(&self) -> &str {
        "PushFiltersThroughAggregates"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let plan = plan.try_map_children(|c| self.optimize(c))?;
        let LogicalPlan::Filter(filter) = &plan else {
            return Ok(plan);
        };
        let LogicalPlan::Aggregate(agg) = filter.input.as_ref() else {
            return Ok(plan);
        };
        if !agg.functions.iter().all(|f| f.is_pure()) {
            return Ok(plan);
        }

        let function_ids: HashSet<ExprId> = agg
            .functions
            .iter()
            .map(|f| f.to_attribute().map(|a| a.id))
            .collect::<Result<_>>()?;

        let (pushable, rest): (Vec<Expr>, Vec<Expr>) = split_conjunction(&filter.predicate)
            .into_iter()
            .partition(|c| c.is_pure() && c.references().is_disjoint(&function_ids));
        if pushable.is_empty() {
            return Ok(plan);
        }

        // Rewrite pushed conjuncts in terms of the aggregation's input
        let key_table = alias_table(&agg.keys);
        let pushed = conjunction(
            pushable
                .into_iter()
                .map(|c| substitute(&c, &key_table))
                .collect(),
        )
        .expect("pushable conjuncts are non-empty");

        let aggregate = LogicalPlan::Aggregate(AggregateNode {
            input: Arc::new(LogicalPlan::Filter(FilterNode {
                input: agg.input.clone(),
                predicate: pushed,
            })),
            keys: agg.keys.clone(),
            functions: agg.functions.clone(),
        });
        Ok(match conjunction(rest) {
            Some(predicate) => LogicalPlan::Filter(FilterNode {
                input: Arc::new(aggregate),
                predicate,
            }),
            None => aggregate,
        })
    }
}

/// `Project(Limit(p, n), list)` becomes `Limit(Project(p, list), n)`;
/// projection is row-wise, so the bound is unaffected
pub struct PushProjectsThroughLimits;

impl OptimizerRule for PushProjectsThroughLimits {
    fn name(&self) -> &str {
        "PushProjectsThroughLimits"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let plan = plan.try_map_children(|c| self.optimize(c))?;
        let LogicalPlan::Project(project) = &plan else {
            return Ok(plan);
        };
        let LogicalPlan::Limit(limit) = project.input.as_ref() else {
            return Ok(plan);
        };
        if !project.exprs.iter().all(|e| e.is_pure()) {
            return Ok(plan);
        }
        Ok(LogicalPlan::Limit(LimitNode {
            input: Arc::new(LogicalPlan::Project(ProjectNode {
                input: limit.input.clone(),
                exprs: project.exprs.clone(),
            })),
            limit: limit.limit.clone(),
        }))
    }
}

/// Bound both branches of a union before bounding the whole
pub struct PushLimitsThroughUnions;

impl OptimizerRule for PushLimitsThroughUnions {
    fn name(&self) -> &str {
        "PushLimitsThroughUnions"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        let plan = plan.try_map_children(|c| self.optimize(c))?;
        let LogicalPlan::Limit(outer) = &plan else {
            return Ok(plan);
        };
        let LogicalPlan::Union(union) = outer.input.as_ref() else {
            return Ok(plan);
        };
        let bound = outer.limit.eval();
        if bound.is_none() {
            return Ok(plan);
        }
        // Already-bounded branches at or below the outer bound gain
        // nothing from another limit; this is also what lets the
        // rewrite reach a fixed point.
        let already_bounded = |branch: &LogicalPlan| -> bool {
            let LogicalPlan::Limit(b) = branch else {
                return false;
            };
            match (b.limit.eval(), &bound) {
                (Some(inner), Some(outer_bound)) => matches!(
                    inner.compare(outer_bound),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                ),
                _ => false,
            }
        };
        if already_bounded(union.left.as_ref()) && already_bounded(union.right.as_ref()) {
            return Ok(plan);
        }

        let wrap = |branch: &Arc<LogicalPlan>| -> Arc<LogicalPlan> {
            if already_bounded(branch.as_ref()) {
                branch.clone()
            } else {
                Arc::new(LogicalPlan::Limit(LimitNode {
                    input: branch.clone(),
                    limit: outer.limit.clone(),
                }))
            }
        };
        Ok(LogicalPlan::Limit(LimitNode {
            input: Arc::new(LogicalPlan::Union(SetOpNode {
                left: wrap(&union.left),
                right: wrap(&union.right),
            })),
            limit: outer.limit.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{lit, Attribute, LogicalPlanBuilder};
    use crate::tree::TreeNode;
    use crate::types::DataType;

    fn rel(names: &[&str]) -> (LogicalPlan, Vec<Attribute>) {
        let attrs: Vec<Attribute> = names
            .iter()
            .map(|n| Attribute::new(*n, DataType::Int, false))
            .collect();
        (LogicalPlanBuilder::relation(attrs.clone()).build(), attrs)
    }

    #[test]
    fn test_filter_moves_below_project() {
        let (r, attrs) = rel(&["a"]);
        let a = Expr::Attribute(attrs[0].clone());
        let aliased = a.clone().add(lit(1i32)).alias("x");
        let x = Expr::Attribute(aliased.to_attribute().unwrap());

        let plan = r
            .clone()
            .project(vec![aliased.clone()])
            .unwrap()
            .filter(x.gt(lit(10i32)));
        let optimized = PushFiltersThroughProjects.optimize(&plan).unwrap();

        let expected = r
            .filter(a.add(lit(1i32)).gt(lit(10i32)))
            .project(vec![aliased])
            .unwrap();
        assert_eq!(optimized, expected);
    }

    #[test]
    fn test_inner_join_filter_partition() {
        let (l, lattrs) = rel(&["a", "b"]);
        let (r, rattrs) = rel(&["c"]);
        let a = Expr::Attribute(lattrs[0].clone());
        let b = Expr::Attribute(lattrs[1].clone());
        let c = Expr::Attribute(rattrs[0].clone());

        let join = LogicalPlanBuilder::from_plan(l.clone())
            .join(r.clone(), JoinType::Inner, None)
            .unwrap()
            .build();
        let plan = join.filter(a.clone().eq(c.clone()).and(b.clone().gt(lit(0i32))));
        let optimized = PushFiltersThroughJoins.optimize(&plan).unwrap();

        match optimized {
            LogicalPlan::Join(node) => {
                assert_eq!(node.condition, Some(a.eq(c)));
                assert_eq!(node.left.as_ref(), &l.filter(b.gt(lit(0i32))));
                assert_eq!(node.right.as_ref(), &r);
            }
            other => panic!("expected Join, got {}", other.node_label()),
        }
    }

    #[test]
    fn test_outer_join_filter_untouched() {
        let (l, lattrs) = rel(&["a"]);
        let (r, _) = rel(&["c"]);
        let a = Expr::Attribute(lattrs[0].clone());

        let plan = LogicalPlanBuilder::from_plan(l)
            .join(r, JoinType::LeftOuter, None)
            .unwrap()
            .build()
            .filter(a.gt(lit(0i32)));
        let optimized = PushFiltersThroughJoins.optimize(&plan).unwrap();
        assert_eq!(optimized, plan);
    }

    #[test]
    fn test_aggregate_filter_on_keys_pushed() {
        let (r, attrs) = rel(&["a", "b"]);
        let a = Expr::Attribute(attrs[0].clone());
        let b = Expr::Attribute(attrs[1].clone());
        let agg = LogicalPlanBuilder::from_plan(r.clone())
            .aggregate(
                vec![a.clone()],
                vec![Expr::AggregateFunction {
                    func: crate::planner::AggregateFunction::Sum,
                    args: vec![b],
                    distinct: false,
                }],
            )
            .build();
        let (key_attr, fn_attr) = match &agg {
            LogicalPlan::Aggregate(node) => (
                node.keys[0].to_attribute().unwrap(),
                node.functions[0].to_attribute().unwrap(),
            ),
            _ => unreachable!(),
        };

        let predicate = Expr::Attribute(key_attr)
            .gt(lit(1i32))
            .and(Expr::Attribute(fn_attr).gt(lit(100i64)));
        let plan = agg.filter(predicate.clone());
        let optimized = PushFiltersThroughAggregates.optimize(&plan).unwrap();

        // Key conjunct lands below the aggregate, expanded to `a`;
        // the aggregate conjunct stays above.
        match &optimized {
            LogicalPlan::Filter(above) => match above.input.as_ref() {
                LogicalPlan::Aggregate(node) => match node.input.as_ref() {
                    LogicalPlan::Filter(below) => {
                        assert_eq!(below.predicate, a.gt(lit(1i32)));
                        assert_eq!(below.input.as_ref(), &r);
                    }
                    other => panic!("expected Filter below, got {}", other.node_label()),
                },
                other => panic!("expected Aggregate, got {}", other.node_label()),
            },
            other => panic!("expected Filter above, got {}", other.node_label()),
        }
    }

    #[test]
    fn test_aggregate_only_filter_stays() {
        let (r, attrs) = rel(&["a", "b"]);
        let a = Expr::Attribute(attrs[0].clone());
        let b = Expr::Attribute(attrs[1].clone());
        let agg = LogicalPlanBuilder::from_plan(r)
            .aggregate(
                vec![a],
                vec![Expr::AggregateFunction {
                    func: crate::planner::AggregateFunction::Sum,
                    args: vec![b],
                    distinct: false,
                }],
            )
            .build();
        let fn_attr = match &agg {
            LogicalPlan::Aggregate(node) => node.functions[0].to_attribute().unwrap(),
            _ => unreachable!(),
        };

        let plan = agg.filter(Expr::Attribute(fn_attr).gt(lit(100i64)));
        let optimized = PushFiltersThroughAggregates.optimize(&plan).unwrap();
        assert_eq!(optimized, plan);
    }

    #[test]
    fn test_project_moves_below_limit() {
        let (r, attrs) = rel(&["a"]);
        let a = Expr::Attribute(attrs[0].clone());
        let plan = r
            .clone()
            .limit(lit(10i32))
            .project(vec![a.clone()])
            .unwrap();
        let optimized = PushProjectsThroughLimits.optimize(&plan).unwrap();
        assert_eq!(
            optimized,
            r.project(vec![a]).unwrap().limit(lit(10i32))
        );
    }

    #[test]
    fn test_limit_pushes_into_union_branches() {
        let (l, _) = rel(&["a"]);
        let (r, _) = rel(&["a"]);
        let plan = LogicalPlanBuilder::from_plan(l.clone())
            .union(r.clone())
            .limit(lit(3i32))
            .build();
        let optimized = PushLimitsThroughUnions.optimize(&plan).unwrap();

        let expected = LogicalPlanBuilder::from_plan(l.limit(lit(3i32)))
            .union(r.limit(lit(3i32)))
            .limit(lit(3i32))
            .build();
        assert_eq!(optimized, expected);
    }

    #[test]
    fn test_limit_push_reaches_fixed_point() {
        let (l, _) = rel(&["a"]);
        let (r, _) = rel(&["a"]);
        let plan = LogicalPlanBuilder::from_plan(l)
            .union(r)
            .limit(lit(3i32))
            .build();
        let once = PushLimitsThroughUnions.optimize(&plan).unwrap();
        let twice = PushLimitsThroughUnions.optimize(&once).unwrap();
        assert_eq!(once, twice);
    }
}
