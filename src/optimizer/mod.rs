//! Rule-based plan optimizer
//!
//! Rules are pure plan-to-plan functions grouped into batches; a batch
//! runs either once or to a fixed point. The optimizer itself is a
//! single fixed-point batch whose rule order is load-bearing: earlier
//! rules expose opportunities for later ones.

mod rules;

pub use rules::*;

use crate::error::{PlanError, Result};
use crate::planner::LogicalPlan;
use crate::tree::TreeNode;
use std::sync::Arc;
use tracing::{debug, warn};

/// A single rewrite rule over logical plans
///
/// Rule application never fails on a non-matching plan: the rule simply
/// returns its input unchanged.
pub trait OptimizerRule: Send + Sync {
    /// Name of this rule
    fn name(&self) -> &str;

    /// Apply this rule to the plan
    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan>;
}

/// How a batch decides it is done
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// A single pass over the rules
    Once,
    /// Re-run passes until the plan stops changing, giving up after the
    /// given number of iterations
    FixedPoint { max_iterations: usize },
}

/// A named, ordered group of rules sharing an end condition
pub struct RuleBatch {
    pub name: String,
    pub strategy: ExecutionStrategy,
    pub rules: Vec<Arc<dyn OptimizerRule>>,
}

impl RuleBatch {
    pub fn new(
        name: impl Into<String>,
        strategy: ExecutionStrategy,
        rules: Vec<Arc<dyn OptimizerRule>>,
    ) -> Self {
        Self {
            name: name.into(),
            strategy,
            rules,
        }
    }
}

/// Runs rule batches in declaration order
pub struct RuleExecutor {
    batches: Vec<RuleBatch>,
}

impl RuleExecutor {
    pub fn new(batches: Vec<RuleBatch>) -> Self {
        Self { batches }
    }

    pub fn execute(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        let mut current = plan;
        for batch in &self.batches {
            current = Self::run_batch(batch, current)?;
        }
        Ok(current)
    }

    fn run_batch(batch: &RuleBatch, plan: LogicalPlan) -> Result<LogicalPlan> {
        let max_iterations = match batch.strategy {
            ExecutionStrategy::Once => 1,
            ExecutionStrategy::FixedPoint { max_iterations } => max_iterations,
        };

        let mut current = plan;
        for iteration in 1..=max_iterations {
            let before = current.clone();
            for rule in &batch.rules {
                let after = rule.optimize(&current)?;
                if !after.same_as(&current) {
                    debug!(
                        batch = %batch.name,
                        rule = rule.name(),
                        iteration,
                        "rule changed the plan"
                    );
                    current = after;
                }
            }
            if current.same_as(&before) {
                return Ok(current);
            }
        }

        if let ExecutionStrategy::FixedPoint { max_iterations } = batch.strategy {
            warn!(
                batch = %batch.name,
                max_iterations,
                "batch did not converge within its iteration budget"
            );
        }
        Ok(current)
    }
}

/// The standard optimizer: one fixed-point batch over the full ruleset
pub struct Optimizer {
    executor: RuleExecutor,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        let rules: Vec<Arc<dyn OptimizerRule>> = vec![
            Arc::new(FoldConstants),
            Arc::new(FoldConstantFilters),
            Arc::new(FoldLogicalPredicates),
            Arc::new(CnfConversion),
            Arc::new(EliminateCommonPredicates),
            Arc::new(ReduceAliases),
            Arc::new(ReduceCasts),
            Arc::new(MergeFilters),
            Arc::new(ReduceLimits),
            Arc::new(ReduceNegations),
            Arc::new(MergeProjects),
            Arc::new(EliminateSubqueries),
            Arc::new(PushFiltersThroughProjects),
            Arc::new(PushFiltersThroughJoins),
            Arc::new(PushFiltersThroughAggregates),
            Arc::new(PushProjectsThroughLimits),
            Arc::new(PushLimitsThroughUnions),
        ];
        Self {
            executor: RuleExecutor::new(vec![RuleBatch::new(
                "optimizations",
                ExecutionStrategy::FixedPoint {
                    max_iterations: 100,
                },
                rules,
            )]),
        }
    }

    /// Rewrite a resolved plan into an equivalent, cheaper one
    pub fn optimize(&self, plan: LogicalPlan) -> Result<LogicalPlan> {
        if !plan.resolved() {
            return Err(PlanError::Unresolved(plan.pretty_tree()));
        }
        self.executor.execute(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{lit, Attribute, Expr, LogicalPlanBuilder};
    use crate::types::DataType;

    struct Renamer;

    impl OptimizerRule for Renamer {
        fn name(&self) -> &str {
            "Renamer"
        }

        fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
            // Idempotent rewrite used to observe batch behavior
            Ok(plan.transform_up(&|p| match p {
                LogicalPlan::Subquery(node) if node.alias != "renamed" => {
                    Some(node.input.as_ref().clone().subquery("renamed"))
                }
                _ => None,
            }))
        }
    }

    fn sample_plan() -> LogicalPlan {
        LogicalPlanBuilder::relation(vec![Attribute::new("a", DataType::Int, false)])
            .subquery("t")
            .build()
    }

    #[test]
    fn test_fixed_point_batch_converges() {
        let executor = RuleExecutor::new(vec![RuleBatch::new(
            "test",
            ExecutionStrategy::FixedPoint { max_iterations: 10 },
            vec![Arc::new(Renamer)],
        )]);
        let optimized = executor.execute(sample_plan()).unwrap();
        match optimized {
            LogicalPlan::Subquery(node) => assert_eq!(node.alias, "renamed"),
            other => panic!("expected Subquery, got {}", other.node_label()),
        }
    }

    #[test]
    fn test_once_batch_runs_single_pass() {
        let executor = RuleExecutor::new(vec![RuleBatch::new(
            "test",
            ExecutionStrategy::Once,
            vec![Arc::new(Renamer)],
        )]);
        let optimized = executor.execute(sample_plan()).unwrap();
        assert!(matches!(optimized, LogicalPlan::Subquery(_)));
    }

    #[test]
    fn test_optimizer_rejects_unresolved_plans() {
        let plan = sample_plan().filter(Expr::unresolved("ghost").gt(lit(1i32)));
        let err = Optimizer::new().optimize(plan).unwrap_err();
        assert!(matches!(err, PlanError::Unresolved(_)));
    }

    #[test]
    fn test_optimizer_passes_resolved_plans() {
        let plan = sample_plan();
        let optimized = Optimizer::new().optimize(plan).unwrap();
        // The subquery wrapper is gone and the relation remains
        assert!(matches!(optimized, LogicalPlan::LocalRelation(_)));
    }
}
