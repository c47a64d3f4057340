//! Logical plan types
//!
//! A plan is an immutable tree of operators. Each operator computes an
//! ordered output of attributes and a strictly-typed form of itself.

use crate::error::{PlanError, Result};
use crate::planner::logical_expr::{Expr, ScalarValue, SortExpr};
use crate::planner::schema::{Attribute, ExprId};
use crate::tree::TreeNode;
use crate::types::DataType;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    Inner,
    LeftSemi,
    LeftOuter,
    RightOuter,
    FullOuter,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER"),
            JoinType::LeftSemi => write!(f, "LEFT SEMI"),
            JoinType::LeftOuter => write!(f, "LEFT OUTER"),
            JoinType::RightOuter => write!(f, "RIGHT OUTER"),
            JoinType::FullOuter => write!(f, "FULL OUTER"),
        }
    }
}

/// Logical plan node
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    /// In-memory relation; re-instantiable for self-joins
    LocalRelation(LocalRelationNode),
    /// Constant one-row, zero-column source
    SingleRowRelation,
    /// Zero rows with a known schema
    EmptyRelation(EmptyRelationNode),
    /// Projection (SELECT list)
    Project(ProjectNode),
    /// Filter (WHERE clause)
    Filter(FilterNode),
    /// Row-count bound
    Limit(LimitNode),
    /// Sort (ORDER BY)
    Sort(SortNode),
    /// Duplicate elimination
    Distinct(DistinctNode),
    /// Bag union of two aligned branches
    Union(SetOpNode),
    /// Bag intersection
    Intersect(SetOpNode),
    /// Bag difference
    Except(SetOpNode),
    /// Join
    Join(JoinNode),
    /// Aggregation in post-analysis form: keys are grouping aliases,
    /// functions are aggregation aliases
    Aggregate(AggregateNode),
    /// Scoping wrapper naming a derived relation; erased by the optimizer
    Subquery(SubqueryNode),
    /// CTE scoping wrapper; erased by the optimizer
    With(WithNode),
}

/// In-memory relation node
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRelationNode {
    pub rows: Vec<Vec<ScalarValue>>,
    pub output: Vec<Attribute>,
}

impl LocalRelationNode {
    /// Copy of this relation with freshened attribute ids, so the same
    /// data can appear on both sides of a self-join.
    pub fn new_instance(&self) -> Self {
        Self {
            rows: self.rows.clone(),
            output: self.output.iter().map(|a| a.new_instance()).collect(),
        }
    }
}

/// Empty relation node
#[derive(Debug, Clone, PartialEq)]
pub struct EmptyRelationNode {
    pub output: Vec<Attribute>,
}

/// Projection node
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectNode {
    pub input: Arc<LogicalPlan>,
    pub exprs: Vec<Expr>,
}

/// Filter node
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub input: Arc<LogicalPlan>,
    pub predicate: Expr,
}

/// Limit node; the bound is a foldable integral literal
#[derive(Debug, Clone, PartialEq)]
pub struct LimitNode {
    pub input: Arc<LogicalPlan>,
    pub limit: Expr,
}

/// Sort node
#[derive(Debug, Clone, PartialEq)]
pub struct SortNode {
    pub input: Arc<LogicalPlan>,
    pub order: Vec<SortExpr>,
}

/// Distinct node
#[derive(Debug, Clone, PartialEq)]
pub struct DistinctNode {
    pub input: Arc<LogicalPlan>,
}

/// Shared shape of the set operators
#[derive(Debug, Clone, PartialEq)]
pub struct SetOpNode {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
}

/// Join node
#[derive(Debug, Clone, PartialEq)]
pub struct JoinNode {
    pub left: Arc<LogicalPlan>,
    pub right: Arc<LogicalPlan>,
    pub join_type: JoinType,
    pub condition: Option<Expr>,
}

/// Aggregate node
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateNode {
    pub input: Arc<LogicalPlan>,
    pub keys: Vec<Expr>,
    pub functions: Vec<Expr>,
}

/// Subquery alias node
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryNode {
    pub input: Arc<LogicalPlan>,
    pub alias: String,
}

/// CTE wrapper node
#[derive(Debug, Clone, PartialEq)]
pub struct WithNode {
    pub input: Arc<LogicalPlan>,
    pub ctes: Vec<(String, Arc<LogicalPlan>)>,
}

impl LogicalPlan {
    /// The ordered output attributes of this operator
    pub fn output(&self) -> Result<Vec<Attribute>> {
        match self {
            LogicalPlan::LocalRelation(node) => Ok(node.output.clone()),
            LogicalPlan::SingleRowRelation => Ok(vec![]),
            LogicalPlan::EmptyRelation(node) => Ok(node.output.clone()),
            LogicalPlan::Project(node) => {
                node.exprs.iter().map(|e| e.to_attribute()).collect()
            }
            LogicalPlan::Filter(node) => node.input.output(),
            LogicalPlan::Limit(node) => node.input.output(),
            LogicalPlan::Sort(node) => node.input.output(),
            LogicalPlan::Distinct(node) => node.input.output(),
            LogicalPlan::Union(node) => {
                let left = node.left.output()?;
                let right = node.right.output()?;
                Ok(left
                    .into_iter()
                    .zip(right)
                    .map(|(l, r)| {
                        let nullable = l.nullable || r.nullable;
                        l.with_nullable(nullable)
                    })
                    .collect())
            }
            LogicalPlan::Intersect(node) => {
                let left = node.left.output()?;
                let right = node.right.output()?;
                Ok(left
                    .into_iter()
                    .zip(right)
                    .map(|(l, r)| {
                        let nullable = l.nullable && r.nullable;
                        l.with_nullable(nullable)
                    })
                    .collect())
            }
            LogicalPlan::Except(node) => node.left.output(),
            LogicalPlan::Join(node) => {
                let left = node.left.output()?;
                let right = node.right.output()?;
                let forced = |attrs: Vec<Attribute>| -> Vec<Attribute> {
                    attrs.into_iter().map(|a| a.with_nullable(true)).collect()
                };
                Ok(match node.join_type {
                    JoinType::Inner => [left, right].concat(),
                    JoinType::LeftSemi => left,
                    JoinType::LeftOuter => [left, forced(right)].concat(),
                    JoinType::RightOuter => [forced(left), right].concat(),
                    JoinType::FullOuter => [forced(left), forced(right)].concat(),
                })
            }
            LogicalPlan::Aggregate(node) => node
                .keys
                .iter()
                .chain(&node.functions)
                .map(|e| e.to_attribute())
                .collect(),
            LogicalPlan::Subquery(node) => {
                let inner = node.input.output()?;
                Ok(inner
                    .into_iter()
                    .map(|a| a.with_qualifier(node.alias.clone()))
                    .collect())
            }
            LogicalPlan::With(node) => node.input.output(),
        }
    }

    /// Ids of the attributes this operator outputs
    pub fn output_ids(&self) -> Result<HashSet<ExprId>> {
        Ok(self.output()?.into_iter().map(|a| a.id).collect())
    }

    /// Expressions held directly by this operator (children excluded)
    pub fn expressions(&self) -> Vec<&Expr> {
        match self {
            LogicalPlan::Project(node) => node.exprs.iter().collect(),
            LogicalPlan::Filter(node) => vec![&node.predicate],
            LogicalPlan::Limit(node) => vec![&node.limit],
            LogicalPlan::Sort(node) => node.order.iter().map(|s| &s.expr).collect(),
            LogicalPlan::Join(node) => node.condition.iter().collect(),
            LogicalPlan::Aggregate(node) => node.keys.iter().chain(&node.functions).collect(),
            _ => vec![],
        }
    }

    /// Rebuild this operator with `f` applied to each of its expressions;
    /// children are untouched.
    pub fn map_expressions<F>(&self, f: &F) -> LogicalPlan
    where
        F: Fn(&Expr) -> Expr,
    {
        match self {
            LogicalPlan::Project(node) => LogicalPlan::Project(ProjectNode {
                input: node.input.clone(),
                exprs: node.exprs.iter().map(f).collect(),
            }),
            LogicalPlan::Filter(node) => LogicalPlan::Filter(FilterNode {
                input: node.input.clone(),
                predicate: f(&node.predicate),
            }),
            LogicalPlan::Limit(node) => LogicalPlan::Limit(LimitNode {
                input: node.input.clone(),
                limit: f(&node.limit),
            }),
            LogicalPlan::Sort(node) => LogicalPlan::Sort(SortNode {
                input: node.input.clone(),
                order: node
                    .order
                    .iter()
                    .map(|s| SortExpr {
                        expr: f(&s.expr),
                        direction: s.direction,
                    })
                    .collect(),
            }),
            LogicalPlan::Join(node) => LogicalPlan::Join(JoinNode {
                left: node.left.clone(),
                right: node.right.clone(),
                join_type: node.join_type,
                condition: node.condition.as_ref().map(f),
            }),
            LogicalPlan::Aggregate(node) => LogicalPlan::Aggregate(AggregateNode {
                input: node.input.clone(),
                keys: node.keys.iter().map(f).collect(),
                functions: node.functions.iter().map(f).collect(),
            }),
            other => other.clone(),
        }
    }

    /// Whether every expression in this subtree is resolved
    pub fn resolved(&self) -> bool {
        self.forall(&|plan| plan.expressions().iter().all(|e| e.resolved()))
    }

    /// A version of this plan with every child and expression strictly
    /// typed and operator-level typing rules enforced.
    pub fn strictly_typed(&self) -> Result<LogicalPlan> {
        let plan = self.try_map_children(|c| c.strictly_typed())?;
        match plan {
            LogicalPlan::Project(node) => {
                if node.exprs.is_empty() {
                    return Err(PlanError::InvalidArgument(
                        "projection list must not be empty".into(),
                    ));
                }
                let exprs: Vec<Expr> = node
                    .exprs
                    .iter()
                    .map(|e| e.strictly_typed())
                    .collect::<Result<_>>()?;
                Ok(LogicalPlan::Project(ProjectNode {
                    input: node.input,
                    exprs,
                }))
            }
            LogicalPlan::Filter(node) => {
                let predicate = node.predicate.strictly_typed()?;
                if !predicate.data_type()?.widens_to(&DataType::Boolean) {
                    return Err(PlanError::TypeCheck(format!(
                        "filter condition must be BOOLEAN: {predicate}"
                    )));
                }
                Ok(LogicalPlan::Filter(FilterNode {
                    input: node.input,
                    predicate,
                }))
            }
            LogicalPlan::Limit(node) => {
                let limit = node.limit.strictly_typed()?;
                let acceptable = limit.foldable()
                    && limit
                        .data_type()
                        .map(|t| t.is_integral())
                        .unwrap_or(false);
                if !acceptable {
                    return Err(PlanError::TypeCheck(format!(
                        "limit must be a foldable integral expression: {limit}"
                    )));
                }
                Ok(LogicalPlan::Limit(LimitNode {
                    input: node.input,
                    limit,
                }))
            }
            LogicalPlan::Sort(node) => {
                let order: Vec<SortExpr> = node
                    .order
                    .iter()
                    .map(|s| {
                        Ok(SortExpr {
                            expr: s.expr.strictly_typed()?,
                            direction: s.direction,
                        })
                    })
                    .collect::<Result<_>>()?;
                Ok(LogicalPlan::Sort(SortNode {
                    input: node.input,
                    order,
                }))
            }
            LogicalPlan::Union(node) => {
                let (left, right) = align_set_op_branches(node.left, node.right)?;
                Ok(LogicalPlan::Union(SetOpNode { left, right }))
            }
            LogicalPlan::Intersect(node) => {
                let (left, right) = align_set_op_branches(node.left, node.right)?;
                Ok(LogicalPlan::Intersect(SetOpNode { left, right }))
            }
            LogicalPlan::Except(node) => {
                let (left, right) = align_set_op_branches(node.left, node.right)?;
                Ok(LogicalPlan::Except(SetOpNode { left, right }))
            }
            LogicalPlan::Join(node) => {
                let condition = node.condition.as_ref().map(|c| c.strictly_typed()).transpose()?;
                if let Some(c) = &condition {
                    if !c.data_type()?.widens_to(&DataType::Boolean) {
                        return Err(PlanError::TypeCheck(format!(
                            "join condition must be BOOLEAN: {c}"
                        )));
                    }
                }
                Ok(LogicalPlan::Join(JoinNode {
                    left: node.left,
                    right: node.right,
                    join_type: node.join_type,
                    condition,
                }))
            }
            LogicalPlan::Aggregate(node) => {
                let keys: Vec<Expr> = node
                    .keys
                    .iter()
                    .map(|e| e.strictly_typed())
                    .collect::<Result<_>>()?;
                let functions: Vec<Expr> = node
                    .functions
                    .iter()
                    .map(|e| e.strictly_typed())
                    .collect::<Result<_>>()?;
                Ok(LogicalPlan::Aggregate(AggregateNode {
                    input: node.input,
                    keys,
                    functions,
                }))
            }
            other => Ok(other),
        }
    }

    /// Fallible child rewrite preserving unchanged subtrees
    pub fn try_map_children<F>(&self, f: F) -> Result<LogicalPlan>
    where
        F: Fn(&LogicalPlan) -> Result<LogicalPlan>,
    {
        let old = self.children();
        if old.is_empty() {
            return Ok(self.clone());
        }
        let new: Vec<LogicalPlan> = old.iter().map(|c| f(c)).collect::<Result<_>>()?;
        if old.iter().zip(new.iter()).all(|(o, n)| *o == n) {
            Ok(self.clone())
        } else {
            Ok(self.with_new_children(new))
        }
    }

    /// Builder: wrap in a filter
    pub fn filter(self, predicate: Expr) -> LogicalPlan {
        LogicalPlan::Filter(FilterNode {
            input: Arc::new(self),
            predicate,
        })
    }

    /// Builder: wrap in a projection
    pub fn project(self, exprs: Vec<Expr>) -> Result<LogicalPlan> {
        if exprs.is_empty() {
            return Err(PlanError::InvalidArgument(
                "projection list must not be empty".into(),
            ));
        }
        Ok(LogicalPlan::Project(ProjectNode {
            input: Arc::new(self),
            exprs,
        }))
    }

    /// Builder: wrap in a limit
    pub fn limit(self, limit: Expr) -> LogicalPlan {
        LogicalPlan::Limit(LimitNode {
            input: Arc::new(self),
            limit,
        })
    }

    /// Builder: wrap in a sort
    pub fn sort(self, order: Vec<SortExpr>) -> LogicalPlan {
        LogicalPlan::Sort(SortNode {
            input: Arc::new(self),
            order,
        })
    }

    /// Builder: wrap in a distinct
    pub fn distinct(self) -> LogicalPlan {
        LogicalPlan::Distinct(DistinctNode {
            input: Arc::new(self),
        })
    }

    /// Builder: wrap in a subquery alias
    pub fn subquery(self, alias: impl Into<String>) -> LogicalPlan {
        LogicalPlan::Subquery(SubqueryNode {
            input: Arc::new(self),
            alias: alias.into(),
        })
    }
}

/// Enforce the set-operator contract on two strictly-typed branches:
/// same arity, same column names in order, column-wise widening casts
/// inserted via a projection on the branch that needs them.
fn align_set_op_branches(
    left: Arc<LogicalPlan>,
    right: Arc<LogicalPlan>,
) -> Result<(Arc<LogicalPlan>, Arc<LogicalPlan>)> {
    let lo = left.output()?;
    let ro = right.output()?;
    if lo.len() != ro.len() {
        return Err(PlanError::TypeCheck(format!(
            "set operator branches have {} and {} columns",
            lo.len(),
            ro.len()
        )));
    }
    let mut widened = Vec::with_capacity(lo.len());
    for (l, r) in lo.iter().zip(&ro) {
        if l.name != r.name {
            return Err(PlanError::TypeCheck(format!(
                "set operator column names differ: {} vs {}",
                l.name, r.name
            )));
        }
        let t = DataType::widest(&l.data_type, &r.data_type).ok_or_else(|| {
            PlanError::TypeCheck(format!(
                "no common type for set operator column {}: {} vs {}",
                l.name,
                l.data_type.sql_name(),
                r.data_type.sql_name()
            ))
        })?;
        widened.push(t);
    }
    Ok((
        cast_branch(left, &lo, &widened),
        cast_branch(right, &ro, &widened),
    ))
}

fn cast_branch(
    branch: Arc<LogicalPlan>,
    output: &[Attribute],
    widened: &[DataType],
) -> Arc<LogicalPlan> {
    if output.iter().zip(widened).all(|(a, t)| &a.data_type == t) {
        return branch;
    }
    let exprs: Vec<Expr> = output
        .iter()
        .zip(widened)
        .map(|(a, t)| {
            if &a.data_type == t {
                Expr::Attribute(a.clone())
            } else {
                Expr::Attribute(a.clone()).cast(t.clone()).alias(a.name.as_str())
            }
        })
        .collect();
    Arc::new(LogicalPlan::Project(ProjectNode {
        input: branch,
        exprs,
    }))
}

impl TreeNode for LogicalPlan {
    fn children(&self) -> Vec<&Self> {
        match self {
            LogicalPlan::LocalRelation(_)
            | LogicalPlan::SingleRowRelation
            | LogicalPlan::EmptyRelation(_) => vec![],
            LogicalPlan::Project(node) => vec![&node.input],
            LogicalPlan::Filter(node) => vec![&node.input],
            LogicalPlan::Limit(node) => vec![&node.input],
            LogicalPlan::Sort(node) => vec![&node.input],
            LogicalPlan::Distinct(node) => vec![&node.input],
            LogicalPlan::Union(node)
            | LogicalPlan::Intersect(node)
            | LogicalPlan::Except(node) => vec![&node.left, &node.right],
            LogicalPlan::Join(node) => vec![&node.left, &node.right],
            LogicalPlan::Aggregate(node) => vec![&node.input],
            LogicalPlan::Subquery(node) => vec![&node.input],
            LogicalPlan::With(node) => vec![&node.input],
        }
    }

    fn with_new_children(&self, children: Vec<Self>) -> Self {
        let mut iter = children.into_iter();
        let mut next = move || Arc::new(iter.next().expect("child count mismatch"));
        match self {
            LogicalPlan::LocalRelation(_)
            | LogicalPlan::SingleRowRelation
            | LogicalPlan::EmptyRelation(_) => self.clone(),
            LogicalPlan::Project(node) => LogicalPlan::Project(ProjectNode {
                input: next(),
                exprs: node.exprs.clone(),
            }),
            LogicalPlan::Filter(node) => LogicalPlan::Filter(FilterNode {
                input: next(),
                predicate: node.predicate.clone(),
            }),
            LogicalPlan::Limit(node) => LogicalPlan::Limit(LimitNode {
                input: next(),
                limit: node.limit.clone(),
            }),
            LogicalPlan::Sort(node) => LogicalPlan::Sort(SortNode {
                input: next(),
                order: node.order.clone(),
            }),
            LogicalPlan::Distinct(_) => LogicalPlan::Distinct(DistinctNode { input: next() }),
            LogicalPlan::Union(_) => LogicalPlan::Union(SetOpNode {
                left: next(),
                right: next(),
            }),
            LogicalPlan::Intersect(_) => LogicalPlan::Intersect(SetOpNode {
                left: next(),
                right: next(),
            }),
            LogicalPlan::Except(_) => LogicalPlan::Except(SetOpNode {
                left: next(),
                right: next(),
            }),
            LogicalPlan::Join(node) => LogicalPlan::Join(JoinNode {
                left: next(),
                right: next(),
                join_type: node.join_type,
                condition: node.condition.clone(),
            }),
            LogicalPlan::Aggregate(node) => LogicalPlan::Aggregate(AggregateNode {
                input: next(),
                keys: node.keys.clone(),
                functions: node.functions.clone(),
            }),
            LogicalPlan::Subquery(node) => LogicalPlan::Subquery(SubqueryNode {
                input: next(),
                alias: node.alias.clone(),
            }),
            LogicalPlan::With(node) => LogicalPlan::With(WithNode {
                input: next(),
                ctes: node.ctes.clone(),
            }),
        }
    }

    fn node_label(&self) -> String {
        let join = |exprs: &[Expr]| -> String {
            exprs
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            LogicalPlan::LocalRelation(node) => {
                let cols: Vec<String> = node.output.iter().map(|a| a.to_string()).collect();
                format!(
                    "LocalRelation [{}], {} rows",
                    cols.join(", "),
                    node.rows.len()
                )
            }
            LogicalPlan::SingleRowRelation => "SingleRowRelation".into(),
            LogicalPlan::EmptyRelation(node) => {
                let cols: Vec<String> = node.output.iter().map(|a| a.to_string()).collect();
                format!("EmptyRelation [{}]", cols.join(", "))
            }
            LogicalPlan::Project(node) => format!("Project [{}]", join(&node.exprs)),
            LogicalPlan::Filter(node) => format!("Filter {}", node.predicate),
            LogicalPlan::Limit(node) => format!("Limit {}", node.limit),
            LogicalPlan::Sort(node) => {
                let order: Vec<String> = node.order.iter().map(|s| s.to_string()).collect();
                format!("Sort [{}]", order.join(", "))
            }
            LogicalPlan::Distinct(_) => "Distinct".into(),
            LogicalPlan::Union(_) => "Union".into(),
            LogicalPlan::Intersect(_) => "Intersect".into(),
            LogicalPlan::Except(_) => "Except".into(),
            LogicalPlan::Join(node) => match &node.condition {
                Some(c) => format!("Join {} on {}", node.join_type, c),
                None => format!("Join {}", node.join_type),
            },
            LogicalPlan::Aggregate(node) => format!(
                "Aggregate keys=[{}] functions=[{}]",
                join(&node.keys),
                join(&node.functions)
            ),
            LogicalPlan::Subquery(node) => format!("Subquery {}", node.alias),
            LogicalPlan::With(node) => {
                let names: Vec<&str> = node.ctes.iter().map(|(n, _)| n.as_str()).collect();
                format!("With [{}]", names.join(", "))
            }
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty_tree())
    }
}

/// Builder for constructing logical plans bottom-up
pub struct LogicalPlanBuilder {
    plan: LogicalPlan,
}

impl LogicalPlanBuilder {
    /// Start from an in-memory relation with the given schema and no rows
    pub fn relation(output: Vec<Attribute>) -> Self {
        Self {
            plan: LogicalPlan::LocalRelation(LocalRelationNode {
                rows: vec![],
                output,
            }),
        }
    }

    /// Start from an in-memory relation with rows
    pub fn values(rows: Vec<Vec<ScalarValue>>, output: Vec<Attribute>) -> Self {
        Self {
            plan: LogicalPlan::LocalRelation(LocalRelationNode { rows, output }),
        }
    }

    /// Start from a relation known to produce no rows
    pub fn empty(output: Vec<Attribute>) -> Self {
        Self {
            plan: LogicalPlan::EmptyRelation(EmptyRelationNode { output }),
        }
    }

    /// Start from the constant one-row, zero-column source
    pub fn single_row() -> Self {
        Self {
            plan: LogicalPlan::SingleRowRelation,
        }
    }

    /// Start from an existing plan
    pub fn from_plan(plan: LogicalPlan) -> Self {
        Self { plan }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.plan = self.plan.filter(predicate);
        self
    }

    pub fn project(mut self, exprs: Vec<Expr>) -> Result<Self> {
        self.plan = self.plan.project(exprs)?;
        Ok(self)
    }

    pub fn limit(mut self, limit: Expr) -> Self {
        self.plan = self.plan.limit(limit);
        self
    }

    pub fn sort(mut self, order: Vec<SortExpr>) -> Self {
        self.plan = self.plan.sort(order);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.plan = self.plan.distinct();
        self
    }

    pub fn subquery(mut self, alias: impl Into<String>) -> Self {
        self.plan = self.plan.subquery(alias);
        self
    }

    /// Join against another plan, freshening the right side when the
    /// attribute-id sets collide (self-join over a multi-instance
    /// relation).
    pub fn join(
        mut self,
        right: LogicalPlan,
        join_type: JoinType,
        condition: Option<Expr>,
    ) -> Result<Self> {
        let left_ids = self.plan.output_ids()?;
        let right_ids = right.output_ids()?;
        let right = if left_ids.is_disjoint(&right_ids) {
            right
        } else {
            match right {
                LogicalPlan::LocalRelation(node) => {
                    LogicalPlan::LocalRelation(node.new_instance())
                }
                other => {
                    return Err(PlanError::InvalidArgument(format!(
                        "join children share attribute ids and the right side \
                         is not re-instantiable: {}",
                        other.node_label()
                    )))
                }
            }
        };
        self.plan = LogicalPlan::Join(JoinNode {
            left: Arc::new(self.plan),
            right: Arc::new(right),
            join_type,
            condition,
        });
        Ok(self)
    }

    pub fn union(mut self, right: LogicalPlan) -> Self {
        self.plan = LogicalPlan::Union(SetOpNode {
            left: Arc::new(self.plan),
            right: Arc::new(right),
        });
        self
    }

    pub fn intersect(mut self, right: LogicalPlan) -> Self {
        self.plan = LogicalPlan::Intersect(SetOpNode {
            left: Arc::new(self.plan),
            right: Arc::new(right),
        });
        self
    }

    pub fn except(mut self, right: LogicalPlan) -> Self {
        self.plan = LogicalPlan::Except(SetOpNode {
            left: Arc::new(self.plan),
            right: Arc::new(right),
        });
        self
    }

    /// Aggregate in post-analysis form: grouping keys and aggregate
    /// functions are wrapped in their placeholder aliases.
    pub fn aggregate(mut self, keys: Vec<Expr>, functions: Vec<Expr>) -> Self {
        let keys = keys
            .into_iter()
            .map(|e| {
                let name = e.output_name();
                e.grouping_alias(name)
            })
            .collect();
        let functions = functions
            .into_iter()
            .map(|e| {
                let name = e.output_name();
                e.aggregation_alias(name)
            })
            .collect();
        self.plan = LogicalPlan::Aggregate(AggregateNode {
            input: Arc::new(self.plan),
            keys,
            functions,
        });
        self
    }

    pub fn build(self) -> LogicalPlan {
        self.plan
    }
}
