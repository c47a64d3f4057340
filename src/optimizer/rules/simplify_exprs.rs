//! Alias and cast reduction rules

use crate::error::Result;
use crate::optimizer::OptimizerRule;
use crate::planner::{Expr, LogicalPlan};
use crate::tree::TreeNode;

/// Collapse alias chains: `Alias(Alias(x, _), n)` keeps only the outer
/// name and id
pub struct ReduceAliases;

impl OptimizerRule for ReduceAliases {
    fn name(&self) -> &str {
        "ReduceAliases"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| {
            let reduced = p.map_expressions(&|e| e.transform_up(&reduce_alias));
            (reduced != *p).then_some(reduced)
        }))
    }
}

fn reduce_alias(expr: &Expr) -> Option<Expr> {
    if let Expr::Alias { child, name, id } = expr {
        if let Expr::Alias { child: inner, .. } = child.as_ref() {
            return Some(Expr::Alias {
                child: inner.clone(),
                name: name.clone(),
                id: *id,
            });
        }
    }
    None
}

/// Drop identity casts and collapse widening double casts
///
/// `Cast(Cast(e, u), t)` loses the intermediate step only when `u` is at
/// least as wide as `t`, so no narrowing the user asked for disappears.
pub struct ReduceCasts;

impl OptimizerRule for ReduceCasts {
    fn name(&self) -> &str {
        "ReduceCasts"
    }

    fn optimize(&self, plan: &LogicalPlan) -> Result<LogicalPlan> {
        Ok(plan.transform_up(&|p| {
            let reduced = p.map_expressions(&|e| e.transform_up(&reduce_cast));
            (reduced != *p).then_some(reduced)
        }))
    }
}

fn reduce_cast(expr: &Expr) -> Option<Expr> {
    if let Expr::Cast { child, data_type } = expr {
        if child.data_type().ok().as_ref() == Some(data_type) {
            return Some(child.as_ref().clone());
        }
        if let Expr::Cast {
            child: inner,
            data_type: mid,
        } = child.as_ref()
        {
            if data_type.widens_to(mid) {
                return Some(Expr::Cast {
                    child: inner.clone(),
                    data_type: data_type.clone(),
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{lit, Attribute};
    use crate::types::DataType;

    fn attr(name: &str, data_type: DataType) -> Expr {
        Expr::Attribute(Attribute::new(name, data_type, false))
    }

    #[test]
    fn test_alias_chain_collapses() {
        let a = attr("a", DataType::Int);
        let chained = a.clone().alias("x").alias("y");
        let (outer_name, outer_id) = match &chained {
            Expr::Alias { name, id, .. } => (name.clone(), *id),
            _ => unreachable!(),
        };
        let reduced = reduce_alias(&chained).unwrap();
        assert_eq!(
            reduced,
            Expr::Alias {
                child: Box::new(a),
                name: outer_name,
                id: outer_id,
            }
        );
    }

    #[test]
    fn test_identity_cast_disappears() {
        let a = attr("a", DataType::Long);
        assert_eq!(reduce_cast(&a.clone().cast(DataType::Long)), Some(a));
    }

    #[test]
    fn test_widening_double_cast_collapses() {
        let a = attr("a", DataType::Int);
        // Int -> Double -> Long: the detour through Double keeps every
        // Long the Int could produce
        let e = a.clone().cast(DataType::Double).cast(DataType::Long);
        assert_eq!(reduce_cast(&e), Some(a.cast(DataType::Long)));
    }

    #[test]
    fn test_narrowing_double_cast_is_kept() {
        // Long -> Byte -> Long: dropping the Byte cast would undo the
        // user's truncation
        let a = attr("a", DataType::Long);
        let e = a.cast(DataType::Byte).cast(DataType::Long);
        assert_eq!(reduce_cast(&e), None);
    }

    #[test]
    fn test_literal_cast_then_fold() {
        let e = lit(1i32).cast(DataType::Int);
        assert_eq!(reduce_cast(&e), Some(lit(1i32)));
    }
}
