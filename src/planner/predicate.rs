//! Predicate algebra utilities
//!
//! Conjunction/disjunction handling, conjunctive normal form, and
//! id-based alias substitution. These are the shared building blocks of
//! the filter rewrite rules.

use crate::planner::logical_expr::{BinaryOp, Expr, ScalarValue, UnaryOp};
use crate::planner::schema::ExprId;
use crate::tree::TreeNode;
use std::collections::HashMap;

/// Match an AND, returning its operands
pub fn as_and(expr: &Expr) -> Option<(&Expr, &Expr)> {
    match expr {
        Expr::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => Some((left, right)),
        _ => None,
    }
}

/// Match an OR, returning its operands
pub fn as_or(expr: &Expr) -> Option<(&Expr, &Expr)> {
    match expr {
        Expr::Binary {
            left,
            op: BinaryOp::Or,
            right,
        } => Some((left, right)),
        _ => None,
    }
}

/// Match a NOT, returning its operand
pub fn as_not(expr: &Expr) -> Option<&Expr> {
    match expr {
        Expr::Unary {
            op: UnaryOp::Not,
            child,
        } => Some(child),
        _ => None,
    }
}

/// Match a non-null boolean literal
pub fn as_boolean_literal(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Literal {
            value: ScalarValue::Boolean(b),
            ..
        } => Some(*b),
        _ => None,
    }
}

/// Flatten nested ANDs into the list of conjuncts
pub fn split_conjunction(expr: &Expr) -> Vec<Expr> {
    match as_and(expr) {
        Some((left, right)) => {
            let mut out = split_conjunction(left);
            out.extend(split_conjunction(right));
            out
        }
        None => vec![expr.clone()],
    }
}

/// Flatten nested ORs into the list of disjuncts
pub fn split_disjunction(expr: &Expr) -> Vec<Expr> {
    match as_or(expr) {
        Some((left, right)) => {
            let mut out = split_disjunction(left);
            out.extend(split_disjunction(right));
            out
        }
        None => vec![expr.clone()],
    }
}

/// Left-deep AND of the given predicates; `None` for an empty list
pub fn conjunction(predicates: Vec<Expr>) -> Option<Expr> {
    predicates.into_iter().reduce(|a, b| a.and(b))
}

/// Left-deep OR of the given predicates; `None` for an empty list
pub fn disjunction(predicates: Vec<Expr>) -> Option<Expr> {
    predicates.into_iter().reduce(|a, b| a.or(b))
}

/// Rewrite a predicate into conjunctive normal form.
///
/// Negations are pushed down to the atoms with De Morgan's laws, then OR
/// is distributed over AND. Each step strictly reduces either negation
/// depth or the nesting of conjunctions under disjunctions, so the
/// rewrite terminates.
pub fn to_cnf(expr: &Expr) -> Expr {
    distribute(&push_negations(expr))
}

fn push_negations(expr: &Expr) -> Expr {
    if let Some(inner) = as_not(expr) {
        if let Some(x) = as_not(inner) {
            return push_negations(x);
        }
        if let Some((a, b)) = as_and(inner) {
            return push_negations(&a.clone().not()).or(push_negations(&b.clone().not()));
        }
        if let Some((a, b)) = as_or(inner) {
            return push_negations(&a.clone().not()).and(push_negations(&b.clone().not()));
        }
        return expr.clone();
    }
    if let Some((a, b)) = as_and(expr) {
        return push_negations(a).and(push_negations(b));
    }
    if let Some((a, b)) = as_or(expr) {
        return push_negations(a).or(push_negations(b));
    }
    expr.clone()
}

fn distribute(expr: &Expr) -> Expr {
    if let Some((a, b)) = as_and(expr) {
        return distribute(a).and(distribute(b));
    }
    if let Some((a, b)) = as_or(expr) {
        return distribute_or(distribute(a), distribute(b));
    }
    expr.clone()
}

fn distribute_or(left: Expr, right: Expr) -> Expr {
    if let Some((a, b)) = as_and(&left) {
        let (a, b) = (a.clone(), b.clone());
        return distribute_or(a, right.clone()).and(distribute_or(b, right));
    }
    if let Some((a, b)) = as_and(&right) {
        let (a, b) = (a.clone(), b.clone());
        return distribute_or(left.clone(), a).and(distribute_or(left, b));
    }
    left.or(right)
}

/// Whether a predicate is in conjunctive normal form: no OR appears
/// above an AND.
pub fn is_cnf(expr: &Expr) -> bool {
    !expr.exists(&|e| as_or(e).is_some() && e.exists(&|inner| as_and(inner).is_some()))
}

/// Substitute attribute references by id
pub fn substitute(expr: &Expr, table: &HashMap<ExprId, Expr>) -> Expr {
    expr.transform_down(&|e| match e {
        Expr::Attribute(a) => table.get(&a.id).cloned(),
        _ => None,
    })
}

/// Substitution table from a projection list: each alias id maps to the
/// aliased expression, so references to the projection's output can be
/// rewritten in terms of its input.
pub fn alias_table(exprs: &[Expr]) -> HashMap<ExprId, Expr> {
    exprs
        .iter()
        .filter_map(|e| match e {
            Expr::Alias { child, id, .. }
            | Expr::GroupingAlias { child, id, .. }
            | Expr::AggregationAlias { child, id, .. } => Some((*id, (**child).clone())),
            _ => None,
        })
        .collect()
}

/// Inline alias definitions from a projection list into a predicate
pub fn inline_aliases(expr: &Expr, exprs: &[Expr]) -> Expr {
    substitute(expr, &alias_table(exprs))
}
