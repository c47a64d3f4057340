//! Logical expression types
//!
//! Expressions are immutable trees. Every node knows its data type,
//! nullability, foldability, and reference set, and can produce a
//! strictly-typed version of itself with implicit widening casts
//! inserted.

use crate::error::{PlanError, Result};
use crate::planner::schema::{Attribute, ExprId};
use crate::tree::TreeNode;
use crate::types::DataType;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

/// Scalar value for literals
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),
    String(String),
}

impl ScalarValue {
    /// The data type of this value; `None` for `Null`, which takes its
    /// type from the enclosing literal.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Boolean(_) => Some(DataType::Boolean),
            ScalarValue::Byte(_) => Some(DataType::Byte),
            ScalarValue::Short(_) => Some(DataType::Short),
            ScalarValue::Int(_) => Some(DataType::Int),
            ScalarValue::Long(_) => Some(DataType::Long),
            ScalarValue::Float(_) => Some(DataType::Float),
            ScalarValue::Double(_) => Some(DataType::Double),
            ScalarValue::String(_) => Some(DataType::String),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Byte(v) => Some(*v as i64),
            ScalarValue::Short(v) => Some(*v as i64),
            ScalarValue::Int(v) => Some(*v as i64),
            ScalarValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(v) => Some(v.0 as f64),
            ScalarValue::Double(v) => Some(v.0),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    fn from_i64(v: i64, data_type: &DataType) -> Option<ScalarValue> {
        match data_type {
            DataType::Byte => Some(ScalarValue::Byte(v as i8)),
            DataType::Short => Some(ScalarValue::Short(v as i16)),
            DataType::Int => Some(ScalarValue::Int(v as i32)),
            DataType::Long => Some(ScalarValue::Long(v)),
            DataType::Float => Some(ScalarValue::Float(OrderedFloat(v as f32))),
            DataType::Double => Some(ScalarValue::Double(OrderedFloat(v as f64))),
            _ => None,
        }
    }

    /// Like [`from_i64`](Self::from_i64) but refuses values the target
    /// integral type cannot hold; evaluation must not silently wrap.
    fn from_i64_checked(v: i64, data_type: &DataType) -> Option<ScalarValue> {
        match data_type {
            DataType::Byte => i8::try_from(v).ok().map(ScalarValue::Byte),
            DataType::Short => i16::try_from(v).ok().map(ScalarValue::Short),
            DataType::Int => i32::try_from(v).ok().map(ScalarValue::Int),
            DataType::Long => Some(ScalarValue::Long(v)),
            _ => Self::from_i64(v, data_type),
        }
    }

    fn from_f64(v: f64, data_type: &DataType) -> Option<ScalarValue> {
        match data_type {
            DataType::Byte => Some(ScalarValue::Byte(v as i8)),
            DataType::Short => Some(ScalarValue::Short(v as i16)),
            DataType::Int => Some(ScalarValue::Int(v as i32)),
            DataType::Long => Some(ScalarValue::Long(v as i64)),
            DataType::Float => Some(ScalarValue::Float(OrderedFloat(v as f32))),
            DataType::Double => Some(ScalarValue::Double(OrderedFloat(v))),
            _ => None,
        }
    }

    /// Convert this value to the target type. Narrowing between numerics
    /// is permitted (explicit casts may narrow); `None` means the
    /// conversion is unsupported or unparsable.
    pub fn cast_to(&self, data_type: &DataType) -> Option<ScalarValue> {
        if self.data_type().as_ref() == Some(data_type) {
            return Some(self.clone());
        }
        match self {
            ScalarValue::Null => Some(ScalarValue::Null),
            ScalarValue::Boolean(v) => match data_type {
                DataType::String => Some(ScalarValue::String(v.to_string())),
                _ => None,
            },
            ScalarValue::String(s) => match data_type {
                DataType::Boolean => s.trim().parse().ok().map(ScalarValue::Boolean),
                t if t.is_integral() => s
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|v| Self::from_i64(v, t)),
                t if t.is_fractional() => s
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(|v| Self::from_f64(v, t)),
                _ => None,
            },
            v if v.data_type().map(|t| t.is_integral()).unwrap_or(false) => match data_type {
                DataType::String => Some(ScalarValue::String(v.to_string())),
                t if t.is_numeric() => Self::from_i64(v.as_i64()?, t),
                _ => None,
            },
            v if v.data_type().map(|t| t.is_fractional()).unwrap_or(false) => match data_type {
                DataType::String => Some(ScalarValue::String(v.to_string())),
                t if t.is_numeric() => Self::from_f64(v.as_f64()?, t),
                _ => None,
            },
            _ => None,
        }
    }

    /// Ordering between two non-null values of a common type class
    pub(crate) fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (ScalarValue::Boolean(l), ScalarValue::Boolean(r)) => Some(l.cmp(r)),
            (ScalarValue::String(l), ScalarValue::String(r)) => Some(l.cmp(r)),
            (l, r) => match (l.as_i64(), r.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
            },
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Byte(v) => write!(f, "{}", v),
            ScalarValue::Short(v) => write!(f, "{}", v),
            ScalarValue::Int(v) => write!(f, "{}", v),
            ScalarValue::Long(v) => write!(f, "{}", v),
            ScalarValue::Float(v) => write!(f, "{}", v),
            ScalarValue::Double(v) => write!(f, "{}", v),
            ScalarValue::String(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

impl From<i8> for ScalarValue {
    fn from(v: i8) -> Self {
        ScalarValue::Byte(v)
    }
}

impl From<i16> for ScalarValue {
    fn from(v: i16) -> Self {
        ScalarValue::Short(v)
    }
}

impl From<i32> for ScalarValue {
    fn from(v: i32) -> Self {
        ScalarValue::Int(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Long(v)
    }
}

impl From<f32> for ScalarValue {
    fn from(v: f32) -> Self {
        ScalarValue::Float(OrderedFloat(v))
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::Double(OrderedFloat(v))
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::String(v.to_string())
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
}

impl BinaryOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// The comparison holding exactly when this one does not
    pub fn negated(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::NotEq),
            BinaryOp::NotEq => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::GtEq),
            BinaryOp::LtEq => Some(BinaryOp::Gt),
            BinaryOp::Gt => Some(BinaryOp::LtEq),
            BinaryOp::GtEq => Some(BinaryOp::Lt),
            _ => None,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Subtract => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "<>"),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    IsNull,
    IsNotNull,
}

/// Aggregate function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregateFunction::Count => write!(f, "COUNT"),
            AggregateFunction::Sum => write!(f, "SUM"),
            AggregateFunction::Avg => write!(f, "AVG"),
            AggregateFunction::Min => write!(f, "MIN"),
            AggregateFunction::Max => write!(f, "MAX"),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Sort expression
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: Expr,
    pub direction: SortDirection,
}

impl SortExpr {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            direction: SortDirection::Asc,
        }
    }

    pub fn asc(mut self) -> Self {
        self.direction = SortDirection::Asc;
        self
    }

    pub fn desc(mut self) -> Self {
        self.direction = SortDirection::Desc;
        self
    }
}

impl fmt::Display for SortExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => write!(f, "{} ASC", self.expr),
            SortDirection::Desc => write!(f, "{} DESC", self.expr),
        }
    }
}

/// Logical expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value; the data type also covers typed NULLs
    Literal {
        value: ScalarValue,
        data_type: DataType,
    },

    /// Analyzer placeholder for a column that has not been bound yet
    UnresolvedAttribute {
        name: String,
        qualifier: Option<String>,
    },

    /// Resolved column reference
    Attribute(Attribute),

    /// Renaming; the id gives the alias referential identity
    Alias {
        child: Box<Expr>,
        name: String,
        id: ExprId,
    },

    /// Analyzer-emitted placeholder wrapping a grouping key
    GroupingAlias {
        child: Box<Expr>,
        name: String,
        id: ExprId,
    },

    /// Analyzer-emitted placeholder wrapping an aggregate function
    AggregationAlias {
        child: Box<Expr>,
        name: String,
        id: ExprId,
    },

    /// Explicit type conversion; narrowing permitted
    Cast {
        child: Box<Expr>,
        data_type: DataType,
    },

    /// Binary operation
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },

    /// Unary operation
    Unary { op: UnaryOp, child: Box<Expr> },

    /// Conditional; a NULL condition yields NULL
    If {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// First non-null argument, or NULL
    Coalesce(Vec<Expr>),

    /// Aggregate function call
    AggregateFunction {
        func: AggregateFunction,
        args: Vec<Expr>,
        distinct: bool,
    },
}

/// Shorthand literal constructor
pub fn lit(value: impl Into<ScalarValue>) -> Expr {
    Expr::literal(value.into())
}

impl Expr {
    /// Literal from a non-null value
    pub fn literal(value: ScalarValue) -> Expr {
        let data_type = value.data_type().unwrap_or(DataType::String);
        Expr::Literal { value, data_type }
    }

    /// Typed NULL literal
    pub fn null(data_type: DataType) -> Expr {
        Expr::Literal {
            value: ScalarValue::Null,
            data_type,
        }
    }

    pub fn unresolved(name: impl Into<String>) -> Expr {
        Expr::UnresolvedAttribute {
            name: name.into(),
            qualifier: None,
        }
    }

    fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn add(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Add, other)
    }

    pub fn subtract(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Subtract, other)
    }

    pub fn multiply(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Multiply, other)
    }

    pub fn divide(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Divide, other)
    }

    #[allow(clippy::should_implement_trait)] // builds an expression, not a value
    pub fn not(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Not,
            child: Box::new(self),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::Negate,
            child: Box::new(self),
        }
    }

    pub fn is_null(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::IsNull,
            child: Box::new(self),
        }
    }

    pub fn is_not_null(self) -> Expr {
        Expr::Unary {
            op: UnaryOp::IsNotNull,
            child: Box::new(self),
        }
    }

    pub fn cast(self, data_type: DataType) -> Expr {
        Expr::Cast {
            child: Box::new(self),
            data_type,
        }
    }

    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            child: Box::new(self),
            name: name.into(),
            id: ExprId::next(),
        }
    }

    pub fn grouping_alias(self, name: impl Into<String>) -> Expr {
        Expr::GroupingAlias {
            child: Box::new(self),
            name: name.into(),
            id: ExprId::next(),
        }
    }

    pub fn aggregation_alias(self, name: impl Into<String>) -> Expr {
        Expr::AggregationAlias {
            child: Box::new(self),
            name: name.into(),
            id: ExprId::next(),
        }
    }

    pub fn if_else(condition: Expr, then_expr: Expr, else_expr: Expr) -> Expr {
        Expr::If {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        }
    }

    /// The output name this expression contributes to a projection
    pub fn output_name(&self) -> String {
        match self {
            Expr::Attribute(a) => a.name.clone(),
            Expr::UnresolvedAttribute { name, .. } => name.clone(),
            Expr::Alias { name, .. }
            | Expr::GroupingAlias { name, .. }
            | Expr::AggregationAlias { name, .. } => name.clone(),
            other => other.to_string(),
        }
    }

    /// Infer the data type of this expression
    pub fn data_type(&self) -> Result<DataType> {
        match self {
            Expr::Literal { data_type, .. } => Ok(data_type.clone()),
            Expr::UnresolvedAttribute { name, .. } => {
                Err(PlanError::Unresolved(format!("attribute {name}")))
            }
            Expr::Attribute(a) => Ok(a.data_type.clone()),
            Expr::Alias { child, .. }
            | Expr::GroupingAlias { child, .. }
            | Expr::AggregationAlias { child, .. } => child.data_type(),
            Expr::Cast { data_type, .. } => Ok(data_type.clone()),
            Expr::Binary { left, op, right } => {
                if op.is_arithmetic() {
                    let lt = left.data_type()?;
                    let rt = right.data_type()?;
                    DataType::widest(&lt, &rt)
                        .filter(|t| t.is_numeric())
                        .ok_or_else(|| PlanError::mismatch(self, "a common numeric type"))
                } else {
                    Ok(DataType::Boolean)
                }
            }
            Expr::Unary { op, child } => match op {
                UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => Ok(DataType::Boolean),
                UnaryOp::Negate => child.data_type(),
            },
            Expr::If {
                then_expr,
                else_expr,
                ..
            } => {
                let tt = then_expr.data_type()?;
                let et = else_expr.data_type()?;
                DataType::widest(&tt, &et)
                    .ok_or_else(|| PlanError::mismatch(self, "a common branch type"))
            }
            Expr::Coalesce(args) => {
                let mut iter = args.iter();
                let first = iter.next().ok_or_else(|| {
                    PlanError::InvalidArgument("COALESCE requires at least one argument".into())
                })?;
                let mut acc = first.data_type()?;
                for arg in iter {
                    let t = arg.data_type()?;
                    acc = DataType::widest(&acc, &t)
                        .ok_or_else(|| PlanError::mismatch(self, "a common argument type"))?;
                }
                Ok(acc)
            }
            Expr::AggregateFunction { func, args, .. } => {
                let arg_type = args.first().map(|a| a.data_type()).transpose()?;
                match func {
                    AggregateFunction::Count => Ok(DataType::Long),
                    AggregateFunction::Avg => Ok(DataType::Double),
                    AggregateFunction::Sum => match arg_type {
                        Some(t) if t.is_integral() => Ok(DataType::Long),
                        Some(t) if t.is_fractional() => Ok(DataType::Double),
                        _ => Err(PlanError::mismatch(self, "a numeric argument")),
                    },
                    AggregateFunction::Min | AggregateFunction::Max => arg_type
                        .ok_or_else(|| PlanError::mismatch(self, "exactly one argument")),
                }
            }
        }
    }

    /// Whether this expression may evaluate to NULL
    pub fn nullable(&self) -> bool {
        match self {
            Expr::Literal { value, .. } => value.is_null(),
            Expr::UnresolvedAttribute { .. } => true,
            Expr::Attribute(a) => a.nullable,
            Expr::Alias { child, .. }
            | Expr::GroupingAlias { child, .. }
            | Expr::AggregationAlias { child, .. }
            | Expr::Cast { child, .. } => child.nullable(),
            Expr::Binary { left, op, right } => {
                // Division by zero yields NULL regardless of the operands
                *op == BinaryOp::Divide || left.nullable() || right.nullable()
            }
            Expr::Unary { op, child } => match op {
                UnaryOp::IsNull | UnaryOp::IsNotNull => false,
                UnaryOp::Not | UnaryOp::Negate => child.nullable(),
            },
            Expr::If {
                condition,
                then_expr,
                else_expr,
            } => condition.nullable() || then_expr.nullable() || else_expr.nullable(),
            Expr::Coalesce(args) => args.iter().all(|a| a.nullable()),
            Expr::AggregateFunction { func, .. } => !matches!(func, AggregateFunction::Count),
        }
    }

    /// Whether this expression can be evaluated at plan time
    pub fn foldable(&self) -> bool {
        match self {
            Expr::Literal { .. } => true,
            Expr::UnresolvedAttribute { .. }
            | Expr::Attribute(_)
            | Expr::AggregateFunction { .. } => false,
            other => other.children().iter().all(|c| c.foldable()),
        }
    }

    /// Deterministic and side-effect-free. Every operator in this algebra
    /// qualifies; the method is the seam rules test before reordering
    /// expressions across plan boundaries.
    pub fn is_pure(&self) -> bool {
        true
    }

    /// Whether every attribute reference in this subtree is bound
    pub fn resolved(&self) -> bool {
        !self.exists(&|e| matches!(e, Expr::UnresolvedAttribute { .. }))
    }

    /// Ids of the attributes this expression reads
    pub fn references(&self) -> HashSet<ExprId> {
        self.collect(&|e| match e {
            Expr::Attribute(a) => Some(a.id),
            _ => None,
        })
        .into_iter()
        .collect()
    }

    /// The attribute a named expression exposes to the enclosing plan
    pub fn to_attribute(&self) -> Result<Attribute> {
        match self {
            Expr::Attribute(a) => Ok(a.clone()),
            Expr::Alias { child, name, id }
            | Expr::GroupingAlias { child, name, id }
            | Expr::AggregationAlias { child, name, id } => Ok(Attribute {
                name: name.clone(),
                data_type: child.data_type()?,
                nullable: child.nullable(),
                id: *id,
                qualifier: None,
            }),
            other => Err(PlanError::InvalidArgument(format!(
                "expression has no output attribute: {other}"
            ))),
        }
    }

    /// `self` if it already has the target type, otherwise a cast
    pub fn promote_to(self, data_type: &DataType) -> Expr {
        match self.data_type() {
            Ok(t) if &t == data_type => self,
            _ => self.cast(data_type.clone()),
        }
    }

    /// A version of this expression with children strictly typed and any
    /// required implicit widening casts inserted, or a `TypeMismatch`
    /// naming the offending operand.
    pub fn strictly_typed(&self) -> Result<Expr> {
        match self {
            Expr::Literal { .. } | Expr::Attribute(_) => Ok(self.clone()),
            Expr::UnresolvedAttribute { name, .. } => {
                Err(PlanError::Unresolved(format!("attribute {name}")))
            }
            Expr::Alias { child, name, id } => Ok(Expr::Alias {
                child: Box::new(child.strictly_typed()?),
                name: name.clone(),
                id: *id,
            }),
            Expr::GroupingAlias { child, name, id } => Ok(Expr::GroupingAlias {
                child: Box::new(child.strictly_typed()?),
                name: name.clone(),
                id: *id,
            }),
            Expr::AggregationAlias { child, name, id } => Ok(Expr::AggregationAlias {
                child: Box::new(child.strictly_typed()?),
                name: name.clone(),
                id: *id,
            }),
            Expr::Cast { child, data_type } => Ok(Expr::Cast {
                child: Box::new(child.strictly_typed()?),
                data_type: data_type.clone(),
            }),
            Expr::Binary { left, op, right } => {
                let left = left.strictly_typed()?;
                let right = right.strictly_typed()?;
                if op.is_logical() {
                    for side in [&left, &right] {
                        if !side.data_type()?.widens_to(&DataType::Boolean) {
                            return Err(PlanError::mismatch(side, "BOOLEAN"));
                        }
                    }
                    Ok(left.binary(*op, right))
                } else {
                    let lt = left.data_type()?;
                    let rt = right.data_type()?;
                    let widest = DataType::widest(&lt, &rt)
                        .ok_or_else(|| PlanError::mismatch(self, "a common operand type"))?;
                    if op.is_arithmetic() && !widest.is_numeric() {
                        return Err(PlanError::mismatch(self, "a common numeric type"));
                    }
                    if op.is_comparison() && *op != BinaryOp::Eq && *op != BinaryOp::NotEq
                        && !widest.is_ordered()
                    {
                        return Err(PlanError::mismatch(self, "a common ordered type"));
                    }
                    Ok(left.promote_to(&widest).binary(*op, right.promote_to(&widest)))
                }
            }
            Expr::Unary { op, child } => {
                let child = child.strictly_typed()?;
                match op {
                    UnaryOp::Not => {
                        if !child.data_type()?.widens_to(&DataType::Boolean) {
                            return Err(PlanError::mismatch(&child, "BOOLEAN"));
                        }
                    }
                    UnaryOp::Negate => {
                        if !child.data_type()?.is_numeric() {
                            return Err(PlanError::mismatch(&child, "a numeric type"));
                        }
                    }
                    UnaryOp::IsNull | UnaryOp::IsNotNull => {}
                }
                Ok(Expr::Unary {
                    op: *op,
                    child: Box::new(child),
                })
            }
            Expr::If {
                condition,
                then_expr,
                else_expr,
            } => {
                let condition = condition.strictly_typed()?;
                if !condition.data_type()?.widens_to(&DataType::Boolean) {
                    return Err(PlanError::mismatch(&condition, "BOOLEAN"));
                }
                let then_expr = then_expr.strictly_typed()?;
                let else_expr = else_expr.strictly_typed()?;
                let tt = then_expr.data_type()?;
                let et = else_expr.data_type()?;
                let widest = DataType::widest(&tt, &et)
                    .ok_or_else(|| PlanError::mismatch(self, "a common branch type"))?;
                Ok(Expr::If {
                    condition: Box::new(condition),
                    then_expr: Box::new(then_expr.promote_to(&widest)),
                    else_expr: Box::new(else_expr.promote_to(&widest)),
                })
            }
            Expr::Coalesce(args) => {
                let args: Vec<Expr> = args
                    .iter()
                    .map(|a| a.strictly_typed())
                    .collect::<Result<_>>()?;
                let mut widest = args
                    .first()
                    .ok_or_else(|| {
                        PlanError::InvalidArgument("COALESCE requires at least one argument".into())
                    })?
                    .data_type()?;
                for arg in &args[1..] {
                    let t = arg.data_type()?;
                    widest = DataType::widest(&widest, &t)
                        .ok_or_else(|| PlanError::mismatch(arg, "a common argument type"))?;
                }
                Ok(Expr::Coalesce(
                    args.into_iter().map(|a| a.promote_to(&widest)).collect(),
                ))
            }
            Expr::AggregateFunction {
                func,
                args,
                distinct,
            } => {
                let args: Vec<Expr> = args
                    .iter()
                    .map(|a| a.strictly_typed())
                    .collect::<Result<_>>()?;
                if matches!(func, AggregateFunction::Sum | AggregateFunction::Avg) {
                    for arg in &args {
                        if !arg.data_type()?.is_numeric() {
                            return Err(PlanError::mismatch(arg, "a numeric type"));
                        }
                    }
                }
                Ok(Expr::AggregateFunction {
                    func: *func,
                    args,
                    distinct: *distinct,
                })
            }
        }
    }

    /// Resolved and requiring no further implicit cast insertion
    pub fn is_strictly_typed(&self) -> bool {
        self.resolved() && self.strictly_typed().as_ref() == Ok(self)
    }

    /// Evaluate a foldable expression at plan time. `None` means the
    /// expression cannot be folded (e.g. integer overflow).
    pub fn eval(&self) -> Option<ScalarValue> {
        match self {
            Expr::Literal { value, .. } => Some(value.clone()),
            Expr::Alias { child, .. }
            | Expr::GroupingAlias { child, .. }
            | Expr::AggregationAlias { child, .. } => child.eval(),
            Expr::Cast { child, data_type } => child.eval()?.cast_to(data_type),
            Expr::Binary { left, op, right } => match op {
                BinaryOp::And => eval_and(left.eval()?, right.eval()?),
                BinaryOp::Or => eval_or(left.eval()?, right.eval()?),
                op if op.is_comparison() => {
                    let l = left.eval()?;
                    let r = right.eval()?;
                    if l.is_null() || r.is_null() {
                        return Some(ScalarValue::Null);
                    }
                    let ord = l.compare(&r)?;
                    let outcome = match op {
                        BinaryOp::Eq => ord == Ordering::Equal,
                        BinaryOp::NotEq => ord != Ordering::Equal,
                        BinaryOp::Lt => ord == Ordering::Less,
                        BinaryOp::LtEq => ord != Ordering::Greater,
                        BinaryOp::Gt => ord == Ordering::Greater,
                        BinaryOp::GtEq => ord != Ordering::Less,
                        _ => unreachable!(),
                    };
                    Some(ScalarValue::Boolean(outcome))
                }
                _ => {
                    let l = left.eval()?;
                    let r = right.eval()?;
                    if l.is_null() || r.is_null() {
                        return Some(ScalarValue::Null);
                    }
                    let target = self.data_type().ok()?;
                    eval_arithmetic(&l, *op, &r, &target)
                }
            },
            Expr::Unary { op, child } => {
                let v = child.eval()?;
                match op {
                    UnaryOp::IsNull => Some(ScalarValue::Boolean(v.is_null())),
                    UnaryOp::IsNotNull => Some(ScalarValue::Boolean(!v.is_null())),
                    UnaryOp::Not => match v {
                        ScalarValue::Null => Some(ScalarValue::Null),
                        ScalarValue::Boolean(b) => Some(ScalarValue::Boolean(!b)),
                        _ => None,
                    },
                    UnaryOp::Negate => {
                        if v.is_null() {
                            return Some(ScalarValue::Null);
                        }
                        let target = child.data_type().ok()?;
                        if target.is_integral() {
                            ScalarValue::from_i64_checked(v.as_i64()?.checked_neg()?, &target)
                        } else {
                            ScalarValue::from_f64(-v.as_f64()?, &target)
                        }
                    }
                }
            }
            Expr::If {
                condition,
                then_expr,
                else_expr,
            } => match condition.eval()? {
                ScalarValue::Null => Some(ScalarValue::Null),
                ScalarValue::Boolean(true) => then_expr.eval(),
                ScalarValue::Boolean(false) => else_expr.eval(),
                _ => None,
            },
            Expr::Coalesce(args) => {
                for arg in args {
                    let v = arg.eval()?;
                    if !v.is_null() {
                        return Some(v);
                    }
                }
                Some(ScalarValue::Null)
            }
            Expr::UnresolvedAttribute { .. }
            | Expr::Attribute(_)
            | Expr::AggregateFunction { .. } => None,
        }
    }
}

/// Three-valued AND
fn eval_and(l: ScalarValue, r: ScalarValue) -> Option<ScalarValue> {
    match (l, r) {
        (ScalarValue::Boolean(false), _) | (_, ScalarValue::Boolean(false)) => {
            Some(ScalarValue::Boolean(false))
        }
        (ScalarValue::Boolean(true), ScalarValue::Boolean(true)) => {
            Some(ScalarValue::Boolean(true))
        }
        (ScalarValue::Null, ScalarValue::Boolean(true))
        | (ScalarValue::Boolean(true), ScalarValue::Null)
        | (ScalarValue::Null, ScalarValue::Null) => Some(ScalarValue::Null),
        _ => None,
    }
}

/// Three-valued OR
fn eval_or(l: ScalarValue, r: ScalarValue) -> Option<ScalarValue> {
    match (l, r) {
        (ScalarValue::Boolean(true), _) | (_, ScalarValue::Boolean(true)) => {
            Some(ScalarValue::Boolean(true))
        }
        (ScalarValue::Boolean(false), ScalarValue::Boolean(false)) => {
            Some(ScalarValue::Boolean(false))
        }
        (ScalarValue::Null, ScalarValue::Boolean(false))
        | (ScalarValue::Boolean(false), ScalarValue::Null)
        | (ScalarValue::Null, ScalarValue::Null) => Some(ScalarValue::Null),
        _ => None,
    }
}

fn eval_arithmetic(
    l: &ScalarValue,
    op: BinaryOp,
    r: &ScalarValue,
    target: &DataType,
) -> Option<ScalarValue> {
    if target.is_integral() {
        let (a, b) = (l.as_i64()?, r.as_i64()?);
        let v = match op {
            BinaryOp::Add => a.checked_add(b)?,
            BinaryOp::Subtract => a.checked_sub(b)?,
            BinaryOp::Multiply => a.checked_mul(b)?,
            BinaryOp::Divide => {
                if b == 0 {
                    return Some(ScalarValue::Null);
                }
                a.checked_div(b)?
            }
            _ => return None,
        };
        ScalarValue::from_i64_checked(v, target)
    } else {
        let (a, b) = (l.as_f64()?, r.as_f64()?);
        let v = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => {
                if b == 0.0 {
                    return Some(ScalarValue::Null);
                }
                a / b
            }
            _ => return None,
        };
        ScalarValue::from_f64(v, target)
    }
}

impl TreeNode for Expr {
    fn children(&self) -> Vec<&Self> {
        match self {
            Expr::Literal { .. } | Expr::UnresolvedAttribute { .. } | Expr::Attribute(_) => vec![],
            Expr::Alias { child, .. }
            | Expr::GroupingAlias { child, .. }
            | Expr::AggregationAlias { child, .. }
            | Expr::Cast { child, .. }
            | Expr::Unary { child, .. } => vec![child],
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::If {
                condition,
                then_expr,
                else_expr,
            } => vec![condition, then_expr, else_expr],
            Expr::Coalesce(args) => args.iter().collect(),
            Expr::AggregateFunction { args, .. } => args.iter().collect(),
        }
    }

    fn with_new_children(&self, children: Vec<Self>) -> Self {
        match self {
            Expr::Literal { .. } | Expr::UnresolvedAttribute { .. } | Expr::Attribute(_) => {
                self.clone()
            }
            Expr::Coalesce(_) => Expr::Coalesce(children),
            Expr::AggregateFunction { func, distinct, .. } => Expr::AggregateFunction {
                func: *func,
                args: children,
                distinct: *distinct,
            },
            fixed_arity => {
                let mut iter = children.into_iter();
                let mut next = move || Box::new(iter.next().expect("child count mismatch"));
                match fixed_arity {
                    Expr::Alias { name, id, .. } => Expr::Alias {
                        child: next(),
                        name: name.clone(),
                        id: *id,
                    },
                    Expr::GroupingAlias { name, id, .. } => Expr::GroupingAlias {
                        child: next(),
                        name: name.clone(),
                        id: *id,
                    },
                    Expr::AggregationAlias { name, id, .. } => Expr::AggregationAlias {
                        child: next(),
                        name: name.clone(),
                        id: *id,
                    },
                    Expr::Cast { data_type, .. } => Expr::Cast {
                        child: next(),
                        data_type: data_type.clone(),
                    },
                    Expr::Unary { op, .. } => Expr::Unary {
                        op: *op,
                        child: next(),
                    },
                    Expr::Binary { op, .. } => Expr::Binary {
                        left: next(),
                        op: *op,
                        right: next(),
                    },
                    Expr::If { .. } => Expr::If {
                        condition: next(),
                        then_expr: next(),
                        else_expr: next(),
                    },
                    _ => unreachable!("variant handled above"),
                }
            }
        }
    }

    fn node_label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value, .. } => write!(f, "{}", value),
            Expr::UnresolvedAttribute { name, qualifier } => match qualifier {
                Some(q) => write!(f, "'{}.{}", q, name),
                None => write!(f, "'{}", name),
            },
            Expr::Attribute(a) => write!(f, "{}", a),
            Expr::Alias { child, name, id } => write!(f, "{} AS {}{}", child, name, id),
            Expr::GroupingAlias { child, name, id } => {
                write!(f, "{} AS group:{}{}", child, name, id)
            }
            Expr::AggregationAlias { child, name, id } => {
                write!(f, "{} AS agg:{}{}", child, name, id)
            }
            Expr::Cast { child, data_type } => {
                write!(f, "CAST({} AS {})", child, data_type.sql_name())
            }
            Expr::Binary { left, op, right } => write!(f, "({} {} {})", left, op, right),
            Expr::Unary { op, child } => match op {
                UnaryOp::Not => write!(f, "(NOT {})", child),
                UnaryOp::Negate => write!(f, "(- {})", child),
                UnaryOp::IsNull => write!(f, "({} IS NULL)", child),
                UnaryOp::IsNotNull => write!(f, "({} IS NOT NULL)", child),
            },
            Expr::If {
                condition,
                then_expr,
                else_expr,
            } => write!(f, "IF({}, {}, {})", condition, then_expr, else_expr),
            Expr::Coalesce(args) => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "COALESCE({})", parts.join(", "))
            }
            Expr::AggregateFunction {
                func,
                args,
                distinct,
            } => {
                let parts: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                if *distinct {
                    write!(f, "{}(DISTINCT {})", func, parts.join(", "))
                } else {
                    write!(f, "{}({})", func, parts.join(", "))
                }
            }
        }
    }
}
