//! Data types and the numeric widening lattice

use std::fmt;

/// A named, typed field of a struct type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructField {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl StructField {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }
}

/// Data type of an expression or attribute
///
/// Numeric types form a total widening order:
/// Byte < Short < Int < Long < Float < Double.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    Struct(Vec<StructField>),
}

impl DataType {
    /// The SQL name of this type
    pub fn sql_name(&self) -> String {
        match self {
            DataType::Boolean => "BOOLEAN".into(),
            DataType::Byte => "TINYINT".into(),
            DataType::Short => "SMALLINT".into(),
            DataType::Int => "INT".into(),
            DataType::Long => "BIGINT".into(),
            DataType::Float => "FLOAT".into(),
            DataType::Double => "DOUBLE".into(),
            DataType::String => "STRING".into(),
            DataType::Struct(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|f| format!("{}: {}", f.name, f.data_type.sql_name()))
                    .collect();
                format!("STRUCT<{}>", inner.join(", "))
            }
        }
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            DataType::Byte | DataType::Short | DataType::Int | DataType::Long
        )
    }

    pub fn is_fractional(&self) -> bool {
        matches!(self, DataType::Float | DataType::Double)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_fractional()
    }

    /// Whether values of this type have a total order usable by comparisons
    pub fn is_ordered(&self) -> bool {
        self.is_numeric() || matches!(self, DataType::String | DataType::Boolean)
    }

    /// Position in the widening order; `None` for non-numeric types
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            DataType::Byte => Some(0),
            DataType::Short => Some(1),
            DataType::Int => Some(2),
            DataType::Long => Some(3),
            DataType::Float => Some(4),
            DataType::Double => Some(5),
            _ => None,
        }
    }

    /// Strict widening order. Only numeric types are comparable; equal
    /// types are not narrower than each other.
    pub fn narrower_than(&self, other: &DataType) -> bool {
        match (self.numeric_rank(), other.numeric_rank()) {
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// Whether a value of this type can be implicitly promoted to `other`
    pub fn widens_to(&self, other: &DataType) -> bool {
        self == other || self.narrower_than(other)
    }

    /// Least upper bound of two types in the widening order, or `None`
    /// when they are incomparable (e.g. Boolean vs Int).
    pub fn widest(a: &DataType, b: &DataType) -> Option<DataType> {
        if a == b {
            return Some(a.clone());
        }
        match (a.numeric_rank(), b.numeric_rank()) {
            (Some(ra), Some(rb)) => Some(if ra < rb { b.clone() } else { a.clone() }),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_order() {
        assert!(DataType::Byte.narrower_than(&DataType::Short));
        assert!(DataType::Int.narrower_than(&DataType::Double));
        assert!(!DataType::Long.narrower_than(&DataType::Long));
        assert!(!DataType::Boolean.narrower_than(&DataType::Int));
        assert!(!DataType::Double.narrower_than(&DataType::Float));
    }

    #[test]
    fn test_widest() {
        assert_eq!(
            DataType::widest(&DataType::Int, &DataType::Long),
            Some(DataType::Long)
        );
        assert_eq!(
            DataType::widest(&DataType::Long, &DataType::Float),
            Some(DataType::Float)
        );
        assert_eq!(
            DataType::widest(&DataType::String, &DataType::String),
            Some(DataType::String)
        );
        assert_eq!(DataType::widest(&DataType::Boolean, &DataType::Int), None);
    }

    #[test]
    fn test_sql_names() {
        assert_eq!(DataType::Byte.sql_name(), "TINYINT");
        assert_eq!(DataType::Short.sql_name(), "SMALLINT");
        assert_eq!(DataType::Long.sql_name(), "BIGINT");
        let s = DataType::Struct(vec![
            StructField::new("x", DataType::Int, false),
            StructField::new("y", DataType::Double, true),
        ]);
        assert_eq!(s.sql_name(), "STRUCT<x: INT, y: DOUBLE>");
    }
}
