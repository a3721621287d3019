//! The typed cell values that document rows and archive rows carry. A
//! `Value` is the classifier's (see [`crate::key`]) and the wire encoder's
//! (see [`crate::encoding`]) common currency.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// A single cell's value, or a sentinel marker used by the row-key
/// classifier (`Null`, `NewRow`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    /// An explicit null/unset cell.
    Null,
    /// Sentinel for a row that is absent from any prior version. Only
    /// meaningful as input to the row-key classifier, never stored as a
    /// cell value in an archive.
    NewRow,
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    /// A nested container. Never classifiable as a row key component
    /// (`to_key` raises `UnkeyableValue`), but valid as an ordinary cell
    /// value.
    Array(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Cell-value equality per spec.md §4.7: numeric equality on numbers,
    /// exact equality on strings/booleans/nulls, byte-for-byte equality on
    /// serialized dates/times.
    pub fn cell_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::NewRow, Value::NewRow) => true,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.cell_eq(y))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Null => write!(f, "null"),
            Value::NewRow => write!(f, "<new-row>"),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::Array(_) => write!(f, "<array>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_eq_is_numeric_across_int_and_float() {
        assert!(Value::Int(3).cell_eq(&Value::Float(3.0)));
        assert!(!Value::Int(3).cell_eq(&Value::Float(3.1)));
    }

    #[test]
    fn cell_eq_distinguishes_null_and_new_row() {
        assert!(!Value::Null.cell_eq(&Value::NewRow));
    }
}
