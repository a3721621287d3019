//! The row-key model (C2): a totally ordered, heterogeneous key used to
//! align rows across dataset snapshots.
//!
//! Four kinds, ascending: `Number < String < Null < NewRow`. A `Null` or
//! `NewRow` key carries a caller-supplied stable identifier so that two
//! otherwise-indistinguishable missing/new rows remain individually
//! addressable. A `Composite` key is a tuple of keys compared
//! lexicographically, used when a row is keyed by more than one column.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CResult, Error};
use crate::value::Value;

/// A column identifier: a stable `colid` paired with a display `name`.
/// Two columns are equal iff their `colid` matches — equal names alone do
/// not imply equality (spec.md §3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Column {
    pub colid: u64,
    pub name: String,
}

impl Column {
    pub fn new(colid: u64, name: impl Into<String>) -> Self {
        Self { colid, name: name.into() }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.colid == other.colid
    }
}
impl Eq for Column {}

/// A totally ordered row key. See the module documentation for the kind
/// ordering and composite-key semantics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Key {
    Number(f64),
    String(String),
    Null(u64),
    NewRow(u64),
    Composite(Vec<Key>),
}

/// Ordinal used as the primary comparison axis, per the Design Notes'
/// instruction not to rely on ambient language-level comparison semantics.
/// `Composite` sorts after all scalar kinds when compared against one, since
/// a composite key only has a meaningful lexicographic order against
/// another composite key of matching arity.
fn kind_ordinal(key: &Key) -> u8 {
    match key {
        Key::Number(_) => 0,
        Key::String(_) => 1,
        Key::Null(_) => 2,
        Key::NewRow(_) => 3,
        Key::Composite(_) => 4,
    }
}

impl Key {
    pub fn is_number(&self) -> bool {
        matches!(self, Key::Number(_))
    }
    pub fn is_string(&self) -> bool {
        matches!(self, Key::String(_))
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Key::Null(_))
    }
    pub fn is_new(&self) -> bool {
        matches!(self, Key::NewRow(_))
    }

    /// Builds a composite key from already-classified component keys, in
    /// the order the caller's key columns were listed.
    pub fn composite(parts: Vec<Key>) -> Key {
        Key::Composite(parts)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(v) => {
                if v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{}", *v as i64)
                } else {
                    write!(f, "{}", v)
                }
            }
            Key::String(v) => write!(f, "{}", v),
            Key::Null(id) => write!(f, "<Null ({})>", id),
            Key::NewRow(id) => write!(f, "<NewRow ({})>", id),
            Key::Composite(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", part)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a == b,
            (Key::String(a), Key::String(b)) => a == b,
            (Key::Null(a), Key::Null(b)) => a == b,
            (Key::NewRow(a), Key::NewRow(b)) => a == b,
            (Key::Composite(a), Key::Composite(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Null(a), Key::Null(b)) => a.cmp(b),
            (Key::NewRow(a), Key::NewRow(b)) => a.cmp(b),
            (Key::Composite(a), Key::Composite(b)) => a.cmp(b),
            _ => kind_ordinal(self).cmp(&kind_ordinal(other)),
        }
    }
}

/// Classifies a single scalar value into a row key. `id` supplies the
/// stable identifier used for `Null`/`NewRow` keys (spec.md §4.2); it is
/// ignored for `Number`/`String` values.
///
/// Fails with `UnkeyableValue` for NaN floats and for any non-scalar value
/// (`Array`, `DateTime`, `Date`, `Time`) — the four-kind order of spec.md
/// §3 has no place for a fifth, date-shaped kind, so dated values are never
/// classifiable as row keys (see DESIGN.md).
pub fn to_key(value: &Value, id: u64) -> CResult<Key> {
    match value {
        Value::Int(v) => Ok(Key::Number(*v as f64)),
        Value::Bool(v) => Ok(Key::Number(if *v { 1.0 } else { 0.0 })),
        Value::Float(v) => {
            if v.is_nan() {
                Err(Error::UnkeyableValue("NaN is not a valid key value".to_string()))
            } else {
                Ok(Key::Number(*v))
            }
        }
        Value::Str(v) => Ok(Key::String(v.clone())),
        Value::Null => Ok(Key::Null(id)),
        Value::NewRow => Ok(Key::NewRow(id)),
        other => Err(Error::UnkeyableValue(format!("cannot use {:?} as a row key", other))),
    }
}

/// Classifies an ordered list of values (e.g. one per key column) into a
/// single composite key, preserving column order.
pub fn to_composite_key(values: &[Value], id: u64) -> CResult<Key> {
    let parts = values.iter().map(|v| to_key(v, id)).collect::<CResult<Vec<_>>>()?;
    Ok(Key::composite(parts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_key_order() {
        let mut keys = vec![
            Key::String("B".to_string()),
            Key::Number(2.0),
            Key::Null(1),
            Key::String("A".to_string()),
            Key::Number(1.3),
            Key::NewRow(1),
            Key::String("D".to_string()),
            Key::Null(2),
            Key::NewRow(2),
        ];
        keys.sort();
        let strings: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(
            strings,
            vec!["1.3", "2", "A", "B", "D", "<Null (1)>", "<Null (2)>", "<NewRow (1)>", "<NewRow (2)>"]
        );
    }

    #[test]
    fn to_key_classifies_scalars() {
        assert!(to_key(&Value::Int(1), 0).unwrap().is_number());
        assert!(to_key(&Value::Str("a".to_string()), 0).unwrap().is_string());
        assert!(to_key(&Value::Null, 7).unwrap().is_null());
        assert!(to_key(&Value::NewRow, 9).unwrap().is_new());
    }

    #[test]
    fn to_key_rejects_nan_and_containers() {
        assert!(matches!(to_key(&Value::Float(f64::NAN), 0), Err(Error::UnkeyableValue(_))));
        assert!(matches!(to_key(&Value::Array(vec![]), 0), Err(Error::UnkeyableValue(_))));
    }

    #[test]
    fn null_and_new_row_keys_compare_by_identifier() {
        assert_ne!(Key::Null(1), Key::Null(2));
        assert_ne!(Key::NewRow(1), Key::NewRow(2));
        assert_eq!(Key::Null(1), Key::Null(1));
    }

    #[test]
    fn column_equality_is_colid_only() {
        let a = Column::new(1, "age");
        let b = Column::new(1, "years");
        let c = Column::new(2, "age");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn composite_keys_compare_lexicographically() {
        let a = Key::composite(vec![Key::Number(1.0), Key::String("b".to_string())]);
        let b = Key::composite(vec![Key::Number(1.0), Key::String("c".to_string())]);
        assert!(a < b);
    }

    #[test]
    fn property_3_ordering_is_total_and_transitive_over_random_keys() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let sample_key = |rng: &mut rand::rngs::ThreadRng| -> Key {
            match rng.gen_range(0..4) {
                0 => Key::Number(rng.gen_range(-100.0..100.0)),
                1 => Key::String(format!("s{}", rng.gen_range(0..20))),
                2 => Key::Null(rng.gen_range(0..5)),
                _ => Key::NewRow(rng.gen_range(0..5)),
            }
        };

        for _ in 0..300 {
            let (a, b, c) = (sample_key(&mut rng), sample_key(&mut rng), sample_key(&mut rng));

            let ab = a.cmp(&b);
            let ba = b.cmp(&a);
            assert_eq!(ab, ba.reverse(), "comparison must be antisymmetric");

            if a.cmp(&b) == Ordering::Less && b.cmp(&c) == Ordering::Less {
                assert_eq!(a.cmp(&c), Ordering::Less, "ordering must be transitive");
            }

            let encoded_a = serde_json::to_string(&a).unwrap();
            let decoded_a: Key = serde_json::from_str(&encoded_a).unwrap();
            assert_eq!(a.cmp(&b), decoded_a.cmp(&b), "ordering must be stable under serialization round-trip");
        }
    }

    #[test]
    fn round_trips_through_serde_json() {
        let k = Key::composite(vec![Key::Number(1.0), Key::Null(3)]);
        let encoded = serde_json::to_string(&k).unwrap();
        let decoded: Key = serde_json::from_str(&encoded).unwrap();
        assert_eq!(k, decoded);
    }
}
