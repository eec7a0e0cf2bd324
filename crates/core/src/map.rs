//! Map values.
//!
//! Keys are restricted to the hashable subset of values: bool, int, uint,
//! and string. Numerically equal keys of different types stay distinct
//! (`1` and `1u` are two keys). Entry order is not observable; equality is
//! order-insensitive and iteration yields keys.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{ErrorKind, ErrorValue};
use crate::value::Value;

/// Hashable subset of [`Value`] usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Arc<str>),
}

impl Hash for MapKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Discriminant keeps cross-type numeric keys distinct.
        std::mem::discriminant(self).hash(state);
        match self {
            MapKey::Bool(b) => b.hash(state),
            MapKey::Int(i) => i.hash(state),
            MapKey::Uint(u) => u.hash(state),
            MapKey::String(s) => s.hash(state),
        }
    }
}

impl MapKey {
    /// Narrows a value to a key. Returns the unsupported value's type name
    /// on failure.
    pub fn from_value(value: &Value) -> Result<MapKey, &str> {
        match value {
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Int(i) => Ok(MapKey::Int(*i)),
            Value::Uint(u) => Ok(MapKey::Uint(*u)),
            Value::String(s) => Ok(MapKey::String(Arc::clone(s))),
            other => Err(other.type_name()),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::Uint(u) => Value::Uint(*u),
            MapKey::String(s) => Value::String(Arc::clone(s)),
        }
    }
}

impl std::fmt::Display for MapKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Uint(u) => write!(f, "{u}u"),
            MapKey::String(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct MapValue {
    entries: HashMap<MapKey, Value>,
}

impl MapValue {
    pub fn empty() -> MapValue {
        MapValue::default()
    }

    pub fn from_keyed_entries(entries: HashMap<MapKey, Value>) -> MapValue {
        MapValue { entries }
    }

    /// Builds a map from literal entries. Unsupported key types and
    /// duplicate keys fail the whole construction.
    pub fn from_entries(entries: Vec<(Value, Value)>) -> Result<MapValue, ErrorValue> {
        let mut map = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            let key = MapKey::from_value(&key).map_err(|type_name| {
                ErrorValue::new(
                    ErrorKind::TypeConversion,
                    format!("unsupported map key type: {type_name}"),
                )
            })?;
            if map.insert(key.clone(), value).is_some() {
                return Err(ErrorValue::new(
                    ErrorKind::Internal,
                    format!("duplicate map key: {key}"),
                ));
            }
        }
        Ok(MapValue { entries: map })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        let key = MapKey::from_value(key).ok()?;
        self.entries.get(&key).cloned()
    }

    /// Indexing with language semantics: a missing key is `no_such_key`.
    pub fn index(&self, key: &Value) -> Value {
        match MapKey::from_value(key) {
            Ok(k) => match self.entries.get(&k) {
                Some(v) => v.clone(),
                None => Value::error(ErrorKind::NoSuchKey, format!("no such key: {k}")),
            },
            Err(type_name) => Value::error(
                ErrorKind::NoSuchOverload,
                format!("no such overload: _[_](map, {type_name})"),
            ),
        }
    }

    pub fn contains(&self, key: &Value) -> Value {
        match MapKey::from_value(key) {
            Ok(k) => Value::Bool(self.entries.contains_key(&k)),
            Err(_) => Value::Bool(false),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter()
    }

    /// Iteration order is unspecified; user-visible determinism is the
    /// expression's concern (e.g. sorting materialized keys).
    pub fn keys(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.keys().map(MapKey::to_value)
    }
}

// Order-insensitive structural equality.
impl PartialEq for MapValue {
    fn eq(&self, other: &MapValue) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(k, v)| other.entries.get(k) == Some(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MapValue {
        MapValue::from_entries(vec![
            (Value::string("a"), Value::Int(1)),
            (Value::Int(1), Value::string("int-one")),
            (Value::Uint(1), Value::string("uint-one")),
            (Value::Bool(true), Value::Int(42)),
        ])
        .unwrap()
    }

    #[test]
    fn test_cross_type_numeric_keys_stay_distinct() {
        let map = sample();
        assert_eq!(map.len(), 4);
        assert_eq!(map.get(&Value::Int(1)), Some(Value::string("int-one")));
        assert_eq!(map.get(&Value::Uint(1)), Some(Value::string("uint-one")));
    }

    #[test]
    fn test_duplicate_literal_key_is_error() {
        let err = MapValue::from_entries(vec![
            (Value::string("k"), Value::Int(1)),
            (Value::string("k"), Value::Int(2)),
        ])
        .unwrap_err();
        assert!(err.message.contains("duplicate map key"));
    }

    #[test]
    fn test_unsupported_key_type() {
        let err =
            MapValue::from_entries(vec![(Value::Double(1.5), Value::Int(1))]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TypeConversion);
    }

    #[test]
    fn test_missing_key_is_no_such_key() {
        let map = sample();
        let missing = map.index(&Value::string("zzz"));
        match missing {
            Value::Error(e) => assert_eq!(e.kind, ErrorKind::NoSuchKey),
            other => panic!("expected error, got {other}"),
        }
    }

    #[test]
    fn test_equality_is_order_insensitive() {
        let a = MapValue::from_entries(vec![
            (Value::string("x"), Value::Int(1)),
            (Value::string("y"), Value::Int(2)),
        ])
        .unwrap();
        let b = MapValue::from_entries(vec![
            (Value::string("y"), Value::Int(2)),
            (Value::string("x"), Value::Int(1)),
        ])
        .unwrap();
        assert_eq!(a, b);
    }
}
