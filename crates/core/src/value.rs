//! The runtime value representation.
//!
//! [`Value`] is a sum type over every datum an expression can produce.
//! Aggregates share their contents through `Arc`, so cloning a value is
//! cheap and values are immutable for their entire lifetime. Failures and
//! deferred attributes travel in-band as [`Value::Error`] and
//! [`Value::Unknown`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{ErrorKind, ErrorValue};
use crate::list::ListValue;
use crate::map::{MapKey, MapValue};
use crate::object::ObjectValue;
use crate::optional::OptionalValue;
use crate::traits::Traits;
use crate::types::Type;
use crate::unknown::UnknownSet;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    /// Signed span with nanosecond precision.
    Duration(chrono::Duration),
    /// Instant in UTC.
    Timestamp(DateTime<Utc>),
    List(Arc<ListValue>),
    Map(Arc<MapValue>),
    /// A message-shaped record registered by the host.
    Object(Arc<ObjectValue>),
    /// A first-class type reference.
    Type(Type),
    /// Terminal failure; propagates through strict operators.
    Error(Arc<ErrorValue>),
    /// Deferred attribute set; propagates through strict operators.
    Unknown(Arc<UnknownSet>),
    Optional(Arc<OptionalValue>),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Value {
        Value::Bytes(b.into())
    }

    pub fn list(elems: Vec<Value>) -> Value {
        Value::List(Arc::new(ListValue::new(elems)))
    }

    /// Builds a map value, failing on unsupported or duplicate keys.
    pub fn map(entries: Vec<(Value, Value)>) -> Value {
        match MapValue::from_entries(entries) {
            Ok(map) => Value::Map(Arc::new(map)),
            Err(err) => Value::Error(Arc::new(err)),
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Value {
        Value::Error(Arc::new(ErrorValue::new(kind, message)))
    }

    pub fn from_error(err: ErrorValue) -> Value {
        Value::Error(Arc::new(err))
    }

    pub fn no_such_overload(op: &str, operands: &[&Value]) -> Value {
        let names: Vec<&str> = operands.iter().map(|v| v.type_name()).collect();
        Value::Error(Arc::new(ErrorValue::no_such_overload(op, &names)))
    }

    pub fn optional_of(value: Value) -> Value {
        Value::Optional(Arc::new(OptionalValue::of(value)))
    }

    pub fn optional_none() -> Value {
        Value::Optional(Arc::new(OptionalValue::none()))
    }

    pub fn unknown(set: UnknownSet) -> Value {
        Value::Unknown(Arc::new(set))
    }

    /// The checked type of this value.
    pub fn type_of(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Uint(_) => Type::Uint,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Bytes(_) => Type::Bytes,
            Value::Duration(_) => Type::Duration,
            Value::Timestamp(_) => Type::Timestamp,
            Value::List(_) => Type::list(Type::Dyn),
            Value::Map(_) => Type::map(Type::Dyn, Type::Dyn),
            Value::Object(obj) => Type::Struct(obj.type_name().into()),
            Value::Type(t) => Type::type_of(t.clone()),
            Value::Error(_) => Type::Error,
            Value::Unknown(_) => Type::Unknown,
            Value::Optional(_) => Type::optional(Type::Dyn),
        }
    }

    /// Runtime type name, as reported in overload errors and by `type(x)`.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null_type",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Duration(_) => "google.protobuf.Duration",
            Value::Timestamp(_) => "google.protobuf.Timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(obj) => obj.type_name(),
            Value::Type(_) => "type",
            Value::Error(_) => "error",
            Value::Unknown(_) => "unknown",
            Value::Optional(_) => "optional_type",
        }
    }

    /// Capability bits for trait-based operator dispatch.
    pub fn traits(&self) -> Traits {
        match self {
            Value::Bool(_) => Traits::COMPARER | Traits::NEGATER,
            Value::Int(_) => {
                Traits::ADDER
                    | Traits::SUBTRACTOR
                    | Traits::MULTIPLIER
                    | Traits::DIVIDER
                    | Traits::MODDER
                    | Traits::NEGATER
                    | Traits::COMPARER
            }
            Value::Uint(_) => {
                Traits::ADDER
                    | Traits::SUBTRACTOR
                    | Traits::MULTIPLIER
                    | Traits::DIVIDER
                    | Traits::MODDER
                    | Traits::COMPARER
            }
            Value::Double(_) => {
                Traits::ADDER
                    | Traits::SUBTRACTOR
                    | Traits::MULTIPLIER
                    | Traits::DIVIDER
                    | Traits::NEGATER
                    | Traits::COMPARER
            }
            Value::String(_) => {
                Traits::ADDER
                    | Traits::COMPARER
                    | Traits::MATCHER
                    | Traits::RECEIVER
                    | Traits::SIZER
            }
            Value::Bytes(_) => Traits::ADDER | Traits::COMPARER | Traits::SIZER,
            Value::Duration(_) => {
                Traits::ADDER
                    | Traits::SUBTRACTOR
                    | Traits::NEGATER
                    | Traits::COMPARER
                    | Traits::RECEIVER
            }
            Value::Timestamp(_) => {
                Traits::ADDER | Traits::SUBTRACTOR | Traits::COMPARER | Traits::RECEIVER
            }
            Value::List(_) => {
                Traits::ADDER
                    | Traits::CONTAINER
                    | Traits::INDEXER
                    | Traits::ITERABLE
                    | Traits::SIZER
            }
            Value::Map(_) => {
                Traits::CONTAINER | Traits::INDEXER | Traits::ITERABLE | Traits::SIZER
            }
            Value::Object(_) => Traits::FIELD_TESTER | Traits::INDEXER,
            Value::Optional(_) => Traits::RECEIVER,
            Value::Null | Value::Type(_) | Value::Error(_) | Value::Unknown(_) => Traits::empty(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    /// True for values that halt strict evaluation when they appear as an
    /// operand.
    pub fn is_terminal(&self) -> bool {
        self.is_error() || self.is_unknown()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Language equality. Errors and unknowns propagate; numeric values
    /// compare across types by real value; everything else is equal only
    /// within its own kind. Never yields `no_such_overload`.
    pub fn equal(&self, other: &Value) -> Value {
        match propagate2(self, other) {
            Some(v) => v,
            None => Value::Bool(crate::ordering::values_equal(self, other)),
        }
    }

    /// Zero value of a declared type, used for absent message fields.
    pub fn zero_of(ty: &Type) -> Value {
        match ty {
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Uint => Value::Uint(0),
            Type::Double => Value::Double(0.0),
            Type::String => Value::string(""),
            Type::Bytes => Value::bytes(Vec::new()),
            Type::Duration => Value::Duration(chrono::Duration::zero()),
            Type::Timestamp => Value::Timestamp(DateTime::<Utc>::UNIX_EPOCH),
            Type::List(_) => Value::list(vec![]),
            Type::Map(_, _) => Value::Map(Arc::new(MapValue::empty())),
            // Messages, wrappers, and dynamic fields default to null.
            _ => Value::Null,
        }
    }
}

/// Returns the propagated terminal value for a strict binary operation, if
/// either operand is an error or unknown. Errors win over unknowns; two
/// unknowns merge by set union.
pub fn propagate2(lhs: &Value, rhs: &Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::Error(_), _) => Some(lhs.clone()),
        (_, Value::Error(_)) => Some(rhs.clone()),
        (Value::Unknown(a), Value::Unknown(b)) => {
            Some(Value::Unknown(Arc::new(a.merge(b))))
        }
        (Value::Unknown(_), _) => Some(lhs.clone()),
        (_, Value::Unknown(_)) => Some(rhs.clone()),
        _ => None,
    }
}

/// Propagates the first terminal value of an argument list, merging
/// unknowns.
pub fn propagate_all(args: &[Value]) -> Option<Value> {
    if let Some(err) = args.iter().find(|v| v.is_error()) {
        return Some(err.clone());
    }
    let mut merged: Option<UnknownSet> = None;
    for arg in args {
        if let Value::Unknown(u) = arg {
            merged = Some(match merged {
                Some(m) => m.merge(u),
                None => u.as_ref().clone(),
            });
        }
    }
    merged.map(Value::unknown)
}

// Structural equality for tests and internal bookkeeping. Distinct from
// `equal()`: no cross-type numeric equality, NaN compares by bit pattern
// semantics of `f64::eq` (NaN != NaN).
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Unknown(a), Value::Unknown(b)) => a == b,
            (Value::Optional(a), Value::Optional(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Uint(u) => write!(f, "{u}u"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => f.write_str(s),
            Value::Bytes(b) => {
                f.write_str("b\"")?;
                for byte in b.iter() {
                    if byte.is_ascii_graphic() || *byte == b' ' {
                        write!(f, "{}", *byte as char)?;
                    } else {
                        write!(f, "\\x{byte:02x}")?;
                    }
                }
                f.write_str("\"")
            }
            Value::Duration(d) => f.write_str(&crate::datetime::format_duration(d)),
            Value::Timestamp(t) => f.write_str(&crate::datetime::format_timestamp(t)),
            Value::List(l) => {
                f.write_str("[")?;
                for (i, elem) in l.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                f.write_str("]")
            }
            Value::Map(m) => {
                f.write_str("{")?;
                for (i, (key, value)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key.to_value(), value)?;
                }
                f.write_str("}")
            }
            Value::Object(obj) => write!(f, "{obj}"),
            Value::Type(t) => write!(f, "{t}"),
            Value::Error(e) => write!(f, "{e}"),
            Value::Unknown(u) => write!(f, "{u}"),
            Value::Optional(opt) => match opt.as_option() {
                Some(v) => write!(f, "optional.of({v})"),
                None => f.write_str("optional.none()"),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Value {
        Value::Int(i64::from(i))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Value {
        Value::Uint(u)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Value {
        Value::Uint(u64::from(u))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Value {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::string(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Value {
        Value::bytes(b.to_vec())
    }
}

impl From<chrono::Duration> for Value {
    fn from(d: chrono::Duration) -> Value {
        Value::Duration(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Value {
        Value::Timestamp(t)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Value {
        Value::list(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<HashMap<String, T>> for Value {
    fn from(items: HashMap<String, T>) -> Value {
        let entries = items
            .into_iter()
            .map(|(k, v)| (MapKey::String(Arc::from(k.as_str())), v.into()))
            .collect();
        Value::Map(Arc::new(MapValue::from_keyed_entries(entries)))
    }
}

impl From<ErrorValue> for Value {
    fn from(err: ErrorValue) -> Value {
        Value::from_error(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Int(1).type_name(), "int");
        assert_eq!(Value::Uint(1).type_name(), "uint");
        assert_eq!(Value::Null.type_name(), "null_type");
        assert_eq!(
            Value::Duration(chrono::Duration::seconds(1)).type_name(),
            "google.protobuf.Duration"
        );
    }

    #[test]
    fn test_traits_gate_operator_support() {
        assert!(Value::Int(1).traits().contains(Traits::NEGATER));
        assert!(!Value::Uint(1).traits().contains(Traits::NEGATER));
        assert!(Value::string("a").traits().contains(Traits::MATCHER));
        assert!(!Value::Bool(true).traits().contains(Traits::ADDER));
    }

    #[test]
    fn test_equal_is_reflexive_for_non_nan() {
        for v in [
            Value::Null,
            Value::Bool(true),
            Value::Int(-3),
            Value::Uint(3),
            Value::Double(2.5),
            Value::string("hi"),
            Value::list(vec![Value::Int(1), Value::string("x")]),
        ] {
            assert_eq!(v.equal(&v), Value::Bool(true), "not reflexive: {v}");
        }
    }

    #[test]
    fn test_nan_not_equal_to_itself() {
        let nan = Value::Double(f64::NAN);
        assert_eq!(nan.equal(&nan), Value::Bool(false));
    }

    #[test]
    fn test_cross_type_numeric_equality() {
        assert_eq!(Value::Int(1).equal(&Value::Uint(1)), Value::Bool(true));
        assert_eq!(Value::Int(1).equal(&Value::Double(1.0)), Value::Bool(true));
        assert_eq!(Value::Uint(2).equal(&Value::Double(2.0)), Value::Bool(true));
        assert_eq!(Value::Int(-1).equal(&Value::Uint(u64::MAX)), Value::Bool(false));
    }

    #[test]
    fn test_distinct_kinds_unequal_not_error() {
        assert_eq!(Value::Int(1).equal(&Value::string("1")), Value::Bool(false));
        assert_eq!(Value::Bool(true).equal(&Value::Int(1)), Value::Bool(false));
    }

    #[test]
    fn test_error_propagates_through_equal() {
        let err = Value::error(ErrorKind::DivideByZero, "divide by zero");
        assert!(err.equal(&Value::Int(1)).is_error());
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Value::Uint(7).to_string(), "7u");
        assert_eq!(
            Value::list(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
        assert_eq!(Value::optional_none().to_string(), "optional.none()");
    }
}
