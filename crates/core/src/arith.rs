//! Arithmetic operators over values.
//!
//! Int and uint arithmetic is overflow-checked; doubles follow IEEE-754.
//! Every operation takes and returns values, reporting failures in-band.

use crate::datetime::{checked_timestamp, duration_from_nanos, duration_nanos};
use crate::error::{ErrorKind, ErrorValue};
use crate::list::ListValue;
use crate::value::{propagate2, Value};

impl Value {
    /// `_+_`: numeric addition, string/bytes/list concatenation,
    /// duration/timestamp shifting.
    pub fn add(&self, other: &Value) -> Value {
        if let Some(v) = propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.checked_add(*b) {
                Some(sum) => Value::Int(sum),
                None => ErrorValue::overflow("_+_").into(),
            },
            (Value::Uint(a), Value::Uint(b)) => match a.checked_add(*b) {
                Some(sum) => Value::Uint(sum),
                None => ErrorValue::overflow("_+_").into(),
            },
            (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
            (Value::String(a), Value::String(b)) => {
                let mut joined = String::with_capacity(a.len() + b.len());
                joined.push_str(a);
                joined.push_str(b);
                Value::string(joined)
            }
            (Value::Bytes(a), Value::Bytes(b)) => {
                let mut joined = Vec::with_capacity(a.len() + b.len());
                joined.extend_from_slice(a);
                joined.extend_from_slice(b);
                Value::bytes(joined)
            }
            (Value::List(a), Value::List(b)) => Value::List(ListValue::concat(a, b)),
            (Value::Duration(a), Value::Duration(b)) => {
                match (duration_nanos(a), duration_nanos(b)) {
                    (Ok(x), Ok(y)) => match x.checked_add(y) {
                        Some(sum) => Value::Duration(duration_from_nanos(sum)),
                        None => ErrorValue::overflow("_+_").into(),
                    },
                    (Err(e), _) | (_, Err(e)) => e.into(),
                }
            }
            (Value::Timestamp(t), Value::Duration(d))
            | (Value::Duration(d), Value::Timestamp(t)) => match t.checked_add_signed(*d) {
                Some(shifted) => match checked_timestamp(shifted) {
                    Ok(ts) => Value::Timestamp(ts),
                    Err(e) => e.into(),
                },
                None => ErrorValue::overflow("_+_").into(),
            },
            _ => Value::no_such_overload("_+_", &[self, other]),
        }
    }

    /// `_-_`.
    pub fn subtract(&self, other: &Value) -> Value {
        if let Some(v) = propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.checked_sub(*b) {
                Some(diff) => Value::Int(diff),
                None => ErrorValue::overflow("_-_").into(),
            },
            (Value::Uint(a), Value::Uint(b)) => match a.checked_sub(*b) {
                Some(diff) => Value::Uint(diff),
                None => ErrorValue::overflow("_-_").into(),
            },
            (Value::Double(a), Value::Double(b)) => Value::Double(a - b),
            (Value::Duration(a), Value::Duration(b)) => {
                match (duration_nanos(a), duration_nanos(b)) {
                    (Ok(x), Ok(y)) => match x.checked_sub(y) {
                        Some(diff) => Value::Duration(duration_from_nanos(diff)),
                        None => ErrorValue::overflow("_-_").into(),
                    },
                    (Err(e), _) | (_, Err(e)) => e.into(),
                }
            }
            (Value::Timestamp(t), Value::Duration(d)) => match t.checked_sub_signed(*d) {
                Some(shifted) => match checked_timestamp(shifted) {
                    Ok(ts) => Value::Timestamp(ts),
                    Err(e) => e.into(),
                },
                None => ErrorValue::overflow("_-_").into(),
            },
            (Value::Timestamp(a), Value::Timestamp(b)) => {
                match duration_nanos(&a.signed_duration_since(*b)) {
                    Ok(nanos) => Value::Duration(duration_from_nanos(nanos)),
                    Err(e) => e.into(),
                }
            }
            _ => Value::no_such_overload("_-_", &[self, other]),
        }
    }

    /// `_*_`.
    pub fn multiply(&self, other: &Value) -> Value {
        if let Some(v) = propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => match a.checked_mul(*b) {
                Some(product) => Value::Int(product),
                None => ErrorValue::overflow("_*_").into(),
            },
            (Value::Uint(a), Value::Uint(b)) => match a.checked_mul(*b) {
                Some(product) => Value::Uint(product),
                None => ErrorValue::overflow("_*_").into(),
            },
            (Value::Double(a), Value::Double(b)) => Value::Double(a * b),
            _ => Value::no_such_overload("_*_", &[self, other]),
        }
    }

    /// `_/_`. Integer division truncates toward zero; dividing by zero is an
    /// error; `i64::MIN / -1` overflows. Double division follows IEEE-754.
    pub fn divide(&self, other: &Value) -> Value {
        if let Some(v) = propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Value::error(ErrorKind::DivideByZero, "divide by zero")
                } else {
                    match a.checked_div(*b) {
                        Some(quotient) => Value::Int(quotient),
                        None => ErrorValue::overflow("_/_").into(),
                    }
                }
            }
            (Value::Uint(a), Value::Uint(b)) => {
                if *b == 0 {
                    Value::error(ErrorKind::DivideByZero, "divide by zero")
                } else {
                    Value::Uint(a / b)
                }
            }
            (Value::Double(a), Value::Double(b)) => Value::Double(a / b),
            _ => Value::no_such_overload("_/_", &[self, other]),
        }
    }

    /// `_%_`. Defined for int and uint only.
    pub fn modulo(&self, other: &Value) -> Value {
        if let Some(v) = propagate2(self, other) {
            return v;
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Value::error(ErrorKind::ModulusByZero, "modulus by zero")
                } else {
                    match a.checked_rem(*b) {
                        Some(rem) => Value::Int(rem),
                        None => ErrorValue::overflow("_%_").into(),
                    }
                }
            }
            (Value::Uint(a), Value::Uint(b)) => {
                if *b == 0 {
                    Value::error(ErrorKind::ModulusByZero, "modulus by zero")
                } else {
                    Value::Uint(a % b)
                }
            }
            _ => Value::no_such_overload("_%_", &[self, other]),
        }
    }

    /// Arithmetic `-_`. Logical `!_` is a separate operator on bool.
    pub fn negate(&self) -> Value {
        match self {
            Value::Error(_) | Value::Unknown(_) => self.clone(),
            Value::Int(i) => match i.checked_neg() {
                Some(negated) => Value::Int(negated),
                None => ErrorValue::overflow("-_").into(),
            },
            Value::Double(d) => Value::Double(-d),
            Value::Duration(d) => match duration_nanos(d) {
                Ok(nanos) => match nanos.checked_neg() {
                    Some(negated) => Value::Duration(duration_from_nanos(negated)),
                    None => ErrorValue::overflow("-_").into(),
                },
                Err(e) => e.into(),
            },
            _ => Value::no_such_overload("-_", &[self]),
        }
    }

    /// Element count: code points for strings, octets for bytes, entries for
    /// lists and maps.
    pub fn size(&self) -> Value {
        match self {
            Value::Error(_) | Value::Unknown(_) => self.clone(),
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Bytes(b) => Value::Int(b.len() as i64),
            Value::List(l) => Value::Int(l.len() as i64),
            Value::Map(m) => Value::Int(m.len() as i64),
            _ => Value::no_such_overload("size", &[self]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_kind(value: Value, kind: ErrorKind) {
        match value {
            Value::Error(e) => assert_eq!(e.kind, kind),
            other => panic!("expected {kind:?} error, got {other}"),
        }
    }

    #[test]
    fn test_int_overflow() {
        assert_err_kind(
            Value::Int(i64::MAX).add(&Value::Int(1)),
            ErrorKind::Overflow,
        );
        assert_err_kind(
            Value::Int(i64::MIN).subtract(&Value::Int(1)),
            ErrorKind::Overflow,
        );
        assert_err_kind(Value::Int(i64::MIN).negate(), ErrorKind::Overflow);
    }

    #[test]
    fn test_uint_underflow() {
        assert_err_kind(
            Value::Uint(0).subtract(&Value::Uint(1)),
            ErrorKind::Overflow,
        );
    }

    #[test]
    fn test_division_edge_cases() {
        assert_err_kind(
            Value::Int(1).divide(&Value::Int(0)),
            ErrorKind::DivideByZero,
        );
        assert_err_kind(
            Value::Int(i64::MIN).divide(&Value::Int(-1)),
            ErrorKind::Overflow,
        );
        assert_eq!(Value::Int(-7).divide(&Value::Int(2)), Value::Int(-3));
        // Doubles divide to infinity, not error.
        assert_eq!(
            Value::Double(1.0).divide(&Value::Double(0.0)),
            Value::Double(f64::INFINITY)
        );
    }

    #[test]
    fn test_modulus_edge_cases() {
        assert_err_kind(
            Value::Int(1).modulo(&Value::Int(0)),
            ErrorKind::ModulusByZero,
        );
        assert_err_kind(
            Value::Int(i64::MIN).modulo(&Value::Int(-1)),
            ErrorKind::Overflow,
        );
        assert_eq!(Value::Int(-7).modulo(&Value::Int(2)), Value::Int(-1));
    }

    #[test]
    fn test_addition_is_commutative_without_overflow() {
        let pairs = [
            (Value::Int(3), Value::Int(-9)),
            (Value::Uint(3), Value::Uint(9)),
            (Value::Double(0.25), Value::Double(4.5)),
        ];
        for (a, b) in pairs {
            assert_eq!(a.add(&b), b.add(&a));
        }
    }

    #[test]
    fn test_concat_is_associative() {
        let a = Value::string("foo");
        let b = Value::string("bar");
        let c = Value::string("baz");
        assert_eq!(a.add(&b).add(&c), a.add(&b.add(&c)));

        let xs = Value::list(vec![Value::Int(1)]);
        let ys = Value::list(vec![Value::Int(2)]);
        let zs = Value::list(vec![Value::Int(3)]);
        assert_eq!(xs.add(&ys).add(&zs), xs.add(&ys.add(&zs)));
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t = crate::datetime::parse_timestamp("2023-01-01T00:00:00Z").unwrap();
        let shifted = Value::Timestamp(t).add(&Value::Duration(chrono::Duration::hours(25)));
        assert_eq!(
            shifted,
            Value::Timestamp(crate::datetime::parse_timestamp("2023-01-02T01:00:00Z").unwrap())
        );
        let diff = Value::Timestamp(t)
            .subtract(&Value::Timestamp(
                crate::datetime::parse_timestamp("2022-12-31T23:00:00Z").unwrap(),
            ));
        assert_eq!(diff, Value::Duration(chrono::Duration::hours(1)));
    }

    #[test]
    fn test_timestamp_range_overflow() {
        let t = crate::datetime::parse_timestamp("9999-12-31T23:59:59Z").unwrap();
        assert_err_kind(
            Value::Timestamp(t).add(&Value::Duration(chrono::Duration::days(2))),
            ErrorKind::Overflow,
        );
    }

    #[test]
    fn test_mismatched_operands_are_no_such_overload() {
        assert_err_kind(
            Value::Int(1).add(&Value::string("1")),
            ErrorKind::NoSuchOverload,
        );
        assert_err_kind(Value::Uint(1).negate(), ErrorKind::NoSuchOverload);
    }

    #[test]
    fn test_size_counts_code_points() {
        assert_eq!(Value::string("日本語").size(), Value::Int(3));
        assert_eq!(Value::string("日本語").to_string().len(), 9);
        assert_eq!(Value::bytes("日本語".as_bytes().to_vec()).size(), Value::Int(9));
    }
}
