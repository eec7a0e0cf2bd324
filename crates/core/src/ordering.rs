//! Equality and ordering across value kinds.
//!
//! Int, uint, and double order by the real number they represent, so
//! `Int(x) < Uint(2^63)` is well defined even though `x` cannot hold that
//! value. NaN is unordered: equality with NaN is false, ordered comparison
//! is an error surfaced by the caller.

use std::cmp::Ordering;

use crate::value::Value;

/// Result of comparing two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOutcome {
    Ordered(Ordering),
    /// A NaN operand; ordered operators turn this into an error.
    Unordered,
    /// The kinds carry no ordering relative to each other.
    Incomparable,
}

const MAX_I64_AS_F64: f64 = 9_223_372_036_854_775_808.0; // 2^63
const MIN_I64_AS_F64: f64 = -9_223_372_036_854_775_808.0; // -2^63
const MAX_U64_AS_F64: f64 = 18_446_744_073_709_551_616.0; // 2^64

fn cmp_int_uint(i: i64, u: u64) -> Ordering {
    if i < 0 {
        Ordering::Less
    } else {
        (i as u64).cmp(&u)
    }
}

fn cmp_int_double(i: i64, d: f64) -> Option<Ordering> {
    if d.is_nan() {
        return None;
    }
    if d >= MAX_I64_AS_F64 {
        return Some(Ordering::Less);
    }
    if d < MIN_I64_AS_F64 {
        return Some(Ordering::Greater);
    }
    // d now truncates into i64 range exactly.
    let trunc = d.trunc() as i64;
    Some(match i.cmp(&trunc) {
        Ordering::Equal => {
            let frac = d - d.trunc();
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    })
}

fn cmp_uint_double(u: u64, d: f64) -> Option<Ordering> {
    if d.is_nan() {
        return None;
    }
    if d >= MAX_U64_AS_F64 {
        return Some(Ordering::Less);
    }
    if d < 0.0 {
        return Some(Ordering::Greater);
    }
    let trunc = d.trunc() as u64;
    Some(match u.cmp(&trunc) {
        Ordering::Equal => {
            let frac = d - d.trunc();
            if frac > 0.0 {
                Ordering::Less
            } else if frac < 0.0 {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        }
        other => other,
    })
}

/// Compares two values, honoring cross-type numeric ordering.
pub fn compare_values(lhs: &Value, rhs: &Value) -> CompareOutcome {
    use CompareOutcome::*;
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Ordered(a.cmp(b)),
        (Value::Uint(a), Value::Uint(b)) => Ordered(a.cmp(b)),
        (Value::Double(a), Value::Double(b)) => match a.partial_cmp(b) {
            Some(ord) => Ordered(ord),
            None => Unordered,
        },
        (Value::Int(a), Value::Uint(b)) => Ordered(cmp_int_uint(*a, *b)),
        (Value::Uint(a), Value::Int(b)) => Ordered(cmp_int_uint(*b, *a).reverse()),
        (Value::Int(a), Value::Double(b)) => match cmp_int_double(*a, *b) {
            Some(ord) => Ordered(ord),
            None => Unordered,
        },
        (Value::Double(a), Value::Int(b)) => match cmp_int_double(*b, *a) {
            Some(ord) => Ordered(ord.reverse()),
            None => Unordered,
        },
        (Value::Uint(a), Value::Double(b)) => match cmp_uint_double(*a, *b) {
            Some(ord) => Ordered(ord),
            None => Unordered,
        },
        (Value::Double(a), Value::Uint(b)) => match cmp_uint_double(*b, *a) {
            Some(ord) => Ordered(ord.reverse()),
            None => Unordered,
        },
        (Value::Bool(a), Value::Bool(b)) => Ordered(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Ordered(a.cmp(b)),
        (Value::Bytes(a), Value::Bytes(b)) => Ordered(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Ordered(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Ordered(a.cmp(b)),
        _ => Incomparable,
    }
}

/// Language equality over concrete (non-terminal) values. Total: distinct
/// kinds are unequal rather than erroneous, NaN equals nothing.
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter().all(|(k, v)| {
                    b.get(&k.to_value())
                        .map(|other| values_equal(v, &other))
                        .unwrap_or(false)
                })
        }
        (Value::Object(a), Value::Object(b)) => a.equals(b),
        // Runtime type values are unparameterized: `type([1])` is `list`.
        (Value::Type(a), Value::Type(b)) => a.runtime_name() == b.runtime_name(),
        (Value::Optional(a), Value::Optional(b)) => match (a.as_option(), b.as_option()) {
            (None, None) => true,
            (Some(x), Some(y)) => values_equal(x, y),
            _ => false,
        },
        _ => matches!(
            compare_values(lhs, rhs),
            CompareOutcome::Ordered(Ordering::Equal)
        ),
    }
}
