//! Type conversions and JSON interchange.
//!
//! `convert_to_type` implements the language's conversion functions
//! (`int(x)`, `string(x)`, ...): lossless moves succeed, range violations
//! report `overflow`, unparseable text reports `type_conversion_error`.
//! The JSON mappings follow the well-known-type conventions: bytes encode
//! as base64, timestamps and durations as their string forms.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::datetime;
use crate::error::{ErrorKind, ErrorValue};
use crate::map::MapKey;
use crate::types::{Kind, Type};
use crate::value::Value;

const MAX_I64_AS_F64: f64 = 9_223_372_036_854_775_808.0; // 2^63
const MIN_I64_AS_F64: f64 = -9_223_372_036_854_775_808.0; // -2^63
const MAX_U64_AS_F64: f64 = 18_446_744_073_709_551_616.0; // 2^64

fn conversion_error(value: &Value, target: &Type) -> Value {
    Value::error(
        ErrorKind::TypeConversion,
        format!(
            "type conversion error from '{}' to '{}'",
            value.type_name(),
            target
        ),
    )
}

fn double_to_int(d: f64) -> Result<i64, ErrorValue> {
    if d.is_nan() || d.is_infinite() {
        return Err(ErrorValue::overflow("int"));
    }
    let trunc = d.trunc();
    if trunc >= MAX_I64_AS_F64 || trunc < MIN_I64_AS_F64 {
        return Err(ErrorValue::overflow("int"));
    }
    Ok(trunc as i64)
}

fn double_to_uint(d: f64) -> Result<u64, ErrorValue> {
    if d.is_nan() || d.is_infinite() {
        return Err(ErrorValue::overflow("uint"));
    }
    let trunc = d.trunc();
    if trunc >= MAX_U64_AS_F64 || trunc < 0.0 {
        return Err(ErrorValue::overflow("uint"));
    }
    Ok(trunc as u64)
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

impl Value {
    /// Converts this value to the target type, or reports why it cannot.
    /// Converting a value to its own type is the identity.
    pub fn convert_to_type(&self, target: &Type) -> Value {
        if self.is_terminal() {
            return self.clone();
        }
        match target {
            Type::Dyn | Type::Any => return self.clone(),
            Type::TypeOf(_) => return Value::Type(self.type_of()),
            // A wrapper target behaves as its base; null stays null.
            Type::Wrapper(base) => {
                if matches!(self, Value::Null) {
                    return Value::Null;
                }
                return self.convert_to_type(base);
            }
            _ => {}
        }
        match (self, target.kind()) {
            (Value::Int(i), Kind::Int) => Value::Int(*i),
            (Value::Uint(u), Kind::Int) => {
                if *u > i64::MAX as u64 {
                    ErrorValue::overflow("int").into()
                } else {
                    Value::Int(*u as i64)
                }
            }
            (Value::Double(d), Kind::Int) => match double_to_int(*d) {
                Ok(i) => Value::Int(i),
                Err(e) => e.into(),
            },
            (Value::String(s), Kind::Int) => match s.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => conversion_error(self, target),
            },
            (Value::Timestamp(t), Kind::Int) => Value::Int(t.timestamp()),

            (Value::Uint(u), Kind::Uint) => Value::Uint(*u),
            (Value::Int(i), Kind::Uint) => {
                if *i < 0 {
                    ErrorValue::overflow("uint").into()
                } else {
                    Value::Uint(*i as u64)
                }
            }
            (Value::Double(d), Kind::Uint) => match double_to_uint(*d) {
                Ok(u) => Value::Uint(u),
                Err(e) => e.into(),
            },
            (Value::String(s), Kind::Uint) => match s.parse::<u64>() {
                Ok(u) => Value::Uint(u),
                Err(_) => conversion_error(self, target),
            },

            (Value::Double(d), Kind::Double) => Value::Double(*d),
            (Value::Int(i), Kind::Double) => Value::Double(*i as f64),
            (Value::Uint(u), Kind::Double) => Value::Double(*u as f64),
            (Value::String(s), Kind::Double) => match s.parse::<f64>() {
                Ok(d) => Value::Double(d),
                Err(_) => conversion_error(self, target),
            },

            (Value::Bool(b), Kind::Bool) => Value::Bool(*b),
            (Value::String(s), Kind::Bool) => match parse_bool(s) {
                Some(b) => Value::Bool(b),
                None => conversion_error(self, target),
            },

            (Value::String(s), Kind::String) => Value::String(s.clone()),
            (Value::Int(i), Kind::String) => Value::string(i.to_string()),
            (Value::Uint(u), Kind::String) => Value::string(u.to_string()),
            (Value::Double(d), Kind::String) => Value::string(format_double(*d)),
            (Value::Bool(b), Kind::String) => Value::string(b.to_string()),
            (Value::Bytes(b), Kind::String) => match std::str::from_utf8(b) {
                Ok(s) => Value::string(s),
                Err(_) => Value::error(
                    ErrorKind::TypeConversion,
                    "invalid UTF-8 in bytes, cannot convert to string",
                ),
            },
            (Value::Duration(d), Kind::String) => Value::string(datetime::format_duration(d)),
            (Value::Timestamp(t), Kind::String) => Value::string(datetime::format_timestamp(t)),

            (Value::Bytes(b), Kind::Bytes) => Value::Bytes(b.clone()),
            (Value::String(s), Kind::Bytes) => Value::bytes(s.as_bytes().to_vec()),

            (Value::Duration(d), Kind::Duration) => Value::Duration(*d),
            (Value::String(s), Kind::Duration) => match datetime::parse_duration(s) {
                Ok(d) => Value::Duration(d),
                Err(e) => e.into(),
            },

            (Value::Timestamp(t), Kind::Timestamp) => Value::Timestamp(*t),
            (Value::String(s), Kind::Timestamp) => match datetime::parse_timestamp(s) {
                Ok(t) => Value::Timestamp(t),
                Err(e) => e.into(),
            },
            (Value::Int(i), Kind::Timestamp) => {
                match chrono::DateTime::from_timestamp(*i, 0) {
                    Some(t) => match datetime::checked_timestamp(t) {
                        Ok(t) => Value::Timestamp(t),
                        Err(e) => e.into(),
                    },
                    None => ErrorValue::overflow("timestamp").into(),
                }
            }

            (Value::Null, Kind::Null) => Value::Null,
            (Value::List(_), Kind::List) => self.clone(),
            (Value::Map(_), Kind::Map) => self.clone(),
            (Value::Object(obj), Kind::Struct) if obj.type_name() == target.runtime_name() => {
                self.clone()
            }
            (Value::Optional(_), Kind::Opaque) if target.is_optional() => self.clone(),
            (Value::Type(_), Kind::Type) => self.clone(),

            _ => conversion_error(self, target),
        }
    }

    /// Adapts dynamic JSON into a value with well-known-type semantics:
    /// numbers become doubles, objects become maps, arrays become lists.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(d) => Value::Double(d),
                None => Value::error(
                    ErrorKind::TypeConversion,
                    format!("unsupported JSON number: {n}"),
                ),
            },
            serde_json::Value::String(s) => Value::string(s.as_str()),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => {
                let keyed = entries
                    .iter()
                    .map(|(k, v)| (MapKey::String(k.as_str().into()), Value::from_json(v)))
                    .collect();
                Value::Map(std::sync::Arc::new(crate::map::MapValue::from_keyed_entries(
                    keyed,
                )))
            }
        }
    }

    /// Converts to JSON. Errors and unknowns do not serialize; neither do
    /// non-finite doubles.
    pub fn to_json(&self) -> Result<serde_json::Value, ErrorValue> {
        use serde_json::Value as Json;
        Ok(match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Uint(u) => Json::from(*u),
            Value::Double(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .ok_or_else(|| {
                    ErrorValue::new(
                        ErrorKind::TypeConversion,
                        format!("{d} has no JSON representation"),
                    )
                })?,
            Value::String(s) => Json::String(s.to_string()),
            Value::Bytes(b) => Json::String(BASE64.encode(b)),
            Value::Duration(d) => Json::String(datetime::format_duration(d)),
            Value::Timestamp(t) => Json::String(datetime::format_timestamp(t)),
            Value::List(l) => Json::Array(
                l.iter()
                    .map(|v| v.to_json())
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Map(m) => {
                let mut obj = serde_json::Map::with_capacity(m.len());
                for (k, v) in m.iter() {
                    // Map keys encode as strings, matching the proto JSON
                    // convention for non-string keys.
                    let key = match k {
                        MapKey::String(s) => s.to_string(),
                        other => other.to_value().convert_to_type(&Type::String).to_string(),
                    };
                    obj.insert(key, v.to_json()?);
                }
                Json::Object(obj)
            }
            Value::Object(o) => o.to_json()?,
            Value::Type(t) => Json::String(t.runtime_name().to_string()),
            Value::Optional(opt) => match opt.as_option() {
                Some(v) => v.to_json()?,
                None => Json::Null,
            },
            Value::Error(e) => return Err(e.as_ref().clone()),
            Value::Unknown(u) => {
                return Err(ErrorValue::new(
                    ErrorKind::Internal,
                    format!("cannot serialize {u}"),
                ));
            }
        })
    }
}

/// Minimal round-trip rendering of a double.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "+Inf".to_string() } else { "-Inf".to_string() }
    } else {
        format!("{d}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_conversion() {
        for (v, ty) in [
            (Value::Int(3), Type::Int),
            (Value::Uint(3), Type::Uint),
            (Value::string("x"), Type::String),
            (Value::Bool(true), Type::Bool),
        ] {
            assert_eq!(v.convert_to_type(&ty), v);
        }
    }

    #[test]
    fn test_int_uint_range_checks() {
        assert_eq!(
            Value::Uint(42).convert_to_type(&Type::Int),
            Value::Int(42)
        );
        assert!(Value::Uint(u64::MAX).convert_to_type(&Type::Int).is_error());
        assert!(Value::Int(-1).convert_to_type(&Type::Uint).is_error());
    }

    #[test]
    fn test_double_to_int_truncates_toward_zero() {
        assert_eq!(
            Value::Double(-2.9).convert_to_type(&Type::Int),
            Value::Int(-2)
        );
        assert_eq!(
            Value::Double(2.9).convert_to_type(&Type::Uint),
            Value::Uint(2)
        );
    }

    #[test]
    fn test_double_to_int_overflow_cases() {
        for d in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300] {
            let converted = Value::Double(d).convert_to_type(&Type::Int);
            match converted {
                Value::Error(e) => assert_eq!(e.kind, ErrorKind::Overflow),
                other => panic!("expected overflow for {d}, got {other}"),
            }
        }
    }

    #[test]
    fn test_string_parsing() {
        assert_eq!(
            Value::string("-42").convert_to_type(&Type::Int),
            Value::Int(-42)
        );
        assert_eq!(
            Value::string("2.5").convert_to_type(&Type::Double),
            Value::Double(2.5)
        );
        assert_eq!(
            Value::string("true").convert_to_type(&Type::Bool),
            Value::Bool(true)
        );
        assert!(Value::string("nope").convert_to_type(&Type::Int).is_error());
    }

    #[test]
    fn test_double_to_string_is_minimal() {
        assert_eq!(
            Value::Double(2.5).convert_to_type(&Type::String),
            Value::string("2.5")
        );
        assert_eq!(
            Value::Double(5.0).convert_to_type(&Type::String),
            Value::string("5")
        );
    }

    #[test]
    fn test_bytes_string_round_trip() {
        let s = Value::string("héllo");
        let b = s.convert_to_type(&Type::Bytes);
        assert_eq!(b.convert_to_type(&Type::String), s);

        let bad = Value::bytes(vec![0xff, 0xfe]);
        assert!(bad.convert_to_type(&Type::String).is_error());
    }

    #[test]
    fn test_timestamp_string_round_trip() {
        let t = Value::string("2023-06-15T01:02:03.000000004Z")
            .convert_to_type(&Type::Timestamp);
        assert!(matches!(t, Value::Timestamp(_)));
        assert_eq!(
            t.convert_to_type(&Type::String),
            Value::string("2023-06-15T01:02:03.000000004Z")
        );
    }

    #[test]
    fn test_duration_string_round_trip() {
        let d = Value::string("90s").convert_to_type(&Type::Duration);
        assert_eq!(d, Value::Duration(chrono::Duration::seconds(90)));
        assert_eq!(d.convert_to_type(&Type::String), Value::string("90s"));
    }

    #[test]
    fn test_convert_to_type_type() {
        assert_eq!(
            Value::Int(1).convert_to_type(&Type::TypeOf(None)),
            Value::Type(Type::Int)
        );
    }

    #[test]
    fn test_json_round_trip() {
        let v = Value::map(vec![
            (Value::string("xs"), Value::list(vec![Value::Int(1)])),
            (Value::string("ok"), Value::Bool(true)),
        ]);
        let json = v.to_json().unwrap();
        assert_eq!(json["xs"][0], serde_json::json!(1));
        assert_eq!(json["ok"], serde_json::json!(true));
    }

    #[test]
    fn test_from_json_uses_wkt_semantics() {
        let v = Value::from_json(&serde_json::json!({"n": 1, "s": "x"}));
        match &v {
            Value::Map(m) => {
                assert_eq!(m.get(&Value::string("n")), Some(Value::Double(1.0)));
                assert_eq!(m.get(&Value::string("s")), Some(Value::string("x")));
            }
            other => panic!("expected map, got {other}"),
        }
    }
}
