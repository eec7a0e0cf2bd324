//! The type registry: host type registration and well-known adaptation.
//!
//! The registry maps between host data and values: it owns message
//! descriptors, resolves enum values to ints, constructs objects from field
//! assignments, and adapts the well-known interchange types (`Any`,
//! `Duration`, `Timestamp`, `Value`, `ListValue`, `Struct`, and the
//! wrappers) into their canonical runtime variants.
//!
//! A process-wide default registry is installed at most once; environments
//! extend it copy-on-write, so registration is additive and a child
//! environment never leaks types into its parent.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{ErrorKind, ErrorValue};
use crate::map::{MapKey, MapValue};
use crate::object::ObjectValue;
use crate::types::Type;
use crate::value::Value;

pub const ANY_TYPE: &str = "google.protobuf.Any";
pub const DURATION_TYPE: &str = "google.protobuf.Duration";
pub const TIMESTAMP_TYPE: &str = "google.protobuf.Timestamp";
pub const VALUE_TYPE: &str = "google.protobuf.Value";
pub const LIST_VALUE_TYPE: &str = "google.protobuf.ListValue";
pub const STRUCT_TYPE: &str = "google.protobuf.Struct";
pub const NULL_VALUE_TYPE: &str = "google.protobuf.NullValue";

const ANY_TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// A declared message field.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: Type,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: Type) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            ty,
        }
    }
}

/// A host-registered message type.
#[derive(Debug, Clone)]
pub struct StructDescriptor {
    name: String,
    fields: HashMap<String, FieldDescriptor>,
}

impl StructDescriptor {
    pub fn new(name: impl Into<String>) -> StructDescriptor {
        StructDescriptor {
            name: name.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> StructDescriptor {
        self.fields.insert(field.name.clone(), field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }
}

/// Process-wide type knowledge: message descriptors and enum values.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    structs: HashMap<String, Arc<StructDescriptor>>,
    enums: HashMap<String, i64>,
}

static GLOBAL: OnceLock<Arc<TypeRegistry>> = OnceLock::new();

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    /// Installs the process-wide default registry. Effective once; later
    /// calls report whether they won the race.
    pub fn install(registry: TypeRegistry) -> bool {
        GLOBAL.set(Arc::new(registry)).is_ok()
    }

    /// The process-wide default registry (empty unless installed).
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL
            .get_or_init(|| Arc::new(TypeRegistry::new()))
            .clone()
    }

    /// Copy-on-extend: the child is isolated from later parent use.
    pub fn extend(&self) -> TypeRegistry {
        self.clone()
    }

    pub fn register_struct(&mut self, descriptor: StructDescriptor) -> &mut Self {
        self.structs
            .insert(descriptor.name.clone(), Arc::new(descriptor));
        self
    }

    pub fn register_enum_value(&mut self, name: impl Into<String>, value: i64) -> &mut Self {
        self.enums.insert(name.into(), value);
        self
    }

    pub fn find_struct(&self, name: &str) -> Option<Arc<StructDescriptor>> {
        self.structs.get(name).cloned()
    }

    pub fn enum_value(&self, name: &str) -> Option<i64> {
        self.enums.get(name).copied()
    }

    /// Resolves a type name to its checked type: well-known names map per
    /// the interchange table, registered messages to struct types.
    pub fn find_type(&self, name: &str) -> Option<Type> {
        match name {
            ANY_TYPE => Some(Type::Any),
            DURATION_TYPE => Some(Type::Duration),
            TIMESTAMP_TYPE => Some(Type::Timestamp),
            VALUE_TYPE => Some(Type::Dyn),
            LIST_VALUE_TYPE => Some(Type::list(Type::Dyn)),
            STRUCT_TYPE => Some(Type::map(Type::String, Type::Dyn)),
            NULL_VALUE_TYPE => Some(Type::Null),
            "google.protobuf.BoolValue" => Some(Type::wrapper(Type::Bool)),
            "google.protobuf.BytesValue" => Some(Type::wrapper(Type::Bytes)),
            "google.protobuf.DoubleValue" | "google.protobuf.FloatValue" => {
                Some(Type::wrapper(Type::Double))
            }
            "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => {
                Some(Type::wrapper(Type::Int))
            }
            "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
                Some(Type::wrapper(Type::Uint))
            }
            "google.protobuf.StringValue" => Some(Type::wrapper(Type::String)),
            _ => self
                .structs
                .get(name)
                .map(|d| Type::strct(d.name.as_str())),
        }
    }

    /// The declared type of `type_name.field`, if both exist.
    pub fn find_field(&self, type_name: &str, field: &str) -> Option<FieldDescriptor> {
        self.structs
            .get(type_name)?
            .field(field)
            .cloned()
    }

    /// Constructs a value of the named type from field assignments. This is
    /// the `Type{field: value}` literal form: well-known types build their
    /// canonical variants, registered messages build objects with per-field
    /// type checking.
    pub fn new_value(&self, type_name: &str, fields: Vec<(String, Value)>) -> Value {
        match type_name {
            DURATION_TYPE => build_duration(fields),
            TIMESTAMP_TYPE => build_timestamp(fields),
            "google.protobuf.BoolValue" => build_wrapper(fields, &Type::Bool),
            "google.protobuf.BytesValue" => build_wrapper(fields, &Type::Bytes),
            "google.protobuf.DoubleValue" | "google.protobuf.FloatValue" => {
                build_wrapper(fields, &Type::Double)
            }
            "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => {
                build_wrapper(fields, &Type::Int)
            }
            "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
                build_wrapper(fields, &Type::Uint)
            }
            "google.protobuf.StringValue" => build_wrapper(fields, &Type::String),
            _ => {
                let Some(descriptor) = self.find_struct(type_name) else {
                    return Value::error(
                        ErrorKind::TypeConversion,
                        format!("unknown type: {type_name}"),
                    );
                };
                let mut assigned = HashMap::with_capacity(fields.len());
                for (name, value) in fields {
                    let Some(decl) = descriptor.field(&name) else {
                        return Value::error(
                            ErrorKind::NoSuchField,
                            format!("no such field: {type_name}.{name}"),
                        );
                    };
                    if value.is_terminal() {
                        return value;
                    }
                    if !decl.ty.is_assignable(&value.type_of()) {
                        return Value::error(
                            ErrorKind::TypeConversion,
                            format!(
                                "cannot assign {} to field {type_name}.{name} of type {}",
                                value.type_name(),
                                decl.ty
                            ),
                        );
                    }
                    assigned.insert(name, value);
                }
                Value::Object(Arc::new(ObjectValue::message(descriptor, assigned)))
            }
        }
    }

    /// Adapts dynamic JSON to a value, recognizing packed `Any` payloads
    /// (`{"@type": "type.googleapis.com/...", ...}`). The payload stays
    /// packed until first field access.
    pub fn json_to_value(self: &Arc<Self>, json: &serde_json::Value) -> Value {
        if let serde_json::Value::Object(entries) = json {
            if let Some(serde_json::Value::String(url)) = entries.get("@type") {
                let inner = url
                    .strip_prefix(ANY_TYPE_URL_PREFIX)
                    .unwrap_or(url.as_str())
                    .to_string();
                let mut payload = entries.clone();
                payload.remove("@type");
                return Value::Object(Arc::new(ObjectValue::packed(
                    inner,
                    Arc::clone(self),
                    serde_json::Value::Object(payload),
                )));
            }
        }
        Value::from_json(json)
    }

    /// Resolves a packed payload to a concrete object. Unregistered types
    /// are a conversion error, not a panic.
    pub fn unpack_any(&self, type_name: &str, payload: &serde_json::Value) -> Value {
        match type_name {
            DURATION_TYPE | TIMESTAMP_TYPE => {
                // These pack as {"value": "<string form>"}.
                let target = if type_name == DURATION_TYPE {
                    Type::Duration
                } else {
                    Type::Timestamp
                };
                match payload.get("value") {
                    Some(serde_json::Value::String(text)) => {
                        Value::string(text.as_str()).convert_to_type(&target)
                    }
                    _ => Value::error(
                        ErrorKind::TypeConversion,
                        format!("malformed packed {type_name}"),
                    ),
                }
            }
            _ => {
                let Some(descriptor) = self.find_struct(type_name) else {
                    return Value::error(
                        ErrorKind::TypeConversion,
                        format!("unknown packed type: {type_name}"),
                    );
                };
                let serde_json::Value::Object(entries) = payload else {
                    return Value::error(
                        ErrorKind::TypeConversion,
                        format!("malformed packed {type_name}"),
                    );
                };
                let mut fields = HashMap::with_capacity(entries.len());
                for (name, json) in entries {
                    let Some(decl) = descriptor.field(name) else {
                        return Value::error(
                            ErrorKind::NoSuchField,
                            format!("no such field: {type_name}.{name}"),
                        );
                    };
                    let value = adapt_json(json, &decl.ty);
                    if value.is_error() {
                        return value;
                    }
                    fields.insert(name.clone(), value);
                }
                Value::Object(Arc::new(ObjectValue::message(descriptor, fields)))
            }
        }
    }
}

fn take_field(fields: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let index = fields.iter().position(|(n, _)| n == name)?;
    Some(fields.remove(index).1)
}

fn expect_int(value: Option<Value>, default: i64) -> Result<i64, Value> {
    match value {
        None => Ok(default),
        Some(Value::Int(i)) => Ok(i),
        Some(other) => Err(Value::error(
            ErrorKind::TypeConversion,
            format!("expected int field, got {}", other.type_name()),
        )),
    }
}

fn build_duration(mut fields: Vec<(String, Value)>) -> Value {
    let seconds = match expect_int(take_field(&mut fields, "seconds"), 0) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let nanos = match expect_int(take_field(&mut fields, "nanos"), 0) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Some((name, _)) = fields.first() {
        return Value::error(
            ErrorKind::NoSuchField,
            format!("no such field: {DURATION_TYPE}.{name}"),
        );
    }
    Value::Duration(chrono::Duration::seconds(seconds) + chrono::Duration::nanoseconds(nanos))
}

fn build_timestamp(mut fields: Vec<(String, Value)>) -> Value {
    let seconds = match expect_int(take_field(&mut fields, "seconds"), 0) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let nanos = match expect_int(take_field(&mut fields, "nanos"), 0) {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Some((name, _)) = fields.first() {
        return Value::error(
            ErrorKind::NoSuchField,
            format!("no such field: {TIMESTAMP_TYPE}.{name}"),
        );
    }
    match chrono::DateTime::from_timestamp(seconds, nanos.clamp(0, 999_999_999) as u32) {
        Some(ts) => match crate::datetime::checked_timestamp(ts) {
            Ok(ts) => Value::Timestamp(ts),
            Err(e) => e.into(),
        },
        None => ErrorValue::overflow("timestamp").into(),
    }
}

fn build_wrapper(mut fields: Vec<(String, Value)>, base: &Type) -> Value {
    match take_field(&mut fields, "value") {
        Some(value) => value.convert_to_type(base),
        None => Value::zero_of(base),
    }
}

/// Adapts JSON to a declared type. This is the typed cousin of
/// [`Value::from_json`]: integers stay integral when the field says so.
pub fn adapt_json(json: &serde_json::Value, ty: &Type) -> Value {
    use serde_json::Value as Json;
    match (json, ty) {
        (_, Type::Dyn | Type::Any) => Value::from_json(json),
        (Json::Null, _) => Value::Null,
        (Json::Bool(b), Type::Bool) => Value::Bool(*b),
        (Json::Bool(_), Type::Wrapper(base)) => adapt_json(json, base),
        (Json::Number(n), Type::Int) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => mismatch(json, ty),
        },
        (Json::Number(n), Type::Uint) => match n.as_u64() {
            Some(u) => Value::Uint(u),
            None => mismatch(json, ty),
        },
        (Json::Number(n), Type::Double) => match n.as_f64() {
            Some(d) => Value::Double(d),
            None => mismatch(json, ty),
        },
        (Json::Number(_), Type::Wrapper(base)) => adapt_json(json, base),
        (Json::String(s), Type::String) => Value::string(s.as_str()),
        (Json::String(s), Type::Bytes) => match BASE64.decode(s.as_bytes()) {
            Ok(bytes) => Value::bytes(bytes),
            Err(_) => mismatch(json, ty),
        },
        (Json::String(s), Type::Duration) => {
            Value::string(s.as_str()).convert_to_type(&Type::Duration)
        }
        (Json::String(s), Type::Timestamp) => {
            Value::string(s.as_str()).convert_to_type(&Type::Timestamp)
        }
        (Json::String(_), Type::Wrapper(base)) => adapt_json(json, base),
        (Json::Array(items), Type::List(elem)) => {
            let mut elems = Vec::with_capacity(items.len());
            for item in items {
                let v = adapt_json(item, elem);
                if v.is_error() {
                    return v;
                }
                elems.push(v);
            }
            Value::list(elems)
        }
        (Json::Object(entries), Type::Map(_, value_ty)) => {
            let mut keyed = HashMap::with_capacity(entries.len());
            for (k, v) in entries {
                let adapted = adapt_json(v, value_ty);
                if adapted.is_error() {
                    return adapted;
                }
                keyed.insert(MapKey::String(k.as_str().into()), adapted);
            }
            Value::Map(Arc::new(MapValue::from_keyed_entries(keyed)))
        }
        _ => mismatch(json, ty),
    }
}

fn mismatch(json: &serde_json::Value, ty: &Type) -> Value {
    Value::error(
        ErrorKind::TypeConversion,
        format!("cannot adapt {json} as {ty}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn registry() -> Arc<TypeRegistry> {
        let mut reg = TypeRegistry::new();
        reg.register_struct(
            StructDescriptor::new("test.Claims")
                .with_field(FieldDescriptor::new("email", Type::String))
                .with_field(FieldDescriptor::new("age", Type::Int)),
        );
        reg.register_enum_value("test.Color.RED", 0);
        reg.register_enum_value("test.Color.BLUE", 2);
        Arc::new(reg)
    }

    #[test]
    fn test_well_known_type_mappings() {
        let reg = TypeRegistry::new();
        assert_eq!(reg.find_type(ANY_TYPE), Some(Type::Any));
        assert_eq!(reg.find_type(VALUE_TYPE), Some(Type::Dyn));
        assert_eq!(
            reg.find_type(STRUCT_TYPE),
            Some(Type::map(Type::String, Type::Dyn))
        );
        assert_eq!(
            reg.find_type("google.protobuf.Int64Value"),
            Some(Type::wrapper(Type::Int))
        );
        assert_eq!(reg.find_type("no.such.Type"), None);
    }

    #[test]
    fn test_enum_values_resolve_to_int() {
        let reg = registry();
        assert_eq!(reg.enum_value("test.Color.BLUE"), Some(2));
        assert_eq!(reg.enum_value("test.Color.GREEN"), None);
    }

    #[test]
    fn test_new_value_checks_fields() {
        let reg = registry();
        let ok = reg.new_value(
            "test.Claims",
            vec![("email".to_string(), Value::string("a@b.co"))],
        );
        match &ok {
            Value::Object(obj) => {
                assert_eq!(obj.get_field("email"), Value::string("a@b.co"));
                assert_eq!(obj.get_field("age"), Value::Int(0));
            }
            other => panic!("expected object, got {other}"),
        }

        let bad_field = reg.new_value("test.Claims", vec![("nope".to_string(), Value::Int(1))]);
        assert!(bad_field.is_error());

        let bad_type = reg.new_value(
            "test.Claims",
            vec![("age".to_string(), Value::string("old"))],
        );
        assert!(bad_type.is_error());
    }

    #[test]
    fn test_duration_and_wrapper_construction() {
        let reg = TypeRegistry::new();
        assert_eq!(
            reg.new_value(
                DURATION_TYPE,
                vec![("seconds".to_string(), Value::Int(90))]
            ),
            Value::Duration(chrono::Duration::seconds(90))
        );
        assert_eq!(
            reg.new_value(
                "google.protobuf.Int64Value",
                vec![("value".to_string(), Value::Int(9))]
            ),
            Value::Int(9)
        );
    }

    #[test]
    fn test_any_unwraps_lazily_and_reports_unregistered() {
        let reg = registry();
        let packed = reg.json_to_value(&serde_json::json!({
            "@type": "type.googleapis.com/test.Claims",
            "email": "x@y.z",
            "age": 3,
        }));
        match &packed {
            Value::Object(obj) => {
                assert_eq!(obj.type_name(), "test.Claims");
                assert_eq!(obj.get_field("age"), Value::Int(3));
            }
            other => panic!("expected object, got {other}"),
        }

        let unknown = reg.json_to_value(&serde_json::json!({
            "@type": "type.googleapis.com/not.Registered",
            "x": 1,
        }));
        match &unknown {
            Value::Object(obj) => match obj.get_field("x") {
                Value::Error(e) => assert_eq!(e.kind, ErrorKind::TypeConversion),
                other => panic!("expected conversion error, got {other}"),
            },
            other => panic!("expected packed object, got {other}"),
        }
    }

    #[test]
    #[serial]
    fn test_global_registry_is_init_once() {
        let first = TypeRegistry::global();
        // A second install cannot replace the existing registry.
        TypeRegistry::install(TypeRegistry::new());
        assert!(Arc::ptr_eq(&first, &TypeRegistry::global()));
    }
}
