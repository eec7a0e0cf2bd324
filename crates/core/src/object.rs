//! Message-shaped record values.
//!
//! Objects carry a pointer to their descriptor for field typing. Unset
//! fields read as the zero value of their declared type; undeclared fields
//! are `no_such_field`. Packed payloads (`Any`) resolve against a registry
//! on first access.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{ErrorKind, ErrorValue};
use crate::registry::{StructDescriptor, TypeRegistry};
use crate::value::Value;

#[derive(Debug)]
pub struct ObjectValue {
    type_name: Arc<str>,
    repr: Repr,
}

#[derive(Debug)]
enum Repr {
    Message {
        descriptor: Arc<StructDescriptor>,
        fields: HashMap<String, Value>,
    },
    /// An `Any` payload not yet resolved to a registered type.
    Packed {
        registry: Arc<TypeRegistry>,
        payload: serde_json::Value,
        resolved: OnceLock<Value>,
    },
}

impl ObjectValue {
    pub fn message(
        descriptor: Arc<StructDescriptor>,
        fields: HashMap<String, Value>,
    ) -> ObjectValue {
        ObjectValue {
            type_name: descriptor.name().into(),
            repr: Repr::Message { descriptor, fields },
        }
    }

    pub fn packed(
        type_name: impl Into<Arc<str>>,
        registry: Arc<TypeRegistry>,
        payload: serde_json::Value,
    ) -> ObjectValue {
        ObjectValue {
            type_name: type_name.into(),
            repr: Repr::Packed {
                registry,
                payload,
                resolved: OnceLock::new(),
            },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// The resolved form of a packed payload, unwrapping at most once.
    fn resolve(&self) -> Option<&Value> {
        match &self.repr {
            Repr::Message { .. } => None,
            Repr::Packed {
                registry,
                payload,
                resolved,
            } => Some(resolved.get_or_init(|| registry.unpack_any(&self.type_name, payload))),
        }
    }

    pub fn get_field(&self, field: &str) -> Value {
        match &self.repr {
            Repr::Message { descriptor, fields } => match fields.get(field) {
                Some(v) => v.clone(),
                None => match descriptor.field(field) {
                    Some(decl) => Value::zero_of(&decl.ty),
                    None => no_such_field(&self.type_name, field),
                },
            },
            Repr::Packed { .. } => match self.resolve() {
                Some(Value::Object(obj)) => obj.get_field(field),
                Some(Value::Error(e)) => Value::Error(Arc::clone(e)),
                _ => no_such_field(&self.type_name, field),
            },
        }
    }

    /// Presence test: set and non-default for scalars, non-empty for
    /// aggregates.
    pub fn has_field(&self, field: &str) -> Value {
        match &self.repr {
            Repr::Message { descriptor, fields } => {
                let Some(decl) = descriptor.field(field) else {
                    return no_such_field(&self.type_name, field);
                };
                let present = fields
                    .get(field)
                    .map(|v| *v != Value::zero_of(&decl.ty))
                    .unwrap_or(false);
                Value::Bool(present)
            }
            Repr::Packed { .. } => match self.resolve() {
                Some(Value::Object(obj)) => obj.has_field(field),
                Some(Value::Error(e)) => Value::Error(Arc::clone(e)),
                _ => no_such_field(&self.type_name, field),
            },
        }
    }

    pub fn equals(&self, other: &ObjectValue) -> bool {
        if self.type_name != other.type_name {
            return false;
        }
        match (&self.repr, &other.repr) {
            (
                Repr::Message {
                    descriptor, fields, ..
                },
                Repr::Message { fields: others, .. },
            ) => descriptor.fields().all(|decl| {
                let zero = Value::zero_of(&decl.ty);
                let a = fields.get(&decl.name).unwrap_or(&zero);
                let b = others.get(&decl.name).unwrap_or(&zero);
                crate::ordering::values_equal(a, b)
            }),
            _ => false,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, ErrorValue> {
        match &self.repr {
            Repr::Message { fields, .. } => {
                let mut obj = serde_json::Map::with_capacity(fields.len());
                for (name, value) in fields {
                    obj.insert(name.clone(), value.to_json()?);
                }
                Ok(serde_json::Value::Object(obj))
            }
            Repr::Packed { payload, .. } => Ok(payload.clone()),
        }
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &ObjectValue) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{...}}", self.type_name)
    }
}

fn no_such_field(type_name: &str, field: &str) -> Value {
    Value::error(
        ErrorKind::NoSuchField,
        format!("no such field: {type_name}.{field}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldDescriptor;
    use crate::types::Type;

    fn descriptor() -> Arc<StructDescriptor> {
        Arc::new(
            StructDescriptor::new("test.Account")
                .with_field(FieldDescriptor::new("owner", Type::String))
                .with_field(FieldDescriptor::new("balance", Type::Int))
                .with_field(FieldDescriptor::new("tags", Type::list(Type::String))),
        )
    }

    #[test]
    fn test_set_and_unset_fields() {
        let obj = ObjectValue::message(
            descriptor(),
            HashMap::from([("owner".to_string(), Value::string("ada"))]),
        );
        assert_eq!(obj.get_field("owner"), Value::string("ada"));
        // Unset declared fields read as zero values.
        assert_eq!(obj.get_field("balance"), Value::Int(0));
        assert_eq!(obj.get_field("tags"), Value::list(vec![]));
        assert!(obj.get_field("missing").is_error());
    }

    #[test]
    fn test_presence_semantics() {
        let obj = ObjectValue::message(
            descriptor(),
            HashMap::from([
                ("owner".to_string(), Value::string("ada")),
                ("balance".to_string(), Value::Int(0)),
            ]),
        );
        assert_eq!(obj.has_field("owner"), Value::Bool(true));
        // Scalar set to its zero value reads as absent.
        assert_eq!(obj.has_field("balance"), Value::Bool(false));
        assert_eq!(obj.has_field("tags"), Value::Bool(false));
        assert!(obj.has_field("missing").is_error());
    }

    #[test]
    fn test_equality_treats_zero_as_unset() {
        let a = ObjectValue::message(
            descriptor(),
            HashMap::from([("balance".to_string(), Value::Int(0))]),
        );
        let b = ObjectValue::message(descriptor(), HashMap::new());
        assert!(a.equals(&b));
    }
}
