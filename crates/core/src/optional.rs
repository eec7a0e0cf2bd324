//! Optional values: present-of-T or empty.

use crate::error::ErrorKind;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct OptionalValue {
    value: Option<Value>,
}

impl OptionalValue {
    pub fn of(value: Value) -> OptionalValue {
        OptionalValue { value: Some(value) }
    }

    pub fn none() -> OptionalValue {
        OptionalValue { value: None }
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn as_option(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Dereference; an empty optional is an error.
    pub fn value(&self) -> Value {
        match &self.value {
            Some(v) => v.clone(),
            None => Value::error(ErrorKind::Internal, "optional.none() dereference"),
        }
    }
}
