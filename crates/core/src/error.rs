//! Runtime error values.
//!
//! Evaluation never unwinds for language-defined conditions; failures are
//! first-class [`crate::Value::Error`] values that propagate through strict
//! operators and can be masked by short-circuit logic.

use std::fmt;

/// Classification of a runtime failure.
///
/// The set is closed: hosts observing an error can match on the kind without
/// parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NoSuchOverload,
    NoSuchKey,
    NoSuchField,
    NoSuchAttribute,
    UndeclaredReference,
    TypeConversion,
    Overflow,
    DivideByZero,
    ModulusByZero,
    Regex,
    CostLimitExceeded,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NoSuchOverload => "no_such_overload",
            ErrorKind::NoSuchKey => "no_such_key",
            ErrorKind::NoSuchField => "no_such_field",
            ErrorKind::NoSuchAttribute => "no_such_attribute",
            ErrorKind::UndeclaredReference => "undeclared_reference",
            ErrorKind::TypeConversion => "type_conversion_error",
            ErrorKind::Overflow => "overflow",
            ErrorKind::DivideByZero => "divide_by_zero",
            ErrorKind::ModulusByZero => "modulus_by_zero",
            ErrorKind::Regex => "regex_error",
            ErrorKind::CostLimitExceeded => "cost_limit_exceeded",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime error: a kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorValue {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ErrorValue {
            kind,
            message: message.into(),
        }
    }

    /// The uniform dispatch failure for an operator applied to operand types
    /// that advertise no matching capability.
    pub fn no_such_overload(op: &str, operands: &[&str]) -> Self {
        ErrorValue::new(
            ErrorKind::NoSuchOverload,
            format!("no such overload: {}({})", op, operands.join(", ")),
        )
    }

    pub fn overflow(op: &str) -> Self {
        ErrorValue::new(ErrorKind::Overflow, format!("{op}: integer overflow"))
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ErrorValue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        assert_eq!(ErrorKind::NoSuchOverload.as_str(), "no_such_overload");
        assert_eq!(ErrorKind::CostLimitExceeded.as_str(), "cost_limit_exceeded");
        assert_eq!(ErrorKind::TypeConversion.as_str(), "type_conversion_error");
    }

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = ErrorValue::new(ErrorKind::DivideByZero, "divide by zero");
        assert_eq!(err.to_string(), "divide_by_zero: divide by zero");
    }

    #[test]
    fn test_no_such_overload_formats_operands() {
        let err = ErrorValue::no_such_overload("_+_", &["bool", "string"]);
        assert_eq!(err.message, "no such overload: _+_(bool, string)");
    }
}
