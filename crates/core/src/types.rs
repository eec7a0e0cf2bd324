//! Checked type terms.
//!
//! A [`Type`] describes a value shape to the checker and is itself a runtime
//! value (types are first-class). Parameterized shapes (`list(T)`,
//! `map(K, V)`, `optional_type(T)`) carry their parameters structurally;
//! assignability treats `dyn` as the top type and type parameters as
//! wildcards, with real unification living in the checker.

use std::fmt;
use std::sync::Arc;

/// The kind discriminator of a type term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Dyn,
    Any,
    Bool,
    Bytes,
    Double,
    Duration,
    Error,
    Int,
    List,
    Map,
    Null,
    Opaque,
    String,
    Struct,
    Timestamp,
    Type,
    TypeParam,
    Uint,
    Unknown,
}

/// A checked type term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Top type: assignable to and from everything.
    Dyn,
    /// Packed message payload; unwraps to its contents dynamically.
    Any,
    Bool,
    Bytes,
    Double,
    Duration,
    /// The type of error values. Participates in checking only as a result
    /// of invalid subexpressions.
    Error,
    Int,
    Null,
    String,
    Timestamp,
    Uint,
    /// The type of unknown values produced by partial evaluation.
    Unknown,
    /// The type of types. `type(int)` carries its subject.
    TypeOf(Option<Box<Type>>),
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// A host-registered message type, named by its fully-qualified name.
    Struct(Arc<str>),
    /// An abstract type with optional parameters, e.g. `optional_type(T)`.
    Opaque {
        name: Arc<str>,
        parameters: Vec<Type>,
    },
    /// An inference variable, unifiable with any type.
    TypeParam(Arc<str>),
    /// A nullable wrapper around a primitive: accepts the base type or null.
    Wrapper(Box<Type>),
}

pub const OPTIONAL_TYPE_NAME: &str = "optional_type";

impl Type {
    pub fn list(elem: Type) -> Type {
        Type::List(Box::new(elem))
    }

    pub fn map(key: Type, value: Type) -> Type {
        Type::Map(Box::new(key), Box::new(value))
    }

    pub fn strct(name: impl Into<Arc<str>>) -> Type {
        Type::Struct(name.into())
    }

    pub fn type_param(name: impl Into<Arc<str>>) -> Type {
        Type::TypeParam(name.into())
    }

    pub fn type_of(subject: Type) -> Type {
        Type::TypeOf(Some(Box::new(subject)))
    }

    pub fn wrapper(base: Type) -> Type {
        Type::Wrapper(Box::new(base))
    }

    pub fn optional(inner: Type) -> Type {
        Type::Opaque {
            name: Arc::from(OPTIONAL_TYPE_NAME),
            parameters: vec![inner],
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Type::Dyn => Kind::Dyn,
            Type::Any => Kind::Any,
            Type::Bool => Kind::Bool,
            Type::Bytes => Kind::Bytes,
            Type::Double => Kind::Double,
            Type::Duration => Kind::Duration,
            Type::Error => Kind::Error,
            Type::Int => Kind::Int,
            Type::Null => Kind::Null,
            Type::String => Kind::String,
            Type::Timestamp => Kind::Timestamp,
            Type::Uint => Kind::Uint,
            Type::Unknown => Kind::Unknown,
            Type::TypeOf(_) => Kind::Type,
            Type::List(_) => Kind::List,
            Type::Map(_, _) => Kind::Map,
            Type::Struct(_) => Kind::Struct,
            Type::Opaque { .. } => Kind::Opaque,
            Type::TypeParam(_) => Kind::TypeParam,
            Type::Wrapper(base) => base.kind(),
        }
    }

    /// The name reported by `type(x)` at runtime.
    pub fn runtime_name(&self) -> &str {
        match self {
            Type::Dyn => "dyn",
            Type::Any => "google.protobuf.Any",
            Type::Bool => "bool",
            Type::Bytes => "bytes",
            Type::Double => "double",
            Type::Duration => "google.protobuf.Duration",
            Type::Error => "error",
            Type::Int => "int",
            Type::Null => "null_type",
            Type::String => "string",
            Type::Timestamp => "google.protobuf.Timestamp",
            Type::Uint => "uint",
            Type::Unknown => "unknown",
            Type::TypeOf(_) => "type",
            Type::List(_) => "list",
            Type::Map(_, _) => "map",
            Type::Struct(name) => name,
            Type::Opaque { name, .. } => name,
            Type::TypeParam(name) => name,
            Type::Wrapper(base) => base.runtime_name(),
        }
    }

    /// Structural parameters of a parameterized type, empty otherwise.
    pub fn parameters(&self) -> Vec<&Type> {
        match self {
            Type::TypeOf(Some(subject)) => vec![subject],
            Type::List(elem) => vec![elem],
            Type::Map(key, value) => vec![key, value],
            Type::Opaque { parameters, .. } => parameters.iter().collect(),
            Type::Wrapper(base) => vec![base],
            _ => vec![],
        }
    }

    pub fn is_dyn(&self) -> bool {
        matches!(self, Type::Dyn | Type::Any)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Opaque { name, .. } if name.as_ref() == OPTIONAL_TYPE_NAME)
    }

    /// The `T` of `optional_type(T)`, if this is an optional type.
    pub fn optional_inner(&self) -> Option<&Type> {
        match self {
            Type::Opaque { name, parameters } if name.as_ref() == OPTIONAL_TYPE_NAME => {
                parameters.first()
            }
            _ => None,
        }
    }

    /// Whether a value of `source` may be used where `self` is expected.
    ///
    /// `dyn`/`any` are assignable in both directions; type parameters accept
    /// anything (the checker refines them through unification); a wrapper
    /// accepts its base type and null; message types are nullable.
    pub fn is_assignable(&self, source: &Type) -> bool {
        if self.is_dyn() || source.is_dyn() {
            return true;
        }
        if matches!(self, Type::TypeParam(_)) || matches!(source, Type::TypeParam(_)) {
            return true;
        }
        match (self, source) {
            (Type::Wrapper(base), _) => {
                matches!(source, Type::Null)
                    || base.is_assignable(source)
                    || matches!(source, Type::Wrapper(other) if base.is_assignable(other))
            }
            (_, Type::Wrapper(base)) => self.is_assignable(base),
            (Type::Struct(_), Type::Null) => true,
            (Type::Struct(a), Type::Struct(b)) => a == b,
            (Type::List(a), Type::List(b)) => a.is_assignable(b),
            (Type::Map(ka, va), Type::Map(kb, vb)) => ka.is_assignable(kb) && va.is_assignable(vb),
            (
                Type::Opaque {
                    name: na,
                    parameters: pa,
                },
                Type::Opaque {
                    name: nb,
                    parameters: pb,
                },
            ) => {
                na == nb
                    && pa.len() == pb.len()
                    && pa.iter().zip(pb.iter()).all(|(a, b)| a.is_assignable(b))
            }
            (Type::TypeOf(_), Type::TypeOf(_)) => true,
            _ => self.kind() == source.kind(),
        }
    }

    /// Whether two types are exactly equivalent modulo `dyn` parameters.
    pub fn is_equivalent(&self, other: &Type) -> bool {
        self == other || (self.is_dyn() && other.is_dyn())
    }
}

// The checker-facing rendering: parameterized types show their parameters,
// primitives their runtime names.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::List(elem) => write!(f, "list({elem})"),
            Type::Map(key, value) => write!(f, "map({key}, {value})"),
            Type::TypeOf(Some(subject)) => write!(f, "type({subject})"),
            Type::Wrapper(base) => write!(f, "wrapper({base})"),
            Type::Opaque { name, parameters } if !parameters.is_empty() => {
                write!(f, "{name}(")?;
                for (i, p) in parameters.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
            other => f.write_str(other.runtime_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dyn_is_top() {
        assert!(Type::Dyn.is_assignable(&Type::Int));
        assert!(Type::Int.is_assignable(&Type::Dyn));
        assert!(Type::list(Type::Dyn).is_assignable(&Type::list(Type::String)));
    }

    #[test]
    fn test_concrete_assignability_requires_matching_parameters() {
        assert!(Type::list(Type::Int).is_assignable(&Type::list(Type::Int)));
        assert!(!Type::list(Type::Int).is_assignable(&Type::list(Type::String)));
        assert!(!Type::Int.is_assignable(&Type::Uint));
    }

    #[test]
    fn test_wrapper_accepts_base_and_null() {
        let w = Type::wrapper(Type::Int);
        assert!(w.is_assignable(&Type::Int));
        assert!(w.is_assignable(&Type::Null));
        assert!(!w.is_assignable(&Type::String));
    }

    #[test]
    fn test_struct_is_nullable() {
        let msg = Type::strct("google.api.expr.Request");
        assert!(msg.is_assignable(&Type::Null));
        assert!(!msg.is_assignable(&Type::strct("other.Message")));
    }

    #[test]
    fn test_type_param_unifies_with_anything() {
        let param = Type::type_param("T");
        assert!(param.is_assignable(&Type::Int));
        assert!(Type::Int.is_assignable(&param));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Type::list(Type::Int).to_string(), "list(int)");
        assert_eq!(
            Type::map(Type::String, Type::Dyn).to_string(),
            "map(string, dyn)"
        );
        assert_eq!(Type::optional(Type::Int).to_string(), "optional_type(int)");
        assert_eq!(Type::Duration.to_string(), "google.protobuf.Duration");
    }

    #[test]
    fn test_optional_inner() {
        let opt = Type::optional(Type::String);
        assert!(opt.is_optional());
        assert_eq!(opt.optional_inner(), Some(&Type::String));
        assert_eq!(Type::Int.optional_inner(), None);
    }
}
