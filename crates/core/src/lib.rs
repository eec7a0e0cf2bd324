//! Core value and type system for the Verdict expression language.
//!
//! This crate owns the runtime data model: the [`Value`] sum type with its
//! trait-dispatched operators, checked arithmetic and conversions, the
//! checked [`Type`] terms, and the [`registry::TypeRegistry`] that adapts
//! host data into values.
//!
//! Values are immutable; every operation produces a new value. Failures are
//! in-band [`Value::Error`] variants and deferred attributes are
//! [`Value::Unknown`] sets, so the evaluator never unwinds for
//! language-defined conditions.

pub mod arith;
pub mod convert;
pub mod datetime;
pub mod error;
pub mod list;
pub mod map;
pub mod object;
pub mod optional;
pub mod ordering;
pub mod registry;
pub mod traits;
pub mod types;
pub mod unknown;
pub mod value;

pub use error::{ErrorKind, ErrorValue};
pub use list::ListValue;
pub use map::{MapKey, MapValue};
pub use object::ObjectValue;
pub use optional::OptionalValue;
pub use ordering::{compare_values, values_equal, CompareOutcome};
pub use registry::{FieldDescriptor, StructDescriptor, TypeRegistry};
pub use traits::Traits;
pub use types::{Kind, Type};
pub use unknown::{AttributeTrail, UnknownSet};
pub use value::{propagate2, propagate_all, Value};
