//! Binding environments.
//!
//! An activation resolves root variable names to values. Activations layer:
//! a child consults itself first and falls back to its parent, and a partial
//! activation adds unknown-attribute patterns that turn matching resolutions
//! into unknowns instead of errors.

use std::collections::HashMap;

use verdict_core::unknown::AttributeTrail;
use verdict_core::value::Value;

use crate::functions::FunctionOverload;

/// A name-to-value binding environment.
pub trait Activation: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Value>;

    /// Attribute patterns declared unknown for this evaluation.
    fn unknown_patterns(&self) -> &[AttributeTrail] {
        &[]
    }

    /// Late-binding hook: an overload to use in place of the statically
    /// planned one for the named function.
    fn function_override(&self, _function: &str) -> Option<&FunctionOverload> {
        None
    }
}

/// The empty activation.
#[derive(Debug, Default)]
pub struct EmptyActivation;

impl Activation for EmptyActivation {
    fn resolve(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// A flat `name -> value` activation.
#[derive(Debug, Default)]
pub struct MapActivation {
    bindings: HashMap<String, Value>,
}

impl MapActivation {
    pub fn new() -> MapActivation {
        MapActivation::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> MapActivation {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }
}

impl Activation for MapActivation {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }
}

impl<const N: usize> From<[(&str, Value); N]> for MapActivation {
    fn from(bindings: [(&str, Value); N]) -> MapActivation {
        let mut activation = MapActivation::new();
        for (name, value) in bindings {
            activation.insert(name, value);
        }
        activation
    }
}

/// A parent-chained activation; the child shadows the parent.
pub struct HierarchicalActivation<'a> {
    parent: &'a dyn Activation,
    child: &'a dyn Activation,
}

impl<'a> HierarchicalActivation<'a> {
    pub fn new(
        parent: &'a dyn Activation,
        child: &'a dyn Activation,
    ) -> HierarchicalActivation<'a> {
        HierarchicalActivation { parent, child }
    }
}

impl Activation for HierarchicalActivation<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.child
            .resolve(name)
            .or_else(|| self.parent.resolve(name))
    }

    fn unknown_patterns(&self) -> &[AttributeTrail] {
        let child = self.child.unknown_patterns();
        if child.is_empty() {
            self.parent.unknown_patterns()
        } else {
            child
        }
    }

    fn function_override(&self, function: &str) -> Option<&FunctionOverload> {
        self.child
            .function_override(function)
            .or_else(|| self.parent.function_override(function))
    }
}

/// An activation with unknown-attribute patterns for partial evaluation.
pub struct PartialActivation<A> {
    inner: A,
    patterns: Vec<AttributeTrail>,
}

impl<A: Activation> PartialActivation<A> {
    pub fn new(inner: A, patterns: Vec<AttributeTrail>) -> PartialActivation<A> {
        PartialActivation { inner, patterns }
    }
}

impl<A: Activation> Activation for PartialActivation<A> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.inner.resolve(name)
    }

    fn unknown_patterns(&self) -> &[AttributeTrail] {
        &self.patterns
    }

    fn function_override(&self, function: &str) -> Option<&FunctionOverload> {
        self.inner.function_override(function)
    }
}

/// An activation that carries function overrides for late binding.
pub struct DispatchActivation<A> {
    inner: A,
    overrides: HashMap<String, FunctionOverload>,
}

impl<A: Activation> DispatchActivation<A> {
    pub fn new(inner: A) -> DispatchActivation<A> {
        DispatchActivation {
            inner,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(
        mut self,
        function: impl Into<String>,
        overload: FunctionOverload,
    ) -> DispatchActivation<A> {
        self.overrides.insert(function.into(), overload);
        self
    }
}

impl<A: Activation> Activation for DispatchActivation<A> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.inner.resolve(name)
    }

    fn unknown_patterns(&self) -> &[AttributeTrail] {
        self.inner.unknown_patterns()
    }

    fn function_override(&self, function: &str) -> Option<&FunctionOverload> {
        self.overrides
            .get(function)
            .or_else(|| self.inner.function_override(function))
    }
}

/// Builds a partial activation from `(name, value)` bindings and dotted
/// unknown patterns such as `"request.auth.claims.email"`.
pub fn partial_activation(
    bindings: Vec<(&str, Value)>,
    unknown: &[&str],
) -> PartialActivation<MapActivation> {
    let mut activation = MapActivation::new();
    for (name, value) in bindings {
        activation.insert(name, value);
    }
    PartialActivation::new(activation, unknown.iter().map(|p| parse_pattern(p)).collect())
}

/// Parses a dotted attribute pattern.
pub fn parse_pattern(pattern: &str) -> AttributeTrail {
    let mut parts = pattern.split('.');
    let variable = parts.next().unwrap_or(pattern);
    let mut trail = AttributeTrail::new(variable);
    for part in parts {
        trail = trail.qualified(verdict_core::map::MapKey::String(part.into()));
    }
    trail
}
