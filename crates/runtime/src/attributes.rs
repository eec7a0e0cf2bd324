//! Qualified attribute resolution.
//!
//! An attribute is a root variable plus a trail of qualifiers (fields and
//! indexes). Resolution consults the activation's unknown patterns before
//! its bindings, so a declared-unknown attribute yields an unknown value
//! even when a binding happens to be present. Missing variables are
//! `no_such_attribute`; missing keys and fields keep their specific kinds.

use verdict_compiler::ast::ExprId;
use verdict_core::error::ErrorKind;
use verdict_core::map::MapKey;
use verdict_core::unknown::{AttributeTrail, UnknownSet};
use verdict_core::value::Value;

use crate::activation::Activation;
use crate::cost::CostKind;
use crate::interpretable::{qualify_value, EvalSession, Interpretable};

/// One qualification step: a constant key or a computed index expression.
pub enum Qualifier {
    Const(MapKey),
    Computed(Box<dyn Interpretable>),
}

/// An evaluable attribute reference. `candidates` lists the qualified
/// names to try, most qualified first (one entry when the checker resolved
/// the reference).
pub struct AttributeNode {
    pub id: ExprId,
    pub candidates: Vec<String>,
    pub qualifiers: Vec<Qualifier>,
}

impl AttributeNode {
    /// Whether the two trails agree on their shared prefix. A pattern
    /// covering `request.auth` makes both `request.auth` and
    /// `request.auth.claims.email` unknown, and a reference to
    /// `request.auth` is unknown when any deeper pattern exists under it.
    fn overlaps(pattern: &AttributeTrail, trail: &AttributeTrail) -> bool {
        if pattern.variable != trail.variable {
            return false;
        }
        pattern
            .qualifiers
            .iter()
            .zip(trail.qualifiers.iter())
            .all(|(a, b)| a == b)
    }
}

impl Interpretable for AttributeNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        if let Err(err) = session
            .cost
            .charge(CostKind::Attribute(1 + self.qualifiers.len() as u64))
        {
            return err.into();
        }
        // Computed qualifiers evaluate first, left to right.
        let mut keys = Vec::with_capacity(self.qualifiers.len());
        for qualifier in &self.qualifiers {
            match qualifier {
                Qualifier::Const(key) => keys.push(key.clone()),
                Qualifier::Computed(node) => {
                    let value = node.eval(vars, session);
                    if value.is_terminal() {
                        return value;
                    }
                    match MapKey::from_value(&value) {
                        Ok(key) => keys.push(key),
                        Err(type_name) => {
                            return Value::error(
                                ErrorKind::NoSuchOverload,
                                format!("no such overload: _[_]({type_name})"),
                            );
                        }
                    }
                }
            }
        }
        let patterns = vars.unknown_patterns();
        for candidate in &self.candidates {
            let mut trail = AttributeTrail::new(candidate.clone());
            trail.qualifiers = keys.clone();
            // Declared-unknown attributes win over concrete bindings.
            if patterns.iter().any(|p| Self::overlaps(p, &trail)) {
                return Value::unknown(UnknownSet::single(self.id, trail));
            }
            if let Some(mut value) = vars.resolve(candidate) {
                for key in &keys {
                    value = qualify_value(&value, key);
                    if value.is_error() {
                        return value;
                    }
                }
                return value;
            }
        }
        let name = self
            .candidates
            .last()
            .map(String::as_str)
            .unwrap_or("<unnamed>");
        Value::error(
            ErrorKind::NoSuchAttribute,
            format!("no such attribute: '{name}'"),
        )
    }
}
