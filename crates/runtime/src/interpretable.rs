//! Evaluable nodes.
//!
//! The planner turns each checked AST node into one [`Interpretable`].
//! Evaluation is synchronous and single-threaded; a program (the planned
//! node tree) is immutable and may be evaluated from many threads at once,
//! each with its own [`EvalSession`].

use std::collections::HashMap;
use std::sync::Arc;

use verdict_compiler::ast::ExprId;
use verdict_core::error::ErrorKind;
use verdict_core::list::ListValue;
use verdict_core::map::MapKey;
use verdict_core::registry::TypeRegistry;
use verdict_core::value::{propagate2, propagate_all, Value};

use crate::activation::Activation;
use crate::cost::{CostKind, CostTracker};
use crate::evalstate::EvalState;
use crate::functions::{dispatch_candidates, FunctionOverload};

/// Mutable per-evaluation context: tracked state, cost, and mode flags.
pub struct EvalSession {
    pub cost: CostTracker,
    pub state: Option<EvalState>,
    pub exhaustive: bool,
    pub late_binding: bool,
}

impl EvalSession {
    pub fn observe(&mut self, id: ExprId, value: &Value) {
        if let Some(state) = &mut self.state {
            state.record(id, value);
        }
    }
}

pub trait Interpretable: Send + Sync {
    fn id(&self) -> ExprId;
    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value;
}

// ---------------------------------------------------------------------------
// Leaf and operator nodes
// ---------------------------------------------------------------------------

pub struct ConstNode {
    pub id: ExprId,
    pub value: Value,
}

impl Interpretable for ConstNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, _vars: &dyn Activation, _session: &mut EvalSession) -> Value {
        self.value.clone()
    }
}

/// Commutative short-circuit conjunction: false wins over errors and
/// unknowns on either side.
pub struct AndNode {
    pub id: ExprId,
    pub lhs: Box<dyn Interpretable>,
    pub rhs: Box<dyn Interpretable>,
}

impl Interpretable for AndNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        let lhs = self.lhs.eval(vars, session);
        if !session.exhaustive {
            if let Value::Bool(false) = lhs {
                return Value::Bool(false);
            }
        }
        let rhs = self.rhs.eval(vars, session);
        logical_and(lhs, rhs)
    }
}

pub struct OrNode {
    pub id: ExprId,
    pub lhs: Box<dyn Interpretable>,
    pub rhs: Box<dyn Interpretable>,
}

impl Interpretable for OrNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        let lhs = self.lhs.eval(vars, session);
        if !session.exhaustive {
            if let Value::Bool(true) = lhs {
                return Value::Bool(true);
            }
        }
        let rhs = self.rhs.eval(vars, session);
        logical_or(lhs, rhs)
    }
}

pub fn logical_and(lhs: Value, rhs: Value) -> Value {
    match (&lhs, &rhs) {
        (Value::Bool(false), _) | (_, Value::Bool(false)) => Value::Bool(false),
        (Value::Bool(true), Value::Bool(true)) => Value::Bool(true),
        _ => short_circuit_residue("_&&_", lhs, rhs),
    }
}

pub fn logical_or(lhs: Value, rhs: Value) -> Value {
    match (&lhs, &rhs) {
        (Value::Bool(true), _) | (_, Value::Bool(true)) => Value::Bool(true),
        (Value::Bool(false), Value::Bool(false)) => Value::Bool(false),
        _ => short_circuit_residue("_||_", lhs, rhs),
    }
}

/// Neither operand resolved the outcome: propagate terminals (merging
/// unknowns), otherwise the operands were not booleans.
fn short_circuit_residue(op: &str, lhs: Value, rhs: Value) -> Value {
    match propagate2(&lhs, &rhs) {
        Some(v) => v,
        None => Value::no_such_overload(op, &[&lhs, &rhs]),
    }
}

pub struct ConditionalNode {
    pub id: ExprId,
    pub cond: Box<dyn Interpretable>,
    pub then: Box<dyn Interpretable>,
    pub els: Box<dyn Interpretable>,
}

impl Interpretable for ConditionalNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        let cond = self.cond.eval(vars, session);
        if session.exhaustive {
            // Evaluate both branches so tracked state covers the tree.
            let then = self.then.eval(vars, session);
            let els = self.els.eval(vars, session);
            return match cond {
                Value::Bool(true) => then,
                Value::Bool(false) => els,
                other if other.is_terminal() => other,
                other => Value::no_such_overload("_?_:_", &[&other]),
            };
        }
        match cond {
            Value::Bool(true) => self.then.eval(vars, session),
            Value::Bool(false) => self.els.eval(vars, session),
            other if other.is_terminal() => other,
            other => Value::no_such_overload("_?_:_", &[&other]),
        }
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

pub struct CallNode {
    pub id: ExprId,
    pub function: String,
    pub candidates: Vec<FunctionOverload>,
    pub args: Vec<Box<dyn Interpretable>>,
}

impl Interpretable for CallNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        let mut arg_values = Vec::with_capacity(self.args.len());
        for arg in &self.args {
            arg_values.push(arg.eval(vars, session));
        }
        let overload_id = self
            .candidates
            .first()
            .map(|o| o.id.as_str())
            .unwrap_or("");
        if let Err(err) = session
            .cost
            .charge_call(&self.function, overload_id, &arg_values)
        {
            return err.into();
        }
        if session.late_binding {
            if let Some(replacement) = vars.function_override(&self.function) {
                return self.call_late_bound(replacement, &arg_values);
            }
        }
        dispatch_candidates(&self.function, &self.candidates, &arg_values)
    }
}

impl CallNode {
    /// A late-bound overload must match the planned binding's arity and
    /// strictness.
    fn call_late_bound(&self, replacement: &FunctionOverload, args: &[Value]) -> Value {
        if let Some(planned) = self.candidates.first() {
            if planned.arity != replacement.arity || planned.non_strict != replacement.non_strict
            {
                return Value::error(
                    ErrorKind::Internal,
                    format!(
                        "late-bound overload '{}' does not match the planned signature of '{}'",
                        replacement.id, self.function
                    ),
                );
            }
        }
        replacement.call(args)
    }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

pub struct ListNode {
    pub id: ExprId,
    pub elements: Vec<Box<dyn Interpretable>>,
    pub optional_indices: Vec<usize>,
}

impl Interpretable for ListNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        if let Err(err) = session.cost.charge(CostKind::ListCreate) {
            return err.into();
        }
        let mut elems = Vec::with_capacity(self.elements.len());
        for (i, element) in self.elements.iter().enumerate() {
            let value = element.eval(vars, session);
            if self.optional_indices.contains(&i) {
                match value {
                    Value::Optional(opt) => {
                        if let Some(v) = opt.as_option() {
                            elems.push(v.clone());
                        }
                    }
                    other if other.is_terminal() => elems.push(other),
                    other => {
                        return Value::error(
                            ErrorKind::TypeConversion,
                            format!(
                                "optional list element must be optional, found {}",
                                other.type_name()
                            ),
                        );
                    }
                }
            } else {
                elems.push(value);
            }
        }
        if let Some(terminal) = propagate_all(&elems) {
            return terminal;
        }
        Value::List(Arc::new(ListValue::new(elems)))
    }
}

pub struct MapNode {
    pub id: ExprId,
    pub entries: Vec<MapEntryNode>,
}

pub struct MapEntryNode {
    pub key: Box<dyn Interpretable>,
    pub value: Box<dyn Interpretable>,
    pub optional: bool,
}

impl Interpretable for MapNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        if let Err(err) = session.cost.charge(CostKind::MapCreate) {
            return err.into();
        }
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let key = entry.key.eval(vars, session);
            if key.is_terminal() {
                return key;
            }
            let value = entry.value.eval(vars, session);
            if entry.optional {
                match value {
                    Value::Optional(opt) => {
                        if let Some(v) = opt.as_option() {
                            entries.push((key, v.clone()));
                        }
                    }
                    other if other.is_terminal() => return other,
                    other => {
                        return Value::error(
                            ErrorKind::TypeConversion,
                            format!(
                                "optional map entry must be optional, found {}",
                                other.type_name()
                            ),
                        );
                    }
                }
            } else {
                if value.is_terminal() {
                    return value;
                }
                entries.push((key, value));
            }
        }
        Value::map(entries)
    }
}

pub struct StructNode {
    pub id: ExprId,
    pub type_name: String,
    pub fields: Vec<StructFieldNode>,
    pub registry: Arc<TypeRegistry>,
}

pub struct StructFieldNode {
    pub name: String,
    pub value: Box<dyn Interpretable>,
    pub optional: bool,
}

impl Interpretable for StructNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        if let Err(err) = session.cost.charge(CostKind::StructCreate) {
            return err.into();
        }
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = field.value.eval(vars, session);
            if value.is_terminal() {
                return value;
            }
            if field.optional {
                match value {
                    Value::Optional(opt) => {
                        if let Some(v) = opt.as_option() {
                            fields.push((field.name.clone(), v.clone()));
                        }
                    }
                    other => {
                        return Value::error(
                            ErrorKind::TypeConversion,
                            format!(
                                "optional field initializer must be optional, found {}",
                                other.type_name()
                            ),
                        );
                    }
                }
            } else {
                fields.push((field.name.clone(), value));
            }
        }
        self.registry.new_value(&self.type_name, fields)
    }
}

// ---------------------------------------------------------------------------
// Field selection on computed operands
// ---------------------------------------------------------------------------

pub struct SelectNode {
    pub id: ExprId,
    pub operand: Box<dyn Interpretable>,
    pub field: String,
    pub optional: bool,
}

impl Interpretable for SelectNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        if let Err(err) = session.cost.charge(CostKind::Attribute(1)) {
            return err.into();
        }
        let operand = self.operand.eval(vars, session);
        select_field(&operand, &self.field, self.optional)
    }
}

/// Field access with optional-aware semantics: selecting on an optional
/// chains, and `.?` wraps presence into an optional.
pub fn select_field(operand: &Value, field: &str, optional: bool) -> Value {
    match operand {
        Value::Error(_) | Value::Unknown(_) => operand.clone(),
        Value::Optional(opt) => match opt.as_option() {
            Some(inner) => select_field(inner, field, true),
            None => Value::optional_none(),
        },
        Value::Map(map) => {
            let key = Value::string(field);
            match map.get(&key) {
                Some(v) => {
                    if optional {
                        Value::optional_of(v)
                    } else {
                        v
                    }
                }
                None => {
                    if optional {
                        Value::optional_none()
                    } else {
                        Value::error(ErrorKind::NoSuchKey, format!("no such key: {field}"))
                    }
                }
            }
        }
        Value::Object(obj) => {
            if optional {
                match obj.has_field(field) {
                    Value::Bool(true) => Value::optional_of(obj.get_field(field)),
                    Value::Bool(false) => Value::optional_none(),
                    other => other,
                }
            } else {
                obj.get_field(field)
            }
        }
        other => Value::error(
            ErrorKind::NoSuchOverload,
            format!(
                "type '{}' does not support field selection",
                other.type_name()
            ),
        ),
    }
}

pub struct HasNode {
    pub id: ExprId,
    pub operand: Box<dyn Interpretable>,
    pub field: String,
}

impl Interpretable for HasNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        if let Err(err) = session.cost.charge(CostKind::Attribute(1)) {
            return err.into();
        }
        let operand = self.operand.eval(vars, session);
        test_field(&operand, &self.field)
    }
}

pub fn test_field(operand: &Value, field: &str) -> Value {
    match operand {
        Value::Error(_) | Value::Unknown(_) => operand.clone(),
        Value::Map(map) => map.contains(&Value::string(field)),
        Value::Object(obj) => obj.has_field(field),
        Value::Optional(opt) => match opt.as_option() {
            Some(inner) => test_field(inner, field),
            None => Value::Bool(false),
        },
        other => Value::error(
            ErrorKind::NoSuchOverload,
            format!(
                "type '{}' does not support field presence testing",
                other.type_name()
            ),
        ),
    }
}

// ---------------------------------------------------------------------------
// Comprehensions
// ---------------------------------------------------------------------------

pub struct FoldNode {
    pub id: ExprId,
    pub iter_range: Box<dyn Interpretable>,
    pub iter_var: String,
    pub accu_var: String,
    pub accu_init: Box<dyn Interpretable>,
    pub loop_cond: Box<dyn Interpretable>,
    pub loop_step: Box<dyn Interpretable>,
    pub result: Box<dyn Interpretable>,
}

/// Scope for one fold: the iteration variable and accumulator layered over
/// the enclosing activation.
struct FoldVars<'a> {
    parent: &'a dyn Activation,
    bindings: HashMap<&'a str, Value>,
}

impl Activation for FoldVars<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        match self.bindings.get(name) {
            Some(v) => Some(v.clone()),
            None => self.parent.resolve(name),
        }
    }

    fn unknown_patterns(&self) -> &[verdict_core::unknown::AttributeTrail] {
        self.parent.unknown_patterns()
    }

    fn function_override(&self, function: &str) -> Option<&FunctionOverload> {
        self.parent.function_override(function)
    }
}

impl Interpretable for FoldNode {
    fn id(&self) -> ExprId {
        self.id
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        let range = self.iter_range.eval(vars, session);
        if range.is_terminal() {
            return range;
        }
        // Iterating a map yields its keys; order is not observable in the
        // fold result unless the expression makes it so.
        let elements: Vec<Value> = match &range {
            Value::List(list) => list.iter().cloned().collect(),
            Value::Map(map) => map.keys().collect(),
            other => {
                return Value::error(
                    ErrorKind::NoSuchOverload,
                    format!("type '{}' cannot be iterated", other.type_name()),
                );
            }
        };
        let mut accu = self.accu_init.eval(vars, session);
        for element in elements {
            let scope = FoldVars {
                parent: vars,
                bindings: HashMap::from([
                    (self.iter_var.as_str(), element),
                    (self.accu_var.as_str(), accu.clone()),
                ]),
            };
            let cond = self.loop_cond.eval(&scope, session);
            match cond {
                Value::Bool(true) => {}
                Value::Bool(false) => break,
                Value::Error(_) => return cond,
                // An unknown condition keeps iterating so the final result
                // carries every unknown the loop can reach.
                Value::Unknown(_) => {}
                other => {
                    return Value::error(
                        ErrorKind::NoSuchOverload,
                        format!("loop condition must be bool, found {}", other.type_name()),
                    );
                }
            }
            accu = self.loop_step.eval(&scope, session);
        }
        let scope = FoldVars {
            parent: vars,
            bindings: HashMap::from([(self.accu_var.as_str(), accu)]),
        };
        self.result.eval(&scope, session)
    }
}

/// Qualifies a value by a key, shared by attribute resolution and indexing.
pub fn qualify_value(value: &Value, key: &MapKey) -> Value {
    match value {
        Value::Error(_) | Value::Unknown(_) => value.clone(),
        Value::Map(map) => map.index(&key.to_value()),
        Value::List(list) => list.index(&key.to_value()),
        Value::Object(obj) => match key {
            MapKey::String(field) => obj.get_field(field),
            other => Value::error(
                ErrorKind::NoSuchOverload,
                format!("object fields are selected by name, not {}", other),
            ),
        },
        Value::Optional(opt) => match opt.as_option() {
            Some(inner) => qualify_value(inner, key),
            None => Value::optional_none(),
        },
        other => Value::error(
            ErrorKind::NoSuchOverload,
            format!("type '{}' does not support qualification", other.type_name()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verdict_core::unknown::{AttributeTrail, UnknownSet};

    fn unknown(id: ExprId, var: &str) -> Value {
        Value::unknown(UnknownSet::single(id, AttributeTrail::new(var)))
    }

    fn err() -> Value {
        Value::error(ErrorKind::DivideByZero, "divide by zero")
    }

    #[test]
    fn test_and_absorbs_terminal_when_false() {
        assert_eq!(
            logical_and(Value::Bool(false), err()),
            Value::Bool(false)
        );
        assert_eq!(
            logical_and(unknown(1, "y"), Value::Bool(false)),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_and_propagates_terminal_when_undetermined() {
        assert!(logical_and(Value::Bool(true), err()).is_error());
        assert!(logical_and(unknown(1, "y"), Value::Bool(true)).is_unknown());
    }

    #[test]
    fn test_or_dual() {
        assert_eq!(logical_or(err(), Value::Bool(true)), Value::Bool(true));
        assert_eq!(
            logical_or(Value::Bool(false), Value::Bool(false)),
            Value::Bool(false)
        );
        assert!(logical_or(Value::Bool(false), err()).is_error());
    }

    #[test]
    fn test_unknowns_merge_across_logic() {
        let merged = logical_and(unknown(1, "a"), unknown(2, "b"));
        match merged {
            Value::Unknown(set) => assert_eq!(set.entries().len(), 2),
            other => panic!("expected unknown, got {other}"),
        }
    }

    #[test]
    fn test_non_bool_operands_are_overload_errors() {
        match logical_and(Value::Int(1), Value::Bool(true)) {
            Value::Error(e) => assert_eq!(e.kind, ErrorKind::NoSuchOverload),
            other => panic!("expected error, got {other}"),
        }
    }

    #[test]
    fn test_select_field_on_map_and_optional() {
        let map = Value::map(vec![(Value::string("k"), Value::Int(1))]);
        assert_eq!(select_field(&map, "k", false), Value::Int(1));
        assert!(select_field(&map, "zzz", false).is_error());
        assert_eq!(
            select_field(&map, "zzz", true),
            Value::optional_none()
        );
        assert_eq!(
            select_field(&map, "k", true),
            Value::optional_of(Value::Int(1))
        );
    }
}
