//! Runtime function overloads and dispatch.
//!
//! The planner binds call nodes to [`FunctionOverload`]s by overload id.
//! When checking left several candidates, dispatch falls back to the trait
//! bits of the first operand. Host-registered implementations run behind a
//! panic boundary: a panicking binding becomes an `internal` error value,
//! never a crash.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use verdict_core::error::ErrorKind;
use verdict_core::traits::Traits;
use verdict_core::value::{propagate_all, Value};

pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A runtime overload: an id, an arity, optional trait requirements on the
/// first operand, and the implementation.
#[derive(Clone)]
pub struct FunctionOverload {
    pub id: String,
    pub function: String,
    pub arity: usize,
    /// Trait bits the first operand must advertise for trait dispatch;
    /// empty means any operand.
    pub operand_trait: Traits,
    /// Non-strict overloads receive errors and unknowns as-is.
    pub non_strict: bool,
    implementation: FunctionImpl,
}

impl std::fmt::Debug for FunctionOverload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FunctionOverload({}/{})", self.id, self.arity)
    }
}

impl FunctionOverload {
    pub fn new(
        function: &str,
        id: &str,
        arity: usize,
        implementation: impl Fn(&[Value]) -> Value + Send + Sync + 'static,
    ) -> FunctionOverload {
        FunctionOverload {
            id: id.to_string(),
            function: function.to_string(),
            arity,
            operand_trait: Traits::empty(),
            non_strict: false,
            implementation: Arc::new(implementation),
        }
    }

    pub fn with_operand_trait(mut self, traits: Traits) -> FunctionOverload {
        self.operand_trait = traits;
        self
    }

    pub fn non_strict(mut self) -> FunctionOverload {
        self.non_strict = true;
        self
    }

    /// Invokes the implementation behind a panic boundary.
    pub fn call(&self, args: &[Value]) -> Value {
        if args.len() != self.arity {
            return Value::error(
                ErrorKind::NoSuchOverload,
                format!(
                    "no such overload: {} expects {} arguments, got {}",
                    self.function,
                    self.arity,
                    args.len()
                ),
            );
        }
        if !self.non_strict {
            if let Some(terminal) = propagate_all(args) {
                return terminal;
            }
        }
        let implementation = &self.implementation;
        match catch_unwind(AssertUnwindSafe(|| implementation(args))) {
            Ok(value) => value,
            Err(payload) => {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "function panicked".to_string());
                Value::error(
                    ErrorKind::Internal,
                    format!("internal error in '{}': {detail}", self.function),
                )
            }
        }
    }

    /// Whether this overload accepts the given first operand under trait
    /// dispatch.
    pub fn accepts_operand(&self, operand: &Value) -> bool {
        self.operand_trait.is_empty() || operand.traits().contains(self.operand_trait)
    }
}

/// All overloads known to a program, keyed by overload id and grouped by
/// function name.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    by_id: HashMap<String, FunctionOverload>,
    by_function: HashMap<String, Vec<String>>,
}

impl FunctionRegistry {
    pub fn new() -> FunctionRegistry {
        FunctionRegistry::default()
    }

    pub fn register(&mut self, overload: FunctionOverload) {
        self.by_function
            .entry(overload.function.clone())
            .or_default()
            .push(overload.id.clone());
        self.by_id.insert(overload.id.clone(), overload);
    }

    pub fn find(&self, overload_id: &str) -> Option<&FunctionOverload> {
        self.by_id.get(overload_id)
    }

    pub fn find_by_function(&self, function: &str) -> Vec<&FunctionOverload> {
        self.by_function
            .get(function)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// Resolves a call: single candidate dispatches directly; several
    /// candidates dispatch on the runtime traits and arity of the operands.
    pub fn dispatch(&self, function: &str, candidate_ids: &[String], args: &[Value]) -> Value {
        let candidates: Vec<FunctionOverload> = candidate_ids
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect();
        dispatch_candidates(function, &candidates, args)
    }
}

/// Dispatch over an already-resolved candidate list. A single candidate
/// runs directly; several disambiguate on the first operand's trait bits.
pub fn dispatch_candidates(
    function: &str,
    candidates: &[FunctionOverload],
    args: &[Value],
) -> Value {
    let mut fallback: Option<&FunctionOverload> = None;
    for overload in candidates {
        if overload.arity != args.len() {
            continue;
        }
        match args.first() {
            Some(first) if !first.is_terminal() => {
                if overload.accepts_operand(first) {
                    return overload.call(args);
                }
            }
            // With no operand (or a terminal one) to dispatch on, any
            // arity-compatible candidate will do.
            _ => {
                if fallback.is_none() {
                    fallback = Some(overload);
                }
            }
        }
    }
    if let Some(overload) = fallback {
        return overload.call(args);
    }
    // Terminal operands propagate even when nothing matched.
    if let Some(terminal) = propagate_all(args) {
        return terminal;
    }
    let operands: Vec<&Value> = args.iter().collect();
    Value::no_such_overload(function, &operands)
}
