//! Per-evaluation tracked state.

use std::collections::HashMap;

use verdict_compiler::ast::ExprId;
use verdict_core::value::Value;

/// Values recorded per expression id during a tracked evaluation. Each
/// evaluation owns its state; programs share nothing mutable.
#[derive(Debug, Clone, Default)]
pub struct EvalState {
    values: HashMap<ExprId, Value>,
}

impl EvalState {
    pub fn new() -> EvalState {
        EvalState::default()
    }

    pub fn record(&mut self, id: ExprId, value: &Value) {
        self.values.insert(id, value.clone());
    }

    pub fn value(&self, id: ExprId) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.values.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
