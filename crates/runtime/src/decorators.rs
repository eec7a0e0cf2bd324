//! Plan-time decorators.
//!
//! Decorators wrap evaluable nodes to add cross-cutting behavior without
//! touching evaluation logic: state tracking records every node's value
//! under its id, and constant folding collapses pure subtrees at plan time.
//! Exhaustive evaluation and cost budgets ride on the evaluation session
//! instead, since they change how existing nodes run rather than adding
//! wrappers.

use verdict_compiler::ast::ExprId;
use verdict_core::value::Value;

use crate::activation::{Activation, EmptyActivation};
use crate::cost::CostTracker;
use crate::evalstate::EvalState;
use crate::interpretable::{ConstNode, EvalSession, Interpretable};

/// Records the node's value in the session state after evaluation.
pub struct ObservedNode {
    inner: Box<dyn Interpretable>,
}

impl ObservedNode {
    pub fn wrap(inner: Box<dyn Interpretable>) -> Box<dyn Interpretable> {
        Box::new(ObservedNode { inner })
    }
}

impl Interpretable for ObservedNode {
    fn id(&self) -> ExprId {
        self.inner.id()
    }

    fn eval(&self, vars: &dyn Activation, session: &mut EvalSession) -> Value {
        let value = self.inner.eval(vars, session);
        session.observe(self.inner.id(), &value);
        value
    }
}

/// Attempts to evaluate a node with no bindings. Pure subtrees (constant
/// arguments all the way down, short-circuit operators included) produce a
/// value and fold to a constant; anything touching an attribute fails
/// resolution and stays as-is. Errors are conservatively left unfolded.
pub fn try_fold(node: Box<dyn Interpretable>) -> Box<dyn Interpretable> {
    let mut session = EvalSession {
        cost: CostTracker::new(None, None),
        state: None,
        exhaustive: false,
        late_binding: false,
    };
    let value = node.eval(&EmptyActivation, &mut session);
    if value.is_terminal() {
        return node;
    }
    Box::new(ConstNode {
        id: node.id(),
        value,
    })
}

/// The per-evaluation session assembled from program options.
pub fn new_session(
    track_state: bool,
    exhaustive: bool,
    late_binding: bool,
    cost: CostTracker,
) -> EvalSession {
    EvalSession {
        cost,
        state: if track_state || exhaustive {
            Some(EvalState::new())
        } else {
            None
        },
        exhaustive,
        late_binding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observed_node_records_state() {
        let node = ObservedNode::wrap(Box::new(ConstNode {
            id: 4,
            value: Value::Int(9),
        }));
        let mut session = new_session(true, false, false, CostTracker::new(None, None));
        let value = node.eval(&EmptyActivation, &mut session);
        assert_eq!(value, Value::Int(9));
        assert_eq!(session.state.unwrap().value(4), Some(&Value::Int(9)));
    }

    #[test]
    fn test_fold_keeps_unresolvable_nodes() {
        use crate::attributes::AttributeNode;
        let attr = Box::new(AttributeNode {
            id: 1,
            candidates: vec!["x".to_string()],
            qualifiers: vec![],
        });
        let folded = try_fold(attr);
        // Still an attribute: evaluation with bindings must succeed.
        let activation = crate::activation::MapActivation::new().bind("x", 3i64);
        let mut session = new_session(false, false, false, CostTracker::new(None, None));
        assert_eq!(folded.eval(&activation, &mut session), Value::Int(3));
    }
}
