//! Verdict runtime: planner, evaluator, and the host `Env` surface.
//!
//! A checked AST plans into an immutable tree of evaluable nodes; any
//! number of evaluations run against it in parallel, each with its own
//! activation, tracked state, and cost budget. Failures stay in-band as
//! error values, and declared-unknown attributes flow through evaluation
//! as unknown sets that short-circuit logic can absorb.

pub mod activation;
pub mod attributes;
pub mod cost;
pub mod decorators;
pub mod env;
pub mod evalstate;
pub mod functions;
pub mod interpretable;
pub mod planner;
pub mod prune;
pub mod stdlib;

pub use activation::{
    partial_activation, Activation, DispatchActivation, EmptyActivation, HierarchicalActivation,
    MapActivation, PartialActivation,
};
pub use cost::{CostEstimator, CostTracker};
pub use env::{Env, EvalDetails, Program, ProgramOptions};
pub use evalstate::EvalState;
pub use functions::{FunctionOverload, FunctionRegistry};
pub use interpretable::{EvalSession, Interpretable};
pub use planner::{Planner, PlannerOptions};
pub use prune::residual_ast;
pub use stdlib::standard_functions;

// The compiler and core crates are the other two thirds of the public
// surface; re-export them for hosts that depend on the runtime alone.
pub use verdict_compiler as compiler;
pub use verdict_core as values;
