//! The host-facing environment and program surface.
//!
//! `Env` owns the checking scope, macro set, type registry, and runtime
//! function registry; `compile` produces a checked AST or collected issues,
//! `program` plans it, and `Program::eval` runs it against an activation.
//! Environments compose by `extend`: the child gets isolated copies, so
//! mutating the parent later never affects the child.

use std::sync::Arc;

use verdict_compiler::ast::Ast;
use verdict_compiler::checker::{check_ast, CheckerOptions};
use verdict_compiler::container::Container;
use verdict_compiler::decls::{DeclScope, Declaration};
use verdict_compiler::issues::Issues;
use verdict_compiler::macros::{Macro, MacroRegistry};
use verdict_compiler::parser::parse_with_macros;
use verdict_compiler::stdlib::standard_declarations;
use verdict_core::registry::{StructDescriptor, TypeRegistry};
use verdict_core::value::Value;

use crate::activation::Activation;
use crate::cost::{CostEstimator, CostTracker};
use crate::decorators::new_session;
use crate::evalstate::EvalState;
use crate::functions::{FunctionOverload, FunctionRegistry};
use crate::interpretable::Interpretable;
use crate::planner::{Planner, PlannerOptions};
use crate::stdlib::standard_functions;

/// A checking-and-planning environment.
#[derive(Clone)]
pub struct Env {
    scope: DeclScope,
    registry: Arc<TypeRegistry>,
    container: Container,
    macros: MacroRegistry,
    functions: FunctionRegistry,
    checker_options: CheckerOptionsOwned,
}

// CheckerOptions is plain data; keep a cloneable mirror so Env stays Clone.
#[derive(Clone, Default)]
struct CheckerOptionsOwned {
    homogeneous_aggregate_literals: bool,
}

impl Default for Env {
    fn default() -> Env {
        Env::new()
    }
}

impl Env {
    /// An environment with the standard declarations, macros, functions,
    /// and the process-wide type registry.
    pub fn new() -> Env {
        let mut scope = DeclScope::new();
        for decl in standard_declarations() {
            scope.add(decl);
        }
        Env {
            scope,
            registry: TypeRegistry::global(),
            container: Container::root(),
            macros: MacroRegistry::standard(),
            functions: standard_functions(),
            checker_options: CheckerOptionsOwned::default(),
        }
    }

    /// Replaces the type registry with an environment-local one.
    pub fn with_registry(mut self, registry: TypeRegistry) -> Env {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_container(mut self, name: impl Into<String>) -> Env {
        self.container = Container::new(name);
        self
    }

    /// Declares `alias` as an abbreviation for a fully-qualified name.
    pub fn with_abbreviation(
        mut self,
        alias: impl Into<String>,
        qualified: impl Into<String>,
    ) -> Env {
        self.container.add_abbreviation(alias, qualified);
        self
    }

    /// Registers a variable or function declaration for checking.
    pub fn declare(mut self, declaration: Declaration) -> Env {
        self.scope.add(declaration);
        self
    }

    /// Binds a runtime implementation for a declared overload id.
    pub fn register_function(mut self, overload: FunctionOverload) -> Env {
        self.functions.register(overload);
        self
    }

    pub fn register_macro(mut self, m: Macro) -> Env {
        self.macros.register(m);
        self
    }

    /// Registers a message type on an isolated copy of the registry.
    pub fn register_struct(mut self, descriptor: StructDescriptor) -> Env {
        let mut registry = self.registry.extend();
        registry.register_struct(descriptor);
        self.registry = Arc::new(registry);
        self
    }

    pub fn register_enum_value(mut self, name: impl Into<String>, value: i64) -> Env {
        let mut registry = self.registry.extend();
        registry.register_enum_value(name, value);
        self.registry = Arc::new(registry);
        self
    }

    /// Rejects mixed-type list and map literals during checking.
    pub fn homogeneous_aggregate_literals(mut self) -> Env {
        self.checker_options.homogeneous_aggregate_literals = true;
        self
    }

    /// An isolated child environment. The registry and scope are copies;
    /// later changes to either environment stay local to it.
    pub fn extend(&self) -> Env {
        let mut child = self.clone();
        child.registry = Arc::new(self.registry.extend());
        child
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Parses and checks source. A non-empty error set means the AST must
    /// not be executed.
    pub fn compile(&self, source: &str) -> Result<Ast, Issues> {
        tracing::debug!(source_len = source.len(), "compiling expression");
        let parsed = match parse_with_macros(source, &self.macros) {
            Ok(ast) => ast,
            Err(err) => {
                let info = verdict_compiler::ast::SourceInfo::new(source);
                return Err(Issues::new(vec![err], info));
            }
        };
        let options = CheckerOptions {
            homogeneous_aggregate_literals: self.checker_options.homogeneous_aggregate_literals,
        };
        let mut scope = self.scope.clone();
        let (checked, errors) = check_ast(
            parsed,
            &mut scope,
            &self.registry,
            &self.container,
            &options,
        );
        if errors.is_empty() {
            Ok(checked)
        } else {
            Err(Issues::new(errors, checked.source_info.clone()))
        }
    }

    /// Parses without checking; the program plans with dynamic types.
    pub fn parse_only(&self, source: &str) -> Result<Ast, Issues> {
        parse_with_macros(source, &self.macros).map_err(|err| {
            let info = verdict_compiler::ast::SourceInfo::new(source);
            Issues::new(vec![err], info)
        })
    }

    pub fn program(&self, ast: &Ast) -> Program {
        self.program_with_options(ast, ProgramOptions::default())
    }

    pub fn program_with_options(&self, ast: &Ast, options: ProgramOptions) -> Program {
        let planner_options = PlannerOptions {
            constant_folding: options.constant_folding,
            track_state: options.track_state || options.exhaustive,
        };
        let planner = Planner::new(
            ast,
            &self.functions,
            Arc::clone(&self.registry),
            &self.container,
            planner_options,
        );
        let root: Arc<dyn Interpretable> = Arc::from(planner.plan());
        Program {
            root,
            ast: Arc::new(ast.clone()),
            options,
        }
    }
}

/// Planner and evaluation options for one program.
#[derive(Clone, Default)]
pub struct ProgramOptions {
    /// Evaluate all-constant subexpressions at plan time.
    pub constant_folding: bool,
    /// Record every node's value per evaluation.
    pub track_state: bool,
    /// Disable short-circuiting so tracked state covers the whole tree.
    pub exhaustive: bool,
    /// Allow activations to substitute function overloads.
    pub late_binding: bool,
    /// Runtime cost budget; exceeding it aborts the evaluation.
    pub cost_limit: Option<u64>,
    /// Host override for per-call costs.
    pub cost_estimator: Option<Arc<dyn CostEstimator>>,
}

/// A planned, immutable, shareable program.
pub struct Program {
    root: Arc<dyn Interpretable>,
    ast: Arc<Ast>,
    options: ProgramOptions,
}

/// What an evaluation observed: tracked state and the accumulated cost.
#[derive(Debug)]
pub struct EvalDetails {
    pub state: Option<EvalState>,
    pub cost: u64,
}

impl Program {
    /// Evaluates against an activation. Many evaluations may run in
    /// parallel on one program; each gets its own session.
    pub fn eval(&self, vars: &dyn Activation) -> (Value, EvalDetails) {
        let tracker = CostTracker::new(
            self.options.cost_limit,
            self.options.cost_estimator.clone(),
        );
        let mut session = new_session(
            self.options.track_state,
            self.options.exhaustive,
            self.options.late_binding,
            tracker,
        );
        let value = self.root.eval(vars, &mut session);
        if value.is_error() {
            tracing::debug!(error = %value, "evaluation returned error value");
        }
        (
            value,
            EvalDetails {
                state: session.state,
                cost: session.cost.cost(),
            },
        )
    }

    /// The AST this program was planned from.
    pub fn ast(&self) -> &Ast {
        &self.ast
    }

    /// The residual AST for the last tracked evaluation's state.
    pub fn residual(&self, details: &EvalDetails) -> Option<Ast> {
        details
            .state
            .as_ref()
            .map(|state| crate::prune::residual_ast(&self.ast, state))
    }
}
