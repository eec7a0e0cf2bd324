//! Macro expansion.
//!
//! Macros are syntactic shorthand rewritten during parsing; the checker only
//! ever sees ordinary calls, selects, and comprehensions. The standard set
//! (`has`, `all`, `exists`, `exists_one`, `filter`, `map`) expands to folds
//! over the receiver; hosts may register additional macros.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Comprehension, Constant, Expr, ExprKind};

/// The accumulator variable used by expanded comprehensions.
pub const ACCUMULATOR_VAR: &str = "__result__";

/// Internal guard used in `all`/`exists` loop conditions so that errors and
/// unknowns do not stop the fold early.
pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";

/// Mints expression nodes during expansion; implemented by the parser so
/// that expanded nodes get real ids and source offsets.
pub trait ExprHelper {
    fn new_expr(&mut self, kind: ExprKind) -> Expr;

    fn new_literal(&mut self, constant: Constant) -> Expr {
        self.new_expr(ExprKind::Literal(constant))
    }

    fn new_ident(&mut self, name: &str) -> Expr {
        self.new_expr(ExprKind::Ident(name.to_string()))
    }

    fn new_call(&mut self, function: &str, args: Vec<Expr>) -> Expr {
        self.new_expr(ExprKind::Call {
            target: None,
            function: function.to_string(),
            args,
        })
    }

    fn new_fold(&mut self, fold: Comprehension) -> Expr {
        self.new_expr(ExprKind::Comprehension(Box::new(fold)))
    }
}

/// A macro expander. Returns `Ok(None)` when the call should remain an
/// ordinary call, `Err` for a malformed use of the macro.
pub type MacroExpander = Arc<
    dyn Fn(&mut dyn ExprHelper, Option<Expr>, Vec<Expr>) -> Result<Option<Expr>, String>
        + Send
        + Sync,
>;

#[derive(Clone)]
pub struct Macro {
    pub function: String,
    pub arg_count: usize,
    pub receiver_style: bool,
    pub expander: MacroExpander,
}

impl Macro {
    pub fn global(function: &str, arg_count: usize, expander: MacroExpander) -> Macro {
        Macro {
            function: function.to_string(),
            arg_count,
            receiver_style: false,
            expander,
        }
    }

    pub fn receiver(function: &str, arg_count: usize, expander: MacroExpander) -> Macro {
        Macro {
            function: function.to_string(),
            arg_count,
            receiver_style: true,
            expander,
        }
    }

    fn key(&self) -> String {
        macro_key(&self.function, self.arg_count, self.receiver_style)
    }
}

impl std::fmt::Debug for Macro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Macro({})", self.key())
    }
}

fn macro_key(function: &str, arg_count: usize, receiver_style: bool) -> String {
    let style = if receiver_style { "member" } else { "global" };
    format!("{function}:{arg_count}:{style}")
}

/// The macros active for one parse.
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: HashMap<String, Macro>,
}

impl MacroRegistry {
    /// No macros at all; `has(...)` etc. parse as plain calls.
    pub fn empty() -> MacroRegistry {
        MacroRegistry::default()
    }

    pub fn standard() -> MacroRegistry {
        let mut registry = MacroRegistry::empty();
        registry.register(Macro::global("has", 1, Arc::new(expand_has)));
        registry.register(Macro::receiver("all", 2, Arc::new(expand_all)));
        registry.register(Macro::receiver("exists", 2, Arc::new(expand_exists)));
        registry.register(Macro::receiver("exists_one", 2, Arc::new(expand_exists_one)));
        registry.register(Macro::receiver("filter", 2, Arc::new(expand_filter)));
        registry.register(Macro::receiver("map", 2, Arc::new(expand_map)));
        registry.register(Macro::receiver("map", 3, Arc::new(expand_map)));
        registry
    }

    pub fn register(&mut self, m: Macro) {
        self.macros.insert(m.key(), m);
    }

    pub fn find(&self, function: &str, arg_count: usize, receiver_style: bool) -> Option<&Macro> {
        self.macros
            .get(&macro_key(function, arg_count, receiver_style))
    }
}

/// `has(x.f)` becomes a presence-test select.
fn expand_has(
    helper: &mut dyn ExprHelper,
    _target: Option<Expr>,
    mut args: Vec<Expr>,
) -> Result<Option<Expr>, String> {
    let arg = args.remove(0);
    match arg.kind {
        ExprKind::Select {
            operand,
            field,
            test_only: false,
            optional: false,
        } => Ok(Some(helper.new_expr(ExprKind::Select {
            operand,
            field,
            test_only: true,
            optional: false,
        }))),
        _ => Err("invalid argument to has() macro".to_string()),
    }
}

fn iter_var_name(arg: &Expr) -> Result<String, String> {
    match &arg.kind {
        ExprKind::Ident(name) if name != ACCUMULATOR_VAR => Ok(name.clone()),
        _ => Err("argument must be a simple name".to_string()),
    }
}

fn accu_ident(helper: &mut dyn ExprHelper) -> Expr {
    helper.new_ident(ACCUMULATOR_VAR)
}

/// `e.all(v, p)`: a fold that stays true until a step turns it false, and
/// keeps iterating past errors and unknowns so they surface in the result.
fn expand_all(
    helper: &mut dyn ExprHelper,
    target: Option<Expr>,
    mut args: Vec<Expr>,
) -> Result<Option<Expr>, String> {
    let predicate = args.remove(1);
    let iter_var = iter_var_name(&args[0])?;
    let accu_init = helper.new_literal(Constant::Bool(true));
    let cond_arg = accu_ident(helper);
    let loop_cond = helper.new_call(NOT_STRICTLY_FALSE, vec![cond_arg]);
    let step_accu = accu_ident(helper);
    let loop_step = helper.new_call("_&&_", vec![step_accu, predicate]);
    let result = accu_ident(helper);
    Ok(Some(helper.new_fold(Comprehension {
        iter_range: target.ok_or("all() requires a receiver")?,
        iter_var,
        accu_var: ACCUMULATOR_VAR.to_string(),
        accu_init,
        loop_cond,
        loop_step,
        result,
    })))
}

fn expand_exists(
    helper: &mut dyn ExprHelper,
    target: Option<Expr>,
    mut args: Vec<Expr>,
) -> Result<Option<Expr>, String> {
    let predicate = args.remove(1);
    let iter_var = iter_var_name(&args[0])?;
    let accu_init = helper.new_literal(Constant::Bool(false));
    let cond_accu = accu_ident(helper);
    let negated = helper.new_call("!_", vec![cond_accu]);
    let loop_cond = helper.new_call(NOT_STRICTLY_FALSE, vec![negated]);
    let step_accu = accu_ident(helper);
    let loop_step = helper.new_call("_||_", vec![step_accu, predicate]);
    let result = accu_ident(helper);
    Ok(Some(helper.new_fold(Comprehension {
        iter_range: target.ok_or("exists() requires a receiver")?,
        iter_var,
        accu_var: ACCUMULATOR_VAR.to_string(),
        accu_init,
        loop_cond,
        loop_step,
        result,
    })))
}

/// `e.exists_one(v, p)`: counts matches, true iff exactly one.
fn expand_exists_one(
    helper: &mut dyn ExprHelper,
    target: Option<Expr>,
    mut args: Vec<Expr>,
) -> Result<Option<Expr>, String> {
    let predicate = args.remove(1);
    let iter_var = iter_var_name(&args[0])?;
    let accu_init = helper.new_literal(Constant::Int(0));
    let loop_cond = helper.new_literal(Constant::Bool(true));
    let step_accu = accu_ident(helper);
    let one = helper.new_literal(Constant::Int(1));
    let incremented = helper.new_call("_+_", vec![step_accu, one]);
    let else_accu = accu_ident(helper);
    let loop_step = helper.new_call("_?_:_", vec![predicate, incremented, else_accu]);
    let result_accu = accu_ident(helper);
    let expect_one = helper.new_literal(Constant::Int(1));
    let result = helper.new_call("_==_", vec![result_accu, expect_one]);
    Ok(Some(helper.new_fold(Comprehension {
        iter_range: target.ok_or("exists_one() requires a receiver")?,
        iter_var,
        accu_var: ACCUMULATOR_VAR.to_string(),
        accu_init,
        loop_cond,
        loop_step,
        result,
    })))
}

fn expand_filter(
    helper: &mut dyn ExprHelper,
    target: Option<Expr>,
    mut args: Vec<Expr>,
) -> Result<Option<Expr>, String> {
    let predicate = args.remove(1);
    let iter_var = iter_var_name(&args[0])?;
    let elem = args.remove(0);
    let accu_init = helper.new_expr(ExprKind::List {
        elements: vec![],
        optional_indices: vec![],
    });
    let loop_cond = helper.new_literal(Constant::Bool(true));
    let step_accu = accu_ident(helper);
    let singleton = helper.new_expr(ExprKind::List {
        elements: vec![elem],
        optional_indices: vec![],
    });
    let appended = helper.new_call("_+_", vec![step_accu, singleton]);
    let else_accu = accu_ident(helper);
    let loop_step = helper.new_call("_?_:_", vec![predicate, appended, else_accu]);
    let result = accu_ident(helper);
    Ok(Some(helper.new_fold(Comprehension {
        iter_range: target.ok_or("filter() requires a receiver")?,
        iter_var,
        accu_var: ACCUMULATOR_VAR.to_string(),
        accu_init,
        loop_cond,
        loop_step,
        result,
    })))
}

/// `e.map(v, t)` and `e.map(v, f, t)`.
fn expand_map(
    helper: &mut dyn ExprHelper,
    target: Option<Expr>,
    mut args: Vec<Expr>,
) -> Result<Option<Expr>, String> {
    let iter_var = iter_var_name(&args[0])?;
    let (filter, transform) = if args.len() == 3 {
        let transform = args.remove(2);
        (Some(args.remove(1)), transform)
    } else {
        (None, args.remove(1))
    };
    let accu_init = helper.new_expr(ExprKind::List {
        elements: vec![],
        optional_indices: vec![],
    });
    let loop_cond = helper.new_literal(Constant::Bool(true));
    let step_accu = accu_ident(helper);
    let singleton = helper.new_expr(ExprKind::List {
        elements: vec![transform],
        optional_indices: vec![],
    });
    let appended = helper.new_call("_+_", vec![step_accu, singleton]);
    let loop_step = match filter {
        Some(f) => {
            let else_accu = accu_ident(helper);
            helper.new_call("_?_:_", vec![f, appended, else_accu])
        }
        None => appended,
    };
    let result = accu_ident(helper);
    Ok(Some(helper.new_fold(Comprehension {
        iter_range: target.ok_or("map() requires a receiver")?,
        iter_var,
        accu_var: ACCUMULATOR_VAR.to_string(),
        accu_init,
        loop_cond,
        loop_step,
        result,
    })))
}
