//! Residual AST construction.
//!
//! After a tracked evaluation with unknowns, the original AST is rewritten
//! so that every subtree whose value resolved becomes a literal, while
//! unknown subtrees stay intact. Evaluating the residual against the
//! previously-unknown attributes gives the same result as evaluating the
//! original against full bindings.

use verdict_compiler::ast::{Ast, Constant, Expr, ExprKind, MapEntry, StructField};
use verdict_core::value::Value;

use crate::evalstate::EvalState;

/// Builds the residual of `ast` given tracked evaluation state.
pub fn residual_ast(ast: &Ast, state: &EvalState) -> Ast {
    let expr = prune_expr(&ast.expr, state);
    // The residual is a parsed (unchecked) AST: side tables no longer
    // match the rewritten tree.
    Ast::parsed(expr, ast.source_info.clone())
}

fn known_constant(state: &EvalState, id: i64) -> Option<Constant> {
    match state.value(id)? {
        Value::Null => Some(Constant::Null),
        Value::Bool(b) => Some(Constant::Bool(*b)),
        Value::Int(i) => Some(Constant::Int(*i)),
        Value::Uint(u) => Some(Constant::Uint(*u)),
        Value::Double(d) => Some(Constant::Double(*d)),
        Value::String(s) => Some(Constant::String(s.to_string())),
        Value::Bytes(b) => Some(Constant::Bytes(b.to_vec())),
        _ => None,
    }
}

fn known_bool(state: &EvalState, id: i64) -> Option<bool> {
    match state.value(id) {
        Some(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

fn prune_expr(expr: &Expr, state: &EvalState) -> Expr {
    // A subtree that resolved to a scalar collapses to a literal.
    if let Some(constant) = known_constant(state, expr.id) {
        return Expr::literal(expr.id, constant);
    }
    match &expr.kind {
        ExprKind::Call {
            target: None,
            function,
            args,
        } if (function == "_&&_" || function == "_||_") && args.len() == 2 => {
            let absorbing = function == "_||_"; // true absorbs `||`, false absorbs `&&`
            match (known_bool(state, args[0].id), known_bool(state, args[1].id)) {
                (Some(lhs), _) if lhs == absorbing => {
                    Expr::literal(expr.id, Constant::Bool(absorbing))
                }
                (_, Some(rhs)) if rhs == absorbing => {
                    Expr::literal(expr.id, Constant::Bool(absorbing))
                }
                // The resolved, non-deciding side drops away.
                (Some(_), _) => prune_expr(&args[1], state),
                (_, Some(_)) => prune_expr(&args[0], state),
                _ => Expr {
                    id: expr.id,
                    kind: ExprKind::Call {
                        target: None,
                        function: function.clone(),
                        args: vec![prune_expr(&args[0], state), prune_expr(&args[1], state)],
                    },
                },
            }
        }
        ExprKind::Call {
            target: None,
            function,
            args,
        } if function == "_?_:_" && args.len() == 3 => match known_bool(state, args[0].id) {
            Some(true) => prune_expr(&args[1], state),
            Some(false) => prune_expr(&args[2], state),
            None => Expr {
                id: expr.id,
                kind: ExprKind::Call {
                    target: None,
                    function: function.clone(),
                    args: args.iter().map(|a| prune_expr(a, state)).collect(),
                },
            },
        },
        ExprKind::Call {
            target,
            function,
            args,
        } => Expr {
            id: expr.id,
            kind: ExprKind::Call {
                target: target
                    .as_ref()
                    .map(|t| Box::new(prune_expr(t, state))),
                function: function.clone(),
                args: args.iter().map(|a| prune_expr(a, state)).collect(),
            },
        },
        ExprKind::Select {
            operand,
            field,
            test_only,
            optional,
        } => Expr {
            id: expr.id,
            kind: ExprKind::Select {
                operand: Box::new(prune_expr(operand, state)),
                field: field.clone(),
                test_only: *test_only,
                optional: *optional,
            },
        },
        ExprKind::List {
            elements,
            optional_indices,
        } => Expr {
            id: expr.id,
            kind: ExprKind::List {
                elements: elements.iter().map(|e| prune_expr(e, state)).collect(),
                optional_indices: optional_indices.clone(),
            },
        },
        ExprKind::Map { entries } => Expr {
            id: expr.id,
            kind: ExprKind::Map {
                entries: entries
                    .iter()
                    .map(|entry| MapEntry {
                        id: entry.id,
                        key: prune_expr(&entry.key, state),
                        value: prune_expr(&entry.value, state),
                        optional: entry.optional,
                    })
                    .collect(),
            },
        },
        ExprKind::Struct { type_name, fields } => Expr {
            id: expr.id,
            kind: ExprKind::Struct {
                type_name: type_name.clone(),
                fields: fields
                    .iter()
                    .map(|field| StructField {
                        id: field.id,
                        name: field.name.clone(),
                        value: prune_expr(&field.value, state),
                        optional: field.optional,
                    })
                    .collect(),
            },
        },
        ExprKind::Comprehension(fold) => Expr {
            id: expr.id,
            kind: ExprKind::Comprehension(Box::new(verdict_compiler::ast::Comprehension {
                iter_range: prune_expr(&fold.iter_range, state),
                iter_var: fold.iter_var.clone(),
                accu_var: fold.accu_var.clone(),
                accu_init: prune_expr(&fold.accu_init, state),
                loop_cond: fold.loop_cond.clone(),
                loop_step: fold.loop_step.clone(),
                result: fold.result.clone(),
            })),
        },
        ExprKind::Literal(_) | ExprKind::Ident(_) => expr.clone(),
    }
}
