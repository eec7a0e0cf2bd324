//! Renders an AST back to source text.
//!
//! Used to display residual ASTs after partial evaluation and in
//! diagnostics. The output is semantics-preserving, not byte-identical:
//! parentheses appear only where precedence demands them, and expanded
//! comprehensions render in their fold form.

use crate::ast::{Constant, Expr, ExprKind};

/// Operator precedence, higher binds tighter.
fn precedence(function: &str) -> Option<u8> {
    match function {
        "_?_:_" => Some(1),
        "_||_" => Some(2),
        "_&&_" => Some(3),
        "_==_" | "_!=_" | "_<_" | "_<=_" | "_>_" | "_>=_" | "@in" => Some(4),
        "_+_" | "_-_" => Some(5),
        "_*_" | "_/_" | "_%_" => Some(6),
        "!_" | "-_" => Some(7),
        _ => None,
    }
}

fn operator_symbol(function: &str) -> &str {
    match function {
        "_||_" => "||",
        "_&&_" => "&&",
        "_==_" => "==",
        "_!=_" => "!=",
        "_<_" => "<",
        "_<=_" => "<=",
        "_>_" => ">",
        "_>=_" => ">=",
        "@in" => "in",
        "_+_" => "+",
        "_-_" => "-",
        "_*_" => "*",
        "_/_" => "/",
        "_%_" => "%",
        other => other,
    }
}

pub fn unparse(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out
}

fn write_expr(out: &mut String, expr: &Expr, parent_precedence: u8) {
    match &expr.kind {
        ExprKind::Literal(constant) => write_constant(out, constant),
        ExprKind::Ident(name) => out.push_str(name),
        ExprKind::Select {
            operand,
            field,
            test_only,
            optional,
        } => {
            if *test_only {
                out.push_str("has(");
                write_expr(out, operand, 0);
                out.push('.');
                out.push_str(field);
                out.push(')');
            } else {
                write_expr(out, operand, 8);
                out.push_str(if *optional { ".?" } else { "." });
                out.push_str(field);
            }
        }
        ExprKind::Call {
            target,
            function,
            args,
        } => write_call(out, target.as_deref(), function, args, parent_precedence),
        ExprKind::List {
            elements,
            optional_indices,
        } => {
            out.push('[');
            for (i, elem) in elements.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if optional_indices.contains(&i) {
                    out.push('?');
                }
                write_expr(out, elem, 0);
            }
            out.push(']');
        }
        ExprKind::Map { entries } => {
            out.push('{');
            for (i, entry) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if entry.optional {
                    out.push('?');
                }
                write_expr(out, &entry.key, 0);
                out.push_str(": ");
                write_expr(out, &entry.value, 0);
            }
            out.push('}');
        }
        ExprKind::Struct { type_name, fields } => {
            out.push_str(type_name);
            out.push('{');
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if field.optional {
                    out.push('?');
                }
                out.push_str(&field.name);
                out.push_str(": ");
                write_expr(out, &field.value, 0);
            }
            out.push('}');
        }
        ExprKind::Comprehension(fold) => {
            // Folds have no surface syntax of their own; render the
            // expanded form explicitly.
            out.push_str("__comprehension__(");
            write_expr(out, &fold.iter_range, 0);
            out.push_str(", ");
            out.push_str(&fold.iter_var);
            out.push_str(", ");
            out.push_str(&fold.accu_var);
            out.push_str(", ");
            write_expr(out, &fold.accu_init, 0);
            out.push_str(", ");
            write_expr(out, &fold.loop_cond, 0);
            out.push_str(", ");
            write_expr(out, &fold.loop_step, 0);
            out.push_str(", ");
            write_expr(out, &fold.result, 0);
            out.push(')');
        }
    }
}

fn write_call(
    out: &mut String,
    target: Option<&Expr>,
    function: &str,
    args: &[Expr],
    parent_precedence: u8,
) {
    if function == "_?_:_" && args.len() == 3 {
        let needs_parens = parent_precedence > 1;
        if needs_parens {
            out.push('(');
        }
        write_expr(out, &args[0], 2);
        out.push_str(" ? ");
        write_expr(out, &args[1], 2);
        out.push_str(" : ");
        write_expr(out, &args[2], 1);
        if needs_parens {
            out.push(')');
        }
        return;
    }
    if function == "_[_]" && args.len() == 2 {
        write_expr(out, &args[0], 8);
        out.push('[');
        write_expr(out, &args[1], 0);
        out.push(']');
        return;
    }
    if function == "_[?_]" && args.len() == 2 {
        write_expr(out, &args[0], 8);
        out.push_str("[?");
        write_expr(out, &args[1], 0);
        out.push(']');
        return;
    }
    if let Some(prec) = precedence(function) {
        match args.len() {
            1 => {
                let needs_parens = parent_precedence > prec;
                if needs_parens {
                    out.push('(');
                }
                out.push_str(operator_symbol(function));
                write_expr(out, &args[0], prec);
                if needs_parens {
                    out.push(')');
                }
                return;
            }
            2 => {
                let needs_parens = parent_precedence > prec;
                if needs_parens {
                    out.push('(');
                }
                // Left-associative: the right operand needs one level more.
                write_expr(out, &args[0], prec);
                out.push(' ');
                out.push_str(operator_symbol(function));
                out.push(' ');
                write_expr(out, &args[1], prec + 1);
                if needs_parens {
                    out.push(')');
                }
                return;
            }
            _ => {}
        }
    }
    if let Some(t) = target {
        write_expr(out, t, 8);
        out.push('.');
    }
    out.push_str(function);
    out.push('(');
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, arg, 0);
    }
    out.push(')');
}

fn write_constant(out: &mut String, constant: &Constant) {
    match constant {
        Constant::Null => out.push_str("null"),
        Constant::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Constant::Int(i) => out.push_str(&i.to_string()),
        Constant::Uint(u) => {
            out.push_str(&u.to_string());
            out.push('u');
        }
        Constant::Double(d) => {
            let text = format!("{d}");
            out.push_str(&text);
            // Keep the literal a double on re-parse.
            if !text.contains(['.', 'e', 'E', 'N', 'i']) {
                out.push_str(".0");
            }
        }
        Constant::String(s) => {
            out.push('"');
            for c in s.chars() {
                match c {
                    '"' => out.push_str("\\\""),
                    '\\' => out.push_str("\\\\"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
        Constant::Bytes(b) => {
            out.push_str("b\"");
            for byte in b {
                if byte.is_ascii_graphic() || *byte == b' ' {
                    match *byte as char {
                        '"' => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        c => out.push(c),
                    }
                } else {
                    out.push_str(&format!("\\x{byte:02x}"));
                }
            }
            out.push('"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn round_trip(source: &str) -> String {
        let ast = parse(source).unwrap();
        unparse(&ast.expr)
    }

    #[test]
    fn test_operators_and_precedence() {
        assert_eq!(round_trip("1 + 2 * 3"), "1 + 2 * 3");
        assert_eq!(round_trip("(1 + 2) * 3"), "(1 + 2) * 3");
        assert_eq!(round_trip("a && b || c"), "a && b || c");
        assert_eq!(round_trip("a && (b || c)"), "a && (b || c)");
        assert_eq!(round_trip("!(a == b)"), "!(a == b)");
    }

    #[test]
    fn test_selects_calls_and_indexes() {
        assert_eq!(
            round_trip("request.auth.claims.email == 'wiley@acme.co'"),
            "request.auth.claims.email == \"wiley@acme.co\""
        );
        assert_eq!(round_trip("m['k'].startsWith('a')"), "m[\"k\"].startsWith(\"a\")");
        assert_eq!(round_trip("has(a.b)"), "has(a.b)");
        assert_eq!(round_trip("xs[?0]"), "xs[?0]");
    }

    #[test]
    fn test_literals() {
        assert_eq!(round_trip("[1, 2u, 2.5, 2.0]"), "[1, 2u, 2.5, 2.0]");
        assert_eq!(round_trip("{'a': b'\\x00'}"), "{\"a\": b\"\\x00\"}");
        assert_eq!(round_trip("T{f: 1, ?g: optional.of(2)}").contains("?g:"), true);
    }

    #[test]
    fn test_ternary_nesting() {
        assert_eq!(round_trip("a ? b : c ? d : e"), "a ? b : c ? d : e");
        assert_eq!(round_trip("(a ? b : c) == d"), "(a ? b : c) == d");
    }

    #[test]
    fn test_reparse_stability() {
        for source in [
            "1 + 2 * 3 - -4",
            "a.b.c[0] in xs && !(y > 2.5)",
            "'x' + \"y\"",
        ] {
            let once = round_trip(source);
            let ast = parse(&once).unwrap();
            assert_eq!(unparse(&ast.expr), once);
        }
    }
}
