//! Expression trees.
//!
//! The parser produces an [`Ast`] whose node ids are unique and dense;
//! checking fills the side tables (`type_map`, `reference_map`) without
//! rewriting the tree. Source offsets live in [`SourceInfo`] so both planes
//! of error reporting can print caret excerpts.

use std::collections::HashMap;
use std::sync::Arc;

use verdict_core::types::Type;
use verdict_core::value::Value;

pub type ExprId = i64;

/// A literal constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Constant {
    pub fn to_value(&self) -> Value {
        match self {
            Constant::Null => Value::Null,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(i) => Value::Int(*i),
            Constant::Uint(u) => Value::Uint(*u),
            Constant::Double(d) => Value::Double(*d),
            Constant::String(s) => Value::string(s.as_str()),
            Constant::Bytes(b) => Value::bytes(b.clone()),
        }
    }

    pub fn type_of(&self) -> Type {
        match self {
            Constant::Null => Type::Null,
            Constant::Bool(_) => Type::Bool,
            Constant::Int(_) => Type::Int,
            Constant::Uint(_) => Type::Uint,
            Constant::Double(_) => Type::Double,
            Constant::String(_) => Type::String,
            Constant::Bytes(_) => Type::Bytes,
        }
    }
}

/// One expression node. Ids are assigned by the parser in creation order
/// starting from 1.
#[derive(Debug, Clone)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Constant),
    Ident(String),
    Select {
        operand: Box<Expr>,
        field: String,
        /// `has(x.f)` parses to a test-only select.
        test_only: bool,
        /// `x.?f` selects into an optional.
        optional: bool,
    },
    Call {
        /// Receiver for instance calls, absent for global calls.
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    List {
        elements: Vec<Expr>,
        /// Indices of `?`-marked elements, which splice only when present.
        optional_indices: Vec<usize>,
    },
    Map {
        entries: Vec<MapEntry>,
    },
    Struct {
        type_name: String,
        fields: Vec<StructField>,
    },
    Comprehension(Box<Comprehension>),
}

#[derive(Debug, Clone)]
pub struct MapEntry {
    pub id: ExprId,
    pub key: Expr,
    pub value: Expr,
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub id: ExprId,
    pub name: String,
    pub value: Expr,
    pub optional: bool,
}

/// The fold form every macro expands to.
#[derive(Debug, Clone)]
pub struct Comprehension {
    pub iter_range: Expr,
    pub iter_var: String,
    pub accu_var: String,
    pub accu_init: Expr,
    pub loop_cond: Expr,
    pub loop_step: Expr,
    pub result: Expr,
}

impl Expr {
    pub fn literal(id: ExprId, constant: Constant) -> Expr {
        Expr {
            id,
            kind: ExprKind::Literal(constant),
        }
    }

    pub fn ident(id: ExprId, name: impl Into<String>) -> Expr {
        Expr {
            id,
            kind: ExprKind::Ident(name.into()),
        }
    }

    pub fn call(id: ExprId, function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr {
            id,
            kind: ExprKind::Call {
                target: None,
                function: function.into(),
                args,
            },
        }
    }

    pub fn member_call(
        id: ExprId,
        target: Expr,
        function: impl Into<String>,
        args: Vec<Expr>,
    ) -> Expr {
        Expr {
            id,
            kind: ExprKind::Call {
                target: Some(Box::new(target)),
                function: function.into(),
                args,
            },
        }
    }

    pub fn select(id: ExprId, operand: Expr, field: impl Into<String>) -> Expr {
        Expr {
            id,
            kind: ExprKind::Select {
                operand: Box::new(operand),
                field: field.into(),
                test_only: false,
                optional: false,
            },
        }
    }

    /// The qualified name this expression spells, if it is a plain
    /// ident/select chain (`a.b.c`).
    pub fn qualified_name(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name.clone()),
            ExprKind::Select {
                operand,
                field,
                test_only: false,
                optional: false,
            } => operand
                .qualified_name()
                .map(|prefix| format!("{prefix}.{field}")),
            _ => None,
        }
    }

    /// Walks the tree, visiting each node.
    pub fn visit(&self, visit: &mut impl FnMut(&Expr)) {
        visit(self);
        match &self.kind {
            ExprKind::Literal(_) | ExprKind::Ident(_) => {}
            ExprKind::Select { operand, .. } => operand.visit(visit),
            ExprKind::Call { target, args, .. } => {
                if let Some(t) = target {
                    t.visit(visit);
                }
                for arg in args {
                    arg.visit(visit);
                }
            }
            ExprKind::List { elements, .. } => {
                for elem in elements {
                    elem.visit(visit);
                }
            }
            ExprKind::Map { entries } => {
                for entry in entries {
                    entry.key.visit(visit);
                    entry.value.visit(visit);
                }
            }
            ExprKind::Struct { fields, .. } => {
                for field in fields {
                    field.value.visit(visit);
                }
            }
            ExprKind::Comprehension(fold) => {
                fold.iter_range.visit(visit);
                fold.accu_init.visit(visit);
                fold.loop_cond.visit(visit);
                fold.loop_step.visit(visit);
                fold.result.visit(visit);
            }
        }
    }
}

/// Resolution recorded for an ident, select, call, or struct node.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A variable or type, by fully-qualified name.
    Ident(String),
    /// A name that folded to a constant (enum values).
    Constant { name: String, value: Constant },
    /// The overloads a call may dispatch to.
    Function { overload_ids: Vec<String> },
}

/// Source text plus the byte-offset bookkeeping for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    pub source: Arc<str>,
    /// Byte offset of each expression node.
    pub positions: HashMap<ExprId, usize>,
    /// Byte offset of the start of each line.
    pub line_offsets: Vec<usize>,
    /// Macro provenance: expanded node id to the original call form.
    pub macro_calls: HashMap<ExprId, String>,
}

impl SourceInfo {
    pub fn new(source: &str) -> SourceInfo {
        let mut line_offsets = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_offsets.push(i + 1);
            }
        }
        SourceInfo {
            source: Arc::from(source),
            positions: HashMap::new(),
            line_offsets,
            macro_calls: HashMap::new(),
        }
    }

    /// 1-based line and column for a byte offset.
    pub fn location(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_offsets.binary_search(&offset) {
            Ok(exact) => exact,
            Err(insert) => insert.saturating_sub(1),
        };
        let line_start = self.line_offsets[line];
        let column = self.source[line_start..offset.min(self.source.len())]
            .chars()
            .count();
        (line + 1, column + 1)
    }

    /// The text of the (1-based) line, without its newline.
    pub fn line_text(&self, line: usize) -> &str {
        let start = self.line_offsets.get(line - 1).copied().unwrap_or(0);
        let end = self
            .line_offsets
            .get(line)
            .map(|next| next.saturating_sub(1))
            .unwrap_or(self.source.len());
        &self.source[start..end]
    }
}

/// A parsed (and possibly checked) expression with its side tables.
#[derive(Debug, Clone)]
pub struct Ast {
    pub expr: Expr,
    pub source_info: SourceInfo,
    pub type_map: HashMap<ExprId, Type>,
    pub reference_map: HashMap<ExprId, Reference>,
}

impl Ast {
    pub fn parsed(expr: Expr, source_info: SourceInfo) -> Ast {
        Ast {
            expr,
            source_info,
            type_map: HashMap::new(),
            reference_map: HashMap::new(),
        }
    }

    pub fn is_checked(&self) -> bool {
        !self.type_map.is_empty()
    }

    /// The inferred type of the whole expression, `dyn` when unchecked.
    pub fn result_type(&self) -> Type {
        self.type_map
            .get(&self.expr.id)
            .cloned()
            .unwrap_or(Type::Dyn)
    }
}
