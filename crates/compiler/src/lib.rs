//! Verdict compiler: parser, macro expander, and type checker.
//!
//! The compile pipeline is `source -> parsed AST -> checked AST`; the
//! runtime crate plans checked ASTs into evaluable programs. Parsing
//! expands macros, so the checker only deals in literals, identifiers,
//! selects, calls, aggregates, and comprehensions.

pub mod ast;
pub mod checker;
pub mod container;
pub mod cost;
pub mod decls;
pub mod issues;
pub mod macros;
pub mod parser;
pub mod stdlib;
pub mod unparser;

pub use ast::{Ast, Constant, Expr, ExprId, ExprKind, Reference, SourceInfo};
pub use checker::{check_ast, CheckerOptions};
pub use container::Container;
pub use cost::{estimate_cost, CostEstimate, CostHints, NoHints};
pub use decls::{DeclScope, Declaration, FunctionDecl, OverloadDecl, VariableDecl};
pub use issues::{CompileError, IssueKind, Issues};
pub use macros::{Macro, MacroRegistry};
pub use parser::{parse, parse_with_macros, Parser};
pub use stdlib::standard_declarations;
pub use unparser::unparse;
