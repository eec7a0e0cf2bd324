//! Collected compile-time diagnostics.
//!
//! Compilation gathers issues instead of stopping at the first failure.
//! Each issue carries a byte offset, a short kind, and a message; rendering
//! prints the offending line with a caret underneath the column.

use std::fmt;

use crate::ast::SourceInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Syntax,
    UndeclaredReference,
    NoMatchingOverload,
    TypeMismatch,
    BadMacro,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Syntax => "syntax",
            IssueKind::UndeclaredReference => "undeclared reference",
            IssueKind::NoMatchingOverload => "no matching overload",
            IssueKind::TypeMismatch => "type mismatch",
            IssueKind::BadMacro => "bad macro",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileError {
    pub offset: usize,
    pub kind: IssueKind,
    pub message: String,
}

impl CompileError {
    pub fn new(offset: usize, kind: IssueKind, message: impl Into<String>) -> CompileError {
        CompileError {
            offset,
            kind,
            message: message.into(),
        }
    }
}

/// All issues from one compilation, with enough source context to render.
#[derive(Debug, Clone)]
pub struct Issues {
    errors: Vec<CompileError>,
    source_info: SourceInfo,
}

impl Issues {
    pub fn new(errors: Vec<CompileError>, source_info: SourceInfo) -> Issues {
        Issues {
            errors,
            source_info,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }
}

impl fmt::Display for Issues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let (line, column) = self.source_info.location(err.offset);
            writeln!(
                f,
                "ERROR: <input>:{line}:{column}: {}: {}",
                err.kind.as_str(),
                err.message
            )?;
            let text = self.source_info.line_text(line);
            writeln!(f, " | {text}")?;
            write!(f, " | {}^", ".".repeat(column.saturating_sub(1)))?;
        }
        Ok(())
    }
}

impl std::error::Error for Issues {}
