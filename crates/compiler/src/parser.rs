//! Lexer and recursive-descent parser.
//!
//! Produces a parsed [`Ast`] with unique, dense node ids and a byte-offset
//! position for every node. Macros expand here, so downstream phases only
//! see plain calls, selects, and comprehensions.

use crate::ast::{Ast, Constant, Expr, ExprKind, MapEntry, SourceInfo, StructField};
use crate::issues::{CompileError, IssueKind};
use crate::macros::{ExprHelper, MacroRegistry};

/// Words reserved by the grammar and unavailable as identifiers.
const RESERVED: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let",
    "loop", "package", "namespace", "return", "var", "void", "while",
];

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    /// Integer magnitude; the parser applies sign and range checks.
    Int(u64),
    Uint(u64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Not,
    NotEq,
    EqEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

fn syntax_error(offset: usize, message: impl Into<String>) -> CompileError {
    CompileError::new(offset, IssueKind::Syntax, message)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Lexer<'a> {
        Lexer {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|(i, _)| *i)
            .unwrap_or(self.source.len())
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            // Skip whitespace and line comments.
            loop {
                match self.peek() {
                    Some(c) if c.is_whitespace() => {
                        self.pos += 1;
                    }
                    Some('/') if self.peek_at(1) == Some('/') => {
                        while let Some(c) = self.peek() {
                            if c == '\n' {
                                break;
                            }
                            self.pos += 1;
                        }
                    }
                    _ => break,
                }
            }
            let offset = self.offset();
            let Some(c) = self.peek() else { break };
            let tok = match c {
                '(' => {
                    self.pos += 1;
                    Tok::LParen
                }
                ')' => {
                    self.pos += 1;
                    Tok::RParen
                }
                '[' => {
                    self.pos += 1;
                    Tok::LBracket
                }
                ']' => {
                    self.pos += 1;
                    Tok::RBracket
                }
                '{' => {
                    self.pos += 1;
                    Tok::LBrace
                }
                '}' => {
                    self.pos += 1;
                    Tok::RBrace
                }
                ',' => {
                    self.pos += 1;
                    Tok::Comma
                }
                '.' => {
                    self.pos += 1;
                    Tok::Dot
                }
                ':' => {
                    self.pos += 1;
                    Tok::Colon
                }
                '?' => {
                    self.pos += 1;
                    Tok::Question
                }
                '+' => {
                    self.pos += 1;
                    Tok::Plus
                }
                '-' => {
                    self.pos += 1;
                    Tok::Minus
                }
                '*' => {
                    self.pos += 1;
                    Tok::Star
                }
                '/' => {
                    self.pos += 1;
                    Tok::Slash
                }
                '%' => {
                    self.pos += 1;
                    Tok::Percent
                }
                '!' => {
                    self.pos += 1;
                    if self.eat('=') { Tok::NotEq } else { Tok::Not }
                }
                '=' => {
                    self.pos += 1;
                    if self.eat('=') {
                        Tok::EqEq
                    } else {
                        return Err(syntax_error(offset, "unexpected '='"));
                    }
                }
                '<' => {
                    self.pos += 1;
                    if self.eat('=') { Tok::LessEq } else { Tok::Less }
                }
                '>' => {
                    self.pos += 1;
                    if self.eat('=') {
                        Tok::GreaterEq
                    } else {
                        Tok::Greater
                    }
                }
                '&' => {
                    self.pos += 1;
                    if self.eat('&') {
                        Tok::AndAnd
                    } else {
                        return Err(syntax_error(offset, "unexpected '&'"));
                    }
                }
                '|' => {
                    self.pos += 1;
                    if self.eat('|') {
                        Tok::OrOr
                    } else {
                        return Err(syntax_error(offset, "unexpected '|'"));
                    }
                }
                '"' | '\'' => self.read_string(offset, false, false)?,
                c if c.is_ascii_digit() => self.read_number(offset)?,
                c if is_ident_start(c) => {
                    // String prefixes: r, b, rb, br in any case.
                    if let Some(tok) = self.try_read_prefixed_string(offset)? {
                        tok
                    } else {
                        self.read_ident()
                    }
                }
                other => {
                    return Err(syntax_error(offset, format!("unexpected character {other:?}")));
                }
            };
            tokens.push(Token { tok, offset });
        }
        Ok(tokens)
    }

    fn read_ident(&mut self) -> Tok {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        match name.as_str() {
            "true" => Tok::True,
            "false" => Tok::False,
            "null" => Tok::Null,
            "in" => Tok::In,
            _ => Tok::Ident(name),
        }
    }

    fn try_read_prefixed_string(&mut self, offset: usize) -> Result<Option<Tok>, CompileError> {
        let mut raw = false;
        let mut bytes = false;
        let mut ahead = 0;
        loop {
            match self.peek_at(ahead) {
                Some('r') | Some('R') if !raw => {
                    raw = true;
                    ahead += 1;
                }
                Some('b') | Some('B') if !bytes => {
                    bytes = true;
                    ahead += 1;
                }
                Some('"') | Some('\'') if ahead > 0 => {
                    self.pos += ahead;
                    return self.read_string(offset, raw, bytes).map(Some);
                }
                _ => return Ok(None),
            }
        }
    }

    fn read_string(
        &mut self,
        offset: usize,
        raw: bool,
        bytes: bool,
    ) -> Result<Tok, CompileError> {
        let quote = self.bump().expect("quote char");
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        let mut text = String::new();
        let mut octets: Vec<u8> = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(syntax_error(offset, "unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
                self.pos += 1;
                push_char(c, bytes, &mut text, &mut octets);
                continue;
            }
            if c == '\n' && !triple {
                return Err(syntax_error(offset, "unterminated string literal"));
            }
            if c == '\\' && !raw {
                self.pos += 1;
                self.read_escape(offset, bytes, &mut text, &mut octets)?;
                continue;
            }
            self.pos += 1;
            push_char(c, bytes, &mut text, &mut octets);
        }
        if bytes {
            Ok(Tok::Bytes(octets))
        } else {
            Ok(Tok::Str(text))
        }
    }

    fn read_escape(
        &mut self,
        offset: usize,
        bytes: bool,
        text: &mut String,
        octets: &mut Vec<u8>,
    ) -> Result<(), CompileError> {
        let Some(c) = self.bump() else {
            return Err(syntax_error(offset, "unterminated escape sequence"));
        };
        let simple = match c {
            'a' => Some('\x07'),
            'b' => Some('\x08'),
            'f' => Some('\x0c'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\x0b'),
            '\\' => Some('\\'),
            '\'' => Some('\''),
            '"' => Some('"'),
            '`' => Some('`'),
            '?' => Some('?'),
            _ => None,
        };
        if let Some(ch) = simple {
            push_char(ch, bytes, text, octets);
            return Ok(());
        }
        match c {
            'x' | 'X' => {
                let value = self.read_hex_digits(offset, 2)?;
                push_byte_escape(value, bytes, text, octets, offset)
            }
            'u' => {
                let value = self.read_hex_digits(offset, 4)?;
                push_unicode_escape(value, bytes, text, octets, offset)
            }
            'U' => {
                let value = self.read_hex_digits(offset, 8)?;
                push_unicode_escape(value, bytes, text, octets, offset)
            }
            '0'..='7' => {
                // Octal: exactly three digits including the first.
                let mut value = c.to_digit(8).unwrap();
                for _ in 0..2 {
                    let Some(d) = self.bump().and_then(|c| c.to_digit(8)) else {
                        return Err(syntax_error(offset, "invalid octal escape"));
                    };
                    value = value * 8 + d;
                }
                push_byte_escape(value, bytes, text, octets, offset)
            }
            other => Err(syntax_error(
                offset,
                format!("invalid escape sequence \\{other}"),
            )),
        }
    }

    fn read_hex_digits(&mut self, offset: usize, count: usize) -> Result<u32, CompileError> {
        let mut value = 0u32;
        for _ in 0..count {
            let Some(d) = self.bump().and_then(|c| c.to_digit(16)) else {
                return Err(syntax_error(offset, "invalid hex escape"));
            };
            value = value * 16 + d;
        }
        Ok(value)
    }

    fn read_number(&mut self, offset: usize) -> Result<Tok, CompileError> {
        // Hex.
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            let mut value: u64 = 0;
            let mut any = false;
            while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
                value = value
                    .checked_mul(16)
                    .and_then(|v| v.checked_add(u64::from(d)))
                    .ok_or_else(|| syntax_error(offset, "integer literal out of range"))?;
                self.pos += 1;
                any = true;
            }
            if !any {
                return Err(syntax_error(offset, "invalid hex literal"));
            }
            if self.eat('u') || self.eat('U') {
                return Ok(Tok::Uint(value));
            }
            return Ok(Tok::Int(value));
        }
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_double = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some('+') | Some('-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                self.pos += ahead;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let end_offset = self.offset();
        let start_offset = self.chars[start].0;
        let literal = &self.source[start_offset..end_offset];
        if is_double {
            let value: f64 = literal
                .parse()
                .map_err(|_| syntax_error(offset, "invalid floating point literal"))?;
            return Ok(Tok::Double(value));
        }
        if self.eat('u') || self.eat('U') {
            let value: u64 = literal
                .parse()
                .map_err(|_| syntax_error(offset, "unsigned integer literal out of range"))?;
            return Ok(Tok::Uint(value));
        }
        let value: u64 = literal
            .parse()
            .map_err(|_| syntax_error(offset, "integer literal out of range"))?;
        Ok(Tok::Int(value))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn push_char(c: char, bytes: bool, text: &mut String, octets: &mut Vec<u8>) {
    if bytes {
        let mut buf = [0u8; 4];
        octets.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    } else {
        text.push(c);
    }
}

fn push_byte_escape(
    value: u32,
    bytes: bool,
    text: &mut String,
    octets: &mut Vec<u8>,
    offset: usize,
) -> Result<(), CompileError> {
    if value > 0xff {
        return Err(syntax_error(offset, "byte escape out of range"));
    }
    if bytes {
        octets.push(value as u8);
        Ok(())
    } else {
        match char::from_u32(value) {
            Some(c) => {
                text.push(c);
                Ok(())
            }
            None => Err(syntax_error(offset, "invalid character escape")),
        }
    }
}

fn push_unicode_escape(
    value: u32,
    bytes: bool,
    text: &mut String,
    octets: &mut Vec<u8>,
    offset: usize,
) -> Result<(), CompileError> {
    if bytes {
        return Err(syntax_error(
            offset,
            "unicode escapes are not allowed in bytes literals",
        ));
    }
    match char::from_u32(value) {
        Some(c) => {
            text.push(c);
            Ok(())
        }
        None => Err(syntax_error(offset, "invalid unicode code point")),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    next_id: i64,
    source_info: SourceInfo,
    macros: &'a MacroRegistry,
    /// Offset used for nodes minted during macro expansion.
    expansion_offset: usize,
}

impl ExprHelper for Parser<'_> {
    fn new_expr(&mut self, kind: ExprKind) -> Expr {
        self.next_id += 1;
        let id = self.next_id;
        self.source_info
            .positions
            .insert(id, self.expansion_offset);
        Expr { id, kind }
    }
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, macros: &'a MacroRegistry) -> Result<Parser<'a>, CompileError> {
        let tokens = Lexer::new(source).tokenize()?;
        Ok(Parser {
            tokens,
            pos: 0,
            next_id: 0,
            source_info: SourceInfo::new(source),
            macros,
            expansion_offset: 0,
        })
    }

    /// Parses a complete expression; trailing tokens are an error.
    pub fn parse(mut self) -> Result<Ast, CompileError> {
        let expr = self.parse_expr()?;
        if let Some(tok) = self.tokens.get(self.pos) {
            return Err(syntax_error(
                tok.offset,
                format!("unexpected token after expression: {:?}", tok.tok),
            ));
        }
        Ok(Ast::parsed(expr, self.source_info))
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + ahead).map(|t| &t.tok)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.offset)
            .unwrap_or_else(|| self.source_info.source.len())
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == Some(tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, context: &str) -> Result<(), CompileError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(syntax_error(
                self.offset(),
                format!("expected {tok:?} {context}"),
            ))
        }
    }

    fn node(&mut self, offset: usize, kind: ExprKind) -> Expr {
        self.next_id += 1;
        let id = self.next_id;
        self.source_info.positions.insert(id, offset);
        Expr { id, kind }
    }

    /// expr := or ['?' or ':' expr]
    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        let cond = self.parse_or()?;
        if !self.check(&Tok::Question) {
            return Ok(cond);
        }
        let offset = self.offset();
        self.pos += 1;
        let then = self.parse_or()?;
        self.expect(Tok::Colon, "in conditional expression")?;
        let otherwise = self.parse_expr()?;
        Ok(self.node(
            offset,
            ExprKind::Call {
                target: None,
                function: "_?_:_".to_string(),
                args: vec![cond, then, otherwise],
            },
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_and()?;
        while self.check(&Tok::OrOr) {
            let offset = self.offset();
            self.pos += 1;
            let right = self.parse_and()?;
            left = self.node(
                offset,
                ExprKind::Call {
                    target: None,
                    function: "_||_".to_string(),
                    args: vec![left, right],
                },
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_relation()?;
        while self.check(&Tok::AndAnd) {
            let offset = self.offset();
            self.pos += 1;
            let right = self.parse_relation()?;
            left = self.node(
                offset,
                ExprKind::Call {
                    target: None,
                    function: "_&&_".to_string(),
                    args: vec![left, right],
                },
            );
        }
        Ok(left)
    }

    fn parse_relation(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_addition()?;
        loop {
            let function = match self.peek() {
                Some(Tok::Less) => "_<_",
                Some(Tok::LessEq) => "_<=_",
                Some(Tok::Greater) => "_>_",
                Some(Tok::GreaterEq) => "_>=_",
                Some(Tok::EqEq) => "_==_",
                Some(Tok::NotEq) => "_!=_",
                Some(Tok::In) => "@in",
                _ => return Ok(left),
            };
            let offset = self.offset();
            self.pos += 1;
            let right = self.parse_addition()?;
            left = self.node(
                offset,
                ExprKind::Call {
                    target: None,
                    function: function.to_string(),
                    args: vec![left, right],
                },
            );
        }
    }

    fn parse_addition(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_multiplication()?;
        loop {
            let function = match self.peek() {
                Some(Tok::Plus) => "_+_",
                Some(Tok::Minus) => "_-_",
                _ => return Ok(left),
            };
            let offset = self.offset();
            self.pos += 1;
            let right = self.parse_multiplication()?;
            left = self.node(
                offset,
                ExprKind::Call {
                    target: None,
                    function: function.to_string(),
                    args: vec![left, right],
                },
            );
        }
    }

    fn parse_multiplication(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let function = match self.peek() {
                Some(Tok::Star) => "_*_",
                Some(Tok::Slash) => "_/_",
                Some(Tok::Percent) => "_%_",
                _ => return Ok(left),
            };
            let offset = self.offset();
            self.pos += 1;
            let right = self.parse_unary()?;
            left = self.node(
                offset,
                ExprKind::Call {
                    target: None,
                    function: function.to_string(),
                    args: vec![left, right],
                },
            );
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Some(Tok::Not) => {
                let offset = self.offset();
                self.pos += 1;
                let operand = self.parse_unary()?;
                Ok(self.node(
                    offset,
                    ExprKind::Call {
                        target: None,
                        function: "!_".to_string(),
                        args: vec![operand],
                    },
                ))
            }
            Some(Tok::Minus) => {
                let offset = self.offset();
                self.pos += 1;
                // Fold a minus applied directly to a numeric literal so that
                // i64::MIN is expressible.
                match self.peek() {
                    Some(Tok::Int(magnitude)) => {
                        let magnitude = *magnitude;
                        self.pos += 1;
                        let limit = (i64::MAX as u64) + 1;
                        if magnitude > limit {
                            return Err(syntax_error(offset, "integer literal out of range"));
                        }
                        let value = (magnitude as i64).wrapping_neg();
                        let literal = self.node(offset, ExprKind::Literal(Constant::Int(value)));
                        self.parse_member_suffix(literal)
                    }
                    Some(Tok::Double(d)) => {
                        let d = *d;
                        self.pos += 1;
                        let literal = self.node(offset, ExprKind::Literal(Constant::Double(-d)));
                        self.parse_member_suffix(literal)
                    }
                    _ => {
                        let operand = self.parse_unary()?;
                        Ok(self.node(
                            offset,
                            ExprKind::Call {
                                target: None,
                                function: "-_".to_string(),
                                args: vec![operand],
                            },
                        ))
                    }
                }
            }
            _ => self.parse_member(),
        }
    }

    fn parse_member(&mut self) -> Result<Expr, CompileError> {
        let primary = self.parse_primary()?;
        self.parse_member_suffix(primary)
    }

    fn parse_member_suffix(&mut self, mut expr: Expr) -> Result<Expr, CompileError> {
        loop {
            match self.peek() {
                Some(Tok::Dot) => {
                    let offset = self.offset();
                    self.pos += 1;
                    let optional = self.eat(&Tok::Question);
                    let field = self.expect_ident("after '.'")?;
                    if !optional && self.check(&Tok::LParen) {
                        self.pos += 1;
                        let args = self.parse_call_args()?;
                        expr = self.build_call(offset, Some(expr), field, args)?;
                    } else {
                        expr = self.node(
                            offset,
                            ExprKind::Select {
                                operand: Box::new(expr),
                                field,
                                test_only: false,
                                optional,
                            },
                        );
                    }
                }
                Some(Tok::LBracket) => {
                    let offset = self.offset();
                    self.pos += 1;
                    let optional = self.eat(&Tok::Question);
                    let index = self.parse_expr()?;
                    self.expect(Tok::RBracket, "after index expression")?;
                    let function = if optional { "_[?_]" } else { "_[_]" };
                    expr = self.node(
                        offset,
                        ExprKind::Call {
                            target: None,
                            function: function.to_string(),
                            args: vec![expr, index],
                        },
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, CompileError> {
        match self.peek() {
            Some(Tok::Ident(name)) => {
                if RESERVED.contains(&name.as_str()) {
                    return Err(syntax_error(
                        self.offset(),
                        format!("reserved word {name:?} cannot be used as an identifier"),
                    ));
                }
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(syntax_error(
                self.offset(),
                format!("expected identifier {context}"),
            )),
        }
    }

    fn parse_call_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut args = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&Tok::Comma) {
                continue;
            }
            self.expect(Tok::RParen, "after call arguments")?;
            return Ok(args);
        }
    }

    /// Builds a call node, giving a registered macro the chance to expand
    /// it instead.
    fn build_call(
        &mut self,
        offset: usize,
        target: Option<Expr>,
        function: String,
        args: Vec<Expr>,
    ) -> Result<Expr, CompileError> {
        if let Some(m) = self
            .macros
            .find(&function, args.len(), target.is_some())
            .cloned()
        {
            self.expansion_offset = offset;
            match (m.expander)(self, target.clone(), args.clone()) {
                Ok(Some(expanded)) => {
                    self.source_info
                        .macro_calls
                        .insert(expanded.id, format!("{function}()"));
                    return Ok(expanded);
                }
                Ok(None) => {}
                Err(message) => return Err(CompileError::new(offset, IssueKind::BadMacro, message)),
            }
        }
        Ok(self.node(
            offset,
            ExprKind::Call {
                target: target.map(Box::new),
                function,
                args,
            },
        ))
    }

    /// Looks ahead for `('.' IDENT)* '{'`, the struct-literal shape.
    fn struct_literal_follows(&self) -> bool {
        let mut ahead = 0;
        loop {
            match self.peek_at(ahead) {
                Some(Tok::LBrace) => return true,
                Some(Tok::Dot) => match self.peek_at(ahead + 1) {
                    Some(Tok::Ident(_)) => ahead += 2,
                    _ => return false,
                },
                _ => return false,
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let offset = self.offset();
        match self.peek().cloned() {
            Some(Tok::Int(magnitude)) => {
                self.pos += 1;
                if magnitude > i64::MAX as u64 {
                    return Err(syntax_error(offset, "integer literal out of range"));
                }
                Ok(self.node(offset, ExprKind::Literal(Constant::Int(magnitude as i64))))
            }
            Some(Tok::Uint(u)) => {
                self.pos += 1;
                Ok(self.node(offset, ExprKind::Literal(Constant::Uint(u))))
            }
            Some(Tok::Double(d)) => {
                self.pos += 1;
                Ok(self.node(offset, ExprKind::Literal(Constant::Double(d))))
            }
            Some(Tok::Str(s)) => {
                self.pos += 1;
                Ok(self.node(offset, ExprKind::Literal(Constant::String(s))))
            }
            Some(Tok::Bytes(b)) => {
                self.pos += 1;
                Ok(self.node(offset, ExprKind::Literal(Constant::Bytes(b))))
            }
            Some(Tok::True) => {
                self.pos += 1;
                Ok(self.node(offset, ExprKind::Literal(Constant::Bool(true))))
            }
            Some(Tok::False) => {
                self.pos += 1;
                Ok(self.node(offset, ExprKind::Literal(Constant::Bool(false))))
            }
            Some(Tok::Null) => {
                self.pos += 1;
                Ok(self.node(offset, ExprKind::Literal(Constant::Null)))
            }
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen, "to close parenthesized expression")?;
                Ok(inner)
            }
            Some(Tok::LBracket) => self.parse_list_literal(),
            Some(Tok::LBrace) => self.parse_map_literal(),
            Some(Tok::Dot) => {
                // Rooted reference: `.a.b` resolves from the root container.
                self.pos += 1;
                let name = self.expect_ident("after leading '.'")?;
                self.parse_ident_or_struct(offset, format!(".{name}"))
            }
            Some(Tok::Ident(name)) => {
                if RESERVED.contains(&name.as_str()) {
                    return Err(syntax_error(
                        offset,
                        format!("reserved word {name:?} cannot be used as an identifier"),
                    ));
                }
                self.pos += 1;
                if self.check(&Tok::LParen) {
                    self.pos += 1;
                    let args = self.parse_call_args()?;
                    return self.build_call(offset, None, name, args);
                }
                self.parse_ident_or_struct(offset, name)
            }
            Some(other) => Err(syntax_error(offset, format!("unexpected token {other:?}"))),
            None => Err(syntax_error(offset, "unexpected end of expression")),
        }
    }

    /// An identifier already consumed; continue as a struct literal when the
    /// qualified-name-then-brace shape follows.
    fn parse_ident_or_struct(
        &mut self,
        offset: usize,
        mut name: String,
    ) -> Result<Expr, CompileError> {
        if !self.struct_literal_follows() {
            return Ok(self.node(offset, ExprKind::Ident(name)));
        }
        while self.eat(&Tok::Dot) {
            let part = self.expect_ident("in type name")?;
            name.push('.');
            name.push_str(&part);
        }
        self.expect(Tok::LBrace, "to open struct literal")?;
        let mut fields = Vec::new();
        while !self.check(&Tok::RBrace) {
            let field_offset = self.offset();
            let optional = self.eat(&Tok::Question);
            let field_name = self.expect_ident("as struct field name")?;
            self.expect(Tok::Colon, "after struct field name")?;
            let value = self.parse_expr()?;
            self.next_id += 1;
            let entry_id = self.next_id;
            self.source_info.positions.insert(entry_id, field_offset);
            fields.push(StructField {
                id: entry_id,
                name: field_name,
                value,
                optional,
            });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RBrace, "to close struct literal")?;
        Ok(self.node(
            offset,
            ExprKind::Struct {
                type_name: name,
                fields,
            },
        ))
    }

    fn parse_list_literal(&mut self) -> Result<Expr, CompileError> {
        let offset = self.offset();
        self.expect(Tok::LBracket, "to open list literal")?;
        let mut elements = Vec::new();
        let mut optional_indices = Vec::new();
        while !self.check(&Tok::RBracket) {
            if self.eat(&Tok::Question) {
                optional_indices.push(elements.len());
            }
            elements.push(self.parse_expr()?);
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RBracket, "to close list literal")?;
        Ok(self.node(
            offset,
            ExprKind::List {
                elements,
                optional_indices,
            },
        ))
    }

    fn parse_map_literal(&mut self) -> Result<Expr, CompileError> {
        let offset = self.offset();
        self.expect(Tok::LBrace, "to open map literal")?;
        let mut entries = Vec::new();
        while !self.check(&Tok::RBrace) {
            let entry_offset = self.offset();
            let optional = self.eat(&Tok::Question);
            let key = self.parse_expr()?;
            self.expect(Tok::Colon, "after map key")?;
            let value = self.parse_expr()?;
            self.next_id += 1;
            let entry_id = self.next_id;
            self.source_info.positions.insert(entry_id, entry_offset);
            entries.push(MapEntry {
                id: entry_id,
                key,
                value,
                optional,
            });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RBrace, "to close map literal")?;
        Ok(self.node(offset, ExprKind::Map { entries }))
    }
}

/// Parses source with the standard macros.
pub fn parse(source: &str) -> Result<Ast, CompileError> {
    let macros = MacroRegistry::standard();
    Parser::new(source, &macros)?.parse()
}

/// Parses source with an explicit macro registry.
pub fn parse_with_macros(source: &str, macros: &MacroRegistry) -> Result<Ast, CompileError> {
    Parser::new(source, macros)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Ast {
        match parse(source) {
            Ok(ast) => ast,
            Err(e) => panic!("parse failed for {source:?}: {}", e.message),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let ast = parse_ok("1 + 2 * 3 == 7");
        match &ast.expr.kind {
            ExprKind::Call { function, args, .. } => {
                assert_eq!(function, "_==_");
                match &args[0].kind {
                    ExprKind::Call { function, .. } => assert_eq!(function, "_+_"),
                    other => panic!("unexpected lhs: {other:?}"),
                }
            }
            other => panic!("unexpected root: {other:?}"),
        }
    }

    #[test]
    fn test_parse_ternary_and_logic() {
        let ast = parse_ok("a && b ? c : d || e");
        match &ast.expr.kind {
            ExprKind::Call { function, args, .. } => {
                assert_eq!(function, "_?_:_");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected root: {other:?}"),
        }
    }

    #[test]
    fn test_parse_literals() {
        let ast = parse_ok(r#"[1, 2u, 2.5, "hi", b"\x00", true, null]"#);
        match &ast.expr.kind {
            ExprKind::List { elements, .. } => {
                assert_eq!(elements.len(), 7);
                assert!(matches!(
                    elements[4].kind,
                    ExprKind::Literal(Constant::Bytes(ref b)) if b == &vec![0u8]
                ));
            }
            other => panic!("unexpected root: {other:?}"),
        }
    }

    #[test]
    fn test_parse_min_int_literal() {
        let ast = parse_ok("-9223372036854775808");
        assert!(matches!(
            ast.expr.kind,
            ExprKind::Literal(Constant::Int(i64::MIN))
        ));
        assert!(parse("9223372036854775808").is_err());
    }

    #[test]
    fn test_parse_string_escapes() {
        let ast = parse_ok(r#""a\nbé\x41""#);
        assert!(matches!(
            ast.expr.kind,
            ExprKind::Literal(Constant::String(ref s)) if s == "a\nb\u{e9}A"
        ));
    }

    #[test]
    fn test_parse_raw_and_triple_strings() {
        let ast = parse_ok(r#"r"a\nb""#);
        assert!(matches!(
            ast.expr.kind,
            ExprKind::Literal(Constant::String(ref s)) if s == "a\\nb"
        ));
        let ast = parse_ok("'''line \"one\"\nline two'''");
        assert!(matches!(
            ast.expr.kind,
            ExprKind::Literal(Constant::String(ref s)) if s.contains("line \"one\"\nline two")
        ));
    }

    #[test]
    fn test_parse_member_chain() {
        let ast = parse_ok("request.auth.claims.email");
        assert_eq!(
            ast.expr.qualified_name(),
            Some("request.auth.claims.email".to_string())
        );
    }

    #[test]
    fn test_parse_index_and_optional_forms() {
        let ast = parse_ok("m['k']");
        assert!(matches!(
            &ast.expr.kind,
            ExprKind::Call { function, .. } if function == "_[_]"
        ));
        let ast = parse_ok("m[?'k']");
        assert!(matches!(
            &ast.expr.kind,
            ExprKind::Call { function, .. } if function == "_[?_]"
        ));
        let ast = parse_ok("msg.?field");
        assert!(matches!(
            &ast.expr.kind,
            ExprKind::Select { optional: true, .. }
        ));
        let ast = parse_ok("[?maybe, 1]");
        assert!(matches!(
            &ast.expr.kind,
            ExprKind::List { optional_indices, .. } if optional_indices == &vec![0]
        ));
    }

    #[test]
    fn test_parse_struct_literal() {
        let ast = parse_ok("google.protobuf.Duration{seconds: 10}");
        match &ast.expr.kind {
            ExprKind::Struct { type_name, fields } => {
                assert_eq!(type_name, "google.protobuf.Duration");
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].name, "seconds");
            }
            other => panic!("unexpected root: {other:?}"),
        }
    }

    #[test]
    fn test_macro_expansion_produces_fold() {
        let ast = parse_ok("[1,2,3].all(x, x < 10)");
        assert!(matches!(ast.expr.kind, ExprKind::Comprehension(_)));

        let ast = parse_ok("has(a.b)");
        assert!(matches!(
            ast.expr.kind,
            ExprKind::Select { test_only: true, .. }
        ));
    }

    #[test]
    fn test_has_rejects_non_select() {
        assert!(parse("has(a)").is_err());
    }

    #[test]
    fn test_unique_dense_ids() {
        let ast = parse_ok("[1,2,3].map(x, x * 2)");
        let mut ids = Vec::new();
        ast.expr.visit(&mut |e| ids.push(e.id));
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len(), "ids must be unique");
        for id in &ids {
            assert!(
                ast.source_info.positions.contains_key(id),
                "id {id} has no source position"
            );
        }
    }

    #[test]
    fn test_reserved_words_rejected() {
        assert!(parse("let").is_err());
        assert!(parse("a.if").is_err());
    }

    #[test]
    fn test_trailing_tokens_rejected() {
        assert!(parse("1 1").is_err());
        assert!(parse("(1").is_err());
    }
}
