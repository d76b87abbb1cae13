//! Structural outline of a Python module.
//!
//! The outline parser groups tokens into logical lines and builds just enough
//! structure to locate splice targets: top-level functions and classes,
//! methods, parameters and their annotations, return annotations, block
//! headers and docstrings, class attributes, `from typing import` statements
//! and per-line comment slots. Every location is an original
//! [`Position`] in the parsed text.
//!
//! Definitions nested in compound statements or in function bodies are
//! parsed for validation but are not exposed as targets.

use std::sync::LazyLock;

use docsplice_core::text::{leading_whitespace, line_text};
use docsplice_core::{Position, Span};
use regex::Regex;

use crate::error::{ParseError, ParseResult};
use crate::tokenizer::{tokenize, Token, TokenKind};

// ============================================================================
// Outline Types
// ============================================================================

/// A source expression with its original extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub start: Position,
    pub end: Position,
    pub span: Span,
    pub text: String,
}

/// A name that can carry an annotation: a parameter or a class attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSite {
    pub name: String,
    pub name_start: Position,
    pub name_end: Position,
    pub annotation: Option<Expr>,
    /// Source text of the default value.
    pub default: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    PositionalOnly,
    Normal,
    VarArgs,
    KeywordOnly,
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub site: AnnotationSite,
    pub kind: ParamKind,
}

/// An existing return annotation. `expr` includes any wrapping parentheses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnAnnotation {
    pub arrow_end: Position,
    pub expr: Expr,
}

/// Where the body of a block starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Body {
    /// Body on following lines; `first` is the first statement.
    Block { first: Position },
    /// Body on the header line after the colon.
    Inline { start: Position },
}

/// A docstring literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Docstring {
    pub start: Position,
    pub end: Position,
}

/// The header line of a `def` or `class` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Start of `def`, `async` or `class`.
    pub keyword_start: Position,
    /// Leading whitespace of the header line.
    pub indent: String,
    pub colon: Position,
    /// End of the header line: after the colon, or after a trailing comment.
    pub line_end: Position,
    pub body: Body,
    /// Leading whitespace of the first body statement, for block bodies.
    pub body_indent: Option<String>,
    pub docstring: Option<Docstring>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub name_start: Position,
    pub is_async: bool,
    pub decorators: Vec<String>,
    pub params: Vec<Param>,
    /// Start of the `)` closing the parameter list.
    pub params_close: Position,
    pub returns: Option<ReturnAnnotation>,
    pub header: BlockHeader,
}

impl FunctionDef {
    pub fn is_staticmethod(&self) -> bool {
        self.decorators.iter().any(|d| d == "staticmethod")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: String,
    pub name_start: Position,
    pub decorators: Vec<String>,
    pub header: BlockHeader,
    pub methods: Vec<FunctionDef>,
    /// `name = value` and `name: annotation [= value]` statements in the body.
    pub attributes: Vec<AnnotationSite>,
}

impl ClassDef {
    pub fn has_init(&self) -> bool {
        self.methods.iter().any(|m| m.name == "__init__")
    }
}

/// A top-level definition, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Definition {
    Function(FunctionDef),
    Class(ClassDef),
}

/// A top-level `from typing import ...` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingImport {
    pub start: Position,
    pub end: Position,
    /// Names bound by the statement (aliases where given).
    pub bound_names: Vec<String>,
    pub star: bool,
    pub parenthesized: bool,
    /// Start of the last imported item.
    pub last_item_start: Position,
    /// End of the last imported item.
    pub last_item_end: Position,
    /// End of a comma after the last item.
    pub trailing_comma_end: Option<Position>,
}

impl TypingImport {
    pub fn is_multiline(&self) -> bool {
        self.end.line > self.start.line
    }

    pub fn binds(&self, name: &str) -> bool {
        self.star || self.bound_names.iter().any(|n| n == name)
    }
}

/// An inline comment following code on the same line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineComment {
    /// End column of the code before the comment.
    pub code_end: usize,
    pub comment_end: usize,
}

/// The comment slot of one code line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSlot {
    pub line: u32,
    pub indent: String,
    /// The line's code without its inline comment.
    pub code: String,
    /// Contiguous comment-only lines directly above, as (first, last).
    pub block: Option<(u32, u32)>,
    pub inline: Option<InlineComment>,
    /// Existing comment text, one line per comment line.
    pub existing: Option<String>,
}

/// Outline of a parsed module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub definitions: Vec<Definition>,
    pub typing_imports: Vec<TypingImport>,
    /// Whether the first statement is an `import` or `from` statement.
    pub first_statement_is_import: bool,
    /// Last line of a leading docstring or `from __future__` block.
    pub import_anchor: Option<u32>,
    pub comment_slots: Vec<CommentSlot>,
    pub line_count: u32,
}

impl Module {
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Function(f) => Some(f),
            Definition::Class(_) => None,
        })
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassDef> {
        self.definitions.iter().filter_map(|d| match d {
            Definition::Class(c) => Some(c),
            Definition::Function(_) => None,
        })
    }

    pub fn comment_slot(&self, line: u32) -> Option<&CommentSlot> {
        self.comment_slots
            .binary_search_by_key(&line, |s| s.line)
            .ok()
            .map(|i| &self.comment_slots[i])
    }
}

/// Parse `source` into a [`Module`] outline.
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let stream = tokenize(source)?;
    let items = logical_items(&stream.tokens);
    let mut parser = Parser {
        source,
        items,
        pos: 0,
    };
    let stmts = parser.suite(false)?;

    let mut module = Module {
        definitions: Vec::new(),
        typing_imports: Vec::new(),
        first_statement_is_import: false,
        import_anchor: None,
        comment_slots: comment_slots(source, &stream.tokens, &stream.continuation_lines),
        line_count: docsplice_core::text::line_count(source),
    };
    collect_module_level(stmts, &mut module)?;
    Ok(module)
}

// ============================================================================
// Logical Lines
// ============================================================================

#[derive(Debug, Clone)]
struct LogicalLine<'src> {
    /// Code tokens only.
    tokens: Vec<Token<'src>>,
    /// Comment ending the last physical line.
    trailing_comment: Option<Token<'src>>,
}

#[derive(Debug, Clone)]
enum Item<'src> {
    Line(LogicalLine<'src>),
    Indent(u32),
    Dedent,
}

fn logical_items<'src>(tokens: &[Token<'src>]) -> Vec<Item<'src>> {
    let mut items = Vec::new();
    let mut current: Vec<Token<'src>> = Vec::new();
    let mut comment = None;

    for tok in tokens {
        match tok.kind {
            TokenKind::Indent => items.push(Item::Indent(tok.start.line)),
            TokenKind::Dedent => items.push(Item::Dedent),
            TokenKind::Comment => {
                if !current.is_empty() {
                    comment = Some(*tok);
                }
            }
            TokenKind::Nl => {}
            TokenKind::Newline => {
                if !current.is_empty() {
                    items.push(Item::Line(LogicalLine {
                        tokens: std::mem::take(&mut current),
                        trailing_comment: comment.take(),
                    }));
                }
                comment = None;
            }
            TokenKind::EndMarker => break,
            _ => {
                comment = None;
                current.push(*tok);
            }
        }
    }
    items
}

// ============================================================================
// Token Helpers
// ============================================================================

fn expr_from(source: &str, tokens: &[Token<'_>]) -> Option<Expr> {
    let first = tokens.first()?;
    let last = tokens.last()?;
    let span = Span::new(first.span.start, last.span.end);
    Some(Expr {
        start: first.start,
        end: last.end,
        span,
        text: source[span.start..span.end].to_string(),
    })
}

fn text_of(source: &str, tokens: &[Token<'_>]) -> String {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => source[first.span.start..last.span.end].to_string(),
        _ => String::new(),
    }
}

fn bracket_delta(tok: &Token<'_>) -> isize {
    if tok.kind != TokenKind::Op {
        return 0;
    }
    match tok.text {
        "(" | "[" | "{" => 1,
        ")" | "]" | "}" => -1,
        _ => 0,
    }
}

/// Split on `sep` at bracket depth zero. Commas inside a lambda's parameter
/// list do not split.
fn split_top_level<'a, 'src>(tokens: &'a [Token<'src>], sep: &str) -> Vec<&'a [Token<'src>]> {
    let mut parts = Vec::new();
    let mut depth = 0isize;
    let mut lambdas = 0usize;
    let mut start = 0;

    for (i, tok) in tokens.iter().enumerate() {
        depth += bracket_delta(tok);
        if depth != 0 {
            continue;
        }
        if tok.is_name("lambda") {
            lambdas += 1;
        } else if tok.is_op(":") && lambdas > 0 {
            lambdas -= 1;
        } else if tok.is_op(sep) && lambdas == 0 {
            if i > start {
                parts.push(&tokens[start..i]);
            }
            start = i + 1;
        }
    }
    if start < tokens.len() {
        parts.push(&tokens[start..]);
    }
    parts
}

/// Index of the first `op` at depth zero at or after `from`.
fn find_top_level(tokens: &[Token<'_>], from: usize, op: &str) -> Option<usize> {
    let mut depth = 0isize;
    for (i, tok) in tokens.iter().enumerate().skip(from) {
        if depth == 0 && tok.is_op(op) {
            return Some(i);
        }
        depth += bracket_delta(tok);
    }
    None
}

/// Index of the block colon at or after `from`, skipping lambda colons.
fn header_colon(tokens: &[Token<'_>], from: usize) -> Option<usize> {
    let mut depth = 0isize;
    let mut lambdas = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(from) {
        if depth == 0 {
            if tok.is_name("lambda") {
                lambdas += 1;
            } else if tok.is_op(":") {
                if lambdas == 0 {
                    return Some(i);
                }
                lambdas -= 1;
            }
        }
        depth += bracket_delta(tok);
    }
    None
}

const STATEMENT_KEYWORDS: &[&str] = &[
    "assert", "async", "break", "class", "continue", "def", "del", "elif", "except", "finally", "for",
    "from", "global", "import", "nonlocal", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// First top-level token that cannot be part of a single expression:
/// separators, assignments, `->`, `:` outside a lambda, statement keywords.
pub(crate) fn stray_expression_token<'a, 'src>(tokens: &'a [Token<'src>]) -> Option<&'a Token<'src>> {
    let mut depth = 0isize;
    let mut lambdas = 0usize;
    for tok in tokens {
        if depth == 0 {
            let stray = match tok.kind {
                TokenKind::Name => {
                    if tok.text == "lambda" {
                        lambdas += 1;
                    }
                    STATEMENT_KEYWORDS.contains(&tok.text)
                }
                TokenKind::Op => match tok.text {
                    ":" if lambdas > 0 => {
                        lambdas -= 1;
                        false
                    }
                    ":" | "," | ";" | "->" => true,
                    "==" | "!=" | "<=" | ">=" => false,
                    op => op.ends_with('='),
                },
                _ => false,
            };
            if stray {
                return Some(tok);
            }
        }
        depth += bracket_delta(tok);
    }
    None
}

fn matching_close(tokens: &[Token<'_>], open: usize) -> ParseResult<usize> {
    let mut depth = 0isize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        depth += bracket_delta(tok);
        if depth == 0 {
            return Ok(i);
        }
    }
    Err(ParseError::syntax(tokens[open].start, "unbalanced brackets"))
}

/// Whether a string token is usable as a docstring (not bytes, not f-string).
fn is_plain_string(tok: &Token<'_>) -> bool {
    if tok.kind != TokenKind::String {
        return false;
    }
    let prefix_len = tok.text.find(['\'', '"']).unwrap_or(0);
    !tok.text[..prefix_len]
        .chars()
        .any(|c| matches!(c, 'b' | 'B' | 'f' | 'F' | 't' | 'T'))
}

fn docstring_of(tokens: &[Token<'_>]) -> Option<Docstring> {
    let first = split_top_level(tokens, ";").into_iter().next()?;
    if first.is_empty() || !first.iter().all(is_plain_string) {
        return None;
    }
    Some(Docstring {
        start: first[0].start,
        end: first[first.len() - 1].end,
    })
}

fn is_string_statement(tokens: &[Token<'_>]) -> bool {
    !tokens.is_empty() && tokens.iter().all(|t| t.kind == TokenKind::String)
}

// ============================================================================
// Statement Parser
// ============================================================================

enum Stmt<'src> {
    Function(FunctionDef),
    Class(ClassDef),
    Simple(LogicalLine<'src>),
    Compound,
}

const COMPOUND_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "try", "except", "finally", "with", "async",
];

struct Parser<'src> {
    source: &'src str,
    items: Vec<Item<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn line_indent(&self, at: Position) -> String {
        line_text(self.source, at.line)
            .map(|l| leading_whitespace(l).to_string())
            .unwrap_or_default()
    }

    /// Parse statements until the end of the current block.
    fn suite(&mut self, nested: bool) -> ParseResult<Vec<Stmt<'src>>> {
        let mut stmts = Vec::new();
        let mut decorators: Vec<String> = Vec::new();
        let mut decorator_at = None;

        loop {
            let line = match self.items.get(self.pos) {
                None => break,
                Some(Item::Dedent) => {
                    self.pos += 1;
                    if nested {
                        break;
                    }
                    continue;
                }
                Some(Item::Indent(line)) => {
                    return Err(ParseError::UnexpectedIndent { line: *line });
                }
                Some(Item::Line(line)) => line.clone(),
            };
            self.pos += 1;

            let first = line.tokens[0];
            if first.is_op("@") {
                decorator_at.get_or_insert(first.start);
                decorators.push(text_of(self.source, &line.tokens[1..]));
                continue;
            }
            let stmt = self.statement(line, std::mem::take(&mut decorators))?;
            decorator_at = None;
            stmts.push(stmt);
        }

        if let Some(at) = decorator_at {
            return Err(ParseError::syntax(at, "decorator without a definition"));
        }
        Ok(stmts)
    }

    fn statement(&mut self, line: LogicalLine<'src>, decorators: Vec<String>) -> ParseResult<Stmt<'src>> {
        let toks = &line.tokens;
        let first = toks[0];

        let is_def = first.is_name("def")
            || (first.is_name("async") && toks.get(1).is_some_and(|t| t.is_name("def")));
        if is_def {
            return self.function(&line, decorators).map(Stmt::Function);
        }
        if first.is_name("class") {
            return self.class(&line, decorators).map(Stmt::Class);
        }
        if !decorators.is_empty() {
            return Err(ParseError::syntax(
                first.start,
                "decorator must precede a function or class",
            ));
        }
        if let Some(colon) = compound_colon(toks) {
            self.block(&line, colon, first.start)?;
            return Ok(Stmt::Compound);
        }
        Ok(Stmt::Simple(line))
    }

    /// Parse the body after the header colon at `colon`.
    fn block(
        &mut self,
        line: &LogicalLine<'src>,
        colon: usize,
        keyword_start: Position,
    ) -> ParseResult<(BlockHeader, Vec<Stmt<'src>>)> {
        let colon_tok = line.tokens[colon];
        let rest = &line.tokens[colon + 1..];
        let indent = self.line_indent(keyword_start);

        if let Some(stray) = rest
            .first()
            .filter(|t| t.kind == TokenKind::Op && matches!(t.text, ":" | "=" | "," | ";" | "->"))
        {
            return Err(ParseError::syntax(stray.start, "unexpected token after ':'"));
        }
        if !rest.is_empty() {
            let header = BlockHeader {
                keyword_start,
                indent,
                colon: colon_tok.start,
                line_end: colon_tok.end,
                body: Body::Inline {
                    start: rest[0].start,
                },
                body_indent: None,
                docstring: docstring_of(rest),
            };
            return Ok((header, Vec::new()));
        }

        match self.items.get(self.pos) {
            Some(Item::Indent(_)) => self.pos += 1,
            _ => {
                return Err(ParseError::ExpectedIndentedBlock {
                    line: colon_tok.start.line,
                })
            }
        }
        let first = match self.items.get(self.pos) {
            Some(Item::Line(l)) => l.tokens[0].start,
            _ => {
                return Err(ParseError::ExpectedIndentedBlock {
                    line: colon_tok.start.line,
                })
            }
        };
        let body = self.suite(true)?;
        let docstring = match body.first() {
            Some(Stmt::Simple(l)) => docstring_of(&l.tokens),
            _ => None,
        };

        let header = BlockHeader {
            keyword_start,
            indent,
            colon: colon_tok.start,
            line_end: line.trailing_comment.map_or(colon_tok.end, |c| c.end),
            body: Body::Block { first },
            body_indent: Some(self.line_indent(first)),
            docstring,
        };
        Ok((header, body))
    }

    fn function(&mut self, line: &LogicalLine<'src>, decorators: Vec<String>) -> ParseResult<FunctionDef> {
        let toks = &line.tokens;
        let is_async = toks[0].is_name("async");
        let mut i = if is_async { 2 } else { 1 };

        let name = toks
            .get(i)
            .filter(|t| t.kind == TokenKind::Name)
            .copied()
            .ok_or_else(|| ParseError::syntax(toks[i - 1].end, "expected function name"))?;
        i += 1;
        if toks.get(i).is_some_and(|t| t.is_op("[")) {
            i = matching_close(toks, i)? + 1;
        }
        if !toks.get(i).is_some_and(|t| t.is_op("(")) {
            return Err(ParseError::syntax(name.end, "expected '('"));
        }
        let close = matching_close(toks, i)?;
        let params = self.params(&toks[i + 1..close])?;

        let mut j = close + 1;
        let returns = if toks.get(j).is_some_and(|t| t.is_op("->")) {
            let arrow = toks[j];
            let colon = header_colon(toks, j + 1)
                .ok_or_else(|| ParseError::syntax(arrow.end, "expected ':'"))?;
            if let Some(stray) = stray_expression_token(&toks[j + 1..colon]) {
                return Err(ParseError::syntax(stray.start, "unexpected token in return annotation"));
            }
            let expr = expr_from(self.source, &toks[j + 1..colon])
                .ok_or_else(|| ParseError::syntax(arrow.end, "expected return annotation"))?;
            j = colon;
            Some(ReturnAnnotation {
                arrow_end: arrow.end,
                expr,
            })
        } else {
            None
        };
        if !toks.get(j).is_some_and(|t| t.is_op(":")) {
            return Err(ParseError::syntax(toks[j - 1].end, "expected ':'"));
        }

        let (header, _body) = self.block(line, j, toks[0].start)?;
        Ok(FunctionDef {
            name: name.text.to_string(),
            name_start: name.start,
            is_async,
            decorators,
            params,
            params_close: toks[close].start,
            returns,
            header,
        })
    }

    fn params(&self, tokens: &[Token<'src>]) -> ParseResult<Vec<Param>> {
        let mut params: Vec<Param> = Vec::new();
        let mut keyword_only = false;

        for piece in split_top_level(tokens, ",") {
            if piece.len() == 1 && piece[0].is_op("/") {
                for p in &mut params {
                    p.kind = ParamKind::PositionalOnly;
                }
                continue;
            }
            if piece.len() == 1 && piece[0].is_op("*") {
                keyword_only = true;
                continue;
            }

            let (kind, name_idx) = if piece[0].is_op("*") {
                (ParamKind::VarArgs, 1)
            } else if piece[0].is_op("**") {
                (ParamKind::VarKeyword, 1)
            } else if keyword_only {
                (ParamKind::KeywordOnly, 0)
            } else {
                (ParamKind::Normal, 0)
            };
            if kind == ParamKind::VarArgs {
                keyword_only = true;
            }
            if piece.len() <= name_idx {
                return Err(ParseError::syntax(piece[0].end, "expected a name"));
            }
            let site = self.annotation_site(&piece[name_idx..])?;
            params.push(Param { site, kind });
        }
        Ok(params)
    }

    /// Parse `name [: annotation] [= default]`.
    fn annotation_site(&self, tokens: &[Token<'src>]) -> ParseResult<AnnotationSite> {
        let name = match tokens.first() {
            Some(t) if t.kind == TokenKind::Name => *t,
            first => {
                let at = first.map_or(Position::new(1, 0), |t| t.start);
                return Err(ParseError::syntax(at, "expected a name"));
            }
        };
        let rest = &tokens[1..];
        let eq = find_top_level(rest, 0, "=");

        let annotation = if rest.first().is_some_and(|t| t.is_op(":")) {
            let ann = &rest[1..eq.unwrap_or(rest.len())];
            if let Some(stray) = stray_expression_token(ann) {
                return Err(ParseError::syntax(stray.start, "unexpected token in annotation"));
            }
            Some(
                expr_from(self.source, ann)
                    .ok_or_else(|| ParseError::syntax(rest[0].end, "expected annotation"))?,
            )
        } else {
            None
        };
        if annotation.is_none() && eq.is_none() && !rest.is_empty() {
            return Err(ParseError::syntax(rest[0].start, "unexpected token"));
        }
        let default = eq.map(|e| text_of(self.source, &rest[e + 1..]));

        Ok(AnnotationSite {
            name: name.text.to_string(),
            name_start: name.start,
            name_end: name.end,
            annotation,
            default,
        })
    }

    fn class(&mut self, line: &LogicalLine<'src>, decorators: Vec<String>) -> ParseResult<ClassDef> {
        let toks = &line.tokens;
        let name = toks
            .get(1)
            .filter(|t| t.kind == TokenKind::Name)
            .copied()
            .ok_or_else(|| ParseError::syntax(toks[0].end, "expected class name"))?;
        let mut i = 2;
        if toks.get(i).is_some_and(|t| t.is_op("[")) {
            i = matching_close(toks, i)? + 1;
        }
        if toks.get(i).is_some_and(|t| t.is_op("(")) {
            i = matching_close(toks, i)? + 1;
        }
        if !toks.get(i).is_some_and(|t| t.is_op(":")) {
            return Err(ParseError::syntax(toks[i - 1].end, "expected ':'"));
        }

        let (header, body) = self.block(line, i, toks[0].start)?;
        let mut methods = Vec::new();
        let mut attributes = Vec::new();
        for stmt in body {
            match stmt {
                Stmt::Function(f) => methods.push(f),
                Stmt::Simple(l) => {
                    for part in split_top_level(&l.tokens, ";") {
                        if let Some(site) = self.class_attribute(part) {
                            attributes.push(site);
                        }
                    }
                }
                Stmt::Class(_) | Stmt::Compound => {}
            }
        }

        Ok(ClassDef {
            name: name.text.to_string(),
            name_start: name.start,
            decorators,
            header,
            methods,
            attributes,
        })
    }

    /// `name = value` (single target) or `name: annotation [= value]`.
    fn class_attribute(&self, tokens: &[Token<'src>]) -> Option<AnnotationSite> {
        tokens.first().filter(|t| t.kind == TokenKind::Name)?;
        let next = tokens.get(1)?;
        if next.is_op("=") {
            let rest = &tokens[2..];
            if rest.is_empty() || find_top_level(rest, 0, "=").is_some() {
                return None;
            }
        } else if !next.is_op(":") {
            return None;
        }
        self.annotation_site(tokens).ok()
    }
}

/// Colon index of a compound statement header other than `def` and `class`.
fn compound_colon(tokens: &[Token<'_>]) -> Option<usize> {
    let first = tokens.first()?;
    if first.kind != TokenKind::Name {
        return None;
    }
    let keyword = COMPOUND_KEYWORDS.contains(&first.text)
        || (matches!(first.text, "match" | "case")
            && tokens.last().is_some_and(|t| t.is_op(":"))
            && tokens.get(1).is_some_and(|t| {
                !(t.kind == TokenKind::Op
                    && matches!(t.text, ":" | "=" | "." | "," | ")" | "]" | "}"))
            }));
    if !keyword {
        return None;
    }
    header_colon(tokens, 1)
}

// ============================================================================
// Module-Level Facts
// ============================================================================

fn collect_module_level(stmts: Vec<Stmt<'_>>, module: &mut Module) -> ParseResult<()> {
    let mut leading = true;
    let mut first = true;

    for stmt in stmts {
        match stmt {
            Stmt::Function(f) => {
                module.definitions.push(Definition::Function(f));
                leading = false;
                first = false;
            }
            Stmt::Class(c) => {
                module.definitions.push(Definition::Class(c));
                leading = false;
                first = false;
            }
            Stmt::Compound => {
                leading = false;
                first = false;
            }
            Stmt::Simple(line) => {
                for part in split_top_level(&line.tokens, ";") {
                    let is_import = part[0].is_name("import") || part[0].is_name("from");
                    if first {
                        module.first_statement_is_import = is_import;
                    }
                    if leading {
                        let anchors = (first && is_string_statement(part))
                            || (part[0].is_name("from")
                                && part.get(1).is_some_and(|t| t.is_name("__future__")));
                        if anchors {
                            module.import_anchor = part.last().map(|t| t.end.line);
                        } else {
                            leading = false;
                        }
                    }
                    first = false;

                    if part[0].is_name("from") && part.get(1).is_some_and(|t| t.is_name("typing")) {
                        module.typing_imports.push(typing_import(part)?);
                    }
                }
            }
        }
    }
    Ok(())
}

fn typing_import(tokens: &[Token<'_>]) -> ParseResult<TypingImport> {
    let import_idx = tokens
        .iter()
        .position(|t| t.is_name("import"))
        .ok_or_else(|| ParseError::syntax(tokens[0].start, "expected 'import'"))?;
    let mut names = &tokens[import_idx + 1..];
    let parenthesized = names.first().is_some_and(|t| t.is_op("("));
    if parenthesized {
        names = &names[1..names.len().saturating_sub(1)];
    }
    let at = tokens[import_idx].end;
    let star = names.first().is_some_and(|t| t.is_op("*"));

    let items = split_top_level(names, ",");
    let last = items
        .last()
        .ok_or_else(|| ParseError::syntax(at, "expected imported names"))?;
    let trailing_comma_end = names.last().filter(|t| t.is_op(",")).map(|t| t.end);

    let bound_names = items
        .iter()
        .map(|item| item.last().map(|t| t.text.to_string()).unwrap_or_default())
        .collect();

    Ok(TypingImport {
        start: tokens[0].start,
        end: tokens[tokens.len() - 1].end,
        bound_names,
        star,
        parenthesized,
        last_item_start: last[0].start,
        last_item_end: last[last.len() - 1].end,
        trailing_comma_end,
    })
}

// ============================================================================
// Comment Slots
// ============================================================================

#[derive(Debug, Clone, Default)]
struct LineFacts {
    /// A code token starts on this line.
    code_start: bool,
    /// The line lies inside a token that started on an earlier line.
    covered: bool,
    comment: Option<(usize, usize)>,
    /// End column of the last code token before the comment.
    code_end: Option<usize>,
}

fn comment_slots(source: &str, tokens: &[Token<'_>], continuation_lines: &[u32]) -> Vec<CommentSlot> {
    let line_count = docsplice_core::text::line_count(source);
    let mut facts = vec![LineFacts::default(); line_count as usize + 2];
    let fact = |facts: &mut Vec<LineFacts>, line: u32| -> usize {
        let idx = line as usize;
        if idx >= facts.len() {
            facts.resize(idx + 1, LineFacts::default());
        }
        idx
    };

    for tok in tokens {
        match tok.kind {
            TokenKind::Comment => {
                let i = fact(&mut facts, tok.start.line);
                facts[i].comment = Some((tok.start.col, tok.end.col));
            }
            TokenKind::Name | TokenKind::Number | TokenKind::String | TokenKind::Op => {
                let i = fact(&mut facts, tok.start.line);
                facts[i].code_start = true;
                let end_line = fact(&mut facts, tok.end.line);
                for covered in &mut facts[i + 1..=end_line] {
                    covered.covered = true;
                }
                facts[end_line].code_end = Some(tok.end.col);
            }
            _ => {}
        }
    }

    // Lines of string-only expression statements are not code lines.
    let mut string_stmt_lines = Vec::new();
    collect_string_statements(tokens, &mut string_stmt_lines);

    let is_comment_only =
        |f: &LineFacts| f.comment.is_some() && !f.code_start && !f.covered && f.code_end.is_none();

    let mut slots = Vec::new();
    for line in 1..=line_count {
        let f = &facts[line as usize];
        if !f.code_start
            || f.covered
            || continuation_lines.contains(&line)
            || string_stmt_lines.contains(&line)
        {
            continue;
        }
        let text = line_text(source, line).unwrap_or("");

        let mut first_comment = None;
        let mut above = line - 1;
        while above >= 1 && is_comment_only(&facts[above as usize]) && !is_file_header(source, above) {
            first_comment = Some(above);
            above -= 1;
        }
        let block = first_comment.map(|first| (first, line - 1));

        let inline = match (f.comment, f.code_end) {
            (Some((start, end)), Some(code_end)) if code_end <= start => Some(InlineComment {
                code_end,
                comment_end: end,
            }),
            _ => None,
        };

        let mut existing: Vec<String> = Vec::new();
        if let Some((first, last)) = block {
            for l in first..=last {
                if let (Some((start, end)), Some(t)) = (facts[l as usize].comment, line_text(source, l)) {
                    existing.push(comment_body(&t[start..end]));
                }
            }
        }
        if let Some((start, end)) = f.comment.filter(|_| inline.is_some()) {
            existing.push(comment_body(&text[start..end]));
        }
        let existing = existing.join("\n");

        let code = match inline {
            Some(c) => &text[..c.code_end],
            None => text.trim_end_matches('\r'),
        };

        slots.push(CommentSlot {
            line,
            indent: leading_whitespace(text).to_string(),
            code: code.trim_end().to_string(),
            block,
            inline,
            existing: (!existing.is_empty()).then_some(existing),
        });
    }
    slots
}

static CODING_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t\x0c]*#.*?coding[:=][ \t]*[-\w.]+").expect("coding pattern is valid"));

/// A shebang on line 1 or an encoding declaration on lines 1-2.
fn is_file_header(source: &str, line: u32) -> bool {
    let Some(text) = line_text(source, line) else {
        return false;
    };
    (line == 1 && text.starts_with("#!")) || (line <= 2 && CODING_DECLARATION.is_match(text))
}

fn comment_body(comment: &str) -> String {
    comment.trim_start_matches('#').trim().to_string()
}

/// Lines spanned by expression statements made only of string literals.
fn collect_string_statements(tokens: &[Token<'_>], lines: &mut Vec<u32>) {
    let mut stmt: Vec<&Token<'_>> = Vec::new();
    let mut starts_line = false;
    let mut prev_code_line = 0;
    let mut flush = |stmt: &mut Vec<&Token<'_>>, starts_line: bool| {
        if starts_line && !stmt.is_empty() && stmt.iter().all(|t| t.kind == TokenKind::String) {
            let first = stmt[0].start.line;
            let last = stmt[stmt.len() - 1].end.line;
            lines.extend(first..=last);
        }
        stmt.clear();
    };

    for tok in tokens {
        if stmt.is_empty() && tok.is_code() {
            starts_line = tok.start.line != prev_code_line;
        }
        if tok.is_code() {
            prev_code_line = tok.end.line;
        }
        match tok.kind {
            TokenKind::Newline | TokenKind::EndMarker => flush(&mut stmt, starts_line),
            TokenKind::Op if tok.text == ";" => flush(&mut stmt, starts_line),
            TokenKind::Op if tok.text == ":" && stmt.first().is_some_and(|t| t.kind == TokenKind::Name) => {
                // A block header ends here; an inline body may follow.
                if header_colon_candidate(&stmt) {
                    stmt.clear();
                } else {
                    stmt.push(tok);
                }
            }
            TokenKind::Name | TokenKind::Number | TokenKind::String | TokenKind::Op => stmt.push(tok),
            _ => {}
        }
    }
}

fn header_colon_candidate(stmt: &[&Token<'_>]) -> bool {
    let depth: isize = stmt.iter().map(|t| bracket_delta(t)).sum();
    depth == 0
        && stmt.first().is_some_and(|t| {
            matches!(t.text, "def" | "class") || COMPOUND_KEYWORDS.contains(&t.text)
        })
        && !stmt.iter().any(|t| t.is_name("lambda"))
}

// ============================================================================
// Tests
// ============================================================================
