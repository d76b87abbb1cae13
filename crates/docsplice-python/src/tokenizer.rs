//! A Python tokenizer sufficient for outline parsing.
//!
//! Produces the same token categories as CPython's `tokenize` module
//! (`NAME`, `NUMBER`, `STRING`, `OP`, `COMMENT`, `NEWLINE`, `NL`, `INDENT`,
//! `DEDENT`, `ENDMARKER`) with exact start and end positions. Positions use
//! 1-indexed lines and byte columns.
//!
//! The tokenizer rejects what would make positions meaningless: unterminated
//! strings, unbalanced brackets, inconsistent dedents and stray characters.
//! It does not validate expression grammar.

use docsplice_core::{Position, Span};

use crate::error::{ParseError, ParseResult};

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Number,
    String,
    Op,
    Comment,
    /// End of a logical line.
    Newline,
    /// Line break that does not end a logical line.
    Nl,
    Indent,
    Dedent,
    EndMarker,
}

/// A token borrowed from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub start: Position,
    pub end: Position,
    pub span: Span,
}

impl Token<'_> {
    /// Whether this is the operator `op`.
    pub fn is_op(&self, op: &str) -> bool {
        self.kind == TokenKind::Op && self.text == op
    }

    /// Whether this is the name (or keyword) `name`.
    pub fn is_name(&self, name: &str) -> bool {
        self.kind == TokenKind::Name && self.text == name
    }

    /// Tokens that carry code: names, numbers, strings and operators.
    pub fn is_code(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Name | TokenKind::Number | TokenKind::String | TokenKind::Op
        )
    }
}

/// Tokenizer output.
#[derive(Debug, Clone)]
pub struct TokenStream<'src> {
    pub tokens: Vec<Token<'src>>,
    /// Lines that begin after a backslash continuation.
    pub continuation_lines: Vec<u32>,
}

/// Tokenize `source`.
pub fn tokenize(source: &str) -> ParseResult<TokenStream<'_>> {
    Tokenizer::new(source).run()
}

// ============================================================================
// Tokenizer
// ============================================================================

const OPERATORS_3: &[&str] = &["**=", "//=", ">>=", "<<=", "..."];
const OPERATORS_2: &[&str] = &[
    "->", "**", "//", "<<", ">>", "<=", ">=", "==", "!=", ":=", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];
const OPERATORS_1: &str = "+-*/%@&|^~<>()[]{},:;.=";

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf", "t", "tr", "rt"];

const TAB_SIZE: usize = 8;

struct Tokenizer<'src> {
    src: &'src str,
    bytes: &'src [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    indents: Vec<usize>,
    brackets: Vec<(u8, Position)>,
    tokens: Vec<Token<'src>>,
    continuation_lines: Vec<u32>,
    /// Whether the current logical line has produced a code token.
    logical_line_open: bool,
}

impl<'src> Tokenizer<'src> {
    fn new(src: &'src str) -> Self {
        Tokenizer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
            indents: vec![0],
            brackets: Vec::new(),
            tokens: Vec::new(),
            continuation_lines: Vec::new(),
            logical_line_open: false,
        }
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.pos - self.line_start)
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn push(&mut self, kind: TokenKind, start_offset: usize, start: Position) {
        let span = Span::new(start_offset, self.pos);
        self.tokens.push(Token {
            kind,
            text: &self.src[span.start..span.end],
            start,
            end: self.here(),
            span,
        });
        if matches!(
            kind,
            TokenKind::Name | TokenKind::Number | TokenKind::String | TokenKind::Op
        ) {
            self.logical_line_open = true;
        }
    }

    fn push_marker(&mut self, kind: TokenKind) {
        let at = self.here();
        self.tokens.push(Token {
            kind,
            text: "",
            start: at,
            end: at,
            span: Span::empty(self.pos),
        });
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
    }

    fn run(mut self) -> ParseResult<TokenStream<'src>> {
        let mut at_line_start = true;
        let mut continued = false;

        while self.pos < self.bytes.len() {
            if at_line_start {
                at_line_start = false;
                if self.brackets.is_empty() && !continued && self.handle_indentation()? {
                    // Blank and comment-only lines leave the next line to be measured.
                    at_line_start = true;
                    continue;
                }
                continued = false;
            }

            let b = self.bytes[self.pos];
            match b {
                b' ' | b'\t' | b'\x0c' | b'\r' => self.pos += 1,
                b'#' => self.comment(),
                b'\\' => {
                    let after = if self.peek(1) == Some(b'\r') { 2 } else { 1 };
                    if self.peek(after) == Some(b'\n') {
                        self.pos += after + 1;
                        self.newline();
                        self.continuation_lines.push(self.line);
                        at_line_start = true;
                        continued = true;
                    } else {
                        return Err(ParseError::InvalidCharacter {
                            at: self.here(),
                            ch: '\\',
                        });
                    }
                }
                b'\n' => {
                    let start_offset = self.pos;
                    let start = self.here();
                    let kind = if self.brackets.is_empty() && self.logical_line_open {
                        TokenKind::Newline
                    } else {
                        TokenKind::Nl
                    };
                    self.pos += 1;
                    self.tokens.push(Token {
                        kind,
                        text: "\n",
                        start,
                        end: Position::new(start.line, start.col + 1),
                        span: Span::new(start_offset, self.pos),
                    });
                    if kind == TokenKind::Newline {
                        self.logical_line_open = false;
                    }
                    self.newline();
                    at_line_start = true;
                }
                b'"' | b'\'' => self.string(self.pos, self.here())?,
                b'0'..=b'9' => self.number(),
                b'.' if matches!(self.peek(1), Some(b'0'..=b'9')) => self.number(),
                _ => {
                    let ch = self.src[self.pos..].chars().next().unwrap_or('\0');
                    if ch == '_' || ch.is_alphabetic() {
                        self.name_or_prefixed_string()?;
                    } else {
                        self.operator(ch)?;
                    }
                }
            }
        }

        if let Some(&(open, at)) = self.brackets.last() {
            return Err(ParseError::UnclosedBracket {
                at,
                open: open as char,
            });
        }
        if self.logical_line_open {
            self.push_marker(TokenKind::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_marker(TokenKind::Dedent);
        }
        self.push_marker(TokenKind::EndMarker);

        Ok(TokenStream {
            tokens: self.tokens,
            continuation_lines: self.continuation_lines,
        })
    }

    /// Measure indentation at the start of a physical line and emit
    /// `INDENT`/`DEDENT`. Returns true if the line was blank or comment-only
    /// and has been fully consumed.
    fn handle_indentation(&mut self) -> ParseResult<bool> {
        let mut width = 0usize;
        let mut p = self.pos;
        while let Some(&b) = self.bytes.get(p) {
            match b {
                b' ' => width += 1,
                b'\t' => width = (width / TAB_SIZE + 1) * TAB_SIZE,
                b'\x0c' => width = 0,
                _ => break,
            }
            p += 1;
        }

        match self.bytes.get(p) {
            None => {
                self.pos = p;
                return Ok(true);
            }
            Some(b'#') | Some(b'\n') => {
                self.pos = p;
                if self.bytes[p] == b'#' {
                    self.comment();
                }
                if self.peek(0) == Some(b'\n') {
                    let start_offset = self.pos;
                    let start = self.here();
                    self.pos += 1;
                    self.push(TokenKind::Nl, start_offset, start);
                    self.newline();
                }
                return Ok(true);
            }
            Some(b'\r') if self.bytes.get(p + 1) == Some(&b'\n') => {
                self.pos = p + 1;
                return Ok(false);
            }
            _ => {}
        }

        self.pos = p;
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push_marker(TokenKind::Indent);
        } else if width < current {
            while self.indents.last().is_some_and(|&level| level > width) {
                self.indents.pop();
                self.push_marker(TokenKind::Dedent);
            }
            if self.indents.last() != Some(&width) {
                return Err(ParseError::InconsistentDedent { line: self.line });
            }
        }
        Ok(false)
    }

    fn comment(&mut self) {
        let start_offset = self.pos;
        let start = self.here();
        let mut end = self.pos;
        while end < self.bytes.len() && self.bytes[end] != b'\n' {
            end += 1;
        }
        // A `\r` before the newline is not part of the comment.
        let text_end = if end > start_offset && self.bytes[end - 1] == b'\r' {
            end - 1
        } else {
            end
        };
        self.pos = text_end;
        self.push(TokenKind::Comment, start_offset, start);
        self.pos = end;
    }

    fn number(&mut self) {
        let start_offset = self.pos;
        let start = self.here();
        while let Some(b) = self.peek(0) {
            let exponent_sign = (b == b'+' || b == b'-')
                && matches!(self.bytes.get(self.pos - 1), Some(b'e') | Some(b'E'))
                && !self.src[start_offset..self.pos].starts_with("0x")
                && !self.src[start_offset..self.pos].starts_with("0X");
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, start_offset, start);
    }

    fn name_or_prefixed_string(&mut self) -> ParseResult<()> {
        let start_offset = self.pos;
        let start = self.here();
        let rest = &self.src[self.pos..];
        let len = rest
            .char_indices()
            .find(|(_, c)| !(*c == '_' || c.is_alphanumeric()))
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let word = &rest[..len];
        self.pos += len;

        if matches!(self.peek(0), Some(b'"') | Some(b'\''))
            && STRING_PREFIXES.contains(&word.to_ascii_lowercase().as_str())
        {
            return self.string(start_offset, start);
        }
        self.push(TokenKind::Name, start_offset, start);
        Ok(())
    }

    /// Scan a string literal whose opening quote is at `self.pos`. The token
    /// starts at `start_offset`, which includes any prefix.
    fn string(&mut self, start_offset: usize, start: Position) -> ParseResult<()> {
        let quote = self.bytes[self.pos];
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        loop {
            let Some(b) = self.peek(0) else {
                return Err(ParseError::UnterminatedString { at: start });
            };
            match b {
                b'\\' => {
                    self.pos += 1;
                    if self.peek(0) == Some(b'\n') {
                        self.pos += 1;
                        self.newline();
                    } else if let Some(ch) = self.src[self.pos..].chars().next() {
                        self.pos += ch.len_utf8();
                    }
                }
                b'\n' => {
                    if !triple {
                        return Err(ParseError::UnterminatedString { at: start });
                    }
                    self.pos += 1;
                    self.newline();
                }
                _ if b == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }

        self.push(TokenKind::String, start_offset, start);
        Ok(())
    }

    fn operator(&mut self, ch: char) -> ParseResult<()> {
        let start_offset = self.pos;
        let start = self.here();
        let rest = &self.src[self.pos..];

        let len = if let Some(op) = OPERATORS_3.iter().find(|op| rest.starts_with(**op)) {
            op.len()
        } else if let Some(op) = OPERATORS_2.iter().find(|op| rest.starts_with(**op)) {
            op.len()
        } else if OPERATORS_1.contains(ch) {
            1
        } else {
            return Err(ParseError::InvalidCharacter { at: start, ch });
        };

        match ch {
            '(' | '[' | '{' if len == 1 => self.brackets.push((ch as u8, start)),
            ')' | ']' | '}' if len == 1 => {
                let expected = match ch {
                    ')' => b'(',
                    ']' => b'[',
                    _ => b'{',
                };
                match self.brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    _ => return Err(ParseError::UnmatchedBracket { at: start, found: ch }),
                }
            }
            _ => {}
        }

        self.pos += len;
        self.push(TokenKind::Op, start_offset, start);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
