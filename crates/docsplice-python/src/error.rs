//! Error types for the Python engine.
//!
//! - [`ParseError`]: the source (or a pass's output) is not valid Python as far
//!   as the outline parser can tell.
//! - [`StructuralError`]: targets are ambiguous (duplicate names at one scope).
//! - [`EngineError`]: document-level failures surfaced to the caller.
//!
//! Field-level and splice-computation problems never become errors here; the
//! passes log and skip them.

use thiserror::Error;

use docsplice_core::Position;

use crate::generation::Task;

/// The outline parser rejected the source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{at}: unterminated string literal")]
    UnterminatedString { at: Position },

    #[error("{at}: unmatched '{found}'")]
    UnmatchedBracket { at: Position, found: char },

    #[error("{at}: '{open}' was never closed")]
    UnclosedBracket { at: Position, open: char },

    #[error("line {line}: unindent does not match any outer indentation level")]
    InconsistentDedent { line: u32 },

    #[error("line {line}: unexpected indent")]
    UnexpectedIndent { line: u32 },

    #[error("line {line}: expected an indented block")]
    ExpectedIndentedBlock { line: u32 },

    #[error("{at}: invalid character {ch:?}")]
    InvalidCharacter { at: Position, ch: char },

    #[error("{at}: invalid syntax: {message}")]
    InvalidSyntax { at: Position, message: String },
}

impl ParseError {
    pub(crate) fn syntax(at: Position, message: impl Into<String>) -> Self {
        ParseError::InvalidSyntax {
            at,
            message: message.into(),
        }
    }
}

/// Result type for parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Two constructs at one scope share a name, so field keys would be ambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("function `{name}` is duplicated; please fix this before running")]
    DuplicateFunction { name: String },

    #[error("class `{name}` is duplicated; please fix this before running")]
    DuplicateClass { name: String },

    #[error("method `{method}` is duplicated for class `{class}`; please fix this before running")]
    DuplicateMethod { class: String, method: String },
}

/// Document-level failure.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("output of the {task} pass does not parse: {source}")]
    InvalidOutput { task: Task, source: ParseError },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
