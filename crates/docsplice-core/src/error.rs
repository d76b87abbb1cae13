//! Splice-computation errors.
//!
//! These mark a splice whose span could not be computed consistently. The
//! caller skips that one splice, logs it, and continues with the pass.

use thiserror::Error;

use crate::span::{Position, Span};

/// Error computing or applying a splice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpliceError {
    /// The original range ends before it starts.
    #[error("inverted range: end {end} is before start {start}")]
    InvertedRange { start: Position, end: Position },

    /// The resolved span ends before it starts.
    #[error("resolved span is inverted: {start} > {end}")]
    InvertedSpan { start: usize, end: usize },

    /// The resolved span extends beyond the buffer.
    #[error("span {span} is out of bounds for buffer of length {len}")]
    OutOfBounds { span: Span, len: usize },

    /// The resolved offset splits a multi-byte character.
    #[error("offset {offset} is not on a character boundary")]
    NotCharBoundary { offset: usize },

    /// Two edits in one batch overlap.
    #[error("overlapping edits: {first} and {second}")]
    OverlappingEdits { first: Span, second: Span },

    /// The buffer does not hold the expected delimiter at the resolved offset.
    #[error("expected {expected:?} at offset {offset}, found {found:?}")]
    UnexpectedText {
        offset: usize,
        expected: String,
        found: String,
    },

    /// An empty batch was submitted.
    #[error("no edits to apply")]
    EmptyEdits,
}

/// Result type for splice operations.
pub type SpliceResult<T> = Result<T, SpliceError>;
