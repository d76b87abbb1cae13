//! Spans over the live buffer and positions in the original source.
//!
//! Two coordinate systems meet in the engine:
//!
//! - [`Position`] is a `(line, col)` pair in the *original* parse. Lines are
//!   1-indexed, columns are 0-indexed UTF-8 byte offsets within the line
//!   (the same convention as CPython's `col_offset`).
//! - [`Span`] is a half-open byte range in the *current* buffer, after any
//!   number of earlier splices.
//!
//! Converting the former into the latter is the job of
//! [`resolve`](crate::resolve).

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Position
// ============================================================================

/// A location in the original, unpatched source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// 1-indexed line number.
    pub line: u32,
    /// 0-indexed byte column within the line.
    pub col: usize,
}

impl Position {
    pub fn new(line: u32, col: usize) -> Self {
        Position { line, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

// ============================================================================
// Span
// ============================================================================

/// A half-open byte range `[start, end)` in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`. Use [`Span::try_new`] for computed offsets.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(
            start <= end,
            "Span start ({}) must be <= end ({})",
            start,
            end
        );
        Span { start, end }
    }

    /// Create a span, returning `None` when `start > end`.
    pub fn try_new(start: usize, end: usize) -> Option<Self> {
        (start <= end).then_some(Span { start, end })
    }

    /// Zero-width span at `offset`.
    pub fn empty(offset: usize) -> Self {
        Span {
            start: offset,
            end: offset,
        }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Check if span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if this span overlaps with another.
    ///
    /// Adjacent spans (one ends where another starts) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Check if this span contains another span entirely.
    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
