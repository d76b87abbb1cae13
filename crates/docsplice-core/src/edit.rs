// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Splice primitives applied to a live buffer.
//!
//! [`SpliceBuffer`] owns the text being patched and its [`ShiftState`]. Edits
//! are expressed in original-source positions; the buffer resolves them,
//! validates the resolved spans, applies the text change and records it.
//!
//! # Edit Primitives
//!
//! | Primitive | Description | Range Semantics |
//! |-----------|-------------|-----------------|
//! | `Replace { start, end, new_text }` | Replace the original range | `start..end` becomes `new_text` |
//! | `Delete { start, end }` | Remove the original range | Equivalent to `Replace` with `""` |
//! | `InsertAt { position, text }` | Insert at an original position | Zero-width range, after earlier insertions there |
//!
//! A batch is all-or-nothing: every span is resolved and validated against the
//! same buffer state before any text changes.
//!
//! # Example
//!
//! ```
//! use docsplice_core::{EditPrimitive, Position, SpliceBuffer};
//!
//! let mut buffer = SpliceBuffer::new("def f(x, y=1): pass\n");
//! buffer.apply(EditPrimitive::InsertAt {
//!     position: Position::new(1, 13),
//!     text: " -> int".to_string(),
//! }).unwrap();
//! buffer.apply(EditPrimitive::InsertAt {
//!     position: Position::new(1, 7),
//!     text: ": str".to_string(),
//! }).unwrap();
//!
//! assert_eq!(buffer.text(), "def f(x: str, y=1) -> int: pass\n");
//! ```

use std::cmp::Ordering;

use tracing::debug;

use crate::error::{SpliceError, SpliceResult};
use crate::resolve::{resolve_with_bias, Bias};
use crate::shift::ShiftState;
use crate::span::{Position, Span};

// ============================================================================
// Edit Primitives
// ============================================================================

/// An atomic edit operation, in original-source coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPrimitive {
    /// Replace the original range with new text.
    Replace {
        start: Position,
        end: Position,
        new_text: String,
    },

    /// Delete the original range.
    Delete { start: Position, end: Position },

    /// Insert text at an original position.
    InsertAt { position: Position, text: String },
}

impl EditPrimitive {
    /// The original range this edit covers. Zero-width for insertions.
    pub fn range(&self) -> (Position, Position) {
        match self {
            EditPrimitive::Replace { start, end, .. } | EditPrimitive::Delete { start, end } => {
                (*start, *end)
            }
            EditPrimitive::InsertAt { position, .. } => (*position, *position),
        }
    }

    /// The text this edit writes.
    pub fn text(&self) -> &str {
        match self {
            EditPrimitive::Replace { new_text, .. } => new_text,
            EditPrimitive::Delete { .. } => "",
            EditPrimitive::InsertAt { text, .. } => text,
        }
    }

    /// Returns true if this edit removes nothing.
    pub fn is_insertion(&self) -> bool {
        let (start, end) = self.range();
        start == end
    }
}

/// Result of one applied edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedSplice {
    /// The span that was replaced, in the buffer as it was before the batch.
    pub span: Span,
    /// Bytes written.
    pub inserted_len: usize,
}

// ============================================================================
// SpliceBuffer
// ============================================================================

/// A text buffer plus the shift state of the pass that is patching it.
#[derive(Debug, Clone)]
pub struct SpliceBuffer {
    text: String,
    shift: ShiftState,
}

impl SpliceBuffer {
    /// Start a pass over `text` with a zeroed shift state.
    pub fn new(text: impl Into<String>) -> Self {
        SpliceBuffer {
            text: text.into(),
            shift: ShiftState::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn shift(&self) -> &ShiftState {
        &self.shift
    }

    pub fn into_text(self) -> String {
        self.text
    }

    /// Resolve an original position to a current offset.
    pub fn resolve(&self, pos: Position) -> usize {
        resolve_with_bias(&self.text, pos, &self.shift, Bias::After)
    }

    /// Resolve an original range to a validated span in the current buffer.
    ///
    /// # Errors
    ///
    /// - `SpliceError::InvertedRange` if `end < start`
    /// - `SpliceError::InvertedSpan` if the resolved span is inverted
    /// - `SpliceError::OutOfBounds` if the span extends past the buffer
    /// - `SpliceError::NotCharBoundary` if either end splits a character
    pub fn resolve_span(&self, start: Position, end: Position) -> SpliceResult<Span> {
        if end < start {
            return Err(SpliceError::InvertedRange { start, end });
        }
        let span_start = resolve_with_bias(&self.text, start, &self.shift, Bias::After);
        let span_end = if start == end {
            span_start
        } else {
            resolve_with_bias(&self.text, end, &self.shift, Bias::Before)
        };
        let span = Span::try_new(span_start, span_end).ok_or(SpliceError::InvertedSpan {
            start: span_start,
            end: span_end,
        })?;
        if span.end > self.text.len() {
            return Err(SpliceError::OutOfBounds {
                span,
                len: self.text.len(),
            });
        }
        for offset in [span.start, span.end] {
            if !self.text.is_char_boundary(offset) {
                return Err(SpliceError::NotCharBoundary { offset });
            }
        }
        Ok(span)
    }

    /// Check that the buffer holds `expected` at `offset`.
    pub fn expect_text(&self, offset: usize, expected: &str) -> SpliceResult<()> {
        match self.text.get(offset..) {
            Some(rest) if rest.starts_with(expected) => Ok(()),
            rest => Err(SpliceError::UnexpectedText {
                offset,
                expected: expected.to_string(),
                found: rest
                    .unwrap_or_default()
                    .chars()
                    .take(expected.chars().count().max(1))
                    .collect(),
            }),
        }
    }

    /// Apply a single edit.
    pub fn apply(&mut self, edit: EditPrimitive) -> SpliceResult<AppliedSplice> {
        self.apply_batch(vec![edit])?
            .into_iter()
            .next()
            .ok_or(SpliceError::EmptyEdits)
    }

    /// Apply several edits atomically.
    ///
    /// Spans are resolved against the current buffer, checked for overlaps,
    /// then applied in reverse position order so earlier spans stay valid.
    /// The shift state records the edits in source order.
    ///
    /// # Errors
    ///
    /// - `SpliceError::EmptyEdits` if `edits` is empty
    /// - `SpliceError::OverlappingEdits` if any two resolved spans overlap
    /// - any error from [`SpliceBuffer::resolve_span`]
    ///
    /// On error the buffer and shift state are unchanged.
    pub fn apply_batch(&mut self, edits: Vec<EditPrimitive>) -> SpliceResult<Vec<AppliedSplice>> {
        if edits.is_empty() {
            return Err(SpliceError::EmptyEdits);
        }

        let mut resolved = Vec::with_capacity(edits.len());
        for edit in edits {
            let (start, end) = edit.range();
            let span = self.resolve_span(start, end)?;
            resolved.push((edit, span));
        }

        // Descending by start; at equal starts, removals before insertions.
        resolved.sort_by(|(a, a_span), (b, b_span)| match b_span.start.cmp(&a_span.start) {
            Ordering::Equal => match (a.is_insertion(), b.is_insertion()) {
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                _ => Ordering::Equal,
            },
            other => other,
        });

        for pair in resolved.windows(2) {
            let (later, earlier) = (&pair[0].1, &pair[1].1);
            if earlier.overlaps(later) {
                return Err(SpliceError::OverlappingEdits {
                    first: *earlier,
                    second: *later,
                });
            }
        }

        for (edit, span) in &resolved {
            self.text.replace_range(span.start..span.end, edit.text());
        }

        let mut applied = Vec::with_capacity(resolved.len());
        for (edit, span) in resolved.into_iter().rev() {
            let (start, end) = edit.range();
            self.shift.record(start, end, edit.text(), span.len());
            debug!(
                span = %span,
                original = %start,
                inserted = edit.text().len(),
                "applied splice"
            );
            applied.push(AppliedSplice {
                span,
                inserted_len: edit.text().len(),
            });
        }
        Ok(applied)
    }
}

// ============================================================================
// Tests
// ============================================================================
