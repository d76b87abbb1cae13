//! Position resolution: original `(line, col)` to current buffer offset.
//!
//! Line boundaries are re-derived from the live buffer on every call; only the
//! line index and column come from the [`ShiftState`]. Resolution never fails.
//! An offset past the end of its line or buffer is returned as computed and
//! the caller validates it before splicing.

use crate::shift::ShiftState;
use crate::span::Position;
use crate::text;

/// Which side of an earlier insertion at the same original point a position
/// resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bias {
    /// After text already inserted at this point. Used for insertion points
    /// and the start of replaced ranges.
    #[default]
    After,
    /// Before text already inserted at this point. Used for the end of a
    /// replaced range, so a replacement never swallows an earlier insertion.
    Before,
}

/// Resolve an original position to an offset in `buffer`.
pub fn resolve(buffer: &str, pos: Position, shift: &ShiftState) -> usize {
    resolve_with_bias(buffer, pos, shift, Bias::After)
}

/// Resolve an original position with an explicit [`Bias`].
pub fn resolve_with_bias(buffer: &str, pos: Position, shift: &ShiftState, bias: Bias) -> usize {
    let mapped = shift.map(pos, bias);
    match text::line_start_offset(buffer, mapped.line) {
        Some(start) => start + mapped.col,
        None => buffer.len(),
    }
}
