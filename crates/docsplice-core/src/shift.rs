//! Shift state: bookkeeping of splices already applied in a pass.
//!
//! Every splice is recorded in original-source coordinates. Two views are kept:
//!
//! - The **two-tier counters** (`line_of_last_edit`, `intra_line_shift`,
//!   `line_count_shift`). They answer cheaply for the common case of edits
//!   applied top to bottom, such as a run of argument annotations on one `def`
//!   line.
//! - The **edit journal**, ordered by original end position. It answers
//!   exactly for any application order.
//!
//! [`ShiftState::map`] only takes the counters' answer when the journal proves
//! it equal: every edit so far was applied in source order, the queried
//! position lies after the last edit, and no multi-line edit touches the
//! queried line.

use tracing::trace;

use crate::resolve::Bias;
use crate::span::Position;
use crate::text;

// ============================================================================
// Journal
// ============================================================================

/// One applied splice, in original coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    /// Start of the replaced range in the original source.
    pub start: Position,
    /// End of the replaced range in the original source.
    pub end: Position,
    /// Bytes of replacement text.
    pub inserted_len: usize,
    /// Newlines in the replacement text.
    pub inserted_newlines: u32,
    /// Bytes after the last newline of the replacement text.
    pub tail_len: usize,
    /// Bytes removed from the buffer.
    pub removed_len: usize,
    seq: usize,
}

impl JournalEntry {
    /// Net change in line count.
    pub fn line_delta(&self) -> i64 {
        i64::from(self.inserted_newlines) - i64::from(self.end.line - self.start.line)
    }

    /// Net change in buffer length.
    pub fn byte_delta(&self) -> i64 {
        self.inserted_len as i64 - self.removed_len as i64
    }

    /// Single-line range replaced by single-line text.
    pub fn is_flat(&self) -> bool {
        self.start.line == self.end.line && self.inserted_newlines == 0
    }

    fn is_insertion(&self) -> bool {
        self.start == self.end
    }

    /// Sort key: end position, then replacements before insertions at the same
    /// point, then application order.
    fn key(&self) -> (Position, bool, usize) {
        (self.end, self.is_insertion(), self.seq)
    }

    /// Whether this edit's text lies before `pos` in the current buffer.
    fn precedes(&self, pos: Position, bias: Bias) -> bool {
        if self.end < pos {
            true
        } else if self.end == pos {
            !self.is_insertion() || bias == Bias::After
        } else {
            false
        }
    }
}

// ============================================================================
// ShiftState
// ============================================================================

/// A position mapped into the current buffer: line plus byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedPosition {
    /// 1-indexed line in the current buffer.
    pub line: u32,
    /// Byte column within that line.
    pub col: usize,
}

/// Mutable record of the splices applied to one buffer during one pass.
#[derive(Debug, Clone)]
pub struct ShiftState {
    line_of_last_edit: u32,
    intra_line_shift: i64,
    line_count_shift: i64,
    journal: Vec<JournalEntry>,
    next_seq: usize,
    in_source_order: bool,
    last_line_flat: bool,
}

impl Default for ShiftState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShiftState {
    /// A zeroed state, as at the start of a pass.
    pub fn new() -> Self {
        ShiftState {
            line_of_last_edit: 0,
            intra_line_shift: 0,
            line_count_shift: 0,
            journal: Vec::new(),
            next_seq: 0,
            in_source_order: true,
            last_line_flat: true,
        }
    }

    /// Original line of the most recent edit (0 before any edit).
    pub fn line_of_last_edit(&self) -> u32 {
        self.line_of_last_edit
    }

    /// Byte delta accumulated by consecutive edits on `line_of_last_edit`.
    pub fn intra_line_shift(&self) -> i64 {
        self.intra_line_shift
    }

    /// Net lines added by all edits so far.
    pub fn line_count_shift(&self) -> i64 {
        self.line_count_shift
    }

    /// Applied edits, ordered by original end position.
    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    pub fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    /// Whether every edit so far was applied in source order.
    pub fn in_source_order(&self) -> bool {
        self.in_source_order
    }

    /// Record a splice that replaced the original range `start..end` with
    /// `replacement`, removing `removed_len` bytes from the buffer.
    pub fn record(&mut self, start: Position, end: Position, replacement: &str, removed_len: usize) {
        let entry = JournalEntry {
            start,
            end,
            inserted_len: replacement.len(),
            inserted_newlines: text::newline_count(replacement) as u32,
            tail_len: text::last_line_len(replacement),
            removed_len,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        if start.line == self.line_of_last_edit {
            self.intra_line_shift += entry.byte_delta();
        } else {
            self.intra_line_shift = entry.byte_delta();
            self.line_of_last_edit = start.line;
        }
        self.line_count_shift += entry.line_delta();

        let key = entry.key();
        let index = self.journal.partition_point(|e| e.key() <= key);
        if index == self.journal.len() && self.in_source_order {
            self.last_line_flat = match self.journal.last() {
                Some(prev) if prev.end.line == entry.end.line => {
                    self.last_line_flat && entry.is_flat()
                }
                _ => entry.is_flat(),
            };
        } else {
            self.in_source_order = false;
        }

        trace!(
            start = %entry.start,
            end = %entry.end,
            byte_delta = entry.byte_delta(),
            line_delta = entry.line_delta(),
            "recorded splice"
        );
        self.journal.insert(index, entry);
    }

    /// Map an original position into current-buffer line and column.
    pub fn map(&self, pos: Position, bias: Bias) -> MappedPosition {
        self.map_fast(pos, bias)
            .unwrap_or_else(|| self.map_exact(pos, bias))
    }

    /// The two-tier answer, when it provably agrees with the journal.
    fn map_fast(&self, pos: Position, bias: Bias) -> Option<MappedPosition> {
        let last = match self.journal.last() {
            None => return Some(MappedPosition { line: pos.line, col: pos.col }),
            Some(last) => last,
        };
        if !self.in_source_order || !last.precedes(pos, bias) {
            return None;
        }
        if pos.line == last.end.line && !self.last_line_flat {
            return None;
        }
        let col_shift = if pos.line == self.line_of_last_edit {
            self.intra_line_shift
        } else {
            0
        };
        Some(MappedPosition {
            line: shifted_line(pos.line, self.line_count_shift),
            col: shifted_col(pos.col, col_shift),
        })
    }

    /// The journal answer.
    fn map_exact(&self, pos: Position, bias: Bias) -> MappedPosition {
        let counted = self.journal.partition_point(|e| e.precedes(pos, bias));
        let prefix = &self.journal[..counted];

        // Current column of each edit's end, in journal order. An edit's text
        // starts where its original start now sits.
        let mut end_cols: Vec<usize> = Vec::with_capacity(prefix.len());
        for (i, entry) in prefix.iter().enumerate() {
            let end_col = if entry.inserted_newlines > 0 {
                entry.tail_len
            } else {
                current_col(&prefix[..i], &end_cols, entry.start) + entry.inserted_len
            };
            end_cols.push(end_col);
        }

        let line_shift: i64 = prefix.iter().map(JournalEntry::line_delta).sum();
        MappedPosition {
            line: shifted_line(pos.line, line_shift),
            col: current_col(prefix, &end_cols, pos),
        }
    }
}

/// Current column of `pos`, given every edit that precedes it.
///
/// Only the last preceding edit can share `pos`'s original line, since the
/// journal is ordered by end position.
fn current_col(preceding: &[JournalEntry], end_cols: &[usize], pos: Position) -> usize {
    match preceding.last() {
        Some(last) if last.end.line == pos.line => {
            end_cols[preceding.len() - 1] + pos.col.saturating_sub(last.end.col)
        }
        _ => pos.col,
    }
}

fn shifted_line(line: u32, shift: i64) -> u32 {
    (i64::from(line) + shift).clamp(1, i64::from(u32::MAX)) as u32
}

fn shifted_col(col: usize, shift: i64) -> usize {
    (col as i64 + shift).max(0) as usize
}

// ============================================================================
// Tests
// ============================================================================
