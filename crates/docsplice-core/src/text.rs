//! Line and offset utilities over a text buffer.
//!
//! ## Coordinate Conventions
//!
//! - Lines are **1-indexed**
//! - Columns are **0-indexed byte offsets** within a line
//! - Buffer offsets are **0-indexed bytes**
//!
//! Only `\n` terminates a line. A `\r` before it stays part of the line's
//! content, so columns computed here agree with the tokenizer's.

use crate::span::{Position, Span};

// ============================================================================
// Line Starts
// ============================================================================

/// Byte offsets at which each line of `text` begins.
///
/// The result always has at least one entry. A trailing newline opens a final,
/// empty line.
pub fn line_starts(text: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(
        text.bytes()
            .enumerate()
            .filter(|(_, b)| *b == b'\n')
            .map(|(i, _)| i + 1),
    );
    starts
}

/// Byte offset of the start of a 1-indexed line.
///
/// Returns `None` for line 0 or a line past the end of the buffer. The empty
/// line after a trailing newline exists and starts at `text.len()`.
pub fn line_start_offset(text: &str, line: u32) -> Option<usize> {
    if line == 0 {
        return None;
    }
    if line == 1 {
        return Some(0);
    }
    text.bytes()
        .enumerate()
        .filter(|(_, b)| *b == b'\n')
        .nth(line as usize - 2)
        .map(|(i, _)| i + 1)
}

/// Offset of the end of the line that contains `offset` (the newline itself,
/// or the buffer length on the last line).
pub fn line_end_from(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text.as_bytes()[offset..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|i| offset + i)
        .unwrap_or(text.len())
}

/// Offset of the start of the line that contains `offset`.
pub fn line_start_from(text: &str, offset: usize) -> usize {
    let offset = offset.min(text.len());
    text.as_bytes()[..offset]
        .iter()
        .rposition(|b| *b == b'\n')
        .map(|i| i + 1)
        .unwrap_or(0)
}

/// Content of a 1-indexed line, without its terminating newline.
pub fn line_text(text: &str, line: u32) -> Option<&str> {
    let start = line_start_offset(text, line)?;
    Some(&text[start..line_end_from(text, start)])
}

/// Number of lines in `text`, counting a trailing unterminated line.
pub fn line_count(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let newlines = newline_count(text) as u32;
    if text.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

// ============================================================================
// Conversions
// ============================================================================

/// Convert a byte offset to a [`Position`].
///
/// Offsets past the end clamp to the end of the buffer.
pub fn offset_to_position(text: &str, offset: usize) -> Position {
    let offset = offset.min(text.len());
    let before = &text.as_bytes()[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count() as u32 + 1;
    let col = offset - line_start_from(text, offset);
    Position::new(line, col)
}

/// Convert a [`Position`] to a byte offset, with no shift applied.
///
/// Lines past the end clamp to the buffer length; columns are clamped to the
/// end of their line.
pub fn position_to_offset(text: &str, pos: Position) -> usize {
    match line_start_offset(text, pos.line.max(1)) {
        Some(start) => {
            let end = line_end_from(text, start);
            (start + pos.col).min(end)
        }
        None => text.len(),
    }
}

/// Extract the text of a span, if it is in bounds and on char boundaries.
pub fn extract_span<'a>(text: &'a str, span: &Span) -> Option<&'a str> {
    text.get(span.start..span.end)
}

// ============================================================================
// Measuring Replacement Text
// ============================================================================

/// Number of `\n` characters in `text`.
pub fn newline_count(text: &str) -> usize {
    text.bytes().filter(|b| *b == b'\n').count()
}

/// Length in bytes of the text after the last newline.
///
/// For text without a newline this is the whole length.
pub fn last_line_len(text: &str) -> usize {
    match text.rfind('\n') {
        Some(i) => text.len() - i - 1,
        None => text.len(),
    }
}

/// The leading spaces and tabs of `line`.
pub fn leading_whitespace(line: &str) -> &str {
    let end = line
        .bytes()
        .position(|b| b != b' ' && b != b'\t')
        .unwrap_or(line.len());
    &line[..end]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod line_tests {
        use super::*;

        #[test]
        fn line_starts_include_trailing_empty_line() {
            assert_eq!(line_starts("a\nbc\n"), vec![0, 2, 5]);
            assert_eq!(line_starts(""), vec![0]);
        }

        #[test]
        fn line_start_offset_matches_line_starts() {
            let text = "def f():\n    pass\n\nx = 1";
            let starts = line_starts(text);
            for (i, start) in starts.iter().enumerate() {
                assert_eq!(line_start_offset(text, i as u32 + 1), Some(*start));
            }
            assert_eq!(line_start_offset(text, starts.len() as u32 + 1), None);
            assert_eq!(line_start_offset(text, 0), None);
        }

        #[test]
        fn line_text_strips_newline() {
            let text = "first\nsecond\n";
            assert_eq!(line_text(text, 1), Some("first"));
            assert_eq!(line_text(text, 2), Some("second"));
            assert_eq!(line_text(text, 3), Some(""));
            assert_eq!(line_text(text, 4), None);
        }

        #[test]
        fn line_count_handles_trailing_newline() {
            assert_eq!(line_count(""), 0);
            assert_eq!(line_count("a"), 1);
            assert_eq!(line_count("a\n"), 1);
            assert_eq!(line_count("a\nb"), 2);
        }
    }

    mod conversion_tests {
        use super::*;

        #[test]
        fn roundtrip_every_offset() {
            let text = "def foo(x):\n    return x\n";
            for offset in 0..=text.len() {
                let pos = offset_to_position(text, offset);
                assert_eq!(position_to_offset(text, pos), offset, "offset {}", offset);
            }
        }

        #[test]
        fn columns_count_bytes() {
            let text = "s = 'héllo'  # x\n";
            let hash = text.find('#').unwrap();
            assert_eq!(offset_to_position(text, hash), Position::new(1, hash));
        }

        #[test]
        fn position_past_end_clamps() {
            assert_eq!(position_to_offset("ab\ncd", Position::new(9, 0)), 5);
            assert_eq!(position_to_offset("ab\ncd", Position::new(1, 40)), 2);
        }
    }

    mod measure_tests {
        use super::*;

        #[test]
        fn last_line_len_after_newline() {
            assert_eq!(last_line_len("abc"), 3);
            assert_eq!(last_line_len("abc\n  de"), 4);
            assert_eq!(last_line_len("abc\n"), 0);
        }

        #[test]
        fn leading_whitespace_mixed() {
            assert_eq!(leading_whitespace("\t  x = 1"), "\t  ");
            assert_eq!(leading_whitespace("x"), "");
            assert_eq!(leading_whitespace("   "), "   ");
        }
    }
}
