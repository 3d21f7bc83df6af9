//! Plain value types shared with the engine.
//!
//! These are copied across the boundary by value and carry no ownership.

use std::fmt;

use tree_sitter::ffi;

use crate::error::{BindingError, Result};

/// A zero-based `(row, column)` position. Columns count bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    /// Zero-based line number.
    pub row: u32,
    /// Zero-based byte offset within the line.
    pub column: u32,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

impl From<ffi::TSPoint> for Point {
    fn from(point: ffi::TSPoint) -> Self {
        Self::new(point.row, point.column)
    }
}

impl From<Point> for ffi::TSPoint {
    fn from(point: Point) -> Self {
        Self {
            row: point.row,
            column: point.column,
        }
    }
}

/// A span of source text in both byte and point coordinates.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// Position of the first byte.
    pub start_point: Point,
    /// Position one past the last byte.
    pub end_point: Point,
    /// Offset of the first byte.
    pub start_byte: u32,
    /// Offset one past the last byte.
    pub end_byte: u32,
}

impl Range {
    /// Byte length of the range.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.end_byte.saturating_sub(self.start_byte)
    }

    /// Whether the range covers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end_byte <= self.start_byte
    }
}

impl From<ffi::TSRange> for Range {
    fn from(range: ffi::TSRange) -> Self {
        Self {
            start_point: range.start_point.into(),
            end_point: range.end_point.into(),
            start_byte: range.start_byte,
            end_byte: range.end_byte,
        }
    }
}

impl From<Range> for ffi::TSRange {
    fn from(range: Range) -> Self {
        Self {
            start_point: range.start_point.into(),
            end_point: range.end_point.into(),
            start_byte: range.start_byte,
            end_byte: range.end_byte,
        }
    }
}

/// Describes one incremental edit: bytes `[start_byte, old_end_byte)` were
/// replaced by `[start_byte, new_end_byte)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputEdit {
    /// First byte touched by the edit.
    pub start_byte: u32,
    /// End of the replaced text, before the edit.
    pub old_end_byte: u32,
    /// End of the inserted text, after the edit.
    pub new_end_byte: u32,
    /// Position of `start_byte`.
    pub start_point: Point,
    /// Position of `old_end_byte`.
    pub old_end_point: Point,
    /// Position of `new_end_byte`.
    pub new_end_point: Point,
}

impl InputEdit {
    /// Builds an edit replacing `old_len` bytes at `start` with `new_len`
    /// bytes, deriving points for text that contains no newlines.
    ///
    /// Single-line edits are the common case in tests and REPL-style hosts;
    /// callers editing across lines should fill the struct directly.
    #[must_use]
    pub const fn single_line(start: Point, start_byte: u32, old_len: u32, new_len: u32) -> Self {
        Self {
            start_byte,
            old_end_byte: start_byte.saturating_add(old_len),
            new_end_byte: start_byte.saturating_add(new_len),
            start_point: start,
            old_end_point: Point::new(start.row, start.column.saturating_add(old_len)),
            new_end_point: Point::new(start.row, start.column.saturating_add(new_len)),
        }
    }

    /// Builds the edit that replaces `old` within `source` by `replacement`,
    /// deriving every point from the text.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::InvalidRange`] when `old` is reversed, lies
    /// outside `source`, or the result does not fit 32-bit offsets.
    pub fn replacing(
        source: &[u8],
        old: std::ops::Range<usize>,
        replacement: &[u8],
    ) -> Result<Self> {
        let invalid = || BindingError::invalid_range(format!("edit range {old:?}"));
        let prefix = source.get(..old.start).ok_or_else(invalid)?;
        let removed = source.get(old.clone()).ok_or_else(invalid)?;
        let offset = |value: usize| u32::try_from(value).map_err(|_| invalid());
        let start_point = advance_point(Point::default(), prefix);
        Ok(Self {
            start_byte: offset(old.start)?,
            old_end_byte: offset(old.end)?,
            new_end_byte: offset(old.start.saturating_add(replacement.len()))?,
            start_point,
            old_end_point: advance_point(start_point, removed),
            new_end_point: advance_point(start_point, replacement),
        })
    }

    /// Signed byte delta applied to text after the edit.
    #[must_use]
    pub fn delta(&self) -> i64 {
        i64::from(self.new_end_byte) - i64::from(self.old_end_byte)
    }
}

impl From<InputEdit> for ffi::TSInputEdit {
    fn from(edit: InputEdit) -> Self {
        Self {
            start_byte: edit.start_byte,
            old_end_byte: edit.old_end_byte,
            new_end_byte: edit.new_end_byte,
            start_point: edit.start_point.into(),
            old_end_point: edit.old_end_point.into(),
            new_end_point: edit.new_end_point.into(),
        }
    }
}

/// Derives the point reached after consuming `bytes` starting at `origin`.
pub(crate) fn advance_point(origin: Point, bytes: &[u8]) -> Point {
    bytes.iter().fold(origin, |point, byte| {
        if *byte == b'\n' {
            Point::new(point.row.saturating_add(1), 0)
        } else {
            Point::new(point.row, point.column.saturating_add(1))
        }
    })
}

/// Converts a byte offset into a row and byte column within `source`.
pub(crate) fn row_column(source: &[u8], offset: usize) -> (usize, usize) {
    let prefix = source.get(..offset).unwrap_or(source);
    let row = prefix.iter().filter(|byte| **byte == b'\n').count();
    let column = prefix
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(prefix.len(), |newline| {
            prefix.len().saturating_sub(newline.saturating_add(1))
        });
    (row, column)
}
