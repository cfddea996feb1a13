//! UTF-16 position translation
//!
//! LSP positions count characters in UTF-16 code units. Rust strings are
//! indexed by UTF-8 byte offset, which is the "native index" everywhere in
//! this module. Code points above U+FFFF take two UTF-16 units (a surrogate
//! pair); everything else takes one.

use crate::protocol::{Position, Range};

/// UTF-16 units taken by one character.
fn utf16_width(ch: char) -> usize {
    if (ch as u32) > 0xFFFF {
        2
    } else {
        1
    }
}

/// Total UTF-16 length of `text`.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(utf16_width).sum()
}

/// Byte index in `text` corresponding to `units` UTF-16 code units.
///
/// Returns the first character boundary at which the running count reaches
/// or exceeds `units`, so a count that lands inside a surrogate pair rounds
/// up to the end of that character. Returns `text.len()` when the text holds
/// fewer units than requested.
pub fn native_index_from_utf16(text: &str, units: usize) -> usize {
    let mut count = 0;
    for (index, ch) in text.char_indices() {
        if count >= units {
            return index;
        }
        count += utf16_width(ch);
    }
    text.len()
}

/// UTF-16 length of `text[start..end]`.
///
/// Out-of-range or non-boundary indices are clamped down to the nearest
/// character boundary.
pub fn utf16_units_from_native_range(text: &str, start: usize, end: usize) -> usize {
    let start = floor_char_boundary(text, start);
    let end = floor_char_boundary(text, end);
    if start >= end {
        return 0;
    }
    utf16_len(&text[start..end])
}

/// Split `text` into lines, keeping each line's terminator.
///
/// A trailing empty line after a final `\n` is not included; callers that
/// address it get the end-of-document offset.
pub fn lines_with_endings(text: &str) -> Vec<&str> {
    text.split_inclusive('\n').collect()
}

/// Byte offset of (`line`, `character`) in the document made of `lines`.
///
/// `line` past the last line maps to the end of the document. `character`
/// is clamped to the line's content, excluding its terminator.
pub fn offset_from_line_character(lines: &[&str], line: usize, character: usize) -> usize {
    if line >= lines.len() {
        return lines.iter().map(|l| l.len()).sum();
    }

    let prefix: usize = lines[..line].iter().map(|l| l.len()).sum();
    let content = strip_terminator(lines[line]);
    prefix + native_index_from_utf16(content, character)
}

/// Byte offset of an LSP position in `text`.
pub fn position_to_offset(text: &str, position: Position) -> usize {
    let lines = lines_with_endings(text);
    offset_from_line_character(&lines, position.line as usize, position.character as usize)
}

/// LSP position of a byte offset in `text`.
pub fn offset_to_position(text: &str, offset: usize) -> Position {
    let offset = floor_char_boundary(text, offset);
    let mut line_start = 0;
    let mut line = 0u32;

    for segment in lines_with_endings(text) {
        let line_end = line_start + segment.len();
        if offset < line_end || (offset == line_end && !segment.ends_with('\n')) {
            let content_end = line_start + strip_terminator(segment).len();
            let character =
                utf16_units_from_native_range(text, line_start, offset.min(content_end));
            return Position::new(line, character as u32);
        }
        line_start = line_end;
        line += 1;
    }

    Position::new(line, 0)
}

/// Range covering the whole document.
///
/// The end sits on the last line at that line's UTF-16 length, so a document
/// ending in a newline ends on the empty line after it.
pub fn full_document_range(text: &str) -> Range {
    let last_line = text.split('\n').count().saturating_sub(1);
    let last = text.rsplit('\n').next().unwrap_or("");
    let last = last.strip_suffix('\r').unwrap_or(last);
    Range::new(
        Position::new(0, 0),
        Position::new(last_line as u32, utf16_len(last) as u32),
    )
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut index = index;
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
