//! Word lookup at a document position.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Position, Range};

/// Numbers (`-1.5`, `.5e3`) or runs of anything but whitespace and punctuation.
static WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(-?\d*\.\d\w*)|([^`~!@#$%^&*()\-=+\[{\]}\\|;:'",.<>/?\s]+)"#)
        .expect("valid word regex")
});

/// Range of the word enclosing `position` in `text`, if any.
///
/// A position just past the last character of a word still selects it.
/// Columns are counted in characters.
#[must_use]
pub fn word_range_at(text: &str, position: Position) -> Option<Range> {
    let line = text.lines().nth(position.line as usize)?;
    let (start, end) = word_span_in_line(line, position.character)?;
    Some(Range::on_line(position.line, start, end))
}

/// Character span `[start, end)` of the word containing `character`.
#[must_use]
pub fn word_span_in_line(line: &str, character: u32) -> Option<(u32, u32)> {
    let character = character as usize;
    WORD.find_iter(line).find_map(|word| {
        let start = line[..word.start()].chars().count();
        let end = start + word.as_str().chars().count();
        (start <= character && character <= end).then_some((start as u32, end as u32))
    })
}
