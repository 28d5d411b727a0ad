//! Source regeneration that keeps every untouched byte of the original file.
//!
//! Instead of printing the whole module again (which would drop comments and
//! reflow formatting), a transform records [`Edit`]s against the original text:
//! renamed identifiers, rewritten or removed import statements and inserted
//! declarations. Rewritten statements are rendered with ruff's [`Generator`]
//! so they follow the file's detected quote style, indentation and line endings.

use log::trace;
use ruff_python_ast::Stmt;
use ruff_python_codegen::{Generator, Stylist};
use ruff_text_size::{TextLen, TextRange, TextSize};

/// A replacement of a source range with new text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    range: TextRange,
    content: String,
}

impl Edit {
    pub fn range_replacement(content: impl Into<String>, range: TextRange) -> Self {
        Self {
            range,
            content: content.into(),
        }
    }

    pub fn insertion(content: impl Into<String>, at: TextSize) -> Self {
        Self {
            range: TextRange::empty(at),
            content: content.into(),
        }
    }

    pub fn deletion(range: TextRange) -> Self {
        Self {
            range,
            content: String::new(),
        }
    }
}

/// Apply edits to `source`.
///
/// Edits are applied in source order; insertions at an offset go before a
/// replacement starting at the same offset. An edit overlapping one already
/// applied is dropped.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| (edit.range.start(), edit.range.end()));

    let mut output = String::with_capacity(source.len());
    let mut last = TextSize::default();
    for edit in edits {
        if edit.range.start() < last {
            trace!("Dropping overlapping edit at {:?}", edit.range);
            continue;
        }
        output.push_str(&source[TextRange::new(last, edit.range.start())]);
        output.push_str(&edit.content);
        last = edit.range.end();
    }
    output.push_str(&source[TextRange::new(last, source.text_len())]);
    output
}

/// Render a single statement with the file's style
pub fn render_statement(stylist: &Stylist, stmt: &Stmt) -> String {
    Generator::from(stylist).stmt(stmt)
}

/// Widen the range of a statement that is being deleted.
///
/// When the statement sits alone on its line(s) the whole line is removed,
/// including the line break. A trailing `;` separator is consumed so that
/// `from a import b; x = 1` becomes `x = 1` rather than `; x = 1`.
pub fn removal_range(source: &str, range: TextRange) -> TextRange {
    let start = usize::from(range.start());
    let mut end = usize::from(range.end());

    let rest = &source[end..];
    let trimmed = rest.trim_start_matches([' ', '\t']);
    if let Some(after_semicolon) = trimmed.strip_prefix(';') {
        let consumed = rest.len() - after_semicolon.len();
        let spaces = after_semicolon.len() - after_semicolon.trim_start_matches([' ', '\t']).len();
        end += consumed + spaces;
        return TextRange::new(to_text_size(start), to_text_size(end));
    }

    let line_start = source[..start].rfind('\n').map_or(0, |index| index + 1);
    let leading = &source[line_start..start];
    let line_end = rest.find('\n').map_or(source.len(), |index| end + index + 1);
    let trailing = &source[end..line_end];

    if leading.trim().is_empty() && trailing.trim().is_empty() {
        TextRange::new(to_text_size(line_start), to_text_size(line_end))
    } else {
        range
    }
}

fn to_text_size(offset: usize) -> TextSize {
    TextSize::try_from(offset).unwrap_or_else(|_| TextSize::from(u32::MAX))
}
