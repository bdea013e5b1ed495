use crate::line::split_lines;
use crate::position::Position;
use serde::{Deserialize, Serialize};

/// One primitive replacement of the text between `from` and `to`.
///
/// `text` always holds at least one entry; a single empty string means nothing
/// was inserted. `removed` is filled in once the change has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub from: Position,
    pub to: Position,
    pub text: Vec<String>,
    pub removed: Vec<String>,
    pub origin: Option<String>,
    #[serde(skip)]
    pub(crate) full: bool,
}

impl Change {
    pub(crate) fn new(from: Position, to: Position, text: Vec<String>, origin: Option<String>) -> Self {
        Change {
            from,
            to,
            text: normalize_lines(text),
            removed: Vec::new(),
            origin,
            full: false,
        }
    }

    /// Where the inserted text ends once the change is applied.
    pub fn end(&self) -> Position {
        change_end(self.from, &self.text)
    }

    pub(crate) fn is_noop(&self) -> bool {
        self.from == self.to && self.text.len() == 1 && self.text[0].is_empty()
    }

    /// Line delta the change introduces.
    pub(crate) fn line_diff(&self) -> isize {
        self.text.len() as isize - (self.to.line - self.from.line) as isize - 1
    }
}

/// Every primitive change an edit request turned into, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedChange {
    pub changes: Vec<Change>,
}

impl AppliedChange {
    /// `true` when read-only markers swallowed the whole request.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

pub(crate) fn change_end(from: Position, text: &[String]) -> Position {
    let last = text.last().map_or(0, String::len);
    if text.len() <= 1 {
        Position::new(from.line, from.column + last)
    } else {
        Position::new(from.line + text.len() - 1, last)
    }
}

/// Maps a position from before a change to where it sits afterwards.
/// Positions inside the replaced range move to its end.
pub(crate) fn adjust_for_change(pos: Position, change: &Change) -> Position {
    if pos < change.from {
        return pos;
    }
    let end = change.end();
    if pos <= change.to {
        return end;
    }
    let line = pos.line - (change.to.line - change.from.line) + (change.text.len() - 1);
    let column = if pos.line == change.to.line {
        pos.column - change.to.column + end.column
    } else {
        pos.column
    };
    Position::new(line, column)
}

// callers may hand in an empty list or strings holding line breaks
fn normalize_lines(lines: Vec<String>) -> Vec<String> {
    if lines.is_empty() {
        return vec![String::new()];
    }
    if lines.iter().any(|line| line.contains(['\n', '\r'])) {
        return split_lines(&lines.join("\n"));
    }
    lines
}
