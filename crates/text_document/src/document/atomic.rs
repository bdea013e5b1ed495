//! Keeping cursors out of atomic ranges.

use super::{Document, ViewId};
use crate::error::EditError;
use crate::position::{Position, Range};
use crate::selection::{Direction, Selection};
use tracing::warn;
use unicode_segmentation::GraphemeCursor;

impl Document {
    /// Maps every range of `selection` out of atomic markers, comparing with
    /// the current selection to tell which way each cursor was heading.
    ///
    /// With `enter_edges`, a cursor that moves onto the outer edge of an
    /// atomic range from outside is carried across it.
    pub(crate) fn skip_atomic_in_selection(
        &mut self,
        view: ViewId,
        selection: Selection,
        bias: Direction,
        may_clear: bool,
        enter_edges: bool,
    ) -> Result<Selection, EditError> {
        let current = self.view(view).selection.clone();
        let same_shape = current.len() == selection.len();
        let mut out: Option<Vec<Range>> = None;
        for (i, range) in selection.ranges().iter().enumerate() {
            let old = same_shape.then(|| current.ranges()[i]);
            let anchor = self.skip_atomic(view, range.anchor, old.map(|old| old.anchor), bias, may_clear, enter_edges);
            let head = if range.is_empty() {
                anchor
            } else {
                self.skip_atomic(view, range.head, old.map(|old| old.head), bias, may_clear, enter_edges)
            };
            if out.is_some() || anchor != range.anchor || head != range.head {
                out.get_or_insert_with(|| selection.ranges()[..i].to_vec())
                    .push(Range::new(anchor, head));
            }
        }
        match out {
            Some(ranges) => Selection::normalize(ranges, selection.primary_index(), self.options.selections_may_touch),
            None => Ok(selection),
        }
    }

    /// Moves `pos` out of any atomic range it sits in.
    ///
    /// When no direction leads out, the view becomes uneditable and the
    /// position falls back to the start of the document.
    pub(crate) fn skip_atomic(
        &mut self,
        view: ViewId,
        pos: Position,
        old: Option<Position>,
        bias: Direction,
        may_clear: bool,
        enter_edges: bool,
    ) -> Position {
        match self.find_atomic_escape(view, pos, old, bias, may_clear, enter_edges) {
            Some(found) => found,
            None => {
                warn!(%view, %pos, "no position outside atomic ranges; document is now read-only");
                self.view_state_mut(view).cant_edit = true;
                Position::default()
            }
        }
    }

    /// Tries `bias` first, then the opposite direction. Each direction is
    /// retried with clearing allowed when it was not already.
    pub(crate) fn find_atomic_escape(
        &mut self,
        view: ViewId,
        pos: Position,
        old: Option<Position>,
        bias: Direction,
        may_clear: bool,
        enter_edges: bool,
    ) -> Option<Position> {
        for dir in [bias, bias.reverse()] {
            if let Some(found) = self.skip_atomic_inner(view, pos, old, dir, may_clear, enter_edges) {
                return Some(found);
            }
            if !may_clear {
                if let Some(found) = self.skip_atomic_inner(view, pos, old, dir, true, enter_edges) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn skip_atomic_inner(
        &mut self,
        view: ViewId,
        pos: Position,
        old: Option<Position>,
        dir: Direction,
        may_clear: bool,
        enter_edges: bool,
    ) -> Option<Position> {
        let mut spans = self.line_spans(view, pos.line);
        let mut i = 0;
        while i < spans.len() {
            let span = spans[i];
            let Some(marker) = self.view(view).markers.get(span.marker) else {
                i += 1;
                continue;
            };
            let config = &marker.config;
            let (prevent_left, prevent_right) = (config.inclusive_left, config.inclusive_right);
            let (atomic, clear_on_enter) = (config.atomic, config.clear_on_enter);
            let inside = span.from.is_none_or(|from| {
                if prevent_left {
                    from <= pos.column
                } else {
                    from < pos.column
                }
            }) && span.to.is_none_or(|to| {
                if prevent_right {
                    to >= pos.column
                } else {
                    to > pos.column
                }
            });
            // arriving on the edge a cursor would have to cross next
            let entered_edge = !inside
                && atomic
                && enter_edges
                && match dir {
                    Direction::Forward => span.from == Some(pos.column) && old.is_some_and(|old| old < pos),
                    Direction::Backward => span.to == Some(pos.column) && old.is_some_and(|old| old > pos),
                };
            if !inside && !entered_edge {
                i += 1;
                continue;
            }
            if may_clear && clear_on_enter {
                self.clear_marker_in(view, span.marker);
                spans = self.line_spans(view, pos.line);
                continue;
            }
            if !atomic {
                i += 1;
                continue;
            }
            let Some((start, end)) = self.marker_range(view, span.marker) else {
                i += 1;
                continue;
            };

            if let Some(old) = old.filter(|_| !entered_edge) {
                let (mut near, step_near) = match dir {
                    Direction::Forward => (Some(start), prevent_left),
                    Direction::Backward => (Some(end), prevent_right),
                };
                if step_near {
                    near = near.and_then(|near| self.move_pos(view, near, dir.reverse()));
                }
                if let Some(near) = near {
                    let moved_on = match dir {
                        Direction::Forward => near > old,
                        Direction::Backward => near < old,
                    };
                    if near.line == pos.line && moved_on {
                        return self.skip_atomic_inner(view, near, Some(pos), dir, may_clear, enter_edges);
                    }
                }
            }

            let (far, step_far) = match dir {
                Direction::Forward => (end, prevent_right),
                Direction::Backward => (start, prevent_left),
            };
            let far = if step_far {
                self.move_pos(view, far, dir)?
            } else {
                far
            };
            return self.skip_atomic_inner(view, far, Some(pos), dir, may_clear, enter_edges);
        }
        Some(pos)
    }

    fn line_spans(&self, view: ViewId, line: usize) -> Vec<crate::marker::MarkedSpan> {
        self.view(view)
            .lines
            .get(line)
            .map(|line| line.spans.clone())
            .unwrap_or_default()
    }

    /// One grapheme step from `pos`, crossing line boundaries. `None` at the
    /// edges of the document.
    pub(crate) fn move_pos(&self, view: ViewId, pos: Position, dir: Direction) -> Option<Position> {
        let lines = &self.view(view).lines;
        let text = lines.get(pos.line).ok()?.text.as_str();
        match dir {
            Direction::Backward if pos.column == 0 => {
                let previous = pos.line.checked_sub(1)?;
                let len = lines.get(previous).ok()?.text.len();
                Some(Position::new(previous, len))
            }
            Direction::Forward if pos.column >= text.len() => {
                (pos.line + 1 < lines.len()).then(|| Position::new(pos.line + 1, 0))
            }
            _ => Some(Position::new(pos.line, grapheme_step(text, pos.column, dir))),
        }
    }
}

fn grapheme_step(text: &str, column: usize, dir: Direction) -> usize {
    let mut cursor = GraphemeCursor::new(column, text.len(), true);
    let boundary = match dir {
        Direction::Forward => cursor.next_boundary(text, 0),
        Direction::Backward => cursor.prev_boundary(text, 0),
    };
    match boundary {
        Ok(Some(next)) => next,
        _ => match dir {
            Direction::Forward => text[column..].chars().next().map_or(column, |c| column + c.len_utf8()),
            Direction::Backward => text[..column].chars().next_back().map_or(column, |c| column - c.len_utf8()),
        },
    }
}
