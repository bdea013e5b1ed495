use super::{Document, ViewId};
use crate::change::{AppliedChange, Change};
use crate::error::EditError;
use crate::line::split_lines;
use crate::position::{Position, Range};
use crate::selection::{Direction, Selection, extend_range};
use serde::{Deserialize, Serialize};

/// How a selection update is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionOptions {
    /// Origin used for history coalescing, e.g. `"+move"` or `"*mouse"`.
    pub origin: Option<String>,
    /// Direction to push cursors out of atomic ranges. Defaults to the
    /// direction the primary head moved in.
    pub bias: Option<Direction>,
    /// Drop selection entries from the redo stack.
    pub clear_redo: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        SelectionOptions {
            origin: None,
            bias: None,
            clear_redo: true,
        }
    }
}

impl SelectionOptions {
    pub fn with_origin(origin: &str) -> Self {
        SelectionOptions {
            origin: Some(origin.to_string()),
            ..Self::default()
        }
    }
}

impl Document {
    pub fn selection(&self) -> &Selection {
        &self.view(ViewId::PRIMARY).selection
    }

    pub fn set_selection(&mut self, selection: Selection, options: SelectionOptions) -> Result<(), EditError> {
        self.set_selection_in(ViewId::PRIMARY, selection, options)
    }

    /// Replaces the selection with `ranges`, clipped into the document.
    pub fn set_selections(
        &mut self,
        ranges: Vec<Range>,
        primary: usize,
        options: SelectionOptions,
    ) -> Result<(), EditError> {
        self.set_selections_in(ViewId::PRIMARY, ranges, primary, options)
    }

    pub fn set_cursor(&mut self, pos: Position, options: SelectionOptions) {
        self.set_cursor_in(ViewId::PRIMARY, pos, options)
    }

    /// Moves the primary head to `head`, keeping the anchor while extending.
    /// Other ranges are dropped.
    pub fn extend_selection(&mut self, head: Position, other: Option<Position>, options: SelectionOptions) {
        self.extend_selection_in(ViewId::PRIMARY, head, other, options)
    }

    /// Moves every head at once; `heads[i]` belongs to range `i`.
    pub fn extend_selections(&mut self, heads: &[Position], options: SelectionOptions) -> Result<(), EditError> {
        self.extend_selections_in(ViewId::PRIMARY, heads, options)
    }

    /// Adds a range and makes it the primary one.
    pub fn add_selection(&mut self, anchor: Position, head: Option<Position>) -> Result<(), EditError> {
        self.add_selection_in(ViewId::PRIMARY, anchor, head)
    }

    pub fn set_extending(&mut self, extending: bool) {
        self.view_state_mut(ViewId::PRIMARY).extending = extending;
    }

    pub fn is_extending(&self) -> bool {
        self.view(ViewId::PRIMARY).extending
    }

    /// Selected text of every range, joined with `\n`.
    pub fn selected_text(&self) -> String {
        self.selected_text_in(ViewId::PRIMARY)
    }

    /// Replaces every selected range with `text`. Cursors end up after the
    /// inserted text. `origin` defaults to `"+input"`.
    pub fn replace_selection(&mut self, text: &str, origin: Option<&str>) -> Result<AppliedChange, EditError> {
        self.replace_selection_in(ViewId::PRIMARY, text, origin)
    }

    pub(crate) fn set_selection_in(
        &mut self,
        view: ViewId,
        selection: Selection,
        options: SelectionOptions,
    ) -> Result<(), EditError> {
        let ranges = selection
            .ranges()
            .iter()
            .map(|range| self.clip_range(view, *range))
            .collect();
        let selection = Selection::normalize(ranges, selection.primary_index(), self.options.selections_may_touch)?;
        self.run(|doc| {
            doc.set_selection_no_undo(view, selection, options.bias, true)?;
            let current = doc.view(view).selection.clone();
            let op = doc.scheduler.current_id();
            doc.history_of_mut(view)
                .add_selection(current, op, options.origin.as_deref(), options.clear_redo);
            Ok(())
        })
    }

    pub(crate) fn set_selections_in(
        &mut self,
        view: ViewId,
        ranges: Vec<Range>,
        primary: usize,
        options: SelectionOptions,
    ) -> Result<(), EditError> {
        let selection = Selection::normalize(ranges, primary, self.options.selections_may_touch)?;
        self.set_selection_in(view, selection, options)
    }

    pub(crate) fn set_cursor_in(&mut self, view: ViewId, pos: Position, options: SelectionOptions) {
        let pos = self.clip_pos_in(view, pos);
        // a single clipped cursor always normalizes
        let _ = self.set_selection_in(view, Selection::cursor(pos), options);
    }

    pub(crate) fn extend_selection_in(
        &mut self,
        view: ViewId,
        head: Position,
        other: Option<Position>,
        options: SelectionOptions,
    ) {
        let head = self.clip_pos_in(view, head);
        let other = other.map(|other| self.clip_pos_in(view, other));
        let state = self.view(view);
        let range = extend_range(state.selection.primary(), head, other, state.extending);
        let _ = self.set_selection_in(view, Selection::single(range), options);
    }

    pub(crate) fn extend_selections_in(
        &mut self,
        view: ViewId,
        heads: &[Position],
        options: SelectionOptions,
    ) -> Result<(), EditError> {
        let state = self.view(view);
        let extending = state.extending;
        let ranges: Vec<Range> = state
            .selection
            .ranges()
            .iter()
            .enumerate()
            .map(|(i, range)| match heads.get(i) {
                Some(head) => extend_range(*range, self.clip_pos_in(view, *head), None, extending),
                None => *range,
            })
            .collect();
        let primary = state.selection.primary_index();
        self.set_selections_in(view, ranges, primary, options)
    }

    pub(crate) fn add_selection_in(
        &mut self,
        view: ViewId,
        anchor: Position,
        head: Option<Position>,
    ) -> Result<(), EditError> {
        let anchor = self.clip_pos_in(view, anchor);
        let head = head.map_or(anchor, |head| self.clip_pos_in(view, head));
        let mut ranges = self.view(view).selection.ranges().to_vec();
        ranges.push(Range::new(anchor, head));
        let primary = ranges.len() - 1;
        self.set_selections_in(view, ranges, primary, SelectionOptions::default())
    }

    pub(crate) fn selected_text_in(&self, view: ViewId) -> String {
        let parts: Vec<String> = self
            .view(view)
            .selection
            .ranges()
            .iter()
            .map(|range| {
                self.get_between(view, range.from(), range.to())
                    .map(|lines| lines.join("\n"))
                    .unwrap_or_default()
            })
            .collect();
        parts.join("\n")
    }

    pub(crate) fn replace_selection_in(
        &mut self,
        view: ViewId,
        text: &str,
        origin: Option<&str>,
    ) -> Result<AppliedChange, EditError> {
        if self.view(view).cant_edit {
            return Err(EditError::CantEdit);
        }
        let ranges = self.view(view).selection.ranges().to_vec();
        let lines = split_lines(text);
        let origin = origin.unwrap_or("+input").to_string();
        self.run(|doc| {
            let mut applied = AppliedChange::default();
            // last range first so earlier ranges keep their positions
            for range in ranges.iter().rev() {
                let change = Change::new(range.from(), range.to(), lines.clone(), Some(origin.clone()));
                applied.changes.extend(doc.make_change(view, change, false)?.changes);
            }
            Ok(applied)
        })
    }

    /// Sets the selection without recording it in history, pushing cursors
    /// out of atomic ranges on the way. `moved` marks a cursor placement as
    /// opposed to a selection mapped through an edit.
    pub(crate) fn set_selection_no_undo(
        &mut self,
        view: ViewId,
        selection: Selection,
        bias: Option<Direction>,
        moved: bool,
    ) -> Result<(), EditError> {
        let current_head = self.view(view).selection.primary().head;
        let bias = bias.unwrap_or(if selection.primary().head < current_head {
            Direction::Backward
        } else {
            Direction::Forward
        });
        let selection = self.skip_atomic_in_selection(view, selection, bias, true, moved)?;
        self.set_selection_inner(view, selection);
        Ok(())
    }

    /// Re-validates the current selection against atomic markers.
    pub(crate) fn recheck_selection(&mut self, view: ViewId) {
        let selection = self.view(view).selection.clone();
        if let Ok(selection) = self.skip_atomic_in_selection(view, selection, Direction::Forward, false, false) {
            self.set_selection_inner(view, selection);
        }
    }

    fn set_selection_inner(&mut self, view: ViewId, selection: Selection) {
        if self.view(view).selection == selection {
            return;
        }
        self.view_state_mut(view).selection = selection;
        self.record(view, |intents| intents.selection_changed = true);
    }

    pub(crate) fn clip_range(&self, view: ViewId, range: Range) -> Range {
        Range::new(self.clip_pos_in(view, range.anchor), self.clip_pos_in(view, range.head))
    }
}
