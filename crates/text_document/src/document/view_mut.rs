use super::{Document, SelectionOptions, ViewId};
use crate::change::AppliedChange;
use crate::error::EditError;
use crate::history::{HistoryDirection, HistorySize};
use crate::line::{LineView, split_lines};
use crate::marker::{MarkerConfig, MarkerHandle};
use crate::position::{Position, Range};
use crate::selection::Selection;

/// A document borrowed through one of its linked views.
///
/// Mirrors the primary-view API of [`Document`] for any other view.
#[derive(Debug)]
pub struct ViewMut<'a> {
    doc: &'a mut Document,
    view: ViewId,
}

impl<'a> ViewMut<'a> {
    pub(crate) fn new(doc: &'a mut Document, view: ViewId) -> Self {
        ViewMut { doc, view }
    }

    pub fn id(&self) -> ViewId {
        self.view
    }

    pub fn document(&self) -> &Document {
        self.doc
    }

    pub fn line_count(&self) -> usize {
        self.doc.line_count_in(self.view)
    }

    pub fn line_text(&self, index: usize) -> Result<&str, EditError> {
        self.doc.line_text_in(self.view, index)
    }

    pub fn text(&self) -> String {
        self.doc.text_in(self.view)
    }

    pub fn text_range(&self, from: Position, to: Position) -> Result<String, EditError> {
        self.doc.text_range_in(self.view, from, to)
    }

    pub fn query_line(&self, index: usize) -> Result<LineView, EditError> {
        self.doc.query_line_in(self.view, index)
    }

    pub fn query_range(&self, from_line: usize, to_line: usize) -> Result<Vec<LineView>, EditError> {
        self.doc.query_range_in(self.view, from_line, to_line)
    }

    pub fn clip_pos(&self, pos: Position) -> Position {
        self.doc.clip_pos_in(self.view, pos)
    }

    pub fn pos_from_index(&self, index: usize) -> Position {
        self.doc.pos_from_index_in(self.view, index)
    }

    pub fn index_from_pos(&self, pos: Position) -> usize {
        self.doc.index_from_pos_in(self.view, pos)
    }

    pub fn set_line_height(&mut self, index: usize, height: f64) -> Result<(), EditError> {
        self.doc.set_line_height_in(self.view, index, height)
    }

    pub fn height_at_line(&self, index: usize) -> Result<f64, EditError> {
        self.doc.height_at_line_in(self.view, index)
    }

    pub fn apply_change(
        &mut self,
        from: Position,
        to: Position,
        text: Vec<String>,
        origin: Option<&str>,
    ) -> Result<AppliedChange, EditError> {
        self.doc.apply_change_in(self.view, from, to, text, origin)
    }

    pub fn replace_range(
        &mut self,
        text: &str,
        from: Position,
        to: Position,
        origin: Option<&str>,
    ) -> Result<AppliedChange, EditError> {
        self.doc.apply_change_in(self.view, from, to, split_lines(text), origin)
    }

    pub fn set_text(&mut self, text: &str) -> Result<AppliedChange, EditError> {
        self.doc.set_text_in(self.view, text)
    }

    pub fn selection(&self) -> &Selection {
        &self.doc.view(self.view).selection
    }

    pub fn set_selection(&mut self, selection: Selection, options: SelectionOptions) -> Result<(), EditError> {
        self.doc.set_selection_in(self.view, selection, options)
    }

    pub fn set_selections(
        &mut self,
        ranges: Vec<Range>,
        primary: usize,
        options: SelectionOptions,
    ) -> Result<(), EditError> {
        self.doc.set_selections_in(self.view, ranges, primary, options)
    }

    pub fn set_cursor(&mut self, pos: Position, options: SelectionOptions) {
        self.doc.set_cursor_in(self.view, pos, options)
    }

    pub fn extend_selection(&mut self, head: Position, other: Option<Position>, options: SelectionOptions) {
        self.doc.extend_selection_in(self.view, head, other, options)
    }

    pub fn extend_selections(&mut self, heads: &[Position], options: SelectionOptions) -> Result<(), EditError> {
        self.doc.extend_selections_in(self.view, heads, options)
    }

    pub fn add_selection(&mut self, anchor: Position, head: Option<Position>) -> Result<(), EditError> {
        self.doc.add_selection_in(self.view, anchor, head)
    }

    pub fn set_extending(&mut self, extending: bool) {
        self.doc.view_state_mut(self.view).extending = extending;
    }

    pub fn selected_text(&self) -> String {
        self.doc.selected_text_in(self.view)
    }

    pub fn replace_selection(&mut self, text: &str, origin: Option<&str>) -> Result<AppliedChange, EditError> {
        self.doc.replace_selection_in(self.view, text, origin)
    }

    pub fn mark_range(&mut self, from: Position, to: Position, config: MarkerConfig) -> Result<MarkerHandle, EditError> {
        self.doc.mark_range_in(self.view, from, to, config)
    }

    pub fn set_bookmark(&mut self, pos: Position, insert_left: bool) -> Result<MarkerHandle, EditError> {
        self.doc.set_bookmark_in(self.view, pos, insert_left)
    }

    /// Handles carry their view, so this works for markers of any view.
    pub fn clear_marker(&mut self, handle: MarkerHandle) -> bool {
        self.doc.clear_marker(handle)
    }

    pub fn find_marker(&self, handle: MarkerHandle) -> Option<(Position, Position)> {
        self.doc.find_marker(handle)
    }

    pub fn find_marks(&self, from: Position, to: Position) -> Vec<MarkerHandle> {
        self.doc.find_marks_in(self.view, from, to)
    }

    pub fn find_marks_at(&self, pos: Position) -> Vec<MarkerHandle> {
        self.doc.find_marks_at_in(self.view, pos)
    }

    pub fn all_marks(&self) -> Vec<MarkerHandle> {
        self.doc.all_marks_in(self.view)
    }

    pub fn undo(&mut self) -> Result<bool, EditError> {
        self.doc.undo_in(self.view)
    }

    pub fn redo(&mut self) -> Result<bool, EditError> {
        self.doc.redo_in(self.view)
    }

    pub fn undo_selection(&mut self) -> Result<bool, EditError> {
        self.doc.make_change_from_history(self.view, HistoryDirection::Undo, true)
    }

    pub fn redo_selection(&mut self) -> Result<bool, EditError> {
        self.doc.make_change_from_history(self.view, HistoryDirection::Redo, true)
    }

    pub fn history_size(&self) -> HistorySize {
        self.doc.history_of(self.view).size()
    }

    pub fn clear_history(&mut self) {
        self.doc.clear_history_in(self.view)
    }

    pub fn change_generation(&mut self, force_split: bool) -> u64 {
        self.doc.change_generation_in(self.view, force_split)
    }

    pub fn mark_clean(&mut self) {
        self.doc.mark_clean_in(self.view)
    }

    pub fn is_clean(&self, generation: Option<u64>) -> bool {
        self.doc.is_clean_in(self.view, generation)
    }

    pub fn is_cant_edit(&self) -> bool {
        self.doc.view(self.view).cant_edit
    }
}
