//! The document: one or more linked views over the same text, each with its
//! own line tree, markers, selection and (possibly shared) history.

mod atomic;
mod edit;
mod linked;
mod marks;
mod select;
mod undo;
mod view_mut;

pub use select::SelectionOptions;
pub use view_mut::ViewMut;

use crate::config::DocumentOptions;
use crate::error::EditError;
use crate::events::{
    ChangeEvent, ListenerId, ListenerResult, Listeners, MarkerClearedEvent, SelectionEvent,
};
use crate::history::History;
use crate::line::{Line, LineView, RenderToken, split_lines};
use crate::marker::MarkerTable;
use crate::operation::{OperationGuard, Scheduler, ViewIntents};
use crate::position::Position;
use crate::selection::Selection;
use line_tree::{LineId, LineTree};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::ops::ControlFlow;
use std::str::FromStr;
use tracing::debug;

/// Identifies one linked view of a document. View 0 is the one the document
/// was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewId(pub(crate) usize);

impl ViewId {
    pub const PRIMARY: ViewId = ViewId(0);
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) type HistoryId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Link {
    pub view: ViewId,
    pub shared_history: bool,
}

#[derive(Debug)]
pub(crate) struct View {
    pub lines: LineTree<Line>,
    pub markers: MarkerTable,
    pub selection: Selection,
    pub history: HistoryId,
    pub links: Vec<Link>,
    pub cant_edit: bool,
    pub extending: bool,
    pub clean_generation: u64,
}

impl View {
    fn new(text: &[String], line_height: f64, history: HistoryId, clean_generation: u64) -> Self {
        let mut lines = LineTree::with_default_height(line_height);
        // an empty tree accepts any insertion at 0
        let _ = lines.insert(0, text.iter().map(|line| Line::new(line.clone())));
        View {
            lines,
            markers: MarkerTable::default(),
            selection: Selection::cursor(Position::default()),
            history,
            links: Vec::new(),
            cant_edit: false,
            extending: false,
            clean_generation,
        }
    }
}

/// A text document with selections, markers, undo history and change
/// notifications.
///
/// Every mutator runs inside an operation. Listeners fire once, after the
/// outermost operation closes, and observe the final state.
#[derive(Debug)]
pub struct Document {
    views: Vec<View>,
    histories: Vec<History>,
    options: DocumentOptions,
    scheduler: Scheduler,
    listeners: Listeners,
    next_marker: u64,
}

impl Document {
    pub fn new(text: &str) -> Self {
        Self::with_options(text, DocumentOptions::default())
    }

    pub fn with_options(text: &str, options: DocumentOptions) -> Self {
        Self::from_lines(split_lines(text), options)
    }

    pub(crate) fn from_lines(lines: Vec<String>, options: DocumentOptions) -> Self {
        let lines = if lines.is_empty() { vec![String::new()] } else { lines };
        let history = History::new(options.undo_depth, options.history_event_delay(), 1);
        let view = View::new(&lines, options.line_height, 0, history.generation);
        Document {
            views: vec![view],
            histories: vec![history],
            options,
            scheduler: Scheduler::default(),
            listeners: Listeners::default(),
            next_marker: 0,
        }
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }

    pub(crate) fn view(&self, view: ViewId) -> &View {
        &self.views[view.0]
    }

    pub(crate) fn view_state_mut(&mut self, view: ViewId) -> &mut View {
        &mut self.views[view.0]
    }

    pub(crate) fn history_of(&self, view: ViewId) -> &History {
        &self.histories[self.view(view).history]
    }

    pub(crate) fn history_of_mut(&mut self, view: ViewId) -> &mut History {
        let id = self.view(view).history;
        &mut self.histories[id]
    }

    pub(crate) fn check_view(&self, view: ViewId) -> Result<(), EditError> {
        if view.0 < self.views.len() {
            Ok(())
        } else {
            Err(EditError::UnknownView(view))
        }
    }

    /// Editing and query surface bound to one view.
    pub fn view_mut(&mut self, view: ViewId) -> Result<ViewMut<'_>, EditError> {
        self.check_view(view)?;
        Ok(ViewMut::new(self, view))
    }

    pub fn is_cant_edit(&self) -> bool {
        self.view(ViewId::PRIMARY).cant_edit
    }

    // ---- text queries ----

    pub fn line_count(&self) -> usize {
        self.line_count_in(ViewId::PRIMARY)
    }

    pub fn line_text(&self, index: usize) -> Result<&str, EditError> {
        self.line_text_in(ViewId::PRIMARY, index)
    }

    /// The whole text, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.text_in(ViewId::PRIMARY)
    }

    pub fn text_range(&self, from: Position, to: Position) -> Result<String, EditError> {
        self.text_range_in(ViewId::PRIMARY, from, to)
    }

    pub fn query_line(&self, index: usize) -> Result<LineView, EditError> {
        self.query_line_in(ViewId::PRIMARY, index)
    }

    /// Snapshots of lines `from_line..to_line`.
    pub fn query_range(&self, from_line: usize, to_line: usize) -> Result<Vec<LineView>, EditError> {
        self.query_range_in(ViewId::PRIMARY, from_line, to_line)
    }

    pub(crate) fn line_count_in(&self, view: ViewId) -> usize {
        self.view(view).lines.len()
    }

    pub(crate) fn line_text_in(&self, view: ViewId, index: usize) -> Result<&str, EditError> {
        self.view(view)
            .lines
            .get(index)
            .map(Line::text)
            .map_err(|_| EditError::OutOfRange {
                line: index,
                column: 0,
            })
    }

    pub(crate) fn text_in(&self, view: ViewId) -> String {
        let lines: Vec<&str> = self.view(view).lines.iter().map(|(_, line)| line.text()).collect();
        lines.join("\n")
    }

    pub(crate) fn text_range_in(&self, view: ViewId, from: Position, to: Position) -> Result<String, EditError> {
        self.check_pos(view, from)?;
        self.check_pos(view, to)?;
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Ok(self.get_between(view, from, to)?.join("\n"))
    }

    pub(crate) fn query_line_in(&self, view: ViewId, index: usize) -> Result<LineView, EditError> {
        let lines = &self.view(view).lines;
        let out_of_range = |_| EditError::OutOfRange {
            line: index,
            column: 0,
        };
        let id = lines.id_at(index).map_err(out_of_range)?;
        let line = lines.get(index).map_err(out_of_range)?;
        Ok(LineView {
            index,
            text: line.text.clone(),
            spans: line.spans.clone(),
            render_token: line.render_token,
            height: lines.line_height(id).unwrap_or_default(),
        })
    }

    pub(crate) fn query_range_in(
        &self,
        view: ViewId,
        from_line: usize,
        to_line: usize,
    ) -> Result<Vec<LineView>, EditError> {
        let lines = &self.view(view).lines;
        let mut out = Vec::with_capacity(to_line.saturating_sub(from_line));
        lines
            .iter_range(from_line, to_line, |index, id, line| {
                out.push(LineView {
                    index,
                    text: line.text.clone(),
                    spans: line.spans.clone(),
                    render_token: line.render_token,
                    height: lines.line_height(id).unwrap_or_default(),
                });
                ControlFlow::Continue(())
            })
            .map_err(|_| EditError::OutOfRange {
                line: from_line.max(to_line),
                column: 0,
            })?;
        Ok(out)
    }

    /// Text between two valid positions, one entry per line.
    pub(crate) fn get_between(&self, view: ViewId, from: Position, to: Position) -> Result<Vec<String>, EditError> {
        let mut out = Vec::with_capacity(to.line - from.line + 1);
        self.view(view).lines.iter_range(from.line, to.line + 1, |index, _, line| {
            let mut text = line.text.as_str();
            if index == to.line {
                text = &text[..floor_column(text, to.column)];
            }
            if index == from.line {
                text = &text[floor_column(text, from.column)..];
            }
            out.push(text.to_string());
            ControlFlow::Continue(())
        })?;
        Ok(out)
    }

    // ---- line handles and heights ----

    pub fn line_handle(&self, index: usize) -> Result<LineId, EditError> {
        self.line_handle_in(ViewId::PRIMARY, index)
    }

    /// Current index of the line behind `handle`, or `None` once it was removed.
    pub fn line_number_of(&self, handle: LineId) -> Option<usize> {
        self.view(ViewId::PRIMARY).lines.line_number_of(handle)
    }

    pub fn set_render_token(&mut self, index: usize, token: Option<RenderToken>) -> Result<(), EditError> {
        self.set_render_token_in(ViewId::PRIMARY, index, token)
    }

    pub fn set_line_height(&mut self, index: usize, height: f64) -> Result<(), EditError> {
        self.set_line_height_in(ViewId::PRIMARY, index, height)
    }

    pub fn line_at_height(&self, height: f64) -> usize {
        self.view(ViewId::PRIMARY).lines.line_at_height(height)
    }

    pub fn height_at_line(&self, index: usize) -> Result<f64, EditError> {
        self.height_at_line_in(ViewId::PRIMARY, index)
    }

    pub fn height(&self) -> f64 {
        self.view(ViewId::PRIMARY).lines.height()
    }

    pub(crate) fn line_handle_in(&self, view: ViewId, index: usize) -> Result<LineId, EditError> {
        self.view(view)
            .lines
            .id_at(index)
            .map_err(|_| EditError::OutOfRange {
                line: index,
                column: 0,
            })
    }

    pub(crate) fn set_render_token_in(
        &mut self,
        view: ViewId,
        index: usize,
        token: Option<RenderToken>,
    ) -> Result<(), EditError> {
        let line = self
            .view_state_mut(view)
            .lines
            .get_mut(index)
            .map_err(|_| EditError::OutOfRange {
                line: index,
                column: 0,
            })?;
        line.render_token = token;
        Ok(())
    }

    pub(crate) fn set_line_height_in(&mut self, view: ViewId, index: usize, height: f64) -> Result<(), EditError> {
        let id = self.line_handle_in(view, index)?;
        self.run(|doc| {
            if doc.view_state_mut(view).lines.set_line_height(id, height) {
                doc.record(view, |intents| intents.mark_dirty(index..index + 1));
            }
        });
        Ok(())
    }

    pub(crate) fn height_at_line_in(&self, view: ViewId, index: usize) -> Result<f64, EditError> {
        let id = self.line_handle_in(view, index)?;
        Ok(self.view(view).lines.height_at_line(id).unwrap_or_default())
    }

    // ---- positions ----

    /// Clamps `pos` into the document: past the last line means the end of
    /// the document, and columns snap back to a `char` boundary.
    pub fn clip_pos(&self, pos: Position) -> Position {
        self.clip_pos_in(ViewId::PRIMARY, pos)
    }

    /// Position of the `index`-th byte of the text, counting line breaks as one.
    pub fn pos_from_index(&self, index: usize) -> Position {
        self.pos_from_index_in(ViewId::PRIMARY, index)
    }

    pub fn index_from_pos(&self, pos: Position) -> usize {
        self.index_from_pos_in(ViewId::PRIMARY, pos)
    }

    pub(crate) fn clip_pos_in(&self, view: ViewId, pos: Position) -> Position {
        let lines = &self.view(view).lines;
        let last = lines.len().saturating_sub(1);
        if pos.line > last {
            let len = lines.get(last).map_or(0, |line| line.text.len());
            return Position::new(last, len);
        }
        match lines.get(pos.line) {
            Ok(line) => Position::new(pos.line, floor_column(&line.text, pos.column)),
            Err(_) => Position::default(),
        }
    }

    pub(crate) fn check_pos(&self, view: ViewId, pos: Position) -> Result<(), EditError> {
        let valid = self
            .view(view)
            .lines
            .get(pos.line)
            .is_ok_and(|line| pos.column <= line.text.len() && line.text.is_char_boundary(pos.column));
        if valid {
            Ok(())
        } else {
            Err(EditError::OutOfRange {
                line: pos.line,
                column: pos.column,
            })
        }
    }

    pub(crate) fn pos_from_index_in(&self, view: ViewId, index: usize) -> Position {
        let mut remaining = index;
        let mut found = None;
        let _ = self.view(view).lines.iter_range(0, self.line_count_in(view), |number, _, line| {
            let len = line.text.len();
            if remaining <= len {
                found = Some(Position::new(number, floor_column(&line.text, remaining)));
                return ControlFlow::Break(());
            }
            remaining -= len + 1;
            ControlFlow::Continue(())
        });
        found.unwrap_or_else(|| self.clip_pos_in(view, Position::new(usize::MAX, 0)))
    }

    pub(crate) fn index_from_pos_in(&self, view: ViewId, pos: Position) -> usize {
        let pos = self.clip_pos_in(view, pos);
        let mut index = pos.column;
        let _ = self.view(view).lines.iter_range(0, pos.line, |_, _, line| {
            index += line.text.len() + 1;
            ControlFlow::Continue(())
        });
        index
    }

    // ---- operations ----

    /// Opens an operation that stays open until the guard drops.
    pub fn operation(&mut self) -> OperationGuard<'_> {
        OperationGuard::new(self)
    }

    /// Runs `f` inside one operation.
    pub fn run<R>(&mut self, f: impl FnOnce(&mut Document) -> R) -> R {
        let mut guard = self.operation();
        f(&mut guard)
    }

    /// Schedules `f` to run after the current operation's listeners.
    pub fn defer(&mut self, f: impl FnOnce(&mut Document) + 'static) {
        self.run(|doc| {
            if let Some(op) = doc.scheduler.current_mut() {
                op.deferred.push(Box::new(f));
            }
        });
    }

    pub(crate) fn start_operation(&mut self) {
        self.scheduler.begin();
    }

    pub(crate) fn end_operation(&mut self) {
        if self.scheduler.depth() == 1 {
            self.recheck_flagged_selections();
        }
        if self.scheduler.end() && !self.scheduler.is_committing() {
            self.commit_pending();
        }
    }

    fn recheck_flagged_selections(&mut self) {
        loop {
            let views = match self.scheduler.current_mut() {
                Some(op) => op.take_rechecks(),
                None => return,
            };
            if views.is_empty() {
                return;
            }
            for view in views {
                self.recheck_selection(view);
            }
        }
    }

    // Operations closed by deferred callbacks queue up behind the one being
    // committed and are announced by this same loop.
    fn commit_pending(&mut self) {
        self.scheduler.set_committing(true);
        while let Some(op) = self.scheduler.next_pending() {
            debug!(op = ?op.id, views = op.views.len(), cleared = op.cleared.len(), "committing operation");
            let mut listeners = std::mem::take(&mut self.listeners);
            for (view, intents) in &op.views {
                if intents.changes.is_empty() && intents.dirty.is_none() {
                    continue;
                }
                let event = ChangeEvent {
                    view: *view,
                    changes: intents.changes.clone(),
                    dirty: intents.dirty.clone(),
                };
                listeners.emit_change(self, &event);
            }
            for (view, intents) in &op.views {
                if !intents.selection_changed {
                    continue;
                }
                let event = SelectionEvent {
                    view: *view,
                    selection: self.view(*view).selection.clone(),
                };
                listeners.emit_selection(self, &event);
            }
            for event in &op.cleared {
                listeners.emit_marker_cleared(self, event);
            }
            self.listeners = listeners;
            for callback in op.deferred {
                callback(self);
            }
        }
        self.scheduler.set_committing(false);
    }

    /// Records what the open operation did to `view`. Outside an operation
    /// there is nobody to tell, so nothing is recorded.
    pub(crate) fn record(&mut self, view: ViewId, f: impl FnOnce(&mut ViewIntents)) {
        if let Some(op) = self.scheduler.current_mut() {
            f(op.view(view));
        }
    }

    pub(crate) fn record_cleared(&mut self, event: MarkerClearedEvent) {
        if let Some(op) = self.scheduler.current_mut() {
            op.cleared.push(event);
        }
    }

    // ---- listeners ----

    pub fn on_change<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&Document, &ChangeEvent) -> ListenerResult + 'static,
    {
        self.listeners.on_change(Box::new(f))
    }

    pub fn on_selection_change<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&Document, &SelectionEvent) -> ListenerResult + 'static,
    {
        self.listeners.on_selection_change(Box::new(f))
    }

    pub fn on_marker_cleared<F>(&mut self, f: F) -> ListenerId
    where
        F: FnMut(&Document, &MarkerClearedEvent) -> ListenerResult + 'static,
    {
        self.listeners.on_marker_cleared(Box::new(f))
    }

    /// Removes a listener. Returns `false` when `id` was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        self.listeners.off(id)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new("")
    }
}

impl FromStr for Document {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// Largest `char` boundary of `text` at or before `column`.
pub(crate) fn floor_column(text: &str, column: usize) -> usize {
    let mut column = column.min(text.len());
    while !text.is_char_boundary(column) {
        column -= 1;
    }
    column
}
