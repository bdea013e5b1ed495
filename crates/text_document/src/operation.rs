//! Batching of document mutations into operations.
//!
//! Mutators record what they touched on the open [`Operation`]. Listeners only
//! hear about it once the outermost operation closes.

use crate::change::Change;
use crate::document::{Document, ViewId};
use crate::events::MarkerClearedEvent;
use std::collections::{BTreeMap, VecDeque};
use std::ops::{Deref, DerefMut, Range};

/// Monotonically increasing identifier of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpId(pub(crate) u64);

pub(crate) type Deferred = Box<dyn FnOnce(&mut Document)>;

/// What an operation did to one view.
#[derive(Debug, Default)]
pub(crate) struct ViewIntents {
    pub changes: Vec<Change>,
    pub dirty: Option<Range<usize>>,
    pub selection_changed: bool,
    pub recheck_selection: bool,
}

impl ViewIntents {
    /// Widens the dirty range to cover `lines`.
    pub fn mark_dirty(&mut self, lines: Range<usize>) {
        self.dirty = Some(match self.dirty.take() {
            Some(dirty) => dirty.start.min(lines.start)..dirty.end.max(lines.end),
            None => lines,
        });
    }

    /// Moves the dirty range through `change`, then widens it over the lines
    /// the change wrote.
    pub fn mark_changed(&mut self, change: &Change) {
        let (first, last) = (change.from.line, change.to.line);
        let written_end = first + change.text.len();
        if let Some(dirty) = self.dirty.take() {
            let map = |bound: usize| {
                if bound > last {
                    bound.saturating_add_signed(change.line_diff())
                } else {
                    bound.min(written_end)
                }
            };
            self.dirty = Some(map(dirty.start)..map(dirty.end));
        }
        self.mark_dirty(first..written_end);
    }
}

pub(crate) struct Operation {
    pub id: OpId,
    pub views: BTreeMap<ViewId, ViewIntents>,
    pub cleared: Vec<MarkerClearedEvent>,
    pub deferred: Vec<Deferred>,
}

impl Operation {
    fn new(id: OpId) -> Self {
        Operation {
            id,
            views: BTreeMap::new(),
            cleared: Vec::new(),
            deferred: Vec::new(),
        }
    }

    pub fn view(&mut self, view: ViewId) -> &mut ViewIntents {
        self.views.entry(view).or_default()
    }

    /// Takes the views whose selections still need checking against atomic markers.
    pub fn take_rechecks(&mut self) -> Vec<ViewId> {
        self.views
            .iter_mut()
            .filter(|(_, intents)| intents.recheck_selection)
            .map(|(view, intents)| {
                intents.recheck_selection = false;
                *view
            })
            .collect()
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("views", &self.views)
            .field("cleared", &self.cleared)
            .field("deferred", &self.deferred.len())
            .finish()
    }
}

/// Tracks operation nesting and the queue of closed operations still to be
/// announced.
#[derive(Debug, Default)]
pub(crate) struct Scheduler {
    depth: usize,
    next_id: u64,
    current: Option<Operation>,
    pending: VecDeque<Operation>,
    committing: bool,
}

impl Scheduler {
    /// Opens an operation, or joins the one already open.
    pub fn begin(&mut self) -> OpId {
        self.depth += 1;
        match &self.current {
            Some(op) => op.id,
            None => {
                self.next_id += 1;
                let id = OpId(self.next_id);
                self.current = Some(Operation::new(id));
                id
            }
        }
    }

    /// Closes one nesting level. Returns `true` when this closed the
    /// outermost level and the operation was queued for commit.
    pub fn end(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return false;
        }
        match self.current.take() {
            Some(op) => {
                self.pending.push_back(op);
                true
            }
            None => false,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn current_id(&self) -> Option<OpId> {
        self.current.as_ref().map(|op| op.id)
    }

    pub fn current_mut(&mut self) -> Option<&mut Operation> {
        self.current.as_mut()
    }

    pub fn is_committing(&self) -> bool {
        self.committing
    }

    pub fn set_committing(&mut self, committing: bool) {
        self.committing = committing;
    }

    pub fn next_pending(&mut self) -> Option<Operation> {
        self.pending.pop_front()
    }
}

/// Keeps an operation open for as long as it lives.
///
/// Every mutation made through the guard joins the same operation, so
/// listeners see all of them in a single notification round once the guard
/// drops.
pub struct OperationGuard<'a> {
    doc: &'a mut Document,
}

impl<'a> OperationGuard<'a> {
    pub(crate) fn new(doc: &'a mut Document) -> Self {
        doc.start_operation();
        OperationGuard { doc }
    }
}

impl Deref for OperationGuard<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        self.doc
    }
}

impl DerefMut for OperationGuard<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        self.doc
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        self.doc.end_operation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::Position;

    fn change(from: (usize, usize), to: (usize, usize), text: &[&str]) -> Change {
        Change::new(
            Position::new(from.0, from.1),
            Position::new(to.0, to.1),
            text.iter().map(|line| line.to_string()).collect(),
            None,
        )
    }

    #[test]
    fn dirty_lines_follow_later_insertions_above_them() {
        let mut intents = ViewIntents::default();
        intents.mark_changed(&change((10, 0), (10, 0), &["X"]));
        assert_eq!(intents.dirty, Some(10..11));
        intents.mark_changed(&change((0, 0), (0, 0), &["", "", "", "", "", ""]));
        assert_eq!(intents.dirty, Some(0..16));
        assert!(intents.dirty.as_ref().is_some_and(|dirty| dirty.contains(&15)));
    }

    #[test]
    fn dirty_lines_shrink_with_removals_above_them() {
        let mut intents = ViewIntents::default();
        intents.mark_changed(&change((12, 0), (12, 1), &["y"]));
        intents.mark_changed(&change((2, 0), (5, 0), &[""]));
        assert_eq!(intents.dirty, Some(2..10));
    }

    #[test]
    fn dirty_lines_inside_a_removed_block_collapse_onto_it() {
        let mut intents = ViewIntents::default();
        intents.mark_dirty(4..6);
        intents.mark_changed(&change((3, 0), (8, 0), &["z"]));
        assert_eq!(intents.dirty, Some(3..4));
    }

    #[test]
    fn nested_begins_share_one_operation() {
        let mut scheduler = Scheduler::default();
        let outer = scheduler.begin();
        let inner = scheduler.begin();
        assert_eq!(outer, inner);
        assert!(!scheduler.end());
        assert_eq!(scheduler.current_id(), Some(outer));
        assert!(scheduler.end());
        assert_eq!(scheduler.depth(), 0);
        assert_eq!(scheduler.next_pending().map(|op| op.id), Some(outer));
        assert!(scheduler.next_pending().is_none());
    }

    #[test]
    fn operation_ids_increase() {
        let mut scheduler = Scheduler::default();
        let first = scheduler.begin();
        scheduler.end();
        let second = scheduler.begin();
        scheduler.end();
        assert!(second > first);
    }

    #[test]
    fn unbalanced_end_is_ignored() {
        let mut scheduler = Scheduler::default();
        assert!(!scheduler.end());
        assert_eq!(scheduler.depth(), 0);
    }

    #[test]
    fn dirty_ranges_widen() {
        let mut intents = ViewIntents::default();
        intents.mark_dirty(4..6);
        intents.mark_dirty(1..2);
        assert_eq!(intents.dirty, Some(1..6));
    }

    #[test]
    fn rechecks_are_taken_once() {
        let mut op = Operation::new(OpId(1));
        op.view(ViewId::PRIMARY).recheck_selection = true;
        op.view(ViewId(3));
        assert_eq!(op.take_rechecks(), vec![ViewId::PRIMARY]);
        assert!(op.take_rechecks().is_empty());
    }
}
