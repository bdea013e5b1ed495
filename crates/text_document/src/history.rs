use crate::change::Change;
use crate::document::ViewId;
use crate::marker::MarkedSpan;
use crate::operation::OpId;
use crate::position::Position;
use crate::selection::Selection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Spans of the lines a change replaced, per view, indexed by line offset.
pub(crate) type StoredSpans = BTreeMap<ViewId, Vec<Vec<MarkedSpan>>>;

/// Inverse of one applied change: putting `text` back over `from..to`
/// undoes it.
#[derive(Debug, Clone)]
pub(crate) struct HistoryChange {
    pub from: Position,
    pub to: Position,
    pub text: Vec<String>,
    pub spans: StoredSpans,
}

#[derive(Debug, Clone)]
pub(crate) struct ChangeGroup {
    pub changes: Vec<HistoryChange>,
    pub generation: u64,
}

impl ChangeGroup {
    // shifts changes below the edited lines; false when the group overlaps them
    fn rebase(&mut self, from: usize, to: usize, diff: isize) -> bool {
        for change in &mut self.changes {
            if to < change.from.line {
                change.from.line = shift_line(change.from.line, diff);
                change.to.line = shift_line(change.to.line, diff);
            } else if from <= change.to.line {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
pub(crate) enum HistoryEntry {
    Changes(ChangeGroup),
    Selection(Selection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HistoryDirection {
    Undo,
    Redo,
}

impl HistoryDirection {
    pub fn origin(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

/// What [`History::pop_event`] took off a stack.
#[derive(Debug)]
pub(crate) enum PoppedEvent {
    /// Selection-only step.
    Selection(Selection),
    /// A change group, plus the selection stored right below it, if any.
    Changes {
        group: ChangeGroup,
        restore: Option<Selection>,
    },
}

/// Counts of undoable and redoable change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HistorySize {
    pub undo: usize,
    pub redo: usize,
}

/// Undo and redo stacks of alternating change groups and selections.
#[derive(Debug, Clone)]
pub(crate) struct History {
    pub done: Vec<HistoryEntry>,
    pub undone: Vec<HistoryEntry>,
    undo_depth: usize,
    event_delay: Duration,
    last_mod_time: Option<Instant>,
    last_sel_time: Option<Instant>,
    last_op: Option<OpId>,
    last_sel_op: Option<OpId>,
    last_origin: Option<String>,
    last_sel_origin: Option<String>,
    pub generation: u64,
    max_generation: u64,
}

impl History {
    pub fn new(undo_depth: usize, event_delay: Duration, start_generation: u64) -> Self {
        History {
            done: Vec::new(),
            undone: Vec::new(),
            undo_depth,
            event_delay,
            last_mod_time: None,
            last_sel_time: None,
            last_op: None,
            last_sel_op: None,
            last_origin: None,
            last_sel_origin: None,
            generation: start_generation,
            max_generation: start_generation,
        }
    }

    /// Empty history continuing this one's generation count.
    pub fn cleared(&self) -> Self {
        Self::new(self.undo_depth, self.event_delay, self.max_generation)
    }

    pub fn size(&self) -> HistorySize {
        HistorySize {
            undo: count_groups(&self.done),
            redo: count_groups(&self.undone),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty() && self.undone.is_empty()
    }

    /// Drops coalescing state so the next edit opens a new event.
    pub fn split_events(&mut self) {
        self.last_op = None;
        self.last_sel_op = None;
        self.last_origin = None;
        self.last_sel_origin = None;
    }

    fn within_delay(&self, since: Option<Instant>, now: Instant) -> bool {
        since.is_some_and(|since| now.duration_since(since) < self.event_delay)
    }

    // Leaves the change group the next edit may merge into on top of `done`.
    // When `force` is set trailing selections are discarded first.
    fn prepare_last_group(&mut self, force: bool) -> bool {
        if force {
            clear_selection_events(&mut self.done);
            return matches!(self.done.last(), Some(HistoryEntry::Changes(_)));
        }
        let len = self.done.len();
        match self.done.last() {
            Some(HistoryEntry::Changes(_)) => true,
            Some(HistoryEntry::Selection(_))
                if len > 1 && matches!(self.done[len - 2], HistoryEntry::Changes(_)) =>
            {
                self.done.pop();
                true
            }
            _ => false,
        }
    }

    /// Records `change` (already turned into its inverse `record`) and the
    /// selection that follows it.
    pub fn add_change(
        &mut self,
        change: &Change,
        before: &Selection,
        after: Selection,
        op: Option<OpId>,
        record: HistoryChange,
    ) {
        self.undone.clear();
        let now = Instant::now();
        let same_op = op.is_some() && self.last_op == op;
        let origin_merges = match change.origin.as_deref() {
            Some(origin) if self.last_origin.as_deref() == Some(origin) => {
                origin.starts_with('*')
                    || (origin.starts_with('+') && self.within_delay(self.last_mod_time, now))
            }
            _ => false,
        };

        let merged = (same_op || origin_merges) && self.prepare_last_group(same_op);
        if merged {
            if let Some(HistoryEntry::Changes(group)) = self.done.last_mut() {
                match group.changes.last_mut() {
                    // typing at the end of the previous insertion just extends it
                    Some(last) if change.from == change.to && change.from == last.to => {
                        last.to = change.end();
                    }
                    _ => group.changes.push(record),
                }
            }
            debug!(origin = ?change.origin, "coalesced change into previous history event");
        } else {
            if !matches!(self.done.last(), Some(HistoryEntry::Selection(_))) {
                push_selection(&mut self.done, before.clone());
            }
            self.done.push(HistoryEntry::Changes(ChangeGroup {
                changes: vec![record],
                generation: self.generation,
            }));
            self.trim();
        }

        self.done.push(HistoryEntry::Selection(after));
        self.max_generation += 1;
        self.generation = self.max_generation;
        self.last_mod_time = Some(now);
        self.last_sel_time = Some(now);
        self.last_op = op;
        self.last_sel_op = op;
        self.last_origin = change.origin.clone();
        self.last_sel_origin = change.origin.clone();
    }

    fn trim(&mut self) {
        let mut dropped = 0;
        while count_groups(&self.done) > self.undo_depth {
            match self
                .done
                .iter()
                .position(|entry| matches!(entry, HistoryEntry::Changes(_)))
            {
                Some(oldest) => {
                    self.done.drain(..=oldest);
                    dropped += 1;
                }
                None => break,
            }
        }
        if dropped > 0 {
            debug!(dropped, depth = self.undo_depth, "trimmed undo history");
        }
    }

    /// Records a selection change, replacing the top selection when it
    /// belongs to the same operation or a mergeable run of the same origin.
    pub fn add_selection(&mut self, selection: Selection, op: Option<OpId>, origin: Option<&str>, clear_redo: bool) {
        let now = Instant::now();
        let same_op = op.is_some() && self.last_sel_op == op;
        let merge = same_op
            || match origin {
                Some(origin) if self.last_sel_origin.as_deref() == Some(origin) => {
                    (self.last_mod_time == self.last_sel_time
                        && self.last_origin.as_deref() == Some(origin))
                        || self.selection_can_merge(origin, &selection, now)
                }
                _ => false,
            };

        let replace_top = merge && matches!(self.done.last(), Some(HistoryEntry::Selection(_)));
        if replace_top {
            if let Some(top) = self.done.last_mut() {
                *top = HistoryEntry::Selection(selection);
            }
        } else {
            push_selection(&mut self.done, selection);
        }

        self.last_sel_time = Some(now);
        self.last_sel_origin = origin.map(str::to_owned);
        self.last_sel_op = op;
        if clear_redo {
            clear_selection_events(&mut self.undone);
        }
    }

    fn selection_can_merge(&self, origin: &str, selection: &Selection, now: Instant) -> bool {
        let Some(HistoryEntry::Selection(previous)) = self.done.last() else {
            return false;
        };
        origin.starts_with('*')
            || (origin.starts_with('+')
                && previous.len() == selection.len()
                && previous.something_selected() == selection.something_selected()
                && self.within_delay(self.last_sel_time, now))
    }

    /// Takes the next undo or redo event off its stack.
    ///
    /// Returns `None` without touching either stack when there is nothing
    /// usable. Selections passed over on the way are moved to the opposite
    /// stack.
    pub fn pop_event(
        &mut self,
        direction: HistoryDirection,
        current: &Selection,
        selection_only: bool,
    ) -> Option<PoppedEvent> {
        let source = match direction {
            HistoryDirection::Undo => &self.done,
            HistoryDirection::Redo => &self.undone,
        };
        let usable = source.iter().any(|entry| match entry {
            HistoryEntry::Selection(selection) => selection_only && selection != current,
            HistoryEntry::Changes(_) => !selection_only,
        });
        if !usable {
            return None;
        }
        self.last_origin = None;
        self.last_sel_origin = None;

        let (source, dest) = match direction {
            HistoryDirection::Undo => (&mut self.done, &mut self.undone),
            HistoryDirection::Redo => (&mut self.undone, &mut self.done),
        };
        let mut selection_after = current.clone();
        loop {
            match source.pop()? {
                HistoryEntry::Selection(selection) => {
                    push_selection(dest, selection.clone());
                    if selection_only && selection != *current {
                        return Some(PoppedEvent::Selection(selection));
                    }
                    selection_after = selection;
                }
                HistoryEntry::Changes(group) => {
                    push_selection(dest, selection_after);
                    let restore = match source.last() {
                        Some(HistoryEntry::Selection(selection)) => Some(selection.clone()),
                        _ => None,
                    };
                    return Some(PoppedEvent::Changes { group, restore });
                }
            }
        }
    }

    /// Pushes the inverse of an undone or redone group onto the opposite stack.
    pub fn push_inverse(&mut self, direction: HistoryDirection, group: ChangeGroup) {
        match direction {
            HistoryDirection::Undo => self.undone.push(HistoryEntry::Changes(group)),
            HistoryDirection::Redo => self.done.push(HistoryEntry::Changes(group)),
        }
    }

    /// Adjusts stored events for a change made through a view with a
    /// separate history.
    ///
    /// Events entirely below the changed lines shift by the line delta.
    /// Selections inside them collapse to the start of the change. A change
    /// group overlapping the changed lines can no longer be replayed; it is
    /// dropped together with everything older.
    pub fn rebase(&mut self, change: &Change) {
        let from = change.from.line;
        let to = change.to.line;
        let diff = change.line_diff();
        rebase_entries(&mut self.done, from, to, diff);
        rebase_entries(&mut self.undone, from, to, diff);
    }

    /// Splits off a copy of this history for the views in `views`, moving
    /// their stored spans into it.
    pub fn split_for(&mut self, views: &BTreeSet<ViewId>) -> History {
        let mut copy = History::new(self.undo_depth, self.event_delay, self.generation);
        copy.max_generation = self.max_generation;
        copy.done = split_entries(&mut self.done, views);
        copy.undone = split_entries(&mut self.undone, views);
        copy
    }
}

fn count_groups(entries: &[HistoryEntry]) -> usize {
    entries
        .iter()
        .filter(|entry| matches!(entry, HistoryEntry::Changes(_)))
        .count()
}

fn clear_selection_events(entries: &mut Vec<HistoryEntry>) {
    while matches!(entries.last(), Some(HistoryEntry::Selection(_))) {
        entries.pop();
    }
}

fn push_selection(dest: &mut Vec<HistoryEntry>, selection: Selection) {
    if let Some(HistoryEntry::Selection(top)) = dest.last() {
        if *top == selection {
            return;
        }
    }
    dest.push(HistoryEntry::Selection(selection));
}

fn shift_line(line: usize, diff: isize) -> usize {
    line.checked_add_signed(diff).unwrap_or(0)
}

fn rebase_entries(entries: &mut Vec<HistoryEntry>, from: usize, to: usize, diff: isize) {
    let mut i = 0;
    while i < entries.len() {
        let intact = match &mut entries[i] {
            HistoryEntry::Selection(selection) => {
                selection.map_positions(|pos| {
                    if to < pos.line {
                        pos.line = shift_line(pos.line, diff);
                    } else if from < pos.line {
                        *pos = Position::new(from, 0);
                    }
                });
                true
            }
            HistoryEntry::Changes(group) => group.rebase(from, to, diff),
        };
        if intact {
            i += 1;
        } else {
            debug!(dropped = i + 1, "history invalidated by an edit through a linked view");
            entries.drain(..=i);
            i = 0;
        }
    }
}

fn split_entries(entries: &mut [HistoryEntry], views: &BTreeSet<ViewId>) -> Vec<HistoryEntry> {
    entries
        .iter_mut()
        .map(|entry| match entry {
            HistoryEntry::Selection(selection) => HistoryEntry::Selection(selection.clone()),
            HistoryEntry::Changes(group) => HistoryEntry::Changes(ChangeGroup {
                generation: group.generation,
                changes: group
                    .changes
                    .iter_mut()
                    .map(|change| {
                        let moved: Vec<ViewId> = change
                            .spans
                            .keys()
                            .filter(|view| views.contains(view))
                            .copied()
                            .collect();
                        let mut spans = StoredSpans::new();
                        for view in moved {
                            if let Some(stored) = change.spans.remove(&view) {
                                spans.insert(view, stored);
                            }
                        }
                        HistoryChange {
                            from: change.from,
                            to: change.to,
                            text: change.text.clone(),
                            spans,
                        }
                    })
                    .collect(),
            }),
        })
        .collect()
}
