use super::{Document, SelectionOptions, ViewId};
use crate::change::Change;
use crate::error::EditError;
use crate::history::{ChangeGroup, HistoryDirection, HistorySize, PoppedEvent};
use crate::selection::Selection;
use tracing::debug;

impl Document {
    /// Reverts the most recent change event. Returns `false` when there was
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool, EditError> {
        self.undo_in(ViewId::PRIMARY)
    }

    pub fn redo(&mut self) -> Result<bool, EditError> {
        self.redo_in(ViewId::PRIMARY)
    }

    /// Steps back to the previous selection, undoing a change once no
    /// earlier selection is left.
    pub fn undo_selection(&mut self) -> Result<bool, EditError> {
        self.make_change_from_history(ViewId::PRIMARY, HistoryDirection::Undo, true)
    }

    pub fn redo_selection(&mut self) -> Result<bool, EditError> {
        self.make_change_from_history(ViewId::PRIMARY, HistoryDirection::Redo, true)
    }

    pub fn history_size(&self) -> HistorySize {
        self.history_of(ViewId::PRIMARY).size()
    }

    /// Forgets all undo and redo events. Views sharing the history forget
    /// them too.
    pub fn clear_history(&mut self) {
        self.clear_history_in(ViewId::PRIMARY)
    }

    /// Current generation of the history. With `force_split` the next edit
    /// starts a new event instead of merging into the last one.
    pub fn change_generation(&mut self, force_split: bool) -> u64 {
        self.change_generation_in(ViewId::PRIMARY, force_split)
    }

    /// Remembers the current state as the clean one.
    pub fn mark_clean(&mut self) {
        self.mark_clean_in(ViewId::PRIMARY)
    }

    /// Whether the document is back at `generation`, or at the state last
    /// marked clean when `None`.
    pub fn is_clean(&self, generation: Option<u64>) -> bool {
        self.is_clean_in(ViewId::PRIMARY, generation)
    }

    pub(crate) fn undo_in(&mut self, view: ViewId) -> Result<bool, EditError> {
        self.make_change_from_history(view, HistoryDirection::Undo, false)
    }

    pub(crate) fn redo_in(&mut self, view: ViewId) -> Result<bool, EditError> {
        self.make_change_from_history(view, HistoryDirection::Redo, false)
    }

    pub(crate) fn clear_history_in(&mut self, view: ViewId) {
        let id = self.view(view).history;
        self.histories[id] = self.histories[id].cleared();
        debug!(%view, "cleared history");
    }

    pub(crate) fn change_generation_in(&mut self, view: ViewId, force_split: bool) -> u64 {
        let history = self.history_of_mut(view);
        if force_split {
            history.split_events();
        }
        history.generation
    }

    pub(crate) fn mark_clean_in(&mut self, view: ViewId) {
        let generation = self.change_generation_in(view, true);
        self.view_state_mut(view).clean_generation = generation;
    }

    pub(crate) fn is_clean_in(&self, view: ViewId, generation: Option<u64>) -> bool {
        generation.unwrap_or(self.view(view).clean_generation) == self.history_of(view).generation
    }

    pub(crate) fn make_change_from_history(
        &mut self,
        view: ViewId,
        direction: HistoryDirection,
        selection_only: bool,
    ) -> Result<bool, EditError> {
        if !selection_only && self.view(view).cant_edit {
            return Err(EditError::CantEdit);
        }
        self.run(|doc| -> Result<bool, EditError> {
            let current = doc.view(view).selection.clone();
            let Some(event) = doc.history_of_mut(view).pop_event(direction, &current, selection_only) else {
                return Ok(false);
            };
            let (group, restore) = match event {
                PoppedEvent::Selection(selection) => {
                    let options = SelectionOptions {
                        clear_redo: false,
                        ..SelectionOptions::default()
                    };
                    doc.set_selection_in(view, selection, options)?;
                    return Ok(true);
                }
                PoppedEvent::Changes { group, restore } => (group, restore),
            };

            let history = doc.history_of_mut(view);
            let previous = history.generation;
            history.generation = group.generation;

            let mut inverse = Vec::with_capacity(group.changes.len());
            for (i, stored) in group.changes.iter().enumerate().rev() {
                let from = doc.clip_pos_in(view, stored.from);
                let to = doc.clip_pos_in(view, stored.to);
                let change = Change::new(from, to, stored.text.clone(), Some(direction.origin().to_string()));
                inverse.push(doc.history_change_from_change(view, &change)?);
                let after = match (&restore, i) {
                    (Some(selection), 0) => Some(doc.clip_selection(view, selection)?),
                    _ => None,
                };
                let spans = doc.merged_spans(view, &change, Some(&stored.spans));
                let applied = doc.make_change_single(view, change, after, spans)?;
                doc.propagate_to_linked(view, &applied, Some(&stored.spans))?;
            }
            debug!(%view, direction = direction.origin(), changes = inverse.len(), "replayed history event");
            doc.history_of_mut(view).push_inverse(
                direction,
                ChangeGroup {
                    changes: inverse,
                    generation: previous,
                },
            );
            Ok(true)
        })
    }

    fn clip_selection(&self, view: ViewId, selection: &Selection) -> Result<Selection, EditError> {
        let ranges = selection
            .ranges()
            .iter()
            .map(|range| self.clip_range(view, *range))
            .collect();
        Selection::normalize(ranges, selection.primary_index(), self.options.selections_may_touch)
    }
}
