use crate::change::Change;
use crate::document::{Document, ViewId};
use crate::marker::MarkerHandle;
use crate::position::Position;
use crate::selection::Selection;
use std::error::Error;
use std::fmt;
use std::ops::Range;
use tracing::warn;

/// Every change one operation made to a view, in application order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub view: ViewId,
    pub changes: Vec<Change>,
    /// Lines whose text, spans or height changed, in final coordinates.
    pub dirty: Option<Range<usize>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectionEvent {
    pub view: ViewId,
    pub selection: Selection,
}

/// A marker that was cleared, with the range it covered at that moment.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerClearedEvent {
    pub handle: MarkerHandle,
    pub from: Option<Position>,
    pub to: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type ListenerResult = Result<(), Box<dyn Error + Send + Sync>>;

type Callback<E> = Box<dyn FnMut(&Document, &E) -> ListenerResult>;

pub(crate) struct Registry<E> {
    entries: Vec<(ListenerId, Callback<E>)>,
}

impl<E> Default for Registry<E> {
    fn default() -> Self {
        Registry { entries: Vec::new() }
    }
}

impl<E> Registry<E> {
    fn add(&mut self, id: ListenerId, callback: Callback<E>) {
        self.entries.push((id, callback));
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    fn emit(&mut self, doc: &Document, event: &E, kind: &str) {
        for (id, callback) in &mut self.entries {
            if let Err(err) = callback(doc, event) {
                warn!(listener = id.0, kind, error = %err, "listener failed");
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Registered change, selection and marker listeners.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: u64,
    change: Registry<ChangeEvent>,
    selection: Registry<SelectionEvent>,
    marker_cleared: Registry<MarkerClearedEvent>,
}

impl Listeners {
    fn next_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }

    pub fn on_change(&mut self, callback: Callback<ChangeEvent>) -> ListenerId {
        let id = self.next_id();
        self.change.add(id, callback);
        id
    }

    pub fn on_selection_change(&mut self, callback: Callback<SelectionEvent>) -> ListenerId {
        let id = self.next_id();
        self.selection.add(id, callback);
        id
    }

    pub fn on_marker_cleared(&mut self, callback: Callback<MarkerClearedEvent>) -> ListenerId {
        let id = self.next_id();
        self.marker_cleared.add(id, callback);
        id
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.change.remove(id) || self.selection.remove(id) || self.marker_cleared.remove(id)
    }

    pub fn emit_change(&mut self, doc: &Document, event: &ChangeEvent) {
        self.change.emit(doc, event, "change");
    }

    pub fn emit_selection(&mut self, doc: &Document, event: &SelectionEvent) {
        self.selection.emit(doc, event, "selection");
    }

    pub fn emit_marker_cleared(&mut self, doc: &Document, event: &MarkerClearedEvent) {
        self.marker_cleared.emit(doc, event, "marker_cleared");
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("change", &self.change.len())
            .field("selection", &self.selection.len())
            .field("marker_cleared", &self.marker_cleared.len())
            .finish()
    }
}
