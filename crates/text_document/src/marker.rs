use crate::document::ViewId;
use line_tree::LineId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarkerId(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    Range,
    Bookmark,
}

/// Behaviour flags of a marked range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Hides the covered text. Implies `atomic`.
    pub collapsed: bool,
    /// Cursors cannot rest inside the range.
    pub atomic: bool,
    /// Text inserted at the start boundary becomes part of the range.
    pub inclusive_left: bool,
    /// Text inserted at the end boundary becomes part of the range.
    pub inclusive_right: bool,
    /// Edits overlapping the range are trimmed around it.
    pub read_only: bool,
    /// Drop the marker once its range shrinks to nothing.
    pub clear_when_empty: bool,
    /// Clear the marker as soon as a cursor enters it.
    pub clear_on_enter: bool,
    /// Bookmarks only: text typed at the bookmark goes to its left.
    pub insert_left: bool,
    pub tag: Option<String>,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        MarkerConfig {
            collapsed: false,
            atomic: false,
            inclusive_left: false,
            inclusive_right: false,
            read_only: false,
            clear_when_empty: true,
            clear_on_enter: false,
            insert_left: false,
            tag: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Marker {
    pub kind: MarkerKind,
    pub config: MarkerConfig,
    // every line currently carrying one of this marker's spans, in attach order
    pub lines: Vec<LineId>,
}

impl Marker {
    pub fn new(kind: MarkerKind, config: MarkerConfig) -> Self {
        Marker {
            kind,
            config,
            lines: Vec::new(),
        }
    }
}

/// The slice of a marker that lives on one line. `None` ends continue onto
/// the neighbouring line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkedSpan {
    pub marker: MarkerId,
    pub from: Option<usize>,
    pub to: Option<usize>,
}

impl MarkedSpan {
    pub const fn new(marker: MarkerId, from: Option<usize>, to: Option<usize>) -> Self {
        Self { marker, from, to }
    }
}

/// Handle for a marker created on one view of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerHandle {
    pub view: ViewId,
    pub marker: MarkerId,
}

/// Live markers of one view. A marker leaves the table only when it is
/// explicitly cleared, so spans restored by undo can find it again.
#[derive(Debug, Clone, Default)]
pub(crate) struct MarkerTable {
    markers: BTreeMap<MarkerId, Marker>,
}

impl MarkerTable {
    pub fn insert(&mut self, id: MarkerId, marker: Marker) {
        self.markers.insert(id, marker);
    }

    pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        self.markers.remove(&id)
    }

    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    pub fn contains(&self, id: MarkerId) -> bool {
        self.markers.contains_key(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.markers.keys().copied()
    }

    pub fn attach_line(&mut self, id: MarkerId, line: LineId) {
        if let Some(marker) = self.markers.get_mut(&id) {
            if !marker.lines.contains(&line) {
                marker.lines.push(line);
            }
        }
    }

    pub fn detach_line(&mut self, id: MarkerId, line: LineId) {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.lines.retain(|attached| *attached != line);
        }
    }
}
