use super::{Document, View, ViewId};
use crate::error::EditError;
use crate::events::MarkerClearedEvent;
use crate::marker::{MarkedSpan, Marker, MarkerConfig, MarkerHandle, MarkerId, MarkerKind};
use crate::position::Position;
use std::ops::ControlFlow;
use tracing::debug;

impl Document {
    /// Marks `from..to` with the behaviour described by `config`.
    ///
    /// Positions are clipped into the document. An empty range whose marker
    /// would be cleared when empty produces a handle that is never attached.
    pub fn mark_range(&mut self, from: Position, to: Position, config: MarkerConfig) -> Result<MarkerHandle, EditError> {
        self.mark_range_in(ViewId::PRIMARY, from, to, config)
    }

    /// Places a zero-width marker at `pos`.
    pub fn set_bookmark(&mut self, pos: Position, insert_left: bool) -> Result<MarkerHandle, EditError> {
        self.set_bookmark_in(ViewId::PRIMARY, pos, insert_left)
    }

    /// Removes a marker and its spans. Returns `false` if it was already gone.
    pub fn clear_marker(&mut self, handle: MarkerHandle) -> bool {
        self.check_view(handle.view).is_ok() && self.clear_marker_in(handle.view, handle.marker)
    }

    /// Current extent of a marker, or `None` once it has been cleared or its
    /// range collapsed away.
    pub fn find_marker(&self, handle: MarkerHandle) -> Option<(Position, Position)> {
        self.check_view(handle.view).ok()?;
        self.marker_range(handle.view, handle.marker)
    }

    /// Markers overlapping `from..to`, in document order of their start.
    pub fn find_marks(&self, from: Position, to: Position) -> Vec<MarkerHandle> {
        self.find_marks_in(ViewId::PRIMARY, from, to)
    }

    /// Markers whose range contains `pos`, boundaries included.
    pub fn find_marks_at(&self, pos: Position) -> Vec<MarkerHandle> {
        self.find_marks_at_in(ViewId::PRIMARY, pos)
    }

    pub fn all_marks(&self) -> Vec<MarkerHandle> {
        self.all_marks_in(ViewId::PRIMARY)
    }

    pub fn marker_config(&self, handle: MarkerHandle) -> Option<&MarkerConfig> {
        self.check_view(handle.view).ok()?;
        self.view(handle.view).markers.get(handle.marker).map(|marker| &marker.config)
    }

    pub(crate) fn mark_range_in(
        &mut self,
        view: ViewId,
        from: Position,
        to: Position,
        config: MarkerConfig,
    ) -> Result<MarkerHandle, EditError> {
        self.mark_in(view, from, to, MarkerKind::Range, config)
    }

    pub(crate) fn set_bookmark_in(
        &mut self,
        view: ViewId,
        pos: Position,
        insert_left: bool,
    ) -> Result<MarkerHandle, EditError> {
        let config = MarkerConfig {
            clear_when_empty: false,
            insert_left,
            ..MarkerConfig::default()
        };
        self.mark_in(view, pos, pos, MarkerKind::Bookmark, config)
    }

    fn mark_in(
        &mut self,
        view: ViewId,
        from: Position,
        to: Position,
        kind: MarkerKind,
        mut config: MarkerConfig,
    ) -> Result<MarkerHandle, EditError> {
        let from = self.clip_pos_in(view, from);
        let to = self.clip_pos_in(view, to);
        self.next_marker += 1;
        let id = MarkerId(self.next_marker);
        let handle = MarkerHandle { view, marker: id };
        if from > to || (from == to && config.clear_when_empty) {
            return Ok(handle);
        }
        if config.collapsed {
            let conflict = self.conflicting_collapsed_range(view, from.line, from, to, &config)
                || (from.line != to.line && self.conflicting_collapsed_range(view, to.line, from, to, &config));
            if conflict {
                return Err(EditError::ConflictingCollapse);
            }
            config.atomic = true;
        }

        let atomic = config.atomic;
        let read_only = config.read_only;
        self.run(|doc| {
            let View { lines, markers, .. } = doc.view_state_mut(view);
            markers.insert(id, Marker::new(kind, config));
            for number in from.line..=to.line {
                let line_id = lines.id_at(number)?;
                let span = MarkedSpan::new(
                    id,
                    (number == from.line).then_some(from.column),
                    (number == to.line).then_some(to.column),
                );
                lines.get_mut(number)?.spans.push(span);
                markers.attach_line(id, line_id);
            }
            if read_only && !doc.history_of(view).is_empty() {
                doc.clear_history_in(view);
            }
            doc.record(view, |intents| {
                intents.mark_dirty(from.line..to.line + 1);
                intents.recheck_selection |= atomic;
            });
            debug!(%view, marker = id.0, ?kind, %from, %to, "marked range");
            Ok(handle)
        })
    }

    // Collapsed ranges may nest but must not partially overlap.
    fn conflicting_collapsed_range(
        &self,
        view: ViewId,
        line: usize,
        from: Position,
        to: Position,
        config: &MarkerConfig,
    ) -> bool {
        let state = self.view(view);
        let Ok(line) = state.lines.get(line) else {
            return false;
        };
        for span in &line.spans {
            let Some(found) = state.markers.get(span.marker) else {
                continue;
            };
            if !found.config.collapsed {
                continue;
            }
            let Some((found_from, found_to)) = self.marker_range(view, span.marker) else {
                continue;
            };
            // an inclusive side reaches one step further out at the same position
            let from_cmp = found_from
                .cmp(&from)
                .then(config.inclusive_left.cmp(&found.config.inclusive_left));
            let to_cmp = found_to
                .cmp(&to)
                .then(found.config.inclusive_right.cmp(&config.inclusive_right));
            if (from_cmp.is_ge() && to_cmp.is_le()) || (from_cmp.is_le() && to_cmp.is_ge()) {
                continue;
            }
            let ends_inside = if found.config.inclusive_right && config.inclusive_left {
                found_to >= from
            } else {
                found_to > from
            };
            let starts_inside = if found.config.inclusive_left && config.inclusive_right {
                found_from <= to
            } else {
                found_from < to
            };
            if (from_cmp.is_le() && ends_inside) || (from_cmp.is_ge() && starts_inside) {
                return true;
            }
        }
        false
    }

    /// Removes marker `id` from `view`, announcing the range it covered.
    pub(crate) fn clear_marker_in(&mut self, view: ViewId, id: MarkerId) -> bool {
        if !self.view(view).markers.contains(id) {
            return false;
        }
        let range = self.marker_range(view, id);
        self.run(|doc| {
            let View { lines, markers, .. } = doc.view_state_mut(view);
            let Some(marker) = markers.remove(id) else {
                return false;
            };
            let mut touched: Option<(usize, usize)> = None;
            for line_id in &marker.lines {
                let Some(number) = lines.line_number_of(*line_id) else {
                    continue;
                };
                if let Some(line) = lines.line_mut(*line_id) {
                    line.spans.retain(|span| span.marker != id);
                }
                touched = Some(match touched {
                    Some((low, high)) => (low.min(number), high.max(number)),
                    None => (number, number),
                });
            }
            if let Some((low, high)) = touched {
                doc.record(view, |intents| intents.mark_dirty(low..high + 1));
            }
            let state = doc.view_state_mut(view);
            if marker.config.atomic && state.cant_edit {
                state.cant_edit = false;
                doc.record(view, |intents| intents.recheck_selection = true);
            }
            doc.record_cleared(MarkerClearedEvent {
                handle: MarkerHandle { view, marker: id },
                from: range.map(|(from, _)| from),
                to: range.map(|(_, to)| to),
            });
            debug!(%view, marker = id.0, "cleared marker");
            true
        })
    }

    /// Start and end of marker `id`, read from the spans it left on its lines.
    pub(crate) fn marker_range(&self, view: ViewId, id: MarkerId) -> Option<(Position, Position)> {
        let state = self.view(view);
        let marker = state.markers.get(id)?;
        let mut from = None;
        let mut to = None;
        for line_id in &marker.lines {
            let (Some(number), Some(line)) = (state.lines.line_number_of(*line_id), state.lines.line(*line_id)) else {
                continue;
            };
            for span in line.spans.iter().filter(|span| span.marker == id) {
                if let Some(column) = span.from {
                    from = Some(Position::new(number, column));
                }
                if let Some(column) = span.to {
                    to = Some(Position::new(number, column));
                }
            }
        }
        Some((from?, to?))
    }

    pub(crate) fn find_marks_in(&self, view: ViewId, from: Position, to: Position) -> Vec<MarkerHandle> {
        let from = self.clip_pos_in(view, from);
        let to = self.clip_pos_in(view, to);
        let mut found = Vec::new();
        let _ = self.view(view).lines.iter_range(from.line, to.line + 1, |number, _, line| {
            for span in &line.spans {
                let ends_before = number == from.line && span.to.is_some_and(|end| from.column >= end);
                let continued = span.from.is_none() && number != from.line;
                let starts_after = number == to.line && span.from.is_some_and(|start| start >= to.column);
                if !(ends_before || continued || starts_after) {
                    found.push(MarkerHandle {
                        view,
                        marker: span.marker,
                    });
                }
            }
            ControlFlow::Continue(())
        });
        found
    }

    pub(crate) fn find_marks_at_in(&self, view: ViewId, pos: Position) -> Vec<MarkerHandle> {
        let pos = self.clip_pos_in(view, pos);
        let Ok(line) = self.view(view).lines.get(pos.line) else {
            return Vec::new();
        };
        line.spans
            .iter()
            .filter(|span| {
                span.from.is_none_or(|from| from <= pos.column) && span.to.is_none_or(|to| to >= pos.column)
            })
            .map(|span| MarkerHandle {
                view,
                marker: span.marker,
            })
            .collect()
    }

    pub(crate) fn all_marks_in(&self, view: ViewId) -> Vec<MarkerHandle> {
        self.view(view)
            .lines
            .iter()
            .flat_map(|(_, line)| line.spans.iter())
            .filter(|span| span.from.is_some())
            .map(|span| MarkerHandle {
                view,
                marker: span.marker,
            })
            .collect()
    }
}
