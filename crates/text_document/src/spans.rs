//! Moving marked spans across text changes.
//!
//! A change only ever touches the spans of its first and last line: everything
//! in between is replaced wholesale. The functions here compute the span lists
//! of every line the change produces from those two inputs.

use crate::marker::{MarkedSpan, MarkerId, MarkerKind, MarkerTable};
use crate::position::Position;

struct SpanFlags {
    inclusive_left: bool,
    inclusive_right: bool,
    bookmark: bool,
    insert_left: bool,
    clear_when_empty: bool,
}

impl SpanFlags {
    fn of(table: &MarkerTable, id: MarkerId) -> Self {
        match table.get(id) {
            Some(marker) => SpanFlags {
                inclusive_left: marker.config.inclusive_left,
                inclusive_right: marker.config.inclusive_right,
                bookmark: marker.kind == MarkerKind::Bookmark,
                insert_left: marker.config.insert_left,
                clear_when_empty: marker.config.clear_when_empty,
            },
            None => SpanFlags {
                inclusive_left: false,
                inclusive_right: false,
                bookmark: false,
                insert_left: false,
                clear_when_empty: true,
            },
        }
    }
}

pub(crate) fn span_for(spans: &[MarkedSpan], marker: MarkerId) -> Option<&MarkedSpan> {
    spans.iter().find(|span| span.marker == marker)
}

// spans of the first line that survive to the left of the change
fn markers_before(old: &[MarkedSpan], start: usize, is_insert: bool, table: &MarkerTable) -> Vec<MarkedSpan> {
    old.iter()
        .filter_map(|span| {
            let flags = SpanFlags::of(table, span.marker);
            let starts_before = span.from.is_none_or(|from| {
                if flags.inclusive_left {
                    from <= start
                } else {
                    from < start
                }
            });
            let bookmark_stays =
                span.from == Some(start) && flags.bookmark && (!is_insert || !flags.insert_left);
            if !(starts_before || bookmark_stays) {
                return None;
            }
            let ends_after = span.to.is_none_or(|to| {
                if flags.inclusive_right {
                    to >= start
                } else {
                    to > start
                }
            });
            Some(MarkedSpan::new(
                span.marker,
                span.from,
                if ends_after { None } else { span.to },
            ))
        })
        .collect()
}

// spans of the last line that survive to the right of the change, relative to `end`
fn markers_after(old: &[MarkedSpan], end: usize, is_insert: bool, table: &MarkerTable) -> Vec<MarkedSpan> {
    old.iter()
        .filter_map(|span| {
            let flags = SpanFlags::of(table, span.marker);
            let ends_after = span.to.is_none_or(|to| {
                if flags.inclusive_right {
                    to >= end
                } else {
                    to > end
                }
            });
            let bookmark_moves =
                span.from == Some(end) && flags.bookmark && (!is_insert || flags.insert_left);
            if !(ends_after || bookmark_moves) {
                return None;
            }
            let starts_before = span.from.is_none_or(|from| {
                if flags.inclusive_left {
                    from <= end
                } else {
                    from < end
                }
            });
            Some(MarkedSpan::new(
                span.marker,
                if starts_before {
                    None
                } else {
                    span.from.map(|from| from.saturating_sub(end))
                },
                span.to.map(|to| to.saturating_sub(end)),
            ))
        })
        .collect()
}

/// Span lists for every line produced by replacing `from..to` with `text`.
///
/// Returns an empty vector when neither boundary line carries spans.
pub(crate) fn stretch_spans_over_change(
    old_first: &[MarkedSpan],
    old_last: &[MarkedSpan],
    from: Position,
    to: Position,
    text: &[String],
    table: &MarkerTable,
) -> Vec<Vec<MarkedSpan>> {
    if old_first.is_empty() && old_last.is_empty() {
        return Vec::new();
    }

    let start = from.column;
    let is_insert = from == to;
    let mut first = markers_before(old_first, start, is_insert, table);
    let mut last = markers_after(old_last, to.column, is_insert, table);

    let same_line = text.len() == 1;
    let offset = text.last().map_or(0, String::len) + if same_line { start } else { 0 };

    for span in first.iter_mut() {
        if span.to.is_none() {
            match span_for(&last, span.marker) {
                None => span.to = Some(start),
                Some(found) if same_line => span.to = found.to.map(|to| to + offset),
                Some(_) => {}
            }
        }
    }

    for span in last.iter_mut() {
        if let Some(to) = span.to {
            span.to = Some(to + offset);
        }
        match span.from {
            None => {
                if span_for(&first, span.marker).is_none() {
                    span.from = Some(offset);
                    if same_line {
                        first.push(*span);
                    }
                }
            }
            Some(from) => {
                span.from = Some(from + offset);
                if same_line {
                    first.push(*span);
                }
            }
        }
    }

    clear_empty_spans(&mut first, table);
    clear_empty_spans(&mut last, table);

    if same_line {
        return vec![first];
    }

    let gap = text.len() - 2;
    let gap_spans: Vec<MarkedSpan> = if gap > 0 {
        first
            .iter()
            .filter(|span| span.to.is_none())
            .map(|span| MarkedSpan::new(span.marker, None, None))
            .collect()
    } else {
        Vec::new()
    };
    let mut lines = Vec::with_capacity(text.len());
    lines.push(first);
    lines.extend(std::iter::repeat_n(gap_spans, gap));
    lines.push(last);
    lines
}

/// Drops zero-length spans unless their marker survives being empty.
pub(crate) fn clear_empty_spans(spans: &mut Vec<MarkedSpan>, table: &MarkerTable) {
    spans.retain(|span| {
        !(span.from.is_some() && span.from == span.to && SpanFlags::of(table, span.marker).clear_when_empty)
    });
}

/// Drops spans whose marker has been cleared since they were stored.
pub(crate) fn remove_cleared_spans(spans: &[MarkedSpan], table: &MarkerTable) -> Vec<MarkedSpan> {
    spans
        .iter()
        .filter(|span| table.contains(span.marker))
        .copied()
        .collect()
}

/// Combines spans stored with a history entry and freshly stretched ones.
/// Stored spans win; stretched spans only fill in markers the stored set lacks.
pub(crate) fn merge_old_spans(old: Vec<Vec<MarkedSpan>>, stretched: Vec<Vec<MarkedSpan>>) -> Vec<Vec<MarkedSpan>> {
    if old.is_empty() {
        return stretched;
    }
    if stretched.is_empty() {
        return old;
    }
    let mut merged = old;
    for (index, stretch) in stretched.into_iter().enumerate() {
        if stretch.is_empty() {
            continue;
        }
        if merged.len() <= index {
            merged.resize(index + 1, Vec::new());
        }
        let current = &mut merged[index];
        if current.is_empty() {
            *current = stretch;
            continue;
        }
        for span in stretch {
            if span_for(current, span.marker).is_none() {
                current.push(span);
            }
        }
    }
    merged
}
