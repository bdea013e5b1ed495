use super::{Document, View, ViewId, floor_column};
use crate::change::{AppliedChange, Change};
use crate::error::EditError;
use crate::history::{HistoryChange, StoredSpans};
use crate::line::{Line, split_lines};
use crate::marker::MarkedSpan;
use crate::position::Position;
use crate::selection::{Direction, Selection, selection_after_change};
use crate::spans::{merge_old_spans, remove_cleared_spans, stretch_spans_over_change};
use std::ops::ControlFlow;

impl Document {
    /// Replaces the text between `from` and `to` with `text`, one entry per line.
    ///
    /// Both positions must lie inside the document; they are swapped when
    /// given backwards. Parts of the range covered by read-only markers are
    /// left alone, so the result may hold several primitive changes or none.
    pub fn apply_change(
        &mut self,
        from: Position,
        to: Position,
        text: Vec<String>,
        origin: Option<&str>,
    ) -> Result<AppliedChange, EditError> {
        self.apply_change_in(ViewId::PRIMARY, from, to, text, origin)
    }

    /// Like [`Document::apply_change`], splitting `text` on line breaks.
    pub fn replace_range(
        &mut self,
        text: &str,
        from: Position,
        to: Position,
        origin: Option<&str>,
    ) -> Result<AppliedChange, EditError> {
        self.apply_change_in(ViewId::PRIMARY, from, to, split_lines(text), origin)
    }

    /// Replaces the whole text and puts the cursor at the start.
    pub fn set_text(&mut self, text: &str) -> Result<AppliedChange, EditError> {
        self.set_text_in(ViewId::PRIMARY, text)
    }

    pub(crate) fn apply_change_in(
        &mut self,
        view: ViewId,
        from: Position,
        to: Position,
        text: Vec<String>,
        origin: Option<&str>,
    ) -> Result<AppliedChange, EditError> {
        if self.view(view).cant_edit {
            return Err(EditError::CantEdit);
        }
        self.check_pos(view, from)?;
        self.check_pos(view, to)?;
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        let change = Change::new(from, to, text, origin.map(str::to_owned));
        self.run(|doc| doc.make_change(view, change, false))
    }

    pub(crate) fn set_text_in(&mut self, view: ViewId, text: &str) -> Result<AppliedChange, EditError> {
        let last = self.line_count_in(view) - 1;
        let end = Position::new(last, self.view(view).lines.get(last)?.text.len());
        let mut change = Change::new(Position::default(), end, split_lines(text), Some("setValue".to_string()));
        change.full = true;
        self.run(|doc| {
            let applied = doc.make_change(view, change, true)?;
            doc.set_selection_in(view, Selection::cursor(Position::default()), Default::default())?;
            Ok(applied)
        })
    }

    /// Splits `change` around read-only markers and applies the pieces.
    pub(crate) fn make_change(
        &mut self,
        view: ViewId,
        change: Change,
        ignore_read_only: bool,
    ) -> Result<AppliedChange, EditError> {
        let mut applied = AppliedChange::default();
        let parts = if ignore_read_only {
            None
        } else {
            self.read_only_parts(view, change.from, change.to)
        };
        let Some(parts) = parts else {
            if let Some(done) = self.make_change_inner(view, change)? {
                applied.changes.push(done);
            }
            return Ok(applied);
        };

        // later parts first so earlier positions stay valid
        for (index, (from, to)) in parts.iter().enumerate().rev() {
            let text = if index == 0 {
                change.text.clone()
            } else {
                vec![String::new()]
            };
            let part = Change::new(*from, *to, text, change.origin.clone());
            if let Some(done) = self.make_change_inner(view, part)? {
                applied.changes.push(done);
            }
        }
        Ok(applied)
    }

    /// Pieces of `from..to` that lie outside every read-only marker, or
    /// `None` when no read-only marker touches the range.
    fn read_only_parts(&self, view: ViewId, from: Position, to: Position) -> Option<Vec<(Position, Position)>> {
        let state = self.view(view);
        let mut read_only = Vec::new();
        let _ = state.lines.iter_range(from.line, to.line + 1, |_, _, line| {
            for span in &line.spans {
                let is_read_only = state
                    .markers
                    .get(span.marker)
                    .is_some_and(|marker| marker.config.read_only);
                if is_read_only && !read_only.contains(&span.marker) {
                    read_only.push(span.marker);
                }
            }
            ControlFlow::Continue(())
        });
        if read_only.is_empty() {
            return None;
        }

        let mut parts = vec![(from, to)];
        for id in read_only {
            let (Some((mark_from, mark_to)), Some(marker)) = (self.marker_range(view, id), state.markers.get(id))
            else {
                continue;
            };
            let mut j = 0;
            while j < parts.len() {
                let (part_from, part_to) = parts[j];
                if part_to < mark_from || part_from > mark_to {
                    j += 1;
                    continue;
                }
                let mut pieces = Vec::with_capacity(2);
                if part_from < mark_from || (!marker.config.inclusive_left && part_from == mark_from) {
                    pieces.push((part_from, mark_from));
                }
                if part_to > mark_to || (!marker.config.inclusive_right && part_to == mark_to) {
                    pieces.push((mark_to, part_to));
                }
                parts.remove(j);
                for piece in pieces {
                    parts.insert(j, piece);
                    j += 1;
                }
            }
        }
        Some(parts)
    }

    /// Records `change` in history and applies it to `view` and every view
    /// linked to it. Returns the change with its removed text filled in, or
    /// `None` for a no-op.
    fn make_change_inner(&mut self, view: ViewId, change: Change) -> Result<Option<Change>, EditError> {
        if change.is_noop() {
            return Ok(None);
        }
        let selection_after =
            selection_after_change(&self.view(view).selection, &change, self.options.selections_may_touch)?;
        self.add_change_to_history(view, &change, selection_after.clone())?;
        let spans = self.stretch_spans(view, &change);
        let applied = self.make_change_single(view, change, Some(selection_after), spans)?;
        self.propagate_to_linked(view, &applied, None)?;
        Ok(Some(applied))
    }

    fn add_change_to_history(&mut self, view: ViewId, change: &Change, after: Selection) -> Result<(), EditError> {
        let record = self.history_change_from_change(view, change)?;
        let before = self.view(view).selection.clone();
        let op = self.scheduler.current_id();
        self.history_of_mut(view).add_change(change, &before, after, op, record);
        Ok(())
    }

    /// The inverse of `change` as history stores it, computed before the
    /// change is applied.
    pub(crate) fn history_change_from_change(&self, view: ViewId, change: &Change) -> Result<HistoryChange, EditError> {
        let mut spans = StoredSpans::new();
        let mut sharing = vec![view];
        sharing.extend(
            self.linked_views_of(view)
                .into_iter()
                .filter(|(_, shared)| *shared)
                .map(|(linked, _)| linked),
        );
        for id in sharing {
            if let Some(local) = self.local_spans(id, change.from.line, change.to.line) {
                spans.insert(id, local);
            }
        }
        Ok(HistoryChange {
            from: change.from,
            to: change.end(),
            text: self.get_between(view, change.from, change.to)?,
            spans,
        })
    }

    // spans of lines `from..=to`, or `None` when none of them carries any
    fn local_spans(&self, view: ViewId, from: usize, to: usize) -> Option<Vec<Vec<MarkedSpan>>> {
        let mut out = Vec::with_capacity(to + 1 - from);
        let mut any = false;
        let _ = self.view(view).lines.iter_range(from, to + 1, |_, _, line| {
            any |= !line.spans.is_empty();
            out.push(line.spans.clone());
            ControlFlow::Continue(())
        });
        any.then_some(out)
    }

    /// Span lists for the lines `change` will produce in `view`.
    pub(crate) fn stretch_spans(&self, view: ViewId, change: &Change) -> Vec<Vec<MarkedSpan>> {
        if change.full {
            return Vec::new();
        }
        let state = self.view(view);
        let spans_at = |line: usize| state.lines.get(line).map(|line| line.spans.as_slice()).unwrap_or(&[]);
        stretch_spans_over_change(
            spans_at(change.from.line),
            spans_at(change.to.line),
            change.from,
            change.to,
            &change.text,
            &state.markers,
        )
    }

    /// Stretched spans combined with the ones a history entry stored for `view`.
    pub(crate) fn merged_spans(
        &self,
        view: ViewId,
        change: &Change,
        stored: Option<&StoredSpans>,
    ) -> Vec<Vec<MarkedSpan>> {
        let stretched = self.stretch_spans(view, change);
        let Some(old) = stored.and_then(|stored| stored.get(&view)) else {
            return stretched;
        };
        let markers = &self.view(view).markers;
        let old = old.iter().map(|spans| remove_cleared_spans(spans, markers)).collect();
        merge_old_spans(old, stretched)
    }

    /// Repeats an applied change on every view linked to `view`, rebasing
    /// the histories it does not share.
    pub(crate) fn propagate_to_linked(
        &mut self,
        view: ViewId,
        applied: &Change,
        stored: Option<&StoredSpans>,
    ) -> Result<(), EditError> {
        let own_history = self.view(view).history;
        let mut rebased = vec![own_history];
        for (linked, shared) in self.linked_views_of(view) {
            let history = self.view(linked).history;
            if !shared && !rebased.contains(&history) {
                self.histories[history].rebase(applied);
                rebased.push(history);
            }
            let spans = match stored {
                Some(stored) => self.merged_spans(linked, applied, Some(stored)),
                None => self.stretch_spans(linked, applied),
            };
            self.make_change_single(linked, applied.clone(), None, spans)?;
        }
        Ok(())
    }

    /// Applies `change` to one view's text, spans and selection.
    pub(crate) fn make_change_single(
        &mut self,
        view: ViewId,
        mut change: Change,
        selection_after: Option<Selection>,
        spans: Vec<Vec<MarkedSpan>>,
    ) -> Result<Change, EditError> {
        change.removed = self.get_between(view, change.from, change.to)?;
        let selection_after = match selection_after {
            Some(selection) => selection,
            None => selection_after_change(&self.view(view).selection, &change, self.options.selections_may_touch)?,
        };
        self.update_doc(view, &change, spans)?;
        self.set_selection_no_undo(view, selection_after, None, false)?;
        if self.view(view).cant_edit
            && self
                .find_atomic_escape(view, Position::default(), None, Direction::Forward, false, false)
                .is_some()
        {
            self.view_state_mut(view).cant_edit = false;
        }
        let recorded = change.clone();
        self.record(view, |intents| intents.changes.push(recorded));
        Ok(change)
    }

    fn update_doc(&mut self, view: ViewId, change: &Change, spans: Vec<Vec<MarkedSpan>>) -> Result<(), EditError> {
        let spans_for = |n: usize| spans.get(n).cloned().unwrap_or_default();
        let lines_for = |start: usize, end: usize| -> Vec<(String, Vec<MarkedSpan>)> {
            (start..end).map(|n| (change.text[n].clone(), spans_for(n))).collect()
        };
        let text = &change.text;
        let (from, to) = (change.from, change.to);
        let last = text.len() - 1;
        let last_text = text[last].as_str();
        let nlines = to.line - from.line;

        if change.full {
            let count = self.line_count_in(view);
            self.insert_lines(view, 0, lines_for(0, text.len()))?;
            self.remove_lines(view, text.len(), count)?;
            self.record(view, |intents| intents.mark_changed(change));
            return Ok(());
        }

        let first_line = self.line_text_owned(view, from.line)?;
        if from.column == 0 && to.column == 0 && last_text.is_empty() {
            // whole lines replaced: the line at `to` survives untouched
            let kept = self.line_text_owned(view, to.line)?;
            self.update_line(view, to.line, kept, spans_for(last))?;
            if nlines > 0 {
                self.remove_lines(view, from.line, nlines)?;
            }
            if last > 0 {
                self.insert_lines(view, from.line, lines_for(0, last))?;
            }
        } else if nlines == 0 {
            let (before, after) = split_at_column(&first_line, from.column, to.column);
            if text.len() == 1 {
                self.update_line(view, from.line, format!("{before}{last_text}{after}"), spans_for(0))?;
            } else {
                let mut added = lines_for(1, last);
                added.push((format!("{last_text}{after}"), spans_for(last)));
                self.update_line(view, from.line, format!("{before}{}", text[0]), spans_for(0))?;
                self.insert_lines(view, from.line + 1, added)?;
            }
        } else {
            let last_line = self.line_text_owned(view, to.line)?;
            let before = &first_line[..floor_column(&first_line, from.column)];
            let after = &last_line[floor_column(&last_line, to.column)..];
            if text.len() == 1 {
                self.update_line(view, from.line, format!("{before}{}{after}", text[0]), spans_for(0))?;
                self.remove_lines(view, from.line + 1, nlines)?;
            } else {
                self.update_line(view, from.line, format!("{before}{}", text[0]), spans_for(0))?;
                self.update_line(view, to.line, format!("{last_text}{after}"), spans_for(last))?;
                if nlines > 1 {
                    self.remove_lines(view, from.line + 1, nlines - 1)?;
                }
                self.insert_lines(view, from.line + 1, lines_for(1, last))?;
            }
        }
        self.record(view, |intents| intents.mark_changed(change));
        Ok(())
    }

    fn line_text_owned(&self, view: ViewId, index: usize) -> Result<String, EditError> {
        Ok(self.view(view).lines.get(index)?.text.clone())
    }

    /// Replaces one line's text and spans, keeping marker back-lists in step.
    fn update_line(&mut self, view: ViewId, index: usize, text: String, spans: Vec<MarkedSpan>) -> Result<(), EditError> {
        let View { lines, markers, .. } = self.view_state_mut(view);
        let id = lines.id_at(index)?;
        let line = lines.get_mut(index)?;
        for span in &line.spans {
            markers.detach_line(span.marker, id);
        }
        line.text = text;
        line.render_token = None;
        line.spans = spans;
        for span in &line.spans {
            markers.attach_line(span.marker, id);
        }
        Ok(())
    }

    fn insert_lines(&mut self, view: ViewId, at: usize, new: Vec<(String, Vec<MarkedSpan>)>) -> Result<(), EditError> {
        let View { lines, markers, .. } = self.view_state_mut(view);
        let ids = lines.insert(
            at,
            new.into_iter().map(|(text, spans)| Line {
                spans,
                ..Line::new(text)
            }),
        )?;
        for id in ids {
            if let Some(line) = lines.line(id) {
                for span in &line.spans {
                    markers.attach_line(span.marker, id);
                }
            }
        }
        Ok(())
    }

    fn remove_lines(&mut self, view: ViewId, at: usize, count: usize) -> Result<(), EditError> {
        let View { lines, markers, .. } = self.view_state_mut(view);
        for (id, line) in lines.remove(at, count)? {
            for span in &line.spans {
                markers.detach_line(span.marker, id);
            }
        }
        Ok(())
    }
}

fn split_at_column(text: &str, from: usize, to: usize) -> (&str, &str) {
    (&text[..floor_column(text, from)], &text[floor_column(text, to)..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerConfig;

    fn pos(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    fn all_lines(doc: &Document) -> Vec<String> {
        (0..doc.line_count())
            .map(|i| doc.line_text(i).unwrap().to_string())
            .collect()
    }

    #[test]
    fn multi_line_insert_splits_line() {
        let mut doc = Document::new("abc\ndef");
        let applied = doc.apply_change(pos(0, 1), pos(0, 1), lines(&["X", "Y"]), None).unwrap();
        assert_eq!(all_lines(&doc), vec!["aX", "Ybc", "def"]);
        assert_eq!(applied.changes.len(), 1);
        assert_eq!(applied.changes[0].removed, vec![""]);
    }

    #[test]
    fn delete_across_lines_joins_them() {
        let mut doc = Document::new("abc\ndef\nghi");
        let applied = doc.apply_change(pos(0, 2), pos(2, 1), lines(&[""]), None).unwrap();
        assert_eq!(all_lines(&doc), vec!["abhi"]);
        assert_eq!(applied.changes[0].removed, vec!["c", "def", "g"]);
    }

    #[test]
    fn replace_across_lines_with_several_lines() {
        let mut doc = Document::new("abc\ndef\nghi\njkl");
        doc.replace_range("1\n2\n3\n4", pos(0, 1), pos(2, 2), None).unwrap();
        assert_eq!(all_lines(&doc), vec!["a1", "2", "3", "4i", "jkl"]);
    }

    #[test]
    fn whole_line_replacement_keeps_following_line() {
        let mut doc = Document::new("one\ntwo\nthree");
        let before = doc.line_handle(2).unwrap();
        doc.apply_change(pos(0, 0), pos(2, 0), lines(&["uno", "dos", ""]), None).unwrap();
        assert_eq!(all_lines(&doc), vec!["uno", "dos", "three"]);
        assert_eq!(doc.line_number_of(before), Some(2));
    }

    #[test]
    fn backwards_range_is_swapped() {
        let mut doc = Document::new("hello");
        doc.apply_change(pos(0, 4), pos(0, 1), lines(&["-"]), None).unwrap();
        assert_eq!(doc.text(), "h-o");
    }

    #[test]
    fn out_of_range_change_is_rejected_without_mutation() {
        let mut doc = Document::new("abc");
        assert_eq!(
            doc.apply_change(pos(0, 1), pos(3, 0), lines(&["x"]), None),
            Err(EditError::OutOfRange { line: 3, column: 0 })
        );
        assert_eq!(
            doc.apply_change(pos(0, 9), pos(0, 9), lines(&["x"]), None),
            Err(EditError::OutOfRange { line: 0, column: 9 })
        );
        assert_eq!(doc.text(), "abc");
        assert_eq!(doc.history_size().undo, 0);
    }

    #[test]
    fn column_inside_a_char_is_rejected() {
        let mut doc = Document::new("é");
        assert!(doc.apply_change(pos(0, 1), pos(0, 1), lines(&["x"]), None).is_err());
    }

    #[test]
    fn noop_change_produces_nothing() {
        let mut doc = Document::new("abc");
        let applied = doc.apply_change(pos(0, 1), pos(0, 1), Vec::new(), None).unwrap();
        assert!(applied.is_empty());
        assert_eq!(doc.history_size().undo, 0);
    }

    #[test]
    fn cursor_follows_insertion() {
        let mut doc = Document::new("abc");
        doc.set_cursor(pos(0, 2), Default::default());
        doc.replace_range("xy\nz", pos(0, 1), pos(0, 1), None).unwrap();
        assert_eq!(doc.selection().primary().head, pos(1, 2));
    }

    #[test]
    fn set_text_replaces_everything() {
        let mut doc = Document::new("abc\ndef");
        doc.set_cursor(pos(1, 2), Default::default());
        let applied = doc.set_text("x\ny\nz").unwrap();
        assert_eq!(all_lines(&doc), vec!["x", "y", "z"]);
        assert_eq!(applied.changes[0].removed, vec!["abc", "def"]);
        assert_eq!(applied.changes[0].origin.as_deref(), Some("setValue"));
        assert_eq!(doc.selection().primary().head, pos(0, 0));
    }

    #[test]
    fn read_only_range_splits_change() {
        let mut doc = Document::new("abcdefgh");
        doc.mark_range(
            pos(0, 3),
            pos(0, 5),
            MarkerConfig {
                read_only: true,
                ..MarkerConfig::default()
            },
        )
        .unwrap();
        let applied = doc.apply_change(pos(0, 1), pos(0, 7), lines(&["X"]), None).unwrap();
        assert_eq!(applied.changes.len(), 2);
        assert_eq!(doc.text(), "aXdeh");
    }

    #[test]
    fn change_inside_read_only_range_is_dropped() {
        let mut doc = Document::new("abcdefgh");
        doc.mark_range(
            pos(0, 2),
            pos(0, 6),
            MarkerConfig {
                read_only: true,
                ..MarkerConfig::default()
            },
        )
        .unwrap();
        let applied = doc.apply_change(pos(0, 3), pos(0, 4), lines(&["X"]), None).unwrap();
        assert!(applied.is_empty());
        assert_eq!(doc.text(), "abcdefgh");
        // the exclusive boundary still accepts text
        doc.apply_change(pos(0, 6), pos(0, 6), lines(&["!"]), None).unwrap();
        assert_eq!(doc.text(), "abcdef!gh");
    }

    #[test]
    fn marker_spans_follow_line_splits() {
        let mut doc = Document::new("abcdef");
        let handle = doc.mark_range(pos(0, 1), pos(0, 5), MarkerConfig::default()).unwrap();
        doc.replace_range("\n\n", pos(0, 3), pos(0, 3), None).unwrap();
        assert_eq!(all_lines(&doc), vec!["abc", "", "def"]);
        assert_eq!(doc.find_marker(handle), Some((pos(0, 1), pos(2, 2))));
        let covered: Vec<usize> = (0..3)
            .filter(|&i| !doc.query_line(i).unwrap().spans.is_empty())
            .collect();
        assert_eq!(covered, vec![0, 1, 2]);
    }
}
