use super::{Document, Link, View, ViewId};
use crate::error::EditError;
use crate::history::History;
use std::collections::BTreeSet;
use tracing::debug;

impl Document {
    /// Creates a new view showing the same text as `source`. Edits through
    /// either view reach the other. With `shared_history` both undo through a
    /// single history; otherwise each keeps its own.
    pub fn link_view(&mut self, source: ViewId, shared_history: bool) -> Result<ViewId, EditError> {
        self.check_view(source)?;
        let text: Vec<String> = self
            .view(source)
            .lines
            .iter()
            .map(|(_, line)| line.text.clone())
            .collect();
        let history = if shared_history {
            self.view(source).history
        } else {
            self.histories.push(History::new(
                self.options.undo_depth,
                self.options.history_event_delay(),
                1,
            ));
            self.histories.len() - 1
        };
        let id = ViewId(self.views.len());
        let clean_generation = self.histories[history].generation;
        let mut view = View::new(&text, self.options.line_height, history, clean_generation);
        view.links.push(Link {
            view: source,
            shared_history,
        });
        self.views.push(view);
        self.view_state_mut(source).links.push(Link { view: id, shared_history });
        debug!(%source, view = %id, shared_history, "linked view");
        Ok(id)
    }

    /// Cuts the link between `a` and `b`. A history they shared is split:
    /// `b`'s side keeps a copy of every event. Returns `false` if the two
    /// were not directly linked.
    pub fn unlink_view(&mut self, a: ViewId, b: ViewId) -> Result<bool, EditError> {
        self.check_view(a)?;
        self.check_view(b)?;
        let Some(index) = self.view(a).links.iter().position(|link| link.view == b) else {
            return Ok(false);
        };
        let link = self.view_state_mut(a).links.remove(index);
        self.view_state_mut(b).links.retain(|link| link.view != a);

        let history = self.view(b).history;
        if link.shared_history && self.view(a).history == history {
            let mut component: BTreeSet<ViewId> = self
                .linked_views_of(b)
                .into_iter()
                .filter(|(_, shared)| *shared)
                .map(|(view, _)| view)
                .collect();
            component.insert(b);
            let split = self.histories[history].split_for(&component);
            self.histories.push(split);
            let new_history = self.histories.len() - 1;
            for view in &component {
                self.view_state_mut(*view).history = new_history;
            }
        }
        debug!(%a, %b, shared_history = link.shared_history, "unlinked views");
        Ok(true)
    }

    /// Every view reachable from `view` through links.
    pub fn linked_views(&self, view: ViewId) -> Result<Vec<ViewId>, EditError> {
        self.check_view(view)?;
        Ok(self.linked_views_of(view).into_iter().map(|(view, _)| view).collect())
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Views reachable from `view`, each paired with whether every link on
    /// the way shares history.
    pub(crate) fn linked_views_of(&self, view: ViewId) -> Vec<(ViewId, bool)> {
        let mut out = Vec::new();
        self.collect_linked(view, None, true, &mut out);
        out
    }

    fn collect_linked(&self, view: ViewId, parent: Option<ViewId>, shared: bool, out: &mut Vec<(ViewId, bool)>) {
        for link in &self.view(view).links {
            if Some(link.view) == parent {
                continue;
            }
            let shared = shared && link.shared_history;
            out.push((link.view, shared));
            self.collect_linked(link.view, Some(view), shared, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerConfig;
    use crate::position::Position;

    fn pos(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    #[test]
    fn edits_reach_every_linked_view() {
        let mut doc = Document::new("abc\ndef");
        let b = doc.link_view(ViewId::PRIMARY, false).unwrap();
        let c = doc.link_view(b, false).unwrap();
        doc.replace_range("X", pos(0, 1), pos(0, 2), None).unwrap();
        assert_eq!(doc.view_mut(c).unwrap().text(), "aXc\ndef");
        doc.view_mut(c).unwrap().replace_range("!", pos(1, 3), pos(1, 3), None).unwrap();
        assert_eq!(doc.text(), "aXc\ndef!");
        assert_eq!(doc.view_mut(b).unwrap().text(), "aXc\ndef!");
        assert_eq!(doc.linked_views(ViewId::PRIMARY), Ok(vec![b, c]));
        assert_eq!(doc.view_count(), 3);
    }

    #[test]
    fn shared_history_undoes_across_views() {
        let mut doc = Document::new("abc");
        let b = doc.link_view(ViewId::PRIMARY, true).unwrap();
        doc.replace_range("X", pos(0, 0), pos(0, 0), None).unwrap();
        assert_eq!(doc.view_mut(b).unwrap().history_size().undo, 1);
        assert_eq!(doc.view_mut(b).unwrap().undo(), Ok(true));
        assert_eq!(doc.text(), "abc");
        assert_eq!(doc.view_mut(b).unwrap().text(), "abc");
    }

    #[test]
    fn separate_history_is_rebased_over_foreign_edits() {
        let mut doc = Document::new("abc\ndef");
        let b = doc.link_view(ViewId::PRIMARY, false).unwrap();
        doc.replace_range("X", pos(1, 0), pos(1, 0), None).unwrap();
        doc.view_mut(b).unwrap().replace_range("new\n", pos(0, 0), pos(0, 0), None).unwrap();
        assert_eq!(doc.text(), "new\nabc\nXdef");
        assert_eq!(doc.history_size().undo, 1);

        doc.undo().unwrap();
        assert_eq!(doc.text(), "new\nabc\ndef");
        assert_eq!(doc.view_mut(b).unwrap().text(), "new\nabc\ndef");
        doc.view_mut(b).unwrap().undo().unwrap();
        assert_eq!(doc.text(), "abc\ndef");
    }

    #[test]
    fn overlapping_foreign_edit_invalidates_history() {
        let mut doc = Document::new("abc\ndef");
        let b = doc.link_view(ViewId::PRIMARY, false).unwrap();
        doc.replace_range("X", pos(1, 0), pos(1, 0), None).unwrap();
        doc.view_mut(b).unwrap().replace_range("", pos(1, 0), pos(1, 2), None).unwrap();
        assert_eq!(doc.history_size().undo, 0);
        assert_eq!(doc.undo(), Ok(false));
    }

    #[test]
    fn unlinking_stops_propagation_and_splits_history() {
        let mut doc = Document::new("abc");
        let b = doc.link_view(ViewId::PRIMARY, true).unwrap();
        doc.replace_range("X", pos(0, 0), pos(0, 0), None).unwrap();
        assert_eq!(doc.unlink_view(ViewId::PRIMARY, b), Ok(true));
        assert_eq!(doc.unlink_view(ViewId::PRIMARY, b), Ok(false));
        assert!(doc.linked_views(b).unwrap().is_empty());

        doc.view_mut(b).unwrap().undo().unwrap();
        assert_eq!(doc.view_mut(b).unwrap().text(), "abc");
        assert_eq!(doc.text(), "Xabc");
        assert_eq!(doc.history_size().undo, 1);
        doc.undo().unwrap();
        assert_eq!(doc.text(), "abc");
    }

    #[test]
    fn markers_are_per_view() {
        let mut doc = Document::new("abcdef");
        let b = doc.link_view(ViewId::PRIMARY, false).unwrap();
        let handle = doc.mark_range(pos(0, 1), pos(0, 3), MarkerConfig::default()).unwrap();
        assert!(doc.view_mut(b).unwrap().all_marks().is_empty());
        doc.view_mut(b).unwrap().replace_range("__", pos(0, 0), pos(0, 0), None).unwrap();
        assert_eq!(doc.find_marker(handle), Some((pos(0, 3), pos(0, 5))));
    }

    #[test]
    fn unknown_views_are_rejected() {
        let mut doc = Document::new("");
        assert_eq!(doc.link_view(ViewId(3), false), Err(EditError::UnknownView(ViewId(3))));
        assert_eq!(
            doc.unlink_view(ViewId::PRIMARY, ViewId(3)),
            Err(EditError::UnknownView(ViewId(3)))
        );
    }
}
