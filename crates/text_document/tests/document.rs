use std::cell::RefCell;
use std::rc::Rc;
use text_document::{
    Direction, Document, DocumentBuilder, DocumentOptions, EditError, MarkerConfig, Position, Range, Selection,
    SelectionOptions, ViewId,
};

fn pos(line: usize, column: usize) -> Position {
    Position::new(line, column)
}

fn lines(doc: &Document) -> Vec<String> {
    (0..doc.line_count())
        .map(|i| doc.line_text(i).unwrap().to_string())
        .collect()
}

#[test]
fn inserting_two_lines_splits_the_first() {
    let mut doc = Document::new("abc\ndef");
    doc.apply_change(pos(0, 1), pos(0, 1), vec!["X".into(), "Y".into()], None)
        .unwrap();
    assert_eq!(lines(&doc), vec!["aX", "Ybc", "def"]);
}

#[test]
fn cursor_moving_right_steps_over_atomic_marker() {
    let mut doc = Document::new("abc\ndef");
    doc.mark_range(
        pos(0, 1),
        pos(0, 2),
        MarkerConfig {
            atomic: true,
            ..MarkerConfig::default()
        },
    )
    .unwrap();
    doc.set_cursor(pos(0, 0), SelectionOptions::default());
    doc.set_cursor(pos(0, 1), SelectionOptions::default());
    assert_eq!(doc.selection(), &Selection::cursor(pos(0, 2)));
}

#[test]
fn inclusive_left_atomic_marker_sends_cursor_back_to_its_outer_edge() {
    let mut doc = Document::new("abcdef");
    doc.mark_range(
        pos(0, 1),
        pos(0, 2),
        MarkerConfig {
            atomic: true,
            inclusive_left: true,
            ..MarkerConfig::default()
        },
    )
    .unwrap();
    doc.set_cursor(pos(0, 0), SelectionOptions::default());
    doc.set_cursor(pos(0, 1), SelectionOptions::default());
    assert_eq!(doc.selection(), &Selection::cursor(pos(0, 2)));

    doc.set_cursor(pos(0, 1), SelectionOptions::default());
    assert_eq!(doc.selection(), &Selection::cursor(pos(0, 0)));
}

#[test]
fn listeners_fire_once_per_operation_with_final_state() {
    let mut doc = Document::new("abc\ndef");
    let log = Rc::new(RefCell::new(Vec::new()));

    let sink = log.clone();
    doc.on_change(move |doc, event| {
        sink.borrow_mut()
            .push(format!("change {} {:?}", event.changes.len(), doc.text()));
        Ok(())
    });
    let sink = log.clone();
    doc.on_selection_change(move |_, event| {
        sink.borrow_mut()
            .push(format!("selection {}", event.selection.primary().head));
        Ok(())
    });

    {
        let mut op = doc.operation();
        op.replace_range("X", pos(0, 0), pos(0, 0), None).unwrap();
        op.set_cursor(pos(1, 1), SelectionOptions::default());
        op.replace_range("Y", pos(1, 0), pos(1, 0), None).unwrap();
        assert!(log.borrow().is_empty());
    }

    assert_eq!(
        *log.borrow(),
        vec![
            "change 2 \"Xabc\\nYdef\"".to_string(),
            "selection 1:2".to_string(),
        ]
    );
    // one operation, one history event
    assert_eq!(doc.history_size().undo, 1);
}

#[test]
fn deferred_callbacks_run_after_listeners_and_notify_in_turn() {
    let mut doc = Document::new("abc");
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    doc.on_change(move |doc, _| {
        sink.borrow_mut().push(doc.text());
        Ok(())
    });

    doc.run(|doc| {
        doc.replace_range("1", pos(0, 0), pos(0, 0), None).unwrap();
        doc.defer(|doc| {
            doc.replace_range("2", pos(0, 0), pos(0, 0), None).unwrap();
        });
    });

    assert_eq!(*log.borrow(), vec!["1abc".to_string(), "21abc".to_string()]);
}

#[test]
fn failing_listener_does_not_stop_the_others() {
    let mut doc = Document::new("abc");
    let calls = Rc::new(RefCell::new(0));
    doc.on_change(|_, _| Err("boom".into()));
    let sink = calls.clone();
    doc.on_change(move |_, _| {
        *sink.borrow_mut() += 1;
        Ok(())
    });
    doc.replace_range("x", pos(0, 0), pos(0, 0), None).unwrap();
    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn removed_listener_is_not_called() {
    let mut doc = Document::new("abc");
    let calls = Rc::new(RefCell::new(0));
    let sink = calls.clone();
    let id = doc.on_change(move |_, _| {
        *sink.borrow_mut() += 1;
        Ok(())
    });
    assert!(doc.off(id));
    assert!(!doc.off(id));
    doc.replace_range("x", pos(0, 0), pos(0, 0), None).unwrap();
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn rejected_change_leaves_document_untouched() {
    let mut doc = Document::new("abc\ndef");
    let calls = Rc::new(RefCell::new(0));
    let sink = calls.clone();
    doc.on_change(move |_, _| {
        *sink.borrow_mut() += 1;
        Ok(())
    });
    assert_eq!(
        doc.apply_change(pos(1, 0), pos(4, 0), vec![String::new()], None),
        Err(EditError::OutOfRange { line: 4, column: 0 })
    );
    assert_eq!(doc.text(), "abc\ndef");
    assert_eq!(*calls.borrow(), 0);
}

#[test]
fn multi_cursor_typing_undoes_as_one_step() {
    let mut doc = Document::new("one\ntwo\nthree");
    doc.set_selections(
        vec![
            Range::cursor(pos(0, 3)),
            Range::cursor(pos(1, 3)),
            Range::cursor(pos(2, 5)),
        ],
        0,
        SelectionOptions::default(),
    )
    .unwrap();
    doc.replace_selection(";", None).unwrap();
    doc.replace_selection(";", None).unwrap();
    assert_eq!(doc.text(), "one;;\ntwo;;\nthree;;");
    assert_eq!(doc.history_size().undo, 1);
    doc.undo().unwrap();
    assert_eq!(doc.text(), "one\ntwo\nthree");
    let heads: Vec<Position> = doc.selection().ranges().iter().map(|range| range.head).collect();
    assert_eq!(heads, vec![pos(0, 3), pos(1, 3), pos(2, 5)]);
}

#[test]
fn linked_view_edits_through_view_mut() {
    let mut doc = Document::new("shared text");
    let other = doc.link_view(ViewId::PRIMARY, false).unwrap();
    {
        let mut view = doc.view_mut(other).unwrap();
        view.set_cursor(pos(0, 6), SelectionOptions::default());
        view.replace_selection("plain ", None).unwrap();
        assert_eq!(view.selection().primary().head, pos(0, 12));
    }
    assert_eq!(doc.text(), "shared plain text");
    assert_eq!(doc.history_size().undo, 0);
    assert_eq!(doc.view_mut(other).unwrap().history_size().undo, 1);
}

#[test]
fn explicit_backward_bias_is_honoured_at_document_start() {
    let mut doc = Document::new("abcdef");
    doc.mark_range(
        pos(0, 0),
        pos(0, 2),
        MarkerConfig {
            atomic: true,
            ..MarkerConfig::default()
        },
    )
    .unwrap();
    doc.set_cursor(
        pos(0, 1),
        SelectionOptions {
            bias: Some(Direction::Backward),
            ..SelectionOptions::default()
        },
    );
    assert_eq!(doc.selection().primary().head, pos(0, 0));
}

#[test]
fn builder_and_options_produce_equivalent_documents() {
    let options = DocumentOptions::from_lookup(|key| match key {
        "DOC_UNDO_DEPTH" => Some("1".to_string()),
        _ => None,
    });
    let mut builder = DocumentBuilder::with_options(options);
    builder.accept_chunk("line one\r");
    builder.accept_chunk("\nline two");
    let mut doc = builder.finish();
    assert_eq!(doc.text(), "line one\nline two");

    doc.replace_range("a", pos(0, 0), pos(0, 0), None).unwrap();
    doc.replace_range("b", pos(0, 0), pos(0, 0), None).unwrap();
    assert_eq!(doc.history_size().undo, 1);
}

#[test]
fn partially_overlapping_collapsed_marker_is_rejected() {
    let mut doc = Document::new("one two three");
    let collapsed = MarkerConfig {
        collapsed: true,
        ..MarkerConfig::default()
    };
    let first = doc.mark_range(pos(0, 0), pos(0, 7), collapsed.clone()).unwrap();
    assert_eq!(
        doc.mark_range(pos(0, 4), pos(0, 13), collapsed.clone()),
        Err(EditError::ConflictingCollapse)
    );
    assert_eq!(doc.all_marks(), vec![first]);

    doc.mark_range(pos(0, 4), pos(0, 7), collapsed).unwrap();
    assert_eq!(doc.all_marks().len(), 2);
}

#[test]
fn inescapable_atomic_marker_blocks_edits_until_cleared() {
    let mut doc = Document::new("locked\ntext");
    let handle = doc
        .mark_range(
            pos(0, 0),
            pos(1, 4),
            MarkerConfig {
                atomic: true,
                inclusive_left: true,
                inclusive_right: true,
                ..MarkerConfig::default()
            },
        )
        .unwrap();
    assert!(doc.is_cant_edit());
    assert_eq!(
        doc.apply_change(pos(0, 0), pos(0, 1), vec!["L".into()], None),
        Err(EditError::CantEdit)
    );
    assert_eq!(doc.replace_selection("x", None), Err(EditError::CantEdit));
    assert_eq!(doc.text(), "locked\ntext");

    assert!(doc.clear_marker(handle));
    assert!(!doc.is_cant_edit());
    doc.apply_change(pos(0, 0), pos(0, 1), vec!["L".into()], None)
        .unwrap();
    assert_eq!(doc.text(), "Locked\ntext");
}

#[test]
fn read_only_marker_splits_a_change_around_itself() {
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

    let applied = doc.replace_range("X", pos(0, 1), pos(0, 7), None).unwrap();
    assert_eq!(applied.changes.len(), 2);
    assert_eq!(doc.text(), "aXdeh");

    // entirely inside the protected range: nothing happens
    let applied = doc.replace_range("Y", pos(0, 3), pos(0, 3), None).unwrap();
    assert!(applied.is_empty());
    assert_eq!(doc.text(), "aXdeh");

    assert!(doc.undo().unwrap());
    assert_eq!(doc.text(), "abcdefgh");
}

#[test]
fn dirty_lines_are_reported_in_final_coordinates() {
    let text: Vec<String> = (0..20).map(|n| format!("line {n}")).collect();
    let mut doc = Document::new(&text.join("\n"));
    let dirty = Rc::new(RefCell::new(None));
    let sink = dirty.clone();
    doc.on_change(move |_, event| {
        *sink.borrow_mut() = event.dirty.clone();
        Ok(())
    });

    {
        let mut op = doc.operation();
        op.replace_range("X", pos(10, 0), pos(10, 0), None).unwrap();
        op.replace_range("a\nb\nc\nd\ne\n", pos(0, 0), pos(0, 0), None)
            .unwrap();
    }

    assert_eq!(doc.line_text(15), Ok("Xline 10"));
    let dirty = dirty.borrow().clone().unwrap();
    assert!(dirty.contains(&15));
    assert_eq!(dirty, 0..16);
}
