//! End-to-end editing behavior: deletions, merges, splits, conversions,
//! table edits, clipboard, and undo integrity.

use bookdown_engine::{
    parse_chapter, paste, split_selection, with_list_item_indented, with_list_item_unindented,
    with_lists_as_paragraphs, with_paragraphs_as_lists, with_range_formatted, with_rule_inserted,
    with_segment_at_selection, with_table_column_removed, with_table_row_inserted,
    without_adjacent_content, without_range, AtomNode, Caret, CaretRange, ChapterNode, Command,
    EditError, Editor, FootnoteNode, FormatNode, FormatTag, ParseContext,
};

#[path = "support/mod.rs"]
mod support;

use support::find_text;

fn parse(text: &str) -> ChapterNode {
    parse_chapter(&ParseContext::new(), text)
}

fn caret(chapter: &ChapterNode, text: &str, index: usize) -> Caret {
    Caret::new(find_text(chapter, text).unwrap(), index)
}

// ===== Range deletion =====

#[test]
fn cross_paragraph_deletion_merges() {
    let chapter = parse("First paragraph.\n\nLast paragraph.");
    let range = CaretRange::new(
        caret(&chapter, "First paragraph.", 6),
        caret(&chapter, "Last paragraph.", 5),
    );
    let edit = without_range(&chapter, range).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\nFirst paragraph.");
    assert!(edit.range.is_collapsed());
}

#[test]
fn deletion_across_list_items_merges_them() {
    let chapter = parse("* alpha\n* beta\n* gamma");
    let range = CaretRange::new(caret(&chapter, "alpha", 3), caret(&chapter, "gamma", 3));
    let edit = without_range(&chapter, range).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n* alpma");
}

#[test]
fn deletion_inside_one_text_node_trims_it() {
    let chapter = parse("hello world");
    let target = find_text(&chapter, "hello world").unwrap();
    let range = CaretRange::new(Caret::new(target, 5), Caret::new(target, 11));
    let edit = without_range(&chapter, range).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\nhello");
    // The trimmed node keeps its identity, so the caret survives untouched.
    assert_eq!(edit.range.start, Caret::new(target, 5));
}

#[test]
fn deletion_swallows_interior_blocks() {
    let chapter = parse("one two\n\n-\n\nthree four");
    let range = CaretRange::new(caret(&chapter, "one two", 4), caret(&chapter, "three four", 6));
    let edit = without_range(&chapter, range).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\none four");
}

#[test]
fn deleting_all_content_leaves_an_addressable_tree() {
    let chapter = parse("only");
    let target = find_text(&chapter, "only").unwrap();
    let edit = without_range(
        &chapter,
        CaretRange::new(Caret::new(target, 0), Caret::new(target, 4)),
    )
    .unwrap();
    assert_eq!(edit.root.to_text(), "");
    // The caret still addresses something.
    assert!(edit.root.find(edit.range.start.node).is_some());
}

// ===== Backspace / forward delete adjacency =====

#[test]
fn backspace_merges_paragraph_into_previous_list_item() {
    let chapter = parse("* item one\n* item two\n\ntrailing");
    let edit =
        without_adjacent_content(&chapter, caret(&chapter, "trailing", 0), false).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n* item one\n* item twotrailing");
}

#[test]
fn forward_delete_does_not_pull_a_list_into_a_paragraph() {
    let chapter = parse("leading\n\n* item");
    let result = without_adjacent_content(&chapter, caret(&chapter, "leading", 7), true);
    assert_eq!(result.err(), Some(EditError::NotApplicable));
}

#[test]
fn forward_delete_merges_following_paragraph() {
    let chapter = parse("one\n\ntwo");
    let edit = without_adjacent_content(&chapter, caret(&chapter, "one", 3), true).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\nonetwo");
}

#[test]
fn backspace_over_a_rule_removes_it() {
    let chapter = parse("before\n\n-\n\nafter");
    let edit = without_adjacent_content(&chapter, caret(&chapter, "after", 0), false).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\nbefore\n\nafter");
}

#[test]
fn backspace_at_list_item_start_merges_backwards() {
    // Flat items.
    let chapter = parse("* one\n* two");
    let edit = without_adjacent_content(&chapter, caret(&chapter, "two", 0), false).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n* onetwo");

    // Into a previous sublist's last item.
    let chapter = parse("* top\n** deep\n* next");
    let edit = without_adjacent_content(&chapter, caret(&chapter, "next", 0), false).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n* top\n** deepnext");
}

#[test]
fn backspace_merges_paragraph_into_quote() {
    let chapter = parse("\"\nInner text.\n\" Credit\n\ntail");
    let edit = without_adjacent_content(&chapter, caret(&chapter, "tail", 0), false).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n\"\nInner text.tail\n\" Credit");
}

// ===== Formatting =====

#[test]
fn formatting_wraps_and_toggles() {
    let chapter = parse("hello world");
    let target = find_text(&chapter, "hello world").unwrap();
    let range = CaretRange::new(Caret::new(target, 6), Caret::new(target, 11));
    let edit = with_range_formatted(&chapter, range, Some(FormatTag::Bold)).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\nhello *world*");

    // Applying the same tag over the same span removes it.
    let edit2 = with_range_formatted(&edit.root, edit.range, Some(FormatTag::Bold)).unwrap();
    assert_eq!(edit2.root.to_bookdown(), "\n\nhello world");
}

#[test]
fn formatting_spans_blocks() {
    let chapter = parse("one two\n\nthree four");
    let range = CaretRange::new(caret(&chapter, "one two", 4), caret(&chapter, "three four", 5));
    let edit = with_range_formatted(&chapter, range, Some(FormatTag::Italic)).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\none _two_\n\n_three_ four");
}

// ===== Splits =====

#[test]
fn splitting_a_paragraph() {
    let chapter = parse("onetwo");
    let edit = split_selection(
        &chapter,
        CaretRange::collapsed(caret(&chapter, "onetwo", 3)),
    )
    .unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\none\n\ntwo");
}

#[test]
fn splitting_a_header_leaves_a_plain_second_half() {
    let chapter = parse("# HeadTail");
    let edit = split_selection(
        &chapter,
        CaretRange::collapsed(caret(&chapter, "HeadTail", 4)),
    )
    .unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n# Head\n\nTail");
}

#[test]
fn splitting_a_list_item() {
    let chapter = parse("* onetwo\n* three");
    let edit = split_selection(
        &chapter,
        CaretRange::collapsed(caret(&chapter, "onetwo", 3)),
    )
    .unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n* one\n* two\n* three");
}

#[test]
fn split_with_selection_deletes_it_first() {
    let chapter = parse("one MIDDLE two");
    let target = find_text(&chapter, "one MIDDLE two").unwrap();
    let edit = split_selection(
        &chapter,
        CaretRange::new(Caret::new(target, 4), Caret::new(target, 11)),
    )
    .unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\none \n\ntwo");
}

// ===== Atom insertion =====

#[test]
fn selection_becomes_a_footnote() {
    let chapter = parse("plain noted text");
    let target = find_text(&chapter, "plain noted text").unwrap();
    let range = CaretRange::new(Caret::new(target, 6), Caret::new(target, 11));
    let edit = with_segment_at_selection(&chapter, range, |selected| {
        AtomNode::Footnote(FootnoteNode::new(FormatNode::from_text(selected)))
    })
    .unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\nplain {noted} text");
    assert_eq!(edit.root.footnotes().len(), 1);
}

// ===== Lists =====

#[test]
fn indent_then_unindent_restores_serialization() {
    let chapter = parse("* one\n* two\n* three");
    let original = chapter.to_bookdown();
    let target = caret(&chapter, "two", 0);
    let indented = with_list_item_indented(&chapter, target).unwrap();
    assert_eq!(indented.root.to_bookdown(), "\n\n* one\n** two\n* three");
    let restored = with_list_item_unindented(&indented.root, target).unwrap();
    assert_eq!(restored.root.to_bookdown(), original);
}

#[test]
fn indent_is_limited_by_the_previous_item() {
    let chapter = parse("* one\n* two");
    let first = caret(&chapter, "one", 0);
    assert_eq!(
        with_list_item_indented(&chapter, first).err(),
        Some(EditError::NotApplicable)
    );
    let second = caret(&chapter, "two", 0);
    let once = with_list_item_indented(&chapter, second).unwrap();
    // Already one deeper than its predecessor; a second indent has no room.
    assert_eq!(
        with_list_item_indented(&once.root, second).err(),
        Some(EditError::NotApplicable)
    );
}

#[test]
fn paragraphs_become_one_list_and_back() {
    let chapter = parse("alpha\n\nbeta\n\ngamma");
    let range = CaretRange::new(caret(&chapter, "alpha", 0), caret(&chapter, "gamma", 5));
    let edit = with_paragraphs_as_lists(&chapter, range, true).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n1. alpha\n2. beta\n3. gamma");

    let back = with_lists_as_paragraphs(&edit.root, edit.range).unwrap();
    assert_eq!(back.root.to_bookdown(), "\n\nalpha\n\nbeta\n\ngamma");
}

#[test]
fn non_contiguous_paragraphs_become_separate_lists() {
    let chapter = parse("alpha\n\n-\n\nbeta");
    let range = CaretRange::new(caret(&chapter, "alpha", 0), caret(&chapter, "beta", 4));
    let edit = with_paragraphs_as_lists(&chapter, range, false).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n* alpha\n\n-\n\n* beta");
}

// ===== Block insertion =====

#[test]
fn rule_insertion_before_the_first_paragraph() {
    let chapter = parse("First paragraph.\n\nLast paragraph.");
    let edit = with_rule_inserted(&chapter, caret(&chapter, "First paragraph.", 0), true).unwrap();
    assert_eq!(
        edit.root.to_bookdown(),
        "\n\n-\n\nFirst paragraph.\n\nLast paragraph."
    );
}

// ===== Tables =====

#[test]
fn table_row_insertion_and_column_removal() {
    let chapter = parse(",a|b\n,c|d");
    let table = match &*chapter.blocks()[0] {
        bookdown_engine::BlockNode::Table(t) => t.id(),
        other => panic!("expected table, got {other:?}"),
    };
    let edit = with_table_row_inserted(&chapter, table, 1).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n,a|b\n,|\n,c|d");

    let edit = with_table_column_removed(&edit.root, table, 0).unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\n,b\n,\n,d");
}

#[test]
fn table_bounds_are_checked() {
    let chapter = parse(",a|b");
    let table = chapter.blocks()[0].id();
    assert_eq!(
        with_table_row_inserted(&chapter, table, 5).err(),
        Some(EditError::OutOfBounds)
    );
}

// ===== Clipboard =====

#[test]
fn paste_splices_a_single_paragraph_inline() {
    let chapter = parse("start end");
    let target = caret(&chapter, "start end", 6);
    let edit = paste(
        &chapter,
        CaretRange::collapsed(target),
        "\n\nmiddle ",
        &ParseContext::new(),
    )
    .unwrap();
    assert_eq!(edit.root.to_bookdown(), "\n\nstart middle end");
}

#[test]
fn paste_of_blocks_splits_the_paragraph() {
    let chapter = parse("start end");
    let target = caret(&chapter, "start end", 6);
    let edit = paste(
        &chapter,
        CaretRange::collapsed(target),
        "\n\nmiddle one\n\nmiddle two",
        &ParseContext::new(),
    )
    .unwrap();
    assert_eq!(
        edit.root.to_bookdown(),
        "\n\nstart \n\nmiddle one\n\nmiddle two\n\nend"
    );
}

#[test]
fn cut_and_paste_round_trip_through_the_editor() {
    let mut ed = Editor::from_markup(ParseContext::new(), "keep MOVE tail");
    let chapter = ed.chapter().clone();
    let target = find_text(&chapter, "keep MOVE tail").unwrap();
    ed.set_selection(CaretRange::new(Caret::new(target, 5), Caret::new(target, 10)))
        .unwrap();
    let cut = ed.cut().unwrap();
    assert_eq!(cut, "\n\nMOVE ");
    assert_eq!(ed.to_bookdown(), "\n\nkeep tail");
}

// ===== Undo integrity =====

#[test]
fn n_edits_then_n_undos_restore_the_original() {
    let mut ed = Editor::from_markup(ParseContext::new(), "base text");
    let original = ed.to_bookdown();
    for text in ["one ", "two ", "three "] {
        ed.apply(Command::InsertText {
            text: text.to_string(),
        })
        .unwrap();
    }
    assert_ne!(ed.to_bookdown(), original);
    for _ in 0..3 {
        ed.undo().unwrap();
    }
    assert_eq!(ed.to_bookdown(), original);
}

#[test]
fn structural_commands_flow_through_the_editor() {
    let mut ed = Editor::from_markup(ParseContext::new(), "alpha\n\nbeta");
    let chapter = ed.chapter().clone();
    let range = CaretRange::new(caret(&chapter, "alpha", 0), caret(&chapter, "beta", 4));
    ed.set_selection(range).unwrap();
    ed.apply(Command::ToggleList { numbered: false }).unwrap();
    assert_eq!(ed.to_bookdown(), "\n\n* alpha\n* beta");
    ed.undo().unwrap();
    assert_eq!(ed.to_bookdown(), "\n\nalpha\n\nbeta");
}
