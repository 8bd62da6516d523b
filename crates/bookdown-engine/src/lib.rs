//! Core document model, parser, and editing engine for Bookdown markup.
//!
//! The crate has three layers:
//!
//! - [`nodes`]: the immutable chapter tree, closed node categories with
//!   structural sharing, identity-based addressing, and `to_text` /
//!   `to_bookdown` serialization.
//! - [`parsing`]: the recursive-descent Bookdown parser with symbol
//!   substitution and error-marker recovery.
//! - [`editing`]: pure caret-addressed edit operations plus the `Editor`
//!   session with snapshot-based undo/redo and clipboard transfer.
//!
//! Markup goes in through [`parse_chapter`], edits produce new trees that
//! share untouched subtrees with their predecessors, and
//! [`nodes::ChapterNode::to_bookdown`] regenerates markup for whatever
//! persistence layer sits outside.

pub mod editing;
pub mod nodes;
pub mod parsing;

// Re-export key types for easier usage
pub use editing::{
    adjacent_caret, copy_range, insert_text, paste, sort_range, split_selection, word_boundary,
    with_list_item_indented, with_list_item_unindented, with_lists_as_paragraphs,
    with_paragraphs_as_lists, with_range_formatted, with_rule_inserted, with_segment_at_selection,
    with_table_column_inserted, with_table_column_removed, with_table_row_inserted,
    with_table_row_removed, without_adjacent_content, without_range, Caret, CaretRange, Command,
    Edit, EditError, Editor, Patch,
};
pub use nodes::{
    chapter::footnote_symbol, AtomNode, BlockNode, ChapterNode, CitationsNode, CodeNode,
    CommentNode, DefinitionNode, EmbedNode, ErrorNode, FootnoteNode, FormatNode, FormatTag,
    InlineCodeNode, LabelNode, LinkNode, ListItem, ListNode, NodeId, NodeRef, ParagraphNode,
    Position, RuleNode, Segment, TableNode, TextNode,
};
pub use parsing::{
    parse_chapter, parse_chapter_bytes, parse_embed, parse_format, parse_reference, ParseContext,
};
