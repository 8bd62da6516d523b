//! # Editing Engine
//!
//! Every operation here is a pure function `(chapter, range, params) ->
//! Result<Edit, EditError>`: it either returns a fully consistent new tree
//! with a repaired caret range, or a typed failure that callers treat as
//! "command not applicable". Partial mutation is never observable: the old
//! tree is untouched either way, and a new root supersedes it atomically at
//! the call site.
//!
//! ## Module Structure
//!
//! - **`caret`**: caret/range addressing: document-order position lists,
//!   range sorting, adjacency (atoms as single stops), word boundaries
//! - **`range`**: range formatting and deletion, single-character
//!   backspace/delete with the block-adjacency rules, text insertion, atom
//!   insertion at a selection
//! - **`structure`**: block splits, list indent/unindent,
//!   paragraph↔list conversion, rule insertion
//! - **`table`**: bounds-checked row/column insertion and removal
//! - **`clipboard`**: range copy (projection to a self-contained fragment)
//!   and paste of serialized fragments
//! - **`session`**: the `Editor` shell: command dispatch, linear
//!   snapshot-based undo/redo, and the in-memory clipboard fallback
//!
//! Caret repair across rebuilds uses flat-unit offsets (one unit per char,
//! one per atom): an operation records the global offset of its edit site,
//! rebuilds the spine, and re-derives the caret in the new tree at the same
//! offset. Carets are never carried across trees by node reference alone.

pub mod caret;
pub mod clipboard;
pub mod range;
pub mod session;
pub mod structure;
pub mod table;

pub use caret::{adjacent_caret, sort_range, word_boundary, Caret, CaretRange};
pub use clipboard::{copy_range, paste};
pub use range::{
    insert_text, with_range_formatted, with_segment_at_selection, without_adjacent_content,
    without_range,
};
pub use session::{Command, Editor, Patch};
pub use structure::{
    split_selection, with_list_item_indented, with_list_item_unindented, with_lists_as_paragraphs,
    with_paragraphs_as_lists, with_rule_inserted,
};
pub use table::{
    with_table_column_inserted, with_table_column_removed, with_table_row_inserted,
    with_table_row_removed,
};

use crate::nodes::ChapterNode;
use thiserror::Error;

/// A successful edit: the new root plus the caret range within it.
#[derive(Debug, Clone)]
pub struct Edit {
    pub root: ChapterNode,
    pub range: CaretRange,
}

impl Edit {
    pub(crate) fn collapsed(root: ChapterNode, caret: Caret) -> Self {
        Self {
            root,
            range: CaretRange::collapsed(caret),
        }
    }
}

/// Why an edit was not applicable. The prior tree is always left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("caret references a node outside the document")]
    UnknownNode,
    #[error("caret index is out of range for its node")]
    IndexOutOfRange,
    #[error("the selection does not support this operation")]
    InvalidSelection,
    #[error("row or column index out of bounds")]
    OutOfBounds,
    #[error("the command is not applicable at this position")]
    NotApplicable,
    #[error("no selection to operate on")]
    NoSelection,
}
