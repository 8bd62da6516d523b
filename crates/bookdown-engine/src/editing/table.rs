//! Bounds-checked table row and column edits.

use std::sync::Arc;

use crate::editing::caret::Caret;
use crate::editing::range::caret_or_placeholder;
use crate::editing::{Edit, EditError};
use crate::nodes::{flat_offset, BlockNode, ChapterNode, NodeId, NodeRef, NodeValue, TableNode};

fn find_table(chapter: &ChapterNode, table: NodeId) -> Result<TableNode, EditError> {
    match chapter.find(table) {
        Some(NodeRef::Block(BlockNode::Table(t))) => Ok(t.clone()),
        Some(_) => Err(EditError::InvalidSelection),
        None => Err(EditError::UnknownNode),
    }
}

fn replace_table(
    chapter: &ChapterNode,
    table: NodeId,
    rebuilt: TableNode,
    caret: Caret,
) -> Result<Edit, EditError> {
    let root = chapter
        .with_node_replaced(
            table,
            Some(NodeValue::Block(Arc::new(BlockNode::Table(rebuilt)))),
        )
        .ok_or(EditError::UnknownNode)?;
    Ok(Edit::collapsed(root, caret))
}

/// Remove a whole table, leaving the caret where it stood.
fn remove_table(chapter: &ChapterNode, table: &TableNode) -> Result<Edit, EditError> {
    let anchor = table
        .cell(0, 0)
        .map(|c| c.first_caret())
        .ok_or(EditError::OutOfBounds)?;
    let offset =
        flat_offset(chapter.as_node(), anchor.0, anchor.1).ok_or(EditError::UnknownNode)?;
    let root = chapter
        .with_node_replaced(table.id(), None)
        .ok_or(EditError::UnknownNode)?;
    let (root, caret) = caret_or_placeholder(root, offset);
    Ok(Edit::collapsed(root, caret))
}

/// Insert an empty row before `index` (`index == row_count` appends); the
/// caret lands in the new row's first cell.
pub fn with_table_row_inserted(
    chapter: &ChapterNode,
    table: NodeId,
    index: usize,
) -> Result<Edit, EditError> {
    let t = find_table(chapter, table)?;
    let rebuilt = t.with_row_inserted(index).ok_or(EditError::OutOfBounds)?;
    let (node, caret_index) = rebuilt
        .cell(index, 0)
        .map(|c| c.first_caret())
        .ok_or(EditError::OutOfBounds)?;
    replace_table(chapter, table, rebuilt, Caret::new(node, caret_index))
}

/// Remove the row at `index`; removing the last row removes the table.
pub fn with_table_row_removed(
    chapter: &ChapterNode,
    table: NodeId,
    index: usize,
) -> Result<Edit, EditError> {
    let t = find_table(chapter, table)?;
    if index >= t.row_count() {
        return Err(EditError::OutOfBounds);
    }
    if t.row_count() == 1 {
        return remove_table(chapter, &t);
    }
    let rebuilt = t.with_row_removed(index).ok_or(EditError::OutOfBounds)?;
    let row = index.min(rebuilt.row_count() - 1);
    let (node, caret_index) = rebuilt
        .cell(row, 0)
        .map(|c| c.first_caret())
        .ok_or(EditError::OutOfBounds)?;
    replace_table(chapter, table, rebuilt, Caret::new(node, caret_index))
}

/// Insert an empty column before `index` (`index == column_count` appends);
/// the caret lands in the first row of the new column.
pub fn with_table_column_inserted(
    chapter: &ChapterNode,
    table: NodeId,
    index: usize,
) -> Result<Edit, EditError> {
    let t = find_table(chapter, table)?;
    let rebuilt = t.with_column_inserted(index).ok_or(EditError::OutOfBounds)?;
    let (node, caret_index) = rebuilt
        .cell(0, index)
        .map(|c| c.first_caret())
        .ok_or(EditError::OutOfBounds)?;
    replace_table(chapter, table, rebuilt, Caret::new(node, caret_index))
}

/// Remove the column at `index`; removing the last column removes the table.
pub fn with_table_column_removed(
    chapter: &ChapterNode,
    table: NodeId,
    index: usize,
) -> Result<Edit, EditError> {
    let t = find_table(chapter, table)?;
    if index >= t.column_count() {
        return Err(EditError::OutOfBounds);
    }
    if t.column_count() == 1 {
        return remove_table(chapter, &t);
    }
    let rebuilt = t.with_column_removed(index).ok_or(EditError::OutOfBounds)?;
    let column = index.min(rebuilt.column_count() - 1);
    let (node, caret_index) = rebuilt
        .cell(0, column)
        .map(|c| c.first_caret())
        .ok_or(EditError::OutOfBounds)?;
    replace_table(chapter, table, rebuilt, Caret::new(node, caret_index))
}
