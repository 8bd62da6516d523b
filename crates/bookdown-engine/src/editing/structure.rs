//! Structural block operations: splits, list indentation, paragraph↔list
//! conversion, and rule insertion.
//!
//! List depth changes work on the flattened `(depth, item)` form and
//! rebuild, which collapses emptied sublists automatically and reuses leaf
//! formats by reference, so carets into items survive every reshuffle and an
//! indent followed by an unindent restores the original serialization
//! exactly.

use std::sync::Arc;

use crate::editing::caret::{resolve_to_stop, Caret, CaretRange};
use crate::editing::range::{
    container_with_blocks, enclosing_list, locate_block, sorted_pair, without_range,
};
use crate::editing::{insert_text, Edit, EditError};
use crate::nodes::{
    BlockNode, ChapterNode, ListNode, NodeValue, ParagraphNode, RuleNode,
};

/// Split the enclosing paragraph or list item at the caret, deleting any
/// selected span first. In a code body a split inserts a newline.
pub fn split_selection(chapter: &ChapterNode, range: CaretRange) -> Result<Edit, EditError> {
    let deleted = without_range(chapter, range)?;
    let chapter = deleted.root;
    let caret = deleted.range.start;

    let location = locate_block(&chapter, caret.node).ok_or(EditError::InvalidSelection)?;
    let container = location.container;
    let index = location.index;
    let block = location.blocks[index].clone();
    let mut blocks = location.blocks.to_vec();

    match &*block {
        BlockNode::Paragraph(p) => {
            let at = p
                .content()
                .flat_index_of(caret.node, caret.index)
                .ok_or(EditError::InvalidSelection)?;
            let (left, right) = p.content().split_at_flat(at);
            let (node, caret_index) = right.first_caret();
            blocks[index] = Arc::new(BlockNode::Paragraph(p.with_content(Arc::new(left))));
            // The second half is always a plain paragraph; a split header
            // keeps its level on the first half only.
            blocks.insert(
                index + 1,
                Arc::new(BlockNode::Paragraph(ParagraphNode::new(0, right))),
            );
            let root =
                container_with_blocks(&chapter, container, blocks).ok_or(EditError::UnknownNode)?;
            Ok(Edit::collapsed(root, Caret::new(node, caret_index)))
        }
        BlockNode::List(list) => {
            let li = list
                .leaf_of_stop(caret.node)
                .ok_or(EditError::InvalidSelection)?;
            let leaves = list.leaves_with_depth();
            let at = leaves[li]
                .1
                .flat_index_of(caret.node, caret.index)
                .ok_or(EditError::InvalidSelection)?;
            let (left, right) = leaves[li].1.split_at_flat(at);
            let (node, caret_index) = right.first_caret();
            let mut rebuilt = leaves.clone();
            rebuilt[li] = (leaves[li].0, Arc::new(left));
            rebuilt.insert(li + 1, (leaves[li].0, Arc::new(right)));
            let new_list = list.rebuilt_from_leaves(&rebuilt);
            let root = chapter
                .with_node_replaced(list.id(), Some(NodeValue::List(Arc::new(new_list))))
                .ok_or(EditError::UnknownNode)?;
            Ok(Edit::collapsed(root, Caret::new(node, caret_index)))
        }
        BlockNode::Code(code) => {
            if code.code().id() != caret.node {
                return Err(EditError::NotApplicable);
            }
            insert_text(&chapter, caret, "\n")
        }
        _ => Err(EditError::NotApplicable),
    }
}

/// Indent the list item at the caret by one level, no deeper than one past
/// its predecessor.
pub fn with_list_item_indented(chapter: &ChapterNode, caret: Caret) -> Result<Edit, EditError> {
    let caret = resolve_to_stop(chapter, caret)?;
    let list = enclosing_list(chapter, caret.node).ok_or(EditError::NotApplicable)?;
    let li = list
        .leaf_of_stop(caret.node)
        .ok_or(EditError::NotApplicable)?;
    if li == 0 {
        return Err(EditError::NotApplicable);
    }
    let mut leaves = list.leaves_with_depth();
    let limit = leaves[li - 1].0 + 1;
    let depth = (leaves[li].0 + 1).min(limit);
    if depth == leaves[li].0 {
        return Err(EditError::NotApplicable);
    }
    leaves[li].0 = depth;
    let rebuilt = list.rebuilt_from_leaves(&leaves);
    let root = chapter
        .with_node_replaced(list.id(), Some(NodeValue::List(Arc::new(rebuilt))))
        .ok_or(EditError::UnknownNode)?;
    Ok(Edit::collapsed(root, caret))
}

/// Unindent the list item at the caret by one level. Top-level items stay
/// where they are.
pub fn with_list_item_unindented(chapter: &ChapterNode, caret: Caret) -> Result<Edit, EditError> {
    let caret = resolve_to_stop(chapter, caret)?;
    let list = enclosing_list(chapter, caret.node).ok_or(EditError::NotApplicable)?;
    let li = list
        .leaf_of_stop(caret.node)
        .ok_or(EditError::NotApplicable)?;
    let mut leaves = list.leaves_with_depth();
    if leaves[li].0 <= 1 {
        return Err(EditError::NotApplicable);
    }
    leaves[li].0 -= 1;
    let rebuilt = list.rebuilt_from_leaves(&leaves);
    let root = chapter
        .with_node_replaced(list.id(), Some(NodeValue::List(Arc::new(rebuilt))))
        .ok_or(EditError::UnknownNode)?;
    Ok(Edit::collapsed(root, caret))
}

/// Convert the paragraphs covered by the range into lists, one list per
/// contiguous paragraph run. Fails when no paragraph is covered.
pub fn with_paragraphs_as_lists(
    chapter: &ChapterNode,
    range: CaretRange,
    numbered: bool,
) -> Result<Edit, EditError> {
    let (start, end) = sorted_pair(chapter, range)?;
    let loc_start = locate_block(chapter, start.node).ok_or(EditError::InvalidSelection)?;
    let loc_end = locate_block(chapter, end.node).ok_or(EditError::InvalidSelection)?;
    if loc_start.container != loc_end.container {
        return Err(EditError::InvalidSelection);
    }
    let container = loc_start.container;
    let blocks = loc_start.blocks;
    let (bi, bj) = (
        loc_start.index.min(loc_end.index),
        loc_start.index.max(loc_end.index),
    );

    let mut rebuilt: Vec<Arc<BlockNode>> = blocks[..bi].to_vec();
    let mut run: Vec<(usize, Arc<crate::nodes::FormatNode>)> = Vec::new();
    let mut converted = false;
    for block in &blocks[bi..=bj] {
        match &**block {
            BlockNode::Paragraph(p) => {
                run.push((1, p.content().clone()));
                converted = true;
            }
            _ => {
                if let Some(list) = ListNode::from_leaves(numbered, &run) {
                    rebuilt.push(Arc::new(BlockNode::List(list)));
                }
                run.clear();
                rebuilt.push(block.clone());
            }
        }
    }
    if let Some(list) = ListNode::from_leaves(numbered, &run) {
        rebuilt.push(Arc::new(BlockNode::List(list)));
    }
    if !converted {
        return Err(EditError::NotApplicable);
    }
    rebuilt.extend_from_slice(&blocks[bj + 1..]);
    let root = container_with_blocks(chapter, container, rebuilt).ok_or(EditError::UnknownNode)?;
    // Content formats move by reference, so the original carets stay valid.
    Ok(Edit {
        root,
        range: CaretRange::new(start, end),
    })
}

/// Convert the lists covered by the range back into paragraphs, flattening
/// items in document order. Fails when no list is covered.
pub fn with_lists_as_paragraphs(
    chapter: &ChapterNode,
    range: CaretRange,
) -> Result<Edit, EditError> {
    let (start, end) = sorted_pair(chapter, range)?;
    let loc_start = locate_block(chapter, start.node).ok_or(EditError::InvalidSelection)?;
    let loc_end = locate_block(chapter, end.node).ok_or(EditError::InvalidSelection)?;
    if loc_start.container != loc_end.container {
        return Err(EditError::InvalidSelection);
    }
    let container = loc_start.container;
    let blocks = loc_start.blocks;
    let (bi, bj) = (
        loc_start.index.min(loc_end.index),
        loc_start.index.max(loc_end.index),
    );

    let mut rebuilt: Vec<Arc<BlockNode>> = blocks[..bi].to_vec();
    let mut converted = false;
    for block in &blocks[bi..=bj] {
        match &**block {
            BlockNode::List(list) => {
                converted = true;
                for leaf in list.leaves() {
                    rebuilt.push(Arc::new(BlockNode::Paragraph(ParagraphNode::new(
                        0,
                        (*leaf).clone(),
                    ))));
                }
            }
            _ => rebuilt.push(block.clone()),
        }
    }
    if !converted {
        return Err(EditError::NotApplicable);
    }
    rebuilt.extend_from_slice(&blocks[bj + 1..]);
    let root = container_with_blocks(chapter, container, rebuilt).ok_or(EditError::UnknownNode)?;
    Ok(Edit {
        root,
        range: CaretRange::new(start, end),
    })
}

/// Insert a rule before or after the block holding the caret.
pub fn with_rule_inserted(
    chapter: &ChapterNode,
    caret: Caret,
    before: bool,
) -> Result<Edit, EditError> {
    let caret = resolve_to_stop(chapter, caret)?;
    let location = locate_block(chapter, caret.node).ok_or(EditError::InvalidSelection)?;
    let anchor = location.blocks[location.index].id();
    let root = chapter
        .with_block_inserted(anchor, Arc::new(BlockNode::Rule(RuleNode::new())), before)
        .ok_or(EditError::UnknownNode)?;
    Ok(Edit::collapsed(root, caret))
}
