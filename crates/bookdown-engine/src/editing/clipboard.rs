//! Range copy and paste.
//!
//! A copy projects the selection to a self-contained fragment chapter:
//! partially covered leaves are truncated, block boundaries inside the
//! selection survive, and only covered cells, items, and fields of
//! composite blocks come along. The fragment's Bookdown serialization is
//! the canonical clipboard transfer format, used for the OS clipboard,
//! the in-memory fallback, and cross-document paste alike.

use std::sync::Arc;

use crate::editing::caret::{Caret, CaretRange};
use crate::editing::range::{
    caret_or_placeholder, container_with_blocks, content_root_of, insert_text, locate_block,
    sorted_pair, without_range,
};
use crate::editing::{Edit, EditError};
use crate::nodes::{
    caret_at_flat, flat_offset, units_under, BlockNode, ChapterNode, NodeRef, NodeValue,
    ParagraphNode,
};
use crate::parsing::{parse_chapter, ParseContext};

/// Extract the selection as a self-contained fragment.
pub fn copy_range(chapter: &ChapterNode, range: CaretRange) -> Result<ChapterNode, EditError> {
    let (start, end) = sorted_pair(chapter, range)?;
    let gs =
        flat_offset(chapter.as_node(), start.node, start.index).ok_or(EditError::InvalidSelection)?;
    let ge =
        flat_offset(chapter.as_node(), end.node, end.index).ok_or(EditError::InvalidSelection)?;
    Ok(chapter.with_units_in_range(gs, ge))
}

/// Replace the selection with parsed clipboard markup. A single-paragraph
/// fragment splices inline at the caret; a multi-block fragment splits the
/// paragraph and inserts the blocks between the halves.
pub fn paste(
    chapter: &ChapterNode,
    range: CaretRange,
    markup: &str,
    context: &ParseContext,
) -> Result<Edit, EditError> {
    let deleted = without_range(chapter, range)?;
    let chapter = deleted.root;
    let caret = deleted.range.start;

    // Fresh identities keep ids unique if the source was this same tree.
    let fragment = parse_chapter(context, markup).copy();
    if fragment.blocks().is_empty() {
        return Ok(Edit::collapsed(chapter, caret));
    }
    let fragment_units = fragment.units();
    let gs = flat_offset(chapter.as_node(), caret.node, caret.index)
        .ok_or(EditError::InvalidSelection)?;

    // Inline splice for a lone paragraph.
    if fragment.blocks().len() == 1 {
        if let BlockNode::Paragraph(p) = &*fragment.blocks()[0] {
            match content_root_of(&chapter, caret.node) {
                Some(root_format) => {
                    let at = root_format
                        .flat_index_of(caret.node, caret.index)
                        .ok_or(EditError::InvalidSelection)?;
                    let rebuilt = root_format.with_runs_spliced(at, p.content().to_runs());
                    let root = chapter
                        .with_node_replaced(
                            root_format.id(),
                            Some(NodeValue::Format(Arc::new(rebuilt))),
                        )
                        .ok_or(EditError::UnknownNode)?;
                    let (root, caret) = caret_or_placeholder(root, gs + fragment_units);
                    return Ok(Edit::collapsed(root, caret));
                }
                // A caret outside any format tree (a code body): paste as
                // plain text.
                None => return insert_text(&chapter, caret, &fragment.to_text()),
            }
        }
    }

    // Block-level insertion.
    let location = locate_block(&chapter, caret.node).ok_or(EditError::InvalidSelection)?;
    let container = location.container;
    let index = location.index;
    let mut blocks = location.blocks.to_vec();
    let block = blocks[index].clone();

    match &*block {
        BlockNode::Paragraph(p) => {
            let at = p
                .content()
                .flat_index_of(caret.node, caret.index)
                .ok_or(EditError::InvalidSelection)?;
            let (left, right) = p.content().split_at_flat(at);
            let mut spliced: Vec<Arc<BlockNode>> = Vec::new();
            if left.units() > 0 {
                spliced.push(Arc::new(BlockNode::Paragraph(
                    p.with_content(Arc::new(left)),
                )));
            }
            spliced.extend(fragment.blocks().iter().cloned());
            if right.units() > 0 {
                spliced.push(Arc::new(BlockNode::Paragraph(ParagraphNode::new(0, right))));
            }
            blocks.splice(index..=index, spliced);
            let root =
                container_with_blocks(&chapter, container, blocks).ok_or(EditError::UnknownNode)?;
            let (root, caret) = caret_or_placeholder(root, gs + fragment_units);
            Ok(Edit::collapsed(root, caret))
        }
        _ => {
            // Not splittable here: insert the fragment after this block.
            for (offset, fragment_block) in fragment.blocks().iter().enumerate() {
                blocks.insert(index + 1 + offset, fragment_block.clone());
            }
            let last = fragment.blocks().last().cloned().ok_or(EditError::NotApplicable)?;
            let caret = caret_at_flat(
                NodeRef::Block(&*last),
                units_under(NodeRef::Block(&*last)),
            )
            .map(|(node, i)| Caret::new(node, i))
            .unwrap_or(caret);
            let root =
                container_with_blocks(&chapter, container, blocks).ok_or(EditError::UnknownNode)?;
            Ok(Edit::collapsed(root, caret))
        }
    }
}
