//! Range-level edit operations: formatting, deletion, character-level
//! backspace/delete, text insertion, and atom insertion at a selection.
//!
//! Deletion strategy: a span inside one text node trims it directly; a span
//! inside one format tree is removed over flattened runs; a span crossing
//! list items merges the items; a span crossing blocks truncates the
//! boundary blocks, drops what lies between, and merges the remnants by the
//! block-adjacency table. Caret repair re-derives positions from flat unit
//! offsets in the rebuilt tree.

use std::sync::Arc;

use crate::editing::caret::{
    adjacent_caret, resolve_to_stop, Caret, CaretRange, PositionIndex,
};
use crate::editing::{Edit, EditError};
use crate::nodes::chapter::project_block_units;
use crate::nodes::format::Run;
use crate::nodes::{
    caret_at_flat, flat_offset, path_to, units_under, AtomNode, BlockNode, ChapterNode, FormatNode,
    FormatTag, ListNode, NodeId, NodeRef, NodeValue, ParagraphNode, TableNode,
};

// ===== Shared locators =====

/// The leaf block holding a caret stop, with its container's child list.
pub(crate) struct BlockLocation<'a> {
    pub(crate) container: NodeId,
    pub(crate) blocks: &'a [Arc<BlockNode>],
    pub(crate) index: usize,
}

pub(crate) fn locate_block<'a>(
    chapter: &'a ChapterNode,
    stop: NodeId,
) -> Option<BlockLocation<'a>> {
    let path = path_to(chapter.as_node(), stop)?;
    // The deepest Block on the path is the leaf block; its predecessor is
    // the container (chapter, quote, or callout).
    let at = path
        .iter()
        .rposition(|n| matches!(n, NodeRef::Block(_)))?;
    let block_id = path[at].id();
    let blocks = container_blocks(chapter, path[at - 1].id())?;
    let index = blocks.iter().position(|b| b.id() == block_id)?;
    Some(BlockLocation {
        container: path[at - 1].id(),
        blocks,
        index,
    })
}

pub(crate) fn container_blocks<'a>(
    chapter: &'a ChapterNode,
    container: NodeId,
) -> Option<&'a [Arc<BlockNode>]> {
    if container == chapter.id() {
        return Some(chapter.blocks());
    }
    match chapter.find(container)? {
        NodeRef::Block(BlockNode::Quote(q)) => Some(q.blocks()),
        NodeRef::Block(BlockNode::Callout(c)) => Some(c.blocks()),
        _ => None,
    }
}

pub(crate) fn container_with_blocks(
    chapter: &ChapterNode,
    container: NodeId,
    blocks: Vec<Arc<BlockNode>>,
) -> Option<ChapterNode> {
    if container == chapter.id() {
        return Some(chapter.with_blocks(blocks));
    }
    let rebuilt = match chapter.find(container)? {
        NodeRef::Block(BlockNode::Quote(q)) => BlockNode::Quote(q.with_blocks(blocks)),
        NodeRef::Block(BlockNode::Callout(c)) => BlockNode::Callout(c.with_blocks(blocks)),
        _ => return None,
    };
    chapter.with_node_replaced(container, Some(NodeValue::Block(Arc::new(rebuilt))))
}

/// The caret at a global flat offset, appending a placeholder paragraph when
/// the tree has no addressable position left.
pub(crate) fn caret_or_placeholder(root: ChapterNode, offset: usize) -> (ChapterNode, Caret) {
    if let Some((node, index)) = caret_at_flat(root.as_node(), offset) {
        return (root, Caret::new(node, index));
    }
    let para = ParagraphNode::new(0, FormatNode::empty());
    let (node, index) = para.content().first_caret();
    let mut blocks = root.blocks().to_vec();
    blocks.push(Arc::new(BlockNode::Paragraph(para)));
    (root.with_blocks(blocks), Caret::new(node, index))
}

/// Order a pair of carets. Carets inside the same atom's interior are
/// ordered locally; anything else is ordered by document position with
/// interior carets resolved to their atom.
pub(crate) fn sorted_pair(
    chapter: &ChapterNode,
    range: CaretRange,
) -> Result<(Caret, Caret), EditError> {
    let rs = resolve_to_stop(chapter, range.start)?;
    let re = resolve_to_stop(chapter, range.end)?;
    if rs == re && (rs != range.start || re != range.end) {
        // Both inside the same atom: order by the atom content's flat index.
        let format = match chapter.find(rs.node) {
            Some(NodeRef::Atom(AtomNode::Footnote(f))) => f.content().clone(),
            Some(NodeRef::Atom(AtomNode::Comment(c))) => c.content().clone(),
            _ => return Err(EditError::InvalidSelection),
        };
        let a = format
            .flat_index_of(range.start.node, range.start.index)
            .ok_or(EditError::UnknownNode)?;
        let b = format
            .flat_index_of(range.end.node, range.end.index)
            .ok_or(EditError::UnknownNode)?;
        return Ok(if a <= b {
            (range.start, range.end)
        } else {
            (range.end, range.start)
        });
    }
    let index = PositionIndex::of(chapter);
    let a = index.offset_of(rs).ok_or(EditError::UnknownNode)?;
    let b = index.offset_of(re).ok_or(EditError::UnknownNode)?;
    Ok(if a <= b { (rs, re) } else { (re, rs) })
}

fn common_ancestor(chapter: &ChapterNode, a: NodeId, b: NodeId) -> Option<NodeId> {
    let pa = path_to(chapter.as_node(), a)?;
    let pb = path_to(chapter.as_node(), b)?;
    let mut common = None;
    for (x, y) in pa.iter().zip(pb.iter()) {
        if x.id() == y.id() {
            common = Some(x.id());
        } else {
            break;
        }
    }
    common
}

/// The nearest format node at or above the given node.
fn nearest_format(chapter: &ChapterNode, node: NodeId) -> Option<Arc<FormatNode>> {
    let path = path_to(chapter.as_node(), node)?;
    path.into_iter().rev().find_map(|n| match n {
        NodeRef::Format(f) => Some(Arc::new(f.clone())),
        _ => None,
    })
}

/// The outermost format (the content root) holding the given node.
pub(crate) fn content_root_of(chapter: &ChapterNode, node: NodeId) -> Option<Arc<FormatNode>> {
    let path = path_to(chapter.as_node(), node)?;
    path.into_iter().find_map(|n| match n {
        NodeRef::Format(f) => Some(Arc::new(f.clone())),
        _ => None,
    })
}

// ===== Public operations =====

/// Delete the selection, or wrap/toggle it in a format tag.
pub fn with_range_formatted(
    chapter: &ChapterNode,
    range: CaretRange,
    tag: Option<FormatTag>,
) -> Result<Edit, EditError> {
    match tag {
        None => without_range(chapter, range),
        Some(tag) => format_range(chapter, range, tag),
    }
}

/// Delete everything in the selection, merging boundary blocks.
pub fn without_range(chapter: &ChapterNode, range: CaretRange) -> Result<Edit, EditError> {
    let (start, end) = sorted_pair(chapter, range)?;
    if start == end {
        return Ok(Edit::collapsed(chapter.clone(), start));
    }

    if start.node == end.node {
        match chapter.find(start.node).ok_or(EditError::UnknownNode)? {
            NodeRef::Text(t) => {
                // Trimming within one text node keeps its identity.
                let trimmed = t
                    .without_range(start.index, end.index)
                    .ok_or(EditError::IndexOutOfRange)?;
                let root = chapter
                    .with_node_replaced(start.node, Some(NodeValue::Text(Arc::new(trimmed))))
                    .ok_or(EditError::UnknownNode)?;
                return Ok(Edit::collapsed(root, Caret::new(start.node, start.index)));
            }
            // An atom spanned by (0, 1): remove it whole.
            NodeRef::Atom(_) => return delete_atom(chapter, start.node),
            _ => return Err(EditError::InvalidSelection),
        }
    }

    let common = common_ancestor(chapter, start.node, end.node).ok_or(EditError::UnknownNode)?;
    match chapter.find(common).ok_or(EditError::UnknownNode)? {
        NodeRef::Format(f) => {
            let f = Arc::new(f.clone());
            delete_in_format(chapter, &f, start, end)
        }
        NodeRef::Text(_) | NodeRef::Atom(_) => Err(EditError::InvalidSelection),
        NodeRef::List(_) | NodeRef::Block(BlockNode::List(_)) => {
            let list = enclosing_list(chapter, start.node).ok_or(EditError::InvalidSelection)?;
            delete_in_list(chapter, &list, start, end)
        }
        NodeRef::Block(BlockNode::Table(t)) => {
            let t = t.clone();
            delete_in_table(chapter, &t, start, end)
        }
        NodeRef::Chapter(_) => delete_cross_block(chapter, chapter.id(), start, end),
        NodeRef::Block(BlockNode::Quote(q)) => delete_cross_block(chapter, q.id(), start, end),
        NodeRef::Block(BlockNode::Callout(c)) => delete_cross_block(chapter, c.id(), start, end),
        NodeRef::Block(_) => Err(EditError::InvalidSelection),
    }
}

/// Backspace (`next == false`) or forward-delete (`next == true`) at a
/// caret, applying the block-adjacency rules at boundaries.
pub fn without_adjacent_content(
    chapter: &ChapterNode,
    caret: Caret,
    next: bool,
) -> Result<Edit, EditError> {
    let caret = resolve_to_stop(chapter, caret)?;
    match chapter.find(caret.node).ok_or(EditError::UnknownNode)? {
        NodeRef::Atom(_) => return delete_atom(chapter, caret.node),
        NodeRef::Text(t) => {
            if !next && caret.index > 0 {
                return without_range(
                    chapter,
                    CaretRange::new(Caret::new(caret.node, caret.index - 1), caret),
                );
            }
            if next && caret.index < t.len() {
                return without_range(
                    chapter,
                    CaretRange::new(caret, Caret::new(caret.node, caret.index + 1)),
                );
            }
        }
        _ => return Err(EditError::InvalidSelection),
    }

    // At the edge of a text node. Inside the block, deletion just crosses a
    // segment or item boundary; at the block edge the adjacency table rules.
    let location = locate_block(chapter, caret.node).ok_or(EditError::InvalidSelection)?;
    let block = &location.blocks[location.index];
    let local = flat_offset(NodeRef::Block(&**block), caret.node, caret.index)
        .ok_or(EditError::UnknownNode)?;
    let at_edge = if next {
        local == units_under(NodeRef::Block(&**block))
    } else {
        local == 0
    };

    if !at_edge {
        let adjacent = adjacent_caret(chapter, caret, next).ok_or(EditError::NotApplicable)?;
        let range = if next {
            CaretRange::new(caret, adjacent)
        } else {
            CaretRange::new(adjacent, caret)
        };
        return without_range(chapter, range);
    }

    let sibling_index = if next {
        location.index + 1
    } else {
        match location.index.checked_sub(1) {
            Some(i) => i,
            None => return Err(EditError::NotApplicable),
        }
    };
    let Some(sibling) = location.blocks.get(sibling_index) else {
        return Err(EditError::NotApplicable);
    };

    match (next, &**sibling) {
        // A rule next door is simply removed.
        (_, BlockNode::Rule(_)) => {
            let root = chapter
                .with_node_replaced(sibling.id(), None)
                .ok_or(EditError::UnknownNode)?;
            Ok(Edit::collapsed(root, caret))
        }
        // Backward merges: paragraph into paragraph, list tail, or quote.
        (
            false,
            BlockNode::Paragraph(_) | BlockNode::List(_) | BlockNode::Quote(_)
            | BlockNode::Callout(_),
        ) => {
            let adjacent = adjacent_caret(chapter, caret, false).ok_or(EditError::NotApplicable)?;
            without_range(chapter, CaretRange::new(adjacent, caret))
        }
        // Forward-delete merges a following paragraph...
        (true, BlockNode::Paragraph(_)) => {
            let adjacent = adjacent_caret(chapter, caret, true).ok_or(EditError::NotApplicable)?;
            without_range(chapter, CaretRange::new(caret, adjacent))
        }
        // ...but never pulls a following list up into a paragraph.
        (true, BlockNode::List(_)) => Err(EditError::NotApplicable),
        _ => Err(EditError::NotApplicable),
    }
}

/// Insert plain text at a caret. At an atom, the text lands just before it.
pub fn insert_text(chapter: &ChapterNode, caret: Caret, text: &str) -> Result<Edit, EditError> {
    let caret = resolve_to_insertion_point(chapter, caret)?;
    let NodeRef::Text(t) = chapter.find(caret.node).ok_or(EditError::UnknownNode)? else {
        return Err(EditError::InvalidSelection);
    };
    let inserted = t
        .with_inserted(caret.index, text)
        .ok_or(EditError::IndexOutOfRange)?;
    let root = chapter
        .with_node_replaced(caret.node, Some(NodeValue::Text(Arc::new(inserted))))
        .ok_or(EditError::UnknownNode)?;
    Ok(Edit::collapsed(
        root,
        Caret::new(caret.node, caret.index + text.chars().count()),
    ))
}

/// A text caret suitable for insertion; an atom caret slides to the nearest
/// text position before it.
fn resolve_to_insertion_point(chapter: &ChapterNode, caret: Caret) -> Result<Caret, EditError> {
    match chapter.find(caret.node) {
        Some(NodeRef::Text(_)) => Ok(caret),
        Some(NodeRef::Atom(_)) => {
            let index = PositionIndex::of(chapter);
            let at = index.offset_of(caret).ok_or(EditError::UnknownNode)?;
            let mut i = at;
            while i > 0 {
                i -= 1;
                if let Some(candidate) = index.at(i) {
                    if matches!(chapter.find(candidate.node), Some(NodeRef::Text(_))) {
                        return Ok(candidate);
                    }
                }
            }
            Err(EditError::NotApplicable)
        }
        Some(_) => Err(EditError::InvalidSelection),
        None => Err(EditError::UnknownNode),
    }
}

/// Replace the selection with an atom built from the selected text, e.g. to
/// create a link, footnote, citation, label, or comment.
pub fn with_segment_at_selection(
    chapter: &ChapterNode,
    range: CaretRange,
    factory: impl FnOnce(String) -> AtomNode,
) -> Result<Edit, EditError> {
    let (start, end) = sorted_pair(chapter, range)?;
    let common = common_ancestor(chapter, start.node, end.node).ok_or(EditError::UnknownNode)?;
    let format = nearest_format(chapter, common).ok_or(EditError::InvalidSelection)?;
    let a = format
        .flat_index_of(start.node, start.index)
        .ok_or(EditError::InvalidSelection)?;
    let b = format
        .flat_index_of(end.node, end.index)
        .ok_or(EditError::InvalidSelection)?;
    let selected = format.text_in_flat_range(a, b);
    let atom = factory(selected);
    let rebuilt = format
        .without_flat_range(a, b)
        .with_runs_spliced(a, vec![Run::atom(Arc::new(atom))]);
    let (node, index) = rebuilt.caret_at_flat(a + 1);
    let root = chapter
        .with_node_replaced(format.id(), Some(NodeValue::Format(Arc::new(rebuilt))))
        .ok_or(EditError::UnknownNode)?;
    Ok(Edit::collapsed(root, Caret::new(node, index)))
}

// ===== Deletion internals =====

fn delete_atom(chapter: &ChapterNode, atom: NodeId) -> Result<Edit, EditError> {
    let offset = flat_offset(chapter.as_node(), atom, 0).ok_or(EditError::UnknownNode)?;
    let root = chapter
        .with_node_replaced(atom, None)
        .ok_or(EditError::UnknownNode)?;
    let (root, caret) = caret_or_placeholder(root, offset);
    Ok(Edit::collapsed(root, caret))
}

fn delete_in_format(
    chapter: &ChapterNode,
    format: &Arc<FormatNode>,
    start: Caret,
    end: Caret,
) -> Result<Edit, EditError> {
    let a = format
        .flat_index_of(start.node, start.index)
        .ok_or(EditError::UnknownNode)?;
    let b = format
        .flat_index_of(end.node, end.index)
        .ok_or(EditError::UnknownNode)?;
    let (a, b) = (a.min(b), a.max(b));
    let trimmed = format.without_flat_range(a, b);
    let (node, index) = trimmed.caret_at_flat(a);
    let root = chapter
        .with_node_replaced(format.id(), Some(NodeValue::Format(Arc::new(trimmed))))
        .ok_or(EditError::UnknownNode)?;
    Ok(Edit::collapsed(root, Caret::new(node, index)))
}

pub(crate) fn enclosing_list(chapter: &ChapterNode, node: NodeId) -> Option<ListNode> {
    let path = path_to(chapter.as_node(), node)?;
    path.into_iter().find_map(|n| match n {
        NodeRef::Block(BlockNode::List(l)) => Some(l.clone()),
        _ => None,
    })
}

/// Deletion crossing list items: merge the boundary items, drop what lies
/// between, and let empty sublists dissolve.
fn delete_in_list(
    chapter: &ChapterNode,
    list: &ListNode,
    start: Caret,
    end: Caret,
) -> Result<Edit, EditError> {
    let li = list.leaf_of_stop(start.node).ok_or(EditError::InvalidSelection)?;
    let lj = list.leaf_of_stop(end.node).ok_or(EditError::InvalidSelection)?;
    let leaves = list.leaves_with_depth();
    if li == lj {
        return delete_in_format(chapter, &leaves[li].1, start, end);
    }
    let s_off = leaves[li]
        .1
        .flat_index_of(start.node, start.index)
        .ok_or(EditError::UnknownNode)?;
    let e_off = leaves[lj]
        .1
        .flat_index_of(end.node, end.index)
        .ok_or(EditError::UnknownNode)?;
    let (head, _) = leaves[li].1.split_at_flat(s_off);
    let (_, tail) = leaves[lj].1.split_at_flat(e_off);
    let merged = head.concatenated(&tail);
    let (node, index) = merged.caret_at_flat(s_off);
    let mut rebuilt = leaves[..li].to_vec();
    rebuilt.push((leaves[li].0, Arc::new(merged)));
    rebuilt.extend_from_slice(&leaves[lj + 1..]);
    let new_list = list.rebuilt_from_leaves(&rebuilt);
    let root = chapter
        .with_node_replaced(list.id(), Some(NodeValue::List(Arc::new(new_list))))
        .ok_or(EditError::UnknownNode)?;
    Ok(Edit::collapsed(root, Caret::new(node, index)))
}

/// Deletion crossing table cells clears the covered text but never changes
/// the table's shape; shape edits go through the row/column operations.
fn delete_in_table(
    chapter: &ChapterNode,
    table: &TableNode,
    start: Caret,
    end: Caret,
) -> Result<Edit, EditError> {
    // Locate both carets in the cells-then-caption flat order.
    let mut cells: Vec<Arc<FormatNode>> = table.rows().iter().flatten().cloned().collect();
    cells.push(table.caption().clone());
    let mut pos = 0usize;
    let mut s = None;
    let mut e = None;
    let mut spans = Vec::with_capacity(cells.len());
    for cell in &cells {
        let units = cell.units();
        if let Some(k) = cell.flat_index_of(start.node, start.index) {
            s = Some(pos + k);
        }
        if let Some(k) = cell.flat_index_of(end.node, end.index) {
            e = Some(pos + k);
        }
        spans.push((pos, units));
        pos += units;
    }
    let s = s.ok_or(EditError::UnknownNode)?;
    let e = e.ok_or(EditError::UnknownNode)?;
    let mut caret = None;
    let trimmed: Vec<Arc<FormatNode>> = cells
        .iter()
        .zip(&spans)
        .map(|(cell, (cell_start, units))| {
            let a = s.max(*cell_start);
            let b = e.min(cell_start + units);
            if a >= b {
                return cell.clone();
            }
            let new_cell = cell.without_flat_range(a - cell_start, b - cell_start);
            if s >= *cell_start && s <= cell_start + units {
                let (node, index) = new_cell.caret_at_flat(s - cell_start);
                caret = Some(Caret::new(node, index));
            }
            Arc::new(new_cell)
        })
        .collect();
    let caption = trimmed.last().cloned().ok_or(EditError::InvalidSelection)?;
    let columns = table.column_count();
    let rows: Vec<Vec<Arc<FormatNode>>> = trimmed[..trimmed.len() - 1]
        .chunks(columns)
        .map(|row| row.to_vec())
        .collect();
    let rebuilt = table.with_rows(rows).with_caption(caption);
    let root = chapter
        .with_node_replaced(table.id(), Some(NodeValue::Block(Arc::new(BlockNode::Table(
            rebuilt,
        )))))
        .ok_or(EditError::UnknownNode)?;
    let caret = caret.ok_or(EditError::InvalidSelection)?;
    Ok(Edit::collapsed(root, caret))
}

fn delete_cross_block(
    chapter: &ChapterNode,
    container: NodeId,
    start: Caret,
    end: Caret,
) -> Result<Edit, EditError> {
    let global = flat_offset(chapter.as_node(), start.node, start.index)
        .ok_or(EditError::UnknownNode)?;
    let blocks = container_blocks(chapter, container).ok_or(EditError::UnknownNode)?;
    let bi = blocks
        .iter()
        .position(|b| {
            flat_offset(NodeRef::Block(&**b), start.node, start.index).is_some()
        })
        .ok_or(EditError::InvalidSelection)?;
    let bj = blocks
        .iter()
        .position(|b| flat_offset(NodeRef::Block(&**b), end.node, end.index).is_some())
        .ok_or(EditError::InvalidSelection)?;
    if bi == bj {
        // Both carets in one block but with no closer common ancestor: the
        // selection crosses unrelated fields (say a code body and caption).
        return Err(EditError::InvalidSelection);
    }
    let (bi, bj) = (bi.min(bj), bi.max(bj));
    let s_local = flat_offset(NodeRef::Block(&*blocks[bi]), start.node, start.index)
        .ok_or(EditError::UnknownNode)?;
    let e_local = flat_offset(NodeRef::Block(&*blocks[bj]), end.node, end.index)
        .ok_or(EditError::UnknownNode)?;
    let head = project_block_units(&blocks[bi], 0, s_local);
    let tail = project_block_units(&blocks[bj], e_local, units_under(NodeRef::Block(&*blocks[bj])));

    let (merged, hint) = merge_remnants(head, tail);
    let mut rebuilt: Vec<Arc<BlockNode>> = blocks[..bi].to_vec();
    rebuilt.extend(merged);
    rebuilt.extend_from_slice(&blocks[bj + 1..]);
    let root = container_with_blocks(chapter, container, rebuilt).ok_or(EditError::UnknownNode)?;
    if let Some(caret) = hint {
        return Ok(Edit::collapsed(root, caret));
    }
    let (root, caret) = caret_or_placeholder(root, global);
    Ok(Edit::collapsed(root, caret))
}

/// Splice the remnants of a cross-block deletion back together, merging the
/// pairs the adjacency rules allow. Returns the replacement blocks plus the
/// junction caret when a merge produced one.
fn merge_remnants(
    head: Option<BlockNode>,
    tail: Option<BlockNode>,
) -> (Vec<Arc<BlockNode>>, Option<Caret>) {
    match (head, tail) {
        (None, None) => (Vec::new(), None),
        (Some(h), None) => (vec![Arc::new(h)], None),
        (None, Some(t)) => (vec![Arc::new(t)], None),
        (Some(h), Some(t)) => combine_blocks(h, t),
    }
}

fn combine_blocks(head: BlockNode, tail: BlockNode) -> (Vec<Arc<BlockNode>>, Option<Caret>) {
    match (head, tail) {
        (BlockNode::Paragraph(hp), BlockNode::Paragraph(tp)) => {
            let junction = hp.content().units();
            let content = hp.content().concatenated(tp.content());
            let (node, index) = content.caret_at_flat(junction);
            (
                vec![Arc::new(BlockNode::Paragraph(
                    hp.with_content(Arc::new(content)),
                ))],
                Some(Caret::new(node, index)),
            )
        }
        (BlockNode::Paragraph(hp), BlockNode::List(tl)) => {
            let leaves = tl.leaves_with_depth();
            let junction = hp.content().units();
            let content = hp.content().concatenated(&leaves[0].1);
            let (node, index) = content.caret_at_flat(junction);
            let mut out = vec![Arc::new(BlockNode::Paragraph(
                hp.with_content(Arc::new(content)),
            ))];
            if let Some(rest) = ListNode::from_leaves(tl.numbered(), &leaves[1..]) {
                out.push(Arc::new(BlockNode::List(rest)));
            }
            (out, Some(Caret::new(node, index)))
        }
        (BlockNode::List(hl), BlockNode::Paragraph(tp)) => {
            let mut leaves = hl.leaves_with_depth();
            let caret = leaves.last_mut().map(|last| {
                let junction = last.1.units();
                let merged = last.1.concatenated(tp.content());
                let (node, index) = merged.caret_at_flat(junction);
                last.1 = Arc::new(merged);
                Caret::new(node, index)
            });
            (
                vec![Arc::new(BlockNode::List(hl.rebuilt_from_leaves(&leaves)))],
                caret,
            )
        }
        (BlockNode::Quote(hq), BlockNode::Paragraph(tp)) => {
            let mut blocks = hq.blocks().to_vec();
            if let Some(last) = blocks.pop() {
                if let BlockNode::Paragraph(lp) = &*last {
                    let junction = lp.content().units();
                    let content = lp.content().concatenated(tp.content());
                    let (node, index) = content.caret_at_flat(junction);
                    blocks.push(Arc::new(BlockNode::Paragraph(
                        lp.with_content(Arc::new(content)),
                    )));
                    return (
                        vec![Arc::new(BlockNode::Quote(hq.with_blocks(blocks)))],
                        Some(Caret::new(node, index)),
                    );
                }
                blocks.push(last);
            }
            (
                vec![
                    Arc::new(BlockNode::Quote(hq)),
                    Arc::new(BlockNode::Paragraph(tp)),
                ],
                None,
            )
        }
        (BlockNode::Callout(hc), BlockNode::Paragraph(tp)) => {
            let mut blocks = hc.blocks().to_vec();
            if let Some(last) = blocks.pop() {
                if let BlockNode::Paragraph(lp) = &*last {
                    let junction = lp.content().units();
                    let content = lp.content().concatenated(tp.content());
                    let (node, index) = content.caret_at_flat(junction);
                    blocks.push(Arc::new(BlockNode::Paragraph(
                        lp.with_content(Arc::new(content)),
                    )));
                    return (
                        vec![Arc::new(BlockNode::Callout(hc.with_blocks(blocks)))],
                        Some(Caret::new(node, index)),
                    );
                }
                blocks.push(last);
            }
            (
                vec![
                    Arc::new(BlockNode::Callout(hc)),
                    Arc::new(BlockNode::Paragraph(tp)),
                ],
                None,
            )
        }
        (h, t) => (vec![Arc::new(h), Arc::new(t)], None),
    }
}

// ===== Formatting internals =====

/// Block-level format trees (paragraph contents, list items, cells,
/// captions) with their global offsets and sizes.
fn content_roots(chapter: &ChapterNode) -> Vec<(NodeId, usize, usize)> {
    fn rec(n: NodeRef<'_>, pos: &mut usize, out: &mut Vec<(NodeId, usize, usize)>) {
        match n {
            NodeRef::Format(f) => {
                let units = f.units();
                out.push((f.id(), *pos, units));
                *pos += units;
            }
            NodeRef::Text(t) => *pos += t.len(),
            NodeRef::Atom(_) => *pos += 1,
            _ => {
                for child in n.children() {
                    rec(child, pos, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    let mut pos = 0;
    rec(chapter.as_node(), &mut pos, &mut out);
    out
}

fn format_range(
    chapter: &ChapterNode,
    range: CaretRange,
    tag: FormatTag,
) -> Result<Edit, EditError> {
    let (start, end) = sorted_pair(chapter, range)?;
    if start == end {
        return Ok(Edit::collapsed(chapter.clone(), start));
    }

    let gs = flat_offset(chapter.as_node(), start.node, start.index);
    let ge = flat_offset(chapter.as_node(), end.node, end.index);
    let (Some(gs), Some(ge)) = (gs, ge) else {
        // Inside an atom's interior: toggle locally on its content tree.
        let common =
            common_ancestor(chapter, start.node, end.node).ok_or(EditError::UnknownNode)?;
        let format = nearest_format(chapter, common).ok_or(EditError::InvalidSelection)?;
        let a = format
            .flat_index_of(start.node, start.index)
            .ok_or(EditError::UnknownNode)?;
        let b = format
            .flat_index_of(end.node, end.index)
            .ok_or(EditError::UnknownNode)?;
        let add = !format.flat_range_has_tag(a, b, tag);
        let rebuilt = format.with_flat_range_tagged(a, b, tag, add);
        let start = rebuilt.caret_at_flat(a);
        let end = rebuilt.caret_at_flat(b);
        let root = chapter
            .with_node_replaced(format.id(), Some(NodeValue::Format(Arc::new(rebuilt))))
            .ok_or(EditError::UnknownNode)?;
        return Ok(Edit {
            root,
            range: CaretRange::new(
                Caret::new(start.0, start.1),
                Caret::new(end.0, end.1),
            ),
        });
    };

    // Collect the covered slices of every content root, decide the toggle
    // direction over all of them, then apply root by root (ids are stable
    // across rebuilds).
    let targets: Vec<(NodeId, usize, usize)> = content_roots(chapter)
        .into_iter()
        .filter_map(|(id, root_start, units)| {
            let a = gs.max(root_start);
            let b = ge.min(root_start + units);
            (a < b).then(|| (id, a - root_start, b - root_start))
        })
        .collect();
    if targets.is_empty() {
        return Ok(Edit {
            root: chapter.clone(),
            range: CaretRange::new(start, end),
        });
    }
    let add = !targets.iter().all(|(id, a, b)| {
        matches!(chapter.find(*id), Some(NodeRef::Format(f)) if f.flat_range_has_tag(*a, *b, tag))
    });

    let mut root = chapter.clone();
    for (id, a, b) in targets {
        let rebuilt = match root.find(id) {
            Some(NodeRef::Format(f)) => f.with_flat_range_tagged(a, b, tag, add),
            _ => return Err(EditError::UnknownNode),
        };
        root = root
            .with_node_replaced(id, Some(NodeValue::Format(Arc::new(rebuilt))))
            .ok_or(EditError::UnknownNode)?;
    }

    let new_start = caret_at_flat(root.as_node(), gs).ok_or(EditError::UnknownNode)?;
    let new_end = caret_at_flat(root.as_node(), ge).ok_or(EditError::UnknownNode)?;
    Ok(Edit {
        root,
        range: CaretRange::new(
            Caret::new(new_start.0, new_start.1),
            Caret::new(new_end.0, new_end.1),
        ),
    })
}
