//! # Document Tree
//!
//! The chapter tree is a persistent data structure: every node is immutable,
//! every child edge is an `Arc`, and every "mutation" rebuilds only the spine
//! from the root to the edit site while sharing all sibling subtrees. Nodes
//! fall into five closed categories with exhaustive dispatch:
//!
//! - **Text**: atomic char runs, the leaves carets address
//! - **Format**: inline formatting trees ([`format::FormatNode`])
//! - **Atom**: indivisible inline stops ([`atoms::AtomNode`])
//! - **Block**: paragraphs, lists, tables, fences ([`blocks::BlockNode`])
//! - **Chapter**: the root, with derived metadata indices
//!
//! Identity is a [`NodeId`] carried by every node. Parents are never stored;
//! they are recomputed by search over the tree ([`parent_of`]), which keeps
//! the structure acyclic. Rebuilt spine nodes keep their id (the logical node
//! survives an edit); `copy()` mints fresh ids throughout a subtree.
//!
//! Flat-unit addressing is the glue between trees and carets: in document
//! order every char is one unit and every atom is one unit, with atom
//! interiors opaque. [`flat_offset`] and [`caret_at_flat`] convert between
//! carets and unit offsets under any subtree root.

pub mod atoms;
pub mod blocks;
pub mod chapter;
pub mod format;
pub mod list;
pub mod quote;
pub mod table;
pub mod text;

pub use atoms::{
    AtomNode, CitationsNode, CommentNode, DefinitionNode, ErrorNode, FootnoteNode, InlineCodeNode,
    LabelNode, LinkNode,
};
pub use blocks::{BlockNode, CodeNode, EmbedNode, ParagraphNode, Position, RuleNode};
pub use chapter::ChapterNode;
pub use format::{FormatNode, FormatTag, Segment};
pub use list::{ListItem, ListNode};
pub use table::TableNode;
pub use text::TextNode;

use uuid::Uuid;

/// Stable identity of a node within one tree version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(Uuid);

impl NodeId {
    pub(crate) fn fresh() -> Self {
        Self(Uuid::new_v4())
    }
}

/// A borrowed, uniformly typed view of any node in a tree.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Chapter(&'a ChapterNode),
    Block(&'a BlockNode),
    List(&'a ListNode),
    Format(&'a FormatNode),
    Text(&'a TextNode),
    Atom(&'a AtomNode),
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        match self {
            NodeRef::Chapter(n) => n.id(),
            NodeRef::Block(n) => n.id(),
            NodeRef::List(n) => n.id(),
            NodeRef::Format(n) => n.id(),
            NodeRef::Text(n) => n.id(),
            NodeRef::Atom(n) => n.id(),
        }
    }

    /// Children in document order, which is also serialization order.
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        match *self {
            NodeRef::Chapter(c) => c.blocks().iter().map(|b| NodeRef::Block(&**b)).collect(),
            NodeRef::Block(b) => match b {
                BlockNode::Paragraph(p) => vec![NodeRef::Format(&**p.content())],
                BlockNode::List(l) => list_children(l),
                BlockNode::Table(t) => {
                    let mut out: Vec<NodeRef<'a>> = t
                        .rows()
                        .iter()
                        .flat_map(|row| row.iter().map(|c| NodeRef::Format(&**c)))
                        .collect();
                    out.push(NodeRef::Format(&**t.caption()));
                    out
                }
                BlockNode::Quote(q) => {
                    let mut out: Vec<NodeRef<'a>> =
                        q.blocks().iter().map(|b| NodeRef::Block(&**b)).collect();
                    out.push(NodeRef::Format(&**q.credit()));
                    out
                }
                BlockNode::Callout(c) => {
                    c.blocks().iter().map(|b| NodeRef::Block(&**b)).collect()
                }
                BlockNode::Code(c) => {
                    vec![NodeRef::Text(&**c.code()), NodeRef::Format(&**c.caption())]
                }
                BlockNode::Embed(e) => {
                    vec![
                        NodeRef::Format(&**e.caption()),
                        NodeRef::Format(&**e.credit()),
                    ]
                }
                BlockNode::Rule(_) | BlockNode::Error(_) => Vec::new(),
            },
            NodeRef::List(l) => list_children(l),
            NodeRef::Format(f) => f
                .segments()
                .iter()
                .map(|s| match s {
                    Segment::Text(t) => NodeRef::Text(&**t),
                    Segment::Format(f) => NodeRef::Format(&**f),
                    Segment::Atom(a) => NodeRef::Atom(&**a),
                })
                .collect(),
            NodeRef::Atom(a) => match a {
                AtomNode::Footnote(f) => vec![NodeRef::Format(&**f.content())],
                AtomNode::Comment(c) => vec![NodeRef::Format(&**c.content())],
                _ => Vec::new(),
            },
            NodeRef::Text(_) => Vec::new(),
        }
    }
}

fn list_children<'a>(l: &'a ListNode) -> Vec<NodeRef<'a>> {
    l.items()
        .iter()
        .map(|item| match item {
            ListItem::Item(f) => NodeRef::Format(&**f),
            ListItem::List(sub) => NodeRef::List(&**sub),
        })
        .collect()
}

/// Every node under (and including) `root`, pre-order.
pub fn descendants<'a>(root: NodeRef<'a>) -> Vec<NodeRef<'a>> {
    let mut out = Vec::new();
    fn rec<'a>(n: NodeRef<'a>, out: &mut Vec<NodeRef<'a>>) {
        out.push(n);
        for child in n.children() {
            rec(child, out);
        }
    }
    rec(root, &mut out);
    out
}

/// Find a node by id under `root`.
pub fn find<'a>(root: NodeRef<'a>, target: NodeId) -> Option<NodeRef<'a>> {
    descendants(root).into_iter().find(|n| n.id() == target)
}

/// The parent of a node, recomputed by search.
pub fn parent_of<'a>(root: NodeRef<'a>, target: NodeId) -> Option<NodeRef<'a>> {
    descendants(root)
        .into_iter()
        .find(|n| n.children().iter().any(|c| c.id() == target))
}

/// The chain of nodes from `root` down to the target, inclusive.
pub fn path_to<'a>(root: NodeRef<'a>, target: NodeId) -> Option<Vec<NodeRef<'a>>> {
    fn rec<'a>(n: NodeRef<'a>, target: NodeId, path: &mut Vec<NodeRef<'a>>) -> bool {
        path.push(n);
        if n.id() == target {
            return true;
        }
        for child in n.children() {
            if rec(child, target, path) {
                return true;
            }
        }
        path.pop();
        false
    }
    let mut path = Vec::new();
    if rec(root, target, &mut path) {
        Some(path)
    } else {
        None
    }
}

/// A caret stop: a text leaf or an opaque atom.
#[derive(Debug, Clone, Copy)]
pub enum StopRef<'a> {
    Text(&'a TextNode),
    Atom(&'a AtomNode),
}

impl<'a> StopRef<'a> {
    pub fn id(&self) -> NodeId {
        match self {
            StopRef::Text(t) => t.id(),
            StopRef::Atom(a) => a.id(),
        }
    }

    /// Flat units this stop occupies.
    pub fn units(&self) -> usize {
        match self {
            StopRef::Text(t) => t.len(),
            StopRef::Atom(_) => 1,
        }
    }
}

/// The caret stops under `root` in document order. Atom interiors are not
/// entered; an atom is one opaque stop.
pub fn stops<'a>(root: NodeRef<'a>) -> Vec<StopRef<'a>> {
    let mut out = Vec::new();
    fn rec<'a>(n: NodeRef<'a>, out: &mut Vec<StopRef<'a>>) {
        match n {
            NodeRef::Text(t) => out.push(StopRef::Text(t)),
            NodeRef::Atom(a) => out.push(StopRef::Atom(a)),
            _ => {
                for child in n.children() {
                    rec(child, out);
                }
            }
        }
    }
    rec(root, &mut out);
    out
}

/// Total flat units under `root`.
pub fn units_under(root: NodeRef<'_>) -> usize {
    stops(root).iter().map(|s| s.units()).sum()
}

/// Flat unit offset of a caret `(node, index)` under `root`.
pub fn flat_offset(root: NodeRef<'_>, node: NodeId, index: usize) -> Option<usize> {
    let mut pos = 0usize;
    for stop in stops(root) {
        match stop {
            StopRef::Text(t) => {
                if t.id() == node && index <= t.len() {
                    return Some(pos + index);
                }
                pos += t.len();
            }
            StopRef::Atom(a) => {
                if a.id() == node {
                    return Some(pos + index.min(1));
                }
                pos += 1;
            }
        }
    }
    None
}

/// The caret at a flat unit offset under `root`, clamped to the end. Prefers
/// landing in the earliest text stop containing the offset; atoms are never
/// landed on. `None` only when the subtree holds no text stop at all.
pub fn caret_at_flat(root: NodeRef<'_>, offset: usize) -> Option<(NodeId, usize)> {
    let mut pos = 0usize;
    let mut last = None;
    for stop in stops(root) {
        match stop {
            StopRef::Text(t) => {
                if offset >= pos && offset <= pos + t.len() {
                    return Some((t.id(), offset - pos));
                }
                pos += t.len();
                last = Some((t.id(), t.len()));
            }
            StopRef::Atom(_) => {
                pos += 1;
            }
        }
    }
    last
}

/// An owned replacement value for [`chapter::ChapterNode::with_node_replaced`].
#[derive(Debug, Clone)]
pub enum NodeValue {
    Block(std::sync::Arc<BlockNode>),
    List(std::sync::Arc<ListNode>),
    Format(std::sync::Arc<FormatNode>),
    Text(std::sync::Arc<TextNode>),
    Atom(std::sync::Arc<AtomNode>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn sample_chapter() -> ChapterNode {
        ChapterNode::new(vec![
            Arc::new(BlockNode::Paragraph(ParagraphNode::new(
                1,
                FormatNode::from_text("Title"),
            ))),
            Arc::new(BlockNode::Paragraph(ParagraphNode::new(
                0,
                FormatNode::from_text("Body text."),
            ))),
        ])
    }

    #[test]
    fn parent_is_computed_by_search() {
        let chapter = sample_chapter();
        let root = NodeRef::Chapter(&chapter);
        let first_block = chapter.blocks()[0].clone();
        let parent = parent_of(root, first_block.id()).unwrap();
        assert_eq!(parent.id(), chapter.id());
    }

    #[test]
    fn path_runs_from_root_to_leaf() {
        let chapter = sample_chapter();
        let root = NodeRef::Chapter(&chapter);
        let stop = stops(root)[0].id();
        let path = path_to(root, stop).unwrap();
        assert_eq!(path.first().unwrap().id(), chapter.id());
        assert_eq!(path.last().unwrap().id(), stop);
        assert_eq!(path.len(), 4); // chapter > block > format > text
    }

    #[test]
    fn flat_offsets_span_blocks() {
        let chapter = sample_chapter();
        let root = NodeRef::Chapter(&chapter);
        assert_eq!(units_under(root), "Title".len() + "Body text.".len());
        let second_text = stops(root)[1];
        assert_eq!(flat_offset(root, second_text.id(), 4), Some(9));
        let (node, index) = caret_at_flat(root, 9).unwrap();
        assert_eq!((node, index), (second_text.id(), 4));
    }

    #[test]
    fn caret_at_flat_clamps_to_end() {
        let chapter = sample_chapter();
        let root = NodeRef::Chapter(&chapter);
        let (node, index) = caret_at_flat(root, 1_000).unwrap();
        let last = stops(root).last().unwrap().id();
        assert_eq!((node, index), (last, "Body text.".len()));
    }
}
