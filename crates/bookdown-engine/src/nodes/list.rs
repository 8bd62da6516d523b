//! Lists: ordered sequences of format items and nested sublists.
//!
//! Structural list edits (indent, unindent, item merges) flatten the list to
//! `(depth, item)` pairs, adjust depths, and rebuild. Construction drops
//! empty sublists so they never survive, and parsing and rebuilding share the
//! same nesting algorithm, which keeps indent→unindent round-trips exact.

use std::sync::Arc;

use crate::nodes::format::FormatNode;
use crate::nodes::NodeId;

/// One entry of a list: a leaf item or a nested sublist.
#[derive(Debug, Clone)]
pub enum ListItem {
    Item(Arc<FormatNode>),
    List(Arc<ListNode>),
}

#[derive(Debug, Clone)]
pub struct ListNode {
    id: NodeId,
    numbered: bool,
    items: Vec<ListItem>,
}

impl ListNode {
    pub fn new(numbered: bool, items: Vec<ListItem>) -> Self {
        Self {
            id: NodeId::fresh(),
            numbered,
            items: Self::normalized(items),
        }
    }

    /// Drop sublists that carry no leaf content.
    fn normalized(items: Vec<ListItem>) -> Vec<ListItem> {
        items
            .into_iter()
            .filter(|item| match item {
                ListItem::Item(_) => true,
                ListItem::List(list) => !list.leaves().is_empty(),
            })
            .collect()
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn numbered(&self) -> bool {
        self.numbered
    }

    pub fn items(&self) -> &[ListItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rebuilt node keeping identity and marker style.
    pub(crate) fn with_items(&self, items: Vec<ListItem>) -> Self {
        Self {
            id: self.id,
            numbered: self.numbered,
            items: Self::normalized(items),
        }
    }

    pub fn copy(&self) -> Self {
        let items = self
            .items
            .iter()
            .map(|item| match item {
                ListItem::Item(f) => ListItem::Item(Arc::new(f.copy())),
                ListItem::List(l) => ListItem::List(Arc::new(l.copy())),
            })
            .collect();
        Self::new(self.numbered, items)
    }

    // ===== Flattening =====

    /// Leaf items in document order with their nesting depth (top level = 1).
    pub fn leaves_with_depth(&self) -> Vec<(usize, Arc<FormatNode>)> {
        let mut out = Vec::new();
        self.collect_leaves(1, &mut out);
        out
    }

    /// Leaf items in document order.
    pub fn leaves(&self) -> Vec<Arc<FormatNode>> {
        self.leaves_with_depth().into_iter().map(|(_, f)| f).collect()
    }

    fn collect_leaves(&self, depth: usize, out: &mut Vec<(usize, Arc<FormatNode>)>) {
        for item in &self.items {
            match item {
                ListItem::Item(f) => out.push((depth, f.clone())),
                ListItem::List(l) => l.collect_leaves(depth + 1, out),
            }
        }
    }

    /// Index into `leaves_with_depth` of the leaf holding the given stop.
    pub fn leaf_of_stop(&self, node: NodeId) -> Option<usize> {
        self.leaves_with_depth()
            .iter()
            .position(|(_, f)| f.id() == node || f.contains_stop(node))
    }

    /// Rebuild nesting from `(depth, item)` pairs, keeping identity and
    /// marker style. Depths are interpreted relative to 1; a jump deeper than
    /// one level opens intermediate sublists.
    pub(crate) fn rebuilt_from_leaves(&self, leaves: &[(usize, Arc<FormatNode>)]) -> Self {
        self.with_items(build_items(self.numbered, leaves, 1))
    }

    /// Build a fresh list from `(depth, item)` pairs. `None` when empty.
    pub fn from_leaves(numbered: bool, leaves: &[(usize, Arc<FormatNode>)]) -> Option<Self> {
        if leaves.is_empty() {
            None
        } else {
            Some(Self::new(numbered, build_items(numbered, leaves, 1)))
        }
    }

    // ===== Serialization =====

    fn marker(&self, depth: usize, ordinal: usize) -> String {
        if self.numbered {
            format!("{}{}", ordinal, ".".repeat(depth))
        } else {
            "*".repeat(depth)
        }
    }

    fn collect_lines(&self, depth: usize, lines: &mut Vec<String>) {
        let mut ordinal = 0;
        for item in &self.items {
            match item {
                ListItem::Item(f) => {
                    ordinal += 1;
                    lines.push(format!("{} {}", self.marker(depth, ordinal), f.to_bookdown()));
                }
                ListItem::List(l) => l.collect_lines(depth + 1, lines),
            }
        }
    }

    pub fn to_bookdown(&self) -> String {
        let mut lines = Vec::new();
        self.collect_lines(1, &mut lines);
        lines.join("\n")
    }

    pub fn to_text(&self) -> String {
        self.leaves()
            .iter()
            .map(|f| f.to_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn build_items(numbered: bool, leaves: &[(usize, Arc<FormatNode>)], depth: usize) -> Vec<ListItem> {
    let mut items = Vec::new();
    let mut i = 0;
    while i < leaves.len() {
        if leaves[i].0 <= depth {
            items.push(ListItem::Item(leaves[i].1.clone()));
            i += 1;
        } else {
            let mut j = i;
            while j < leaves.len() && leaves[j].0 > depth {
                j += 1;
            }
            items.push(ListItem::List(Arc::new(ListNode::new(
                numbered,
                build_items(numbered, &leaves[i..j], depth + 1),
            ))));
            i = j;
        }
    }
    items
}
