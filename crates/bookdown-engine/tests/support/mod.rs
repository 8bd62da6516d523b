//! Helpers shared by the integration suites.

use std::collections::HashSet;

use bookdown_engine::nodes::{descendants, stops, NodeId, StopRef};
use bookdown_engine::ChapterNode;

/// Every node id in the tree, atoms' interiors included.
#[allow(dead_code)]
pub fn all_ids(chapter: &ChapterNode) -> HashSet<NodeId> {
    descendants(chapter.as_node())
        .into_iter()
        .map(|n| n.id())
        .collect()
}

/// The id of the first text stop with exactly this content.
#[allow(dead_code)]
pub fn find_text(chapter: &ChapterNode, text: &str) -> Option<NodeId> {
    stops(chapter.as_node()).into_iter().find_map(|s| match s {
        StopRef::Text(t) if t.text() == text => Some(t.id()),
        _ => None,
    })
}
