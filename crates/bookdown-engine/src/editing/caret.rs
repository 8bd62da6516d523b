//! Caret and range addressing.
//!
//! A caret names a text node or atom plus an index; the document-order
//! position list turns carets into comparable offsets. Boundary positions
//! shared by adjacent text nodes collapse to one entry, atoms occupy exactly
//! one position, and atom interiors are reachable only by explicit focus,
//! never by ordinary adjacency.

use std::collections::HashMap;

use crate::editing::EditError;
use crate::nodes::{path_to, stops, ChapterNode, NodeId, NodeRef, StopRef};

/// A position: a text node or atom plus an index. Text indices run
/// `[0, len]`; an atom's only index is 0 (the atom itself), with 1 accepted
/// as an alias for the position just after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caret {
    pub node: NodeId,
    pub index: usize,
}

impl Caret {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

/// An unordered pair of carets. `sort_range` normalizes by document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaretRange {
    pub start: Caret,
    pub end: Caret,
}

impl CaretRange {
    pub fn new(start: Caret, end: Caret) -> Self {
        Self { start, end }
    }

    pub fn collapsed(caret: Caret) -> Self {
        Self {
            start: caret,
            end: caret,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// The document-order position list of a chapter, with a lookup that also
/// resolves boundary aliases.
pub(crate) struct PositionIndex {
    positions: Vec<Caret>,
    lookup: HashMap<Caret, usize>,
}

impl PositionIndex {
    pub(crate) fn of(chapter: &ChapterNode) -> Self {
        let mut index = Self {
            positions: Vec::new(),
            lookup: HashMap::new(),
        };
        index.add_node(chapter.as_node());
        index
    }

    /// Boundary positions are shared only within one content root (a block's
    /// format tree or a code body); block boundaries stay distinct.
    fn add_node(&mut self, node: NodeRef<'_>) {
        match node {
            NodeRef::Format(f) => self.add_root(stops(NodeRef::Format(f))),
            NodeRef::Text(t) => self.add_root(vec![StopRef::Text(t)]),
            _ => {
                for child in node.children() {
                    self.add_node(child);
                }
            }
        }
    }

    fn add_root(&mut self, root_stops: Vec<StopRef<'_>>) {
        let mut prev_text = false;
        for stop in root_stops {
            match stop {
                StopRef::Text(t) => {
                    for k in 0..=t.len() {
                        let caret = Caret::new(t.id(), k);
                        if k == 0 && prev_text {
                            // Same visual position as the previous text's end.
                            self.lookup
                                .insert(caret, self.positions.len().saturating_sub(1));
                        } else {
                            self.lookup.insert(caret, self.positions.len());
                            self.positions.push(caret);
                        }
                    }
                    prev_text = true;
                }
                StopRef::Atom(a) => {
                    let caret = Caret::new(a.id(), 0);
                    self.lookup.insert(caret, self.positions.len());
                    self.positions.push(caret);
                    // Index 1 aliases the position just after the atom.
                    self.lookup.insert(Caret::new(a.id(), 1), self.positions.len());
                    prev_text = false;
                }
            }
        }
    }

    pub(crate) fn offset_of(&self, caret: Caret) -> Option<usize> {
        self.lookup.get(&caret).copied()
    }

    pub(crate) fn at(&self, offset: usize) -> Option<Caret> {
        if self.positions.is_empty() {
            None
        } else {
            Some(self.positions[offset.min(self.positions.len() - 1)])
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.positions.len()
    }
}

/// Resolve a caret to an addressable stop caret: carets inside an atom's
/// interior (focused footnote text, say) resolve to the atom itself.
pub(crate) fn resolve_to_stop(chapter: &ChapterNode, caret: Caret) -> Result<Caret, EditError> {
    let index = PositionIndex::of(chapter);
    if index.offset_of(caret).is_some() {
        return Ok(caret);
    }
    let path = path_to(chapter.as_node(), caret.node).ok_or(EditError::UnknownNode)?;
    for node in path.into_iter().rev() {
        if let NodeRef::Atom(a) = node {
            return Ok(Caret::new(a.id(), 0));
        }
    }
    // The node exists but the index is past its end.
    Err(EditError::IndexOutOfRange)
}

/// Normalize a range to document pre-order, resolving atom-interior carets
/// to their atom.
pub fn sort_range(chapter: &ChapterNode, range: CaretRange) -> Result<CaretRange, EditError> {
    let start = resolve_to_stop(chapter, range.start)?;
    let end = resolve_to_stop(chapter, range.end)?;
    let index = PositionIndex::of(chapter);
    let a = index.offset_of(start).ok_or(EditError::UnknownNode)?;
    let b = index.offset_of(end).ok_or(EditError::UnknownNode)?;
    if a <= b {
        Ok(CaretRange::new(start, end))
    } else {
        Ok(CaretRange::new(end, start))
    }
}

/// The next or previous caret position, entering and leaving atoms as single
/// stops. `None` at the document edges.
pub fn adjacent_caret(chapter: &ChapterNode, caret: Caret, next: bool) -> Option<Caret> {
    let index = PositionIndex::of(chapter);
    let at = index.offset_of(caret)?;
    if next {
        index.at(at.checked_add(1)?).filter(|_| at + 1 < index.len())
    } else {
        index.at(at.checked_sub(1)?)
    }
}

/// The next or previous word boundary. Scans the caret's own text node and
/// steps to the adjacent stop at its edges.
pub fn word_boundary(chapter: &ChapterNode, caret: Caret, next: bool) -> Option<Caret> {
    let node = chapter.find(caret.node)?;
    let NodeRef::Text(t) = node else {
        return adjacent_caret(chapter, caret, next);
    };
    let chars: Vec<char> = t.text().chars().collect();
    if next {
        if caret.index >= chars.len() {
            return adjacent_caret(chapter, caret, true);
        }
        let mut i = caret.index;
        while i < chars.len() && !chars[i].is_alphanumeric() {
            i += 1;
        }
        while i < chars.len() && chars[i].is_alphanumeric() {
            i += 1;
        }
        Some(Caret::new(caret.node, i))
    } else {
        if caret.index == 0 {
            return adjacent_caret(chapter, caret, false);
        }
        let mut i = caret.index;
        while i > 0 && !chars[i - 1].is_alphanumeric() {
            i -= 1;
        }
        while i > 0 && chars[i - 1].is_alphanumeric() {
            i -= 1;
        }
        Some(Caret::new(caret.node, i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{parse_chapter, ParseContext};
    use crate::nodes::{stops, StopRef};
    use pretty_assertions::assert_eq;

    fn first_text_caret(chapter: &ChapterNode) -> Caret {
        let stop = stops(chapter.as_node())
            .into_iter()
            .find_map(|s| match s {
                StopRef::Text(t) if !t.is_empty() => Some(t.id()),
                _ => None,
            })
            .unwrap();
        Caret::new(stop, 0)
    }

    fn parse(text: &str) -> ChapterNode {
        parse_chapter(&ParseContext::new(), text)
    }

    #[test]
    fn adjacent_moves_through_text() {
        let chapter = parse("ab");
        let caret = first_text_caret(&chapter);
        let next = adjacent_caret(&chapter, caret, true).unwrap();
        assert_eq!(next, Caret::new(caret.node, 1));
        assert!(adjacent_caret(&chapter, caret, false).is_none());
    }

    #[test]
    fn adjacent_crosses_block_boundaries() {
        let chapter = parse("a\n\nb");
        let caret = first_text_caret(&chapter);
        let end_of_first = Caret::new(caret.node, 1);
        let into_second = adjacent_caret(&chapter, end_of_first, true).unwrap();
        assert_ne!(into_second.node, caret.node);
    }

    #[test]
    fn atoms_are_single_stops() {
        let chapter = parse("a{footnote text}b");
        let stops_list = stops(chapter.as_node());
        // text "a", atom, text "b" (padding may add empties around the atom)
        let atom_id = stops_list
            .iter()
            .find_map(|s| match s {
                StopRef::Atom(a) => Some(a.id()),
                _ => None,
            })
            .unwrap();
        let caret = first_text_caret(&chapter);
        // From the end of "a", one step forward lands on the atom itself.
        let on_atom = adjacent_caret(&chapter, Caret::new(caret.node, 1), true).unwrap();
        assert_eq!(on_atom, Caret::new(atom_id, 0));
        // One more step leaves the atom without entering its interior.
        let after = adjacent_caret(&chapter, on_atom, true).unwrap();
        assert_ne!(after.node, atom_id);
    }

    #[test]
    fn sort_range_normalizes_reversed_selections() {
        let chapter = parse("hello world");
        let caret = first_text_caret(&chapter);
        let range = CaretRange::new(Caret::new(caret.node, 5), Caret::new(caret.node, 1));
        let sorted = sort_range(&chapter, range).unwrap();
        assert_eq!(sorted.start.index, 1);
        assert_eq!(sorted.end.index, 5);
    }

    #[test]
    fn interior_caret_resolves_to_atom() {
        let chapter = parse("x{note}y");
        let footnote = chapter.footnotes()[0];
        let (inner, _) = footnote.content().first_caret();
        let resolved = resolve_to_stop(&chapter, Caret::new(inner, 0)).unwrap();
        let atom_id = stops(chapter.as_node())
            .iter()
            .find_map(|s| match s {
                StopRef::Atom(a) => Some(a.id()),
                _ => None,
            })
            .unwrap();
        assert_eq!(resolved, Caret::new(atom_id, 0));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let chapter = parse("ab");
        let caret = first_text_caret(&chapter);
        let bad = Caret::new(caret.node, 10);
        assert_eq!(
            resolve_to_stop(&chapter, bad),
            Err(EditError::IndexOutOfRange)
        );
    }

    #[test]
    fn word_boundaries_scan_text() {
        let chapter = parse("one two three");
        let caret = first_text_caret(&chapter);
        let after_one = word_boundary(&chapter, caret, true).unwrap();
        assert_eq!(after_one.index, 3);
        let after_two = word_boundary(&chapter, after_one, true).unwrap();
        assert_eq!(after_two.index, 7);
        let back = word_boundary(&chapter, after_two, false).unwrap();
        assert_eq!(back.index, 4);
    }
}
