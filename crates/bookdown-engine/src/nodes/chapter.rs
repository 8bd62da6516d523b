//! The chapter root: an ordered block list plus derived metadata indices.

use std::collections::HashSet;
use std::sync::Arc;

use crate::nodes::atoms::{AtomNode, ErrorNode, FootnoteNode, LabelNode};
use crate::nodes::blocks::{BlockNode, EmbedNode, ParagraphNode};
use crate::nodes::format::{FormatNode, Segment};
use crate::nodes::list::{ListItem, ListNode};
use crate::nodes::quote::{CalloutNode, QuoteNode};
use crate::nodes::table::TableNode;
use crate::nodes::text::TextNode;
use crate::nodes::{
    caret_at_flat, descendants, find, parent_of, units_under, NodeId, NodeRef, NodeValue,
};

/// The root of a parsed chapter.
///
/// All metadata accessors (citations, footnotes, headers, labels, embeds,
/// errors) are derived from the tree on demand, in insertion (pre-)order.
#[derive(Debug, Clone)]
pub struct ChapterNode {
    id: NodeId,
    blocks: Vec<Arc<BlockNode>>,
}

impl ChapterNode {
    pub fn new(blocks: Vec<Arc<BlockNode>>) -> Self {
        Self {
            id: NodeId::fresh(),
            blocks,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn blocks(&self) -> &[Arc<BlockNode>] {
        &self.blocks
    }

    pub fn as_node(&self) -> NodeRef<'_> {
        NodeRef::Chapter(self)
    }

    /// Rebuilt root keeping identity.
    pub fn with_blocks(&self, blocks: Vec<Arc<BlockNode>>) -> Self {
        Self {
            id: self.id,
            blocks,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.blocks.iter().map(|b| Arc::new(b.copy())).collect())
    }

    // ===== Lookup =====

    pub fn find(&self, target: NodeId) -> Option<NodeRef<'_>> {
        find(self.as_node(), target)
    }

    pub fn parent_of(&self, target: NodeId) -> Option<NodeRef<'_>> {
        parent_of(self.as_node(), target)
    }

    /// Total flat units of the chapter.
    pub fn units(&self) -> usize {
        units_under(self.as_node())
    }

    /// Caret at a flat unit offset, clamped; `None` for a chapter with no
    /// text stops.
    pub fn caret_at(&self, offset: usize) -> Option<(NodeId, usize)> {
        caret_at_flat(self.as_node(), offset)
    }

    // ===== Structural replacement =====

    /// Replace (or with `None`, delete) the node with the given id anywhere
    /// in the tree, rebuilding the spine and sharing all untouched siblings.
    /// Returns `None` when the id is absent or the replacement is of an
    /// incompatible category. Lists that lose their last leaf disappear.
    pub fn with_node_replaced(
        &self,
        target: NodeId,
        replacement: Option<NodeValue>,
    ) -> Option<ChapterNode> {
        replaced_blocks(&self.blocks, target, &replacement).map(|blocks| self.with_blocks(blocks))
    }

    /// Insert a block before or after the block with the given id.
    pub fn with_block_inserted(
        &self,
        anchor: NodeId,
        block: Arc<BlockNode>,
        before: bool,
    ) -> Option<ChapterNode> {
        blocks_with_insertion(&self.blocks, anchor, block, before)
            .map(|blocks| self.with_blocks(blocks))
    }

    // ===== Range projection =====

    /// Project the flat unit range `[start, end)` onto the chapter, keeping
    /// truncated copies of partially covered leaves and whole copies of
    /// covered subtrees. Zero-unit blocks (rules, errors, empty paragraphs)
    /// survive only when strictly interior to the range.
    pub fn with_units_in_range(&self, start: usize, end: usize) -> ChapterNode {
        let mut window = UnitWindow {
            pos: 0,
            start,
            end,
        };
        let blocks = self
            .blocks
            .iter()
            .filter_map(|b| project_block(b, &mut window).map(Arc::new))
            .collect();
        ChapterNode::new(blocks)
    }

    // ===== Derived indices =====

    /// Citation ids in order of first use.
    pub fn citations(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for n in descendants(self.as_node()) {
            if let NodeRef::Atom(AtomNode::Citations(c)) = n {
                for id in c.citations() {
                    if seen.insert(id.clone()) {
                        out.push(id.clone());
                    }
                }
            }
        }
        out
    }

    pub fn footnotes(&self) -> Vec<&FootnoteNode> {
        descendants(self.as_node())
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Atom(AtomNode::Footnote(f)) => Some(f),
                _ => None,
            })
            .collect()
    }

    pub fn headers(&self) -> Vec<&ParagraphNode> {
        descendants(self.as_node())
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Block(BlockNode::Paragraph(p)) if p.level() > 0 => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn labels(&self) -> Vec<&LabelNode> {
        descendants(self.as_node())
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Atom(AtomNode::Label(l)) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn embeds(&self) -> Vec<&EmbedNode> {
        descendants(self.as_node())
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Block(BlockNode::Embed(e)) => Some(e),
                _ => None,
            })
            .collect()
    }

    /// Every error marker in the tree, block-level and inline.
    pub fn errors(&self) -> Vec<&ErrorNode> {
        descendants(self.as_node())
            .into_iter()
            .filter_map(|n| match n {
                NodeRef::Block(BlockNode::Error(e)) => Some(e),
                NodeRef::Atom(AtomNode::Error(e)) => Some(e),
                _ => None,
            })
            .collect()
    }

    // ===== Serialization =====

    pub fn to_bookdown(&self) -> String {
        self.blocks
            .iter()
            .map(|b| format!("\n\n{}", b.to_bookdown()))
            .collect()
    }

    pub fn to_text(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.to_text())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Lettering for the footnote at the given zero-based index: `a…z`, then
/// two-letter base-26 (`aa…az`, `ba…`).
pub fn footnote_symbol(index: usize) -> String {
    let letter = |n: usize| (b'a' + (n % 26) as u8) as char;
    if index < 26 {
        letter(index).to_string()
    } else {
        let hi = index / 26 - 1;
        format!("{}{}", letter(hi), letter(index % 26))
    }
}

// ===== Replacement spine rebuild =====

fn replaced_blocks(
    blocks: &[Arc<BlockNode>],
    target: NodeId,
    repl: &Option<NodeValue>,
) -> Option<Vec<Arc<BlockNode>>> {
    for (i, block) in blocks.iter().enumerate() {
        if block.id() == target {
            let mut out = blocks.to_vec();
            match repl {
                None => {
                    out.remove(i);
                }
                Some(NodeValue::Block(b)) => out[i] = b.clone(),
                Some(NodeValue::List(l)) => out[i] = Arc::new(BlockNode::List((**l).clone())),
                Some(_) => return None,
            }
            return Some(out);
        }
        if let Some(rebuilt) = replaced_in_block(block, target, repl) {
            let mut out = blocks.to_vec();
            if let BlockNode::List(l) = &rebuilt {
                if l.is_empty() {
                    out.remove(i);
                    return Some(out);
                }
            }
            out[i] = Arc::new(rebuilt);
            return Some(out);
        }
    }
    None
}

fn blocks_with_insertion(
    blocks: &[Arc<BlockNode>],
    anchor: NodeId,
    block: Arc<BlockNode>,
    before: bool,
) -> Option<Vec<Arc<BlockNode>>> {
    for (i, existing) in blocks.iter().enumerate() {
        if existing.id() == anchor {
            let mut out = blocks.to_vec();
            out.insert(if before { i } else { i + 1 }, block);
            return Some(out);
        }
        // Recurse into containers.
        match &**existing {
            BlockNode::Quote(q) => {
                if let Some(inner) = blocks_with_insertion(q.blocks(), anchor, block.clone(), before)
                {
                    let mut out = blocks.to_vec();
                    out[i] = Arc::new(BlockNode::Quote(q.with_blocks(inner)));
                    return Some(out);
                }
            }
            BlockNode::Callout(c) => {
                if let Some(inner) = blocks_with_insertion(c.blocks(), anchor, block.clone(), before)
                {
                    let mut out = blocks.to_vec();
                    out[i] = Arc::new(BlockNode::Callout(c.with_blocks(inner)));
                    return Some(out);
                }
            }
            _ => {}
        }
    }
    None
}

fn replaced_in_block(b: &BlockNode, target: NodeId, repl: &Option<NodeValue>) -> Option<BlockNode> {
    match b {
        BlockNode::Paragraph(p) => replaced_format(p.content(), target, repl)
            .map(|f| BlockNode::Paragraph(p.with_content(f))),
        BlockNode::List(l) => replaced_in_list(l, target, repl).map(BlockNode::List),
        BlockNode::Table(t) => replaced_in_table(t, target, repl).map(BlockNode::Table),
        BlockNode::Quote(q) => {
            if let Some(blocks) = replaced_blocks(q.blocks(), target, repl) {
                return Some(BlockNode::Quote(q.with_blocks(blocks)));
            }
            replaced_format(q.credit(), target, repl).map(|f| BlockNode::Quote(q.with_credit(f)))
        }
        BlockNode::Callout(c) => replaced_blocks(c.blocks(), target, repl)
            .map(|blocks| BlockNode::Callout(c.with_blocks(blocks))),
        BlockNode::Code(c) => {
            if c.code().id() == target {
                return match repl {
                    Some(NodeValue::Text(t)) => Some(BlockNode::Code(c.with_code(t.clone()))),
                    _ => None,
                };
            }
            replaced_format(c.caption(), target, repl).map(|f| BlockNode::Code(c.with_caption(f)))
        }
        BlockNode::Embed(e) => {
            if let Some(f) = replaced_format(e.caption(), target, repl) {
                return Some(BlockNode::Embed(e.with_caption(f)));
            }
            replaced_format(e.credit(), target, repl).map(|f| BlockNode::Embed(e.with_credit(f)))
        }
        BlockNode::Rule(_) | BlockNode::Error(_) => None,
    }
}

/// Replace the format itself (id match) or something inside it.
fn replaced_format(
    f: &Arc<FormatNode>,
    target: NodeId,
    repl: &Option<NodeValue>,
) -> Option<Arc<FormatNode>> {
    if f.id() == target {
        return match repl {
            Some(NodeValue::Format(nf)) => Some(nf.clone()),
            _ => None,
        };
    }
    replaced_in_format(f, target, repl).map(Arc::new)
}

fn replaced_in_format(
    f: &FormatNode,
    target: NodeId,
    repl: &Option<NodeValue>,
) -> Option<FormatNode> {
    for (i, seg) in f.segments().iter().enumerate() {
        if seg.id() == target {
            let mut segments = f.segments().to_vec();
            match repl {
                None => {
                    segments.remove(i);
                }
                Some(NodeValue::Text(t)) => segments[i] = Segment::Text(t.clone()),
                Some(NodeValue::Format(nf)) => segments[i] = Segment::Format(nf.clone()),
                Some(NodeValue::Atom(a)) => segments[i] = Segment::Atom(a.clone()),
                Some(_) => return None,
            }
            return Some(f.with_segments(segments));
        }
        match seg {
            Segment::Format(sub) => {
                if let Some(rebuilt) = replaced_in_format(sub, target, repl) {
                    let mut segments = f.segments().to_vec();
                    segments[i] = Segment::Format(Arc::new(rebuilt));
                    return Some(f.with_segments(segments));
                }
            }
            Segment::Atom(a) => {
                if let Some(rebuilt) = replaced_in_atom(a, target, repl) {
                    let mut segments = f.segments().to_vec();
                    segments[i] = Segment::Atom(Arc::new(rebuilt));
                    return Some(f.with_segments(segments));
                }
            }
            Segment::Text(_) => {}
        }
    }
    None
}

fn replaced_in_atom(a: &AtomNode, target: NodeId, repl: &Option<NodeValue>) -> Option<AtomNode> {
    match a {
        AtomNode::Footnote(footnote) => replaced_format(footnote.content(), target, repl)
            .map(|f| AtomNode::Footnote(footnote.with_content(f))),
        AtomNode::Comment(comment) => replaced_format(comment.content(), target, repl)
            .map(|f| AtomNode::Comment(comment.with_content(f))),
        _ => None,
    }
}

fn replaced_in_list(l: &ListNode, target: NodeId, repl: &Option<NodeValue>) -> Option<ListNode> {
    for (i, item) in l.items().iter().enumerate() {
        match item {
            ListItem::Item(f) => {
                if f.id() == target {
                    let mut items = l.items().to_vec();
                    match repl {
                        None => {
                            items.remove(i);
                        }
                        Some(NodeValue::Format(nf)) => items[i] = ListItem::Item(nf.clone()),
                        Some(NodeValue::List(nl)) => items[i] = ListItem::List(nl.clone()),
                        Some(_) => return None,
                    }
                    return Some(l.with_items(items));
                }
                if let Some(rebuilt) = replaced_in_format(f, target, repl) {
                    let mut items = l.items().to_vec();
                    items[i] = ListItem::Item(Arc::new(rebuilt));
                    return Some(l.with_items(items));
                }
            }
            ListItem::List(sub) => {
                if sub.id() == target {
                    let mut items = l.items().to_vec();
                    match repl {
                        None => {
                            items.remove(i);
                        }
                        Some(NodeValue::List(nl)) => items[i] = ListItem::List(nl.clone()),
                        Some(_) => return None,
                    }
                    return Some(l.with_items(items));
                }
                if let Some(rebuilt) = replaced_in_list(sub, target, repl) {
                    let mut items = l.items().to_vec();
                    items[i] = ListItem::List(Arc::new(rebuilt));
                    return Some(l.with_items(items));
                }
            }
        }
    }
    None
}

fn replaced_in_table(t: &TableNode, target: NodeId, repl: &Option<NodeValue>) -> Option<TableNode> {
    for (r, row) in t.rows().iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            if let Some(rebuilt) = replaced_format(cell, target, repl) {
                let mut rows = t.rows().to_vec();
                rows[r][c] = rebuilt;
                return Some(t.with_rows(rows));
            }
        }
    }
    replaced_format(t.caption(), target, repl).map(|f| t.with_caption(f))
}

// ===== Unit-window projection =====

/// Project one block onto its local unit range `[start, end)`.
pub(crate) fn project_block_units(block: &BlockNode, start: usize, end: usize) -> Option<BlockNode> {
    let mut window = UnitWindow {
        pos: 0,
        start,
        end,
    };
    project_block(block, &mut window)
}

struct UnitWindow {
    pos: usize,
    start: usize,
    end: usize,
}

impl UnitWindow {
    /// Project a text leaf, returning the covered substring.
    fn take_text(&mut self, t: &TextNode) -> Option<String> {
        let len = t.len();
        let a = self.pos.max(self.start);
        let b = (self.pos + len).min(self.end);
        let piece = if a < b {
            Some(t.slice(a - self.pos, b - self.pos))
        } else {
            None
        };
        self.pos += len;
        piece
    }

    fn take_atom(&mut self) -> bool {
        let covered = self.pos >= self.start && self.pos < self.end;
        self.pos += 1;
        covered
    }

    /// Zero-unit nodes survive only strictly inside the window.
    fn interior(&self) -> bool {
        self.pos > self.start && self.pos < self.end
    }
}

fn project_format(f: &FormatNode, w: &mut UnitWindow) -> Option<FormatNode> {
    let mut segments = Vec::new();
    let mut any = false;
    for seg in f.segments() {
        match seg {
            Segment::Text(t) => {
                if let Some(piece) = w.take_text(t) {
                    segments.push(Segment::Text(Arc::new(TextNode::new(piece))));
                    any = true;
                }
            }
            Segment::Format(sub) => {
                if let Some(projected) = project_format(sub, w) {
                    segments.push(Segment::Format(Arc::new(projected)));
                    any = true;
                }
            }
            Segment::Atom(a) => {
                if w.take_atom() {
                    segments.push(Segment::Atom(a.clone()));
                    any = true;
                }
            }
        }
    }
    if any {
        Some(FormatNode::new(f.tag(), segments))
    } else {
        None
    }
}

fn project_list(l: &ListNode, w: &mut UnitWindow) -> Option<ListNode> {
    let mut items = Vec::new();
    let mut any = false;
    for item in l.items() {
        match item {
            ListItem::Item(f) => {
                if let Some(projected) = project_format(f, w) {
                    items.push(ListItem::Item(Arc::new(projected)));
                    any = true;
                }
            }
            ListItem::List(sub) => {
                if let Some(projected) = project_list(sub, w) {
                    items.push(ListItem::List(Arc::new(projected)));
                    any = true;
                }
            }
        }
    }
    if any {
        Some(ListNode::new(l.numbered(), items))
    } else {
        None
    }
}

fn project_table(t: &TableNode, w: &mut UnitWindow) -> Option<BlockNode> {
    let mut rows = Vec::new();
    for row in t.rows() {
        let cells: Vec<Arc<FormatNode>> = row
            .iter()
            .filter_map(|cell| project_format(cell, w).map(Arc::new))
            .collect();
        if !cells.is_empty() {
            rows.push(cells);
        }
    }
    let caption = project_format(t.caption(), w);
    if rows.is_empty() {
        // Only the caption was covered; carry it as plain content.
        return caption.map(|f| BlockNode::Paragraph(ParagraphNode::new(0, f)));
    }
    Some(BlockNode::Table(TableNode::new(
        rows,
        caption.unwrap_or_else(FormatNode::empty),
    )))
}

fn project_blocks(blocks: &[Arc<BlockNode>], w: &mut UnitWindow) -> Vec<Arc<BlockNode>> {
    blocks
        .iter()
        .filter_map(|b| project_block(b, w).map(Arc::new))
        .collect()
}

fn project_block(b: &BlockNode, w: &mut UnitWindow) -> Option<BlockNode> {
    match b {
        BlockNode::Paragraph(p) => {
            if units_under(NodeRef::Format(&**p.content())) == 0 {
                return w.interior().then(|| b.copy());
            }
            project_format(p.content(), w)
                .map(|f| BlockNode::Paragraph(ParagraphNode::new(p.level(), f)))
        }
        BlockNode::List(l) => project_list(l, w).map(BlockNode::List),
        BlockNode::Table(t) => project_table(t, w),
        BlockNode::Quote(q) => {
            let blocks = project_blocks(q.blocks(), w);
            let credit = project_format(q.credit(), w);
            if blocks.is_empty() && credit.is_none() {
                return None;
            }
            Some(BlockNode::Quote(QuoteNode::new(
                blocks,
                credit.unwrap_or_else(FormatNode::empty),
                q.position(),
            )))
        }
        BlockNode::Callout(c) => {
            let blocks = project_blocks(c.blocks(), w);
            if blocks.is_empty() {
                return None;
            }
            Some(BlockNode::Callout(CalloutNode::new(blocks, c.position())))
        }
        BlockNode::Code(c) => {
            let code = w.take_text(c.code());
            let caption = project_format(c.caption(), w);
            if code.is_none() && caption.is_none() {
                return None;
            }
            Some(BlockNode::Code(crate::nodes::blocks::CodeNode::new(
                code.unwrap_or_default(),
                c.language().to_string(),
                c.executable(),
                caption.unwrap_or_else(FormatNode::empty),
                c.position(),
            )))
        }
        BlockNode::Embed(e) => {
            let caption = project_format(e.caption(), w);
            let credit = project_format(e.credit(), w);
            if caption.is_none() && credit.is_none() {
                return None;
            }
            Some(BlockNode::Embed(EmbedNode::new(
                e.url().to_string(),
                e.description().to_string(),
                caption.unwrap_or_else(FormatNode::empty),
                credit.unwrap_or_else(FormatNode::empty),
                e.position(),
            )))
        }
        BlockNode::Rule(_) | BlockNode::Error(_) => w.interior().then(|| b.copy()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeValue;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn para(text: &str) -> Arc<BlockNode> {
        Arc::new(BlockNode::Paragraph(ParagraphNode::new(
            0,
            FormatNode::from_text(text),
        )))
    }

    #[test]
    fn serialization_prefixes_every_block() {
        let chapter = ChapterNode::new(vec![para("First."), para("Second.")]);
        assert_eq!(chapter.to_bookdown(), "\n\nFirst.\n\nSecond.");
    }

    #[test]
    fn replacement_shares_untouched_blocks() {
        let chapter = ChapterNode::new(vec![para("one"), para("two")]);
        let first = chapter.blocks()[0].clone();
        let second = chapter.blocks()[1].clone();
        let replaced = chapter
            .with_node_replaced(
                first.id(),
                Some(NodeValue::Block(para("changed"))),
            )
            .unwrap();
        assert_eq!(replaced.to_bookdown(), "\n\nchanged\n\ntwo");
        // The untouched block is the same allocation.
        assert!(Arc::ptr_eq(&replaced.blocks()[1], &second));
        assert_eq!(replaced.id(), chapter.id());
    }

    #[test]
    fn deleting_a_block() {
        let chapter = ChapterNode::new(vec![para("one"), para("two")]);
        let first = chapter.blocks()[0].id();
        let without = chapter.with_node_replaced(first, None).unwrap();
        assert_eq!(without.to_bookdown(), "\n\ntwo");
    }

    #[test]
    fn replacement_of_unknown_id_fails() {
        let chapter = ChapterNode::new(vec![para("one")]);
        assert!(chapter.with_node_replaced(NodeId::fresh(), None).is_none());
    }

    #[test]
    fn block_insertion_before_and_after() {
        let chapter = ChapterNode::new(vec![para("a"), para("b")]);
        let anchor = chapter.blocks()[0].id();
        let rule = Arc::new(BlockNode::Rule(crate::nodes::blocks::RuleNode::new()));
        let inserted = chapter.with_block_inserted(anchor, rule, true).unwrap();
        assert_eq!(inserted.to_bookdown(), "\n\n-\n\na\n\nb");
    }

    #[test]
    fn projection_truncates_partial_leaves() {
        let chapter = ChapterNode::new(vec![para("First paragraph."), para("Last paragraph.")]);
        // "paragraph." of the first + "Last" of the second: units 6..20
        let fragment = chapter.with_units_in_range(6, 20);
        assert_eq!(fragment.to_bookdown(), "\n\nparagraph.\n\nLast");
    }

    #[test]
    fn projection_keeps_interior_rules() {
        let chapter = ChapterNode::new(vec![
            para("one"),
            Arc::new(BlockNode::Rule(crate::nodes::blocks::RuleNode::new())),
            para("two"),
        ]);
        let fragment = chapter.with_units_in_range(1, 5);
        assert_eq!(fragment.to_bookdown(), "\n\nne\n\n-\n\ntw");
        // Selection ending at the first paragraph's end excludes the rule.
        let fragment = chapter.with_units_in_range(1, 3);
        assert_eq!(fragment.to_bookdown(), "\n\nne");
    }

    #[test]
    fn citations_deduplicate_in_order() {
        use crate::nodes::atoms::CitationsNode;
        let format = FormatNode::new(
            None,
            vec![
                Segment::Atom(Arc::new(AtomNode::Citations(CitationsNode::new(vec![
                    "b".into(),
                    "a".into(),
                ])))),
                Segment::Atom(Arc::new(AtomNode::Citations(CitationsNode::new(vec![
                    "a".into(),
                    "c".into(),
                ])))),
            ],
        );
        let chapter = ChapterNode::new(vec![Arc::new(BlockNode::Paragraph(ParagraphNode::new(
            0, format,
        )))]);
        assert_eq!(chapter.citations(), vec!["b", "a", "c"]);
    }

    #[rstest]
    #[case(0, "a")]
    #[case(25, "z")]
    #[case(26, "aa")]
    #[case(51, "az")]
    #[case(52, "ba")]
    fn footnote_lettering(#[case] index: usize, #[case] symbol: &str) {
        assert_eq!(footnote_symbol(index), symbol);
    }
}
