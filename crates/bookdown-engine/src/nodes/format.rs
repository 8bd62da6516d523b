//! Format trees: ordered sequences of text, nested formats, and atoms.
//!
//! A `FormatNode` is the inline content of every block. Edits that cross
//! segment boundaries flatten the tree into a list of tagged runs, operate on
//! the runs, and rebuild. The flat-unit addressing (one unit per char, one
//! per atom) is also how carets are re-derived across merges and splits.

use std::sync::Arc;

use crate::nodes::atoms::AtomNode;
use crate::nodes::text::TextNode;
use crate::nodes::NodeId;

/// Inline formatting applied by a `FormatNode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Bold,
    Italic,
    Superscript,
    Subscript,
}

impl FormatTag {
    fn delimiters(&self) -> (&'static str, &'static str) {
        match self {
            FormatTag::Bold => ("*", "*"),
            FormatTag::Italic => ("_", "_"),
            FormatTag::Superscript => ("^", "^"),
            FormatTag::Subscript => ("^v", "^"),
        }
    }
}

/// One entry in a format tree.
#[derive(Debug, Clone)]
pub enum Segment {
    Text(Arc<TextNode>),
    Format(Arc<FormatNode>),
    Atom(Arc<AtomNode>),
}

impl Segment {
    pub fn id(&self) -> NodeId {
        match self {
            Segment::Text(n) => n.id(),
            Segment::Format(n) => n.id(),
            Segment::Atom(n) => n.id(),
        }
    }
}

/// Flattened inline content: a string or an atom, with the format tags in
/// effect, outermost first.
#[derive(Debug, Clone)]
pub(crate) enum RunContent {
    Text(String),
    Atom(Arc<AtomNode>),
}

#[derive(Debug, Clone)]
pub(crate) struct Run {
    pub(crate) content: RunContent,
    pub(crate) tags: Vec<FormatTag>,
}

impl Run {
    pub(crate) fn atom(atom: Arc<AtomNode>) -> Self {
        Run {
            content: RunContent::Atom(atom),
            tags: Vec::new(),
        }
    }

    pub(crate) fn units(&self) -> usize {
        match &self.content {
            RunContent::Text(s) => s.chars().count(),
            RunContent::Atom(_) => 1,
        }
    }
}

/// A node applying (at most) one format tag to an ordered segment sequence.
///
/// Invariant: a format never holds zero segments (a canonical empty
/// `TextNode` stands in), and atoms always have text neighbors so that every
/// boundary position is caret-addressable.
#[derive(Debug, Clone)]
pub struct FormatNode {
    id: NodeId,
    tag: Option<FormatTag>,
    segments: Vec<Segment>,
}

impl FormatNode {
    pub fn new(tag: Option<FormatTag>, segments: Vec<Segment>) -> Self {
        Self {
            id: NodeId::fresh(),
            tag,
            segments: Self::normalized(segments),
        }
    }

    pub fn empty() -> Self {
        Self::new(None, Vec::new())
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(None, vec![Segment::Text(Arc::new(TextNode::new(text)))])
    }

    /// Pad segment lists so atoms never sit at an edge or touch each other.
    fn normalized(segments: Vec<Segment>) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
        for segment in segments {
            if matches!(segment, Segment::Atom(_))
                && matches!(out.last(), None | Some(Segment::Atom(_)))
            {
                out.push(Segment::Text(Arc::new(TextNode::empty())));
            }
            out.push(segment);
        }
        if matches!(out.last(), None | Some(Segment::Atom(_))) {
            out.push(Segment::Text(Arc::new(TextNode::empty())));
        }
        out
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> Option<FormatTag> {
        self.tag
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// A rebuilt node that keeps this node's identity and tag.
    pub(crate) fn with_segments(&self, segments: Vec<Segment>) -> Self {
        Self {
            id: self.id,
            tag: self.tag,
            segments: Self::normalized(segments),
        }
    }

    pub fn copy(&self) -> Self {
        let segments = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => Segment::Text(Arc::new(t.copy())),
                Segment::Format(f) => Segment::Format(Arc::new(f.copy())),
                Segment::Atom(a) => Segment::Atom(Arc::new(a.copy())),
            })
            .collect();
        Self::new(self.tag, segments)
    }

    pub fn is_empty_text(&self) -> bool {
        self.units() == 0
    }

    // ===== Flat-unit addressing =====

    /// Total flat units: one per char, one per atom. Atom interiors are
    /// opaque.
    pub fn units(&self) -> usize {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => t.len(),
                Segment::Format(f) => f.units(),
                Segment::Atom(_) => 1,
            })
            .sum()
    }

    /// Flat offset of a caret `(node, index)` within this tree, if the node
    /// is one of its stops.
    pub fn flat_index_of(&self, node: NodeId, index: usize) -> Option<usize> {
        let mut pos = 0usize;
        self.flat_index_rec(node, index, &mut pos)
    }

    fn flat_index_rec(&self, node: NodeId, index: usize, pos: &mut usize) -> Option<usize> {
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => {
                    if t.id() == node && index <= t.len() {
                        return Some(*pos + index);
                    }
                    *pos += t.len();
                }
                Segment::Format(f) => {
                    if let Some(found) = f.flat_index_rec(node, index, pos) {
                        return Some(found);
                    }
                }
                Segment::Atom(a) => {
                    if a.id() == node {
                        return Some(*pos + index.min(1));
                    }
                    *pos += 1;
                }
            }
        }
        None
    }

    /// The caret at a flat offset, clamped to the end. Always lands in a text
    /// node (normalization guarantees one at every boundary).
    pub fn caret_at_flat(&self, offset: usize) -> (NodeId, usize) {
        let mut pos = 0usize;
        let mut last = None;
        if let Some(found) = self.caret_at_flat_rec(offset, &mut pos, &mut last) {
            return found;
        }
        last.expect("format tree always holds at least one text node")
    }

    fn caret_at_flat_rec(
        &self,
        offset: usize,
        pos: &mut usize,
        last: &mut Option<(NodeId, usize)>,
    ) -> Option<(NodeId, usize)> {
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => {
                    if offset >= *pos && offset <= *pos + t.len() {
                        return Some((t.id(), offset - *pos));
                    }
                    *pos += t.len();
                    *last = Some((t.id(), t.len()));
                }
                Segment::Format(f) => {
                    if let Some(found) = f.caret_at_flat_rec(offset, pos, last) {
                        return Some(found);
                    }
                }
                Segment::Atom(_) => {
                    *pos += 1;
                }
            }
        }
        None
    }

    /// Caret at the first addressable position.
    pub fn first_caret(&self) -> (NodeId, usize) {
        self.caret_at_flat(0)
    }

    /// Caret at the last addressable position.
    pub fn last_caret(&self) -> (NodeId, usize) {
        self.caret_at_flat(self.units())
    }

    /// Whether the id names one of this tree's caret stops (atom interiors
    /// excluded).
    pub fn contains_stop(&self, node: NodeId) -> bool {
        self.segments.iter().any(|s| match s {
            Segment::Text(t) => t.id() == node,
            Segment::Format(f) => f.contains_stop(node),
            Segment::Atom(a) => a.id() == node,
        })
    }

    // ===== Run flattening =====

    pub(crate) fn to_runs(&self) -> Vec<Run> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        if let Some(tag) = self.tag {
            stack.push(tag);
        }
        self.collect_runs(&mut stack, &mut out);
        out
    }

    fn collect_runs(&self, stack: &mut Vec<FormatTag>, out: &mut Vec<Run>) {
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => {
                    if !t.is_empty() {
                        out.push(Run {
                            content: RunContent::Text(t.text().to_string()),
                            tags: stack.clone(),
                        });
                    }
                }
                Segment::Format(f) => {
                    let pushed = f.tag.is_some();
                    if let Some(tag) = f.tag {
                        stack.push(tag);
                    }
                    f.collect_runs(stack, out);
                    if pushed {
                        stack.pop();
                    }
                }
                Segment::Atom(a) => {
                    out.push(Run {
                        content: RunContent::Atom(a.clone()),
                        tags: stack.clone(),
                    });
                }
            }
        }
    }

    /// Rebuild from runs, keeping this node's identity and tag. Runs are
    /// expected with this node's own tag still present (as `to_runs` emits
    /// them); it is stripped from the front of each run before grouping.
    pub(crate) fn rebuilt_from_runs(&self, runs: Vec<Run>) -> Self {
        let runs = coalesce(runs);
        let stripped: Vec<Run> = runs
            .into_iter()
            .map(|mut r| {
                if let Some(own) = self.tag {
                    if r.tags.first() == Some(&own) {
                        r.tags.remove(0);
                    }
                }
                r
            })
            .collect();
        self.with_segments(build_segments(&stripped))
    }

    /// A fresh format built from runs (no tag of its own).
    pub(crate) fn from_runs(runs: Vec<Run>) -> Self {
        let runs = coalesce(runs);
        Self::new(None, build_segments(&runs))
    }

    // ===== Run-based edits =====

    /// Remove the flat units in `[start, end)`.
    pub(crate) fn without_flat_range(&self, start: usize, end: usize) -> Self {
        let (head, rest) = split_runs(self.to_runs(), start);
        let (_, tail) = split_runs(rest, end.saturating_sub(start));
        let mut runs = head;
        runs.extend(tail);
        self.rebuilt_from_runs(runs)
    }

    /// Add or remove a tag over the flat units in `[start, end)`.
    pub(crate) fn with_flat_range_tagged(
        &self,
        start: usize,
        end: usize,
        tag: FormatTag,
        add: bool,
    ) -> Self {
        let (head, rest) = split_runs(self.to_runs(), start);
        let (mut mid, tail) = split_runs(rest, end.saturating_sub(start));
        for run in &mut mid {
            if add {
                if !run.tags.contains(&tag) {
                    run.tags.push(tag);
                }
            } else {
                run.tags.retain(|t| *t != tag);
            }
        }
        let mut runs = head;
        runs.extend(mid);
        runs.extend(tail);
        self.rebuilt_from_runs(runs)
    }

    /// Whether every run covered by `[start, end)` already carries the tag.
    pub(crate) fn flat_range_has_tag(&self, start: usize, end: usize, tag: FormatTag) -> bool {
        let (_, rest) = split_runs(self.to_runs(), start);
        let (mid, _) = split_runs(rest, end.saturating_sub(start));
        !mid.is_empty() && mid.iter().all(|r| r.tags.contains(&tag))
    }

    /// Splice runs in at a flat offset.
    pub(crate) fn with_runs_spliced(&self, at: usize, spliced: Vec<Run>) -> Self {
        let (mut head, tail) = split_runs(self.to_runs(), at);
        head.extend(spliced);
        head.extend(tail);
        self.rebuilt_from_runs(head)
    }

    /// Split into two trees at a flat offset. The left tree keeps this node's
    /// identity; the right is fresh.
    pub(crate) fn split_at_flat(&self, at: usize) -> (Self, Self) {
        let (head, tail) = split_runs(self.to_runs(), at);
        (self.rebuilt_from_runs(head), Self::from_runs(tail))
    }

    /// Concatenate another format's content after this one's.
    pub(crate) fn concatenated(&self, other: &FormatNode) -> Self {
        let mut runs = self.to_runs();
        runs.extend(other.to_runs());
        self.rebuilt_from_runs(runs)
    }

    /// Plain text of the flat units in `[start, end)`.
    pub(crate) fn text_in_flat_range(&self, start: usize, end: usize) -> String {
        let (_, rest) = split_runs(self.to_runs(), start);
        let (mid, _) = split_runs(rest, end.saturating_sub(start));
        mid.iter()
            .map(|r| match &r.content {
                RunContent::Text(s) => s.clone(),
                RunContent::Atom(a) => a.to_text(),
            })
            .collect()
    }

    // ===== Serialization =====

    pub fn to_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => t.to_text(),
                Segment::Format(f) => f.to_text(),
                Segment::Atom(a) => a.to_text(),
            })
            .collect()
    }

    pub fn to_bookdown(&self) -> String {
        let inner: String = self
            .segments
            .iter()
            .map(|s| match s {
                Segment::Text(t) => t.to_bookdown(),
                Segment::Format(f) => f.to_bookdown(),
                Segment::Atom(a) => a.to_bookdown(),
            })
            .collect();
        match self.tag {
            None => inner,
            Some(tag) => {
                let (open, close) = tag.delimiters();
                format!("{open}{inner}{close}")
            }
        }
    }
}

/// Merge adjacent text runs with identical tags and drop empty ones.
fn coalesce(runs: Vec<Run>) -> Vec<Run> {
    let mut out: Vec<Run> = Vec::with_capacity(runs.len());
    for run in runs {
        if let RunContent::Text(s) = &run.content {
            if s.is_empty() {
                continue;
            }
            if let Some(Run {
                content: RunContent::Text(prev),
                tags,
            }) = out.last_mut()
            {
                if *tags == run.tags {
                    prev.push_str(s);
                    continue;
                }
            }
        }
        out.push(run);
    }
    out
}

/// Group runs back into a segment tree, preserving the recorded tag nesting.
fn build_segments(runs: &[Run]) -> Vec<Segment> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < runs.len() {
        if runs[i].tags.is_empty() {
            match &runs[i].content {
                RunContent::Text(s) => out.push(Segment::Text(Arc::new(TextNode::new(s.clone())))),
                RunContent::Atom(a) => out.push(Segment::Atom(a.clone())),
            }
            i += 1;
        } else {
            let tag = runs[i].tags[0];
            let mut j = i;
            while j < runs.len() && runs[j].tags.first() == Some(&tag) {
                j += 1;
            }
            let inner: Vec<Run> = runs[i..j]
                .iter()
                .map(|r| Run {
                    content: r.content.clone(),
                    tags: r.tags[1..].to_vec(),
                })
                .collect();
            out.push(Segment::Format(Arc::new(FormatNode::new(
                Some(tag),
                build_segments(&inner),
            ))));
            i = j;
        }
    }
    out
}

/// Split runs at a flat offset, cutting a text run in two if needed.
fn split_runs(runs: Vec<Run>, at: usize) -> (Vec<Run>, Vec<Run>) {
    let mut head = Vec::new();
    let mut tail = Vec::new();
    let mut pos = 0usize;
    for run in runs {
        let units = run.units();
        if pos + units <= at {
            pos += units;
            head.push(run);
        } else if pos >= at {
            tail.push(run);
        } else {
            // at falls inside this run; only text runs can be cut.
            match run.content {
                RunContent::Text(s) => {
                    let cut = at - pos;
                    let byte = s
                        .char_indices()
                        .nth(cut)
                        .map(|(b, _)| b)
                        .unwrap_or(s.len());
                    head.push(Run {
                        content: RunContent::Text(s[..byte].to_string()),
                        tags: run.tags.clone(),
                    });
                    tail.push(Run {
                        content: RunContent::Text(s[byte..].to_string()),
                        tags: run.tags,
                    });
                }
                RunContent::Atom(a) => tail.push(Run {
                    content: RunContent::Atom(a),
                    tags: run.tags,
                }),
            }
            pos += units;
        }
    }
    (head, tail)
}
