use crate::nodes::NodeId;

/// Characters that carry meaning in inline Bookdown and must be escaped when
/// serializing plain text. Straight double quotes are included so that text
/// holding one survives the parser's quote smartening.
pub(crate) const ESCAPED_CHARS: &str = "\\*_`^<{}~:[]|%@\"";

/// Escape a plain string so it round-trips through the inline parser. The
/// second dash of any `--` pair is escaped too, or it would re-parse as an
/// em dash.
pub(crate) fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_dash = false;
    for ch in s.chars() {
        if ESCAPED_CHARS.contains(ch) || (ch == '-' && prev_dash) {
            out.push('\\');
            prev_dash = false;
        } else {
            prev_dash = ch == '-';
        }
        out.push(ch);
    }
    out
}

/// An atomic run of characters, the leaf of every format tree.
///
/// Carets address a `TextNode` by char offset in `[0, len]`. All mutators
/// return a new node; `with_*` keeps the node's identity (the logical node
/// survives the edit) while `copy` mints a fresh one.
#[derive(Debug, Clone)]
pub struct TextNode {
    id: NodeId,
    text: String,
}

impl TextNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: NodeId::fresh(),
            text: text.into(),
        }
    }

    pub fn empty() -> Self {
        Self::new("")
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in chars, the caret addressing unit.
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Byte offset of the given char offset, clamped to the end.
    fn byte_at(&self, index: usize) -> usize {
        self.text
            .char_indices()
            .nth(index)
            .map(|(b, _)| b)
            .unwrap_or(self.text.len())
    }

    /// Replace the entire text, keeping identity.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            id: self.id,
            text: text.into(),
        }
    }

    /// Insert a string at a char offset. Returns `None` when out of range.
    pub fn with_inserted(&self, index: usize, insertion: &str) -> Option<Self> {
        if index > self.len() {
            return None;
        }
        let at = self.byte_at(index);
        let mut text = String::with_capacity(self.text.len() + insertion.len());
        text.push_str(&self.text[..at]);
        text.push_str(insertion);
        text.push_str(&self.text[at..]);
        Some(self.with_text(text))
    }

    /// Remove the chars in `[start, end)`. Returns `None` when out of range.
    pub fn without_range(&self, start: usize, end: usize) -> Option<Self> {
        if start > end || end > self.len() {
            return None;
        }
        let (a, b) = (self.byte_at(start), self.byte_at(end));
        let mut text = String::with_capacity(self.text.len());
        text.push_str(&self.text[..a]);
        text.push_str(&self.text[b..]);
        Some(self.with_text(text))
    }

    /// The chars in `[start, end)` as a plain string, clamped to the length.
    pub fn slice(&self, start: usize, end: usize) -> String {
        let len = self.len();
        let (start, end) = (start.min(len), end.min(len).max(start.min(len)));
        let (a, b) = (self.byte_at(start), self.byte_at(end));
        self.text[a..b].to_string()
    }

    /// Deep structural copy with a fresh identity.
    pub fn copy(&self) -> Self {
        Self::new(self.text.clone())
    }

    pub fn to_text(&self) -> String {
        self.text.clone()
    }

    pub fn to_bookdown(&self) -> String {
        escape_text(&self.text)
    }
}
