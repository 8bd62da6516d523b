//! Inline atom nodes.
//!
//! Atoms are the inline constructs the caret model treats as a single
//! indivisible stop: links, citation lists, footnotes, definitions, labels,
//! comments, inline code, and inline error markers. Each wraps metadata
//! strings and/or a nested format tree; entering an atom's interior requires
//! explicit focus rather than ordinary caret movement.

use std::sync::Arc;

use crate::nodes::format::FormatNode;
use crate::nodes::text::escape_text;
use crate::nodes::NodeId;

/// A hyperlink. The text is plain (no nested formatting); the url is either
/// an external address or an internal `chapter` / `chapter:label` target.
#[derive(Debug, Clone)]
pub struct LinkNode {
    id: NodeId,
    text: String,
    url: String,
}

impl LinkNode {
    pub fn new(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: NodeId::fresh(),
            text: text.into(),
            url: url.into(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// True when the target is a chapter id rather than an external address.
    pub fn is_internal(&self) -> bool {
        !self.url.contains("://")
    }

    /// The chapter id of an internal target, without any `:label` suffix.
    pub fn chapter_target(&self) -> Option<&str> {
        if self.is_internal() && !self.url.is_empty() {
            Some(self.url.split(':').next().unwrap_or(&self.url))
        } else {
            None
        }
    }
}

/// An ordered list of citation identifiers, rendered as one stop.
#[derive(Debug, Clone)]
pub struct CitationsNode {
    id: NodeId,
    citations: Vec<String>,
}

impl CitationsNode {
    pub fn new(citations: Vec<String>) -> Self {
        Self {
            id: NodeId::fresh(),
            citations,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn citations(&self) -> &[String] {
        &self.citations
    }
}

/// A footnote wrapping a nested format tree.
#[derive(Debug, Clone)]
pub struct FootnoteNode {
    id: NodeId,
    content: Arc<FormatNode>,
}

impl FootnoteNode {
    pub fn new(content: FormatNode) -> Self {
        Self {
            id: NodeId::fresh(),
            content: Arc::new(content),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn content(&self) -> &Arc<FormatNode> {
        &self.content
    }

    pub fn with_content(&self, content: Arc<FormatNode>) -> Self {
        Self {
            id: self.id,
            content,
        }
    }
}

/// A glossary definition: the defined phrase plus the glossary entry id.
#[derive(Debug, Clone)]
pub struct DefinitionNode {
    id: NodeId,
    phrase: String,
    glossary_id: String,
}

impl DefinitionNode {
    pub fn new(phrase: impl Into<String>, glossary_id: impl Into<String>) -> Self {
        Self {
            id: NodeId::fresh(),
            phrase: phrase.into(),
            glossary_id: glossary_id.into(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn glossary_id(&self) -> &str {
        &self.glossary_id
    }
}

/// An anchor other chapters can link to with `chapter:label` targets.
#[derive(Debug, Clone)]
pub struct LabelNode {
    id: NodeId,
    label_id: String,
}

impl LabelNode {
    pub fn new(label_id: impl Into<String>) -> Self {
        Self {
            id: NodeId::fresh(),
            label_id: label_id.into(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn label_id(&self) -> &str {
        &self.label_id
    }
}

/// An authorial comment, never part of the rendered text.
#[derive(Debug, Clone)]
pub struct CommentNode {
    id: NodeId,
    content: Arc<FormatNode>,
}

impl CommentNode {
    pub fn new(content: FormatNode) -> Self {
        Self {
            id: NodeId::fresh(),
            content: Arc::new(content),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn content(&self) -> &Arc<FormatNode> {
        &self.content
    }

    pub fn with_content(&self, content: Arc<FormatNode>) -> Self {
        Self {
            id: self.id,
            content,
        }
    }
}

/// A verbatim inline code span. The content is a raw zone: nothing inside is
/// parsed, so it cannot itself contain a backtick.
#[derive(Debug, Clone)]
pub struct InlineCodeNode {
    id: NodeId,
    code: String,
}

impl InlineCodeNode {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            id: NodeId::fresh(),
            code: code.into(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

/// A parse-failure marker. Serializes back to the raw text it swallowed, so
/// error spans round-trip losslessly. Used both inline (as an atom) and at
/// block level.
#[derive(Debug, Clone)]
pub struct ErrorNode {
    id: NodeId,
    text: String,
    message: String,
}

impl ErrorNode {
    pub fn new(text: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: NodeId::fresh(),
            text: text.into(),
            message: message.into(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn copy(&self) -> Self {
        Self::new(self.text.clone(), self.message.clone())
    }
}

/// The closed set of inline atoms.
#[derive(Debug, Clone)]
pub enum AtomNode {
    Link(LinkNode),
    Citations(CitationsNode),
    Footnote(FootnoteNode),
    Definition(DefinitionNode),
    Label(LabelNode),
    Comment(CommentNode),
    Code(InlineCodeNode),
    Error(ErrorNode),
}

impl AtomNode {
    pub fn id(&self) -> NodeId {
        match self {
            AtomNode::Link(n) => n.id(),
            AtomNode::Citations(n) => n.id(),
            AtomNode::Footnote(n) => n.id(),
            AtomNode::Definition(n) => n.id(),
            AtomNode::Label(n) => n.id(),
            AtomNode::Comment(n) => n.id(),
            AtomNode::Code(n) => n.id(),
            AtomNode::Error(n) => n.id(),
        }
    }

    /// Deep structural copy with fresh identities throughout.
    pub fn copy(&self) -> Self {
        match self {
            AtomNode::Link(n) => AtomNode::Link(LinkNode::new(n.text.clone(), n.url.clone())),
            AtomNode::Citations(n) => AtomNode::Citations(CitationsNode::new(n.citations.clone())),
            AtomNode::Footnote(n) => AtomNode::Footnote(FootnoteNode::new(n.content.copy())),
            AtomNode::Definition(n) => {
                AtomNode::Definition(DefinitionNode::new(n.phrase.clone(), n.glossary_id.clone()))
            }
            AtomNode::Label(n) => AtomNode::Label(LabelNode::new(n.label_id.clone())),
            AtomNode::Comment(n) => AtomNode::Comment(CommentNode::new(n.content.copy())),
            AtomNode::Code(n) => AtomNode::Code(InlineCodeNode::new(n.code.clone())),
            AtomNode::Error(n) => AtomNode::Error(n.copy()),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            AtomNode::Link(n) => n.text.clone(),
            AtomNode::Citations(_) => String::new(),
            AtomNode::Footnote(n) => n.content.to_text(),
            AtomNode::Definition(n) => n.phrase.clone(),
            AtomNode::Label(_) => String::new(),
            // Comments are authorial asides, not document text.
            AtomNode::Comment(_) => String::new(),
            AtomNode::Code(n) => n.code.clone(),
            AtomNode::Error(_) => String::new(),
        }
    }

    pub fn to_bookdown(&self) -> String {
        match self {
            AtomNode::Link(n) => format!("[{}|{}]", escape_text(&n.text), n.url),
            AtomNode::Citations(n) => format!("<{}>", n.citations.join(",")),
            AtomNode::Footnote(n) => format!("{{{}}}", n.content.to_bookdown()),
            AtomNode::Definition(n) => {
                format!("~{}~{}", escape_text(&n.phrase), n.glossary_id)
            }
            AtomNode::Label(n) => format!(":{} ", n.label_id),
            AtomNode::Comment(n) => format!("%{}%", n.content.to_bookdown()),
            AtomNode::Code(n) => format!("`{}`", n.code),
            AtomNode::Error(n) => n.text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn link_internal_targets() {
        let external = LinkNode::new("site", "https://example.com");
        assert!(!external.is_internal());
        assert_eq!(external.chapter_target(), None);

        let internal = LinkNode::new("intro", "chapter1:section2");
        assert!(internal.is_internal());
        assert_eq!(internal.chapter_target(), Some("chapter1"));
    }

    #[test]
    fn atom_serialization() {
        assert_eq!(
            AtomNode::Link(LinkNode::new("text", "url")).to_bookdown(),
            "[text|url]"
        );
        assert_eq!(
            AtomNode::Citations(CitationsNode::new(vec!["a".into(), "b".into()])).to_bookdown(),
            "<a,b>"
        );
        assert_eq!(
            AtomNode::Definition(DefinitionNode::new("phrase", "gloss")).to_bookdown(),
            "~phrase~gloss"
        );
        assert_eq!(
            AtomNode::Label(LabelNode::new("anchor")).to_bookdown(),
            ":anchor "
        );
        assert_eq!(
            AtomNode::Code(InlineCodeNode::new("x + y")).to_bookdown(),
            "`x + y`"
        );
    }

    #[test]
    fn error_round_trips_raw_text() {
        let atom = AtomNode::Error(ErrorNode::new("<unclosed", "unclosed citation"));
        assert_eq!(atom.to_bookdown(), "<unclosed");
    }

    #[test]
    fn copy_refreshes_identity() {
        let atom = AtomNode::Link(LinkNode::new("t", "u"));
        assert_ne!(atom.copy().id(), atom.id());
    }
}
