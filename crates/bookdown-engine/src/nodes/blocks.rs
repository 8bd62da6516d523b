//! Block-level nodes and the closed `BlockNode` set.

use std::sync::Arc;

use crate::nodes::atoms::ErrorNode;
use crate::nodes::format::FormatNode;
use crate::nodes::list::ListNode;
use crate::nodes::quote::{CalloutNode, QuoteNode};
use crate::nodes::table::TableNode;
use crate::nodes::text::TextNode;
use crate::nodes::NodeId;

/// Marginal placement selected by a `<`/`>` suffix on a block delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Default,
    Left,
    Right,
}

impl Position {
    pub(crate) fn suffix(&self) -> &'static str {
        match self {
            Position::Default => "",
            Position::Left => "<",
            Position::Right => ">",
        }
    }

    pub(crate) fn from_char(ch: char) -> Option<Self> {
        match ch {
            '<' => Some(Position::Left),
            '>' => Some(Position::Right),
            _ => None,
        }
    }
}

/// A paragraph, or a header when the level is 1–3.
#[derive(Debug, Clone)]
pub struct ParagraphNode {
    id: NodeId,
    level: u8,
    content: Arc<FormatNode>,
}

impl ParagraphNode {
    pub fn new(level: u8, content: FormatNode) -> Self {
        Self {
            id: NodeId::fresh(),
            level: level.min(3),
            content: Arc::new(content),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn content(&self) -> &Arc<FormatNode> {
        &self.content
    }

    pub(crate) fn with_content(&self, content: Arc<FormatNode>) -> Self {
        Self {
            id: self.id,
            level: self.level,
            content,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(self.level, self.content.copy())
    }

    pub fn to_bookdown(&self) -> String {
        let content = self.content.to_bookdown();
        if self.level > 0 {
            return format!("{} {}", "#".repeat(self.level as usize), content);
        }
        // A leading character that would re-parse as a block marker gets an
        // escape so plain paragraphs round-trip.
        let needs_guard = content.starts_with('#')
            || content.starts_with(',')
            || content == "-"
            || content == "="
            || content == "\""
            || leading_numbered_marker(&content);
        if needs_guard {
            format!("\\{content}")
        } else {
            content
        }
    }

    pub fn to_text(&self) -> String {
        self.content.to_text()
    }
}

/// True for text like `12. ` that would re-parse as a numbered list line.
fn leading_numbered_marker(s: &str) -> bool {
    let digits = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    s.chars().skip(digits).take_while(|c| *c == '.').count() > 0
}

/// A fenced code block. The code itself is a raw zone held in a `TextNode`
/// so carets can edit it.
#[derive(Debug, Clone)]
pub struct CodeNode {
    id: NodeId,
    code: Arc<TextNode>,
    language: String,
    executable: bool,
    caption: Arc<FormatNode>,
    position: Position,
}

impl CodeNode {
    pub fn new(
        code: impl Into<String>,
        language: impl Into<String>,
        executable: bool,
        caption: FormatNode,
        position: Position,
    ) -> Self {
        Self {
            id: NodeId::fresh(),
            code: Arc::new(TextNode::new(code)),
            language: language.into(),
            executable,
            caption: Arc::new(caption),
            position,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn code(&self) -> &Arc<TextNode> {
        &self.code
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn executable(&self) -> bool {
        self.executable
    }

    pub fn caption(&self) -> &Arc<FormatNode> {
        &self.caption
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn with_code(&self, code: Arc<TextNode>) -> Self {
        Self {
            id: self.id,
            code,
            language: self.language.clone(),
            executable: self.executable,
            caption: self.caption.clone(),
            position: self.position,
        }
    }

    pub(crate) fn with_caption(&self, caption: Arc<FormatNode>) -> Self {
        Self {
            id: self.id,
            code: self.code.clone(),
            language: self.language.clone(),
            executable: self.executable,
            caption,
            position: self.position,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(
            self.code.text().to_string(),
            self.language.clone(),
            self.executable,
            self.caption.copy(),
            self.position,
        )
    }

    pub fn to_bookdown(&self) -> String {
        let mut out = format!("`{}\n{}\n`", self.language, self.code.text());
        if self.executable {
            out.push('!');
        }
        out.push_str(self.position.suffix());
        if !self.caption.is_empty_text() {
            out.push(' ');
            out.push_str(&self.caption.to_bookdown());
        }
        out
    }

    pub fn to_text(&self) -> String {
        self.code.text().to_string()
    }
}

/// Embedded media: url and alt description plus caption and credit trees.
#[derive(Debug, Clone)]
pub struct EmbedNode {
    id: NodeId,
    url: String,
    description: String,
    caption: Arc<FormatNode>,
    credit: Arc<FormatNode>,
    position: Position,
}

impl EmbedNode {
    pub fn new(
        url: impl Into<String>,
        description: impl Into<String>,
        caption: FormatNode,
        credit: FormatNode,
        position: Position,
    ) -> Self {
        Self {
            id: NodeId::fresh(),
            url: url.into(),
            description: description.into(),
            caption: Arc::new(caption),
            credit: Arc::new(credit),
            position,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn caption(&self) -> &Arc<FormatNode> {
        &self.caption
    }

    pub fn credit(&self) -> &Arc<FormatNode> {
        &self.credit
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn with_caption(&self, caption: Arc<FormatNode>) -> Self {
        let mut embed = self.clone();
        embed.caption = caption;
        embed
    }

    pub(crate) fn with_credit(&self, credit: Arc<FormatNode>) -> Self {
        let mut embed = self.clone();
        embed.credit = credit;
        embed
    }

    pub fn copy(&self) -> Self {
        Self::new(
            self.url.clone(),
            self.description.clone(),
            self.caption.copy(),
            self.credit.copy(),
            self.position,
        )
    }

    pub fn to_bookdown(&self) -> String {
        format!(
            "|{}|{}|{}|{}|{}",
            self.url,
            crate::nodes::text::escape_text(&self.description),
            self.caption.to_bookdown(),
            self.credit.to_bookdown(),
            self.position.suffix()
        )
    }

    pub fn to_text(&self) -> String {
        self.caption.to_text()
    }
}

/// A horizontal rule.
#[derive(Debug, Clone)]
pub struct RuleNode {
    id: NodeId,
}

impl RuleNode {
    pub fn new() -> Self {
        Self {
            id: NodeId::fresh(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl Default for RuleNode {
    fn default() -> Self {
        Self::new()
    }
}

/// The closed set of block nodes.
#[derive(Debug, Clone)]
pub enum BlockNode {
    Paragraph(ParagraphNode),
    List(ListNode),
    Table(TableNode),
    Quote(QuoteNode),
    Callout(CalloutNode),
    Code(CodeNode),
    Embed(EmbedNode),
    Rule(RuleNode),
    Error(ErrorNode),
}

impl BlockNode {
    pub fn id(&self) -> NodeId {
        match self {
            BlockNode::Paragraph(n) => n.id(),
            BlockNode::List(n) => n.id(),
            BlockNode::Table(n) => n.id(),
            BlockNode::Quote(n) => n.id(),
            BlockNode::Callout(n) => n.id(),
            BlockNode::Code(n) => n.id(),
            BlockNode::Embed(n) => n.id(),
            BlockNode::Rule(n) => n.id(),
            BlockNode::Error(n) => n.id(),
        }
    }

    pub fn copy(&self) -> Self {
        match self {
            BlockNode::Paragraph(n) => BlockNode::Paragraph(n.copy()),
            BlockNode::List(n) => BlockNode::List(n.copy()),
            BlockNode::Table(n) => BlockNode::Table(n.copy()),
            BlockNode::Quote(n) => BlockNode::Quote(n.copy()),
            BlockNode::Callout(n) => BlockNode::Callout(n.copy()),
            BlockNode::Code(n) => BlockNode::Code(n.copy()),
            BlockNode::Embed(n) => BlockNode::Embed(n.copy()),
            BlockNode::Rule(_) => BlockNode::Rule(RuleNode::new()),
            BlockNode::Error(n) => BlockNode::Error(n.copy()),
        }
    }

    pub fn to_bookdown(&self) -> String {
        match self {
            BlockNode::Paragraph(n) => n.to_bookdown(),
            BlockNode::List(n) => n.to_bookdown(),
            BlockNode::Table(n) => n.to_bookdown(),
            BlockNode::Quote(n) => n.to_bookdown(),
            BlockNode::Callout(n) => n.to_bookdown(),
            BlockNode::Code(n) => n.to_bookdown(),
            BlockNode::Embed(n) => n.to_bookdown(),
            BlockNode::Rule(_) => "-".to_string(),
            BlockNode::Error(n) => n.text().to_string(),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            BlockNode::Paragraph(n) => n.to_text(),
            BlockNode::List(n) => n.to_text(),
            BlockNode::Table(n) => n.to_text(),
            BlockNode::Quote(n) => n.to_text(),
            BlockNode::Callout(n) => n.to_text(),
            BlockNode::Code(n) => n.to_text(),
            BlockNode::Embed(n) => n.to_text(),
            BlockNode::Rule(_) => String::new(),
            BlockNode::Error(_) => String::new(),
        }
    }
}
