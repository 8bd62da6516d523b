//! Block grammar: line-based recursive descent.
//!
//! Each block form is recognized from its first line; fenced forms (code,
//! quote, callout) consume lines until their closing delimiter and parse
//! their interior recursively. A paragraph is a single source line. Malformed
//! constructs become error blocks; parsing always completes.

use std::collections::HashSet;
use std::sync::Arc;

use crate::nodes::atoms::ErrorNode;
use crate::nodes::blocks::{BlockNode, CodeNode, EmbedNode, ParagraphNode, Position, RuleNode};
use crate::nodes::format::FormatNode;
use crate::nodes::list::ListNode;
use crate::nodes::quote::{CalloutNode, QuoteNode};
use crate::nodes::table::TableNode;
use crate::parsing::context::ParseContext;
use crate::parsing::inline::parse_inline;

pub(crate) struct BlockParser<'a> {
    context: &'a ParseContext,
    labels: HashSet<String>,
    lines: Vec<String>,
    i: usize,
}

impl<'a> BlockParser<'a> {
    pub(crate) fn new(context: &'a ParseContext, text: &str) -> Self {
        Self {
            context,
            labels: HashSet::new(),
            lines: text.lines().map(String::from).collect(),
            i: 0,
        }
    }

    pub(crate) fn parse(mut self) -> Vec<Arc<BlockNode>> {
        self.parse_blocks(None)
    }

    fn inline(&mut self, text: &str) -> FormatNode {
        parse_inline(self.context, &mut self.labels, text)
    }

    /// Parse blocks until end of input or a line starting with `terminator`
    /// (left for the caller to consume).
    fn parse_blocks(&mut self, terminator: Option<char>) -> Vec<Arc<BlockNode>> {
        let mut blocks = Vec::new();
        while self.i < self.lines.len() {
            let line = self.lines[self.i].clone();
            if let Some(t) = terminator {
                if line.starts_with(t) {
                    break;
                }
            }
            if line.trim().is_empty() {
                self.i += 1;
                continue;
            }
            blocks.push(Arc::new(self.parse_block()));
        }
        blocks
    }

    fn parse_block(&mut self) -> BlockNode {
        let line = self.lines[self.i].clone();
        if line.starts_with('#') {
            self.i += 1;
            return self.parse_header(&line);
        }
        if line == "-" {
            self.i += 1;
            return BlockNode::Rule(RuleNode::new());
        }
        if line.starts_with('|') {
            self.i += 1;
            return parse_embed_content(&line, &mut |s| self.inline(s));
        }
        if bullet_marker(&line).is_some() || numbered_marker(&line).is_some() {
            return self.parse_list();
        }
        if line.starts_with('`') {
            return self.parse_code(&line);
        }
        if line == "\"" {
            return self.parse_quote();
        }
        if line == "=" {
            return self.parse_callout();
        }
        if line.starts_with(',') {
            return self.parse_table();
        }
        self.i += 1;
        BlockNode::Paragraph(ParagraphNode::new(0, self.inline(&line)))
    }

    fn parse_header(&mut self, line: &str) -> BlockNode {
        let level = line.chars().take_while(|c| *c == '#').count().min(3);
        let content = line[level..].trim_start();
        BlockNode::Paragraph(ParagraphNode::new(level as u8, self.inline(content)))
    }

    fn parse_list(&mut self) -> BlockNode {
        let numbered = numbered_marker(&self.lines[self.i]).is_some();
        let mut leaves = Vec::new();
        while self.i < self.lines.len() {
            let line = self.lines[self.i].clone();
            let marker = if numbered {
                numbered_marker(&line)
            } else {
                bullet_marker(&line)
            };
            let Some((depth, content)) = marker else {
                break;
            };
            let format = self.inline(&content);
            leaves.push((depth, Arc::new(format)));
            self.i += 1;
        }
        match ListNode::from_leaves(numbered, &leaves) {
            Some(list) => BlockNode::List(list),
            None => BlockNode::Error(ErrorNode::new(String::new(), "empty list")),
        }
    }

    fn parse_code(&mut self, opening: &str) -> BlockNode {
        let language = opening[1..].trim().to_string();
        self.i += 1;
        let mut body = Vec::new();
        let mut closing = None;
        while self.i < self.lines.len() {
            let line = self.lines[self.i].clone();
            self.i += 1;
            if line.starts_with('`') {
                closing = Some(line);
                break;
            }
            body.push(line);
        }
        let mut executable = false;
        let mut position = Position::Default;
        let mut caption = FormatNode::empty();
        if let Some(close) = closing {
            let mut rest = &close[1..];
            if let Some(after) = rest.strip_prefix('!') {
                executable = true;
                rest = after;
            }
            if let Some(p) = rest.chars().next().and_then(Position::from_char) {
                position = p;
                rest = &rest[1..];
            }
            let rest = rest.trim_start();
            if !rest.is_empty() {
                caption = self.inline(rest);
            }
        }
        BlockNode::Code(CodeNode::new(
            body.join("\n"),
            language,
            executable,
            caption,
            position,
        ))
    }

    fn parse_quote(&mut self) -> BlockNode {
        self.i += 1; // opening "
        let blocks = self.parse_blocks(Some('"'));
        let mut credit = FormatNode::empty();
        let mut position = Position::Default;
        if self.i < self.lines.len() {
            let close = self.lines[self.i].clone();
            self.i += 1;
            let mut rest = &close[1..];
            if let Some(p) = rest.chars().next().and_then(Position::from_char) {
                position = p;
                rest = &rest[1..];
            }
            let rest = rest.trim_start();
            if !rest.is_empty() {
                credit = self.inline(rest);
            }
        }
        BlockNode::Quote(QuoteNode::new(blocks, credit, position))
    }

    fn parse_callout(&mut self) -> BlockNode {
        self.i += 1; // opening =
        let blocks = self.parse_blocks(Some('='));
        let mut position = Position::Default;
        if self.i < self.lines.len() {
            let close = self.lines[self.i].clone();
            self.i += 1;
            if let Some(p) = close[1..].chars().next().and_then(Position::from_char) {
                position = p;
            }
        }
        BlockNode::Callout(CalloutNode::new(blocks, position))
    }

    fn parse_table(&mut self) -> BlockNode {
        let mut rows = Vec::new();
        while self.i < self.lines.len() && self.lines[self.i].starts_with(',') {
            let line = self.lines[self.i].clone();
            self.i += 1;
            let cells = split_unescaped(&line[1..], '|')
                .into_iter()
                .map(|cell| Arc::new(self.inline(&cell)))
                .collect();
            rows.push(cells);
        }
        let mut caption = FormatNode::empty();
        if self.i < self.lines.len() && !self.lines[self.i].trim().is_empty() {
            let line = self.lines[self.i].clone();
            self.i += 1;
            caption = self.inline(&line);
        }
        BlockNode::Table(TableNode::new(rows, caption))
    }
}

/// `*`-repetition list marker: depth and content, requiring a space after
/// the marker so emphasis at line start is not mistaken for a list.
fn bullet_marker(line: &str) -> Option<(usize, String)> {
    let stars = line.chars().take_while(|c| *c == '*').count();
    if stars == 0 {
        return None;
    }
    line[stars..]
        .strip_prefix(' ')
        .map(|rest| (stars, rest.to_string()))
}

/// `N.`-style marker where the dot count encodes depth (`1.` top level,
/// `1..` nested).
fn numbered_marker(line: &str) -> Option<(usize, String)> {
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let dots = line[digits..].chars().take_while(|c| *c == '.').count();
    if dots == 0 {
        return None;
    }
    line[digits + dots..]
        .strip_prefix(' ')
        .map(|rest| (dots, rest.to_string()))
}

/// Split on a separator, honoring backslash escapes (which are kept for the
/// inline parser to resolve).
fn split_unescaped(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            current.push(ch);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if ch == sep {
            out.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    out.push(current);
    out
}

/// Parse a `|url|alt|caption|credit|` embed line, or produce an error block.
pub(crate) fn parse_embed_content(
    line: &str,
    inline: &mut impl FnMut(&str) -> FormatNode,
) -> BlockNode {
    let parts = split_unescaped(line, '|');
    if parts.len() != 6 || !parts[0].is_empty() {
        return BlockNode::Error(ErrorNode::new(line, "malformed embed"));
    }
    let url = parts[1].clone();
    if url.is_empty() {
        return BlockNode::Error(ErrorNode::new(line, "embed missing url"));
    }
    let trailing = &parts[5];
    let position = match (trailing.as_str(), trailing.chars().next()) {
        ("", _) => Position::Default,
        (t, Some(c)) if t.chars().count() == 1 => match Position::from_char(c) {
            Some(p) => p,
            None => return BlockNode::Error(ErrorNode::new(line, "malformed embed")),
        },
        _ => return BlockNode::Error(ErrorNode::new(line, "malformed embed")),
    };
    let description = unescape(&parts[2]);
    let caption = inline(&parts[3]);
    let credit = inline(&parts[4]);
    BlockNode::Embed(EmbedNode::new(url, description, caption, credit, position))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Standalone embed parse with a fresh label scope.
pub(crate) fn parse_embed_text(context: &ParseContext, text: &str) -> BlockNode {
    let mut labels = HashSet::new();
    parse_embed_content(text.trim(), &mut |s| parse_inline(context, &mut labels, s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse_blocks(text: &str) -> Vec<Arc<BlockNode>> {
        BlockParser::new(&ParseContext::new(), text).parse()
    }

    fn parse_one(text: &str) -> BlockNode {
        let blocks = parse_blocks(text);
        assert_eq!(blocks.len(), 1, "expected one block from {text:?}");
        (*blocks[0]).clone()
    }

    // ===== Simple blocks =====

    #[test]
    fn paragraph_is_one_line() {
        let blocks = parse_blocks("First paragraph.\nSecond paragraph.");
        assert_eq!(blocks.len(), 2);
    }

    #[rstest]
    #[case("# One", 1)]
    #[case("## Two", 2)]
    #[case("### Three", 3)]
    fn headers_by_level(#[case] text: &str, #[case] level: u8) {
        match parse_one(text) {
            BlockNode::Paragraph(p) => assert_eq!(p.level(), level),
            other => panic!("expected header, got {other:?}"),
        }
    }

    #[test]
    fn rule_is_a_lone_dash() {
        assert!(matches!(parse_one("-"), BlockNode::Rule(_)));
        assert!(matches!(parse_one("- not a rule"), BlockNode::Paragraph(_)));
    }

    // ===== Lists =====

    #[test]
    fn bulleted_list_with_nesting() {
        match parse_one("* one\n** sub\n* two") {
            BlockNode::List(list) => {
                assert!(!list.numbered());
                let leaves = list.leaves_with_depth();
                let depths: Vec<usize> = leaves.iter().map(|(d, _)| *d).collect();
                assert_eq!(depths, vec![1, 2, 1]);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn numbered_list_depth_by_dots() {
        match parse_one("1. one\n2.. sub\n3. two") {
            BlockNode::List(list) => {
                assert!(list.numbered());
                let depths: Vec<usize> =
                    list.leaves_with_depth().iter().map(|(d, _)| *d).collect();
                assert_eq!(depths, vec![1, 2, 1]);
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn marker_style_change_splits_lists() {
        let blocks = parse_blocks("1. a\n2. b\n* c\n* d");
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&*blocks[0], BlockNode::List(l) if l.numbered()));
        assert!(matches!(&*blocks[1], BlockNode::List(l) if !l.numbered()));
    }

    #[test]
    fn emphasis_at_line_start_is_not_a_list() {
        assert!(matches!(parse_one("*bold* start"), BlockNode::Paragraph(_)));
    }

    // ===== Fenced blocks =====

    #[test]
    fn code_fence_with_language() {
        match parse_one("`rust\nfn main() {}\nlet x = 1;\n`") {
            BlockNode::Code(code) => {
                assert_eq!(code.language(), "rust");
                assert_eq!(code.code().text(), "fn main() {}\nlet x = 1;");
                assert!(!code.executable());
            }
            other => panic!("expected code, got {other:?}"),
        }
    }

    #[test]
    fn executable_code_with_caption() {
        match parse_one("`python\nprint(1)\n`! output demo") {
            BlockNode::Code(code) => {
                assert!(code.executable());
                assert_eq!(code.caption().to_text(), "output demo");
            }
            other => panic!("expected code, got {other:?}"),
        }
    }

    #[test]
    fn quote_with_credit_and_position() {
        match parse_one("\"\nWise words.\n\"> A. Author") {
            BlockNode::Quote(quote) => {
                assert_eq!(quote.blocks().len(), 1);
                assert_eq!(quote.credit().to_text(), "A. Author");
                assert_eq!(quote.position(), Position::Right);
            }
            other => panic!("expected quote, got {other:?}"),
        }
    }

    #[test]
    fn callout_holds_blocks() {
        match parse_one("=\nNote one.\n\nNote two.\n=") {
            BlockNode::Callout(callout) => assert_eq!(callout.blocks().len(), 2),
            other => panic!("expected callout, got {other:?}"),
        }
    }

    // ===== Tables and embeds =====

    #[test]
    fn table_rows_and_caption() {
        match parse_one(",a|b\n,c|d\nNumbers") {
            BlockNode::Table(table) => {
                assert_eq!(table.row_count(), 2);
                assert_eq!(table.column_count(), 2);
                assert_eq!(table.caption().to_text(), "Numbers");
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn table_cell_with_escaped_pipe() {
        match parse_one(",a\\|b|c") {
            BlockNode::Table(table) => {
                assert_eq!(table.column_count(), 2);
                assert_eq!(table.cell(0, 0).unwrap().to_text(), "a|b");
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn embed_with_all_fields() {
        match parse_one("|cat.png|a cat|A cat.|Me|") {
            BlockNode::Embed(embed) => {
                assert_eq!(embed.url(), "cat.png");
                assert_eq!(embed.description(), "a cat");
                assert_eq!(embed.caption().to_text(), "A cat.");
                assert_eq!(embed.credit().to_text(), "Me");
            }
            other => panic!("expected embed, got {other:?}"),
        }
    }

    #[test]
    fn malformed_embed_is_an_error_block() {
        match parse_one("|missing|fields|") {
            BlockNode::Error(e) => assert_eq!(e.message(), "malformed embed"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn unclosed_code_fence_runs_to_end() {
        match parse_one("`\ncode line") {
            BlockNode::Code(code) => assert_eq!(code.code().text(), "code line"),
            other => panic!("expected code, got {other:?}"),
        }
    }
}
