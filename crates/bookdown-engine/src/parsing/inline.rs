//! Inline grammar: formatting, atoms, escapes, and text smartening.
//!
//! Dispatch is by special character. Formatting (`*`, `_`, `^`) closes
//! implicitly at end of input; bracketed atoms that never close become inline
//! error markers holding the raw text they consumed, so nothing ever aborts
//! a parse and every error span round-trips verbatim.

use std::collections::HashSet;
use std::sync::Arc;

use crate::nodes::atoms::{
    AtomNode, CitationsNode, CommentNode, DefinitionNode, ErrorNode, FootnoteNode, InlineCodeNode,
    LabelNode, LinkNode,
};
use crate::nodes::format::{FormatNode, FormatTag, Segment};
use crate::nodes::text::TextNode;
use crate::parsing::context::ParseContext;
use crate::parsing::cursor::Cursor;

pub(crate) struct InlineState<'a> {
    context: &'a ParseContext,
    labels: &'a mut HashSet<String>,
    quote_open: bool,
}

impl<'a> InlineState<'a> {
    pub(crate) fn new(context: &'a ParseContext, labels: &'a mut HashSet<String>) -> Self {
        Self {
            context,
            labels,
            quote_open: false,
        }
    }
}

/// Parse one line of inline content into a format tree.
pub(crate) fn parse_inline(
    context: &ParseContext,
    labels: &mut HashSet<String>,
    text: &str,
) -> FormatNode {
    let mut cur = Cursor::new(text);
    let mut state = InlineState::new(context, labels);
    let segments = parse_segments(&mut cur, &mut state, &[]);
    FormatNode::new(None, segments)
}

fn flush(segments: &mut Vec<Segment>, buf: &mut String) {
    if !buf.is_empty() {
        segments.push(Segment::Text(Arc::new(TextNode::new(std::mem::take(buf)))));
    }
}

fn error_atom(raw: impl Into<String>, message: impl Into<String>) -> Segment {
    Segment::Atom(Arc::new(AtomNode::Error(ErrorNode::new(raw, message))))
}

fn atom(node: AtomNode) -> Segment {
    Segment::Atom(Arc::new(node))
}

fn parse_segments(cur: &mut Cursor, st: &mut InlineState<'_>, closers: &[char]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut buf = String::new();

    while let Some(ch) = cur.peek() {
        if closers.contains(&ch) {
            break;
        }
        match ch {
            '\\' => {
                cur.bump();
                if let Some(escaped) = cur.bump() {
                    buf.push(escaped);
                }
            }
            '*' => formatted(cur, st, closers, &mut segments, &mut buf, FormatTag::Bold, '*'),
            '_' => formatted(
                cur,
                st,
                closers,
                &mut segments,
                &mut buf,
                FormatTag::Italic,
                '_',
            ),
            '^' => {
                flush(&mut segments, &mut buf);
                cur.bump();
                let tag = if cur.peek() == Some('v') {
                    cur.bump();
                    FormatTag::Subscript
                } else {
                    FormatTag::Superscript
                };
                let mut inner_closers = closers.to_vec();
                inner_closers.push('^');
                let inner = parse_segments(cur, st, &inner_closers);
                if cur.peek() == Some('^') {
                    cur.bump();
                }
                segments.push(Segment::Format(Arc::new(FormatNode::new(Some(tag), inner))));
            }
            '`' => {
                flush(&mut segments, &mut buf);
                let start = cur.pos();
                cur.bump();
                let code = cur.take_while(|c| c != '`');
                if cur.peek() == Some('`') {
                    cur.bump();
                    segments.push(atom(AtomNode::Code(InlineCodeNode::new(code))));
                } else {
                    segments.push(error_atom(
                        cur.slice(start, cur.pos()),
                        "unclosed inline code",
                    ));
                }
            }
            '<' => {
                flush(&mut segments, &mut buf);
                let start = cur.pos();
                cur.bump();
                let inner = cur.take_while(|c| c != '>');
                if cur.peek() == Some('>') {
                    cur.bump();
                    let ids: Vec<String> = inner
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                    if ids.is_empty() {
                        segments.push(error_atom(
                            cur.slice(start, cur.pos()),
                            "empty citation list",
                        ));
                    } else {
                        segments.push(atom(AtomNode::Citations(CitationsNode::new(ids))));
                    }
                } else {
                    segments.push(error_atom(
                        cur.slice(start, cur.pos()),
                        "unclosed citation list",
                    ));
                }
            }
            '{' => {
                flush(&mut segments, &mut buf);
                let start = cur.pos();
                cur.bump();
                let mut inner_closers = closers.to_vec();
                inner_closers.push('}');
                let inner = parse_segments(cur, st, &inner_closers);
                if cur.peek() == Some('}') {
                    cur.bump();
                    segments.push(atom(AtomNode::Footnote(FootnoteNode::new(FormatNode::new(
                        None, inner,
                    )))));
                } else {
                    segments.push(error_atom(cur.slice(start, cur.pos()), "unclosed footnote"));
                }
            }
            '~' => definition(cur, &mut segments, &mut buf),
            ':' => label(cur, st, &mut segments, &mut buf),
            '[' => link(cur, st, &mut segments, &mut buf),
            '%' => {
                flush(&mut segments, &mut buf);
                cur.bump();
                let mut inner_closers = closers.to_vec();
                inner_closers.push('%');
                let inner = parse_segments(cur, st, &inner_closers);
                if cur.peek() == Some('%') {
                    cur.bump();
                }
                segments.push(atom(AtomNode::Comment(CommentNode::new(FormatNode::new(
                    None, inner,
                )))));
            }
            '@' => {
                cur.bump();
                let name = cur.take_while(|c| c.is_ascii_alphanumeric());
                if name.is_empty() {
                    buf.push('@');
                } else {
                    flush(&mut segments, &mut buf);
                    segments.push(error_atom(
                        format!("@{name}"),
                        format!("unknown symbol: {name}"),
                    ));
                }
            }
            '"' => {
                cur.bump();
                buf.push(if st.quote_open { '\u{201D}' } else { '\u{201C}' });
                st.quote_open = !st.quote_open;
            }
            '-' if cur.starts_with("--") => {
                cur.bump_n(2);
                buf.push('\u{2014}');
            }
            _ => {
                buf.push(ch);
                cur.bump();
            }
        }
    }

    flush(&mut segments, &mut buf);
    segments
}

fn formatted(
    cur: &mut Cursor,
    st: &mut InlineState<'_>,
    closers: &[char],
    segments: &mut Vec<Segment>,
    buf: &mut String,
    tag: FormatTag,
    delimiter: char,
) {
    flush(segments, buf);
    cur.bump();
    let mut inner_closers = closers.to_vec();
    inner_closers.push(delimiter);
    let inner = parse_segments(cur, st, &inner_closers);
    if cur.peek() == Some(delimiter) {
        cur.bump();
    }
    segments.push(Segment::Format(Arc::new(FormatNode::new(Some(tag), inner))));
}

fn definition(cur: &mut Cursor, segments: &mut Vec<Segment>, buf: &mut String) {
    flush(segments, buf);
    let start = cur.pos();
    cur.bump();
    let mut phrase = String::new();
    loop {
        match cur.peek() {
            None => {
                segments.push(error_atom(cur.slice(start, cur.pos()), "unclosed definition"));
                return;
            }
            Some('~') => break,
            Some('\\') => {
                cur.bump();
                if let Some(escaped) = cur.bump() {
                    phrase.push(escaped);
                }
            }
            Some(c) => {
                phrase.push(c);
                cur.bump();
            }
        }
    }
    cur.bump(); // ~
    let glossary_id = cur.take_while(|c| c.is_ascii_alphanumeric());
    if glossary_id.is_empty() {
        segments.push(error_atom(
            cur.slice(start, cur.pos()),
            "definition missing glossary id",
        ));
    } else {
        segments.push(atom(AtomNode::Definition(DefinitionNode::new(
            phrase,
            glossary_id,
        ))));
    }
}

fn label(cur: &mut Cursor, st: &mut InlineState<'_>, segments: &mut Vec<Segment>, buf: &mut String) {
    let saved = cur.clone();
    cur.bump();
    let id = cur.take_while(|c| c.is_ascii_alphanumeric());
    let terminated = matches!(cur.peek(), None | Some(' '));
    if id.is_empty() || !terminated {
        *cur = saved;
        cur.bump();
        buf.push(':');
        return;
    }
    if cur.peek() == Some(' ') {
        cur.bump();
    }
    flush(segments, buf);
    if st.labels.insert(id.clone()) {
        segments.push(atom(AtomNode::Label(LabelNode::new(id))));
    } else {
        segments.push(error_atom(
            format!(":{id} "),
            format!("duplicate label: {id}"),
        ));
    }
}

fn link(cur: &mut Cursor, st: &mut InlineState<'_>, segments: &mut Vec<Segment>, buf: &mut String) {
    flush(segments, buf);
    let start = cur.pos();
    cur.bump();
    let mut text = String::new();
    loop {
        match cur.peek() {
            None => {
                segments.push(error_atom(cur.slice(start, cur.pos()), "unclosed link"));
                return;
            }
            Some('|') => break,
            Some(']') => {
                cur.bump();
                segments.push(error_atom(cur.slice(start, cur.pos()), "link missing url"));
                return;
            }
            Some('\\') => {
                cur.bump();
                if let Some(escaped) = cur.bump() {
                    text.push(escaped);
                }
            }
            Some(c) => {
                text.push(c);
                cur.bump();
            }
        }
    }
    cur.bump(); // |
    let url = cur.take_while(|c| c != ']');
    if cur.peek() != Some(']') {
        segments.push(error_atom(cur.slice(start, cur.pos()), "unclosed link"));
        return;
    }
    cur.bump();
    if url.is_empty() {
        segments.push(error_atom(cur.slice(start, cur.pos()), "link missing url"));
        return;
    }
    let link = LinkNode::new(text, url);
    if let Some(target) = link.chapter_target() {
        if st.context.chapter_exists(target) == Some(false) {
            let message = format!("unknown chapter: {target}");
            segments.push(error_atom(cur.slice(start, cur.pos()), message));
            return;
        }
    }
    segments.push(atom(AtomNode::Link(link)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> FormatNode {
        parse_inline(&ParseContext::new(), &mut HashSet::new(), text)
    }

    fn first_atom(format: &FormatNode) -> Arc<AtomNode> {
        format
            .segments()
            .iter()
            .find_map(|s| match s {
                Segment::Atom(a) => Some(a.clone()),
                _ => None,
            })
            .expect("expected an atom")
    }

    // ===== Formatting =====

    #[test]
    fn bold_and_italic() {
        assert_eq!(parse("a *b* _c_").to_bookdown(), "a *b* _c_");
    }

    #[test]
    fn nested_formats() {
        assert_eq!(parse("*bold _both_*").to_bookdown(), "*bold _both_*");
    }

    #[test]
    fn superscript_and_subscript() {
        assert_eq!(parse("x^2^ and H^v2^O").to_bookdown(), "x^2^ and H^v2^O");
    }

    #[test]
    fn unclosed_bold_closes_implicitly() {
        let format = parse("start *rest");
        assert_eq!(format.to_bookdown(), "start *rest*");
    }

    // ===== Atoms =====

    #[test]
    fn inline_code_is_raw() {
        let format = parse("`a *b* c`");
        match &*first_atom(&format) {
            AtomNode::Code(code) => assert_eq!(code.code(), "a *b* c"),
            other => panic!("expected code atom, got {other:?}"),
        }
    }

    #[test]
    fn citation_list() {
        let format = parse("claim <smith20, jones21>.");
        match &*first_atom(&format) {
            AtomNode::Citations(c) => {
                assert_eq!(c.citations(), ["smith20".to_string(), "jones21".to_string()]);
            }
            other => panic!("expected citations, got {other:?}"),
        }
    }

    #[test]
    fn footnote_holds_format_tree() {
        let format = parse("fact{a *bold* note}");
        match &*first_atom(&format) {
            AtomNode::Footnote(f) => assert_eq!(f.content().to_bookdown(), "a *bold* note"),
            other => panic!("expected footnote, got {other:?}"),
        }
    }

    #[test]
    fn definition_and_label() {
        let format = parse("a ~term~entry and :anchor here");
        assert_eq!(format.to_bookdown(), "a ~term~entry and :anchor here");
    }

    #[test]
    fn label_requires_terminator() {
        let format = parse("see 3:45 pm");
        // ":45 " would be a label; "45" is followed by a space so it is one.
        // A colon not followed by an id stays literal.
        assert_eq!(parse("time: now").to_text(), "time: now");
        assert!(matches!(&*first_atom(&format), AtomNode::Label(_)));
    }

    #[test]
    fn link_with_url() {
        let format = parse("[site|https://example.com]");
        match &*first_atom(&format) {
            AtomNode::Link(l) => {
                assert_eq!(l.text(), "site");
                assert_eq!(l.url(), "https://example.com");
            }
            other => panic!("expected link, got {other:?}"),
        }
    }

    #[test]
    fn comment_content_is_preserved() {
        let format = parse("visible %hidden note% more");
        assert_eq!(format.to_bookdown(), "visible %hidden note% more");
        assert_eq!(format.to_text(), "visible  more");
    }

    // ===== Errors =====

    #[test]
    fn unclosed_citation_becomes_error() {
        let format = parse("broken <cite");
        match &*first_atom(&format) {
            AtomNode::Error(e) => {
                assert_eq!(e.text(), "<cite");
                assert_eq!(e.message(), "unclosed citation list");
            }
            other => panic!("expected error, got {other:?}"),
        }
        // Raw text round-trips.
        assert_eq!(format.to_bookdown(), "broken <cite");
    }

    #[test]
    fn duplicate_label_becomes_error() {
        let format = parse("one :dup two :dup three");
        let errors: Vec<_> = format
            .segments()
            .iter()
            .filter(|s| matches!(s, Segment::Atom(a) if matches!(&**a, AtomNode::Error(_))))
            .collect();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn unknown_symbol_becomes_error() {
        let format = parse("value @missing here");
        match &*first_atom(&format) {
            AtomNode::Error(e) => assert_eq!(e.message(), "unknown symbol: missing"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_chapter_link_flagged_when_context_knows() {
        let context = ParseContext::new().with_chapters(vec!["intro".to_string()]);
        let mut labels = HashSet::new();
        let ok = parse_inline(&context, &mut labels, "[x|intro]");
        assert!(matches!(&*first_atom(&ok), AtomNode::Link(_)));
        let bad = parse_inline(&context, &mut labels, "[x|nosuch]");
        assert!(matches!(&*first_atom(&bad), AtomNode::Error(_)));
    }

    // ===== Smartening and escapes =====

    #[test]
    fn quotes_smarten_in_pairs() {
        assert_eq!(parse("\"hi\" she said").to_text(), "\u{201C}hi\u{201D} she said");
    }

    #[test]
    fn double_dash_becomes_em_dash() {
        assert_eq!(parse("a--b").to_text(), "a\u{2014}b");
        assert_eq!(parse("a-b").to_text(), "a-b");
    }

    #[test]
    fn escapes_yield_literals() {
        assert_eq!(parse("\\*not bold\\*").to_text(), "*not bold*");
        assert_eq!(parse("\\@name").to_text(), "@name");
    }

    #[test]
    fn escaped_text_round_trips() {
        let format = parse("\\*not bold\\*");
        assert_eq!(format.to_bookdown(), "\\*not bold\\*");
    }
}
