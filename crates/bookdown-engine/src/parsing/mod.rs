//! # Bookdown Parser
//!
//! A recursive-descent parser from Bookdown markup to the immutable chapter
//! tree. The pipeline is:
//!
//! 1. **Symbol pass**: leading `@name: value` definitions are collected and
//!    a single substitution pass resolves `@name` tokens against the chapter
//!    table overlaid on the book table ([`symbols`]).
//! 2. **Block grammar**: line-based dispatch to headers, rules, embeds,
//!    lists, fenced code/quote/callout, tables, and the paragraph fallback
//!    ([`blocks`]).
//! 3. **Inline grammar**: per-line parsing of formatting, atoms, escapes,
//!    quote smartening and em dashes ([`inline`]).
//!
//! Malformed constructs never abort the parse: they become error nodes that
//! serialize back to the raw text they consumed and surface in the chapter's
//! error index. The only hard failure is non-UTF-8 input to
//! [`parse_chapter_bytes`], which is a caller bug rather than bad content.

mod blocks;
pub mod context;
mod cursor;
mod inline;
mod symbols;

use std::collections::HashSet;
use std::sync::Arc;

use crate::nodes::atoms::ErrorNode;
use crate::nodes::blocks::BlockNode;
use crate::nodes::format::{FormatNode, FormatTag, Segment};
use crate::nodes::text::TextNode;
use crate::nodes::{AtomNode, ChapterNode, LinkNode};

pub use context::ParseContext;

/// Parse a chapter's markup into a tree. Never fails; malformed content
/// becomes embedded error markers.
pub fn parse_chapter(context: &ParseContext, text: &str) -> ChapterNode {
    let pass = symbols::resolve_symbols(context, text);
    let blocks = blocks::BlockParser::new(context, &pass.text).parse();
    ChapterNode::new(blocks)
}

/// Byte-level entry point. Invalid UTF-8 is the one hard failure.
pub fn parse_chapter_bytes(context: &ParseContext, bytes: &[u8]) -> anyhow::Result<ChapterNode> {
    let text = std::str::from_utf8(bytes)?;
    Ok(parse_chapter(context, text))
}

/// Parse a single line of inline content into a format tree.
pub fn parse_format(context: &ParseContext, text: &str) -> FormatNode {
    let mut labels = HashSet::new();
    inline::parse_inline(context, &mut labels, text)
}

/// Parse one `|url|alt|caption|credit|` embed line; malformed input yields
/// an error block.
pub fn parse_embed(context: &ParseContext, text: &str) -> BlockNode {
    blocks::parse_embed_text(context, text)
}

/// Render a citation's reference data (`[authors, year, title, source]` plus
/// an optional url) into a format tree, used at render time by the glossary
/// and reference collaborators. `short` produces the in-margin form.
pub fn parse_reference(
    id: &str,
    data: &[String],
    _context: &ParseContext,
    short: bool,
) -> Result<FormatNode, ErrorNode> {
    if data.len() < 4 {
        return Err(ErrorNode::new(
            id,
            format!("malformed reference data for citation: {id}"),
        ));
    }
    let (authors, year, title, source) = (&data[0], &data[1], &data[2], &data[3]);
    if short {
        return Ok(FormatNode::from_text(format!("{authors} ({year})")));
    }
    let mut segments = vec![Segment::Text(Arc::new(TextNode::new(format!(
        "{authors} ({year}). "
    ))))];
    match data.get(4).filter(|url| !url.is_empty()) {
        Some(url) => segments.push(Segment::Atom(Arc::new(AtomNode::Link(LinkNode::new(
            title.clone(),
            url.clone(),
        ))))),
        None => segments.push(Segment::Format(Arc::new(FormatNode::new(
            Some(FormatTag::Italic),
            vec![Segment::Text(Arc::new(TextNode::new(title.clone())))],
        )))),
    }
    segments.push(Segment::Text(Arc::new(TextNode::new(format!(
        ". {source}."
    )))));
    Ok(FormatNode::new(None, segments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> ChapterNode {
        parse_chapter(&ParseContext::new(), text)
    }

    // ===== Chapter structure =====

    #[test]
    fn blank_lines_separate_blocks() {
        let chapter = parse("\n\nFirst.\n\nSecond.\n\n");
        assert_eq!(chapter.blocks().len(), 2);
        assert_eq!(chapter.to_bookdown(), "\n\nFirst.\n\nSecond.");
    }

    #[test]
    fn empty_chapter_parses() {
        let chapter = parse("");
        assert!(chapter.blocks().is_empty());
        assert_eq!(chapter.to_bookdown(), "");
    }

    #[test]
    fn bytes_entry_rejects_invalid_utf8() {
        assert!(parse_chapter_bytes(&ParseContext::new(), &[0xFF, 0xFE]).is_err());
        assert!(parse_chapter_bytes(&ParseContext::new(), b"ok").is_ok());
    }

    // ===== Derived indices =====

    #[test]
    fn chapter_indices_are_derived() {
        let chapter = parse(
            "# Title\n\nClaim <smith20>.\n\nNote{detail} and :anchor here\n\n|img.png|alt|cap|credit|",
        );
        assert_eq!(chapter.citations(), vec!["smith20"]);
        assert_eq!(chapter.footnotes().len(), 1);
        assert_eq!(chapter.headers().len(), 1);
        assert_eq!(chapter.labels().len(), 1);
        assert_eq!(chapter.embeds().len(), 1);
        assert!(chapter.errors().is_empty());
    }

    #[test]
    fn duplicate_labels_marked_without_aborting() {
        let chapter = parse("One :here and more\n\nTwo :here again");
        assert_eq!(chapter.blocks().len(), 2);
        assert_eq!(chapter.labels().len(), 1);
        let errors = chapter.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message().contains("duplicate label"));
    }

    // ===== Round-trips =====

    #[test]
    fn serialization_reparses_to_equivalent_tree() {
        let source = "\n\n# Title\n\nSome *bold* and _italic_ text with a [link|https://x.y].\n\n* item one\n* item two\n\n`rust\nfn f() {}\n`\n\n\"\nQuoted.\n\" Credit";
        let chapter = parse(source);
        let serialized = chapter.to_bookdown();
        let reparsed = parse(&serialized);
        assert_eq!(reparsed.to_bookdown(), serialized);
    }

    #[test]
    fn smartened_text_is_stable() {
        let chapter = parse("She said \"yes\" -- twice.");
        let serialized = chapter.to_bookdown();
        let reparsed = parse(&serialized);
        assert_eq!(reparsed.to_bookdown(), serialized);
        assert_eq!(
            chapter.to_text(),
            "She said \u{201C}yes\u{201D} \u{2014} twice."
        );
    }

    #[test]
    fn block_serialization_snapshots() {
        let chapter = parse("# Title\n\n* one\n** two\n\n,a|b\n,c|d");
        insta::assert_snapshot!(chapter.blocks()[0].to_bookdown(), @"# Title");
        insta::assert_snapshot!(chapter.blocks()[1].to_bookdown(), @r"
        * one
        ** two
        ");
        insta::assert_snapshot!(chapter.blocks()[2].to_bookdown(), @r"
        ,a|b
        ,c|d
        ");
    }

    // ===== References =====

    #[test]
    fn reference_long_and_short_forms() {
        let data: Vec<String> = ["Smith, J.", "2020", "On Things", "Journal of Stuff"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let long = parse_reference("smith20", &data, &ParseContext::new(), false).unwrap();
        assert_eq!(long.to_bookdown(), "Smith, J. (2020). _On Things_. Journal of Stuff.");
        let short = parse_reference("smith20", &data, &ParseContext::new(), true).unwrap();
        assert_eq!(short.to_text(), "Smith, J. (2020)");
    }

    #[test]
    fn reference_with_url_links_title() {
        let data: Vec<String> = ["A", "2021", "T", "S", "https://x.y"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let format = parse_reference("a21", &data, &ParseContext::new(), false).unwrap();
        assert_eq!(format.to_bookdown(), "A (2021). [T|https://x.y]. S.");
    }

    #[test]
    fn short_reference_data_is_an_error() {
        let data = vec!["only".to_string(), "two".to_string()];
        assert!(parse_reference("bad", &data, &ParseContext::new(), false).is_err());
    }
}
