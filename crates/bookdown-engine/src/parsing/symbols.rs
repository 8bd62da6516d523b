//! `@name` symbol substitution.
//!
//! Chapter-local definitions are leading `@name: value` lines, stripped from
//! the source before block parsing. Substitution is a single textual pass
//! over the body using the chapter table overlaid on the book table;
//! replacement text is never re-scanned, and `\@` escapes are left alone. A
//! token neither table resolves survives into the inline parser, which turns
//! it into an error span.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::parsing::context::ParseContext;

fn symbol_token() -> &'static Regex {
    static SYMBOL_TOKEN: OnceLock<Regex> = OnceLock::new();
    SYMBOL_TOKEN.get_or_init(|| Regex::new(r"@[A-Za-z0-9]+").expect("invalid symbol regex"))
}

fn symbol_definition() -> &'static Regex {
    static SYMBOL_DEFINITION: OnceLock<Regex> = OnceLock::new();
    SYMBOL_DEFINITION
        .get_or_init(|| Regex::new(r"^@([A-Za-z0-9]+):\s*(.*)$").expect("invalid definition regex"))
}

pub(crate) struct SymbolPass {
    /// Body text with definitions stripped and known symbols substituted.
    pub(crate) text: String,
    /// The chapter-local table parsed from the leading definition lines.
    pub(crate) chapter_symbols: HashMap<String, String>,
}

pub(crate) fn resolve_symbols(context: &ParseContext, source: &str) -> SymbolPass {
    let mut chapter_symbols = HashMap::new();

    // Strip leading blank and definition lines.
    let mut offset = 0;
    for segment in source.split_inclusive('\n') {
        let line = segment.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            offset += segment.len();
            continue;
        }
        if let Some(caps) = symbol_definition().captures(line) {
            chapter_symbols.insert(caps[1].to_string(), caps[2].trim().to_string());
            offset += segment.len();
            continue;
        }
        break;
    }
    let body = &source[offset..];

    // One substitution pass; the chapter table wins over the book table.
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for token in symbol_token().find_iter(body) {
        if body[..token.start()].ends_with('\\') {
            continue;
        }
        let name = &token.as_str()[1..];
        let replacement = chapter_symbols
            .get(name)
            .or_else(|| context.symbols.get(name));
        if let Some(replacement) = replacement {
            out.push_str(&body[last..token.start()]);
            out.push_str(replacement);
            last = token.end();
        }
    }
    out.push_str(&body[last..]);

    SymbolPass {
        text: out,
        chapter_symbols,
    }
}
