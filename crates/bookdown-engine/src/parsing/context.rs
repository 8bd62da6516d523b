use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// External collaborators the parser consults: the book-level symbol table
/// and the set of known chapter ids used to validate internal links.
///
/// Supplied by the hosting application; serde-derived so a shell can load it
/// from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseContext {
    /// Book-level `@name` replacements. Chapter-local definitions overlay
    /// these.
    #[serde(default)]
    pub symbols: HashMap<String, String>,
    /// Known chapter ids. `None` disables internal-link validation.
    #[serde(default)]
    pub chapter_ids: Option<HashSet<String>>,
}

impl ParseContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols(mut self, symbols: HashMap<String, String>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn with_chapters(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.chapter_ids = Some(ids.into_iter().collect());
        self
    }

    /// Whether a chapter id exists; `None` when validation is disabled.
    pub(crate) fn chapter_exists(&self, id: &str) -> Option<bool> {
        self.chapter_ids.as_ref().map(|ids| ids.contains(id))
    }
}
