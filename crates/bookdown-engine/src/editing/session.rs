//! The editing session: command dispatch, linear undo/redo, clipboard.
//!
//! `Editor` owns the current chapter, the live selection, and a version
//! counter; every command flows through [`Editor::apply`] and returns a
//! [`Patch`]. Undo is coarse-grained: each committed state stores the full
//! markup snapshot plus the selection as document-position offsets, and
//! undo/redo simply reparse the snapshot. An edit made after an undo
//! truncates the redo tail.
//!
//! The engine itself never touches the OS clipboard; `copy`/`cut` hand the
//! canonical markup serialization to the caller and keep an in-memory copy
//! as the synchronous fallback.

use crate::editing::caret::{resolve_to_stop, Caret, CaretRange, PositionIndex};
use crate::editing::{
    clipboard, insert_text, split_selection, with_list_item_indented, with_list_item_unindented,
    with_lists_as_paragraphs, with_paragraphs_as_lists, with_range_formatted, with_rule_inserted,
    with_segment_at_selection, with_table_column_inserted, with_table_column_removed,
    with_table_row_inserted, with_table_row_removed, without_adjacent_content, without_range,
    Edit, EditError,
};
use crate::nodes::{
    path_to, AtomNode, BlockNode, ChapterNode, CitationsNode, CommentNode, FootnoteNode,
    FormatNode, FormatTag, InlineCodeNode, LabelNode, LinkNode, NodeId, NodeRef,
};
use crate::parsing::{parse_chapter, ParseContext};

/// Commands that can be applied to the session's current selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    InsertText { text: String },
    Backspace,
    Delete,
    Split,
    Format { tag: FormatTag },
    DeleteSelection,
    Indent,
    Outdent,
    ToggleList { numbered: bool },
    ListsToParagraphs,
    InsertRule,
    InsertRowBefore,
    InsertRowAfter,
    DeleteRow,
    InsertColumnBefore,
    InsertColumnAfter,
    DeleteColumn,
    InsertLink { url: String },
    InsertCitations { ids: Vec<String> },
    InsertFootnote,
    InsertLabel { id: String },
    InsertComment,
    InsertInlineCode,
}

impl Command {
    fn label(&self) -> &'static str {
        match self {
            Command::InsertText { .. } => "insert text",
            Command::Backspace => "backspace",
            Command::Delete => "delete",
            Command::Split => "split",
            Command::Format { .. } => "format",
            Command::DeleteSelection => "delete selection",
            Command::Indent => "indent",
            Command::Outdent => "outdent",
            Command::ToggleList { .. } => "paragraphs to list",
            Command::ListsToParagraphs => "list to paragraphs",
            Command::InsertRule => "insert rule",
            Command::InsertRowBefore | Command::InsertRowAfter => "insert row",
            Command::DeleteRow => "delete row",
            Command::InsertColumnBefore | Command::InsertColumnAfter => "insert column",
            Command::DeleteColumn => "delete column",
            Command::InsertLink { .. } => "insert link",
            Command::InsertCitations { .. } => "insert citations",
            Command::InsertFootnote => "insert footnote",
            Command::InsertLabel { .. } => "insert label",
            Command::InsertComment => "insert comment",
            Command::InsertInlineCode => "insert inline code",
        }
    }
}

/// Result of a committed command.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    pub version: u64,
    pub selection: Option<CaretRange>,
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    command: String,
    bookdown: String,
    selection: Option<(usize, usize)>,
}

/// An editing session over one chapter.
pub struct Editor {
    context: ParseContext,
    chapter: ChapterNode,
    selection: Option<CaretRange>,
    version: u64,
    history: Vec<HistoryEntry>,
    history_index: usize,
    clipboard: Option<String>,
}

impl Editor {
    pub fn from_markup(context: ParseContext, markup: &str) -> Self {
        let chapter = parse_chapter(&context, markup);
        let selection = PositionIndex::of(&chapter)
            .at(0)
            .map(CaretRange::collapsed);
        let mut editor = Self {
            context,
            chapter,
            selection,
            version: 0,
            history: Vec::new(),
            history_index: 0,
            clipboard: None,
        };
        editor.history.push(editor.entry("load"));
        editor
    }

    /// Byte-level constructor; invalid UTF-8 is the one hard failure.
    pub fn from_bytes(context: ParseContext, bytes: &[u8]) -> anyhow::Result<Self> {
        let text = std::str::from_utf8(bytes)?;
        Ok(Self::from_markup(context, text))
    }

    pub fn chapter(&self) -> &ChapterNode {
        &self.chapter
    }

    pub fn context(&self) -> &ParseContext {
        &self.context
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn selection(&self) -> Option<CaretRange> {
        self.selection
    }

    pub fn to_bookdown(&self) -> String {
        self.chapter.to_bookdown()
    }

    /// Move the selection; both carets must address the current tree.
    pub fn set_selection(&mut self, range: CaretRange) -> Result<(), EditError> {
        resolve_to_stop(&self.chapter, range.start)?;
        resolve_to_stop(&self.chapter, range.end)?;
        self.selection = Some(range);
        Ok(())
    }

    /// Apply a command at the current selection. On failure the session is
    /// untouched.
    pub fn apply(&mut self, command: Command) -> Result<Patch, EditError> {
        let selection = self.selection.ok_or(EditError::NoSelection)?;
        let edit = match &command {
            Command::InsertText { text } => {
                let base = if selection.is_collapsed() {
                    Edit::collapsed(self.chapter.clone(), selection.start)
                } else {
                    without_range(&self.chapter, selection)?
                };
                insert_text(&base.root, base.range.start, text)?
            }
            Command::Backspace => {
                if selection.is_collapsed() {
                    without_adjacent_content(&self.chapter, selection.start, false)?
                } else {
                    without_range(&self.chapter, selection)?
                }
            }
            Command::Delete => {
                if selection.is_collapsed() {
                    without_adjacent_content(&self.chapter, selection.start, true)?
                } else {
                    without_range(&self.chapter, selection)?
                }
            }
            Command::Split => split_selection(&self.chapter, selection)?,
            Command::Format { tag } => with_range_formatted(&self.chapter, selection, Some(*tag))?,
            Command::DeleteSelection => without_range(&self.chapter, selection)?,
            Command::Indent => with_list_item_indented(&self.chapter, selection.start)?,
            Command::Outdent => with_list_item_unindented(&self.chapter, selection.start)?,
            Command::ToggleList { numbered } => {
                with_paragraphs_as_lists(&self.chapter, selection, *numbered)?
            }
            Command::ListsToParagraphs => with_lists_as_paragraphs(&self.chapter, selection)?,
            Command::InsertRule => with_rule_inserted(&self.chapter, selection.start, true)?,
            Command::InsertRowBefore => {
                let (table, row, _) = self.located_cell(selection.start)?;
                with_table_row_inserted(&self.chapter, table, row)?
            }
            Command::InsertRowAfter => {
                let (table, row, _) = self.located_cell(selection.start)?;
                with_table_row_inserted(&self.chapter, table, row + 1)?
            }
            Command::DeleteRow => {
                let (table, row, _) = self.located_cell(selection.start)?;
                with_table_row_removed(&self.chapter, table, row)?
            }
            Command::InsertColumnBefore => {
                let (table, _, column) = self.located_cell(selection.start)?;
                with_table_column_inserted(&self.chapter, table, column)?
            }
            Command::InsertColumnAfter => {
                let (table, _, column) = self.located_cell(selection.start)?;
                with_table_column_inserted(&self.chapter, table, column + 1)?
            }
            Command::DeleteColumn => {
                let (table, _, column) = self.located_cell(selection.start)?;
                with_table_column_removed(&self.chapter, table, column)?
            }
            Command::InsertLink { url } => with_segment_at_selection(
                &self.chapter,
                selection,
                |text| AtomNode::Link(LinkNode::new(text, url.clone())),
            )?,
            Command::InsertCitations { ids } => with_segment_at_selection(
                &self.chapter,
                selection,
                |_| AtomNode::Citations(CitationsNode::new(ids.clone())),
            )?,
            Command::InsertFootnote => with_segment_at_selection(
                &self.chapter,
                selection,
                |text| AtomNode::Footnote(FootnoteNode::new(FormatNode::from_text(text))),
            )?,
            Command::InsertLabel { id } => with_segment_at_selection(
                &self.chapter,
                selection,
                |_| AtomNode::Label(LabelNode::new(id.clone())),
            )?,
            Command::InsertComment => with_segment_at_selection(
                &self.chapter,
                selection,
                |text| AtomNode::Comment(CommentNode::new(FormatNode::from_text(text))),
            )?,
            Command::InsertInlineCode => with_segment_at_selection(
                &self.chapter,
                selection,
                |text| AtomNode::Code(InlineCodeNode::new(text)),
            )?,
        };
        self.commit(command.label(), edit)
    }

    /// Step back one committed state. Reparses the stored snapshot.
    pub fn undo(&mut self) -> Result<Patch, EditError> {
        if self.history_index == 0 {
            return Err(EditError::NotApplicable);
        }
        self.history_index -= 1;
        self.restore_current_entry()
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self) -> Result<Patch, EditError> {
        if self.history_index + 1 >= self.history.len() {
            return Err(EditError::NotApplicable);
        }
        self.history_index += 1;
        self.restore_current_entry()
    }

    /// Serialize the selection to the in-memory clipboard and the caller.
    pub fn copy(&mut self) -> Result<String, EditError> {
        let selection = self.selection.ok_or(EditError::NoSelection)?;
        let fragment = clipboard::copy_range(&self.chapter, selection)?;
        let markup = fragment.to_bookdown();
        self.clipboard = Some(markup.clone());
        Ok(markup)
    }

    /// Copy, then delete the selection.
    pub fn cut(&mut self) -> Result<String, EditError> {
        let markup = self.copy()?;
        let selection = self.selection.ok_or(EditError::NoSelection)?;
        let edit = without_range(&self.chapter, selection)?;
        self.commit("cut", edit)?;
        Ok(markup)
    }

    /// Paste markup (from the OS clipboard or another document) over the
    /// selection.
    pub fn paste(&mut self, markup: &str) -> Result<Patch, EditError> {
        let selection = self.selection.ok_or(EditError::NoSelection)?;
        let edit = clipboard::paste(&self.chapter, selection, markup, &self.context)?;
        self.commit("paste", edit)
    }

    /// Paste from the in-memory clipboard fallback.
    pub fn paste_clipboard(&mut self) -> Result<Patch, EditError> {
        let markup = self.clipboard.clone().ok_or(EditError::NotApplicable)?;
        self.paste(&markup)
    }

    // ===== Internals =====

    fn commit(&mut self, label: &str, edit: Edit) -> Result<Patch, EditError> {
        self.chapter = edit.root;
        self.selection = Some(edit.range);
        self.version += 1;
        // A new edit invalidates everything past the current state.
        self.history.truncate(self.history_index + 1);
        self.history.push(self.entry(label));
        self.history_index = self.history.len() - 1;
        Ok(Patch {
            version: self.version,
            selection: self.selection,
        })
    }

    fn entry(&self, label: &str) -> HistoryEntry {
        HistoryEntry {
            command: label.to_string(),
            bookdown: self.chapter.to_bookdown(),
            selection: self.serialized_selection(),
        }
    }

    fn serialized_selection(&self) -> Option<(usize, usize)> {
        let selection = self.selection?;
        let index = PositionIndex::of(&self.chapter);
        Some((
            index.offset_of(selection.start)?,
            index.offset_of(selection.end)?,
        ))
    }

    fn restore_current_entry(&mut self) -> Result<Patch, EditError> {
        let entry = self.history[self.history_index].clone();
        self.chapter = parse_chapter(&self.context, &entry.bookdown);
        let index = PositionIndex::of(&self.chapter);
        self.selection = entry
            .selection
            .and_then(|(a, b)| Some(CaretRange::new(index.at(a)?, index.at(b)?)))
            .or_else(|| index.at(0).map(CaretRange::collapsed));
        self.version += 1;
        Ok(Patch {
            version: self.version,
            selection: self.selection,
        })
    }

    /// History labels, oldest first, for command palettes and debugging.
    pub fn history_labels(&self) -> Vec<&str> {
        self.history.iter().map(|e| e.command.as_str()).collect()
    }

    fn located_cell(&self, caret: Caret) -> Result<(NodeId, usize, usize), EditError> {
        let caret = resolve_to_stop(&self.chapter, caret)?;
        let path =
            path_to(self.chapter.as_node(), caret.node).ok_or(EditError::UnknownNode)?;
        for node in path {
            if let NodeRef::Block(BlockNode::Table(t)) = node {
                let (row, column) = t.cell_of_stop(caret.node).ok_or(EditError::NotApplicable)?;
                return Ok((t.id(), row, column));
            }
        }
        Err(EditError::NotApplicable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn editor(markup: &str) -> Editor {
        Editor::from_markup(ParseContext::new(), markup)
    }

    fn caret_at_start(editor: &Editor) -> Caret {
        editor.selection().unwrap().start
    }

    #[test]
    fn typing_inserts_at_the_caret() {
        let mut ed = editor("world");
        let caret = caret_at_start(&ed);
        ed.set_selection(CaretRange::collapsed(caret)).unwrap();
        ed.apply(Command::InsertText {
            text: "hello ".to_string(),
        })
        .unwrap();
        assert_eq!(ed.to_bookdown(), "\n\nhello world");
    }

    #[test]
    fn failed_commands_leave_the_session_untouched() {
        let mut ed = editor("only");
        let before = ed.to_bookdown();
        let version = ed.version();
        // Backspace at the very start of the document has nothing to eat.
        let result = ed.apply(Command::Backspace);
        assert_eq!(result, Err(EditError::NotApplicable));
        assert_eq!(ed.to_bookdown(), before);
        assert_eq!(ed.version(), version);
    }

    #[test]
    fn undo_restores_each_state_in_turn() {
        let mut ed = editor("base");
        let caret = caret_at_start(&ed);
        ed.set_selection(CaretRange::collapsed(caret)).unwrap();
        ed.apply(Command::InsertText {
            text: "a".to_string(),
        })
        .unwrap();
        ed.apply(Command::InsertText {
            text: "b".to_string(),
        })
        .unwrap();
        assert_eq!(ed.to_bookdown(), "\n\nabbase");

        ed.undo().unwrap();
        assert_eq!(ed.to_bookdown(), "\n\nabase");
        ed.undo().unwrap();
        assert_eq!(ed.to_bookdown(), "\n\nbase");
        assert!(ed.undo().is_err());
    }

    #[test]
    fn redo_replays_and_new_edits_invalidate_it() {
        let mut ed = editor("base");
        let caret = caret_at_start(&ed);
        ed.set_selection(CaretRange::collapsed(caret)).unwrap();
        ed.apply(Command::InsertText {
            text: "x".to_string(),
        })
        .unwrap();
        ed.undo().unwrap();
        ed.redo().unwrap();
        assert_eq!(ed.to_bookdown(), "\n\nxbase");

        ed.undo().unwrap();
        ed.apply(Command::InsertText {
            text: "y".to_string(),
        })
        .unwrap();
        // The "x" state is gone.
        assert!(ed.redo().is_err());
        assert_eq!(ed.to_bookdown(), "\n\nybase");
    }

    #[test]
    fn copy_fills_the_fallback_clipboard() {
        let mut ed = editor("hello");
        let caret = caret_at_start(&ed);
        ed.set_selection(CaretRange::new(caret, Caret::new(caret.node, 5)))
            .unwrap();
        let markup = ed.copy().unwrap();
        assert_eq!(markup, "\n\nhello");
        // Paste it back over a collapsed caret at the end.
        ed.set_selection(CaretRange::collapsed(Caret::new(caret.node, 5)))
            .unwrap();
        ed.paste_clipboard().unwrap();
        assert_eq!(ed.to_bookdown(), "\n\nhellohello");
    }
}
