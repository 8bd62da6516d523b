//! Block containers: quotes (with credit) and callouts.

use std::sync::Arc;

use crate::nodes::blocks::{BlockNode, Position};
use crate::nodes::format::FormatNode;
use crate::nodes::NodeId;

fn blocks_to_bookdown(blocks: &[Arc<BlockNode>]) -> String {
    blocks
        .iter()
        .map(|b| b.to_bookdown())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn blocks_to_text(blocks: &[Arc<BlockNode>]) -> String {
    blocks
        .iter()
        .map(|b| b.to_text())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A quotation: nested blocks plus an optional credit line.
#[derive(Debug, Clone)]
pub struct QuoteNode {
    id: NodeId,
    blocks: Vec<Arc<BlockNode>>,
    credit: Arc<FormatNode>,
    position: Position,
}

impl QuoteNode {
    pub fn new(blocks: Vec<Arc<BlockNode>>, credit: FormatNode, position: Position) -> Self {
        Self {
            id: NodeId::fresh(),
            blocks,
            credit: Arc::new(credit),
            position,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn blocks(&self) -> &[Arc<BlockNode>] {
        &self.blocks
    }

    pub fn credit(&self) -> &Arc<FormatNode> {
        &self.credit
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn with_blocks(&self, blocks: Vec<Arc<BlockNode>>) -> Self {
        Self {
            id: self.id,
            blocks,
            credit: self.credit.clone(),
            position: self.position,
        }
    }

    pub(crate) fn with_credit(&self, credit: Arc<FormatNode>) -> Self {
        Self {
            id: self.id,
            blocks: self.blocks.clone(),
            credit,
            position: self.position,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(
            self.blocks.iter().map(|b| Arc::new(b.copy())).collect(),
            self.credit.copy(),
            self.position,
        )
    }

    pub fn to_bookdown(&self) -> String {
        let mut out = format!("\"\n{}\n\"", blocks_to_bookdown(&self.blocks));
        out.push_str(self.position.suffix());
        if !self.credit.is_empty_text() {
            out.push(' ');
            out.push_str(&self.credit.to_bookdown());
        }
        out
    }

    pub fn to_text(&self) -> String {
        blocks_to_text(&self.blocks)
    }
}

/// A callout: a visually separated group of blocks.
#[derive(Debug, Clone)]
pub struct CalloutNode {
    id: NodeId,
    blocks: Vec<Arc<BlockNode>>,
    position: Position,
}

impl CalloutNode {
    pub fn new(blocks: Vec<Arc<BlockNode>>, position: Position) -> Self {
        Self {
            id: NodeId::fresh(),
            blocks,
            position,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn blocks(&self) -> &[Arc<BlockNode>] {
        &self.blocks
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn with_blocks(&self, blocks: Vec<Arc<BlockNode>>) -> Self {
        Self {
            id: self.id,
            blocks,
            position: self.position,
        }
    }

    pub fn copy(&self) -> Self {
        Self::new(
            self.blocks.iter().map(|b| Arc::new(b.copy())).collect(),
            self.position,
        )
    }

    pub fn to_bookdown(&self) -> String {
        format!(
            "=\n{}\n={}",
            blocks_to_bookdown(&self.blocks),
            self.position.suffix()
        )
    }

    pub fn to_text(&self) -> String {
        blocks_to_text(&self.blocks)
    }
}
