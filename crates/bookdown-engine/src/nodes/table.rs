//! Tables: a rectangular grid of format cells plus a caption.

use std::sync::Arc;

use crate::nodes::format::FormatNode;
use crate::nodes::NodeId;

#[derive(Debug, Clone)]
pub struct TableNode {
    id: NodeId,
    rows: Vec<Vec<Arc<FormatNode>>>,
    caption: Arc<FormatNode>,
}

impl TableNode {
    pub fn new(rows: Vec<Vec<Arc<FormatNode>>>, caption: FormatNode) -> Self {
        Self {
            id: NodeId::fresh(),
            rows: Self::normalized(rows),
            caption: Arc::new(caption),
        }
    }

    /// Pad short rows with empty cells so the grid stays rectangular.
    fn normalized(mut rows: Vec<Vec<Arc<FormatNode>>>) -> Vec<Vec<Arc<FormatNode>>> {
        let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0);
        for row in &mut rows {
            while row.len() < columns {
                row.push(Arc::new(FormatNode::empty()));
            }
        }
        rows
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn rows(&self) -> &[Vec<Arc<FormatNode>>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn caption(&self) -> &Arc<FormatNode> {
        &self.caption
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Arc<FormatNode>> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Locate the cell whose format tree holds the given caret stop.
    pub fn cell_of_stop(&self, node: NodeId) -> Option<(usize, usize)> {
        for (r, row) in self.rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                if cell.id() == node || cell.contains_stop(node) {
                    return Some((r, c));
                }
            }
        }
        None
    }

    pub(crate) fn with_rows(&self, rows: Vec<Vec<Arc<FormatNode>>>) -> Self {
        Self {
            id: self.id,
            rows: Self::normalized(rows),
            caption: self.caption.clone(),
        }
    }

    pub(crate) fn with_caption(&self, caption: Arc<FormatNode>) -> Self {
        Self {
            id: self.id,
            rows: self.rows.clone(),
            caption,
        }
    }

    /// Insert an empty row before `index` (`index == row_count` appends).
    pub fn with_row_inserted(&self, index: usize) -> Option<Self> {
        if index > self.rows.len() {
            return None;
        }
        let mut rows = self.rows.clone();
        let row = (0..self.column_count().max(1))
            .map(|_| Arc::new(FormatNode::empty()))
            .collect();
        rows.insert(index, row);
        Some(self.with_rows(rows))
    }

    /// Remove the row at `index`.
    pub fn with_row_removed(&self, index: usize) -> Option<Self> {
        if index >= self.rows.len() {
            return None;
        }
        let mut rows = self.rows.clone();
        rows.remove(index);
        Some(self.with_rows(rows))
    }

    /// Insert an empty column before `index` (`index == column_count`
    /// appends).
    pub fn with_column_inserted(&self, index: usize) -> Option<Self> {
        if index > self.column_count() {
            return None;
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.insert(index, Arc::new(FormatNode::empty()));
                row
            })
            .collect();
        Some(self.with_rows(rows))
    }

    /// Remove the column at `index`.
    pub fn with_column_removed(&self, index: usize) -> Option<Self> {
        if index >= self.column_count() {
            return None;
        }
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.remove(index);
                row
            })
            .collect();
        Some(self.with_rows(rows))
    }

    pub fn copy(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().map(|c| Arc::new(c.copy())).collect())
            .collect();
        Self::new(rows, self.caption.copy())
    }

    pub fn to_bookdown(&self) -> String {
        let mut out = self
            .rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = row.iter().map(|c| c.to_bookdown()).collect();
                format!(",{}", cells.join("|"))
            })
            .collect::<Vec<_>>()
            .join("\n");
        if !self.caption.is_empty_text() {
            out.push('\n');
            out.push_str(&self.caption.to_bookdown());
        }
        out
    }

    pub fn to_text(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|c| c.to_text())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cell(text: &str) -> Arc<FormatNode> {
        Arc::new(FormatNode::from_text(text))
    }

    fn sample() -> TableNode {
        TableNode::new(
            vec![vec![cell("a"), cell("b")], vec![cell("c"), cell("d")]],
            FormatNode::empty(),
        )
    }

    #[test]
    fn serialization_uses_comma_rows() {
        assert_eq!(sample().to_bookdown(), ",a|b\n,c|d");
    }

    #[test]
    fn caption_follows_rows() {
        let table = TableNode::new(vec![vec![cell("a")]], FormatNode::from_text("numbers"));
        assert_eq!(table.to_bookdown(), ",a\nnumbers");
    }

    #[test]
    fn row_insertion_bounds_checked() {
        let table = sample();
        let grown = table.with_row_inserted(1).unwrap();
        assert_eq!(grown.row_count(), 3);
        assert_eq!(grown.to_bookdown(), ",a|b\n,|\n,c|d");
        assert!(table.with_row_inserted(3).is_none());
    }

    #[test]
    fn column_removal_bounds_checked() {
        let table = sample();
        let narrowed = table.with_column_removed(0).unwrap();
        assert_eq!(narrowed.to_bookdown(), ",b\n,d");
        assert!(table.with_column_removed(2).is_none());
    }

    #[test]
    fn ragged_rows_are_padded() {
        let table = TableNode::new(
            vec![vec![cell("a"), cell("b")], vec![cell("c")]],
            FormatNode::empty(),
        );
        assert_eq!(table.column_count(), 2);
        assert_eq!(table.to_bookdown(), ",a|b\n,c|");
    }

    #[test]
    fn cell_lookup_by_stop() {
        let target = cell("here");
        let stop = target.first_caret().0;
        let table = TableNode::new(
            vec![vec![cell("a"), cell("b")], vec![cell("c"), target]],
            FormatNode::empty(),
        );
        assert_eq!(table.cell_of_stop(stop), Some((1, 1)));
    }
}
