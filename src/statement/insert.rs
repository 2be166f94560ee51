use super::condition::ValueExpr;
use std::ops::Range;

/// One `( ... )` row of an INSERT's VALUES list.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    /// Span of the row including both parentheses.
    pub start: usize,
    pub end: usize,
    pub values: Vec<ValueExpr>,
    /// Ordinals of the `?` placeholders inside the row.
    pub parameters: Range<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertClause {
    pub columns: Vec<String>,
    /// Position of the `)` closing the column list, if there is one.
    pub columns_end: Option<usize>,
    pub rows: Vec<InsertRow>,
}

impl InsertClause {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(column))
    }

    /// Span covering every row, from the first `(` to the last `)`.
    pub fn values_span(&self) -> Option<(usize, usize)> {
        Some((self.rows.first()?.start, self.rows.last()?.end))
    }

    /// Placeholder range covered by all rows.
    pub fn parameters_span(&self) -> Range<usize> {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => first.parameters.start..last.parameters.end,
            _ => 0..0,
        }
    }
}
