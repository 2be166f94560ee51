use super::{DataType, Result, ShardingError};

pub type Row = Vec<crate::core::Value>;

/// Metadata of one result column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    pub name: String,
    pub label: String,
    pub data_type: DataType,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            data_type,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Column metadata of a result set. Indexes are 1-based at the API surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultMetadata {
    columns: Vec<ColumnMetadata>,
}

impl ResultMetadata {
    pub fn new(columns: Vec<ColumnMetadata>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Finds the 1-based index of a column by label, falling back to its name.
    pub fn find_column_index(&self, label: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|col| col.label.eq_ignore_ascii_case(label))
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|col| col.name.eq_ignore_ascii_case(label))
            })
            .map(|idx| idx + 1)
    }

    pub fn column(&self, index: usize) -> Result<&ColumnMetadata> {
        index
            .checked_sub(1)
            .and_then(|idx| self.columns.get(idx))
            .ok_or_else(|| {
                ShardingError::Merge(format!(
                    "Column index {} out of range 1..={}",
                    index,
                    self.columns.len()
                ))
            })
    }

    /// Two metadata sets are merge-compatible when they have the same shape.
    pub fn is_compatible_with(&self, other: &ResultMetadata) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.label.eq_ignore_ascii_case(&b.label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_column_index_is_case_insensitive() {
        let metadata = ResultMetadata::new(vec![
            ColumnMetadata::new("order_id", DataType::Integer),
            ColumnMetadata::new("COUNT(*)", DataType::Integer).with_label("cnt"),
        ]);

        assert_eq!(metadata.find_column_index("ORDER_ID"), Some(1));
        assert_eq!(metadata.find_column_index("cnt"), Some(2));
        assert_eq!(metadata.find_column_index("COUNT(*)"), Some(2));
        assert_eq!(metadata.find_column_index("missing"), None);
        assert!(metadata.column(0).is_err());
        assert!(metadata.column(3).is_err());
    }
}
