use crate::core::{Result, ShardingError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One physical table on one data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parses `data_source.table`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (data_source, table) = text.split_once('.').ok_or_else(|| {
            ShardingError::Config(format!(
                "Invalid data node '{}': expected '<data_source>.<table>'",
                text
            ))
        })?;
        if data_source.trim().is_empty() || table.trim().is_empty() || table.contains('.') {
            return Err(ShardingError::Config(format!("Invalid data node '{}'", text)));
        }
        Ok(Self::new(data_source.trim(), table.trim()))
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}
