use super::data_node::DataNode;
use super::inline;
use super::strategy::ShardingStrategy;
use crate::core::{Result, ShardingError};
use std::collections::HashSet;

/// Sharding configuration of one logical table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRule {
    logic_table: String,
    data_nodes: Vec<DataNode>,
    database_strategy: Option<ShardingStrategy>,
    table_strategy: Option<ShardingStrategy>,
    generate_key_column: Option<String>,
}

impl TableRule {
    pub fn new(logic_table: impl Into<String>, data_nodes: Vec<DataNode>) -> Result<Self> {
        let logic_table = logic_table.into();
        if logic_table.trim().is_empty() {
            return Err(ShardingError::Config("Logic table name is empty".into()));
        }
        if data_nodes.is_empty() {
            return Err(ShardingError::Config(format!(
                "Table '{}' has no data nodes",
                logic_table
            )));
        }
        let mut seen = HashSet::new();
        for node in &data_nodes {
            if !seen.insert(node) {
                return Err(ShardingError::Config(format!(
                    "Table '{}' lists data node '{}' twice",
                    logic_table, node
                )));
            }
        }
        Ok(Self {
            logic_table,
            data_nodes,
            database_strategy: None,
            table_strategy: None,
            generate_key_column: None,
        })
    }

    /// Builds a rule from an inline data-node expression such as `ds${0..1}.t_order_${0..1}`.
    pub fn from_inline(logic_table: impl Into<String>, actual_data_nodes: &str) -> Result<Self> {
        let nodes = inline::expand(actual_data_nodes)?
            .iter()
            .map(|text| DataNode::parse(text))
            .collect::<Result<Vec<_>>>()?;
        Self::new(logic_table, nodes)
    }

    pub fn with_database_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.database_strategy = Some(strategy);
        self
    }

    pub fn with_table_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.table_strategy = Some(strategy);
        self
    }

    pub fn with_generate_key_column(mut self, column: impl Into<String>) -> Self {
        self.generate_key_column = Some(column.into());
        self
    }

    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    pub fn data_nodes(&self) -> &[DataNode] {
        &self.data_nodes
    }

    pub fn database_strategy(&self) -> Option<&ShardingStrategy> {
        self.database_strategy.as_ref()
    }

    pub fn table_strategy(&self) -> Option<&ShardingStrategy> {
        self.table_strategy.as_ref()
    }

    pub fn generate_key_column(&self) -> Option<&str> {
        self.generate_key_column.as_deref()
    }

    /// Data sources holding this table, in data-node order.
    pub fn data_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for node in &self.data_nodes {
            if !names.contains(&node.data_source) {
                names.push(node.data_source.clone());
            }
        }
        names
    }

    /// Actual tables of this logical table on `data_source`, in data-node order.
    pub fn actual_tables(&self, data_source: &str) -> Vec<String> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .map(|node| node.table.clone())
            .collect()
    }

    /// Position of `table` among the actual tables of `data_source`.
    pub fn actual_table_index(&self, data_source: &str, table: &str) -> Option<usize> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .position(|node| node.table == table)
    }

    pub fn actual_table_at(&self, data_source: &str, index: usize) -> Option<&str> {
        self.data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .nth(index)
            .map(|node| node.table.as_str())
    }

    /// Columns used by either strategy of this table.
    pub fn sharding_columns(&self) -> Vec<String> {
        let mut columns = Vec::new();
        for strategy in [&self.database_strategy, &self.table_strategy].into_iter().flatten() {
            for column in strategy.sharding_columns() {
                if !columns.iter().any(|c: &String| c.eq_ignore_ascii_case(&column)) {
                    columns.push(column);
                }
            }
        }
        columns
    }

    /// Shape used to check that binding tables are co-located: the number of
    /// actual tables on every data source.
    pub(crate) fn layout(&self) -> Vec<(String, usize)> {
        self.data_source_names()
            .into_iter()
            .map(|ds| {
                let count = self.actual_tables(&ds).len();
                (ds, count)
            })
            .collect()
    }

    /// Replaces data-source names after master-slave folding.
    pub(crate) fn rename_data_sources<F>(&mut self, rename: F)
    where
        F: Fn(&str) -> String,
    {
        for node in &mut self.data_nodes {
            node.data_source = rename(&node.data_source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_inline_and_lookups() {
        let rule = TableRule::from_inline("t_order", "ds${0..1}.t_order_${0..2}").unwrap();
        assert_eq!(rule.data_nodes().len(), 6);
        assert_eq!(rule.data_source_names(), vec!["ds0", "ds1"]);
        assert_eq!(rule.actual_tables("ds1"), vec!["t_order_0", "t_order_1", "t_order_2"]);
        assert_eq!(rule.actual_table_index("ds1", "t_order_2"), Some(2));
        assert_eq!(rule.actual_table_at("ds0", 1), Some("t_order_1"));
        assert_eq!(rule.actual_table_at("ds0", 3), None);
        assert_eq!(rule.layout(), vec![("ds0".to_string(), 3), ("ds1".to_string(), 3)]);
    }

    #[test]
    fn test_duplicate_nodes_rejected() {
        let err = TableRule::from_inline("t_order", "ds0.t_order_0, ds0.t_order_0").unwrap_err();
        assert!(matches!(err, ShardingError::Config(_)));
    }

    #[test]
    fn test_sharding_columns_across_strategies() {
        let rule = TableRule::from_inline("t_order", "ds${0..1}.t_order_${0..1}")
            .unwrap()
            .with_database_strategy(ShardingStrategy::inline("user_id", "ds${user_id % 2}").unwrap())
            .with_table_strategy(ShardingStrategy::inline("order_id", "t_order_${order_id % 2}").unwrap())
            .with_generate_key_column("order_id");
        assert_eq!(rule.sharding_columns(), vec!["user_id", "order_id"]);
        assert_eq!(rule.generate_key_column(), Some("order_id"));
    }
}
