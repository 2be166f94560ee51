// ============================================================================
// Declarative rule configuration
// ============================================================================
//
// JSON shape:
//
//   {
//     "data_sources": ["ds0", "ds1"],
//     "tables": [{
//       "logic_table": "t_order",
//       "actual_data_nodes": "ds${0..1}.t_order_${0..1}",
//       "database_strategy": { "inline": { "column": "user_id", "expression": "ds${user_id % 2}" } },
//       "table_strategy": { "modulo": { "column": "order_id", "sharding_count": 2 } },
//       "generate_key_column": "order_id"
//     }],
//     "binding_tables": [["t_order", "t_order_item"]],
//     "broadcast_tables": ["t_config"]
//   }
//
// ============================================================================

use crate::core::{Result, ShardingError};
use crate::rule::{
    ComplexAlgorithm, InlineExpression, LoadBalanceAlgorithm, MasterSlaveRule, RangePartition, ShardingRule,
    ShardingStrategy, StandardAlgorithm, TableRule,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardingRuleConfig {
    pub data_sources: Vec<String>,
    pub tables: Vec<TableRuleConfig>,
    pub binding_tables: Vec<Vec<String>>,
    pub broadcast_tables: Vec<String>,
    pub default_data_source: Option<String>,
    pub default_database_strategy: Option<StrategyConfig>,
    pub default_table_strategy: Option<StrategyConfig>,
    pub master_slave_rules: Vec<MasterSlaveRuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    pub logic_table: String,
    /// Inline expression; defaults to the logic table on every data source.
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<StrategyConfig>,
    #[serde(default)]
    pub generate_key_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyConfig {
    Inline {
        column: String,
        expression: String,
    },
    Modulo {
        column: String,
        sharding_count: u64,
    },
    HashMod {
        column: String,
        sharding_count: u64,
    },
    Range {
        column: String,
        partitions: Vec<RangePartitionConfig>,
    },
    /// Multi-column; exactly one of `expression` / `sharding_count`.
    Complex {
        columns: Vec<String>,
        #[serde(default)]
        expression: Option<String>,
        #[serde(default)]
        sharding_count: Option<u64>,
    },
    /// Values come from session hints; exactly one of `expression` / `sharding_count`.
    Hint {
        #[serde(default)]
        expression: Option<String>,
        #[serde(default)]
        sharding_count: Option<u64>,
    },
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangePartitionConfig {
    #[serde(default)]
    pub lower: Option<i64>,
    #[serde(default)]
    pub upper: Option<i64>,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSlaveRuleConfig {
    pub name: String,
    pub master: String,
    pub slaves: Vec<String>,
    #[serde(default)]
    pub load_balance: LoadBalanceAlgorithm,
}

impl ShardingRuleConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds and validates the rule this configuration describes.
    pub fn build(&self) -> Result<ShardingRule> {
        let mut builder = ShardingRule::builder().data_sources(self.data_sources.iter().cloned());
        for group in &self.master_slave_rules {
            builder = builder.master_slave_rule(MasterSlaveRule::new(
                group.name.as_str(),
                group.master.as_str(),
                group.slaves.clone(),
                group.load_balance,
            )?);
        }
        for table in &self.tables {
            builder = builder.table_rule(table.build(&self.data_sources, &self.master_slave_rules)?);
        }
        for group in &self.binding_tables {
            builder = builder.binding_group(group.iter().cloned());
        }
        for table in &self.broadcast_tables {
            builder = builder.broadcast_table(table.as_str());
        }
        if let Some(name) = &self.default_data_source {
            builder = builder.default_data_source(name.as_str());
        }
        if let Some(strategy) = &self.default_database_strategy {
            builder = builder.default_database_strategy(strategy.build()?);
        }
        if let Some(strategy) = &self.default_table_strategy {
            builder = builder.default_table_strategy(strategy.build()?);
        }
        builder.build()
    }
}

impl TableRuleConfig {
    fn build(&self, data_sources: &[String], master_slave: &[MasterSlaveRuleConfig]) -> Result<TableRule> {
        let mut rule = match &self.actual_data_nodes {
            Some(expression) => TableRule::from_inline(self.logic_table.as_str(), expression)?,
            None => {
                // Logical data sources: master-slave groups replace their members.
                let mut logical: Vec<&str> = master_slave.iter().map(|g| g.name.as_str()).collect();
                for name in data_sources {
                    let grouped = master_slave
                        .iter()
                        .any(|g| g.master == *name || g.slaves.contains(name));
                    if !grouped {
                        logical.push(name);
                    }
                }
                let nodes = logical
                    .into_iter()
                    .map(|ds| crate::rule::DataNode::new(ds, self.logic_table.as_str()))
                    .collect();
                TableRule::new(self.logic_table.as_str(), nodes)?
            }
        };
        if let Some(strategy) = &self.database_strategy {
            rule = rule.with_database_strategy(strategy.build()?);
        }
        if let Some(strategy) = &self.table_strategy {
            rule = rule.with_table_strategy(strategy.build()?);
        }
        if let Some(column) = &self.generate_key_column {
            rule = rule.with_generate_key_column(column.as_str());
        }
        Ok(rule)
    }
}

impl StrategyConfig {
    pub fn build(&self) -> Result<ShardingStrategy> {
        Ok(match self {
            Self::Inline { column, expression } => ShardingStrategy::inline(column.as_str(), expression)?,
            Self::Modulo { column, sharding_count } => {
                ShardingStrategy::modulo(column.as_str(), *sharding_count)?
            }
            Self::HashMod { column, sharding_count } => ShardingStrategy::Standard {
                column: column.clone(),
                algorithm: StandardAlgorithm::HashMod {
                    sharding_count: require_count(*sharding_count)?,
                },
            },
            Self::Range { column, partitions } => ShardingStrategy::Standard {
                column: column.clone(),
                algorithm: StandardAlgorithm::Range {
                    partitions: partitions
                        .iter()
                        .map(|p| RangePartition {
                            lower: p.lower,
                            upper: p.upper,
                            target: p.target.clone(),
                        })
                        .collect(),
                },
            },
            Self::Complex {
                columns,
                expression,
                sharding_count,
            } => {
                if columns.is_empty() {
                    return Err(ShardingError::Config("Complex strategy needs sharding columns".into()));
                }
                let algorithm = match (expression, sharding_count) {
                    (Some(expression), None) => ComplexAlgorithm::Inline(InlineExpression::parse(expression)?),
                    (None, Some(count)) => ComplexAlgorithm::HashMod {
                        sharding_count: require_count(*count)?,
                    },
                    _ => {
                        return Err(ShardingError::Config(
                            "Complex strategy needs exactly one of 'expression' or 'sharding_count'".into(),
                        ));
                    }
                };
                ShardingStrategy::Complex {
                    columns: columns.clone(),
                    algorithm,
                }
            }
            Self::Hint {
                expression,
                sharding_count,
            } => {
                let algorithm = match (expression, sharding_count) {
                    (Some(expression), None) => StandardAlgorithm::Inline(InlineExpression::parse(expression)?),
                    (None, Some(count)) => StandardAlgorithm::Modulo {
                        sharding_count: require_count(*count)?,
                    },
                    _ => {
                        return Err(ShardingError::Config(
                            "Hint strategy needs exactly one of 'expression' or 'sharding_count'".into(),
                        ));
                    }
                };
                ShardingStrategy::Hint { algorithm }
            }
            Self::None => ShardingStrategy::None,
        })
    }
}

fn require_count(count: u64) -> Result<u64> {
    if count == 0 {
        return Err(ShardingError::Config("sharding_count must be > 0".into()));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "data_sources": ["ds0", "ds1"],
        "tables": [
            {
                "logic_table": "t_order",
                "actual_data_nodes": "ds${0..1}.t_order_${0..1}",
                "database_strategy": { "inline": { "column": "user_id", "expression": "ds${user_id % 2}" } },
                "table_strategy": { "modulo": { "column": "order_id", "sharding_count": 2 } },
                "generate_key_column": "order_id"
            },
            {
                "logic_table": "t_order_item",
                "actual_data_nodes": "ds${0..1}.t_order_item_${0..1}",
                "database_strategy": { "inline": { "column": "user_id", "expression": "ds${user_id % 2}" } },
                "table_strategy": { "modulo": { "column": "order_id", "sharding_count": 2 } }
            }
        ],
        "binding_tables": [["t_order", "t_order_item"]],
        "broadcast_tables": ["t_config"],
        "default_data_source": "ds0"
    }"#;

    #[test]
    fn test_load_from_json() {
        let config = ShardingRuleConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.tables.len(), 2);
        assert_eq!(
            config.tables[0].table_strategy,
            Some(StrategyConfig::Modulo {
                column: "order_id".into(),
                sharding_count: 2
            })
        );

        let rule = config.build().unwrap();
        assert!(rule.is_sharded("T_ORDER"));
        assert!(rule.is_broadcast("t_config"));
        assert_eq!(rule.default_data_source(), Some("ds0"));
        assert!(rule.all_binding(&["t_order".to_string(), "t_order_item".to_string()]));
        assert_eq!(rule.table_rule("t_order").unwrap().data_nodes().len(), 4);
    }

    #[test]
    fn test_round_trip_preserves_config() {
        let config = ShardingRuleConfig::from_json(CONFIG).unwrap();
        let again = ShardingRuleConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, again);
    }

    #[test]
    fn test_master_slave_groups_become_logical_data_sources() {
        let json = r#"{
            "data_sources": ["m0", "s0", "s1"],
            "master_slave_rules": [
                { "name": "ms0", "master": "m0", "slaves": ["s0", "s1"], "load_balance": "random" }
            ],
            "tables": [{ "logic_table": "t_user" }]
        }"#;
        let rule = ShardingRuleConfig::from_json(json).unwrap().build().unwrap();
        let group = rule.master_slave_rule("ms0").unwrap();
        assert_eq!(group.load_balance(), LoadBalanceAlgorithm::Random);
        let nodes = rule.table_rule("t_user").unwrap().data_nodes();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].data_source, "ms0");
    }

    #[test]
    fn test_invalid_strategies_are_rejected() {
        let zero = StrategyConfig::Modulo {
            column: "id".into(),
            sharding_count: 0,
        };
        assert!(matches!(zero.build(), Err(ShardingError::Config(_))));

        let ambiguous = StrategyConfig::Hint {
            expression: Some("ds${value % 2}".into()),
            sharding_count: Some(2),
        };
        assert!(ambiguous.build().is_err());

        assert!(ShardingRuleConfig::from_json("{ \"tables\": 1 }").is_err());
    }

    #[test]
    fn test_none_strategy_from_json() {
        let strategy: StrategyConfig = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(strategy.build().unwrap(), ShardingStrategy::None);
    }
}
