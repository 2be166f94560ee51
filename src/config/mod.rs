pub mod properties;
pub mod rule_config;

pub use properties::ShardingProperties;
pub use rule_config::{
    MasterSlaveRuleConfig, RangePartitionConfig, ShardingRuleConfig, StrategyConfig, TableRuleConfig,
};
