pub mod algorithm;
pub mod data_node;
pub mod holder;
pub mod inline;
pub mod master_slave;
pub mod sharding_rule;
pub mod strategy;
pub mod table_rule;

pub use algorithm::{ComplexAlgorithm, RangePartition, ShardingValue, StandardAlgorithm};
pub use data_node::DataNode;
pub use holder::RuleHolder;
pub use inline::InlineExpression;
pub use master_slave::{LoadBalanceAlgorithm, MasterSlaveRule};
pub use sharding_rule::{ShardingRule, ShardingRuleBuilder};
pub use strategy::ShardingStrategy;
pub use table_rule::TableRule;
