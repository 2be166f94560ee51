// ============================================================================
// RustShard Library
// ============================================================================
//
// One logical database over many physical ones. A statement flows through:
//
//   rule model -> routing -> rewrite -> parallel execution -> merge
//
// `ShardingDataSource` wires that flow; every stage is also usable on its own.
//
// ============================================================================

pub mod core;
pub mod rule;
pub mod statement;
pub mod routing;
pub mod rewrite;
pub mod result;
pub mod executor;
pub mod merge;
pub mod config;
pub mod facade;

// Re-export main types for convenience
pub use core::{DataType, Result, ShardingError, Value};
pub use facade::{ExecuteOutcome, ShardingDataSource};
pub use result::{QueryResult, UpdateResult};

pub use config::{ShardingProperties, ShardingRuleConfig};
pub use executor::{Backend, ExecuteResponse, ExecutionEngine, ExecutionPolicy, MemoryBackend};
pub use merge::{MergeEngine, MergedResult};
pub use rewrite::{KeyGenerator, SnowflakeKeyGenerator, SqlRewriter, SqlUnit};
pub use routing::{RouteResult, RoutingEngine, SessionContext};
pub use rule::{RuleHolder, ShardingRule, ShardingStrategy, TableRule};
pub use statement::{SqlStatement, StatementKind};
