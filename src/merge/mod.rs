// ============================================================================
// Result Merge Engine
// ============================================================================
//
// Strategy per statement, given more than one unit result:
// - no ORDER BY / GROUP BY / aggregation: concatenate (iterator)
// - ORDER BY: K-way heap merge (order_by)
// - GROUP BY matching the per-shard order: streaming fold (group_by)
// - otherwise, or aggregates without GROUP BY: in-memory fold (group_by)
// LIMIT is applied on top of any of them by `MergedResult`.
//
// ============================================================================

pub mod aggregation;
pub mod compare;
pub mod engine;
pub mod group_by;
pub mod iterator;
pub mod merged;
pub mod order_by;
pub mod stream;
pub mod update;

pub use compare::SortKey;
pub use engine::MergeEngine;
pub use merged::MergedResult;
pub use update::merge_update;
