pub mod memory;
pub mod query_result;

pub use memory::MemoryQueryResult;
pub use query_result::{QueryResult, UpdateResult};
