pub mod error;
pub mod types;
pub mod value;

pub use error::{Result, ShardingError};
pub use types::{ColumnMetadata, ResultMetadata, Row};
pub use value::{DataType, Value, ValueFamily};
