pub mod key_generator;
pub mod rewriter;

pub use key_generator::{IncrementKeyGenerator, KeyGenerator, SnowflakeKeyGenerator};
pub use rewriter::{SqlRewriter, SqlUnit};
