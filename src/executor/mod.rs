pub mod backend;
pub mod engine;
pub mod memory;

pub use backend::{Backend, ExecuteResponse};
pub use engine::{ExecutionEngine, ExecutionPolicy};
pub use memory::MemoryBackend;
