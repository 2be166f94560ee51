use crate::core::{Result, Value};
use crate::result::{QueryResult, UpdateResult};
use async_trait::async_trait;
use log::warn;
use std::fmt;

/// Physical database access for one data source.
///
/// Implementations must be shareable across tasks; every call may run on a
/// different worker.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn execute(&self, data_source: &str, sql: &str, parameters: &[Value]) -> Result<ExecuteResponse>;
}

pub enum ExecuteResponse {
    Query(Box<dyn QueryResult>),
    Update(UpdateResult),
}

impl ExecuteResponse {
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Releases the cursor, if any.
    pub fn close(&mut self) -> Result<()> {
        match self {
            Self::Query(result) => result.close(),
            Self::Update(_) => Ok(()),
        }
    }

    /// Closes and logs a failure instead of returning it.
    pub(crate) fn close_quietly(mut self) {
        if let Err(err) = self.close() {
            warn!("Failed to close result: {}", err);
        }
    }
}

impl fmt::Debug for ExecuteResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(result) => f
                .debug_tuple("Query")
                .field(&result.metadata().column_count())
                .finish(),
            Self::Update(update) => f.debug_tuple("Update").field(update).finish(),
        }
    }
}
