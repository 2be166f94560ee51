use crate::core::{ResultMetadata, Result, Value};

/// Forward-only cursor over one backend result set.
///
/// Column indexes are 1-based. `value` is only valid after `next` returned
/// `true`. Whoever owns the cursor closes it exactly once.
pub trait QueryResult: Send {
    fn next(&mut self) -> Result<bool>;

    fn value(&self, index: usize) -> Result<Value>;

    fn metadata(&self) -> &ResultMetadata;

    fn close(&mut self) -> Result<()>;
}

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub affected_rows: u64,
    pub generated_keys: Vec<Value>,
}

impl UpdateResult {
    pub fn new(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            generated_keys: Vec::new(),
        }
    }

    pub fn with_generated_keys(mut self, keys: Vec<Value>) -> Self {
        self.generated_keys = keys;
        self
    }
}
