use super::query_result::QueryResult;
use crate::core::{Result, ResultMetadata, Row, ShardingError, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Query result backed by rows held in memory.
///
/// Used by `MemoryBackend` and by the merge engine's tests. Every `close` call
/// bumps the optional counter, so callers can assert a cursor was closed
/// exactly once.
#[derive(Debug)]
pub struct MemoryQueryResult {
    metadata: ResultMetadata,
    rows: VecDeque<Row>,
    current: Option<Row>,
    yielded: usize,
    fail_after: Option<(usize, String)>,
    close_counter: Option<Arc<AtomicUsize>>,
    closed: bool,
}

impl MemoryQueryResult {
    pub fn new(metadata: ResultMetadata, rows: Vec<Row>) -> Self {
        Self {
            metadata,
            rows: rows.into(),
            current: None,
            yielded: 0,
            fail_after: None,
            close_counter: None,
            closed: false,
        }
    }

    pub fn with_close_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.close_counter = Some(counter);
        self
    }

    /// `next` fails once `rows` rows have been produced.
    pub fn fail_after(mut self, rows: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((rows, message.into()));
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> Result<bool> {
        if self.closed {
            return Err(ShardingError::Merge("Result set is closed".into()));
        }
        if let Some((limit, message)) = &self.fail_after {
            if self.yielded >= *limit {
                self.current = None;
                return Err(ShardingError::execution("memory", message.clone()));
            }
        }
        self.current = self.rows.pop_front();
        if self.current.is_some() {
            self.yielded += 1;
        }
        Ok(self.current.is_some())
    }

    fn value(&self, index: usize) -> Result<Value> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| ShardingError::Merge("No current row".into()))?;
        self.metadata.column(index)?;
        row.get(index - 1).cloned().ok_or_else(|| {
            ShardingError::Merge(format!("Row has {} values, column {} requested", row.len(), index))
        })
    }

    fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    fn close(&mut self) -> Result<()> {
        if let Some(counter) = &self.close_counter {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        self.closed = true;
        self.current = None;
        self.rows.clear();
        Ok(())
    }
}
