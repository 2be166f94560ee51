use super::compare::SortKey;
use crate::core::{Result, ResultMetadata, Value};
use crate::result::QueryResult;
use log::warn;

/// A backend cursor owned by a merger.
///
/// Caches the sort-key values of the current row and closes the underlying
/// cursor at most once.
pub struct ResultStream {
    index: usize,
    inner: Box<dyn QueryResult>,
    keys: Vec<Value>,
    closed: bool,
}

impl ResultStream {
    pub fn new(index: usize, inner: Box<dyn QueryResult>) -> Self {
        Self {
            index,
            inner,
            keys: Vec::new(),
            closed: false,
        }
    }

    /// Position of the routing unit that produced this stream.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Moves to the next row. Closes the cursor when it is exhausted.
    pub fn advance(&mut self, sort_keys: &[SortKey]) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        if !self.inner.next()? {
            self.keys.clear();
            self.close()?;
            return Ok(false);
        }
        self.keys = sort_keys
            .iter()
            .map(|key| self.inner.value(key.index))
            .collect::<Result<Vec<_>>>()?;
        Ok(true)
    }

    pub fn metadata(&self) -> &ResultMetadata {
        self.inner.metadata()
    }

    pub fn keys(&self) -> &[Value] {
        &self.keys
    }

    pub fn value(&self, index: usize) -> Result<Value> {
        self.inner.value(index)
    }

    /// Copies the current row.
    pub fn row(&self, width: usize) -> Result<Vec<Value>> {
        (1..=width).map(|index| self.inner.value(index)).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()
    }
}

/// Closes every stream, returning the first failure and logging the rest.
pub fn close_all(streams: &mut [ResultStream]) -> Result<()> {
    let mut first = None;
    for stream in streams.iter_mut() {
        if let Err(err) = stream.close() {
            if first.is_none() {
                first = Some(err);
            } else {
                warn!("Failed to close result of unit {}: {}", stream.index(), err);
            }
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
