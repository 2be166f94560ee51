use super::stream::{ResultStream, close_all};
use crate::core::{Result, ShardingError, Value};

/// Concatenates streams in unit order.
pub struct IteratorMerger {
    streams: Vec<ResultStream>,
    position: usize,
}

impl IteratorMerger {
    pub fn new(streams: Vec<ResultStream>) -> Self {
        Self { streams, position: 0 }
    }

    pub fn next(&mut self) -> Result<bool> {
        while let Some(stream) = self.streams.get_mut(self.position) {
            if stream.advance(&[])? {
                return Ok(true);
            }
            self.position += 1;
        }
        Ok(false)
    }

    pub fn value(&self, index: usize) -> Result<Value> {
        self.streams
            .get(self.position)
            .ok_or_else(|| ShardingError::Merge("No current row".into()))?
            .value(index)
    }

    pub fn close(&mut self) -> Result<()> {
        close_all(&mut self.streams)
    }
}
