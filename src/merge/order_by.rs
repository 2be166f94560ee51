// ============================================================================
// Streaming order-merge
// ============================================================================
//
// K-way merge over per-shard cursors that are already sorted by the ORDER BY
// keys. The heap holds one entry per live stream; popping yields the global
// next row. Equal keys come out in unit order.
//
// ============================================================================

use super::compare::{FamilyGuard, SortKey, compare_keys};
use super::stream::{ResultStream, close_all};
use crate::core::{Result, ShardingError, Value};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

struct HeapEntry {
    keys: Vec<Value>,
    stream: usize,
    sort_keys: Arc<[SortKey]>,
}

impl HeapEntry {
    /// Ascending merge order; `FamilyGuard` has already rejected rows whose
    /// keys cannot be compared.
    fn merge_order(&self, other: &Self) -> Ordering {
        compare_keys(&self.keys, &other.keys, &self.sort_keys)
            .unwrap_or(Ordering::Equal)
            .then(self.stream.cmp(&other.stream))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.merge_order(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // BinaryHeap pops the greatest entry, so the merge order is reversed.
    fn cmp(&self, other: &Self) -> Ordering {
        self.merge_order(other).reverse()
    }
}

pub struct OrderByMerger {
    streams: Vec<ResultStream>,
    sort_keys: Arc<[SortKey]>,
    heap: BinaryHeap<HeapEntry>,
    guard: FamilyGuard,
    current: Option<usize>,
    started: bool,
}

impl OrderByMerger {
    pub fn new(streams: Vec<ResultStream>, sort_keys: Vec<SortKey>) -> Self {
        let width = sort_keys.len();
        Self {
            heap: BinaryHeap::with_capacity(streams.len()),
            streams,
            sort_keys: sort_keys.into(),
            guard: FamilyGuard::new(width),
            current: None,
            started: false,
        }
    }

    fn push(&mut self, stream: usize) -> Result<()> {
        let Some(source) = self.streams.get_mut(stream) else {
            return Ok(());
        };
        if !source.advance(&self.sort_keys)? {
            return Ok(());
        }
        let keys = source.keys().to_vec();
        self.guard.check(&keys)?;
        self.heap.push(HeapEntry {
            keys,
            stream,
            sort_keys: Arc::clone(&self.sort_keys),
        });
        Ok(())
    }

    pub fn next(&mut self) -> Result<bool> {
        if !self.started {
            self.started = true;
            for stream in 0..self.streams.len() {
                self.push(stream)?;
            }
        } else if let Some(stream) = self.current.take() {
            self.push(stream)?;
        }
        match self.heap.pop() {
            Some(entry) => {
                self.current = Some(entry.stream);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn value(&self, index: usize) -> Result<Value> {
        self.current
            .and_then(|stream| self.streams.get(stream))
            .ok_or_else(|| ShardingError::Merge("No current row".into()))?
            .value(index)
    }

    /// Sort-key values of the current row.
    pub fn current_keys(&self) -> Result<&[Value]> {
        self.current
            .and_then(|stream| self.streams.get(stream))
            .map(|stream| stream.keys())
            .ok_or_else(|| ShardingError::Merge("No current row".into()))
    }

    pub fn close(&mut self) -> Result<()> {
        self.heap.clear();
        self.current = None;
        close_all(&mut self.streams)
    }
}
