// ============================================================================
// Group / aggregation merge
// ============================================================================
//
// Stream variant: every shard returns rows sorted by the group columns, so an
// order-merge delivers each group contiguously and groups are folded one at a
// time.
//
// Memory variant: rows are folded into a hash of groups, then sorted by the
// ORDER BY keys. Used when ORDER BY differs from GROUP BY and for aggregates
// without GROUP BY (one implicit group).
//
// ============================================================================

use super::aggregation::{AggregationColumn, GroupAccumulator};
use super::compare::{FamilyGuard, SortKey, compare_keys};
use super::order_by::OrderByMerger;
use super::stream::{ResultStream, close_all};
use crate::core::{Result, Row, ShardingError, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};

fn current_value(row: Option<&Row>, index: usize) -> Result<Value> {
    let row = row.ok_or_else(|| ShardingError::Merge("No current row".into()))?;
    index
        .checked_sub(1)
        .and_then(|idx| row.get(idx))
        .cloned()
        .ok_or_else(|| ShardingError::Merge(format!("Column index {} out of range 1..={}", index, row.len())))
}

pub struct GroupByStreamMerger {
    inner: OrderByMerger,
    group_keys: Vec<SortKey>,
    aggregations: Vec<AggregationColumn>,
    width: usize,
    current: Option<Row>,
    pending: bool,
    started: bool,
}

impl GroupByStreamMerger {
    /// `group_keys` must match the per-shard sort order.
    pub fn new(
        streams: Vec<ResultStream>,
        group_keys: Vec<SortKey>,
        aggregations: Vec<AggregationColumn>,
        width: usize,
    ) -> Self {
        Self {
            inner: OrderByMerger::new(streams, group_keys.clone()),
            group_keys,
            aggregations,
            width,
            current: None,
            pending: false,
            started: false,
        }
    }

    pub fn next(&mut self) -> Result<bool> {
        if !self.started {
            self.started = true;
            self.pending = self.inner.next()?;
        }
        if !self.pending {
            self.current = None;
            return Ok(false);
        }

        let group = self.inner.current_keys()?.to_vec();
        let mut row = (1..=self.width)
            .map(|index| self.inner.value(index))
            .collect::<Result<Row>>()?;
        let mut accumulator = GroupAccumulator::new(&self.aggregations);
        accumulator.accumulate(&self.aggregations, |index| self.inner.value(index))?;
        loop {
            self.pending = self.inner.next()?;
            if !self.pending || compare_keys(self.inner.current_keys()?, &group, &self.group_keys)? != Ordering::Equal {
                break;
            }
            accumulator.accumulate(&self.aggregations, |index| self.inner.value(index))?;
        }
        accumulator.finish(&self.aggregations, &mut row)?;
        self.current = Some(row);
        Ok(true)
    }

    pub fn value(&self, index: usize) -> Result<Value> {
        current_value(self.current.as_ref(), index)
    }

    pub fn close(&mut self) -> Result<()> {
        self.current = None;
        self.pending = false;
        self.inner.close()
    }
}

pub struct GroupByMemoryMerger {
    streams: Vec<ResultStream>,
    group_keys: Vec<SortKey>,
    order_keys: Vec<SortKey>,
    aggregations: Vec<AggregationColumn>,
    width: usize,
    rows: Option<VecDeque<Row>>,
    current: Option<Row>,
}

impl GroupByMemoryMerger {
    pub fn new(
        streams: Vec<ResultStream>,
        group_keys: Vec<SortKey>,
        order_keys: Vec<SortKey>,
        aggregations: Vec<AggregationColumn>,
        width: usize,
    ) -> Self {
        Self {
            streams,
            group_keys,
            order_keys,
            aggregations,
            width,
            rows: None,
            current: None,
        }
    }

    /// Reads every stream to the end and folds the groups.
    fn load(&mut self) -> Result<VecDeque<Row>> {
        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Row, GroupAccumulator)> = Vec::new();
        let mut guard = FamilyGuard::new(self.group_keys.len());

        for stream in self.streams.iter_mut() {
            while stream.advance(&self.group_keys)? {
                let key = stream.keys().to_vec();
                guard.check(&key)?;
                let slot = match index.get(&key) {
                    Some(slot) => *slot,
                    None => {
                        groups.push((stream.row(self.width)?, GroupAccumulator::new(&self.aggregations)));
                        index.insert(key, groups.len() - 1);
                        groups.len() - 1
                    }
                };
                groups[slot]
                    .1
                    .accumulate(&self.aggregations, |column| stream.value(column))?;
            }
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (mut row, accumulator) in groups {
            accumulator.finish(&self.aggregations, &mut row)?;
            rows.push(row);
        }
        self.sort(&mut rows)?;
        Ok(rows.into())
    }

    fn sort(&self, rows: &mut [Row]) -> Result<()> {
        if self.order_keys.is_empty() {
            return Ok(());
        }
        let key_of = |row: &Row| -> Result<Vec<Value>> {
            self.order_keys
                .iter()
                .map(|key| current_value(Some(row), key.index))
                .collect()
        };
        let mut guard = FamilyGuard::new(self.order_keys.len());
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            let key = key_of(row)?;
            guard.check(&key)?;
            keyed.push(key);
        }
        let mut order: Vec<usize> = (0..rows.len()).collect();
        order.sort_by(|a, b| compare_keys(&keyed[*a], &keyed[*b], &self.order_keys).unwrap_or(Ordering::Equal));
        let sorted: Vec<Row> = order.iter().map(|i| rows[*i].clone()).collect();
        rows.clone_from_slice(&sorted);
        Ok(())
    }

    pub fn next(&mut self) -> Result<bool> {
        if self.rows.is_none() {
            let loaded = self.load()?;
            self.rows = Some(loaded);
        }
        self.current = self.rows.as_mut().and_then(|rows| rows.pop_front());
        Ok(self.current.is_some())
    }

    pub fn value(&self, index: usize) -> Result<Value> {
        current_value(self.current.as_ref(), index)
    }

    pub fn close(&mut self) -> Result<()> {
        self.current = None;
        self.rows = Some(VecDeque::new());
        close_all(&mut self.streams)
    }
}
