use super::group_by::{GroupByMemoryMerger, GroupByStreamMerger};
use super::iterator::IteratorMerger;
use super::order_by::OrderByMerger;
use crate::core::{ColumnMetadata, Result, ResultMetadata, ShardingError, Value};
use crate::statement::Pagination;
use log::warn;
use std::fmt;

/// Merge strategy chosen once per statement.
pub(crate) enum Merger {
    Iterator(IteratorMerger),
    OrderBy(OrderByMerger),
    GroupByStream(GroupByStreamMerger),
    GroupByMemory(GroupByMemoryMerger),
    Empty,
}

impl Merger {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Iterator(_) => "iterator",
            Self::OrderBy(_) => "order-by stream",
            Self::GroupByStream(_) => "group-by stream",
            Self::GroupByMemory(_) => "group-by memory",
            Self::Empty => "empty",
        }
    }

    fn next(&mut self) -> Result<bool> {
        match self {
            Self::Iterator(merger) => merger.next(),
            Self::OrderBy(merger) => merger.next(),
            Self::GroupByStream(merger) => merger.next(),
            Self::GroupByMemory(merger) => merger.next(),
            Self::Empty => Ok(false),
        }
    }

    fn value(&self, index: usize) -> Result<Value> {
        match self {
            Self::Iterator(merger) => merger.value(index),
            Self::OrderBy(merger) => merger.value(index),
            Self::GroupByStream(merger) => merger.value(index),
            Self::GroupByMemory(merger) => merger.value(index),
            Self::Empty => Err(ShardingError::Merge("No current row".into())),
        }
    }

    fn close(&mut self) -> Result<()> {
        match self {
            Self::Iterator(merger) => merger.close(),
            Self::OrderBy(merger) => merger.close(),
            Self::GroupByStream(merger) => merger.close(),
            Self::GroupByMemory(merger) => merger.close(),
            Self::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Created,
    RowAvailable,
    Exhausted,
}

/// The logical result of a query over every routing unit.
///
/// Forward-only. Once `next` returns `false` (or fails) the cursor is
/// exhausted and every underlying result has been closed. Dropping it closes
/// whatever is still open.
pub struct MergedResult {
    merger: Merger,
    metadata: ResultMetadata,
    pagination: Option<Pagination>,
    skipped: bool,
    returned: u64,
    state: CursorState,
    closed: bool,
}

impl MergedResult {
    pub(crate) fn new(merger: Merger, metadata: ResultMetadata, pagination: Option<Pagination>) -> Self {
        Self {
            merger,
            metadata,
            pagination,
            skipped: false,
            returned: 0,
            state: CursorState::Created,
            closed: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Merger::Empty, ResultMetadata::default(), None)
    }

    /// Name of the merge strategy in use.
    pub fn merge_kind(&self) -> &'static str {
        self.merger.kind()
    }

    pub fn metadata(&self) -> &ResultMetadata {
        &self.metadata
    }

    pub fn column_count(&self) -> usize {
        self.metadata.column_count()
    }

    pub fn column(&self, index: usize) -> Result<&ColumnMetadata> {
        self.metadata.column(index)
    }

    pub fn find_column(&self, label: &str) -> Option<usize> {
        self.metadata.find_column_index(label)
    }

    pub fn next(&mut self) -> Result<bool> {
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        match self.advance() {
            Ok(true) => {
                self.state = CursorState::RowAvailable;
                Ok(true)
            }
            Ok(false) => {
                self.exhaust()?;
                Ok(false)
            }
            Err(err) => {
                self.state = CursorState::Exhausted;
                if let Err(close_err) = self.close_inner() {
                    warn!("Failed to close merged result after error: {}", close_err);
                }
                Err(err)
            }
        }
    }

    fn advance(&mut self) -> Result<bool> {
        let Some(page) = self.pagination else {
            return self.merger.next();
        };
        if !self.skipped {
            self.skipped = true;
            for _ in 0..page.offset {
                if !self.merger.next()? {
                    return Ok(false);
                }
            }
        }
        if page.row_count.is_some_and(|count| self.returned >= count) {
            return Ok(false);
        }
        let more = self.merger.next()?;
        if more {
            self.returned += 1;
        }
        Ok(more)
    }

    fn exhaust(&mut self) -> Result<()> {
        self.state = CursorState::Exhausted;
        self.close_inner()
    }

    fn close_inner(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.merger.close()
    }

    /// Value of a 1-based column of the current row.
    pub fn value(&self, index: usize) -> Result<Value> {
        if self.state != CursorState::RowAvailable {
            return Err(ShardingError::Merge("No current row".into()));
        }
        self.metadata.column(index)?;
        self.merger.value(index)
    }

    pub fn value_by_label(&self, label: &str) -> Result<Value> {
        let index = self
            .metadata
            .find_column_index(label)
            .ok_or_else(|| ShardingError::Merge(format!("Column '{}' is not in the result set", label)))?;
        self.value(index)
    }

    /// Reads the remaining rows.
    pub fn collect_rows(&mut self) -> Result<Vec<Vec<Value>>> {
        let mut rows = Vec::new();
        while self.next()? {
            rows.push(
                (1..=self.column_count())
                    .map(|index| self.value(index))
                    .collect::<Result<Vec<_>>>()?,
            );
        }
        Ok(rows)
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    pub fn close(&mut self) -> Result<()> {
        self.state = CursorState::Exhausted;
        self.close_inner()
    }
}

impl fmt::Debug for MergedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedResult")
            .field("merge_kind", &self.merge_kind())
            .field("columns", &self.column_count())
            .field("state", &self.state)
            .finish()
    }
}

impl Drop for MergedResult {
    fn drop(&mut self) {
        if let Err(err) = self.close_inner() {
            warn!("Failed to close merged result on drop: {}", err);
        }
    }
}
