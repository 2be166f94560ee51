use super::aggregation::AggregationColumn;
use super::compare::SortKey;
use super::group_by::{GroupByMemoryMerger, GroupByStreamMerger};
use super::iterator::IteratorMerger;
use super::merged::{MergedResult, Merger};
use super::order_by::OrderByMerger;
use super::stream::{ResultStream, close_all};
use crate::core::{Result, ResultMetadata, ShardingError, Value};
use crate::result::QueryResult;
use crate::statement::{Pagination, SqlStatement};
use log::{debug, warn};

/// Everything the merger needs, resolved against the result metadata
/// before any row is read.
enum Plan {
    Iterator,
    OrderBy(Vec<SortKey>),
    GroupByStream {
        group_keys: Vec<SortKey>,
        aggregations: Vec<AggregationColumn>,
    },
    GroupByMemory {
        group_keys: Vec<SortKey>,
        order_keys: Vec<SortKey>,
        aggregations: Vec<AggregationColumn>,
    },
}

pub struct MergeEngine<'a> {
    statement: &'a SqlStatement,
    parameters: &'a [Value],
}

impl<'a> MergeEngine<'a> {
    /// `parameters` are the logical statement's parameters, used to resolve
    /// a parameterized LIMIT.
    pub fn new(statement: &'a SqlStatement, parameters: &'a [Value]) -> Self {
        Self { statement, parameters }
    }

    /// Takes ownership of the unit results (in unit order) and returns one
    /// logical cursor over them. On error every result is closed.
    pub fn merge(&self, results: Vec<Box<dyn QueryResult>>) -> Result<MergedResult> {
        let mut streams: Vec<ResultStream> = results
            .into_iter()
            .enumerate()
            .map(|(index, result)| ResultStream::new(index, result))
            .collect();
        let Some(first) = streams.first() else {
            return Ok(MergedResult::empty());
        };
        let metadata = first.metadata().clone();

        match self.prepare(&streams, &metadata) {
            Ok((plan, pagination)) => {
                let merger = match plan {
                    Plan::Iterator => Merger::Iterator(IteratorMerger::new(streams)),
                    Plan::OrderBy(keys) => Merger::OrderBy(OrderByMerger::new(streams, keys)),
                    Plan::GroupByStream {
                        group_keys,
                        aggregations,
                    } => Merger::GroupByStream(GroupByStreamMerger::new(
                        streams,
                        group_keys,
                        aggregations,
                        metadata.column_count(),
                    )),
                    Plan::GroupByMemory {
                        group_keys,
                        order_keys,
                        aggregations,
                    } => Merger::GroupByMemory(GroupByMemoryMerger::new(
                        streams,
                        group_keys,
                        order_keys,
                        aggregations,
                        metadata.column_count(),
                    )),
                };
                debug!("Merging with {} strategy", merger.kind());
                Ok(MergedResult::new(merger, metadata, pagination))
            }
            Err(err) => {
                if let Err(close_err) = close_all(&mut streams) {
                    warn!("Failed to close results after merge error: {}", close_err);
                }
                Err(err)
            }
        }
    }

    fn prepare(
        &self,
        streams: &[ResultStream],
        metadata: &ResultMetadata,
    ) -> Result<(Plan, Option<Pagination>)> {
        for stream in streams.iter().skip(1) {
            if !stream.metadata().is_compatible_with(metadata) {
                return Err(ShardingError::Merge(format!(
                    "Result of unit {} has different columns than unit 0",
                    stream.index()
                )));
            }
        }

        // A single unit already ran the complete logical SQL.
        if streams.len() == 1 {
            return Ok((Plan::Iterator, None));
        }

        let statement = self.statement;
        let pagination = statement
            .limit
            .as_ref()
            .map(|limit| limit.resolve(self.parameters))
            .transpose()?;

        let plan = if statement.is_grouping() {
            let aggregations = AggregationColumn::resolve(&statement.aggregations, metadata)?;
            if !statement.group_by.is_empty() && !statement.groups_in_memory() {
                let items = if statement.order_by.is_empty() {
                    &statement.group_by
                } else {
                    &statement.order_by
                };
                Plan::GroupByStream {
                    group_keys: SortKey::resolve(items, metadata)?,
                    aggregations,
                }
            } else {
                Plan::GroupByMemory {
                    group_keys: SortKey::resolve(&statement.group_by, metadata)?,
                    order_keys: SortKey::resolve(&statement.order_by, metadata)?,
                    aggregations,
                }
            }
        } else if !statement.order_by.is_empty() {
            Plan::OrderBy(SortKey::resolve(&statement.order_by, metadata)?)
        } else {
            Plan::Iterator
        };
        Ok((plan, pagination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnMetadata, DataType, Row};
    use crate::result::MemoryQueryResult;
    use crate::statement::{AggregationKind, OrderDirection, StatementKind};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn metadata(columns: &[(&str, DataType)]) -> ResultMetadata {
        ResultMetadata::new(
            columns
                .iter()
                .map(|(name, data_type)| ColumnMetadata::new(*name, *data_type))
                .collect(),
        )
    }

    fn results(metadata: &ResultMetadata, shards: Vec<Vec<Row>>, closes: &Arc<AtomicUsize>) -> Vec<Box<dyn QueryResult>> {
        shards
            .into_iter()
            .map(|rows| {
                Box::new(MemoryQueryResult::new(metadata.clone(), rows).with_close_counter(closes.clone()))
                    as Box<dyn QueryResult>
            })
            .collect()
    }

    fn int(values: &[i64]) -> Vec<Row> {
        values.iter().map(|v| vec![Value::Integer(*v)]).collect()
    }

    fn ids(merged: &mut MergedResult) -> Vec<Value> {
        merged.collect_rows().unwrap().into_iter().map(|row| row[0].clone()).collect()
    }

    fn select(sql: &str, direction: OrderDirection) -> SqlStatement {
        SqlStatement::builder(StatementKind::Dql, sql)
            .table("t")
            .order_by("id", direction)
            .build()
            .unwrap()
    }

    #[test]
    fn test_order_merge_three_streams_with_duplicates() {
        let meta = metadata(&[("id", DataType::Integer), ("name", DataType::Text)]);
        let closes = Arc::new(AtomicUsize::new(0));
        let row = |id: i64, name: &str| vec![Value::Integer(id), Value::from(name)];
        let shards = vec![
            vec![row(1, "s0"), row(4, "a0"), row(4, "b0"), row(7, "s0")],
            vec![row(2, "s1"), row(4, "a1"), row(9, "s1")],
            vec![row(1, "s2"), row(3, "s2")],
        ];
        let statement = select("SELECT id, name FROM t ORDER BY id", OrderDirection::Asc);
        let mut merged = MergeEngine::new(&statement, &[]).merge(results(&meta, shards, &closes)).unwrap();
        assert_eq!(merged.merge_kind(), "order-by stream");

        let rows = merged.collect_rows().unwrap();
        let ids: Vec<i64> = rows.iter().filter_map(|r| r[0].as_i64()).collect();
        assert_eq!(ids, vec![1, 1, 2, 3, 4, 4, 4, 7, 9]);
        let names: Vec<&str> = rows.iter().filter_map(|r| r[1].as_str()).collect();
        assert_eq!(&names[..2], &["s0", "s2"]);
        assert_eq!(&names[4..7], &["a0", "b0", "a1"]);

        assert_eq!(closes.load(Ordering::SeqCst), 3);
        assert!(!merged.next().unwrap());
        drop(merged);
        assert_eq!(closes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_order_merge_descending_puts_nulls_first() {
        let meta = metadata(&[("id", DataType::Integer)]);
        let closes = Arc::new(AtomicUsize::new(0));
        let shards = vec![
            vec![vec![Value::Null], vec![Value::Integer(5)], vec![Value::Integer(1)]],
            int(&[6, 2]),
            vec![vec![Value::Null], vec![Value::Integer(3)]],
        ];
        let statement = select("SELECT id FROM t ORDER BY id DESC", OrderDirection::Desc);
        let mut merged = MergeEngine::new(&statement, &[]).merge(results(&meta, shards, &closes)).unwrap();
        assert_eq!(
            ids(&mut merged),
            vec![
                Value::Null,
                Value::Null,
                Value::Integer(6),
                Value::Integer(5),
                Value::Integer(3),
                Value::Integer(2),
                Value::Integer(1)
            ]
        );
    }

    #[test]
    fn test_pagination_stops_early_and_releases_cursors() {
        let meta = metadata(&[("id", DataType::Integer)]);
        let closes = Arc::new(AtomicUsize::new(0));
        let statement = select("SELECT id FROM t ORDER BY id LIMIT 2, 3", OrderDirection::Asc);
        let mut merged = MergeEngine::new(&statement, &[])
            .merge(results(&meta, vec![int(&[1, 3, 5, 7]), int(&[2, 4, 6])], &closes))
            .unwrap();
        assert_eq!(ids(&mut merged), vec![Value::Integer(3), Value::Integer(4), Value::Integer(5)]);
        assert_eq!(closes.load(Ordering::SeqCst), 2);

        let statement = select("SELECT id FROM t ORDER BY id LIMIT ?, ?", OrderDirection::Asc);
        let params = [Value::Integer(1), Value::Integer(2)];
        let mut merged = MergeEngine::new(&statement, &params)
            .merge(results(&meta, vec![int(&[1, 3]), int(&[2, 4])], &closes))
            .unwrap();
        assert_eq!(ids(&mut merged), vec![Value::Integer(2), Value::Integer(3)]);

        let statement = select("SELECT id FROM t ORDER BY id LIMIT 10, 5", OrderDirection::Asc);
        let mut merged = MergeEngine::new(&statement, &[])
            .merge(results(&meta, vec![int(&[1]), int(&[2])], &closes))
            .unwrap();
        assert!(ids(&mut merged).is_empty());
    }

    #[test]
    fn test_single_result_passes_through() {
        let meta = metadata(&[("id", DataType::Integer)]);
        let closes = Arc::new(AtomicUsize::new(0));
        let statement = select("SELECT id FROM t ORDER BY id LIMIT 1", OrderDirection::Asc);
        let mut merged = MergeEngine::new(&statement, &[])
            .merge(results(&meta, vec![int(&[3, 1, 2])], &closes))
            .unwrap();
        assert_eq!(merged.merge_kind(), "iterator");
        assert_eq!(ids(&mut merged).len(), 3);
    }

    #[test]
    fn test_group_by_stream_folds_groups() {
        let meta = metadata(&[
            ("user_id", DataType::Integer),
            ("cnt", DataType::Integer),
            ("total", DataType::Integer),
        ]);
        let closes = Arc::new(AtomicUsize::new(0));
        let statement = SqlStatement::builder(
            StatementKind::Dql,
            "SELECT user_id, COUNT(*) AS cnt, SUM(amount) AS total FROM t GROUP BY user_id",
        )
        .table("t")
        .group_by("user_id")
        .aggregation(AggregationKind::Count, "*", "cnt")
        .aggregation(AggregationKind::Sum, "amount", "total")
        .build()
        .unwrap();
        let row = |values: [i64; 3]| values.iter().map(|v| Value::Integer(*v)).collect::<Row>();
        let shards = vec![
            vec![row([1, 2, 10]), row([3, 1, 5])],
            vec![row([1, 1, 7]), row([2, 4, 20])],
        ];
        let mut merged = MergeEngine::new(&statement, &[]).merge(results(&meta, shards, &closes)).unwrap();
        assert_eq!(merged.merge_kind(), "group-by stream");
        assert_eq!(
            merged.collect_rows().unwrap(),
            vec![row([1, 3, 17]), row([2, 4, 20]), row([3, 1, 5])]
        );
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_avg_is_recomputed_from_derived_columns() {
        let meta = ResultMetadata::new(vec![
            ColumnMetadata::new("user_id", DataType::Integer),
            ColumnMetadata::new("AVG(price)", DataType::Float).with_label("avg_price"),
            ColumnMetadata::new("COUNT(price)", DataType::Integer).with_label("AVG_DERIVED_COUNT_0"),
            ColumnMetadata::new("SUM(price)", DataType::Integer).with_label("AVG_DERIVED_SUM_0"),
        ]);
        let closes = Arc::new(AtomicUsize::new(0));
        let statement = SqlStatement::builder(
            StatementKind::Dql,
            "SELECT user_id, AVG(price) AS avg_price FROM t GROUP BY user_id",
        )
        .table("t")
        .group_by("user_id")
        .aggregation(AggregationKind::Avg, "price", "avg_price")
        .build()
        .unwrap();
        let shards = vec![
            vec![vec![Value::Integer(1), Value::Float(2.0), Value::Integer(3), Value::Integer(6)]],
            vec![vec![Value::Integer(1), Value::Float(10.0), Value::Integer(1), Value::Integer(10)]],
        ];
        let mut merged = MergeEngine::new(&statement, &[]).merge(results(&meta, shards, &closes)).unwrap();
        assert!(merged.next().unwrap());
        assert_eq!(merged.value_by_label("avg_price").unwrap(), Value::Float(4.0));
        assert_eq!(merged.value_by_label("AVG_DERIVED_COUNT_0").unwrap(), Value::Integer(4));
        assert!(!merged.next().unwrap());
    }

    #[test]
    fn test_group_by_memory_sorts_by_aggregate() {
        let meta = metadata(&[("user_id", DataType::Integer), ("cnt", DataType::Integer)]);
        let closes = Arc::new(AtomicUsize::new(0));
        let statement = SqlStatement::builder(
            StatementKind::Dql,
            "SELECT user_id, COUNT(*) AS cnt FROM t GROUP BY user_id ORDER BY cnt DESC",
        )
        .table("t")
        .group_by("user_id")
        .order_by("cnt", OrderDirection::Desc)
        .aggregation(AggregationKind::Count, "*", "cnt")
        .build()
        .unwrap();
        let row = |user: i64, cnt: i64| vec![Value::Integer(user), Value::Integer(cnt)];
        let shards = vec![vec![row(1, 2), row(2, 5)], vec![row(1, 1), row(3, 7)]];
        let mut merged = MergeEngine::new(&statement, &[]).merge(results(&meta, shards, &closes)).unwrap();
        assert_eq!(merged.merge_kind(), "group-by memory");
        assert_eq!(merged.collect_rows().unwrap(), vec![row(3, 7), row(2, 5), row(1, 3)]);
    }

    #[test]
    fn test_aggregation_without_group_by() {
        let meta = metadata(&[("c", DataType::Integer), ("m", DataType::Integer)]);
        let closes = Arc::new(AtomicUsize::new(0));
        let statement = SqlStatement::builder(StatementKind::Dql, "SELECT COUNT(*) AS c, MAX(price) AS m FROM t")
            .table("t")
            .aggregation(AggregationKind::Count, "*", "c")
            .aggregation(AggregationKind::Max, "price", "m")
            .build()
            .unwrap();
        let shards = vec![
            vec![vec![Value::Integer(3), Value::Integer(10)]],
            vec![vec![Value::Integer(0), Value::Null]],
            vec![vec![Value::Integer(4), Value::Integer(12)]],
        ];
        let mut merged = MergeEngine::new(&statement, &[]).merge(results(&meta, shards, &closes)).unwrap();
        assert_eq!(
            merged.collect_rows().unwrap(),
            vec![vec![Value::Integer(7), Value::Integer(12)]]
        );
        assert_eq!(closes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_mismatched_metadata_is_rejected_and_closed() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut inputs = results(&metadata(&[("id", DataType::Integer)]), vec![int(&[1])], &closes);
        inputs.extend(results(&metadata(&[("other", DataType::Integer)]), vec![int(&[2])], &closes));
        let statement = select("SELECT id FROM t ORDER BY id", OrderDirection::Asc);
        let err = MergeEngine::new(&statement, &[]).merge(inputs).err();
        assert!(matches!(err, Some(ShardingError::Merge(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_type_mismatch_across_units_fails_and_closes() {
        let meta = metadata(&[("id", DataType::Integer)]);
        let closes = Arc::new(AtomicUsize::new(0));
        let shards = vec![int(&[1, 2]), vec![vec![Value::from("x")]]];
        let statement = select("SELECT id FROM t ORDER BY id", OrderDirection::Asc);
        let mut merged = MergeEngine::new(&statement, &[]).merge(results(&meta, shards, &closes)).unwrap();
        assert!(matches!(merged.next(), Err(ShardingError::Merge(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 2);
        assert!(!merged.next().unwrap());
    }

    #[test]
    fn test_cursor_state_rules() {
        let meta = metadata(&[("id", DataType::Integer)]);
        let closes = Arc::new(AtomicUsize::new(0));
        let statement = SqlStatement::builder(StatementKind::Dql, "SELECT id FROM t")
            .table("t")
            .build()
            .unwrap();
        let mut merged = MergeEngine::new(&statement, &[])
            .merge(results(&meta, vec![int(&[1]), int(&[2, 3])], &closes))
            .unwrap();
        assert_eq!(merged.merge_kind(), "iterator");
        assert!(merged.value(1).is_err());
        assert!(merged.next().unwrap());
        assert_eq!(merged.value_by_label("ID").unwrap(), Value::Integer(1));
        assert!(merged.value(2).is_err());
        assert!(merged.value_by_label("missing").is_err());
        drop(merged);
        assert_eq!(closes.load(Ordering::SeqCst), 2);

        let mut empty = MergeEngine::new(&statement, &[]).merge(Vec::new()).unwrap();
        assert!(!empty.next().unwrap());
        assert_eq!(empty.column_count(), 0);
    }
}
