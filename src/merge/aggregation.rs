use crate::core::{Result, ResultMetadata, Row, ShardingError, Value};
use crate::statement::{AggregationItem, AggregationKind};
use std::cmp::Ordering;

/// An aggregation item resolved to column positions (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationColumn {
    pub kind: AggregationKind,
    pub index: usize,
    /// AVG only: derived COUNT and SUM columns.
    pub count_index: Option<usize>,
    pub sum_index: Option<usize>,
}

impl AggregationColumn {
    pub fn resolve(items: &[AggregationItem], metadata: &ResultMetadata) -> Result<Vec<Self>> {
        let find = |label: &str| {
            metadata
                .find_column_index(label)
                .ok_or_else(|| ShardingError::Merge(format!("Aggregation column '{}' is not in the result set", label)))
        };
        items
            .iter()
            .map(|item| {
                let (count_index, sum_index) = match item.kind {
                    AggregationKind::Avg => {
                        let count = item
                            .derived_count()
                            .ok_or_else(|| ShardingError::Merge(format!("AVG '{}' has no derived COUNT", item.label)))?;
                        let sum = item
                            .derived_sum()
                            .ok_or_else(|| ShardingError::Merge(format!("AVG '{}' has no derived SUM", item.label)))?;
                        (Some(find(&count.label)?), Some(find(&sum.label)?))
                    }
                    _ => (None, None),
                };
                Ok(Self {
                    kind: item.kind,
                    index: find(&item.label)?,
                    count_index,
                    sum_index,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
enum Accumulator {
    Count(Value),
    Sum(Value),
    Min(Value),
    Max(Value),
    Avg { count: Value, sum: Value },
}

/// Running aggregates of one group.
#[derive(Debug, Clone)]
pub struct GroupAccumulator {
    states: Vec<Accumulator>,
}

impl GroupAccumulator {
    pub fn new(columns: &[AggregationColumn]) -> Self {
        let states = columns
            .iter()
            .map(|column| match column.kind {
                AggregationKind::Count => Accumulator::Count(Value::Null),
                AggregationKind::Sum => Accumulator::Sum(Value::Null),
                AggregationKind::Min => Accumulator::Min(Value::Null),
                AggregationKind::Max => Accumulator::Max(Value::Null),
                AggregationKind::Avg => Accumulator::Avg {
                    count: Value::Null,
                    sum: Value::Null,
                },
            })
            .collect();
        Self { states }
    }

    /// Folds one partial row; `value` reads a 1-based column of it.
    pub fn accumulate<F>(&mut self, columns: &[AggregationColumn], value: F) -> Result<()>
    where
        F: Fn(usize) -> Result<Value>,
    {
        for (state, column) in self.states.iter_mut().zip(columns) {
            match state {
                Accumulator::Count(total) | Accumulator::Sum(total) => {
                    *total = total.checked_add(&value(column.index)?)?;
                }
                Accumulator::Min(best) => keep_if(best, value(column.index)?, Ordering::Less)?,
                Accumulator::Max(best) => keep_if(best, value(column.index)?, Ordering::Greater)?,
                Accumulator::Avg { count, sum } => {
                    if let (Some(count_index), Some(sum_index)) = (column.count_index, column.sum_index) {
                        *count = count.checked_add(&value(count_index)?)?;
                        *sum = sum.checked_add(&value(sum_index)?)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Writes the final aggregates into `row`, including derived AVG columns.
    pub fn finish(self, columns: &[AggregationColumn], row: &mut Row) -> Result<()> {
        for (state, column) in self.states.into_iter().zip(columns) {
            match state {
                Accumulator::Count(total) => {
                    let total = if total.is_null() { Value::Integer(0) } else { total };
                    set(row, column.index, total)?;
                }
                Accumulator::Sum(total) | Accumulator::Min(total) | Accumulator::Max(total) => {
                    set(row, column.index, total)?;
                }
                Accumulator::Avg { count, sum } => {
                    let average = match (count.as_f64(), sum.as_f64()) {
                        (Some(n), Some(total)) if n != 0.0 => Value::Float(total / n),
                        _ => Value::Null,
                    };
                    set(row, column.index, average)?;
                    if let (Some(count_index), Some(sum_index)) = (column.count_index, column.sum_index) {
                        set(row, count_index, count)?;
                        set(row, sum_index, sum)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn keep_if(best: &mut Value, candidate: Value, wanted: Ordering) -> Result<()> {
    if candidate.is_null() {
        return Ok(());
    }
    if best.is_null() {
        *best = candidate;
        return Ok(());
    }
    let ordering = candidate.compare(best).map_err(|_| {
        ShardingError::Merge(format!(
            "Cannot aggregate {} with {}",
            candidate.type_name(),
            best.type_name()
        ))
    })?;
    if ordering == wanted {
        *best = candidate;
    }
    Ok(())
}

fn set(row: &mut Row, index: usize, value: Value) -> Result<()> {
    let width = row.len();
    let slot = index
        .checked_sub(1)
        .and_then(|idx| row.get_mut(idx))
        .ok_or_else(|| ShardingError::Merge(format!("Column index {} out of range 1..={}", index, width)))?;
    *slot = value;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(kind: AggregationKind, index: usize) -> AggregationColumn {
        AggregationColumn {
            kind,
            index,
            count_index: None,
            sum_index: None,
        }
    }

    fn fold(columns: &[AggregationColumn], rows: &[Row]) -> Result<Row> {
        let mut acc = GroupAccumulator::new(columns);
        for row in rows {
            acc.accumulate(columns, |i| Ok(row[i - 1].clone()))?;
        }
        let mut out = rows[0].clone();
        acc.finish(columns, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_count_sum_min_max() {
        let columns = vec![
            column(AggregationKind::Count, 1),
            column(AggregationKind::Sum, 2),
            column(AggregationKind::Min, 3),
            column(AggregationKind::Max, 4),
        ];
        let rows = vec![
            vec![Value::Integer(2), Value::Float(1.5), Value::Integer(7), Value::from("b")],
            vec![Value::Integer(3), Value::Integer(2), Value::Null, Value::from("d")],
            vec![Value::Integer(0), Value::Null, Value::Integer(4), Value::from("a")],
        ];
        assert_eq!(
            fold(&columns, &rows).unwrap(),
            vec![Value::Integer(5), Value::Float(3.5), Value::Integer(4), Value::from("d")]
        );
    }

    #[test]
    fn test_avg_uses_derived_sum_and_count() {
        let columns = vec![AggregationColumn {
            kind: AggregationKind::Avg,
            index: 1,
            count_index: Some(2),
            sum_index: Some(3),
        }];
        // shard averages 2.0 and 10.0 would naively average to 6.0
        let rows = vec![
            vec![Value::Float(2.0), Value::Integer(3), Value::Integer(6)],
            vec![Value::Float(10.0), Value::Integer(1), Value::Integer(10)],
        ];
        assert_eq!(
            fold(&columns, &rows).unwrap(),
            vec![Value::Float(4.0), Value::Integer(4), Value::Integer(16)]
        );

        let empty = vec![vec![Value::Null, Value::Integer(0), Value::Null]];
        assert_eq!(fold(&columns, &empty).unwrap()[0], Value::Null);
    }

    #[test]
    fn test_sum_overflow_is_reported() {
        let columns = vec![column(AggregationKind::Sum, 1)];
        let rows = vec![vec![Value::Integer(i64::MAX)], vec![Value::Integer(1)]];
        assert!(matches!(fold(&columns, &rows).unwrap_err(), ShardingError::Overflow(_)));
    }
}
