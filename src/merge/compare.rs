// ============================================================================
// Row ordering for merges
// ============================================================================
//
// NULL placement is absolute: NullsFirst puts NULLs first for ASC and DESC
// alike. Direction only reverses the order of non-NULL values.
//
// ============================================================================

use crate::core::{Result, ResultMetadata, ShardingError, Value, ValueFamily};
use crate::statement::{NullOrdering, OrderDirection, OrderItem};
use std::cmp::Ordering;

/// One resolved ORDER BY / GROUP BY column.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// 1-based column index in the merged metadata.
    pub index: usize,
    pub direction: OrderDirection,
    pub nulls: NullOrdering,
}

impl SortKey {
    /// Resolves order items against result metadata by label.
    pub fn resolve(items: &[OrderItem], metadata: &ResultMetadata) -> Result<Vec<SortKey>> {
        items
            .iter()
            .map(|item| {
                let index = metadata
                    .find_column_index(item.label())
                    .or_else(|| metadata.find_column_index(&item.column))
                    .ok_or_else(|| {
                        ShardingError::Merge(format!("Column '{}' is not in the result set", item.label()))
                    })?;
                Ok(SortKey {
                    index,
                    direction: item.direction,
                    nulls: item.nulls,
                })
            })
            .collect()
    }
}

pub fn compare_values(left: &Value, right: &Value, key: &SortKey) -> Result<Ordering> {
    let ordering = match (left.is_null(), right.is_null()) {
        (true, true) => return Ok(Ordering::Equal),
        (true, false) => {
            return Ok(match key.nulls {
                NullOrdering::NullsFirst => Ordering::Less,
                NullOrdering::NullsLast => Ordering::Greater,
            });
        }
        (false, true) => {
            return Ok(match key.nulls {
                NullOrdering::NullsFirst => Ordering::Greater,
                NullOrdering::NullsLast => Ordering::Less,
            });
        }
        (false, false) => left.compare(right).map_err(|_| {
            ShardingError::Merge(format!(
                "Column {} mixes {} and {} across result sets",
                key.index,
                left.type_name(),
                right.type_name()
            ))
        })?,
    };
    Ok(match key.direction {
        OrderDirection::Asc => ordering,
        OrderDirection::Desc => ordering.reverse(),
    })
}

/// Compares two key tuples, `left[i]` and `right[i]` holding the value of `keys[i]`.
pub fn compare_keys(left: &[Value], right: &[Value], keys: &[SortKey]) -> Result<Ordering> {
    for ((l, r), key) in left.iter().zip(right.iter()).zip(keys) {
        let ordering = compare_values(l, r, key)?;
        if ordering != Ordering::Equal {
            return Ok(ordering);
        }
    }
    Ok(Ordering::Equal)
}

/// Tracks the value family seen per key column so incomparable rows are
/// rejected before they reach a heap or a sort.
#[derive(Debug, Clone)]
pub struct FamilyGuard {
    families: Vec<Option<ValueFamily>>,
}

impl FamilyGuard {
    pub fn new(width: usize) -> Self {
        Self {
            families: vec![None; width],
        }
    }

    pub fn check(&mut self, keys: &[Value]) -> Result<()> {
        for (position, (value, seen)) in keys.iter().zip(self.families.iter_mut()).enumerate() {
            let Some(family) = value.family() else {
                continue;
            };
            match seen {
                Some(expected) if *expected != family => {
                    return Err(ShardingError::Merge(format!(
                        "Sort key #{} mixes {:?} and {:?} values across result sets",
                        position + 1,
                        expected,
                        family
                    )));
                }
                Some(_) => {}
                None => *seen = Some(family),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnMetadata, DataType};

    fn key(direction: OrderDirection) -> SortKey {
        SortKey {
            index: 1,
            direction,
            nulls: NullOrdering::default_for(direction),
        }
    }

    #[test]
    fn test_null_placement() {
        let asc = key(OrderDirection::Asc);
        assert_eq!(compare_values(&Value::Null, &Value::Integer(1), &asc).unwrap(), Ordering::Greater);
        let desc = key(OrderDirection::Desc);
        assert_eq!(compare_values(&Value::Null, &Value::Integer(1), &desc).unwrap(), Ordering::Less);
        assert_eq!(
            compare_values(&Value::Integer(1), &Value::Integer(2), &desc).unwrap(),
            Ordering::Greater
        );
        let asc_nulls_first = SortKey {
            nulls: NullOrdering::NullsFirst,
            ..asc
        };
        assert_eq!(
            compare_values(&Value::Null, &Value::Integer(1), &asc_nulls_first).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn test_multi_key_compare() {
        let keys = vec![key(OrderDirection::Asc), key(OrderDirection::Desc)];
        let a = vec![Value::Integer(1), Value::from("b")];
        let b = vec![Value::Integer(1), Value::from("a")];
        assert_eq!(compare_keys(&a, &b, &keys).unwrap(), Ordering::Less);
        assert_eq!(compare_keys(&a, &a, &keys).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_mismatch_is_merge_error() {
        let err = compare_values(&Value::Integer(1), &Value::from("x"), &key(OrderDirection::Asc)).unwrap_err();
        assert!(matches!(err, ShardingError::Merge(_)));

        let mut guard = FamilyGuard::new(1);
        guard.check(&[Value::Null]).unwrap();
        guard.check(&[Value::Float(1.5)]).unwrap();
        guard.check(&[Value::Integer(2)]).unwrap();
        assert!(guard.check(&[Value::from("x")]).is_err());
    }

    #[test]
    fn test_resolve_by_label() {
        let metadata = ResultMetadata::new(vec![
            ColumnMetadata::new("order_id", DataType::Integer),
            ColumnMetadata::new("status", DataType::Text),
        ]);
        let items = vec![OrderItem::new("o.status", OrderDirection::Desc)];
        let keys = SortKey::resolve(&items, &metadata).unwrap();
        assert_eq!(keys[0].index, 2);
        assert!(SortKey::resolve(&[OrderItem::new("missing", OrderDirection::Asc)], &metadata).is_err());
    }
}
