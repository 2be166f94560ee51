// ============================================================================
// Sharding value extraction
// ============================================================================
//
// Turns the AND-ed conditions of one predicate branch into sharding values
// for a set of columns. Several conditions on one column are intersected.
// `Ok(None)` means the branch is contradictory and can match no row.
//
// ============================================================================

use crate::core::{Result, ShardingError, Value};
use crate::rule::ShardingValue;
use crate::statement::{ConditionGroup, ConditionOperator};
use std::cmp::Ordering;
use std::ops::Bound;

#[derive(Debug, Clone)]
enum Constraint {
    List(Vec<Value>),
    Range(Bound<Value>, Bound<Value>),
}

fn column_name(column: &str) -> &str {
    column.rsplit('.').next().unwrap_or(column)
}

fn compare(a: &Value, b: &Value) -> Result<Ordering> {
    a.compare(b)
        .map_err(|err| ShardingError::UnsupportedRouting(format!("Cannot compare sharding values: {}", err)))
}

fn above_lower(value: &Value, lower: &Bound<Value>) -> Result<bool> {
    Ok(match lower {
        Bound::Included(low) => compare(value, low)? != Ordering::Less,
        Bound::Excluded(low) => compare(value, low)? == Ordering::Greater,
        Bound::Unbounded => true,
    })
}

fn below_upper(value: &Value, upper: &Bound<Value>) -> Result<bool> {
    Ok(match upper {
        Bound::Included(high) => compare(value, high)? != Ordering::Greater,
        Bound::Excluded(high) => compare(value, high)? == Ordering::Less,
        Bound::Unbounded => true,
    })
}

/// The tighter of two lower bounds (`pick_greater`) or upper bounds.
fn tighter(a: Bound<Value>, b: Bound<Value>, pick_greater: bool) -> Result<Bound<Value>> {
    let (av, bv) = match (&a, &b) {
        (Bound::Unbounded, _) => return Ok(b),
        (_, Bound::Unbounded) => return Ok(a),
        (Bound::Included(av) | Bound::Excluded(av), Bound::Included(bv) | Bound::Excluded(bv)) => (av, bv),
    };
    let ordering = compare(av, bv)?;
    let keep_a = match ordering {
        Ordering::Equal => matches!(a, Bound::Excluded(_)),
        Ordering::Greater => pick_greater,
        Ordering::Less => !pick_greater,
    };
    Ok(if keep_a { a } else { b })
}

fn intersect(current: Constraint, next: Constraint) -> Result<Constraint> {
    match (current, next) {
        (Constraint::List(a), Constraint::List(b)) => {
            Ok(Constraint::List(a.into_iter().filter(|v| b.contains(v)).collect()))
        }
        (Constraint::List(values), Constraint::Range(lower, upper))
        | (Constraint::Range(lower, upper), Constraint::List(values)) => {
            let mut kept = Vec::new();
            for value in values {
                if above_lower(&value, &lower)? && below_upper(&value, &upper)? {
                    kept.push(value);
                }
            }
            Ok(Constraint::List(kept))
        }
        (Constraint::Range(al, au), Constraint::Range(bl, bu)) => {
            Ok(Constraint::Range(tighter(al, bl, true)?, tighter(au, bu, false)?))
        }
    }
}

fn to_constraint(operator: &ConditionOperator, parameters: &[Value]) -> Result<Constraint> {
    Ok(match operator {
        ConditionOperator::Equal(value) => Constraint::List(vec![value.resolve(parameters)?]),
        ConditionOperator::In(values) => Constraint::List(
            values
                .iter()
                .map(|v| v.resolve(parameters))
                .collect::<Result<Vec<_>>>()?,
        ),
        ConditionOperator::Between(low, high) => {
            Constraint::Range(Bound::Included(low.resolve(parameters)?), Bound::Included(high.resolve(parameters)?))
        }
        ConditionOperator::LessThan(v) => Constraint::Range(Bound::Unbounded, Bound::Excluded(v.resolve(parameters)?)),
        ConditionOperator::LessOrEqual(v) => Constraint::Range(Bound::Unbounded, Bound::Included(v.resolve(parameters)?)),
        ConditionOperator::GreaterThan(v) => Constraint::Range(Bound::Excluded(v.resolve(parameters)?), Bound::Unbounded),
        ConditionOperator::GreaterOrEqual(v) => {
            Constraint::Range(Bound::Included(v.resolve(parameters)?), Bound::Unbounded)
        }
    })
}

/// Sharding values of `columns` for `logic_table`, reading conditions on any
/// of `source_tables` (the table itself or its binding tables).
pub fn extract_sharding_values(
    group: &ConditionGroup,
    parameters: &[Value],
    logic_table: &str,
    source_tables: &[String],
    columns: &[String],
) -> Result<Option<Vec<ShardingValue>>> {
    let mut values = Vec::new();
    for column in columns {
        let mut constraint: Option<Constraint> = None;
        let matching = group.conditions.iter().filter(|condition| {
            column_name(&condition.column).eq_ignore_ascii_case(column)
                && source_tables.iter().any(|t| t.eq_ignore_ascii_case(&condition.table))
        });
        for condition in matching {
            let next = to_constraint(&condition.operator, parameters)?;
            constraint = Some(match constraint {
                Some(current) => intersect(current, next)?,
                None => next,
            });
        }
        match constraint {
            Some(Constraint::List(list)) if list.is_empty() => return Ok(None),
            Some(Constraint::List(list)) => values.push(ShardingValue::list(logic_table, column.clone(), list)),
            Some(Constraint::Range(lower, upper)) => {
                values.push(ShardingValue::range(logic_table, column.clone(), lower, upper))
            }
            None => {}
        }
    }
    Ok(Some(values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{Condition, ValueExpr};

    fn tables() -> Vec<String> {
        vec!["t_order".to_string()]
    }

    #[test]
    fn test_equal_and_in_intersect() {
        let group = ConditionGroup::new(vec![
            Condition::in_list("t_order", "user_id", vec![ValueExpr::literal(1), ValueExpr::literal(2)]),
            Condition::equal("t_order", "o.user_id", ValueExpr::param(0)),
        ]);
        let values = extract_sharding_values(&group, &[Value::Integer(2)], "t_order", &tables(), &["user_id".into()])
            .unwrap()
            .unwrap();
        assert_eq!(values, vec![ShardingValue::list("t_order", "user_id", vec![Value::Integer(2)])]);
    }

    #[test]
    fn test_contradiction_yields_none() {
        let group = ConditionGroup::new(vec![
            Condition::equal("t_order", "user_id", ValueExpr::literal(1)),
            Condition::equal("t_order", "user_id", ValueExpr::literal(2)),
        ]);
        let values = extract_sharding_values(&group, &[], "t_order", &tables(), &["user_id".into()]).unwrap();
        assert!(values.is_none());
    }

    #[test]
    fn test_ranges_tighten() {
        let group = ConditionGroup::new(vec![
            Condition::between("t_order", "order_id", ValueExpr::literal(1), ValueExpr::literal(100)),
            Condition::new("t_order", "order_id", ConditionOperator::GreaterThan(ValueExpr::literal(10))),
        ]);
        let values = extract_sharding_values(&group, &[], "t_order", &tables(), &["order_id".into()])
            .unwrap()
            .unwrap();
        assert_eq!(
            values,
            vec![ShardingValue::range(
                "t_order",
                "order_id",
                Bound::Excluded(Value::Integer(10)),
                Bound::Included(Value::Integer(100)),
            )]
        );
    }

    #[test]
    fn test_other_tables_are_ignored() {
        let group = ConditionGroup::new(vec![Condition::equal("t_user", "user_id", ValueExpr::literal(1))]);
        let values = extract_sharding_values(&group, &[], "t_order", &tables(), &["user_id".into()])
            .unwrap()
            .unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_missing_parameter_is_unsupported() {
        let group = ConditionGroup::new(vec![Condition::equal("t_order", "user_id", ValueExpr::param(3))]);
        let err = extract_sharding_values(&group, &[], "t_order", &tables(), &["user_id".into()]).unwrap_err();
        assert!(matches!(err, ShardingError::UnsupportedRouting(_)));
    }
}
