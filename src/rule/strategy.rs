use super::algorithm::{ComplexAlgorithm, ShardingValue, StandardAlgorithm};
use super::inline::InlineExpression;
use crate::core::Result;

/// How a logical table picks data sources or actual tables.
///
/// Resolved once per table at rule-build time; routing only ever calls
/// [`ShardingStrategy::do_sharding`].
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingStrategy {
    Standard {
        column: String,
        algorithm: StandardAlgorithm,
    },
    Complex {
        columns: Vec<String>,
        algorithm: ComplexAlgorithm,
    },
    /// Values come from the session instead of the statement.
    Hint { algorithm: StandardAlgorithm },
    None,
}

impl ShardingStrategy {
    /// `Standard` strategy from an inline expression such as `ds${user_id % 2}`.
    pub fn inline(column: impl Into<String>, expression: &str) -> Result<Self> {
        Ok(Self::Standard {
            column: column.into(),
            algorithm: StandardAlgorithm::Inline(InlineExpression::parse(expression)?),
        })
    }

    pub fn modulo(column: impl Into<String>, sharding_count: u64) -> Result<Self> {
        let strategy = Self::Standard {
            column: column.into(),
            algorithm: StandardAlgorithm::Modulo { sharding_count },
        };
        strategy.validate()?;
        Ok(strategy)
    }

    /// Checks algorithm parameters; a rule refuses to build with an invalid strategy.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Standard { algorithm, .. } | Self::Hint { algorithm } => algorithm.validate(),
            Self::Complex { algorithm, .. } => algorithm.validate(),
            Self::None => Ok(()),
        }
    }

    pub fn sharding_columns(&self) -> Vec<String> {
        match self {
            Self::Standard { column, .. } => vec![column.clone()],
            Self::Complex { columns, .. } => columns.clone(),
            Self::Hint { .. } | Self::None => Vec::new(),
        }
    }

    pub fn is_hint(&self) -> bool {
        matches!(self, Self::Hint { .. })
    }

    /// Picks the subset of `available` matching `values`.
    ///
    /// The result keeps the order of `available` and has no duplicates. A
    /// strategy that finds no value for its columns keeps every target.
    pub fn do_sharding(&self, available: &[String], values: &[ShardingValue]) -> Result<Vec<String>> {
        let mut targets = match self {
            Self::None => available.to_vec(),
            Self::Standard { column, algorithm } => {
                match values.iter().find(|v| v.column().eq_ignore_ascii_case(column)) {
                    Some(value) => shard_standard(algorithm, available, value)?,
                    None => available.to_vec(),
                }
            }
            Self::Hint { algorithm } => match values.first() {
                Some(value) => shard_standard(algorithm, available, value)?,
                None => available.to_vec(),
            },
            Self::Complex { columns, algorithm } => algorithm.shard(available, columns, values)?,
        };
        let mut seen = std::collections::HashSet::new();
        targets.retain(|t| seen.insert(t.clone()));
        Ok(targets)
    }
}

fn shard_standard(algorithm: &StandardAlgorithm, available: &[String], value: &ShardingValue) -> Result<Vec<String>> {
    match value {
        ShardingValue::List { column, values, .. } => algorithm.shard_list(available, column, values),
        ShardingValue::Range {
            column, lower, upper, ..
        } => algorithm.shard_range(available, column, lower, upper),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use std::ops::Bound;

    fn sources() -> Vec<String> {
        vec!["ds0".to_string(), "ds1".to_string()]
    }

    #[test]
    fn test_standard_inline() {
        let strategy = ShardingStrategy::inline("user_id", "ds${user_id % 2}").unwrap();
        assert_eq!(strategy.sharding_columns(), vec!["user_id".to_string()]);
        let values = vec![ShardingValue::list("t_order", "USER_ID", vec![Value::Integer(3)])];
        assert_eq!(strategy.do_sharding(&sources(), &values).unwrap(), vec!["ds1"]);
    }

    #[test]
    fn test_missing_value_keeps_all_targets() {
        let strategy = ShardingStrategy::inline("user_id", "ds${user_id % 2}").unwrap();
        let values = vec![ShardingValue::list("t_order", "order_id", vec![Value::Integer(3)])];
        assert_eq!(strategy.do_sharding(&sources(), &values).unwrap(), sources());
        assert_eq!(ShardingStrategy::None.do_sharding(&sources(), &[]).unwrap(), sources());
    }

    #[test]
    fn test_output_keeps_available_order_and_dedups() {
        let strategy = ShardingStrategy::modulo("user_id", 2).unwrap();
        let values = vec![ShardingValue::list(
            "t_order",
            "user_id",
            vec![Value::Integer(3), Value::Integer(2), Value::Integer(5)],
        )];
        assert_eq!(strategy.do_sharding(&sources(), &values).unwrap(), vec!["ds0", "ds1"]);
    }

    #[test]
    fn test_range_over_inline() {
        let strategy = ShardingStrategy::inline("order_id", "t_${order_id % 4}").unwrap();
        let available: Vec<String> = (0..4).map(|i| format!("t_{}", i)).collect();
        let values = vec![ShardingValue::range(
            "t",
            "order_id",
            Bound::Included(Value::Integer(9)),
            Bound::Included(Value::Integer(10)),
        )];
        assert_eq!(strategy.do_sharding(&available, &values).unwrap(), vec!["t_1", "t_2"]);
    }

    #[test]
    fn test_hint_uses_first_value() {
        let strategy = ShardingStrategy::Hint {
            algorithm: StandardAlgorithm::Modulo { sharding_count: 2 },
        };
        assert!(strategy.is_hint());
        let values = vec![ShardingValue::list("t_order", "", vec![Value::Integer(4)])];
        assert_eq!(strategy.do_sharding(&sources(), &values).unwrap(), vec!["ds0"]);
        assert_eq!(strategy.do_sharding(&sources(), &[]).unwrap(), sources());
    }

    #[test]
    fn test_modulo_needs_a_positive_count() {
        let err = ShardingStrategy::modulo("user_id", 0).unwrap_err();
        assert!(matches!(err, crate::core::ShardingError::Config(_)));

        let hint = ShardingStrategy::Hint {
            algorithm: StandardAlgorithm::HashMod { sharding_count: 0 },
        };
        assert!(hint.validate().is_err());
        assert!(ShardingStrategy::None.validate().is_ok());
    }
}
