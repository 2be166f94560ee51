// ============================================================================
// Sharding algorithms
// ============================================================================
//
// Every algorithm is a pure function of (available targets, sharding values)
// and only ever returns names taken from the available targets, in the order
// the targets were given.
//
// ============================================================================

use super::inline::InlineExpression;
use crate::core::{Result, ShardingError, Value};
use std::collections::HashSet;
use std::ops::Bound;

/// Ranges spanning more values than this fall back to every target.
const MAX_RANGE_ENUMERATION: i64 = 4_096;
/// Complex strategies stop enumerating value combinations past this size.
const MAX_COMBINATIONS: usize = 4_096;

/// Sharding condition values for one column of one logical table.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValue {
    List {
        table: String,
        column: String,
        values: Vec<Value>,
    },
    Range {
        table: String,
        column: String,
        lower: Bound<Value>,
        upper: Bound<Value>,
    },
}

impl ShardingValue {
    pub fn list(table: impl Into<String>, column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::List {
            table: table.into(),
            column: column.into(),
            values,
        }
    }

    pub fn range(
        table: impl Into<String>,
        column: impl Into<String>,
        lower: Bound<Value>,
        upper: Bound<Value>,
    ) -> Self {
        Self::Range {
            table: table.into(),
            column: column.into(),
            lower,
            upper,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Self::List { table, .. } | Self::Range { table, .. } => table,
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::List { column, .. } | Self::Range { column, .. } => column,
        }
    }
}

/// Stable FNV-1a hash of a sharding value.
///
/// Integral values hash by their decimal text so `7`, `7.0` and `'7'` land on
/// the same shard.
pub fn stable_hash(value: &Value) -> u64 {
    let text = match value.as_i64() {
        Some(number) if !matches!(value, Value::Boolean(_)) => number.to_string(),
        _ => value.to_string(),
    };
    fnv1a(14695981039346656037u64, text.as_bytes())
}

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = seed;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

/// Trailing decimal suffix of a target name: `t_order_12` -> 12.
pub fn trailing_number(name: &str) -> Option<u64> {
    let digits: String = name
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn targets_with_suffix(available: &[String], suffixes: &HashSet<u64>) -> Vec<String> {
    available
        .iter()
        .filter(|target| trailing_number(target).is_some_and(|n| suffixes.contains(&n)))
        .cloned()
        .collect()
}

fn require_integer(value: &Value, column: &str) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        ShardingError::UnsupportedRouting(format!(
            "Sharding value '{}' of column '{}' is not an integer",
            value, column
        ))
    })
}

/// Converts range bounds into an inclusive integer window.
fn inclusive_window(
    lower: &Bound<Value>,
    upper: &Bound<Value>,
    column: &str,
) -> Result<(Option<i64>, Option<i64>)> {
    let low = match lower {
        Bound::Included(v) => Some(require_integer(v, column)?),
        Bound::Excluded(v) => Some(require_integer(v, column)?.saturating_add(1)),
        Bound::Unbounded => None,
    };
    let high = match upper {
        Bound::Included(v) => Some(require_integer(v, column)?),
        Bound::Excluded(v) => Some(require_integer(v, column)?.saturating_sub(1)),
        Bound::Unbounded => None,
    };
    Ok((low, high))
}

/// Enumerates the integers of a window when it is bounded and small enough.
fn enumerate_window(window: (Option<i64>, Option<i64>), limit: i64) -> Option<Vec<i64>> {
    match window {
        (Some(low), Some(high)) if high < low => Some(Vec::new()),
        (Some(low), Some(high)) if high.saturating_sub(low) < limit => Some((low..=high).collect()),
        _ => None,
    }
}

/// A half-open `[lower, upper)` interval mapped onto one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePartition {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
    pub target: String,
}

impl RangePartition {
    fn contains(&self, value: i64) -> bool {
        self.lower.is_none_or(|low| value >= low) && self.upper.is_none_or(|high| value < high)
    }

    fn overlaps(&self, window: (Option<i64>, Option<i64>)) -> bool {
        let (low, high) = window;
        let starts_before_end = match (self.lower, high) {
            (Some(partition_low), Some(high)) => partition_low <= high,
            _ => true,
        };
        let ends_after_start = match (self.upper, low) {
            (Some(partition_high), Some(low)) => partition_high > low,
            _ => true,
        };
        starts_before_end && ends_after_start
    }
}

/// Algorithm of a single-column (standard or hint) strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum StandardAlgorithm {
    /// `t_order_${order_id % 2}`
    Inline(InlineExpression),
    /// Target whose numeric suffix equals `value mod sharding_count`.
    Modulo { sharding_count: u64 },
    /// Target whose numeric suffix equals `fnv1a(value) mod sharding_count`.
    HashMod { sharding_count: u64 },
    /// Explicit integer intervals.
    Range { partitions: Vec<RangePartition> },
}

fn require_positive(sharding_count: u64) -> Result<u64> {
    if sharding_count == 0 {
        return Err(ShardingError::Config("sharding_count must be > 0".into()));
    }
    Ok(sharding_count)
}

impl StandardAlgorithm {
    /// Rejects parameters that cannot shard anything.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Modulo { sharding_count } | Self::HashMod { sharding_count } => {
                require_positive(*sharding_count).map(|_| ())
            }
            Self::Range { partitions } if partitions.is_empty() => {
                Err(ShardingError::Config("Range algorithm needs at least one partition".into()))
            }
            Self::Inline(_) | Self::Range { .. } => Ok(()),
        }
    }

    pub fn shard_list(&self, available: &[String], column: &str, values: &[Value]) -> Result<Vec<String>> {
        match self {
            Self::Inline(expression) => {
                let mut names = HashSet::new();
                for value in values {
                    names.insert(expression.evaluate(|_| Some(value.clone()))?);
                }
                Ok(available.iter().filter(|t| names.contains(*t)).cloned().collect())
            }
            Self::Modulo { sharding_count } => {
                let modulus = require_positive(*sharding_count)?;
                let mut suffixes = HashSet::new();
                for value in values {
                    let number = require_integer(value, column)?;
                    suffixes.insert((number as i128).rem_euclid(modulus as i128) as u64);
                }
                Ok(targets_with_suffix(available, &suffixes))
            }
            Self::HashMod { sharding_count } => {
                let modulus = require_positive(*sharding_count)?;
                let suffixes: HashSet<u64> = values.iter().map(|value| stable_hash(value) % modulus).collect();
                Ok(targets_with_suffix(available, &suffixes))
            }
            Self::Range { partitions } => {
                let mut targets = HashSet::new();
                for value in values {
                    let number = require_integer(value, column)?;
                    for partition in partitions.iter().filter(|p| p.contains(number)) {
                        targets.insert(partition.target.as_str());
                    }
                }
                Ok(available
                    .iter()
                    .filter(|t| targets.contains(t.as_str()))
                    .cloned()
                    .collect())
            }
        }
    }

    pub fn shard_range(
        &self,
        available: &[String],
        column: &str,
        lower: &Bound<Value>,
        upper: &Bound<Value>,
    ) -> Result<Vec<String>> {
        match self {
            Self::Inline(expression) => {
                let window = inclusive_window(lower, upper, column)?;
                let limit = expression
                    .modulus()
                    .map(|m| m.min(MAX_RANGE_ENUMERATION as u64) as i64)
                    .unwrap_or(MAX_RANGE_ENUMERATION);
                match enumerate_window(window, limit) {
                    Some(numbers) => {
                        let values: Vec<Value> = numbers.into_iter().map(Value::Integer).collect();
                        self.shard_list(available, column, &values)
                    }
                    None => Ok(available.to_vec()),
                }
            }
            Self::Modulo { sharding_count } => {
                let window = inclusive_window(lower, upper, column)?;
                let limit = require_positive(*sharding_count)?.min(MAX_RANGE_ENUMERATION as u64) as i64;
                match enumerate_window(window, limit) {
                    Some(numbers) => {
                        let values: Vec<Value> = numbers.into_iter().map(Value::Integer).collect();
                        self.shard_list(available, column, &values)
                    }
                    None => Ok(available.to_vec()),
                }
            }
            // Hashing destroys ordering; a range can live anywhere.
            Self::HashMod { .. } => Ok(available.to_vec()),
            Self::Range { partitions } => {
                let window = inclusive_window(lower, upper, column)?;
                let targets: HashSet<&str> = partitions
                    .iter()
                    .filter(|p| p.overlaps(window))
                    .map(|p| p.target.as_str())
                    .collect();
                Ok(available
                    .iter()
                    .filter(|t| targets.contains(t.as_str()))
                    .cloned()
                    .collect())
            }
        }
    }
}

/// Algorithm of a multi-column strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexAlgorithm {
    /// `t_order_${user_id % 2}_${order_id % 2}`
    Inline(InlineExpression),
    /// Suffix = combined FNV-1a of every column value, mod `sharding_count`.
    HashMod { sharding_count: u64 },
}

impl ComplexAlgorithm {
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Inline(_) => Ok(()),
            Self::HashMod { sharding_count } => require_positive(*sharding_count).map(|_| ()),
        }
    }

    /// Shards on the full combination of `columns`; any missing or ranged
    /// column means every target stays.
    pub fn shard(&self, available: &[String], columns: &[String], values: &[ShardingValue]) -> Result<Vec<String>> {
        let mut lists: Vec<(&str, &[Value])> = Vec::with_capacity(columns.len());
        for column in columns {
            let found = values.iter().find(|v| v.column().eq_ignore_ascii_case(column));
            match found {
                Some(ShardingValue::List { values, .. }) => lists.push((column.as_str(), values.as_slice())),
                _ => return Ok(available.to_vec()),
            }
        }

        let combination_count = lists
            .iter()
            .try_fold(1usize, |acc, (_, values)| acc.checked_mul(values.len()))
            .unwrap_or(usize::MAX);
        if combination_count > MAX_COMBINATIONS {
            return Ok(available.to_vec());
        }

        let mut combinations: Vec<Vec<(&str, &Value)>> = vec![Vec::new()];
        for (column, values) in &lists {
            let mut next = Vec::with_capacity(combinations.len() * values.len());
            for prefix in &combinations {
                for value in values.iter() {
                    let mut combination = prefix.clone();
                    combination.push((*column, value));
                    next.push(combination);
                }
            }
            combinations = next;
        }

        match self {
            Self::Inline(expression) => {
                let mut names = HashSet::new();
                for combination in &combinations {
                    let name = expression.evaluate(|column| {
                        combination
                            .iter()
                            .find(|(c, _)| c.eq_ignore_ascii_case(column))
                            .map(|(_, v)| (*v).clone())
                    })?;
                    names.insert(name);
                }
                Ok(available.iter().filter(|t| names.contains(*t)).cloned().collect())
            }
            Self::HashMod { sharding_count } => {
                let modulus = require_positive(*sharding_count)?;
                let suffixes: HashSet<u64> = combinations
                    .iter()
                    .map(|combination| {
                        let hash = combination.iter().fold(14695981039346656037u64, |seed, (_, value)| {
                            fnv1a(seed, &stable_hash(value).to_le_bytes())
                        });
                        hash % modulus
                    })
                    .collect();
                Ok(targets_with_suffix(available, &suffixes))
            }
        }
    }
}
