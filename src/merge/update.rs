use crate::core::{Result, ShardingError, Value};
use crate::executor::ExecuteResponse;
use crate::result::UpdateResult;

/// Sums affected rows over every unit and attaches the keys generated while
/// routing.
pub fn merge_update(responses: Vec<ExecuteResponse>, generated_keys: &[Value]) -> Result<UpdateResult> {
    let mut affected_rows: u64 = 0;
    let mut unexpected = 0;
    for response in responses {
        match response {
            ExecuteResponse::Update(update) => {
                affected_rows = affected_rows.checked_add(update.affected_rows).ok_or_else(|| {
                    ShardingError::Overflow(format!("Affected rows exceed {}", u64::MAX))
                })?;
            }
            query @ ExecuteResponse::Query(_) => {
                unexpected += 1;
                query.close_quietly();
            }
        }
    }
    if unexpected > 0 {
        return Err(ShardingError::Merge(format!(
            "{} unit(s) returned rows for a statement that updates",
            unexpected
        )));
    }
    Ok(UpdateResult::new(affected_rows).with_generated_keys(generated_keys.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResultMetadata;
    use crate::result::MemoryQueryResult;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_affected_rows_are_summed() {
        let responses = vec![
            ExecuteResponse::Update(UpdateResult::new(2)),
            ExecuteResponse::Update(UpdateResult::new(0)),
            ExecuteResponse::Update(UpdateResult::new(5)),
        ];
        let merged = merge_update(responses, &[Value::Integer(7)]).unwrap();
        assert_eq!(merged.affected_rows, 7);
        assert_eq!(merged.generated_keys, vec![Value::Integer(7)]);
    }

    #[test]
    fn test_overflow_and_unexpected_rows() {
        let overflow = vec![
            ExecuteResponse::Update(UpdateResult::new(u64::MAX)),
            ExecuteResponse::Update(UpdateResult::new(1)),
        ];
        assert!(matches!(merge_update(overflow, &[]), Err(ShardingError::Overflow(_))));

        let closes = Arc::new(AtomicUsize::new(0));
        let rows = MemoryQueryResult::new(ResultMetadata::default(), Vec::new()).with_close_counter(closes.clone());
        let mixed = vec![
            ExecuteResponse::Update(UpdateResult::new(1)),
            ExecuteResponse::Query(Box::new(rows)),
        ];
        assert!(matches!(merge_update(mixed, &[]), Err(ShardingError::Merge(_))));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
