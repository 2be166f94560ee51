// ============================================================================
// Distributed key generation
// ============================================================================
//
// Snowflake layout (64 bits):
//   1 bit unused | 41 bits ms since 2016-11-01T00:00:00Z | 10 bits worker | 12 bits sequence
//
// ============================================================================

use crate::core::{Result, ShardingError, Value};
use chrono::{TimeZone, Utc};
use log::warn;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of values for generated-key columns.
pub trait KeyGenerator: Send + Sync {
    fn generate_key(&self) -> Result<Value>;
}

const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
pub const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;

type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

fn epoch_millis() -> i64 {
    Utc.with_ymd_and_hms(2016, 11, 1, 0, 0, 0)
        .single()
        .map(|t| t.timestamp_millis())
        .unwrap_or(1_477_958_400_000)
}

#[derive(Debug, Default)]
struct SnowflakeState {
    last_millis: i64,
    sequence: u64,
}

pub struct SnowflakeKeyGenerator {
    worker_id: u64,
    max_tolerate_drift_ms: i64,
    epoch: i64,
    clock: Clock,
    state: Mutex<SnowflakeState>,
}

impl std::fmt::Debug for SnowflakeKeyGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeKeyGenerator")
            .field("worker_id", &self.worker_id)
            .field("max_tolerate_drift_ms", &self.max_tolerate_drift_ms)
            .finish()
    }
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: u64) -> Result<Self> {
        Self::with_clock(worker_id, 10, Arc::new(|| Utc::now().timestamp_millis()))
    }

    pub fn with_clock(worker_id: u64, max_tolerate_drift_ms: i64, clock: Clock) -> Result<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(ShardingError::Config(format!(
                "Worker id {} exceeds {}",
                worker_id, MAX_WORKER_ID
            )));
        }
        Ok(Self {
            worker_id,
            max_tolerate_drift_ms,
            epoch: epoch_millis(),
            clock,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    fn next_millis(&self, last: i64) -> i64 {
        let mut now = (self.clock)();
        while now <= last {
            std::thread::yield_now();
            now = (self.clock)();
        }
        now
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn generate_key(&self) -> Result<Value> {
        let mut state = self.state.lock()?;
        let mut now = (self.clock)();
        if now < state.last_millis {
            let drift = state.last_millis - now;
            if drift > self.max_tolerate_drift_ms {
                return Err(ShardingError::KeyGeneration(format!(
                    "Clock moved backwards by {}ms (tolerance {}ms)",
                    drift, self.max_tolerate_drift_ms
                )));
            }
            warn!("Clock moved backwards by {}ms, waiting", drift);
            std::thread::sleep(Duration::from_millis(drift as u64));
            now = self.next_millis(state.last_millis - 1);
        }

        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.next_millis(state.last_millis);
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        let elapsed = u64::try_from(now - self.epoch)
            .map_err(|_| ShardingError::KeyGeneration(format!("Clock {} is before the key epoch", now)))?;
        let key = (elapsed << (WORKER_ID_BITS + SEQUENCE_BITS)) | (self.worker_id << SEQUENCE_BITS) | state.sequence;
        i64::try_from(key)
            .map(Value::Integer)
            .map_err(|_| ShardingError::Overflow(format!("Generated key {} exceeds INTEGER", key)))
    }
}

/// Sequential keys from a starting value. Single-process only.
#[derive(Debug)]
pub struct IncrementKeyGenerator {
    next: AtomicI64,
}

impl IncrementKeyGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }
}

impl KeyGenerator for IncrementKeyGenerator {
    fn generate_key(&self) -> Result<Value> {
        Ok(Value::Integer(self.next.fetch_add(1, Ordering::SeqCst)))
    }
}
