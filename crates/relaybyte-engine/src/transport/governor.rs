//! Producer-side throughput governor.
//!
//! Measures push throughput once per flow-control interval and tells the
//! producer how long to back off when a byte or record ceiling is exceeded.

use std::time::{Duration, Instant};

/// Sleep needed to bring the observed rate back under the configured
/// ceilings.
///
/// Speeds are `delta * 1000 / elapsed_ms`; for each exceeded ceiling the
/// required sleep is `speed * elapsed_ms / ceiling - elapsed_ms`, and the
/// longest one wins.
#[must_use]
pub fn throttle_delay(
    elapsed_ms: u64,
    delta_bytes: u64,
    delta_records: u64,
    byte_speed: Option<u64>,
    record_speed: Option<u64>,
) -> Duration {
    if elapsed_ms == 0 {
        return Duration::ZERO;
    }
    let sleep_for = |delta: u64, ceiling: Option<u64>| -> u64 {
        let Some(ceiling) = ceiling.filter(|c| *c > 0) else {
            return 0;
        };
        let speed = u128::from(delta) * 1000 / u128::from(elapsed_ms);
        if speed <= u128::from(ceiling) {
            return 0;
        }
        let target = speed * u128::from(elapsed_ms) / u128::from(ceiling);
        u64::try_from(target.saturating_sub(u128::from(elapsed_ms))).unwrap_or(u64::MAX)
    };
    let sleep_ms = sleep_for(delta_bytes, byte_speed).max(sleep_for(delta_records, record_speed));
    Duration::from_millis(sleep_ms)
}

/// Running measurement state for one channel's producer side.
#[derive(Debug)]
pub struct FlowGovernor {
    byte_speed: Option<u64>,
    record_speed: Option<u64>,
    interval: Duration,
    mark_at: Instant,
    mark_bytes: u64,
    mark_records: u64,
    total_bytes: u64,
    total_records: u64,
}

impl FlowGovernor {
    /// A governor for the given ceilings, or `None` when neither is set.
    #[must_use]
    pub fn new(
        byte_speed: Option<u64>,
        record_speed: Option<u64>,
        interval: Duration,
        now: Instant,
    ) -> Option<Self> {
        if byte_speed.is_none() && record_speed.is_none() {
            return None;
        }
        Some(Self {
            byte_speed,
            record_speed,
            interval,
            mark_at: now,
            mark_bytes: 0,
            mark_records: 0,
            total_bytes: 0,
            total_records: 0,
        })
    }

    /// Account for a push of `records`/`bytes` at `now` and return how long
    /// the producer should sleep. A new measurement point is taken whenever
    /// a full interval has elapsed.
    pub fn observe(&mut self, now: Instant, records: u64, bytes: u64) -> Duration {
        self.total_records = self.total_records.saturating_add(records);
        self.total_bytes = self.total_bytes.saturating_add(bytes);

        let elapsed = now.saturating_duration_since(self.mark_at);
        if elapsed < self.interval {
            return Duration::ZERO;
        }
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let delay = throttle_delay(
            elapsed_ms,
            self.total_bytes - self.mark_bytes,
            self.total_records - self.mark_records,
            self.byte_speed,
            self.record_speed,
        );
        self.mark_at = now;
        self.mark_bytes = self.total_bytes;
        self.mark_records = self.total_records;
        delay
    }
}
