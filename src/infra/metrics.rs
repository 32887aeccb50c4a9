//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::error::AccessError;
use crate::domain::policy::Decision;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
///
/// Returns the upper bound of the bucket containing the percentile, never
/// above the observed max. The overflow bucket has no upper bound, so a
/// percentile landing there reports the max.
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64, max: u64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_BOUNDS.get(i).map_or(max, |&bound| bound.min(max));
        }
    }
    max
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Total recognition events processed (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of decision latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max decision latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Decision latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    entries_granted: AtomicU64,
    exits_granted: AtomicU64,
    format_rejected: AtomicU64,
    unknown_identity: AtomicU64,
    policy_denied: AtomicU64,
    storage_faults: AtomicU64,
    gate_busy: AtomicU64,
    actuator_faults: AtomicU64,
    /// Completed open/close gate cycles (monotonic)
    gate_cycles: AtomicU64,
    /// Underlying display writes (monotonic)
    display_writes: AtomicU64,
    /// Last sampled free-slot count
    free_slots: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            entries_granted: AtomicU64::new(0),
            exits_granted: AtomicU64::new(0),
            format_rejected: AtomicU64::new(0),
            unknown_identity: AtomicU64::new(0),
            policy_denied: AtomicU64::new(0),
            storage_faults: AtomicU64::new(0),
            gate_busy: AtomicU64::new(0),
            actuator_faults: AtomicU64::new(0),
            gate_cycles: AtomicU64::new(0),
            display_writes: AtomicU64::new(0),
            free_slots: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record an event was processed with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_grant(&self, decision: Decision) {
        match decision {
            Decision::GrantEntry => self.entries_granted.fetch_add(1, Ordering::Relaxed),
            Decision::GrantExit => self.exits_granted.fetch_add(1, Ordering::Relaxed),
            _ => return,
        };
    }

    /// Count a denied or faulted event under its taxonomy label
    #[inline]
    pub fn record_access_error(&self, error: &AccessError) {
        let counter = match error {
            AccessError::FormatRejected(_) => &self.format_rejected,
            AccessError::UnknownIdentity(_) => &self.unknown_identity,
            AccessError::PolicyDenied { .. } => &self.policy_denied,
            AccessError::StorageUnavailable { .. } => &self.storage_faults,
            AccessError::GateBusy { .. } => &self.gate_busy,
            AccessError::ActuatorFault { .. } => &self.actuator_faults,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gate_cycle(&self) {
        self.gate_cycles.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_display_write(&self) {
        self.display_writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn set_free_slots(&self, count: u64) {
        self.free_slots.store(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn gate_cycles(&self) -> u64 {
        self.gate_cycles.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn display_writes(&self) -> u64 {
        self.display_writes.load(Ordering::Relaxed)
    }

    /// Generate a metrics summary and reset per-interval values
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let elapsed_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let events_since = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_max = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let events_per_sec =
            if elapsed_secs > 0.0 { events_since as f64 / elapsed_secs } else { 0.0 };
        let avg_latency_us = if events_since > 0 { latency_sum / events_since } else { 0 };

        MetricsSummary {
            events_total: self.events_total.load(Ordering::Relaxed),
            events_per_sec,
            avg_latency_us,
            max_latency_us: latency_max,
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99, latency_max),
            entries_granted: self.entries_granted.load(Ordering::Relaxed),
            exits_granted: self.exits_granted.load(Ordering::Relaxed),
            format_rejected: self.format_rejected.load(Ordering::Relaxed),
            unknown_identity: self.unknown_identity.load(Ordering::Relaxed),
            policy_denied: self.policy_denied.load(Ordering::Relaxed),
            storage_faults: self.storage_faults.load(Ordering::Relaxed),
            gate_busy: self.gate_busy.load(Ordering::Relaxed),
            actuator_faults: self.actuator_faults.load(Ordering::Relaxed),
            gate_cycles: self.gate_cycles.load(Ordering::Relaxed),
            display_writes: self.display_writes.load(Ordering::Relaxed),
            free_slots: self.free_slots.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// 99th percentile decision latency (µs)
    pub lat_p99_us: u64,
    pub entries_granted: u64,
    pub exits_granted: u64,
    pub format_rejected: u64,
    pub unknown_identity: u64,
    pub policy_denied: u64,
    pub storage_faults: u64,
    pub gate_busy: u64,
    pub actuator_faults: u64,
    pub gate_cycles: u64,
    pub display_writes: u64,
    pub free_slots: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.2}", self.events_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p99_us = %self.lat_p99_us,
            entries_granted = %self.entries_granted,
            exits_granted = %self.exits_granted,
            format_rejected = %self.format_rejected,
            unknown_identity = %self.unknown_identity,
            policy_denied = %self.policy_denied,
            storage_faults = %self.storage_faults,
            gate_busy = %self.gate_busy,
            actuator_faults = %self.actuator_faults,
            gate_cycles = %self.gate_cycles,
            display_writes = %self.display_writes,
            free_slots = %self.free_slots,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::Rejected;
    use crate::domain::types::Identity;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.events_total(), 0);
        assert_eq!(metrics.gate_cycles(), 0);
    }

    #[test]
    fn test_record_event_and_report_resets_interval() {
        let metrics = Metrics::new();
        metrics.record_event_processed(150);
        metrics.record_event_processed(50);

        let summary = metrics.report();
        assert_eq!(summary.events_total, 2);
        assert_eq!(summary.avg_latency_us, 100);
        assert_eq!(summary.max_latency_us, 150);

        let summary = metrics.report();
        assert_eq!(summary.events_total, 2);
        assert_eq!(summary.max_latency_us, 0);
    }

    #[test]
    fn test_outcome_counters() {
        let metrics = Metrics::new();
        metrics.record_grant(Decision::GrantEntry);
        metrics.record_grant(Decision::DenyUnknown);
        metrics.record_access_error(&AccessError::FormatRejected(Rejected::Empty));
        metrics.record_access_error(&AccessError::UnknownIdentity(Identity::Tag("1".into())));

        let summary = metrics.report();
        assert_eq!(summary.entries_granted, 1);
        assert_eq!(summary.exits_granted, 0);
        assert_eq!(summary.format_rejected, 1);
        assert_eq!(summary.unknown_identity, 1);
    }

    #[test]
    fn test_p99_for_latencies_beyond_top_bucket() {
        let metrics = Metrics::new();
        for _ in 0..4 {
            metrics.record_event_processed(4_000_000);
        }

        let summary = metrics.report();
        assert_eq!(summary.max_latency_us, 4_000_000);
        assert_eq!(summary.lat_p99_us, 4_000_000);
    }

    #[test]
    fn test_p99_never_exceeds_max() {
        let metrics = Metrics::new();
        metrics.record_event_processed(120);
        let summary = metrics.report();
        assert_eq!(summary.lat_p99_us, 120);

        metrics.record_event_processed(50);
        metrics.record_event_processed(60_000);
        let summary = metrics.report();
        assert!(summary.lat_p99_us <= summary.max_latency_us);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(50), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(100_000), 10);
    }
}
