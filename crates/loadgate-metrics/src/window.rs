//! Bucketed metrics window — the per-request sample recorder.
//!
//! A fixed ring of time buckets covering a trailing window. Each bucket
//! aggregates the requests that completed during its time slice; buckets
//! older than the retention horizon read as zero on the next read, which
//! yields a moving window without unbounded growth.
//!
//! Locking is sharded: one short-held mutex per bucket, so concurrent
//! `record` calls only contend when they land in the same slice, and a
//! reader never holds more than one bucket lock at a time.

use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use loadgate_core::{WindowConfig, WindowStats};

/// Counters for one fixed-size time slice of the window.
#[derive(Debug, Default)]
struct Bucket {
    /// Absolute slice index (`now_secs / bucket_secs`) these counters belong to.
    epoch: u64,
    count: u64,
    error_count: u64,
    sum_response_time_ms: f64,
    max_response_time_ms: f64,
}

/// Concurrent recorder for per-request (response time, error) samples.
///
/// Recording never fails and never blocks the caller beyond a single
/// bucket increment. Shared across request handlers via `Arc`.
pub struct MetricsRecorder {
    buckets: Vec<Mutex<Bucket>>,
    bucket_secs: u64,
}

impl MetricsRecorder {
    /// Create a recorder with the given window shape.
    pub fn new(config: &WindowConfig) -> Self {
        let buckets = (0..config.bucket_count)
            .map(|_| Mutex::new(Bucket::default()))
            .collect();
        Self {
            buckets,
            bucket_secs: config.bucket_secs,
        }
    }

    /// Record one completed request.
    pub fn record(&self, response_time_ms: f64, is_error: bool) {
        self.record_at(now_millis(), response_time_ms, is_error);
    }

    /// Clock-explicit variant of [`record`](Self::record), for callers
    /// holding their own clock and for deterministic tests.
    pub fn record_at(&self, now_ms: u64, response_time_ms: f64, is_error: bool) {
        let epoch = now_ms / 1000 / self.bucket_secs;
        let idx = (epoch % self.buckets.len() as u64) as usize;

        let mut bucket = lock_bucket(&self.buckets[idx]);
        if bucket.epoch != epoch {
            // The ring wrapped; this slot held an aged-out slice.
            if bucket.count > 0 {
                debug!(
                    slot = idx,
                    aged_out = bucket.count,
                    "recycling window bucket"
                );
            }
            *bucket = Bucket {
                epoch,
                ..Bucket::default()
            };
        }
        bucket.count += 1;
        if is_error {
            bucket.error_count += 1;
        }
        bucket.sum_response_time_ms += response_time_ms;
        if response_time_ms > bucket.max_response_time_ms {
            bucket.max_response_time_ms = response_time_ms;
        }
    }

    /// A consistent point-in-time view of the window.
    ///
    /// Each bucket is copied under its own lock; buckets whose slice is
    /// older than the retention horizon are treated as zero.
    pub fn stats(&self) -> WindowStats {
        self.stats_at(now_millis())
    }

    /// Clock-explicit variant of [`stats`](Self::stats).
    pub fn stats_at(&self, now_ms: u64) -> WindowStats {
        let now_epoch = now_ms / 1000 / self.bucket_secs;
        let horizon = self.buckets.len() as u64;

        let mut stats = WindowStats {
            window_span_secs: (horizon * self.bucket_secs) as f64,
            ..WindowStats::default()
        };

        for slot in &self.buckets {
            let bucket = lock_bucket(slot);
            if bucket.count == 0
                || bucket.epoch > now_epoch
                || bucket.epoch + horizon <= now_epoch
            {
                continue;
            }
            stats.count += bucket.count;
            stats.error_count += bucket.error_count;
            stats.sum_response_time_ms += bucket.sum_response_time_ms;
            if bucket.max_response_time_ms > stats.max_response_time_ms {
                stats.max_response_time_ms = bucket.max_response_time_ms;
            }
        }

        stats
    }

    /// Span of the window in seconds.
    pub fn window_span_secs(&self) -> u64 {
        self.bucket_secs * self.buckets.len() as u64
    }
}

/// Counters are plain integers, so a lock poisoned by a panic elsewhere
/// still holds valid data; recording must keep going either way.
fn lock_bucket(slot: &Mutex<Bucket>) -> MutexGuard<'_, Bucket> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
