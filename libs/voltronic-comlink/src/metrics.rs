//! Transport metrics
//!
//! Counters and timers the serial transport records while executing
//! commands. Recording is explicit at the call sites that own the
//! measurement; there is no global registry. An exporter reads
//! [`TransportMetrics::snapshot`] on its own schedule.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

/// Shared metrics handle for a single transport instance.
///
/// All operations are lock-free (`AtomicU64` scalars, per-bucket locked
/// `DashMap` for the error counters), safe to record from the hot path.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// Completed `execute` calls, success or failure
    executions: AtomicU64,
    /// Cumulative wall time spent inside `execute`, in microseconds
    execute_micros: AtomicU64,
    /// Cumulative time spent waiting for the port mutex, in microseconds
    acquire_micros: AtomicU64,
    /// Failed attempts by error kind label
    errors: DashMap<&'static str, u64>,
}

/// Point-in-time copy of the counters, for exporters and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub executions: u64,
    pub execute_micros: u64,
    pub acquire_micros: u64,
    pub errors: HashMap<&'static str, u64>,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed `execute` call and its total duration.
    pub fn record_execute(&self, elapsed: Duration) {
        self.executions.fetch_add(1, Ordering::Relaxed);
        self.execute_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record time spent waiting to acquire the port lock.
    pub fn record_acquire(&self, waited: Duration) {
        self.acquire_micros
            .fetch_add(waited.as_micros() as u64, Ordering::Relaxed);
    }

    /// Count one failed attempt under its error-kind label.
    pub fn record_error(&self, kind: &'static str) {
        *self.errors.entry(kind).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            executions: self.executions.load(Ordering::Relaxed),
            execute_micros: self.execute_micros.load(Ordering::Relaxed),
            acquire_micros: self.acquire_micros.load(Ordering::Relaxed),
            errors: self
                .errors
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate() {
        let metrics = TransportMetrics::new();
        metrics.record_execute(Duration::from_micros(150));
        metrics.record_execute(Duration::from_micros(50));
        metrics.record_acquire(Duration::from_micros(10));
        metrics.record_error("timeout");
        metrics.record_error("timeout");
        metrics.record_error("nak");

        let snap = metrics.snapshot();
        assert_eq!(snap.executions, 2);
        assert_eq!(snap.execute_micros, 200);
        assert_eq!(snap.acquire_micros, 10);
        assert_eq!(snap.errors.get("timeout"), Some(&2));
        assert_eq!(snap.errors.get("nak"), Some(&1));
    }

    #[tokio::test]
    async fn concurrent_error_counting() {
        let metrics = std::sync::Arc::new(TransportMetrics::new());
        let mut handles = vec![];
        for _ in 0..50 {
            let metrics = metrics.clone();
            handles.push(tokio::spawn(async move {
                metrics.record_error("io");
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(metrics.snapshot().errors.get("io"), Some(&50));
    }
}
