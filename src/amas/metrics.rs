use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::amas::types::LearnerId;

const LATENCY_BUCKETS: [u64; 6] = [100, 500, 1_000, 5_000, 10_000, u64::MAX];

pub struct AlgorithmMetrics {
    pub call_count: AtomicU64,
    pub total_latency_us: AtomicU64,
    pub error_count: AtomicU64,
    pub last_called_at: AtomicI64,
    latency_buckets: [AtomicU64; 6],
}

impl Default for AlgorithmMetrics {
    fn default() -> Self {
        Self {
            call_count: AtomicU64::new(0),
            total_latency_us: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            last_called_at: AtomicI64::new(0),
            latency_buckets: Default::default(),
        }
    }
}

impl AlgorithmMetrics {
    fn record_latency_bucket(&self, latency_us: u64) {
        for (i, &threshold) in LATENCY_BUCKETS.iter().enumerate() {
            if latency_us <= threshold {
                self.latency_buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
    }

    /// 桶中位数近似的 p50/p95/p99
    pub fn get_percentiles(&self) -> (f64, f64, f64) {
        let counts: Vec<u64> = self
            .latency_buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return (0.0, 0.0, 0.0);
        }

        let bucket_midpoints: [f64; 6] = [50.0, 300.0, 750.0, 3000.0, 7500.0, 15000.0];

        let percentile = |pct: f64| -> f64 {
            let target = (pct / 100.0 * total as f64).ceil() as u64;
            let mut cumulative = 0u64;
            for (i, &count) in counts.iter().enumerate() {
                cumulative += count;
                if cumulative >= target {
                    return bucket_midpoints[i];
                }
            }
            bucket_midpoints[5]
        };

        (percentile(50.0), percentile(95.0), percentile(99.0))
    }
}

/// 进程级算法指标注册表，原子计数，供 metrics_flush worker 快照落盘
pub struct MetricsRegistry {
    metrics: HashMap<LearnerId, AlgorithmMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut metrics = HashMap::new();
        for id in &[
            LearnerId::Linucb,
            LearnerId::Thompson,
            LearnerId::Actr,
            LearnerId::Heuristic,
            LearnerId::Coldstart,
            LearnerId::Ensemble,
        ] {
            metrics.insert(*id, AlgorithmMetrics::default());
        }
        Self { metrics }
    }

    pub fn record_call(&self, id: LearnerId, latency_us: u64, is_error: bool) {
        if let Some(metric) = self.metrics.get(&id) {
            metric.call_count.fetch_add(1, Ordering::Relaxed);
            metric
                .total_latency_us
                .fetch_add(latency_us, Ordering::Relaxed);
            if is_error {
                metric.error_count.fetch_add(1, Ordering::Relaxed);
            }
            metric.record_latency_bucket(latency_us);
            metric
                .last_called_at
                .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> HashMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(id, metric)| {
                (
                    id.as_str().to_string(),
                    MetricsSnapshot {
                        call_count: metric.call_count.load(Ordering::Relaxed),
                        total_latency_us: metric.total_latency_us.load(Ordering::Relaxed),
                        error_count: metric.error_count.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    pub fn snapshot_and_reset(&self) -> HashMap<String, MetricsSnapshot> {
        self.metrics
            .iter()
            .map(|(id, metric)| {
                let call_count = metric.call_count.swap(0, Ordering::Relaxed);
                let total_latency_us = metric.total_latency_us.swap(0, Ordering::Relaxed);
                let error_count = metric.error_count.swap(0, Ordering::Relaxed);
                for bucket in &metric.latency_buckets {
                    bucket.swap(0, Ordering::Relaxed);
                }
                (
                    id.as_str().to_string(),
                    MetricsSnapshot {
                        call_count,
                        total_latency_us,
                        error_count,
                    },
                )
            })
            .collect()
    }

    pub fn reset(&self) {
        for metric in self.metrics.values() {
            metric.call_count.store(0, Ordering::Relaxed);
            metric.total_latency_us.store(0, Ordering::Relaxed);
            metric.error_count.store(0, Ordering::Relaxed);
            for bucket in &metric.latency_buckets {
                bucket.store(0, Ordering::Relaxed);
            }
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub call_count: u64,
    pub total_latency_us: u64,
    pub error_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_snapshot() {
        let registry = MetricsRegistry::new();
        registry.record_call(LearnerId::Linucb, 120, false);
        registry.record_call(LearnerId::Linucb, 80, true);
        let snap = registry.snapshot();
        let linucb = &snap["linucb"];
        assert_eq!(linucb.call_count, 2);
        assert_eq!(linucb.error_count, 1);
        assert_eq!(linucb.total_latency_us, 200);
    }

    #[test]
    fn snapshot_and_reset_zeroes_counters() {
        let registry = MetricsRegistry::new();
        registry.record_call(LearnerId::Thompson, 50, false);
        let first = registry.snapshot_and_reset();
        assert_eq!(first["thompson"].call_count, 1);
        let second = registry.snapshot();
        assert_eq!(second["thompson"].call_count, 0);
    }

    #[test]
    fn percentiles_track_buckets() {
        let registry = MetricsRegistry::new();
        for _ in 0..90 {
            registry.record_call(LearnerId::Ensemble, 50, false);
        }
        for _ in 0..10 {
            registry.record_call(LearnerId::Ensemble, 8_000, false);
        }
        let metric = registry.metrics.get(&LearnerId::Ensemble).unwrap();
        let (p50, _p95, p99) = metric.get_percentiles();
        assert_eq!(p50, 50.0);
        assert_eq!(p99, 7500.0);
    }
}
