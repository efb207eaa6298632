//! 每 5 分钟把算法指标快照累加进当日落盘记录。

use crate::amas::metrics::MetricsRegistry;
use crate::store::Store;

pub async fn run(registry: &MetricsRegistry, store: &Store) {
    let snapshot = registry.snapshot_and_reset();
    let date = chrono::Utc::now().format("%Y-%m-%d").to_string();

    let mut flushed = 0usize;
    for (algo_id, metrics) in snapshot {
        if metrics.call_count == 0 {
            continue;
        }

        // 与当日已有计数合并累加
        let merged = match store.get_metrics_daily(&date, &algo_id) {
            Ok(Some(existing)) => {
                let prev_calls = existing["callCount"].as_u64().unwrap_or(0);
                let prev_latency = existing["totalLatencyUs"].as_u64().unwrap_or(0);
                let prev_errors = existing["errorCount"].as_u64().unwrap_or(0);
                serde_json::json!({
                    "callCount": prev_calls + metrics.call_count,
                    "totalLatencyUs": prev_latency + metrics.total_latency_us,
                    "errorCount": prev_errors + metrics.error_count,
                })
            }
            _ => serde_json::json!({
                "callCount": metrics.call_count,
                "totalLatencyUs": metrics.total_latency_us,
                "errorCount": metrics.error_count,
            }),
        };

        if let Err(e) = store.upsert_metrics_daily(&date, &algo_id, &merged) {
            tracing::warn!(algo_id, error = %e, "Metrics flush failed for algorithm");
        } else {
            flushed += 1;
        }
    }

    if flushed > 0 {
        tracing::info!(flushed, "Metrics flushed to daily store");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::LearnerId;

    #[tokio::test]
    async fn flush_accumulates_daily_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("metrics.sled").to_str().unwrap()).unwrap();
        let registry = MetricsRegistry::new();

        registry.record_call(LearnerId::Linucb, 100, false);
        registry.record_call(LearnerId::Linucb, 200, true);
        run(&registry, &store).await;

        registry.record_call(LearnerId::Linucb, 50, false);
        run(&registry, &store).await;

        let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let stored = store.get_metrics_daily(&date, "linucb").unwrap().unwrap();
        assert_eq!(stored["callCount"], 3);
        assert_eq!(stored["totalLatencyUs"], 350);
        assert_eq!(stored["errorCount"], 1);
    }

    #[tokio::test]
    async fn flush_skips_idle_algorithms() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("metrics2.sled").to_str().unwrap()).unwrap();
        let registry = MetricsRegistry::new();
        run(&registry, &store).await;

        let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
        assert!(store.get_metrics_daily(&date, "linucb").unwrap().is_none());
    }
}
