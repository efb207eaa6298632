//! 延迟奖励 worker：每 5 分钟取出到期条目并回放到对应用户的 bandit 模型。

use crate::amas::engine::AMASEngine;
use crate::store::Store;

pub async fn run(store: &Store, engine: &AMASEngine) {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let due = match store.drain_due_delayed_rewards(now_ms) {
        Ok(due) => due,
        Err(e) => {
            tracing::warn!(error = %e, "Delayed reward: queue drain failed");
            return;
        }
    };

    if due.is_empty() {
        tracing::debug!("Delayed reward worker tick, queue empty");
        return;
    }

    let mut applied = 0u32;
    let mut failed = 0u32;
    for entry in due {
        let outcome = engine
            .apply_delayed_reward(&entry.user_id, &entry.feature_values, entry.reward)
            .await;
        if outcome.success {
            applied += 1;
        } else {
            failed += 1;
            tracing::warn!(
                user_id = %entry.user_id,
                entry_id = %entry.id,
                error = ?outcome.error,
                "Delayed reward application failed"
            );
        }
    }

    tracing::info!(applied, failed, "Delayed reward: processed due entries");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::amas::config::AMASConfig;
    use crate::store::operations::engine::{DelayedRewardEntry, ModelRepo};

    fn entry(id: &str, user_id: &str, due_ts_ms: i64) -> DelayedRewardEntry {
        DelayedRewardEntry {
            id: id.to_string(),
            user_id: user_id.to_string(),
            feature_values: vec![0.2; 22],
            reward: 0.6,
            due_ts_ms,
        }
    }

    #[tokio::test]
    async fn due_entries_update_model_and_leave_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            Store::open(dir.path().join("delayed.sled").to_str().unwrap()).unwrap(),
        );
        let engine = AMASEngine::new(AMASConfig::default(), store.clone());

        store.enqueue_delayed_reward(&entry("e1", "u1", 1000)).unwrap();
        let far_future = chrono::Utc::now().timestamp_millis() + 3_600_000;
        store
            .enqueue_delayed_reward(&entry("e2", "u1", far_future))
            .unwrap();

        run(&store, &engine).await;

        let model = store.load_model("u1").unwrap().unwrap();
        assert_eq!(model.update_count, 1);
        // 未到期条目保留
        assert_eq!(store.delayed_reward_queue.len(), 1);
    }
}
