//! 周期清扫：隔离 arena、感知窗口与超参数缓存的 LRU/TTL 回收。

use crate::amas::engine::AMASEngine;

pub async fn run(engine: &AMASEngine) {
    let (arena, windows, params) = engine.sweep().await;
    if arena + windows + params > 0 {
        tracing::info!(arena, windows, params, "State sweep reclaimed entries");
    } else {
        tracing::debug!("State sweep tick, nothing to reclaim");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::amas::config::AMASConfig;
    use crate::amas::types::{ProcessOptions, RawEvent};
    use crate::store::Store;

    #[tokio::test]
    async fn sweep_reclaims_expired_users() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            Arc::new(Store::open(dir.path().join("sweep.sled").to_str().unwrap()).unwrap());
        let mut config = AMASConfig::default();
        config.isolation.user_ttl_ms = 0;
        config.isolation.decision_timeout_ms = crate::constants::DECISION_TIMEOUT_TEST_MS;
        let engine = AMASEngine::new(config, store);

        engine
            .process_event("u1", RawEvent::default(), ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(engine.resident_users().await, 1);

        run(&engine).await;
        assert_eq!(engine.resident_users().await, 0);
    }
}
