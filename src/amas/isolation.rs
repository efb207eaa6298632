use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::amas::config::AMASConfig;
use crate::amas::decision::ensemble::EnsembleWeights;
use crate::amas::learning::{LinUcbModel, ThompsonSampler};
use crate::amas::modeling::ModelingSuite;
use crate::amas::types::{ColdStartState, UserState, ACTION_SPACE};

/// 单个用户的完整模型束。请求期间由 Orchestrator 独占，
/// 仅在持有该用户锁时变更。
#[derive(Debug, Clone)]
pub struct PerUserModels {
    pub user_state: UserState,
    pub modeling: ModelingSuite,
    pub linucb: LinUcbModel,
    pub thompson: ThompsonSampler,
    pub cold_start: ColdStartState,
    pub ensemble_weights: EnsembleWeights,
    pub interaction_count: u64,
    pub recent_corrects: Vec<bool>,
}

impl PerUserModels {
    pub fn fresh(config: &AMASConfig) -> Self {
        Self {
            user_state: UserState::default(),
            modeling: ModelingSuite::default(),
            linucb: LinUcbModel::new(&config.linucb),
            thompson: ThompsonSampler::new(&config.thompson, ACTION_SPACE.len()),
            cold_start: ColdStartState::default(),
            ensemble_weights: EnsembleWeights::from_config(&config.ensemble),
            interaction_count: 0,
            recent_corrects: Vec::new(),
        }
    }

    /// 近期错误率，窗口 10
    pub fn recent_error_rate(&self) -> f64 {
        if self.recent_corrects.is_empty() {
            return 0.0;
        }
        let errors = self.recent_corrects.iter().filter(|c| !**c).count();
        errors as f64 / self.recent_corrects.len() as f64
    }

    pub fn push_outcome(&mut self, is_correct: bool) {
        self.recent_corrects.push(is_correct);
        while self.recent_corrects.len() > 10 {
            self.recent_corrects.remove(0);
        }
    }
}

struct Slot {
    models: PerUserModels,
    last_access_ms: i64,
}

/// 每用户隔离管理：串行锁映射与模型束 arena。
/// 束在首次使用时惰性创建，超出 max_users 按 LRU 淘汰，
/// 闲置超过 TTL 由周期清扫回收。
pub struct IsolationManager {
    max_users: usize,
    user_ttl_ms: i64,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    slots: RwLock<HashMap<String, Slot>>,
}

impl IsolationManager {
    pub fn new(max_users: usize, user_ttl_ms: i64) -> Self {
        Self {
            max_users: max_users.max(1),
            user_ttl_ms,
            locks: Mutex::new(HashMap::new()),
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// 取该用户的串行锁。
    /// Arc::strong_count == 1 表示只有映射自身持有，锁空闲可剪除。
    pub async fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;

        if locks.len() > 1000 {
            locks.retain(|_, v| Arc::strong_count(v) > 1);
        }

        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 取出模型束副本（无则 None）。调用方必须已持有用户锁。
    pub async fn checkout(&self, user_id: &str) -> Option<PerUserModels> {
        let mut slots = self.slots.write().await;
        let slot = slots.get_mut(user_id)?;
        slot.last_access_ms = chrono::Utc::now().timestamp_millis();
        Some(slot.models.clone())
    }

    /// 写回模型束；容量超限时先按 LRU 腾位
    pub async fn commit(&self, user_id: &str, models: PerUserModels) {
        let now = chrono::Utc::now().timestamp_millis();
        let mut slots = self.slots.write().await;

        if slots.len() >= self.max_users && !slots.contains_key(user_id) {
            let evict_count = self.max_users / 10 + 1;
            let mut by_access: Vec<(String, i64)> = slots
                .iter()
                .map(|(k, v)| (k.clone(), v.last_access_ms))
                .collect();
            by_access.sort_by_key(|(_, ts)| *ts);
            for (key, _) in by_access.into_iter().take(evict_count) {
                slots.remove(&key);
            }
            tracing::debug!(evicted = evict_count, "Isolation arena evicted LRU users");
        }

        slots.insert(
            user_id.to_string(),
            Slot {
                models,
                last_access_ms: now,
            },
        );
    }

    pub async fn remove(&self, user_id: &str) {
        self.slots.write().await.remove(user_id);
    }

    /// TTL 清扫，返回回收的用户数
    pub async fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut slots = self.slots.write().await;
        let before = slots.len();
        let ttl = self.user_ttl_ms;
        slots.retain(|_, slot| now_ms - slot.last_access_ms < ttl);
        before - slots.len()
    }

    pub async fn resident_users(&self) -> usize {
        self.slots.read().await.len()
    }
}
