use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::amas::types::{BanditSnapshot, ColdStartState, UserState};
use crate::store::keys;
use crate::store::{Store, StoreError};

/// StateRepo 持久化形状：用户状态加可选冷启动子记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedUserState {
    pub user_state: UserState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cold_start: Option<ColdStartState>,
    pub interaction_count: u64,
    pub last_updated: i64,
}

/// 延迟奖励队列条目
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayedRewardEntry {
    pub id: String,
    pub user_id: String,
    pub feature_values: Vec<f64>,
    pub reward: f64,
    pub due_ts_ms: i64,
}

/// 用户状态仓库。键空间 userId -> PersistedUserState。
pub trait StateRepo: Send + Sync {
    fn load_state(&self, user_id: &str) -> Result<Option<PersistedUserState>, StoreError>;
    fn save_state(&self, user_id: &str, state: &PersistedUserState) -> Result<(), StoreError>;
    fn delete_state(&self, user_id: &str) -> Result<(), StoreError>;
}

/// 决策模型仓库。键空间 userId -> BanditSnapshot。
/// 矩阵按小端 IEEE-754 float32 序列存储（A: d², b: d, L: d²）。
pub trait ModelRepo: Send + Sync {
    fn load_model(&self, user_id: &str) -> Result<Option<BanditSnapshot>, StoreError>;
    fn save_model(&self, user_id: &str, model: &BanditSnapshot) -> Result<(), StoreError>;
    fn delete_model(&self, user_id: &str) -> Result<(), StoreError>;
}

impl StateRepo for Store {
    fn load_state(&self, user_id: &str) -> Result<Option<PersistedUserState>, StoreError> {
        let key = keys::engine_user_state_key(user_id)?;
        match self.engine_user_states.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_state(&self, user_id: &str, state: &PersistedUserState) -> Result<(), StoreError> {
        let key = keys::engine_user_state_key(user_id)?;
        self.engine_user_states
            .insert(key.as_bytes(), Self::serialize(state)?)?;
        Ok(())
    }

    fn delete_state(&self, user_id: &str) -> Result<(), StoreError> {
        let key = keys::engine_user_state_key(user_id)?;
        self.engine_user_states.remove(key.as_bytes())?;
        Ok(())
    }
}

impl ModelRepo for Store {
    fn load_model(&self, user_id: &str) -> Result<Option<BanditSnapshot>, StoreError> {
        let key = keys::engine_bandit_model_key(user_id)?;
        match self.engine_bandit_models.get(key.as_bytes())? {
            Some(raw) => Ok(Some(decode_bandit_model(&raw).map_err(|message| {
                StoreError::Corrupt {
                    entity: "bandit_model".to_string(),
                    key,
                    message,
                }
            })?)),
            None => Ok(None),
        }
    }

    fn save_model(&self, user_id: &str, model: &BanditSnapshot) -> Result<(), StoreError> {
        let key = keys::engine_bandit_model_key(user_id)?;
        self.engine_bandit_models
            .insert(key.as_bytes(), encode_bandit_model(model))?;
        Ok(())
    }

    fn delete_model(&self, user_id: &str) -> Result<(), StoreError> {
        let key = keys::engine_bandit_model_key(user_id)?;
        self.engine_bandit_models.remove(key.as_bytes())?;
        Ok(())
    }
}

const BANDIT_MAGIC: &[u8; 4] = b"AMB1";

/// 布局：magic(4) | d: u32 | lambda: f32 | alpha: f32 | updateCount: u64
///       | A: f32×d² | b: f32×d | L: f32×d²，全部小端。
pub fn encode_bandit_model(model: &BanditSnapshot) -> Vec<u8> {
    let d = model.d;
    let mut out = Vec::with_capacity(4 + 4 + 4 + 4 + 8 + 4 * (2 * d * d + d));
    out.extend_from_slice(BANDIT_MAGIC);
    out.extend_from_slice(&(d as u32).to_le_bytes());
    out.extend_from_slice(&(model.lambda as f32).to_le_bytes());
    out.extend_from_slice(&(model.alpha as f32).to_le_bytes());
    out.extend_from_slice(&model.update_count.to_le_bytes());
    for &v in &model.a {
        out.extend_from_slice(&(v as f32).to_le_bytes());
    }
    for &v in &model.b {
        out.extend_from_slice(&(v as f32).to_le_bytes());
    }
    for &v in &model.l {
        out.extend_from_slice(&(v as f32).to_le_bytes());
    }
    out
}

pub fn decode_bandit_model(bytes: &[u8]) -> Result<BanditSnapshot, String> {
    if bytes.len() < 24 {
        return Err("record too short".to_string());
    }
    if &bytes[0..4] != BANDIT_MAGIC {
        return Err("bad magic".to_string());
    }
    let d = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
    if d == 0 || d > 1024 {
        return Err(format!("implausible dimension {d}"));
    }
    let lambda = f32::from_le_bytes(bytes[8..12].try_into().unwrap()) as f64;
    let alpha = f32::from_le_bytes(bytes[12..16].try_into().unwrap()) as f64;
    let update_count = u64::from_le_bytes(bytes[16..24].try_into().unwrap());

    let expected = 24 + 4 * (d * d + d + d * d);
    if bytes.len() != expected {
        return Err(format!(
            "length mismatch: expected {expected}, got {}",
            bytes.len()
        ));
    }

    let read_f32s = |offset: usize, count: usize| -> Vec<f64> {
        (0..count)
            .map(|i| {
                let start = offset + 4 * i;
                f32::from_le_bytes(bytes[start..start + 4].try_into().unwrap()) as f64
            })
            .collect()
    };

    let a = read_f32s(24, d * d);
    let b = read_f32s(24 + 4 * d * d, d);
    let l = read_f32s(24 + 4 * (d * d + d), d * d);

    Ok(BanditSnapshot {
        d,
        lambda,
        alpha,
        a,
        b,
        l,
        update_count,
    })
}

impl Store {
    pub fn get_engine_algo_state(
        &self,
        user_id: &str,
        algo_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let key = keys::engine_algo_state_key(user_id, algo_id)?;
        match self.engine_algorithm_states.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_engine_algo_state(
        &self,
        user_id: &str,
        algo_id: &str,
        state: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let key = keys::engine_algo_state_key(user_id, algo_id)?;
        self.engine_algorithm_states
            .insert(key.as_bytes(), Self::serialize(state)?)?;
        Ok(())
    }

    pub fn delete_engine_algo_states(&self, user_id: &str) -> Result<(), StoreError> {
        let prefix = format!("{}:", keys::engine_user_state_key(user_id)?);
        let stale: Vec<_> = self
            .engine_algorithm_states
            .scan_prefix(prefix.as_bytes())
            .keys()
            .collect::<Result<_, _>>()?;
        for key in stale {
            self.engine_algorithm_states.remove(key)?;
        }
        Ok(())
    }

    /// 请求结束时的原子持久化：用户状态、bandit 模型与算法状态
    /// 在同一事务内写入，避免半写状态。
    pub fn persist_engine_state_atomic(
        &self,
        user_id: &str,
        state: &PersistedUserState,
        model: &BanditSnapshot,
        algo_states: &[(String, serde_json::Value)],
    ) -> Result<(), StoreError> {
        let state_key = keys::engine_user_state_key(user_id)?;
        let state_bytes = Self::serialize(state)?;
        let model_key = keys::engine_bandit_model_key(user_id)?;
        let model_bytes = encode_bandit_model(model);

        let algo_entries: Vec<(String, Vec<u8>)> = algo_states
            .iter()
            .map(|(algo_id, value)| {
                let key = keys::engine_algo_state_key(user_id, algo_id)?;
                let bytes = Self::serialize(value)?;
                Ok((key, bytes))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        (
            &self.engine_user_states,
            &self.engine_bandit_models,
            &self.engine_algorithm_states,
        )
            .transaction(|(tx_state, tx_model, tx_algo)| {
                tx_state.insert(state_key.as_bytes(), state_bytes.as_slice())?;
                tx_model.insert(model_key.as_bytes(), model_bytes.as_slice())?;
                for (key, bytes) in &algo_entries {
                    tx_algo.insert(key.as_bytes(), bytes.as_slice())?;
                }
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError<()>| match e {
                sled::transaction::TransactionError::Abort(()) => {
                    StoreError::Sled(sled::Error::Unsupported("transaction aborted".into()))
                }
                sled::transaction::TransactionError::Storage(se) => StoreError::Sled(se),
            })?;

        Ok(())
    }

    pub fn insert_decision_trace(&self, trace: &serde_json::Value) -> Result<(), StoreError> {
        let id = match trace.get("id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        let ts = trace
            .get("ts")
            .and_then(|v| v.as_i64())
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        let key = keys::decision_trace_key(ts, &id)?;
        self.engine_decision_traces
            .insert(key.as_bytes(), Self::serialize(trace)?)?;
        Ok(())
    }

    pub fn get_recent_decision_traces(
        &self,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        let mut traces = Vec::new();
        for item in self.engine_decision_traces.iter() {
            let (_, raw) = item?;
            traces.push(Self::deserialize(&raw)?);
            if traces.len() >= limit {
                break;
            }
        }
        Ok(traces)
    }

    pub fn upsert_metrics_daily(
        &self,
        date: &str,
        algo_id: &str,
        metrics: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let key = keys::metrics_daily_key(date, algo_id)?;
        self.algorithm_metrics_daily
            .insert(key.as_bytes(), Self::serialize(metrics)?)?;
        Ok(())
    }

    pub fn get_metrics_daily(
        &self,
        date: &str,
        algo_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let key = keys::metrics_daily_key(date, algo_id)?;
        match self.algorithm_metrics_daily.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn enqueue_delayed_reward(&self, entry: &DelayedRewardEntry) -> Result<(), StoreError> {
        let key = keys::delayed_reward_key(entry.due_ts_ms, &entry.id)?;
        self.delayed_reward_queue
            .insert(key.as_bytes(), Self::serialize(entry)?)?;
        Ok(())
    }

    /// 取出所有到期条目并从队列移除。key 按到期时间升序排列，
    /// 遇到未到期条目即可停止扫描。
    pub fn drain_due_delayed_rewards(
        &self,
        now_ms: i64,
    ) -> Result<Vec<DelayedRewardEntry>, StoreError> {
        let mut due = Vec::new();
        for item in self.delayed_reward_queue.iter() {
            let (key, raw) = item?;
            let Some((due_ts, _)) = keys::parse_delayed_reward_key(&key) else {
                continue;
            };
            if due_ts > now_ms {
                break;
            }
            due.push((key, Self::deserialize::<DelayedRewardEntry>(&raw)?));
        }

        for (key, _) in &due {
            self.delayed_reward_queue.remove(key)?;
        }

        Ok(due.into_iter().map(|(_, entry)| entry).collect())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::amas::types::UserState;

    fn sample_model(d: usize) -> BanditSnapshot {
        let mut a = vec![0.0; d * d];
        let mut l = vec![0.0; d * d];
        for i in 0..d {
            a[i * d + i] = 1.0;
            l[i * d + i] = 1.0;
        }
        BanditSnapshot {
            d,
            lambda: 1.0,
            alpha: 0.5,
            a,
            b: vec![0.25; d],
            l,
            update_count: 7,
        }
    }

    #[test]
    fn bandit_codec_roundtrip_is_stable() {
        let model = sample_model(4);
        let bytes = encode_bandit_model(&model);
        let decoded = decode_bandit_model(&bytes).unwrap();
        assert_eq!(decoded, model);
        // 第二轮编码与第一轮字节级一致
        assert_eq!(encode_bandit_model(&decoded), bytes);
    }

    #[test]
    fn bandit_codec_rejects_truncated_record() {
        let model = sample_model(3);
        let mut bytes = encode_bandit_model(&model);
        bytes.truncate(bytes.len() - 1);
        assert!(decode_bandit_model(&bytes).is_err());
    }

    #[test]
    fn bandit_codec_rejects_bad_magic() {
        let model = sample_model(2);
        let mut bytes = encode_bandit_model(&model);
        bytes[0] = b'X';
        assert!(decode_bandit_model(&bytes).is_err());
    }

    #[test]
    fn save_and_load_state() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("engine-db").to_str().unwrap()).unwrap();

        let persisted = PersistedUserState {
            user_state: UserState::default(),
            cold_start: None,
            interaction_count: 3,
            last_updated: 42,
        };
        store.save_state("u1", &persisted).unwrap();
        let got = store.load_state("u1").unwrap().unwrap();
        assert_eq!(got.interaction_count, 3);
        assert!(store.load_state("u2").unwrap().is_none());
    }

    #[test]
    fn save_and_load_model() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("model-db").to_str().unwrap()).unwrap();

        let model = sample_model(5);
        store.save_model("u1", &model).unwrap();
        let got = store.load_model("u1").unwrap().unwrap();
        assert_eq!(got, model);
    }

    #[test]
    fn atomic_persist_writes_all_trees() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("atomic-db").to_str().unwrap()).unwrap();

        let persisted = PersistedUserState {
            user_state: UserState::default(),
            cold_start: None,
            interaction_count: 1,
            last_updated: 1,
        };
        let model = sample_model(3);
        let algo = vec![("thompson".to_string(), serde_json::json!({"arms": {}}))];
        store
            .persist_engine_state_atomic("u1", &persisted, &model, &algo)
            .unwrap();

        assert!(store.load_state("u1").unwrap().is_some());
        assert!(store.load_model("u1").unwrap().is_some());
        assert!(store
            .get_engine_algo_state("u1", "thompson")
            .unwrap()
            .is_some());
    }

    #[test]
    fn delayed_reward_queue_drains_only_due() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("queue-db").to_str().unwrap()).unwrap();

        let due = DelayedRewardEntry {
            id: "e1".to_string(),
            user_id: "u1".to_string(),
            feature_values: vec![0.1; 22],
            reward: 0.5,
            due_ts_ms: 1000,
        };
        let future = DelayedRewardEntry {
            id: "e2".to_string(),
            user_id: "u1".to_string(),
            feature_values: vec![0.1; 22],
            reward: 0.5,
            due_ts_ms: 99_000,
        };
        store.enqueue_delayed_reward(&due).unwrap();
        store.enqueue_delayed_reward(&future).unwrap();

        let drained = store.drain_due_delayed_rewards(2000).unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].id, "e1");
        // 未到期条目保留
        assert_eq!(store.delayed_reward_queue.len(), 1);
    }
}
