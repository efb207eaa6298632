use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// 每用户超参数，全部有界。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserParams {
    /// LinUCB 探索系数
    pub alpha: f64,
    /// 疲劳恢复速率
    pub fatigue_k: f64,
    /// 动机记忆系数
    pub motivation_rho: f64,
    /// 目标难度落点
    pub optimal_difficulty: f64,
}

impl Default for UserParams {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            fatigue_k: 0.05,
            motivation_rho: 0.8,
            optimal_difficulty: 0.5,
        }
    }
}

impl UserParams {
    pub fn clamp_in_place(&mut self) {
        self.alpha = self.alpha.clamp(0.3, 2.0);
        self.fatigue_k = self.fatigue_k.clamp(0.02, 0.2);
        self.motivation_rho = self.motivation_rho.clamp(0.6, 0.95);
        self.optimal_difficulty = self.optimal_difficulty.clamp(0.2, 0.8);
    }
}

/// 表现跟踪：关键信号的 EMA
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceTracker {
    pub accuracy_ema: f64,
    pub fatigue_slope_ema: f64,
    pub motivation_trend_ema: f64,
    pub reward_ema: f64,
    pub samples: u64,
    last_fatigue: f64,
    last_motivation: f64,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self {
            accuracy_ema: 0.7,
            fatigue_slope_ema: 0.0,
            motivation_trend_ema: 0.0,
            reward_ema: 0.0,
            samples: 0,
            last_fatigue: 0.0,
            last_motivation: 0.0,
        }
    }
}

const EMA_ALPHA: f64 = 0.1;

impl PerformanceTracker {
    pub fn observe(&mut self, is_correct: bool, fatigue: f64, motivation: f64, reward: f64) {
        let accuracy = if is_correct { 1.0 } else { 0.0 };
        self.accuracy_ema = EMA_ALPHA * accuracy + (1.0 - EMA_ALPHA) * self.accuracy_ema;
        self.fatigue_slope_ema =
            EMA_ALPHA * (fatigue - self.last_fatigue) + (1.0 - EMA_ALPHA) * self.fatigue_slope_ema;
        self.motivation_trend_ema = EMA_ALPHA * (motivation - self.last_motivation)
            + (1.0 - EMA_ALPHA) * self.motivation_trend_ema;
        self.reward_ema = EMA_ALPHA * reward + (1.0 - EMA_ALPHA) * self.reward_ema;
        self.last_fatigue = fatigue;
        self.last_motivation = motivation;
        self.samples += 1;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    params: UserParams,
    tracker: PerformanceTracker,
    last_access_ms: i64,
}

/// 每用户超参数管理器，LRU/TTL 有界。
/// 适配规则在表现信号稳定后小步调整，每步调整量有界，
/// 最终参数始终落在声明区间内。
pub struct UserParamsManager {
    max_users: usize,
    ttl_ms: i64,
    entries: Mutex<HashMap<String, Entry>>,
}

impl UserParamsManager {
    pub fn new(max_users: usize, ttl_ms: i64) -> Self {
        Self {
            max_users,
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, user_id: &str) -> UserParams {
        let now = chrono::Utc::now().timestamp_millis();
        let mut map = self.entries.lock().expect("user params lock");
        match map.get_mut(user_id) {
            Some(entry) => {
                entry.last_access_ms = now;
                entry.params.clone()
            }
            None => UserParams::default(),
        }
    }

    /// 记录一次交互结果并适配超参数
    pub fn update(
        &self,
        user_id: &str,
        is_correct: bool,
        fatigue: f64,
        motivation: f64,
        reward: f64,
    ) -> UserParams {
        let now = chrono::Utc::now().timestamp_millis();
        let mut map = self.entries.lock().expect("user params lock");

        if map.len() >= self.max_users && !map.contains_key(user_id) {
            evict_lru(&mut map, self.max_users / 10 + 1);
        }

        let entry = map.entry(user_id.to_string()).or_insert_with(|| Entry {
            params: UserParams::default(),
            tracker: PerformanceTracker::default(),
            last_access_ms: now,
        });
        entry.last_access_ms = now;
        entry.tracker.observe(is_correct, fatigue, motivation, reward);

        // 信号足够稳定后才开始适配
        if entry.tracker.samples >= 10 {
            let t = &entry.tracker;
            let p = &mut entry.params;

            // 正确率稳定偏高 → 收缩探索；偏低或奖励为负 → 扩大探索
            if t.accuracy_ema > 0.85 && t.reward_ema > 0.2 {
                p.alpha -= 0.02;
            } else if t.accuracy_ema < 0.55 || t.reward_ema < -0.1 {
                p.alpha += 0.02;
            }

            // 疲劳持续上升 → 提高恢复速率
            if t.fatigue_slope_ema > 0.02 {
                p.fatigue_k += 0.005;
            } else if t.fatigue_slope_ema < -0.02 {
                p.fatigue_k -= 0.005;
            }

            // 动机持续下滑 → 加大记忆系数，放缓波动
            if t.motivation_trend_ema < -0.02 {
                p.motivation_rho += 0.01;
            } else if t.motivation_trend_ema > 0.02 {
                p.motivation_rho -= 0.01;
            }

            // 难度落点跟随正确率，目标区间 ~75%
            if t.accuracy_ema > 0.85 {
                p.optimal_difficulty += 0.01;
            } else if t.accuracy_ema < 0.6 {
                p.optimal_difficulty -= 0.01;
            }

            p.clamp_in_place();
        }

        entry.params.clone()
    }

    pub fn tracker(&self, user_id: &str) -> Option<PerformanceTracker> {
        let map = self.entries.lock().expect("user params lock");
        map.get(user_id).map(|e| e.tracker.clone())
    }

    pub fn reset_user(&self, user_id: &str) {
        let mut map = self.entries.lock().expect("user params lock");
        map.remove(user_id);
    }

    /// TTL 清扫，返回清除数
    pub fn sweep_expired(&self, now_ms: i64) -> usize {
        let mut map = self.entries.lock().expect("user params lock");
        let before = map.len();
        let ttl = self.ttl_ms;
        map.retain(|_, e| now_ms - e.last_access_ms < ttl);
        before - map.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.entries.lock().expect("user params lock").len()
    }
}

fn evict_lru(map: &mut HashMap<String, Entry>, count: usize) {
    let mut by_access: Vec<(String, i64)> = map
        .iter()
        .map(|(k, v)| (k.clone(), v.last_access_ms))
        .collect();
    by_access.sort_by_key(|(_, ts)| *ts);
    for (key, _) in by_access.into_iter().take(count) {
        map.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_within_bounds() {
        let mut p = UserParams::default();
        p.clamp_in_place();
        assert_eq!(p, UserParams::default());
    }

    #[test]
    fn high_accuracy_shrinks_alpha() {
        let mgr = UserParamsManager::new(100, i64::MAX);
        for _ in 0..60 {
            mgr.update("u1", true, 0.1, 0.5, 0.8);
        }
        let p = mgr.get("u1");
        assert!(p.alpha < UserParams::default().alpha);
        assert!(p.alpha >= 0.3);
    }

    #[test]
    fn low_accuracy_grows_alpha() {
        let mgr = UserParamsManager::new(100, i64::MAX);
        for _ in 0..60 {
            mgr.update("u1", false, 0.1, 0.0, -0.5);
        }
        let p = mgr.get("u1");
        assert!(p.alpha > UserParams::default().alpha);
        assert!(p.alpha <= 2.0);
    }

    #[test]
    fn params_always_bounded() {
        let mgr = UserParamsManager::new(100, i64::MAX);
        for i in 0..500 {
            let p = mgr.update("u1", i % 5 == 0, 1.0, -1.0, -1.0);
            assert!((0.3..=2.0).contains(&p.alpha));
            assert!((0.02..=0.2).contains(&p.fatigue_k));
            assert!((0.6..=0.95).contains(&p.motivation_rho));
            assert!((0.2..=0.8).contains(&p.optimal_difficulty));
        }
    }

    #[test]
    fn lru_eviction_bounds_map() {
        let mgr = UserParamsManager::new(10, i64::MAX);
        for i in 0..30 {
            mgr.update(&format!("u{i}"), true, 0.0, 0.0, 0.5);
        }
        assert!(mgr.tracked_users() <= 10);
    }

    #[test]
    fn ttl_sweep_removes_idle_users() {
        let mgr = UserParamsManager::new(100, 1000);
        mgr.update("u1", true, 0.0, 0.0, 0.5);
        let later = chrono::Utc::now().timestamp_millis() + 10_000;
        assert_eq!(mgr.sweep_expired(later), 1);
        assert_eq!(mgr.tracked_users(), 0);
    }

    #[test]
    fn unknown_user_gets_defaults() {
        let mgr = UserParamsManager::new(10, i64::MAX);
        assert_eq!(mgr.get("nobody"), UserParams::default());
    }
}
