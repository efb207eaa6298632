use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::amas::config::PerceptionConfig;
use crate::amas::types::{FeatureVector, RawEvent};

/// 感知特征标签，顺序稳定，与输出向量一一对应
pub const FEATURE_LABELS: [&str; 10] = [
    "z_rt_mean",
    "z_rt_cv",
    "z_pace_cv",
    "z_pause",
    "z_switch",
    "z_drift",
    "z_interaction",
    "z_focus_loss",
    "retry_norm",
    "correctness",
];

const RT_MIN_MS: i64 = 1;
const RT_MAX_MS: i64 = 120_000;
const DWELL_MAX_MS: i64 = 120_000;
const PAUSE_MAX: i32 = 20;
const SWITCH_MAX: i32 = 20;
const RETRY_MAX: i32 = 100;
const FOCUS_LOSS_MAX_MS: i64 = 600_000;
const INTERACTION_MAX: f64 = 10.0;

#[derive(Debug, Default)]
struct RollingWindow {
    values: VecDeque<f64>,
}

impl RollingWindow {
    fn push(&mut self, value: f64, cap: usize) {
        self.values.push_back(value);
        while self.values.len() > cap {
            self.values.pop_front();
        }
    }

    fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    fn std(&self) -> f64 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let var = self.values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / self.values.len() as f64;
        var.sqrt()
    }

    /// 变异系数 σ/|μ|，窗口不足或均值接近零时返回 0
    fn cv(&self) -> f64 {
        let mean = self.mean();
        if self.values.len() < 2 || mean.abs() < 1e-9 {
            return 0.0;
        }
        self.std() / mean.abs()
    }

    /// 近半窗与前半窗均值之差，反映窗口内漂移
    fn drift(&self) -> f64 {
        let n = self.values.len();
        if n < 4 {
            return 0.0;
        }
        let half = n / 2;
        let early: f64 = self.values.iter().take(half).sum::<f64>() / half as f64;
        let late: f64 =
            self.values.iter().skip(n - half).sum::<f64>() / half as f64;
        late - early
    }
}

#[derive(Debug, Default)]
struct UserWindows {
    response_time: RollingWindow,
    dwell: RollingWindow,
    pause: RollingWindow,
    switch: RollingWindow,
    focus_loss: RollingWindow,
    interaction: RollingWindow,
    last_seen_ms: i64,
}

/// 感知层：清洗原始事件并维护每用户滚动窗口，产出定宽特征向量。
/// 任何非有限的中间量落回 0，完整向量恒为有限。
pub struct FeatureBuilder {
    config: PerceptionConfig,
    windows: Mutex<HashMap<String, UserWindows>>,
}

impl FeatureBuilder {
    pub fn new(config: PerceptionConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// 异常事件在边界处拒绝，直接走降级路径，不触碰模型状态
    pub fn is_anomalous(&self, event: &RawEvent) -> bool {
        if event.response_time <= 0 || event.response_time > RT_MAX_MS {
            return true;
        }
        if event.pause_count < 0 || event.pause_count > PAUSE_MAX {
            return true;
        }
        if event.switch_count < 0 || event.switch_count > SWITCH_MAX {
            return true;
        }
        if event.retry_count < 0 || event.retry_count > RETRY_MAX {
            return true;
        }
        if let Some(dwell) = event.dwell_time {
            if !(0..=DWELL_MAX_MS).contains(&dwell) {
                return true;
            }
        }
        if let Some(focus) = event.focus_loss_duration {
            if !(0..=FOCUS_LOSS_MAX_MS).contains(&focus) {
                return true;
            }
        }
        if let Some(density) = event.interaction_density {
            if !density.is_finite() || !(0.0..=INTERACTION_MAX).contains(&density) {
                return true;
            }
        }
        false
    }

    /// 将每个数值字段钳制到声明范围
    pub fn sanitize(&self, event: &RawEvent) -> RawEvent {
        let mut out = event.clone();
        out.response_time = out.response_time.clamp(RT_MIN_MS, RT_MAX_MS);
        out.pause_count = out.pause_count.clamp(0, PAUSE_MAX);
        out.switch_count = out.switch_count.clamp(0, SWITCH_MAX);
        out.retry_count = out.retry_count.clamp(0, RETRY_MAX);
        out.dwell_time = out.dwell_time.map(|v| v.clamp(0, DWELL_MAX_MS));
        out.focus_loss_duration = out.focus_loss_duration.map(|v| v.clamp(0, FOCUS_LOSS_MAX_MS));
        out.interaction_density = out.interaction_density.map(|v| {
            if v.is_finite() {
                v.clamp(0.0, INTERACTION_MAX)
            } else {
                0.0
            }
        });
        out
    }

    /// 清洗事件、推进该用户的滚动窗口并产出 10 维特征向量
    pub fn build_feature_vector(&self, event: &RawEvent, user_id: &str) -> FeatureVector {
        let event = self.sanitize(event);
        let cfg = &self.config;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut map = self.windows.lock().expect("perception windows lock");
        let windows = map.entry(user_id.to_string()).or_default();
        windows.last_seen_ms = now_ms;

        let cap = cfg.window_size;
        windows.response_time.push(event.response_time as f64, cap);
        windows
            .dwell
            .push(event.dwell_time.unwrap_or(0) as f64, cap);
        windows.pause.push(event.pause_count as f64, cap);
        windows.switch.push(event.switch_count as f64, cap);
        windows
            .focus_loss
            .push(event.focus_loss_duration.unwrap_or(0) as f64, cap);
        windows
            .interaction
            .push(event.interaction_density.unwrap_or(cfg.interaction_mean), cap);

        // 位置特征按全局基准 z-score，稳定性特征用用户窗口的变异系数
        let z = |x: f64, mean: f64, std: f64| (x - mean) / std;

        let z_rt_mean = z(windows.response_time.mean(), cfg.rt_mean_ms, cfg.rt_std_ms);
        let z_rt_cv = windows.response_time.cv();
        let z_pace_cv = windows.dwell.cv();
        let z_pause = z(windows.pause.mean(), cfg.pause_mean, cfg.pause_std);
        let z_switch = z(windows.switch.mean(), cfg.switch_mean, cfg.switch_std);
        let z_drift = windows.response_time.drift() / cfg.rt_std_ms;
        let z_interaction = z(
            windows.interaction.mean(),
            cfg.interaction_mean,
            cfg.interaction_std,
        );
        let z_focus_loss = z(
            windows.focus_loss.mean(),
            cfg.focus_loss_mean_ms,
            cfg.focus_loss_std_ms,
        );
        let retry_norm = ((event.retry_count as f64) / 3.0).min(1.0);
        let correctness = if event.is_correct { 1.0 } else { -1.0 };

        drop(map);

        let values: Vec<f64> = [
            z_rt_mean,
            z_rt_cv,
            z_pace_cv,
            z_pause,
            z_switch,
            z_drift,
            z_interaction,
            z_focus_loss,
            retry_norm,
            correctness,
        ]
        .iter()
        .map(|v| if v.is_finite() { *v } else { 0.0 })
        .collect();
        debug_assert_eq!(values.len(), crate::constants::PERCEPTION_DIM);

        FeatureVector::new(
            values,
            FEATURE_LABELS.iter().map(|s| s.to_string()).collect(),
            "z-score",
        )
    }

    /// 重置单个用户或全部用户的滚动窗口
    pub fn reset_windows(&self, user_id: Option<&str>) {
        let mut map = self.windows.lock().expect("perception windows lock");
        match user_id {
            Some(id) => {
                map.remove(id);
            }
            None => map.clear(),
        }
    }

    /// TTL 清扫，返回清除的用户数
    pub fn sweep_expired(&self, now_ms: i64) -> usize {
        let ttl = self.config.window_ttl_ms;
        let mut map = self.windows.lock().expect("perception windows lock");
        let before = map.len();
        map.retain(|_, w| now_ms - w.last_seen_ms < ttl);
        before - map.len()
    }

    pub fn tracked_users(&self) -> usize {
        self.windows.lock().expect("perception windows lock").len()
    }
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(PerceptionConfig::default())
    }
}
