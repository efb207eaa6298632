use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::amas::config::ModelingConfig;

const HISTORY_CAP: usize = 10;

/// 疲劳估计器输出 F ∈ [0,1]，由错误率趋势、响应时间上升率和
/// 连续错误驱动，EMA 平滑。每用户 fatigueK 控制恢复速率。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FatigueEstimator {
    current: f64,
    recent_corrects: VecDeque<bool>,
    recent_rts: VecDeque<f64>,
    repeat_errors: u32,
    last_event_ms: Option<i64>,
}

impl Default for FatigueEstimator {
    fn default() -> Self {
        Self {
            current: 0.0,
            recent_corrects: VecDeque::new(),
            recent_rts: VecDeque::new(),
            repeat_errors: 0,
            last_event_ms: None,
        }
    }
}

impl FatigueEstimator {
    pub fn update(
        &mut self,
        is_correct: bool,
        response_time_ms: i64,
        event_ts_ms: i64,
        config: &ModelingConfig,
        fatigue_k: f64,
    ) -> f64 {
        // 休息时间衰减：长休息完全重置，短休息指数衰减
        if let Some(last) = self.last_event_ms {
            let gap_minutes = ((event_ts_ms - last).max(0) as f64) / 60_000.0;
            if gap_minutes >= config.fatigue_long_break_minutes {
                self.reset();
            } else if gap_minutes > 5.0 {
                self.current *= (-gap_minutes / 10.0).exp();
            }
        }
        self.last_event_ms = Some(event_ts_ms);

        if is_correct {
            self.repeat_errors = 0;
        } else {
            self.repeat_errors += 1;
        }
        push_capped(&mut self.recent_corrects, is_correct);
        push_capped(&mut self.recent_rts, response_time_ms as f64);

        let error_trend = self.error_rate_trend().max(0.0);
        let rt_rate = self.rt_increase_rate(config.cognitive_speed_baseline_ms).max(0.0);
        let repeat = (self.repeat_errors as f64 / 3.0).min(1.0);

        let delta = config.fatigue_beta * error_trend
            + config.fatigue_gamma * rt_rate
            + config.fatigue_delta * repeat;

        let decay = (-fatigue_k.clamp(0.02, 0.2)).exp();
        self.current = (self.current * decay + delta).clamp(0.0, 1.0);
        self.current
    }

    /// 近半窗口错误率相对前半窗口的增量；样本不足时退化为当前错误率
    fn error_rate_trend(&self) -> f64 {
        let n = self.recent_corrects.len();
        if n == 0 {
            return 0.0;
        }
        let err = |it: &mut dyn Iterator<Item = &bool>, count: usize| -> f64 {
            if count == 0 {
                return 0.0;
            }
            it.filter(|c| !**c).count() as f64 / count as f64
        };
        if n < 4 {
            return err(&mut self.recent_corrects.iter(), n);
        }
        let half = n / 2;
        let early = err(&mut self.recent_corrects.iter().take(half), half);
        let late = err(&mut self.recent_corrects.iter().skip(n - half), half);
        (late - early).max(late * 0.5)
    }

    /// 响应时间上升率；首个事件相对全局基准
    fn rt_increase_rate(&self, baseline_ms: f64) -> f64 {
        let n = self.recent_rts.len();
        if n == 0 {
            return 0.0;
        }
        if n < 4 {
            let latest = *self.recent_rts.back().unwrap_or(&baseline_ms);
            return ((latest - baseline_ms) / baseline_ms.max(1.0)).clamp(0.0, 1.0);
        }
        let half = n / 2;
        let early: f64 = self.recent_rts.iter().take(half).sum::<f64>() / half as f64;
        let late: f64 = self.recent_rts.iter().skip(n - half).sum::<f64>() / half as f64;
        if early <= 1.0 {
            return 0.0;
        }
        ((late - early) / early).clamp(0.0, 1.0)
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn set_value(&mut self, value: f64) {
        self.current = value.clamp(0.0, 1.0);
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
        self.recent_corrects.clear();
        self.recent_rts.clear();
        self.repeat_errors = 0;
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, value: T) {
    queue.push_back(value);
    while queue.len() > HISTORY_CAP {
        queue.pop_front();
    }
}
