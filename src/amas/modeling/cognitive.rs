use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::amas::config::ModelingConfig;
use crate::amas::types::CognitiveProfile;

/// 认知画像：mem / speed / stability ∈ [0,1]，由正确率、平均响应
/// 时间和错误方差 p(1-p) 做贝叶斯式增量更新。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveProfiler {
    profile: CognitiveProfile,
    accuracy_history: VecDeque<f64>,
}

impl Default for CognitiveProfiler {
    fn default() -> Self {
        Self {
            profile: CognitiveProfile::default(),
            accuracy_history: VecDeque::new(),
        }
    }
}

impl CognitiveProfiler {
    pub fn update(
        &mut self,
        is_correct: bool,
        response_time_ms: i64,
        config: &ModelingConfig,
    ) -> CognitiveProfile {
        let alpha = config.cognitive_alpha;
        let accuracy = if is_correct { 1.0 } else { 0.0 };

        self.accuracy_history.push_back(accuracy);
        while self.accuracy_history.len() > config.cognitive_stability_window {
            self.accuracy_history.pop_front();
        }

        self.profile.mem = alpha * accuracy + (1.0 - alpha) * self.profile.mem;

        let normalized_speed = 1.0
            - (response_time_ms as f64 / config.cognitive_speed_baseline_ms / 3.0).min(1.0);
        self.profile.speed = alpha * normalized_speed + (1.0 - alpha) * self.profile.speed;

        // 错误方差 p(1-p)：正确率越接近 0.5 方差越大，稳定性越低
        let stability = if self.accuracy_history.len() >= 3 {
            let p = self.accuracy_history.iter().sum::<f64>()
                / self.accuracy_history.len() as f64;
            1.0 - (p * (1.0 - p) * 4.0).min(1.0)
        } else {
            0.5
        };
        self.profile.stability = alpha * stability + (1.0 - alpha) * self.profile.stability;

        self.profile.mem = self.profile.mem.clamp(0.0, 1.0);
        self.profile.speed = self.profile.speed.clamp(0.0, 1.0);
        self.profile.stability = self.profile.stability.clamp(0.0, 1.0);

        self.profile.clone()
    }

    pub fn current(&self) -> &CognitiveProfile {
        &self.profile
    }

    pub fn reset(&mut self) {
        self.profile = CognitiveProfile::default();
        self.accuracy_history.clear();
    }
}
