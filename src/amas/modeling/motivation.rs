use serde::{Deserialize, Serialize};

use crate::amas::config::ModelingConfig;

/// 动机跟踪器：M ∈ [-1,1]，记忆系数 motivationRho 每用户可调。
/// 输入为成功 / 失败 / 退出信号，连续成功有小幅连击加成。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotivationTracker {
    current: f64,
    streak: u32,
}

impl Default for MotivationTracker {
    fn default() -> Self {
        Self {
            current: 0.0,
            streak: 0,
        }
    }
}

impl MotivationTracker {
    pub fn update(
        &mut self,
        is_correct: bool,
        is_quit: bool,
        config: &ModelingConfig,
        motivation_rho: f64,
    ) -> f64 {
        let rho = motivation_rho.clamp(0.6, 0.95);
        if is_quit {
            self.current = rho * self.current - config.motivation_mu;
            self.streak = 0;
        } else if is_correct {
            self.streak += 1;
            let streak_bonus = (self.streak as f64 / 10.0).min(0.5) * config.motivation_kappa;
            self.current = rho * self.current + config.motivation_kappa + streak_bonus;
        } else {
            self.streak = 0;
            self.current = rho * self.current - config.motivation_lambda;
        }

        self.current = self.current.clamp(-1.0, 1.0);
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn set_value(&mut self, value: f64) {
        self.current = value.clamp(-1.0, 1.0);
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
        self.streak = 0;
    }
}
