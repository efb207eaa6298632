use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::amas::config::ModelingConfig;
use crate::amas::types::{CognitiveProfile, TrendState};

/// 趋势分析器：能力序列取 0.7·mem + 0.3·stability，
/// 比较近期与早期窗口均值：±10% 判升降，±5% 以内为平，
/// 其余（5%-10% 的缓慢波动）视为停滞。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendAnalyzer {
    history: VecDeque<f64>,
    current: TrendState,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self {
            history: VecDeque::new(),
            current: TrendState::Flat,
        }
    }
}

impl TrendAnalyzer {
    pub fn update(&mut self, cognitive: &CognitiveProfile, config: &ModelingConfig) -> TrendState {
        let ability = 0.7 * cognitive.mem + 0.3 * cognitive.stability;
        self.history.push_back(ability);
        while self.history.len() > config.trend_window {
            self.history.pop_front();
        }

        if self.history.len() < 6 {
            self.current = TrendState::Flat;
            return self.current;
        }

        let n = self.history.len();
        let half = n / 2;
        let early: f64 = self.history.iter().take(half).sum::<f64>() / half as f64;
        let late: f64 = self.history.iter().skip(n - half).sum::<f64>() / half as f64;

        if early.abs() < 1e-9 {
            self.current = TrendState::Flat;
            return self.current;
        }

        let change = (late - early) / early;
        self.current = if change > config.trend_up_threshold {
            TrendState::Up
        } else if change < config.trend_down_threshold {
            TrendState::Down
        } else if change.abs() <= config.trend_flat_threshold {
            TrendState::Flat
        } else {
            TrendState::Stuck
        };
        self.current
    }

    pub fn current(&self) -> TrendState {
        self.current
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.current = TrendState::Flat;
    }
}
