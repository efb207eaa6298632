pub mod attention;
pub mod cognitive;
pub mod fatigue;
pub mod motivation;
pub mod trend;

use serde::{Deserialize, Serialize};

use crate::amas::config::ModelingConfig;
use crate::amas::params::UserParams;
use crate::amas::types::{FeatureVector, RawEvent, TrendState, UserState};

pub use attention::AttentionMonitor;
pub use cognitive::CognitiveProfiler;
pub use fatigue::FatigueEstimator;
pub use motivation::MotivationTracker;
pub use trend::TrendAnalyzer;

/// 每用户建模套件：五个估计器及其内部历史。
/// 与 UserState 一同持久化到算法状态树。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelingSuite {
    pub attention: AttentionMonitor,
    pub fatigue: FatigueEstimator,
    pub cognitive: CognitiveProfiler,
    pub motivation: MotivationTracker,
    pub trend: TrendAnalyzer,
}

impl ModelingSuite {
    /// 按感知向量推进五个估计器，返回新的用户状态。
    /// conf 单调增长 0.01/次，封顶 1.0；所有分量收口到声明范围。
    pub fn update(
        &mut self,
        previous: &UserState,
        event: &RawEvent,
        feature: &FeatureVector,
        config: &ModelingConfig,
        params: &UserParams,
        trend_enabled: bool,
    ) -> UserState {
        let attention = self.attention.update(
            &feature.values[..feature.values.len().min(8)],
            &config.attention_weights,
            config.attention_beta,
        );
        let fatigue = self.fatigue.update(
            event.is_correct,
            event.response_time,
            event.timestamp,
            config,
            params.fatigue_k,
        );
        let cognitive = self
            .cognitive
            .update(event.is_correct, event.response_time, config);
        let motivation = self.motivation.update(
            event.is_correct,
            event.is_quit,
            config,
            params.motivation_rho,
        );
        let trend = if trend_enabled {
            self.trend.update(&cognitive, config)
        } else {
            TrendState::Flat
        };

        let mut state = UserState {
            attention,
            fatigue,
            cognitive,
            motivation,
            trend,
            conf: (previous.conf + 0.01).min(1.0),
            ts: event.timestamp,
        };
        state.clamp_in_place();
        state
    }

    pub fn reset(&mut self) {
        self.attention.reset();
        self.fatigue.reset();
        self.cognitive.reset();
        self.motivation.reset();
        self.trend.reset();
    }
}
