use crate::amas::config::ColdStartConfig;
use crate::amas::decision::mapper;
use crate::amas::types::{
    ColdStartPhase, ColdStartState, DecisionCandidate, LearnerId, ProbeResult, StrategyParams,
    UserType, PROBE_SEQUENCE,
};

/// 三阶段冷启动控制器：classify（探针分型）→ explore（落点试探）→ normal（交还集成）。
/// 探针走完即可分型，classify_updates 是未走完探针时的兜底上限。
pub struct ColdStartController {
    config: ColdStartConfig,
    state: ColdStartState,
}

/// 冷启动选择输出：动作、进度与置信度
#[derive(Debug, Clone)]
pub struct ColdStartSelection {
    pub candidate: DecisionCandidate,
    pub progress: f64,
}

impl ColdStartController {
    pub fn new(config: ColdStartConfig) -> Self {
        Self {
            config,
            state: ColdStartState::default(),
        }
    }

    pub fn from_state(config: ColdStartConfig, state: ColdStartState) -> Self {
        Self { config, state }
    }

    pub fn phase(&self) -> ColdStartPhase {
        self.state.phase
    }

    pub fn state(&self) -> &ColdStartState {
        &self.state
    }

    pub fn user_type(&self) -> Option<UserType> {
        self.state.user_type
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.state.phase, ColdStartPhase::Normal)
    }

    /// 进度 ∈ [0,1]：更新数相对 explore 阈值
    pub fn progress(&self) -> f64 {
        (self.state.update_count as f64 / self.config.explore_updates as f64).clamp(0.0, 1.0)
    }

    fn recent_error_rate(&self) -> f64 {
        if self.state.results.is_empty() {
            return 0.0;
        }
        let errors = self.state.results.iter().filter(|r| !r.is_correct).count();
        errors as f64 / self.state.results.len() as f64
    }

    /// 当前阶段应执行的动作。normal 阶段返回 None，交还集成层。
    pub fn select_action(&self) -> Option<ColdStartSelection> {
        let action_index = match self.state.phase {
            ColdStartPhase::Classify => {
                PROBE_SEQUENCE[self.state.probe_index.min(PROBE_SEQUENCE.len() - 1)]
            }
            ColdStartPhase::Explore => {
                let settled = self.state.settled_strategy.clone().unwrap_or_else(|| {
                    StrategyParams::for_user_type(self.state.user_type.unwrap_or_default())
                });
                mapper::nearest_action_index(&settled)
            }
            ColdStartPhase::Normal => return None,
        };

        let progress = self.progress();
        let confidence =
            ((0.3 + 0.7 * progress) * (1.0 - 0.5 * self.recent_error_rate())).clamp(0.0, 1.0);

        Some(ColdStartSelection {
            candidate: DecisionCandidate {
                learner: LearnerId::Coldstart,
                action_index,
                score: progress,
                confidence,
                explanation: format!(
                    "{} phase, probe {}/{}",
                    self.state.phase.as_str(),
                    self.state.probe_index.min(PROBE_SEQUENCE.len()),
                    PROBE_SEQUENCE.len()
                ),
            },
            progress,
        })
    }

    /// 记录一次交互结果并推进阶段机
    pub fn update(&mut self, reward: f64, is_correct: bool, response_time: i64) {
        self.state.update_count += 1;

        if matches!(self.state.phase, ColdStartPhase::Classify) {
            let executed = PROBE_SEQUENCE[self.state.probe_index.min(PROBE_SEQUENCE.len() - 1)];
            let error_rate = {
                let errors = self
                    .state
                    .results
                    .iter()
                    .filter(|r| !r.is_correct)
                    .count()
                    + usize::from(!is_correct);
                errors as f64 / (self.state.results.len() + 1) as f64
            };
            self.state.results.push(ProbeResult {
                action_index: executed,
                reward,
                is_correct,
                response_time,
                error_rate,
            });
            while self.state.results.len() > self.config.max_results {
                self.state.results.remove(0);
            }
            self.state.probe_index += 1;

            let probes_done = self.state.probe_index >= PROBE_SEQUENCE.len();
            let budget_spent = self.state.update_count >= self.config.classify_updates;
            if probes_done || budget_spent {
                self.classify();
            }
        } else if matches!(self.state.phase, ColdStartPhase::Explore) {
            self.state.results.push(ProbeResult {
                action_index: self
                    .state
                    .settled_strategy
                    .as_ref()
                    .map(mapper::nearest_action_index)
                    .unwrap_or(PROBE_SEQUENCE[0]),
                reward,
                is_correct,
                response_time,
                error_rate: self.recent_error_rate(),
            });
            while self.state.results.len() > self.config.max_results {
                self.state.results.remove(0);
            }

            if self.state.update_count >= self.config.explore_updates
                && self.state.probe_index >= PROBE_SEQUENCE.len()
                && self.state.settled_strategy.is_some()
            {
                self.state.phase = ColdStartPhase::Normal;
            }
        }
    }

    /// 探针统计 → 用户分型 → 落点策略
    fn classify(&mut self) {
        let results = &self.state.results;
        let n = results.len().max(1) as f64;
        let accuracy = results.iter().filter(|r| r.is_correct).count() as f64 / n;
        let avg_rt = results.iter().map(|r| r.response_time as f64).sum::<f64>() / n;
        let avg_error_rate = results.iter().map(|r| r.error_rate).sum::<f64>() / n;

        let cfg = &self.config;
        let user_type = if accuracy >= cfg.fast_accuracy
            && avg_rt <= cfg.fast_rt_ms as f64
            && avg_error_rate <= cfg.fast_error_rate
        {
            UserType::Fast
        } else if accuracy >= cfg.stable_accuracy
            && avg_rt <= cfg.stable_rt_ms as f64
            && avg_error_rate <= cfg.stable_error_rate
        {
            UserType::Stable
        } else {
            UserType::Cautious
        };

        self.state.user_type = Some(user_type);
        self.state.settled_strategy = Some(StrategyParams::for_user_type(user_type));
        self.state.phase = ColdStartPhase::Explore;
        tracing::debug!(user_type = ?user_type, accuracy, avg_rt, "Cold start classified");
    }

    pub fn into_state(self) -> ColdStartState {
        self.state
    }
}

impl Default for ColdStartController {
    fn default() -> Self {
        Self::new(ColdStartConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::ACTION_SPACE;

    fn drive(controller: &mut ColdStartController, n: usize, correct: bool, rt: i64) {
        for _ in 0..n {
            controller.update(if correct { 1.0 } else { -0.5 }, correct, rt);
        }
    }

    #[test]
    fn starts_in_classify_with_first_probe() {
        let c = ColdStartController::default();
        assert_eq!(c.phase(), ColdStartPhase::Classify);
        let selection = c.select_action().unwrap();
        assert_eq!(selection.candidate.action_index, PROBE_SEQUENCE[0]);
    }

    #[test]
    fn fast_user_classified_after_five_probes() {
        let mut c = ColdStartController::default();
        drive(&mut c, 5, true, 1200);
        assert_eq!(c.phase(), ColdStartPhase::Explore);
        assert_eq!(c.user_type(), Some(UserType::Fast));

        // explore 阶段落在 challenge 动作上
        let selection = c.select_action().unwrap();
        assert_eq!(
            selection.candidate.action_index,
            StrategyParams::settled_action_index(UserType::Fast)
        );
        let action = ACTION_SPACE[selection.candidate.action_index];
        assert_eq!(action.difficulty.as_str(), "hard");
        assert!((action.new_ratio - 0.35).abs() < 1e-9);
    }

    #[test]
    fn slow_wrong_user_classified_cautious() {
        let mut c = ColdStartController::default();
        drive(&mut c, 5, false, 6000);
        assert_eq!(c.user_type(), Some(UserType::Cautious));
        let selection = c.select_action().unwrap();
        assert_eq!(
            selection.candidate.action_index,
            StrategyParams::settled_action_index(UserType::Cautious)
        );
    }

    #[test]
    fn medium_user_classified_stable() {
        let mut c = ColdStartController::default();
        drive(&mut c, 1, false, 2500);
        drive(&mut c, 4, true, 2500);
        assert_eq!(c.user_type(), Some(UserType::Stable));
    }

    #[test]
    fn explore_completes_at_threshold() {
        let mut c = ColdStartController::default();
        drive(&mut c, 5, true, 1200);
        assert_eq!(c.phase(), ColdStartPhase::Explore);
        drive(&mut c, 44, true, 1200);
        assert_eq!(c.phase(), ColdStartPhase::Explore);
        drive(&mut c, 1, true, 1200);
        assert_eq!(c.phase(), ColdStartPhase::Normal);
        assert!(c.is_complete());
        assert!(c.select_action().is_none());
    }

    #[test]
    fn results_ring_buffer_is_bounded() {
        let mut c = ColdStartController::default();
        drive(&mut c, 40, true, 1500);
        assert!(c.state().results.len() <= ColdStartConfig::default().max_results);
    }

    #[test]
    fn progress_and_confidence_in_range() {
        let mut c = ColdStartController::default();
        for _ in 0..30 {
            let selection = c.select_action();
            if let Some(s) = selection {
                assert!((0.0..=1.0).contains(&s.progress));
                assert!((0.0..=1.0).contains(&s.candidate.confidence));
            }
            c.update(0.5, true, 2000);
        }
    }

    #[test]
    fn state_roundtrip_through_serde() {
        let mut c = ColdStartController::default();
        drive(&mut c, 7, true, 1400);
        let state = c.state().clone();
        let json = serde_json::to_string(&state).unwrap();
        let restored: ColdStartState = serde_json::from_str(&json).unwrap();
        let c2 = ColdStartController::from_state(ColdStartConfig::default(), restored);
        assert_eq!(c2.phase(), c.phase());
        assert_eq!(c2.user_type(), c.user_type());
    }
}
