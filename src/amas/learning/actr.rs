use crate::amas::config::ActrConfig;
use crate::amas::types::{Action, DecisionCandidate, LearnerId, WordReviewHistory};

/// ACT-R 式记忆激活模型。
/// 激活 A = ln(Σ tᵢ^{-d})，经 logistic 映射为召回概率；
/// 召回概率决定当前能承受的认知负载，按负载匹配度给动作打分。
/// 复习轨迹为请求作用域，不跨请求持久化。
#[derive(Debug, Clone)]
pub struct ActrMemory {
    config: ActrConfig,
}

impl ActrMemory {
    pub fn new(config: ActrConfig) -> Self {
        Self { config }
    }

    /// 基于最近复习轨迹的激活值；空轨迹返回 None
    pub fn activation(&self, trace: &[WordReviewHistory]) -> Option<f64> {
        let mut sum = 0.0;
        let mut count = 0usize;
        for entry in trace.iter().take(self.config.max_trace_len) {
            let age_secs = entry.seconds_ago.max(1) as f64;
            // 错误的复习对激活的贡献减半
            let weight = match entry.is_correct {
                Some(false) => 0.5,
                _ => 1.0,
            };
            sum += weight * age_secs.powf(-self.config.decay);
            count += 1;
        }
        if count == 0 || sum <= 0.0 {
            return None;
        }
        Some(sum.ln())
    }

    /// P(recall) = 1 / (1 + exp((τ - A)/s))
    pub fn recall_probability(&self, trace: &[WordReviewHistory]) -> f64 {
        match self.activation(trace) {
            None => 0.5,
            Some(activation) => {
                let exponent = (self.config.threshold - activation) / self.config.noise;
                (1.0 / (1.0 + exponent.exp())).clamp(0.0, 1.0)
            }
        }
    }

    /// 动作的认知负载 ∈ [0,1]
    fn action_load(action: &Action) -> f64 {
        let ratio_norm = (action.new_ratio - 0.1) / 0.3;
        let batch_norm = (action.batch_size as f64 - 5.0) / 11.0;
        0.4 * action.difficulty.encoded() + 0.4 * ratio_norm + 0.2 * batch_norm
    }

    /// 召回越稳，可承受负载越高；取负载与召回的匹配度最高者
    pub fn select_action(
        &self,
        trace: &[WordReviewHistory],
        actions: &[Action],
    ) -> Option<DecisionCandidate> {
        if actions.is_empty() {
            return None;
        }

        let recall = self.recall_probability(trace);
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (idx, action) in actions.iter().enumerate() {
            let score = 1.0 - (Self::action_load(action) - recall).abs();
            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        let n = trace.len().min(self.config.max_trace_len) as f64;
        let confidence = if trace.is_empty() {
            0.2
        } else {
            (n / (n + 5.0)).clamp(0.2, 0.9)
        };

        Some(DecisionCandidate {
            learner: LearnerId::Actr,
            action_index: best_idx,
            score: best_score,
            confidence,
            explanation: format!("recall={recall:.2} over {} trace entries", trace.len()),
        })
    }
}

impl Default for ActrMemory {
    fn default() -> Self {
        Self::new(ActrConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::ACTION_SPACE;

    fn entry(seconds_ago: i64, is_correct: bool) -> WordReviewHistory {
        WordReviewHistory {
            seconds_ago,
            is_correct: Some(is_correct),
        }
    }

    #[test]
    fn empty_trace_gives_neutral_recall() {
        let m = ActrMemory::default();
        assert_eq!(m.recall_probability(&[]), 0.5);
    }

    #[test]
    fn recent_reviews_raise_recall() {
        let m = ActrMemory::default();
        let fresh = vec![entry(10, true), entry(60, true), entry(300, true)];
        let stale = vec![entry(86_400 * 7, true)];
        assert!(m.recall_probability(&fresh) > m.recall_probability(&stale));
    }

    #[test]
    fn recall_is_bounded() {
        let m = ActrMemory::default();
        let trace: Vec<_> = (0..100).map(|i| entry(1 + i, true)).collect();
        let p = m.recall_probability(&trace);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn wrong_reviews_weigh_less() {
        let m = ActrMemory::default();
        let right = vec![entry(60, true), entry(120, true)];
        let wrong = vec![entry(60, false), entry(120, false)];
        assert!(m.recall_probability(&right) > m.recall_probability(&wrong));
    }

    #[test]
    fn strong_recall_prefers_heavier_actions() {
        let m = ActrMemory::default();
        let fresh: Vec<_> = (0..10).map(|i| entry(5 + i, true)).collect();
        let strong = m.select_action(&fresh, &ACTION_SPACE).unwrap();
        let weak = m.select_action(&[entry(86_400 * 30, false)], &ACTION_SPACE).unwrap();
        let strong_load = ActrMemory::action_load(&ACTION_SPACE[strong.action_index]);
        let weak_load = ActrMemory::action_load(&ACTION_SPACE[weak.action_index]);
        assert!(strong_load >= weak_load);
    }

    #[test]
    fn confidence_grows_with_trace_length() {
        let m = ActrMemory::default();
        let short = m.select_action(&[entry(60, true)], &ACTION_SPACE).unwrap();
        let long_trace: Vec<_> = (0..20).map(|i| entry(60 + i, true)).collect();
        let long = m.select_action(&long_trace, &ACTION_SPACE).unwrap();
        assert!(long.confidence > short.confidence);
    }

    #[test]
    fn empty_action_set_returns_none() {
        let m = ActrMemory::default();
        assert!(m.select_action(&[], &[]).is_none());
    }
}
