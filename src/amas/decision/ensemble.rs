use serde::{Deserialize, Serialize};

use crate::amas::config::EnsembleConfig;
use crate::amas::types::{DecisionCandidate, LearnerId};

pub const MEMBERS: [LearnerId; 4] = [
    LearnerId::Linucb,
    LearnerId::Thompson,
    LearnerId::Actr,
    LearnerId::Heuristic,
];

/// 集成权重。不变式：和为 1（±1e-6），每项 ∈ [min_weight, 1]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleWeights {
    pub linucb: f64,
    pub thompson: f64,
    pub actr: f64,
    pub heuristic: f64,
}

impl EnsembleWeights {
    pub fn from_config(config: &EnsembleConfig) -> Self {
        let mut w = Self {
            linucb: config.initial_weight_linucb,
            thompson: config.initial_weight_thompson,
            actr: config.initial_weight_actr,
            heuristic: config.initial_weight_heuristic,
        };
        w.enforce_simplex(config.min_weight);
        w
    }

    pub fn get(&self, member: LearnerId) -> f64 {
        match member {
            LearnerId::Linucb => self.linucb,
            LearnerId::Thompson => self.thompson,
            LearnerId::Actr => self.actr,
            LearnerId::Heuristic => self.heuristic,
            _ => 0.0,
        }
    }

    fn get_mut(&mut self, member: LearnerId) -> Option<&mut f64> {
        match member {
            LearnerId::Linucb => Some(&mut self.linucb),
            LearnerId::Thompson => Some(&mut self.thompson),
            LearnerId::Actr => Some(&mut self.actr),
            LearnerId::Heuristic => Some(&mut self.heuristic),
            _ => None,
        }
    }

    pub fn sum(&self) -> f64 {
        self.linucb + self.thompson + self.actr + self.heuristic
    }

    /// 归一化并抬升到下限；下限抬升后按比例压缩其余成员。
    /// 退化输入（全零或非有限）回落到均匀分布。
    pub fn enforce_simplex(&mut self, min_weight: f64) {
        for member in MEMBERS {
            let w = self.get_mut(member).expect("core member");
            if !w.is_finite() || *w <= 0.0 {
                *w = min_weight;
            }
        }

        let sum = self.sum();
        if !sum.is_finite() || sum <= 0.0 {
            self.linucb = 0.25;
            self.thompson = 0.25;
            self.actr = 0.25;
            self.heuristic = 0.25;
            return;
        }
        for member in MEMBERS {
            *self.get_mut(member).expect("core member") /= sum;
        }

        // 抬升低于下限的成员，并等比压缩其余；至多迭代成员数次即收敛
        for _ in 0..MEMBERS.len() {
            let floored: Vec<LearnerId> = MEMBERS
                .iter()
                .copied()
                .filter(|m| self.get(*m) < min_weight)
                .collect();
            if floored.is_empty() {
                break;
            }
            let free: Vec<LearnerId> = MEMBERS
                .iter()
                .copied()
                .filter(|m| !floored.contains(m))
                .collect();
            let free_mass: f64 = free.iter().map(|m| self.get(*m)).sum();
            let target_free_mass = 1.0 - min_weight * floored.len() as f64;
            for m in &floored {
                *self.get_mut(*m).expect("core member") = min_weight;
            }
            if free_mass > 0.0 && target_free_mass > 0.0 {
                let scale = target_free_mass / free_mass;
                for m in &free {
                    *self.get_mut(*m).expect("core member") *= scale;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnsembleDecision {
    pub action_index: usize,
    pub confidence: f64,
    /// 每个成员对胜出动作的贡献（解释层使用）
    pub contributions: Vec<(LearnerId, f64)>,
}

/// 加权投票：有效权重在参与成员间重归一，
/// 单成员贡献 = normW · tanh(score/2) · (0.5 + conf/2)，
/// 按动作聚合取贡献最大者。
pub fn decide(
    candidates: &[DecisionCandidate],
    weights: &EnsembleWeights,
) -> Option<EnsembleDecision> {
    let participating: Vec<&DecisionCandidate> = candidates
        .iter()
        .filter(|c| c.score.is_finite() && c.confidence.is_finite())
        .collect();
    if participating.is_empty() {
        return fallback(candidates);
    }

    let total_weight: f64 = participating.iter().map(|c| weights.get(c.learner)).sum();
    if total_weight <= 0.0 {
        return fallback(candidates);
    }

    // 按动作聚合，保持插入序以便平手取先出现者
    let mut groups: Vec<(usize, f64)> = Vec::new();
    let mut member_contribution: Vec<(LearnerId, usize, f64, f64)> = Vec::new();
    for c in &participating {
        let norm_weight = weights.get(c.learner) / total_weight;
        let contribution = norm_weight * (c.score / 2.0).tanh() * (0.5 + c.confidence / 2.0);
        member_contribution.push((c.learner, c.action_index, contribution, c.confidence));
        match groups.iter_mut().find(|(idx, _)| *idx == c.action_index) {
            Some((_, total)) => *total += contribution,
            None => groups.push((c.action_index, contribution)),
        }
    }

    let (winner, _) = groups
        .iter()
        .copied()
        .fold(None::<(usize, f64)>, |best, (idx, total)| match best {
            None => Some((idx, total)),
            Some((_, best_total)) if total > best_total => Some((idx, total)),
            Some(best) => Some(best),
        })?;

    // 胜出动作投票者的置信度按归一权重加权平均
    let mut conf_num = 0.0;
    let mut conf_den = 0.0;
    let mut contributions = Vec::new();
    for c in &participating {
        if c.action_index == winner {
            let norm_weight = weights.get(c.learner) / total_weight;
            conf_num += norm_weight * c.confidence;
            conf_den += norm_weight;
        }
    }
    for (learner, idx, contribution, _) in &member_contribution {
        if *idx == winner {
            contributions.push((*learner, *contribution));
        }
    }

    let confidence = if conf_den > 0.0 {
        (conf_num / conf_den).clamp(0.0, 1.0)
    } else {
        0.5
    };

    Some(EnsembleDecision {
        action_index: winner,
        confidence,
        contributions,
    })
}

/// 全员失败时按固定优先级回退：linucb → thompson → actr → heuristic
fn fallback(candidates: &[DecisionCandidate]) -> Option<EnsembleDecision> {
    for preferred in MEMBERS {
        if let Some(c) = candidates.iter().find(|c| c.learner == preferred) {
            return Some(EnsembleDecision {
                action_index: c.action_index,
                confidence: 0.3,
                contributions: vec![(c.learner, 0.0)],
            });
        }
    }
    None
}

/// 执行动作获得奖励后的指数权重更新。
/// 对齐系数 g：成员选中执行动作 +1，否则 -0.5；
/// 梯度 ∇ = r·g·(0.5 + conf/2)，w ← w·exp(η·∇·normW)；
/// 缺席成员乘性衰减。非有限梯度直接拒绝。
pub fn update_weights(
    weights: &mut EnsembleWeights,
    candidates: &[DecisionCandidate],
    executed_action_index: usize,
    reward: f64,
    config: &EnsembleConfig,
) {
    if !reward.is_finite() {
        return;
    }

    let participating: Vec<&DecisionCandidate> = candidates
        .iter()
        .filter(|c| c.score.is_finite() && c.confidence.is_finite())
        .collect();
    let total_weight: f64 = participating.iter().map(|c| weights.get(c.learner)).sum();

    if total_weight > 0.0 {
        for c in &participating {
            let alignment = if c.action_index == executed_action_index {
                1.0
            } else {
                -0.5
            };
            let gradient = reward * alignment * (0.5 + c.confidence / 2.0);
            if !gradient.is_finite() {
                continue;
            }
            let norm_weight = weights.get(c.learner) / total_weight;
            let factor = (config.eta * gradient * norm_weight).exp();
            if let Some(w) = weights.get_mut(c.learner) {
                let updated = *w * factor;
                if updated.is_finite() {
                    *w = updated;
                }
            }
        }
    }

    // 缺席成员衰减
    for member in MEMBERS {
        if !participating.iter().any(|c| c.learner == member) {
            if let Some(w) = weights.get_mut(member) {
                *w = (*w * config.absence_decay).max(config.min_weight);
            }
        }
    }

    weights.enforce_simplex(config.min_weight);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(learner: LearnerId, action: usize, score: f64, conf: f64) -> DecisionCandidate {
        DecisionCandidate {
            learner,
            action_index: action,
            score,
            confidence: conf,
            explanation: String::new(),
        }
    }

    fn weights() -> EnsembleWeights {
        EnsembleWeights::from_config(&EnsembleConfig::default())
    }

    fn assert_simplex(w: &EnsembleWeights) {
        assert!((w.sum() - 1.0).abs() < 1e-6, "sum was {}", w.sum());
        let min = EnsembleConfig::default().min_weight;
        for m in MEMBERS {
            assert!((min..=1.0).contains(&w.get(m)), "{m:?} = {}", w.get(m));
        }
    }

    #[test]
    fn initial_weights_form_simplex() {
        assert_simplex(&weights());
    }

    #[test]
    fn heavier_member_wins_vote() {
        let w = weights();
        let candidates = vec![
            candidate(LearnerId::Linucb, 3, 1.0, 0.9),
            candidate(LearnerId::Actr, 8, 1.0, 0.9),
        ];
        let decision = decide(&candidates, &w).unwrap();
        assert_eq!(decision.action_index, 3);
    }

    #[test]
    fn agreeing_members_outvote_single_heavy() {
        let w = weights();
        let candidates = vec![
            candidate(LearnerId::Linucb, 3, 1.0, 0.8),
            candidate(LearnerId::Thompson, 5, 1.0, 0.9),
            candidate(LearnerId::Actr, 5, 1.0, 0.9),
            candidate(LearnerId::Heuristic, 5, 1.0, 0.9),
        ];
        let decision = decide(&candidates, &w).unwrap();
        assert_eq!(decision.action_index, 5);
    }

    #[test]
    fn missing_members_are_renormalized() {
        let w = weights();
        // 只有权重较低的两员参与，依然能给出决策
        let candidates = vec![
            candidate(LearnerId::Actr, 2, 0.5, 0.6),
            candidate(LearnerId::Heuristic, 2, 0.5, 0.6),
        ];
        let decision = decide(&candidates, &w).unwrap();
        assert_eq!(decision.action_index, 2);
        assert!(decision.confidence > 0.0);
    }

    #[test]
    fn non_finite_candidates_fall_back() {
        let w = weights();
        let candidates = vec![
            candidate(LearnerId::Thompson, 4, f64::NAN, 0.5),
            candidate(LearnerId::Linucb, 6, f64::INFINITY, f64::NAN),
        ];
        // 全员非法 → 回退优先级取 linucb
        let decision = decide(&candidates, &w).unwrap();
        assert_eq!(decision.action_index, 6);
    }

    #[test]
    fn empty_candidates_give_none() {
        assert!(decide(&[], &weights()).is_none());
    }

    #[test]
    fn aligned_member_gains_weight() {
        let mut w = weights();
        let cfg = EnsembleConfig::default();
        let before = w.linucb;
        for _ in 0..10 {
            let candidates = vec![
                candidate(LearnerId::Linucb, 3, 1.0, 0.9),
                candidate(LearnerId::Thompson, 5, 1.0, 0.9),
                candidate(LearnerId::Actr, 6, 1.0, 0.9),
                candidate(LearnerId::Heuristic, 7, 1.0, 0.9),
            ];
            update_weights(&mut w, &candidates, 3, 1.0, &cfg);
            assert_simplex(&w);
        }
        assert!(w.linucb > before);
    }

    #[test]
    fn absent_members_decay_to_floor() {
        let mut w = weights();
        let cfg = EnsembleConfig::default();
        for _ in 0..30 {
            let candidates = vec![candidate(LearnerId::Linucb, 3, 1.0, 0.9)];
            update_weights(&mut w, &candidates, 3, 1.0, &cfg);
            assert_simplex(&w);
        }
        assert!(w.linucb > 0.5);
        assert!((w.thompson - cfg.min_weight).abs() < 0.02);
        assert!((w.actr - cfg.min_weight).abs() < 0.02);
        assert!((w.heuristic - cfg.min_weight).abs() < 0.02);
    }

    #[test]
    fn non_finite_reward_is_rejected() {
        let mut w = weights();
        let before = w.clone();
        let candidates = vec![candidate(LearnerId::Linucb, 3, 1.0, 0.9)];
        update_weights(&mut w, &candidates, 3, f64::NAN, &EnsembleConfig::default());
        assert_eq!(w, before);
    }

    #[test]
    fn degenerate_weights_recover() {
        let mut w = EnsembleWeights {
            linucb: f64::NAN,
            thompson: 0.0,
            actr: -1.0,
            heuristic: f64::INFINITY,
        };
        w.enforce_simplex(0.05);
        assert_simplex(&w);
    }

    #[test]
    fn negative_reward_on_misaligned_members_raises_them() {
        // 执行动作与 linucb 不一致且奖励为负：linucb 的 -0.5 对齐系数
        // 让它在负奖励下相对受益，权重不应该坍缩
        let mut w = weights();
        let cfg = EnsembleConfig::default();
        for _ in 0..20 {
            let candidates = vec![
                candidate(LearnerId::Linucb, 1, 0.5, 0.8),
                candidate(LearnerId::Thompson, 3, 0.5, 0.8),
            ];
            update_weights(&mut w, &candidates, 3, -1.0, &cfg);
            assert_simplex(&w);
        }
        assert!(w.linucb > w.thompson);
    }
}
