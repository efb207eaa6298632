use crate::amas::types::{Action, StrategyParams, ACTION_SPACE};

/// Action → StrategyParams 纯映射
pub fn map_action_to_strategy(action: &Action) -> StrategyParams {
    action.to_strategy()
}

/// 动作与策略的加权距离：
/// 间隔差 + 5×新词比差 + 难度不匹配 + 批量差/16 + 提示差/2。
/// 新词比权重最高，因为它对学习节奏影响最直接。
pub fn action_distance(action: &Action, strategy: &StrategyParams) -> f64 {
    let difficulty_mismatch = if action.difficulty == strategy.difficulty {
        0.0
    } else {
        1.0
    };
    (action.interval_scale - strategy.interval_scale).abs()
        + 5.0 * (action.new_ratio - strategy.new_ratio).abs()
        + difficulty_mismatch
        + (action.batch_size - strategy.batch_size).abs() as f64 / 16.0
        + (action.hint_level - strategy.hint_level).abs() as f64 / 2.0
}

/// 守护约束后的策略吸附回动作空间最近元素，
/// 保证训练信号、持久化特征向量与实际行为一致。
/// 平手取先出现者。
pub fn nearest_action_index(strategy: &StrategyParams) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f64::INFINITY;
    for (idx, action) in ACTION_SPACE.iter().enumerate() {
        let dist = action_distance(action, strategy);
        if dist < best_dist {
            best_dist = dist;
            best_idx = idx;
        }
    }
    best_idx
}

pub fn map_strategy_to_action(strategy: &StrategyParams) -> Action {
    ACTION_SPACE[nearest_action_index(strategy)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_is_identity_over_action_space() {
        for (idx, action) in ACTION_SPACE.iter().enumerate() {
            let strategy = map_action_to_strategy(action);
            assert_eq!(
                nearest_action_index(&strategy),
                idx,
                "action {idx} did not roundtrip"
            );
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        for action in ACTION_SPACE.iter() {
            assert_eq!(action_distance(action, &action.to_strategy()), 0.0);
        }
    }

    #[test]
    fn clamped_strategy_snaps_to_nearby_action() {
        // 守护约束把标准动作压成低负载形态
        let squeezed = StrategyParams {
            interval_scale: 1.1,
            new_ratio: 0.1,
            difficulty: crate::amas::types::DifficultyLevel::Easy,
            batch_size: 5,
            hint_level: 2,
        };
        let snapped = map_strategy_to_action(&squeezed);
        assert_eq!(snapped, ACTION_SPACE[0]);
    }

    #[test]
    fn new_ratio_dominates_distance() {
        let a = &ACTION_SPACE[4];
        let mut far_ratio = a.to_strategy();
        far_ratio.new_ratio += 0.2;
        let mut far_interval = a.to_strategy();
        far_interval.interval_scale += 0.2;
        assert!(action_distance(a, &far_ratio) > action_distance(a, &far_interval));
    }
}
