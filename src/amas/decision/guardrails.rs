use crate::amas::config::ConstraintConfig;
use crate::amas::types::{DifficultyLevel, StrategyParams, TrendState, UserState};

/// 安全守护：按序应用，每条只进一步收紧。
/// 返回收紧后的策略与触发的约束名（供解释层使用）。
pub fn apply(
    strategy: StrategyParams,
    state: &UserState,
    config: &ConstraintConfig,
) -> (StrategyParams, Vec<String>) {
    let mut s = strategy;
    let mut applied = Vec::new();

    if state.fatigue > config.high_fatigue {
        s.interval_scale = s.interval_scale.max(1.0);
        s.new_ratio = s.new_ratio.min(0.2);
        s.batch_size = s.batch_size.min(8);
        applied.push("high_fatigue".to_string());
    }

    if state.fatigue > config.critical_fatigue {
        s.difficulty = DifficultyLevel::Easy;
        s.hint_level = s.hint_level.max(1);
        s.new_ratio = s.new_ratio.min(0.1);
        s.batch_size = s.batch_size.min(5);
        applied.push("critical_fatigue".to_string());
    }

    if state.motivation < config.low_motivation {
        s.difficulty = DifficultyLevel::Easy;
        s.hint_level = s.hint_level.max(1);
        s.new_ratio = s.new_ratio.min(0.2);
        applied.push("low_motivation".to_string());
    }

    if state.motivation < config.critical_motivation {
        s.hint_level = 2;
        s.new_ratio = s.new_ratio.min(0.1);
        s.batch_size = s.batch_size.min(5);
        applied.push("critical_motivation".to_string());
    }

    if state.attention < config.min_attention {
        s.new_ratio = s.new_ratio.min(0.15);
        s.batch_size = s.batch_size.min(6);
        s.hint_level = s.hint_level.max(1);
        applied.push("min_attention".to_string());
    }

    match state.trend {
        TrendState::Down => {
            s.new_ratio = s.new_ratio.min(0.1);
            s.difficulty = DifficultyLevel::Easy;
            s.interval_scale = s.interval_scale.max(0.8);
            applied.push("trend_down".to_string());
        }
        TrendState::Stuck => {
            s.new_ratio = s.new_ratio.min(0.15);
            applied.push("trend_stuck".to_string());
        }
        _ => {}
    }

    (s, applied)
}

/// 疲劳或动机越过临界阈值时建议休息
pub fn should_break(state: &UserState, config: &ConstraintConfig) -> bool {
    state.fatigue > config.high_fatigue || state.motivation < config.critical_motivation
}

/// 守护约束是否对给定状态满足（监控不变式检查用）
pub fn satisfied(strategy: &StrategyParams, state: &UserState, config: &ConstraintConfig) -> bool {
    if state.fatigue > config.high_fatigue
        && (strategy.interval_scale < 1.0 || strategy.new_ratio > 0.2 || strategy.batch_size > 8)
    {
        return false;
    }
    if state.fatigue > config.critical_fatigue
        && (strategy.difficulty != DifficultyLevel::Easy
            || strategy.hint_level < 1
            || strategy.new_ratio > 0.1
            || strategy.batch_size > 5)
    {
        return false;
    }
    if state.motivation < config.low_motivation
        && (strategy.difficulty != DifficultyLevel::Easy
            || strategy.hint_level < 1
            || strategy.new_ratio > 0.2)
    {
        return false;
    }
    if state.motivation < config.critical_motivation
        && (strategy.hint_level != 2 || strategy.new_ratio > 0.1 || strategy.batch_size > 5)
    {
        return false;
    }
    if state.attention < config.min_attention
        && (strategy.new_ratio > 0.15 || strategy.batch_size > 6 || strategy.hint_level < 1)
    {
        return false;
    }
    match state.trend {
        TrendState::Down => {
            if strategy.new_ratio > 0.1
                || strategy.difficulty != DifficultyLevel::Easy
                || strategy.interval_scale < 0.8
            {
                return false;
            }
        }
        TrendState::Stuck => {
            if strategy.new_ratio > 0.15 {
                return false;
            }
        }
        _ => {}
    }
    true
}
