use crate::amas::decision::mapper;
use crate::amas::learning::DecisionContext;
use crate::amas::params::UserParams;
use crate::amas::types::{
    DecisionCandidate, DifficultyLevel, LearnerId, StrategyParams, UserState,
};

/// 规则基线：从状态与每用户难度落点推出期望策略，再吸附到动作空间。
/// 完全确定性，作为集成中的保底成员。
pub fn generate(
    state: &UserState,
    ctx: &DecisionContext,
    params: &UserParams,
    interaction_count: u64,
) -> DecisionCandidate {
    let mut desired = StrategyParams::default();

    // 难度跟随每用户落点，疲劳与错误率向下修正
    let mut difficulty_target = params.optimal_difficulty;
    if state.fatigue > 0.5 {
        difficulty_target -= 0.2;
    }
    if ctx.recent_error_rate > 0.4 {
        difficulty_target -= 0.15;
    }
    if ctx.recent_error_rate < 0.15 && state.motivation > 0.3 {
        difficulty_target += 0.15;
    }
    desired.difficulty = if difficulty_target >= 0.65 {
        DifficultyLevel::Hard
    } else if difficulty_target >= 0.35 {
        DifficultyLevel::Mid
    } else {
        DifficultyLevel::Easy
    };

    // 新词比与批量跟随注意力与动机
    if state.attention > 0.6 && state.motivation > 0.2 {
        desired.new_ratio = 0.3;
        desired.batch_size = 12;
    } else if state.attention < 0.4 || state.motivation < -0.2 {
        desired.new_ratio = 0.1;
        desired.batch_size = 6;
    }

    // 记忆弱则缩短间隔多复现
    if state.cognitive.mem < 0.4 {
        desired.interval_scale = 0.8;
    } else if state.cognitive.mem > 0.75 {
        desired.interval_scale = 1.2;
    }

    desired.hint_level = if state.conf < 0.3 { 1 } else { 0 };

    let action_index = mapper::nearest_action_index(&desired);

    // 事件越多，规则基线让位给学习器
    let confidence = (0.7 - (interaction_count as f64 / 200.0).min(0.5)).max(0.2);

    DecisionCandidate {
        learner: LearnerId::Heuristic,
        action_index,
        score: 0.5,
        confidence,
        explanation: format!("rule target difficulty {difficulty_target:.2}"),
    }
}
