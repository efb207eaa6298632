use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    #[default]
    Mid,
    Hard,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Mid => "mid",
            Self::Hard => "hard",
        }
    }

    /// LinUCB 上下文编码值
    pub fn encoded(&self) -> f64 {
        match self {
            Self::Easy => 0.2,
            Self::Mid => 0.5,
            Self::Hard => 0.8,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "easy" => Self::Easy,
            "hard" => Self::Hard,
            _ => Self::Mid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrendState {
    Up,
    #[default]
    Flat,
    Stuck,
    Down,
}

impl TrendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Flat => "flat",
            Self::Stuck => "stuck",
            Self::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Fast,
    #[default]
    Stable,
    Cautious,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColdStartPhase {
    #[default]
    Classify,
    Explore,
    Normal,
}

impl ColdStartPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::Explore => "explore",
            Self::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitiveProfile {
    pub mem: f64,
    pub speed: f64,
    pub stability: f64,
}

impl Default for CognitiveProfile {
    fn default() -> Self {
        Self {
            mem: 0.5,
            speed: 0.5,
            stability: 0.5,
        }
    }
}

/// 用户状态五元组 (A, F, C, M, T) 加置信度与时间戳。
/// 不变式：每次更新后所有字段有限且在声明范围内；
/// conf 每次更新增长 0.01，封顶 1.0。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    #[serde(rename = "A")]
    pub attention: f64,
    #[serde(rename = "F")]
    pub fatigue: f64,
    #[serde(rename = "C")]
    pub cognitive: CognitiveProfile,
    #[serde(rename = "M")]
    pub motivation: f64,
    #[serde(rename = "T")]
    pub trend: TrendState,
    pub conf: f64,
    pub ts: i64,
}

impl Default for UserState {
    fn default() -> Self {
        Self {
            attention: 0.7,
            fatigue: 0.0,
            cognitive: CognitiveProfile::default(),
            motivation: 0.0,
            trend: TrendState::Flat,
            conf: 0.1,
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }
}

impl UserState {
    /// 所有分量有限且在声明范围内
    pub fn is_sane(&self) -> bool {
        (0.0..=1.0).contains(&self.attention)
            && (0.0..=1.0).contains(&self.fatigue)
            && (-1.0..=1.0).contains(&self.motivation)
            && (0.0..=1.0).contains(&self.cognitive.mem)
            && (0.0..=1.0).contains(&self.cognitive.speed)
            && (0.0..=1.0).contains(&self.cognitive.stability)
            && (0.0..=1.0).contains(&self.conf)
    }

    /// 将越界或非有限分量收回到安全范围
    pub fn clamp_in_place(&mut self) {
        fn fix(v: &mut f64, lo: f64, hi: f64, fallback: f64) {
            if !v.is_finite() {
                *v = fallback;
            } else {
                *v = v.clamp(lo, hi);
            }
        }
        fix(&mut self.attention, 0.0, 1.0, 0.7);
        fix(&mut self.fatigue, 0.0, 1.0, 0.0);
        fix(&mut self.motivation, -1.0, 1.0, 0.0);
        fix(&mut self.cognitive.mem, 0.0, 1.0, 0.5);
        fix(&mut self.cognitive.speed, 0.0, 1.0, 0.5);
        fix(&mut self.cognitive.stability, 0.0, 1.0, 0.5);
        fix(&mut self.conf, 0.0, 1.0, 0.1);
    }
}

/// 单次交互的原始行为事件。数值字段在感知层被钳制到声明范围。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub word_id: String,
    pub is_correct: bool,
    pub response_time: i64,
    pub dwell_time: Option<i64>,
    pub timestamp: i64,
    pub pause_count: i32,
    pub switch_count: i32,
    pub retry_count: i32,
    pub focus_loss_duration: Option<i64>,
    pub interaction_density: Option<f64>,
    #[serde(default)]
    pub is_quit: bool,
    #[serde(default)]
    pub hint_used: bool,
    pub session_id: Option<String>,
}

impl Default for RawEvent {
    fn default() -> Self {
        Self {
            word_id: String::new(),
            is_correct: true,
            response_time: 3000,
            dwell_time: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
            pause_count: 0,
            switch_count: 0,
            retry_count: 0,
            focus_loss_duration: None,
            interaction_density: None,
            is_quit: false,
            hint_used: false,
            session_id: None,
        }
    }
}

/// 固定宽度特征向量。感知输出 10 维，LinUCB 上下文 22 维。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    pub values: Vec<f64>,
    pub labels: Vec<String>,
    pub version: String,
    pub norm_method: String,
    pub ts: i64,
}

impl FeatureVector {
    pub fn new(values: Vec<f64>, labels: Vec<String>, norm_method: &str) -> Self {
        Self {
            values,
            labels,
            version: crate::constants::FEATURE_VERSION.to_string(),
            norm_method: norm_method.to_string(),
            ts: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }
}

/// 策略动作：固定动作空间的一个元素
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub interval_scale: f64,
    pub new_ratio: f64,
    pub difficulty: DifficultyLevel,
    pub batch_size: i32,
    pub hint_level: i32,
}

/// 全局固定动作空间。索引在部署生命周期内保持稳定，
/// 是决策轨迹中的首选动作键。
pub const ACTION_SPACE: [Action; 12] = [
    // 0: 缓坡恢复（cautious 落点）
    Action { interval_scale: 1.2, new_ratio: 0.1, difficulty: DifficultyLevel::Easy, batch_size: 5, hint_level: 2 },
    // 1: 简单稳态（探针：easy）
    Action { interval_scale: 1.0, new_ratio: 0.2, difficulty: DifficultyLevel::Easy, batch_size: 8, hint_level: 1 },
    // 2: 简单拓宽
    Action { interval_scale: 0.8, new_ratio: 0.3, difficulty: DifficultyLevel::Easy, batch_size: 10, hint_level: 1 },
    // 3: 高强度
    Action { interval_scale: 0.5, new_ratio: 0.4, difficulty: DifficultyLevel::Hard, batch_size: 16, hint_level: 0 },
    // 4: 标准（探针：standard，stable 落点）
    Action { interval_scale: 1.0, new_ratio: 0.2, difficulty: DifficultyLevel::Mid, batch_size: 8, hint_level: 1 },
    // 5: 标准加宽
    Action { interval_scale: 1.0, new_ratio: 0.3, difficulty: DifficultyLevel::Mid, batch_size: 12, hint_level: 1 },
    // 6: 快循环
    Action { interval_scale: 0.8, new_ratio: 0.25, difficulty: DifficultyLevel::Mid, batch_size: 10, hint_level: 0 },
    // 7: 挑战（探针：challenge，fast 落点）
    Action { interval_scale: 0.8, new_ratio: 0.35, difficulty: DifficultyLevel::Hard, batch_size: 12, hint_level: 0 },
    // 8: 巩固
    Action { interval_scale: 1.5, new_ratio: 0.1, difficulty: DifficultyLevel::Mid, batch_size: 6, hint_level: 1 },
    // 9: 深度挑战
    Action { interval_scale: 1.0, new_ratio: 0.3, difficulty: DifficultyLevel::Hard, batch_size: 10, hint_level: 0 },
    // 10: 高负载（探针：high-load）
    Action { interval_scale: 0.8, new_ratio: 0.4, difficulty: DifficultyLevel::Mid, batch_size: 16, hint_level: 0 },
    // 11: 短间隔（探针：short-interval）
    Action { interval_scale: 0.5, new_ratio: 0.2, difficulty: DifficultyLevel::Mid, batch_size: 8, hint_level: 1 },
];

/// 冷启动分类阶段的探针序列：easy → standard → challenge → high-load → short-interval
pub const PROBE_SEQUENCE: [usize; 5] = [1, 4, 7, 10, 11];

/// 用户可见策略参数，由 Action 映射并经守护约束后产出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyParams {
    pub interval_scale: f64,
    pub new_ratio: f64,
    pub difficulty: DifficultyLevel,
    pub batch_size: i32,
    pub hint_level: i32,
}

impl Default for StrategyParams {
    fn default() -> Self {
        ACTION_SPACE[4].to_strategy()
    }
}

impl Action {
    pub fn to_strategy(&self) -> StrategyParams {
        StrategyParams {
            interval_scale: self.interval_scale,
            new_ratio: self.new_ratio,
            difficulty: self.difficulty,
            batch_size: self.batch_size,
            hint_level: self.hint_level,
        }
    }
}

impl From<Action> for StrategyParams {
    fn from(action: Action) -> Self {
        action.to_strategy()
    }
}

impl StrategyParams {
    pub fn for_user_type(user_type: UserType) -> Self {
        match user_type {
            UserType::Fast => ACTION_SPACE[7].to_strategy(),
            UserType::Stable => ACTION_SPACE[4].to_strategy(),
            UserType::Cautious => ACTION_SPACE[0].to_strategy(),
        }
    }

    pub fn settled_action_index(user_type: UserType) -> usize {
        match user_type {
            UserType::Fast => 7,
            UserType::Stable => 4,
            UserType::Cautious => 0,
        }
    }
}

/// 冷启动探针记录，环形缓冲上限 20 条
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub action_index: usize,
    pub reward: f64,
    pub is_correct: bool,
    pub response_time: i64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartState {
    pub phase: ColdStartPhase,
    pub user_type: Option<UserType>,
    pub probe_index: usize,
    pub update_count: u64,
    pub results: Vec<ProbeResult>,
    pub settled_strategy: Option<StrategyParams>,
}

impl Default for ColdStartState {
    fn default() -> Self {
        Self {
            phase: ColdStartPhase::Classify,
            user_type: None,
            probe_index: 0,
            update_count: 0,
            results: Vec::new(),
            settled_strategy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub value: f64,
    pub components: RewardComponents,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RewardComponents {
    pub correctness: f64,
    pub fatigue_penalty: f64,
    pub speed_gain: f64,
    pub frustration: f64,
    pub engagement: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionFactor {
    pub name: String,
    pub value: f64,
    pub impact: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DecisionExplanation {
    pub primary_reason: String,
    pub factors: Vec<DecisionFactor>,
    pub changes: Vec<String>,
}

/// 目标函数评估：短期正确率 / 速度与长期留存、疲劳成本的加权
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveEvaluation {
    pub score: f64,
    pub accuracy_gain: f64,
    pub speed_gain: f64,
    pub retention_gain: f64,
    pub fatigue_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    pub strategy: StrategyParams,
    pub action_index: usize,
    pub action: Action,
    pub explanation: DecisionExplanation,
    pub state: UserState,
    pub reward: Reward,
    pub suggestion: Option<String>,
    pub should_break: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_vector: Option<FeatureVector>,
    pub cold_start_phase: ColdStartPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub objective_evaluation: Option<ObjectiveEvaluation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

/// 请求可选项。未知字段由 serde 直接忽略。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOptions {
    pub current_params: Option<StrategyParams>,
    pub interaction_count: Option<u64>,
    pub recent_accuracy: Option<f64>,
    pub skip_update: Option<bool>,
    pub answer_record_id: Option<String>,
    pub session_id: Option<String>,
    pub learning_objectives: Option<Vec<String>>,
    pub session_stats: Option<SessionStats>,
    pub word_review_history: Option<Vec<WordReviewHistory>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub words_studied: i32,
    pub correct_count: i32,
    pub total_time_ms: i64,
    pub avg_response_time: f64,
}

/// 单词复习轨迹条目，供 ACT-R 激活计算使用（请求作用域）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WordReviewHistory {
    pub seconds_ago: i64,
    pub is_correct: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearnerId {
    Linucb,
    Thompson,
    Actr,
    Heuristic,
    Coldstart,
    Ensemble,
}

impl LearnerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linucb => "linucb",
            Self::Thompson => "thompson",
            Self::Actr => "actr",
            Self::Heuristic => "heuristic",
            Self::Coldstart => "coldstart",
            Self::Ensemble => "ensemble",
        }
    }
}

/// 单个学习器的候选输出
#[derive(Debug, Clone)]
pub struct DecisionCandidate {
    pub learner: LearnerId,
    pub action_index: usize,
    pub score: f64,
    pub confidence: f64,
    pub explanation: String,
}

/// LinUCB 模型快照，持久化形状见 store::operations::engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanditSnapshot {
    pub d: usize,
    pub lambda: f64,
    pub alpha: f64,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub l: Vec<f64>,
    pub update_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_space_attributes_in_declared_ranges() {
        for action in ACTION_SPACE.iter() {
            assert!((0.5..=1.5).contains(&action.interval_scale));
            assert!((0.1..=0.4).contains(&action.new_ratio));
            assert!((5..=16).contains(&action.batch_size));
            assert!((0..=2).contains(&action.hint_level));
        }
    }

    #[test]
    fn action_space_has_no_duplicates() {
        for (i, a) in ACTION_SPACE.iter().enumerate() {
            for b in ACTION_SPACE.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn probe_sequence_indices_valid() {
        for &idx in PROBE_SEQUENCE.iter() {
            assert!(idx < ACTION_SPACE.len());
        }
    }

    #[test]
    fn default_state_is_sane() {
        assert!(UserState::default().is_sane());
    }

    #[test]
    fn clamp_repairs_non_finite_state() {
        let mut state = UserState {
            attention: f64::NAN,
            fatigue: 2.0,
            motivation: -5.0,
            ..UserState::default()
        };
        state.clamp_in_place();
        assert!(state.is_sane());
    }

    #[test]
    fn serde_roundtrip_user_state() {
        let state = UserState::default();
        let encoded = serde_json::to_string(&state).unwrap();
        assert!(encoded.contains("\"A\""));
        let decoded: UserState = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.attention, state.attention);
    }

    #[test]
    fn unknown_process_option_fields_ignored() {
        let decoded: ProcessOptions =
            serde_json::from_str(r#"{"skipUpdate":true,"someFutureField":42}"#).unwrap();
        assert_eq!(decoded.skip_update, Some(true));
    }
}
