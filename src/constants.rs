/// 每用户模型束上限，超出后按 LRU 淘汰
pub const DEFAULT_MAX_USERS: usize = 10_000;

/// 每用户模型束 TTL（7 天）
pub const DEFAULT_USER_TTL_MS: i64 = 7 * 24 * 3_600_000;

/// 感知层滚动窗口长度
pub const FEATURE_WINDOW_SIZE: usize = 10;

/// 感知层滚动窗口 TTL（24 小时）
pub const FEATURE_WINDOW_TTL_MS: i64 = 24 * 3_600_000;

/// 决策预算：生产 100ms，测试 500ms
pub const DECISION_TIMEOUT_PROD_MS: u64 = 100;
pub const DECISION_TIMEOUT_TEST_MS: u64 = 500;

/// 每用户锁等待上限（30 秒）
pub const USER_LOCK_TIMEOUT_MS: u64 = 30_000;

/// 批量处理单次请求的事件数上限
pub const MAX_BATCH_EVENTS: usize = 100;

/// 离线超过此时长视为回归用户，应用状态衰减
pub const RETURNING_USER_THRESHOLD_MS: i64 = 24 * 3_600_000;

/// LinUCB 上下文向量维度
pub const LINUCB_CONTEXT_DIM: usize = 22;

/// 感知特征向量维度
pub const PERCEPTION_DIM: usize = 10;

/// 特征向量版本号，随维度或语义变化递增
pub const FEATURE_VERSION: &str = "ucb-context-v2";
