/// Sled tree 名称常量。
///
/// 修改 tree 名称会导致已有数据不可访问，请勿随意更改。

pub const ENGINE_USER_STATES: &str = "engine_user_states";
/// 常量名 ENGINE_BANDIT_MODELS，tree 名缩写为 engine_bandit
pub const ENGINE_BANDIT_MODELS: &str = "engine_bandit";
/// 常量名 ENGINE_ALGORITHM_STATES，tree 名缩写为 engine_algo_states
pub const ENGINE_ALGORITHM_STATES: &str = "engine_algo_states";
/// 常量名 ENGINE_DECISION_TRACES，tree 名缩写为 engine_traces
pub const ENGINE_DECISION_TRACES: &str = "engine_traces";
/// 常量名 ALGORITHM_METRICS_DAILY，tree 名缩写为 algo_metrics_daily
pub const ALGORITHM_METRICS_DAILY: &str = "algo_metrics_daily";
pub const DELAYED_REWARD_QUEUE: &str = "delayed_reward_queue";
