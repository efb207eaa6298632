use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    pub ensemble_enabled: bool,
    pub cold_start_enabled: bool,
    pub thompson_enabled: bool,
    pub actr_enabled: bool,
    pub heuristic_enabled: bool,
    pub trend_enabled: bool,
    pub user_params_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            ensemble_enabled: true,
            cold_start_enabled: true,
            thompson_enabled: true,
            actr_enabled: true,
            heuristic_enabled: true,
            trend_enabled: true,
            user_params_enabled: true,
        }
    }
}

/// 感知层全局归一化基准。位置类特征用常量均值/标准差做 z-score，
/// 稳定性类特征用用户自身窗口的变异系数。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerceptionConfig {
    pub rt_mean_ms: f64,
    pub rt_std_ms: f64,
    pub pause_mean: f64,
    pub pause_std: f64,
    pub switch_mean: f64,
    pub switch_std: f64,
    pub focus_loss_mean_ms: f64,
    pub focus_loss_std_ms: f64,
    pub interaction_mean: f64,
    pub interaction_std: f64,
    pub window_size: usize,
    pub window_ttl_ms: i64,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            rt_mean_ms: 3000.0,
            rt_std_ms: 2000.0,
            pause_mean: 1.0,
            pause_std: 2.0,
            switch_mean: 0.5,
            switch_std: 1.5,
            focus_loss_mean_ms: 2000.0,
            focus_loss_std_ms: 8000.0,
            interaction_mean: 2.0,
            interaction_std: 2.0,
            window_size: crate::constants::FEATURE_WINDOW_SIZE,
            window_ttl_ms: crate::constants::FEATURE_WINDOW_TTL_MS,
        }
    }
}

/// 注意力估计器的 8 维特征权重
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionWeights {
    pub rt_mean: f64,
    pub rt_cv: f64,
    pub pace_cv: f64,
    pub pause: f64,
    pub switch: f64,
    pub drift: f64,
    pub interaction: f64,
    pub focus_loss: f64,
}

impl Default for AttentionWeights {
    fn default() -> Self {
        Self {
            rt_mean: 0.20,
            rt_cv: 0.15,
            pace_cv: 0.10,
            pause: 0.15,
            switch: 0.10,
            drift: 0.10,
            interaction: 0.10,
            focus_loss: 0.10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelingConfig {
    pub attention_weights: AttentionWeights,
    /// EMA 系数 β：A_t = β·A_{t-1} + (1-β)·σ(-w·f)
    pub attention_beta: f64,
    pub fatigue_beta: f64,
    pub fatigue_gamma: f64,
    pub fatigue_delta: f64,
    pub fatigue_k: f64,
    pub fatigue_long_break_minutes: f64,
    pub cognitive_alpha: f64,
    pub cognitive_speed_baseline_ms: f64,
    pub cognitive_stability_window: usize,
    pub motivation_rho: f64,
    pub motivation_kappa: f64,
    pub motivation_lambda: f64,
    pub motivation_mu: f64,
    pub trend_window: usize,
    pub trend_up_threshold: f64,
    pub trend_down_threshold: f64,
    pub trend_flat_threshold: f64,
}

impl Default for ModelingConfig {
    fn default() -> Self {
        Self {
            attention_weights: AttentionWeights::default(),
            attention_beta: 0.7,
            fatigue_beta: 0.30,
            fatigue_gamma: 0.25,
            fatigue_delta: 0.20,
            fatigue_k: 0.05,
            fatigue_long_break_minutes: 30.0,
            cognitive_alpha: 0.1,
            cognitive_speed_baseline_ms: 3000.0,
            cognitive_stability_window: 20,
            motivation_rho: 0.8,
            motivation_kappa: 0.10,
            motivation_lambda: 0.15,
            motivation_mu: 0.25,
            trend_window: 20,
            trend_up_threshold: 0.10,
            trend_down_threshold: -0.10,
            trend_flat_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinUCBConfig {
    pub lambda: f64,
    pub base_alpha: f64,
    pub feature_clip: f64,
    pub max_covariance: f64,
    /// 冷启动探索日程：交互数阈值与对应 alpha
    pub alpha_early: f64,
    pub alpha_warm_confident: f64,
    pub alpha_warm_default: f64,
    pub alpha_settled: f64,
    pub early_interactions: u64,
    pub warm_interactions: u64,
}

impl Default for LinUCBConfig {
    fn default() -> Self {
        Self {
            lambda: 1.0,
            base_alpha: 0.7,
            feature_clip: 50.0,
            max_covariance: 1e9,
            alpha_early: 0.5,
            alpha_warm_confident: 2.0,
            alpha_warm_default: 1.0,
            alpha_settled: 0.7,
            early_interactions: 15,
            warm_interactions: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThompsonConfig {
    pub prior_alpha: f64,
    pub prior_beta: f64,
    /// 有效样本数折算常数，用于置信度估计
    pub ess_k: f64,
}

impl Default for ThompsonConfig {
    fn default() -> Self {
        Self {
            prior_alpha: 1.0,
            prior_beta: 1.0,
            ess_k: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActrConfig {
    /// 记忆衰减指数 d（ACT-R 默认 0.5）
    pub decay: f64,
    /// 激活到召回概率的 logistic 阈值 τ 与噪声 s
    pub threshold: f64,
    pub noise: f64,
    pub max_trace_len: usize,
}

impl Default for ActrConfig {
    fn default() -> Self {
        Self {
            decay: 0.5,
            threshold: 0.3,
            noise: 0.4,
            max_trace_len: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsembleConfig {
    pub initial_weight_linucb: f64,
    pub initial_weight_thompson: f64,
    pub initial_weight_actr: f64,
    pub initial_weight_heuristic: f64,
    /// 指数权重更新学习率 η
    pub eta: f64,
    /// 缺席成员的乘性衰减
    pub absence_decay: f64,
    pub min_weight: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            initial_weight_linucb: 0.40,
            initial_weight_thompson: 0.25,
            initial_weight_actr: 0.15,
            initial_weight_heuristic: 0.20,
            eta: 0.25,
            absence_decay: 0.95,
            min_weight: 0.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartConfig {
    /// classify → explore 的更新数阈值
    pub classify_updates: u64,
    /// explore → normal 的更新数阈值
    pub explore_updates: u64,
    pub max_results: usize,
    pub fast_accuracy: f64,
    pub fast_rt_ms: i64,
    pub fast_error_rate: f64,
    pub stable_accuracy: f64,
    pub stable_rt_ms: i64,
    pub stable_error_rate: f64,
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            classify_updates: 15,
            explore_updates: 50,
            max_results: 20,
            fast_accuracy: 0.8,
            fast_rt_ms: 1500,
            fast_error_rate: 0.2,
            stable_accuracy: 0.6,
            stable_rt_ms: 3000,
            stable_error_rate: 0.35,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintConfig {
    pub high_fatigue: f64,
    pub critical_fatigue: f64,
    pub low_motivation: f64,
    pub critical_motivation: f64,
    pub min_attention: f64,
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            high_fatigue: 0.7,
            critical_fatigue: 0.85,
            low_motivation: -0.3,
            critical_motivation: -0.6,
            min_attention: 0.3,
        }
    }
}

/// 奖励配比。最终奖励 = clamp(raw/2, -1, 1)。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardProfile {
    pub w_correct: f64,
    pub w_fatigue: f64,
    pub w_speed: f64,
    pub w_frustration: f64,
    pub w_engagement: f64,
    pub reference_rt_ms: f64,
}

impl Default for RewardProfile {
    fn default() -> Self {
        Self {
            w_correct: 1.0,
            w_fatigue: 0.5,
            w_speed: 0.3,
            w_frustration: 0.3,
            w_engagement: 0.2,
            reference_rt_ms: 3000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    pub sample_rate: f64,
    pub metrics_flush_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sample_rate: 0.05,
            metrics_flush_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolationConfig {
    pub max_users: usize,
    pub user_ttl_ms: i64,
    pub lock_timeout_ms: u64,
    pub decision_timeout_ms: u64,
    /// 熔断阈值：窗口内失败数
    pub breaker_failure_threshold: u32,
    /// 熔断冷却时长
    pub breaker_cooldown_ms: u64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            max_users: crate::constants::DEFAULT_MAX_USERS,
            user_ttl_ms: crate::constants::DEFAULT_USER_TTL_MS,
            lock_timeout_ms: crate::constants::USER_LOCK_TIMEOUT_MS,
            decision_timeout_ms: crate::constants::DECISION_TIMEOUT_PROD_MS,
            breaker_failure_threshold: 5,
            breaker_cooldown_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AMASConfig {
    pub feature_flags: FeatureFlags,
    pub perception: PerceptionConfig,
    pub modeling: ModelingConfig,
    pub linucb: LinUCBConfig,
    pub thompson: ThompsonConfig,
    pub actr: ActrConfig,
    pub ensemble: EnsembleConfig,
    pub cold_start: ColdStartConfig,
    pub constraints: ConstraintConfig,
    pub reward: RewardProfile,
    pub monitoring: MonitoringConfig,
    pub isolation: IsolationConfig,
}

impl AMASConfig {
    pub fn from_env(env_config: &crate::config::AMASEnvConfig) -> Self {
        let mut config = Self::default();
        config.feature_flags.ensemble_enabled = env_config.ensemble_enabled;
        config.feature_flags.cold_start_enabled = env_config.cold_start_enabled;
        config.feature_flags.thompson_enabled = env_config.thompson_enabled;
        config.feature_flags.actr_enabled = env_config.actr_enabled;
        config.feature_flags.heuristic_enabled = env_config.heuristic_enabled;
        config.feature_flags.trend_enabled = env_config.trend_enabled;
        config.feature_flags.user_params_enabled = env_config.user_params_enabled;
        config.monitoring.sample_rate = env_config.monitor_sample_rate;
        config.isolation.decision_timeout_ms = env_config.decision_timeout_ms;
        if let Some(w) = env_config.weight_override_linucb {
            config.ensemble.initial_weight_linucb = w;
        }
        if let Some(w) = env_config.weight_override_thompson {
            config.ensemble.initial_weight_thompson = w;
        }
        if let Some(w) = env_config.weight_override_actr {
            config.ensemble.initial_weight_actr = w;
        }
        if let Some(w) = env_config.weight_override_heuristic {
            config.ensemble.initial_weight_heuristic = w;
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        // ModelingConfig 参数范围检查
        if !(0.0..=1.0).contains(&self.modeling.attention_beta) {
            return Err("modeling.attention_beta must be in [0,1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.modeling.cognitive_alpha) {
            return Err("modeling.cognitive_alpha must be in [0,1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.modeling.motivation_rho) {
            return Err("modeling.motivation_rho must be in [0,1]".to_string());
        }
        if self.modeling.cognitive_speed_baseline_ms <= 0.0 {
            return Err("modeling.cognitive_speed_baseline_ms must be > 0".to_string());
        }
        if self.modeling.trend_window < 5 {
            return Err("modeling.trend_window must be >= 5".to_string());
        }

        // PerceptionConfig
        if self.perception.rt_std_ms <= 0.0
            || self.perception.pause_std <= 0.0
            || self.perception.switch_std <= 0.0
            || self.perception.focus_loss_std_ms <= 0.0
            || self.perception.interaction_std <= 0.0
        {
            return Err("perception std deviations must be > 0".to_string());
        }
        if self.perception.window_size == 0 {
            return Err("perception.window_size must be > 0".to_string());
        }

        // LinUCBConfig
        if self.linucb.lambda < 1e-3 {
            return Err("linucb.lambda must be >= 1e-3".to_string());
        }
        if self.linucb.base_alpha <= 0.0 {
            return Err("linucb.base_alpha must be > 0".to_string());
        }
        if self.linucb.feature_clip <= 0.0 {
            return Err("linucb.feature_clip must be > 0".to_string());
        }
        if self.linucb.max_covariance <= 0.0 {
            return Err("linucb.max_covariance must be > 0".to_string());
        }

        // ThompsonConfig
        if self.thompson.prior_alpha <= 0.0 || self.thompson.prior_beta <= 0.0 {
            return Err("thompson priors must be > 0".to_string());
        }
        if self.thompson.ess_k <= 0.0 {
            return Err("thompson.ess_k must be > 0".to_string());
        }

        // ActrConfig
        if !(0.0..=1.0).contains(&self.actr.decay) {
            return Err("actr.decay must be in [0,1]".to_string());
        }
        if self.actr.noise <= 0.0 {
            return Err("actr.noise must be > 0".to_string());
        }
        if self.actr.max_trace_len == 0 {
            return Err("actr.max_trace_len must be > 0".to_string());
        }

        // EnsembleConfig
        let weights = [
            self.ensemble.initial_weight_linucb,
            self.ensemble.initial_weight_thompson,
            self.ensemble.initial_weight_actr,
            self.ensemble.initial_weight_heuristic,
        ];
        if weights.iter().any(|w| *w <= 0.0) {
            return Err("ensemble initial weights must be > 0".to_string());
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 0.01 {
            return Err(format!(
                "ensemble initial weights should sum to ~1.0 (got {sum:.3})"
            ));
        }
        if self.ensemble.min_weight <= 0.0 || self.ensemble.min_weight > 1.0 {
            return Err("ensemble.min_weight must be in (0,1]".to_string());
        }
        if 4.0 * self.ensemble.min_weight > 1.0 {
            return Err("ensemble.min_weight too large: 4 * min_weight must be <= 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.ensemble.absence_decay) {
            return Err("ensemble.absence_decay must be in [0,1]".to_string());
        }
        if self.ensemble.eta <= 0.0 || self.ensemble.eta > 1.0 {
            return Err("ensemble.eta must be in (0,1]".to_string());
        }

        // ColdStartConfig
        if self.cold_start.classify_updates >= self.cold_start.explore_updates {
            return Err("cold_start.classify_updates must be < explore_updates".to_string());
        }
        if self.cold_start.max_results == 0 {
            return Err("cold_start.max_results must be > 0".to_string());
        }

        // ConstraintConfig
        if !(0.0..=1.0).contains(&self.constraints.high_fatigue)
            || !(0.0..=1.0).contains(&self.constraints.critical_fatigue)
            || !(0.0..=1.0).contains(&self.constraints.min_attention)
            || !(-1.0..=1.0).contains(&self.constraints.low_motivation)
            || !(-1.0..=1.0).contains(&self.constraints.critical_motivation)
        {
            return Err("invalid constraint thresholds".to_string());
        }
        if self.constraints.critical_fatigue < self.constraints.high_fatigue {
            return Err("constraints.critical_fatigue must be >= high_fatigue".to_string());
        }
        if self.constraints.critical_motivation > self.constraints.low_motivation {
            return Err("constraints.critical_motivation must be <= low_motivation".to_string());
        }

        // RewardProfile
        if self.reward.reference_rt_ms <= 0.0 {
            return Err("reward.reference_rt_ms must be > 0".to_string());
        }
        let reward_weights = [
            self.reward.w_correct,
            self.reward.w_fatigue,
            self.reward.w_speed,
            self.reward.w_frustration,
            self.reward.w_engagement,
        ];
        if reward_weights.iter().any(|w| *w < 0.0) {
            return Err("reward weights must be >= 0".to_string());
        }

        // MonitoringConfig
        if !(0.0..=1.0).contains(&self.monitoring.sample_rate) {
            return Err("monitoring.sample_rate must be in [0,1]".to_string());
        }

        // IsolationConfig
        if self.isolation.max_users == 0 {
            return Err("isolation.max_users must be > 0".to_string());
        }
        if self.isolation.decision_timeout_ms == 0 {
            return Err("isolation.decision_timeout_ms must be > 0".to_string());
        }
        if self.isolation.breaker_failure_threshold == 0 {
            return Err("isolation.breaker_failure_threshold must be > 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = AMASConfig::default();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn invalid_sample_rate_rejected() {
        let mut cfg = AMASConfig::default();
        cfg.monitoring.sample_rate = 2.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tiny_lambda_rejected() {
        let mut cfg = AMASConfig::default();
        cfg.linucb.lambda = 1e-6;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn skewed_ensemble_weights_rejected() {
        let mut cfg = AMASConfig::default();
        cfg.ensemble.initial_weight_linucb = 0.9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut env = crate::config::AMASEnvConfig::default();
        env.ensemble_enabled = false;
        env.weight_override_linucb = Some(0.40);
        let cfg = AMASConfig::from_env(&env);
        assert!(!cfg.feature_flags.ensemble_enabled);
        assert_eq!(cfg.ensemble.initial_weight_linucb, 0.40);
    }
}
