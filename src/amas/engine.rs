use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::amas::breaker::CircuitBreaker;
use crate::amas::config::AMASConfig;
use crate::amas::decision::{ensemble, guardrails, heuristic, mapper};
use crate::amas::isolation::{IsolationManager, PerUserModels};
use crate::amas::learning::{
    ActrMemory, ColdStartController, DecisionContext, LinUcbModel,
};
use crate::amas::metrics::MetricsRegistry;
use crate::amas::modeling::ModelingSuite;
use crate::amas::monitoring::{self, DailySalt};
use crate::amas::params::UserParamsManager;
use crate::amas::perception::FeatureBuilder;
use crate::amas::reward;
use crate::amas::types::*;
use crate::response::AppError;
use crate::store::operations::engine::{ModelRepo, PersistedUserState, StateRepo};
use crate::store::Store;

/// 延迟奖励应用结果
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayedRewardOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 请求内取消信号：决策预算耗尽后在每个持久化边界检查，
/// 不回滚内存内更新，只阻止落盘。
struct Cancellation {
    deadline: Instant,
}

impl Cancellation {
    fn new(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }

    fn fired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// 六阶段管线的编排器：感知 → 建模 → 学习 → 决策 → 评估 → 优化。
/// 同一用户的请求严格串行；不同用户并行。
pub struct AMASEngine {
    config: Arc<RwLock<AMASConfig>>,
    store: Arc<Store>,
    isolation: IsolationManager,
    feature_builder: FeatureBuilder,
    user_params: UserParamsManager,
    breaker: CircuitBreaker,
    metrics: Arc<MetricsRegistry>,
    salt: DailySalt,
}

impl AMASEngine {
    pub fn new(config: AMASConfig, store: Arc<Store>) -> Self {
        let isolation = IsolationManager::new(
            config.isolation.max_users,
            config.isolation.user_ttl_ms,
        );
        let feature_builder = FeatureBuilder::new(config.perception.clone());
        let user_params = UserParamsManager::new(
            config.isolation.max_users,
            config.isolation.user_ttl_ms,
        );
        let breaker = CircuitBreaker::new(
            config.isolation.breaker_failure_threshold,
            config.isolation.breaker_cooldown_ms,
        );

        Self {
            config: Arc::new(RwLock::new(config)),
            store,
            isolation,
            feature_builder,
            user_params,
            breaker,
            metrics: Arc::new(MetricsRegistry::new()),
            salt: DailySalt::new(),
        }
    }

    pub async fn reload_config(&self, new_config: AMASConfig) -> Result<(), String> {
        new_config.validate()?;
        let mut cfg = self.config.write().await;
        *cfg = new_config;
        tracing::info!("AMAS config reloaded");
        Ok(())
    }

    pub async fn get_config(&self) -> AMASConfig {
        self.config.read().await.clone()
    }

    pub fn metrics_registry(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn process_event(
        &self,
        user_id: &str,
        raw_event: RawEvent,
        options: ProcessOptions,
    ) -> Result<ProcessResult, AppError> {
        let start = Instant::now();
        crate::validation::validate_user_id(user_id)
            .map_err(|msg| AppError::bad_request("INVALID_USER_ID", msg))?;

        let config = self.config.read().await.clone();

        // 熔断开启直接走规则降级，不触碰模型
        if !self.breaker.allow() {
            let state = self.peek_state(user_id).await.unwrap_or_default();
            return Ok(self.fallback_result(&state, &raw_event, "circuit_open", &config));
        }

        // 每用户串行锁，等待有硬超时
        let user_lock = self.isolation.user_lock(user_id).await;
        let guard = match tokio::time::timeout(
            Duration::from_millis(config.isolation.lock_timeout_ms),
            user_lock.lock(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_) => {
                self.breaker.record_failure();
                let state = self.peek_state(user_id).await.unwrap_or_default();
                return Ok(self.fallback_result(&state, &raw_event, "lock_timeout", &config));
            }
        };

        let cancellation =
            Cancellation::new(Duration::from_millis(config.isolation.decision_timeout_ms));

        let result = self
            .run_pipeline(user_id, &raw_event, &options, &config, &cancellation, start)
            .await;
        drop(guard);

        match result {
            Ok(result) => {
                self.breaker.record_success();
                Ok(result)
            }
            Err(PipelineAbort::Cancelled) => {
                self.breaker.record_failure();
                let state = self.peek_state(user_id).await.unwrap_or_default();
                Ok(self.fallback_result(&state, &raw_event, "timeout", &config))
            }
            Err(PipelineAbort::Anomalous) => {
                let state = self.peek_state(user_id).await.unwrap_or_default();
                Ok(self.fallback_result(&state, &raw_event, "degraded_state", &config))
            }
        }
    }

    async fn run_pipeline(
        &self,
        user_id: &str,
        raw_event: &RawEvent,
        options: &ProcessOptions,
        config: &AMASConfig,
        cancellation: &Cancellation,
        start: Instant,
    ) -> Result<ProcessResult, PipelineAbort> {
        // 感知边界：异常事件短路降级
        if self.feature_builder.is_anomalous(raw_event) {
            return Err(PipelineAbort::Anomalous);
        }

        let mut models = self.load_models(user_id, config).await;
        let event = self.feature_builder.sanitize(raw_event);

        // 建模：五个估计器并出新状态
        let params = self.user_params.get(user_id);
        let feature = self.feature_builder.build_feature_vector(&event, user_id);
        let previous_state = models.user_state.clone();
        models.user_state = models.modeling.update(
            &previous_state,
            &event,
            &feature,
            &config.modeling,
            &params,
            config.feature_flags.trend_enabled,
        );

        if cancellation.fired() {
            return Err(PipelineAbort::Cancelled);
        }

        // 决策上下文与冷启动相位
        let recent_error_rate = options
            .recent_accuracy
            .map(|acc| (1.0 - acc).clamp(0.0, 1.0))
            .unwrap_or_else(|| models.recent_error_rate());
        let ctx = DecisionContext::from_event(&event, recent_error_rate);

        let interaction_count = options
            .interaction_count
            .unwrap_or(models.interaction_count);

        // 每用户超参数：探索日程按个体 alpha 缩放
        let schedule_alpha = LinUcbModel::cold_start_alpha(
            &config.linucb,
            interaction_count,
            1.0 - recent_error_rate,
            models.user_state.fatigue,
        );
        let effective_alpha =
            (schedule_alpha * params.alpha / config.linucb.base_alpha).clamp(0.1, 3.0);
        models.linucb.set_alpha(effective_alpha);

        let mut cold_start =
            ColdStartController::from_state(config.cold_start.clone(), models.cold_start.clone());
        let cold_start_active =
            config.feature_flags.cold_start_enabled && !cold_start.is_complete();

        // 学习与决策：冷启动期由控制器全权选择，否则集成投票
        let cold_selection = if cold_start_active {
            cold_start.select_action()
        } else {
            None
        };
        let (chosen_index, confidence, candidates, primary_reason) = match cold_selection {
            Some(selection) => (
                selection.candidate.action_index,
                selection.candidate.confidence,
                vec![selection.candidate],
                format!("cold start {}", cold_start.phase().as_str()),
            ),
            None => {
                self.ensemble_decision(&models, &ctx, &params, interaction_count, options, config)
            }
        };

        // 映射与守护
        let chosen_action = ACTION_SPACE[chosen_index];
        let raw_strategy = mapper::map_action_to_strategy(&chosen_action);
        let (final_strategy, applied_guardrails) =
            guardrails::apply(raw_strategy, &models.user_state, &config.constraints);

        // 对齐步骤：守护改写过的策略吸附回动作空间，
        // 训练信号与观测行为保持一致
        let aligned_index = mapper::nearest_action_index(&final_strategy);
        let aligned_action = ACTION_SPACE[aligned_index];

        let reward = reward::compute(&event, &models.user_state, &config.reward);

        if cancellation.fired() {
            return Err(PipelineAbort::Cancelled);
        }

        let skip_update = options.skip_update.unwrap_or(false);
        if !skip_update {
            let update_start = Instant::now();
            models
                .linucb
                .update(&models.user_state, &aligned_action, reward.value, &ctx);
            self.metrics.record_call(
                LearnerId::Linucb,
                update_start.elapsed().as_micros() as u64,
                false,
            );

            if config.feature_flags.thompson_enabled {
                models.thompson.update(aligned_index, reward.value);
            }

            if !cold_start_active && config.feature_flags.ensemble_enabled {
                ensemble::update_weights(
                    &mut models.ensemble_weights,
                    &candidates,
                    aligned_index,
                    reward.value,
                    &config.ensemble,
                );
            }

            cold_start.update(reward.value, event.is_correct, event.response_time);

            if config.feature_flags.user_params_enabled {
                self.user_params.update(
                    user_id,
                    event.is_correct,
                    models.user_state.fatigue,
                    models.user_state.motivation,
                    reward.value,
                );
            }

            models.push_outcome(event.is_correct);
            models.interaction_count += 1;
        }
        models.cold_start = cold_start.state().clone();
        let cold_start_phase = models.cold_start.phase;

        let should_break = guardrails::should_break(&models.user_state, &config.constraints);
        let suggestion = self.build_suggestion(&models.user_state, should_break, config);
        let explanation = self.build_explanation(
            &primary_reason,
            confidence,
            &models.user_state,
            &candidates,
            &applied_guardrails,
            &models.ensemble_weights,
        );
        let objective_evaluation =
            self.evaluate_objective(&reward, &models.user_state, &final_strategy);

        let result = ProcessResult {
            strategy: final_strategy,
            action_index: aligned_index,
            action: aligned_action,
            explanation,
            state: models.user_state.clone(),
            reward: reward.clone(),
            suggestion,
            should_break,
            feature_vector: Some(feature),
            cold_start_phase,
            objective_evaluation: Some(objective_evaluation),
            degraded_reason: None,
        };

        // 持久化边界：取消标志在写入前最后检查一次
        if cancellation.fired() {
            return Err(PipelineAbort::Cancelled);
        }

        if !skip_update {
            self.persist(user_id, &models).await;
            self.isolation.commit(user_id, models).await;
        }

        let latency_ms = start.elapsed().as_millis() as i64;
        monitoring::record_trace(
            &self.store,
            &self.salt,
            user_id,
            options.session_id.as_deref(),
            &result,
            latency_ms,
            &applied_guardrails,
            config,
        );

        Ok(result)
    }

    /// 集成决策：各成员产出候选，加权投票
    fn ensemble_decision(
        &self,
        models: &PerUserModels,
        ctx: &DecisionContext,
        params: &crate::amas::params::UserParams,
        interaction_count: u64,
        options: &ProcessOptions,
        config: &AMASConfig,
    ) -> (usize, f64, Vec<DecisionCandidate>, String) {
        let mut candidates = Vec::new();

        let linucb_start = Instant::now();
        if let Some(c) = models
            .linucb
            .select_action(&models.user_state, &ACTION_SPACE, ctx)
        {
            self.metrics.record_call(
                LearnerId::Linucb,
                linucb_start.elapsed().as_micros() as u64,
                false,
            );
            candidates.push(c);
        } else {
            self.metrics.record_call(
                LearnerId::Linucb,
                linucb_start.elapsed().as_micros() as u64,
                true,
            );
        }

        if config.feature_flags.thompson_enabled {
            let start = Instant::now();
            let mut thompson = models.thompson.clone();
            match thompson.select_action(ACTION_SPACE.len(), config.thompson.ess_k) {
                Some(c) => {
                    self.metrics.record_call(
                        LearnerId::Thompson,
                        start.elapsed().as_micros() as u64,
                        false,
                    );
                    candidates.push(c);
                }
                None => self.metrics.record_call(
                    LearnerId::Thompson,
                    start.elapsed().as_micros() as u64,
                    true,
                ),
            }
        }

        if config.feature_flags.actr_enabled {
            let start = Instant::now();
            let trace = options.word_review_history.clone().unwrap_or_default();
            let actr = ActrMemory::new(config.actr.clone());
            match actr.select_action(&trace, &ACTION_SPACE) {
                Some(c) => {
                    self.metrics.record_call(
                        LearnerId::Actr,
                        start.elapsed().as_micros() as u64,
                        false,
                    );
                    candidates.push(c);
                }
                None => self.metrics.record_call(
                    LearnerId::Actr,
                    start.elapsed().as_micros() as u64,
                    true,
                ),
            }
        }

        if config.feature_flags.heuristic_enabled {
            let start = Instant::now();
            let c = heuristic::generate(&models.user_state, ctx, params, interaction_count);
            self.metrics.record_call(
                LearnerId::Heuristic,
                start.elapsed().as_micros() as u64,
                false,
            );
            candidates.push(c);
        }

        if config.feature_flags.ensemble_enabled {
            let start = Instant::now();
            if let Some(decision) = ensemble::decide(&candidates, &models.ensemble_weights) {
                self.metrics.record_call(
                    LearnerId::Ensemble,
                    start.elapsed().as_micros() as u64,
                    false,
                );
                return (
                    decision.action_index,
                    decision.confidence,
                    candidates,
                    "ensemble vote".to_string(),
                );
            }
            self.metrics.record_call(
                LearnerId::Ensemble,
                start.elapsed().as_micros() as u64,
                true,
            );
        }

        // 单学习器或全员失败时的回退：优先 LinUCB 候选
        if let Some(c) = candidates
            .iter()
            .find(|c| c.learner == LearnerId::Linucb)
            .or_else(|| candidates.first())
        {
            return (
                c.action_index,
                c.confidence,
                candidates.clone(),
                format!("{} only", c.learner.as_str()),
            );
        }

        (4, 0.3, candidates, "static default".to_string())
    }

    /// 规则与时段感知的降级策略：深夜与高疲劳给缓坡，其余给标准
    fn fallback_result(
        &self,
        state: &UserState,
        event: &RawEvent,
        reason: &str,
        config: &AMASConfig,
    ) -> ProcessResult {
        use chrono::Timelike;
        let hour = chrono::DateTime::from_timestamp_millis(event.timestamp)
            .unwrap_or_else(chrono::Utc::now)
            .hour();

        let late_night = hour >= 22 || hour < 6;
        let action_index = if state.fatigue > config.constraints.high_fatigue || late_night {
            0
        } else if state.motivation < config.constraints.low_motivation {
            1
        } else {
            4
        };
        let action = ACTION_SPACE[action_index];
        let (strategy, applied) =
            guardrails::apply(action.to_strategy(), state, &config.constraints);
        let aligned_index = mapper::nearest_action_index(&strategy);

        let should_break = guardrails::should_break(state, &config.constraints);
        ProcessResult {
            strategy,
            action_index: aligned_index,
            action: ACTION_SPACE[aligned_index],
            explanation: DecisionExplanation {
                primary_reason: format!("fallback: {reason}"),
                factors: vec![],
                changes: applied,
            },
            state: state.clone(),
            reward: Reward {
                value: 0.0,
                components: RewardComponents::default(),
            },
            suggestion: Some("系统降级，维持保守学习节奏".to_string()),
            should_break,
            feature_vector: None,
            cold_start_phase: ColdStartPhase::Normal,
            objective_evaluation: None,
            degraded_reason: Some(reason.to_string()),
        }
    }

    fn build_suggestion(
        &self,
        state: &UserState,
        should_break: bool,
        config: &AMASConfig,
    ) -> Option<String> {
        if should_break {
            return Some("疲劳偏高，建议休息几分钟再继续".to_string());
        }
        if state.motivation < config.constraints.low_motivation {
            return Some("先复习熟悉内容找回状态".to_string());
        }
        if state.attention < config.constraints.min_attention {
            return Some("环境干扰较多，缩短本轮批量".to_string());
        }
        None
    }

    fn build_explanation(
        &self,
        primary_reason: &str,
        confidence: f64,
        state: &UserState,
        candidates: &[DecisionCandidate],
        applied_guardrails: &[String],
        weights: &ensemble::EnsembleWeights,
    ) -> DecisionExplanation {
        let mut factors = vec![
            DecisionFactor {
                name: "confidence".to_string(),
                value: confidence,
                impact: "neutral".to_string(),
            },
            DecisionFactor {
                name: "fatigue".to_string(),
                value: state.fatigue,
                impact: if state.fatigue > 0.7 { "negative" } else { "neutral" }.to_string(),
            },
            DecisionFactor {
                name: "attention".to_string(),
                value: state.attention,
                impact: if state.attention < 0.3 { "negative" } else { "neutral" }.to_string(),
            },
            DecisionFactor {
                name: "motivation".to_string(),
                value: state.motivation,
                impact: if state.motivation < -0.3 { "negative" } else { "neutral" }.to_string(),
            },
        ];
        for c in candidates {
            factors.push(DecisionFactor {
                name: format!("weight_{}", c.learner.as_str()),
                value: weights.get(c.learner),
                impact: "neutral".to_string(),
            });
        }
        DecisionExplanation {
            primary_reason: primary_reason.to_string(),
            factors,
            changes: applied_guardrails.to_vec(),
        }
    }

    fn evaluate_objective(
        &self,
        reward: &Reward,
        state: &UserState,
        strategy: &StrategyParams,
    ) -> ObjectiveEvaluation {
        let retention_gain = strategy.interval_scale * state.cognitive.mem * 0.5;
        let score = 0.35 * retention_gain + 0.25 * reward.components.correctness.max(0.0)
            + 0.15 * reward.components.speed_gain.max(0.0)
            - 0.15 * state.fatigue
            - 0.10 * reward.components.frustration;
        ObjectiveEvaluation {
            score,
            accuracy_gain: reward.components.correctness.max(0.0),
            speed_gain: reward.components.speed_gain,
            retention_gain,
            fatigue_cost: state.fatigue,
        }
    }

    /// arena 命中直接取束；未命中从两个仓库恢复；
    /// 离线超过一天的回归用户先做状态衰减
    async fn load_models(&self, user_id: &str, config: &AMASConfig) -> PerUserModels {
        if let Some(models) = self.isolation.checkout(user_id).await {
            return models;
        }

        let mut models = PerUserModels::fresh(config);

        match self.store.load_state(user_id) {
            Ok(Some(persisted)) => {
                models.user_state = persisted.user_state;
                models.cold_start = persisted.cold_start.unwrap_or_default();
                models.interaction_count = persisted.interaction_count;

                let offline_ms =
                    chrono::Utc::now().timestamp_millis() - persisted.last_updated;
                if offline_ms >= crate::constants::RETURNING_USER_THRESHOLD_MS {
                    // 回归用户：疲劳大幅回落，置信轻度折减
                    models.user_state.fatigue *= 0.25;
                    models.user_state.conf = (models.user_state.conf * 0.9).max(0.1);
                    models.user_state.clamp_in_place();
                    tracing::debug!(user_id, offline_ms, "Returning user decay applied");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id, error = %e, "State load failed, starting fresh");
            }
        }

        match self.store.load_model(user_id) {
            Ok(Some(snapshot)) => models.linucb.set_model(snapshot),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Bandit model load failed, starting fresh");
            }
        }

        if let Ok(Some(value)) = self.store.get_engine_algo_state(user_id, "thompson") {
            match serde_json::from_value(value) {
                Ok(thompson) => models.thompson = thompson,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Thompson state deserialize failed")
                }
            }
        }
        if let Ok(Some(value)) = self.store.get_engine_algo_state(user_id, "ensemble") {
            match serde_json::from_value::<ensemble::EnsembleWeights>(value) {
                Ok(mut weights) => {
                    weights.enforce_simplex(config.ensemble.min_weight);
                    models.ensemble_weights = weights;
                }
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Ensemble weights deserialize failed")
                }
            }
        }
        if let Ok(Some(value)) = self.store.get_engine_algo_state(user_id, "modeling") {
            match serde_json::from_value::<ModelingSuite>(value) {
                Ok(suite) => models.modeling = suite,
                Err(e) => {
                    tracing::warn!(user_id, error = %e, "Modeling suite deserialize failed")
                }
            }
        }

        models
    }

    /// 状态与模型按仓库原子落盘；失败只记录，不吞结果
    async fn persist(&self, user_id: &str, models: &PerUserModels) {
        let persisted = PersistedUserState {
            user_state: models.user_state.clone(),
            cold_start: Some(models.cold_start.clone()),
            interaction_count: models.interaction_count,
            last_updated: chrono::Utc::now().timestamp_millis(),
        };
        let snapshot = models.linucb.get_model();

        let algo_states = vec![
            (
                "thompson".to_string(),
                serde_json::to_value(&models.thompson).unwrap_or_default(),
            ),
            (
                "ensemble".to_string(),
                serde_json::to_value(&models.ensemble_weights).unwrap_or_default(),
            ),
            (
                "modeling".to_string(),
                serde_json::to_value(&models.modeling).unwrap_or_default(),
            ),
        ];

        if let Err(e) =
            self.store
                .persist_engine_state_atomic(user_id, &persisted, &snapshot, &algo_states)
        {
            self.breaker.record_failure();
            tracing::error!(user_id, error = %e, "Engine state persistence failed");
        }
    }

    async fn peek_state(&self, user_id: &str) -> Option<UserState> {
        if let Some(models) = self.isolation.checkout(user_id).await {
            return Some(models.user_state);
        }
        match self.store.load_state(user_id) {
            Ok(Some(persisted)) => Some(persisted.user_state),
            _ => None,
        }
    }

    pub async fn get_state(&self, user_id: &str) -> Result<Option<UserState>, AppError> {
        crate::validation::validate_user_id(user_id)
            .map_err(|msg| AppError::bad_request("INVALID_USER_ID", msg))?;
        Ok(self.peek_state(user_id).await)
    }

    pub async fn get_cold_start_phase(&self, user_id: &str) -> Result<ColdStartPhase, AppError> {
        crate::validation::validate_user_id(user_id)
            .map_err(|msg| AppError::bad_request("INVALID_USER_ID", msg))?;
        if let Some(models) = self.isolation.checkout(user_id).await {
            return Ok(models.cold_start.phase);
        }
        match self.store.load_state(user_id) {
            Ok(Some(persisted)) => Ok(persisted.cold_start.unwrap_or_default().phase),
            Ok(None) => Ok(ColdStartPhase::Classify),
            Err(e) => Err(AppError::internal(&e.to_string())),
        }
    }

    pub async fn reset_user(&self, user_id: &str) -> Result<(), AppError> {
        crate::validation::validate_user_id(user_id)
            .map_err(|msg| AppError::bad_request("INVALID_USER_ID", msg))?;

        let user_lock = self.isolation.user_lock(user_id).await;
        let _guard = user_lock.lock().await;

        self.isolation.remove(user_id).await;
        self.feature_builder.reset_windows(Some(user_id));
        self.user_params.reset_user(user_id);

        self.store
            .delete_state(user_id)
            .map_err(|e| AppError::internal(&e.to_string()))?;
        self.store
            .delete_model(user_id)
            .map_err(|e| AppError::internal(&e.to_string()))?;
        self.store
            .delete_engine_algo_states(user_id)
            .map_err(|e| AppError::internal(&e.to_string()))?;

        tracing::info!(user_id, "User state reset");
        Ok(())
    }

    /// 延迟奖励入口：维度偏差零补齐/截断后应用并落盘。
    /// 对调用方永不报维度错误。
    pub async fn apply_delayed_reward(
        &self,
        user_id: &str,
        feature_values: &[f64],
        reward_value: f64,
    ) -> DelayedRewardOutcome {
        if crate::validation::validate_user_id(user_id).is_err() {
            return DelayedRewardOutcome {
                success: false,
                error: Some("invalid user id".to_string()),
            };
        }
        if !reward_value.is_finite() || feature_values.iter().any(|v| !v.is_finite()) {
            return DelayedRewardOutcome {
                success: false,
                error: Some("non-finite input".to_string()),
            };
        }

        let config = self.config.read().await.clone();
        let user_lock = self.isolation.user_lock(user_id).await;
        let _guard = user_lock.lock().await;

        let mut models = self.load_models(user_id, &config).await;
        models
            .linucb
            .update_with_feature_vector(feature_values, reward_value.clamp(-1.0, 1.0));

        let snapshot = models.linucb.get_model();
        let outcome = match self.store.save_model(user_id, &snapshot) {
            Ok(()) => DelayedRewardOutcome {
                success: true,
                error: None,
            },
            Err(e) => DelayedRewardOutcome {
                success: false,
                error: Some(e.to_string()),
            },
        };
        self.isolation.commit(user_id, models).await;
        outcome
    }

    /// 批量顺序处理，上限由 constants::MAX_BATCH_EVENTS 约束
    pub async fn batch_process_events(
        &self,
        user_id: &str,
        events: Vec<RawEvent>,
        options: ProcessOptions,
    ) -> Result<Vec<ProcessResult>, AppError> {
        if events.len() > crate::constants::MAX_BATCH_EVENTS {
            return Err(AppError::bad_request(
                "BATCH_TOO_LARGE",
                &format!("batch exceeds {} events", crate::constants::MAX_BATCH_EVENTS),
            ));
        }
        let mut results = Vec::with_capacity(events.len());
        for event in events {
            results.push(self.process_event(user_id, event, options.clone()).await?);
        }
        Ok(results)
    }

    /// 周期清扫入口：隔离 arena、感知窗口与超参数缓存
    pub async fn sweep(&self) -> (usize, usize, usize) {
        let now = chrono::Utc::now().timestamp_millis();
        let arena = self.isolation.sweep_expired(now).await;
        let windows = self.feature_builder.sweep_expired(now);
        let params = self.user_params.sweep_expired(now);
        if arena + windows + params > 0 {
            tracing::debug!(arena, windows, params, "Engine sweep reclaimed entries");
        }
        (arena, windows, params)
    }

    pub async fn resident_users(&self) -> usize {
        self.isolation.resident_users().await
    }
}

enum PipelineAbort {
    Cancelled,
    Anomalous,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_config() -> AMASConfig {
        let mut config = AMASConfig::default();
        config.isolation.decision_timeout_ms = crate::constants::DECISION_TIMEOUT_TEST_MS;
        config
    }

    fn engine_with_store() -> (AMASEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store =
            Arc::new(Store::open(dir.path().join("engine-test").to_str().unwrap()).unwrap());
        (AMASEngine::new(test_config(), store), dir)
    }

    fn event(correct: bool, rt: i64) -> RawEvent {
        RawEvent {
            word_id: "w1".to_string(),
            is_correct: correct,
            response_time: rt,
            ..RawEvent::default()
        }
    }

    #[tokio::test]
    async fn process_event_returns_sane_result() {
        let (engine, _dir) = engine_with_store();
        let result = engine
            .process_event("u1", event(true, 1500), ProcessOptions::default())
            .await
            .unwrap();
        assert!(result.state.is_sane());
        assert!(result.action_index < ACTION_SPACE.len());
        assert!(result.degraded_reason.is_none());
        assert!((-1.0..=1.0).contains(&result.reward.value));
    }

    #[tokio::test]
    async fn invalid_user_id_is_rejected() {
        let (engine, _dir) = engine_with_store();
        let err = engine
            .process_event("", event(true, 1500), ProcessOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "INVALID_USER_ID");
    }

    #[tokio::test]
    async fn anomalous_event_degrades_without_mutation() {
        let (engine, _dir) = engine_with_store();
        let bad = RawEvent {
            response_time: 0,
            ..RawEvent::default()
        };
        let result = engine
            .process_event("u1", bad, ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(result.degraded_reason.as_deref(), Some("degraded_state"));
        // 模型未被触碰
        assert!(engine.store.load_state("u1").unwrap().is_none());
        assert!(engine.store.load_model("u1").unwrap().is_none());
    }

    #[tokio::test]
    async fn skip_update_leaves_persisted_state_unchanged() {
        let (engine, _dir) = engine_with_store();
        engine
            .process_event("u1", event(true, 1500), ProcessOptions::default())
            .await
            .unwrap();
        let before_state = engine.store.load_state("u1").unwrap().unwrap();
        let before_model = engine.store.load_model("u1").unwrap().unwrap();

        let options = ProcessOptions {
            skip_update: Some(true),
            ..ProcessOptions::default()
        };
        engine
            .process_event("u1", event(false, 9000), options)
            .await
            .unwrap();

        let after_state = engine.store.load_state("u1").unwrap().unwrap();
        let after_model = engine.store.load_model("u1").unwrap().unwrap();
        assert_eq!(before_state.interaction_count, after_state.interaction_count);
        assert_eq!(before_model, after_model);
    }

    #[tokio::test]
    async fn circuit_open_returns_fast_fallback() {
        let (engine, _dir) = engine_with_store();
        for _ in 0..test_config().isolation.breaker_failure_threshold {
            engine.breaker.record_failure();
        }
        let start = Instant::now();
        let result = engine
            .process_event("u1", event(true, 1500), ProcessOptions::default())
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(2));
        assert_eq!(result.degraded_reason.as_deref(), Some("circuit_open"));
    }

    #[tokio::test]
    async fn cold_start_fast_user_reaches_challenge() {
        let (engine, _dir) = engine_with_store();
        let mut last = None;
        for _ in 0..5 {
            last = Some(
                engine
                    .process_event("u1", event(true, 1200), ProcessOptions::default())
                    .await
                    .unwrap(),
            );
        }
        let result = last.unwrap();
        assert_eq!(result.cold_start_phase, ColdStartPhase::Explore);

        let next = engine
            .process_event("u1", event(true, 1200), ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(next.action.difficulty, DifficultyLevel::Hard);
        assert!((next.action.new_ratio - 0.35).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fatigue_guardrail_clamps_strategy() {
        let (engine, _dir) = engine_with_store();
        let mut result = None;
        for _ in 0..4 {
            let heavy = RawEvent {
                is_correct: false,
                response_time: 8000,
                pause_count: 3,
                ..RawEvent::default()
            };
            result = Some(
                engine
                    .process_event("u1", heavy, ProcessOptions::default())
                    .await
                    .unwrap(),
            );
        }
        let result = result.unwrap();
        assert!(result.state.fatigue > 0.7);
        assert!(result.strategy.interval_scale >= 1.0);
        assert!(result.strategy.new_ratio <= 0.2);
        assert!(result.strategy.batch_size <= 8);
        assert!(result.should_break);
    }

    #[tokio::test]
    async fn delayed_reward_accepts_dimension_skew() {
        let (engine, _dir) = engine_with_store();
        engine
            .process_event("u1", event(true, 1500), ProcessOptions::default())
            .await
            .unwrap();
        let before = engine.store.load_model("u1").unwrap().unwrap().update_count;

        let outcome = engine.apply_delayed_reward("u1", &vec![0.3; 12], 0.8).await;
        assert!(outcome.success, "{:?}", outcome.error);

        let after = engine.store.load_model("u1").unwrap().unwrap().update_count;
        assert_eq!(after, before + 1);
    }

    #[tokio::test]
    async fn reset_user_clears_everything() {
        let (engine, _dir) = engine_with_store();
        engine
            .process_event("u1", event(true, 1500), ProcessOptions::default())
            .await
            .unwrap();
        engine.reset_user("u1").await.unwrap();
        assert!(engine.store.load_state("u1").unwrap().is_none());
        assert!(engine.store.load_model("u1").unwrap().is_none());
        assert!(engine.get_state("u1").await.unwrap().is_none());
        assert_eq!(
            engine.get_cold_start_phase("u1").await.unwrap(),
            ColdStartPhase::Classify
        );
    }

    #[tokio::test]
    async fn batch_is_bounded() {
        let (engine, _dir) = engine_with_store();
        let events = vec![RawEvent::default(); 101];
        let err = engine
            .batch_process_events("u1", events, ProcessOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "BATCH_TOO_LARGE");
    }

    #[tokio::test]
    async fn reload_config_validates() {
        let (engine, _dir) = engine_with_store();
        let mut bad = AMASConfig::default();
        bad.monitoring.sample_rate = 9.0;
        assert!(engine.reload_config(bad).await.is_err());
        assert!(engine.reload_config(test_config()).await.is_ok());
    }
}
