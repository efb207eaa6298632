use serde::{Deserialize, Serialize};

use crate::amas::config::LinUCBConfig;
use crate::amas::learning::math::*;
use crate::amas::learning::DecisionContext;
use crate::amas::types::{Action, BanditSnapshot, DecisionCandidate, LearnerId, UserState};
use crate::constants::LINUCB_CONTEXT_DIM;

/// 上下文 bandit：固定动作集上的 LinUCB，协方差经增量 Cholesky 维护。
/// 不变式：A = L·Lᵀ（舍入误差内），L 对角 >= sqrt(lambda)·0.1。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinUcbModel {
    d: usize,
    lambda: f64,
    alpha: f64,
    a: Vec<f64>,
    b: Vec<f64>,
    l: Vec<f64>,
    update_count: u64,
    #[serde(skip, default)]
    config: LinUCBConfig,
}

impl LinUcbModel {
    pub fn new(config: &LinUCBConfig) -> Self {
        let d = LINUCB_CONTEXT_DIM;
        let lambda = config.lambda.max(MIN_LAMBDA);
        let sqrt_lambda = lambda.sqrt();

        let mut a = vec![0.0; d * d];
        let mut l = vec![0.0; d * d];
        for i in 0..d {
            a[i * d + i] = lambda;
            l[i * d + i] = sqrt_lambda;
        }

        Self {
            d,
            lambda,
            alpha: config.base_alpha,
            a,
            b: vec![0.0; d],
            l,
            update_count: 0,
            config: config.clone(),
        }
    }

    pub fn dim(&self) -> usize {
        self.d
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn set_alpha(&mut self, value: f64) {
        if value.is_finite() {
            self.alpha = value.max(0.0);
        }
    }

    fn min_diag(&self) -> f64 {
        self.lambda.sqrt() * RANK1_DIAG_FLOOR_RATIO
    }

    /// 22 维上下文：[状态(5), 近期错误率, 动作(5), rtNorm, 时间(3), 交叉(6), 偏置]
    pub fn build_context_vector(
        &self,
        state: &UserState,
        action: &Action,
        ctx: &DecisionContext,
    ) -> Vec<f64> {
        let mut x = vec![0.0; self.d];
        let mut idx = 0;

        // 状态特征 (5)
        let motivation_norm = (state.motivation + 1.0) / 2.0;
        x[idx] = state.attention;
        idx += 1;
        x[idx] = state.fatigue;
        idx += 1;
        x[idx] = motivation_norm;
        idx += 1;
        x[idx] = state.cognitive.mem;
        idx += 1;
        x[idx] = state.cognitive.stability;
        idx += 1;

        // 近期错误率 (1)
        x[idx] = ctx.recent_error_rate.clamp(0.0, 1.0);
        idx += 1;

        // 动作特征 (5)
        let difficulty = action.difficulty.encoded();
        x[idx] = difficulty;
        idx += 1;
        x[idx] = action.new_ratio;
        idx += 1;
        x[idx] = action.batch_size as f64 / 16.0;
        idx += 1;
        x[idx] = action.interval_scale;
        idx += 1;
        x[idx] = action.hint_level as f64 / 2.0;
        idx += 1;

        // 响应时间 (1)
        x[idx] = ctx.rt_norm.clamp(0.0, 1.0);
        idx += 1;

        // 时间特征 (3)：线性 + sin/cos，避免午夜断点
        let hour_norm = (ctx.hour_of_day as f64) / 24.0;
        let angle = 2.0 * std::f64::consts::PI * hour_norm;
        x[idx] = hour_norm;
        idx += 1;
        x[idx] = angle.sin();
        idx += 1;
        x[idx] = angle.cos();
        idx += 1;

        // 交叉特征 (6)
        x[idx] = state.attention * (1.0 - state.fatigue);
        idx += 1;
        x[idx] = state.cognitive.mem * difficulty;
        idx += 1;
        x[idx] = (1.0 - ctx.recent_error_rate.clamp(0.0, 1.0)) * difficulty;
        idx += 1;
        x[idx] = motivation_norm * action.new_ratio;
        idx += 1;
        x[idx] = hour_norm * state.fatigue;
        idx += 1;
        x[idx] = state.cognitive.speed * ctx.rt_norm.clamp(0.0, 1.0);
        idx += 1;

        // 偏置 (1)
        x[idx] = 1.0;

        for v in x.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            } else {
                *v = v.clamp(-self.config.feature_clip, self.config.feature_clip);
            }
        }
        x
    }

    fn theta(&self) -> Vec<f64> {
        let theta = solve_cholesky(&self.l, &self.b, self.d);
        if theta.iter().any(|v| !v.is_finite()) {
            // 求解失败退回零向量基线
            return vec![0.0; self.d];
        }
        theta
    }

    /// 全动作集打分取 argmax，平手取先出现者
    pub fn select_action(
        &self,
        state: &UserState,
        actions: &[Action],
        ctx: &DecisionContext,
    ) -> Option<DecisionCandidate> {
        if actions.is_empty() {
            return None;
        }

        let theta = self.theta();
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_exploration = 0.0;

        for (idx, action) in actions.iter().enumerate() {
            let x = self.build_context_vector(state, action, ctx);
            let exploitation = dot_product(&theta, &x);
            let exploration = compute_quadratic_form(&self.l, &x, self.d).max(0.0).sqrt();
            let score = exploitation + self.alpha * exploration;
            if !score.is_finite() {
                continue;
            }
            if score > best_score {
                best_score = score;
                best_idx = idx;
                best_exploration = exploration;
            }
        }

        if best_score == f64::NEG_INFINITY {
            return None;
        }

        Some(DecisionCandidate {
            learner: LearnerId::Linucb,
            action_index: best_idx,
            score: best_score,
            confidence: self.confidence(best_exploration),
            explanation: format!(
                "ucb argmax (alpha={:.2}, updates={})",
                self.alpha, self.update_count
            ),
        })
    }

    /// 探索半径越小置信越高
    fn confidence(&self, exploration: f64) -> f64 {
        (1.0 - 0.3 * exploration).clamp(0.4, 1.0)
    }

    pub fn update(&mut self, state: &UserState, action: &Action, reward: f64, ctx: &DecisionContext) {
        let x = self.build_context_vector(state, action, ctx);
        self.update_with_context(&x, reward);
    }

    /// 核心更新：A += x·xᵀ，b += r·x，L 走 rank-1；
    /// 失败或健康检查不过时从修复后的 A 完整重分解。
    pub fn update_with_context(&mut self, x: &[f64], reward: f64) {
        if x.len() != self.d || !reward.is_finite() || x.iter().any(|v| !v.is_finite()) {
            // 非法输入跳过更新，不做部分写入
            return;
        }

        let clipped: Vec<f64> = x
            .iter()
            .map(|v| v.clamp(-self.config.feature_clip, self.config.feature_clip))
            .collect();

        rank1_update_matrix(&mut self.a, &clipped, self.d);
        vec_add_scaled(&mut self.b, &clipped, reward);

        let min_diag = self.min_diag();
        let ok = cholesky_rank1_update(&mut self.l, &clipped, self.d, min_diag);
        if !ok || !factor_is_healthy(&self.l, self.d, min_diag, self.config.max_covariance) {
            self.redecompose();
        }

        self.update_count += 1;
    }

    /// 延迟奖励入口：维度不符时零补齐或截断后应用
    pub fn update_with_feature_vector(&mut self, values: &[f64], reward: f64) {
        let mut x = values.to_vec();
        if x.len() != self.d {
            tracing::info!(
                got = x.len(),
                expected = self.d,
                "Delayed reward vector dimension mismatch, padding/truncating"
            );
            x.resize(self.d, 0.0);
        }
        self.update_with_context(&x, reward);
    }

    fn redecompose(&mut self) {
        sanitize_covariance(&mut self.a, self.d, self.lambda, self.config.max_covariance);
        self.l = cholesky_decompose(&self.a, self.d, self.lambda);
    }

    pub fn get_model(&self) -> BanditSnapshot {
        BanditSnapshot {
            d: self.d,
            lambda: self.lambda,
            alpha: self.alpha,
            a: self.a.clone(),
            b: self.b.clone(),
            l: self.l.clone(),
            update_count: self.update_count,
        }
    }

    /// 装载快照并做维度迁移：
    /// - 旧模型更小：零扩展进左上块，其余对角置 lambda，重算 L
    /// - 旧模型更大：降维直接重置为先验
    /// 装载后统一对称化修复并检查因子健康。
    pub fn set_model(&mut self, snapshot: BanditSnapshot) {
        let expected = self.d;
        let lambda = snapshot.lambda.max(MIN_LAMBDA);
        self.lambda = lambda;
        if snapshot.alpha.is_finite() && snapshot.alpha > 0.0 {
            self.alpha = snapshot.alpha;
        }
        self.update_count = snapshot.update_count;

        let old_d = snapshot.d;
        if old_d == expected
            && snapshot.a.len() == expected * expected
            && snapshot.b.len() == expected
        {
            self.a = snapshot.a;
            self.b = snapshot.b;
            if snapshot.l.len() == expected * expected {
                self.l = snapshot.l;
            }
        } else if old_d < expected
            && snapshot.a.len() == old_d * old_d
            && snapshot.b.len() == old_d
        {
            let mut a = vec![0.0; expected * expected];
            let mut b = vec![0.0; expected];
            for i in 0..expected {
                a[i * expected + i] = lambda;
            }
            for i in 0..old_d {
                for j in 0..old_d {
                    a[i * expected + j] = snapshot.a[i * old_d + j];
                }
                b[i] = snapshot.b[i];
            }
            self.a = a;
            self.b = b;
            self.l = vec![0.0; expected * expected];
            tracing::info!(from = old_d, to = expected, "Bandit model dimension migrated");
        } else {
            tracing::warn!(
                from = old_d,
                to = expected,
                "Bandit model downsized or malformed, resetting to prior"
            );
            let fresh = Self::new(&self.config);
            self.a = fresh.a;
            self.b = fresh.b;
            self.l = fresh.l;
            self.update_count = 0;
            return;
        }

        sanitize_covariance(&mut self.a, self.d, self.lambda, self.config.max_covariance);
        for v in self.b.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        if !factor_is_healthy(&self.l, self.d, self.min_diag(), self.config.max_covariance) {
            self.l = cholesky_decompose(&self.a, self.d, self.lambda);
        }
    }

    /// 冷启动探索日程：交互少多探索，中期按表现分档，之后回落
    pub fn cold_start_alpha(
        config: &LinUCBConfig,
        interaction_count: u64,
        recent_accuracy: f64,
        fatigue: f64,
    ) -> f64 {
        if interaction_count < config.early_interactions {
            config.alpha_early
        } else if interaction_count < config.warm_interactions {
            if recent_accuracy > 0.75 && fatigue < 0.5 {
                config.alpha_warm_confident
            } else {
                config.alpha_warm_default
            }
        } else {
            config.alpha_settled
        }
    }

    /// 重建 A 与 L·Lᵀ 的相对误差，诊断用
    pub fn reconstruction_error(&self) -> f64 {
        let d = self.d;
        let mut max_err = 0.0f64;
        for i in 0..d {
            for j in 0..d {
                let mut sum = 0.0;
                for k in 0..d {
                    sum += self.l[i * d + k] * self.l[j * d + k];
                }
                let denom = self.a[i * d + j].abs().max(1.0);
                max_err = max_err.max(((sum - self.a[i * d + j]) / denom).abs());
            }
        }
        max_err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::ACTION_SPACE;

    fn model() -> LinUcbModel {
        LinUcbModel::new(&LinUCBConfig::default())
    }

    fn ctx() -> DecisionContext {
        DecisionContext {
            recent_error_rate: 0.2,
            rt_norm: 0.3,
            hour_of_day: 14,
        }
    }

    #[test]
    fn context_vector_has_expected_dim_and_bias() {
        let m = model();
        let x = m.build_context_vector(&UserState::default(), &ACTION_SPACE[3], &ctx());
        assert_eq!(x.len(), LINUCB_CONTEXT_DIM);
        assert_eq!(x[LINUCB_CONTEXT_DIM - 1], 1.0);
        assert!(x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn select_action_returns_valid_index() {
        let m = model();
        let candidate = m
            .select_action(&UserState::default(), &ACTION_SPACE, &ctx())
            .unwrap();
        assert!(candidate.action_index < ACTION_SPACE.len());
        assert!((0.4..=1.0).contains(&candidate.confidence));
    }

    #[test]
    fn select_action_empty_set_returns_none() {
        let m = model();
        assert!(m.select_action(&UserState::default(), &[], &ctx()).is_none());
    }

    #[test]
    fn update_increments_count_and_moves_b() {
        let mut m = model();
        let before_b = m.b.clone();
        m.update(&UserState::default(), &ACTION_SPACE[0], 1.0, &ctx());
        assert_eq!(m.update_count(), 1);
        assert_ne!(m.b, before_b);
    }

    #[test]
    fn non_finite_reward_skips_update() {
        let mut m = model();
        m.update(&UserState::default(), &ACTION_SPACE[0], f64::NAN, &ctx());
        assert_eq!(m.update_count(), 0);
    }

    #[test]
    fn factor_reconstructs_covariance() {
        let mut m = model();
        let state = UserState::default();
        for i in 0..100 {
            let action = ACTION_SPACE[i % ACTION_SPACE.len()];
            let reward = if i % 3 == 0 { 1.0 } else { -0.5 };
            m.update(&state, &action, reward, &ctx());
        }
        assert!(m.reconstruction_error() < 1e-3);
        assert!(factor_is_healthy(&m.l, m.d, m.min_diag(), 1e9));
    }

    #[test]
    fn converges_to_rewarded_action() {
        let mut m = model();
        let state = UserState::default();
        let target = 3;
        for _ in 0..200 {
            for (idx, action) in ACTION_SPACE.iter().enumerate() {
                let reward = if idx == target { 1.0 } else { -1.0 };
                m.update(&state, action, reward, &ctx());
            }
        }
        let mut hits = 0;
        for _ in 0..20 {
            let c = m.select_action(&state, &ACTION_SPACE, &ctx()).unwrap();
            if c.action_index == target {
                hits += 1;
            }
        }
        assert!(hits >= 18, "selected target {hits}/20 times");
    }

    #[test]
    fn snapshot_roundtrip_preserves_model() {
        let mut m = model();
        let state = UserState::default();
        for _ in 0..10 {
            m.update(&state, &ACTION_SPACE[5], 0.7, &ctx());
        }
        let snap = m.get_model();
        let mut fresh = model();
        fresh.set_model(snap.clone());
        assert_eq!(fresh.get_model().b, snap.b);
        assert_eq!(fresh.update_count(), snap.update_count);
    }

    #[test]
    fn smaller_snapshot_migrates_into_top_left() {
        let old_d = 10;
        let mut a = vec![0.0; old_d * old_d];
        for i in 0..old_d {
            a[i * old_d + i] = 2.0;
        }
        let snap = BanditSnapshot {
            d: old_d,
            lambda: 1.0,
            alpha: 0.7,
            a,
            b: vec![0.5; old_d],
            l: vec![],
            update_count: 42,
        };

        let mut m = model();
        m.set_model(snap);
        assert_eq!(m.dim(), LINUCB_CONTEXT_DIM);
        assert_eq!(m.update_count(), 42);
        // 左上块保留，新增维度为先验对角
        assert_eq!(m.b[0], 0.5);
        assert_eq!(m.b[old_d], 0.0);
        assert!(m.reconstruction_error() < 1e-3);
    }

    #[test]
    fn oversized_snapshot_resets_to_prior() {
        let big_d = 30;
        let snap = BanditSnapshot {
            d: big_d,
            lambda: 1.0,
            alpha: 0.7,
            a: vec![0.0; big_d * big_d],
            b: vec![1.0; big_d],
            l: vec![],
            update_count: 9,
        };
        let mut m = model();
        m.set_model(snap);
        assert_eq!(m.update_count(), 0);
        assert!(m.b.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn delayed_reward_pads_and_truncates() {
        let mut m = model();
        m.update_with_feature_vector(&vec![0.5; 12], 0.8);
        assert_eq!(m.update_count(), 1);
        m.update_with_feature_vector(&vec![0.5; 40], 0.8);
        assert_eq!(m.update_count(), 2);
    }

    #[test]
    fn cold_start_alpha_schedule() {
        let cfg = LinUCBConfig::default();
        assert_eq!(LinUcbModel::cold_start_alpha(&cfg, 5, 0.9, 0.1), 0.5);
        assert_eq!(LinUcbModel::cold_start_alpha(&cfg, 30, 0.9, 0.1), 2.0);
        assert_eq!(LinUcbModel::cold_start_alpha(&cfg, 30, 0.5, 0.1), 1.0);
        assert_eq!(LinUcbModel::cold_start_alpha(&cfg, 30, 0.9, 0.8), 1.0);
        assert_eq!(LinUcbModel::cold_start_alpha(&cfg, 200, 0.9, 0.1), 0.7);
    }
}
