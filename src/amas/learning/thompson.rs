use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::amas::config::ThompsonConfig;
use crate::amas::types::{DecisionCandidate, LearnerId};

const MAX_GAMMA_ITERATIONS: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaArm {
    pub alpha: f64,
    pub beta: f64,
    pub pulls: u64,
}

impl BetaArm {
    fn new(prior_alpha: f64, prior_beta: f64) -> Self {
        Self {
            alpha: prior_alpha,
            beta: prior_beta,
            pulls: 0,
        }
    }
}

/// 固定动作集上的 Beta-Bernoulli 采样器。
/// 奖励从 [-1,1] 归一化到 [0,1] 后计入伪计数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThompsonSampler {
    prior_alpha: f64,
    prior_beta: f64,
    arms: Vec<BetaArm>,
}

impl ThompsonSampler {
    pub fn new(config: &ThompsonConfig, arm_count: usize) -> Self {
        Self {
            prior_alpha: config.prior_alpha,
            prior_beta: config.prior_beta,
            arms: (0..arm_count)
                .map(|_| BetaArm::new(config.prior_alpha, config.prior_beta))
                .collect(),
        }
    }

    /// 动作数可能随部署变化：多出的臂用先验补齐，多余的截断
    fn ensure_arms(&mut self, arm_count: usize) {
        while self.arms.len() < arm_count {
            self.arms.push(BetaArm::new(self.prior_alpha, self.prior_beta));
        }
        self.arms.truncate(arm_count.max(1));
    }

    pub fn select_action(&mut self, arm_count: usize, ess_k: f64) -> Option<DecisionCandidate> {
        self.ensure_arms(arm_count);
        if self.arms.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        let mut best_idx = 0;
        let mut best_sample = f64::NEG_INFINITY;

        for (idx, arm) in self.arms.iter().enumerate() {
            let sample = sample_beta(&mut rng, arm.alpha, arm.beta);
            if sample > best_sample {
                best_sample = sample;
                best_idx = idx;
            }
        }

        let arm = &self.arms[best_idx];
        let effective_n = (arm.alpha + arm.beta - self.prior_alpha - self.prior_beta).max(0.0);
        let confidence = effective_n / (effective_n + ess_k);

        Some(DecisionCandidate {
            learner: LearnerId::Thompson,
            action_index: best_idx,
            score: best_sample,
            confidence: confidence.clamp(0.0, 1.0),
            explanation: format!("beta sample {best_sample:.3} (pulls={})", arm.pulls),
        })
    }

    pub fn update(&mut self, action_index: usize, reward: f64) {
        if !reward.is_finite() {
            return;
        }
        self.ensure_arms(action_index + 1);
        let normalized = (reward.clamp(-1.0, 1.0) + 1.0) / 2.0;
        let arm = &mut self.arms[action_index];
        arm.alpha += normalized;
        arm.beta += 1.0 - normalized;
        arm.pulls += 1;
    }

    pub fn arm(&self, action_index: usize) -> Option<&BetaArm> {
        self.arms.get(action_index)
    }

    pub fn reset(&mut self) {
        for arm in self.arms.iter_mut() {
            *arm = BetaArm::new(self.prior_alpha, self.prior_beta);
        }
    }
}

fn sample_beta<R: Rng>(rng: &mut R, alpha: f64, beta: f64) -> f64 {
    if alpha <= 0.0 || beta <= 0.0 {
        return 0.5;
    }

    let gamma1 = sample_gamma(rng, alpha, 1.0);
    let gamma2 = sample_gamma(rng, beta, 1.0);

    if gamma1 + gamma2 == 0.0 {
        return 0.5;
    }

    gamma1 / (gamma1 + gamma2)
}

/// Marsaglia-Tsang 采样；shape < 1 时递归提升
fn sample_gamma<R: Rng>(rng: &mut R, shape: f64, scale: f64) -> f64 {
    if shape < 1.0 {
        let u: f64 = rng.gen();
        return sample_gamma(rng, shape + 1.0, scale) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();

    for _ in 0..MAX_GAMMA_ITERATIONS {
        let z = random_normal(rng);
        let v = (1.0 + c * z).powi(3);

        if v <= 0.0 {
            continue;
        }

        let u: f64 = rng.gen();
        let z_sq = z * z;

        if u < 1.0 - 0.0331 * z_sq * z_sq {
            return d * v * scale;
        }

        if u.ln() < 0.5 * z_sq + d * (1.0 - v + v.ln()) {
            return d * v * scale;
        }
    }

    d * scale
}

fn random_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-10);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
