use serde::{Deserialize, Serialize};

use crate::amas::config::AttentionWeights;

/// 注意力估计器：A_t = β·A_{t-1} + (1-β)·σ(-w·f)。
/// 特征维度不足 8 时保持上一拍不变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionMonitor {
    current: f64,
}

impl Default for AttentionMonitor {
    fn default() -> Self {
        Self { current: 0.7 }
    }
}

impl AttentionMonitor {
    pub fn update(&mut self, features: &[f64], weights: &AttentionWeights, beta: f64) -> f64 {
        if features.len() < 8 {
            return self.current;
        }

        let w = [
            weights.rt_mean,
            weights.rt_cv,
            weights.pace_cv,
            weights.pause,
            weights.switch,
            weights.drift,
            weights.interaction,
            weights.focus_loss,
        ];
        let dot: f64 = w.iter().zip(features.iter()).map(|(wi, fi)| wi * fi).sum();
        if !dot.is_finite() {
            return self.current;
        }

        // σ(-dot)：特征偏离越大（z 值越高），注意力越低
        let sig = 1.0 / (1.0 + dot.exp());
        self.current = (beta * self.current + (1.0 - beta) * sig).clamp(0.0, 1.0);
        self.current
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = 0.7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_features_keep_attention_mid() {
        let mut m = AttentionMonitor::default();
        let a = m.update(&[0.0; 8], &AttentionWeights::default(), 0.7);
        assert!((0.4..=0.8).contains(&a));
    }

    #[test]
    fn high_deviation_lowers_attention() {
        let mut m = AttentionMonitor::default();
        for _ in 0..20 {
            m.update(&[3.0; 8], &AttentionWeights::default(), 0.7);
        }
        assert!(m.current() < 0.4);
    }

    #[test]
    fn dim_mismatch_returns_previous() {
        let mut m = AttentionMonitor::default();
        let before = m.current();
        let after = m.update(&[1.0; 3], &AttentionWeights::default(), 0.7);
        assert_eq!(before, after);
    }

    #[test]
    fn result_always_in_unit_interval() {
        let mut m = AttentionMonitor::default();
        for v in [-100.0, 100.0, 0.0] {
            let a = m.update(&[v; 8], &AttentionWeights::default(), 0.7);
            assert!((0.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn non_finite_features_keep_previous() {
        let mut m = AttentionMonitor::default();
        let before = m.current();
        let mut features = [0.0; 8];
        features[2] = f64::NAN;
        let after = m.update(&features, &AttentionWeights::default(), 0.7);
        assert_eq!(before, after);
    }
}
