use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::amas::config::AMASConfig;
use crate::amas::decision::guardrails;
use crate::amas::types::{ColdStartPhase, ProcessResult, ACTION_SPACE};
use crate::store::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    pub field: String,
    pub value: f64,
    pub expected_range: String,
}

/// 决策轨迹事件。用户 ID 经当日盐匿名化后落盘。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTrace {
    pub id: String,
    pub user_hash: String,
    pub session_id: Option<String>,
    pub ts: i64,
    pub latency_ms: i64,
    pub action_index: usize,
    pub reward_value: f64,
    pub cold_start_phase: String,
    pub is_anomaly: bool,
    pub invariant_violations: Vec<InvariantViolation>,
    pub guardrails_applied: Vec<String>,
    pub degraded_reason: Option<String>,
    pub strategy: serde_json::Value,
    pub state: serde_json::Value,
}

/// 进程级当日盐：跨天轮换，同一天内同一用户映射稳定
pub struct DailySalt {
    inner: Mutex<(String, [u8; 16])>,
}

impl DailySalt {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new((today(), rand::random())),
        }
    }

    pub fn anonymize(&self, user_id: &str) -> String {
        let mut guard = self.inner.lock().expect("daily salt lock");
        let date = today();
        if guard.0 != date {
            *guard = (date, rand::random());
        }
        let mut hasher = Sha256::new();
        hasher.update(guard.1);
        hasher.update(user_id.as_bytes());
        hex::encode(&hasher.finalize()[..8])
    }
}

impl Default for DailySalt {
    fn default() -> Self {
        Self::new()
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// 全局不变式检查：状态分量范围、动作合法性、守护约束满足
pub fn check_invariants(result: &ProcessResult, config: &AMASConfig) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    check_range(&mut violations, "attention", result.state.attention, 0.0, 1.0);
    check_range(&mut violations, "fatigue", result.state.fatigue, 0.0, 1.0);
    check_range(&mut violations, "motivation", result.state.motivation, -1.0, 1.0);
    check_range(&mut violations, "conf", result.state.conf, 0.0, 1.0);
    check_range(&mut violations, "cognitive.mem", result.state.cognitive.mem, 0.0, 1.0);
    check_range(&mut violations, "cognitive.speed", result.state.cognitive.speed, 0.0, 1.0);
    check_range(
        &mut violations,
        "cognitive.stability",
        result.state.cognitive.stability,
        0.0,
        1.0,
    );

    if result.action_index >= ACTION_SPACE.len() {
        violations.push(InvariantViolation {
            field: "action_index".to_string(),
            value: result.action_index as f64,
            expected_range: format!("< {}", ACTION_SPACE.len()),
        });
    }

    check_range(
        &mut violations,
        "strategy.interval_scale",
        result.strategy.interval_scale,
        0.5,
        1.5,
    );
    check_range(
        &mut violations,
        "strategy.new_ratio",
        result.strategy.new_ratio,
        0.1,
        0.4,
    );
    if !(5..=16).contains(&result.strategy.batch_size) {
        violations.push(InvariantViolation {
            field: "strategy.batch_size".to_string(),
            value: result.strategy.batch_size as f64,
            expected_range: "[5, 16]".to_string(),
        });
    }

    if !guardrails::satisfied(&result.strategy, &result.state, &config.constraints) {
        violations.push(InvariantViolation {
            field: "guardrails".to_string(),
            value: 0.0,
            expected_range: "all active clauses satisfied".to_string(),
        });
    }

    violations
}

fn check_range(
    violations: &mut Vec<InvariantViolation>,
    field: &str,
    value: f64,
    min: f64,
    max: f64,
) {
    if value.is_nan() {
        violations.push(InvariantViolation {
            field: field.to_string(),
            value: f64::NAN,
            expected_range: format!("[{min}, {max}]"),
        });
        return;
    }
    if value < min || value > max {
        violations.push(InvariantViolation {
            field: field.to_string(),
            value,
            expected_range: format!("[{min}, {max}]"),
        });
    }
}

/// 采样决策：异常与冷启动阶段全采，其余按配置采样率
pub fn should_sample(is_anomaly: bool, cold_start_phase: ColdStartPhase, sample_rate: f64) -> bool {
    if is_anomaly {
        return true;
    }
    if !matches!(cold_start_phase, ColdStartPhase::Normal) {
        return true;
    }
    rand::random::<f64>() < sample_rate
}

/// 落盘一条决策轨迹（尽力而为，失败只记日志）
#[allow(clippy::too_many_arguments)]
pub fn record_trace(
    store: &Store,
    salt: &DailySalt,
    user_id: &str,
    session_id: Option<&str>,
    result: &ProcessResult,
    latency_ms: i64,
    guardrails_applied: &[String],
    config: &AMASConfig,
) {
    let violations = check_invariants(result, config);
    let is_anomaly = !violations.is_empty() || result.degraded_reason.is_some();

    if !should_sample(is_anomaly, result.cold_start_phase, config.monitoring.sample_rate) {
        return;
    }

    let trace = DecisionTrace {
        id: uuid::Uuid::new_v4().to_string(),
        user_hash: salt.anonymize(user_id),
        session_id: session_id.map(|s| s.to_string()),
        ts: chrono::Utc::now().timestamp_millis(),
        latency_ms,
        action_index: result.action_index,
        reward_value: result.reward.value,
        cold_start_phase: result.cold_start_phase.as_str().to_string(),
        is_anomaly,
        invariant_violations: violations,
        guardrails_applied: guardrails_applied.to_vec(),
        degraded_reason: result.degraded_reason.clone(),
        strategy: serde_json::to_value(&result.strategy).unwrap_or_default(),
        state: serde_json::to_value(&result.state).unwrap_or_default(),
    };

    if trace.is_anomaly {
        tracing::warn!(
            user_hash = %trace.user_hash,
            violations = ?trace.invariant_violations,
            "AMAS invariant violation"
        );
    }

    if let Err(e) = store.insert_decision_trace(&serde_json::to_value(trace).unwrap_or_default()) {
        tracing::error!(error = %e, "Failed to persist decision trace");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::*;

    fn sane_result() -> ProcessResult {
        ProcessResult {
            strategy: ACTION_SPACE[4].to_strategy(),
            action_index: 4,
            action: ACTION_SPACE[4],
            explanation: DecisionExplanation::default(),
            state: UserState::default(),
            reward: Reward {
                value: 0.2,
                components: RewardComponents::default(),
            },
            suggestion: None,
            should_break: false,
            feature_vector: None,
            cold_start_phase: ColdStartPhase::Normal,
            objective_evaluation: None,
            degraded_reason: None,
        }
    }

    #[test]
    fn sane_result_has_no_violations() {
        let violations = check_invariants(&sane_result(), &AMASConfig::default());
        assert!(violations.is_empty(), "{violations:?}");
    }

    #[test]
    fn nan_state_flagged() {
        let mut result = sane_result();
        result.state.attention = f64::NAN;
        let violations = check_invariants(&result, &AMASConfig::default());
        assert!(violations.iter().any(|v| v.field == "attention"));
    }

    #[test]
    fn guardrail_breach_flagged() {
        let mut result = sane_result();
        result.state.fatigue = 0.95;
        // 策略仍是标准动作，违反 critical_fatigue 的收紧要求
        let violations = check_invariants(&result, &AMASConfig::default());
        assert!(violations.iter().any(|v| v.field == "guardrails"));
    }

    #[test]
    fn anomalies_always_sampled() {
        assert!(should_sample(true, ColdStartPhase::Normal, 0.0));
        assert!(should_sample(false, ColdStartPhase::Classify, 0.0));
    }

    #[test]
    fn daily_salt_is_stable_within_day() {
        let salt = DailySalt::new();
        let a = salt.anonymize("u1");
        let b = salt.anonymize("u1");
        let c = salt.anonymize("u2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(!a.contains("u1"));
    }
}
