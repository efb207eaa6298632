use crate::store::StoreError;

/// key 组件不得包含分隔符或为空，防止前缀扫描越界
fn validate_component(value: &str, what: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{what} must not be empty")));
    }
    if value.len() > 256 {
        return Err(StoreError::Validation(format!("{what} too long")));
    }
    if value.contains(':') {
        return Err(StoreError::Validation(format!(
            "{what} must not contain ':'"
        )));
    }
    Ok(())
}

pub fn engine_user_state_key(user_id: &str) -> Result<String, StoreError> {
    validate_component(user_id, "user_id")?;
    Ok(user_id.to_string())
}

pub fn engine_bandit_model_key(user_id: &str) -> Result<String, StoreError> {
    validate_component(user_id, "user_id")?;
    Ok(user_id.to_string())
}

pub fn engine_algo_state_key(user_id: &str, algorithm_id: &str) -> Result<String, StoreError> {
    validate_component(user_id, "user_id")?;
    Ok(format!("{}:{}", user_id, algorithm_id))
}

pub fn decision_trace_key(timestamp_ms: i64, trace_id: &str) -> Result<String, StoreError> {
    validate_component(trace_id, "trace_id")?;
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    Ok(format!("{:020}:{}", reverse_ts, trace_id))
}

pub fn metrics_daily_key(date: &str, algorithm_id: &str) -> Result<String, StoreError> {
    validate_component(date, "date")?;
    Ok(format!("{}:{}", date, algorithm_id))
}

pub fn delayed_reward_key(due_ts_ms: i64, entry_id: &str) -> Result<String, StoreError> {
    validate_component(entry_id, "entry_id")?;
    let ts = due_ts_ms.max(0) as u64;
    Ok(format!("{:020}:{}", ts, entry_id))
}

/// 解析 delayed_reward key，返回 (due_ts_ms, entry_id)
pub fn parse_delayed_reward_key(key: &[u8]) -> Option<(i64, String)> {
    let text = std::str::from_utf8(key).ok()?;
    let (ts_part, id_part) = text.split_once(':')?;
    let ts = ts_part.parse::<u64>().ok()?;
    Some((ts.min(i64::MAX as u64) as i64, id_part.to_string()))
}
