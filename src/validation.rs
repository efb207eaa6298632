//! 公共验证函数模块
//! 提供用户 ID 与行为事件的边界校验，供引擎路由和存储层共用。

use crate::amas::types::RawEvent;

/// 验证用户 ID：1-128 字符，只允许字母、数字、下划线和连字符。
/// 冒号是存储层 key 的分隔符，不允许出现在用户 ID 中。
pub fn validate_user_id(user_id: &str) -> Result<(), &'static str> {
    if user_id.is_empty() || user_id.len() > 128 {
        return Err("用户 ID 长度需在1到128个字符之间");
    }
    if !user_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err("用户 ID 只能包含字母、数字、下划线和连字符");
    }
    Ok(())
}

/// 事件边界校验：数值字段必须有限且落在声明范围内。
/// 越界但可修复的值由感知层 sanitize 收口；这里只拒绝结构性非法输入。
pub fn validate_raw_event(event: &RawEvent) -> Result<(), &'static str> {
    if event.word_id.len() > 256 {
        return Err("wordId 过长");
    }
    if event.response_time <= 0 {
        return Err("responseTime 必须为正数");
    }
    if event.response_time > 10 * 120_000 {
        return Err("responseTime 超出可接受上限");
    }
    if event.timestamp < 0 {
        return Err("timestamp 不能为负");
    }
    if let Some(density) = event.interaction_density {
        if !density.is_finite() {
            return Err("interactionDensity 必须为有限数");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::RawEvent;

    #[test]
    fn valid_user_id_accepted() {
        assert!(validate_user_id("user_42").is_ok());
        assert!(validate_user_id("tenant-user-1").is_ok());
    }

    #[test]
    fn empty_user_id_rejected() {
        assert!(validate_user_id("").is_err());
    }

    #[test]
    fn long_user_id_rejected() {
        assert!(validate_user_id(&"a".repeat(129)).is_err());
    }

    #[test]
    fn special_chars_in_user_id_rejected() {
        assert!(validate_user_id("user@1").is_err());
        assert!(validate_user_id("user 1").is_err());
    }

    #[test]
    fn default_event_accepted() {
        assert!(validate_raw_event(&RawEvent::default()).is_ok());
    }

    #[test]
    fn zero_response_time_rejected() {
        let event = RawEvent {
            response_time: 0,
            ..RawEvent::default()
        };
        assert!(validate_raw_event(&event).is_err());
    }

    #[test]
    fn non_finite_density_rejected() {
        let event = RawEvent {
            interaction_density: Some(f64::NAN),
            ..RawEvent::default()
        };
        assert!(validate_raw_event(&event).is_err());
    }
}
