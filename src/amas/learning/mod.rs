pub mod actr;
pub mod coldstart;
pub mod linucb;
pub mod math;
pub mod thompson;

pub use actr::ActrMemory;
pub use coldstart::{ColdStartController, ColdStartSelection};
pub use linucb::LinUcbModel;
pub use thompson::ThompsonSampler;

/// 决策上下文：学习器共享的请求级信号
#[derive(Debug, Clone, Default)]
pub struct DecisionContext {
    /// 近期错误率 ∈ [0,1]
    pub recent_error_rate: f64,
    /// 归一化响应时间 ∈ [0,1]（rt / 10s 截断）
    pub rt_norm: f64,
    /// 事件时间的小时桶 0..24
    pub hour_of_day: u32,
}

impl DecisionContext {
    pub fn from_event(
        event: &crate::amas::types::RawEvent,
        recent_error_rate: f64,
    ) -> Self {
        let hour_of_day = {
            use chrono::Timelike;
            let ts = chrono::DateTime::from_timestamp_millis(event.timestamp)
                .unwrap_or_else(chrono::Utc::now);
            ts.hour()
        };
        Self {
            recent_error_rate: recent_error_rate.clamp(0.0, 1.0),
            rt_norm: (event.response_time as f64 / 10_000.0).clamp(0.0, 1.0),
            hour_of_day,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amas::types::RawEvent;

    #[test]
    fn context_from_event_is_bounded() {
        let event = RawEvent {
            response_time: 50_000,
            ..RawEvent::default()
        };
        let ctx = DecisionContext::from_event(&event, 1.5);
        assert_eq!(ctx.rt_norm, 1.0);
        assert_eq!(ctx.recent_error_rate, 1.0);
        assert!(ctx.hour_of_day < 24);
    }
}
