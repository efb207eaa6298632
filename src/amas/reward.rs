use crate::amas::config::RewardProfile;
use crate::amas::types::{RawEvent, Reward, RewardComponents, UserState};

/// 有界奖励混合：
/// raw = w_c·correct − w_f·F + w_s·speedGain − w_fr·frustration + w_e·engagement，
/// 最终 reward = clamp(raw/2, -1, 1)。
pub fn compute(event: &RawEvent, state: &UserState, profile: &RewardProfile) -> Reward {
    let correctness = if event.is_correct { 1.0 } else { -1.0 };

    let speed_gain = (profile.reference_rt_ms / (event.response_time.max(1000) as f64) - 1.0)
        .clamp(-1.0, 1.0);

    let frustration = if event.retry_count > 1 || state.motivation < 0.0 {
        1.0
    } else {
        0.0
    };

    let engagement = {
        let dwell_score = event
            .dwell_time
            .map(|d| (d as f64 / 10_000.0).clamp(0.0, 1.0))
            .unwrap_or(0.5);
        let interaction_score = event
            .interaction_density
            .map(|d| (d / 5.0).clamp(0.0, 1.0))
            .unwrap_or(0.5);
        (dwell_score + interaction_score) / 2.0
    };

    let raw = profile.w_correct * correctness - profile.w_fatigue * state.fatigue
        + profile.w_speed * speed_gain
        - profile.w_frustration * frustration
        + profile.w_engagement * engagement;

    let value = (raw / 2.0).clamp(-1.0, 1.0);

    Reward {
        value: if value.is_finite() { value } else { 0.0 },
        components: RewardComponents {
            correctness,
            fatigue_penalty: profile.w_fatigue * state.fatigue,
            speed_gain,
            frustration,
            engagement,
        },
    }
}
