use proptest::prelude::*;

use amas_engine::amas::config::{AMASConfig, ConstraintConfig, EnsembleConfig, RewardProfile};
use amas_engine::amas::decision::ensemble::{self, EnsembleWeights};
use amas_engine::amas::decision::{guardrails, mapper};
use amas_engine::amas::learning::math;
use amas_engine::amas::reward;
use amas_engine::amas::types::*;

fn arb_state() -> impl Strategy<Value = UserState> {
    (
        0.0_f64..=1.0,
        0.0_f64..=1.0,
        -1.0_f64..=1.0,
        0.0_f64..=1.0,
        0.0_f64..=1.0,
        0.0_f64..=1.0,
        prop_oneof![
            Just(TrendState::Up),
            Just(TrendState::Flat),
            Just(TrendState::Stuck),
            Just(TrendState::Down),
        ],
    )
        .prop_map(|(attention, fatigue, motivation, mem, speed, stability, trend)| UserState {
            attention,
            fatigue,
            motivation,
            cognitive: CognitiveProfile {
                mem,
                speed,
                stability,
            },
            trend,
            conf: 0.5,
            ts: 0,
        })
}

proptest! {
    /// 守护约束对任意状态与任意动作都产出满足其激活子句的策略
    #[test]
    fn pt_guardrails_always_satisfied(state in arb_state(), action_idx in 0usize..ACTION_SPACE.len()) {
        let cfg = ConstraintConfig::default();
        let (out, _) = guardrails::apply(ACTION_SPACE[action_idx].to_strategy(), &state, &cfg);
        prop_assert!(guardrails::satisfied(&out, &state, &cfg));
        prop_assert!(out.batch_size >= 1);
        prop_assert!(out.interval_scale > 0.0);
        prop_assert!((0.0..=1.0).contains(&out.new_ratio));
    }

    /// 集成权重在任意更新序列后保持单纯形不变式
    #[test]
    fn pt_ensemble_weights_stay_on_simplex(
        rewards in prop::collection::vec(-1.0_f64..=1.0, 1..40),
        executed in prop::collection::vec(0usize..ACTION_SPACE.len(), 1..40),
        chosen in prop::collection::vec(0usize..ACTION_SPACE.len(), 1..40),
    ) {
        let cfg = EnsembleConfig::default();
        let mut weights = EnsembleWeights::from_config(&cfg);
        let n = rewards.len().min(executed.len()).min(chosen.len());
        for i in 0..n {
            let candidates = vec![
                DecisionCandidate {
                    learner: LearnerId::Linucb,
                    action_index: chosen[i],
                    score: rewards[i],
                    confidence: 0.8,
                    explanation: String::new(),
                },
                DecisionCandidate {
                    learner: LearnerId::Heuristic,
                    action_index: executed[i],
                    score: 0.5,
                    confidence: 0.5,
                    explanation: String::new(),
                },
            ];
            ensemble::update_weights(&mut weights, &candidates, executed[i], rewards[i], &cfg);

            prop_assert!((weights.sum() - 1.0).abs() < 1e-6);
            for member in ensemble::MEMBERS {
                let w = weights.get(member);
                prop_assert!((cfg.min_weight..=1.0).contains(&w), "{member:?}={w}");
            }
        }
    }

    /// 奖励对任意合法事件有界
    #[test]
    fn pt_reward_is_bounded(
        state in arb_state(),
        is_correct in any::<bool>(),
        response_time in 1_i64..120_000,
        retry_count in 0_i32..100,
    ) {
        let event = RawEvent {
            is_correct,
            response_time,
            retry_count,
            ..RawEvent::default()
        };
        let r = reward::compute(&event, &state, &RewardProfile::default());
        prop_assert!(r.value.is_finite());
        prop_assert!((-1.0..=1.0).contains(&r.value));
    }

    /// 任意 rank-1 更新序列后 L·Lᵀ 重建 A，对角保持正下界
    #[test]
    fn pt_cholesky_rank1_reconstructs(
        updates in prop::collection::vec(
            prop::collection::vec(-2.0_f64..=2.0, 4),
            1..20,
        ),
    ) {
        let d = 4;
        let lambda = 1.0;
        let mut a = vec![0.0; d * d];
        for i in 0..d {
            a[i * d + i] = lambda;
        }
        let mut l = math::cholesky_decompose(&a, d, lambda);

        for x in &updates {
            math::rank1_update_matrix(&mut a, x, d);
            if !math::cholesky_rank1_update(&mut l, x, d, 1e-3) {
                l = math::cholesky_decompose(&a, d, lambda);
            }
        }

        for i in 0..d {
            prop_assert!(l[i * d + i] >= lambda.sqrt() * 0.1);
        }

        for i in 0..d {
            for j in 0..d {
                let mut rebuilt = 0.0;
                for k in 0..d {
                    rebuilt += l[i * d + k] * l[j * d + k];
                }
                let denom = a[i * d + j].abs().max(1.0);
                prop_assert!(
                    ((rebuilt - a[i * d + j]) / denom).abs() < 1e-3,
                    "A mismatch at ({i},{j})"
                );
            }
        }
    }

    /// 动作空间往返律：mapStrategyToAction(mapActionToStrategy(a)) = a
    #[test]
    fn pt_action_roundtrip(idx in 0usize..ACTION_SPACE.len()) {
        let strategy = mapper::map_action_to_strategy(&ACTION_SPACE[idx]);
        prop_assert_eq!(mapper::nearest_action_index(&strategy), idx);
    }

    /// 状态修复对任意输入收口到声明范围
    #[test]
    fn pt_state_clamp_repairs_everything(
        attention in prop::num::f64::ANY,
        fatigue in prop::num::f64::ANY,
        motivation in prop::num::f64::ANY,
    ) {
        let mut state = UserState {
            attention,
            fatigue,
            motivation,
            ..UserState::default()
        };
        state.clamp_in_place();
        prop_assert!(state.is_sane());
    }
}

#[test]
fn default_config_satisfies_validation() {
    assert!(AMASConfig::default().validate().is_ok());
}
