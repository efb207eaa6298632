use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::amas::types::{ColdStartPhase, ProcessOptions, ProcessResult, RawEvent, UserState};
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::engine::DelayedRewardEntry;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/event", post(process_event))
        .route("/events/batch", post(batch_process_events))
        .route("/state/:user_id", get(get_state))
        .route("/reset/:user_id", post(reset_user))
        .route("/phase/:user_id", get(get_phase))
        .route("/delayed-reward", post(apply_delayed_reward))
        .route("/delayed-reward/enqueue", post(enqueue_delayed_reward))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessEventRequest {
    user_id: String,
    event: RawEvent,
    #[serde(default)]
    options: ProcessOptions,
}

async fn process_event(
    State(state): State<AppState>,
    Json(req): Json<ProcessEventRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let result = state
        .amas()
        .process_event(&req.user_id, req.event, req.options)
        .await?;
    Ok(ok(result))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchProcessRequest {
    user_id: String,
    events: Vec<RawEvent>,
    #[serde(default)]
    options: ProcessOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchProcessResponse {
    results: Vec<ProcessResult>,
}

async fn batch_process_events(
    State(state): State<AppState>,
    Json(req): Json<BatchProcessRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    if req.events.len() > state.config().limits.max_batch_events {
        return Err(AppError::bad_request(
            "BATCH_TOO_LARGE",
            &format!(
                "batch exceeds {} events",
                state.config().limits.max_batch_events
            ),
        ));
    }
    let results = state
        .amas()
        .batch_process_events(&req.user_id, req.events, req.options)
        .await?;
    Ok(ok(BatchProcessResponse { results }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StateResponse {
    state: Option<UserState>,
}

async fn get_state(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let user_state = state.amas().get_state(&user_id).await?;
    Ok(ok(StateResponse { state: user_state }))
}

async fn reset_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.amas().reset_user(&user_id).await?;
    Ok(ok(serde_json::json!({ "reset": true })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PhaseResponse {
    phase: ColdStartPhase,
}

async fn get_phase(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let phase = state.amas().get_cold_start_phase(&user_id).await?;
    Ok(ok(PhaseResponse { phase }))
}

/// 延迟奖励直写入口，供离线 worker 回放特征向量。
/// 维度偏差由引擎零补齐/截断，永不报错给调用方。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DelayedRewardRequest {
    user_id: String,
    feature_values: Vec<f64>,
    reward: f64,
}

async fn apply_delayed_reward(
    State(state): State<AppState>,
    Json(req): Json<DelayedRewardRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let outcome = state
        .amas()
        .apply_delayed_reward(&req.user_id, &req.feature_values, req.reward)
        .await;
    Ok(ok(outcome))
}

/// 入队一条延迟奖励，到期后由 delayed_reward worker 应用
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueDelayedRewardRequest {
    user_id: String,
    feature_values: Vec<f64>,
    reward: f64,
    due_ts_ms: i64,
}

async fn enqueue_delayed_reward(
    State(state): State<AppState>,
    Json(req): Json<EnqueueDelayedRewardRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    crate::validation::validate_user_id(&req.user_id)
        .map_err(|msg| AppError::bad_request("INVALID_USER_ID", msg))?;
    if !req.reward.is_finite() || req.feature_values.iter().any(|v| !v.is_finite()) {
        return Err(AppError::bad_request("INVALID_REWARD", "非有限数值"));
    }

    let entry = DelayedRewardEntry {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: req.user_id,
        feature_values: req.feature_values,
        reward: req.reward,
        due_ts_ms: req.due_ts_ms,
    };
    state.store().enqueue_delayed_reward(&entry)?;
    Ok(ok(serde_json::json!({ "enqueued": true, "id": entry.id })))
}
