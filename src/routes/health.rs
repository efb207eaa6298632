use axum::extract::State;
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::response::ok;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    resident_users: usize,
    breaker: String,
}

async fn health(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    let resident_users = state.amas().resident_users().await;
    let breaker = format!("{:?}", state.amas().breaker().state());
    ok(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        resident_users,
        breaker,
    })
}
