pub mod engine;
pub mod health;

use axum::middleware;
use axum::Router;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/engine", engine::router())
        .merge(health::router());

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(middleware::from_fn(
            crate::middleware::request_id::request_id_middleware,
        ))
        .with_state(state)
}
