use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;
use tokio::sync::broadcast;

use amas_engine::amas::config::AMASConfig;
use amas_engine::amas::engine::AMASEngine;
use amas_engine::config::Config;
use amas_engine::routes::build_router;
use amas_engine::state::AppState;
use amas_engine::store::Store;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub engine: Arc<AMASEngine>,
    pub store: Arc<Store>,
    _temp_dir: TempDir,
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with_limits(10_000).await
}

pub async fn spawn_test_app_with_rate_limit(api_limit: u64) -> TestApp {
    spawn_with_limits(api_limit).await
}

async fn spawn_with_limits(api_limit: u64) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("amas-test.sled");

    // 直接构造 Config，避免使用 set_var 造成多线程测试环境变量竞态
    let config = Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path: sled_path.to_string_lossy().to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        trust_proxy: false,
        rate_limit: amas_engine::config::RateLimitConfig {
            window_secs: 60,
            max_requests: api_limit,
        },
        worker: amas_engine::config::WorkerConfig {
            is_leader: false,
            ..Default::default()
        },
        amas: Default::default(),
        limits: Default::default(),
    };

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));

    let mut amas_config = AMASConfig::from_env(&config.amas);
    amas_config.isolation.decision_timeout_ms = 500;
    let engine = Arc::new(AMASEngine::new(amas_config, store.clone()));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let state = AppState::new(store.clone(), engine.clone(), &config, shutdown_tx);

    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        engine,
        store,
        _temp_dir: temp_dir,
    }
}
