use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub trust_proxy: bool,
    pub rate_limit: RateLimitConfig,
    pub worker: WorkerConfig,
    pub amas: AMASEnvConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    pub max_requests: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 900,
            max_requests: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_metrics_flush: bool,
    pub enable_delayed_reward: bool,
    pub enable_state_sweep: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            is_leader: true,
            enable_metrics_flush: true,
            enable_delayed_reward: true,
            enable_state_sweep: true,
        }
    }
}

/// 引擎级环境配置：特性开关与权重覆盖。
/// 细粒度参数在 AMASConfig 中维护，可热重载。
#[derive(Debug, Clone)]
pub struct AMASEnvConfig {
    pub ensemble_enabled: bool,
    pub cold_start_enabled: bool,
    pub thompson_enabled: bool,
    pub actr_enabled: bool,
    pub heuristic_enabled: bool,
    pub trend_enabled: bool,
    pub user_params_enabled: bool,
    pub monitor_sample_rate: f64,
    pub decision_timeout_ms: u64,
    pub weight_override_linucb: Option<f64>,
    pub weight_override_thompson: Option<f64>,
    pub weight_override_actr: Option<f64>,
    pub weight_override_heuristic: Option<f64>,
}

impl Default for AMASEnvConfig {
    fn default() -> Self {
        Self {
            ensemble_enabled: true,
            cold_start_enabled: true,
            thompson_enabled: true,
            actr_enabled: true,
            heuristic_enabled: true,
            trend_enabled: true,
            user_params_enabled: true,
            monitor_sample_rate: 0.05,
            decision_timeout_ms: crate::constants::DECISION_TIMEOUT_PROD_MS,
            weight_override_linucb: None,
            weight_override_thompson: None,
            weight_override_actr: None,
            weight_override_heuristic: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_batch_events: usize,
    pub max_users: usize,
    pub user_ttl_ms: i64,
    pub rate_limit_max_entries: usize,
    pub rate_limit_cleanup_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_events: crate::constants::MAX_BATCH_EVENTS,
            max_users: crate::constants::DEFAULT_MAX_USERS,
            user_ttl_ms: crate::constants::DEFAULT_USER_TTL_MS,
            rate_limit_max_entries: 100_000,
            rate_limit_cleanup_interval_secs: 300,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} sled={}", self.host, self.port, self.sled_path)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: normalized_sled_path(&env_or("SLED_PATH", "./data/amas.sled")),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            trust_proxy: env_or_bool("TRUST_PROXY", false),
            rate_limit: RateLimitConfig {
                window_secs: env_or_parse("RATE_LIMIT_WINDOW_SECS", 900_u64),
                max_requests: env_or_parse("RATE_LIMIT_MAX", 500_u64),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_metrics_flush: env_or_bool("ENABLE_METRICS_FLUSH_WORKER", true),
                enable_delayed_reward: env_or_bool("ENABLE_DELAYED_REWARD_WORKER", true),
                enable_state_sweep: env_or_bool("ENABLE_STATE_SWEEP_WORKER", true),
            },
            amas: AMASEnvConfig {
                ensemble_enabled: env_or_bool("AMAS_ENSEMBLE_ENABLED", true),
                cold_start_enabled: env_or_bool("AMAS_COLD_START_ENABLED", true),
                thompson_enabled: env_or_bool("AMAS_THOMPSON_ENABLED", true),
                actr_enabled: env_or_bool("AMAS_ACTR_ENABLED", true),
                heuristic_enabled: env_or_bool("AMAS_HEURISTIC_ENABLED", true),
                trend_enabled: env_or_bool("AMAS_TREND_ENABLED", true),
                user_params_enabled: env_or_bool("AMAS_USER_PARAMS_ENABLED", true),
                monitor_sample_rate: env_or_parse("AMAS_MONITOR_SAMPLE_RATE", 0.05_f64),
                decision_timeout_ms: env_or_parse(
                    "AMAS_DECISION_TIMEOUT_MS",
                    crate::constants::DECISION_TIMEOUT_PROD_MS,
                ),
                weight_override_linucb: env_opt_parse("AMAS_WEIGHT_LINUCB"),
                weight_override_thompson: env_opt_parse("AMAS_WEIGHT_THOMPSON"),
                weight_override_actr: env_opt_parse("AMAS_WEIGHT_ACTR"),
                weight_override_heuristic: env_opt_parse("AMAS_WEIGHT_HEURISTIC"),
            },
            limits: LimitsConfig {
                max_batch_events: env_or_parse(
                    "LIMITS_MAX_BATCH_EVENTS",
                    crate::constants::MAX_BATCH_EVENTS,
                ),
                max_users: env_or_parse("LIMITS_MAX_USERS", crate::constants::DEFAULT_MAX_USERS),
                user_ttl_ms: env_or_parse("LIMITS_USER_TTL_MS", crate::constants::DEFAULT_USER_TTL_MS),
                rate_limit_max_entries: env_or_parse("LIMITS_RATE_LIMIT_MAX_ENTRIES", 100_000_usize),
                rate_limit_cleanup_interval_secs: env_or_parse(
                    "LIMITS_RATE_LIMIT_CLEANUP_INTERVAL_SECS",
                    300_u64,
                ),
            },
        }
    }
}

fn normalized_sled_path(raw: &str) -> String {
    let path = Path::new(raw);
    if path.is_absolute() {
        return path.to_string_lossy().to_string();
    }

    let project_root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    project_root.join(path).to_string_lossy().to_string()
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_opt_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.parse::<T>().ok())
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
