use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// 进程级熔断器。连续失败达到阈值即打开；冷却期满后半开放行
/// 一个探测请求，成功则闭合，失败则重新打开。
/// 打开状态下的检查是纯原子读，亚毫秒返回。
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    consecutive_failures: AtomicU32,
    total_rejections: AtomicU64,
    state: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown_ms: u64) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown: Duration::from_millis(cooldown_ms),
            consecutive_failures: AtomicU32::new(0),
            total_rejections: AtomicU64::new(0),
            state: Mutex::new(Inner {
                state: BreakerState::Closed,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// 请求入口检查：true 放行，false 走降级
    pub fn allow(&self) -> bool {
        let mut inner = self.state.lock().expect("breaker lock");
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let expired = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if expired {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    true
                } else {
                    self.total_rejections.fetch_add(1, Ordering::Relaxed);
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    self.total_rejections.fetch_add(1, Ordering::Relaxed);
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let mut inner = self.state.lock().expect("breaker lock");
        inner.probe_in_flight = false;
        if inner.state != BreakerState::Closed {
            tracing::info!("Circuit breaker closing after successful probe");
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
        }
    }

    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let mut inner = self.state.lock().expect("breaker lock");
        inner.probe_in_flight = false;
        match inner.state {
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            BreakerState::Closed if failures >= self.failure_threshold => {
                tracing::warn!(failures, "Circuit breaker opening");
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
            }
            _ => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state.lock().expect("breaker lock").state
    }

    pub fn total_rejections(&self) -> u64 {
        self.total_rejections.load(Ordering::Relaxed)
    }
}
