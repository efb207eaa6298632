pub mod delayed_reward;
pub mod metrics_flush;
pub mod state_sweep;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::amas::engine::AMASEngine;
use crate::config::WorkerConfig;
use crate::store::Store;

/// 单个 worker 调用的超时上限（5 分钟）
const WORKER_TIMEOUT: Duration = Duration::from_secs(300);

/// 调度器关闭前的排空期
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 所有 worker 的枚举，消除字符串匹配，编译期保证完整性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    StateSweep,
    MetricsFlush,
    DelayedReward,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateSweep => "state_sweep",
            Self::MetricsFlush => "metrics_flush",
            Self::DelayedReward => "delayed_reward",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    amas_engine: Arc<AMASEngine>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        amas_engine: Arc<AMASEngine>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            amas_engine,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// 所有计划任务与调度的单一事实来源
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![
            JobSpec {
                name: WorkerName::StateSweep,
                cron: "0 */10 * * * *",
                enabled: self.config.enable_state_sweep,
            },
            JobSpec {
                name: WorkerName::MetricsFlush,
                cron: "0 */5 * * * *",
                enabled: self.config.enable_metrics_flush,
            },
            JobSpec {
                name: WorkerName::DelayedReward,
                cron: "0 */5 * * * *",
                enabled: self.config.enable_delayed_reward,
            },
        ]
    }

    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            "Worker manager shutting down, draining for {}s",
            DRAIN_TIMEOUT.as_secs()
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        let specs = self.planned_jobs();

        for spec in &specs {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let store = self.store.clone();
            let engine = self.amas_engine.clone();
            let name_str = spec.name.as_str();

            match spec.name {
                WorkerName::StateSweep => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let engine = engine.clone();
                        async move {
                            state_sweep::run(&engine).await;
                        }
                    })
                    .await;
                }
                WorkerName::MetricsFlush => {
                    let registry = engine.metrics_registry().clone();
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        let registry = registry.clone();
                        async move {
                            metrics_flush::run(&registry, &store).await;
                        }
                    })
                    .await;
                }
                WorkerName::DelayedReward => {
                    add_job(scheduler, spec.cron, name_str, move || {
                        let store = store.clone();
                        let engine = engine.clone();
                        async move {
                            delayed_reward::run(&store, &engine).await;
                        }
                    })
                    .await;
                }
            }
        }
    }
}

async fn add_job<F, Fut>(scheduler: &JobScheduler, cron: &str, name: &'static str, task: F)
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let task = task.clone();
        Box::pin(async move {
            let start = std::time::Instant::now();
            match tokio::time::timeout(WORKER_TIMEOUT, task()).await {
                Ok(()) => {
                    tracing::debug!(
                        worker = name,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Worker tick completed"
                    );
                }
                Err(_) => {
                    tracing::error!(worker = name, "Worker tick timed out");
                }
            }
        })
    });

    match job {
        Ok(job) => {
            if let Err(e) = scheduler.add(job).await {
                tracing::error!(worker = name, error = %e, "Failed to register worker job");
            }
        }
        Err(e) => {
            tracing::error!(worker = name, error = %e, "Invalid worker cron expression");
        }
    }
}
