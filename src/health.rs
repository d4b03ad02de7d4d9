//! Background polling of the backend health endpoint.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::gateway::{BackendGateway, HealthStatus};

#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    fn interval(&self) -> Duration;
    async fn run_job(&self);
}

/// Runs `job` immediately and then once per interval until the
/// returned handle is aborted.
pub fn spawn_periodic_job<J: PeriodicJob>(job: J) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(job.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            job.run_job().await;
        }
    })
}

pub struct HealthCheck {
    gateway: Arc<dyn BackendGateway>,
    interval: Duration,
    status: watch::Sender<HealthStatus>,
}

#[async_trait]
impl PeriodicJob for HealthCheck {
    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run_job(&self) {
        let status = self.gateway.check_health().await;
        let changed = self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
        if changed {
            match status {
                HealthStatus::Healthy => tracing::info!("Backend is reachable"),
                HealthStatus::Unhealthy => tracing::warn!("Backend is unreachable"),
            }
        }
    }
}

/// Owns the polling task. Dropping the monitor stops polling.
pub struct HealthMonitor {
    status: watch::Receiver<HealthStatus>,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Starts polling. The status reads `Unhealthy` until the first
    /// check succeeds.
    pub fn start(gateway: Arc<dyn BackendGateway>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(HealthStatus::Unhealthy);
        let handle = spawn_periodic_job(HealthCheck {
            gateway,
            interval,
            status: tx,
        });
        Self { status: rx, handle }
    }

    pub fn status(&self) -> HealthStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<HealthStatus> {
        self.status.clone()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
