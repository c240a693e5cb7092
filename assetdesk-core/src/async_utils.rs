//! Async utilities
//!
//! Timeouts for collaborator calls and a cancellable periodic task.

use crate::error::{DeskError, DeskResult, ErrorContext};
use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::debug;

/// Bound `future` by `limit`, failing with [`DeskError::Timeout`]
pub async fn with_timeout<F, T>(future: F, limit: Duration, operation: &str) -> DeskResult<T>
where
    F: Future<Output = T>,
{
    timeout(limit, future).await.map_err(|_| {
        let duration_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        DeskError::Timeout {
            operation: operation.to_owned(),
            duration_ms,
            context: ErrorContext::new("async_utils")
                .with_operation(operation)
                .with_metadata("limit_ms", &duration_ms.to_string())
                .with_suggestion("Check that the AssetDesk API is reachable"),
        }
    })
}

/// A background task that runs `tick` every `period` until stopped.
///
/// The first tick fires one full period after spawning. Dropping the handle
/// stops the task.
pub struct PeriodicTask {
    name: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn the task on the current tokio runtime
    pub fn spawn<F, Fut>(name: &str, period: Duration, tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task_name = name.to_string();

        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!(task = %task_name, "Periodic tick");
                        tick().await;
                    }
                    _ = &mut shutdown_rx => {
                        debug!(task = %task_name, "Periodic task stopped");
                        break;
                    }
                }
            }
        });

        debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");

        Self {
            name: name.to_string(),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the background loop is still alive
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop and wait for it to exit
    pub async fn stop(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
