//! Background poll loop
//!
//! Waits one interval, runs a cycle, and only then starts the next wait, so a
//! slow relay stretches the period instead of stacking requests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::engine::SyncEngine;
use crate::error::ChatError;

/// Handle to a running poll loop. Dropping it stops the loop after the
/// current cycle.
pub struct Poller {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Spawn the loop on the current tokio runtime.
    pub fn start(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            tracing::debug!(interval_ms = interval.as_millis() as u64, "poller started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.changed() => break,
                }

                match engine.run_cycle().await {
                    Ok(report) if report.skipped => {}
                    Ok(_) => {}
                    Err(ChatError::NotAuthenticated) => {}
                    Err(e) if e.is_network() => {
                        tracing::debug!(error = %e, "poll failed");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "poll cycle failed");
                    }
                }

                if *stop.borrow() {
                    break;
                }
            }
            tracing::debug!("poller stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop after the current cycle and wait for the loop to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}
