//! Optional in-process trigger for the reconciliation run.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::reconciliation::ReconciliationService;

pub const DEFAULT_RECONCILIATION_INTERVAL_SECS: u64 = 300;

/// Reconciliation worker settings
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(DEFAULT_RECONCILIATION_INTERVAL_SECS),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let enabled = env::var("ENABLE_RECONCILIATION_WORKER")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);
        let interval_secs = env::var("RECONCILIATION_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_RECONCILIATION_INTERVAL_SECS);

        Self {
            enabled,
            interval: Duration::from_secs(interval_secs),
        }
    }
}

/// Runs reconciliation on a fixed interval until told to stop
pub struct ReconciliationWorker {
    service: Arc<ReconciliationService>,
    config: WorkerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl ReconciliationWorker {
    #[must_use]
    pub fn new(
        service: Arc<ReconciliationService>,
        config: WorkerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            service,
            config,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        info!(interval_secs = self.config.interval.as_secs(), "Reconciliation worker started");
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.service.reconcile_locked_exchanges().await {
                        Ok(report) => info!(processed = report.processed, "Scheduled reconciliation finished"),
                        Err(e) => error!(error = %e, "Scheduled reconciliation failed"),
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reconciliation worker stopped");
    }
}

/// Spawn the worker; send `true` on the returned sender to stop it
pub fn spawn_worker(
    service: Arc<ReconciliationService>,
    config: WorkerConfig,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ReconciliationWorker::new(service, config, shutdown_rx);
    let handle = tokio::spawn(worker.run());
    (handle, shutdown_tx)
}
