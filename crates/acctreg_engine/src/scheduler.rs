//! Fixed-delay polling of the sync coordinator.
//!
//! Each cycle runs on the blocking pool since the coordinator does blocking
//! HTTP. The next cycle is scheduled a fixed delay after the previous one
//! finished, so cycles never overlap.

use crate::repository::{propagate, CredentialRepository};
use crate::state::{SyncCoordinator, SyncOutcome};
use crate::transport::AccountSource;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// What a poller run did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerReport {
    /// Cycles run.
    pub cycles: u64,
    /// Cycles that committed changes.
    pub changes: u64,
    /// Cycles that failed.
    pub failures: u64,
}

/// Drives [`SyncCoordinator::try_synchronize`] on a fixed delay.
pub struct Poller<S: AccountSource + 'static> {
    coordinator: Arc<SyncCoordinator<S>>,
    interval: Duration,
    repository: Option<Arc<dyn CredentialRepository>>,
    max_cycles: Option<u64>,
}

impl<S: AccountSource + 'static> Poller<S> {
    /// Creates a poller.
    pub fn new(coordinator: Arc<SyncCoordinator<S>>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
            repository: None,
            max_cycles: None,
        }
    }

    /// Propagates committed changes into `repository` before marking them
    /// synced.
    pub fn with_repository(mut self, repository: Arc<dyn CredentialRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Stops after `cycles` cycles.
    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    /// Polls until `shutdown` completes or the cycle limit is reached.
    ///
    /// A cycle in progress when `shutdown` fires is allowed to finish.
    pub async fn run_until<F>(self, shutdown: F) -> PollerReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut report = PollerReport::default();
        info!(interval_ms = self.interval.as_millis() as u64, "starting account poller");

        loop {
            if self.max_cycles.is_some_and(|max| report.cycles >= max) {
                break;
            }

            match self.cycle().await {
                Ok(true) => report.changes += 1,
                Ok(false) => {}
                Err(()) => report.failures += 1,
            }
            report.cycles += 1;

            if self.max_cycles.is_some_and(|max| report.cycles >= max) {
                break;
            }
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!(
            cycles = report.cycles,
            changes = report.changes,
            failures = report.failures,
            "account poller stopped"
        );
        report
    }

    async fn cycle(&self) -> Result<bool, ()> {
        let coordinator = Arc::clone(&self.coordinator);
        let repository = self.repository.clone();

        let joined = tokio::task::spawn_blocking(move || {
            let outcome = coordinator.try_synchronize().map_err(|_| ())?;
            let SyncOutcome::Changed(reconciliation) = outcome else {
                return Ok(false);
            };
            if let Some(repository) = repository {
                if let Err(e) = propagate(repository.as_ref(), &reconciliation) {
                    // Leave the watermark where it is so the changes are
                    // fetched again.
                    warn!(error = %e, "propagation failed");
                    return Err(());
                }
            }
            coordinator.mark_synced();
            Ok(true)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "sync task panicked");
                Err(())
            }
        }
    }
}
