use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    storage::{entities::AppSettings, git_store::GitActivityStore, settings::SettingsStore},
    utils::clock::Clock,
};

use super::service::GitScanService;

/// Delay before the one-off initial scan, so a fresh install gets data
/// quickly without racing daemon startup.
const STARTUP_GRACE: Duration = Duration::from_secs(30);

/// How often settings are re-read while automatic scanning is switched off,
/// so enabling it doesn't require a daemon restart.
const RECHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Drives the scan service on the configured cadence. The loop re-reads
/// settings every iteration and never terminates on its own; cancelling the
/// token abandons whatever sleep is in flight.
pub struct ScanScheduler<G, S> {
    service: Arc<GitScanService<G>>,
    settings: S,
    shutdown: CancellationToken,
    clock: Box<dyn Clock>,
}

impl<G, S> ScanScheduler<G, S>
where
    G: GitActivityStore + Sync + Send,
    S: SettingsStore + Sync + Send,
{
    pub fn new(
        service: Arc<GitScanService<G>>,
        settings: S,
        shutdown: CancellationToken,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            service,
            settings,
            shutdown,
            clock,
        }
    }

    fn auto_scan_due(settings: &AppSettings) -> bool {
        settings.auto_scan_enabled && settings.git_scan_frequency_hours > 0
    }

    /// Sleeps unless shutdown arrives first. Returns false on shutdown.
    async fn sleep_or_shutdown(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = self.clock.sleep(duration) => true,
        }
    }

    async fn scan_once(&self, settings: &AppSettings) {
        let result = self.service.scan(settings).await;
        info!(
            "Scheduled scan: {} repos, {} new commits, {} errors",
            result.repositories_found,
            result.new_commits_added,
            result.errors.len()
        );
    }

    /// Executes the scheduler event loop.
    pub async fn run(self) -> Result<()> {
        // one-off initial scan behind a grace delay
        if !self.sleep_or_shutdown(STARTUP_GRACE).await {
            return Ok(());
        }
        match self.settings.current().await {
            Ok(settings) if Self::auto_scan_due(&settings) => self.scan_once(&settings).await,
            Ok(_) => {}
            Err(e) => error!("Failed to read settings for initial scan {e:?}"),
        }

        loop {
            let settings = match self.settings.current().await {
                Ok(v) => v,
                Err(e) => {
                    error!("Failed to read settings {e:?}");
                    if !self.sleep_or_shutdown(RECHECK_INTERVAL).await {
                        return Ok(());
                    }
                    continue;
                }
            };

            if !Self::auto_scan_due(&settings) {
                if !self.sleep_or_shutdown(RECHECK_INTERVAL).await {
                    return Ok(());
                }
                continue;
            }

            let period = Duration::from_secs(settings.git_scan_frequency_hours as u64 * 3600);
            if !self.sleep_or_shutdown(period).await {
                return Ok(());
            }

            // settings may have changed during the long sleep
            match self.settings.current().await {
                Ok(current) if Self::auto_scan_due(&current) => self.scan_once(&current).await,
                Ok(_) => {}
                Err(e) => error!("Failed to re-read settings before scan {e:?}"),
            }
        }
    }
}
