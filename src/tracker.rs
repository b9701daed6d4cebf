//! Embeddable facade for presentation layers. Every method is safe to call
//! repeatedly and never fails across the boundary: internal errors degrade
//! to empty results with a logged message.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Local};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    daemon::monitor::{ActivityMonitor, FocusSample, IdleGate},
    daemon::span::SpanTracker,
    focus_api::{FocusSampler, GenericFocusSampler},
    scan::service::GitScanService,
    stats::{
        self,
        window::{range_window, ReportRange},
        FocusSummary,
    },
    storage::{
        activity_store::{ActivityStore, ActivityStoreImpl},
        categories::{CategoryStore, CategoryStoreImpl},
        entities::GitScanResult,
        git_store::GitActivityStoreImpl,
        settings::{SettingsStore, SettingsStoreImpl},
    },
    utils::clock::DefaultClock,
};

struct MonitorHandle {
    shutdown: CancellationToken,
    monitor_task: JoinHandle<Result<()>>,
    tracker_task: JoinHandle<Result<()>>,
}

/// One instance owns all stores and the scan service; construct it once and
/// share behind whatever the embedding layer uses for state.
pub struct Tracker {
    activity: Arc<ActivityStoreImpl>,
    categories: CategoryStoreImpl,
    settings: SettingsStoreImpl,
    scan_service: Arc<GitScanService<GitActivityStoreImpl>>,
    record_dir: PathBuf,
    monitor: Option<MonitorHandle>,
}

impl Tracker {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        let record_dir = dir.join("records");
        let activity = Arc::new(ActivityStoreImpl::new(record_dir.clone())?);
        let git_store = GitActivityStoreImpl::open(dir.clone()).await?;
        Ok(Self {
            activity,
            categories: CategoryStoreImpl::new(dir.clone())?,
            settings: SettingsStoreImpl::new(dir.clone())?,
            scan_service: Arc::new(GitScanService::new(git_store, Box::new(DefaultClock))),
            record_dir,
            monitor: None,
        })
    }

    /// Starts the monitoring pipeline with the platform sampler. No-op when
    /// already running; a sampler that cannot be constructed (missing
    /// permission, unsupported environment) leaves tracking off.
    pub fn start_tracking(&mut self) {
        match GenericFocusSampler::new() {
            Ok(sampler) => self.start_tracking_with(Box::new(sampler)),
            Err(e) => error!("Focus sampling is unavailable: {e:?}"),
        }
    }

    pub(crate) fn start_tracking_with(&mut self, sampler: Box<dyn FocusSampler>) {
        if self.monitor.is_some() {
            info!("Tracking already running");
            return;
        }

        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::channel::<FocusSample>(10);

        let monitor = ActivityMonitor::new(
            sender,
            sampler,
            shutdown.clone(),
            IdleGate::from_seconds(120),
            Duration::from_secs(2),
            Box::new(DefaultClock),
        );
        let span_tracker = SpanTracker::new(self.activity.clone());

        self.monitor = Some(MonitorHandle {
            shutdown,
            monitor_task: tokio::spawn(monitor.run()),
            tracker_task: tokio::spawn(span_tracker.run(receiver)),
        });
        info!("Tracking started");
    }

    /// Flushes the open span and stops sampling. No-op when not running.
    pub async fn stop_tracking(&mut self) {
        let Some(handle) = self.monitor.take() else {
            return;
        };
        handle.shutdown.cancel();
        match handle.monitor_task.await {
            Ok(Err(e)) => error!("Monitor failed during shutdown {e:?}"),
            Err(e) => error!("Monitor task failed {e:?}"),
            Ok(Ok(())) => {}
        }
        match handle.tracker_task.await {
            Ok(Err(e)) => error!("Span tracker failed during shutdown {e:?}"),
            Err(e) => error!("Span tracker task failed {e:?}"),
            Ok(Ok(())) => {}
        }
        info!("Tracking stopped");
    }

    /// Aggregated view state for the window containing `anchor`.
    pub async fn refresh_data(&self, range: ReportRange, anchor: DateTime<Local>) -> FocusSummary {
        let (start, end) = range_window(range, anchor);

        let logs = match self.activity.query_range(start, end).await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to read activity records {e:?}");
                return FocusSummary::empty();
            }
        };
        let categories = match self.categories.query_all().await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to read categories {e:?}");
                vec![]
            }
        };
        let weights = match self.settings.current().await {
            Ok(v) => v.weights,
            Err(e) => {
                error!("Failed to read settings {e:?}");
                Default::default()
            }
        };

        stats::summarize(&logs, &categories, &weights)
    }

    /// Triggers one scan now. Rejects with a status entry when a scan is
    /// already in flight.
    pub async fn refresh_git_activity(&self) -> GitScanResult {
        let settings = match self.settings.current().await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to read settings for scan {e:?}");
                return GitScanResult::aborted(format!("settings unavailable: {e}"));
            }
        };
        self.scan_service.try_scan(&settings).await
    }

    pub fn record_dir(&self) -> &PathBuf {
        &self.record_dir
    }
}
