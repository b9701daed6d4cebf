use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use monitor::{ActivityMonitor, FocusSample, IdleGate};
use span::SpanTracker;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    focus_api::{FocusSampler, GenericFocusSampler},
    scan::{scheduler::ScanScheduler, service::GitScanService},
    storage::{
        activity_store::ActivityStoreImpl, git_store::GitActivityStoreImpl,
        settings::SettingsStoreImpl,
    },
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod monitor;
pub mod shutdown;
pub mod span;

const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(2);

/// Idle time before a session counts as away from keyboard.
const DEFAULT_IDLE_THRESHOLD_S: u32 = 60 * 2;

/// Represents the starting point for the daemon.
pub async fn start_daemon(dir: PathBuf) -> Result<()> {
    std::env::set_current_dir("/")?;

    let (sender, receiver) = mpsc::channel::<FocusSample>(10);
    let sampler = GenericFocusSampler::new()?;

    let shutdown_token = CancellationToken::new();

    let monitor = create_monitor(sender, sampler, &shutdown_token, DefaultClock);

    let tracker = create_span_tracker(dir.join("records"))?;

    let scheduler = create_scheduler(&dir, &shutdown_token, DefaultClock).await?;

    let (_, monitor_result, tracker_result, scheduler_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token),
        monitor.run(),
        tracker.run(receiver),
        scheduler.run(),
    );

    if let Err(monitor_result) = monitor_result {
        error!("Activity monitor got an error {:?}", monitor_result);
    }

    if let Err(tracker_result) = tracker_result {
        error!("Span tracker got an error {:?}", tracker_result);
    }

    if let Err(scheduler_result) = scheduler_result {
        error!("Scan scheduler got an error {:?}", scheduler_result);
    }

    Ok(())
}

fn create_monitor(
    sender: mpsc::Sender<FocusSample>,
    sampler: impl FocusSampler + 'static,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> ActivityMonitor {
    ActivityMonitor::new(
        sender,
        Box::new(sampler),
        shutdown_token.clone(),
        IdleGate::from_seconds(DEFAULT_IDLE_THRESHOLD_S),
        DEFAULT_SAMPLE_INTERVAL,
        Box::new(clock),
    )
}

fn create_span_tracker(record_dir: PathBuf) -> Result<SpanTracker<ActivityStoreImpl>> {
    let storage = ActivityStoreImpl::new(record_dir)?;
    Ok(SpanTracker::new(storage))
}

async fn create_scheduler(
    dir: &PathBuf,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> Result<ScanScheduler<GitActivityStoreImpl, SettingsStoreImpl>> {
    let git_store = GitActivityStoreImpl::open(dir.clone()).await?;
    let service = Arc::new(GitScanService::new(git_store, Box::new(DefaultClock)));
    let settings = SettingsStoreImpl::new(dir.clone())?;
    Ok(ScanScheduler::new(
        service,
        settings,
        shutdown_token.clone(),
        Box::new(clock),
    ))
}
