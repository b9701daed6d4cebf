use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, warn};

use crate::{
    focus_api::AppIdentity,
    storage::{activity_store::ActivityStore, entities::ActivityLog},
};

use super::monitor::FocusSample;

/// Largest gap between two samples of the same application that still counts
/// as one continuous span. Anything longer means the daemon was suspended or
/// samples were lost, so the span is closed at its last confirmed moment.
const MAX_BRIDGE_GAP: Duration = Duration::seconds(5);

struct OpenSpan {
    identity: AppIdentity,
    start: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl OpenSpan {
    fn close(self, end: DateTime<Utc>) -> ActivityLog {
        ActivityLog {
            app_id: self.identity.app_id,
            app_name: self.identity.app_name,
            start: self.start,
            duration: end - self.start,
        }
    }
}

/// Condenses the sample stream into durationed activity records. Maintains
/// the single open span and flushes it whenever focus moves to another
/// application, the stream gaps out, or monitoring stops.
pub struct SpanTracker<A> {
    store: A,
    open: Option<OpenSpan>,
}

impl<A: ActivityStore> SpanTracker<A> {
    pub fn new(store: A) -> Self {
        Self { store, open: None }
    }

    async fn persist(&self, log: ActivityLog) -> Result<()> {
        if log.duration <= Duration::zero() {
            // focus flicker below the sampling resolution, nothing to record
            debug!("Discarding zero-length span for {}", log.app_id);
            return Ok(());
        }
        self.store.insert(log).await
    }

    pub async fn process(&mut self, sample: FocusSample) -> Result<()> {
        let closed = match self.open.take() {
            None => {
                self.open = Some(OpenSpan {
                    identity: sample.identity,
                    start: sample.moment,
                    last_seen: sample.moment,
                });
                return Ok(());
            }
            Some(mut span)
                if span.identity == sample.identity
                    && sample.moment - span.last_seen <= MAX_BRIDGE_GAP =>
            {
                span.last_seen = sample.moment;
                self.open = Some(span);
                return Ok(());
            }
            Some(span) if sample.moment - span.last_seen <= MAX_BRIDGE_GAP => {
                // focus switch: the transition gap belongs to the previous app
                let closed = span.close(sample.moment);
                self.open = Some(OpenSpan {
                    identity: sample.identity,
                    start: sample.moment,
                    last_seen: sample.moment,
                });
                closed
            }
            Some(span) => {
                // the stream gapped out, close at the last confirmed moment
                let end = span.last_seen;
                let closed = span.close(end);
                self.open = Some(OpenSpan {
                    identity: sample.identity,
                    start: sample.moment,
                    last_seen: sample.moment,
                });
                closed
            }
        };

        self.persist(closed).await
    }

    /// Flushes the open span, if any. Called when monitoring stops.
    pub async fn finalize(&mut self) -> Result<()> {
        if let Some(span) = self.open.take() {
            let end = span.last_seen;
            let log = span.close(end);
            self.persist(log).await?;
        }
        Ok(())
    }

    /// Executes the span tracking event loop until the sample channel closes.
    pub async fn run(mut self, mut receiver: Receiver<FocusSample>) -> Result<()> {
        while let Some(sample) = receiver.recv().await {
            debug!("Processing sample {:?}", sample);
            if let Err(e) = self.process(sample).await {
                // best effort, at-least-once. Losing one span must not stop
                // monitoring.
                error!("Error persisting span: {e:?}")
            }
        }

        let result = self.finalize().await;
        receiver.close();
        if let Err(e) = &result {
            warn!("Failed to flush final span {e:?}");
        }
        result
    }
}
