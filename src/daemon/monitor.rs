use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument};

use crate::{
    focus_api::{AppIdentity, FocusSampler},
    storage::entities::LOGIN_WINDOW_APP_ID,
    utils::clock::Clock,
};

/// One observation of foreground focus at a point in time.
#[derive(Debug, Clone)]
pub struct FocusSample {
    pub identity: AppIdentity,
    pub moment: DateTime<Utc>,
}

/// Decides when accumulated input inactivity counts as being away.
pub struct IdleGate {
    threshold_ms: u32,
}

impl IdleGate {
    pub fn from_seconds(threshold_s: u32) -> Self {
        Self {
            threshold_ms: threshold_s * 1000,
        }
    }

    pub fn is_idle(&self, idle_time_ms: u32) -> bool {
        self.threshold_ms < idle_time_ms
    }
}

/// Samples the foreground application on a fixed cadence and feeds
/// observations to the span tracker. Idle time beyond the gate is reported
/// under the login-window identity so it never counts as app usage.
pub struct ActivityMonitor {
    next: mpsc::Sender<FocusSample>,
    sampler: Box<dyn FocusSampler>,
    shutdown: CancellationToken,
    idle_gate: IdleGate,
    sample_interval: Duration,
    clock: Box<dyn Clock>,
}

impl ActivityMonitor {
    pub fn new(
        next: mpsc::Sender<FocusSample>,
        sampler: Box<dyn FocusSampler>,
        shutdown: CancellationToken,
        idle_gate: IdleGate,
        sample_interval: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            sampler,
            shutdown,
            idle_gate,
            sample_interval,
            clock,
        }
    }

    fn observe(&mut self) -> Result<FocusSample> {
        let identity = self.sampler.sample()?;
        let idle_ms = self.sampler.idle_time_ms()?;
        let moment = self.clock.time();

        let identity = if self.idle_gate.is_idle(idle_ms) {
            AppIdentity {
                app_id: LOGIN_WINDOW_APP_ID.into(),
                app_name: "Idle".into(),
            }
        } else {
            identity
        };

        Ok(FocusSample { identity, moment })
    }

    /// Executes the sampling event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut sample_point = self.clock.instant();
        loop {
            sample_point += self.sample_interval;

            match self.observe() {
                Ok(sample) => {
                    let span = info_span!("Processing focus sample");
                    debug!("Sending sample {:?}", sample);
                    self.next
                        .send(sample)
                        .instrument(span)
                        .await
                        .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                }
                Err(e) => {
                    // Expected while focus state is unobservable, e.g. missing
                    // permissions or a locked session. No sample, no data.
                    error!("Encountered an error during sampling {:?}", e)
                }
            }

            tokio::select! {
                // Cancelation also drops the sender channel and consequently
                // ends the span tracker.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(sample_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IdleGate;

    #[test]
    fn test_idle_gate_threshold() {
        let gate = IdleGate::from_seconds(120);
        assert!(!gate.is_idle(0));
        assert!(!gate.is_idle(120_000));
        assert!(gate.is_idle(120_001));
    }
}
