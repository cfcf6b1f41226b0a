use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RepeatConfig;
use crate::error::Error;

use super::store::{CooldownStore, ObservationStore, window_start};

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub observations: u64,
    pub cooldowns: u64,
}

/// Periodically deletes observations and cooldown marks that have aged out
/// of their windows.
///
/// Sweeping only reclaims space: the engine's queries already bound every
/// read by window, so a late or skipped sweep never changes a decision
/// beyond the per-user uniqueness of still-stored observations.
pub struct Reaper {
    observations: Arc<dyn ObservationStore>,
    cooldowns: Arc<dyn CooldownStore>,
    observation_window: Duration,
    cooldown_window: Duration,
    interval: StdDuration,
}

/// Handle to a spawned reaper task.
pub struct ReaperHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ReaperHandle {
    /// Cancel the loop and wait for it to exit. A sweep in flight finishes first.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.join.await {
            tracing::warn!(error = %e, "repeat reaper task ended abnormally");
        }
    }
}

impl Reaper {
    pub fn new(
        config: &RepeatConfig,
        observations: Arc<dyn ObservationStore>,
        cooldowns: Arc<dyn CooldownStore>,
    ) -> Self {
        Self {
            observations,
            cooldowns,
            observation_window: config.observation_window(),
            cooldown_window: config.cooldown_window(),
            interval: config.reaper_interval(),
        }
    }

    /// Delete everything created at or before `now - window` in both stores.
    ///
    /// Both deletes are attempted even if the first fails; the first error
    /// is returned.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, Error> {
        let observations = match window_start(now, self.observation_window) {
            Ok(cutoff) => self.observations.delete_older_than(cutoff).await,
            Err(e) => Err(e),
        };
        let cooldowns = match window_start(now, self.cooldown_window) {
            Ok(cutoff) => self.cooldowns.delete_older_than(cutoff).await,
            Err(e) => Err(e),
        };
        Ok(SweepReport {
            observations: observations?,
            cooldowns: cooldowns?,
        })
    }

    /// Run `sweep` every interval until `cancel` fires. The first sweep runs
    /// immediately.
    pub fn spawn(self, cancel: CancellationToken) -> ReaperHandle {
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        ReaperHandle { cancel, join }
    }

    async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("repeat reaper shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            match self.sweep(Utc::now()).await {
                Ok(report) => {
                    tracing::debug!(
                        observations = report.observations,
                        cooldowns = report.cooldowns,
                        "repeat reaper sweep complete"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "repeat reaper sweep failed");
                }
            }
        }
    }
}
