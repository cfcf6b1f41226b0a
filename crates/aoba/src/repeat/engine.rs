use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RepeatConfig;
use crate::error::Error;

use super::eligibility::{Candidate, EchoPayload, EligibilityFilter, InboundMessage, Rejection};
use super::fingerprint::ContentFingerprint;
use super::policy::ProbabilityTable;
use super::store::{
    CooldownMark, CooldownStore, InsertOutcome, Observation, ObservationStore, window_start,
};

/// Source of uniform draws in `[0, 1)`.
///
/// The only nondeterministic input to the engine; swap in a seeded or fixed
/// source to make decisions reproducible.
pub trait RandomSource: Send + Sync {
    fn draw(&self) -> f64;
}

/// `StdRng`-backed random source.
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for StdRandom {
    fn draw(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.r#gen::<f64>(),
            // A poisoned lock only means another draw panicked; the state is still valid.
            Err(poisoned) => poisoned.into_inner().r#gen::<f64>(),
        }
    }
}

/// Always returns the same draw.
#[derive(Debug, Clone, Copy)]
pub struct FixedDraw(pub f64);

impl RandomSource for FixedDraw {
    fn draw(&self) -> f64 {
        self.0
    }
}

/// Delivery side of an echo: puts the content back into the chat.
pub trait EchoSink: Send + Sync {
    fn emit<'a>(
        &'a self,
        chat_id: i64,
        payload: &'a EchoPayload,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>>;
}

/// Terminal state of one message's pass through the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatOutcome {
    /// Not a candidate; nothing was read or written.
    Rejected(Rejection),
    /// Content was echoed recently; nothing was recorded.
    Cooling,
    /// Observation recorded, no echo. `observers` is `None` when the count
    /// could not be read.
    ObservedNoTrigger {
        observers: Option<usize>,
        probability: f64,
    },
    /// Echo requested and cooldown marked. `emitted` is false when delivery failed.
    ObservedTriggered {
        observers: usize,
        probability: f64,
        emitted: bool,
    },
}

/// Watches group messages and occasionally repeats content that several
/// distinct users have posted within the observation window.
///
/// Stateless apart from the stores it is given; safe to share across tasks.
/// The observer count is read after the insert without any coordination, so
/// two near-simultaneous posters may both trigger. That trade-off is accepted.
pub struct RepeatEngine {
    filter: EligibilityFilter,
    table: ProbabilityTable,
    observation_window: Duration,
    cooldown_window: Duration,
    observations: Arc<dyn ObservationStore>,
    cooldowns: Arc<dyn CooldownStore>,
    sink: Arc<dyn EchoSink>,
    random: Arc<dyn RandomSource>,
}

impl RepeatEngine {
    pub fn new(
        config: &RepeatConfig,
        observations: Arc<dyn ObservationStore>,
        cooldowns: Arc<dyn CooldownStore>,
        sink: Arc<dyn EchoSink>,
    ) -> Self {
        Self {
            filter: EligibilityFilter::new(
                config.min_text_length,
                config.max_text_length,
                config.attachment_kinds.clone(),
            ),
            table: config.probability.clone(),
            observation_window: config.observation_window(),
            cooldown_window: config.cooldown_window(),
            observations,
            cooldowns,
            sink,
            random: Arc::new(StdRandom::from_entropy()),
        }
    }

    /// Replace the random source (tests, reproducible runs).
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Run one inbound message through the full decision procedure.
    ///
    /// Never fails: store and delivery errors are logged and degrade to
    /// not triggering (or, after a decision, to a missed echo).
    pub async fn record_and_decide(
        &self,
        msg: &InboundMessage,
        now: DateTime<Utc>,
    ) -> RepeatOutcome {
        let candidate = match self.filter.check(msg) {
            Ok(c) => c,
            Err(reason) => {
                tracing::trace!(chat_id = msg.chat_id, ?reason, "message not repeatable");
                return RepeatOutcome::Rejected(reason);
            }
        };
        let chat_id = candidate.chat_id;
        let fingerprint = &candidate.fingerprint;

        match self.is_in_cooldown(chat_id, fingerprint, now).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(chat_id, fingerprint = %fingerprint, "content in cooldown, skipping");
                return RepeatOutcome::Cooling;
            }
            Err(e) => {
                // Cannot prove the content is out of cooldown; sit this one out.
                tracing::warn!(
                    chat_id,
                    fingerprint = %fingerprint,
                    error = %e,
                    "cooldown lookup failed, skipping"
                );
                return RepeatOutcome::Cooling;
            }
        }

        let observers = match self.record_observation(&candidate, now).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    chat_id,
                    fingerprint = %fingerprint,
                    error = %e,
                    "observer count failed, not repeating"
                );
                return RepeatOutcome::ObservedNoTrigger {
                    observers: None,
                    probability: 0.0,
                };
            }
        };

        let probability = self.table.trigger_probability(fingerprint.class(), observers);
        let draw = self.random.draw();
        if !(probability > 0.0 && draw < probability) {
            tracing::debug!(
                chat_id,
                fingerprint = %fingerprint,
                observers,
                probability,
                draw,
                "not repeating"
            );
            return RepeatOutcome::ObservedNoTrigger {
                observers: Some(observers),
                probability,
            };
        }

        tracing::info!(
            chat_id,
            fingerprint = %fingerprint,
            observers,
            probability,
            draw,
            "repeating content"
        );

        let emitted = match self.sink.emit(chat_id, &candidate.payload).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(chat_id, fingerprint = %fingerprint, error = %e, "echo delivery failed");
                false
            }
        };

        // The decision stands whether or not delivery worked.
        if let Err(e) = self
            .mark_cooldown(chat_id, fingerprint, &candidate.payload, now)
            .await
        {
            tracing::warn!(chat_id, fingerprint = %fingerprint, error = %e, "cooldown insert failed");
        }

        RepeatOutcome::ObservedTriggered {
            observers,
            probability,
            emitted,
        }
    }

    /// Record the sighting and return the distinct-observer count in the window.
    ///
    /// A failed insert is logged and counting continues, so the result may
    /// undercount. Only a failed count is returned as an error.
    pub async fn record_observation(
        &self,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<usize, Error> {
        let observation = Observation {
            chat_id: candidate.chat_id,
            fingerprint: candidate.fingerprint.clone(),
            user_id: candidate.user_id,
            payload: candidate.payload.clone(),
            created_at: now,
        };
        match self.observations.insert_if_absent(observation).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::AlreadyPresent) => {
                tracing::trace!(
                    chat_id = candidate.chat_id,
                    user_id = candidate.user_id,
                    "observation already recorded"
                );
            }
            Err(e) => {
                tracing::warn!(
                    chat_id = candidate.chat_id,
                    fingerprint = %candidate.fingerprint,
                    error = %e,
                    "observation insert failed"
                );
            }
        }

        let since = window_start(now, self.observation_window)?;
        self.observations
            .count_observers(candidate.chat_id, &candidate.fingerprint, since)
            .await
    }

    pub async fn is_in_cooldown(
        &self,
        chat_id: i64,
        fingerprint: &ContentFingerprint,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let since = window_start(now, self.cooldown_window)?;
        self.cooldowns.is_active(chat_id, fingerprint, since).await
    }

    pub async fn mark_cooldown(
        &self,
        chat_id: i64,
        fingerprint: &ContentFingerprint,
        payload: &EchoPayload,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.cooldowns
            .insert(CooldownMark {
                chat_id,
                fingerprint: fingerprint.clone(),
                payload: payload.clone(),
                created_at: now,
            })
            .await
    }
}
