use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::Error;

use super::eligibility::EchoPayload;
use super::fingerprint::ContentFingerprint;

/// One user's sighting of one piece of content in one chat.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub chat_id: i64,
    pub fingerprint: ContentFingerprint,
    pub user_id: i64,
    pub payload: EchoPayload,
    pub created_at: DateTime<Utc>,
}

/// Marks content as recently echoed in a chat.
#[derive(Debug, Clone, PartialEq)]
pub struct CooldownMark {
    pub chat_id: i64,
    pub fingerprint: ContentFingerprint,
    pub payload: EchoPayload,
    pub created_at: DateTime<Utc>,
}

/// Result of an idempotent observation insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row for the same `(chat, fingerprint, user)` already existed.
    AlreadyPresent,
}

/// Durable log of who posted what, where and when.
///
/// Implementations must make `insert_if_absent` atomic: concurrent inserts of
/// the same `(chat_id, fingerprint, user_id)` yield exactly one row and never
/// an error. Uses `Pin<Box<dyn Future>>` for dyn-compatibility.
pub trait ObservationStore: Send + Sync {
    fn insert_if_absent(
        &self,
        observation: Observation,
    ) -> Pin<Box<dyn Future<Output = Result<InsertOutcome, Error>> + Send + '_>>;

    /// Count observations of `fingerprint` in `chat_id` created strictly after `since`.
    fn count_observers(
        &self,
        chat_id: i64,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + '_>>;

    /// Delete every observation created at or before `cutoff`. Returns the number removed.
    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + '_>>;
}

/// Durable log of recent echoes.
pub trait CooldownStore: Send + Sync {
    /// True if a mark for the pair was created strictly after `since`.
    fn is_active(
        &self,
        chat_id: i64,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>>;

    fn insert(
        &self,
        mark: CooldownMark,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>>;

    /// Delete every mark created at or before `cutoff`. Returns the number removed.
    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + '_>>;
}

/// Start of the window of length `window` ending at `now`.
///
/// Returns `Error::Config` when the result is outside chrono's range.
pub(crate) fn window_start(
    now: DateTime<Utc>,
    window: chrono::Duration,
) -> Result<DateTime<Utc>, Error> {
    now.checked_sub_signed(window)
        .ok_or_else(|| Error::Config(format!("window of {window} before {now} is out of range")))
}

type ObservationKey = (i64, ContentFingerprint, i64);

/// In-memory implementation of both repeat stores.
///
/// Backed by `std::sync::RwLock` (never held across `.await`). Suitable for
/// tests and single-process deployments where losing state on restart is fine.
pub struct InMemoryRepeatStore {
    observations: RwLock<HashMap<ObservationKey, Observation>>,
    cooldowns: RwLock<Vec<CooldownMark>>,
}

impl InMemoryRepeatStore {
    pub fn new() -> Self {
        Self {
            observations: RwLock::new(HashMap::new()),
            cooldowns: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored observations, live or expired.
    pub fn observation_len(&self) -> usize {
        self.observations.read().map(|o| o.len()).unwrap_or(0)
    }

    /// Number of stored cooldown marks, live or expired.
    pub fn cooldown_len(&self) -> usize {
        self.cooldowns.read().map(|c| c.len()).unwrap_or(0)
    }
}

impl Default for InMemoryRepeatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservationStore for InMemoryRepeatStore {
    fn insert_if_absent(
        &self,
        observation: Observation,
    ) -> Pin<Box<dyn Future<Output = Result<InsertOutcome, Error>> + Send + '_>> {
        Box::pin(async move {
            let mut observations = self
                .observations
                .write()
                .map_err(|e| Error::Store(format!("lock poisoned: {e}")))?;
            let key = (
                observation.chat_id,
                observation.fingerprint.clone(),
                observation.user_id,
            );
            if observations.contains_key(&key) {
                return Ok(InsertOutcome::AlreadyPresent);
            }
            observations.insert(key, observation);
            Ok(InsertOutcome::Inserted)
        })
    }

    fn count_observers(
        &self,
        chat_id: i64,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<usize, Error>> + Send + '_>> {
        let fingerprint = fingerprint.clone();
        Box::pin(async move {
            let observations = self
                .observations
                .read()
                .map_err(|e| Error::Store(format!("lock poisoned: {e}")))?;
            Ok(observations
                .values()
                .filter(|o| {
                    o.chat_id == chat_id && o.fingerprint == fingerprint && o.created_at > since
                })
                .count())
        })
    }

    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + '_>> {
        Box::pin(async move {
            let mut observations = self
                .observations
                .write()
                .map_err(|e| Error::Store(format!("lock poisoned: {e}")))?;
            let before = observations.len();
            observations.retain(|_, o| o.created_at > cutoff);
            Ok((before - observations.len()) as u64)
        })
    }
}

impl CooldownStore for InMemoryRepeatStore {
    fn is_active(
        &self,
        chat_id: i64,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>> {
        let fingerprint = fingerprint.clone();
        Box::pin(async move {
            let cooldowns = self
                .cooldowns
                .read()
                .map_err(|e| Error::Store(format!("lock poisoned: {e}")))?;
            Ok(cooldowns.iter().any(|m| {
                m.chat_id == chat_id && m.fingerprint == fingerprint && m.created_at > since
            }))
        })
    }

    fn insert(
        &self,
        mark: CooldownMark,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            let mut cooldowns = self
                .cooldowns
                .write()
                .map_err(|e| Error::Store(format!("lock poisoned: {e}")))?;
            cooldowns.push(mark);
            Ok(())
        })
    }

    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + '_>> {
        Box::pin(async move {
            let mut cooldowns = self
                .cooldowns
                .write()
                .map_err(|e| Error::Store(format!("lock poisoned: {e}")))?;
            let before = cooldowns.len();
            cooldowns.retain(|m| m.created_at > cutoff);
            Ok((before - cooldowns.len()) as u64)
        })
    }
}
