use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::error::Error;

use super::eligibility::EchoPayload;
use super::fingerprint::ContentFingerprint;
use super::store::{CooldownMark, CooldownStore, InsertOutcome, Observation, ObservationStore};

/// Flattened payload columns shared by both tables.
struct PayloadColumns {
    text: Option<String>,
    attachment_kind: Option<&'static str>,
    file_id: Option<String>,
    unique_id: Option<String>,
}

impl From<&EchoPayload> for PayloadColumns {
    fn from(payload: &EchoPayload) -> Self {
        match payload {
            EchoPayload::Text { text } => Self {
                text: Some(text.clone()),
                attachment_kind: None,
                file_id: None,
                unique_id: None,
            },
            EchoPayload::Attachment {
                attachment_kind,
                stable_unique_id,
                transfer_id,
            } => Self {
                text: None,
                attachment_kind: Some(attachment_kind.as_str()),
                file_id: Some(transfer_id.clone()),
                unique_id: Some(stable_unique_id.clone()),
            },
        }
    }
}

/// PostgreSQL-backed observation and cooldown store.
///
/// Uses `sqlx` runtime queries (no compile-time macros). Idempotent inserts
/// rely on a unique index plus `ON CONFLICT DO NOTHING`, so concurrent
/// writers never see a duplicate-key error. All timestamps come from the
/// caller, never from the database clock.
pub struct PostgresRepeatStore {
    pool: PgPool,
}

impl PostgresRepeatStore {
    /// Create from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to PostgreSQL using the given URL.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| Error::Store(format!("database connection failed: {e}")))?;
        Ok(Self { pool })
    }

    /// Run the repeat table migration. Safe to call multiple times.
    pub async fn run_migration(&self) -> Result<(), Error> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS repeat_message (
                id                   BIGSERIAL PRIMARY KEY,
                chat_id              BIGINT NOT NULL,
                message_type         TEXT NOT NULL,
                message_hash         TEXT NOT NULL,
                user_id              BIGINT NOT NULL,
                message_text         TEXT,
                attachment_kind      TEXT,
                attachment_file_id   TEXT,
                attachment_unique_id TEXT,
                created_at           TIMESTAMPTZ NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS repeat_message_unique_user_idx
                ON repeat_message(chat_id, message_type, message_hash, user_id);
            CREATE INDEX IF NOT EXISTS repeat_message_chat_hash_idx
                ON repeat_message(chat_id, message_type, message_hash, created_at);
            CREATE INDEX IF NOT EXISTS repeat_message_created_idx
                ON repeat_message(created_at);

            CREATE TABLE IF NOT EXISTS repeat_cooldown (
                id                   BIGSERIAL PRIMARY KEY,
                chat_id              BIGINT NOT NULL,
                message_type         TEXT NOT NULL,
                message_hash         TEXT NOT NULL,
                message_text         TEXT,
                attachment_unique_id TEXT,
                created_at           TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS repeat_cooldown_chat_hash_idx
                ON repeat_cooldown(chat_id, message_type, message_hash, created_at);
            CREATE INDEX IF NOT EXISTS repeat_cooldown_created_idx
                ON repeat_cooldown(created_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Store(format!("repeat migration failed: {e}")))?;
        Ok(())
    }
}

impl ObservationStore for PostgresRepeatStore {
    fn insert_if_absent(
        &self,
        observation: Observation,
    ) -> Pin<Box<dyn Future<Output = Result<InsertOutcome, Error>> + Send + '_>> {
        Box::pin(async move {
            let cols = PayloadColumns::from(&observation.payload);
            let result = sqlx::query(
                r#"INSERT INTO repeat_message
                    (chat_id, message_type, message_hash, user_id, message_text,
                     attachment_kind, attachment_file_id, attachment_unique_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (chat_id, message_type, message_hash, user_id) DO NOTHING"#,
            )
            .bind(observation.chat_id)
            .bind(observation.fingerprint.class().as_str())
            .bind(observation.fingerprint.digest())
            .bind(observation.user_id)
            .bind(cols.text)
            .bind(cols.attachment_kind)
            .bind(cols.file_id)
            .bind(cols.unique_id)
            .bind(observation.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("insert repeat_message failed: {e}")))?;

            Ok(if result.rows_affected() == 0 {
                InsertOutcome::AlreadyPresent
            } else {
                InsertOutcome::Inserted
            })
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
            let row = sqlx::query(
                r#"SELECT COUNT(*) AS user_count FROM repeat_message
                WHERE chat_id = $1 AND message_type = $2 AND message_hash = $3
                  AND created_at > $4"#,
            )
            .bind(chat_id)
            .bind(fingerprint.class().as_str())
            .bind(fingerprint.digest())
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("count repeat_message failed: {e}")))?;
            let count: i64 = row.get("user_count");
            Ok(count.max(0) as usize)
        })
    }

    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM repeat_message WHERE created_at <= $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Store(format!("delete repeat_message failed: {e}")))?;
            Ok(result.rows_affected())
        })
    }
}

impl CooldownStore for PostgresRepeatStore {
    fn is_active(
        &self,
        chat_id: i64,
        fingerprint: &ContentFingerprint,
        since: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<bool, Error>> + Send + '_>> {
        let fingerprint = fingerprint.clone();
        Box::pin(async move {
            let row = sqlx::query(
                r#"SELECT id FROM repeat_cooldown
                WHERE chat_id = $1 AND message_type = $2 AND message_hash = $3
                  AND created_at > $4
                LIMIT 1"#,
            )
            .bind(chat_id)
            .bind(fingerprint.class().as_str())
            .bind(fingerprint.digest())
            .bind(since)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("query repeat_cooldown failed: {e}")))?;
            Ok(row.is_some())
        })
    }

    fn insert(
        &self,
        mark: CooldownMark,
    ) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + '_>> {
        Box::pin(async move {
            let cols = PayloadColumns::from(&mark.payload);
            sqlx::query(
                r#"INSERT INTO repeat_cooldown
                    (chat_id, message_type, message_hash, message_text,
                     attachment_unique_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)"#,
            )
            .bind(mark.chat_id)
            .bind(mark.fingerprint.class().as_str())
            .bind(mark.fingerprint.digest())
            .bind(cols.text)
            .bind(cols.unique_id)
            .bind(mark.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Store(format!("insert repeat_cooldown failed: {e}")))?;
            Ok(())
        })
    }

    fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<u64, Error>> + Send + '_>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM repeat_cooldown WHERE created_at <= $1")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Store(format!("delete repeat_cooldown failed: {e}")))?;
            Ok(result.rows_affected())
        })
    }
}
