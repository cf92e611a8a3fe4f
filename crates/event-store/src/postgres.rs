use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, Snapshot, Version,
    store::{AppendBatch, EventStore, EventStream, record_commit, validate_batches},
};

const EVENT_COLUMNS: &str =
    "id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata";

/// PostgreSQL-backed event store.
///
/// Events carry a global `sequence` column that defines commit order for
/// projections; `(aggregate_id, version)` is unique, so two writers racing on
/// the same stream cannot both commit.
///
/// Appends take a transaction-scoped advisory lock before touching the
/// table. `sequence` values are therefore handed out in commit order and a
/// reader never sees a row while a lower sequence is still uncommitted, which
/// keeps positions passed to [`EventStore::stream_events_from`] stable.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Advisory lock key serializing appends.
    pub const APPEND_LOCK_KEY: i64 = 0x6576_656e_7473;

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store over the new pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: AggregateId,
    ) -> Result<Version> {
        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&mut **tx)
                .await?;
        Ok(Version::new(current.unwrap_or(0)))
    }

    async fn insert_batch(
        tx: &mut Transaction<'_, Postgres>,
        batch: &AppendBatch,
    ) -> Result<Version> {
        let mut last_version = Version::initial();
        let sql = format!(
            "INSERT INTO events ({EVENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );

        for event in &batch.events {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            sqlx::query(&sql)
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_aggregate_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_id: event.aggregate_id,
                        expected: batch.options.expected_version.unwrap_or_default(),
                        actual: event.version,
                    };
                }
                EventStoreError::Database(e)
            })?;

            last_version = event.version;
        }

        Ok(last_version)
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append_atomic(&self, batches: Vec<AppendBatch>) -> Result<Vec<Version>> {
        validate_batches(&batches)?;

        // Dropping the transaction without commit rolls every batch back.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(Self::APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        for batch in &batches {
            let (Some(aggregate_id), Some(expected)) =
                (batch.aggregate_id(), batch.options.expected_version)
            else {
                continue;
            };
            let actual = Self::current_version(&mut tx, aggregate_id).await?;
            if actual != expected {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                });
            }
        }

        let mut versions = Vec::with_capacity(batches.len());
        for batch in &batches {
            versions.push(Self::insert_batch(&mut tx, batch).await?);
        }

        tx.commit().await?;
        record_commit(batches.len(), batches.iter().map(|b| b.events.len()).sum());
        Ok(versions)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE aggregate_id = $1 ORDER BY version ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_id = $1 AND version >= $2 ORDER BY version ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_uuid())
            .bind(from_version.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_events_from(&self, position: u64) -> Result<EventStream> {
        use futures_util::StreamExt;

        let offset = i64::try_from(position).unwrap_or(i64::MAX);
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY sequence ASC OFFSET $1");
        let rows = sqlx::query(&sql)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let stream = futures_util::stream::iter(rows).map(Self::row_to_event);
        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, timestamp, state)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (aggregate_id) DO UPDATE SET
                aggregate_type = EXCLUDED.aggregate_type,
                version = EXCLUDED.version,
                timestamp = EXCLUDED.timestamp,
                state = EXCLUDED.state
            "#,
        )
        .bind(snapshot.aggregate_id.as_uuid())
        .bind(&snapshot.aggregate_type)
        .bind(snapshot.version.as_i64())
        .bind(snapshot.timestamp)
        .bind(&snapshot.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_snapshot(&self, aggregate_id: AggregateId) -> Result<Option<Snapshot>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT aggregate_id, aggregate_type, version, timestamp, state
            FROM snapshots
            WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Snapshot> {
            Ok(Snapshot {
                aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
                aggregate_type: row.try_get("aggregate_type")?,
                version: Version::new(row.try_get("version")?),
                timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
                state: row.try_get("state")?,
            })
        })
        .transpose()
    }
}
