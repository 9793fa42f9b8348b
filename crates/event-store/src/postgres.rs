use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Result, UncommittedEvent, Version,
    store::{
        AppendOptions, EventStore, EventStream, assign_versions, check_expected_version,
        validate_events_for_append,
    },
};

/// Rows fetched per round trip when streaming the whole table.
const DEFAULT_STREAM_PAGE_SIZE: i64 = 500;

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    page_size: i64,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            page_size: DEFAULT_STREAM_PAGE_SIZE,
        }
    }

    /// Sets how many rows each page of the global stream fetches (at least 1).
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Fetches the rows after `after` in `sequence` order. The returned cursor
    /// is `None` once a short page shows the table is exhausted.
    async fn fetch_page(
        pool: &PgPool,
        after: i64,
        page_size: i64,
    ) -> Result<(Vec<Result<EventEnvelope>>, Option<i64>)> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, event_name, aggregate_id, aggregate_name, version, timestamp, payload, metadata
            FROM events
            WHERE sequence > $1
            ORDER BY sequence ASC
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(page_size)
        .fetch_all(pool)
        .await?;

        let next = match rows.last() {
            Some(last) if rows.len() as i64 == page_size => Some(last.try_get::<i64, _>("sequence")?),
            _ => None,
        };

        Ok((rows.into_iter().map(Self::row_to_event).collect(), next))
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_name: row.try_get("event_name")?,
            aggregate_id: AggregateId::new(row.try_get::<String, _>("aggregate_id")?),
            aggregate_name: row.try_get("aggregate_name")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(
        &self,
        aggregate_id: &AggregateId,
        events: Vec<UncommittedEvent>,
        options: AppendOptions,
    ) -> Result<Vec<EventEnvelope>> {
        validate_events_for_append(aggregate_id, &events)?;
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_str())
                .fetch_one(&mut *tx)
                .await?;
        let current_version = Version::new(current_version.unwrap_or(0));

        let first_version = check_expected_version(aggregate_id, current_version, options)?;
        let envelopes = assign_versions(events, first_version);

        for event in &envelopes {
            let metadata_json = serde_json::to_value(&event.metadata)?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO events (id, event_name, aggregate_id, aggregate_name, version, timestamp, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_name)
            .bind(event.aggregate_id.as_str())
            .bind(&event.aggregate_name)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {}
                // A concurrent writer claimed this version between our read and insert
                Err(e) if is_version_conflict(&e) => {
                    tx.rollback().await?;
                    let actual = self
                        .get_aggregate_version(aggregate_id)
                        .await?
                        .unwrap_or_else(Version::initial);
                    return Err(EventStoreError::ConcurrencyConflict {
                        aggregate_id: aggregate_id.clone(),
                        expected: options.expected_version.unwrap_or(current_version),
                        actual,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        tx.commit().await?;
        Ok(envelopes)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_name, aggregate_id, aggregate_name, version, timestamp, payload, metadata
            FROM events
            WHERE aggregate_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(EventStoreError::AggregateNotFound(aggregate_id.clone()));
        }

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_aggregate_version(&self, aggregate_id: &AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    /// Streams every event in insertion order, one page of `page_size` rows
    /// at a time, keyed on the `sequence` column.
    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::{TryStreamExt, stream};

        let pool = self.pool.clone();
        let page_size = self.page_size;

        let pages = stream::try_unfold(Some(0_i64), move |cursor| {
            let pool = pool.clone();
            async move {
                let Some(after) = cursor else {
                    return Ok(None);
                };
                let (events, next) = Self::fetch_page(&pool, after, page_size).await?;
                Ok::<_, EventStoreError>(Some((stream::iter(events), next)))
            }
        });

        Ok(Box::pin(pages.try_flatten()))
    }
}

fn is_version_conflict(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.constraint() == Some("unique_aggregate_version")
    )
}
