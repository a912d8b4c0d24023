//! SQLite EventStore implementation.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, Order as SqlOrder, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tokio::sync::broadcast;
use tracing::debug;

use super::format_timestamp;
use crate::model::{AggregateType, Editor, Event, EventPayload};
use crate::storage::helpers::{check_expected_sequence, parse_timestamp, post_filter, validate_filter};
use crate::storage::schema::{Events, CREATE_EVENTS_TABLE};
use crate::storage::{
    AppendRequest, EventFilter, EventStore, Order, Result, StorageError, TransactionTracker,
};

const NOTIFY_CAPACITY: usize = 1024;

/// SQLite implementation of EventStore.
///
/// The open transaction registry only covers writers in this process; a
/// database shared between processes relies on SQLite's writer lock alone.
pub struct SqliteEventStore {
    pool: SqlitePool,
    transactions: TransactionTracker,
    notify: broadcast::Sender<u64>,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            pool,
            transactions: TransactionTracker::new(),
            notify,
        }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_EVENTS_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    pub fn transactions(&self) -> &TransactionTracker {
        &self.transactions
    }

    async fn head(
        conn: &mut SqliteConnection,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Events::Sequence).max())
            .from(Events::Table)
            .and_where(Expr::col(Events::AggregateType).eq(aggregate_type.as_str()))
            .and_where(Expr::col(Events::AggregateId).eq(aggregate_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        let max_seq: Option<i64> = row.and_then(|row| row.get(0));
        Ok(max_seq.map(|s| s as u64).unwrap_or(0))
    }

    /// Check and insert all requests within an already-started transaction.
    async fn insert_events(
        conn: &mut SqliteConnection,
        appends: Vec<AppendRequest>,
    ) -> Result<Vec<Event>> {
        let mut heads: HashMap<(AggregateType, String), u64> = HashMap::new();
        for append in &appends {
            let key = (append.aggregate_type, append.aggregate_id.clone());
            let current = match heads.get(&key) {
                Some(head) => *head,
                None => Self::head(conn, append.aggregate_type, &append.aggregate_id).await?,
            };
            check_expected_sequence(append, current)?;
            heads.insert(key, current + append.events.len() as u64);
        }

        let created_at = format_timestamp(Utc::now());
        let creation_date = parse_timestamp(&created_at)?;

        let mut stored = Vec::new();
        for append in appends {
            let mut sequence = append.expected_sequence;
            for pending in append.events {
                sequence += 1;
                let payload = serde_json::to_string(&pending.payload)?;

                let query = Query::insert()
                    .into_table(Events::Table)
                    .columns([
                        Events::AggregateType,
                        Events::AggregateId,
                        Events::Sequence,
                        Events::ResourceOwner,
                        Events::EventType,
                        Events::EditorUser,
                        Events::EditorName,
                        Events::Payload,
                        Events::CreatedAt,
                    ])
                    .values_panic([
                        append.aggregate_type.as_str().into(),
                        append.aggregate_id.clone().into(),
                        (sequence as i64).into(),
                        append.resource_owner.clone().into(),
                        pending.payload.event_type().into(),
                        pending.editor.user_id.clone().into(),
                        pending.editor.display_name.clone().into(),
                        payload.into(),
                        created_at.clone().into(),
                    ])
                    .to_string(SqliteQueryBuilder);

                let result = sqlx::query(&query).execute(&mut *conn).await?;

                stored.push(Event {
                    aggregate_type: append.aggregate_type,
                    aggregate_id: append.aggregate_id.clone(),
                    sequence,
                    position: result.last_insert_rowid() as u64,
                    resource_owner: append.resource_owner.clone(),
                    creation_date,
                    editor: pending.editor,
                    payload: pending.payload,
                });
            }
        }

        Ok(stored)
    }

    fn decode_row(row: &SqliteRow) -> Result<Event> {
        let aggregate_type: String = row.get("aggregate_type");
        let aggregate_type = aggregate_type
            .parse::<AggregateType>()
            .map_err(StorageError::UnknownAggregateType)?;
        let sequence: i64 = row.get("sequence");
        let position: i64 = row.get("position");
        let created_at: String = row.get("created_at");
        let payload: String = row.get("payload");

        Ok(Event {
            aggregate_type,
            aggregate_id: row.get("aggregate_id"),
            sequence: sequence as u64,
            position: position as u64,
            resource_owner: row.get("resource_owner"),
            creation_date: parse_timestamp(&created_at)?,
            editor: Editor::new(
                row.get::<String, _>("editor_user"),
                row.get::<String, _>("editor_name"),
            ),
            payload: serde_json::from_str::<EventPayload>(&payload)?,
        })
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn push(&self, appends: Vec<AppendRequest>) -> Result<Vec<Event>> {
        let _tx = self.transactions.begin(
            appends
                .iter()
                .map(|a| (a.aggregate_type, a.aggregate_id.clone()))
                .collect(),
        );

        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::insert_events(&mut conn, appends).await;

        let stored = match result {
            Ok(stored) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                stored
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        };

        if let Some(last) = stored.last() {
            debug!(
                events = stored.len(),
                position = last.position,
                "Committed events"
            );
            let _ = self.notify.send(last.position);
        }
        Ok(stored)
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        validate_filter(filter)?;

        if filter.await_open_transactions {
            self.transactions.await_before(Instant::now(), filter).await;
        }

        let sql = {
            let mut query = Query::select();
            query
                .columns([
                    Events::Position,
                    Events::AggregateType,
                    Events::AggregateId,
                    Events::Sequence,
                    Events::ResourceOwner,
                    Events::EditorUser,
                    Events::EditorName,
                    Events::Payload,
                    Events::CreatedAt,
                ])
                .from(Events::Table);

            if !filter.aggregate_types.is_empty() {
                query.and_where(
                    Expr::col(Events::AggregateType)
                        .is_in(filter.aggregate_types.iter().map(|t| t.as_str())),
                );
            }
            if !filter.aggregate_ids.is_empty() {
                query.and_where(Expr::col(Events::AggregateId).is_in(filter.aggregate_ids.iter().cloned()));
            }
            if let Some(owner) = &filter.resource_owner {
                query.and_where(Expr::col(Events::ResourceOwner).eq(owner.as_str()));
            }
            if !filter.event_types.is_empty() {
                query.and_where(Expr::col(Events::EventType).is_in(filter.event_types.iter().cloned()));
            }
            if let Some(seq) = filter.sequence_greater {
                query.and_where(Expr::col(Events::Sequence).gt(seq as i64));
            }
            if let Some(pos) = filter.position_greater {
                query.and_where(Expr::col(Events::Position).gt(pos as i64));
            }
            if let Some(as_of) = filter.as_of {
                query.and_where(Expr::col(Events::CreatedAt).lte(format_timestamp(as_of)));
            }

            let order = match filter.order {
                Order::Asc => SqlOrder::Asc,
                Order::Desc => SqlOrder::Desc,
            };
            query.order_by(Events::Position, order);

            if let (Some(limit), false) = (filter.limit, filter.has_data_predicates()) {
                query.limit(limit as u64);
            }

            query.to_string(SqliteQueryBuilder)
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            events.push(Self::decode_row(row)?);
        }

        post_filter(events, filter)
    }

    async fn current_sequence(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        Self::head(&mut conn, aggregate_type, aggregate_id).await
    }

    async fn latest_position(&self) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Events::Position).max())
            .from(Events::Table)
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        let max_pos: Option<i64> = row.and_then(|row| row.get(0));
        Ok(max_pos.map(|p| p as u64).unwrap_or(0))
    }

    fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.notify.subscribe()
    }
}
