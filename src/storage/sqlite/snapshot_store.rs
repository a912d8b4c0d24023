//! SQLite SnapshotStore implementation.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use super::format_timestamp;
use crate::model::AggregateType;
use crate::storage::helpers::parse_timestamp;
use crate::storage::schema::{Snapshots, CREATE_SNAPSHOTS_TABLE};
use crate::storage::{Result, Snapshot, SnapshotStore};

/// SQLite implementation of SnapshotStore.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// Create a new SQLite snapshot store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_SNAPSHOTS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn get(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Option<Snapshot>> {
        let query = Query::select()
            .columns([
                Snapshots::Sequence,
                Snapshots::Position,
                Snapshots::ResourceOwner,
                Snapshots::ChangeDate,
                Snapshots::StateData,
            ])
            .from(Snapshots::Table)
            .and_where(Expr::col(Snapshots::AggregateType).eq(aggregate_type.as_str()))
            .and_where(Expr::col(Snapshots::AggregateId).eq(aggregate_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let sequence: i64 = row.get("sequence");
        let position: i64 = row.get("position");
        let change_date: String = row.get("change_date");
        let state_data: String = row.get("state_data");

        Ok(Some(Snapshot {
            sequence: sequence as u64,
            position: position as u64,
            resource_owner: row.get("resource_owner"),
            change_date: parse_timestamp(&change_date)?,
            state: serde_json::from_str(&state_data)?,
        }))
    }

    async fn put(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        snapshot: Snapshot,
    ) -> Result<()> {
        let state_data = serde_json::to_string(&snapshot.state)?;
        let created_at = format_timestamp(Utc::now());

        let query = Query::insert()
            .into_table(Snapshots::Table)
            .columns([
                Snapshots::AggregateType,
                Snapshots::AggregateId,
                Snapshots::Sequence,
                Snapshots::Position,
                Snapshots::ResourceOwner,
                Snapshots::ChangeDate,
                Snapshots::StateData,
                Snapshots::CreatedAt,
            ])
            .values_panic([
                aggregate_type.as_str().into(),
                aggregate_id.into(),
                (snapshot.sequence as i64).into(),
                (snapshot.position as i64).into(),
                snapshot.resource_owner.into(),
                format_timestamp(snapshot.change_date).into(),
                state_data.into(),
                created_at.into(),
            ])
            .on_conflict(
                OnConflict::columns([Snapshots::AggregateType, Snapshots::AggregateId])
                    .update_columns([
                        Snapshots::Sequence,
                        Snapshots::Position,
                        Snapshots::ResourceOwner,
                        Snapshots::ChangeDate,
                        Snapshots::StateData,
                        Snapshots::CreatedAt,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }

    async fn delete(&self, aggregate_type: AggregateType, aggregate_id: &str) -> Result<()> {
        let query = Query::delete()
            .from_table(Snapshots::Table)
            .and_where(Expr::col(Snapshots::AggregateType).eq(aggregate_type.as_str()))
            .and_where(Expr::col(Snapshots::AggregateId).eq(aggregate_id))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }
}
