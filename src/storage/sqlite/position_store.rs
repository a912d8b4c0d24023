//! SQLite PositionStore implementation.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use super::format_timestamp;
use crate::model::AggregateType;
use crate::storage::schema::{Cursors, Positions, CREATE_POSITIONS_TABLES};
use crate::storage::{PositionStore, Result};

/// SQLite implementation of PositionStore.
pub struct SqlitePositionStore {
    pool: SqlitePool,
}

impl SqlitePositionStore {
    /// Create a new SQLite position store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_POSITIONS_TABLES)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PositionStore for SqlitePositionStore {
    async fn get(
        &self,
        projection: &str,
        aggregate_type: AggregateType,
        aggregate_id: &str,
    ) -> Result<Option<u64>> {
        let query = Query::select()
            .column(Positions::Sequence)
            .from(Positions::Table)
            .and_where(Expr::col(Positions::Projection).eq(projection))
            .and_where(Expr::col(Positions::AggregateType).eq(aggregate_type.as_str()))
            .and_where(Expr::col(Positions::AggregateId).eq(aggregate_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => {
                let sequence: i64 = row.get("sequence");
                Ok(Some(sequence as u64))
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        projection: &str,
        aggregate_type: AggregateType,
        aggregate_id: &str,
        sequence: u64,
    ) -> Result<()> {
        let updated_at = format_timestamp(Utc::now());

        let query = Query::insert()
            .into_table(Positions::Table)
            .columns([
                Positions::Projection,
                Positions::AggregateType,
                Positions::AggregateId,
                Positions::Sequence,
                Positions::UpdatedAt,
            ])
            .values_panic([
                projection.into(),
                aggregate_type.as_str().into(),
                aggregate_id.into(),
                (sequence as i64).into(),
                updated_at.into(),
            ])
            .on_conflict(
                OnConflict::columns([
                    Positions::Projection,
                    Positions::AggregateType,
                    Positions::AggregateId,
                ])
                .value(
                    Positions::Sequence,
                    Expr::cust("MAX(sequence, excluded.sequence)"),
                )
                .update_column(Positions::UpdatedAt)
                .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }

    async fn get_cursor(&self, projection: &str) -> Result<u64> {
        let query = Query::select()
            .column(Cursors::Position)
            .from(Cursors::Table)
            .and_where(Expr::col(Cursors::Projection).eq(projection))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        Ok(row
            .map(|row| row.get::<i64, _>("position") as u64)
            .unwrap_or(0))
    }

    async fn put_cursor(&self, projection: &str, position: u64) -> Result<()> {
        let updated_at = format_timestamp(Utc::now());

        let query = Query::insert()
            .into_table(Cursors::Table)
            .columns([Cursors::Projection, Cursors::Position, Cursors::UpdatedAt])
            .values_panic([
                projection.into(),
                (position as i64).into(),
                updated_at.into(),
            ])
            .on_conflict(
                OnConflict::column(Cursors::Projection)
                    .update_columns([Cursors::Position, Cursors::UpdatedAt])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;

        Ok(())
    }

    async fn reset(&self, projection: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let query = Query::delete()
            .from_table(Positions::Table)
            .and_where(Expr::col(Positions::Projection).eq(projection))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *tx).await?;

        let query = Query::delete()
            .from_table(Cursors::Table)
            .and_where(Expr::col(Cursors::Projection).eq(projection))
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }
}
