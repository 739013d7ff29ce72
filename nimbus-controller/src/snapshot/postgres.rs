//! Postgres snapshot store
//!
//! The whole snapshot is one JSONB document in a single-row table.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, postgres::PgPoolOptions};

use super::{Snapshot, SnapshotStore};
use crate::error::Result;

/// Primary key of the only row
const SNAPSHOT_ROW: i32 = 1;

pub async fn create_pool(database_url: &str) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(4)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY,
            version INTEGER NOT NULL,
            saved_at TIMESTAMPTZ NOT NULL,
            document JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and makes sure the table exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (id, version, saved_at, document)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                version = EXCLUDED.version,
                saved_at = EXCLUDED.saved_at,
                document = EXCLUDED.document
            "#,
        )
        .bind(SNAPSHOT_ROW)
        .bind(snapshot.version as i32)
        .bind(snapshot.saved_at)
        .bind(Json(snapshot))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self) -> Result<Option<Snapshot>> {
        let row: Option<(Json<Snapshot>,)> =
            sqlx::query_as("SELECT document FROM snapshots WHERE id = $1")
                .bind(SNAPSHOT_ROW)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(snapshot),)| snapshot))
    }
}
