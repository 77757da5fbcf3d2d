//! PostgreSQL region source and glob table.
//!
//! ## Schema
//!
//! - `residences (label, home)`: overlay directory; `_all` is the baseline.
//! - `counties_master (id, county, state)`, `hits`, `bills`: eligibility.
//! - `counties_graph (a, b)`: undirected adjacency, one row per edge.
//! - `county_globs (county_id, glob_id, <label>_glob_id ...)`: output.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection acquire timeout (default: 10)

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;

use crate::types::{Overlay, RegionId, BASELINE_COLUMN};
use crate::writer::{check_single_row, is_plain_column, WriteError, WriteStage};
use super::{GlobRow, GlobTable, RegionSource};

/// Connection settings for a run.
///
/// A run issues one query at a time and exits, so the pool stays small.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool.
    pub max_connections: u32,
    /// Connection acquire timeout in seconds.
    pub connect_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/mapper".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
        }
    }
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<sqlx::Error> for WriteError {
    fn from(e: sqlx::Error) -> Self {
        Self::backend(e)
    }
}

/// PostgreSQL-backed region source and glob table.
pub struct PostgresGlobStore {
    pool: PgPool,
}

impl PostgresGlobStore {
    /// Connect using `config`.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Connect using settings from the environment.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::connect(&PostgresConfig::from_env()).await
    }
}

/// Collect decoded `id` values, failing on the first one that did not decode.
fn region_ids<I>(ids: I) -> Result<Vec<RegionId>, sqlx::Error>
where
    I: IntoIterator<Item = Result<i32, sqlx::Error>>,
{
    ids.into_iter().map(|id| id.map(RegionId::new)).collect()
}

#[async_trait]
impl RegionSource for PostgresGlobStore {
    type Error = PostgresError;

    async fn overlays(&self) -> Result<Vec<Overlay>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT label, home
            FROM residences
            ORDER BY label DESC
            "#
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let label: String = row.try_get("label")?;
                let home: i32 = row.try_get("home")?;
                Ok(Overlay::from_directory_row(label, RegionId::new(home)))
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(PostgresError::from)
    }

    async fn eligible_regions(&self, overlay: &Overlay) -> Result<Vec<RegionId>, Self::Error> {
        // The residence filter is bound, never spliced; NULL disables it.
        let residence: Option<&str> = (!overlay.is_baseline()).then_some(overlay.label.as_str());

        let rows = sqlx::query(
            r#"
            SELECT DISTINCT cm.id
            FROM hits h
            JOIN bills b ON h.bill_id = b.id
            JOIN counties_master cm ON h.county = cm.county AND h.state = cm.state
            WHERE h.country = 'US'
              AND h.state <> 'DC'
              AND ($1::text IS NULL OR b.residence = $1)
            ORDER BY cm.id
            "#
        )
        .bind(residence)
        .fetch_all(&self.pool)
        .await?;

        Ok(region_ids(rows.iter().map(|row| row.try_get::<i32, _>("id")))?)
    }

    async fn neighbors(&self, region: RegionId) -> Result<Vec<RegionId>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT CASE WHEN cg.a = $1 THEN cg.b ELSE cg.a END AS id
            FROM counties_graph cg
            WHERE cg.a = $1 OR cg.b = $1
            ORDER BY id
            "#
        )
        .bind(region.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(region_ids(rows.iter().map(|row| row.try_get::<i32, _>("id")))?)
    }
}

#[async_trait]
impl GlobTable for PostgresGlobStore {
    async fn replace_baseline(&self, rows: &[GlobRow]) -> Result<(), WriteError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM county_globs")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tracing::debug!(deleted = deleted, "cleared county_globs");

        for row in rows {
            let affected = sqlx::query("INSERT INTO county_globs (county_id, glob_id) VALUES ($1, $2)")
                .bind(row.region.get())
                .bind(row.glob_id.get())
                .execute(&mut *tx)
                .await?
                .rows_affected();
            // Dropping `tx` on error rolls the pass back.
            check_single_row(WriteStage::Baseline, BASELINE_COLUMN, row, affected)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_overlay(&self, column: &str, rows: &[GlobRow]) -> Result<(), WriteError> {
        if !is_plain_column(column) {
            return Err(WriteError::InvalidColumn(column.to_string()));
        }
        let statement = format!("UPDATE county_globs SET {column} = $2 WHERE county_id = $1");

        let mut tx = self.pool.begin().await?;
        for row in rows {
            let affected = sqlx::query(&statement)
                .bind(row.region.get())
                .bind(row.glob_id.get())
                .execute(&mut *tx)
                .await?
                .rows_affected();
            check_single_row(WriteStage::Overlay, column, row, affected)?;
        }

        tx.commit().await?;
        Ok(())
    }
}
