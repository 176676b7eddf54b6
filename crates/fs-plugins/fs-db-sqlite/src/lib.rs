//! # fs-db-sqlite Implementation
//!
//! This crate implements the data mapping between the SQLite relational model
//! and the `fs-core` domain models. One `SqliteStore` serves both the listing
//! and the claim ports so that decisions can span both tables in a single
//! transaction.

mod claims;
mod listings;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs_core::error::{AppError, Result};
use fs_core::{Claim, GeoPoint, Listing};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn new(url: &str) -> Result<Self> {
        Self::connect(url, 5).await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_error)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // Every connection to `:memory:` is its own database, so in-memory
        // stores are pinned to one long-lived connection.
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections)
        };
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(db_error)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Internal(format!("migration failed: {e}")))?;

        info!(url, in_memory, "sqlite store ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Helpers for UUID and timestamp conversion
fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

fn blob_to_uuid(blob: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(blob).map_err(|e| AppError::Internal(format!("corrupt uuid column: {e}")))
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::Internal(format!("timestamp {ms} out of range")))
}

/// Drops sub-millisecond precision so values round-trip through storage.
fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(to_millis(ts)).unwrap_or(ts)
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::Internal(format!("database error: {e}"))
}

fn listing_from_row(row: &SqliteRow) -> Result<Listing> {
    Ok(Listing {
        id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id").map_err(db_error)?)?,
        owner: blob_to_uuid(&row.try_get::<Vec<u8>, _>("owner").map_err(db_error)?)?,
        name: row.try_get("name").map_err(db_error)?,
        description: row.try_get("description").map_err(db_error)?,
        quantity: row.try_get("quantity").map_err(db_error)?,
        image_ref: row.try_get("image_ref").map_err(db_error)?,
        expires_at: from_millis(row.try_get("expires_at").map_err(db_error)?)?,
        location: GeoPoint::new(
            row.try_get("longitude").map_err(db_error)?,
            row.try_get("latitude").map_err(db_error)?,
        ),
        status: row.try_get::<String, _>("status").map_err(db_error)?.parse()?,
        created_at: from_millis(row.try_get("created_at").map_err(db_error)?)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(db_error)?)?,
    })
}

fn claim_from_row(row: &SqliteRow) -> Result<Claim> {
    Ok(Claim {
        id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("id").map_err(db_error)?)?,
        listing_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("listing_id").map_err(db_error)?)?,
        receiver_id: blob_to_uuid(&row.try_get::<Vec<u8>, _>("receiver_id").map_err(db_error)?)?,
        status: row.try_get::<String, _>("status").map_err(db_error)?.parse()?,
        claimed_at: from_millis(row.try_get("claimed_at").map_err(db_error)?)?,
        updated_at: from_millis(row.try_get("updated_at").map_err(db_error)?)?,
    })
}
