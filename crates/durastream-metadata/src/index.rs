//! SQLite-backed descriptor index.
//!
//! One row per live stream. Writers serialize per path in the storage layer,
//! so the index only needs atomic single-row writes, which SQLite gives us
//! for free. Readers may hit the pool concurrently.

use std::path::Path;

use chrono::DateTime;
use durastream_core::Offset;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::Result;
use crate::types::StreamDescriptor;

/// Persistent mapping `path -> StreamDescriptor`.
pub struct MetaIndex {
    pool: SqlitePool,
}

impl MetaIndex {
    /// Open (or create) the index database at `path` and apply migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Insert or fully replace the descriptor for `desc.path`.
    pub async fn put(&self, desc: &StreamDescriptor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO streams
                (path, dir_name, content_type, read_seq, byte_offset,
                 last_seq, ttl_seconds, expires_at_ms, created_at_ms)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&desc.path)
        .bind(&desc.dir_name)
        .bind(&desc.content_type)
        .bind(desc.offset.read_seq as i64)
        .bind(desc.offset.byte_offset as i64)
        .bind(&desc.last_seq)
        .bind(desc.ttl_seconds.map(|t| t as i64))
        .bind(desc.expires_at.map(|at| at.timestamp_millis()))
        .bind(desc.created_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, path: &str) -> Result<Option<StreamDescriptor>> {
        let row = sqlx::query("SELECT * FROM streams WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| descriptor_from_row(&r)))
    }

    /// Remove the entry for `path`. Returns whether a row was removed.
    pub async fn delete(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM streams WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self) -> Result<Vec<StreamDescriptor>> {
        let rows = sqlx::query("SELECT * FROM streams ORDER BY path")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(descriptor_from_row).collect())
    }

    /// Commit an append: advance the offset and, when the writer supplied a
    /// sequence, record it. One UPDATE, so the commit is atomic per key.
    pub async fn update_offset(
        &self,
        path: &str,
        offset: Offset,
        last_seq: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE streams
            SET read_seq = ?, byte_offset = ?, last_seq = COALESCE(?, last_seq)
            WHERE path = ?
            "#,
        )
        .bind(offset.read_seq as i64)
        .bind(offset.byte_offset as i64)
        .bind(last_seq)
        .bind(path)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn descriptor_from_row(row: &SqliteRow) -> StreamDescriptor {
    let read_seq: i64 = row.get("read_seq");
    let byte_offset: i64 = row.get("byte_offset");
    let ttl_seconds: Option<i64> = row.get("ttl_seconds");
    let expires_at_ms: Option<i64> = row.get("expires_at_ms");

    StreamDescriptor {
        path: row.get("path"),
        dir_name: row.get("dir_name"),
        content_type: row.get("content_type"),
        offset: Offset::new(read_seq as u64, byte_offset as u64),
        last_seq: row.get("last_seq"),
        ttl_seconds: ttl_seconds.map(|t| t as u64),
        expires_at: expires_at_ms.and_then(DateTime::from_timestamp_millis),
        created_at_ms: row.get("created_at_ms"),
    }
}
