//! Fixed-window rate-limit counters.
//!
//! Each counter row holds the hits of one (client, rule) key in its current
//! window. Acquisition is a single UPSERT so that concurrent callers, even
//! from different processes sharing the database file, never admit more than
//! the limit.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Count one hit against `key` if it stays within `limit`
    ///
    /// A row from an older window is reset to this window with one hit.
    /// Returns false, without changing anything, when the window is full.
    pub async fn try_acquire_counter(
        &self,
        key: &str,
        limit: u32,
        window_start: i64,
        window_end: i64,
    ) -> Result<bool> {
        // The DO UPDATE ... WHERE clause filters the conflict update; when it
        // is false no row is touched and RETURNING yields nothing.
        let hits: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO rate_limit_counters (counter_key, window_start, window_end, hits)
            VALUES (?1, ?2, ?3, 1)
            ON CONFLICT(counter_key) DO UPDATE SET
                hits = CASE WHEN window_start < excluded.window_start THEN 1 ELSE hits + 1 END,
                window_end = CASE WHEN window_start < excluded.window_start
                    THEN excluded.window_end ELSE window_end END,
                window_start = MAX(window_start, excluded.window_start)
            WHERE window_start < excluded.window_start OR hits < ?4
            RETURNING hits
            "#,
        )
        .bind(key)
        .bind(window_start)
        .bind(window_end)
        .bind(i64::from(limit))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to acquire rate-limit counter: {}",
                e
            )))
        })?;

        Ok(hits.is_some())
    }

    /// Undo one hit previously counted in the given window
    pub async fn release_counter(&self, key: &str, window_start: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE rate_limit_counters SET hits = hits - 1
            WHERE counter_key = ? AND window_start = ? AND hits > 0
            "#,
        )
        .bind(key)
        .bind(window_start)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to release rate-limit counter: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Current hits of a counter in the given window (0 if absent or stale)
    pub async fn counter_hits(&self, key: &str, window_start: i64) -> Result<u32> {
        let hits: Option<i64> = sqlx::query_scalar(
            "SELECT hits FROM rate_limit_counters WHERE counter_key = ? AND window_start = ?",
        )
        .bind(key)
        .bind(window_start)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to read rate-limit counter: {}",
                e
            )))
        })?;

        Ok(hits.unwrap_or(0) as u32)
    }

    /// Delete counters whose window ended at or before `now`
    pub async fn prune_counters(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE window_end <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to prune rate-limit counters: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected())
    }
}
