//! Counter store shared through the metadata database

use super::{CounterStore, Window};
use crate::db::Database;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Counters in the `rate_limit_counters` table
///
/// Every service instance opened on the same database file sees the same
/// counters, so their quotas combine.
pub struct DatabaseCounterStore {
    db: Arc<Database>,
}

impl DatabaseCounterStore {
    /// Create a store over an open database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CounterStore for DatabaseCounterStore {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn try_acquire(&self, key: &str, limit: u32, window: Window) -> Result<bool> {
        if limit == 0 {
            return Ok(false);
        }
        self.db
            .try_acquire_counter(key, limit, window.start, window.end)
            .await
    }

    async fn release(&self, key: &str, window: Window) -> Result<()> {
        self.db.release_counter(key, window.start).await
    }
}
