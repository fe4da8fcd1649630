//! In-process counter store

use super::{CounterStore, Window};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Map size above which expired counters are dropped on the next acquire
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Counter {
    window: Window,
    hits: u32,
}

/// Counters kept in a mutex-guarded map; private to this process
#[derive(Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, Counter>>,
}

impl MemoryCounterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn hits(&self, key: &str, window: Window) -> u32 {
        self.counters
            .lock()
            .await
            .get(key)
            .filter(|counter| counter.window == window)
            .map_or(0, |counter| counter.hits)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn try_acquire(&self, key: &str, limit: u32, window: Window) -> Result<bool> {
        let mut counters = self.counters.lock().await;

        if counters.len() > PRUNE_THRESHOLD {
            counters.retain(|_, counter| counter.window.end > window.start);
        }

        let counter = counters.entry(key.to_string()).or_insert(Counter { window, hits: 0 });
        if counter.window.start < window.start {
            *counter = Counter { window, hits: 0 };
        }

        if counter.hits < limit {
            counter.hits += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release(&self, key: &str, window: Window) -> Result<()> {
        let mut counters = self.counters.lock().await;
        if let Some(counter) = counters.get_mut(key) {
            if counter.window == window {
                counter.hits = counter.hits.saturating_sub(1);
            }
        }
        Ok(())
    }
}
