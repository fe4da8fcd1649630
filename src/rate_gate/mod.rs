//! Admission control in front of the request-serving operations
//!
//! Every request is classified into an [`OperationClass`]; each class has its
//! own list of fixed-window [`QuotaRule`]s, counted per client IP. A request
//! is admitted only if every rule of its class admits it. When one rule
//! denies, the hits already counted for that request are released again, so
//! a rejected request never changes any counter.
//!
//! Counters live behind the [`CounterStore`] trait. The in-process
//! [`MemoryCounterStore`] is private to one instance; the
//! [`DatabaseCounterStore`] keeps them in the metadata database so that
//! every instance sharing the database enforces one combined quota.

use crate::config::{QuotaRule, RateLimitBackend, RateLimitConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use async_trait::async_trait;
use axum::http::Method;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

mod database;
mod memory;

pub use database::DatabaseCounterStore;
pub use memory::MemoryCounterStore;

/// Request categories with independently configured quotas
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationClass {
    /// `POST /jobs`
    CreateJob,
    /// `POST /batches`
    CreateBatch,
    /// `GET /jobs/{id}` and `GET /batches/{id}`
    StatusRead,
    /// Any artifact download
    Download,
    /// Everything not classified above
    Global,
}

impl OperationClass {
    /// Classify a request; `None` for the quota-exempt health check
    pub fn classify(method: &Method, path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let class = match (method, segments.as_slice()) {
            (_, ["health"]) => return None,
            (&Method::POST, ["jobs"]) => OperationClass::CreateJob,
            (&Method::POST, ["batches"]) => OperationClass::CreateBatch,
            (&Method::GET, ["jobs" | "batches", _]) => OperationClass::StatusRead,
            (&Method::GET, ["jobs" | "batches", _, file]) if file.starts_with("download.") => {
                OperationClass::Download
            }
            _ => OperationClass::Global,
        };
        Some(class)
    }

    /// Name used in counter keys and rejection details
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::CreateJob => "create_job",
            OperationClass::CreateBatch => "create_batch",
            OperationClass::StatusRead => "status",
            OperationClass::Download => "download",
            OperationClass::Global => "global",
        }
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed counting window in unix seconds, `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    /// First second of the window
    pub start: i64,
    /// First second after the window
    pub end: i64,
}

impl Window {
    /// The window of length `length` that contains `now`
    pub fn containing(now: i64, length: Duration) -> Self {
        let length = i64::try_from(length.as_secs()).unwrap_or(i64::MAX).max(1);
        let start = now - now.rem_euclid(length);
        Self {
            start,
            end: start.saturating_add(length),
        }
    }

    /// Seconds from `now` until the window closes, at least 1
    pub fn retry_after(&self, now: i64) -> u64 {
        u64::try_from(self.end - now).unwrap_or(0).max(1)
    }
}

/// Storage for fixed-window hit counters
///
/// `try_acquire` must be atomic: concurrent callers for the same key may
/// never be admitted beyond `limit` within one window.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Count one hit for `key` in `window` if that keeps it within `limit`
    async fn try_acquire(&self, key: &str, limit: u32, window: Window) -> Result<bool>;

    /// Undo a hit counted by `try_acquire` in the same window
    async fn release(&self, key: &str, window: Window) -> Result<()>;
}

/// Per-client quota enforcement for every operation class
pub struct RateGate {
    config: RateLimitConfig,
    store: Arc<dyn CounterStore>,
}

impl RateGate {
    /// Create a gate over an explicit counter store
    pub fn new(config: RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    /// Create a gate with the counter store selected by `config.backend`
    pub fn from_config(config: RateLimitConfig, db: Arc<Database>) -> Self {
        let store: Arc<dyn CounterStore> = match config.backend {
            RateLimitBackend::Memory => Arc::new(MemoryCounterStore::new()),
            RateLimitBackend::Database => Arc::new(DatabaseCounterStore::new(db)),
        };
        tracing::info!(backend = store.name(), "Rate gate initialized");
        Self::new(config, store)
    }

    /// Resolve the client IP a request is counted against
    ///
    /// The first `X-Forwarded-For` hop is used only when configured to trust
    /// it and when it parses as an IP address.
    pub fn client_ip(&self, peer: IpAddr, forwarded_for: Option<&str>) -> IpAddr {
        if !self.config.trust_forwarded_for {
            return peer;
        }
        forwarded_for
            .and_then(|value| value.split(',').next())
            .and_then(|hop| hop.trim().parse().ok())
            .unwrap_or(peer)
    }

    fn rules(&self, class: OperationClass) -> &[QuotaRule] {
        match class {
            OperationClass::CreateJob => &self.config.create_job,
            OperationClass::CreateBatch => &self.config.create_batch,
            OperationClass::StatusRead => &self.config.status,
            OperationClass::Download => &self.config.download,
            OperationClass::Global => &self.config.global,
        }
    }

    /// Admit or reject one request now
    pub async fn check(&self, client: IpAddr, class: Option<OperationClass>) -> Result<()> {
        self.check_at(client, class, chrono::Utc::now().timestamp())
            .await
    }

    /// Admit or reject one request at the given unix time
    ///
    /// Returns [`Error::RateLimited`] with the longest wait among the rules
    /// that denied. Counter store failures admit the request.
    pub async fn check_at(
        &self,
        client: IpAddr,
        class: Option<OperationClass>,
        now: i64,
    ) -> Result<()> {
        let Some(class) = class else {
            return Ok(());
        };
        if !self.config.enabled || self.config.exempt_ips.contains(&client) {
            return Ok(());
        }

        let mut acquired = Vec::new();
        let mut denied: Option<(u64, String)> = None;

        for rule in self.rules(class) {
            let window = Window::containing(now, rule.window);
            let key = format!("{client}|{class}|{rule}");

            match self.store.try_acquire(&key, rule.limit, window).await {
                Ok(true) => acquired.push((key, window)),
                Ok(false) => {
                    let retry_after = window.retry_after(now);
                    if denied.as_ref().is_none_or(|(longest, _)| retry_after > *longest) {
                        denied = Some((retry_after, format!("{class}:{rule}")));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        store = self.store.name(),
                        key = %key,
                        error = %e,
                        "Rate-limit counter unavailable, admitting request"
                    );
                }
            }
        }

        let Some((retry_after_secs, rule)) = denied else {
            return Ok(());
        };

        for (key, window) in &acquired {
            if let Err(e) = self.store.release(key, *window).await {
                tracing::warn!(key = %key, error = %e, "Failed to release rate-limit counter");
            }
        }

        tracing::debug!(client = %client, rule = %rule, retry_after_secs, "Request rate limited");
        Err(Error::RateLimited {
            retry_after_secs,
            rule,
        })
    }
}
