//! Configuration types for nara-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Main configuration for [`CatalogDownloader`](crate::CatalogDownloader)
///
/// Every field has a default, so an empty JSON object deserializes into a
/// working configuration that talks to catalog.archives.gov.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Where job files and the metadata database live
    #[serde(default)]
    pub storage: StorageConfig,

    /// Job and batch limits, pacing, retries and document composition
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Upstream catalog endpoints and HTTP client settings
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Time-based reclamation of finished work
    #[serde(default)]
    pub reclaim: ReclaimConfig,

    /// API and external server integration
    #[serde(default)]
    pub server: ServerIntegrationConfig,
}

impl Config {
    /// Data directory holding per-job and per-batch files
    pub fn data_dir(&self) -> &PathBuf {
        &self.storage.data_dir
    }

    /// Reject settings that would make the service unusable
    ///
    /// Catches zero page ceilings, empty catalog hosts and quota rules that
    /// could never admit anything (zero limit) or never expire (zero window).
    pub fn validate(&self) -> Result<()> {
        if self.jobs.max_pages_per_request == 0 {
            return Err(config_error(
                "max_pages_per_request must be at least 1",
                "jobs.max_pages_per_request",
            ));
        }
        if self.jobs.max_ranges_per_batch == 0 {
            return Err(config_error(
                "max_ranges_per_batch must be at least 1",
                "jobs.max_ranges_per_batch",
            ));
        }
        if self.jobs.retry.max_attempts == 0 {
            return Err(config_error(
                "retry.max_attempts must be at least 1",
                "jobs.retry.max_attempts",
            ));
        }
        if self.jobs.heartbeat_timeout.as_secs() == 0 {
            return Err(config_error(
                "heartbeat_timeout must be at least 1 second",
                "jobs.heartbeat_timeout",
            ));
        }
        if self.catalog.allowed_host.trim().is_empty() {
            return Err(config_error(
                "allowed_host must not be empty",
                "catalog.allowed_host",
            ));
        }
        if self.reclaim.enabled && self.reclaim.interval.is_zero() {
            return Err(config_error(
                "reclaim interval must be non-zero when reclamation is enabled",
                "reclaim.interval",
            ));
        }

        let limits = &self.server.api.rate_limit;
        for (class, rules) in [
            ("create_job", &limits.create_job),
            ("create_batch", &limits.create_batch),
            ("status", &limits.status),
            ("download", &limits.download),
            ("global", &limits.global),
        ] {
            for rule in rules {
                if rule.limit == 0 || rule.window.is_zero() {
                    return Err(config_error(
                        format!("quota rule {rule} must have a non-zero limit and window"),
                        format!("server.api.rate_limit.{class}"),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: impl Into<String>) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.into()),
    }
}

/// Storage locations
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct StorageConfig {
    /// Root directory for job images and artifacts (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// SQLite database path (default: "./nara-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_path: default_database_path(),
        }
    }
}

/// Job execution settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsConfig {
    /// Maximum pages per creation request, summed across batch ranges (default: 800)
    #[serde(default = "default_max_pages")]
    pub max_pages_per_request: u32,

    /// Maximum ranges in one batch (default: 10)
    #[serde(default = "default_max_ranges")]
    pub max_ranges_per_batch: usize,

    /// Delay between page fetches within one job, in milliseconds (default: 100)
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,

    /// Retry policy for transient fetch failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Produce per-job and combined PDF documents (default: true)
    #[serde(default = "default_true")]
    pub compose_documents: bool,

    /// How long an unfinished job may go without a heartbeat before any
    /// instance sharing the database treats it as orphaned (default: 60 seconds)
    ///
    /// Running instances refresh their jobs' heartbeats four times per period.
    #[serde(default = "default_heartbeat_timeout", with = "duration_serde")]
    pub heartbeat_timeout: Duration,
}

impl JobsConfig {
    /// Interval at which a running instance refreshes its jobs' heartbeats
    pub fn heartbeat_interval(&self) -> Duration {
        (self.heartbeat_timeout / 4).max(Duration::from_millis(250))
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_pages_per_request: default_max_pages(),
            max_ranges_per_batch: default_max_ranges(),
            page_delay_ms: default_page_delay_ms(),
            retry: RetryConfig::default(),
            compose_documents: true,
            heartbeat_timeout: default_heartbeat_timeout(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Upstream catalog settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CatalogConfig {
    /// Base URL of the catalog API (default: "https://catalog.archives.gov")
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,

    /// Host that submitted catalog URLs must point at (default: "catalog.archives.gov")
    #[serde(default = "default_allowed_host")]
    pub allowed_host: String,

    /// User-Agent sent with every upstream request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for record lookups (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Timeout for a single page image download (default: 120 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            allowed_host: default_allowed_host(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            download_timeout: default_download_timeout(),
        }
    }
}

/// Reclamation of finished jobs and batches
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReclaimConfig {
    /// Run the periodic sweep (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Age after which finished work is deleted (default: 24 hours)
    #[serde(default = "default_reclaim_ttl", with = "duration_serde")]
    pub ttl: Duration,

    /// How often the sweep runs (default: 1 hour)
    #[serde(default = "default_reclaim_interval", with = "duration_serde")]
    pub interval: Duration,

    /// Minimum age before a job that never finished may be reclaimed (default: 72 hours)
    #[serde(default = "default_stale_after", with = "duration_serde")]
    pub stale_after: Duration,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: default_reclaim_ttl(),
            interval: default_reclaim_interval(),
            stale_after: default_stale_after(),
        }
    }
}

/// API and external server integration configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ServerIntegrationConfig {
    /// REST API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:5001)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Where rate-limit counters are kept
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBackend {
    /// In-process counters, private to this instance
    #[default]
    Memory,
    /// Counters in the metadata database, shared by every instance using it
    Database,
}

/// A quota: at most `limit` requests per `window`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuotaRule {
    /// Permitted requests per window
    pub limit: u32,

    /// Window length in seconds
    #[serde(with = "duration_serde")]
    #[schema(value_type = u64)]
    pub window: Duration,
}

impl QuotaRule {
    /// `limit` requests per minute
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(60),
        }
    }

    /// `limit` requests per hour
    pub fn per_hour(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(3600),
        }
    }

    /// `limit` requests per day
    pub fn per_day(limit: u32) -> Self {
        Self {
            limit,
            window: Duration::from_secs(86_400),
        }
    }
}

impl std::fmt::Display for QuotaRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}s", self.limit, self.window.as_secs())
    }
}

/// Rate limiting configuration
///
/// Each operation class carries its own list of quota rules; a request must
/// satisfy every rule of its class. Requests that match no class fall back
/// to `global`. The health endpoint is never limited.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RateLimitConfig {
    /// Enable rate limiting (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Counter store (default: memory)
    #[serde(default)]
    pub backend: RateLimitBackend,

    /// Identify clients by the first X-Forwarded-For hop (default: false)
    #[serde(default)]
    pub trust_forwarded_for: bool,

    /// IPs exempt from rate limiting
    #[serde(default)]
    pub exempt_ips: Vec<std::net::IpAddr>,

    /// Job creation quotas (default: 5 per hour)
    #[serde(default = "default_create_job_rules")]
    pub create_job: Vec<QuotaRule>,

    /// Batch creation quotas (default: 3 per hour)
    #[serde(default = "default_create_batch_rules")]
    pub create_batch: Vec<QuotaRule>,

    /// Status polling quotas (default: 120 per minute)
    #[serde(default = "default_status_rules")]
    pub status: Vec<QuotaRule>,

    /// Artifact download quotas (default: 30 per hour)
    #[serde(default = "default_download_rules")]
    pub download: Vec<QuotaRule>,

    /// Fallback quotas for everything else (default: 200 per day, 50 per hour)
    #[serde(default = "default_global_rules")]
    pub global: Vec<QuotaRule>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RateLimitBackend::Memory,
            trust_forwarded_for: false,
            exempt_ips: Vec::new(),
            create_job: default_create_job_rules(),
            create_batch: default_create_batch_rules(),
            status: default_status_rules(),
            download: default_download_rules(),
            global: default_global_rules(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./nara-dl.db")
}

fn default_true() -> bool {
    true
}

fn default_max_pages() -> u32 {
    800
}

fn default_max_ranges() -> usize {
    10
}

fn default_page_delay_ms() -> u64 {
    100
}

fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_catalog_base_url() -> String {
    "https://catalog.archives.gov".to_string()
}

fn default_allowed_host() -> String {
    "catalog.archives.gov".to_string()
}

fn default_user_agent() -> String {
    format!("Mozilla/5.0 (compatible; nara-dl/{})", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_reclaim_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_reclaim_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(72 * 3600)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5001))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_create_job_rules() -> Vec<QuotaRule> {
    vec![QuotaRule::per_hour(5)]
}

fn default_create_batch_rules() -> Vec<QuotaRule> {
    vec![QuotaRule::per_hour(3)]
}

fn default_status_rules() -> Vec<QuotaRule> {
    vec![QuotaRule::per_minute(120)]
}

fn default_download_rules() -> Vec<QuotaRule> {
    vec![QuotaRule::per_hour(30)]
}

fn default_global_rules() -> Vec<QuotaRule> {
    vec![QuotaRule::per_day(200), QuotaRule::per_hour(50)]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
