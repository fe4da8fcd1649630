//! Core types for nara-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        #[schema(value_type = String, format = Uuid)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// First eight characters, used for download file names
            pub fn short(&self) -> String {
                self.0.simple().to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a job (random v4 UUID)
    JobId
);

uuid_id!(
    /// Unique identifier for a batch (random v4 UUID)
    BatchId
);

/// Job status
///
/// `Completed` and `Failed` are terminal and never left.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created, background execution not yet started
    Queued,
    /// Fetching pages or producing artifacts
    Running,
    /// Finished; artifacts produced if any page was downloaded
    Completed,
    /// Stopped by a fatal catalog error or an interrupted run
    Failed,
}

impl JobStatus {
    /// Convert integer status code to JobStatus
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => JobStatus::Queued,
            1 => JobStatus::Running,
            2 => JobStatus::Completed,
            3 => JobStatus::Failed,
            _ => JobStatus::Failed, // Default to Failed for unknown status
        }
    }

    /// Convert JobStatus to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Completed => 2,
            JobStatus::Failed => 3,
        }
    }

    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Batch status, derived from the statuses of the batch's jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// At least one job is still queued or running
    Running,
    /// Every job completed
    Completed,
    /// Every job is terminal and at least one failed
    CompletedWithErrors,
}

impl BatchStatus {
    /// Aggregate job statuses into a batch status
    ///
    /// An empty batch cannot be created, but aggregates to `Completed`.
    pub fn from_jobs<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = JobStatus>,
    {
        let mut any_failed = false;
        for status in statuses {
            match status {
                JobStatus::Queued | JobStatus::Running => return BatchStatus::Running,
                JobStatus::Failed => any_failed = true,
                JobStatus::Completed => {}
            }
        }
        if any_failed {
            BatchStatus::CompletedWithErrors
        } else {
            BatchStatus::Completed
        }
    }

    /// Whether every job of the batch has finished
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchStatus::Running)
    }
}

/// Inclusive page interval
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageRange {
    /// First page (1-based)
    pub start_page: u32,
    /// Last page, inclusive
    pub end_page: u32,
}

impl PageRange {
    /// Create a range without validating it
    pub fn new(start_page: u32, end_page: u32) -> Self {
        Self {
            start_page,
            end_page,
        }
    }

    /// Number of pages covered, zero for an inverted range
    pub fn page_count(&self) -> u32 {
        if self.end_page < self.start_page {
            0
        } else {
            self.end_page - self.start_page + 1
        }
    }

    /// Iterate pages in ascending order
    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.start_page..=self.end_page
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start_page, self.end_page)
    }
}

/// Downloadable outputs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Per-job ZIP of the downloaded images
    Archive,
    /// Per-job PDF of the downloaded images
    Document,
    /// Batch PDF spanning every range in request order
    CombinedDocument,
}

impl ArtifactKind {
    /// File extension used for the stored file and the download name
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Archive => "zip",
            ArtifactKind::Document | ArtifactKind::CombinedDocument => "pdf",
        }
    }

    /// MIME type served with the artifact
    pub fn content_type(&self) -> &'static str {
        match self {
            ArtifactKind::Archive => "application/zip",
            ArtifactKind::Document | ArtifactKind::CombinedDocument => "application/pdf",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArtifactKind::Archive => "ZIP archive",
            ArtifactKind::Document => "PDF document",
            ArtifactKind::CombinedDocument => "combined PDF document",
        };
        f.write_str(name)
    }
}

/// Outcome counters recorded when a job finishes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct JobResult {
    /// Pages the catalog record actually has
    pub total_available: u32,
    /// Pages fetched and stored by this job
    pub downloaded: u32,
    /// Pages already present, missing upstream, or failed
    pub skipped: u32,
    /// Per-page error descriptions, in page order
    pub errors: Vec<String>,
}

/// Snapshot of a job's record
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    /// Unique job identifier
    pub id: JobId,

    /// Catalog identifier as submitted (record URL)
    pub catalog_id: String,

    /// First requested page
    pub start_page: u32,

    /// Last requested page, inclusive
    pub end_page: u32,

    /// Current status
    pub status: JobStatus,

    /// Pages processed so far (downloaded or skipped)
    pub pages_done: u32,

    /// Pages requested, `end_page - start_page + 1`
    pub pages_total: u32,

    /// Latest human-readable progress line
    pub message: String,

    /// Outcome counters, set once the job completes
    pub result: Option<JobResult>,

    /// Failure cause, set when the job fails
    pub error: Option<String>,

    /// Whether the ZIP archive can be downloaded
    #[serde(rename = "zip_available")]
    pub archive_available: bool,

    /// Whether the per-job PDF can be downloaded
    #[serde(rename = "pdf_available")]
    pub document_available: bool,

    /// Owning batch, when created as part of one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,

    /// Zero-based position of this job's range within its batch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<u32>,

    /// When the job was created
    pub created_at: DateTime<Utc>,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When the job reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobInfo {
    /// The requested range
    pub fn range(&self) -> PageRange {
        PageRange::new(self.start_page, self.end_page)
    }
}

/// Snapshot of a batch and its jobs
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchInfo {
    /// Unique batch identifier
    pub id: BatchId,

    /// Catalog identifier shared by every job
    pub catalog_id: String,

    /// Status aggregated from the jobs
    pub status: BatchStatus,

    /// Jobs in range order
    pub jobs: Vec<JobInfo>,

    /// Whether the combined PDF can be downloaded
    #[serde(rename = "combined_pdf_available")]
    pub combined_document_available: bool,

    /// When the batch was created
    pub created_at: DateTime<Utc>,

    /// When the last job of the batch finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl BatchInfo {
    /// Job identifiers in range order
    pub fn job_ids(&self) -> Vec<JobId> {
        self.jobs.iter().map(|job| job.id).collect()
    }
}

/// Request body for creating a single job
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    /// Catalog record URL, e.g. `https://catalog.archives.gov/id/12345`
    pub catalog_url: String,

    /// First page (default: 1)
    #[serde(default = "default_start_page")]
    pub start_page: u32,

    /// Last page, inclusive (default: 100)
    #[serde(default = "default_end_page")]
    pub end_page: u32,
}

/// Request body for creating a batch
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateBatchRequest {
    /// Catalog record URL shared by every range
    pub catalog_url: String,

    /// Ranges in reading order
    pub ranges: Vec<PageRange>,
}

fn default_start_page() -> u32 {
    1
}

fn default_end_page() -> u32 {
    100
}

/// Returned when a job has been created
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobCreated {
    /// New job identifier
    pub job_id: JobId,

    /// Where to poll the job's status
    pub status_url: String,
}

impl JobCreated {
    /// Build the response for a job
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            status_url: format!("/jobs/{job_id}"),
        }
    }
}

/// One job of a newly created batch
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchJobCreated {
    /// Job identifier
    pub job_id: JobId,

    /// Where to poll the job's status
    pub status_url: String,

    /// Zero-based range position
    pub range_index: u32,
}

/// Returned when a batch has been created
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchCreated {
    /// New batch identifier
    pub batch_id: BatchId,

    /// Where to poll the batch's status
    pub status_url: String,

    /// One entry per range, in range order
    pub jobs: Vec<BatchJobCreated>,
}

impl BatchCreated {
    /// Build the response for a batch and its jobs in range order
    pub fn new(batch_id: BatchId, job_ids: &[JobId]) -> Self {
        Self {
            batch_id,
            status_url: format!("/batches/{batch_id}"),
            jobs: job_ids
                .iter()
                .enumerate()
                .map(|(index, job_id)| BatchJobCreated {
                    job_id: *job_id,
                    status_url: format!("/jobs/{job_id}"),
                    range_index: index as u32,
                })
                .collect(),
        }
    }
}

/// Bytes of a produced artifact, ready to serve
#[derive(Clone, Debug)]
pub struct Artifact {
    /// Which artifact this is
    pub kind: ArtifactKind,
    /// Suggested download file name
    pub filename: String,
    /// File contents
    pub bytes: Vec<u8>,
}

/// Limits and optional features of this instance
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Capabilities {
    /// Maximum pages per request, summed across batch ranges
    pub max_pages_per_request: u32,

    /// Maximum ranges per batch
    pub max_ranges_per_batch: usize,

    /// Whether PDF documents are produced
    pub documents: bool,

    /// Name of the page fetcher in use
    pub fetcher: String,
}
