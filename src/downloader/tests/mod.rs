use super::test_helpers::{
    CATALOG, MockFetcher, WAIT, create_test_downloader, downloader_with, page_jpeg, test_config,
};
use super::*;
use crate::error::JobError;
use crate::types::{ArtifactKind, BatchStatus, JobInfo, JobStatus};
use std::time::Duration;

mod batch_coordinator;
mod validation;
