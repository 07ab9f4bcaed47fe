//! # contract: collaborator seams of the sync pipeline
//!
//! The orchestrator never talks to the network or to git directly. It drives
//! three traits:
//!
//! - [`ExportApi`]: start an export job, poll it, download the finished artifact.
//! - [`AssetApi`]: list project assets and fetch a single asset file.
//! - [`Pusher`]: hand a local directory to version control.
//!
//! [`crate::client::PlayCanvasClient`] implements the first two against the
//! PlayCanvas REST API; the CLI crate provides a git-backed [`Pusher`].
//!
//! ## Mocking & Testing
//! All traits are annotated for `mockall`, so tests can script server
//! behaviour (e.g. "running" N times then "complete") without a network.

use async_trait::async_trait;
use mockall::automock;
use std::path::{Path, PathBuf};

use crate::context::PushContext;
use crate::error::SyncResult;

/// Status reported by the export job endpoint. Unknown values are kept
/// verbatim and treated as "still running".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Complete,
    Error,
    Other(String),
}

impl From<&str> for JobStatus {
    fn from(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "complete" => JobStatus::Complete,
            "error" => JobStatus::Error,
            other => JobStatus::Other(other.to_string()),
        }
    }
}

/// One fresh read of the remote job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Present only once the job has completed.
    pub download_url: Option<String>,
}

/// A project file record from the asset listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub id: u64,
    pub kind: String,
    /// Folders and some generated assets carry no file.
    pub filename: Option<String>,
}

impl Asset {
    pub fn is_script(&self) -> bool {
        self.kind == "script"
    }
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ExportApi: Send + Sync {
    /// Creates an export job and returns its id.
    async fn start_export_job(&self, context: &PushContext) -> SyncResult<u64>;

    /// Reads the job once. Looping is the caller's business.
    async fn poll_job_status(&self, job_id: u64, context: &PushContext) -> SyncResult<JobSnapshot>;

    /// Downloads the artifact to its fixed local path, replacing any previous
    /// download, and returns that path.
    async fn download_artifact(&self, url: &str) -> SyncResult<PathBuf>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AssetApi: Send + Sync {
    async fn list_assets(&self, context: &PushContext) -> SyncResult<Vec<Asset>>;

    /// Fetches the body of a single asset file.
    async fn fetch_asset_file(
        &self,
        asset_id: u64,
        filename: &str,
        context: &PushContext,
    ) -> SyncResult<Vec<u8>>;
}

/// Version control hand-off. The error string is shown to the user as-is.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Pusher: Send + Sync {
    async fn push(&self, directory: &Path) -> Result<(), String>;
}
