//! reqwest-backed client for the PlayCanvas REST API.
//!
//! Implements [`ExportApi`] and [`AssetApi`]. Each call is a single request;
//! nothing here retries or loops. Responses are decoded into typed schemas and
//! a body that does not fit is reported as [`SyncError::Protocol`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::SyncSettings;
use crate::context::PushContext;
use crate::contract::{Asset, AssetApi, ExportApi, JobSnapshot, JobStatus};
use crate::error::{SyncError, SyncResult};

#[derive(Serialize)]
struct ExportRequest<'a> {
    project_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenes: Option<&'a [String]>,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct ExportJobResponse {
    id: u64,
}

#[derive(Deserialize)]
struct JobResponse {
    status: String,
    #[serde(default)]
    data: Option<JobData>,
}

#[derive(Deserialize)]
struct JobData {
    #[serde(default)]
    download_url: Option<String>,
}

#[derive(Deserialize)]
struct AssetListResponse {
    result: Vec<AssetRecord>,
}

#[derive(Deserialize)]
struct AssetRecord {
    id: u64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    file: Option<AssetFileRecord>,
}

#[derive(Deserialize)]
struct AssetFileRecord {
    filename: String,
}

pub struct PlayCanvasClient {
    http: reqwest::Client,
    base_url: String,
    app_name: String,
    artifact_path: PathBuf,
    page_limit: u32,
}

impl PlayCanvasClient {
    pub fn new(settings: &SyncSettings) -> Self {
        Self::with_http_client(settings, reqwest::Client::new())
    }

    pub fn with_http_client(settings: &SyncSettings, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            app_name: settings.app_name.clone(),
            artifact_path: settings.artifact_path(),
            page_limit: settings.asset_page_limit,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/assets/{id}/file/{filename}` with the filename encoded as one path segment.
    fn asset_file_url(&self, asset_id: u64, filename: &str) -> SyncResult<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.url(&format!("/assets/{asset_id}/file")))
            .map_err(|e| SyncError::Protocol(format!("invalid API base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SyncError::Protocol(format!("API base url cannot take a path: {}", self.base_url)))?
            .push(filename);
        Ok(url)
    }
}

/// Passes a success response through; otherwise captures the body for diagnostics.
async fn ensure_success(resp: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
    error!(status = %status, url = %url, "PlayCanvas API returned error. Response body: {body}");
    Err(SyncError::Remote {
        status: status.as_u16(),
        body,
    })
}

fn decode<T: DeserializeOwned>(body: &str, what: &str) -> SyncResult<T> {
    serde_json::from_str(body).map_err(|e| {
        error!(error = %e, what, "Unexpected response schema");
        SyncError::Protocol(format!("{what}: {e}"))
    })
}

#[async_trait]
impl ExportApi for PlayCanvasClient {
    async fn start_export_job(&self, context: &PushContext) -> SyncResult<u64> {
        let request = ExportRequest {
            project_id: &context.project_id,
            scenes: context.scenes.ids(),
            name: &self.app_name,
            branch_id: context.branch(),
        };
        let url = self.url("/apps/download");
        info!(url = %url, project_id = %context.project_id, "Starting export job");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&context.token)
            .json(&request)
            .send()
            .await?;
        let body = ensure_success(resp).await?.text().await?;
        debug!(body = %body, "Export job created");

        let job: ExportJobResponse = decode(&body, "export job response")?;
        info!(job_id = job.id, "Export job accepted");
        Ok(job.id)
    }

    async fn poll_job_status(&self, job_id: u64, context: &PushContext) -> SyncResult<JobSnapshot> {
        let url = self.url(&format!("/jobs/{job_id}"));
        let resp = self.http.get(&url).bearer_auth(&context.token).send().await?;
        let body = ensure_success(resp).await?.text().await?;

        let job: JobResponse = decode(&body, "job status response")?;
        let download_url = job.data.and_then(|d| d.download_url);
        if download_url.is_none() {
            debug!(job_id, "Download URL not available yet");
        }
        debug!(job_id, status = %job.status, "Polled export job");
        Ok(JobSnapshot {
            status: JobStatus::from(job.status.as_str()),
            download_url,
        })
    }

    async fn download_artifact(&self, url: &str) -> SyncResult<PathBuf> {
        info!(url = %url, path = %self.artifact_path.display(), "Downloading export artifact");
        let mut resp = ensure_success(self.http.get(url).send().await?).await?;

        if let Some(parent) = self.artifact_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&self.artifact_path).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        info!(bytes = written, path = %self.artifact_path.display(), "Artifact downloaded");
        Ok(self.artifact_path.clone())
    }
}

#[async_trait]
impl AssetApi for PlayCanvasClient {
    async fn list_assets(&self, context: &PushContext) -> SyncResult<Vec<Asset>> {
        let url = self.url(&format!("/projects/{}/assets", context.project_id));
        let limit = self.page_limit.to_string();
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&context.token)
            .query(&[("branchId", context.branch_id.as_str()), ("limit", limit.as_str())])
            .send()
            .await?;
        let body = ensure_success(resp).await?.text().await?;

        let listing: AssetListResponse = decode(&body, "asset listing")?;
        info!(count = listing.result.len(), "Listed project assets");
        Ok(listing
            .result
            .into_iter()
            .map(|record| Asset {
                id: record.id,
                kind: record.kind,
                filename: record.file.map(|f| f.filename),
            })
            .collect())
    }

    async fn fetch_asset_file(
        &self,
        asset_id: u64,
        filename: &str,
        context: &PushContext,
    ) -> SyncResult<Vec<u8>> {
        let url = self.asset_file_url(asset_id, filename)?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(&context.token)
            .query(&[("branchId", context.branch_id.as_str())])
            .send()
            .await?;
        let bytes = ensure_success(resp).await?.bytes().await?;
        debug!(asset_id, filename, size = bytes.len(), "Fetched asset file");
        Ok(bytes.to_vec())
    }
}
