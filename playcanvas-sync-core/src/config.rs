use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_API_BASE_URL: &str = "https://playcanvas.com/api";
pub const DEFAULT_APP_NAME: &str = "Playroom";

/// Tunables for a sync run. Every field has a default so a partial YAML file
/// (or none at all) is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub api_base_url: String,
    /// Export job name, also the stem of the downloaded artifact (`<app_name>.zip`).
    pub app_name: String,
    pub poll_interval_ms: u64,
    /// Delay before a run rejected by validation reports completion.
    pub validation_grace_ms: u64,
    /// Where the artifact is downloaded before installation.
    pub work_dir: PathBuf,
    pub output_folder: String,
    pub scripts_folder: String,
    pub log_file: String,
    pub asset_page_limit: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            poll_interval_ms: 2000,
            validation_grace_ms: 500,
            work_dir: std::env::temp_dir(),
            output_folder: "PlayCanvasApp".to_string(),
            scripts_folder: "scripts".to_string(),
            log_file: "log.txt".to_string(),
            asset_page_limit: 1000,
        }
    }
}

impl SyncSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validation_grace(&self) -> Duration {
        Duration::from_millis(self.validation_grace_ms)
    }

    /// Fixed location of the downloaded export; overwritten by every run.
    pub fn artifact_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.zip", self.app_name))
    }

    pub fn trace_loaded(&self) {
        info!(
            api_base_url = %self.api_base_url,
            app_name = %self.app_name,
            poll_interval_ms = self.poll_interval_ms,
            work_dir = %self.work_dir.display(),
            "Loaded SyncSettings"
        );
        debug!(?self, "SyncSettings loaded (full debug)");
    }
}
