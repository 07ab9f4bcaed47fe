use anyhow::{Context, Result};
use playcanvas_sync_core::config::SyncSettings;
use playcanvas_sync_core::context::{PushContext, SceneSelection};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::cache::CachedContext;

pub const TOKEN_ENV: &str = "PLAYCANVAS_TOKEN";
pub const PROJECT_ID_ENV: &str = "PLAYCANVAS_PROJECT_ID";
pub const BRANCH_ID_ENV: &str = "PLAYCANVAS_BRANCH_ID";
pub const SCENE_IDS_ENV: &str = "PLAYCANVAS_SCENE_IDS";
pub const GIT_FOLDER_ENV: &str = "GIT_FOLDER";
pub const GIT_REMOTE_URL_ENV: &str = "GIT_REMOTE_URL";

/// Loads the YAML settings file, or the defaults when no file is given.
/// Secrets never live in this file; they come from flags, env or the cache.
pub fn load_settings<P: AsRef<Path>>(path: Option<P>) -> Result<SyncSettings> {
    let Some(path) = path else {
        info!("No settings file given, using defaults");
        return Ok(SyncSettings::default());
    };
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading settings from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read settings file");
            return Err(e)
                .with_context(|| format!("Failed to read settings file {}", path_ref.display()));
        }
    };

    let settings: SyncSettings = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path_ref, "Failed to parse settings YAML");
        anyhow::anyhow!("Failed to parse settings YAML {}: {e}", path_ref.display())
    })?;

    Ok(settings)
}

/// Push context fields as gathered from one source. `None` means the source
/// did not provide the field, so a lower-priority source may fill it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextInput {
    pub token: Option<String>,
    pub project_id: Option<String>,
    pub branch_id: Option<String>,
    pub scenes: Option<String>,
    pub directory: Option<PathBuf>,
    pub remote_url: Option<String>,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ContextInput {
    pub fn from_env() -> Self {
        let input = Self {
            token: env_value(TOKEN_ENV),
            project_id: env_value(PROJECT_ID_ENV),
            branch_id: env_value(BRANCH_ID_ENV),
            scenes: env_value(SCENE_IDS_ENV),
            directory: env_value(GIT_FOLDER_ENV).map(PathBuf::from),
            remote_url: env_value(GIT_REMOTE_URL_ENV),
        };
        info!(
            token_set = input.token.is_some(),
            project_id = ?input.project_id,
            directory = ?input.directory,
            "Read push context from environment"
        );
        input
    }

    /// Fills every field `self` lacks from `fallback`.
    pub fn or(self, fallback: ContextInput) -> Self {
        Self {
            token: self.token.or(fallback.token),
            project_id: self.project_id.or(fallback.project_id),
            branch_id: self.branch_id.or(fallback.branch_id),
            scenes: self.scenes.or(fallback.scenes),
            directory: self.directory.or(fallback.directory),
            remote_url: self.remote_url.or(fallback.remote_url),
        }
    }

    /// Missing fields become empty; the pipeline's validation reports them.
    pub fn into_context(self) -> PushContext {
        PushContext {
            token: self.token.unwrap_or_default(),
            project_id: self.project_id.unwrap_or_default(),
            branch_id: self.branch_id.unwrap_or_default(),
            scenes: SceneSelection::parse(self.scenes.as_deref().unwrap_or_default()),
            directory: self.directory.unwrap_or_default(),
            remote_url: self.remote_url.unwrap_or_default(),
        }
    }
}

impl From<CachedContext> for ContextInput {
    fn from(cached: CachedContext) -> Self {
        let non_empty = |s: String| Some(s).filter(|s| !s.is_empty());
        Self {
            token: non_empty(cached.token),
            project_id: non_empty(cached.project_id),
            branch_id: non_empty(cached.branch_id),
            scenes: non_empty(cached.scene_ids.join(",")),
            directory: Some(cached.directory).filter(|d| !d.as_os_str().is_empty()),
            remote_url: None,
        }
    }
}
