//! Saved push context, so the next sync does not need every flag again.
//!
//! The file keeps the key names the desktop connector wrote, so an existing
//! `cache.appcache` stays readable. The remote URL is deliberately absent:
//! it is looked up from the directory's git configuration on every load.

use anyhow::{Context, Result};
use playcanvas_sync_core::context::PushContext;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CACHE_FILE: &str = "cache.appcache";
/// Overrides the platform data directory holding the cache file.
pub const DATA_DIR_ENV: &str = "PLAYCANVAS_SYNC_DATA_DIR";

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContext {
    #[serde(rename = "APIKeyToken", default)]
    pub token: String,
    #[serde(rename = "ProjectId", default)]
    pub project_id: String,
    #[serde(rename = "BranchID", default)]
    pub branch_id: String,
    #[serde(rename = "SceneIDs", default)]
    pub scene_ids: Vec<String>,
    #[serde(rename = "FileDirectory", default)]
    pub directory: PathBuf,
}

impl std::fmt::Debug for CachedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedContext")
            .field("token", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("branch_id", &self.branch_id)
            .field("scene_ids", &self.scene_ids)
            .field("directory", &self.directory)
            .finish()
    }
}

impl CachedContext {
    pub fn from_context(context: &PushContext) -> Self {
        Self {
            token: context.token.clone(),
            project_id: context.project_id.clone(),
            branch_id: context.branch_id.clone(),
            scene_ids: context.scenes.ids().map(<[String]>::to_vec).unwrap_or_default(),
            directory: context.directory.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
            && self.project_id.is_empty()
            && self.branch_id.is_empty()
            && self.scene_ids.iter().all(String::is_empty)
    }
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE),
        }
    }

    /// `$PLAYCANVAS_SYNC_DATA_DIR`, else the platform data directory.
    pub fn default_location() -> Result<Self> {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            if !dir.is_empty() {
                return Ok(Self::new(dir));
            }
        }
        let base = dirs::data_dir().context("Could not determine the application data directory")?;
        Ok(Self::new(base.join("playcanvas-sync")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the whole cache document.
    pub fn save(&self, context: &CachedContext) -> Result<()> {
        if context.is_empty() {
            warn!("Cache data is empty");
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(context)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache file {}", self.path.display()))?;
        info!(path = %self.path.display(), "Cache file written");
        Ok(())
    }

    /// `Ok(None)` when no cache has been saved yet.
    pub fn load(&self) -> Result<Option<CachedContext>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Cache file not found");
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read cache file {}", self.path.display())
                })
            }
        };
        let cached = serde_json::from_str(&content)
            .with_context(|| format!("Cache file {} is not valid", self.path.display()))?;
        Ok(Some(cached))
    }
}
