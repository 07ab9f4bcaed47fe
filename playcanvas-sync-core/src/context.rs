//! The input bundle for one sync request and its completeness check.

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which scenes the export should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSelection {
    /// Let the platform export every scene of the project.
    All,
    Only(Vec<String>),
}

impl SceneSelection {
    /// Parses user input like `"123, 456"`. Empty input selects all scenes;
    /// blank entries are kept so that validation can reject them.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return SceneSelection::All;
        }
        SceneSelection::Only(raw.split(',').map(|s| s.trim().to_string()).collect())
    }

    /// Scene ids to put in the export request; `None` means "all".
    pub fn ids(&self) -> Option<&[String]> {
        match self {
            SceneSelection::All => None,
            SceneSelection::Only(ids) => Some(ids),
        }
    }

    fn is_valid(&self) -> bool {
        match self {
            SceneSelection::All => true,
            SceneSelection::Only(ids) => ids.iter().any(|id| !id.is_empty()),
        }
    }
}

impl fmt::Display for SceneSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SceneSelection::All => f.write_str("all"),
            SceneSelection::Only(ids) => f.write_str(&ids.join(",")),
        }
    }
}

/// Describes one sync request. Built once by the caller and never mutated by
/// the pipeline.
#[derive(Clone, PartialEq, Eq)]
pub struct PushContext {
    pub token: String,
    pub project_id: String,
    /// Empty selects the project's default branch.
    pub branch_id: String,
    pub scenes: SceneSelection,
    /// Local git working copy the export is installed into.
    pub directory: PathBuf,
    pub remote_url: String,
}

impl fmt::Debug for PushContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushContext")
            .field("token", &"<redacted>")
            .field("project_id", &self.project_id)
            .field("branch_id", &self.branch_id)
            .field("scenes", &self.scenes)
            .field("directory", &self.directory)
            .field("remote_url", &self.remote_url)
            .finish()
    }
}

impl PushContext {
    /// Branch id as the API expects it: absent for the default branch.
    pub fn branch(&self) -> Option<&str> {
        if self.branch_id.is_empty() {
            None
        } else {
            Some(&self.branch_id)
        }
    }

    /// Lists every missing field, one line each. Empty when the context is valid.
    pub fn validation_report(&self) -> String {
        let mut report = String::new();
        if self.token.is_empty() {
            report.push_str("API Key Token is missing.\n");
        }
        if self.project_id.is_empty() {
            report.push_str("Project ID is missing.\n");
        }
        if !self.scenes.is_valid() {
            report.push_str("Scene IDs are missing.\n");
        }
        if self.directory.as_os_str().is_empty() {
            report.push_str("File Directory is missing.\n");
        }
        if self.remote_url.is_empty() {
            report.push_str("Remote Git URL is missing.\n");
        }
        report
    }

    pub fn is_valid(&self) -> bool {
        self.validation_report().is_empty()
    }

    pub fn validate(&self) -> SyncResult<()> {
        let report = self.validation_report();
        if report.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Validation(report.trim_end().to_string()))
        }
    }

    pub fn layout(&self, settings: &SyncSettings) -> ProjectLayout {
        ProjectLayout::new(&self.directory, settings)
    }
}

/// Paths the pipeline owns inside the project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub project_dir: PathBuf,
    pub output_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub log_file: PathBuf,
}

impl ProjectLayout {
    pub fn new(project_dir: &Path, settings: &SyncSettings) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
            output_dir: project_dir.join(&settings.output_folder),
            scripts_dir: project_dir.join(&settings.scripts_folder),
            log_file: project_dir.join(&settings.log_file),
        }
    }
}
