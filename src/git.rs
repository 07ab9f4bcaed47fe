//! The git side of a sync: commit the installed export and force-push it.

use async_trait::async_trait;
use playcanvas_sync_core::contract::Pusher;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, error, info};

pub const COMMIT_MESSAGE: &str = "Automated sync from PlayCanvas";

/// Runs `git add`, `git commit` and `git push --force` inside the project
/// directory. The remote branch is overwritten on every push.
#[derive(Debug, Clone)]
pub struct GitPusher {
    branch: String,
}

impl Default for GitPusher {
    fn default() -> Self {
        Self {
            branch: "master".to_string(),
        }
    }
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn nothing_to_commit(&self) -> bool {
        self.stdout.contains("nothing to commit") || self.stderr.contains("nothing to commit")
    }
}

impl GitPusher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn git(&self, directory: &Path, args: &[&str]) -> Result<GitOutput, String> {
        info!(dir = %directory.display(), "Running git {}", args.join(" "));
        let output = Command::new("git")
            .args(args)
            .current_dir(directory)
            .output()
            .await
            .map_err(|e| format!("failed to run git: {e}"))?;
        let out = GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        debug!(stdout = %out.stdout, stderr = %out.stderr, success = out.success, "git finished");
        Ok(out)
    }

    async fn step(&self, directory: &Path, args: &[&str]) -> Result<(), String> {
        let out = self.git(directory, args).await?;
        if out.success {
            Ok(())
        } else {
            error!(stderr = %out.stderr, "git {} failed", args.join(" "));
            Err(out.stderr)
        }
    }
}

#[async_trait]
impl Pusher for GitPusher {
    async fn push(&self, directory: &Path) -> Result<(), String> {
        self.step(directory, &["add", "."]).await?;

        let commit = self.git(directory, &["commit", "-m", COMMIT_MESSAGE]).await?;
        if !commit.success {
            if commit.nothing_to_commit() {
                info!("Nothing to commit, working tree clean");
            } else {
                error!(stderr = %commit.stderr, "git commit failed");
                return Err(commit.stderr);
            }
        }

        self.step(directory, &["push", "-u", "origin", &self.branch, "--force"])
            .await
    }
}

/// The `origin` URL configured for the repository at `directory`, if any.
pub async fn remote_url(directory: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["config", "--get", "remote.origin.url"])
        .current_dir(directory)
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        debug!(dir = %directory.display(), "No origin remote configured");
        return None;
    }
    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!url.is_empty()).then_some(url)
}
