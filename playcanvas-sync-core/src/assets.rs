//! Script asset download: list the project's assets and write every
//! `script` asset into a destination folder.

use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::context::PushContext;
use crate::contract::AssetApi;
use crate::error::{SyncError, SyncResult};

/// Downloads all script assets of the project into `destination`.
///
/// Cancellation is checked before each asset, never during one, so a file
/// that has started downloading is always written. The first failing asset
/// aborts the whole call. Returns the number of files written.
pub async fn download_script_assets<A>(
    api: &A,
    context: &PushContext,
    destination: &Path,
    cancel: &CancellationToken,
) -> SyncResult<usize>
where
    A: AssetApi + ?Sized,
{
    let assets = api.list_assets(context).await?;
    let scripts: Vec<_> = assets.into_iter().filter(|a| a.is_script()).collect();
    info!(count = scripts.len(), dir = %destination.display(), "Downloading script assets");

    let mut written = 0;
    for script in &scripts {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let filename = script.filename.as_deref().ok_or_else(|| {
            SyncError::Protocol(format!("script asset {} has no file", script.id))
        })?;
        // Only the final component is used so a crafted name cannot escape the folder.
        let local_name = Path::new(filename)
            .file_name()
            .ok_or_else(|| SyncError::Protocol(format!("invalid script filename {filename:?}")))?;

        let content = api.fetch_asset_file(script.id, filename, context).await?;

        tokio::fs::create_dir_all(destination).await?;
        let target = destination.join(local_name);
        tokio::fs::write(&target, &content).await?;
        debug!(asset_id = script.id, path = %target.display(), size = content.len(), "Wrote script asset");
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SceneSelection;
    use crate::contract::{Asset, MockAssetApi};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn context() -> PushContext {
        PushContext {
            token: "t".into(),
            project_id: "p".into(),
            branch_id: String::new(),
            scenes: SceneSelection::All,
            directory: PathBuf::from("/unused"),
            remote_url: "r".into(),
        }
    }

    fn asset(id: u64, kind: &str, filename: &str) -> Asset {
        Asset {
            id,
            kind: kind.into(),
            filename: Some(filename.into()),
        }
    }

    #[tokio::test]
    async fn writes_only_scripts() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("scripts");
        let mut api = MockAssetApi::new();
        api.expect_list_assets().return_once(|_| {
            Ok(vec![
                asset(1, "script", "player.js"),
                asset(2, "texture", "grass.png"),
                asset(3, "script", "camera.js"),
            ])
        });
        api.expect_fetch_asset_file()
            .times(2)
            .returning(|id, name, _| Ok(format!("// {id} {name}").into_bytes()));

        let count = download_script_assets(&api, &context(), &dest, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(count, 2);
        let mut names: Vec<_> = std::fs::read_dir(&dest)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["camera.js", "player.js"]);
        assert_eq!(
            std::fs::read_to_string(dest.join("player.js")).unwrap(),
            "// 1 player.js"
        );
    }

    #[tokio::test]
    async fn first_failure_aborts_remaining_assets() {
        let dir = tempdir().unwrap();
        let mut api = MockAssetApi::new();
        api.expect_list_assets().return_once(|_| {
            Ok(vec![asset(1, "script", "a.js"), asset(2, "script", "b.js")])
        });
        api.expect_fetch_asset_file().times(1).returning(|_, _, _| {
            Err(SyncError::Remote {
                status: 404,
                body: "missing".into(),
            })
        });

        let err = download_script_assets(&api, &context(), dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote { status: 404, .. }));
    }

    #[tokio::test]
    async fn cancellation_stops_before_next_asset() {
        let dir = tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let mut api = MockAssetApi::new();
        api.expect_list_assets().return_once(|_| {
            Ok(vec![asset(1, "script", "a.js"), asset(2, "script", "b.js")])
        });
        // Cancelling mid-download still lets this download finish.
        api.expect_fetch_asset_file().times(1).returning(move |_, _, _| {
            trigger.cancel();
            Ok(b"a".to_vec())
        });

        let err = download_script_assets(&api, &context(), dir.path(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(dir.path().join("a.js").exists());
        assert!(!dir.path().join("b.js").exists());
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "old").unwrap();
        let mut api = MockAssetApi::new();
        api.expect_list_assets()
            .return_once(|_| Ok(vec![asset(1, "script", "a.js")]));
        api.expect_fetch_asset_file()
            .returning(|_, _, _| Ok(b"new".to_vec()));

        download_script_assets(&api, &context(), dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.js")).unwrap(), "new");
    }
}
