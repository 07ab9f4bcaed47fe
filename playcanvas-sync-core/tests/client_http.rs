use playcanvas_sync_core::client::PlayCanvasClient;
use playcanvas_sync_core::config::SyncSettings;
use playcanvas_sync_core::context::{PushContext, SceneSelection};
use playcanvas_sync_core::contract::{AssetApi, ExportApi, JobStatus};
use playcanvas_sync_core::SyncError;
use serde_json::json;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(branch: &str, scenes: &str) -> PushContext {
    PushContext {
        token: "secret-token".into(),
        project_id: "42".into(),
        branch_id: branch.into(),
        scenes: SceneSelection::parse(scenes),
        directory: PathBuf::from("/unused"),
        remote_url: "https://example/repo.git".into(),
    }
}

fn client_for(server: &MockServer, work: &TempDir) -> PlayCanvasClient {
    let settings = SyncSettings {
        api_base_url: server.uri(),
        work_dir: work.path().to_path_buf(),
        ..SyncSettings::default()
    };
    PlayCanvasClient::new(&settings)
}

#[tokio::test]
async fn start_export_posts_request_with_bearer_token() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/apps/download"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(json!({
            "project_id": "42",
            "scenes": ["100", "200"],
            "name": "Playroom",
            "branch_id": "main-branch"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 123456,
            "status": "running",
            "messages": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &work);
    let job_id = client
        .start_export_job(&context("main-branch", "100,200"))
        .await
        .expect("export job should start");
    assert_eq!(job_id, 123456);
}

#[tokio::test]
async fn start_export_without_id_is_protocol_error() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/apps/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
        .mount(&server)
        .await;

    let err = client_for(&server, &work)
        .start_export_job(&context("", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)), "got {err:?}");
}

#[tokio::test]
async fn start_export_rejected_carries_body() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/apps/download"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let err = client_for(&server, &work)
        .start_export_job(&context("", ""))
        .await
        .unwrap_err();
    match err {
        SyncError::Remote { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "bad token");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}

#[tokio::test]
async fn poll_reports_missing_download_url_as_none() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/jobs/7"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "running",
            "data": {"project_id": 42}
        })))
        .mount(&server)
        .await;

    let snapshot = client_for(&server, &work)
        .poll_job_status(7, &context("", ""))
        .await
        .unwrap();
    assert_eq!(snapshot.status, JobStatus::Running);
    assert_eq!(snapshot.download_url, None);
}

#[tokio::test]
async fn poll_reads_download_url_when_complete() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/jobs/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "complete",
            "data": {"download_url": "https://cdn.example/app.zip"}
        })))
        .mount(&server)
        .await;

    let snapshot = client_for(&server, &work)
        .poll_job_status(7, &context("", ""))
        .await
        .unwrap();
    assert_eq!(snapshot.status, JobStatus::Complete);
    assert_eq!(snapshot.download_url.as_deref(), Some("https://cdn.example/app.zip"));
}

#[tokio::test]
async fn poll_server_error_is_remote_error() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/jobs/7"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client_for(&server, &work)
        .poll_job_status(7, &context("", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote { status: 503, .. }));
}

#[tokio::test]
async fn download_artifact_overwrites_fixed_file() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/files/app.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh-bytes".to_vec()))
        .mount(&server)
        .await;

    let stale = work.path().join("Playroom.zip");
    std::fs::write(&stale, b"stale content that is longer").unwrap();

    let client = client_for(&server, &work);
    let downloaded = client
        .download_artifact(&format!("{}/files/app.zip", server.uri()))
        .await
        .unwrap();

    assert_eq!(downloaded, stale);
    assert_eq!(std::fs::read(&downloaded).unwrap(), b"fresh-bytes");
}

#[tokio::test]
async fn list_assets_passes_branch_and_limit() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/projects/42/assets"))
        .and(query_param("branchId", "dev"))
        .and(query_param("limit", "1000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [
                {"id": 1, "type": "script", "file": {"filename": "player.js"}},
                {"id": 2, "type": "folder", "file": null},
                {"id": 3, "type": "texture", "file": {"filename": "grass.png"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let assets = client_for(&server, &work)
        .list_assets(&context("dev", ""))
        .await
        .unwrap();
    assert_eq!(assets.len(), 3);
    assert!(assets[0].is_script());
    assert_eq!(assets[0].filename.as_deref(), Some("player.js"));
    assert_eq!(assets[1].filename, None);
}

#[tokio::test]
async fn list_assets_without_result_is_protocol_error() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/projects/42/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"assets": []})))
        .mount(&server)
        .await;

    let err = client_for(&server, &work)
        .list_assets(&context("", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Protocol(_)));
}

#[tokio::test]
async fn fetch_asset_file_returns_body() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/assets/9/file/player.js"))
        .and(query_param("branchId", "dev"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("var Player = {};"))
        .mount(&server)
        .await;

    let body = client_for(&server, &work)
        .fetch_asset_file(9, "player.js", &context("dev", ""))
        .await
        .unwrap();
    assert_eq!(body, b"var Player = {};");
}

#[tokio::test]
async fn fetch_asset_file_encodes_reserved_characters() {
    let server = MockServer::start().await;
    let work = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path("/assets/7/file/my%23script%3F.js"))
        .and(query_param("branchId", "dev"))
        .respond_with(ResponseTemplate::new(200).set_body_string("var Odd;"))
        .expect(1)
        .mount(&server)
        .await;

    let body = client_for(&server, &work)
        .fetch_asset_file(7, "my#script?.js", &context("dev", ""))
        .await
        .unwrap();
    assert_eq!(body, b"var Odd;");
}
