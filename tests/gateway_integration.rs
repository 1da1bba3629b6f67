//! End-to-end HTTP tests for the gateway binary's Boundary surface (spec §6,
//! §8 scenarios). Each test spawns the real axum router against a temporary
//! catalog and live-directory tree and drives it with `reqwest`, the way
//! `admin_gateway_integration.rs` spawns `coordinator`'s router in the
//! teacher's own test suite.
//!
//! Scenarios that require the external transcoder binary (start/stop,
//! watchdog restart) are out of scope here — they are covered in-process
//! against `Manager` directly inside `crates/gateway/src/manager.rs`.

use std::net::SocketAddr;
use std::sync::Arc;

use gateway::api::{router, AppState};
use gateway::config::{Config, StorageConfig};
use gateway::manager::Manager;
use gateway::storage::ObjectStore;
use gateway::Catalog;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct TestServer {
    addr: SocketAddr,
    _dir: tempfile::TempDir,
    _handle: JoinHandle<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn spawn_gateway() -> anyhow::Result<TestServer> {
    let dir = tempfile::tempdir()?;
    let config = Config {
        bind_address: "127.0.0.1:0".into(),
        timezone: "UTC".into(),
        storage: StorageConfig {
            live_dir: dir.path().join("live"),
            record_dir: dir.path().join("record"),
            remote: false,
            s3_endpoint: Some("http://127.0.0.1:1".into()),
            s3_access_key: Some("test".into()),
            s3_secret_key: Some("test".into()),
            s3_region: "us-east-1".into(),
            s3_bucket: "video-record".into(),
        },
        archive_cron: "0 0 0 * * *".into(),
    };

    let catalog = Catalog::open(config.storage.record_dir.join("catalog.db"))?;
    let manager = Manager::new(catalog, config.clone());
    manager.init().await?;
    let object_store = Arc::new(ObjectStore::connect(&manager.config().storage).await);

    let state = AppState::new(manager, object_store);
    let app = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(TestServer {
        addr,
        _dir: dir,
        _handle: handle,
    })
}

#[tokio::test]
async fn healthz_and_metrics_respond() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let health = client.get(server.url("/healthz")).send().await?;
    assert_eq!(health.status(), 200);

    let metrics = client.get(server.url("/metrics")).send().await?;
    assert_eq!(metrics.status(), 200);
    Ok(())
}

/// Spec §8 scenario 1 (create half): POST creates a stream in `Stopped`.
#[tokio::test]
async fn create_then_list_shows_stopped_stream() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/streams"))
        .json(&json!({"uri": "rtsp://cam/1"}))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let created: Value = resp.json().await?;
    assert_eq!(created["status"], "Stopped");

    let list: Value = client.get(server.url("/streams")).send().await?.json().await?;
    let streams = list.as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["uri"], "rtsp://cam/1");
    assert_eq!(streams[0]["status"], "Stopped");
    Ok(())
}

/// Spec §8 scenario 2: duplicate URIs are rejected with 400.
#[tokio::test]
async fn duplicate_uri_is_rejected() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();
    let body = json!({"uri": "rtsp://cam/dup"});

    let first = client.post(server.url("/streams")).json(&body).send().await?;
    assert_eq!(first.status(), 200);

    let second = client.post(server.url("/streams")).json(&body).send().await?;
    assert_eq!(second.status(), 400);
    let err: Value = second.json().await?;
    assert_eq!(err["error"], "duplicated_stream");
    Ok(())
}

#[tokio::test]
async fn empty_uri_is_rejected() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/streams"))
        .json(&json!({"uri": ""}))
        .send()
        .await?;
    assert_eq!(resp.status(), 400);
    Ok(())
}

/// Spec §8 scenario 4: an empty segment list still renders a valid playlist.
#[tokio::test]
async fn today_playlist_for_fresh_stream_has_no_segments() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/streams"))
        .json(&json!({"uri": "rtsp://cam/2"}))
        .send()
        .await?
        .json()
        .await?;
    let id = created["id"].as_i64().unwrap();

    let resp = client
        .get(server.url(&format!("/videos/{id}/today/m3u8")))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let body = resp.text().await?;
    assert!(body.contains("#EXTM3U"));
    assert!(body.contains("#EXT-X-MEDIA-SEQUENCE:0"));
    assert!(!body.contains("#EXT-X-ENDLIST"));
    Ok(())
}

/// Spec §6 `DELETE /streams/{id}`, §8 scenario 6 (stopped-stream half): after
/// delete, the stream no longer resolves.
#[tokio::test]
async fn delete_stream_then_get_returns_not_found() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/streams"))
        .json(&json!({"uri": "rtsp://cam/3"}))
        .send()
        .await?
        .json()
        .await?;
    let id = created["id"].as_i64().unwrap();

    let delete_resp = client
        .delete(server.url(&format!("/streams/{id}")))
        .send()
        .await?;
    assert_eq!(delete_resp.status(), 204);

    let get_resp = client.get(server.url(&format!("/streams/{id}"))).send().await?;
    assert_eq!(get_resp.status(), 404);
    Ok(())
}

/// `stop` against an already-`Stopped` stream is a documented no-op (spec §4.3).
#[tokio::test]
async fn stop_against_stopped_stream_is_a_no_op() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/streams"))
        .json(&json!({"uri": "rtsp://cam/4"}))
        .send()
        .await?
        .json()
        .await?;
    let id = created["id"].as_i64().unwrap();

    let resp = client
        .get(server.url(&format!("/streams/{id}/stop")))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    Ok(())
}

#[tokio::test]
async fn get_unknown_stream_returns_not_found() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let resp = client.get(server.url("/streams/999999")).send().await?;
    assert_eq!(resp.status(), 404);
    Ok(())
}

/// Requires the real `ffmpeg` transcoder binary on `PATH`; not run by default
/// (spec §8 scenario 1, start half). Run with `cargo test -- --ignored` on a
/// host that has ffmpeg installed.
#[tokio::test]
#[ignore]
async fn start_stream_transitions_to_started_within_deadline() -> anyhow::Result<()> {
    let server = spawn_gateway().await?;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/streams"))
        .json(&json!({"uri": "rtsp://127.0.0.1:1/does-not-exist"}))
        .send()
        .await?
        .json()
        .await?;
    let id = created["id"].as_i64().unwrap();

    let start_resp = client
        .get(server.url(&format!("/streams/{id}/start")))
        .send()
        .await?;
    // ffmpeg will spawn but never produce a live playlist against an
    // unreachable RTSP source, so this exercises the timeout path (504).
    assert_eq!(start_resp.status(), 504);
    Ok(())
}
