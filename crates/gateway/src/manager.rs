//! Manager (spec §4.5): the orchestrator. Owns the stream table under a
//! reader/writer lock (enumeration reads, insert/delete writes); each
//! entry is additionally wrapped in its own mutex so lifecycle operations
//! on the same stream serialize while distinct streams proceed in
//! parallel (spec §5 ordering guarantees).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assistant::Assistant;
use crate::catalog::segments::SegmentStore;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::GatewayError;
use crate::lifecycle::{guard_start, guard_stop, Origin};
use crate::metrics;
use crate::model::{ProtocolInfo, Protocol, Stream, StreamState};
use crate::stream::{max_start_poll_cycles, start_poll_interval, unix_now, StreamHandle};

/// Liveness watchdog retry floor (spec §4.5): never retry sooner than this
/// after `last_attempt_time`, regardless of watchdog cadence.
pub const RETRY_FLOOR: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Clone)]
pub struct CreateStreamRequest {
    pub uri: String,
    pub username: String,
    pub password: String,
    pub protocol: Protocol,
    pub enabled: bool,
    pub recording: bool,
    pub data_retention_hours: i64,
}

#[derive(Debug, Default, Clone)]
pub struct UpdateStreamRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub enabled: Option<bool>,
    pub recording: Option<bool>,
    pub data_retention_hours: Option<i64>,
}

type SharedHandle = Arc<Mutex<StreamHandle>>;

pub struct Manager {
    catalog: Catalog,
    config: Config,
    streams: RwLock<HashMap<i64, SharedHandle>>,
    shutdown: CancellationToken,
}

impl Manager {
    pub fn new(catalog: Catalog, config: Config) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            config,
            streams: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn live_dir_for(&self, id: i64) -> PathBuf {
        self.config.storage.live_dir.join(id.to_string())
    }

    fn segments_dir(&self) -> PathBuf {
        self.config.storage.record_dir.join("segments")
    }

    /// Initialization order (spec §4.5, must be exact): load streams, open
    /// per-stream KV files, start the archival scheduler, start the
    /// watchdog loop.
    pub async fn init(&self) -> Result<(), GatewayError> {
        let persisted = self.catalog.load_streams()?;
        std::fs::create_dir_all(self.segments_dir())
            .map_err(|e| GatewayError::storage(format!("create segments dir: {e}")))?;

        let mut streams = self.streams.write().await;
        for stream in persisted {
            let live_dir = self.live_dir_for(stream.id);
            let mut handle = StreamHandle::new(stream.clone(), live_dir);
            match SegmentStore::open(self.segments_dir(), stream.id) {
                Ok(store) => handle.segment_store = Some(Arc::new(store)),
                Err(e) => warn!(stream_id = stream.id, error = %e, "degraded: per-stream catalog unavailable"),
            }
            streams.insert(stream.id, Arc::new(Mutex::new(handle)));
        }
        drop(streams);

        info!(count = self.stream_count().await, "catalog streams loaded");
        Ok(())
    }

    async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    // ---- CRUD -------------------------------------------------------

    pub async fn create_stream(&self, req: CreateStreamRequest) -> Result<Stream, GatewayError> {
        if req.uri.trim().is_empty() {
            return Err(GatewayError::invalid_uri("uri must not be empty"));
        }

        let hash = Stream::hash_uri(&req.uri);
        if self.find_by_hash(&hash).await.is_some() {
            return Err(GatewayError::duplicated_stream(req.uri.clone()));
        }

        let id = self.catalog.next_stream_id()?;
        let mut stream = Stream::new(id, req.uri, req.username, req.password, req.protocol);
        stream.enabled = req.enabled;
        stream.recording = req.recording;
        stream.data_retention_hours = req.data_retention_hours;
        self.catalog.save_stream(&stream)?;

        let live_dir = self.live_dir_for(id);
        let mut handle = StreamHandle::new(stream.clone(), live_dir);
        let store = SegmentStore::open(self.segments_dir(), id)?;
        handle.segment_store = Some(Arc::new(store));

        self.streams
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(handle)));

        Ok(stream)
    }

    async fn find_by_hash(&self, hash: &str) -> Option<i64> {
        let streams = self.streams.read().await;
        for (id, handle) in streams.iter() {
            if handle.lock().await.data.url_hash == hash {
                return Some(*id);
            }
        }
        None
    }

    pub async fn list_streams(&self) -> Vec<Stream> {
        let streams = self.streams.read().await;
        let mut out = Vec::with_capacity(streams.len());
        for handle in streams.values() {
            out.push(handle.lock().await.data.clone());
        }
        out
    }

    pub async fn get_stream(&self, id: i64) -> Result<Stream, GatewayError> {
        let handle = self.handle_for(id).await?;
        Ok(handle.lock().await.data.clone())
    }

    pub async fn update_stream(
        &self,
        id: i64,
        req: UpdateStreamRequest,
    ) -> Result<Stream, GatewayError> {
        let handle = self.handle_for(id).await?;
        let mut guard = handle.lock().await;

        if let Some(username) = req.username {
            guard.data.username = username;
        }
        if let Some(password) = req.password {
            guard.data.password = password;
        }
        if let Some(enabled) = req.enabled {
            guard.data.enabled = enabled;
        }
        if let Some(recording) = req.recording {
            guard.data.recording = recording;
        }
        if let Some(hours) = req.data_retention_hours {
            guard.data.data_retention_hours = hours;
        }

        self.catalog.save_stream(&guard.data)?;
        Ok(guard.data.clone())
    }

    /// Stop (best-effort), close the per-stream KV file, remove it from
    /// disk, and drop the stream from the catalog (spec §6 `DELETE`,
    /// §8 scenario 6).
    pub async fn delete_stream(&self, id: i64) -> Result<(), GatewayError> {
        let handle = {
            let mut streams = self.streams.write().await;
            streams
                .remove(&id)
                .ok_or_else(|| GatewayError::stream_not_found(id.to_string()))?
        };

        let store_path = {
            let mut guard = handle.lock().await;
            if guard.data.status != StreamState::Stopped {
                self.teardown_locked(&mut guard).await;
            }
            guard.segment_store.take().map(|s| s.path().to_path_buf())
        };

        // Drop the Arc<SegmentStore> (closing the sled db) before unlinking.
        drop(handle);
        if let Some(path) = store_path {
            let _ = std::fs::remove_dir_all(path);
        }

        self.catalog.delete_stream(id)?;
        Ok(())
    }

    async fn handle_for(&self, id: i64) -> Result<SharedHandle, GatewayError> {
        self.streams
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::stream_not_found(id.to_string()))
    }

    // ---- Lifecycle ----------------------------------------------------

    /// `start` (spec §4.3, §6 `GET /streams/{id}/start`). Returns the
    /// number of 1-second poll cycles liveness took to observe.
    ///
    /// The state guard runs under the per-stream lock, which is then
    /// released before the slow work (spawn, liveness wait) — spec §5: no
    /// suspension point holds the lock. The lock is only re-acquired in
    /// short bursts to mutate fields or sample liveness, so a concurrent
    /// `stop` against this `Starting` stream observes the state instantly
    /// and is rejected with `conflict` rather than blocking for the
    /// duration of the start (spec §4.3).
    pub async fn start_stream(&self, id: i64, origin: Origin) -> Result<u32, GatewayError> {
        let handle = self.handle_for(id).await?;

        let live_dir = {
            let mut guard = handle.lock().await;
            guard_start(guard.data.status)?;
            guard.data.status = StreamState::Starting;
            guard.data.last_attempt_time = Some(unix_now());
            info!(stream_id = id, origin = origin.as_str(), "starting stream");
            guard.live_dir.clone()
        };

        let _ = std::fs::remove_dir_all(&live_dir);
        if let Err(e) = std::fs::create_dir_all(&live_dir) {
            handle.lock().await.data.status = StreamState::Failed;
            return Err(GatewayError::storage(format!("create live dir: {e}")));
        }

        {
            let mut guard = handle.lock().await;
            if guard.segment_store.is_none() {
                match SegmentStore::open(self.segments_dir(), id) {
                    Ok(store) => guard.segment_store = Some(Arc::new(store)),
                    Err(e) => {
                        guard.data.status = StreamState::Failed;
                        return Err(e);
                    }
                }
            }
        }

        {
            let mut guard = handle.lock().await;
            if let Err(e) = guard.spawn_transcoder() {
                guard.data.status = StreamState::Failed;
                return Err(e);
            }
        }

        let max_cycles = max_start_poll_cycles();
        let mut waited = 0u32;
        let became_active = loop {
            let (active, exited) = {
                let mut guard = handle.lock().await;
                let active = guard.is_active().await;
                let exited = if active { false } else { guard.reap_if_exited() };
                (active, exited)
            };
            if active {
                break true;
            }
            if exited {
                break false;
            }
            // Sleep out the cycle before counting it, so the final cycle's
            // poll interval actually elapses before the deadline check —
            // otherwise the timeout fires a full cycle early (spec §8:
            // liveness timeout must fire between 10.0s and 11.0s from start).
            tokio::time::sleep(start_poll_interval()).await;
            waited += 1;
            if waited as u64 >= max_cycles {
                break false;
            }
        };

        if became_active {
            let (store, protocol_info) = {
                let mut guard = handle.lock().await;
                guard.data.status = StreamState::Started;

                let cancel = CancellationToken::new();
                guard.assistant_cancel = Some(cancel.clone());
                (
                    guard.segment_store.clone().map(|store| (store, cancel)),
                    guard.data.protocol_info.clone(),
                )
            };

            metrics::STREAMS_RUNNING.inc();
            metrics::STREAMS_STARTED_TOTAL.inc();
            if origin == Origin::Watcher {
                metrics::STREAMS_RESTARTS_TOTAL.inc();
            }

            if let Some((store, cancel)) = store {
                let tz = self.config.timezone().unwrap_or_else(|_| {
                    warn!(stream_id = id, "invalid configured timezone, defaulting to UTC");
                    chrono_tz::UTC
                });
                self.spawn_assistant(id, live_dir, protocol_info, store, tz, cancel);
            }
            Ok(waited)
        } else {
            let mut guard = handle.lock().await;
            guard.kill();
            guard.wait_exit().await;
            guard.data.status = StreamState::Failed;
            Err(GatewayError::timeout(format!(
                "stream {id} did not become live within the start deadline"
            )))
        }
    }

    fn spawn_assistant(
        &self,
        id: i64,
        live_dir: PathBuf,
        protocol_info: ProtocolInfo,
        store: Arc<SegmentStore>,
        tz: chrono_tz::Tz,
        cancel: CancellationToken,
    ) {
        let assistant = Assistant::new(id, live_dir, protocol_info, store, tz, cancel);
        tokio::spawn(assistant.run());
    }

    /// `stop` (spec §4.3, §6 `GET /streams/{id}/stop`). A no-op against an
    /// already-stopped stream.
    pub async fn stop_stream(&self, id: i64, origin: Origin) -> Result<(), GatewayError> {
        let handle = self.handle_for(id).await?;
        let mut guard = handle.lock().await;

        let Some(_) = guard_stop(guard.data.status)? else {
            return Ok(());
        };

        let was_started = guard.data.status == StreamState::Started;
        guard.data.status = StreamState::Stopping;
        info!(stream_id = id, origin = origin.as_str(), "stopping stream");

        self.teardown_locked(&mut guard).await;

        if was_started {
            metrics::STREAMS_RUNNING.dec();
        }
        Ok(())
    }

    async fn teardown_locked(&self, guard: &mut StreamHandle) {
        if let Some(cancel) = guard.assistant_cancel.take() {
            cancel.cancel();
        }
        guard.kill();
        guard.wait_exit().await;
        guard.remove_playlist().await;
        guard.data.status = StreamState::Stopped;
    }

    // ---- Watchdog support ----------------------------------------------

    /// One sample per stream for the watchdog tick (spec §4.5).
    pub(crate) async fn watchdog_sample(&self) -> Vec<WatchdogSample> {
        let streams = self.streams.read().await;
        let mut out = Vec::with_capacity(streams.len());
        for (&id, handle) in streams.iter() {
            let guard = handle.lock().await;
            out.push(WatchdogSample {
                id,
                enabled: guard.data.enabled,
                status: guard.data.status,
                active: guard.is_active().await,
                last_attempt_time: guard.data.last_attempt_time,
            });
        }
        out
    }

    // ---- Playback reads (spec §6 HTTP surface) -------------------------

    /// Today's date in the configured timezone, `YYYYMMDD` (falls back to
    /// UTC if the configured timezone string doesn't parse).
    fn today(&self) -> String {
        let tz = self.config.timezone().unwrap_or(chrono_tz::UTC);
        chrono::Utc::now().with_timezone(&tz).format("%Y%m%d").to_string()
    }

    /// Render today's in-progress playlist (no end-list) for `id`.
    pub async fn render_today_playlist(&self, id: i64) -> Result<String, GatewayError> {
        let handle = self.handle_for(id).await?;
        let guard = handle.lock().await;
        let segments = guard.get_m3u8_segments(&self.today())?;
        Ok(crate::stream::make_m3u8_tags(&segments, true))
    }

    /// Read a live segment file for `id` directly from its live directory.
    pub async fn read_live_segment(&self, id: i64, name: &str) -> Result<Vec<u8>, GatewayError> {
        let handle = self.handle_for(id).await?;
        let path = {
            let guard = handle.lock().await;
            guard.live_dir.join(name)
        };
        tokio::fs::read(&path)
            .await
            .map_err(|e| GatewayError::storage(format!("read segment {}: {e}", path.display())))
    }

    /// Days with indexed/archived segments for every stream (spec §C
    /// supplemented `GET /videos`).
    pub async fn list_all_video_days(&self) -> Result<Vec<(i64, Vec<String>)>, GatewayError> {
        let mut out = Vec::new();
        for stream in self.list_streams().await {
            let days = self.catalog.list_video_days(stream.id)?;
            out.push((stream.id, days));
        }
        Ok(out)
    }

    // ---- Archiver support -----------------------------------------------

    pub(crate) async fn archive_targets(&self) -> Vec<ArchiveTarget> {
        let streams = self.streams.read().await;
        let mut out = Vec::with_capacity(streams.len());
        for (&id, handle) in streams.iter() {
            let guard = handle.lock().await;
            if let Some(store) = guard.segment_store.clone() {
                out.push(ArchiveTarget {
                    id,
                    live_dir: guard.live_dir.clone(),
                    protocol_info: guard.data.protocol_info.clone(),
                    store,
                });
            }
        }
        out
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Cancel the watchdog/archiver, stop every stream best-effort, and let
    /// per-stream and global catalog handles close on drop (spec §4.5).
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let ids: Vec<i64> = self.streams.read().await.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.stop_stream(id, Origin::Operator).await {
                warn!(stream_id = id, error = %e, "error stopping stream during shutdown");
            }
        }
    }
}

pub struct WatchdogSample {
    pub id: i64,
    pub enabled: bool,
    pub status: StreamState,
    pub active: bool,
    pub last_attempt_time: Option<u64>,
}

pub struct ArchiveTarget {
    pub id: i64,
    pub live_dir: PathBuf,
    pub protocol_info: ProtocolInfo,
    pub store: Arc<SegmentStore>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            bind_address: "127.0.0.1:0".into(),
            timezone: "UTC".into(),
            storage: StorageConfig {
                live_dir: dir.join("live"),
                record_dir: dir.join("record"),
                remote: false,
                s3_endpoint: None,
                s3_access_key: None,
                s3_secret_key: None,
                s3_region: "us-east-1".into(),
                s3_bucket: "video-record".into(),
            },
            archive_cron: "0 0 0 * * *".into(),
        }
    }

    async fn test_manager() -> (Arc<Manager>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(dir.path().join("catalog.db")).unwrap();
        let manager = Manager::new(catalog, test_config(dir.path()));
        manager.init().await.unwrap();
        (manager, dir)
    }

    #[tokio::test]
    async fn create_stream_rejects_empty_uri() {
        let (manager, _dir) = test_manager().await;
        let req = CreateStreamRequest {
            uri: "".into(),
            ..Default::default()
        };
        let err = manager.create_stream(req).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_uri");
    }

    #[tokio::test]
    async fn create_stream_rejects_duplicates() {
        let (manager, _dir) = test_manager().await;
        let req = CreateStreamRequest {
            uri: "rtsp://cam/1".into(),
            enabled: true,
            recording: true,
            ..Default::default()
        };
        manager.create_stream(req.clone()).await.unwrap();
        let err = manager.create_stream(req).await.unwrap_err();
        assert_eq!(err.kind(), "duplicated_stream");
    }

    #[tokio::test]
    async fn delete_unknown_stream_is_not_found() {
        let (manager, _dir) = test_manager().await;
        let err = manager.delete_stream(999).await.unwrap_err();
        assert_eq!(err.kind(), "stream_not_found");
    }

    #[tokio::test]
    async fn stop_against_stopped_stream_is_a_no_op() {
        let (manager, _dir) = test_manager().await;
        let req = CreateStreamRequest {
            uri: "rtsp://cam/1".into(),
            ..Default::default()
        };
        let stream = manager.create_stream(req).await.unwrap();
        manager
            .stop_stream(stream.id, Origin::Operator)
            .await
            .unwrap();
        let after = manager.get_stream(stream.id).await.unwrap();
        assert_eq!(after.status, StreamState::Stopped);
    }

    #[tokio::test]
    async fn update_stream_persists_changes() {
        let (manager, _dir) = test_manager().await;
        let req = CreateStreamRequest {
            uri: "rtsp://cam/1".into(),
            ..Default::default()
        };
        let stream = manager.create_stream(req).await.unwrap();

        let updated = manager
            .update_stream(
                stream.id,
                UpdateStreamRequest {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.enabled);

        let reloaded = manager.catalog().load_streams().unwrap();
        assert!(!reloaded.iter().find(|s| s.id == stream.id).unwrap().enabled);
    }

    #[tokio::test]
    async fn delete_stream_removes_catalog_entry_and_kv_file() {
        let (manager, _dir) = test_manager().await;
        let req = CreateStreamRequest {
            uri: "rtsp://cam/1".into(),
            ..Default::default()
        };
        let stream = manager.create_stream(req).await.unwrap();
        manager.delete_stream(stream.id).await.unwrap();

        assert!(manager.get_stream(stream.id).await.is_err());
        assert!(manager.catalog().load_streams().unwrap().is_empty());
    }
}
