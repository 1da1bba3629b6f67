//! Stream (spec §4.2): owns one transcoder subprocess, its live directory,
//! and its per-stream KV handle. The sole liveness oracle is `is_active`.

pub mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::segments::SegmentStore;
use crate::error::GatewayError;
use crate::model::Segment;
use crate::model::Stream;

use pipeline::build_ffmpeg_args;

/// Playlist must have been touched within this long to count as live
/// (spec §4.2 liveness tuning constants).
pub const PLAYLIST_STALE_SECS: u64 = 8;
/// `start` gives up waiting for liveness after this long.
pub const START_TIMEOUT: Duration = Duration::from_secs(10);
const START_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime supervisor for one stream's transcoder process. Wraps the
/// persisted [`Stream`] plus everything that exists only while the process
/// is running.
pub struct StreamHandle {
    pub data: Stream,
    pub live_dir: PathBuf,
    child: Option<Child>,
    pub segment_store: Option<Arc<SegmentStore>>,
    pub assistant_cancel: Option<CancellationToken>,
}

impl StreamHandle {
    pub fn new(data: Stream, live_dir: PathBuf) -> Self {
        Self {
            data,
            live_dir,
            child: None,
            segment_store: None,
            assistant_cancel: None,
        }
    }

    pub fn playlist_path(&self) -> PathBuf {
        self.live_dir.join(&self.data.protocol_info.playlist_name)
    }

    /// Spawn the transcoder (spec §6 argument vector). The process handle
    /// is kept; liveness is observed separately via `is_active`.
    pub fn spawn_transcoder(&mut self) -> Result<(), GatewayError> {
        let args = build_ffmpeg_args(&self.data, &self.live_dir);
        let child = Command::new("ffmpeg")
            .args(&args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatewayError::storage(format!("spawn transcoder: {e}")))?;

        self.data.pid = child.id();
        self.child = Some(child);
        Ok(())
    }

    /// `is_active` (spec §4.2, §8 invariant 5): process handle present,
    /// playlist file exists, and its mtime age is under the stale
    /// threshold. All three are ANDed.
    pub async fn is_active(&self) -> bool {
        if self.child.is_none() {
            return false;
        }

        let metadata = match tokio::fs::metadata(self.playlist_path()).await {
            Ok(m) => m,
            Err(_) => return false,
        };

        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(_) => return false,
        };

        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        age < Duration::from_secs(PLAYLIST_STALE_SECS)
    }

    /// Non-blocking check for whether the transcoder process has already
    /// exited, clearing the handle if so.
    pub fn reap_if_exited(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return true;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(?status, "transcoder process exited");
                self.child = None;
                self.data.pid = None;
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "try_wait on transcoder failed");
                false
            }
        }
    }

    /// Send a kill signal to the transcoder if present. Idempotent.
    pub fn kill(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }

    pub async fn wait_exit(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.wait().await;
        }
        self.child = None;
        self.data.pid = None;
    }

    /// Remove the rolling playlist file so a stale one from a previous run
    /// is never misread as current (spec §4.3 `Stopping -> Stopped`).
    pub async fn remove_playlist(&self) {
        let _ = tokio::fs::remove_file(self.playlist_path()).await;
    }

    pub fn pid(&self) -> Option<u32> {
        self.data.pid
    }

    /// Segments for `day`, ascending by `seq_id` (spec §4.2
    /// `get_m3u8_segments`).
    pub fn get_m3u8_segments(&self, day: &str) -> Result<Vec<Segment>, GatewayError> {
        match &self.segment_store {
            Some(store) => store.iter_segments(day),
            None => Ok(Vec::new()),
        }
    }
}

/// Render an HLS media playlist from already-ordered segments (spec §4.2
/// `make_m3u8_tags`). `live` controls whether an end-list tag is appended;
/// historical (frozen) days always terminate with one.
pub fn make_m3u8_tags(segments: &[Segment], live: bool) -> String {
    let target_duration = segments
        .iter()
        .map(|s| s.duration)
        .fold(0.0_f64, f64::max)
        .ceil() as i64;
    let media_sequence = segments.first().map(|s| s.seq_id).unwrap_or(0);

    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    out.push_str("#EXT-X-VERSION:3\n");
    out.push_str(&format!("#EXT-X-TARGETDURATION:{}\n", target_duration.max(1)));
    out.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", media_sequence));

    for seg in segments {
        out.push_str(&format!("#EXTINF:{},\n", seg.duration));
        out.push_str(&seg.uri);
        out.push('\n');
    }

    if !live {
        out.push_str("#EXT-X-ENDLIST\n");
    }

    out
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// How many poll cycles `start` waits for liveness before giving up.
pub fn max_start_poll_cycles() -> u64 {
    START_TIMEOUT.as_secs() / START_POLL_INTERVAL.as_secs()
}

pub fn start_poll_interval() -> Duration {
    START_POLL_INTERVAL
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(seq_id: i64, duration: f64) -> Segment {
        Segment {
            seq_id,
            duration,
            uri: format!("media{}.ts", seq_id),
            recorded_at: 0,
        }
    }

    #[test]
    fn make_m3u8_tags_renders_live_playlist_without_endlist() {
        let segs = vec![seg(7, 1.02), seg(8, 0.98), seg(9, 1.10)];
        let playlist = make_m3u8_tags(&segs, true);

        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:7"));
        assert!(playlist.contains("#EXT-X-TARGETDURATION:2"));
        assert_eq!(playlist.matches("#EXTINF").count(), 3);
        assert!(!playlist.contains("#EXT-X-ENDLIST"));
    }

    #[test]
    fn make_m3u8_tags_terminates_historical_days() {
        let segs = vec![seg(1, 1.0)];
        let playlist = make_m3u8_tags(&segs, false);
        assert!(playlist.contains("#EXT-X-ENDLIST"));
    }

    #[test]
    fn make_m3u8_tags_empty_segments_defaults_target_duration_to_one() {
        let playlist = make_m3u8_tags(&[], true);
        assert!(playlist.contains("#EXT-X-TARGETDURATION:1"));
        assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:0"));
    }
}
