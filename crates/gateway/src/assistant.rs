//! Assistant (spec §4.4): per-stream segment-capture loop. Owned by a
//! Stream while its status is `Started`; reads the transcoder's rolling
//! playlist, validates segment files, and indexes them into the per-stream
//! catalog.
//!
//! To avoid a cyclic Stream<->Assistant reference (spec §9 design note),
//! the Assistant holds only what it needs by value/Arc — it never reaches
//! back into the Manager's stream table.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::catalog::segments::SegmentStore;
use crate::metrics;
use crate::model::{ProtocolInfo, Segment};

const TICK_INTERVAL: Duration = Duration::from_millis(1500);
const PLAYLIST_CAPACITY: usize = 3;

pub struct Assistant {
    stream_id: i64,
    live_dir: PathBuf,
    protocol_info: ProtocolInfo,
    store: Arc<SegmentStore>,
    tz: Tz,
    cancel: CancellationToken,
}

impl Assistant {
    pub fn new(
        stream_id: i64,
        live_dir: PathBuf,
        protocol_info: ProtocolInfo,
        store: Arc<SegmentStore>,
        tz: Tz,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            stream_id,
            live_dir,
            protocol_info,
            store,
            tz,
            cancel,
        }
    }

    /// Run the capture loop until cancelled. In-flight ticks finish their
    /// transaction before exiting (spec §4.4 guarantee).
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(stream_id = self.stream_id, "assistant capture loop stopped");
                    return;
                }
                _ = tokio::time::sleep(TICK_INTERVAL) => {
                    if let Err(e) = self.tick().await {
                        metrics::ASSISTANT_TICK_ERRORS_TOTAL.inc();
                        warn!(stream_id = self.stream_id, error = %e, "assistant tick failed");
                    }
                }
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let path = self.live_dir.join(&self.protocol_info.playlist_name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let segments = self.parse_and_validate(&bytes).await?;
        if segments.is_empty() {
            return Ok(());
        }

        let day = chrono::Utc::now()
            .with_timezone(&self.tz)
            .format("%Y%m%d")
            .to_string();
        self.store.put_segments(&day, &segments)?;
        Ok(())
    }

    async fn parse_and_validate(&self, bytes: &[u8]) -> anyhow::Result<Vec<Segment>> {
        let parsed = match m3u8_rs::parse_media_playlist_res(bytes) {
            Ok(playlist) => playlist,
            Err(e) => {
                error!(stream_id = self.stream_id, "failed to parse rolling playlist: {e:?}");
                return Ok(Vec::new());
            }
        };

        let mut out = Vec::with_capacity(PLAYLIST_CAPACITY.min(parsed.segments.len()));
        for entry in &parsed.segments {
            let file_path = self.live_dir.join(&entry.uri);
            let metadata = match tokio::fs::metadata(&file_path).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.len() == 0 {
                continue;
            }

            let Some(seq_id) = self.derive_seq_id(&entry.uri) else {
                continue;
            };

            let recorded_at = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);

            out.push(Segment {
                seq_id,
                duration: entry.duration as f64,
                uri: entry.uri.clone(),
                recorded_at,
            });
        }

        Ok(out)
    }

    /// Strip the configured prefix/suffix from a segment URI to recover its
    /// sequence number, e.g. `media123.ts` -> 123. Widened to 64-bit (spec
    /// §9 open question: the original's 16-bit parse overflows on long days).
    fn derive_seq_id(&self, uri: &str) -> Option<i64> {
        let prefix = self
            .protocol_info
            .segment_name_template
            .split("%d")
            .next()
            .unwrap_or("");
        let suffix = format!(".{}", self.protocol_info.segment_extension);

        uri.strip_prefix(prefix)
            .and_then(|s| s.strip_suffix(&suffix))
            .and_then(|s| s.parse::<i64>().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Protocol;

    fn assistant_for(live_dir: PathBuf, store: Arc<SegmentStore>) -> Assistant {
        Assistant::new(
            1,
            live_dir,
            ProtocolInfo::for_protocol(Protocol::Hls),
            store,
            chrono_tz::UTC,
            CancellationToken::new(),
        )
    }

    #[test]
    fn derive_seq_id_strips_prefix_and_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SegmentStore::open(dir.path(), 1).unwrap());
        let assistant = assistant_for(dir.path().to_path_buf(), store);

        assert_eq!(assistant.derive_seq_id("media123.ts"), Some(123));
        assert_eq!(assistant.derive_seq_id("media7.ts"), Some(7));
        assert_eq!(assistant.derive_seq_id("bogus.ts"), None);
    }

    #[tokio::test]
    async fn tick_skips_segments_with_missing_or_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SegmentStore::open(dir.path(), 1).unwrap());
        let assistant = assistant_for(dir.path().to_path_buf(), store.clone());

        // media1.ts is missing; media2.ts exists but is empty.
        tokio::fs::write(dir.path().join("media2.ts"), b"").await.unwrap();
        tokio::fs::write(dir.path().join("media3.ts"), b"data").await.unwrap();

        let playlist = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:1\n#EXT-X-MEDIA-SEQUENCE:1\n#EXTINF:1.0,\nmedia1.ts\n#EXTINF:1.0,\nmedia2.ts\n#EXTINF:1.0,\nmedia3.ts\n";
        let segs = assistant.parse_and_validate(playlist.as_bytes()).await.unwrap();

        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].seq_id, 3);
    }

    #[tokio::test]
    async fn tick_persists_into_todays_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SegmentStore::open(dir.path(), 1).unwrap());
        let assistant = assistant_for(dir.path().to_path_buf(), store.clone());

        tokio::fs::write(dir.path().join("media1.ts"), b"data").await.unwrap();
        let playlist = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:1\n#EXT-X-MEDIA-SEQUENCE:1\n#EXTINF:1.0,\nmedia1.ts\n";
        tokio::fs::write(dir.path().join("index.m3u8"), playlist).await.unwrap();

        assistant.tick().await.unwrap();

        let today = chrono::Utc::now().format("%Y%m%d").to_string();
        let segs = store.iter_segments(&today).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].seq_id, 1);
    }
}
