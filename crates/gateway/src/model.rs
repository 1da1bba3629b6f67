use serde::{Deserialize, Serialize};

/// Output protocol for a stream's transcoder. Only `Hls` is exercised by the
/// core; `Webm` is a reserved variant for a future transcoder invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Hls,
    Webm,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Hls
    }
}

/// Filenames and extension derived from `Protocol`. Not persisted; rebuilt
/// from `protocol` whenever a `Stream` is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    pub playlist_name: String,
    pub segment_name_template: String,
    pub segment_extension: String,
}

impl ProtocolInfo {
    pub fn for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Hls => ProtocolInfo {
                playlist_name: "index.m3u8".to_string(),
                segment_name_template: "media%d.ts".to_string(),
                segment_extension: "ts".to_string(),
            },
            Protocol::Webm => ProtocolInfo {
                playlist_name: "index.webm".to_string(),
                segment_name_template: "media%d.webm".to_string(),
                segment_extension: "webm".to_string(),
            },
        }
    }
}

/// Lifecycle state of a stream's supervised transcoder (spec §4.3).
///
/// Persisted `Stream::status` is always reduced to `Stopped`; the other
/// variants are runtime-only and live in the Manager's in-memory table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    Stopped,
    Starting,
    Started,
    Stopping,
    Failed,
}

impl Default for StreamState {
    fn default() -> Self {
        StreamState::Stopped
    }
}

/// Durable stream definition (spec §3). `url_hash` is a stable fingerprint of
/// `uri` used for duplicate detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: i64,
    pub uri: String,
    pub username: String,
    pub password: String,
    pub protocol: Protocol,
    pub protocol_info: ProtocolInfo,
    pub url_hash: String,
    pub enabled: bool,
    pub recording: bool,
    pub data_retention_hours: i64,
    pub created: u64,

    // Runtime-only fields. `#[serde(skip, default)]` so they never leak into
    // the persisted JSON and never survive a `load_streams()` round trip
    // (spec §3 invariant: persisted state never contains Starting/Stopping/
    // Failed; they are reduced to Stopped).
    #[serde(skip, default)]
    pub status: StreamState,
    #[serde(skip, default)]
    pub pid: Option<u32>,
    #[serde(skip, default)]
    pub last_stream_updated: Option<u64>,
    #[serde(skip, default)]
    pub last_attempt_time: Option<u64>,
}

impl Stream {
    pub fn new(id: i64, uri: String, username: String, password: String, protocol: Protocol) -> Self {
        let url_hash = Self::hash_uri(&uri);
        let protocol_info = ProtocolInfo::for_protocol(protocol);
        Stream {
            id,
            uri,
            username,
            password,
            protocol,
            protocol_info,
            url_hash,
            enabled: true,
            recording: true,
            data_retention_hours: 0,
            created: common::validation::safe_unix_timestamp(),
            status: StreamState::Stopped,
            pid: None,
            last_stream_updated: None,
            last_attempt_time: None,
        }
    }

    /// Stable fingerprint of a stream's RTSP URL, used for duplicate detection.
    pub fn hash_uri(uri: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(uri.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Reset runtime-only fields to their persisted defaults. Applied by the
    /// Catalog on `load_streams()`.
    pub fn reset_runtime_state(&mut self) {
        self.status = StreamState::Stopped;
        self.pid = None;
        self.last_stream_updated = None;
        self.last_attempt_time = None;
    }
}

/// One `.ts` file and its metadata (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub seq_id: i64,
    pub duration: f64,
    pub uri: String,
    pub recorded_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_uri_is_stable_and_distinguishes_uris() {
        let a = Stream::hash_uri("rtsp://cam/1");
        let b = Stream::hash_uri("rtsp://cam/1");
        let c = Stream::hash_uri("rtsp://cam/2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn reset_runtime_state_clears_transient_fields() {
        let mut s = Stream::new(1, "rtsp://cam/1".into(), "u".into(), "p".into(), Protocol::Hls);
        s.status = StreamState::Started;
        s.pid = Some(1234);
        s.last_attempt_time = Some(99);
        s.reset_runtime_state();
        assert_eq!(s.status, StreamState::Stopped);
        assert_eq!(s.pid, None);
        assert_eq!(s.last_attempt_time, None);
    }

    #[test]
    fn protocol_info_matches_protocol() {
        let info = ProtocolInfo::for_protocol(Protocol::Hls);
        assert_eq!(info.playlist_name, "index.m3u8");
        assert_eq!(info.segment_extension, "ts");
    }
}
