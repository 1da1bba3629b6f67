//! Durable metadata store (spec §4.1): stream definitions, the archival
//! watermark, and the per-stream day-presence index. Backed by `sled`,
//! standing in for the BoltDB-class embedded KV the original system used —
//! single-writer semantics, crash-safe commits, no external process.

pub mod segments;

use std::path::Path;

use tracing::warn;

use crate::error::GatewayError;
use crate::model::Stream;

const STREAM_TREE: &str = "stream";
const CONFIG_TREE: &str = "config";

/// Config key holding the archiver's watermark (`YYYYMMDD`).
pub const LAST_ARCHIVING_DATE_KEY: &str = "last_archiving_date";

fn encode_id(id: i64) -> [u8; 8] {
    (id as u64).to_be_bytes()
}

fn decode_id(bytes: &[u8]) -> Option<i64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr) as i64)
}

fn video_tree_name(stream_id: i64) -> String {
    format!("video-{}", stream_id)
}

/// The global catalog: stream table, config, and per-stream day-presence
/// markers. One `sled::Db` per process, opened once at startup.
pub struct Catalog {
    db: sled::Db,
}

impl Catalog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let db = sled::open(path.as_ref())
            .map_err(|e| GatewayError::storage(format!("open catalog: {e}")))?;
        Ok(Self { db })
    }

    /// Scan the `stream` bucket and return every persisted stream with
    /// `status` forced to `Stopped` (spec §4.1 `load_streams`).
    pub fn load_streams(&self) -> Result<Vec<Stream>, GatewayError> {
        let tree = self
            .db
            .open_tree(STREAM_TREE)
            .map_err(|e| GatewayError::storage(format!("open stream tree: {e}")))?;

        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, value) = entry.map_err(|e| GatewayError::storage(e.to_string()))?;
            match serde_json::from_slice::<Stream>(&value) {
                Ok(mut stream) => {
                    stream.reset_runtime_state();
                    out.push(stream);
                }
                Err(e) => {
                    warn!(error = %e, "dropping unreadable stream record from catalog");
                }
            }
        }
        out.sort_by_key(|s| s.id);
        Ok(out)
    }

    pub fn save_stream(&self, stream: &Stream) -> Result<(), GatewayError> {
        let tree = self
            .db
            .open_tree(STREAM_TREE)
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        let value = serde_json::to_vec(stream)?;
        tree.insert(encode_id(stream.id), value)
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        tree.flush().map_err(|e| GatewayError::storage(e.to_string()))?;
        Ok(())
    }

    pub fn delete_stream(&self, id: i64) -> Result<(), GatewayError> {
        let tree = self
            .db
            .open_tree(STREAM_TREE)
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        tree.remove(encode_id(id))
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        tree.flush().map_err(|e| GatewayError::storage(e.to_string()))?;
        self.db
            .drop_tree(video_tree_name(id).as_bytes())
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        Ok(())
    }

    /// Allocate the next stream id from the stream bucket's monotonic
    /// sequence. Ids are never reused, even across deletes.
    pub fn next_stream_id(&self) -> Result<i64, GatewayError> {
        let tree = self
            .db
            .open_tree(STREAM_TREE)
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        let id = tree
            .generate_id()
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        // sled ids start at 0; the original system's bucket sequence starts at 1.
        Ok(id as i64 + 1)
    }

    pub fn get_config(&self, key: &str) -> Result<Option<Vec<u8>>, GatewayError> {
        let tree = self
            .db
            .open_tree(CONFIG_TREE)
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        Ok(tree
            .get(key.as_bytes())
            .map_err(|e| GatewayError::storage(e.to_string()))?
            .map(|v| v.to_vec()))
    }

    pub fn put_config(&self, key: &str, value: &[u8]) -> Result<(), GatewayError> {
        let tree = self
            .db
            .open_tree(CONFIG_TREE)
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        tree.insert(key.as_bytes(), value)
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        tree.flush().map_err(|e| GatewayError::storage(e.to_string()))?;
        Ok(())
    }

    /// Record that `stream_id` has segments on `day` (`YYYYMMDD`).
    pub fn mark_video_day(&self, stream_id: i64, day: &str) -> Result<(), GatewayError> {
        let tree = self
            .db
            .open_tree(video_tree_name(stream_id))
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        tree.insert(day.as_bytes(), &[1u8])
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        Ok(())
    }

    /// Days for which `stream_id` has an indexed or archived segment,
    /// ascending. Backs the supplemented `GET /videos` endpoint.
    pub fn list_video_days(&self, stream_id: i64) -> Result<Vec<String>, GatewayError> {
        let tree = self
            .db
            .open_tree(video_tree_name(stream_id))
            .map_err(|e| GatewayError::storage(e.to_string()))?;
        let mut days = Vec::new();
        for entry in tree.iter() {
            let (key, _) = entry.map_err(|e| GatewayError::storage(e.to_string()))?;
            if let Ok(day) = std::str::from_utf8(&key) {
                days.push(day.to_string());
            }
        }
        days.sort();
        Ok(days)
    }
}
