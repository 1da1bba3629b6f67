//! Per-stream segment index: a `stream-<id>.db` file with one bucket per
//! day (`YYYYMMDD`), `seq_id -> Segment` ordered ascending (spec §4.1, §8
//! invariant 2). Opening acquires an exclusive lock on the file with a
//! 1-second timeout; sled does not expose a blocking-open timeout directly,
//! so we poll it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::GatewayError;
use crate::model::Segment;

const OPEN_LOCK_TIMEOUT: Duration = Duration::from_secs(1);
const OPEN_LOCK_POLL: Duration = Duration::from_millis(50);

fn encode_seq(seq_id: i64) -> [u8; 8] {
    (seq_id as u64).to_be_bytes()
}

/// Per-stream KV handle, owned exclusively by that stream's Assistant
/// (writes) and shared for playlist reads.
pub struct SegmentStore {
    db: sled::Db,
    path: PathBuf,
}

impl SegmentStore {
    /// Open (creating if absent) the per-stream catalog file for `stream_id`
    /// under `base_dir`. Retries on lock contention up to
    /// [`OPEN_LOCK_TIMEOUT`]; a caller that still can't acquire the lock
    /// gets a `storage` error (spec §4.1: "startable-but-degraded").
    pub fn open(base_dir: impl AsRef<Path>, stream_id: i64) -> Result<Self, GatewayError> {
        let path = base_dir.as_ref().join(format!("stream-{}.db", stream_id));
        let deadline = Instant::now() + OPEN_LOCK_TIMEOUT;

        loop {
            match sled::open(&path) {
                Ok(db) => return Ok(Self { db, path }),
                Err(e) if is_lock_contention(&e) && Instant::now() < deadline => {
                    std::thread::sleep(OPEN_LOCK_POLL);
                }
                Err(e) => {
                    return Err(GatewayError::storage(format!(
                        "open per-stream catalog {}: {e}",
                        path.display()
                    )))
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist every segment from one Assistant tick in a single
    /// transaction. Duplicate `(day, seq_id)` keys overwrite in place.
    pub fn put_segments(&self, day: &str, segs: &[Segment]) -> Result<(), GatewayError> {
        let tree = self
            .db
            .open_tree(day.as_bytes())
            .map_err(|e| GatewayError::storage(e.to_string()))?;

        tree.transaction(|tx| {
            for seg in segs {
                let value = serde_json::to_vec(seg).map_err(|e| {
                    sled::transaction::ConflictableTransactionError::Abort(e.to_string())
                })?;
                tx.insert(&encode_seq(seg.seq_id), value)?;
            }
            Ok(())
        })
        .map_err(|e: sled::transaction::TransactionError<String>| {
            GatewayError::storage(e.to_string())
        })?;

        tree.flush().map_err(|e| GatewayError::storage(e.to_string()))?;
        Ok(())
    }

    /// Segments for `day`, strictly ascending by `seq_id`.
    pub fn iter_segments(&self, day: &str) -> Result<Vec<Segment>, GatewayError> {
        let tree = self
            .db
            .open_tree(day.as_bytes())
            .map_err(|e| GatewayError::storage(e.to_string()))?;

        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, value) = entry.map_err(|e| GatewayError::storage(e.to_string()))?;
            out.push(serde_json::from_slice::<Segment>(&value)?);
        }
        Ok(out)
    }

    /// Days with at least one persisted segment, ascending.
    pub fn days(&self) -> Result<Vec<String>, GatewayError> {
        let mut names: Vec<String> = self
            .db
            .tree_names()
            .into_iter()
            .filter_map(|n| String::from_utf8(n.to_vec()).ok())
            .filter(|n| n.len() == 8 && n.chars().all(|c| c.is_ascii_digit()))
            .collect();
        names.sort();
        Ok(names)
    }
}

fn is_lock_contention(err: &sled::Error) -> bool {
    matches!(err, sled::Error::Io(io_err) if io_err.kind() == std::io::ErrorKind::WouldBlock)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(seq_id: i64) -> Segment {
        Segment {
            seq_id,
            duration: 1.0,
            uri: format!("media{}.ts", seq_id),
            recorded_at: 1_700_000_000,
        }
    }

    #[test]
    fn segments_come_back_ascending_by_seq_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::open(dir.path(), 1).unwrap();
        store.put_segments("20260101", &[seg(9), seg(7), seg(8)]).unwrap();

        let segs = store.iter_segments("20260101").unwrap();
        let ids: Vec<i64> = segs.iter().map(|s| s.seq_id).collect();
        assert_eq!(ids, vec![7, 8, 9]);
    }

    #[test]
    fn writing_the_same_segment_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::open(dir.path(), 1).unwrap();
        store.put_segments("20260101", &[seg(7)]).unwrap();
        store.put_segments("20260101", &[seg(7)]).unwrap();

        let segs = store.iter_segments("20260101").unwrap();
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn days_lists_only_day_shaped_trees() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::open(dir.path(), 1).unwrap();
        store.put_segments("20260101", &[seg(1)]).unwrap();
        store.put_segments("20260103", &[seg(2)]).unwrap();
        assert_eq!(store.days().unwrap(), vec!["20260101", "20260103"]);
    }
}
