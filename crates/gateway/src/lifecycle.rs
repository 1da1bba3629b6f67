//! Stream lifecycle state machine (spec §4.3). A pure guard over
//! [`StreamState`](crate::model::StreamState) transitions; the Manager calls
//! these while holding the stream-table write lock, then releases the lock
//! before doing the slow work (spawn, liveness wait, KV I/O).

use crate::error::GatewayError;
use crate::model::StreamState;

/// Origin of a lifecycle request, carried through for logging (spec §4.5,
/// §7: watchdog-initiated failures are logged and retried, never surfaced).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Operator,
    Watcher,
}

impl Origin {
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Operator => "operator",
            Origin::Watcher => "watcher",
        }
    }
}

/// Check whether `start` is legal against `current`, without mutating it.
/// Returns the next state (`Starting`) on success.
pub fn guard_start(current: StreamState) -> Result<StreamState, GatewayError> {
    match current {
        StreamState::Stopped | StreamState::Failed => Ok(StreamState::Starting),
        StreamState::Starting | StreamState::Started | StreamState::Stopping => {
            Err(GatewayError::conflict(format!(
                "cannot start stream in state {:?}",
                current
            )))
        }
    }
}

/// Check whether `stop` is legal against `current`. `Stopped` is a
/// successful no-op (returns `None`); `Starting` is rejected because the
/// caller must wait for liveness or the deadline.
pub fn guard_stop(current: StreamState) -> Result<Option<StreamState>, GatewayError> {
    match current {
        StreamState::Stopped => Ok(None),
        StreamState::Started | StreamState::Failed => Ok(Some(StreamState::Stopping)),
        StreamState::Starting => Err(GatewayError::conflict(
            "cannot stop stream while starting; wait for it to finish".to_string(),
        )),
        StreamState::Stopping => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_rejects_in_flight_states() {
        assert!(guard_start(StreamState::Starting).is_err());
        assert!(guard_start(StreamState::Started).is_err());
        assert!(guard_start(StreamState::Stopping).is_err());
    }

    #[test]
    fn start_allowed_from_stopped_and_failed() {
        assert_eq!(guard_start(StreamState::Stopped).unwrap(), StreamState::Starting);
        assert_eq!(guard_start(StreamState::Failed).unwrap(), StreamState::Starting);
    }

    #[test]
    fn stop_against_stopped_is_a_no_op() {
        assert_eq!(guard_stop(StreamState::Stopped).unwrap(), None);
    }

    #[test]
    fn stop_against_starting_is_rejected() {
        assert!(guard_stop(StreamState::Starting).is_err());
    }

    #[test]
    fn stop_against_started_transitions_to_stopping() {
        assert_eq!(
            guard_stop(StreamState::Started).unwrap(),
            Some(StreamState::Stopping)
        );
    }
}
