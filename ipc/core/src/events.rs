//! Lifecycle Events
//!
//! Events surfaced to the owning application, and the connection state each
//! instance tracks. Events are delivered in order on a per-instance
//! `mpsc` channel returned at construction; state transitions are additionally
//! observable through a `watch` channel so owners can await them.
//!
//! Payloads are opaque bytes. Framing and serialization above raw bytes are
//! the caller's concern.

/// Lifecycle notification from a Connector or Listener to its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IpcEvent {
    /// A connection to the peer was established.
    Connected,
    /// The peer closed the connection or the local half was torn down.
    Disconnected,
    /// Raw bytes received from the peer.
    Data(Vec<u8>),
    /// A transport error occurred. Recovery is automatic; this is
    /// informational.
    Error(String),
}

/// Connection state of a single Connector or Listener instance.
///
/// Transitions are driven only by transport events (successful accept/dial,
/// end-of-stream, error) or teardown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live peer connection and no dial in progress.
    #[default]
    Disconnected,
    /// Dial attempts are being made on the retry interval.
    Connecting,
    /// A live peer connection exists.
    Connected,
}

impl ConnectionState {
    /// Check whether a live peer connection exists.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_connected());
        assert!(ConnectionState::Connected.is_connected());
    }

    #[test]
    fn test_data_event_carries_raw_bytes() {
        let ev = IpcEvent::Data(b"hello".to_vec());
        assert_eq!(ev, IpcEvent::Data(vec![104, 101, 108, 108, 111]));
    }
}
