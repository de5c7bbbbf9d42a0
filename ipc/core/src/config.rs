//! IPC Configuration
//!
//! Per-instance configuration for Connectors and Listeners. The serving
//! toggle that the original CLI exposed as process-wide `--connect` /
//! `--no-connect` flags is injected here at construction time instead, so the
//! core stays testable without touching process arguments.

use std::time::Duration;

/// Configuration injected into every [`Connector`](crate::Connector) and
/// [`Listener`](crate::Listener) at construction.
#[derive(Clone, Debug)]
pub struct IpcConfig {
    /// Whether this instance actively dials/binds.
    ///
    /// When false the instance is a passive stub: operations are accepted and
    /// logged, but no socket is ever touched.
    pub active: bool,

    /// Delay between dial attempts while disconnected.
    ///
    /// The first attempt fires immediately; retries continue at this interval
    /// forever, since the peer process may simply not have started yet.
    pub retry_interval: Duration,

    /// Pacing delay between drain cycles while the outbound queue is
    /// non-empty, so a large backlog interleaves with other event processing
    /// instead of monopolizing the actor.
    pub drain_interval: Duration,

    /// Capacity of the lifecycle event channel handed to the owner.
    pub event_capacity: usize,

    /// Maximum number of queued outbound payloads.
    ///
    /// On overflow the oldest payload is dropped (and logged) so the freshest
    /// data keeps flowing; rejecting the new payload would break the
    /// never-throw send contract.
    pub max_queue: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            active: true,
            retry_interval: Duration::from_millis(2500),
            drain_interval: Duration::from_millis(100),
            event_capacity: 100,
            max_queue: 1024,
        }
    }
}

impl IpcConfig {
    /// Configuration for a passive stub that only logs attempted operations.
    #[must_use]
    pub fn passive() -> Self {
        Self {
            active: false,
            ..Self::default()
        }
    }

    /// Build a configuration from command-line arguments.
    ///
    /// Recognizes the serving toggle flags and ignores everything else:
    /// `--connect` / `-c` enables dialing and binding, `--no-connect` / `-n`
    /// disables it. The last flag wins. Serving is enabled by default.
    #[must_use]
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut config = Self::default();
        for arg in args {
            match arg.as_ref() {
                "--connect" | "-c" => config.active = true,
                "--no-connect" | "-n" => config.active = false,
                _ => {}
            }
        }
        config
    }

    /// Check whether this instance actively serves its channel.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}
