//! IPC Errors
//!
//! The layer deliberately exposes almost no fallible surface: dial failures
//! are retried forever, mid-stream errors become events, and sends never
//! return errors. The one hard failure is a Listener that cannot bind its
//! socket.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the IPC layer.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The Listener could not bind its socket path.
    ///
    /// Fatal to that Listener; it does not retry binding.
    #[error("failed to bind socket at {path:?}: {source}")]
    Bind {
        /// The socket path that could not be bound.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
