//! dplayer IPC - Resilient Unix Domain Socket Layer
//!
//! This crate connects cooperating dplayer processes on the same host (the
//! backend and the rendering/display process) over Unix domain sockets,
//! without a network stack. It owns the real systems problems of that link —
//! connection lifecycle, automatic reconnection, outbound FIFO queueing, and
//! write backpressure — so application code can treat the channel as a plain
//! byte pipe.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                      ┌──────────────────┐
//! │  backend process │                      │ renderer process │
//! │                  │                      │                  │
//! │    Connector ────┼─────────────────────►├──── Listener     │
//! │                  │   /tmp/<name>.sock   │                  │
//! │  send(bytes) ───►│                      │◄─── write(bytes) │
//! │  ◄── IpcEvent    │                      │    IpcEvent ──►  │
//! └──────────────────┘                      └──────────────────┘
//! ```
//!
//! Both roles are actors: construction spawns a task owning the socket, the
//! outbound queue and the connection state. The handle enqueues work without
//! blocking; lifecycle notifications ([`IpcEvent`]) arrive on the receiver
//! returned at construction, and state is observable via
//! [`Connector::state`] / [`Listener::state`].
//!
//! # Contract
//!
//! - Payloads are opaque bytes; framing and serialization are the caller's
//!   concern.
//! - `send` never returns an error. A Connector queues payloads while
//!   disconnected and flushes them in order on reconnect; a Listener logs and
//!   drops, but its write completion always fires.
//! - A Connector retries forever. The peer process may simply not have
//!   started yet; callers needing a gives-up timeout layer it externally.
//!
//! # Quick Start
//!
//! ```no_run
//! use dplayer_ipc::{Channel, Connector, IpcConfig, IpcEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let channel = Channel::new("renderer");
//!     let (connector, mut events) = Connector::new(channel, IpcConfig::default());
//!     connector.start_connecting();
//!
//!     connector.send(&b"play"[..]);
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             IpcEvent::Connected => println!("link up"),
//!             IpcEvent::Data(bytes) => println!("got {} bytes", bytes.len()),
//!             IpcEvent::Disconnected => println!("link down, retrying"),
//!             IpcEvent::Error(e) => eprintln!("transport error: {e}"),
//!         }
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod actor;
pub mod channel;
pub mod config;
pub mod connector;
pub mod error;
pub mod events;
pub mod listener;
mod queue;

// Re-exports for convenience
pub use channel::{Channel, SOCKET_DIR, SOCKET_SUFFIX};
pub use config::IpcConfig;
pub use connector::Connector;
pub use error::IpcError;
pub use events::{ConnectionState, IpcEvent};
pub use listener::Listener;
