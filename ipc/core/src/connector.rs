//! Connector (client role)
//!
//! Maintains a live byte-stream connection to a named channel, retrying
//! indefinitely on failure, and delivers outbound payloads in FIFO order
//! without blocking the caller.
//!
//! Construction spawns an actor task that owns the stream, the outbound queue
//! and the connection state; the [`Connector`] handle talks to it over a
//! command channel. Lifecycle notifications flow back on the event receiver
//! returned by [`Connector::new`].
//!
//! Every failure — dial refused, mid-stream error, peer-initiated close — is
//! treated uniformly: release the transport, flip to `Disconnected`, resume
//! the retry interval. There is no bounded retry count; the peer process may
//! simply not have started yet. Callers needing a gives-up timeout must layer
//! it externally.

use std::io;

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::actor::{drain_due, read_some, write_flush, READ_BUF_SIZE};
use crate::channel::Channel;
use crate::config::IpcConfig;
use crate::events::{ConnectionState, IpcEvent};
use crate::queue::OutboundQueue;

/// Commands from the handle to the actor task.
enum Command {
    StartConnecting,
    Send(Vec<u8>),
}

/// What woke the actor loop up.
enum Wake {
    Cmd(Option<Command>),
    Retry,
    Read(io::Result<usize>),
    Drain,
}

/// The dialing (client) role of the IPC layer.
///
/// Dropping the handle closes the command channel and ends the actor task,
/// tearing down any live connection.
pub struct Connector {
    channel: Channel,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Connector {
    /// Create a connector for `channel` in `Disconnected` state with an empty
    /// queue, returning the handle and its lifecycle event receiver.
    ///
    /// No dialing happens until [`start_connecting`](Self::start_connecting)
    /// is called. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(channel: Channel, config: IpcConfig) -> (Self, mpsc::Receiver<IpcEvent>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        tracing::debug!(
            channel = %channel,
            path = ?channel.socket_path(),
            "constructing connector"
        );

        let queue = OutboundQueue::new(config.max_queue);
        let task = ConnectorTask {
            channel: channel.clone(),
            config,
            cmd_rx,
            event_tx,
            state_tx,
            queue,
            reader: None,
            writer: None,
            retry: None,
            drain_at: None,
        };
        tokio::spawn(task.run());

        (
            Self {
                channel,
                cmd_tx,
                state_rx,
            },
            event_rx,
        )
    }

    /// Begin dialing the channel on the retry interval until a connection
    /// succeeds.
    ///
    /// Idempotent: calling it while already retrying restarts the interval
    /// rather than stacking timers. A no-op while connected, or when the
    /// instance is passive.
    pub fn start_connecting(&self) {
        if self.cmd_tx.send(Command::StartConnecting).is_err() {
            tracing::debug!(channel = %self.channel, "connector task gone");
        }
    }

    /// Enqueue a payload for delivery.
    ///
    /// Never returns an error. While disconnected the payload is accepted
    /// into the queue and delivered, in order, once the connection is
    /// (re-)established; the contract is "accepted into queue", not
    /// "confirmed delivered".
    pub fn send(&self, payload: impl Into<Vec<u8>>) {
        if self.cmd_tx.send(Command::Send(payload.into())).is_err() {
            tracing::debug!(channel = %self.channel, "connector task gone, payload dropped");
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Check whether a live peer connection exists.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Wait until the connector reaches `Connected`.
    pub async fn wait_connected(&self) {
        let mut rx = self.state_rx.clone();
        let _ = rx.wait_for(|s| s.is_connected()).await;
    }

    /// The channel this connector dials.
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

/// Actor owning the stream, queue and state for one connector.
struct ConnectorTask {
    channel: Channel,
    config: IpcConfig,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<IpcEvent>,
    state_tx: watch::Sender<ConnectionState>,
    queue: OutboundQueue,
    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    retry: Option<Interval>,
    drain_at: Option<Instant>,
}

impl ConnectorTask {
    async fn run(mut self) {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let wake = {
                let cmd_rx = &mut self.cmd_rx;
                let retry = &mut self.retry;
                let reader = &mut self.reader;
                let drain_at = self.drain_at;
                tokio::select! {
                    cmd = cmd_rx.recv() => Wake::Cmd(cmd),
                    () = retry_tick(retry) => Wake::Retry,
                    res = read_some(reader, &mut buf) => Wake::Read(res),
                    () = drain_due(drain_at) => Wake::Drain,
                }
            };
            match wake {
                // Handle dropped; the actor ends and the connection with it.
                Wake::Cmd(None) => break,
                Wake::Cmd(Some(Command::StartConnecting)) => self.start_retrying(),
                Wake::Cmd(Some(Command::Send(payload))) => self.enqueue(payload),
                Wake::Retry => self.attempt_dial().await,
                Wake::Read(res) => self.handle_read(res, &buf).await,
                Wake::Drain => self.drain_one().await,
            }
        }
        tracing::debug!(channel = %self.channel, "connector task ended");
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    async fn emit(&self, event: IpcEvent) {
        if self.event_tx.send(event).await.is_err() {
            tracing::debug!(channel = %self.channel, "event receiver dropped");
        }
    }

    fn start_retrying(&mut self) {
        if !self.config.active {
            tracing::info!(channel = %self.channel, "serving disabled, not dialing");
            return;
        }
        if self.state().is_connected() {
            tracing::debug!(channel = %self.channel, "already connected");
            return;
        }
        // A fresh interval replaces any prior one; timers never stack.
        let mut interval = tokio::time::interval(self.config.retry_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.retry = Some(interval);
        self.set_state(ConnectionState::Connecting);
        tracing::debug!(channel = %self.channel, "dialing on retry interval");
    }

    async fn attempt_dial(&mut self) {
        tracing::debug!(channel = %self.channel, "connecting");
        match UnixStream::connect(self.channel.socket_path()).await {
            Ok(stream) => {
                let (read_half, write_half) = stream.into_split();
                self.reader = Some(read_half);
                self.writer = Some(write_half);
                // A successful connect cancels the retry interval.
                self.retry = None;
                self.set_state(ConnectionState::Connected);
                tracing::info!(channel = %self.channel, "connected");
                self.emit(IpcEvent::Connected).await;
                if !self.queue.is_empty() {
                    // Flush the backlog queued while disconnected.
                    self.drain_at = Some(Instant::now());
                }
            }
            Err(e) => {
                // Peer not up yet; keep retrying on the interval.
                tracing::debug!(channel = %self.channel, error = %e, "dial failed");
            }
        }
    }

    fn enqueue(&mut self, payload: Vec<u8>) {
        if !self.config.active {
            tracing::info!(channel = %self.channel, "serving disabled, dropping payload");
            return;
        }
        if !self.state().is_connected() {
            tracing::warn!(
                channel = %self.channel,
                queued = self.queue.len() + 1,
                "not connected, payload queued until reconnect"
            );
        }
        self.queue.push(payload, None);
        if self.state().is_connected() && self.drain_at.is_none() {
            // Schedule a drain as soon as control yields; a burst of sends
            // coalesces into one cycle.
            self.drain_at = Some(Instant::now());
        }
    }

    async fn drain_one(&mut self) {
        self.drain_at = None;
        let Some(writer) = self.writer.as_mut() else {
            // Torn down between scheduling and firing; the queue keeps the
            // backlog for the next connection.
            return;
        };
        let Some(item) = self.queue.pop() else {
            return;
        };
        match write_flush(writer, &item.payload).await {
            Ok(()) => {
                item.complete();
                if !self.queue.is_empty() {
                    self.drain_at = Some(Instant::now() + self.config.drain_interval);
                }
            }
            Err(e) => {
                tracing::warn!(channel = %self.channel, error = %e, "write failed");
                item.complete();
                self.emit(IpcEvent::Error(e.to_string())).await;
                self.teardown().await;
            }
        }
    }

    async fn handle_read(&mut self, res: io::Result<usize>, buf: &[u8]) {
        match res {
            Ok(0) => {
                tracing::info!(channel = %self.channel, "peer ended communication");
                self.teardown().await;
            }
            Ok(n) => {
                tracing::trace!(channel = %self.channel, bytes = n, "received data");
                self.emit(IpcEvent::Data(buf[..n].to_vec())).await;
            }
            Err(e) => {
                tracing::warn!(channel = %self.channel, error = %e, "read error");
                self.emit(IpcEvent::Error(e.to_string())).await;
                self.teardown().await;
            }
        }
    }

    /// Uniform recovery: release the transport, flip to `Disconnected` and
    /// resume the retry interval. The outbound queue is retained.
    async fn teardown(&mut self) {
        self.reader = None;
        self.writer = None;
        self.drain_at = None;
        self.set_state(ConnectionState::Disconnected);
        self.emit(IpcEvent::Disconnected).await;
        self.start_retrying();
    }
}

/// Tick the retry interval, or wait forever if retrying is not active.
async fn retry_tick(retry: &mut Option<Interval>) {
    match retry {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
