//! Listener (server role)
//!
//! Binds a named channel, accepts at most one meaningful peer connection at a
//! time, and delivers outbound payloads to that peer with backpressure
//! awareness.
//!
//! Construction is eager: [`Listener::bind`] cleans up any stale socket file,
//! binds, starts listening and spawns the actor before returning. A newly
//! accepted connection supersedes the previous peer stream, which is shut
//! down explicitly rather than leaked.
//!
//! Bind failures are fatal to the Listener; per-connection errors are logged
//! and surfaced as events without disturbing the accept loop.

use std::io;
use std::os::unix::fs::PermissionsExt;

use tokio::io::AsyncWriteExt;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use crate::actor::{drain_due, read_some, write_flush, READ_BUF_SIZE};
use crate::channel::Channel;
use crate::config::IpcConfig;
use crate::error::IpcError;
use crate::events::{ConnectionState, IpcEvent};
use crate::queue::OutboundQueue;

/// Commands from the handle to the actor task.
enum Command {
    Write {
        payload: Vec<u8>,
        done: oneshot::Sender<()>,
    },
}

/// What woke the actor loop up.
enum Wake {
    Cmd(Option<Command>),
    Accept(io::Result<UnixStream>),
    Read(io::Result<usize>),
    Drain,
}

/// The binding (server) role of the IPC layer.
///
/// Dropping the handle ends the actor task, which removes the socket file.
pub struct Listener {
    channel: Channel,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Listener {
    /// Bind `channel` and start serving immediately, returning the handle and
    /// its lifecycle event receiver.
    ///
    /// Any stale socket file left by a previous, uncleanly-terminated
    /// instance is removed first (best effort). The bound socket is created
    /// with mode 0600. When the instance is passive no socket is touched.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Bind`] if the socket cannot be bound. The Listener
    /// does not retry binding.
    pub fn bind(
        channel: Channel,
        config: IpcConfig,
    ) -> Result<(Self, mpsc::Receiver<IpcEvent>), IpcError> {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let listener = if config.active {
            Some(bind_socket(&channel)?)
        } else {
            tracing::info!(channel = %channel, "serving disabled, listener is passive");
            None
        };

        let queue = OutboundQueue::new(config.max_queue);
        let task = ListenerTask {
            channel: channel.clone(),
            config,
            listener,
            cmd_rx,
            event_tx,
            state_tx,
            queue,
            reader: None,
            writer: None,
            drain_at: None,
        };
        tokio::spawn(task.run());

        Ok((
            Self {
                channel,
                cmd_tx,
                state_rx,
            },
            event_rx,
        ))
    }

    /// Queue a payload for the current peer and receive a flush completion.
    ///
    /// The completion resolves once the payload has been fully handed to the
    /// transport; a full kernel buffer defers it until the transport drains.
    /// When no peer is connected the attempt is logged, the payload dropped,
    /// and the completion resolves promptly — the caller is never left
    /// hanging.
    pub fn write(&self, payload: impl Into<Vec<u8>>) -> oneshot::Receiver<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let cmd = Command::Write {
            payload: payload.into(),
            done: done_tx,
        };
        if let Err(err) = self.cmd_tx.send(cmd) {
            tracing::warn!(channel = %self.channel, "listener task gone, dropping payload");
            let Command::Write { done, .. } = err.0;
            let _ = done.send(());
        }
        done_rx
    }

    /// Fire-and-forget variant of [`write`](Self::write).
    pub fn send(&self, payload: impl Into<Vec<u8>>) {
        drop(self.write(payload));
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Check whether a peer is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The channel this listener serves.
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

/// Prepare the socket path and bind: create the parent directory, remove any
/// stale socket file, bind, restrict permissions.
fn bind_socket(channel: &Channel) -> Result<UnixListener, IpcError> {
    let path = channel.socket_path();

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|source| IpcError::Bind {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    // A leftover socket from a crashed prior instance must not block
    // re-binding. Removal is best effort; bind reports the hard failure.
    if path.exists() {
        tracing::warn!(path = ?path, "removing stale socket file");
        if let Err(e) = std::fs::remove_file(path) {
            tracing::error!(path = ?path, error = %e, "failed to remove stale socket file");
        }
    }

    let listener = UnixListener::bind(path).map_err(|source| IpcError::Bind {
        path: path.to_path_buf(),
        source,
    })?;

    // Owner-only access; peers are same-user processes.
    let perms = std::fs::Permissions::from_mode(0o600);
    if let Err(e) = std::fs::set_permissions(path, perms) {
        tracing::warn!(path = ?path, error = %e, "failed to restrict socket permissions");
    }

    tracing::info!(channel = %channel, path = ?path, "listening");
    Ok(listener)
}

/// Validate that the connecting process runs as the same user, via
/// `SO_PEERCRED`.
#[cfg(target_os = "linux")]
fn peer_allowed(stream: &UnixStream) -> bool {
    use std::os::unix::io::AsRawFd;

    let fd = stream.as_raw_fd();
    let mut cred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    let result = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            std::ptr::addr_of_mut!(cred).cast::<libc::c_void>(),
            &mut len,
        )
    };
    if result != 0 {
        tracing::warn!("failed to read peer credentials, rejecting connection");
        return false;
    }

    let my_uid = unsafe { libc::getuid() };
    if cred.uid != my_uid {
        tracing::warn!(
            peer_uid = cred.uid,
            my_uid = my_uid,
            "rejecting connection from different user"
        );
        return false;
    }

    tracing::debug!(peer_uid = cred.uid, peer_pid = cred.pid, "peer validated");
    true
}

/// Non-Linux fallback: rely on the 0600 socket permissions.
#[cfg(not(target_os = "linux"))]
fn peer_allowed(_stream: &UnixStream) -> bool {
    tracing::debug!("peer validation skipped (non-Linux platform)");
    true
}

/// Actor owning the bound socket, the peer stream, queue and state for one
/// listener.
struct ListenerTask {
    channel: Channel,
    config: IpcConfig,
    listener: Option<UnixListener>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::Sender<IpcEvent>,
    state_tx: watch::Sender<ConnectionState>,
    queue: OutboundQueue,
    reader: Option<OwnedReadHalf>,
    writer: Option<OwnedWriteHalf>,
    drain_at: Option<Instant>,
}

impl ListenerTask {
    async fn run(mut self) {
        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let wake = {
                let cmd_rx = &mut self.cmd_rx;
                let listener = &self.listener;
                let reader = &mut self.reader;
                let drain_at = self.drain_at;
                tokio::select! {
                    cmd = cmd_rx.recv() => Wake::Cmd(cmd),
                    res = accept_next(listener) => Wake::Accept(res),
                    res = read_some(reader, &mut buf) => Wake::Read(res),
                    () = drain_due(drain_at) => Wake::Drain,
                }
            };
            match wake {
                // Handle dropped; stop serving.
                Wake::Cmd(None) => break,
                Wake::Cmd(Some(Command::Write { payload, done })) => {
                    self.handle_write(payload, done);
                }
                Wake::Accept(Ok(stream)) => self.adopt_peer(stream).await,
                Wake::Accept(Err(e)) => {
                    tracing::error!(channel = %self.channel, error = %e, "accept failed");
                    self.emit(IpcEvent::Error(e.to_string())).await;
                }
                Wake::Read(res) => self.handle_read(res, &buf).await,
                Wake::Drain => self.drain_one().await,
            }
        }
        self.queue.abandon();
        if self.listener.is_some() {
            let _ = std::fs::remove_file(self.channel.socket_path());
        }
        tracing::debug!(channel = %self.channel, "listener task ended");
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

    /// Adopt a newly accepted connection as the current peer stream.
    async fn adopt_peer(&mut self, stream: UnixStream) {
        if !peer_allowed(&stream) {
            return;
        }
        if let Some(old) = self.writer.as_mut() {
            // At most one active peer: shut the superseded stream down
            // explicitly instead of leaking a dangling handle.
            tracing::info!(channel = %self.channel, "new peer supersedes the current stream");
            let _ = old.shutdown().await;
        }
        let (read_half, write_half) = stream.into_split();
        self.reader = Some(read_half);
        self.writer = Some(write_half);
        self.set_state(ConnectionState::Connected);
        tracing::info!(channel = %self.channel, "peer connected");
        self.emit(IpcEvent::Connected).await;
        if !self.queue.is_empty() {
            self.drain_at = Some(Instant::now());
        }
    }

    fn handle_write(&mut self, payload: Vec<u8>, done: oneshot::Sender<()>) {
        if self.state().is_connected() && self.writer.is_some() {
            self.queue.push(payload, Some(done));
            if self.drain_at.is_none() {
                self.drain_at = Some(Instant::now());
            }
        } else {
            if self.config.active {
                tracing::warn!(channel = %self.channel, "no peer connected, dropping payload");
            } else {
                tracing::info!(channel = %self.channel, "serving disabled, dropping payload");
            }
            // The completion still fires; the caller is never left hanging.
            let _ = done.send(());
        }
    }

    async fn drain_one(&mut self) {
        self.drain_at = None;
        let Some(writer) = self.writer.as_mut() else {
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
                tracing::warn!(channel = %self.channel, error = %e, "write to peer failed");
                item.complete();
                self.emit(IpcEvent::Error(e.to_string())).await;
                self.drop_peer().await;
            }
        }
    }

    async fn handle_read(&mut self, res: io::Result<usize>, buf: &[u8]) {
        match res {
            Ok(0) => {
                tracing::info!(channel = %self.channel, "peer disconnected");
                self.drop_peer().await;
            }
            Ok(n) => {
                tracing::trace!(channel = %self.channel, bytes = n, "received data");
                self.emit(IpcEvent::Data(buf[..n].to_vec())).await;
            }
            Err(e) => {
                tracing::warn!(channel = %self.channel, error = %e, "error in peer stream");
                self.emit(IpcEvent::Error(e.to_string())).await;
                self.drop_peer().await;
            }
        }
    }

    /// Release the current peer stream and wait for the next accept. There is
    /// no listener-side retry; pending payloads cannot outlive their
    /// connection.
    async fn drop_peer(&mut self) {
        self.reader = None;
        self.writer = None;
        self.drain_at = None;
        self.queue.abandon();
        self.set_state(ConnectionState::Disconnected);
        self.emit(IpcEvent::Disconnected).await;
    }
}

/// Accept the next connection, or wait forever when passive.
async fn accept_next(listener: &Option<UnixListener>) -> io::Result<UnixStream> {
    match listener {
        Some(l) => l.accept().await.map(|(stream, _addr)| stream),
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::time::timeout;

    fn fast_config() -> IpcConfig {
        IpcConfig {
            drain_interval: Duration::from_millis(5),
            ..IpcConfig::default()
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<IpcEvent>) -> IpcEvent {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_bind_creates_owner_only_socket() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "world");

        let (_listener, _events) = Listener::bind(channel.clone(), fast_config()).unwrap();

        assert!(channel.socket_path().exists());
        let mode = std::fs::metadata(channel.socket_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_bind_cleans_up_stale_socket() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "stale");

        // A crashed prior instance leaves its socket file behind.
        let stale = std::os::unix::net::UnixListener::bind(channel.socket_path()).unwrap();
        drop(stale);
        assert!(channel.socket_path().exists());

        let result = Listener::bind(channel.clone(), fast_config());
        assert!(result.is_ok(), "stale socket file blocked re-binding");
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        // Put a plain file where the parent directory should be.
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let channel = Channel::in_dir(&blocker, "world");

        let result = Listener::bind(channel, fast_config());
        assert!(matches!(result, Err(IpcError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_write_completes_without_peer() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "lonely");

        let (listener, _events) = Listener::bind(channel, fast_config()).unwrap();

        let done = listener.write(&b"nobody home"[..]);
        timeout(Duration::from_secs(1), done)
            .await
            .expect("completion never fired")
            .expect("completion dropped");
    }

    #[tokio::test]
    async fn test_write_delivers_and_completes() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "deliver");

        let (listener, mut events) = Listener::bind(channel.clone(), fast_config()).unwrap();
        let mut client = UnixStream::connect(channel.socket_path()).await.unwrap();
        assert_eq!(next_event(&mut events).await, IpcEvent::Connected);
        assert!(listener.is_connected());

        let done = listener.write(&b"hello"[..]);
        timeout(Duration::from_secs(1), done)
            .await
            .unwrap()
            .unwrap();

        let mut got = [0u8; 5];
        timeout(Duration::from_secs(1), client.read_exact(&mut got))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&got, b"hello");
    }

    #[tokio::test]
    async fn test_writes_stay_fifo() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "order");

        let (listener, mut events) = Listener::bind(channel.clone(), fast_config()).unwrap();
        let mut client = UnixStream::connect(channel.socket_path()).await.unwrap();
        assert_eq!(next_event(&mut events).await, IpcEvent::Connected);

        listener.send(&b"p1"[..]);
        listener.send(&b"p2"[..]);
        listener.send(&b"p3"[..]);

        let mut got = [0u8; 6];
        timeout(Duration::from_secs(2), client.read_exact(&mut got))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&got, b"p1p2p3");
    }

    #[tokio::test]
    async fn test_data_event_from_peer() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "inbound");

        let (_listener, mut events) = Listener::bind(channel.clone(), fast_config()).unwrap();
        let mut client = UnixStream::connect(channel.socket_path()).await.unwrap();
        assert_eq!(next_event(&mut events).await, IpcEvent::Connected);

        client.write_all(b"ping").await.unwrap();
        assert_eq!(next_event(&mut events).await, IpcEvent::Data(b"ping".to_vec()));
    }

    #[tokio::test]
    async fn test_new_peer_supersedes_old() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "replace");

        let (listener, mut events) = Listener::bind(channel.clone(), fast_config()).unwrap();
        let mut first = UnixStream::connect(channel.socket_path()).await.unwrap();
        assert_eq!(next_event(&mut events).await, IpcEvent::Connected);

        let mut second = UnixStream::connect(channel.socket_path()).await.unwrap();
        assert_eq!(next_event(&mut events).await, IpcEvent::Connected);

        // The superseded stream is closed, not leaked: the first client
        // observes end-of-stream.
        let mut buf = [0u8; 1];
        let n = timeout(Duration::from_secs(1), first.read(&mut buf))
            .await
            .expect("old peer was left dangling")
            .unwrap();
        assert_eq!(n, 0);

        // Writes now reach the new peer.
        listener.send(&b"x"[..]);
        let mut got = [0u8; 1];
        timeout(Duration::from_secs(1), second.read_exact(&mut got))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&got, b"x");
    }

    #[tokio::test]
    async fn test_peer_disconnect_is_nonfatal() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "comeback");

        let (_listener, mut events) = Listener::bind(channel.clone(), fast_config()).unwrap();

        let client = UnixStream::connect(channel.socket_path()).await.unwrap();
        assert_eq!(next_event(&mut events).await, IpcEvent::Connected);
        drop(client);
        assert_eq!(next_event(&mut events).await, IpcEvent::Disconnected);

        // The listener simply waits for the next accept.
        let _client = UnixStream::connect(channel.socket_path()).await.unwrap();
        assert_eq!(next_event(&mut events).await, IpcEvent::Connected);
    }

    #[tokio::test]
    async fn test_passive_listener_never_binds() {
        let temp_dir = TempDir::new().unwrap();
        let channel = Channel::in_dir(temp_dir.path(), "passive");

        let (listener, _events) = Listener::bind(channel.clone(), IpcConfig::passive()).unwrap();

        assert!(!channel.socket_path().exists());
        let done = listener.write(&b"ignored"[..]);
        timeout(Duration::from_secs(1), done)
            .await
            .expect("completion never fired")
            .expect("completion dropped");
    }
}
