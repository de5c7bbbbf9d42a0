//! Await helpers shared by the connector and listener actor loops.
//!
//! Both actors multiplex over optional resources (a peer stream that may not
//! exist yet, a drain cycle that may not be scheduled). These helpers turn an
//! absent resource into a future that never resolves, so the select arms stay
//! unconditional.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::Instant;

/// Read buffer size for peer streams.
pub(crate) const READ_BUF_SIZE: usize = 4096;

/// Read a chunk from the peer stream, or wait forever if there is none.
pub(crate) async fn read_some(
    reader: &mut Option<OwnedReadHalf>,
    buf: &mut [u8],
) -> io::Result<usize> {
    match reader {
        Some(r) => r.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Wait until the scheduled drain deadline, or forever if none is scheduled.
pub(crate) async fn drain_due(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Write a whole payload and flush it to the transport.
///
/// `write_all` suspends while the kernel socket buffer is full, so returning
/// `Ok` means the payload has been fully handed to the transport — this is the
/// drain signal a backpressured write completion waits for.
pub(crate) async fn write_flush(writer: &mut OwnedWriteHalf, payload: &[u8]) -> io::Result<()> {
    writer.write_all(payload).await?;
    writer.flush().await
}
