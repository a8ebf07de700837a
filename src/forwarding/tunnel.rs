// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bidirectional relay between a local socket and a remote channel.
//!
//! Both directions copy concurrently. End-of-stream on one side is passed on
//! as a write shutdown to the other, and the relay finishes once both
//! directions have stopped or either one fails.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Transfer totals of one relay, including one that ended in an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub bytes_local_to_remote: u64,
    pub bytes_remote_to_local: u64,
    pub duration: Duration,
}

impl TunnelStats {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_local_to_remote + self.bytes_remote_to_local
    }
}

/// Errors that mean the peer went away rather than something broke.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Stream wrapper counting bytes read from and written to the inner stream.
struct Counted<S> {
    inner: S,
    read: u64,
    written: u64,
}

impl<S> Counted<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            read: 0,
            written: 0,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Counted<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            self.read += (buf.filled().len() - before) as u64;
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Counted<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = poll {
            self.written += n as u64;
        }
        poll
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Relay until both directions finish, either side errors, or `cancel` fires.
/// Both ends are shut down before returning.
///
/// The stats count whatever crossed the local side, also when the relay
/// ended in an error. Cancellation is reported as `Interrupted`.
pub async fn relay<L, R>(
    local: L,
    mut remote: R,
    cancel: CancellationToken,
) -> (TunnelStats, io::Result<()>)
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let started_at = Instant::now();
    let mut local = Counted::new(local);

    let result = tokio::select! {
        copied = tokio::io::copy_bidirectional(&mut local, &mut remote) => copied.map(|_| ()),
        _ = cancel.cancelled() => {
            trace!("Relay cancelled");
            Err(io::Error::new(io::ErrorKind::Interrupted, "relay cancelled"))
        }
    };

    let _ = local.shutdown().await;
    let _ = remote.shutdown().await;

    let stats = TunnelStats {
        bytes_local_to_remote: local.read,
        bytes_remote_to_local: local.written,
        duration: started_at.elapsed(),
    };
    (stats, result)
}
