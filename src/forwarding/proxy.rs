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

//! Local listener that proxies every accepted connection to a remote endpoint.
//!
//! Each connection gets its own channel over the shared transport. A channel
//! that fails to open drops just that connection; an accept error ends the
//! whole proxy.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};

use super::tunnel::{is_disconnect, relay, TunnelStats};
use crate::error::{Error, Result};
use crate::ssh::provider::{Endpoint, Transport};

/// Counters shared by the accept loop and connection tasks.
#[derive(Debug, Default)]
struct ProxyCounters {
    accepted: AtomicU64,
    active: AtomicU64,
    failed: AtomicU64,
    bytes_local_to_remote: AtomicU64,
    bytes_remote_to_local: AtomicU64,
}

/// Point-in-time copy of a proxy's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyStats {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub connections_failed: u64,
    pub bytes_local_to_remote: u64,
    pub bytes_remote_to_local: u64,
}

/// Bind a local TCP listener for a proxy.
pub async fn bind(address: &str) -> Result<TcpListener> {
    TcpListener::bind(address)
        .await
        .map_err(|source| Error::Listen {
            address: address.to_string(),
            source,
        })
}

pub struct StreamProxy<T: Transport + 'static> {
    transport: Arc<T>,
    target: Endpoint,
    counters: Arc<ProxyCounters>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl<T: Transport + 'static> StreamProxy<T> {
    pub fn new(transport: Arc<T>, target: Endpoint) -> Self {
        Self {
            transport,
            target,
            counters: Arc::new(ProxyCounters::default()),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    pub fn stats(&self) -> ProxyStats {
        let c = &self.counters;
        ProxyStats {
            connections_accepted: c.accepted.load(Ordering::Relaxed),
            active_connections: c.active.load(Ordering::Relaxed),
            connections_failed: c.failed.load(Ordering::Relaxed),
            bytes_local_to_remote: c.bytes_local_to_remote.load(Ordering::Relaxed),
            bytes_remote_to_local: c.bytes_remote_to_local.load(Ordering::Relaxed),
        }
    }

    /// Token that stops the proxy and every in-flight relay when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept until the listener fails or the proxy is cancelled.
    ///
    /// In-flight relays are cancelled and awaited before this returns.
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!("Proxying {} -> {}", addr, self.target);
        }

        let result = loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        trace!("Accepted connection from {}", peer_addr);
                        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                        self.spawn_connection_handler(stream, peer_addr);
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        break Err(Error::Accept(e));
                    }
                },
                _ = self.cancel.cancelled() => {
                    info!("Proxy cancelled, stopping listener");
                    break Ok(());
                }
            }
        };

        drop(listener);
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Proxy stopped: {:?}", self.stats());
        result
    }

    fn spawn_connection_handler(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let transport = Arc::clone(&self.transport);
        let target = self.target.clone();
        let counters = Arc::clone(&self.counters);
        let cancel = self.cancel.child_token();

        self.tracker.spawn(async move {
            counters.active.fetch_add(1, Ordering::Relaxed);
            debug!("Handling connection from {} -> {}", peer_addr, target);

            let (stats, result) = handle_connection(stream, &*transport, &target, cancel).await;
            counters.active.fetch_sub(1, Ordering::Relaxed);
            counters
                .bytes_local_to_remote
                .fetch_add(stats.bytes_local_to_remote, Ordering::Relaxed);
            counters
                .bytes_remote_to_local
                .fetch_add(stats.bytes_remote_to_local, Ordering::Relaxed);

            match result {
                Ok(()) => debug!(
                    "Connection from {} completed: {} bytes in {:?}",
                    peer_addr,
                    stats.total_bytes(),
                    stats.duration
                ),
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!("Connection from {} failed: {}", peer_addr, e);
                }
            }
        });
    }
}

/// Open a channel for one accepted connection and relay it. Bytes that
/// crossed before a failure are still reported.
async fn handle_connection<T: Transport + ?Sized>(
    stream: TcpStream,
    transport: &T,
    target: &Endpoint,
    cancel: CancellationToken,
) -> (TunnelStats, Result<()>) {
    let channel = match transport.open_channel(target).await {
        Ok(channel) => channel,
        Err(e) => return (TunnelStats::default(), Err(e)),
    };
    trace!("Channel to {} opened", target);

    let (stats, relayed) = relay(stream, channel, cancel).await;
    let result = match relayed {
        Ok(()) => Ok(()),
        Err(e) if is_disconnect(&e) || e.kind() == io::ErrorKind::Interrupted => {
            trace!("Relay ended early: {}", e);
            Ok(())
        }
        Err(e) => Err(Error::io(format!("relay to {target} failed"), e)),
    };
    (stats, result)
}
