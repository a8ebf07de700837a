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

//! Layered transport produced by the chain builder.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ssh::provider::{Endpoint, HostPort, RawChannel, Session, Transport};

/// Stack of transports: `layers[0]` was dialed directly and every later layer
/// was handshaked over a channel of the one below it. Only the top layer
/// carries application traffic.
pub struct LogicalTransport<T: Transport> {
    layers: Vec<T>,
}

impl<T: Transport> LogicalTransport<T> {
    /// Build from layers in dial order. Returns `None` when `layers` is empty.
    pub fn from_layers(layers: Vec<T>) -> Option<Self> {
        if layers.is_empty() {
            None
        } else {
            Some(Self { layers })
        }
    }

    pub fn top(&self) -> &T {
        // from_layers guarantees at least one layer
        &self.layers[self.layers.len() - 1]
    }

    /// Number of layers; one more than the number of jump hosts.
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Addresses of every layer in dial order.
    pub fn hops(&self) -> Vec<HostPort> {
        self.layers.iter().map(|t| t.address().clone()).collect()
    }

    /// Close every layer, top first. All layers are attempted even if one
    /// fails; the first failure is returned.
    pub async fn close(self) -> Result<()> {
        close_layers(self.layers).await
    }
}

pub(crate) async fn close_layers<T: Transport>(layers: Vec<T>) -> Result<()> {
    let mut first_error: Option<Error> = None;
    for layer in layers.into_iter().rev() {
        debug!("Closing transport to {}", layer.address());
        if let Err(e) = layer.close().await {
            warn!("Failed to close transport to {}: {}", layer.address(), e);
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[async_trait]
impl<T: Transport> Transport for LogicalTransport<T> {
    fn address(&self) -> &HostPort {
        self.top().address()
    }

    async fn open_channel(&self, endpoint: &Endpoint) -> Result<RawChannel> {
        self.top().open_channel(endpoint).await
    }

    async fn new_session(&self) -> Result<Box<dyn Session>> {
        self.top().new_session().await
    }

    /// Disconnects only the top layer; use [`LogicalTransport::close`] to tear
    /// down the whole stack.
    async fn close(&self) -> Result<()> {
        self.top().close().await
    }
}

impl<T: Transport> std::fmt::Debug for LogicalTransport<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalTransport")
            .field("hops", &self.hops())
            .finish()
    }
}
