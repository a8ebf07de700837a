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

//! Builds one logical transport to the target through the jump hosts.

use tracing::{debug, info, warn};

use super::auth::{resolve_auth, AuthConfig};
use super::hop::ChainSpec;
use super::transport::{close_layers, LogicalTransport};
use crate::error::{Error, HopStage, Result};
use crate::ssh::provider::{Endpoint, HostPort, Transport, TransportProvider};

/// One hop ready to connect: its SSH address and resolved credentials.
#[derive(Debug, Clone)]
pub struct PlannedHop {
    pub address: HostPort,
    pub auth: AuthConfig,
}

/// Every hop of a chain with credentials resolved, keys already loaded.
#[derive(Debug, Clone)]
pub struct ChainPlan {
    hops: Vec<PlannedHop>,
    description: String,
}

impl ChainPlan {
    /// Resolve credentials for every hop of `spec`, jump hosts first.
    pub fn resolve(spec: &ChainSpec, default_auth: &AuthConfig) -> Result<Self> {
        let hops = spec
            .path()
            .map(|hop| -> Result<PlannedHop> {
                Ok(PlannedHop {
                    address: hop.ssh_address(),
                    auth: resolve_auth(hop, default_auth)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            hops,
            description: spec.describe(),
        })
    }

    /// Hops in dial order; the target is last.
    pub fn hops(&self) -> &[PlannedHop] {
        &self.hops
    }

    pub fn jump_count(&self) -> usize {
        self.hops.len().saturating_sub(1)
    }

    pub fn describe(&self) -> &str {
        &self.description
    }
}

/// Dials the first hop directly, then handshakes with every later hop over a
/// channel opened on the layer below it.
pub struct ChainBuilder<'a, P: TransportProvider> {
    provider: &'a P,
}

impl<'a, P: TransportProvider> ChainBuilder<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    /// Connect hop by hop along `plan`.
    ///
    /// On failure the layers built so far are closed in reverse order and the
    /// error names the failing hop.
    pub async fn build(&self, plan: &ChainPlan) -> Result<LogicalTransport<P::Transport>> {
        if plan.jump_count() == 0 {
            debug!("Establishing direct connection to {}", plan.describe());
        } else {
            info!(
                "Establishing jump host connection through {} hop(s): {}",
                plan.jump_count(),
                plan.describe()
            );
        }

        let mut layers: Vec<P::Transport> = Vec::with_capacity(plan.hops().len());
        for (index, hop) in plan.hops().iter().enumerate() {
            let (address, auth) = (&hop.address, &hop.auth);
            let connected = match layers.last() {
                None => self.dial(index, address, auth).await,
                Some(carrier) => self.tunnel(carrier, index, address, auth).await,
            };

            match connected {
                Ok(transport) => {
                    debug!("Connected to {} as {} (hop {})", address, auth.user, index);
                    layers.push(transport);
                }
                Err(e) => {
                    warn!("Chain build failed at hop {} ({}): {}", index, address, e);
                    if let Err(close_err) = close_layers(layers).await {
                        debug!("Error while releasing partial chain: {}", close_err);
                    }
                    return Err(e);
                }
            }
        }

        let transport = LogicalTransport::from_layers(layers)
            .ok_or_else(|| Error::InvalidArgument("empty hop chain".to_string()))?;
        info!("Connection established: {}", plan.describe());
        Ok(transport)
    }

    async fn dial(&self, index: usize, address: &HostPort, auth: &AuthConfig) -> Result<P::Transport> {
        let address_str = address.to_string();
        self.provider
            .dial(address, auth)
            .await
            .map_err(|e| e.at_hop(index, &address_str, HopStage::Dial))
    }

    async fn tunnel(
        &self,
        carrier: &P::Transport,
        index: usize,
        address: &HostPort,
        auth: &AuthConfig,
    ) -> Result<P::Transport> {
        let address_str = address.to_string();
        debug!("Opening tunnel to {} via {}", address, carrier.address());

        let channel = carrier
            .open_channel(&Endpoint::Tcp(address.clone()))
            .await
            .map_err(|e| e.at_hop(index, &address_str, HopStage::Channel))?;

        self.provider
            .handshake(channel, address, auth)
            .await
            .map_err(|e| e.at_hop(index, &address_str, HopStage::Handshake))
    }
}
