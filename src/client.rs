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

//! Client facade over the chain builder and the operations built on it.
//!
//! Every operation builds a fresh chain and tears all of it down before
//! returning, on success and on error alike.
//!
//! ```no_run
//! use sshchain::{Client, HopConfig};
//!
//! # async fn run() -> sshchain::Result<()> {
//! let target = HopConfig::new("10.0.0.5").with_user("alice").with_password("p");
//! let jump = HopConfig::new("10.0.0.1")
//!     .with_user("bob")
//!     .with_private_key("~/.ssh/id");
//!
//! let client = Client::new(target, vec![jump])?;
//! let output = client.execute_command("uname -a").await?;
//! println!("{output}");
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::executor::stream::{self, OutputHandlers};
use crate::forwarding::proxy::{self, StreamProxy};
use crate::jump::auth::AuthConfig;
use crate::jump::chain::{ChainBuilder, ChainPlan};
use crate::jump::hop::{ChainSpec, HopConfig};
use crate::jump::transport::LogicalTransport;
use crate::ssh::provider::{Endpoint, Session, Transport, TransportProvider};
use crate::ssh::russh_provider::RusshProvider;
use crate::transfer;

/// Connection settings for one target and its jump hosts.
pub struct Client<P: TransportProvider = RusshProvider> {
    spec: ChainSpec,
    default_auth: AuthConfig,
    plan: ChainPlan,
    provider: P,
}

impl Client<RusshProvider> {
    /// Client for `target` reached through `jump_hosts`, in order.
    pub fn new(target: HopConfig, jump_hosts: Vec<HopConfig>) -> Result<Self> {
        Self::with_provider(target, jump_hosts, RusshProvider::new())
    }

    /// Client for `target` without jump hosts.
    pub fn direct(target: HopConfig) -> Result<Self> {
        Self::new(target, Vec::new())
    }
}

impl<P: TransportProvider> Client<P> {
    /// Derive the default credentials from `target` and resolve every hop's
    /// credentials, reading key files once. Nothing touches the network here.
    pub fn with_provider(
        target: HopConfig,
        jump_hosts: Vec<HopConfig>,
        provider: P,
    ) -> Result<Self> {
        let default_auth = AuthConfig::from_hop(&target)?;
        let spec = ChainSpec::new(target, jump_hosts);
        let plan = ChainPlan::resolve(&spec, &default_auth)?;

        Ok(Self {
            spec,
            default_auth,
            plan,
            provider,
        })
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    pub fn default_auth(&self) -> &AuthConfig {
        &self.default_auth
    }

    pub fn plan(&self) -> &ChainPlan {
        &self.plan
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Build a new chain to the target. The caller owns it and should
    /// [`LogicalTransport::close`] it when done.
    pub async fn connect(&self) -> Result<LogicalTransport<P::Transport>> {
        ChainBuilder::new(&self.provider).build(&self.plan).await
    }

    /// Build a new chain and open one session on it.
    pub async fn session(&self) -> Result<(LogicalTransport<P::Transport>, Box<dyn Session>)> {
        let transport = self.connect().await?;
        match transport.new_session().await {
            Ok(session) => Ok((transport, session)),
            Err(e) => {
                release(transport).await;
                Err(e)
            }
        }
    }

    /// Run `command` and return its stdout and stderr interleaved.
    pub async fn execute_command(&self, command: &str) -> Result<String> {
        let transport = self.connect().await?;
        let result = stream::execute_command(&transport, command).await;
        release(transport).await;
        result
    }

    /// Run `command`, delivering output lines to `handlers` as they arrive.
    ///
    /// Handlers are checked before connecting.
    pub async fn stream_command(&self, command: &str, handlers: OutputHandlers) -> Result<()> {
        handlers.resolve()?;

        let transport = self.connect().await?;
        let result = stream::stream_command(&transport, command, &handlers).await;
        release(transport).await;
        result
    }

    /// Serve `localhost:<local_port>`, proxying each connection to
    /// `remote_host:remote_port` as seen from the target. Runs until the
    /// listener fails.
    pub async fn proxy_remote_port_to_local(
        &self,
        local_port: u16,
        remote_host: &str,
        remote_port: u16,
    ) -> Result<()> {
        self.proxy(local_port, Endpoint::tcp(remote_host, remote_port))
            .await
    }

    /// Serve `localhost:<local_port>`, proxying each connection to the Unix
    /// socket at `remote_socket_path` on the target.
    pub async fn proxy_remote_unix_socket_to_local(
        &self,
        local_port: u16,
        remote_socket_path: &str,
    ) -> Result<()> {
        self.proxy(local_port, Endpoint::unix(remote_socket_path))
            .await
    }

    async fn proxy(&self, local_port: u16, target: Endpoint) -> Result<()> {
        let transport = Arc::new(self.connect().await?);

        let result = async {
            let listener = proxy::bind(&format!("localhost:{local_port}")).await?;
            StreamProxy::new(Arc::clone(&transport), target).run(listener).await
        }
        .await;

        match Arc::try_unwrap(transport) {
            Ok(transport) => release(transport).await,
            Err(_) => warn!("Transport still shared after proxy shutdown"),
        }
        result
    }

    /// Write `data` to `remote_path` on the target.
    pub async fn send_string_to_file(&self, data: &str, remote_path: &str) -> Result<()> {
        self.stream_to_remote_file(data.as_bytes(), remote_path)
            .await
    }

    /// Copy everything `reader` yields into `remote_path` on the target.
    pub async fn stream_to_remote_file<R>(&self, reader: R, remote_path: &str) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let transport = self.connect().await?;
        let result = transfer::stream_to_remote_file(&transport, reader, remote_path).await;
        release(transport).await;
        result.map(|written| debug!("Sent {} bytes to {}", written, remote_path))
    }

    /// Upload exactly `size` bytes from `reader` to `remote_path` with scp.
    pub async fn scp_upload<R>(&self, reader: R, size: u64, remote_path: &str) -> Result<()>
    where
        R: AsyncRead + Unpin + Send,
    {
        let transport = self.connect().await?;
        let result = transfer::scp_upload(&transport, reader, size, remote_path).await;
        release(transport).await;
        result.map(|_| ())
    }

    /// Upload a local file to `remote_path` with scp.
    pub async fn scp_upload_file(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
    ) -> Result<()> {
        let local_path = local_path.as_ref();
        // Fail on a bad local path before connecting.
        tokio::fs::metadata(local_path)
            .await
            .map_err(|e| Error::io(format!("failed to stat {}", local_path.display()), e))?;

        let transport = self.connect().await?;
        let result = transfer::scp_upload_file(&transport, local_path, remote_path).await;
        release(transport).await;
        result.map(|_| ())
    }
}

/// Close every layer; failures are logged since the operation result wins.
async fn release<T: Transport>(transport: LogicalTransport<T>) {
    if let Err(e) = transport.close().await {
        warn!("Failed to close connection: {}", e);
    }
}
