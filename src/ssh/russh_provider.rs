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

//! Transport provider backed by russh.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{Config, Handle, Handler};
use russh::Disconnect;
use tracing::{debug, trace, warn};

use super::provider::{Endpoint, HostPort, RawChannel, Session, Transport, TransportProvider};
use super::session::RusshSession;
use crate::error::{Error, Result};
use crate::jump::auth::{AuthConfig, AuthMethod};

/// Originator reported when opening `direct-tcpip` channels.
const ORIGINATOR: (&str, u32) = ("127.0.0.1", 22);

/// Server host key policy. Verification is off unless asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HostVerification {
    /// Accept any host key.
    #[default]
    Disabled,
    /// Check `~/.ssh/known_hosts`.
    KnownHosts,
    /// Check the given known_hosts file.
    KnownHostsFile(PathBuf),
}

impl HostVerification {
    /// `true` maps to the default known_hosts file.
    pub fn from_flag(verify_host_identity: bool) -> Self {
        if verify_host_identity {
            HostVerification::KnownHosts
        } else {
            HostVerification::Disabled
        }
    }
}

/// Per-connection handler; only host key checking is customised.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    address: HostPort,
    verification: HostVerification,
}

impl ClientHandler {
    pub fn new(address: HostPort, verification: HostVerification) -> Self {
        Self {
            address,
            verification,
        }
    }
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let known = match &self.verification {
            HostVerification::Disabled => return Ok(true),
            HostVerification::KnownHosts => russh::keys::check_known_hosts(
                &self.address.host,
                self.address.port,
                server_public_key,
            ),
            HostVerification::KnownHostsFile(path) => russh::keys::check_known_hosts_path(
                &self.address.host,
                self.address.port,
                server_public_key,
                path,
            ),
        };

        match known {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!("Host key check for {} failed: {}", self.address, e);
                Ok(false)
            }
        }
    }
}

/// Connects with russh, optionally under a timeout.
#[derive(Clone)]
pub struct RusshProvider {
    config: Arc<Config>,
    verification: HostVerification,
    connect_timeout: Option<Duration>,
}

impl Default for RusshProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl RusshProvider {
    pub fn new() -> Self {
        Self {
            config: Arc::new(Config::default()),
            verification: HostVerification::default(),
            connect_timeout: None,
        }
    }

    pub fn with_host_verification(mut self, verification: HostVerification) -> Self {
        self.verification = verification;
        self
    }

    /// Bound every dial and handshake, authentication included.
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self
    }

    async fn bounded<T>(
        &self,
        address: &HostPort,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, fut)
                .await
                .map_err(|_| Error::Timeout {
                    address: address.to_string(),
                    timeout,
                })?,
            None => fut.await,
        }
    }
}

fn host_key_error(err: Error, address: &HostPort) -> Error {
    match err {
        Error::Ssh(russh::Error::UnknownKey) => Error::HostKeyRejected {
            address: address.to_string(),
        },
        other => other,
    }
}

/// Try each method in order until the server accepts one.
async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    address: &HostPort,
    auth: &AuthConfig,
) -> Result<()> {
    for method in &auth.methods {
        debug!("Trying {} authentication for {}@{}", method.kind(), auth.user, address);
        let result = match method {
            AuthMethod::PrivateKey { key, .. } => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(
                        auth.user.as_str(),
                        russh::keys::PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg),
                    )
                    .await?
            }
            AuthMethod::Password(password) => {
                handle
                    .authenticate_password(auth.user.as_str(), password.as_str())
                    .await?
            }
        };

        if result.success() {
            return Ok(());
        }
    }

    Err(Error::AuthRejected {
        user: auth.user.clone(),
        address: address.to_string(),
    })
}

#[async_trait]
impl TransportProvider for RusshProvider {
    type Transport = RusshTransport;

    async fn dial(&self, address: &HostPort, auth: &AuthConfig) -> Result<RusshTransport> {
        debug!("Dialing {} as {}", address, auth.user);
        let handler = ClientHandler::new(address.clone(), self.verification.clone());

        let handle = self
            .bounded(address, async {
                let mut handle = russh::client::connect(
                    Arc::clone(&self.config),
                    (address.host.as_str(), address.port),
                    handler,
                )
                .await
                .map_err(|e| host_key_error(e, address))?;
                authenticate(&mut handle, address, auth).await?;
                Ok(handle)
            })
            .await?;

        Ok(RusshTransport {
            handle,
            address: address.clone(),
        })
    }

    async fn handshake(
        &self,
        channel: RawChannel,
        address: &HostPort,
        auth: &AuthConfig,
    ) -> Result<RusshTransport> {
        debug!("Handshaking with {} as {} over tunnel", address, auth.user);
        let handler = ClientHandler::new(address.clone(), self.verification.clone());

        let handle = self
            .bounded(address, async {
                let mut handle =
                    russh::client::connect_stream(Arc::clone(&self.config), channel, handler)
                        .await
                        .map_err(|e| host_key_error(e, address))?;
                authenticate(&mut handle, address, auth).await?;
                Ok(handle)
            })
            .await?;

        Ok(RusshTransport {
            handle,
            address: address.clone(),
        })
    }
}

/// An authenticated russh connection.
pub struct RusshTransport {
    handle: Handle<ClientHandler>,
    address: HostPort,
}

#[async_trait]
impl Transport for RusshTransport {
    fn address(&self) -> &HostPort {
        &self.address
    }

    async fn open_channel(&self, endpoint: &Endpoint) -> Result<RawChannel> {
        trace!("Opening {} channel on {}", endpoint, self.address);
        let opened = match endpoint {
            Endpoint::Tcp(target) => {
                self.handle
                    .channel_open_direct_tcpip(
                        target.host.clone(),
                        u32::from(target.port),
                        ORIGINATOR.0,
                        ORIGINATOR.1,
                    )
                    .await
            }
            Endpoint::Unix(path) => {
                self.handle
                    .channel_open_direct_streamlocal(path.clone())
                    .await
            }
        };

        let channel = opened.map_err(|e| Error::ChannelOpen {
            target: endpoint.to_string(),
            source: Box::new(Error::Ssh(e)),
        })?;
        Ok(Box::new(channel.into_stream()))
    }

    async fn new_session(&self) -> Result<Box<dyn Session>> {
        let channel = self.handle.channel_open_session().await?;
        Ok(Box::new(RusshSession::new(channel)))
    }

    async fn close(&self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}
