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

//! Transport provider interface.
//!
//! The chain builder, proxy, streamer and file sender only talk to these
//! traits. [`crate::ssh::RusshProvider`] is the production implementation;
//! tests plug in an in-memory one.

use std::fmt;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::jump::auth::AuthConfig;

/// Default SSH port appended to every hop address.
pub const SSH_PORT: u16 = 22;

/// Bidirectional byte stream carried by a channel.
pub trait ChannelIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> ChannelIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// A raw channel opened through a transport.
pub type RawChannel = Box<dyn ChannelIo>;

/// Readable side of a session pipe (stdout or stderr).
pub type SessionReader = Box<dyn AsyncRead + Unpin + Send>;

/// Writable side of a session pipe (stdin).
pub type SessionWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Host and port pair, rendered as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// SSH address of a host: the host with `:22` appended.
    pub fn ssh(host: impl Into<String>) -> Self {
        Self::new(host, SSH_PORT)
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Remote endpoint a channel is opened to, as seen from the far end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(HostPort),
    Unix(String),
}

impl Endpoint {
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp(HostPort::new(host, port))
    }

    pub fn unix(path: impl Into<String>) -> Self {
        Endpoint::Unix(path.into())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp {addr}"),
            Endpoint::Unix(path) => write!(f, "unix {path}"),
        }
    }
}

/// How a remote command finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Code(u32),
    Signal { name: String, message: String },
    /// The channel closed without an exit status or signal.
    Unknown,
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    pub fn code(&self) -> Option<u32> {
        match self {
            ExitStatus::Code(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit status {code}"),
            ExitStatus::Signal { name, message } if message.is_empty() => {
                write!(f, "signal {name}")
            }
            ExitStatus::Signal { name, message } => write!(f, "signal {name}: {message}"),
            ExitStatus::Unknown => write!(f, "no exit status"),
        }
    }
}

/// Produces authenticated transports, either by dialing or over a channel.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    type Transport: Transport + 'static;

    /// Dial `address` directly over the network and authenticate.
    async fn dial(&self, address: &HostPort, auth: &AuthConfig) -> Result<Self::Transport>;

    /// Run a fresh handshake over `channel` and authenticate.
    async fn handshake(
        &self,
        channel: RawChannel,
        address: &HostPort,
        auth: &AuthConfig,
    ) -> Result<Self::Transport>;
}

/// One authenticated, multiplexed connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Address this transport is connected to.
    fn address(&self) -> &HostPort;

    /// Open a raw byte channel to `endpoint`, reachable from the far end.
    async fn open_channel(&self, endpoint: &Endpoint) -> Result<RawChannel>;

    /// Open a command execution session.
    async fn new_session(&self) -> Result<Box<dyn Session>>;

    /// Disconnect. Channels and sessions opened on this transport stop working.
    async fn close(&self) -> Result<()>;
}

/// A command execution channel.
///
/// Pipes are taken before [`Session::start`]. A stdin pipe that was not taken
/// is closed when the command starts; output that nobody took is discarded.
#[async_trait]
pub trait Session: Send {
    fn take_stdin(&mut self) -> Option<SessionWriter>;

    fn take_stdout(&mut self) -> Option<SessionReader>;

    fn take_stderr(&mut self) -> Option<SessionReader>;

    async fn start(&mut self, command: &str) -> Result<()>;

    /// Wait for the remote command to finish. Output readers reach EOF no
    /// later than this returns.
    async fn wait(&mut self) -> Result<ExitStatus>;

    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_port_display() {
        assert_eq!(HostPort::ssh("10.0.0.5").to_string(), "10.0.0.5:22");
        assert_eq!(HostPort::new("::1", 2222).to_string(), "[::1]:2222");
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::tcp("db", 5432).to_string(), "tcp db:5432");
        assert_eq!(
            Endpoint::unix("/var/run/docker.sock").to_string(),
            "unix /var/run/docker.sock"
        );
    }

    #[test]
    fn test_exit_status() {
        assert!(ExitStatus::Code(0).success());
        assert!(!ExitStatus::Code(2).success());
        assert!(!ExitStatus::Unknown.success());

        let signal = ExitStatus::Signal {
            name: "TERM".to_string(),
            message: String::new(),
        };
        assert_eq!(signal.code(), None);
        assert_eq!(signal.to_string(), "signal TERM");
    }
}
