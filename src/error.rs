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

//! Error types for chain building, sessions, proxying and file transfer.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::ssh::provider::ExitStatus;

/// Result alias used across the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stage of the chain build at which a hop failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopStage {
    /// Direct network dial of the first hop.
    Dial,
    /// Opening the carrier channel on the previous layer.
    Channel,
    /// Transport handshake over the carrier channel.
    Handshake,
}

impl fmt::Display for HopStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HopStage::Dial => write!(f, "dial"),
            HopStage::Channel => write!(f, "open channel to"),
            HopStage::Handshake => write!(f, "handshake with"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no authentication method provided for {user}@{address}")]
    NoAuthMethod { user: String, address: String },

    #[error("unable to read private key {}", path.display())]
    KeyUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to parse private key {}", path.display())]
    KeyInvalid {
        path: PathBuf,
        #[source]
        source: russh::keys::Error,
    },

    /// Any failure while building the chain, tagged with the failing hop.
    #[error("failed to {stage} {address} (hop {index})")]
    Hop {
        index: usize,
        address: String,
        stage: HopStage,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to open channel to {target}")]
    ChannelOpen {
        target: String,
        #[source]
        source: Box<Error>,
    },

    #[error("authentication rejected by {address} for user {user}")]
    AuthRejected { user: String, address: String },

    #[error("host key for {address} is not trusted")]
    HostKeyRejected { address: String },

    #[error("timed out after {}s connecting to {address}", timeout.as_secs())]
    Timeout { address: String, timeout: Duration },

    #[error(transparent)]
    Ssh(#[from] russh::Error),

    #[error("session error: {0}")]
    Session(String),

    #[error("command `{command}` finished with {status}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        output: Option<String>,
    },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to listen on {address}")]
    Listen {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept local connection")]
    Accept(#[source] io::Error),

    #[error("remote file transfer failed: {0}")]
    Protocol(String),
}

impl Error {
    /// Wrap an I/O error with the operation it interrupted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn at_hop(self, index: usize, address: &str, stage: HopStage) -> Self {
        Error::Hop {
            index,
            address: address.to_string(),
            stage,
            source: Box::new(self),
        }
    }

    /// Exit status of a failed remote command, if that is what this error is.
    pub fn exit_status(&self) -> Option<&ExitStatus> {
        match self {
            Error::CommandFailed { status, .. } => Some(status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_hop_error_names_address_and_cause() {
        let cause = Error::io(
            "connection refused",
            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        );
        let err = cause.at_hop(1, "10.0.0.5:22", HopStage::Handshake);

        assert_eq!(err.to_string(), "failed to handshake with 10.0.0.5:22 (hop 1)");
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection refused"));
    }

    #[test]
    fn test_command_failed_exposes_status() {
        let err = Error::CommandFailed {
            command: "false".to_string(),
            status: ExitStatus::Code(1),
            output: None,
        };
        assert_eq!(err.exit_status(), Some(&ExitStatus::Code(1)));
        assert_eq!(err.to_string(), "command `false` finished with exit status 1");
    }
}
