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

//! In-memory transport provider for integration tests.
//!
//! Records every dial, channel open, handshake, exec and close so tests can
//! assert on the order the chain builder and operations drive them in.

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use sshchain::error::{Error, Result};
use sshchain::jump::AuthConfig;
use sshchain::ssh::{
    Endpoint, ExitStatus, HostPort, RawChannel, Session, SessionReader, SessionWriter, Transport,
    TransportProvider,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Dial { address: String, user: String },
    OpenChannel { via: String, endpoint: Endpoint },
    Handshake { address: String, user: String },
    Exec { address: String, command: String },
    Close { address: String },
}

/// Output and exit status every session replays.
#[derive(Debug, Clone)]
pub struct Script {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: ExitStatus,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit: ExitStatus::Code(0),
        }
    }
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<Event>>,
    stdin: Mutex<Vec<u8>>,
    script: Mutex<Script>,
    fail_at: Mutex<Option<String>>,
    failing_opens: AtomicUsize,
}

impl Shared {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Cloneable handle; clones share the same event log and script.
#[derive(Clone, Default)]
pub struct MockProvider {
    shared: Arc<Shared>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dial or handshake with `address` (`host:port`) fails.
    pub fn failing_at(self, address: &str) -> Self {
        *self.shared.fail_at.lock().unwrap() = Some(address.to_string());
        self
    }

    /// The next `count` non-hop channel opens fail.
    pub fn failing_channel_opens(self, count: usize) -> Self {
        self.shared.failing_opens.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_script(self, script: Script) -> Self {
        *self.shared.script.lock().unwrap() = script;
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.shared.events.lock().unwrap().clone()
    }

    /// Everything sessions received on stdin.
    pub fn stdin(&self) -> Vec<u8> {
        self.shared.stdin.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Exec { command, .. } => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn dials(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Dial { .. }))
            .count()
    }

    fn check(&self, address: &HostPort) -> Result<()> {
        match self.shared.fail_at.lock().unwrap().as_deref() {
            Some(failing) if failing == address.to_string() => Err(Error::AuthRejected {
                user: "mock".to_string(),
                address: failing.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn transport(&self, address: &HostPort) -> MockTransport {
        MockTransport {
            address: address.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

#[async_trait]
impl TransportProvider for MockProvider {
    type Transport = MockTransport;

    async fn dial(&self, address: &HostPort, auth: &AuthConfig) -> Result<MockTransport> {
        self.shared.record(Event::Dial {
            address: address.to_string(),
            user: auth.user.clone(),
        });
        self.check(address)?;
        Ok(self.transport(address))
    }

    async fn handshake(
        &self,
        _channel: RawChannel,
        address: &HostPort,
        auth: &AuthConfig,
    ) -> Result<MockTransport> {
        self.shared.record(Event::Handshake {
            address: address.to_string(),
            user: auth.user.clone(),
        });
        self.check(address)?;
        Ok(self.transport(address))
    }
}

pub struct MockTransport {
    address: HostPort,
    shared: Arc<Shared>,
}

/// Channel whose far end echoes everything back.
fn echo_channel() -> RawChannel {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let (mut reader, mut writer) = tokio::io::split(remote);
        let _ = tokio::io::copy(&mut reader, &mut writer).await;
    });
    Box::new(local)
}

#[async_trait]
impl Transport for MockTransport {
    fn address(&self) -> &HostPort {
        &self.address
    }

    async fn open_channel(&self, endpoint: &Endpoint) -> Result<RawChannel> {
        self.shared.record(Event::OpenChannel {
            via: self.address.to_string(),
            endpoint: endpoint.clone(),
        });

        let is_hop = matches!(endpoint, Endpoint::Tcp(addr) if addr.port == 22);
        if !is_hop {
            let failing = &self.shared.failing_opens;
            if failing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::ChannelOpen {
                    target: endpoint.to_string(),
                    source: Box::new(Error::Session("administratively prohibited".to_string())),
                });
            }
        }
        Ok(echo_channel())
    }

    async fn new_session(&self) -> Result<Box<dyn Session>> {
        let script = self.shared.script.lock().unwrap().clone();
        Ok(Box::new(MockSession {
            address: self.address.to_string(),
            shared: Arc::clone(&self.shared),
            stdout: Some(script.stdout),
            stderr: Some(script.stderr),
            exit: script.exit,
            stdin_taken: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.shared.record(Event::Close {
            address: self.address.to_string(),
        });
        Ok(())
    }
}

pub struct MockSession {
    address: String,
    shared: Arc<Shared>,
    stdout: Option<Vec<u8>>,
    stderr: Option<Vec<u8>>,
    exit: ExitStatus,
    stdin_taken: bool,
}

/// Appends every write to the provider's stdin log.
struct StdinRecorder {
    shared: Arc<Shared>,
}

impl AsyncWrite for StdinRecorder {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.shared.stdin.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl Session for MockSession {
    fn take_stdin(&mut self) -> Option<SessionWriter> {
        if self.stdin_taken {
            return None;
        }
        self.stdin_taken = true;
        Some(Box::new(StdinRecorder {
            shared: Arc::clone(&self.shared),
        }))
    }

    fn take_stdout(&mut self) -> Option<SessionReader> {
        self.stdout
            .take()
            .map(|bytes| Box::new(io::Cursor::new(bytes)) as SessionReader)
    }

    fn take_stderr(&mut self) -> Option<SessionReader> {
        self.stderr
            .take()
            .map(|bytes| Box::new(io::Cursor::new(bytes)) as SessionReader)
    }

    async fn start(&mut self, command: &str) -> Result<()> {
        self.shared.record(Event::Exec {
            address: self.address.clone(),
            command: command.to_string(),
        });
        Ok(())
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        Ok(self.exit.clone())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Path to the unencrypted ed25519 test key.
pub fn fixture_key() -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/id_ed25519")
}
