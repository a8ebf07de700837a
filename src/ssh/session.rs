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

//! Command sessions over russh `session` channels.
//!
//! A pump task owns the channel once the command starts. It forwards stdin
//! and fans channel messages out to bounded stdout and stderr queues, so a
//! slow reader holds the remote side back instead of growing memory.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;
use tracing::{debug, trace, warn};

use super::provider::{ExitStatus, Session, SessionReader, SessionWriter};
use crate::error::{Error, Result};

/// Buffer size for stdin forwarding and the stdin pipe.
const SSH_CMD_BUFFER_SIZE: usize = 8192;

/// Output chunks queued per stream before the pump waits for the reader.
pub const OUTPUT_QUEUE_CAPACITY: usize = 100;

/// The operations a session needs from its channel.
#[async_trait]
pub trait ExecChannel: Send + 'static {
    async fn start_exec(&mut self, command: &str) -> Result<()>;

    async fn send_data(&mut self, data: &[u8]) -> Result<()>;

    async fn send_eof(&mut self) -> Result<()>;

    /// Next message from the server; `None` once the channel is gone.
    async fn next_message(&mut self) -> Option<ChannelMsg>;

    async fn close_channel(&mut self) -> Result<()>;
}

#[async_trait]
impl ExecChannel for Channel<Msg> {
    async fn start_exec(&mut self, command: &str) -> Result<()> {
        self.exec(true, command).await?;
        Ok(())
    }

    async fn send_data(&mut self, data: &[u8]) -> Result<()> {
        self.data(data).await?;
        Ok(())
    }

    async fn send_eof(&mut self) -> Result<()> {
        self.eof().await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Option<ChannelMsg> {
        self.wait().await
    }

    async fn close_channel(&mut self) -> Result<()> {
        self.close().await?;
        Ok(())
    }
}

/// Session over an exec channel.
///
/// Pipes are handed out before `start`; whatever was not taken is closed
/// when the command starts.
pub struct RusshSession<C: ExecChannel = Channel<Msg>> {
    channel: Option<C>,
    stdin: Option<DuplexStream>,
    stdin_source: Option<DuplexStream>,
    stdout: Option<mpsc::Receiver<Bytes>>,
    stderr: Option<mpsc::Receiver<Bytes>>,
    router: Option<OutputRouter>,
    pump: Option<JoinHandle<ExitStatus>>,
}

impl<C: ExecChannel> RusshSession<C> {
    pub fn new(channel: C) -> Self {
        let (stdin, stdin_source) = tokio::io::duplex(SSH_CMD_BUFFER_SIZE);
        let (stdout_tx, stdout) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
        let (stderr_tx, stderr) = mpsc::channel(OUTPUT_QUEUE_CAPACITY);
        Self {
            channel: Some(channel),
            stdin: Some(stdin),
            stdin_source: Some(stdin_source),
            stdout: Some(stdout),
            stderr: Some(stderr),
            router: Some(OutputRouter::new(stdout_tx, stderr_tx)),
            pump: None,
        }
    }
}

fn channel_reader(rx: mpsc::Receiver<Bytes>) -> SessionReader {
    let chunks = futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, io::Error>(chunk), rx))
    });
    Box::new(StreamReader::new(Box::pin(chunks)))
}

#[async_trait]
impl<C: ExecChannel> Session for RusshSession<C> {
    fn take_stdin(&mut self) -> Option<SessionWriter> {
        self.stdin
            .take()
            .map(|stdin| Box::new(stdin) as SessionWriter)
    }

    fn take_stdout(&mut self) -> Option<SessionReader> {
        self.stdout.take().map(channel_reader)
    }

    fn take_stderr(&mut self) -> Option<SessionReader> {
        self.stderr.take().map(channel_reader)
    }

    async fn start(&mut self, command: &str) -> Result<()> {
        let (Some(mut channel), Some(stdin_source), Some(router)) = (
            self.channel.take(),
            self.stdin_source.take(),
            self.router.take(),
        ) else {
            return Err(Error::Session("session already started".to_string()));
        };

        // Untaken pipes: stdin reads as empty, output is discarded.
        self.stdin.take();
        self.stdout.take();
        self.stderr.take();

        debug!("Executing command: {}", command);
        channel.start_exec(command).await?;
        self.pump = Some(tokio::spawn(pump(channel, stdin_source, router)));
        Ok(())
    }

    async fn wait(&mut self) -> Result<ExitStatus> {
        let pump = self
            .pump
            .take()
            .ok_or_else(|| Error::Session("session not started".to_string()))?;
        pump.await
            .map_err(|e| Error::Session(format!("session task failed: {e}")))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close_channel().await?;
        }
        Ok(())
    }
}

impl<C: ExecChannel> Drop for RusshSession<C> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Fans channel messages out to the output queues and tracks the exit status.
struct OutputRouter {
    stdout: mpsc::Sender<Bytes>,
    stderr: mpsc::Sender<Bytes>,
    status: ExitStatus,
}

impl OutputRouter {
    fn new(stdout: mpsc::Sender<Bytes>, stderr: mpsc::Sender<Bytes>) -> Self {
        Self {
            stdout,
            stderr,
            status: ExitStatus::Unknown,
        }
    }

    /// Handle one message. Returns `false` once the channel is closed.
    ///
    /// Waits while the target queue is full. A queue whose reader is gone
    /// drops the chunk.
    async fn route(&mut self, msg: Option<ChannelMsg>) -> bool {
        match msg {
            Some(ChannelMsg::Data { data }) => {
                let _ = self.stdout.send(Bytes::copy_from_slice(&data)).await;
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    let _ = self.stderr.send(Bytes::copy_from_slice(&data)).await;
                } else {
                    trace!("Dropping extended data stream {}", ext);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                self.status = ExitStatus::Code(exit_status);
            }
            Some(ChannelMsg::ExitSignal {
                signal_name,
                error_message,
                ..
            }) => {
                self.status = ExitStatus::Signal {
                    name: format!("{signal_name:?}"),
                    message: error_message,
                };
            }
            // Exit status may still follow EOF.
            Some(ChannelMsg::Eof) => trace!("Remote sent EOF"),
            Some(ChannelMsg::Close) | None => return false,
            Some(other) => trace!("Ignoring channel message: {:?}", other),
        }
        true
    }
}

async fn pump<C: ExecChannel>(
    mut channel: C,
    mut stdin: DuplexStream,
    mut router: OutputRouter,
) -> ExitStatus {
    let mut buffer = vec![0u8; SSH_CMD_BUFFER_SIZE];
    let mut stdin_open = true;

    loop {
        tokio::select! {
            read = stdin.read(&mut buffer), if stdin_open => match read {
                Ok(0) | Err(_) => {
                    stdin_open = false;
                    if let Err(e) = channel.send_eof().await {
                        debug!("Failed to send EOF: {}", e);
                    }
                }
                Ok(n) => {
                    if let Err(e) = channel.send_data(&buffer[..n]).await {
                        warn!("Failed to forward stdin: {}", e);
                        stdin_open = false;
                    }
                }
            },
            msg = channel.next_message() => {
                if !router.route(msg).await {
                    break;
                }
            }
        }
    }

    router.status
}
