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

//! Remote command execution with captured or line-streamed output.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ssh::provider::{Session, SessionReader, Transport};

/// Callback invoked once per output line, without the line terminator.
pub type LineHandler = Arc<dyn Fn(&str) + Send + Sync>;

/// Where streamed lines go: one combined handler, or a stdout/stderr pair.
/// Exactly one of the two shapes must be set.
#[derive(Clone, Default)]
pub struct OutputHandlers {
    combined: Option<LineHandler>,
    separate: Option<(LineHandler, LineHandler)>,
}

impl OutputHandlers {
    /// Send lines from both streams to `handler`.
    pub fn combined(handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self::default().with_combined(handler)
    }

    /// Send stdout lines to `on_stdout` and stderr lines to `on_stderr`.
    pub fn separate(
        on_stdout: impl Fn(&str) + Send + Sync + 'static,
        on_stderr: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        Self::default().with_separate(on_stdout, on_stderr)
    }

    pub fn with_combined(mut self, handler: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.combined = Some(Arc::new(handler));
        self
    }

    pub fn with_separate(
        mut self,
        on_stdout: impl Fn(&str) + Send + Sync + 'static,
        on_stderr: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.separate = Some((Arc::new(on_stdout), Arc::new(on_stderr)));
        self
    }

    /// Handlers for (stdout, stderr), or an invalid-argument error when not
    /// exactly one shape is set.
    pub fn resolve(&self) -> Result<(LineHandler, LineHandler)> {
        match (&self.combined, &self.separate) {
            (Some(handler), None) => Ok((Arc::clone(handler), Arc::clone(handler))),
            (None, Some((out, err))) => Ok((Arc::clone(out), Arc::clone(err))),
            (None, None) => Err(Error::InvalidArgument(
                "no output handler provided".to_string(),
            )),
            (Some(_), Some(_)) => Err(Error::InvalidArgument(
                "provide either a combined or a separate output handler, not both".to_string(),
            )),
        }
    }
}

impl fmt::Debug for OutputHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputHandlers")
            .field("combined", &self.combined.is_some())
            .field("separate", &self.separate.is_some())
            .finish()
    }
}

/// Strip `\n` and a preceding `\r`.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Deliver every line of `reader` to `handler` as it arrives.
///
/// A final line without a terminator is delivered too. Invalid UTF-8 is
/// replaced rather than treated as an error. Returns the number of lines.
pub async fn scan_lines<R: AsyncRead + Unpin>(
    reader: R,
    handler: &(dyn Fn(&str) + Send + Sync),
) -> io::Result<usize> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut count = 0;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        handler(String::from_utf8_lossy(trim_line_ending(&line)).as_ref());
        count += 1;
    }

    Ok(count)
}

fn take_pipes(session: &mut dyn Session) -> Result<(SessionReader, SessionReader)> {
    let stdout = session
        .take_stdout()
        .ok_or_else(|| Error::Session("stdout pipe unavailable".to_string()))?;
    let stderr = session
        .take_stderr()
        .ok_or_else(|| Error::Session("stderr pipe unavailable".to_string()))?;
    Ok((stdout, stderr))
}

/// Run `command` and stream its output line by line.
///
/// Returns after the command exits and both streams reach EOF. A failing
/// exit status is reported after every line has been delivered.
pub async fn stream_command<T: Transport + ?Sized>(
    transport: &T,
    command: &str,
    handlers: &OutputHandlers,
) -> Result<()> {
    let (on_stdout, on_stderr) = handlers.resolve()?;

    let mut session = transport.new_session().await?;
    let result = stream_session(session.as_mut(), command, &*on_stdout, &*on_stderr).await;
    if let Err(e) = session.close().await {
        trace!("Session close after streaming: {}", e);
    }
    result
}

async fn stream_session(
    session: &mut dyn Session,
    command: &str,
    on_stdout: &(dyn Fn(&str) + Send + Sync),
    on_stderr: &(dyn Fn(&str) + Send + Sync),
) -> Result<()> {
    let (stdout, stderr) = take_pipes(session)?;
    session.start(command).await?;

    let (out_lines, err_lines) = tokio::join!(
        scan_lines(stdout, on_stdout),
        scan_lines(stderr, on_stderr)
    );
    let status = session.wait().await?;

    let out_lines = out_lines.map_err(|e| Error::io("failed to read remote stdout", e))?;
    let err_lines = err_lines.map_err(|e| Error::io("failed to read remote stderr", e))?;
    debug!(
        "Command finished with {}: {} stdout line(s), {} stderr line(s)",
        status, out_lines, err_lines
    );

    if !status.success() {
        return Err(Error::CommandFailed {
            command: command.to_string(),
            status,
            output: None,
        });
    }
    Ok(())
}

async fn drain_into<R: AsyncRead + Unpin>(
    mut reader: R,
    sink: &Mutex<Vec<u8>>,
) -> io::Result<()> {
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        sink.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(&buffer[..n]);
    }
}

/// Run `command` and return stdout and stderr interleaved in arrival order.
///
/// A failing exit status yields [`Error::CommandFailed`] carrying the output.
pub async fn execute_command<T: Transport + ?Sized>(
    transport: &T,
    command: &str,
) -> Result<String> {
    let mut session = transport.new_session().await?;
    let result = execute_session(session.as_mut(), command).await;
    if let Err(e) = session.close().await {
        trace!("Session close after execution: {}", e);
    }
    result
}

async fn execute_session(session: &mut dyn Session, command: &str) -> Result<String> {
    let (stdout, stderr) = take_pipes(session)?;
    session.start(command).await?;

    let combined = Mutex::new(Vec::new());
    let (out, err) = tokio::join!(drain_into(stdout, &combined), drain_into(stderr, &combined));
    let status = session.wait().await?;
    out.map_err(|e| Error::io("failed to read remote stdout", e))?;
    err.map_err(|e| Error::io("failed to read remote stderr", e))?;

    let bytes = combined.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
    let output = String::from_utf8_lossy(&bytes).into_owned();

    if status.success() {
        Ok(output)
    } else {
        Err(Error::CommandFailed {
            command: command.to_string(),
            status,
            output: Some(output),
        })
    }
}
