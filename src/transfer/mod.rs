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

//! Writing data to files on the target host.
//!
//! Two remote receivers are supported: `scp -t <path>` driven through the
//! SCP control protocol, and a plain `cat > <path>` passthrough for small
//! text payloads.

pub mod scp;

use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::ssh::provider::{Session, SessionReader, SessionWriter, Transport};
use crate::utils::sanitize::{shell_quote_path, validate_remote_path};

/// Remote command that writes its stdin to `remote_path`.
pub fn cat_command(remote_path: &str) -> String {
    format!("cat > {}", shell_quote_path(remote_path))
}

/// Remote command that runs an SCP sink for `remote_path`.
pub fn scp_sink_command(remote_path: &str) -> String {
    format!("scp -t {}", shell_quote_path(remote_path))
}

async fn read_stderr(stderr: Option<SessionReader>) -> String {
    let mut text = String::new();
    if let Some(mut stderr) = stderr {
        let mut bytes = Vec::new();
        if stderr.read_to_end(&mut bytes).await.is_ok() {
            text = String::from_utf8_lossy(&bytes).trim_end().to_string();
        }
    }
    text
}

/// Wait for the remote command; a failing exit becomes
/// [`Error::CommandFailed`] carrying whatever it printed on stderr.
async fn finish(
    session: &mut dyn Session,
    command: &str,
    stderr: Option<SessionReader>,
) -> Result<()> {
    let (status, stderr_text) = tokio::join!(session.wait(), read_stderr(stderr));
    let status = status?;
    if status.success() {
        Ok(())
    } else {
        Err(Error::CommandFailed {
            command: command.to_string(),
            status,
            output: Some(stderr_text),
        })
    }
}

fn take_stdin(session: &mut dyn Session) -> Result<SessionWriter> {
    session
        .take_stdin()
        .ok_or_else(|| Error::Session("stdin pipe unavailable".to_string()))
}

/// Copy `reader` into `remote_path` with `cat`. Returns the bytes written.
pub async fn stream_to_remote_file<T, R>(
    transport: &T,
    reader: R,
    remote_path: &str,
) -> Result<u64>
where
    T: Transport + ?Sized,
    R: AsyncRead + Unpin + Send,
{
    validate_remote_path(remote_path)?;
    let command = cat_command(remote_path);

    let mut session = transport.new_session().await?;
    let result = cat_session(session.as_mut(), &command, reader).await;
    if let Err(e) = session.close().await {
        trace!("Session close after upload: {}", e);
    }
    result
}

async fn cat_session<R: AsyncRead + Unpin + Send>(
    session: &mut dyn Session,
    command: &str,
    mut reader: R,
) -> Result<u64> {
    let mut stdin = take_stdin(session)?;
    let stderr = session.take_stderr();
    session.start(command).await?;

    let written = tokio::io::copy(&mut reader, &mut stdin)
        .await
        .map_err(|e| Error::io("failed to write to remote file", e))?;
    stdin
        .shutdown()
        .await
        .map_err(|e| Error::io("failed to close remote stdin", e))?;
    drop(stdin);

    finish(session, command, stderr).await?;
    debug!("Wrote {} bytes with `{}`", written, command);
    Ok(written)
}

/// Upload `size` bytes from `reader` to `remote_path` through an SCP sink.
pub async fn scp_upload<T, R>(
    transport: &T,
    reader: R,
    size: u64,
    remote_path: &str,
) -> Result<u64>
where
    T: Transport + ?Sized,
    R: AsyncRead + Unpin + Send,
{
    validate_remote_path(remote_path)?;
    let name = scp::remote_basename(remote_path)?;
    let command = scp_sink_command(remote_path);

    let mut session = transport.new_session().await?;
    let result = scp_session(session.as_mut(), &command, reader, size, name).await;
    if let Err(e) = session.close().await {
        trace!("Session close after scp: {}", e);
    }
    result
}

async fn scp_session<R: AsyncRead + Unpin + Send>(
    session: &mut dyn Session,
    command: &str,
    reader: R,
    size: u64,
    name: &str,
) -> Result<u64> {
    let mut stdin = take_stdin(session)?;
    let mut acks = session
        .take_stdout()
        .ok_or_else(|| Error::Session("stdout pipe unavailable".to_string()))?;
    let stderr = session.take_stderr();
    session.start(command).await?;

    let sent = scp::send_file(reader, size, name, &mut stdin, &mut acks).await?;
    stdin
        .shutdown()
        .await
        .map_err(|e| Error::io("failed to close remote stdin", e))?;
    drop(stdin);
    drop(acks);

    finish(session, command, stderr).await?;
    debug!("Uploaded {} bytes with `{}`", sent, command);
    Ok(sent)
}

/// Upload a local file through an SCP sink.
pub async fn scp_upload_file<T: Transport + ?Sized>(
    transport: &T,
    local_path: &Path,
    remote_path: &str,
) -> Result<u64> {
    let file = tokio::fs::File::open(local_path)
        .await
        .map_err(|e| Error::io(format!("failed to open {}", local_path.display()), e))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| Error::io(format!("failed to stat {}", local_path.display()), e))?
        .len();

    scp_upload(transport, file, size, remote_path).await
}
