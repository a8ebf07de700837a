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

//! Source side of the SCP protocol for a single file.
//!
//! The remote `scp -t` sink acknowledges every step with one byte: `0` for
//! ok, `1` or `2` followed by a message line for a warning or a fatal error.

use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::{Error, Result};

const SCP_OK: u8 = 0;
const SCP_WARNING: u8 = 1;

/// Permission bits sent for every upload.
pub const SCP_FILE_MODE: u32 = 0o644;

/// Control line announcing one file: `C0644 <size> <name>\n`.
pub fn file_header(size: u64, name: &str) -> String {
    format!("C{SCP_FILE_MODE:04o} {size} {name}\n")
}

/// Final component of the remote path, used as the file name in the header.
pub fn remote_basename(remote_path: &str) -> Result<&str> {
    Path::new(remote_path)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            Error::InvalidArgument(format!("remote path has no file name: {remote_path}"))
        })
}

/// Read one acknowledgement from the sink.
pub async fn wait_for_ok<R: AsyncRead + Unpin>(reader: &mut R) -> Result<()> {
    let mut code = [0u8; 1];
    let n = reader
        .read(&mut code)
        .await
        .map_err(|e| Error::io("failed to read scp acknowledgement", e))?;
    if n == 0 {
        return Err(Error::Protocol(
            "remote scp closed before acknowledging".to_string(),
        ));
    }
    if code[0] == SCP_OK {
        trace!("scp ack ok");
        return Ok(());
    }

    let mut message = Vec::new();
    let mut byte = [0u8; 1];
    while reader
        .read(&mut byte)
        .await
        .map_err(|e| Error::io("failed to read scp error message", e))?
        == 1
    {
        if byte[0] == b'\n' {
            break;
        }
        message.push(byte[0]);
    }

    let message = String::from_utf8_lossy(&message);
    let kind = if code[0] == SCP_WARNING {
        "warning"
    } else {
        "error"
    };
    Err(Error::Protocol(format!("scp {kind}: {}", message.trim())))
}

/// Send one file to a sink that has already been started.
///
/// Writes the header, exactly `size` bytes from `source` and the trailing
/// NUL, checking an acknowledgement after each step. Returns the payload
/// size.
pub async fn send_file<S, W, A>(
    source: S,
    size: u64,
    name: &str,
    stdin: &mut W,
    acks: &mut A,
) -> Result<u64>
where
    S: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + ?Sized,
    A: AsyncRead + Unpin,
{
    wait_for_ok(acks).await?;

    let header = file_header(size, name);
    debug!("Sending scp header: {}", header.trim_end());
    stdin
        .write_all(header.as_bytes())
        .await
        .map_err(|e| Error::io("failed to send scp header", e))?;
    stdin
        .flush()
        .await
        .map_err(|e| Error::io("failed to send scp header", e))?;
    wait_for_ok(acks).await?;

    let mut payload = source.take(size);
    let copied = tokio::io::copy(&mut payload, stdin)
        .await
        .map_err(|e| Error::io("failed to send file contents", e))?;
    if copied != size {
        return Err(Error::io(
            format!("source ended after {copied} of {size} bytes"),
            std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
        ));
    }

    stdin
        .write_all(&[0])
        .await
        .map_err(|e| Error::io("failed to finish scp transfer", e))?;
    stdin
        .flush()
        .await
        .map_err(|e| Error::io("failed to finish scp transfer", e))?;
    wait_for_ok(acks).await?;

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_file_header() {
        assert_eq!(file_header(11, "t.txt"), "C0644 11 t.txt\n");
        assert_eq!(file_header(0, "empty"), "C0644 0 empty\n");
    }

    #[test]
    fn test_remote_basename() {
        assert_eq!(remote_basename("/tmp/t.txt").unwrap(), "t.txt");
        assert_eq!(remote_basename("t.txt").unwrap(), "t.txt");
        assert_eq!(remote_basename("~/dir/file").unwrap(), "file");
        assert!(remote_basename("/").is_err());
    }

    #[tokio::test]
    async fn test_wait_for_ok() {
        let mut acks = Cursor::new(vec![0u8]);
        assert!(wait_for_ok(&mut acks).await.is_ok());

        let mut acks = Cursor::new(b"\x02scp: /root/x: Permission denied\n".to_vec());
        let err = wait_for_ok(&mut acks).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "remote file transfer failed: scp error: scp: /root/x: Permission denied"
        );

        let mut acks = Cursor::new(Vec::new());
        assert!(matches!(
            wait_for_ok(&mut acks).await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_send_file_wire_format() {
        let mut stdin = Vec::new();
        let mut acks = Cursor::new(vec![0u8, 0, 0]);

        let sent = send_file(&b"hello world"[..], 11, "t.txt", &mut stdin, &mut acks)
            .await
            .unwrap();

        assert_eq!(sent, 11);
        assert_eq!(stdin, b"C0644 11 t.txt\nhello world\0");
    }

    #[tokio::test]
    async fn test_send_file_short_source() {
        let mut stdin = Vec::new();
        let mut acks = Cursor::new(vec![0u8, 0, 0]);

        let err = send_file(&b"abc"[..], 10, "f", &mut stdin, &mut acks)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[tokio::test]
    async fn test_send_file_rejected_header() {
        let mut stdin = Vec::new();
        let mut acks = Cursor::new(b"\x00\x01disk full\n".to_vec());

        let err = send_file(&b"data"[..], 4, "f", &mut stdin, &mut acks)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("scp warning: disk full"));
        assert_eq!(stdin, b"C0644 4 f\n");
    }
}
