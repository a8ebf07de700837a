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

//! Validation and quoting of values that end up in remote shell commands.

use crate::error::{Error, Result};

/// Check a remote path before it is placed in a shell command.
pub fn validate_remote_path(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(Error::InvalidArgument("empty remote path".to_string()));
    }
    if path.contains('\0') || path.contains('\n') {
        return Err(Error::InvalidArgument(format!(
            "remote path contains control characters: {path:?}"
        )));
    }
    Ok(())
}

/// Quote a remote path for a POSIX shell.
///
/// A leading `~/` stays outside the quotes so the remote shell still expands
/// it to the login user's home directory.
pub fn shell_quote_path(path: &str) -> String {
    match path.strip_prefix("~/") {
        Some(rest) if rest.is_empty() => "~/".to_string(),
        Some(rest) => format!("~/{}", shell_quote(rest)),
        None => shell_quote(path),
    }
}

/// Single-quote `value`, escaping embedded single quotes.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
