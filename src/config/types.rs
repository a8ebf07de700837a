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

//! Configuration type definitions.

use std::fmt;

use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Host the chain ends at.
    #[serde(default)]
    pub target: Option<HostEntry>,

    /// Jump hosts in traversal order.
    #[serde(default)]
    pub jump_hosts: Vec<JumpHostEntry>,

    /// Check host keys against known_hosts. Off by default.
    #[serde(default)]
    pub verify_host_identity: bool,

    /// known_hosts file to check against instead of `~/.ssh/known_hosts`.
    #[serde(default)]
    pub known_hosts_file: Option<String>,

    /// Per-hop connect timeout in seconds; no timeout when unset.
    #[serde(default)]
    pub connect_timeout: Option<u64>,
}

/// A host with optional credentials.
#[derive(Deserialize, Default, Clone)]
pub struct HostEntry {
    pub address: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEntry")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("private_key", &self.private_key)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Jump host configuration format.
///
/// Either a structured [`HostEntry`] or a `"[user@]host"` string. A string
/// entry carries no credentials, so that hop uses the chain default.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum JumpHostEntry {
    Detailed(HostEntry),
    Simple(String),
}
