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

//! Configuration loading and conversion into chain settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tokio::fs;

use super::types::{Config, HostEntry, JumpHostEntry};
use super::utils::expand_tilde;
use crate::jump::hop::{ChainSpec, HopConfig};
use crate::ssh::russh_provider::{HostVerification, RusshProvider};

impl Config {
    /// `~/.config/sshchain/config.yaml` or the platform equivalent.
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("", "", "sshchain")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("~/.config/sshchain/config.yaml"))
    }

    /// Load configuration from a file. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read configuration file at {}",
                    expanded_path.display()
                )
            })?;

        Self::parse(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}",
                expanded_path.display()
            )
        })
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Jump hosts as hop settings, in order.
    pub fn jump_hops(&self) -> Result<Vec<HopConfig>> {
        self.jump_hosts
            .iter()
            .map(|entry| match entry {
                JumpHostEntry::Detailed(host) => Ok(host.to_hop()),
                JumpHostEntry::Simple(spec) => spec
                    .parse::<HopConfig>()
                    .with_context(|| format!("Invalid jump host '{spec}'")),
            })
            .collect()
    }

    /// Chain described by this file, if it names a target.
    pub fn chain_spec(&self) -> Result<Option<ChainSpec>> {
        match &self.target {
            Some(target) => Ok(Some(ChainSpec::new(target.to_hop(), self.jump_hops()?))),
            None => Ok(None),
        }
    }

    pub fn host_verification(&self) -> HostVerification {
        match (&self.known_hosts_file, self.verify_host_identity) {
            (Some(path), true) => HostVerification::KnownHostsFile(expand_tilde(Path::new(path))),
            (_, verify) => HostVerification::from_flag(verify),
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }

    /// Transport provider configured from this file.
    pub fn provider(&self) -> RusshProvider {
        RusshProvider::new()
            .with_host_verification(self.host_verification())
            .with_connect_timeout(self.connect_timeout())
    }
}

impl HostEntry {
    pub fn to_hop(&self) -> HopConfig {
        let mut hop = HopConfig::new(self.address.clone());
        if let Some(user) = &self.user {
            hop = hop.with_user(user.clone());
        }
        if let Some(key) = &self.private_key {
            hop = hop.with_private_key(key.clone());
        }
        if let Some(password) = &self.password {
            hop = hop.with_password(password.clone());
        }
        hop
    }
}
