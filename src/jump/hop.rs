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

//! Hop and chain descriptions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::error::Error;
use crate::ssh::provider::HostPort;

/// One host in the chain: a jump host or the target.
#[derive(Clone, Default)]
pub struct HopConfig {
    /// Hostname or IP address, without port.
    pub address: String,
    pub user: Option<String>,
    pub private_key: Option<PathBuf>,
    pub password: Option<Zeroizing<String>>,
}

impl HopConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key = Some(path.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(password.into()));
        self
    }

    /// Whether a key or password is set.
    pub fn has_credential(&self) -> bool {
        self.private_key.is_some() || self.password.is_some()
    }

    /// Whether this hop authenticates with its own settings rather than the
    /// chain default. Both a user and a credential are required.
    pub fn has_own_auth(&self) -> bool {
        self.user.is_some() && self.has_credential()
    }

    pub fn ssh_address(&self) -> HostPort {
        HostPort::ssh(self.address.clone())
    }
}

impl fmt::Debug for HopConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HopConfig")
            .field("address", &self.address)
            .field("user", &self.user)
            .field("private_key", &self.private_key)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for HopConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}@{}", user, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Parses `[user@]host`.
impl FromStr for HopConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (user, host) = match s.rsplit_once('@') {
            Some((user, host)) => {
                if user.is_empty() {
                    return Err(Error::InvalidArgument(format!("empty user in '{s}'")));
                }
                (Some(user.to_string()), host)
            }
            None => (None, s),
        };

        if host.is_empty() {
            return Err(Error::InvalidArgument(format!("empty host in '{s}'")));
        }
        if host.chars().any(char::is_whitespace) {
            return Err(Error::InvalidArgument(format!("invalid host '{host}'")));
        }

        Ok(Self {
            address: host.to_string(),
            user,
            ..Default::default()
        })
    }
}

/// Parse a comma-separated jump host list such as `bob@bastion,10.0.0.1`.
pub fn parse_jump_hosts(list: &str) -> Result<Vec<HopConfig>, Error> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(HopConfig::from_str)
        .collect()
}

/// Target plus the jump hosts leading to it, in traversal order.
#[derive(Debug, Clone)]
pub struct ChainSpec {
    pub target: HopConfig,
    pub jump_hosts: Vec<HopConfig>,
}

impl ChainSpec {
    pub fn new(target: HopConfig, jump_hosts: Vec<HopConfig>) -> Self {
        Self { target, jump_hosts }
    }

    pub fn direct(target: HopConfig) -> Self {
        Self::new(target, Vec::new())
    }

    /// Every hop in dial order, target last.
    pub fn path(&self) -> impl Iterator<Item = &HopConfig> {
        self.jump_hosts.iter().chain(std::iter::once(&self.target))
    }

    pub fn is_direct(&self) -> bool {
        self.jump_hosts.is_empty()
    }

    /// Human readable path, e.g. `bob@10.0.0.1 -> alice@10.0.0.5`.
    pub fn describe(&self) -> String {
        self.path()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hop() {
        let hop: HopConfig = "bob@10.0.0.1".parse().unwrap();
        assert_eq!(hop.user.as_deref(), Some("bob"));
        assert_eq!(hop.address, "10.0.0.1");
        assert!(!hop.has_credential());

        let hop: HopConfig = "bastion.example.com".parse().unwrap();
        assert_eq!(hop.user, None);
        assert_eq!(hop.ssh_address().to_string(), "bastion.example.com:22");
    }

    #[test]
    fn test_parse_hop_rejects_malformed() {
        assert!("".parse::<HopConfig>().is_err());
        assert!("@host".parse::<HopConfig>().is_err());
        assert!("user@".parse::<HopConfig>().is_err());
        assert!("bad host".parse::<HopConfig>().is_err());
    }

    #[test]
    fn test_parse_jump_hosts() {
        let hops = parse_jump_hosts("bob@jump1, jump2,,").unwrap();
        assert_eq!(hops.len(), 2);
        assert_eq!(hops[0].to_string(), "bob@jump1");
        assert_eq!(hops[1].to_string(), "jump2");

        assert!(parse_jump_hosts("").unwrap().is_empty());
    }

    #[test]
    fn test_own_auth_needs_user_and_credential() {
        assert!(HopConfig::new("h").with_user("u").with_password("p").has_own_auth());
        assert!(HopConfig::new("h").with_user("u").with_private_key("/k").has_own_auth());
        assert!(!HopConfig::new("h").with_user("u").has_own_auth());
        assert!(!HopConfig::new("h").with_password("p").has_own_auth());
    }

    #[test]
    fn test_debug_redacts_password() {
        let hop = HopConfig::new("h").with_user("u").with_password("hunter2");
        let debug = format!("{hop:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_chain_path_order() {
        let spec = ChainSpec::new(
            HopConfig::new("10.0.0.5").with_user("alice"),
            vec![HopConfig::new("10.0.0.1").with_user("bob"), HopConfig::new("10.0.0.2")],
        );
        let order: Vec<_> = spec.path().map(|h| h.address.as_str()).collect();
        assert_eq!(order, ["10.0.0.1", "10.0.0.2", "10.0.0.5"]);
        assert_eq!(spec.path().count(), 3);
        assert!(!spec.is_direct());
        assert_eq!(spec.describe(), "bob@10.0.0.1 -> 10.0.0.2 -> alice@10.0.0.5");
    }
}
