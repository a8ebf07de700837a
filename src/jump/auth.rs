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

//! Per-hop authentication settings.
//!
//! Key material is read and parsed when an [`AuthConfig`] is built, so a bad
//! key surfaces before anything touches the network.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::keys::PrivateKey;
use zeroize::Zeroizing;

use super::hop::HopConfig;
use crate::config::utils::{expand_tilde, get_current_username};
use crate::error::{Error, Result};

/// A single way of proving identity to a host.
#[derive(Clone)]
pub enum AuthMethod {
    PrivateKey { path: PathBuf, key: Arc<PrivateKey> },
    Password(Zeroizing<String>),
}

impl AuthMethod {
    /// Read and decode an unencrypted private key file.
    pub fn load_private_key(path: &Path) -> Result<Self> {
        let path = expand_tilde(path);
        let contents =
            Zeroizing::new(
                std::fs::read_to_string(&path).map_err(|source| Error::KeyUnreadable {
                    path: path.clone(),
                    source,
                })?,
            );
        let key = russh::keys::decode_secret_key(&contents, None).map_err(|source| {
            Error::KeyInvalid {
                path: path.clone(),
                source,
            }
        })?;

        Ok(AuthMethod::PrivateKey {
            path,
            key: Arc::new(key),
        })
    }

    pub fn password(password: impl Into<String>) -> Self {
        AuthMethod::Password(Zeroizing::new(password.into()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuthMethod::PrivateKey { .. } => "publickey",
            AuthMethod::Password(_) => "password",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::PrivateKey { path, .. } => {
                f.debug_struct("PrivateKey").field("path", path).finish()
            }
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

/// User plus the methods to try, in order.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub user: String,
    pub methods: Vec<AuthMethod>,
}

impl AuthConfig {
    pub fn new(user: impl Into<String>, methods: Vec<AuthMethod>) -> Self {
        Self {
            user: user.into(),
            methods,
        }
    }

    /// Build the settings a hop describes.
    ///
    /// A missing user becomes the current OS user. The key is offered before
    /// the password when both are set. A hop with neither fails with
    /// [`Error::NoAuthMethod`].
    pub fn from_hop(hop: &HopConfig) -> Result<Self> {
        let user = hop.user.clone().unwrap_or_else(get_current_username);

        let mut methods = Vec::with_capacity(2);
        if let Some(path) = &hop.private_key {
            methods.push(AuthMethod::load_private_key(path)?);
        }
        if let Some(password) = &hop.password {
            methods.push(AuthMethod::Password(password.clone()));
        }

        if methods.is_empty() {
            return Err(Error::NoAuthMethod {
                user,
                address: hop.address.clone(),
            });
        }

        Ok(Self { user, methods })
    }
}

/// Settings to use for `hop`.
///
/// The hop's own user and credential are used only when both are present;
/// otherwise `default` is used unchanged, user included.
pub fn resolve_auth(hop: &HopConfig, default: &AuthConfig) -> Result<AuthConfig> {
    if hop.has_own_auth() {
        AuthConfig::from_hop(hop)
    } else {
        Ok(default.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn password_of(auth: &AuthConfig) -> Option<&str> {
        auth.methods.iter().find_map(|m| match m {
            AuthMethod::Password(p) => Some(p.as_str()),
            _ => None,
        })
    }

    #[test]
    fn test_from_hop_without_credential_fails() {
        let hop = HopConfig::new("10.0.0.5").with_user("alice");
        match AuthConfig::from_hop(&hop) {
            Err(Error::NoAuthMethod { user, address }) => {
                assert_eq!(user, "alice");
                assert_eq!(address, "10.0.0.5");
            }
            other => panic!("expected NoAuthMethod, got {other:?}"),
        }
    }

    #[test]
    fn test_from_hop_password() {
        let hop = HopConfig::new("10.0.0.5").with_user("alice").with_password("p");
        let auth = AuthConfig::from_hop(&hop).unwrap();
        assert_eq!(auth.user, "alice");
        assert_eq!(auth.methods.len(), 1);
        assert_eq!(password_of(&auth), Some("p"));
    }

    #[test]
    fn test_resolve_uses_own_pair() {
        let default = AuthConfig::new("alice", vec![AuthMethod::password("p")]);
        let hop = HopConfig::new("10.0.0.1").with_user("bob").with_password("b");

        let auth = resolve_auth(&hop, &default).unwrap();
        assert_eq!(auth.user, "bob");
        assert_eq!(password_of(&auth), Some("b"));
    }

    #[test]
    fn test_resolve_never_mixes() {
        let default = AuthConfig::new("alice", vec![AuthMethod::password("p")]);

        // user without credential
        let auth = resolve_auth(&HopConfig::new("h").with_user("bob"), &default).unwrap();
        assert_eq!(auth.user, "alice");
        assert_eq!(password_of(&auth), Some("p"));

        // credential without user
        let auth = resolve_auth(&HopConfig::new("h").with_password("b"), &default).unwrap();
        assert_eq!(auth.user, "alice");
        assert_eq!(password_of(&auth), Some("p"));
    }

    #[test]
    fn test_unreadable_key() {
        let hop = HopConfig::new("h")
            .with_user("u")
            .with_private_key("/nonexistent/sshchain/id_ed25519");
        assert!(matches!(
            AuthConfig::from_hop(&hop),
            Err(Error::KeyUnreadable { .. })
        ));
    }

    #[test]
    fn test_unparsable_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not a key").unwrap();

        let hop = HopConfig::new("h").with_user("u").with_private_key(file.path());
        assert!(matches!(
            AuthConfig::from_hop(&hop),
            Err(Error::KeyInvalid { .. })
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let auth = AuthConfig::new("alice", vec![AuthMethod::password("hunter2")]);
        assert!(!format!("{auth:?}").contains("hunter2"));
    }
}
