//! Caller-key to GitHub credential resolution
//!
//! A caller presents an opaque API key; the token store maps it to either a
//! direct GitHub credential or a GitHub App installation, minting and caching
//! short-lived installation tokens as needed. Every failure mode collapses to
//! `None` at the trait boundary - the gateway only needs "usable credential
//! or not", causes go to the logs.

mod installation;
pub mod jwt;

pub use installation::InstallationTokenStore;

use std::collections::HashMap;

use async_trait::async_trait;

/// Prefix marking a mapping value as a GitHub App installation reference.
pub const INSTALLATION_PREFIX: &str = "installation:";

/// A mapping value, parsed once when the mapping is loaded.
///
/// Parsing at the load boundary means nothing downstream ever re-inspects
/// the raw string, and a malformed installation reference cannot survive
/// past startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedToken {
    /// Passthrough credential, returned verbatim (non-App deployments).
    Direct(String),
    /// GitHub App installation, resolved to a minted short-lived token.
    Installation(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("invalid installation ID '{0}': expected a positive integer")]
    InvalidInstallationId(String),
}

impl MappedToken {
    /// Parses a raw mapping value.
    ///
    /// `installation:<positive integer>` becomes [`MappedToken::Installation`];
    /// a malformed suffix is an error, never a silent fall back to a direct
    /// token. Anything without the prefix is a direct credential.
    pub fn parse(value: &str) -> Result<Self, MappingError> {
        match value.strip_prefix(INSTALLATION_PREFIX) {
            Some(suffix) => match suffix.parse::<u64>() {
                Ok(id) if id > 0 => Ok(Self::Installation(id)),
                _ => Err(MappingError::InvalidInstallationId(suffix.to_string())),
            },
            None => Ok(Self::Direct(value.to_string())),
        }
    }
}

/// Resolves a caller key to a GitHub credential.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns the GitHub credential for `caller_key`, or `None` if the key
    /// is unmapped or resolution failed. Unmapped keys must be cheap: no
    /// network calls, no side effects.
    async fn resolve(&self, caller_key: &str) -> Option<String>;
}

/// Direct passthrough store for deployments without GitHub App credentials.
/// The mapping is immutable for the process lifetime.
pub struct StaticTokenStore {
    mapping: HashMap<String, String>,
}

impl StaticTokenStore {
    pub fn new(mapping: HashMap<String, String>) -> Self {
        Self { mapping }
    }
}

#[async_trait]
impl TokenStore for StaticTokenStore {
    async fn resolve(&self, caller_key: &str) -> Option<String> {
        self.mapping.get(caller_key).cloned()
    }
}
