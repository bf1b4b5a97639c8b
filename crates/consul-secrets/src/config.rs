//! Configuration structures for the engine.
//!
//! - [`AccessConfig`] is the persisted connection record for one mount.
//! - [`MountConfig`] carries the host-provided lease defaults.
//! - [`ClientOptions`] tunes the Consul HTTP client.

use crate::error::{EngineError, EngineResult};
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// URL scheme used to reach Consul.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(EngineError::validation(format!(
                "scheme must be 'http' or 'https', got '{other}'"
            ))),
        }
    }
}

/// Persisted access configuration for a mount.
///
/// Stored under `config/access`. The management token is kept here and
/// nowhere else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Consul address as `host:port`.
    pub address: String,

    #[serde(default)]
    pub scheme: Scheme,

    /// Management token. Empty only while bootstrapping.
    #[serde(default)]
    pub token: SecretString,

    /// CA certificate (PEM) used to verify Consul.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,

    /// Client certificate (PEM) for mutual TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,

    /// Client private key (PEM) for mutual TLS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<SecretString>,
}

impl AccessConfig {
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Reader-facing view. Never contains the token or the client key.
    pub fn view(&self) -> AccessConfigView {
        AccessConfigView {
            address: self.address.clone(),
            scheme: self.scheme,
            ca_cert: self.ca_cert.clone(),
            client_cert: self.client_cert.clone(),
        }
    }
}

/// Fields accepted by a write to `config/access`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessConfigWrite {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub token: Option<SecretString>,
    #[serde(default)]
    pub ca_cert: Option<String>,
    #[serde(default)]
    pub client_cert: Option<String>,
    #[serde(default)]
    pub client_key: Option<SecretString>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AccessConfigWrite {
    /// Validate the write and turn it into a record.
    ///
    /// The returned token is empty when none was supplied; the caller decides
    /// whether to keep a stored token or bootstrap.
    pub fn validate(self) -> EngineResult<AccessConfig> {
        let address = non_empty(self.address)
            .ok_or_else(|| EngineError::validation("address must be set"))?
            .trim()
            .to_string();

        let scheme: Scheme = self.scheme.as_deref().unwrap_or_default().parse()?;

        let client_cert = non_empty(self.client_cert);
        let client_key = self.client_key.filter(|k| !k.expose().trim().is_empty());
        if client_cert.is_some() != client_key.is_some() {
            return Err(EngineError::validation(
                "client_cert and client_key must both be provided or both be omitted",
            ));
        }

        Ok(AccessConfig {
            address,
            scheme,
            token: self.token.unwrap_or_default(),
            ca_cert: non_empty(self.ca_cert),
            client_cert,
            client_key,
        })
    }
}

/// What a read of `config/access` returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessConfigView {
    pub address: String,
    pub scheme: Scheme,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<String>,
}

/// Lease defaults supplied by the host for this mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// TTL applied when a role leaves `ttl` at zero.
    #[serde(with = "humantime_serde", default = "default_lease_ttl")]
    pub default_lease_ttl: Duration,

    /// Upper bound for every lease on this mount.
    #[serde(with = "humantime_serde", default = "default_max_lease_ttl")]
    pub max_lease_ttl: Duration,

    /// First word of the description of every created token.
    #[serde(default = "default_description_prefix")]
    pub description_prefix: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            default_lease_ttl: default_lease_ttl(),
            max_lease_ttl: default_max_lease_ttl(),
            description_prefix: default_description_prefix(),
        }
    }
}

/// Consul HTTP client options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientOptions {
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Idle connections kept per host.
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            pool_max_idle_per_host: default_pool_max_idle(),
        }
    }
}

// Default value functions for serde
fn default_lease_ttl() -> Duration {
    Duration::from_secs(3600) // 1 hour
}

fn default_max_lease_ttl() -> Duration {
    Duration::from_secs(24 * 3600) // 24 hours
}

fn default_description_prefix() -> String {
    "consul-secrets".to_string()
}

fn default_timeout_ms() -> u64 {
    5000 // 5 seconds
}

fn default_pool_max_idle() -> usize {
    4
}
