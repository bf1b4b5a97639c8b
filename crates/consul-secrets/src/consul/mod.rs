//! Consul ACL integration.
//!
//! This module is the only place that talks to the external ACL system. It
//! provides:
//! - [`AclClient`], the contract the engine depends on
//! - [`ConsulClient`], the HTTP implementation against the Consul ACL API
//! - [`MemoryAcl`], an in-process ACL system for tests and development
//!
//! Clients are built per request by an [`AclClientFactory`] from the stored
//! access configuration, so the management token is never cached beyond the
//! request that needs it.

mod client;
mod memory;
mod types;

pub use client::{ConsulClient, HttpClientFactory};
pub use memory::MemoryAcl;
pub use types::{
    CreateTokenRequest, CreatedToken, NodeIdentity, PolicyLink, RoleLink, ServiceIdentity,
    TokenInfo, TokenScope,
};

use crate::config::AccessConfig;
use crate::secret::SecretString;
use async_trait::async_trait;

/// Errors reported by an [`AclClient`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum AclError {
    /// The ACL system refused to bootstrap because it already was.
    #[error("ACL bootstrap no longer allowed: {0}")]
    AlreadyBootstrapped(String),

    /// The addressed token does not exist.
    #[error("ACL token not found: {0}")]
    TokenNotFound(String),

    /// The management token was rejected or lacks permission.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other non-success response.
    #[error("unexpected response {status}: {body}")]
    Api { status: u16, body: String },

    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),

    /// The client could not be built from the access configuration.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for AclError {
    fn from(err: reqwest::Error) -> Self {
        AclError::Transport(err.to_string())
    }
}

/// Operations the engine needs from the external ACL system.
#[async_trait]
pub trait AclClient: Send + Sync {
    /// Whether the ACL system has completed its one-time bootstrap.
    async fn is_bootstrapped(&self) -> Result<bool, AclError>;

    /// Run the one-time bootstrap and return the resulting management token.
    async fn bootstrap(&self) -> Result<SecretString, AclError>;

    /// Create a token carrying every capability in `request` at once.
    async fn create_token(&self, request: &CreateTokenRequest) -> Result<CreatedToken, AclError>;

    /// Delete the token identified by `accessor`.
    ///
    /// A missing token is reported as [`AclError::TokenNotFound`].
    async fn delete_token(&self, accessor: &str, scope: &TokenScope) -> Result<(), AclError>;

    /// Read token metadata by accessor. `None` when the token does not exist.
    async fn read_token(
        &self,
        accessor: &str,
        scope: &TokenScope,
    ) -> Result<Option<TokenInfo>, AclError>;
}

/// Builds [`AclClient`]s from access configuration.
pub trait AclClientFactory: Send + Sync {
    /// Connect using `config`. An empty token yields an unauthenticated client,
    /// which is what bootstrap needs.
    fn connect(&self, config: &AccessConfig) -> Result<Box<dyn AclClient>, AclError>;
}

/// Delete a token, treating "already gone" as success.
///
/// Returns `true` when the token existed and was deleted, `false` when the
/// ACL system had already forgotten it. Every revoke path goes through here.
pub async fn delete_token_idempotent(
    client: &dyn AclClient,
    accessor: &str,
    scope: &TokenScope,
) -> Result<bool, AclError> {
    match client.delete_token(accessor, scope).await {
        Ok(()) => Ok(true),
        Err(AclError::TokenNotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
