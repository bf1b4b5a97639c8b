//! Dynamic Consul ACL token secrets engine.
//!
//! This crate mints short-lived Consul ACL tokens on behalf of a secrets
//! broker:
//! - Access configuration, with a one-time bootstrap of the Consul ACL system
//! - Roles describing the policies, roles and identities a token carries
//! - Credential issuance with a host-tracked lease
//! - Lease renewal and idempotent revocation
//!
//! Persistence and lease scheduling belong to the host, reached through the
//! [`Storage`] trait and the renew/revoke callbacks.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use consul_secrets::{
//!     AccessConfigWrite, ConsulBackend, HttpClientFactory, MemoryStorage, MountConfig,
//! };
//!
//! # async fn example() -> Result<(), consul_secrets::EngineError> {
//! let backend = ConsulBackend::new(
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(HttpClientFactory::default()),
//!     MountConfig::default(),
//! );
//!
//! backend
//!     .write_access(AccessConfigWrite {
//!         address: Some("127.0.0.1:8500".to_string()),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! let role = serde_json::from_value(serde_json::json!({
//!     "consul_policies": ["readonly"],
//!     "ttl": "10m",
//! }))
//! .expect("valid role");
//! backend.write_role("example", role).await?;
//!
//! let (credential, lease) = backend.issue("example").await?;
//! println!("accessor {}", credential.accessor);
//! backend.revoke(&lease).await?;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod backend;
pub mod bootstrap;
pub mod capability;
pub mod config;
pub mod consul;
pub mod error;
pub mod issuer;
pub mod lease;
pub mod role;
pub mod secret;
pub mod storage;

// Re-exports for convenience
pub use access::TokenSource;
pub use backend::ConsulBackend;
pub use bootstrap::BootstrapState;
pub use capability::{Capability, CapabilitySet};
pub use config::{
    AccessConfig, AccessConfigView, AccessConfigWrite, ClientOptions, MountConfig, Scheme,
};
pub use consul::{AclClient, AclClientFactory, AclError, ConsulClient, HttpClientFactory, MemoryAcl};
pub use error::{EngineError, EngineResult};
pub use issuer::IssuedCredential;
pub use lease::{Lease, LeaseInternal, LeaseTerms};
pub use role::{Role, RoleView, RoleWrite};
pub use secret::SecretString;
pub use storage::{MemoryStorage, Storage, StorageError};
