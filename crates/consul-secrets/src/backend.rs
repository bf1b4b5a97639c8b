//! The engine facade for one mount.

use crate::access::{self, TokenSource};
use crate::config::{AccessConfigView, AccessConfigWrite, MountConfig};
use crate::consul::AclClientFactory;
use crate::error::EngineResult;
use crate::issuer::{self, IssuedCredential};
use crate::lease::{self, Lease};
use crate::role::{self, Role, RoleWrite};
use crate::storage::Storage;
use std::sync::Arc;
use time::OffsetDateTime;

/// Consul ACL token secrets engine bound to one mount's storage.
///
/// Holds no state of its own beyond its collaborators; every call reads what
/// it needs from storage. Cheap to clone.
#[derive(Clone)]
pub struct ConsulBackend {
    storage: Arc<dyn Storage>,
    factory: Arc<dyn AclClientFactory>,
    mount: MountConfig,
}

impl ConsulBackend {
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: Arc<dyn AclClientFactory>,
        mount: MountConfig,
    ) -> Self {
        Self {
            storage,
            factory,
            mount,
        }
    }

    pub fn mount(&self) -> &MountConfig {
        &self.mount
    }

    pub async fn write_access(&self, input: AccessConfigWrite) -> EngineResult<TokenSource> {
        access::write_access(self.storage.as_ref(), self.factory.as_ref(), input).await
    }

    pub async fn read_access(&self) -> EngineResult<Option<AccessConfigView>> {
        access::read_access(self.storage.as_ref()).await
    }

    /// Returns warnings about ignored legacy fields.
    pub async fn write_role(&self, name: &str, input: RoleWrite) -> EngineResult<Vec<String>> {
        role::write_role(self.storage.as_ref(), name, input).await
    }

    pub async fn read_role(&self, name: &str) -> EngineResult<Option<Role>> {
        role::read_role(self.storage.as_ref(), name).await
    }

    pub async fn list_roles(&self) -> EngineResult<Vec<String>> {
        role::list_roles(self.storage.as_ref()).await
    }

    pub async fn delete_role(&self, name: &str) -> EngineResult<()> {
        role::delete_role(self.storage.as_ref(), name).await
    }

    pub async fn issue(&self, role_name: &str) -> EngineResult<(IssuedCredential, Lease)> {
        issuer::issue(
            self.storage.as_ref(),
            self.factory.as_ref(),
            &self.mount,
            role_name,
            OffsetDateTime::now_utc(),
        )
        .await
    }

    pub async fn renew(&self, lease: &Lease) -> EngineResult<Lease> {
        lease::renew(
            self.storage.as_ref(),
            &self.mount,
            lease,
            OffsetDateTime::now_utc(),
        )
        .await
    }

    /// Returns whether the token still existed in Consul.
    pub async fn revoke(&self, lease: &Lease) -> EngineResult<bool> {
        lease::revoke(self.storage.as_ref(), self.factory.as_ref(), lease).await
    }
}
