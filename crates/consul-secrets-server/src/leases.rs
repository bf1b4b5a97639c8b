// SPDX-License-Identifier: AGPL-3.0-only
//! In-memory lease table.
//!
//! Stands in for the host's lease accounting: leases are keyed by an opaque
//! id handed to the caller, while the lease itself, including the accessor
//! needed for revocation, stays in the process. Nothing here survives a
//! restart.

use consul_secrets::Lease;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct LeaseTable {
    leases: Arc<RwLock<HashMap<String, Lease>>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lease and return its id, `consul/creds/<role>/<uuid>`.
    pub async fn insert(&self, lease: Lease) -> String {
        let id = format!("consul/creds/{}/{}", lease.internal.role, Uuid::new_v4());
        self.leases.write().await.insert(id.clone(), lease);
        id
    }

    pub async fn get(&self, id: &str) -> Option<Lease> {
        self.leases.read().await.get(id).cloned()
    }

    /// Replace a lease after renewal. A lease revoked in the meantime stays gone.
    pub async fn update(&self, id: &str, lease: Lease) -> bool {
        match self.leases.write().await.get_mut(id) {
            Some(entry) => {
                *entry = lease;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &str) -> Option<Lease> {
        self.leases.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.leases.read().await.len()
    }
}
