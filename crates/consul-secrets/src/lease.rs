//! Lease callbacks.
//!
//! A lease is host-side metadata only: Consul tokens have no expiry of their
//! own here. Renewal therefore never contacts Consul, and revocation is the
//! only teardown that does.

use crate::access::load_access;
use crate::config::MountConfig;
use crate::consul::{delete_token_idempotent, AclClientFactory, TokenScope};
use crate::error::{EngineError, EngineResult};
use crate::role::read_role;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info};

/// Data needed to revoke exactly the token that was issued.
///
/// Captured at issue time and never re-derived from the role, which may have
/// changed or been deleted since.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseInternal {
    pub role: String,
    pub accessor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default)]
    pub local: bool,
}

impl LeaseInternal {
    pub fn scope(&self) -> TokenScope {
        TokenScope::new(self.namespace.clone(), self.partition.clone())
    }
}

/// Lease attached to an issued credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Zero means unbounded.
    #[serde(with = "humantime_serde")]
    pub max_ttl: Duration,
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,
    pub renewable: bool,
    pub internal: LeaseInternal,
}

/// TTL and max TTL after applying mount defaults and caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseTerms {
    pub ttl: Duration,
    pub max_ttl: Duration,
}

impl LeaseTerms {
    /// Combine role durations with the mount configuration.
    ///
    /// Zero role values fall back to the mount; the mount maximum caps both.
    pub fn resolve(role_ttl: Duration, role_max_ttl: Duration, mount: &MountConfig) -> Self {
        let system_max = mount.max_lease_ttl;

        let mut max_ttl = if role_max_ttl.is_zero() {
            system_max
        } else {
            role_max_ttl
        };
        if !system_max.is_zero() && max_ttl > system_max {
            max_ttl = system_max;
        }

        let mut ttl = if role_ttl.is_zero() {
            mount.default_lease_ttl
        } else {
            role_ttl
        };
        if !max_ttl.is_zero() && ttl > max_ttl {
            ttl = max_ttl;
        }

        Self { ttl, max_ttl }
    }
}

impl Lease {
    /// Time since issue, zero if the clock went backwards.
    fn age(&self, now: OffsetDateTime) -> Duration {
        Duration::try_from(now - self.issued_at).unwrap_or_default()
    }

    /// Extend the lease under `terms`, bounded by the max TTL from issue time.
    pub fn extend(&self, terms: LeaseTerms, now: OffsetDateTime) -> EngineResult<Lease> {
        if !self.renewable {
            return Err(EngineError::validation("lease is not renewable"));
        }

        let mut ttl = terms.ttl;
        if !terms.max_ttl.is_zero() {
            let remaining = terms.max_ttl.saturating_sub(self.age(now));
            if remaining.is_zero() {
                return Err(EngineError::validation(
                    "lease has reached its max TTL and cannot be renewed",
                ));
            }
            ttl = ttl.min(remaining);
        }

        Ok(Lease {
            ttl,
            max_ttl: terms.max_ttl,
            ..self.clone()
        })
    }
}

/// Renew a lease.
///
/// The role's current durations apply when it still exists. When it was
/// deleted, the lease keeps the durations it was issued with.
pub async fn renew(
    storage: &dyn Storage,
    mount: &MountConfig,
    lease: &Lease,
    now: OffsetDateTime,
) -> EngineResult<Lease> {
    let terms = match read_role(storage, &lease.internal.role).await? {
        Some(role) => LeaseTerms::resolve(role.ttl, role.max_ttl, mount),
        None => {
            debug!(role = %lease.internal.role, "role no longer exists, renewing with lease terms");
            LeaseTerms {
                ttl: lease.ttl,
                max_ttl: lease.max_ttl,
            }
        }
    };

    let renewed = lease.extend(terms, now)?;
    debug!(
        role = %lease.internal.role,
        accessor = %lease.internal.accessor,
        ttl_secs = renewed.ttl.as_secs(),
        "lease renewed"
    );
    Ok(renewed)
}

/// Revoke a lease by deleting its token.
///
/// A token Consul no longer knows about counts as revoked. Returns whether
/// the token still existed.
pub async fn revoke(
    storage: &dyn Storage,
    factory: &dyn AclClientFactory,
    lease: &Lease,
) -> EngineResult<bool> {
    let config = load_access(storage).await?;
    let client = factory.connect(&config)?;

    let internal = &lease.internal;
    let existed = delete_token_idempotent(client.as_ref(), &internal.accessor, &internal.scope())
        .await?;

    if existed {
        info!(role = %internal.role, accessor = %internal.accessor, "revoked Consul token");
    } else {
        info!(
            role = %internal.role,
            accessor = %internal.accessor,
            "Consul token already gone, treating as revoked"
        );
    }
    Ok(existed)
}
