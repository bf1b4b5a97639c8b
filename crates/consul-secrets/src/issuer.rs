//! Credential issuer (`creds/:name`).

use crate::access::load_access;
use crate::config::MountConfig;
use crate::consul::AclClientFactory;
use crate::error::{EngineError, EngineResult};
use crate::lease::{Lease, LeaseInternal, LeaseTerms};
use crate::role::read_role;
use crate::secret::SecretString;
use crate::storage::Storage;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

/// A newly created Consul token as returned to the caller.
///
/// The secret is only ever revealed here.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedCredential {
    pub token: SecretString,
    pub accessor: String,
    pub local: bool,
    pub consul_namespace: String,
    pub partition: String,
}

/// Issue a token for `role_name`.
pub async fn issue(
    storage: &dyn Storage,
    factory: &dyn AclClientFactory,
    mount: &MountConfig,
    role_name: &str,
    now: OffsetDateTime,
) -> EngineResult<(IssuedCredential, Lease)> {
    let role = read_role(storage, role_name)
        .await?
        .ok_or_else(|| EngineError::role_not_found(role_name))?;
    let config = load_access(storage).await?;

    let description = format!(
        "{} {} {}",
        mount.description_prefix,
        role_name,
        now.unix_timestamp_nanos()
    );
    let request = role.capabilities()?.into_request(
        description,
        role.consul_namespace.clone(),
        role.partition.clone(),
        role.local,
    )?;
    let scope = request.scope();

    let client = factory.connect(&config)?;
    let created = client.create_token(&request).await?;
    info!(
        role = %role_name,
        accessor = %created.accessor_id,
        capabilities = request.capability_count(),
        "issued Consul token"
    );

    let terms = LeaseTerms::resolve(role.ttl, role.max_ttl, mount);
    let lease = Lease {
        ttl: terms.ttl,
        max_ttl: terms.max_ttl,
        issued_at: now,
        renewable: true,
        internal: LeaseInternal {
            role: role_name.to_string(),
            accessor: created.accessor_id.clone(),
            namespace: scope.namespace.clone(),
            partition: scope.partition.clone(),
            local: role.local,
        },
    };

    let credential = IssuedCredential {
        token: created.secret_id,
        accessor: created.accessor_id,
        local: role.local,
        consul_namespace: scope.namespace.unwrap_or_default(),
        partition: scope.partition.unwrap_or_default(),
    };

    Ok((credential, lease))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consul::{MemoryAcl, TokenScope};
    use crate::role::{write_role, RoleWrite};
    use crate::storage::{put_json, MemoryStorage};
    use serde_json::json;
    use std::time::Duration;
    use time::macros::datetime;

    async fn setup(acl: &MemoryAcl) -> MemoryStorage {
        let storage = MemoryStorage::new();
        let write = crate::config::AccessConfigWrite {
            address: Some("127.0.0.1:8500".to_string()),
            token: acl.management_token().await,
            ..Default::default()
        };
        crate::access::write_access(&storage, acl, write).await.unwrap();
        storage
    }

    async fn role(storage: &MemoryStorage, name: &str, body: serde_json::Value) {
        let input: RoleWrite = serde_json::from_value(body).unwrap();
        write_role(storage, name, input).await.unwrap();
    }

    #[tokio::test]
    async fn issues_token_with_full_capability_set() {
        let acl = MemoryAcl::bootstrapped();
        let storage = setup(&acl).await;
        role(
            &storage,
            "web",
            json!({
                "consul_policies": ["readonly"],
                "consul_roles": ["ops"],
                "service_identities": ["api:dc1"],
                "node_identities": ["node1:dc1"],
                "consul_namespace": "ns1",
                "local": true,
                "ttl": "10m",
            }),
        )
        .await;

        let now = datetime!(2024-05-01 12:00 UTC);
        let (credential, lease) = issue(&storage, &acl, &MountConfig::default(), "web", now)
            .await
            .unwrap();

        assert!(!credential.token.is_empty());
        assert!(credential.local);
        assert_eq!(credential.consul_namespace, "ns1");
        assert_eq!(credential.partition, "");
        assert_eq!(lease.ttl, Duration::from_secs(600));
        assert_eq!(lease.issued_at, now);
        assert_eq!(lease.internal.accessor, credential.accessor);
        assert_eq!(lease.internal.namespace.as_deref(), Some("ns1"));
        assert_eq!(acl.create_calls().await, 1);

        let client = acl
            .connect(&crate::access::load_access(&storage).await.unwrap())
            .unwrap();
        let info = client
            .read_token(&credential.accessor, &lease.internal.scope())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.policies.len(), 1);
        assert_eq!(info.roles.len(), 1);
        assert_eq!(info.service_identities.len(), 1);
        assert_eq!(info.node_identities.len(), 1);
        assert!(info.local);
        assert!(info.description.starts_with("consul-secrets web "));
        assert!(client
            .read_token(&credential.accessor, &TokenScope::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn missing_role_is_not_found() {
        let acl = MemoryAcl::bootstrapped();
        let storage = setup(&acl).await;
        let result = issue(
            &storage,
            &acl,
            &MountConfig::default(),
            "ghost",
            OffsetDateTime::now_utc(),
        )
        .await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }

    #[tokio::test]
    async fn unconfigured_mount_fails_before_any_call() {
        let acl = MemoryAcl::bootstrapped();
        let storage = MemoryStorage::new();
        role(&storage, "web", json!({"consul_policies": ["readonly"]})).await;
        acl.set_unavailable(true).await;

        let result = issue(
            &storage,
            &acl,
            &MountConfig::default(),
            "web",
            OffsetDateTime::now_utc(),
        )
        .await;
        assert!(matches!(result, Err(EngineError::NotConfigured)));
    }

    #[tokio::test]
    async fn stored_role_without_capabilities_is_rejected() {
        let acl = MemoryAcl::bootstrapped();
        let storage = setup(&acl).await;
        // Written directly, as an older schema version might have
        put_json(&storage, "role/empty", &json!({"lease": 60}))
            .await
            .unwrap();

        let result = issue(
            &storage,
            &acl,
            &MountConfig::default(),
            "empty",
            OffsetDateTime::now_utc(),
        )
        .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert_eq!(acl.create_calls().await, 0);
    }

    #[tokio::test]
    async fn external_failures_are_surfaced() {
        let acl = MemoryAcl::bootstrapped();
        let storage = setup(&acl).await;
        role(&storage, "web", json!({"consul_policies": ["readonly"]})).await;
        acl.set_unavailable(true).await;

        let result = issue(
            &storage,
            &acl,
            &MountConfig::default(),
            "web",
            OffsetDateTime::now_utc(),
        )
        .await;
        assert!(matches!(result, Err(EngineError::External(_))));
    }
}
