//! Consul ACL API wire types.

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};

/// Namespace and admin partition a token lives in.
///
/// Both are Consul Enterprise features; `None` means the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl TokenScope {
    pub fn new(namespace: Option<String>, partition: Option<String>) -> Self {
        Self {
            namespace: namespace.filter(|s| !s.is_empty()),
            partition: partition.filter(|s| !s.is_empty()),
        }
    }

    /// Query parameters selecting this scope.
    pub fn query(&self) -> Vec<(&'static str, &str)> {
        let mut query = Vec::new();
        if let Some(ns) = self.namespace.as_deref() {
            query.push(("ns", ns));
        }
        if let Some(partition) = self.partition.as_deref() {
            query.push(("partition", partition));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyLink {
    pub name: String,
}

impl PolicyLink {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleLink {
    pub name: String,
}

impl RoleLink {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceIdentity {
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datacenters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeIdentity {
    pub node_name: String,
    pub datacenter: String,
}

/// Body of `PUT /v1/acl/token`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateTokenRequest {
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<PolicyLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleLink>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_identities: Vec<ServiceIdentity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_identities: Vec<NodeIdentity>,
    #[serde(default)]
    pub local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl CreateTokenRequest {
    pub fn scope(&self) -> TokenScope {
        TokenScope::new(self.namespace.clone(), self.partition.clone())
    }

    /// Number of capability entries the token will carry.
    pub fn capability_count(&self) -> usize {
        self.policies.len()
            + self.roles.len()
            + self.service_identities.len()
            + self.node_identities.len()
    }
}

/// Token returned by token creation and bootstrap.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedToken {
    #[serde(rename = "AccessorID")]
    pub accessor_id: String,
    #[serde(rename = "SecretID")]
    pub secret_id: SecretString,
    #[serde(rename = "Local", default)]
    pub local: bool,
}

/// Token metadata returned by `GET /v1/acl/token/:accessor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TokenInfo {
    #[serde(rename = "AccessorID")]
    pub accessor_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub policies: Vec<PolicyLink>,
    #[serde(default)]
    pub roles: Vec<RoleLink>,
    #[serde(default)]
    pub service_identities: Vec<ServiceIdentity>,
    #[serde(default)]
    pub node_identities: Vec<NodeIdentity>,
    #[serde(default)]
    pub local: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}
