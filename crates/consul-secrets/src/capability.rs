//! Capability set carried by an issued token.
//!
//! Consul fixes a token's policies, roles and identities when the token is
//! created, so everything a role grants is gathered into one
//! [`CapabilitySet`] and sent in a single creation call.

use crate::consul::{CreateTokenRequest, NodeIdentity, PolicyLink, RoleLink, ServiceIdentity};
use crate::error::{EngineError, EngineResult};

/// One entry a token may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Policy(String),
    Role(String),
    ServiceIdentity {
        name: String,
        datacenters: Vec<String>,
    },
    NodeIdentity {
        name: String,
        datacenter: String,
    },
}

/// Accumulates [`Capability`] entries for one token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    entries: Vec<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, capability: Capability) {
        self.entries.push(capability);
    }

    pub fn with_policies<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .extend(names.into_iter().map(|n| Capability::Policy(n.into())));
        self
    }

    pub fn with_roles<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .extend(names.into_iter().map(|n| Capability::Role(n.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Build the token creation request.
    ///
    /// Fails with a validation error when the set is empty; Consul would
    /// otherwise mint a token that can do nothing.
    pub fn into_request(
        self,
        description: String,
        namespace: Option<String>,
        partition: Option<String>,
        local: bool,
    ) -> EngineResult<CreateTokenRequest> {
        if self.is_empty() {
            return Err(EngineError::validation(
                "at least one of consul_policies, consul_roles, service_identities \
                 or node_identities must be set",
            ));
        }

        let mut request = CreateTokenRequest {
            description,
            local,
            namespace: namespace.filter(|s| !s.is_empty()),
            partition: partition.filter(|s| !s.is_empty()),
            ..Default::default()
        };

        for capability in self.entries {
            match capability {
                Capability::Policy(name) => request.policies.push(PolicyLink::named(name)),
                Capability::Role(name) => request.roles.push(RoleLink::named(name)),
                Capability::ServiceIdentity { name, datacenters } => {
                    request.service_identities.push(ServiceIdentity {
                        service_name: name,
                        datacenters,
                    })
                }
                Capability::NodeIdentity { name, datacenter } => {
                    request.node_identities.push(NodeIdentity {
                        node_name: name,
                        datacenter,
                    })
                }
            }
        }

        Ok(request)
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
