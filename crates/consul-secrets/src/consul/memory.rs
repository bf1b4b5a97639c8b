//! In-process ACL system.
//!
//! [`MemoryAcl`] follows the same contract as the Consul ACL API: a one-time
//! bootstrap that later attempts are refused, tokens created with their full
//! capability set, and namespace/partition scoping on read and delete. It is
//! meant for tests and local development.

use super::types::{CreateTokenRequest, CreatedToken, TokenInfo, TokenScope};
use super::{AclClient, AclClientFactory, AclError};
use crate::config::AccessConfig;
use crate::secret::SecretString;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    management: Option<String>,
    /// Keyed by (namespace, partition, accessor).
    tokens: BTreeMap<(String, String, String), TokenInfo>,
    next_id: u64,
    bootstrap_calls: u32,
    create_calls: u32,
    unavailable: bool,
}

impl State {
    fn next_id(&mut self, kind: &str) -> String {
        self.next_id += 1;
        format!("{kind}-{:012}", self.next_id)
    }
}

fn key(scope: &TokenScope, accessor: &str) -> (String, String, String) {
    (
        scope.namespace.clone().unwrap_or_else(|| "default".to_string()),
        scope.partition.clone().unwrap_or_else(|| "default".to_string()),
        accessor.to_string(),
    )
}

/// In-memory ACL system shared by every client it hands out.
#[derive(Clone, Default)]
pub struct MemoryAcl {
    state: Arc<Mutex<State>>,
}

impl MemoryAcl {
    /// An ACL system that has not been bootstrapped yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// An ACL system already bootstrapped with a known management token.
    pub fn bootstrapped() -> Self {
        let state = State {
            management: Some("management-root".to_string()),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// The management token, if bootstrap has happened.
    pub async fn management_token(&self) -> Option<SecretString> {
        self.state
            .lock()
            .await
            .management
            .clone()
            .map(SecretString::new)
    }

    /// How many bootstrap calls were received, including refused ones.
    pub async fn bootstrap_calls(&self) -> u32 {
        self.state.lock().await.bootstrap_calls
    }

    /// How many token creation calls were received.
    pub async fn create_calls(&self) -> u32 {
        self.state.lock().await.create_calls
    }

    /// Number of live tokens across all scopes.
    pub async fn token_count(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    /// Delete a token behind the engine's back.
    pub async fn remove_token(&self, accessor: &str, scope: &TokenScope) -> bool {
        self.state
            .lock()
            .await
            .tokens
            .remove(&key(scope, accessor))
            .is_some()
    }

    /// Make every call fail with a transport error.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }
}

impl AclClientFactory for MemoryAcl {
    fn connect(&self, config: &AccessConfig) -> Result<Box<dyn AclClient>, AclError> {
        if config.address.is_empty() {
            return Err(AclError::Config("address is empty".to_string()));
        }
        Ok(Box::new(MemoryAclClient {
            acl: self.clone(),
            token: config.token.clone(),
        }))
    }
}

struct MemoryAclClient {
    acl: MemoryAcl,
    token: SecretString,
}

impl MemoryAclClient {
    fn check_available(state: &State) -> Result<(), AclError> {
        if state.unavailable {
            return Err(AclError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn authorize(&self, state: &State) -> Result<(), AclError> {
        Self::check_available(state)?;
        match state.management.as_deref() {
            None => Err(AclError::PermissionDenied(
                "ACL system must be bootstrapped before making any requests that require authorization"
                    .to_string(),
            )),
            Some(mgmt) if mgmt == self.token.expose() => Ok(()),
            Some(_) => Err(AclError::PermissionDenied("ACL not found".to_string())),
        }
    }
}

#[async_trait]
impl AclClient for MemoryAclClient {
    async fn is_bootstrapped(&self) -> Result<bool, AclError> {
        let state = self.acl.state.lock().await;
        Self::check_available(&state)?;
        Ok(state.management.is_some())
    }

    async fn bootstrap(&self) -> Result<SecretString, AclError> {
        let mut state = self.acl.state.lock().await;
        Self::check_available(&state)?;
        state.bootstrap_calls += 1;
        if state.management.is_some() {
            return Err(AclError::AlreadyBootstrapped(
                "Permission denied: ACL bootstrap no longer allowed".to_string(),
            ));
        }
        let token = state.next_id("management");
        state.management = Some(token.clone());
        Ok(SecretString::new(token))
    }

    async fn create_token(&self, request: &CreateTokenRequest) -> Result<CreatedToken, AclError> {
        let mut state = self.acl.state.lock().await;
        self.authorize(&state)?;
        state.create_calls += 1;

        let accessor = state.next_id("accessor");
        let secret = state.next_id("secret");
        let scope = request.scope();
        let info = TokenInfo {
            accessor_id: accessor.clone(),
            description: request.description.clone(),
            policies: request.policies.clone(),
            roles: request.roles.clone(),
            service_identities: request.service_identities.clone(),
            node_identities: request.node_identities.clone(),
            local: request.local,
            namespace: scope.namespace.clone(),
            partition: scope.partition.clone(),
        };
        state.tokens.insert(key(&scope, &accessor), info);

        Ok(CreatedToken {
            accessor_id: accessor,
            secret_id: SecretString::new(secret),
            local: request.local,
        })
    }

    async fn delete_token(&self, accessor: &str, scope: &TokenScope) -> Result<(), AclError> {
        let mut state = self.acl.state.lock().await;
        self.authorize(&state)?;
        match state.tokens.remove(&key(scope, accessor)) {
            Some(_) => Ok(()),
            None => Err(AclError::TokenNotFound(accessor.to_string())),
        }
    }

    async fn read_token(
        &self,
        accessor: &str,
        scope: &TokenScope,
    ) -> Result<Option<TokenInfo>, AclError> {
        let state = self.acl.state.lock().await;
        self.authorize(&state)?;
        Ok(state.tokens.get(&key(scope, accessor)).cloned())
    }
}
