//! One-time bootstrap of the Consul ACL system.
//!
//! There is no lock here. Consul's own bootstrap endpoint succeeds at most
//! once, so when two writers race, exactly one receives a token and the other
//! is told the system is already bootstrapped.

use crate::config::AccessConfig;
use crate::consul::{AclClient, AclError};
use crate::error::{EngineError, EngineResult};
use crate::secret::SecretString;
use tracing::{info, warn};

/// Whether this mount still needs a management token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// No token supplied and none stored.
    Unbootstrapped,
    /// A token is supplied or already stored.
    Bootstrapped,
}

impl BootstrapState {
    /// Derive the state from the incoming write and the stored record.
    pub fn derive(incoming: &AccessConfig, stored: Option<&AccessConfig>) -> Self {
        if incoming.has_token() || stored.is_some_and(AccessConfig::has_token) {
            BootstrapState::Bootstrapped
        } else {
            BootstrapState::Unbootstrapped
        }
    }
}

/// Obtain a management token by bootstrapping the ACL system.
///
/// Fails with [`EngineError::AlreadyBootstrapped`] when the ACL system was
/// bootstrapped by someone else, whether that is seen before the call or
/// reported by the call itself.
pub async fn bootstrap(client: &dyn AclClient) -> EngineResult<SecretString> {
    if client.is_bootstrapped().await? {
        warn!("Consul ACL system is already bootstrapped and no management token was supplied");
        return Err(EngineError::AlreadyBootstrapped);
    }

    match client.bootstrap().await {
        Ok(token) => {
            info!("bootstrapped Consul ACL system");
            Ok(token)
        }
        Err(AclError::AlreadyBootstrapped(reason)) => {
            warn!(%reason, "lost Consul ACL bootstrap race");
            Err(EngineError::AlreadyBootstrapped)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;
    use crate::consul::{AclClientFactory, MemoryAcl};
    use async_trait::async_trait;

    fn config(token: &str) -> AccessConfig {
        AccessConfig {
            address: "127.0.0.1:8500".to_string(),
            scheme: Scheme::Http,
            token: SecretString::new(token),
            ca_cert: None,
            client_cert: None,
            client_key: None,
        }
    }

    #[test]
    fn state_follows_tokens() {
        assert_eq!(
            BootstrapState::derive(&config(""), None),
            BootstrapState::Unbootstrapped
        );
        assert_eq!(
            BootstrapState::derive(&config(""), Some(&config(""))),
            BootstrapState::Unbootstrapped
        );
        assert_eq!(
            BootstrapState::derive(&config("t"), None),
            BootstrapState::Bootstrapped
        );
        assert_eq!(
            BootstrapState::derive(&config(""), Some(&config("stored"))),
            BootstrapState::Bootstrapped
        );
    }

    #[tokio::test]
    async fn bootstraps_fresh_system() {
        let acl = MemoryAcl::new();
        let client = acl.connect(&config("")).unwrap();
        let token = bootstrap(client.as_ref()).await.unwrap();
        assert_eq!(Some(token), acl.management_token().await);
        assert_eq!(acl.bootstrap_calls().await, 1);
    }

    #[tokio::test]
    async fn refuses_when_already_bootstrapped() {
        let acl = MemoryAcl::bootstrapped();
        let client = acl.connect(&config("")).unwrap();
        let result = bootstrap(client.as_ref()).await;
        assert!(matches!(result, Err(EngineError::AlreadyBootstrapped)));
        // Detected by the probe, so the bootstrap endpoint is never called
        assert_eq!(acl.bootstrap_calls().await, 0);
    }

    /// Reports "not bootstrapped" but loses the race on the actual call.
    struct RacingClient;

    #[async_trait]
    impl AclClient for RacingClient {
        async fn is_bootstrapped(&self) -> Result<bool, AclError> {
            Ok(false)
        }

        async fn bootstrap(&self) -> Result<SecretString, AclError> {
            Err(AclError::AlreadyBootstrapped(
                "ACL bootstrap no longer allowed".to_string(),
            ))
        }

        async fn create_token(
            &self,
            _request: &crate::consul::CreateTokenRequest,
        ) -> Result<crate::consul::CreatedToken, AclError> {
            unreachable!()
        }

        async fn delete_token(
            &self,
            _accessor: &str,
            _scope: &crate::consul::TokenScope,
        ) -> Result<(), AclError> {
            unreachable!()
        }

        async fn read_token(
            &self,
            _accessor: &str,
            _scope: &crate::consul::TokenScope,
        ) -> Result<Option<crate::consul::TokenInfo>, AclError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn lost_race_is_already_bootstrapped() {
        let result = bootstrap(&RacingClient).await;
        assert!(matches!(result, Err(EngineError::AlreadyBootstrapped)));
    }

    #[tokio::test]
    async fn concurrent_bootstraps_yield_one_token() {
        let acl = MemoryAcl::new();
        let a = acl.connect(&config("")).unwrap();
        let b = acl.connect(&config("")).unwrap();

        let (ra, rb) = tokio::join!(bootstrap(a.as_ref()), bootstrap(b.as_ref()));
        let successes = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);
        assert!(matches!(
            if ra.is_ok() { rb } else { ra },
            Err(EngineError::AlreadyBootstrapped)
        ));
    }
}
