//! Access configuration store (`config/access`).

use crate::bootstrap::{bootstrap, BootstrapState};
use crate::config::{AccessConfig, AccessConfigView, AccessConfigWrite};
use crate::consul::AclClientFactory;
use crate::error::{EngineError, EngineResult};
use crate::storage::{get_json, put_json, Storage};
use tracing::info;

pub(crate) const ACCESS_KEY: &str = "config/access";

/// How the management token of a write was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// The caller supplied it.
    Supplied,
    /// The write carried none, so the stored token was kept.
    Kept,
    /// The ACL system was bootstrapped to obtain it.
    Bootstrapped,
}

/// Validate and persist the access configuration.
///
/// Without a token in the write, the stored token is kept if there is one,
/// otherwise the ACL system is bootstrapped. Either way the record is written
/// once, after the token is known.
pub async fn write_access(
    storage: &dyn Storage,
    factory: &dyn AclClientFactory,
    input: AccessConfigWrite,
) -> EngineResult<TokenSource> {
    let mut config = input.validate()?;

    let source = if config.has_token() {
        TokenSource::Supplied
    } else {
        let stored: Option<AccessConfig> = get_json(storage, ACCESS_KEY).await?;
        match (BootstrapState::derive(&config, stored.as_ref()), stored) {
            (BootstrapState::Bootstrapped, Some(stored)) => {
                info!(address = %config.address, "no token supplied, keeping stored management token");
                config.token = stored.token;
                TokenSource::Kept
            }
            _ => {
                let client = factory.connect(&config)?;
                config.token = bootstrap(client.as_ref()).await?;
                TokenSource::Bootstrapped
            }
        }
    };

    put_json(storage, ACCESS_KEY, &config).await?;
    info!(address = %config.address, scheme = %config.scheme, "access configuration written");
    Ok(source)
}

/// Read the access configuration without its secrets.
pub async fn read_access(storage: &dyn Storage) -> EngineResult<Option<AccessConfigView>> {
    let config: Option<AccessConfig> = get_json(storage, ACCESS_KEY).await?;
    Ok(config.map(|c| c.view()))
}

/// Load the full record, failing with [`EngineError::NotConfigured`] when absent.
pub(crate) async fn load_access(storage: &dyn Storage) -> EngineResult<AccessConfig> {
    get_json(storage, ACCESS_KEY)
        .await?
        .ok_or(EngineError::NotConfigured)
}
