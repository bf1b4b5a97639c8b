//! Error types for the secrets engine.
//!
//! Every operation returns [`EngineResult`]. The variants of [`EngineError`]
//! separate caller mistakes (bad input, missing configuration, missing roles)
//! from failures of the external ACL system or the host storage, so that the
//! host can decide how to report and whether to retry.

use crate::consul::AclError;
use crate::storage::StorageError;

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by engine operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The request is malformed: empty capability set, unpaired client
    /// certificate, unparsable duration, bad role name.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The mount has no access configuration yet.
    #[error("access configuration not found; write config/access before using this mount")]
    NotConfigured,

    /// A named object does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// The external ACL system was bootstrapped by someone else and this mount
    /// holds no management token for it.
    #[error(
        "the Consul ACL system has already been bootstrapped; \
         supply a management token in the 'token' field of config/access"
    )]
    AlreadyBootstrapped,

    /// The external ACL system rejected or failed a call.
    #[error("consul: {0}")]
    External(#[from] AclError),

    /// The host storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A stored record could not be decoded.
    #[error("failed to decode stored entry '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub(crate) fn role_not_found(name: &str) -> Self {
        EngineError::NotFound {
            kind: "role",
            name: name.to_string(),
        }
    }

    /// Whether the error was caused by the caller rather than by a transient
    /// or external failure. Client errors must not be retried.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::NotConfigured
                | EngineError::NotFound { .. }
                | EngineError::AlreadyBootstrapped
        )
    }
}
