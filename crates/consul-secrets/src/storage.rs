//! Host storage seam.
//!
//! The engine never owns persistence. It reads and writes JSON records
//! through the [`Storage`] trait, which the host implements. [`MemoryStorage`]
//! is an in-process implementation for tests and development.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors a storage implementation may report.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backing store could not be reached.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure.
    #[error("storage error: {0}")]
    Internal(String),
}

/// Key/value storage provided by the host for one mount.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the value stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List the key suffixes stored under `prefix`, in lexical order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// In-memory [`Storage`] backed by a [`BTreeMap`].
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.data.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let data = self.data.read().await;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k[prefix.len()..].to_string())
            .collect())
    }
}

/// Read and decode a JSON record.
pub(crate) async fn get_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> EngineResult<Option<T>> {
    match storage.get(key).await? {
        Some(raw) => serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| EngineError::Decode {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encode and store a JSON record.
pub(crate) async fn put_json<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> EngineResult<()> {
    let raw = serde_json::to_vec(value).map_err(|source| EngineError::Decode {
        key: key.to_string(),
        source,
    })?;
    storage.put(key, raw).await?;
    Ok(())
}
