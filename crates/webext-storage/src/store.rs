//! Object store trait and implementations.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StorageError, StorageResult};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Namespaces must be non-empty and free of the null separator.
fn validate_namespace(namespace: &str) -> StorageResult<()> {
    if namespace.is_empty() {
        return Err(StorageError::InvalidKey(
            "namespace must not be empty".into(),
        ));
    }
    if namespace.contains('\0') {
        return Err(StorageError::InvalidKey(
            "namespace must not contain null bytes".into(),
        ));
    }
    Ok(())
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".into()));
    }
    if key.contains('\0') {
        return Err(StorageError::InvalidKey(
            "key must not contain null bytes".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Persistence collaborator: namespaced keyed upsert/fetch/delete.
///
/// Every write must be durable when the returned future resolves; callers
/// acknowledge user decisions only after the write completes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a value. Returns `None` if the key does not exist.
    async fn fetch(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Insert or overwrite a value.
    async fn upsert(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Delete a key. Returns `true` if it existed.
    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool>;

    /// List every key in a namespace, in ascending order.
    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>>;

    /// Delete every key in a namespace. Returns the number removed.
    async fn delete_namespace(&self, namespace: &str) -> StorageResult<u64>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory object store.
///
/// Namespaces map to ordered key tables so `list_keys` is deterministic.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    data: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored rows across all namespaces.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data
            .read()
            .map(|d| d.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }

    /// Whether the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Internal(e.to_string())
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let data = self.data.read().map_err(poisoned)?;
        Ok(data.get(namespace).and_then(|t| t.get(key)).cloned())
    }

    async fn upsert(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.write().map_err(poisoned)?;
        data.entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        validate_namespace(namespace)?;
        validate_key(key)?;
        let mut data = self.data.write().map_err(poisoned)?;
        let Some(table) = data.get_mut(namespace) else {
            return Ok(false);
        };
        let existed = table.remove(key).is_some();
        if table.is_empty() {
            data.remove(namespace);
        }
        Ok(existed)
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        validate_namespace(namespace)?;
        let data = self.data.read().map_err(poisoned)?;
        Ok(data
            .get(namespace)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_namespace(&self, namespace: &str) -> StorageResult<u64> {
        validate_namespace(namespace)?;
        let mut data = self.data.write().map_err(poisoned)?;
        let removed = data.remove(namespace).map_or(0, |t| t.len());
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}

// ---------------------------------------------------------------------------
// Scoped view
// ---------------------------------------------------------------------------

/// A namespace-bound view into an [`ObjectStore`] with JSON helpers.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn ObjectStore>,
    namespace: String,
}

impl std::fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ScopedStore {
    /// Bind `namespace` on top of `store`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] if the namespace is empty or
    /// contains null bytes.
    pub fn new(store: Arc<dyn ObjectStore>, namespace: impl Into<String>) -> StorageResult<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            inner: store,
            namespace,
        })
    }

    /// The bound namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Delete a key. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(&self.namespace, key).await
    }

    /// List every key in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn list_keys(&self) -> StorageResult<Vec<String>> {
        self.inner.list_keys(&self.namespace).await
    }

    /// Delete every key in the namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn clear(&self) -> StorageResult<u64> {
        self.inner.delete_namespace(&self.namespace).await
    }

    /// Fetch and deserialize a JSON row. Returns `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the row does not decode.
    pub async fn fetch_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        let bytes = self.inner.fetch(&self.namespace, key).await?;
        bytes
            .map(|b| {
                serde_json::from_slice(&b).map_err(|e| StorageError::Serialization(e.to_string()))
            })
            .transpose()
    }

    /// Serialize a row as JSON and upsert it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if encoding fails, or the
    /// backend error if the write fails.
    pub async fn upsert_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.inner.upsert(&self.namespace, key, bytes).await
    }

    /// Fetch every row in the namespace, skipping rows that fail to decode.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or fetching fails in the backend.
    pub async fn fetch_all_json<T: DeserializeOwned>(&self) -> StorageResult<Vec<(String, T)>> {
        let mut rows = Vec::new();
        for key in self.list_keys().await? {
            match self.fetch_json::<T>(&key).await {
                Ok(Some(value)) => rows.push((key, value)),
                Ok(None) => {},
                Err(StorageError::Serialization(e)) => {
                    tracing::warn!(namespace = %self.namespace, key = %key, error = %e, "Skipping undecodable row");
                },
                Err(e) => return Err(e),
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_fetch_overwrite() {
        let store = MemoryObjectStore::new();
        store.upsert("packages", "reader", b"v1".to_vec()).await.unwrap();
        store.upsert("packages", "reader", b"v2".to_vec()).await.unwrap();
        assert_eq!(
            store.fetch("packages", "reader").await.unwrap(),
            Some(b"v2".to_vec())
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = MemoryObjectStore::new();
        store.upsert("ns", "k", b"v".to_vec()).await.unwrap();
        assert!(store.delete("ns", "k").await.unwrap());
        assert!(!store.delete("ns", "k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let store = MemoryObjectStore::new();
        store.upsert("ledger:a", "api:storage", b"1".to_vec()).await.unwrap();
        store.upsert("ledger:b", "api:storage", b"2".to_vec()).await.unwrap();
        assert_eq!(store.delete_namespace("ledger:a").await.unwrap(), 1);
        assert!(store.list_keys("ledger:a").await.unwrap().is_empty());
        assert_eq!(store.list_keys("ledger:b").await.unwrap(), vec!["api:storage"]);
    }

    #[tokio::test]
    async fn test_list_keys_sorted() {
        let store = MemoryObjectStore::new();
        for k in ["c", "a", "b"] {
            store.upsert("ns", k, Vec::new()).await.unwrap();
        }
        assert_eq!(store.list_keys("ns").await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_keys() {
        let store = MemoryObjectStore::new();
        assert!(store.upsert("", "k", Vec::new()).await.is_err());
        assert!(store.upsert("ns", "", Vec::new()).await.is_err());
        assert!(store.fetch("ns", "a\0b").await.is_err());
        assert!(ScopedStore::new(Arc::new(MemoryObjectStore::new()), "").is_err());
    }

    #[tokio::test]
    async fn test_scoped_json_and_skip_corrupt_rows() {
        let backend: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let scoped = ScopedStore::new(Arc::clone(&backend), "packages").unwrap();

        scoped.upsert_json("a", &vec![1u32, 2]).await.unwrap();
        backend.upsert("packages", "b", b"not json".to_vec()).await.unwrap();

        let missing: Option<Vec<u32>> = scoped.fetch_json("zzz").await.unwrap();
        assert!(missing.is_none());

        let rows: Vec<(String, Vec<u32>)> = scoped.fetch_all_json().await.unwrap();
        assert_eq!(rows, vec![("a".to_string(), vec![1, 2])]);

        assert_eq!(scoped.clear().await.unwrap(), 2);
    }
}
