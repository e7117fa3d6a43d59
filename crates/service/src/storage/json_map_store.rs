use std::{collections::HashMap, hash::Hash, path::PathBuf, sync::Arc};
use async_trait::async_trait;
use serde_json::Value;
use tokio::{fs, sync::RwLock};
use tracing::debug;

use crate::errors::ServiceError;
use super::StateBackend;

/// Generic JSON file-backed key-value map store.
///
/// Persists a `HashMap<K, V>` to a JSON file. Writes go to a sibling temp file
/// that is renamed over the original, and the in-memory map only changes after
/// the file write succeeded, so a failed write is never observable via `get`.
/// The write lock is held across the file write, which serializes writers.
#[derive(Clone)]
pub struct JsonMapStore<K, V> {
    inner: Arc<RwLock<HashMap<K, V>>>,
    file_path: PathBuf,
}

impl<K, V> JsonMapStore<K, V>
where
    K: Eq + Hash + serde::Serialize + serde::de::DeserializeOwned + Clone,
    V: serde::Serialize + serde::de::DeserializeOwned + Clone,
{
    /// Initialize the store from a path. Creates the file with an empty map if missing.
    /// A file that exists but does not hold a JSON map is an error, not an empty store.
    pub async fn new<P: Into<PathBuf>>(path: P) -> Result<Arc<Self>, ServiceError> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent).await.ok();
        }

        let map: HashMap<K, V> = match fs::read(&file_path).await {
            Ok(bytes) if bytes.is_empty() => HashMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ServiceError::Persistence(format!("{} is not a valid state file: {e}", file_path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty: HashMap<K, V> = HashMap::new();
                write_atomic(&file_path, &empty).await?;
                empty
            }
            Err(e) => return Err(ServiceError::persistence(e)),
        };

        debug!(path = %file_path.display(), entries = map.len(), "json map store loaded");
        Ok(Arc::new(Self { inner: Arc::new(RwLock::new(map)), file_path }))
    }

    /// Get value by key.
    pub async fn get(&self, key: &K) -> Option<V> {
        let map = self.inner.read().await;
        map.get(key).cloned()
    }

    /// Number of entries currently held.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Insert or update a value by key and persist. On a failed write the previous
    /// entry is restored before the error is returned.
    pub async fn insert(&self, key: K, value: V) -> Result<(), ServiceError> {
        let mut map = self.inner.write().await;
        let previous = map.insert(key.clone(), value);
        if let Err(e) = write_atomic(&self.file_path, &*map).await {
            match previous {
                Some(prev) => { map.insert(key, prev); }
                None => { map.remove(&key); }
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.file_path
    }
}

async fn write_atomic<T: serde::Serialize>(path: &std::path::Path, data: &T) -> Result<(), ServiceError> {
    let bytes = serde_json::to_vec(data).map_err(ServiceError::persistence)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).await.map_err(ServiceError::persistence)?;
    fs::rename(&tmp, path).await.map_err(ServiceError::persistence)?;
    Ok(())
}

#[async_trait]
impl StateBackend for JsonMapStore<String, Value> {
    async fn get(&self, key: &str) -> Result<Option<Value>, ServiceError> {
        let map = self.inner.read().await;
        Ok(map.get(key).cloned())
    }

    async fn update(&self, key: &str, value: Value) -> Result<(), ServiceError> {
        self.insert(key.to_string(), value).await
    }
}
