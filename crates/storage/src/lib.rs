//! Document storage for the Annual Review engine
//!
//! Votes, user profiles and posts are persisted as JSON documents in a flat
//! key space. Keys are `/`-separated paths such as
//! `review/2024/quadratic/<user>/<post>`; listing a prefix returns every key
//! below it, at any depth.

use std::path::{Component, Path, PathBuf};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub mod memory_storage;

pub use memory_storage::MemoryStorage;

/// Storage-related errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() {
            StorageError::DeserializationError(err.to_string())
        } else {
            StorageError::SerializationError(err.to_string())
        }
    }
}

impl From<StorageError> for review_common::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyNotFound(key) => review_common::Error::not_found(key),
            StorageError::InvalidKey(msg) => review_common::Error::validation(msg),
            StorageError::SerializationError(msg) | StorageError::DeserializationError(msg) => {
                review_common::Error::serialization(msg)
            }
            other => review_common::Error::internal(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The core Storage trait defining the operations all storage implementations must support
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Store data at the specified key, replacing any previous value
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Retrieve data from the specified key
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Delete data at the specified key
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// List all keys with a given prefix, in ascending order
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Get base path of the storage
    fn base_path(&self) -> Option<PathBuf>;
}

/// Extension trait for JSON serialization/deserialization
#[async_trait]
pub trait JsonStorage: Storage {
    /// Store a serializable value at the specified key
    async fn put_json<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> StorageResult<()> {
        let json_data = serde_json::to_vec_pretty(value)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;
        self.put(key, &json_data).await
    }

    /// Retrieve and deserialize a value from the specified key
    async fn get_json<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<T> {
        let data = self.get(key).await?;
        serde_json::from_slice(&data)
            .map_err(|e| StorageError::DeserializationError(e.to_string()))
    }

    /// Like [`JsonStorage::get_json`], but a missing key is `Ok(None)`
    async fn get_json_opt<T: DeserializeOwned + Send>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get_json(key).await {
            Ok(value) => Ok(Some(value)),
            Err(StorageError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// Implement JsonStorage for any type that implements Storage
impl<T: Storage + ?Sized> JsonStorage for T {}

/// Directory under a [`FileStorage`] root that holds in-flight writes
pub const STAGING_DIR: &str = ".staging";

/// Check that a key is a relative `/`-separated path with no empty
/// segments and no segment starting with `.`.
///
/// Dot-segments are reserved for storage bookkeeping such as
/// [`STAGING_DIR`].
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment.starts_with('.'))
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// A file system-based storage implementation, one file per key
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a store rooted at `base_path`
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(FileStorage { base_path })
    }

    fn get_full_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }

    fn relative_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        segments.map(|s| s.join("/"))
    }

    async fn collect_keys(&self, dir: PathBuf, out: &mut Vec<String>) -> StorageResult<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await
                .map_err(|e| StorageError::IoError(format!("Failed to read directory: {}", e)))?;

            while let Some(entry) = entries.next_entry().await
                .map_err(|e| StorageError::IoError(format!("Failed to read directory entry: {}", e)))? {
                // Staging files and other bookkeeping never name a key
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if let Some(key) = self.relative_key(&path) {
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.get_full_path(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await
                .map_err(|e| StorageError::IoError(format!("Failed to create directory: {}", e)))?;
        }

        // Each write stages into its own file, then renames over the key, so
        // concurrent writers of one key never share a temp file and readers
        // never observe a half-written document.
        let staging = self.base_path.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging).await
            .map_err(|e| StorageError::IoError(format!("Failed to create directory: {}", e)))?;
        let tmp = staging.join(Uuid::new_v4().simple().to_string());
        tokio::fs::write(&tmp, data).await
            .map_err(|e| StorageError::IoError(format!("Failed to write data: {}", e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::IoError(format!("Failed to write data: {}", e)));
        }

        debug!(key, bytes = data.len(), "stored document");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.get_full_path(key)?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::KeyNotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::IoError(format!("Failed to read data: {}", e))),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.get_full_path(key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::KeyNotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::IoError(format!("Failed to delete file: {}", e))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.get_full_path(key)?;
        Ok(path.is_file())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut result = Vec::new();

        // Walk the deepest directory fully named by the prefix, then filter.
        let dir_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        let start = if dir_part.is_empty() {
            self.base_path.clone()
        } else {
            self.get_full_path(dir_part)?
        };

        if !start.is_dir() {
            return Ok(result);
        }

        self.collect_keys(start, &mut result).await?;
        result.retain(|k| k.starts_with(prefix));
        result.sort();
        Ok(result)
    }

    fn base_path(&self) -> Option<PathBuf> {
        Some(self.base_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_storage_basic_operations() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();

        storage.put("test-key", b"test-data").await.unwrap();
        assert!(temp_dir.path().join("test-key").exists());

        let data = storage.get("test-key").await.unwrap();
        assert_eq!(data, b"test-data");

        assert!(storage.exists("test-key").await.unwrap());
        assert!(!storage.exists("nonexistent").await.unwrap());

        storage.delete("test-key").await.unwrap();
        assert!(!temp_dir.path().join("test-key").exists());
        assert!(matches!(
            storage.get("test-key").await,
            Err(StorageError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_storage_lists_recursively() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();

        storage.put("review/2024/quadratic/u1/p1", b"1").await.unwrap();
        storage.put("review/2024/quadratic/u2/p1", b"2").await.unwrap();
        storage.put("review/2024/nominations/u1/p1", b"3").await.unwrap();
        storage.put("review/2023/quadratic/u1/p9", b"4").await.unwrap();

        let keys = storage.list("review/2024/quadratic/").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "review/2024/quadratic/u1/p1".to_string(),
                "review/2024/quadratic/u2/p1".to_string(),
            ]
        );

        let user_keys = storage.list("review/2024/quadratic/u1/").await.unwrap();
        assert_eq!(user_keys, vec!["review/2024/quadratic/u1/p1".to_string()]);

        assert!(storage.list("review/2025/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_rejects_escaping_keys() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(matches!(
            storage.put("../outside", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.get("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.put("a//b", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.put(".staging/x", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_file_storage_lists_keys_with_any_suffix() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();

        storage.put("votes/u1/p.tmp-write", b"1").await.unwrap();
        storage.put("votes/u1/p", b"2").await.unwrap();

        let keys = storage.list("votes/u1/").await.unwrap();
        assert_eq!(
            keys,
            vec!["votes/u1/p".to_string(), "votes/u1/p.tmp-write".to_string()]
        );
        assert!(storage.list("").await.unwrap().iter().all(|k| !k.starts_with(STAGING_DIR)));
    }

    #[tokio::test]
    async fn test_file_storage_concurrent_writes_to_one_key() {
        let temp_dir = tempdir().unwrap();
        let storage = std::sync::Arc::new(FileStorage::new(temp_dir.path().to_path_buf()).unwrap());

        let mut handles = Vec::new();
        for i in 0..16u8 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage.put("shared/doc", &[i; 64]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let data = storage.get("shared/doc").await.unwrap();
        assert_eq!(data.len(), 64);
        assert!(data.iter().all(|b| *b == data[0]));
        assert_eq!(storage.list("").await.unwrap(), vec!["shared/doc".to_string()]);

        let staged = std::fs::read_dir(temp_dir.path().join(STAGING_DIR)).unwrap().count();
        assert_eq!(staged, 0);
    }

    #[tokio::test]
    async fn test_json_storage() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();

        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct TestData {
            field1: String,
            field2: i32,
        }

        let test_data = TestData {
            field1: "test".to_string(),
            field2: 42,
        };

        storage.put_json("test-json", &test_data).await.unwrap();

        let retrieved: TestData = storage.get_json("test-json").await.unwrap();
        assert_eq!(retrieved, test_data);

        let missing: Option<TestData> = storage.get_json_opt("missing").await.unwrap();
        assert!(missing.is_none());
    }
}
