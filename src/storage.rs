//! Durable key/value storage
//!
//! Holds the small amount of state that survives restarts: the signing key
//! and the list of chain-prefixed account addresses. Values are plain strings
//! under fixed keys, mirroring browser local storage.
//!
//! `FileStorage` keeps every entry in one JSON object on disk and rewrites the
//! file after each change. `MemoryStorage` is the non-durable variant.

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Key under which the JSON array of prefixed account addresses is stored
pub const SAFE_ADDRESSES_KEY: &str = "safe_addresses";

/// Key under which the signing key is stored
pub const SIGNER_KEY_KEY: &str = "signer_key";

/// String key/value store
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Erase every entry
    async fn clear(&self) -> Result<()>;
}

/// Storage backed by a single JSON file
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Load entries from `path`, or start empty if the file doesn't exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if Path::new(&path).exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    Error::Storage(format!("corrupt storage file {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Opened storage");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to disk. The file holds the signing key, so it is
    /// readable by the owner only.
    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let content = serde_json::to_string_pretty(entries)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
        }
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Apply `change` to a copy of the entries, persist the copy and only
    /// then make it current.
    async fn update<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> bool + Send,
    {
        let mut entries = self.entries.write().await;
        let mut next = entries.clone();
        if !change(&mut next) {
            return Ok(());
        }
        self.persist(&next).await?;
        *entries = next;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value);
            true
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| entries.remove(key).is_some()).await
    }

    async fn clear(&self) -> Result<()> {
        self.update(|entries| {
            entries.clear();
            true
        })
        .await
    }
}

/// In-process storage
#[derive(Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
