//! Persisted signing key
//!
//! At most one key exists per storage. It is created lazily by
//! [`KeyStore::ensure_key`] and erased on logout.

use crate::storage::{Storage, SIGNER_KEY_KEY};
use crate::wallet::SecureWallet;
use crate::Result;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

#[derive(Clone)]
pub struct KeyStore {
    storage: Arc<dyn Storage>,
}

impl KeyStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The stored key, if any. An empty entry counts as no key.
    pub async fn has_key(&self) -> Result<Option<SecretString>> {
        Ok(self
            .storage
            .get(SIGNER_KEY_KEY)
            .await?
            .filter(|k| !k.is_empty())
            .map(SecretString::from))
    }

    /// Return the stored key, generating and persisting one if absent
    pub async fn ensure_key(&self) -> Result<SecretString> {
        if let Some(key) = self.has_key().await? {
            return Ok(key);
        }

        let (wallet, key) = SecureWallet::generate();
        self.storage
            .set(SIGNER_KEY_KEY, key.expose_secret().to_string())
            .await?;
        tracing::info!(owner = %wallet.address(), "Generated new signing key");
        Ok(key)
    }

    /// Erase the persisted key
    pub async fn clear_key(&self) -> Result<()> {
        self.storage.remove(SIGNER_KEY_KEY).await?;
        tracing::info!("Cleared signing key");
        Ok(())
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore").finish_non_exhaustive()
    }
}
