//! Persisted list of the user's accounts
//!
//! The list is ordered and stored as a JSON string array under
//! `safe_addresses`. Every mutation installs a whole new list.

use crate::config::{prefix_for, Chain};
use crate::safe::address::{normalize_legacy_addresses, SafeAddress};
use crate::storage::{Storage, SAFE_ADDRESSES_KEY};
use crate::{Error, Result};
use std::sync::Arc;

#[derive(Clone)]
pub struct SafeAddressStore {
    storage: Arc<dyn Storage>,
}

impl SafeAddressStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Raw stored entries. A missing or empty value is an empty list.
    pub async fn load_raw(&self) -> Result<Vec<String>> {
        match self.storage.get(SAFE_ADDRESSES_KEY).await? {
            Some(value) if !value.trim().is_empty() => serde_json::from_str(&value)
                .map_err(|e| Error::Storage(format!("unreadable {}: {}", SAFE_ADDRESSES_KEY, e))),
            _ => Ok(Vec::new()),
        }
    }

    /// Stored entries, with a legacy single-chain list read in its upgraded
    /// form. Nothing is written back.
    pub async fn addresses(&self) -> Result<Vec<SafeAddress>> {
        normalize_legacy_addresses(&self.load_raw().await?)
    }

    /// Load, upgrade legacy entries and write the upgraded list back
    pub async fn restore(&self) -> Result<Vec<SafeAddress>> {
        let normalized = self.addresses().await?;
        self.save(&normalized).await?;
        Ok(normalized)
    }

    /// Append an address unless it is already present.
    ///
    /// Adding a real address on a deprecated chain replaces that chain's
    /// `0x` placeholder instead of sitting next to it.
    pub async fn add_address(&self, address: SafeAddress) -> Result<Vec<SafeAddress>> {
        let mut list = self.addresses().await?;
        if list.contains(&address) {
            return Ok(list);
        }

        if let Ok(chain) = address.chain() {
            if chain.is_deprecated() && !address.is_placeholder() {
                let placeholder = SafeAddress::placeholder(chain);
                list.retain(|a| a != &placeholder);
            }
        }

        tracing::debug!(address = %address, "Recording account address");
        list.push(address);
        self.save(&list).await?;
        Ok(list)
    }

    /// First stored address whose prefix matches `chain` (name or prefix)
    pub async fn find_by_chain_prefix(&self, chain: &str) -> Result<Option<SafeAddress>> {
        let prefix = prefix_for(chain);
        Ok(self
            .addresses()
            .await?
            .into_iter()
            .find(|a| a.prefix() == prefix))
    }

    /// Replace the entry for `chain` in place, e.g. once a placeholder
    /// account gets its real address. Appends when the chain has no entry.
    pub async fn replace_for_chain(&self, chain: Chain, address: SafeAddress) -> Result<()> {
        let mut list = self.addresses().await?;
        let mut replaced = false;
        list.retain_mut(|entry| {
            if prefix_for(entry.prefix()) != chain.prefix() {
                return true;
            }
            if replaced {
                return false;
            }
            *entry = address.clone();
            replaced = true;
            true
        });
        if !replaced {
            list.push(address);
        }
        tracing::debug!(chain = %chain, "Replacing account address");
        self.save(&list).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.storage.remove(SAFE_ADDRESSES_KEY).await
    }

    async fn save(&self, list: &[SafeAddress]) -> Result<()> {
        let raw: Vec<String> = list.iter().map(|a| a.to_string()).collect();
        self.storage
            .set(SAFE_ADDRESSES_KEY, serde_json::to_string(&raw)?)
            .await
    }
}
