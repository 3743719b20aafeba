//! Chain-prefixed account addresses
//!
//! Accounts are recorded as `<prefix>:<address>`, for example
//! `gno:0x169874fA8A472fB54aE31D500d57c0c7D5143815`. A freshly bootstrapped
//! account that has no address yet is recorded with the `0x` placeholder.

use crate::config::{prefix_for, Chain, DEFAULT_CHAIN};
use crate::eth::{fix_safe_address, is_valid_ethereum_address, ADDRESS_PLACEHOLDER};
use crate::{Error, Result};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SEPARATOR: char = ':';

/// An account address qualified by its chain prefix.
///
/// The prefix is kept exactly as stored; use [`SafeAddress::chain`] to
/// resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SafeAddress {
    prefix: String,
    address: String,
}

impl SafeAddress {
    /// Qualify `address` with the prefix of `chain` (a name or a prefix)
    pub fn new(chain: &str, address: impl Into<String>) -> Self {
        Self {
            prefix: prefix_for(chain),
            address: address.into(),
        }
    }

    pub fn for_chain(chain: Chain, address: impl Into<String>) -> Self {
        Self {
            prefix: chain.prefix().to_string(),
            address: address.into(),
        }
    }

    /// Entry for an account that has not been assigned an address yet
    pub fn placeholder(chain: Chain) -> Self {
        Self::for_chain(chain, ADDRESS_PLACEHOLDER)
    }

    /// Split `<prefix>:<address>`. Entries without a separator are rejected.
    pub fn parse(value: &str) -> Result<Self> {
        let (prefix, address) = value
            .split_once(SEPARATOR)
            .ok_or_else(|| Error::InvalidAddress(format!("missing chain prefix: {}", value)))?;
        Ok(Self {
            prefix: prefix.to_string(),
            address: address.to_string(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain(&self) -> Result<Chain> {
        Chain::from_alias(&self.prefix)
    }

    pub fn is_placeholder(&self) -> bool {
        self.address == ADDRESS_PLACEHOLDER
    }

    /// The parsed account address, if the stored value is a real address
    pub fn account_address(&self) -> Option<Address> {
        if is_valid_ethereum_address(&self.address) {
            Address::from_str(&self.address).ok()
        } else {
            None
        }
    }
}

impl fmt::Display for SafeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, SEPARATOR, self.address)
    }
}

impl FromStr for SafeAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SafeAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SafeAddress> for String {
    fn from(value: SafeAddress) -> Self {
        value.to_string()
    }
}

/// `<prefix>:<address>` for a chain name such as `gnosis`
pub fn format_safe_address(chain: &str, address: &str) -> String {
    SafeAddress::new(chain, address).to_string()
}

pub fn parse_safe_address(value: &str) -> Result<SafeAddress> {
    SafeAddress::parse(value)
}

/// Upgrade an address list written by single-chain builds.
///
/// When no entry carries a chain prefix, the first entry is taken to be a
/// bare address on the default chain and becomes the only entry, in
/// checksummed form. Lists that already carry prefixes are kept, dropping
/// entries that cannot be parsed.
pub fn normalize_legacy_addresses(list: &[String]) -> Result<Vec<SafeAddress>> {
    if list.is_empty() {
        return Ok(Vec::new());
    }

    if !list.iter().any(|entry| entry.contains(SEPARATOR)) {
        let legacy = &list[0];
        let checksummed = fix_safe_address(legacy)?;
        tracing::info!(address = %checksummed, "Upgrading legacy account address");
        return Ok(vec![SafeAddress::for_chain(DEFAULT_CHAIN, checksummed)]);
    }

    Ok(list
        .iter()
        .filter_map(|entry| match SafeAddress::parse(entry) {
            Ok(addr) => Some(addr),
            Err(e) => {
                tracing::warn!(entry = %entry, error = %e, "Dropping unreadable account entry");
                None
            }
        })
        .collect())
}
