//! Key management
//!
//! This module owns the account owner's private key: the persisted copy in
//! [`KeyStore`] and the in-memory signer in [`SecureWallet`]. The raw key is
//! never logged and never serialized outside the key store entry.

mod key_store;
mod signer;

pub use key_store::KeyStore;
pub use signer::{address_from_key, SecureWallet};
