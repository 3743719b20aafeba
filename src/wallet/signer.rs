//! Local signing wallet
//!
//! SECURITY: the signer is the only in-memory holder of the private key.
//! - Keys are held in alloy's PrivateKeySigner
//! - Keys are never serialized by this type
//! - Keys are never logged

use crate::{Error, Result};
use alloy::network::EthereumWallet;
use alloy::primitives::{hex, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::{Signature, SignerSync};
use secrecy::{ExposeSecret, SecretString};

/// Wallet that owns the Safe owner key
#[derive(Clone)]
pub struct SecureWallet {
    signer: PrivateKeySigner,
    /// Public address (safe to expose)
    address: Address,
    /// Ethereum wallet for alloy integration
    wallet: EthereumWallet,
}

impl SecureWallet {
    /// Create a wallet from a hex-encoded private key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;

        Ok(Self::from_signer(signer))
    }

    pub fn from_secret(key: &SecretString) -> Result<Self> {
        Self::from_hex(key.expose_secret())
    }

    /// Generate a fresh random key, returning the wallet and its hex encoding
    pub fn generate() -> (Self, SecretString) {
        let signer = PrivateKeySigner::random();
        let key = SecretString::from(hex::encode_prefixed(signer.to_bytes()));
        (Self::from_signer(signer), key)
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        let wallet = EthereumWallet::from(signer.clone());
        Self {
            signer,
            address,
            wallet,
        }
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get a reference to the EthereumWallet for use with alloy providers
    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }

    /// Sign a 32-byte digest without any message prefix
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| Error::Wallet(format!("Signing failed: {}", e)))
    }
}

impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

/// Derive the owner address of a hex-encoded private key
pub fn address_from_key(key_hex: &str) -> Result<Address> {
    SecureWallet::from_hex(key_hex).map(|w| w.address())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (DO NOT use in production!)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_wallet_from_hex() {
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();

        assert_eq!(
            wallet.address().to_checksum(None),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();

        let debug_str = format!("{:?}", wallet);

        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_generated_key_round_trips() {
        let (wallet, key) = SecureWallet::generate();
        let restored = SecureWallet::from_secret(&key).unwrap();
        assert_eq!(wallet.address(), restored.address());
        assert_eq!(key.expose_secret().len(), 66);
    }

    #[test]
    fn test_sign_hash_recovers_owner() {
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();
        let hash = B256::repeat_byte(0x11);
        let signature = wallet.sign_hash(&hash).unwrap();
        let recovered = signature.recover_address_from_prehash(&hash).unwrap();
        assert_eq!(recovered, wallet.address());
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(matches!(
            address_from_key("0x1234"),
            Err(Error::Wallet(_))
        ));
    }
}
