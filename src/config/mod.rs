//! Configuration for the Safe wallet core

pub mod rpc;

use crate::{Error, Result};
use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Explorer API key environment variable name
pub const EXPLORER_API_KEY_ENV: &str = "GNOSISSCAN_API_KEY";

/// Chain that freshly bootstrapped accounts live on
pub const DEFAULT_CHAIN: Chain = Chain::Gnosis;

/// Supported blockchain networks
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    #[default]
    Gnosis,
    /// Kept only so that `base:0x` placeholders left by older builds can be
    /// recognised and replaced.
    Base,
}

impl Chain {
    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Gnosis => 100,
            Chain::Base => 8453,
        }
    }

    /// Canonical chain name
    pub fn name(&self) -> &'static str {
        match self {
            Chain::Gnosis => "gnosis",
            Chain::Base => "base",
        }
    }

    /// Short code used in front of stored account addresses
    pub fn prefix(&self) -> &'static str {
        match self {
            Chain::Gnosis => "gno",
            Chain::Base => "base",
        }
    }

    pub fn is_deprecated(&self) -> bool {
        matches!(self, Chain::Base)
    }

    /// Resolve a canonical name, a prefix or a legacy alias.
    pub fn from_alias(alias: &str) -> Result<Self> {
        match alias.trim().to_lowercase().as_str() {
            "gnosis" | "gno" | "crc" => Ok(Chain::Gnosis),
            "base" => Ok(Chain::Base),
            other => Err(Error::UnsupportedChain(other.to_string())),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_alias(s)
    }
}

/// Map a chain name to its address prefix.
///
/// Unknown names pass through untouched so that callers can still look up
/// entries written with prefixes this build does not know about.
pub fn prefix_for(chain: &str) -> String {
    match Chain::from_alias(chain) {
        Ok(c) => c.prefix().to_string(),
        Err(_) => chain.to_string(),
    }
}

/// Paymaster sponsoring user operations on a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymasterOptions {
    pub paymaster_address: Address,
}

impl PaymasterOptions {
    pub fn for_chain(chain: Chain) -> Option<Self> {
        match chain {
            Chain::Gnosis => Some(Self {
                paymaster_address: address!("29b75b68551F2D2B3f298d327A20ac2289f0bb36"),
            }),
            Chain::Base => None,
        }
    }
}

/// Addresses of the Safe singletons and ERC-4337 infrastructure.
///
/// The Safe deployments are deterministic, so the same set applies to every
/// supported chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeDeployment {
    pub entry_point: Address,
    pub safe_4337_module: Address,
    pub safe_module_setup: Address,
    pub proxy_factory: Address,
    pub safe_singleton: Address,
    pub multi_send_call_only: Address,
}

impl Default for SafeDeployment {
    fn default() -> Self {
        Self {
            // EntryPoint v0.6
            entry_point: address!("5FF137D4b0FDCD49DcA30c7CF57E578a026d2789"),
            // Safe4337Module v0.2.0
            safe_4337_module: address!("a581c4A4DB7175302464fF3C06380BC3270b4037"),
            safe_module_setup: address!("8EcD4ec46D4D2a6B64fE960B3D64e8B94B2234eb"),
            proxy_factory: address!("4e1DCf7AD4e460CfD30791CCC4F9c8a4f820ec67"),
            safe_singleton: address!("29fcB43b46531BcA003ddC8FCB67FFE91900C762"),
            multi_send_call_only: address!("9641d764fc13c8B624c04430C7356C1C7C8102e2"),
        }
    }
}

/// Trust-fund group factory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustFundConfig {
    pub factory: Address,
    pub mint_policy: Address,
    pub service: Address,
    pub fee_collection: Address,
}

impl Default for TrustFundConfig {
    fn default() -> Self {
        let operator = address!("f5CDb3Ae546E66da2Df9203Fb1E2D5F0C94f4893");
        Self {
            factory: address!("68fD4a36DD4ee9766b48A1A484D0b1d7A0d77D05"),
            mint_policy: Address::ZERO,
            service: operator,
            fee_collection: operator,
        }
    }
}

/// Block explorer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub base_url: String,
    /// Falls back to `GNOSISSCAN_API_KEY` when unset
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.gnosisscan.io/api".to_string(),
            api_key: std::env::var(EXPLORER_API_KEY_ENV).ok(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// File holding the persisted key and account list
    pub storage_path: PathBuf,
    /// Chain used when bootstrapping from nothing
    #[serde(default)]
    pub default_chain: Chain,
    /// Route writes through the ERC-4337 bundler when one is configured
    #[serde(default = "default_true")]
    pub use_erc4337: bool,
    /// Salt nonce for counterfactual account deployment
    #[serde(default)]
    pub salt_nonce: u64,
    /// Per-chain RPC URLs overriding the environment
    #[serde(default)]
    pub rpc_overrides: HashMap<Chain, String>,
    #[serde(default)]
    pub deployment: SafeDeployment,
    #[serde(default)]
    pub trust_fund: TrustFundConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("safe-wallet.json"),
            default_chain: DEFAULT_CHAIN,
            use_erc4337: true,
            salt_nonce: 0,
            rpc_overrides: HashMap::new(),
            deployment: SafeDeployment::default(),
            trust_fund: TrustFundConfig::default(),
            explorer: ExplorerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// RPC endpoints from the environment with this file's overrides applied
    pub fn rpc(&self) -> RpcConfig {
        RpcConfig::from_env().with_overrides(&self.rpc_overrides)
    }
}
