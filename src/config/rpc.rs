//! RPC and bundler endpoint configuration
//!
//! Resolution order per chain:
//! 1. Per-chain env vars (GNOSIS_RPC_URL, BASE_RPC_URL) - highest priority
//! 2. Public RPC fallbacks
//!
//! Bundler endpoints come from `BUNDLER_URL` (used for every chain) or are
//! built from `PIMLICO_API_KEY`. Without either, no bundler is configured and
//! writes go through the legacy Safe transaction path.
//!
//! ```bash
//! export GNOSIS_RPC_URL="https://rpc.gnosis.gateway.fm"
//! export PIMLICO_API_KEY="pim_..."
//! ```

use crate::config::Chain;
use std::collections::HashMap;

/// Environment variable names
mod env_vars {
    pub const GNOSIS_RPC_URL: &str = "GNOSIS_RPC_URL";
    pub const BASE_RPC_URL: &str = "BASE_RPC_URL";

    pub const BUNDLER_URL: &str = "BUNDLER_URL";
    pub const PIMLICO_API_KEY: &str = "PIMLICO_API_KEY";
}

/// Public RPC endpoints (rate limited)
mod public_rpcs {
    pub const GNOSIS: &str = "https://rpc.gnosischain.com";
    pub const BASE: &str = "https://mainnet.base.org";
}

/// RPC configuration for the supported chains
#[derive(Debug, Clone, Default)]
pub struct RpcConfig {
    urls: HashMap<Chain, String>,
    bundler_urls: HashMap<Chain, String>,
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        let mut urls = HashMap::new();

        if let Ok(url) = std::env::var(env_vars::GNOSIS_RPC_URL) {
            tracing::debug!("Using GNOSIS_RPC_URL for Gnosis");
            urls.insert(Chain::Gnosis, url);
        }
        if let Ok(url) = std::env::var(env_vars::BASE_RPC_URL) {
            tracing::debug!("Using BASE_RPC_URL for Base");
            urls.insert(Chain::Base, url);
        }

        if !urls.contains_key(&Chain::Gnosis) {
            tracing::debug!("No RPC configured for Gnosis, using public RPC");
        }
        urls.entry(Chain::Gnosis)
            .or_insert_with(|| public_rpcs::GNOSIS.to_string());
        urls.entry(Chain::Base)
            .or_insert_with(|| public_rpcs::BASE.to_string());

        let mut bundler_urls = HashMap::new();
        if let Ok(url) = std::env::var(env_vars::BUNDLER_URL) {
            tracing::debug!("Using BUNDLER_URL for all chains");
            for chain in [Chain::Gnosis, Chain::Base] {
                bundler_urls.insert(chain, url.clone());
            }
        } else if let Ok(key) = std::env::var(env_vars::PIMLICO_API_KEY) {
            tracing::info!("Building bundler URLs from PIMLICO_API_KEY");
            for chain in [Chain::Gnosis, Chain::Base] {
                bundler_urls.insert(chain, pimlico_url(chain, &key));
            }
        }

        Self { urls, bundler_urls }
    }

    /// Create with explicit RPC URLs and no bundler
    pub fn with_urls(urls: HashMap<Chain, String>) -> Self {
        Self {
            urls,
            bundler_urls: HashMap::new(),
        }
    }

    /// Replace RPC URLs for the given chains
    pub fn with_overrides(mut self, overrides: &HashMap<Chain, String>) -> Self {
        for (chain, url) in overrides {
            self.urls.insert(*chain, url.clone());
        }
        self
    }

    pub fn with_bundler(mut self, chain: Chain, url: impl Into<String>) -> Self {
        self.bundler_urls.insert(chain, url.into());
        self
    }

    /// Get RPC URL for a chain
    pub fn get(&self, chain: Chain) -> Option<&str> {
        self.urls.get(&chain).map(|s| s.as_str())
    }

    /// Get bundler URL for a chain
    pub fn bundler(&self, chain: Chain) -> Option<&str> {
        self.bundler_urls.get(&chain).map(|s| s.as_str())
    }

    pub fn has_chain(&self, chain: Chain) -> bool {
        self.urls.contains_key(&chain)
    }
}

fn pimlico_url(chain: Chain, api_key: &str) -> String {
    format!(
        "https://api.pimlico.io/v2/{}/rpc?apikey={}",
        chain.chain_id(),
        api_key
    )
}
