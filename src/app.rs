//! Application bootstrap
//!
//! [`AppFactory`] owns the application state: which phase bootstrap reached,
//! the account list and one [`SafeService`] per chain. State is an immutable
//! [`AppSnapshot`]; every update builds a new snapshot and swaps it in whole,
//! so readers never see a half-applied change.

use crate::config::{AppConfig, Chain};
use crate::safe::{SafeAddress, SafeAddressStore, SafeService, ServiceEnv};
use crate::storage::Storage;
use crate::wallet::KeyStore;
use crate::{Error, Result};
use futures::future::join_all;
use secrecy::SecretString;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppPhase {
    NoKey,
    KeyReady,
    AddressesRestored,
    ServicesReady,
}

pub struct AppSnapshot {
    pub phase: AppPhase,
    pub addresses: Vec<SafeAddress>,
    pub services: BTreeMap<Chain, Arc<SafeService>>,
}

impl AppSnapshot {
    fn empty() -> Self {
        Self {
            phase: AppPhase::NoKey,
            addresses: Vec::new(),
            services: BTreeMap::new(),
        }
    }

    pub fn service(&self, chain: Chain) -> Option<Arc<SafeService>> {
        self.services.get(&chain).cloned()
    }
}

pub struct AppFactory {
    storage: Arc<dyn Storage>,
    keys: KeyStore,
    env: ServiceEnv,
    default_chain: Chain,
    state: RwLock<Arc<AppSnapshot>>,
}

impl AppFactory {
    pub fn new(config: &AppConfig, storage: Arc<dyn Storage>) -> Self {
        let env = ServiceEnv::from_config(config, storage.clone());
        Self::with_env(storage, env, config.default_chain)
    }

    pub fn with_env(storage: Arc<dyn Storage>, env: ServiceEnv, default_chain: Chain) -> Self {
        Self {
            keys: KeyStore::new(storage.clone()),
            storage,
            env,
            default_chain,
            state: RwLock::new(Arc::new(AppSnapshot::empty())),
        }
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    pub fn address_store(&self) -> &SafeAddressStore {
        &self.env.store
    }

    pub async fn snapshot(&self) -> Arc<AppSnapshot> {
        self.state.read().await.clone()
    }

    pub async fn find_service(&self, chain: Chain) -> Option<Arc<SafeService>> {
        self.snapshot().await.service(chain)
    }

    async fn install(&self, snapshot: AppSnapshot) -> Arc<AppSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.state.write().await = snapshot.clone();
        snapshot
    }

    /// Rebuild services for every stored account.
    ///
    /// Without a stored key nothing happens and the phase stays `NoKey`.
    pub async fn init_app(&self) -> Result<Arc<AppSnapshot>> {
        let Some(key) = self.keys.has_key().await? else {
            info!("No signing key, nothing to restore");
            return Ok(self.install(AppSnapshot::empty()).await);
        };

        let addresses = self.env.store.restore().await?;
        if addresses.is_empty() {
            return Ok(self
                .install(AppSnapshot {
                    phase: AppPhase::AddressesRestored,
                    addresses,
                    services: BTreeMap::new(),
                })
                .await);
        }

        let created = join_all(
            addresses
                .iter()
                .map(|address| self.restore_service(&key, address)),
        )
        .await;

        let mut services = BTreeMap::new();
        for (address, result) in addresses.iter().zip(created) {
            match result {
                Ok(service) => {
                    services.insert(service.chain(), Arc::new(service));
                }
                Err(e) => warn!(address = %address, error = %e, "Skipping stored account"),
            }
        }

        info!(
            accounts = addresses.len(),
            services = services.len(),
            "Application restored"
        );

        Ok(self
            .install(AppSnapshot {
                phase: AppPhase::ServicesReady,
                addresses: self.env.store.addresses().await?,
                services,
            })
            .await)
    }

    /// The deployed flag of a stored account comes from the chain, so the
    /// account kit only loads for accounts that hold code.
    async fn restore_service(
        &self,
        key: &SecretString,
        address: &SafeAddress,
    ) -> Result<SafeService> {
        SafeService::open(address.prefix(), key, address.address(), &self.env).await
    }

    async fn require_key(&self) -> Result<SecretString> {
        self.keys
            .has_key()
            .await?
            .ok_or_else(|| Error::Wallet("No signing key; initialise the app first".to_string()))
    }

    /// First start: create a key and an undeployed account on the default
    /// chain, then check whether that account already exists on chain.
    pub async fn init_app_from_zero(&self) -> Result<Arc<AppSnapshot>> {
        self.keys.ensure_key().await?;
        let current = self.snapshot().await;
        self.install(AppSnapshot {
            phase: AppPhase::KeyReady,
            addresses: current.addresses.clone(),
            services: current.services.clone(),
        })
        .await;

        self.add_safe(self.default_chain).await?;
        self.refresh_account(self.default_chain).await
    }

    /// Re-read the account on `chain` from the chain and rebuild its service.
    ///
    /// Run this once the user operation that deploys a fresh account has
    /// been included: the placeholder then gives way to the real address and
    /// the account kit loads. Failed services are left as they are.
    pub async fn refresh_account(&self, chain: Chain) -> Result<Arc<AppSnapshot>> {
        let key = self.require_key().await?;
        let current = self.snapshot().await;
        let service = current
            .service(chain)
            .ok_or_else(|| Error::InvalidArgument(format!("No account on {}", chain)))?;

        if !service.is_ready() {
            warn!(chain = %chain, "Skipping deployment check on failed service");
            return Ok(current);
        }

        let refreshed = SafeService::open(chain.name(), &key, service.address(), &self.env).await?;
        info!(
            chain = %chain,
            address = %refreshed.address(),
            deployed = refreshed.deployed(),
            "Account refreshed"
        );

        let mut services = current.services.clone();
        services.insert(chain, Arc::new(refreshed));

        Ok(self
            .install(AppSnapshot {
                phase: AppPhase::ServicesReady,
                addresses: self.env.store.addresses().await?,
                services,
            })
            .await)
    }

    /// Add a placeholder account on `chain` and a service for it
    pub async fn add_safe(&self, chain: Chain) -> Result<Arc<AppSnapshot>> {
        let key = self.require_key().await?;

        let placeholder = SafeAddress::placeholder(chain);
        let service =
            SafeService::create(chain.name(), &key, placeholder.address(), false, &self.env).await?;
        self.env.store.add_address(placeholder).await?;

        let current = self.snapshot().await;
        let mut services = current.services.clone();
        services.insert(chain, Arc::new(service));

        info!(chain = %chain, "Added account");

        Ok(self
            .install(AppSnapshot {
                phase: AppPhase::ServicesReady,
                addresses: self.env.store.addresses().await?,
                services,
            })
            .await)
    }

    /// Erase the key, the account list and everything else in storage
    pub async fn clear_app(&self) -> Result<()> {
        self.storage.clear().await?;
        self.install(AppSnapshot::empty()).await;
        info!("Application state cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{selector, MockChainClient, MockConnector};
    use crate::config::{RpcConfig, SafeDeployment, TrustFundConfig};
    use crate::dispatch::{AccountDeployment, DispatchPath};
    use crate::safe::contracts::ISafeProxyFactory;
    use crate::safe::ServiceState;
    use crate::storage::{MemoryStorage, SAFE_ADDRESSES_KEY, SIGNER_KEY_KEY};
    use crate::wallet::SecureWallet;
    use alloy::primitives::{Bytes, U256};
    use alloy::sol_types::{SolCall, SolValue};

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ACCOUNT: &str = "0x169874fA8A472fB54aE31D500d57c0c7D5143815";
    const CREATION_CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];

    /// Chain whose proxy factory answers `proxyCreationCode`
    fn factory_chain() -> MockChainClient {
        MockChainClient::new(Chain::Gnosis).on_call(|tx| {
            if selector(tx) == ISafeProxyFactory::proxyCreationCodeCall::SELECTOR {
                Ok(Bytes::from(CREATION_CODE.to_vec()).abi_encode().into())
            } else {
                Err(Error::Provider("unexpected call".to_string()))
            }
        })
    }

    async fn predicted_address(app: &AppFactory) -> String {
        let key = app.key_store().has_key().await.unwrap().unwrap();
        let owner = SecureWallet::from_secret(&key).unwrap().address();
        AccountDeployment::new(owner, 0, SafeDeployment::default())
            .address_from_creation_code(&CREATION_CODE)
            .to_checksum(None)
    }

    fn factory(storage: Arc<MemoryStorage>, client: Option<Arc<MockChainClient>>) -> AppFactory {
        let env = ServiceEnv {
            connector: Arc::new(MockConnector(client)),
            rpc: RpcConfig::with_urls(Default::default()),
            store: SafeAddressStore::new(storage.clone()),
            use_erc4337: true,
            deployment: SafeDeployment::default(),
            salt_nonce: 0,
            trust_fund: TrustFundConfig::default(),
        };
        AppFactory::with_env(storage, env, Chain::Gnosis)
    }

    #[tokio::test]
    async fn test_init_without_key_is_noop() {
        let storage = Arc::new(MemoryStorage::new());
        let app = factory(storage.clone(), Some(Arc::new(MockChainClient::new(Chain::Gnosis))));

        let snapshot = app.init_app().await.unwrap();
        assert_eq!(snapshot.phase, AppPhase::NoKey);
        assert!(snapshot.services.is_empty());
        assert!(storage.get(SAFE_ADDRESSES_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_init_with_key_and_no_addresses() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SIGNER_KEY_KEY, TEST_KEY.to_string()).await.unwrap();
        let app = factory(storage, Some(Arc::new(MockChainClient::new(Chain::Gnosis))));

        let snapshot = app.init_app().await.unwrap();
        assert_eq!(snapshot.phase, AppPhase::AddressesRestored);
        assert!(snapshot.addresses.is_empty());
        assert!(snapshot.services.is_empty());
    }

    #[tokio::test]
    async fn test_init_from_zero_creates_single_default_account() {
        let storage = Arc::new(MemoryStorage::new());
        let client = Arc::new(factory_chain());
        let app = factory(storage.clone(), Some(client.clone()));

        let snapshot = app.init_app_from_zero().await.unwrap();

        assert!(app.key_store().has_key().await.unwrap().is_some());
        assert_eq!(snapshot.phase, AppPhase::ServicesReady);
        assert_eq!(snapshot.addresses, vec![SafeAddress::placeholder(Chain::Gnosis)]);
        assert_eq!(
            app.address_store().addresses().await.unwrap(),
            vec![SafeAddress::placeholder(Chain::Gnosis)]
        );

        let service = app.find_service(Chain::Gnosis).await.unwrap();
        assert!(!service.deployed());
        assert!(!service.has_path(DispatchPath::Legacy));
        // only the counterfactual address was looked up
        assert_eq!(client.code_queries(), 1);
        assert_eq!(service.deployed(), service.is_deployed().await.unwrap());
        assert_eq!(client.code_queries(), 1);
    }

    #[tokio::test]
    async fn test_deployed_fresh_account_gets_its_address() {
        let storage = Arc::new(MemoryStorage::new());
        let client = Arc::new(
            factory_chain()
                .with_code(vec![0x60u8])
                .with_balance(U256::from(2_000_000_000_000_000_000u128)),
        );
        let app = factory(storage.clone(), Some(client.clone()));

        let snapshot = app.init_app_from_zero().await.unwrap();
        let expected = SafeAddress::for_chain(Chain::Gnosis, predicted_address(&app).await);
        assert_eq!(snapshot.addresses, vec![expected.clone()]);
        let service = snapshot.service(Chain::Gnosis).unwrap();
        assert!(service.deployed());
        assert!(service.has_path(DispatchPath::Legacy));

        // next session
        let next = factory(storage, Some(client));
        let restored = next.init_app().await.unwrap();
        assert_eq!(restored.addresses, vec![expected]);
        let service = restored.service(Chain::Gnosis).unwrap();
        assert!(service.deployed());
        assert!(service.refresh_deployed().await.unwrap());
        assert_eq!(service.native_balance().await.unwrap(), "2");
    }

    #[tokio::test]
    async fn test_refresh_account_keeps_placeholder_until_deployed() {
        let storage = Arc::new(MemoryStorage::new());
        let app = factory(storage, Some(Arc::new(factory_chain())));
        app.init_app_from_zero().await.unwrap();

        let snapshot = app.refresh_account(Chain::Gnosis).await.unwrap();
        assert_eq!(snapshot.addresses, vec![SafeAddress::placeholder(Chain::Gnosis)]);
        assert!(!snapshot.service(Chain::Gnosis).unwrap().deployed());
        assert!(matches!(
            app.refresh_account(Chain::Base).await,
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_init_restores_legacy_address() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SIGNER_KEY_KEY, TEST_KEY.to_string()).await.unwrap();
        storage
            .set(
                SAFE_ADDRESSES_KEY,
                r#"["0x169874fa8a472fb54ae31d500d57c0c7d5143815"]"#.to_string(),
            )
            .await
            .unwrap();

        let client = Arc::new(MockChainClient::new(Chain::Gnosis).with_code(vec![0x60u8]));
        let app = factory(storage.clone(), Some(client.clone()));
        let snapshot = app.init_app().await.unwrap();

        assert_eq!(snapshot.phase, AppPhase::ServicesReady);
        assert_eq!(
            snapshot.addresses,
            vec![SafeAddress::parse(&format!("gno:{}", ACCOUNT)).unwrap()]
        );
        let service = snapshot.service(Chain::Gnosis).unwrap();
        assert_eq!(service.address(), ACCOUNT);
        assert!(service.deployed());
        assert!(service.has_path(DispatchPath::Legacy));
        assert_eq!(client.code_queries(), 1);
    }

    #[tokio::test]
    async fn test_restored_address_without_code_is_not_deployed() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SIGNER_KEY_KEY, TEST_KEY.to_string()).await.unwrap();
        storage
            .set(SAFE_ADDRESSES_KEY, format!(r#"["gno:{}"]"#, ACCOUNT))
            .await
            .unwrap();

        let client = Arc::new(MockChainClient::new(Chain::Gnosis));
        let app = factory(storage, Some(client.clone()));
        let snapshot = app.init_app().await.unwrap();

        let service = snapshot.service(Chain::Gnosis).unwrap();
        assert!(!service.deployed());
        assert!(!service.has_path(DispatchPath::Legacy));
        assert_eq!(client.code_queries(), 1);
    }

    #[tokio::test]
    async fn test_init_with_unreachable_provider_keeps_failed_service() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SIGNER_KEY_KEY, TEST_KEY.to_string()).await.unwrap();
        storage
            .set(
                SAFE_ADDRESSES_KEY,
                r#"["gno:0x169874fA8A472fB54aE31D500d57c0c7D5143815"]"#.to_string(),
            )
            .await
            .unwrap();

        let app = factory(storage, None);
        let snapshot = app.init_app().await.unwrap();
        let service = snapshot.service(Chain::Gnosis).unwrap();
        assert!(matches!(service.state(), ServiceState::Failed(_)));
    }

    #[tokio::test]
    async fn test_snapshots_are_replaced_not_mutated() {
        let storage = Arc::new(MemoryStorage::new());
        let app = factory(storage, Some(Arc::new(MockChainClient::new(Chain::Gnosis))));

        let before = app.snapshot().await;
        app.init_app_from_zero().await.unwrap();
        let after = app.snapshot().await;

        assert!(before.services.is_empty());
        assert_eq!(before.phase, AppPhase::NoKey);
        assert_eq!(after.services.len(), 1);
    }

    #[tokio::test]
    async fn test_add_safe_requires_key() {
        let storage = Arc::new(MemoryStorage::new());
        let app = factory(storage, Some(Arc::new(MockChainClient::new(Chain::Gnosis))));
        assert!(matches!(app.add_safe(Chain::Gnosis).await, Err(Error::Wallet(_))));
    }

    #[tokio::test]
    async fn test_clear_app_erases_everything() {
        let storage = Arc::new(MemoryStorage::new());
        let app = factory(storage.clone(), Some(Arc::new(MockChainClient::new(Chain::Gnosis))));
        app.init_app_from_zero().await.unwrap();

        app.clear_app().await.unwrap();

        assert!(storage.get(SIGNER_KEY_KEY).await.unwrap().is_none());
        assert!(storage.get(SAFE_ADDRESSES_KEY).await.unwrap().is_none());
        let snapshot = app.snapshot().await;
        assert_eq!(snapshot.phase, AppPhase::NoKey);
        assert!(app.find_service(Chain::Gnosis).await.is_none());
    }
}
