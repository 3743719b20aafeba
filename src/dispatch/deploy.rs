//! Counterfactual Safe deployment
//!
//! A fresh account is a Safe proxy created by the proxy factory with
//! `createProxyWithNonce`. Its setup enables the 4337 module and installs it
//! as fallback handler, with the local key as the single owner. The proxy
//! address follows from CREATE2 before anything is on chain.

use crate::chain::{call_contract, ChainClient};
use crate::config::SafeDeployment;
use crate::safe::contracts::{ISafe, ISafeModuleSetup, ISafeProxyFactory};
use crate::Result;
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;

#[derive(Debug, Clone)]
pub struct AccountDeployment {
    owner: Address,
    salt_nonce: U256,
    deployment: SafeDeployment,
}

impl AccountDeployment {
    pub fn new(owner: Address, salt_nonce: u64, deployment: SafeDeployment) -> Self {
        Self {
            owner,
            salt_nonce: U256::from(salt_nonce),
            deployment,
        }
    }

    /// Calldata of `Safe.setup(...)` run by the new proxy
    pub fn initializer(&self) -> Bytes {
        let enable_modules = ISafeModuleSetup::enableModulesCall {
            modules: vec![self.deployment.safe_4337_module],
        };
        ISafe::setupCall {
            owners: vec![self.owner],
            threshold: U256::from(1),
            to: self.deployment.safe_module_setup,
            data: enable_modules.abi_encode().into(),
            fallbackHandler: self.deployment.safe_4337_module,
            paymentToken: Address::ZERO,
            payment: U256::ZERO,
            paymentReceiver: Address::ZERO,
        }
        .abi_encode()
        .into()
    }

    /// `factory ‖ createProxyWithNonce(...)`, the user operation `initCode`
    pub fn init_code(&self) -> Bytes {
        let create = ISafeProxyFactory::createProxyWithNonceCall {
            singleton: self.deployment.safe_singleton,
            initializer: self.initializer(),
            saltNonce: self.salt_nonce,
        };
        let mut code = self.deployment.proxy_factory.to_vec();
        code.extend_from_slice(&create.abi_encode());
        Bytes::from(code)
    }

    /// CREATE2 salt used by the factory
    pub fn salt(&self) -> B256 {
        let mut preimage = keccak256(self.initializer()).to_vec();
        preimage.extend_from_slice(&self.salt_nonce.to_be_bytes::<32>());
        keccak256(preimage)
    }

    /// Proxy address given the factory's proxy creation code
    pub fn address_from_creation_code(&self, creation_code: &[u8]) -> Address {
        let mut deployment_code = creation_code.to_vec();
        deployment_code.extend_from_slice(
            &U256::from_be_slice(self.deployment.safe_singleton.as_slice()).to_be_bytes::<32>(),
        );
        self.deployment
            .proxy_factory
            .create2(self.salt(), keccak256(deployment_code))
    }

    /// Predict the proxy address, reading the creation code from the factory
    pub async fn predict_address(&self, client: &dyn ChainClient) -> Result<Address> {
        let creation_code = call_contract(
            client,
            self.deployment.proxy_factory,
            None,
            &ISafeProxyFactory::proxyCreationCodeCall {},
        )
        .await?;
        Ok(self.address_from_creation_code(&creation_code))
    }
}
