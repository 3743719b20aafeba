//! ERC-4337 dispatch through a bundler
//!
//! Targets EntryPoint v0.6 with the Safe 4337 module v0.2.0. The module
//! expects `signature = validAfter(6) ‖ validUntil(6) ‖ owner signatures`
//! and exposes the EIP-712 hash the owner must sign via `getOperationHash`.

use crate::chain::{call_contract, ChainClient};
use crate::config::{PaymasterOptions, SafeDeployment};
use crate::dispatch::bundler::{BundlerApi, UserOperationRpc};
use crate::dispatch::deploy::AccountDeployment;
use crate::dispatch::legacy::owner_signature;
use crate::dispatch::{DispatchOptions, DispatchPath, TransactionDispatcher, TxOutcome};
use crate::safe::contracts::{
    collapse_batch, IEntryPoint, ISafe4337Module, MetaTransaction, UserOperation,
};
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::aliases::U192;
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

/// Zero `validAfter` and `validUntil`: valid immediately, never expires
const VALIDITY_WINDOW: [u8; 12] = [0u8; 12];

/// Well-formed placeholder owner signature used while estimating gas
const DUMMY_OWNER_SIGNATURE: [u8; 65] = hex!(
    "fffffffffffffffffffffffffffffff000000000000000000000000000000000"
    "7aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
    "1c"
);

fn module_signature(owner_signature: &[u8]) -> Bytes {
    let mut signature = VALIDITY_WINDOW.to_vec();
    signature.extend_from_slice(owner_signature);
    Bytes::from(signature)
}

pub struct Erc4337Dispatcher {
    client: Arc<dyn ChainClient>,
    bundler: Arc<dyn BundlerApi>,
    wallet: SecureWallet,
    /// `None` while the account has no address yet
    account: Option<Address>,
    deployment: SafeDeployment,
    salt_nonce: u64,
    paymaster: Option<PaymasterOptions>,
}

impl Erc4337Dispatcher {
    pub fn new(
        client: Arc<dyn ChainClient>,
        bundler: Arc<dyn BundlerApi>,
        wallet: SecureWallet,
        account: Option<Address>,
        deployment: SafeDeployment,
        salt_nonce: u64,
    ) -> Self {
        Self {
            client,
            bundler,
            wallet,
            account,
            deployment,
            salt_nonce,
            paymaster: None,
        }
    }

    pub fn with_paymaster(mut self, paymaster: Option<PaymasterOptions>) -> Self {
        self.paymaster = paymaster;
        self
    }

    fn account_deployment(&self) -> AccountDeployment {
        AccountDeployment::new(self.wallet.address(), self.salt_nonce, self.deployment)
    }

    /// Sender and init code for this submission
    async fn sender(&self, includes_deploy: bool) -> Result<(Address, Bytes)> {
        if !includes_deploy {
            let account = self.account.ok_or_else(|| {
                Error::NotDeployed("account has no address and deployment was not requested".into())
            })?;
            return Ok((account, Bytes::new()));
        }

        let deployment = self.account_deployment();
        let predicted = deployment.predict_address(self.client.as_ref()).await?;
        if let Some(account) = self.account {
            if account != predicted {
                tracing::warn!(
                    account = %account,
                    predicted = %predicted,
                    "Stored account differs from the counterfactual address"
                );
            }
        }
        Ok((self.account.unwrap_or(predicted), deployment.init_code()))
    }

    /// Assemble an unsigned user operation carrying a placeholder signature
    async fn build_user_operation(
        &self,
        tx: &MetaTransaction,
        includes_deploy: bool,
    ) -> Result<UserOperationRpc> {
        let (sender, init_code) = self.sender(includes_deploy).await?;

        let call_data = ISafe4337Module::executeUserOpCall {
            to: tx.to,
            value: tx.value,
            data: tx.data.clone(),
            operation: tx.operation as u8,
        }
        .abi_encode();

        let nonce = call_contract(
            self.client.as_ref(),
            self.deployment.entry_point,
            None,
            &IEntryPoint::getNonceCall {
                sender,
                key: U192::ZERO,
            },
        )
        .await?;

        let fees = self.client.estimate_fees().await?;

        Ok(UserOperationRpc {
            sender,
            nonce,
            init_code,
            call_data: call_data.into(),
            max_fee_per_gas: U256::from(fees.max_fee_per_gas),
            max_priority_fee_per_gas: U256::from(fees.max_priority_fee_per_gas),
            signature: module_signature(&DUMMY_OWNER_SIGNATURE),
            ..Default::default()
        })
    }

    /// Fill gas limits, and paymaster data when sponsored
    async fn apply_gas(&self, op: &mut UserOperationRpc, gas_hint: Option<u64>) -> Result<()> {
        let entry_point = self.deployment.entry_point;

        let estimate = self
            .bundler
            .estimate_user_operation_gas(op, entry_point)
            .await?;
        op.pre_verification_gas = estimate.pre_verification_gas;
        op.verification_gas_limit = estimate.verification_gas_limit;
        op.call_gas_limit = estimate.call_gas_limit;
        if let Some(hint) = gas_hint {
            op.call_gas_limit = op.call_gas_limit.max(U256::from(hint));
        }

        if let Some(paymaster) = &self.paymaster {
            // The paymaster signs over the limits it returns; they are final.
            let sponsorship = self.bundler.sponsor_user_operation(op, entry_point).await?;
            if let Some(hint) = gas_hint {
                if sponsorship.call_gas_limit < U256::from(hint) {
                    tracing::warn!(
                        hint = hint,
                        sponsored = %sponsorship.call_gas_limit,
                        "Paymaster lowered the call gas limit below the hint"
                    );
                }
            }
            tracing::debug!(paymaster = %paymaster.paymaster_address, "User operation sponsored");
            op.paymaster_and_data = sponsorship.paymaster_and_data;
            op.pre_verification_gas = sponsorship.pre_verification_gas;
            op.verification_gas_limit = sponsorship.verification_gas_limit;
            op.call_gas_limit = sponsorship.call_gas_limit;
        }

        Ok(())
    }

    async fn sign(&self, op: &mut UserOperationRpc) -> Result<()> {
        let abi_op: UserOperation = (&*op).into();
        let hash = call_contract(
            self.client.as_ref(),
            self.deployment.safe_4337_module,
            None,
            &ISafe4337Module::getOperationHashCall { userOp: abi_op },
        )
        .await?;
        let signature = self.wallet.sign_hash(&hash)?;
        op.signature = module_signature(&owner_signature(&signature));
        Ok(())
    }
}

#[async_trait]
impl TransactionDispatcher for Erc4337Dispatcher {
    fn path(&self) -> DispatchPath {
        DispatchPath::Erc4337
    }

    async fn submit(
        &self,
        batch: &[MetaTransaction],
        opts: &DispatchOptions,
    ) -> Result<TxOutcome> {
        let tx = collapse_batch(batch, self.deployment.multi_send_call_only)
            .ok_or_else(|| Error::InvalidArgument("empty transaction batch".to_string()))?;

        let mut op = self.build_user_operation(&tx, opts.includes_deploy).await?;
        self.apply_gas(&mut op, opts.gas_hint).await?;
        self.sign(&mut op).await?;

        let hash = self
            .bundler
            .send_user_operation(&op, self.deployment.entry_point)
            .await?;

        tracing::info!(
            sender = %op.sender,
            user_op_hash = %hash,
            includes_deploy = opts.includes_deploy,
            sponsored = !op.paymaster_and_data.is_empty(),
            "Submitted user operation"
        );

        Ok(TxOutcome::UserOperation { hash })
    }
}
