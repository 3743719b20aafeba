//! Direct Safe execution
//!
//! Single-owner, threshold-one flow: read the Safe nonce, let the Safe
//! compute the transaction hash, sign it with the owner key and call
//! `execTransaction` from the owner's EOA. The owner pays gas.

use crate::chain::{call_contract, ChainClient};
use crate::dispatch::{DispatchOptions, DispatchPath, TransactionDispatcher, TxOutcome};
use crate::safe::contracts::{collapse_batch, ISafe, MetaTransaction};
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::Signature;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

pub struct LegacyDispatcher {
    client: Arc<dyn ChainClient>,
    wallet: SecureWallet,
    account: Address,
    multi_send: Address,
}

impl LegacyDispatcher {
    pub fn new(
        client: Arc<dyn ChainClient>,
        wallet: SecureWallet,
        account: Address,
        multi_send: Address,
    ) -> Self {
        Self {
            client,
            wallet,
            account,
            multi_send,
        }
    }
}

/// `r ‖ s ‖ v` with `v` in {27, 28}, the form Safe accepts for an owner
/// signature over the Safe transaction hash
pub fn owner_signature(signature: &Signature) -> Bytes {
    Bytes::from(signature.as_bytes().to_vec())
}

#[async_trait]
impl TransactionDispatcher for LegacyDispatcher {
    fn path(&self) -> DispatchPath {
        DispatchPath::Legacy
    }

    async fn submit(
        &self,
        batch: &[MetaTransaction],
        opts: &DispatchOptions,
    ) -> Result<TxOutcome> {
        let tx = collapse_batch(batch, self.multi_send)
            .ok_or_else(|| Error::InvalidArgument("empty transaction batch".to_string()))?;

        if opts.includes_deploy {
            tracing::debug!(
                account = %self.account,
                "Deployment flag ignored on the legacy path"
            );
        }

        let client = self.client.as_ref();
        let nonce = call_contract(client, self.account, None, &ISafe::nonceCall {}).await?;

        let safe_tx_hash = call_contract(
            client,
            self.account,
            None,
            &ISafe::getTransactionHashCall {
                to: tx.to,
                value: tx.value,
                data: tx.data.clone(),
                operation: tx.operation as u8,
                safeTxGas: U256::ZERO,
                baseGas: U256::ZERO,
                gasPrice: U256::ZERO,
                gasToken: Address::ZERO,
                refundReceiver: Address::ZERO,
                txNonce: nonce,
            },
        )
        .await?;

        let signature = self.wallet.sign_hash(&safe_tx_hash)?;

        let exec = ISafe::execTransactionCall {
            to: tx.to,
            value: tx.value,
            data: tx.data,
            operation: tx.operation as u8,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            signatures: owner_signature(&signature),
        };

        let request = TransactionRequest::default()
            .from(self.wallet.address())
            .to(self.account)
            .input(Bytes::from(exec.abi_encode()).into());

        let tx_hash = client.send_transaction(request).await?;

        tracing::info!(
            account = %self.account,
            nonce = %nonce,
            tx_hash = %tx_hash,
            batch_len = batch.len(),
            "Submitted Safe transaction (not awaiting receipt)"
        );

        Ok(TxOutcome::Unconfirmed { tx_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{selector, MockChainClient};
    use crate::config::Chain;
    use alloy::primitives::{address, B256};
    use alloy::sol_types::SolValue;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ACCOUNT: Address = address!("169874fA8A472fB54aE31D500d57c0c7D5143815");

    fn safe_client(tx_hash: B256) -> MockChainClient {
        MockChainClient::new(Chain::Gnosis).on_call(move |tx| {
            let sel = selector(tx);
            if sel == ISafe::nonceCall::SELECTOR {
                Ok(U256::from(7).abi_encode().into())
            } else if sel == ISafe::getTransactionHashCall::SELECTOR {
                let call = ISafe::getTransactionHashCall::abi_decode(
                    tx.input.input().expect("input"),
                )
                .expect("decode");
                assert_eq!(call.txNonce, U256::from(7));
                Ok(tx_hash.abi_encode().into())
            } else {
                Err(Error::Provider("unexpected call".to_string()))
            }
        })
    }

    #[tokio::test]
    async fn test_submit_signs_safe_hash_and_sends_exec_transaction() {
        let safe_tx_hash = B256::repeat_byte(0x42);
        let client = Arc::new(safe_client(safe_tx_hash));
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();
        let dispatcher =
            LegacyDispatcher::new(client.clone(), wallet.clone(), ACCOUNT, Address::ZERO);

        let to = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let outcome = dispatcher
            .submit(
                &[MetaTransaction::transfer(to, U256::from(1))],
                &DispatchOptions::default(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, TxOutcome::Unconfirmed { .. }));

        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        let exec =
            ISafe::execTransactionCall::abi_decode(sent[0].input.input().unwrap()).unwrap();
        assert_eq!(exec.to, to);
        assert_eq!(exec.value, U256::from(1));
        assert_eq!(exec.signatures.len(), 65);
        assert!(exec.signatures[64] == 27 || exec.signatures[64] == 28);

        let signature = Signature::try_from(exec.signatures.as_ref()).unwrap();
        assert_eq!(
            signature
                .recover_address_from_prehash(&safe_tx_hash)
                .unwrap(),
            wallet.address()
        );
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let client = Arc::new(safe_client(B256::ZERO));
        let wallet = SecureWallet::from_hex(TEST_KEY).unwrap();
        let dispatcher = LegacyDispatcher::new(client.clone(), wallet, ACCOUNT, Address::ZERO);

        let result = dispatcher.submit(&[], &DispatchOptions::default()).await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(client.sent().is_empty());
    }
}
