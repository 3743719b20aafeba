//! Chain access
//!
//! [`ChainClient`] is the narrow set of JSON-RPC operations the wallet needs.
//! [`RpcChainClient`] implements it over an alloy HTTP provider that signs
//! with the owner wallet; tests substitute their own implementations.

use crate::config::{Chain, RpcConfig};
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;

/// EIP-1559 fee suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeEstimate {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain(&self) -> Chain;

    async fn get_code(&self, address: Address) -> Result<Bytes>;

    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// `eth_call` against the latest block
    async fn call(&self, tx: TransactionRequest) -> Result<Bytes>;

    /// Sign with the owner wallet and broadcast; returns the transaction hash
    /// without waiting for inclusion.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256>;

    async fn estimate_fees(&self) -> Result<FeeEstimate>;

    /// Unix timestamp of a block, `None` if the node doesn't know it
    async fn block_timestamp(&self, number: u64) -> Result<Option<u64>>;
}

/// Encode `call`, run it with `eth_call` and decode the return value
pub async fn call_contract<C: SolCall>(
    client: &dyn ChainClient,
    to: Address,
    from: Option<Address>,
    call: &C,
) -> Result<C::Return> {
    let mut tx = TransactionRequest::default()
        .to(to)
        .input(Bytes::from(call.abi_encode()).into());
    if let Some(from) = from {
        tx = tx.from(from);
    }
    let output = client.call(tx).await?;
    C::abi_decode_returns(&output).map_err(|e| Error::Abi(format!("{}: {}", C::SIGNATURE, e)))
}

/// Chain client over an alloy HTTP provider
pub struct RpcChainClient {
    chain: Chain,
    provider: DynProvider,
}

impl RpcChainClient {
    pub fn connect(chain: Chain, rpc_url: &str, wallet: &SecureWallet) -> Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| Error::Provider(format!("Invalid RPC URL {}: {}", rpc_url, e)))?;

        let provider = ProviderBuilder::new()
            .wallet(wallet.wallet().clone())
            .connect_http(url)
            .erased();

        Ok(Self { chain, provider })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn get_code(&self, address: Address) -> Result<Bytes> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(|e| Error::Provider(format!("Failed to get code: {}", e)))
    }

    async fn get_balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| Error::Provider(format!("Failed to get balance: {}", e)))
    }

    async fn call(&self, tx: TransactionRequest) -> Result<Bytes> {
        self.provider
            .call(tx)
            .await
            .map_err(|e| Error::Provider(format!("eth_call failed: {}", e)))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256> {
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| Error::Dispatch(format!("Failed to send transaction: {}", e)))?;
        Ok(*pending.tx_hash())
    }

    async fn estimate_fees(&self) -> Result<FeeEstimate> {
        let estimate = self
            .provider
            .estimate_eip1559_fees()
            .await
            .map_err(|e| Error::Provider(format!("Failed to estimate fees: {}", e)))?;
        Ok(FeeEstimate {
            max_fee_per_gas: estimate.max_fee_per_gas,
            max_priority_fee_per_gas: estimate.max_priority_fee_per_gas,
        })
    }

    async fn block_timestamp(&self, number: u64) -> Result<Option<u64>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .map_err(|e| Error::Provider(format!("Failed to get block {}: {}", number, e)))?;
        Ok(block.map(|b| b.header.timestamp))
    }
}

/// Resolves a chain client for a chain and owner wallet
pub trait ChainConnector: Send + Sync {
    fn connect(&self, chain: Chain, wallet: &SecureWallet) -> Result<Arc<dyn ChainClient>>;
}

/// Connector using the configured RPC endpoints
pub struct RpcConnector {
    rpc: RpcConfig,
}

impl RpcConnector {
    pub fn new(rpc: RpcConfig) -> Self {
        Self { rpc }
    }

    pub fn rpc(&self) -> &RpcConfig {
        &self.rpc
    }
}

impl ChainConnector for RpcConnector {
    fn connect(&self, chain: Chain, wallet: &SecureWallet) -> Result<Arc<dyn ChainClient>> {
        let url = self
            .rpc
            .get(chain)
            .ok_or_else(|| Error::Provider(format!("No RPC URL configured for {}", chain)))?;
        Ok(Arc::new(RpcChainClient::connect(chain, url, wallet)?))
    }
}


#[cfg(test)]
pub(crate) mod mock {
    //! In-memory chain client for tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type CallHandler = Box<dyn Fn(&TransactionRequest) -> Result<Bytes> + Send + Sync>;

    pub struct MockChainClient {
        pub chain: Chain,
        pub code: Bytes,
        pub balance: U256,
        pub fees: FeeEstimate,
        pub code_queries: AtomicUsize,
        pub sent: Mutex<Vec<TransactionRequest>>,
        on_call: CallHandler,
    }

    impl MockChainClient {
        pub fn new(chain: Chain) -> Self {
            Self {
                chain,
                code: Bytes::new(),
                balance: U256::ZERO,
                fees: FeeEstimate {
                    max_fee_per_gas: 2_000_000_000,
                    max_priority_fee_per_gas: 1_000_000_000,
                },
                code_queries: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                on_call: Box::new(|_| Err(Error::Provider("no call handler".to_string()))),
            }
        }

        pub fn with_code(mut self, code: impl Into<Bytes>) -> Self {
            self.code = code.into();
            self
        }

        pub fn with_balance(mut self, balance: U256) -> Self {
            self.balance = balance;
            self
        }

        pub fn on_call(
            mut self,
            handler: impl Fn(&TransactionRequest) -> Result<Bytes> + Send + Sync + 'static,
        ) -> Self {
            self.on_call = Box::new(handler);
            self
        }

        pub fn code_queries(&self) -> usize {
            self.code_queries.load(Ordering::SeqCst)
        }

        pub fn sent(&self) -> Vec<TransactionRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    /// Connector handing out one shared mock, or failing like a missing RPC URL
    pub struct MockConnector(pub Option<Arc<MockChainClient>>);

    impl ChainConnector for MockConnector {
        fn connect(&self, chain: Chain, _wallet: &SecureWallet) -> Result<Arc<dyn ChainClient>> {
            match &self.0 {
                Some(client) => Ok(client.clone()),
                None => Err(Error::Provider(format!(
                    "No RPC URL configured for {}",
                    chain
                ))),
            }
        }
    }

    /// First four bytes of the request's call data
    pub fn selector(tx: &TransactionRequest) -> [u8; 4] {
        let input = tx.input.input().cloned().unwrap_or_default();
        let mut selector = [0u8; 4];
        if input.len() >= 4 {
            selector.copy_from_slice(&input[..4]);
        }
        selector
    }

    #[async_trait]
    impl ChainClient for MockChainClient {
        fn chain(&self) -> Chain {
            self.chain
        }

        async fn get_code(&self, _address: Address) -> Result<Bytes> {
            self.code_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.code.clone())
        }

        async fn get_balance(&self, _address: Address) -> Result<U256> {
            Ok(self.balance)
        }

        async fn call(&self, tx: TransactionRequest) -> Result<Bytes> {
            (self.on_call)(&tx)
        }

        async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256> {
            let mut sent = self.sent.lock().unwrap();
            sent.push(tx);
            Ok(B256::with_last_byte(sent.len() as u8))
        }

        async fn estimate_fees(&self) -> Result<FeeEstimate> {
            Ok(self.fees)
        }

        async fn block_timestamp(&self, number: u64) -> Result<Option<u64>> {
            Ok((number > 0).then_some(1_700_000_000))
        }
    }
}
