//! Per-chain Safe service
//!
//! A [`SafeService`] wraps one smart account on one chain. Construction never
//! fails because the chain endpoint is unreachable or misconfigured: the
//! service is then [`ServiceState::Failed`] and every operation on it returns
//! [`Error::ServiceFailed`] carrying the original reason.

use crate::chain::{call_contract, ChainClient, ChainConnector, RpcConnector};
use crate::config::{
    AppConfig, Chain, PaymasterOptions, RpcConfig, SafeDeployment, TrustFundConfig,
};
use crate::dispatch::{
    AccountDeployment, BundlerClient, DispatchOptions, DispatchPath, Erc4337Dispatcher,
    LegacyDispatcher, TransactionDispatcher, TxOutcome,
};
use crate::eth::{
    self, format_units, is_valid_ethereum_address, parse_address, ADDRESS_PLACEHOLDER,
};
use crate::safe::address::SafeAddress;
use crate::safe::contracts::{IERC20, ITrustFundFactory, MetaTransaction, TrustFundParams};
use crate::safe::store::SafeAddressStore;
use crate::storage::Storage;
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy::hex;
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use secrecy::SecretString;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything a service needs from its surroundings
#[derive(Clone)]
pub struct ServiceEnv {
    pub connector: Arc<dyn ChainConnector>,
    pub rpc: RpcConfig,
    pub store: SafeAddressStore,
    pub use_erc4337: bool,
    pub deployment: SafeDeployment,
    pub salt_nonce: u64,
    pub trust_fund: TrustFundConfig,
}

impl ServiceEnv {
    pub fn from_config(config: &AppConfig, storage: Arc<dyn Storage>) -> Self {
        let rpc = config.rpc();
        Self {
            connector: Arc::new(RpcConnector::new(rpc.clone())),
            rpc,
            store: SafeAddressStore::new(storage),
            use_erc4337: config.use_erc4337,
            deployment: config.deployment,
            salt_nonce: config.salt_nonce,
            trust_fund: config.trust_fund.clone(),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn ChainConnector>) -> Self {
        self.connector = connector;
        self
    }
}

/// Resolved chain access, signer and dispatch paths of a ready service
pub struct Connection {
    client: Arc<dyn ChainClient>,
    wallet: SecureWallet,
    legacy: Option<Arc<dyn TransactionDispatcher>>,
    erc4337: Option<Arc<dyn TransactionDispatcher>>,
}

impl Connection {
    pub fn new(client: Arc<dyn ChainClient>, wallet: SecureWallet) -> Self {
        Self {
            client,
            wallet,
            legacy: None,
            erc4337: None,
        }
    }

    pub fn with_legacy(mut self, dispatcher: Arc<dyn TransactionDispatcher>) -> Self {
        self.legacy = Some(dispatcher);
        self
    }

    pub fn with_erc4337(mut self, dispatcher: Arc<dyn TransactionDispatcher>) -> Self {
        self.erc4337 = Some(dispatcher);
        self
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    pub fn has_path(&self, path: DispatchPath) -> bool {
        match path {
            DispatchPath::Legacy => self.legacy.is_some(),
            DispatchPath::Erc4337 => self.erc4337.is_some(),
        }
    }

    fn dispatcher(&self, force_legacy: bool) -> Result<&Arc<dyn TransactionDispatcher>> {
        match (&self.erc4337, &self.legacy) {
            (Some(erc4337), _) if !force_legacy => Ok(erc4337),
            (_, Some(legacy)) => Ok(legacy),
            (Some(_), None) => Err(Error::Dispatch(
                "legacy path requested but the account kit is not loaded".to_string(),
            )),
            (None, None) => Err(Error::NotDeployed(
                "no dispatch path available for this account".to_string(),
            )),
        }
    }
}

pub enum ServiceState {
    Ready(Connection),
    Failed(String),
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceState::Ready(_) => write!(f, "Ready"),
            ServiceState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

pub struct SafeService {
    chain: Chain,
    address: String,
    deployed: AtomicBool,
    state: ServiceState,
    deployment: SafeDeployment,
    salt_nonce: u64,
    trust_fund: TrustFundConfig,
}

impl SafeService {
    /// Build a service for `address` on the chain named by `chain_alias`.
    ///
    /// The legacy account kit is only loaded when the address is a real hex
    /// address already known to be deployed, so first-run accounts never
    /// query a contract that doesn't exist yet.
    pub async fn create(
        chain_alias: &str,
        key: &SecretString,
        address: &str,
        deployed: bool,
        env: &ServiceEnv,
    ) -> Result<Self> {
        let chain = Chain::from_alias(chain_alias)?;
        tracing::debug!(chain = %chain, address = %address, "Creating Safe service");

        let wallet = SecureWallet::from_secret(key)?;
        let connected = env.connector.connect(chain, &wallet);
        Self::assemble(chain, wallet, connected, address, deployed, env).await
    }

    /// Build a service whose deployed flag is read from the chain.
    ///
    /// A real address is deployed when it holds code. For the `0x`
    /// placeholder the counterfactual address is checked instead, and once
    /// the account exists there it replaces the placeholder in the service
    /// and in the store. A failed lookup leaves the account undeployed.
    pub async fn open(
        chain_alias: &str,
        key: &SecretString,
        address: &str,
        env: &ServiceEnv,
    ) -> Result<Self> {
        let chain = Chain::from_alias(chain_alias)?;
        let wallet = SecureWallet::from_secret(key)?;

        let client = match env.connector.connect(chain, &wallet) {
            Ok(client) => client,
            Err(e) => return Self::assemble(chain, wallet, Err(e), address, false, env).await,
        };

        let (resolved, deployed) =
            match observe_account(client.as_ref(), wallet.address(), address, env).await {
                Ok(observed) => observed,
                Err(e) => {
                    tracing::warn!(chain = %chain, error = %e, "Could not read deployment status");
                    (address.to_string(), false)
                }
            };

        if resolved != address {
            tracing::info!(
                chain = %chain,
                address = %resolved,
                "Account deployed, recording its address"
            );
            env.store
                .replace_for_chain(chain, SafeAddress::for_chain(chain, resolved.clone()))
                .await?;
        }

        Self::assemble(chain, wallet, Ok(client), &resolved, deployed, env).await
    }

    async fn assemble(
        chain: Chain,
        wallet: SecureWallet,
        connected: Result<Arc<dyn ChainClient>>,
        address: &str,
        deployed: bool,
        env: &ServiceEnv,
    ) -> Result<Self> {
        let state = match connected {
            Ok(client) => ServiceState::Ready(Self::connection(
                chain, client, wallet, address, deployed, env,
            )),
            Err(e) => {
                tracing::warn!(
                    chain = %chain,
                    error = %e,
                    "Provider unavailable, service disabled"
                );
                ServiceState::Failed(e.to_string())
            }
        };

        let service = Self::from_parts(
            chain,
            address,
            deployed,
            state,
            env.deployment,
            env.salt_nonce,
            env.trust_fund.clone(),
        );

        if service.is_ready() {
            env.store
                .add_address(SafeAddress::for_chain(chain, address))
                .await?;
            tracing::info!(
                chain = %chain,
                address = %address,
                erc4337 = service.has_path(DispatchPath::Erc4337),
                legacy = service.has_path(DispatchPath::Legacy),
                "Safe service ready"
            );
        }

        Ok(service)
    }

    fn connection(
        chain: Chain,
        client: Arc<dyn ChainClient>,
        wallet: SecureWallet,
        address: &str,
        deployed: bool,
        env: &ServiceEnv,
    ) -> Connection {
        let account = if is_valid_ethereum_address(address) {
            parse_address(address).ok()
        } else {
            None
        };

        let mut connection = Connection::new(client.clone(), wallet.clone());

        if let (Some(account), true) = (account, deployed) {
            connection = connection.with_legacy(Arc::new(LegacyDispatcher::new(
                client.clone(),
                wallet.clone(),
                account,
                env.deployment.multi_send_call_only,
            )));
        }

        if env.use_erc4337 {
            match env.rpc.bundler(chain) {
                Some(url) => {
                    let dispatcher = Erc4337Dispatcher::new(
                        client,
                        Arc::new(BundlerClient::new(url)),
                        wallet,
                        account,
                        env.deployment,
                        env.salt_nonce,
                    )
                    .with_paymaster(PaymasterOptions::for_chain(chain));
                    connection = connection.with_erc4337(Arc::new(dispatcher));
                }
                None => {
                    tracing::debug!(
                        chain = %chain,
                        "No bundler configured, ERC-4337 path disabled"
                    );
                }
            }
        }

        connection
    }

    pub fn from_parts(
        chain: Chain,
        address: impl Into<String>,
        deployed: bool,
        state: ServiceState,
        deployment: SafeDeployment,
        salt_nonce: u64,
        trust_fund: TrustFundConfig,
    ) -> Self {
        Self {
            chain,
            address: address.into(),
            deployed: AtomicBool::new(deployed),
            state,
            deployment,
            salt_nonce,
            trust_fund,
        }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// Account address as stored, `"0x"` for a not yet deployed account
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn safe_address(&self) -> SafeAddress {
        SafeAddress::for_chain(self.chain, self.address.clone())
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ServiceState::Ready(_))
    }

    pub fn has_path(&self, path: DispatchPath) -> bool {
        match &self.state {
            ServiceState::Ready(connection) => connection.has_path(path),
            ServiceState::Failed(_) => false,
        }
    }

    /// Cached deployment flag
    pub fn deployed(&self) -> bool {
        self.deployed.load(Ordering::SeqCst)
    }

    pub fn set_deployed(&self, deployed: bool) {
        self.deployed.store(deployed, Ordering::SeqCst);
    }

    fn connection_ref(&self) -> Result<&Connection> {
        match &self.state {
            ServiceState::Ready(connection) => Ok(connection),
            ServiceState::Failed(reason) => Err(Error::ServiceFailed(format!(
                "{} service: {}",
                self.chain, reason
            ))),
        }
    }

    fn account(&self) -> Result<Address> {
        if !is_valid_ethereum_address(&self.address) {
            return Err(Error::NotDeployed(format!(
                "{} account has no address yet",
                self.chain
            )));
        }
        parse_address(&self.address)
    }

    pub fn signer_address(&self) -> Result<Address> {
        Ok(self.connection_ref()?.wallet.address())
    }

    /// Whether the chain reports contract code at the account address.
    ///
    /// Placeholder and malformed addresses answer `false` without touching
    /// the network.
    pub async fn is_deployed(&self) -> Result<bool> {
        let connection = self.connection_ref()?;
        if !is_valid_ethereum_address(&self.address) {
            return Ok(false);
        }
        let account = parse_address(&self.address)?;
        let code = connection.client.get_code(account).await?;
        Ok(!code.is_empty())
    }

    pub async fn refresh_deployed(&self) -> Result<bool> {
        let deployed = self.is_deployed().await?;
        self.set_deployed(deployed);
        tracing::debug!(chain = %self.chain, deployed = deployed, "Refreshed deployment status");
        Ok(deployed)
    }

    /// Formatted timestamp of a block, `-` when the node doesn't know it
    pub async fn block_time(&self, number: u64) -> Result<String> {
        eth::block_time(self.connection_ref()?.client.as_ref(), number).await
    }

    /// Address the account will have once deployed through the proxy factory
    pub async fn counterfactual_address(&self) -> Result<Address> {
        let connection = self.connection_ref()?;
        AccountDeployment::new(
            connection.wallet.address(),
            self.salt_nonce,
            self.deployment,
        )
        .predict_address(connection.client.as_ref())
        .await
    }

    async fn submit(
        &self,
        batch: Vec<MetaTransaction>,
        opts: DispatchOptions,
        force_legacy: bool,
    ) -> Result<TxOutcome> {
        let dispatcher = self.connection_ref()?.dispatcher(force_legacy)?;
        tracing::debug!(
            chain = %self.chain,
            path = ?dispatcher.path(),
            batch_len = batch.len(),
            includes_deploy = opts.includes_deploy,
            "Dispatching batch"
        );
        dispatcher.submit(&batch, &opts).await
    }

    /// Encode `method(args)` from `abi` and submit it as a one-call batch.
    ///
    /// `abi` is either a JSON ABI array or human-readable signatures, one per
    /// line. Arguments are parsed according to the resolved parameter types.
    #[allow(clippy::too_many_arguments)]
    pub async fn generic_tx(
        &self,
        contract: Address,
        abi: &str,
        method: &str,
        args: &[String],
        includes_deploy: bool,
        gas_hint: Option<u64>,
        force_legacy: bool,
    ) -> Result<TxOutcome> {
        self.connection_ref()?;
        let function = resolve_function(abi, method, args.len())?;
        let data = encode_input(&function, args)?;
        self.submit(
            vec![MetaTransaction::call(contract, data)],
            DispatchOptions {
                includes_deploy,
                gas_hint,
            },
            force_legacy,
        )
        .await
    }

    /// Submit a typed contract call as a one-call batch
    pub async fn typed_tx<C: SolCall>(
        &self,
        to: Address,
        call: &C,
        includes_deploy: bool,
    ) -> Result<TxOutcome> {
        self.submit(
            vec![MetaTransaction::from_call(to, call)],
            DispatchOptions {
                includes_deploy,
                gas_hint: None,
            },
            false,
        )
        .await
    }

    /// Plain value transfer with empty call data
    pub async fn native_tx(&self, to: Address, value: U256) -> Result<TxOutcome> {
        self.submit(
            vec![MetaTransaction::transfer(to, value)],
            DispatchOptions {
                includes_deploy: !self.deployed(),
                gas_hint: None,
            },
            false,
        )
        .await
    }

    /// Read-only call sent from the signer address
    pub async fn generic_read(
        &self,
        contract: Address,
        abi: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<DynSolValue>> {
        let from = self.signer_address()?;
        self.read(contract, Some(from), abi, method, args).await
    }

    /// Read-only call through the bare provider
    pub async fn generic_call(
        &self,
        contract: Address,
        abi: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<DynSolValue>> {
        self.read(contract, None, abi, method, args).await
    }

    async fn read(
        &self,
        contract: Address,
        from: Option<Address>,
        abi: &str,
        method: &str,
        args: &[String],
    ) -> Result<Vec<DynSolValue>> {
        let connection = self.connection_ref()?;
        let function = resolve_function(abi, method, args.len())?;
        let data = encode_input(&function, args)?;

        let mut tx = TransactionRequest::default()
            .to(contract)
            .input(data.into());
        if let Some(from) = from {
            tx = tx.from(from);
        }

        let output = connection.client.call(tx).await?;
        function
            .abi_decode_output(&output)
            .map_err(|e| Error::Abi(format!("{}: {}", function.signature(), e)))
    }

    /// Native balance of the account, in whole units
    pub async fn native_balance(&self) -> Result<String> {
        let connection = self.connection_ref()?;
        let balance = connection.client.get_balance(self.account()?).await?;
        Ok(format_units(balance, 18))
    }

    /// ERC-20 balance of the account, assuming 18 decimals
    pub async fn token_balance(&self, token: Address) -> Result<String> {
        let connection = self.connection_ref()?;
        let balance = call_contract(
            connection.client.as_ref(),
            token,
            None,
            &IERC20::balanceOfCall {
                owner: self.account()?,
            },
        )
        .await?;
        Ok(format_units(balance, 18))
    }

    pub async fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxOutcome> {
        self.typed_tx(
            token,
            &IERC20::approveCall { spender, amount },
            !self.deployed(),
        )
        .await
    }

    /// Create a trust-fund group owned by this account
    pub async fn create_trust_fund(&self, params: TrustFundParams) -> Result<TxOutcome> {
        self.connection_ref()?;
        let call = ITrustFundFactory::createTrustFundCall {
            owner: self.account()?,
            service: self.trust_fund.service,
            feeCollection: self.trust_fund.fee_collection,
            customMintPolicy: self.trust_fund.mint_policy,
            initialConditions: params.initial_conditions,
            name: params.name,
            symbol: params.symbol,
            metadataDigest: params.metadata_digest,
        };
        tracing::info!(
            chain = %self.chain,
            factory = %self.trust_fund.factory,
            name = %call.name,
            "Creating trust fund"
        );
        self.typed_tx(self.trust_fund.factory, &call, false).await
    }
}

/// Current address and deployed flag of an account, as the chain reports
/// them. Only the placeholder ever resolves to a different address.
async fn observe_account(
    client: &dyn ChainClient,
    owner: Address,
    address: &str,
    env: &ServiceEnv,
) -> Result<(String, bool)> {
    if is_valid_ethereum_address(address) {
        let code = client.get_code(parse_address(address)?).await?;
        return Ok((address.to_string(), !code.is_empty()));
    }
    if address != ADDRESS_PLACEHOLDER {
        return Ok((address.to_string(), false));
    }

    let predicted = AccountDeployment::new(owner, env.salt_nonce, env.deployment)
        .predict_address(client)
        .await?;
    if client.get_code(predicted).await?.is_empty() {
        return Ok((address.to_string(), false));
    }
    Ok((predicted.to_checksum(None), true))
}

/// Find `method` in a JSON or human-readable ABI.
///
/// `method` may be a bare name or a full signature such as
/// `transfer(address,uint256)`; overloads are told apart by arity.
pub fn resolve_function(abi: &str, method: &str, arity: usize) -> Result<Function> {
    let candidates: Vec<Function> = if abi.trim_start().starts_with('[') {
        let parsed: JsonAbi = serde_json::from_str(abi)
            .map_err(|e| Error::Abi(format!("Invalid JSON ABI: {}", e)))?;
        parsed.functions().cloned().collect()
    } else {
        abi.split(['\n', ';'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| {
                !line.starts_with("event ")
                    && !line.starts_with("error ")
                    && !line.starts_with("constructor")
            })
            .map(|line| {
                Function::parse(line)
                    .map_err(|e| Error::Abi(format!("Invalid signature {:?}: {}", line, e)))
            })
            .collect::<Result<_>>()?
    };

    candidates
        .into_iter()
        .filter(|f| f.name == method || f.signature() == method)
        .find(|f| f.inputs.len() == arity)
        .ok_or_else(|| {
            Error::Abi(format!(
                "No function {} taking {} argument(s) in ABI",
                method, arity
            ))
        })
}

fn encode_input(function: &Function, args: &[String]) -> Result<Bytes> {
    let values = function
        .inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty = param
                .resolve()
                .map_err(|e| Error::Abi(format!("{}: {}", param.ty, e)))?;
            ty.coerce_str(arg).map_err(|e| {
                Error::InvalidArgument(format!("{} for {} {}: {}", arg, param.ty, param.name, e))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    function
        .abi_encode_input(&values)
        .map(Bytes::from)
        .map_err(|e| Error::Abi(format!("{}: {}", function.signature(), e)))
}

/// Render a decoded ABI value for display
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::Address(a) => a.to_checksum(None),
        DynSolValue::FixedBytes(word, size) => hex::encode_prefixed(&word[..*size]),
        DynSolValue::Bytes(bytes) => hex::encode_prefixed(bytes),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => format!(
            "[{}]",
            items.iter().map(format_value).collect::<Vec<_>>().join(", ")
        ),
        DynSolValue::Tuple(items) => format!(
            "({})",
            items.iter().map(format_value).collect::<Vec<_>>().join(", ")
        ),
        other => format!("{:?}", other),
    }
}
