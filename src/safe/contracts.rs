//! Typed contract interfaces
//!
//! One interface per contract kind the wallet talks to. Calls are encoded
//! with the generated `*Call` types instead of looking methods up by name.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    #[derive(Debug)]
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address owner) external view returns (uint256);
    }

    #[derive(Debug)]
    interface ITrustFundFactory {
        function createTrustFund(
            address owner,
            address service,
            address feeCollection,
            address customMintPolicy,
            address[] initialConditions,
            string name,
            string symbol,
            bytes32 metadataDigest
        ) external returns (address group, address mintHandler, address treasury);
    }

    #[derive(Debug)]
    interface ISafe {
        function nonce() external view returns (uint256);

        function getTransactionHash(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            uint256 txNonce
        ) external view returns (bytes32);

        function execTransaction(
            address to,
            uint256 value,
            bytes data,
            uint8 operation,
            uint256 safeTxGas,
            uint256 baseGas,
            uint256 gasPrice,
            address gasToken,
            address refundReceiver,
            bytes signatures
        ) external payable returns (bool success);

        function setup(
            address[] owners,
            uint256 threshold,
            address to,
            bytes data,
            address fallbackHandler,
            address paymentToken,
            uint256 payment,
            address paymentReceiver
        ) external;
    }

    #[derive(Debug)]
    interface IMultiSend {
        function multiSend(bytes transactions) external payable;
    }

    #[derive(Debug)]
    interface ISafeModuleSetup {
        function enableModules(address[] modules) external;
    }

    #[derive(Debug)]
    interface ISafeProxyFactory {
        function createProxyWithNonce(address singleton, bytes initializer, uint256 saltNonce) external returns (address proxy);
        function proxyCreationCode() external pure returns (bytes);
    }

    /// ERC-4337 v0.6 user operation
    #[derive(Debug, Default, PartialEq, Eq)]
    struct UserOperation {
        address sender;
        uint256 nonce;
        bytes initCode;
        bytes callData;
        uint256 callGasLimit;
        uint256 verificationGasLimit;
        uint256 preVerificationGas;
        uint256 maxFeePerGas;
        uint256 maxPriorityFeePerGas;
        bytes paymasterAndData;
        bytes signature;
    }

    #[derive(Debug)]
    interface ISafe4337Module {
        function executeUserOp(address to, uint256 value, bytes data, uint8 operation) external;
        function getOperationHash(UserOperation userOp) external view returns (bytes32);
    }

    #[derive(Debug)]
    interface IEntryPoint {
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }
}

/// How a Safe executes a meta transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Operation {
    #[default]
    Call = 0,
    DelegateCall = 1,
}

/// One call the account should make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
}

impl MetaTransaction {
    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
            operation: Operation::Call,
        }
    }

    /// Plain value transfer with empty call data
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: Bytes::new(),
            operation: Operation::Call,
        }
    }

    pub fn from_call<C: SolCall>(to: Address, call: &C) -> Self {
        Self::call(to, call.abi_encode())
    }
}

/// Pack a batch for `multiSend(bytes)`: per entry
/// `operation(1) ‖ to(20) ‖ value(32) ‖ data length(32) ‖ data`.
pub fn encode_multi_send(batch: &[MetaTransaction]) -> Bytes {
    let mut packed = Vec::new();
    for tx in batch {
        packed.push(tx.operation as u8);
        packed.extend_from_slice(tx.to.as_slice());
        packed.extend_from_slice(&tx.value.to_be_bytes::<32>());
        packed.extend_from_slice(&U256::from(tx.data.len()).to_be_bytes::<32>());
        packed.extend_from_slice(&tx.data);
    }
    Bytes::from(packed)
}

/// Collapse a batch into the single call the account executes.
///
/// One entry is executed as is; several are routed through MultiSend with a
/// delegate call.
pub fn collapse_batch(batch: &[MetaTransaction], multi_send: Address) -> Option<MetaTransaction> {
    match batch {
        [] => None,
        [single] => Some(single.clone()),
        many => Some(MetaTransaction {
            to: multi_send,
            value: U256::ZERO,
            data: IMultiSend::multiSendCall {
                transactions: encode_multi_send(many),
            }
            .abi_encode()
            .into(),
            operation: Operation::DelegateCall,
        }),
    }
}

/// Parameters for a new trust-fund group
#[derive(Debug, Clone)]
pub struct TrustFundParams {
    pub name: String,
    pub symbol: String,
    pub initial_conditions: Vec<Address>,
    pub metadata_digest: alloy::primitives::B256,
}
