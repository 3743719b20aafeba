//! ERC-4337 bundler / paymaster JSON-RPC client
//!
//! Speaks the v0.6 user operation methods:
//! - `eth_estimateUserOperationGas`
//! - `pm_sponsorUserOperation`
//! - `eth_sendUserOperation`

use crate::safe::contracts::UserOperation;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// User operation in its JSON-RPC form (hex quantities, camelCase keys)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationRpc {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl From<&UserOperationRpc> for UserOperation {
    fn from(op: &UserOperationRpc) -> Self {
        UserOperation {
            sender: op.sender,
            nonce: op.nonce,
            initCode: op.init_code.clone(),
            callData: op.call_data.clone(),
            callGasLimit: op.call_gas_limit,
            verificationGasLimit: op.verification_gas_limit,
            preVerificationGas: op.pre_verification_gas,
            maxFeePerGas: op.max_fee_per_gas,
            maxPriorityFeePerGas: op.max_priority_fee_per_gas,
            paymasterAndData: op.paymaster_and_data.clone(),
            signature: op.signature.clone(),
        }
    }
}

/// Gas limits returned by `eth_estimateUserOperationGas`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasEstimate {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
}

/// Paymaster data and the gas limits it signed over
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sponsorship {
    pub paymaster_and_data: Bytes,
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
}

#[async_trait]
pub trait BundlerApi: Send + Sync {
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperationRpc,
        entry_point: Address,
    ) -> Result<GasEstimate>;

    async fn sponsor_user_operation(
        &self,
        op: &UserOperationRpc,
        entry_point: Address,
    ) -> Result<Sponsorship>;

    /// Returns the user operation hash
    async fn send_user_operation(&self, op: &UserOperationRpc, entry_point: Address)
        -> Result<B256>;
}

/// HTTP JSON-RPC bundler client
pub struct BundlerClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl BundlerClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(method = method, id = id, "Bundler request");

        let response: Value = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        parse_response(method, response)
    }
}

/// Unwrap a JSON-RPC response envelope
fn parse_response<T: DeserializeOwned>(method: &str, response: Value) -> Result<T> {
    if let Some(error) = response.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
        return Err(Error::Bundler(format!("{} failed ({}): {}", method, code, message)));
    }

    let result = response
        .get("result")
        .cloned()
        .ok_or_else(|| Error::Bundler(format!("{} returned no result", method)))?;

    serde_json::from_value(result)
        .map_err(|e| Error::Bundler(format!("{} returned unexpected result: {}", method, e)))
}

#[async_trait]
impl BundlerApi for BundlerClient {
    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperationRpc,
        entry_point: Address,
    ) -> Result<GasEstimate> {
        self.request("eth_estimateUserOperationGas", json!([op, entry_point]))
            .await
    }

    async fn sponsor_user_operation(
        &self,
        op: &UserOperationRpc,
        entry_point: Address,
    ) -> Result<Sponsorship> {
        self.request("pm_sponsorUserOperation", json!([op, entry_point]))
            .await
    }

    async fn send_user_operation(
        &self,
        op: &UserOperationRpc,
        entry_point: Address,
    ) -> Result<B256> {
        self.request("eth_sendUserOperation", json!([op, entry_point]))
            .await
    }
}
