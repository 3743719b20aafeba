//! Block explorer API client
//!
//! Etherscan-compatible `module=account&action=txlistinternal` lookups, used
//! to see the value transfers a Safe execution produced.

use crate::config::ExplorerConfig;
use crate::{Error, Result};
use alloy::primitives::{B256, U256};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// One internal call as reported by the explorer. All numeric fields are
/// decimal strings on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalTransaction {
    #[serde(default)]
    pub block_number: String,
    #[serde(default)]
    pub time_stamp: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default, rename = "type")]
    pub call_type: String,
    #[serde(default)]
    pub gas: String,
    #[serde(default)]
    pub gas_used: String,
    #[serde(default)]
    pub is_error: String,
}

impl InternalTransaction {
    pub fn value_wei(&self) -> Result<U256> {
        U256::from_str(&self.value)
            .map_err(|e| Error::Explorer(format!("Bad value {:?}: {}", self.value, e)))
    }

    pub fn failed(&self) -> bool {
        self.is_error == "1"
    }
}

pub struct ExplorerClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl ExplorerClient {
    pub fn new(config: &ExplorerConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub async fn internal_transactions(&self, tx_hash: B256) -> Result<Vec<InternalTransaction>> {
        let tx_hash = tx_hash.to_string();
        let mut query = vec![
            ("module", "account"),
            ("action", "txlistinternal"),
            ("txhash", tx_hash.as_str()),
        ];
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        } else {
            tracing::warn!("No explorer API key configured, requests may be rate limited");
        }

        tracing::debug!(tx_hash = %tx_hash, "Fetching internal transactions");

        let response: Value = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_internal_transactions(response)
    }
}

/// Unwrap the `{status, message, result}` envelope.
///
/// `status = "0"` with an array result means nothing was found; with a
/// string result it is an API error.
fn parse_internal_transactions(response: Value) -> Result<Vec<InternalTransaction>> {
    let status = response.get("status").and_then(Value::as_str).unwrap_or("0");
    let result = response.get("result").cloned().unwrap_or(Value::Null);

    match result {
        Value::Array(_) => Ok(serde_json::from_value(result)?),
        Value::String(reason) if status != "1" => {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("NOTOK");
            Err(Error::Explorer(format!("{}: {}", message, reason)))
        }
        other => Err(Error::Explorer(format!("Unexpected result: {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_internal_transactions() {
        let response = json!({
            "status": "1",
            "message": "OK",
            "result": [{
                "blockNumber": "35150000",
                "timeStamp": "1722000000",
                "from": "0x169874fa8a472fb54ae31d500d57c0c7d5143815",
                "to": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
                "value": "1500000000000000000",
                "contractAddress": "",
                "input": "",
                "type": "call",
                "gas": "2300",
                "gasUsed": "0",
                "isError": "0",
                "errCode": ""
            }]
        });

        let txs = parse_internal_transactions(response).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].call_type, "call");
        assert_eq!(
            txs[0].value_wei().unwrap(),
            U256::from(1_500_000_000_000_000_000u128)
        );
        assert!(!txs[0].failed());
    }

    #[test]
    fn test_nothing_found_is_empty() {
        let response = json!({
            "status": "0",
            "message": "No transactions found",
            "result": []
        });
        assert!(parse_internal_transactions(response).unwrap().is_empty());
    }

    #[test]
    fn test_api_error() {
        let response = json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Invalid API Key"
        });
        match parse_internal_transactions(response) {
            Err(Error::Explorer(msg)) => assert!(msg.contains("Invalid API Key")),
            other => panic!("expected explorer error, got {:?}", other),
        }
    }
}
