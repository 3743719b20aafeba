//! Transaction dispatch
//!
//! A batch of [`MetaTransaction`]s leaves the wallet through one of two paths:
//! - [`LegacyDispatcher`]: the owner key signs a Safe `execTransaction` and
//!   broadcasts it from its own EOA. Only works for deployed accounts.
//! - [`Erc4337Dispatcher`]: the batch is wrapped in a user operation and sent
//!   to a bundler, optionally sponsored by a paymaster and optionally
//!   deploying the account in the same operation.
//!
//! Neither path retries or waits for inclusion.

pub mod bundler;
mod deploy;
mod erc4337;
mod legacy;

use crate::safe::contracts::MetaTransaction;
use crate::Result;
use alloy::primitives::B256;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

pub use bundler::{BundlerApi, BundlerClient, UserOperationRpc};
pub use deploy::AccountDeployment;
pub use erc4337::Erc4337Dispatcher;
pub use legacy::LegacyDispatcher;

/// Which dispatch path handled a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPath {
    Legacy,
    Erc4337,
}

/// Per-submission options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Deploy the account as part of this submission
    pub includes_deploy: bool,
    /// Lower bound for the call gas limit
    pub gas_hint: Option<u64>,
}

/// Result of handing a batch to a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxOutcome {
    /// Accepted by the bundler under this user operation hash
    UserOperation { hash: B256 },
    /// Broadcast directly. Inclusion and success are NOT known.
    Unconfirmed { tx_hash: B256 },
}

impl TxOutcome {
    pub fn path(&self) -> DispatchPath {
        match self {
            TxOutcome::UserOperation { .. } => DispatchPath::Erc4337,
            TxOutcome::Unconfirmed { .. } => DispatchPath::Legacy,
        }
    }

    pub fn hash(&self) -> B256 {
        match self {
            TxOutcome::UserOperation { hash } => *hash,
            TxOutcome::Unconfirmed { tx_hash } => *tx_hash,
        }
    }
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxOutcome::UserOperation { hash } => write!(f, "user operation {}", hash),
            TxOutcome::Unconfirmed { tx_hash } => write!(f, "unconfirmed transaction {}", tx_hash),
        }
    }
}

#[async_trait]
pub trait TransactionDispatcher: Send + Sync {
    fn path(&self) -> DispatchPath;

    async fn submit(&self, batch: &[MetaTransaction], opts: &DispatchOptions)
        -> Result<TxOutcome>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_reports_path() {
        let hash = B256::repeat_byte(1);
        assert_eq!(
            TxOutcome::UserOperation { hash }.path(),
            DispatchPath::Erc4337
        );
        assert_eq!(
            TxOutcome::Unconfirmed { tx_hash: hash }.path(),
            DispatchPath::Legacy
        );
    }

    #[test]
    fn test_outcome_serializes_kind() {
        let value = serde_json::to_value(TxOutcome::Unconfirmed {
            tx_hash: B256::ZERO,
        })
        .unwrap();
        assert_eq!(value["kind"], "unconfirmed");
    }
}
