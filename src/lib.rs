//! Safe Wallet Core
//!
//! Client-side core of a Safe smart-account wallet:
//! - A locally generated owner key, persisted once per store
//! - A chain-prefixed list of the user's Safe accounts (`gno:0x…`)
//! - One service per chain that reads from and writes through the account
//! - Two ways out for writes: a direct `execTransaction` signed by the
//!   owner, or an ERC-4337 user operation sent to a bundler
//!
//! # Security Model
//!
//! - The private key never leaves the [`wallet`] module and is never logged
//! - Accounts are single-owner, threshold-one Safes
//! - A service whose chain endpoint failed refuses every operation instead of
//!   half-working

pub mod app;
pub mod chain;
pub mod config;
pub mod dispatch;
pub mod eth;
pub mod explorer;
pub mod safe;
pub mod storage;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use app::{AppFactory, AppPhase, AppSnapshot};
pub use config::{AppConfig, Chain, RpcConfig, EXPLORER_API_KEY_ENV};
pub use dispatch::{DispatchPath, TxOutcome};
pub use error::{Error, Result};
pub use safe::{SafeAddress, SafeService, ServiceState};
