//! Safe smart accounts
//!
//! - [`address`]: chain-prefixed account addresses
//! - [`store`]: the persisted, ordered account list
//! - [`contracts`]: typed interfaces of every contract the wallet calls
//! - [`service`]: one live service per chain wrapping an account

pub mod address;
pub mod contracts;
pub mod service;
pub mod store;

pub use address::{format_safe_address, normalize_legacy_addresses, parse_safe_address, SafeAddress};
pub use service::{format_value, Connection, SafeService, ServiceEnv, ServiceState};
pub use store::SafeAddressStore;
