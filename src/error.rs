//! Error types for the Safe wallet core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Bundler error: {0}")]
    Bundler(String),

    #[error("Explorer error: {0}")]
    Explorer(String),

    #[error("Safe service unavailable: {0}")]
    ServiceFailed(String),

    #[error("Account not deployed: {0}")]
    NotDeployed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
