//! Safe Wallet CLI
//!
//! Command-line front end for the wallet core: bootstrap or restore the
//! accounts, inspect them and send transactions through them.

use alloy::primitives::{B256, U256};
use clap::{Parser, Subcommand};
use safe_wallet_core::dispatch::DispatchPath;
use safe_wallet_core::eth::{format_units, parse_address};
use safe_wallet_core::explorer::ExplorerClient;
use safe_wallet_core::safe::contracts::TrustFundParams;
use safe_wallet_core::safe::format_value;
use safe_wallet_core::storage::FileStorage;
use safe_wallet_core::{
    AppConfig, AppFactory, AppPhase, Chain, Error, Result, SafeService, TxOutcome,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "safe-wallet")]
#[command(about = "Safe smart-account wallet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore stored accounts, or create a key and a first account
    Init,

    /// Show accounts, signer and deployment status
    Status,

    /// Show the native or ERC-20 balance of an account
    Balance {
        /// Chain (gnosis, gno, crc)
        #[arg(short = 'n', long, default_value = "gnosis")]
        chain: String,

        /// ERC-20 token address; native balance when omitted
        #[arg(long)]
        token: Option<String>,
    },

    /// Send native currency from an account
    SendNative {
        #[arg(short = 'n', long, default_value = "gnosis")]
        chain: String,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Amount in wei
        #[arg(long)]
        value: String,
    },

    /// Approve an ERC-20 allowance from an account
    Approve {
        #[arg(short = 'n', long, default_value = "gnosis")]
        chain: String,

        /// ERC-20 token address
        #[arg(long)]
        token: String,

        #[arg(long)]
        spender: String,

        /// Allowance in the token's smallest unit
        #[arg(long)]
        amount: String,
    },

    /// Create a trust-fund group owned by an account
    TrustFund {
        #[arg(short = 'n', long, default_value = "gnosis")]
        chain: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        symbol: String,

        /// Initial membership condition contracts
        #[arg(long = "condition")]
        conditions: Vec<String>,

        /// 32-byte metadata digest, hex
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Read-only contract call
    Call {
        #[arg(short = 'n', long, default_value = "gnosis")]
        chain: String,

        /// Contract address
        #[arg(long)]
        contract: String,

        /// ABI: JSON array, human-readable signatures, or @path to a file
        #[arg(long)]
        abi: String,

        /// Method name or full signature
        #[arg(short, long)]
        method: String,

        /// Call arguments, in order
        args: Vec<String>,

        /// Send the call from the signer address
        #[arg(long)]
        as_signer: bool,
    },

    /// Contract write through the account
    Tx {
        #[arg(short = 'n', long, default_value = "gnosis")]
        chain: String,

        #[arg(long)]
        contract: String,

        /// ABI: JSON array, human-readable signatures, or @path to a file
        #[arg(long)]
        abi: String,

        #[arg(short, long)]
        method: String,

        args: Vec<String>,

        /// Deploy the account in the same user operation
        #[arg(long)]
        deploy: bool,

        /// Minimum call gas limit
        #[arg(long)]
        gas: Option<u64>,

        /// Use execTransaction even when a bundler is configured
        #[arg(long)]
        legacy: bool,
    },

    /// List the internal transactions of a transaction hash
    InternalTxs {
        /// Transaction hash
        hash: String,
    },

    /// Show current configuration
    Config,

    /// Erase the key and all stored accounts
    Clear {
        /// Confirm erasing the key
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    let config = match cli.config {
        Some(path) => AppConfig::from_file(&path)?,
        None => AppConfig::default(),
    };

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let storage = Arc::new(FileStorage::open(config.storage_path.clone()).await?);
    let app = AppFactory::new(&config, storage);

    match cli.command {
        Commands::Init => run_init(&app).await?,
        Commands::Status => run_status(&app).await?,
        Commands::Balance { chain, token } => {
            let service = service_for(&app, &chain).await?;
            let balance = match token {
                Some(token) => service.token_balance(parse_address(&token)?).await?,
                None => service.native_balance().await?,
            };
            println!("{}", balance);
        }
        Commands::SendNative { chain, to, value } => {
            let service = service_for(&app, &chain).await?;
            let value = parse_wei(&value)?;
            tracing::info!(to = %to, value = %format_units(value, 18), "Sending native transfer");
            let outcome = service.native_tx(parse_address(&to)?, value).await?;
            print_outcome(&outcome);
        }
        Commands::Approve {
            chain,
            token,
            spender,
            amount,
        } => {
            let service = service_for(&app, &chain).await?;
            let outcome = service
                .approve(
                    parse_address(&token)?,
                    parse_address(&spender)?,
                    parse_wei(&amount)?,
                )
                .await?;
            print_outcome(&outcome);
        }
        Commands::TrustFund {
            chain,
            name,
            symbol,
            conditions,
            metadata,
        } => {
            let service = service_for(&app, &chain).await?;
            let params = TrustFundParams {
                name,
                symbol,
                initial_conditions: conditions
                    .iter()
                    .map(|c| parse_address(c))
                    .collect::<Result<_>>()?,
                metadata_digest: match metadata {
                    Some(digest) => parse_hash(&digest)?,
                    None => B256::ZERO,
                },
            };
            let outcome = service.create_trust_fund(params).await?;
            print_outcome(&outcome);
        }
        Commands::Call {
            chain,
            contract,
            abi,
            method,
            args,
            as_signer,
        } => {
            let service = service_for(&app, &chain).await?;
            let abi = load_abi(&abi)?;
            let contract = parse_address(&contract)?;
            let values = if as_signer {
                service.generic_read(contract, &abi, &method, &args).await?
            } else {
                service.generic_call(contract, &abi, &method, &args).await?
            };
            for value in &values {
                println!("{}", format_value(value));
            }
        }
        Commands::Tx {
            chain,
            contract,
            abi,
            method,
            args,
            deploy,
            gas,
            legacy,
        } => {
            let service = service_for(&app, &chain).await?;
            let abi = load_abi(&abi)?;
            let outcome = service
                .generic_tx(
                    parse_address(&contract)?,
                    &abi,
                    &method,
                    &args,
                    deploy,
                    gas,
                    legacy,
                )
                .await?;
            print_outcome(&outcome);
        }
        Commands::InternalTxs { hash } => run_internal_txs(&app, &config, &hash).await?,
        Commands::Clear { yes } => {
            if !yes {
                return Err(Error::InvalidArgument(
                    "refusing to erase the signing key without --yes".to_string(),
                ));
            }
            app.clear_app().await?;
            println!("Cleared {}", config.storage_path.display());
        }
        Commands::Config => {}
    }

    Ok(())
}

async fn run_init(app: &AppFactory) -> Result<()> {
    let mut snapshot = app.init_app().await?;
    if snapshot.phase == AppPhase::NoKey {
        tracing::info!("No stored key, bootstrapping a new account");
        snapshot = app.init_app_from_zero().await?;
    }

    for address in &snapshot.addresses {
        println!("{}", address);
    }
    Ok(())
}

async fn run_status(app: &AppFactory) -> Result<()> {
    let snapshot = app.init_app().await?;
    if snapshot.phase == AppPhase::NoKey {
        println!("No signing key. Run `safe-wallet init` first.");
        return Ok(());
    }

    for (chain, service) in &snapshot.services {
        println!("{} ({})", chain, service.safe_address());
        if !service.is_ready() {
            println!("  state:    {:?}", service.state());
            continue;
        }

        println!("  signer:   {}", service.signer_address()?);
        println!("  deployed: {}", service.deployed());
        if !service.deployed() {
            match service.counterfactual_address().await {
                Ok(address) => println!("  predicted address: {}", address),
                Err(e) => tracing::debug!(error = %e, "Could not predict account address"),
            }
        }
        println!(
            "  paths:    erc4337={} legacy={}",
            service.has_path(DispatchPath::Erc4337),
            service.has_path(DispatchPath::Legacy)
        );
    }
    Ok(())
}

async fn run_internal_txs(app: &AppFactory, config: &AppConfig, hash: &str) -> Result<()> {
    let hash = parse_hash(hash)?;
    let explorer = ExplorerClient::new(&config.explorer);
    let txs = explorer.internal_transactions(hash).await?;

    if txs.is_empty() {
        println!("No internal transactions");
        return Ok(());
    }

    let service = app
        .init_app()
        .await?
        .service(Chain::Gnosis)
        .filter(|s| s.is_ready());

    for tx in &txs {
        let when = match (&service, tx.block_number.parse::<u64>()) {
            (Some(service), Ok(block)) => service.block_time(block).await?,
            _ => "-".to_string(),
        };
        let value = tx.value_wei().map(|v| format_units(v, 18))?;
        println!(
            "{}  {} -> {}  {}{}",
            when,
            tx.from,
            tx.to,
            value,
            if tx.failed() { "  (failed)" } else { "" }
        );
    }
    Ok(())
}

async fn service_for(app: &AppFactory, chain: &str) -> Result<Arc<SafeService>> {
    let chain = Chain::from_alias(chain)?;
    app.init_app().await?;
    app.find_service(chain)
        .await
        .ok_or_else(|| Error::InvalidArgument(format!("No account on {}; run `init` first", chain)))
}

fn load_abi(abi: &str) -> Result<String> {
    match abi.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(abi.to_string()),
    }
}

fn parse_hash(value: &str) -> Result<B256> {
    B256::from_str(value)
        .map_err(|e| Error::InvalidArgument(format!("Invalid 32-byte hash {}: {}", value, e)))
}

fn parse_wei(value: &str) -> Result<U256> {
    U256::from_str(value)
        .map_err(|e| Error::InvalidArgument(format!("Invalid amount {}: {}", value, e)))
}

fn print_outcome(outcome: &TxOutcome) {
    match outcome.path() {
        DispatchPath::Erc4337 => println!("User operation: {}", outcome.hash()),
        DispatchPath::Legacy => {
            println!("Transaction sent (not confirmed): {}", outcome.hash())
        }
    }
}
