//! Escrow CLI
//!
//! Command line front end for the escrow client:
//! - `make`: open an escrow from the configured wallet
//! - `take`: accept an open escrow
//! - `refund`: close an escrow you made and recover the deposit
//! - `list` / `show`: inspect open escrows
//! - `derive`: print derived addresses without touching the network
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin escrow -- --config config/escrow.toml make \
//!     --seed 42 --mint-a <MINT_A> --mint-b <MINT_B> --deposit 1000 --receive 500
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! ESCROW_CONFIG_PATH=config/escrow.toml cargo run --bin escrow -- list
//! ```
//!
//! Ctrl-C while a transaction is in flight cancels it.

use anyhow::Result;
use clap::{Parser, Subcommand};
use escrow_client::{
    derive_escrow_address, derive_token_address, derive_vault_address, load_keypair_from_env,
    parse_amount, parse_pubkey, parse_seed, CancellationToken, EscrowClient, EscrowClientConfig,
    EscrowContext, ExecutionOutcome, MakeParams, TransactionState, TransactionStatus,
    DEFAULT_ESCROW_PROGRAM_ID,
};
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "escrow")]
#[command(about = "Token escrow client - make, take and refund escrows")]
struct Args {
    /// Path to configuration file (default: config/escrow.toml or ESCROW_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deposit mint A tokens into a new escrow
    Make {
        #[arg(long)]
        seed: String,
        #[arg(long)]
        mint_a: String,
        #[arg(long)]
        mint_b: String,
        /// Amount of mint A to deposit (base units)
        #[arg(long)]
        deposit: String,
        /// Amount of mint B to receive (base units)
        #[arg(long)]
        receive: String,
    },
    /// Pay the requested mint B amount and receive the vault
    Take {
        #[arg(long)]
        escrow: String,
    },
    /// Close an escrow you made and recover the deposit
    Refund {
        #[arg(long)]
        escrow: String,
    },
    /// List all open escrows with their vault balances
    List,
    /// Show one escrow record
    Show {
        #[arg(long)]
        escrow: String,
    },
    /// Print derived escrow, vault and token addresses
    Derive {
        #[arg(long)]
        maker: String,
        #[arg(long)]
        seed: String,
        #[arg(long)]
        mint_a: String,
        #[arg(long)]
        mint_b: Option<String>,
        /// Escrow program id (default: devnet deployment)
        #[arg(long)]
        program_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let config_path = args.config.as_deref();
    match args.command {
        Command::Make {
            seed,
            mint_a,
            mint_b,
            deposit,
            receive,
        } => {
            let params = MakeParams {
                seed: parse_seed(&seed)?,
                mint_a: parse_pubkey(&mint_a)?,
                mint_b: parse_pubkey(&mint_b)?,
                deposit_amount: parse_amount(&deposit)?,
                receive_amount: parse_amount(&receive)?,
            };
            let client = connect(config_path, true)?;
            let c = Arc::clone(&client);
            run_transaction(&client, async move { c.make(&params).await }).await
        }
        Command::Take { escrow } => {
            let escrow = parse_pubkey(&escrow)?;
            let client = connect(config_path, true)?;
            let c = Arc::clone(&client);
            run_transaction(&client, async move { c.take(&escrow).await }).await
        }
        Command::Refund { escrow } => {
            let escrow = parse_pubkey(&escrow)?;
            let client = connect(config_path, true)?;
            let c = Arc::clone(&client);
            run_transaction(&client, async move { c.refund(&escrow).await }).await
        }
        Command::List => {
            let client = connect(config_path, false)?;
            let listings = client.list_escrows().await?;
            if listings.is_empty() {
                println!("No open escrows");
            }
            for listing in listings {
                println!(
                    "{}  seed={} maker={} deposit={} of {} receive={} of {}",
                    listing.address,
                    listing.record.seed,
                    listing.record.maker,
                    listing.vault_balance,
                    listing.record.mint_a,
                    listing.record.receive,
                    listing.record.mint_b
                );
            }
            Ok(())
        }
        Command::Show { escrow } => {
            let escrow = parse_pubkey(&escrow)?;
            let client = connect(config_path, false)?;
            let record = client.fetch_escrow(&escrow).await?;
            println!("escrow:  {}", escrow);
            println!("seed:    {}", record.seed);
            println!("maker:   {}", record.maker);
            println!("mint_a:  {}", record.mint_a);
            println!("mint_b:  {}", record.mint_b);
            println!("receive: {}", record.receive);
            println!("bump:    {}", record.bump);
            Ok(())
        }
        Command::Derive {
            maker,
            seed,
            mint_a,
            mint_b,
            program_id,
        } => print_derived(&maker, &seed, &mint_a, mint_b.as_deref(), program_id.as_deref()),
    }
}

/// Loads configuration and builds a client. Read-only clients get a throwaway payer.
fn connect(config_path: Option<&str>, signing: bool) -> Result<Arc<EscrowClient>> {
    let config = EscrowClientConfig::load_from_path(config_path)?;
    info!(
        "Using {} at {} (program {})",
        config.ledger.name, config.ledger.rpc_url, config.ledger.program_id
    );

    let payer = if signing {
        load_keypair_from_env(&config.wallet.private_key_env)?
    } else {
        Keypair::new()
    };
    let ctx = EscrowContext::from_config(&config, payer)?;
    Ok(Arc::new(EscrowClient::new(ctx, config.executor_config()?)))
}

fn log_state(state: &TransactionState) {
    match state.status {
        TransactionStatus::Pending | TransactionStatus::Confirming => {
            if let Some(progress) = state.progress {
                info!(
                    "{:?} (attempt {}/{})",
                    state.status, progress.current_attempt, progress.max_attempts
                );
            }
        }
        TransactionStatus::Success => {
            if let Some(signature) = state.signature {
                info!("Success: {}", signature);
            }
        }
        TransactionStatus::Error => {
            error!("Error: {}", state.error.as_deref().unwrap_or_default());
        }
        TransactionStatus::Idle => info!("Idle"),
    }
}

/// Logs every state transition until `done` fires, then logs any transition not yet seen.
///
/// Resolves to the last status logged.
fn spawn_state_watcher(
    mut state_rx: watch::Receiver<TransactionState>,
    done: CancellationToken,
) -> JoinHandle<Option<TransactionStatus>> {
    tokio::spawn(async move {
        let mut last = None;
        loop {
            tokio::select! {
                biased;
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = state_rx.borrow_and_update().clone();
                    log_state(&state);
                    last = Some(state.status);
                }
                _ = done.cancelled() => {
                    if state_rx.has_changed().unwrap_or(false) {
                        let state = state_rx.borrow_and_update().clone();
                        log_state(&state);
                        last = Some(state.status);
                    }
                    break;
                }
            }
        }
        last
    })
}

/// Drives one transaction while logging state changes and honoring Ctrl-C.
async fn run_transaction<F>(client: &Arc<EscrowClient>, operation: F) -> Result<()>
where
    F: std::future::Future<Output = Result<ExecutionOutcome, escrow_client::EscrowError>>,
{
    let done = CancellationToken::new();
    let watcher = spawn_state_watcher(client.subscribe(), done.clone());

    let canceller = {
        let client = Arc::clone(client);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Ctrl-C received, cancelling transaction");
                client.cancel();
            }
        })
    };

    let result = operation.await;
    canceller.abort();
    done.cancel();
    if let Err(e) = watcher.await {
        warn!("State watcher ended abnormally: {}", e);
    }

    match result {
        Ok(ExecutionOutcome::Confirmed(signature)) => {
            println!("{}", signature);
            Ok(())
        }
        Ok(ExecutionOutcome::Cancelled) => {
            println!("Cancelled");
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Transaction failed: {}", e.user_message())),
    }
}

fn print_derived(
    maker: &str,
    seed: &str,
    mint_a: &str,
    mint_b: Option<&str>,
    program_id: Option<&str>,
) -> Result<()> {
    let maker = parse_pubkey(maker)?;
    let seed = parse_seed(seed)?;
    let mint_a = parse_pubkey(mint_a)?;
    let program_id = parse_pubkey(program_id.unwrap_or(DEFAULT_ESCROW_PROGRAM_ID))?;

    let (escrow, bump) = derive_escrow_address(&maker, seed, &program_id);
    println!("escrow:      {} (bump {})", escrow, bump);
    println!("vault:       {}", derive_vault_address(&escrow, &mint_a));
    println!("maker_ata_a: {}", derive_token_address(&mint_a, &maker));
    if let Some(mint_b) = mint_b {
        let mint_b = parse_pubkey(mint_b)?;
        println!("maker_ata_b: {}", derive_token_address(&mint_b, &maker));
    }
    Ok(())
}
