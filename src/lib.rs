//! Escrow client library
//!
//! Derives escrow addresses, validates inputs and balances, builds make/take/refund
//! instructions, and executes them with timeout, retry, and cancellation.

pub mod config;
pub mod derive;
pub mod error;
pub mod escrow;
pub mod executor;
pub mod ledger;
pub mod state;
pub mod validation;
pub mod wallet;

// Re-export public types for convenience
pub use config::{EscrowClientConfig, LedgerConfig, TransactionConfig, WalletConfig};
pub use derive::{
    derive_escrow_address, derive_token_address, derive_vault_address, parse_pubkey,
    DEFAULT_ESCROW_PROGRAM_ID,
};
pub use error::{EscrowError, LedgerError};
pub use escrow::{
    EscrowClient, EscrowContext, EscrowListing, MakeAccounts, MakeParams, PreparedOperation,
    RefundAccounts, TakeAccounts,
};
pub use executor::{
    CancellationToken, ExecutionOutcome, ExecutorConfig, Progress, TransactionExecutor,
    TransactionState, TransactionStatus,
};
pub use ledger::{AccountFilter, BlockReference, LedgerClient, RpcLedger, TokenAccountInfo};
pub use state::{EscrowInstruction, EscrowRecord};
pub use validation::{parse_amount, parse_seed, validate_balance, EscrowParams};
pub use wallet::{keypair_from_base58, load_keypair_from_env};
