//! Ledger Interface
//!
//! The escrow client only talks to the ledger through [`LedgerClient`]: account reads,
//! transaction submission, and confirmation. [`RpcLedger`] implements it against a
//! Solana JSON-RPC node; tests substitute an in-memory ledger.

use async_trait::async_trait;
use serde_json::json;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};

use crate::error::LedgerError;

pub mod rpc;

pub use rpc::RpcLedger;

/// Recent block used to sign a transaction and to bound how long it stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReference {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// Server-side filter for program account scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountFilter {
    /// Account data must be exactly this many bytes
    DataSize(u64),
    /// Account data must contain `bytes` at `offset`
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl AccountFilter {
    /// JSON-RPC representation used by `getProgramAccounts`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AccountFilter::DataSize(size) => json!({ "dataSize": size }),
            AccountFilter::Memcmp { offset, bytes } => json!({
                "memcmp": {
                    "offset": offset,
                    "bytes": bs58::encode(bytes).into_string(),
                }
            }),
        }
    }
}

/// The fields of an SPL token account the client cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccountInfo {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

/// Size of an SPL token account.
pub const TOKEN_ACCOUNT_LEN: usize = 165;

impl TokenAccountInfo {
    /// Parses SPL token account data: mint(32) + owner(32) + amount(8) + ...
    ///
    /// # Returns
    ///
    /// * `Some(TokenAccountInfo)` - Parsed account
    /// * `None` - Data too short to be a token account
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() < TOKEN_ACCOUNT_LEN {
            return None;
        }
        let mint = Pubkey::try_from(&data[0..32]).ok()?;
        let owner = Pubkey::try_from(&data[32..64]).ok()?;
        let amount = u64::from_le_bytes(data[64..72].try_into().ok()?);
        Some(Self {
            mint,
            owner,
            amount,
        })
    }
}

/// Read, submit, and confirm operations against the ledger.
///
/// Implementations are shared across concurrent callers and hold no per-call state.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Raw account data, `None` if the account does not exist.
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError>;

    /// All accounts owned by `program_id` that match every filter.
    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>, LedgerError>;

    /// Token account at `address`, `None` if it does not exist.
    async fn get_token_account(
        &self,
        address: &Pubkey,
    ) -> Result<Option<TokenAccountInfo>, LedgerError>;

    /// Latest blockhash and the last block height at which it is valid.
    async fn get_latest_block(&self) -> Result<BlockReference, LedgerError>;

    /// Submits a signed transaction and returns its signature.
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError>;

    /// Waits until `signature` reaches `commitment`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Transaction executed successfully
    /// * `Ok(Some(TransactionError))` - Transaction landed and failed
    /// * `Err(LedgerError)` - Transport failure or the block reference expired
    async fn confirm_transaction(
        &self,
        signature: &Signature,
        block: &BlockReference,
        commitment: CommitmentConfig,
    ) -> Result<Option<TransactionError>, LedgerError>;
}
