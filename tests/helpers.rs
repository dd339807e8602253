//! Shared test helpers for escrow client integration tests
//!
//! This module provides constants, an in-memory ledger that executes the escrow program's
//! make/take/refund semantics, and helper functions used across test files.

#![allow(dead_code)]

use async_trait::async_trait;
use escrow_client::derive::{derive_escrow_address, derive_token_address};
use escrow_client::ledger::{AccountFilter, BlockReference, LedgerClient, TokenAccountInfo};
use escrow_client::state::{EscrowInstruction, EscrowRecord};
use escrow_client::{
    EscrowClient, EscrowClientConfig, EscrowContext, ExecutorConfig, LedgerError,
};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::InstructionError;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::{Transaction, TransactionError};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Escrow program id used by the in-memory ledger
pub const DUMMY_PROGRAM_ID: &str = "8hMrECVej1KoLvygnfLytvGEuvQwGMT5jobXHkjjWpyS";

/// Seed of the reference scenario
pub const DUMMY_SEED: u64 = 42;

/// Mint A amount deposited by the maker in the reference scenario
pub const DUMMY_DEPOSIT_AMOUNT: u64 = 1000;

/// Mint B amount requested by the maker in the reference scenario
pub const DUMMY_RECEIVE_AMOUNT: u64 = 500;

/// RPC URL that is never contacted
pub const DUMMY_RPC_URL: &str = "http://127.0.0.1:8899";

/// Custom program error returned by the in-memory program on a failed instruction
pub const PROGRAM_ERROR_CODE: u32 = 6000;

/// Minimal valid configuration
pub const DUMMY_CONFIG_TOML: &str = r#"
[ledger]
name = "localnet"
rpc_url = "http://127.0.0.1:8899"

[wallet]
private_key_env = "ESCROW_WALLET_PRIVATE_KEY"
"#;

// ============================================================================
// IN-MEMORY LEDGER
// ============================================================================

#[derive(Default)]
struct LedgerState {
    /// Raw account data of program-owned accounts (escrow records)
    accounts: HashMap<Pubkey, Vec<u8>>,
    token_accounts: HashMap<Pubkey, TokenAccountInfo>,
    /// Execution result per submitted signature
    results: HashMap<Signature, Option<TransactionError>>,
    send_failures: VecDeque<LedgerError>,
    send_count: usize,
    confirm_error: Option<TransactionError>,
    send_delay: Option<Duration>,
    confirm_delay: Option<Duration>,
    fail_reads: bool,
}

/// In-memory ledger that runs the escrow program on every submitted transaction.
///
/// Failures can be injected per submission (`push_send_failure`), for confirmation
/// (`set_confirm_error`), or for all token account reads (`set_fail_reads`).
pub struct FakeLedger {
    program_id: Pubkey,
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self {
            program_id: dummy_program_id(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Creates (or tops up) the associated token account of `owner` for `mint`.
    pub fn fund(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) -> Pubkey {
        let address = derive_token_address(mint, owner);
        let mut state = self.state.lock().unwrap();
        state
            .token_accounts
            .entry(address)
            .or_insert(TokenAccountInfo {
                mint: *mint,
                owner: *owner,
                amount: 0,
            })
            .amount += amount;
        address
    }

    /// Balance of `owner`'s associated token account for `mint`, `None` if missing.
    pub fn balance(&self, owner: &Pubkey, mint: &Pubkey) -> Option<u64> {
        self.token_balance(&derive_token_address(mint, owner))
    }

    pub fn token_balance(&self, address: &Pubkey) -> Option<u64> {
        let state = self.state.lock().unwrap();
        state.token_accounts.get(address).map(|info| info.amount)
    }

    pub fn insert_account(&self, address: Pubkey, data: Vec<u8>) {
        self.state.lock().unwrap().accounts.insert(address, data);
    }

    pub fn has_account(&self, address: &Pubkey) -> bool {
        self.state.lock().unwrap().accounts.contains_key(address)
    }

    pub fn push_send_failure(&self, error: LedgerError) {
        self.state.lock().unwrap().send_failures.push_back(error);
    }

    pub fn set_confirm_error(&self, error: TransactionError) {
        self.state.lock().unwrap().confirm_error = Some(error);
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().unwrap().send_delay = Some(delay);
    }

    pub fn set_confirm_delay(&self, delay: Duration) {
        self.state.lock().unwrap().confirm_delay = Some(delay);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().unwrap().fail_reads = fail;
    }

    /// Number of `send_transaction` calls, including failed ones.
    pub fn send_count(&self) -> usize {
        self.state.lock().unwrap().send_count
    }

    fn execute(&self, state: &mut LedgerState, tx: &Transaction) -> Result<(), InstructionError> {
        let keys = &tx.message.account_keys;
        for ix in &tx.message.instructions {
            if keys[ix.program_id_index as usize] != self.program_id {
                continue;
            }
            let accounts: Vec<Pubkey> = ix.accounts.iter().map(|i| keys[*i as usize]).collect();
            let instruction =
                EscrowInstruction::unpack(&ix.data).ok_or(InstructionError::InvalidInstructionData)?;
            match instruction {
                EscrowInstruction::Make {
                    seed,
                    receive,
                    amount,
                } => self.make(state, &accounts, seed, receive, amount)?,
                EscrowInstruction::Take => self.take(state, &accounts)?,
                EscrowInstruction::Refund => self.refund(state, &accounts)?,
            }
        }
        Ok(())
    }

    fn make(
        &self,
        state: &mut LedgerState,
        accounts: &[Pubkey],
        seed: u64,
        receive: u64,
        amount: u64,
    ) -> Result<(), InstructionError> {
        let [maker, escrow, mint_a, mint_b, maker_ata_a, vault] = first_n::<6>(accounts)?;
        let (expected, bump) = derive_escrow_address(&maker, seed, &self.program_id);
        if expected != escrow || state.accounts.contains_key(&escrow) {
            return Err(InstructionError::Custom(PROGRAM_ERROR_CODE));
        }
        debit(state, &maker_ata_a, amount)?;
        credit(state, &vault, &mint_a, &escrow, amount);

        let record = EscrowRecord {
            seed,
            maker,
            mint_a,
            mint_b,
            receive,
            bump,
        };
        let data = record
            .encode()
            .map_err(|_| InstructionError::InvalidAccountData)?;
        state.accounts.insert(escrow, data);
        Ok(())
    }

    fn take(&self, state: &mut LedgerState, accounts: &[Pubkey]) -> Result<(), InstructionError> {
        let [taker, maker, escrow, mint_a, mint_b, vault, taker_ata_a, taker_ata_b, maker_ata_b] =
            first_n::<9>(accounts)?;
        let record = load_record(state, &escrow)?;
        if record.maker != maker || record.mint_a != mint_a || record.mint_b != mint_b {
            return Err(InstructionError::Custom(PROGRAM_ERROR_CODE));
        }

        debit(state, &taker_ata_b, record.receive)?;
        credit(state, &maker_ata_b, &mint_b, &maker, record.receive);
        let deposit = close_vault(state, &vault)?;
        credit(state, &taker_ata_a, &mint_a, &taker, deposit);
        state.accounts.remove(&escrow);
        Ok(())
    }

    fn refund(&self, state: &mut LedgerState, accounts: &[Pubkey]) -> Result<(), InstructionError> {
        let [maker, escrow, mint_a, vault, maker_ata_a] = first_n::<5>(accounts)?;
        let record = load_record(state, &escrow)?;
        if record.maker != maker {
            return Err(InstructionError::Custom(PROGRAM_ERROR_CODE));
        }

        let deposit = close_vault(state, &vault)?;
        credit(state, &maker_ata_a, &mint_a, &maker, deposit);
        state.accounts.remove(&escrow);
        Ok(())
    }
}

fn first_n<const N: usize>(accounts: &[Pubkey]) -> Result<[Pubkey; N], InstructionError> {
    accounts
        .get(..N)
        .and_then(|slice| <[Pubkey; N]>::try_from(slice).ok())
        .ok_or(InstructionError::NotEnoughAccountKeys)
}

fn load_record(state: &LedgerState, escrow: &Pubkey) -> Result<EscrowRecord, InstructionError> {
    let data = state
        .accounts
        .get(escrow)
        .ok_or(InstructionError::UninitializedAccount)?;
    EscrowRecord::decode(escrow, data).map_err(|_| InstructionError::InvalidAccountData)
}

fn debit(state: &mut LedgerState, account: &Pubkey, amount: u64) -> Result<(), InstructionError> {
    let info = state
        .token_accounts
        .get_mut(account)
        .ok_or(InstructionError::UninitializedAccount)?;
    if info.amount < amount {
        return Err(InstructionError::InsufficientFunds);
    }
    info.amount -= amount;
    Ok(())
}

fn credit(state: &mut LedgerState, account: &Pubkey, mint: &Pubkey, owner: &Pubkey, amount: u64) {
    state
        .token_accounts
        .entry(*account)
        .or_insert(TokenAccountInfo {
            mint: *mint,
            owner: *owner,
            amount: 0,
        })
        .amount += amount;
}

fn close_vault(state: &mut LedgerState, vault: &Pubkey) -> Result<u64, InstructionError> {
    state
        .token_accounts
        .remove(vault)
        .map(|info| info.amount)
        .ok_or(InstructionError::UninitializedAccount)
}

fn matches_filter(data: &[u8], filter: &AccountFilter) -> bool {
    match filter {
        AccountFilter::DataSize(size) => data.len() as u64 == *size,
        AccountFilter::Memcmp { offset, bytes } => data
            .get(*offset..offset + bytes.len())
            .map_or(false, |slice| slice == bytes.as_slice()),
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.state.lock().unwrap().accounts.get(address).cloned())
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>, LedgerError> {
        if *program_id != self.program_id {
            return Ok(Vec::new());
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .accounts
            .iter()
            .filter(|(_, data)| filters.iter().all(|f| matches_filter(data, f)))
            .map(|(address, data)| (*address, data.clone()))
            .collect())
    }

    async fn get_token_account(
        &self,
        address: &Pubkey,
    ) -> Result<Option<TokenAccountInfo>, LedgerError> {
        let state = self.state.lock().unwrap();
        if state.fail_reads {
            return Err(LedgerError::with_code(-32603, "Internal error"));
        }
        Ok(state.token_accounts.get(address).copied())
    }

    async fn get_latest_block(&self) -> Result<BlockReference, LedgerError> {
        Ok(BlockReference {
            blockhash: Hash::new_unique(),
            last_valid_block_height: 150,
        })
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.send_count += 1;
            state.send_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.send_failures.pop_front() {
            return Err(error);
        }

        // A failed transaction leaves every account untouched.
        let snapshot = (state.accounts.clone(), state.token_accounts.clone());
        let signature = transaction.signatures[0];
        let result = self
            .execute(&mut state, transaction)
            .err()
            .map(|e| TransactionError::InstructionError(0, e));
        if result.is_some() {
            (state.accounts, state.token_accounts) = snapshot;
        }
        state.results.insert(signature, result);
        Ok(signature)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        _block: &BlockReference,
        _commitment: CommitmentConfig,
    ) -> Result<Option<TransactionError>, LedgerError> {
        let delay = self.state.lock().unwrap().confirm_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        if let Some(error) = &state.confirm_error {
            return Ok(Some(error.clone()));
        }
        Ok(state.results.get(signature).cloned().flatten())
    }
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

pub fn dummy_program_id() -> Pubkey {
    Pubkey::from_str(DUMMY_PROGRAM_ID).unwrap()
}

/// Executor policy with default timeout and retries.
pub fn create_default_executor_config() -> ExecutorConfig {
    ExecutorConfig::default()
}

/// Client for `payer` against `ledger` with the default executor policy.
pub fn create_test_client(ledger: &Arc<FakeLedger>, payer: Keypair) -> EscrowClient {
    let ledger_client: Arc<dyn LedgerClient> = ledger.clone();
    let ctx = EscrowContext::new(ledger_client, ledger.program_id(), payer);
    EscrowClient::new(ctx, create_default_executor_config())
}

/// Parsed minimal configuration.
pub fn create_default_config() -> EscrowClientConfig {
    EscrowClientConfig::from_toml(DUMMY_CONFIG_TOML).unwrap()
}

/// Two fresh mints (A, B).
pub fn create_default_mints() -> (Pubkey, Pubkey) {
    (Pubkey::new_unique(), Pubkey::new_unique())
}

/// Instruction error the in-memory program reports for a failed escrow check.
pub fn program_failure() -> TransactionError {
    TransactionError::InstructionError(0, InstructionError::Custom(PROGRAM_ERROR_CODE))
}
