//! Escrow Protocol Client
//!
//! Builds and submits the three escrow program instructions:
//! - **Make**: the maker deposits `deposit_amount` of mint A into a vault and asks for
//!   `receive_amount` of mint B
//! - **Take**: a taker pays the maker in mint B and receives the whole vault
//! - **Refund**: the maker closes the escrow and gets the vault back
//!
//! Every operation has a `prepare_*` form that only derives addresses, checks inputs and
//! balances, and returns the instruction. The submitting forms run that instruction through
//! the [`TransactionExecutor`].

use anyhow::Context;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::EscrowClientConfig;
use crate::derive::{
    derive_escrow_address, derive_token_address, derive_vault_address,
    ASSOCIATED_TOKEN_PROGRAM_ID, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
use crate::error::EscrowError;
use crate::executor::{
    ExecutionOutcome, ExecutorConfig, TransactionExecutor, TransactionState,
};
use crate::ledger::{AccountFilter, LedgerClient, RpcLedger};
use crate::state::{
    escrow_account_discriminator, EscrowInstruction, EscrowRecord, ESCROW_ACCOUNT_LEN,
};
use crate::validation::{validate_balance, EscrowParams};

// ============================================================================
// CONTEXT
// ============================================================================

/// Ledger connection, program id and fee payer shared by every operation of one client.
#[derive(Clone)]
pub struct EscrowContext {
    pub ledger: Arc<dyn LedgerClient>,
    pub program_id: Pubkey,
    pub payer: Arc<Keypair>,
}

impl EscrowContext {
    pub fn new(ledger: Arc<dyn LedgerClient>, program_id: Pubkey, payer: Keypair) -> Self {
        Self {
            ledger,
            program_id,
            payer: Arc::new(payer),
        }
    }

    /// Context backed by the RPC node named in `config`.
    pub fn from_config(config: &EscrowClientConfig, payer: Keypair) -> anyhow::Result<Self> {
        let ledger = RpcLedger::new(&config.ledger).context("Failed to create RPC ledger")?;
        let program_id = config.ledger.program_id()?;
        Ok(Self::new(Arc::new(ledger), program_id, payer))
    }

    /// Wallet that signs and pays for every transaction.
    pub fn payer_pubkey(&self) -> Pubkey {
        self.payer.pubkey()
    }
}

// ============================================================================
// ACCOUNT SETS
// ============================================================================

/// Accounts referenced by `make`, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakeAccounts {
    pub maker: Pubkey,
    pub escrow: Pubkey,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
    pub maker_ata_a: Pubkey,
    pub vault: Pubkey,
}

impl MakeAccounts {
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(self.maker, true),
            AccountMeta::new(self.escrow, false),
            AccountMeta::new_readonly(self.mint_a, false),
            AccountMeta::new_readonly(self.mint_b, false),
            AccountMeta::new(self.maker_ata_a, false),
            AccountMeta::new(self.vault, false),
            AccountMeta::new_readonly(ASSOCIATED_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ]
    }
}

/// Accounts referenced by `take`, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TakeAccounts {
    pub taker: Pubkey,
    pub maker: Pubkey,
    pub escrow: Pubkey,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
    pub vault: Pubkey,
    pub taker_ata_a: Pubkey,
    pub taker_ata_b: Pubkey,
    pub maker_ata_b: Pubkey,
}

impl TakeAccounts {
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(self.taker, true),
            AccountMeta::new(self.maker, false),
            AccountMeta::new(self.escrow, false),
            AccountMeta::new_readonly(self.mint_a, false),
            AccountMeta::new_readonly(self.mint_b, false),
            AccountMeta::new(self.vault, false),
            AccountMeta::new(self.taker_ata_a, false),
            AccountMeta::new(self.taker_ata_b, false),
            AccountMeta::new(self.maker_ata_b, false),
            AccountMeta::new_readonly(ASSOCIATED_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ]
    }
}

/// Accounts referenced by `refund`, in program order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefundAccounts {
    pub maker: Pubkey,
    pub escrow: Pubkey,
    pub mint_a: Pubkey,
    pub vault: Pubkey,
    pub maker_ata_a: Pubkey,
}

impl RefundAccounts {
    pub fn to_account_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new(self.maker, true),
            AccountMeta::new(self.escrow, false),
            AccountMeta::new_readonly(self.mint_a, false),
            AccountMeta::new(self.vault, false),
            AccountMeta::new(self.maker_ata_a, false),
            AccountMeta::new_readonly(ASSOCIATED_TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ]
    }
}

/// A checked, ready-to-sign instruction and the accounts it touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedOperation<A> {
    pub instruction: Instruction,
    pub accounts: A,
    /// Escrow record address the operation targets
    pub escrow: Pubkey,
}

/// Inputs of a Make operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakeParams {
    pub seed: u64,
    pub mint_a: Pubkey,
    pub mint_b: Pubkey,
    pub deposit_amount: u64,
    pub receive_amount: u64,
}

/// An open escrow together with what its vault currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowListing {
    pub address: Pubkey,
    pub record: EscrowRecord,
    /// Vault balance in mint A base units; 0 if the vault does not exist
    pub vault_balance: u64,
}

// ============================================================================
// CLIENT
// ============================================================================

/// Escrow operations for one wallet against one ledger.
pub struct EscrowClient {
    ctx: EscrowContext,
    executor: TransactionExecutor,
}

impl EscrowClient {
    pub fn new(ctx: EscrowContext, executor_config: ExecutorConfig) -> Self {
        let executor = TransactionExecutor::new(Arc::clone(&ctx.ledger), executor_config);
        Self { ctx, executor }
    }

    pub fn context(&self) -> &EscrowContext {
        &self.ctx
    }

    pub fn executor(&self) -> &TransactionExecutor {
        &self.executor
    }

    pub fn state(&self) -> TransactionState {
        self.executor.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransactionState> {
        self.executor.subscribe()
    }

    /// Cancels the in-flight transaction, if any.
    pub fn cancel(&self) {
        self.executor.cancel();
    }

    // ------------------------------------------------------------------------
    // Prepare
    // ------------------------------------------------------------------------

    /// Checks Make inputs and the maker's mint A balance, then builds the instruction.
    ///
    /// # Returns
    ///
    /// * `Ok(PreparedOperation<MakeAccounts>)` - Instruction ready to sign
    /// * `Err(EscrowError::Validation)` - Seed or amounts out of range
    /// * `Err(EscrowError::AccountNotFound)` - Maker has no mint A token account
    /// * `Err(EscrowError::InsufficientBalance)` - Maker holds less than the deposit
    pub async fn prepare_make(
        &self,
        maker: &Pubkey,
        params: &MakeParams,
    ) -> Result<PreparedOperation<MakeAccounts>, EscrowError> {
        EscrowParams {
            seed: params.seed,
            deposit_amount: params.deposit_amount,
            receive_amount: params.receive_amount,
        }
        .validate()?;

        let (escrow, _bump) = derive_escrow_address(maker, params.seed, &self.ctx.program_id);
        let maker_ata_a = derive_token_address(&params.mint_a, maker);
        let vault = derive_vault_address(&escrow, &params.mint_a);

        validate_balance(
            self.ctx.ledger.as_ref(),
            &maker_ata_a,
            params.deposit_amount,
            &params.mint_a,
        )
        .await?;

        let accounts = MakeAccounts {
            maker: *maker,
            escrow,
            mint_a: params.mint_a,
            mint_b: params.mint_b,
            maker_ata_a,
            vault,
        };
        let instruction = Instruction {
            program_id: self.ctx.program_id,
            accounts: accounts.to_account_metas(),
            data: EscrowInstruction::Make {
                seed: params.seed,
                receive: params.receive_amount,
                amount: params.deposit_amount,
            }
            .pack()
            .map_err(|e| EscrowError::serialization("make instruction", e))?,
        };

        debug!("Prepared make for escrow {} (seed {})", escrow, params.seed);
        Ok(PreparedOperation {
            instruction,
            accounts,
            escrow,
        })
    }

    /// Loads the escrow, checks the taker's mint B balance, then builds the instruction.
    ///
    /// # Returns
    ///
    /// * `Ok(PreparedOperation<TakeAccounts>)` - Instruction ready to sign
    /// * `Err(EscrowError::EscrowNotFound)` - Escrow missing or already closed
    /// * `Err(EscrowError::AccountNotFound)` - Taker has no mint B token account
    /// * `Err(EscrowError::InsufficientBalance)` - Taker holds less than `receive`
    pub async fn prepare_take(
        &self,
        taker: &Pubkey,
        escrow: &Pubkey,
    ) -> Result<PreparedOperation<TakeAccounts>, EscrowError> {
        let record = self.fetch_escrow(escrow).await?;

        let accounts = TakeAccounts {
            taker: *taker,
            maker: record.maker,
            escrow: *escrow,
            mint_a: record.mint_a,
            mint_b: record.mint_b,
            vault: derive_vault_address(escrow, &record.mint_a),
            taker_ata_a: derive_token_address(&record.mint_a, taker),
            taker_ata_b: derive_token_address(&record.mint_b, taker),
            maker_ata_b: derive_token_address(&record.mint_b, &record.maker),
        };

        validate_balance(
            self.ctx.ledger.as_ref(),
            &accounts.taker_ata_b,
            record.receive,
            &record.mint_b,
        )
        .await?;

        let instruction = Instruction {
            program_id: self.ctx.program_id,
            accounts: accounts.to_account_metas(),
            data: EscrowInstruction::Take
                .pack()
                .map_err(|e| EscrowError::serialization("take instruction", e))?,
        };

        debug!("Prepared take for escrow {} by {}", escrow, taker);
        Ok(PreparedOperation {
            instruction,
            accounts,
            escrow: *escrow,
        })
    }

    /// Loads the escrow, checks that `maker` created it, then builds the instruction.
    pub async fn prepare_refund(
        &self,
        maker: &Pubkey,
        escrow: &Pubkey,
    ) -> Result<PreparedOperation<RefundAccounts>, EscrowError> {
        let record = self.fetch_escrow(escrow).await?;
        if record.maker != *maker {
            return Err(EscrowError::Unauthorized {
                maker: record.maker,
                caller: *maker,
            });
        }

        let accounts = RefundAccounts {
            maker: *maker,
            escrow: *escrow,
            mint_a: record.mint_a,
            vault: derive_vault_address(escrow, &record.mint_a),
            maker_ata_a: derive_token_address(&record.mint_a, maker),
        };
        let instruction = Instruction {
            program_id: self.ctx.program_id,
            accounts: accounts.to_account_metas(),
            data: EscrowInstruction::Refund
                .pack()
                .map_err(|e| EscrowError::serialization("refund instruction", e))?,
        };

        debug!("Prepared refund for escrow {}", escrow);
        Ok(PreparedOperation {
            instruction,
            accounts,
            escrow: *escrow,
        })
    }

    // ------------------------------------------------------------------------
    // Submit
    // ------------------------------------------------------------------------

    /// Opens an escrow from the payer's wallet.
    pub async fn make(&self, params: &MakeParams) -> Result<ExecutionOutcome, EscrowError> {
        let prepared = self.prepare_make(&self.ctx.payer_pubkey(), params).await?;
        info!(
            "Making escrow {}: deposit {} of {}, receive {} of {}",
            prepared.escrow,
            params.deposit_amount,
            params.mint_a,
            params.receive_amount,
            params.mint_b
        );
        self.submit(prepared.instruction).await
    }

    /// Takes the escrow at `escrow` with the payer's wallet.
    pub async fn take(&self, escrow: &Pubkey) -> Result<ExecutionOutcome, EscrowError> {
        let prepared = self.prepare_take(&self.ctx.payer_pubkey(), escrow).await?;
        info!("Taking escrow {}", escrow);
        self.submit(prepared.instruction).await
    }

    /// Refunds the escrow at `escrow` to the payer, who must be its maker.
    pub async fn refund(&self, escrow: &Pubkey) -> Result<ExecutionOutcome, EscrowError> {
        let prepared = self.prepare_refund(&self.ctx.payer_pubkey(), escrow).await?;
        info!("Refunding escrow {}", escrow);
        self.submit(prepared.instruction).await
    }

    /// Signs `instruction` with a fresh blockhash on every attempt and submits it.
    async fn submit(&self, instruction: Instruction) -> Result<ExecutionOutcome, EscrowError> {
        let ledger = Arc::clone(&self.ctx.ledger);
        let payer = Arc::clone(&self.ctx.payer);

        self.executor
            .execute(move || {
                let ledger = Arc::clone(&ledger);
                let payer = Arc::clone(&payer);
                let instruction = instruction.clone();
                async move {
                    let block = ledger.get_latest_block().await?;
                    let mut tx = Transaction::new_with_payer(&[instruction], Some(&payer.pubkey()));
                    tx.try_sign(&[payer.as_ref()], block.blockhash)?;
                    ledger.send_transaction(&tx).await
                }
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Reads one escrow record.
    ///
    /// # Returns
    ///
    /// * `Ok(EscrowRecord)` - Open escrow
    /// * `Err(EscrowError::EscrowNotFound)` - No account at `address` (never made, taken or refunded)
    /// * `Err(EscrowError::InvalidAccountData)` - Account exists but is not an escrow record
    /// * `Err(EscrowError::Submission)` - Ledger unreachable
    pub async fn fetch_escrow(&self, address: &Pubkey) -> Result<EscrowRecord, EscrowError> {
        match self.ctx.ledger.get_account_data(address).await? {
            Some(data) => EscrowRecord::decode(address, &data),
            None => Err(EscrowError::EscrowNotFound { address: *address }),
        }
    }

    /// Every open escrow of the program. Accounts that fail to decode are skipped.
    pub async fn fetch_all_escrows(&self) -> Result<Vec<(Pubkey, EscrowRecord)>, EscrowError> {
        let filters = [
            AccountFilter::DataSize(ESCROW_ACCOUNT_LEN as u64),
            AccountFilter::Memcmp {
                offset: 0,
                bytes: escrow_account_discriminator().to_vec(),
            },
        ];
        let accounts = self
            .ctx
            .ledger
            .get_program_accounts(&self.ctx.program_id, &filters)
            .await?;

        let mut escrows = Vec::with_capacity(accounts.len());
        for (address, data) in accounts {
            match EscrowRecord::decode(&address, &data) {
                Ok(record) => escrows.push((address, record)),
                Err(e) => warn!("Skipping escrow account {}: {}", address, e),
            }
        }
        Ok(escrows)
    }

    /// Every open escrow with its current vault balance.
    pub async fn list_escrows(&self) -> Result<Vec<EscrowListing>, EscrowError> {
        let escrows = self.fetch_all_escrows().await?;
        let mut listings = Vec::with_capacity(escrows.len());
        for (address, record) in escrows {
            let vault = derive_vault_address(&address, &record.mint_a);
            let vault_balance = self
                .ctx
                .ledger
                .get_token_account(&vault)
                .await?
                .map(|info| info.amount)
                .unwrap_or(0);
            listings.push(EscrowListing {
                address,
                record,
                vault_balance,
            });
        }
        Ok(listings)
    }
}
