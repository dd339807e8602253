//! Solana RPC Ledger
//!
//! [`LedgerClient`] backed by a Solana JSON-RPC endpoint. Typed calls go through the
//! nonblocking `RpcClient`; program account scans are issued as raw JSON-RPC so the
//! filters and encoding stay explicit.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{Transaction, TransactionError};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{AccountFilter, BlockReference, LedgerClient, TokenAccountInfo};
use crate::config::LedgerConfig;
use crate::derive::TOKEN_PROGRAM_ID;
use crate::error::LedgerError;

const CONFIRMATION_CHECK_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Deserialize)]
struct ProgramAccountResult {
    pubkey: String,
    account: RpcAccount,
}

#[derive(Debug, Clone, Deserialize)]
struct RpcAccount {
    data: (String, String),
}

#[derive(Debug, Clone, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

pub struct RpcLedger {
    client: Client,
    rpc_url: String,
    rpc_client: RpcClient,
    commitment: CommitmentConfig,
    /// Commitment name as sent in raw JSON-RPC requests
    commitment_label: String,
    poll_interval: Duration,
}

impl RpcLedger {
    /// Creates a new RPC ledger client.
    ///
    /// # Arguments
    ///
    /// * `config` - Ledger connection configuration
    ///
    /// # Returns
    ///
    /// * `Ok(RpcLedger)` - Initialized client
    /// * `Err(anyhow::Error)` - Invalid config values
    pub fn new(config: &LedgerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        let commitment = config.commitment_config()?;
        let rpc_client = RpcClient::new_with_commitment(config.rpc_url.clone(), commitment);

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            rpc_client,
            commitment,
            commitment_label: config.commitment.clone(),
            poll_interval: CONFIRMATION_CHECK_INTERVAL,
        })
    }

    /// Overrides how often signature status is polled while confirming.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn get_account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        let response = self
            .rpc_client
            .get_account_with_commitment(address, self.commitment)
            .await?;
        Ok(response.value.map(|account| account.data))
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[AccountFilter],
    ) -> Result<Vec<(Pubkey, Vec<u8>)>, LedgerError> {
        let filters: Vec<serde_json::Value> = filters.iter().map(AccountFilter::to_json).collect();
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getProgramAccounts",
            "params": [
                program_id.to_string(),
                {
                    "encoding": "base64",
                    "commitment": self.commitment_label,
                    "filters": filters,
                }
            ]
        });

        let response: serde_json::Value = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::new(format!("Failed to call getProgramAccounts: {}", e)))?
            .json()
            .await
            .map_err(|e| {
                LedgerError::new(format!("Failed to parse getProgramAccounts response: {}", e))
            })?;

        if let Some(error) = response.get("error") {
            return Err(match serde_json::from_value::<RpcErrorObject>(error.clone()) {
                Ok(rpc_error) => LedgerError::with_code(rpc_error.code, rpc_error.message),
                Err(_) => LedgerError::new(format!("RPC error: {}", error)),
            });
        }

        let result = response
            .get("result")
            .and_then(|r| r.as_array())
            .ok_or_else(|| LedgerError::new("Invalid getProgramAccounts response"))?;

        let mut accounts = Vec::with_capacity(result.len());
        for entry in result {
            let account: ProgramAccountResult = serde_json::from_value(entry.clone())
                .map_err(|e| LedgerError::new(format!("Failed to parse program account entry: {}", e)))?;
            let address = Pubkey::from_str(&account.pubkey)
                .map_err(|_| LedgerError::new(format!("Invalid pubkey in response: {}", account.pubkey)))?;
            let data = STANDARD
                .decode(&account.account.data.0)
                .map_err(|e| LedgerError::new(format!("Invalid base64 account data: {}", e)))?;
            accounts.push((address, data));
        }

        debug!("getProgramAccounts returned {} accounts", accounts.len());
        Ok(accounts)
    }

    async fn get_token_account(
        &self,
        address: &Pubkey,
    ) -> Result<Option<TokenAccountInfo>, LedgerError> {
        let response = self
            .rpc_client
            .get_account_with_commitment(address, self.commitment)
            .await?;

        let Some(account) = response.value else {
            return Ok(None);
        };
        if account.owner != TOKEN_PROGRAM_ID {
            return Err(LedgerError::new(format!(
                "Account {} is not owned by the token program",
                address
            )));
        }
        TokenAccountInfo::unpack(&account.data)
            .map(Some)
            .ok_or_else(|| LedgerError::new(format!("Invalid token account data for {}", address)))
    }

    async fn get_latest_block(&self) -> Result<BlockReference, LedgerError> {
        let (blockhash, last_valid_block_height) = self
            .rpc_client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await?;
        Ok(BlockReference {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, LedgerError> {
        Ok(self.rpc_client.send_transaction(transaction).await?)
    }

    async fn confirm_transaction(
        &self,
        signature: &Signature,
        block: &BlockReference,
        commitment: CommitmentConfig,
    ) -> Result<Option<TransactionError>, LedgerError> {
        loop {
            if let Some(result) = self
                .rpc_client
                .get_signature_status_with_commitment(signature, commitment)
                .await?
            {
                return Ok(result.err());
            }

            let height = self
                .rpc_client
                .get_block_height_with_commitment(commitment)
                .await?;
            if height > block.last_valid_block_height {
                return Err(LedgerError::new(format!(
                    "Transaction {} expired: block height exceeded",
                    signature
                )));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
