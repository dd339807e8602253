//! Configuration Management Module
//!
//! This module handles loading and managing configuration for the escrow client.
//! Configuration includes the ledger connection, transaction execution policy,
//! and where the wallet key comes from.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;

use crate::derive::DEFAULT_ESCROW_PROGRAM_ID;
use crate::executor::ExecutorConfig;

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure containing all escrow client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowClientConfig {
    /// Ledger connection (RPC endpoint, program id, commitment)
    pub ledger: LedgerConfig,
    /// Transaction execution policy (timeout, retries)
    #[serde(default)]
    pub transaction: TransactionConfig,
    /// Wallet key source
    pub wallet: WalletConfig,
}

/// Configuration for the ledger connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Human-readable name for the cluster
    pub name: String,
    /// RPC endpoint URL
    pub rpc_url: String,
    /// Escrow program id (base58)
    #[serde(default = "default_program_id")]
    pub program_id: String,
    /// Commitment level: "processed", "confirmed" or "finalized"
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

/// Retry and timeout policy for submitted transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// Wallet configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Environment variable name containing the wallet private key (base58)
    pub private_key_env: String,
}

fn default_program_id() -> String {
    DEFAULT_ESCROW_PROGRAM_ID.to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    2
}

impl LedgerConfig {
    /// Parsed escrow program id.
    pub fn program_id(&self) -> anyhow::Result<Pubkey> {
        Pubkey::from_str(&self.program_id).context("Invalid escrow program_id")
    }

    /// Parsed commitment level.
    pub fn commitment_config(&self) -> anyhow::Result<CommitmentConfig> {
        match self.commitment.as_str() {
            "processed" => Ok(CommitmentConfig::processed()),
            "confirmed" => Ok(CommitmentConfig::confirmed()),
            "finalized" => Ok(CommitmentConfig::finalized()),
            other => Err(anyhow::anyhow!(
                "Invalid commitment '{}': expected processed, confirmed or finalized",
                other
            )),
        }
    }
}

impl EscrowClientConfig {
    /// Loads configuration from a TOML file.
    ///
    /// This function:
    /// 1. Uses the provided path, else ESCROW_CONFIG_PATH, else config/escrow.toml
    /// 2. If it exists, loads and parses the configuration
    /// 3. Validates the configuration
    /// 4. If it doesn't exist, returns an error asking user to copy template
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file
    ///
    /// # Returns
    ///
    /// * `Ok(EscrowClientConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - Missing file, parse failure, or validation failure
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("ESCROW_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/escrow.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path))?;
            let config = Self::from_toml(&content)?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/escrow.template.toml config/escrow.toml\n\
                Then edit config/escrow.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads configuration from the default location.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: EscrowClientConfig =
            toml::from_str(content).context("Failed to parse escrow client config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// Checks:
    /// - Program id is a valid base58 pubkey
    /// - RPC URL is an http(s) URL
    /// - Commitment level is known
    /// - Timeout is positive
    /// - Wallet env var name is set
    pub fn validate(&self) -> anyhow::Result<()> {
        self.ledger.program_id()?;
        self.ledger.commitment_config()?;

        let url = url::Url::parse(&self.ledger.rpc_url).map_err(|e| {
            anyhow::anyhow!("Invalid rpc_url '{}': {}", self.ledger.rpc_url, e)
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("Invalid rpc_url scheme '{}': expected http or https", url.scheme());
        }

        if self.transaction.timeout_ms == 0 {
            anyhow::bail!("Configuration error: transaction.timeout_ms must be greater than 0");
        }

        if self.wallet.private_key_env.trim().is_empty() {
            anyhow::bail!("Configuration error: wallet.private_key_env must be set");
        }

        Ok(())
    }

    /// Executor policy derived from the transaction and ledger sections.
    pub fn executor_config(&self) -> anyhow::Result<ExecutorConfig> {
        Ok(ExecutorConfig {
            timeout: Duration::from_millis(self.transaction.timeout_ms),
            max_retries: self.transaction.max_retries,
            commitment: self.ledger.commitment_config()?,
        })
    }
}
