//! Wallet key loading.

use anyhow::{Context, Result};
use solana_sdk::signature::Keypair;

/// Decodes a base58 private key string into a Keypair.
///
/// Solana private keys are 64 bytes (seed + public key) encoded as base58.
///
/// # Arguments
///
/// * `b58` - Base58-encoded private key string
///
/// # Returns
///
/// * `Ok(Keypair)` - Decoded keypair
/// * `Err(anyhow::Error)` - Invalid base58 or wrong length
pub fn keypair_from_base58(b58: &str) -> Result<Keypair> {
    let bytes = bs58::decode(b58.trim())
        .into_vec()
        .context("Invalid base58 encoding")?;
    Keypair::try_from(bytes.as_slice()).map_err(|e| anyhow::anyhow!("Invalid keypair bytes: {}", e))
}

/// Loads the wallet keypair from the environment variable named `env_var`.
pub fn load_keypair_from_env(env_var: &str) -> Result<Keypair> {
    let private_key_b58 = std::env::var(env_var)
        .with_context(|| format!("Missing wallet private key env var: {}", env_var))?;
    keypair_from_base58(&private_key_b58).context("Failed to decode wallet private key from base58")
}
