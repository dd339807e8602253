//! Address Derivation
//!
//! Pure functions that compute the escrow record address and the associated token
//! accounts the escrow program touches. Nothing here performs I/O: the same inputs always
//! produce the same addresses.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::error::EscrowError;

/// Seed prefix that separates escrow records from any other program-derived address.
pub const ESCROW_SEED: &[u8] = b"escrow";

/// Default escrow program id (devnet deployment).
pub const DEFAULT_ESCROW_PROGRAM_ID: &str = "8hMrECVej1KoLvygnfLytvGEuvQwGMT5jobXHkjjWpyS";

// Well-known program IDs from Solana mainnet/devnet docs.
pub const TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::from_str_const("11111111111111111111111111111111");

/// Derives the escrow record address for a maker and seed.
///
/// Seeds are `"escrow"`, the maker key, and `seed` as 8 little-endian bytes. The search
/// starts from bump 255 and walks down, so the returned bump is always the highest one
/// that lands off the curve.
///
/// # Arguments
///
/// * `maker` - Escrow creator
/// * `seed` - Maker-chosen counter that distinguishes escrows of one maker
/// * `program_id` - Escrow program id
///
/// # Returns
///
/// * `(Pubkey, u8)` - Escrow address and its bump
pub fn derive_escrow_address(maker: &Pubkey, seed: u64, program_id: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[ESCROW_SEED, maker.as_ref(), &seed.to_le_bytes()],
        program_id,
    )
}

/// Derives the associated token account (ATA) for an owner and mint.
///
/// # Arguments
///
/// * `mint` - SPL token mint
/// * `owner` - Token account owner (wallet or program-derived address)
///
/// # Returns
///
/// * `Pubkey` - Derived ATA address
pub fn derive_token_address(mint: &Pubkey, owner: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

/// The vault is the escrow record's own token account for mint A.
pub fn derive_vault_address(escrow: &Pubkey, mint_a: &Pubkey) -> Pubkey {
    derive_token_address(mint_a, escrow)
}

/// Parses a base58 account identifier.
///
/// # Returns
///
/// * `Ok(Pubkey)` - Parsed key
/// * `Err(EscrowError::Validation)` - Empty or malformed input
pub fn parse_pubkey(value: &str) -> Result<Pubkey, EscrowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EscrowError::validation("Address is required"));
    }
    Pubkey::from_str(trimmed)
        .map_err(|_| EscrowError::validation(format!("Invalid public key format: {}", trimmed)))
}
