//! Escrow Program Schema
//!
//! Account and instruction layouts of the escrow program. The program is an Anchor
//! program: accounts start with `sha256("account:<Name>")[..8]` and instructions with
//! `sha256("global:<name>")[..8]`, followed by Borsh-encoded fields.

use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::hash::hash;
use solana_sdk::pubkey::Pubkey;

use crate::error::EscrowError;

/// Length of an Anchor discriminator.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Serialized size of an escrow record including the discriminator.
pub const ESCROW_ACCOUNT_LEN: usize = DISCRIMINATOR_LEN + 8 + 32 * 3 + 8 + 1;

fn discriminator(preimage: &str) -> [u8; DISCRIMINATOR_LEN] {
    let digest = hash(preimage.as_bytes()).to_bytes();
    let mut out = [0u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&digest[..DISCRIMINATOR_LEN]);
    out
}

/// Account discriminator of the escrow record.
pub fn escrow_account_discriminator() -> [u8; DISCRIMINATOR_LEN] {
    discriminator("account:Escrow")
}

// ============================================================================
// ESCROW RECORD
// ============================================================================

/// On-chain field layout; keys are raw bytes so Borsh only sees primitive types.
#[derive(BorshDeserialize, BorshSerialize, Debug, Clone)]
struct EscrowAccountData {
    seed: u64,
    maker: [u8; 32],
    mint_a: [u8; 32],
    mint_b: [u8; 32],
    receive: u64,
    bump: u8,
}

/// An open escrow as stored by the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowRecord {
    /// Seed used for address derivation
    pub seed: u64,
    /// Escrow creator
    pub maker: Pubkey,
    /// Mint of the deposited token
    pub mint_a: Pubkey,
    /// Mint of the token the maker wants
    pub mint_b: Pubkey,
    /// Amount of mint B the maker wants to receive
    pub receive: u64,
    /// Canonical bump of the escrow address
    pub bump: u8,
}

impl EscrowRecord {
    /// Decodes escrow account data.
    ///
    /// # Arguments
    ///
    /// * `address` - Account address (for error reporting)
    /// * `data` - Raw account data
    ///
    /// # Returns
    ///
    /// * `Ok(EscrowRecord)` - Parsed record
    /// * `Err(EscrowError::InvalidAccountData)` - Wrong discriminator or truncated data
    pub fn decode(address: &Pubkey, data: &[u8]) -> Result<Self, EscrowError> {
        let invalid = |reason: &str| EscrowError::InvalidAccountData {
            address: *address,
            reason: reason.to_string(),
        };

        if data.len() < ESCROW_ACCOUNT_LEN {
            return Err(invalid("account data too short"));
        }
        if data[..DISCRIMINATOR_LEN] != escrow_account_discriminator() {
            return Err(invalid("not an escrow account"));
        }

        let mut body = &data[DISCRIMINATOR_LEN..];
        let raw = EscrowAccountData::deserialize(&mut body)
            .map_err(|e| invalid(&format!("borsh: {}", e)))?;

        Ok(Self {
            seed: raw.seed,
            maker: Pubkey::new_from_array(raw.maker),
            mint_a: Pubkey::new_from_array(raw.mint_a),
            mint_b: Pubkey::new_from_array(raw.mint_b),
            receive: raw.receive,
            bump: raw.bump,
        })
    }

    /// Encodes the record the way the program stores it.
    pub fn encode(&self) -> std::io::Result<Vec<u8>> {
        let raw = EscrowAccountData {
            seed: self.seed,
            maker: self.maker.to_bytes(),
            mint_a: self.mint_a.to_bytes(),
            mint_b: self.mint_b.to_bytes(),
            receive: self.receive,
            bump: self.bump,
        };
        let mut data = escrow_account_discriminator().to_vec();
        data.extend(raw.try_to_vec()?);
        Ok(data)
    }
}

// ============================================================================
// INSTRUCTIONS
// ============================================================================

#[derive(BorshDeserialize, BorshSerialize, Debug, Clone)]
struct MakeArgs {
    seed: u64,
    receive: u64,
    amount: u64,
}

/// Instructions understood by the escrow program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowInstruction {
    /// Open an escrow and deposit `amount` of mint A into the vault
    Make { seed: u64, receive: u64, amount: u64 },
    /// Pay `receive` of mint B to the maker and take the vault
    Take,
    /// Return the vault to the maker and close the escrow
    Refund,
}

impl EscrowInstruction {
    fn name(&self) -> &'static str {
        match self {
            EscrowInstruction::Make { .. } => "make",
            EscrowInstruction::Take => "take",
            EscrowInstruction::Refund => "refund",
        }
    }

    /// Anchor discriminator of this instruction.
    pub fn discriminator(&self) -> [u8; DISCRIMINATOR_LEN] {
        discriminator(&format!("global:{}", self.name()))
    }

    /// Serializes instruction data.
    pub fn pack(&self) -> std::io::Result<Vec<u8>> {
        let mut data = self.discriminator().to_vec();
        if let EscrowInstruction::Make {
            seed,
            receive,
            amount,
        } = self
        {
            let args = MakeArgs {
                seed: *seed,
                receive: *receive,
                amount: *amount,
            };
            data.extend(args.try_to_vec()?);
        }
        Ok(data)
    }

    /// Parses instruction data; `None` for unknown discriminators or short data.
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() < DISCRIMINATOR_LEN {
            return None;
        }
        let (tag, mut rest) = data.split_at(DISCRIMINATOR_LEN);
        let make_tag = EscrowInstruction::Make {
            seed: 0,
            receive: 0,
            amount: 0,
        }
        .discriminator();

        if tag == make_tag {
            let args = MakeArgs::deserialize(&mut rest).ok()?;
            Some(EscrowInstruction::Make {
                seed: args.seed,
                receive: args.receive,
                amount: args.amount,
            })
        } else if tag == EscrowInstruction::Take.discriminator() {
            Some(EscrowInstruction::Take)
        } else if tag == EscrowInstruction::Refund.discriminator() {
            Some(EscrowInstruction::Refund)
        } else {
            None
        }
    }
}
