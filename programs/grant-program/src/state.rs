//! Account state structures for the recurring grant program

use anchor_lang::prelude::*;

// ============================================================================
// Seeds
// ============================================================================

/// PDA seeds: ["grant", authority, mint, grant_id (u64 LE)]
pub const GRANT_SEED: &[u8] = b"grant";
/// PDA seeds: ["vault", grant]
pub const VAULT_SEED: &[u8] = b"vault";
/// PDA seeds: ["receipt", grant, claimer, period_index (u64 LE)]
pub const RECEIPT_SEED: &[u8] = b"receipt";
/// PDA seeds: ["pop-config", authority]
pub const POP_CONFIG_SEED: &[u8] = b"pop-config";
/// PDA seeds: ["pop-state", grant]
pub const POP_STATE_SEED: &[u8] = b"pop-state";

/// Size of SHA-256 digests used by the PoP chain and the allowlist
pub const HASH_SIZE: usize = 32;

/// Zero hash. Marks chain genesis and a disabled allowlist.
pub const ZERO_HASH: [u8; HASH_SIZE] = [0u8; HASH_SIZE];

/// Suggested period length for monthly grants (30 days)
pub const DEFAULT_PERIOD_SECONDS: i64 = 2_592_000;

/// Furthest into the future a grant may be scheduled to start (365 days)
pub const MAX_START_LEAD_SECONDS: i64 = 365 * 24 * 60 * 60;

// ============================================================================
// Grant
// ============================================================================

/// A funding pool paying `amount_per_period` once per period per claimer.
/// PDA seeds: ["grant", authority, mint, grant_id]
#[account]
#[derive(Debug, InitSpace)]
pub struct Grant {
    /// Organizer that created and administers the grant
    pub authority: Pubkey,
    /// Token distributed by this grant
    pub mint: Pubkey,
    /// Program-owned vault holding the grant's tokens
    pub vault: Pubkey,
    /// Caller-chosen identifier, part of the PDA seeds
    pub grant_id: u64,
    /// Amount paid per claim, in base units
    pub amount_per_period: u64,
    /// Period length in seconds (always > 0)
    pub period_seconds: i64,
    /// Origin of period arithmetic (unix timestamp)
    pub start_ts: i64,
    /// Expiry timestamp (0 = no expiry)
    pub expires_at: i64,
    /// Allowlist Merkle root. All zero means the allowlist is disabled.
    pub merkle_root: [u8; 32],
    /// Claims are rejected while paused
    pub paused: bool,
    /// Bump seed
    pub bump: u8,
}

impl Default for Grant {
    fn default() -> Self {
        Self {
            authority: Pubkey::default(),
            mint: Pubkey::default(),
            vault: Pubkey::default(),
            grant_id: 0,
            amount_per_period: 0,
            period_seconds: DEFAULT_PERIOD_SECONDS,
            start_ts: 0,
            expires_at: 0,
            merkle_root: ZERO_HASH,
            paused: false,
            bump: 0,
        }
    }
}

impl Grant {
    pub const SIZE: usize = 8 +  // discriminator
        32 + // authority
        32 + // mint
        32 + // vault
        8 +  // grant_id
        8 +  // amount_per_period
        8 +  // period_seconds
        8 +  // start_ts
        8 +  // expires_at
        32 + // merkle_root
        1 +  // paused
        1;   // bump

    pub fn allowlist_enabled(&self) -> bool {
        self.merkle_root != ZERO_HASH
    }

    pub fn has_expired(&self, now: i64) -> bool {
        self.expires_at != 0 && now > self.expires_at
    }
}

// ============================================================================
// Claim receipt
// ============================================================================

/// Proof that a period's allotment was paid. Created with `init` in the same
/// instruction as the transfer, so a second claim for the same period fails
/// on account creation. Never closed.
/// PDA seeds: ["receipt", grant, claimer, period_index]
#[account]
#[derive(Debug, Default, InitSpace)]
pub struct ClaimReceipt {
    /// Grant the receipt belongs to
    pub grant: Pubkey,
    /// Wallet that claimed
    pub claimer: Pubkey,
    /// Period that was paid
    pub period_index: u64,
    /// Amount transferred
    pub amount: u64,
    /// Ledger time of the claim
    pub claimed_at: i64,
    /// PoP entry hash attached to the claim
    pub entry_hash: [u8; 32],
}

impl ClaimReceipt {
    pub const SIZE: usize = 8 +  // discriminator
        32 + // grant
        32 + // claimer
        8 +  // period_index
        8 +  // amount
        8 +  // claimed_at
        32;  // entry_hash
}

// ============================================================================
// Proof of participation
// ============================================================================

/// Trusted off-chain signer for every grant owned by `authority`.
/// PDA seeds: ["pop-config", authority]
#[account]
#[derive(Debug, Default, InitSpace)]
pub struct PopConfig {
    pub authority: Pubkey,
    /// Ed25519 key whose signatures attest claims
    pub signer_pubkey: Pubkey,
    pub bump: u8,
}

impl PopConfig {
    pub const SIZE: usize = 8 +  // discriminator
        32 + // authority
        32 + // signer_pubkey
        1;   // bump
}

/// Per-grant head of the PoP hash chain. Advanced only by successful claims.
/// PDA seeds: ["pop-state", grant]
#[account]
#[derive(Debug, Default, InitSpace)]
pub struct PopState {
    pub grant: Pubkey,
    /// Entry hash of the last accepted proof (global chain)
    pub last_global_hash: [u8; 32],
    /// Entry hash of the last accepted proof for this grant's stream
    pub last_stream_hash: [u8; 32],
    pub last_period_index: u64,
    pub last_issued_at: i64,
    /// Number of entries appended so far
    pub entries: u64,
    pub initialized: bool,
    pub bump: u8,
}

impl PopState {
    pub const SIZE: usize = 8 +  // discriminator
        32 + // grant
        32 + // last_global_hash
        32 + // last_stream_hash
        8 +  // last_period_index
        8 +  // last_issued_at
        8 +  // entries
        1 +  // initialized
        1;   // bump
}
