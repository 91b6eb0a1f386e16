//! Events emitted by the recurring grant program
//!
//! Indexers reconstruct the claim history and the PoP chain from these.

use anchor_lang::prelude::*;

/// Emitted when a grant and its vault are created
#[event]
pub struct GrantCreated {
    pub grant: Pubkey,
    pub authority: Pubkey,
    pub mint: Pubkey,
    pub grant_id: u64,
    pub amount_per_period: u64,
    pub period_seconds: i64,
    pub start_ts: i64,
    pub expires_at: i64,
    pub timestamp: i64,
}

/// Emitted when tokens are deposited into a grant vault
#[event]
pub struct GrantFunded {
    pub grant: Pubkey,
    pub funder: Pubkey,
    pub amount: u64,
    pub vault_balance: u64,
    pub timestamp: i64,
}

/// Emitted when a claimer receives a period's allotment
#[event]
pub struct GrantClaimed {
    pub grant: Pubkey,
    pub claimer: Pubkey,
    pub period_index: u64,
    pub amount: u64,
    pub entry_hash: [u8; 32],
    pub timestamp: i64,
}

/// Emitted for every PoP entry appended to a grant's chain
#[event]
pub struct PopEntryRecorded {
    pub grant: Pubkey,
    pub claimer: Pubkey,
    pub version: u8,
    pub prev_hash: [u8; 32],
    pub stream_prev_hash: [u8; 32],
    pub audit_hash: [u8; 32],
    pub entry_hash: [u8; 32],
    pub period_index: u64,
    pub issued_at: i64,
}

/// Emitted when a grant is closed and its vault refunded
#[event]
pub struct GrantClosed {
    pub grant: Pubkey,
    pub authority: Pubkey,
    pub refunded: u64,
    pub timestamp: i64,
}

/// Emitted when a grant is paused or resumed
#[event]
pub struct GrantPauseChanged {
    pub grant: Pubkey,
    pub paused: bool,
    pub timestamp: i64,
}

/// Emitted when the allowlist root changes
#[event]
pub struct AllowlistRootUpdated {
    pub grant: Pubkey,
    pub merkle_root: [u8; 32],
    pub timestamp: i64,
}

/// Emitted when an authority sets or rotates its PoP signer
#[event]
pub struct PopConfigUpdated {
    pub authority: Pubkey,
    pub signer_pubkey: Pubkey,
    pub timestamp: i64,
}
