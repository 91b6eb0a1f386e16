//! Merkle allowlist with sorted-pair hashing
//!
//! Leaves are `sha256("we-ne:allowlist" || claimer)`. Each parent is the hash
//! of its two children in ascending byte order, so proofs carry no
//! left/right flags. Off-chain tree builders must use the same rule.

use crate::state::HASH_SIZE;
use anchor_lang::prelude::*;
use solana_sha256_hasher::hashv;

const ALLOWLIST_LEAF_DOMAIN: &[u8] = b"we-ne:allowlist";

/// Longest proof accepted on-ledger (trees of up to 2^32 members)
pub const MAX_PROOF_LEN: usize = 32;

pub fn allowlist_leaf(claimer: &Pubkey) -> [u8; HASH_SIZE] {
    hashv(&[ALLOWLIST_LEAF_DOMAIN, claimer.as_ref()]).to_bytes()
}

pub fn hash_pair(a: &[u8; HASH_SIZE], b: &[u8; HASH_SIZE]) -> [u8; HASH_SIZE] {
    let (left, right) = if a <= b { (a, b) } else { (b, a) };
    hashv(&[left.as_ref(), right.as_ref()]).to_bytes()
}

pub fn verify_merkle_sorted(
    root: &[u8; HASH_SIZE],
    leaf: [u8; HASH_SIZE],
    proof: &[[u8; HASH_SIZE]],
) -> bool {
    let computed = proof
        .iter()
        .fold(leaf, |node, sibling| hash_pair(&node, sibling));
    &computed == root
}
