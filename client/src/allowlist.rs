//! Off-ledger builder for grant allowlists
//!
//! Produces the root stored with `set_allowlist_root` and the per-claimer
//! proofs passed to `claim_grant_with_proof`. An unpaired node at the end of
//! a layer is carried up unchanged, so its proof has no entry for that level.

use grant_program::state::HASH_SIZE;
use grant_program::utils::allowlist::{
    allowlist_leaf, hash_pair, verify_merkle_sorted, MAX_PROOF_LEN,
};
use solana_sdk::pubkey::Pubkey;

use crate::error::ClaimError;

type Node = [u8; HASH_SIZE];

#[derive(Debug, Clone)]
pub struct AllowlistTree {
    /// layers[0] holds the sorted, deduplicated leaves; the last layer is the root
    layers: Vec<Vec<Node>>,
}

impl AllowlistTree {
    pub fn new<'a>(members: impl IntoIterator<Item = &'a Pubkey>) -> Result<Self, ClaimError> {
        let mut leaves: Vec<Node> = members.into_iter().map(allowlist_leaf).collect();
        leaves.sort_unstable();
        leaves.dedup();
        if leaves.is_empty() {
            return Err(ClaimError::InvalidSeeds("allowlist has no members".to_string()));
        }

        let mut layers = vec![leaves];
        while let Some(layer) = layers.last().filter(|layer| layer.len() > 1) {
            let next = layer
                .chunks(2)
                .map(|pair| match pair.get(1) {
                    Some(right) => hash_pair(&pair[0], right),
                    None => pair[0],
                })
                .collect();
            layers.push(next);
        }

        let tree = Self { layers };
        if tree.depth() > MAX_PROOF_LEN {
            return Err(ClaimError::InvalidSeeds(format!(
                "allowlist depth {} exceeds {MAX_PROOF_LEN}",
                tree.depth()
            )));
        }
        Ok(tree)
    }

    pub fn root(&self) -> Node {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.layers.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn depth(&self) -> usize {
        self.layers.len().saturating_sub(1)
    }

    pub fn contains(&self, claimer: &Pubkey) -> bool {
        self.leaf_position(claimer).is_some()
    }

    fn leaf_position(&self, claimer: &Pubkey) -> Option<usize> {
        let leaf = allowlist_leaf(claimer);
        self.layers.first()?.binary_search(&leaf).ok()
    }

    /// Sibling path from the claimer's leaf to the root.
    pub fn proof(&self, claimer: &Pubkey) -> Result<Vec<Node>, ClaimError> {
        let mut position = self
            .leaf_position(claimer)
            .ok_or(ClaimError::NotInAllowlist { claimer: *claimer })?;

        let mut proof = Vec::with_capacity(self.depth());
        for layer in &self.layers[..self.depth()] {
            let sibling = position ^ 1;
            if let Some(node) = layer.get(sibling) {
                proof.push(*node);
            }
            position /= 2;
        }
        Ok(proof)
    }

    pub fn verify(&self, claimer: &Pubkey, proof: &[Node]) -> bool {
        verify_merkle_sorted(&self.root(), allowlist_leaf(claimer), proof)
    }
}
