//! Deterministic addresses of the grant program's accounts

use grant_program::state::{GRANT_SEED, POP_CONFIG_SEED, POP_STATE_SEED, RECEIPT_SEED, VAULT_SEED};
use solana_sdk::pubkey::{Pubkey, MAX_SEEDS, MAX_SEED_LEN};

use crate::error::ClaimError;

/// (authority, mint, grant_id) names exactly one grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GrantCoordinates {
    pub authority: Pubkey,
    pub mint: Pubkey,
    pub grant_id: u64,
}

/// Every account a claim touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimAddresses {
    pub grant: Pubkey,
    pub vault: Pubkey,
    pub receipt: Pubkey,
    pub pop_state: Pubkey,
    pub pop_config: Pubkey,
    pub claimer_token_account: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressDeriver {
    program_id: Pubkey,
}

impl AddressDeriver {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    pub fn grant(
        &self,
        authority: &Pubkey,
        mint: &Pubkey,
        grant_id: u64,
    ) -> Result<(Pubkey, u8), ClaimError> {
        self.derive(&[
            GRANT_SEED,
            authority.as_ref(),
            mint.as_ref(),
            &grant_id.to_le_bytes(),
        ])
    }

    pub fn grant_at(&self, coordinates: &GrantCoordinates) -> Result<(Pubkey, u8), ClaimError> {
        self.grant(
            &coordinates.authority,
            &coordinates.mint,
            coordinates.grant_id,
        )
    }

    pub fn vault(&self, grant: &Pubkey) -> Result<(Pubkey, u8), ClaimError> {
        self.derive(&[VAULT_SEED, grant.as_ref()])
    }

    pub fn receipt(
        &self,
        grant: &Pubkey,
        claimer: &Pubkey,
        period_index: u64,
    ) -> Result<(Pubkey, u8), ClaimError> {
        self.derive(&[
            RECEIPT_SEED,
            grant.as_ref(),
            claimer.as_ref(),
            &period_index.to_le_bytes(),
        ])
    }

    pub fn pop_config(&self, authority: &Pubkey) -> Result<(Pubkey, u8), ClaimError> {
        self.derive(&[POP_CONFIG_SEED, authority.as_ref()])
    }

    pub fn pop_state(&self, grant: &Pubkey) -> Result<(Pubkey, u8), ClaimError> {
        self.derive(&[POP_STATE_SEED, grant.as_ref()])
    }

    pub fn claim_addresses(
        &self,
        coordinates: &GrantCoordinates,
        claimer: &Pubkey,
        period_index: u64,
    ) -> Result<ClaimAddresses, ClaimError> {
        let (grant, _) = self.grant_at(coordinates)?;
        Ok(ClaimAddresses {
            grant,
            vault: self.vault(&grant)?.0,
            receipt: self.receipt(&grant, claimer, period_index)?.0,
            pop_state: self.pop_state(&grant)?.0,
            pop_config: self.pop_config(&coordinates.authority)?.0,
            claimer_token_account: associated_token_address(claimer, &coordinates.mint),
        })
    }

    /// The bump seed takes one of the `MAX_SEEDS` slots.
    fn derive(&self, seeds: &[&[u8]]) -> Result<(Pubkey, u8), ClaimError> {
        if seeds.len() >= MAX_SEEDS {
            return Err(ClaimError::InvalidSeeds(format!(
                "{} seeds, at most {} allowed",
                seeds.len(),
                MAX_SEEDS - 1
            )));
        }
        if let Some(seed) = seeds.iter().find(|seed| seed.len() > MAX_SEED_LEN) {
            return Err(ClaimError::InvalidSeeds(format!(
                "seed of {} bytes exceeds {}",
                seed.len(),
                MAX_SEED_LEN
            )));
        }
        Pubkey::try_find_program_address(seeds, &self.program_id)
            .ok_or_else(|| ClaimError::InvalidSeeds("no viable bump seed".to_string()))
    }
}

pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    anchor_spl::associated_token::get_associated_token_address(wallet, mint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deriver() -> AddressDeriver {
        AddressDeriver::new(grant_program::ID)
    }

    #[test]
    fn test_grant_address_deterministic() {
        let authority = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        assert_eq!(
            deriver().grant(&authority, &mint, 1).unwrap(),
            deriver().grant(&authority, &mint, 1).unwrap()
        );
    }

    #[test]
    fn test_grant_address_injective_in_each_field() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let m = Pubkey::new_unique();
        let base = deriver().grant(&a, &m, 1).unwrap().0;
        assert_ne!(base, deriver().grant(&b, &m, 1).unwrap().0);
        assert_ne!(base, deriver().grant(&a, &b, 1).unwrap().0);
        assert_ne!(base, deriver().grant(&a, &m, 2).unwrap().0);
        // swapping authority and mint is a different grant
        assert_ne!(base, deriver().grant(&m, &a, 1).unwrap().0);
    }

    #[test]
    fn test_grant_id_is_little_endian() {
        let a = Pubkey::new_unique();
        let m = Pubkey::new_unique();
        let expected = Pubkey::find_program_address(
            &[b"grant", a.as_ref(), m.as_ref(), &[1, 0, 0, 0, 0, 0, 0, 0]],
            &grant_program::ID,
        );
        assert_eq!(deriver().grant(&a, &m, 1).unwrap(), expected);
    }

    #[test]
    fn test_receipt_depends_on_period() {
        let g = Pubkey::new_unique();
        let c = Pubkey::new_unique();
        assert_ne!(
            deriver().receipt(&g, &c, 0).unwrap(),
            deriver().receipt(&g, &c, 1).unwrap()
        );
    }

    #[test]
    fn test_program_id_changes_addresses() {
        let g = Pubkey::new_unique();
        let other = AddressDeriver::new(Pubkey::new_unique());
        assert_ne!(deriver().vault(&g).unwrap(), other.vault(&g).unwrap());
    }

    #[test]
    fn test_invalid_seeds_rejected() {
        let long = [0u8; MAX_SEED_LEN + 1];
        assert!(matches!(
            deriver().derive(&[&long]),
            Err(ClaimError::InvalidSeeds(_))
        ));
        let many: Vec<&[u8]> = vec![&b"x"[..]; MAX_SEEDS];
        assert!(matches!(
            deriver().derive(&many),
            Err(ClaimError::InvalidSeeds(_))
        ));
    }

    #[test]
    fn test_claim_addresses_consistent() {
        let coords = GrantCoordinates {
            authority: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            grant_id: 9,
        };
        let claimer = Pubkey::new_unique();
        let addrs = deriver().claim_addresses(&coords, &claimer, 3).unwrap();
        assert_eq!(addrs.grant, deriver().grant_at(&coords).unwrap().0);
        assert_eq!(addrs.vault, deriver().vault(&addrs.grant).unwrap().0);
        assert_eq!(addrs.pop_config, deriver().pop_config(&coords.authority).unwrap().0);
        assert_eq!(
            addrs.claimer_token_account,
            associated_token_address(&claimer, &coords.mint)
        );
    }
}
