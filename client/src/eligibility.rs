//! Advisory pre-flight checks run before a proof is requested
//!
//! Results may be stale by the time the claim lands; the ledger remains the
//! only authority on whether a claim succeeds.

use grant_program::state::Grant;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::ClaimError;
use crate::ledger::{account_exists, fetch_pop_config, token_balance, LedgerRpc};
use crate::pda::AddressDeriver;
use crate::period::PeriodClock;

pub struct ClaimEligibilityChecker<'a> {
    ledger: &'a dyn LedgerRpc,
    deriver: AddressDeriver,
}

impl<'a> ClaimEligibilityChecker<'a> {
    pub fn new(ledger: &'a dyn LedgerRpc, deriver: AddressDeriver) -> Self {
        Self { ledger, deriver }
    }

    /// PoP signer configured, period not yet paid, vault able to pay.
    /// Returns the configured PoP signer.
    pub async fn check(
        &self,
        grant_address: &Pubkey,
        grant: &Grant,
        claimer: &Pubkey,
        period_index: u64,
    ) -> Result<Pubkey, ClaimError> {
        let (pop_config, _) = self.deriver.pop_config(&grant.authority)?;
        let signer = fetch_pop_config(self.ledger, &pop_config)
            .await?
            .map(|config| config.signer_pubkey)
            .ok_or(ClaimError::PopNotConfigured {
                authority: grant.authority,
            })?;

        let (receipt, _) = self.deriver.receipt(grant_address, claimer, period_index)?;
        if account_exists(self.ledger, &receipt).await? {
            let next_eligible_at =
                PeriodClock::for_grant(grant)?.next_eligible_time(period_index)?;
            return Err(ClaimError::AlreadyClaimedThisPeriod {
                period_index,
                next_eligible_at,
            });
        }

        let balance = token_balance(self.ledger, &grant.vault)
            .await?
            .ok_or(ClaimError::VaultMissing { vault: grant.vault })?;
        if balance < grant.amount_per_period {
            return Err(ClaimError::InsufficientVaultBalance {
                balance,
                required: grant.amount_per_period,
            });
        }

        debug!(%grant_address, %claimer, period_index, balance, "claim is eligible");
        Ok(signer)
    }
}
