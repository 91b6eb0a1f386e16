//! Building a complete, unsigned claim transaction
//!
//! Steps run strictly in order and any failure aborts before a transaction
//! exists: resolve the grant, compute the period, check eligibility, obtain
//! and validate the PoP proof, then assemble the instructions.

use std::sync::Arc;
use std::time::Duration;

use anchor_spl::associated_token::spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use grant_program::state::Grant;
use grant_program::utils::allowlist::{allowlist_leaf, verify_merkle_sorted, MAX_PROOF_LEN};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::Transaction;
use tracing::{debug, info, instrument};

use crate::authority::PopAuthority;
use crate::eligibility::ClaimEligibilityChecker;
use crate::error::ClaimError;
use crate::instructions;
use crate::ledger::{account_exists, fetch_grant, with_timeout, LedgerRpc};
use crate::pda::{AddressDeriver, ClaimAddresses, GrantCoordinates};
use crate::period::{unix_now, PeriodClock};
use crate::pop::{PopProof, PopProofRequest};

#[derive(Debug, Clone)]
pub struct ClaimRequest {
    /// Explicit grant; `None` falls back to the configured default grant
    pub coordinates: Option<GrantCoordinates>,
    pub claimer: Pubkey,
    /// Required when the grant has an allowlist
    pub allowlist_proof: Option<Vec<[u8; 32]>>,
}

impl ClaimRequest {
    pub fn new(claimer: Pubkey) -> Self {
        Self {
            coordinates: None,
            claimer,
            allowlist_proof: None,
        }
    }

    pub fn for_grant(mut self, coordinates: GrantCoordinates) -> Self {
        self.coordinates = Some(coordinates);
        self
    }

    pub fn with_allowlist_proof(mut self, proof: Vec<[u8; 32]>) -> Self {
        self.allowlist_proof = Some(proof);
        self
    }
}

/// An unsigned claim with everything needed to sign, submit and confirm it.
#[derive(Debug, Clone)]
pub struct BuiltClaim {
    pub transaction: Transaction,
    pub coordinates: GrantCoordinates,
    pub addresses: ClaimAddresses,
    pub period_index: u64,
    pub amount: u64,
    pub proof: PopProof,
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
    /// The claimer's token account is created in this transaction
    pub creates_token_account: bool,
}

pub struct ClaimTransactionBuilder {
    ledger: Arc<dyn LedgerRpc>,
    authority: Arc<dyn PopAuthority>,
    deriver: AddressDeriver,
    event_id: String,
    default_grant: Option<GrantCoordinates>,
    rpc_timeout: Duration,
    proof_timeout: Duration,
}

impl ClaimTransactionBuilder {
    pub fn new(
        ledger: Arc<dyn LedgerRpc>,
        authority: Arc<dyn PopAuthority>,
        deriver: AddressDeriver,
        event_id: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            authority,
            deriver,
            event_id: event_id.into(),
            default_grant: None,
            rpc_timeout: Duration::from_secs(30),
            proof_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_default_grant(mut self, coordinates: Option<GrantCoordinates>) -> Self {
        self.default_grant = coordinates;
        self
    }

    pub fn with_timeouts(mut self, rpc: Duration, proof: Duration) -> Self {
        self.rpc_timeout = rpc;
        self.proof_timeout = proof;
        self
    }

    /// Explicit coordinates are never replaced by the default: a missing
    /// explicit grant is an error.
    pub fn resolve_coordinates(
        &self,
        request: &ClaimRequest,
    ) -> Result<GrantCoordinates, ClaimError> {
        request
            .coordinates
            .or(self.default_grant)
            .ok_or(ClaimError::NoGrantConfigured)
    }

    pub async fn load_grant(
        &self,
        coordinates: &GrantCoordinates,
    ) -> Result<(Pubkey, Grant), ClaimError> {
        let (address, _) = self.deriver.grant_at(coordinates)?;
        let grant = with_timeout(
            "grant lookup",
            self.rpc_timeout,
            fetch_grant(self.ledger.as_ref(), &address),
        )
        .await?
        .ok_or(ClaimError::GrantNotFound { grant: address })?;
        Ok((address, grant))
    }

    #[instrument(skip_all, fields(claimer = %request.claimer))]
    pub async fn build(&self, request: &ClaimRequest) -> Result<BuiltClaim, ClaimError> {
        let coordinates = self.resolve_coordinates(request)?;
        let (grant_address, grant) = self.load_grant(&coordinates).await?;

        let now = unix_now();
        let period_index = PeriodClock::for_grant(&grant)?.period_index(now)?;
        debug!(%grant_address, period_index, "resolved claim period");

        let allowlist_proof = self.check_allowlist(&grant, request)?;

        let expected_signer = with_timeout(
            "eligibility check",
            self.rpc_timeout,
            ClaimEligibilityChecker::new(self.ledger.as_ref(), self.deriver).check(
                &grant_address,
                &grant,
                &request.claimer,
                period_index,
            ),
        )
        .await?;

        let proof = self
            .fetch_proof(&grant_address, &request.claimer, period_index)
            .await?;
        proof.verify_signature()?;
        proof.check_binding(
            &expected_signer,
            &grant_address,
            &request.claimer,
            period_index,
            now,
        )?;

        let addresses = self
            .deriver
            .claim_addresses(&coordinates, &request.claimer, period_index)?;
        let creates_token_account = !with_timeout(
            "token account lookup",
            self.rpc_timeout,
            account_exists(self.ledger.as_ref(), &addresses.claimer_token_account),
        )
        .await?;

        let mut ixs: Vec<Instruction> = Vec::with_capacity(3);
        if creates_token_account {
            ixs.push(create_associated_token_account_idempotent(
                &request.claimer,
                &request.claimer,
                &coordinates.mint,
                &anchor_spl::token::ID,
            ));
        }
        ixs.push(proof.verify_instruction()?);
        ixs.push(instructions::claim(
            self.deriver.program_id(),
            coordinates.mint,
            request.claimer,
            &addresses,
            period_index,
            allowlist_proof,
        ));

        let (blockhash, last_valid_block_height) = with_timeout(
            "blockhash lookup",
            self.rpc_timeout,
            self.ledger.latest_blockhash(),
        )
        .await?;
        let message = Message::new_with_blockhash(&ixs, Some(&request.claimer), &blockhash);

        info!(
            %grant_address,
            period_index,
            amount = grant.amount_per_period,
            pop_version = u8::from(proof.version),
            creates_token_account,
            "claim transaction built"
        );

        Ok(BuiltClaim {
            transaction: Transaction::new_unsigned(message),
            coordinates,
            addresses,
            period_index,
            amount: grant.amount_per_period,
            proof,
            blockhash,
            last_valid_block_height,
            creates_token_account,
        })
    }

    async fn fetch_proof(
        &self,
        grant: &Pubkey,
        claimer: &Pubkey,
        period_index: u64,
    ) -> Result<PopProof, ClaimError> {
        let request = PopProofRequest::new(&self.event_id, grant, claimer, period_index);
        let response = tokio::time::timeout(self.proof_timeout, self.authority.request_proof(&request))
            .await
            .map_err(|_| {
                ClaimError::PopProofFetchFailed(format!(
                    "no response within {}ms",
                    self.proof_timeout.as_millis()
                ))
            })??;
        PopProof::from_response(&response)
    }

    fn check_allowlist(
        &self,
        grant: &Grant,
        request: &ClaimRequest,
    ) -> Result<Option<Vec<[u8; 32]>>, ClaimError> {
        if !grant.allowlist_enabled() {
            return Ok(None);
        }
        let not_listed = ClaimError::NotInAllowlist {
            claimer: request.claimer,
        };
        let proof = request.allowlist_proof.clone().ok_or(not_listed)?;
        if proof.len() > MAX_PROOF_LEN
            || !verify_merkle_sorted(&grant.merkle_root, allowlist_leaf(&request.claimer), &proof)
        {
            return Err(ClaimError::NotInAllowlist {
                claimer: request.claimer,
            });
        }
        Ok(Some(proof))
    }
}
