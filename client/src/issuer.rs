//! Organizer-side setup and administration of grants

use std::sync::Arc;

use anchor_spl::associated_token::spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use anchor_spl::token::{spl_token, Mint};
use grant_program::errors::GrantError;
use grant_program::instructions::create_grant::validate_grant_params;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use tracing::info;

use crate::config::BootstrapPolicy;
use crate::error::ClaimError;
use crate::instructions::{self, GrantTerms};
use crate::ledger::{with_timeout, LedgerRpc};
use crate::pda::{associated_token_address, AddressDeriver, GrantCoordinates};
use crate::period::unix_now;
use crate::submit::TransactionSubmitter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSetup {
    pub mint: Pubkey,
    /// Issuer's associated token account holding the initial supply
    pub token_account: Pubkey,
    pub supply: u64,
    pub signature: Signature,
}

#[derive(Debug, Clone)]
pub struct GrantParams {
    pub grant_id: u64,
    pub terms: GrantTerms,
    /// Defaults to the bootstrap policy's amount. An explicit amount must
    /// cover `amount_per_period * safety_multiplier`.
    pub fund_amount: Option<u64>,
    /// Installs or rotates the authority's PoP signer in the same transaction
    pub pop_signer: Option<Pubkey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantSetup {
    pub coordinates: GrantCoordinates,
    pub grant: Pubkey,
    pub vault: Pubkey,
    pub funded: u64,
    pub signature: Signature,
}

pub struct GrantIssuer {
    ledger: Arc<dyn LedgerRpc>,
    deriver: AddressDeriver,
    bootstrap: BootstrapPolicy,
    submitter: TransactionSubmitter,
}

impl GrantIssuer {
    pub fn new(
        ledger: Arc<dyn LedgerRpc>,
        deriver: AddressDeriver,
        bootstrap: BootstrapPolicy,
        submitter: TransactionSubmitter,
    ) -> Self {
        Self {
            ledger,
            deriver,
            bootstrap,
            submitter,
        }
    }

    pub fn bootstrap_amount(&self, amount_per_period: u64) -> Result<u64, ClaimError> {
        if amount_per_period == 0 {
            return Err(ClaimError::InvalidAmount(
                "amount per period must be positive".to_string(),
            ));
        }
        self.bootstrap
            .bootstrap_amount(amount_per_period)
            .ok_or_else(|| ClaimError::InvalidAmount("bootstrap supply overflows u64".to_string()))
    }

    /// Smallest vault funding accepted at creation.
    pub fn minimum_funding(&self, amount_per_period: u64) -> Result<u64, ClaimError> {
        amount_per_period
            .checked_mul(self.bootstrap.safety_multiplier.max(1))
            .ok_or_else(|| ClaimError::InvalidAmount("minimum funding overflows u64".to_string()))
    }

    /// Create a mint owned by `payer`, its token account, and mint enough
    /// supply to fund the grant under the bootstrap policy.
    pub async fn create_token(
        &self,
        payer: &Keypair,
        mint: &Keypair,
        decimals: u8,
        amount_per_period: u64,
    ) -> Result<TokenSetup, ClaimError> {
        let supply = self.bootstrap_amount(amount_per_period)?;
        let rent = with_timeout(
            "rent lookup",
            self.submitter.policy().rpc_timeout(),
            self.ledger.minimum_balance_for_rent_exemption(Mint::LEN),
        )
        .await?;

        let payer_key = payer.pubkey();
        let mint_key = mint.pubkey();
        let token_account = associated_token_address(&payer_key, &mint_key);
        let ixs = vec![
            system_instruction::create_account(
                &payer_key,
                &mint_key,
                rent,
                Mint::LEN as u64,
                &spl_token::ID,
            ),
            spl_token::instruction::initialize_mint2(
                &spl_token::ID,
                &mint_key,
                &payer_key,
                None,
                decimals,
            )
            .map_err(token_error)?,
            create_associated_token_account_idempotent(
                &payer_key,
                &payer_key,
                &mint_key,
                &spl_token::ID,
            ),
            spl_token::instruction::mint_to(
                &spl_token::ID,
                &mint_key,
                &token_account,
                &payer_key,
                &[],
                supply,
            )
            .map_err(token_error)?,
        ];

        let signature = self.execute(&[payer, mint], ixs, mint_key).await?;
        info!(mint = %mint_key, supply, %signature, "funding token created");
        Ok(TokenSetup {
            mint: mint_key,
            token_account,
            supply,
            signature,
        })
    }

    /// Create the grant and fund its vault in one atomic transaction.
    pub async fn create_grant(
        &self,
        authority: &Keypair,
        mint: Pubkey,
        params: &GrantParams,
    ) -> Result<GrantSetup, ClaimError> {
        let terms = &params.terms;
        validate_grant_params(
            terms.amount_per_period,
            terms.period_seconds,
            terms.start_ts,
            terms.expires_at,
            unix_now(),
        )
        .map_err(|err| terms_error(err, terms))?;
        let funded = match params.fund_amount {
            Some(amount) => {
                let minimum = self.minimum_funding(terms.amount_per_period)?;
                if amount < minimum {
                    return Err(ClaimError::InvalidAmount(format!(
                        "funding {amount} is below the minimum of {minimum}"
                    )));
                }
                amount
            }
            None => self.bootstrap_amount(terms.amount_per_period)?,
        };

        let coordinates = GrantCoordinates {
            authority: authority.pubkey(),
            mint,
            grant_id: params.grant_id,
        };
        let (grant, _) = self.deriver.grant_at(&coordinates)?;
        let (vault, _) = self.deriver.vault(&grant)?;

        let mut ixs = Vec::with_capacity(3);
        if let Some(signer) = params.pop_signer {
            ixs.push(instructions::upsert_pop_config(
                &self.deriver,
                &coordinates.authority,
                signer,
            )?);
        }
        ixs.push(instructions::create_grant(&self.deriver, &coordinates, terms)?);
        ixs.push(instructions::fund_grant(
            &self.deriver,
            &coordinates,
            &coordinates.authority,
            funded,
        )?);

        let signature = self.execute(&[authority], ixs, grant).await?;
        info!(%grant, %vault, funded, %signature, "grant created");
        Ok(GrantSetup {
            coordinates,
            grant,
            vault,
            funded,
            signature,
        })
    }

    pub async fn fund(
        &self,
        funder: &Keypair,
        coordinates: &GrantCoordinates,
        amount: u64,
    ) -> Result<Signature, ClaimError> {
        if amount == 0 {
            return Err(ClaimError::InvalidAmount("funding amount must be positive".to_string()));
        }
        let ix = instructions::fund_grant(&self.deriver, coordinates, &funder.pubkey(), amount)?;
        let (vault, _) = self.deriver.vault(&self.deriver.grant_at(coordinates)?.0)?;
        self.execute(&[funder], vec![ix], vault).await
    }

    pub async fn set_paused(
        &self,
        authority: &Keypair,
        coordinates: &GrantCoordinates,
        paused: bool,
    ) -> Result<Signature, ClaimError> {
        let ix = instructions::set_paused(&self.deriver, coordinates, paused)?;
        let grant = self.deriver.grant_at(coordinates)?.0;
        self.execute(&[authority], vec![ix], grant).await
    }

    pub async fn set_allowlist_root(
        &self,
        authority: &Keypair,
        coordinates: &GrantCoordinates,
        merkle_root: [u8; 32],
    ) -> Result<Signature, ClaimError> {
        let ix = instructions::set_allowlist_root(&self.deriver, coordinates, merkle_root)?;
        let grant = self.deriver.grant_at(coordinates)?.0;
        self.execute(&[authority], vec![ix], grant).await
    }

    pub async fn upsert_pop_config(
        &self,
        authority: &Keypair,
        signer_pubkey: Pubkey,
    ) -> Result<Signature, ClaimError> {
        let ix = instructions::upsert_pop_config(&self.deriver, &authority.pubkey(), signer_pubkey)?;
        let pop_config = self.deriver.pop_config(&authority.pubkey())?.0;
        self.execute(&[authority], vec![ix], pop_config).await
    }

    /// Refund the vault to the authority's token account and close the grant.
    pub async fn close_grant(
        &self,
        authority: &Keypair,
        coordinates: &GrantCoordinates,
    ) -> Result<Signature, ClaimError> {
        let refund_account = associated_token_address(&coordinates.authority, &coordinates.mint);
        let ixs = vec![
            create_associated_token_account_idempotent(
                &coordinates.authority,
                &coordinates.authority,
                &coordinates.mint,
                &spl_token::ID,
            ),
            instructions::close_grant(&self.deriver, coordinates)?,
        ];
        self.execute(&[authority], ixs, refund_account).await
    }

    /// First signer pays fees.
    async fn execute(
        &self,
        signers: &[&Keypair],
        ixs: Vec<Instruction>,
        watch_account: Pubkey,
    ) -> Result<Signature, ClaimError> {
        let payer = signers
            .first()
            .map(|keypair| keypair.pubkey())
            .ok_or_else(|| ClaimError::SignerRejected("no signer supplied".to_string()))?;
        let (blockhash, last_valid_block_height) = with_timeout(
            "blockhash lookup",
            self.submitter.policy().rpc_timeout(),
            self.ledger.latest_blockhash(),
        )
        .await?;

        let mut transaction = Transaction::new_with_payer(&ixs, Some(&payer));
        transaction
            .try_sign(signers, blockhash)
            .map_err(|err| ClaimError::SignerRejected(err.to_string()))?;
        let outcome = self
            .submitter
            .submit(&transaction, last_valid_block_height, watch_account)
            .await?;
        Ok(outcome.signature)
    }
}

fn terms_error(err: GrantError, terms: &GrantTerms) -> ClaimError {
    match err {
        GrantError::InvalidAmount => {
            ClaimError::InvalidAmount("amount per period must be positive".to_string())
        }
        GrantError::InvalidPeriod => ClaimError::InvalidPeriod {
            period_seconds: terms.period_seconds,
        },
        other => ClaimError::InvalidGrantTerms(other.to_string()),
    }
}

fn token_error(err: impl std::fmt::Display) -> ClaimError {
    ClaimError::TokenInstruction(err.to_string())
}
