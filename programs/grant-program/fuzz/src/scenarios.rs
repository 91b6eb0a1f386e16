//! Scenarios that drive the program's claim logic outside the runtime
//!
//! The simulated ledger applies the same checks in the same order as the
//! `claim_grant` handler, using the program's own helpers, and stands in for
//! the account runtime: receipts are a set keyed like the receipt PDA and
//! the vault is a plain balance. A claim either applies every effect or none.

use anchor_lang::prelude::Pubkey;
use grant_program::errors::GrantError;
use grant_program::instructions::claim_helpers::{
    advance_pop_state, check_claim_timing, check_pop_chain, check_pop_message,
};
use grant_program::state::{Grant, PopState, ZERO_HASH};
use grant_program::utils::pop::{PopEntry, PopMessage};
use std::collections::HashSet;

/// Result of simulating an instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationResult {
    Success,
    Error(String),
    InvariantViolation(String),
}

impl SimulationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SimulationResult::Success)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SimulationResult::Error(_))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, SimulationResult::InvariantViolation(_))
    }

    pub fn error_name(&self) -> Option<&str> {
        match self {
            SimulationResult::Error(name) => Some(name),
            _ => None,
        }
    }
}

impl From<GrantError> for SimulationResult {
    fn from(err: GrantError) -> Self {
        SimulationResult::Error(format!("{:?}", err))
    }
}

/// One grant with its vault, receipts and PoP chain head
#[derive(Debug, Clone)]
pub struct SimulatedLedger {
    pub grant_key: Pubkey,
    pub grant: Grant,
    pub vault_balance: u64,
    pub funded: u64,
    pub receipts: HashSet<([u8; 32], u64)>,
    pub pop_state: PopState,
    /// (claimer, period) of every transfer, in order
    pub payments: Vec<([u8; 32], u64)>,
    pub paid_amounts: Vec<u64>,
    /// (prev_hash, entry_hash) of every accepted PoP entry
    pub chain: Vec<([u8; 32], [u8; 32])>,
}

impl SimulatedLedger {
    pub fn new(grant: Grant, vault_balance: u64) -> Self {
        Self {
            grant_key: Pubkey::new_from_array([0x6Au8; 32]),
            grant,
            vault_balance,
            funded: vault_balance,
            receipts: HashSet::new(),
            pop_state: PopState::default(),
            payments: Vec::new(),
            paid_amounts: Vec::new(),
            chain: Vec::new(),
        }
    }

    /// The proof a well-behaved PoP authority would sign right now.
    pub fn issue_proof(
        &self,
        claimer: &Pubkey,
        period_index: u64,
        now: i64,
        version: u8,
    ) -> Result<PopMessage, GrantError> {
        let (prev_hash, stream_prev_hash) = if self.pop_state.initialized {
            (self.pop_state.last_global_hash, self.pop_state.last_stream_hash)
        } else {
            (ZERO_HASH, ZERO_HASH)
        };
        PopMessage::seal(PopEntry {
            version,
            prev_hash,
            stream_prev_hash,
            audit_hash: if version == 1 { ZERO_HASH } else { [0xA5u8; 32] },
            grant: self.grant_key,
            claimer: *claimer,
            period_index,
            issued_at: now,
        })
    }

    /// Apply a claim with the handler's check order.
    pub fn claim(
        &mut self,
        claimer: &Pubkey,
        period_index: u64,
        proof: &PopMessage,
        now: i64,
    ) -> SimulationResult {
        if self.grant.paused {
            return GrantError::Paused.into();
        }
        if self.grant.allowlist_enabled() {
            return GrantError::AllowlistRequired.into();
        }
        // receipt `init` is resolved before the handler body runs
        if self.receipts.contains(&(claimer.to_bytes(), period_index)) {
            return SimulationResult::Error("ReceiptAlreadyInUse".to_string());
        }

        // Work on a copy so a failure leaves no trace
        let mut pop_state = self.pop_state.clone();
        if let Err(err) = PopMessage::parse(&proof.to_bytes())
            .and_then(|parsed| {
                check_pop_message(&parsed, &self.grant_key, claimer, period_index, now)?;
                check_pop_chain(&pop_state, &self.grant_key, &parsed)?;
                advance_pop_state(&mut pop_state, self.grant_key, &parsed, 255)
            })
            .and_then(|_| check_claim_timing(&self.grant, now, period_index))
        {
            return err.into();
        }

        let amount = self.grant.amount_per_period;
        if self.vault_balance < amount {
            return GrantError::InsufficientFunds.into();
        }

        let prev = self.pop_state.last_global_hash;
        self.vault_balance -= amount;
        self.pop_state = pop_state;
        self.receipts.insert((claimer.to_bytes(), period_index));
        self.payments.push((claimer.to_bytes(), period_index));
        self.paid_amounts.push(amount);
        self.chain.push((prev, proof.entry_hash));

        if self.payments.len() != self.receipts.len() {
            return SimulationResult::InvariantViolation(
                "payment recorded without a matching receipt".to_string(),
            );
        }
        SimulationResult::Success
    }
}

/// Grant with the given schedule and everything else defaulted
pub fn simulated_grant(amount_per_period: u64, period_seconds: i64, start_ts: i64) -> Grant {
    Grant {
        amount_per_period,
        period_seconds,
        start_ts,
        ..Default::default()
    }
}

pub fn claimer_key(index: u8) -> Pubkey {
    Pubkey::new_from_array([index.wrapping_add(1); 32])
}
