//! End-to-end claim flow against an in-memory ledger that executes the
//! associated-token, ed25519 and grant program instructions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anchor_lang::prelude::AnchorDeserialize;
use solana_sdk::ed25519_program;
use anchor_lang::solana_program::program_option::COption;
use anchor_lang::solana_program::program_pack::Pack;
use anchor_lang::{AccountSerialize, Discriminator};
use anchor_spl::token::spl_token;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use grant_program::instructions::claim_helpers::{
    advance_pop_state, check_claim_timing, check_pop_chain, check_pop_message,
};
use grant_program::state::{ClaimReceipt, Grant, PopConfig, PopState};
use grant_program::utils::allowlist::verify_merkle_sorted;
use grant_program::utils::allowlist::allowlist_leaf;
use grant_program::utils::ed25519::{parse_single_inline, MESSAGE_OFFSET, SIGNATURE_OFFSET};
use grant_program::utils::pop::PopMessage;
use solana_sdk::account::Account;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::Transaction;

use grant_client::authority::{LocalPopAuthority, PopAuthority};
use grant_client::config::{ClientConfig, DefaultGrant, SubmitPolicy};
use grant_client::ledger::{
    fetch_pop_state, fetch_receipt, token_balance, LedgerRpc, SendOptions, SignatureState,
    SimulationOutcome,
};
use grant_client::pda::associated_token_address;
use grant_client::period::unix_now;
use grant_client::pop::{PopProofRequest, PopProofResponse};
use grant_client::{
    AddressDeriver, AllowlistTree, ClaimClient, ClaimError, ClaimRequest, ClaimSigner,
    ClaimTransactionBuilder, GrantCoordinates, PopVersion, TransactionSubmitter,
};

const AMOUNT: u64 = 1_000;
const PERIOD: i64 = 60;
const BLOCK_HEIGHT: u64 = 100;

// ============================================================================
// In-memory ledger
// ============================================================================

struct LedgerState {
    accounts: HashMap<Pubkey, Account>,
    signatures: HashMap<Signature, SignatureState>,
    block_height: u64,
    /// Rate-limit errors returned by the next sends
    failing_sends: u32,
    /// Sends that time out before the node reads the transaction
    timeouts_before_landing: u32,
    /// Sends that land the transaction and then time out
    timeouts_after_landing: u32,
    /// Accept sends without ever executing them
    drop_sends: bool,
    /// Land transactions but never report their status
    hide_status: bool,
    simulation_unavailable: bool,
    /// Answers for the next status queries, ahead of the real state
    scripted_statuses: VecDeque<Result<SignatureState, ClaimError>>,
    sends: u32,
    status_calls: u32,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            signatures: HashMap::new(),
            block_height: BLOCK_HEIGHT,
            failing_sends: 0,
            timeouts_before_landing: 0,
            timeouts_after_landing: 0,
            drop_sends: false,
            hide_status: false,
            simulation_unavailable: false,
            scripted_statuses: VecDeque::new(),
            sends: 0,
            status_calls: 0,
        }
    }
}

#[derive(Default)]
struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    fn put(&self, address: Pubkey, account: Account) {
        self.state.lock().unwrap().accounts.insert(address, account);
    }

    fn remove(&self, address: &Pubkey) {
        self.state.lock().unwrap().accounts.remove(address);
    }

    fn fail_next_sends(&self, count: u32) {
        self.state.lock().unwrap().failing_sends = count;
    }

    fn hide_status(&self) {
        self.state.lock().unwrap().hide_status = true;
    }

    fn with_state(&self, update: impl FnOnce(&mut LedgerState)) {
        update(&mut self.state.lock().unwrap());
    }

    fn sends(&self) -> u32 {
        self.state.lock().unwrap().sends
    }

    fn status_calls(&self) -> u32 {
        self.state.lock().unwrap().status_calls
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, ClaimError> {
        Ok(self.state.lock().unwrap().accounts.get(address).cloned())
    }

    async fn latest_blockhash(&self) -> Result<(Hash, u64), ClaimError> {
        let height = self.state.lock().unwrap().block_height;
        Ok((Hash::new_unique(), height + 150))
    }

    async fn block_height(&self) -> Result<u64, ClaimError> {
        Ok(self.state.lock().unwrap().block_height)
    }

    async fn minimum_balance_for_rent_exemption(&self, _: usize) -> Result<u64, ClaimError> {
        Ok(1)
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<SimulationOutcome, ClaimError> {
        let state = self.state.lock().unwrap();
        if state.simulation_unavailable {
            return Err(ClaimError::Rpc {
                message: "503 Service Unavailable".to_string(),
                transient: true,
            });
        }
        let mut accounts = state.accounts.clone();
        drop(state);
        Ok(match execute(&mut accounts, transaction) {
            Ok(()) => SimulationOutcome {
                err: None,
                logs: vec!["Program log: simulated".to_string()],
                units_consumed: Some(42_000),
            },
            Err(message) => SimulationOutcome {
                err: Some(message.clone()),
                logs: (0..80)
                    .map(|step| format!("Program log: step {step}"))
                    .chain([format!("Program log: {message}")])
                    .collect(),
                units_consumed: Some(1_000),
            },
        })
    }

    async fn send(
        &self,
        transaction: &Transaction,
        _: SendOptions,
    ) -> Result<Signature, ClaimError> {
        let mut state = self.state.lock().unwrap();
        state.sends += 1;
        let signature = transaction.signatures[0];
        let timeout = ClaimError::Timeout { operation: "send" };
        if state.timeouts_before_landing > 0 {
            state.timeouts_before_landing -= 1;
            return Err(timeout);
        }
        if state.timeouts_after_landing > 0 {
            state.timeouts_after_landing -= 1;
            if !state.signatures.contains_key(&signature) {
                land(&mut state, transaction)?;
            }
            return Err(timeout);
        }
        if state.signatures.contains_key(&signature) || state.drop_sends {
            return Ok(signature);
        }
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(ClaimError::Rpc {
                message: "429 Too Many Requests".to_string(),
                transient: true,
            });
        }
        land(&mut state, transaction)?;
        Ok(signature)
    }

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureState, ClaimError> {
        let mut state = self.state.lock().unwrap();
        state.status_calls += 1;
        if let Some(scripted) = state.scripted_statuses.pop_front() {
            return scripted;
        }
        if state.hide_status {
            return Ok(SignatureState::Unknown);
        }
        Ok(state
            .signatures
            .get(signature)
            .cloned()
            .unwrap_or(SignatureState::Unknown))
    }
}

fn land(state: &mut LedgerState, transaction: &Transaction) -> Result<(), ClaimError> {
    let mut accounts = state.accounts.clone();
    execute(&mut accounts, transaction).map_err(|message| ClaimError::SendFailed { message })?;
    state.accounts = accounts;
    state
        .signatures
        .insert(transaction.signatures[0], SignatureState::Confirmed);
    Ok(())
}

/// Apply every instruction of `transaction`; `accounts` is only meaningful
/// when this returns `Ok`.
fn execute(accounts: &mut HashMap<Pubkey, Account>, transaction: &Transaction) -> Result<(), String> {
    transaction
        .verify()
        .map_err(|err| format!("signature verification failed: {err}"))?;
    let now = unix_now();
    let mut verified: Option<(Pubkey, Vec<u8>)> = None;

    for compiled in &transaction.message.instructions {
        let program_id = transaction.message.account_keys[compiled.program_id_index as usize];
        let keys: Vec<Pubkey> = compiled
            .accounts
            .iter()
            .map(|index| transaction.message.account_keys[*index as usize])
            .collect();
        let ix = Instruction {
            program_id,
            accounts: Vec::new(),
            data: compiled.data.clone(),
        };

        if program_id == anchor_spl::associated_token::ID {
            // [payer, ata, wallet, mint, system, token]
            accounts
                .entry(keys[1])
                .or_insert_with(|| token_account(keys[3], keys[2], 0));
        } else if program_id == ed25519_program::ID {
            verified = Some(verify_ed25519(&ix.data)?);
        } else if program_id == grant_program::ID {
            claim(accounts, &keys, &ix.data, verified.take(), now)?;
        } else {
            return Err(format!("unexpected program {program_id}"));
        }
    }
    Ok(())
}

fn verify_ed25519(data: &[u8]) -> Result<(Pubkey, Vec<u8>), String> {
    let (signer, message) = parse_single_inline(data).map_err(|err| err.to_string())?;
    let signature = Signature::try_from(&data[SIGNATURE_OFFSET..MESSAGE_OFFSET])
        .map_err(|err| err.to_string())?;
    if !signature.verify(signer.as_ref(), &message) {
        return Err("ed25519 signature mismatch".to_string());
    }
    Ok((signer, message))
}

/// `claim_grant` / `claim_grant_with_proof` with the program's own checks.
fn claim(
    accounts: &mut HashMap<Pubkey, Account>,
    keys: &[Pubkey],
    data: &[u8],
    verified: Option<(Pubkey, Vec<u8>)>,
    now: i64,
) -> Result<(), String> {
    let (grant_key, vault_key, claimer, ata_key) = (keys[0], keys[2], keys[3], keys[4]);
    let (receipt_key, pop_state_key, pop_config_key) = (keys[5], keys[6], keys[7]);

    let (period_index, proof) =
        if data.starts_with(grant_program::instruction::ClaimGrantWithProof::DISCRIMINATOR) {
            let args =
                grant_program::instruction::ClaimGrantWithProof::deserialize(&mut &data[8..])
                    .map_err(|err| err.to_string())?;
            (args.period_index, Some(args.proof))
        } else if data.starts_with(grant_program::instruction::ClaimGrant::DISCRIMINATOR) {
            let args = grant_program::instruction::ClaimGrant::deserialize(&mut &data[8..])
                .map_err(|err| err.to_string())?;
            (args.period_index, None)
        } else {
            return Err("unknown grant instruction".to_string());
        };

    if accounts.contains_key(&receipt_key) {
        return Err(format!("account {receipt_key} already in use"));
    }
    let grant: Grant = read_anchor(accounts, &grant_key)?;
    if grant.paused {
        return Err("GrantPaused".to_string());
    }
    check_claim_timing(&grant, now, period_index).map_err(|err| err.to_string())?;
    if grant.allowlist_enabled() {
        let proof = proof.ok_or("NotInAllowlist")?;
        if !verify_merkle_sorted(&grant.merkle_root, allowlist_leaf(&claimer), &proof) {
            return Err("NotInAllowlist".to_string());
        }
    }

    let pop_config: PopConfig = read_anchor(accounts, &pop_config_key)?;
    let (signer, message) = verified.ok_or("MissingPopSignatureInstruction")?;
    if signer != pop_config.signer_pubkey {
        return Err("PopSignerMismatch".to_string());
    }
    let message = PopMessage::parse(&message).map_err(|err| err.to_string())?;
    check_pop_message(&message, &grant_key, &claimer, period_index, now)
        .map_err(|err| err.to_string())?;
    let mut pop_state: PopState = if accounts.contains_key(&pop_state_key) {
        read_anchor(accounts, &pop_state_key)?
    } else {
        PopState::default()
    };
    check_pop_chain(&pop_state, &grant_key, &message).map_err(|err| err.to_string())?;

    let vault_balance = token_amount(accounts, &vault_key)?;
    if vault_balance < grant.amount_per_period {
        return Err("insufficient funds".to_string());
    }
    let ata_balance = token_amount(accounts, &ata_key)?;

    advance_pop_state(&mut pop_state, grant_key, &message, 255).map_err(|err| err.to_string())?;
    accounts.insert(pop_state_key, anchor_account(&pop_state));
    accounts.insert(
        vault_key,
        token_account(grant.mint, vault_key, vault_balance - grant.amount_per_period),
    );
    accounts.insert(
        ata_key,
        token_account(grant.mint, claimer, ata_balance + grant.amount_per_period),
    );
    accounts.insert(
        receipt_key,
        anchor_account(&ClaimReceipt {
            grant: grant_key,
            claimer,
            period_index,
            amount: grant.amount_per_period,
            claimed_at: now,
            entry_hash: message.entry_hash,
        }),
    );
    Ok(())
}

fn read_anchor<T: anchor_lang::AccountDeserialize>(
    accounts: &HashMap<Pubkey, Account>,
    address: &Pubkey,
) -> Result<T, String> {
    let account = accounts
        .get(address)
        .ok_or_else(|| format!("AccountNotInitialized: {address}"))?;
    T::try_deserialize(&mut account.data.as_slice()).map_err(|err| err.to_string())
}

fn token_amount(accounts: &HashMap<Pubkey, Account>, address: &Pubkey) -> Result<u64, String> {
    let account = accounts
        .get(address)
        .ok_or_else(|| format!("AccountNotInitialized: {address}"))?;
    spl_token::state::Account::unpack(&account.data)
        .map(|account| account.amount)
        .map_err(|err| err.to_string())
}

fn anchor_account<T: AccountSerialize>(value: &T) -> Account {
    let mut data = Vec::new();
    value.try_serialize(&mut data).unwrap();
    Account {
        lamports: 1_000_000,
        data,
        owner: grant_program::ID,
        executable: false,
        rent_epoch: 0,
    }
}

fn token_account(mint: Pubkey, owner: Pubkey, amount: u64) -> Account {
    let state = spl_token::state::Account {
        mint,
        owner,
        amount,
        delegate: COption::None,
        state: spl_token::state::AccountState::Initialized,
        is_native: COption::None,
        delegated_amount: 0,
        close_authority: COption::None,
    };
    let mut data = vec![0u8; spl_token::state::Account::LEN];
    spl_token::state::Account::pack(state, &mut data).unwrap();
    Account {
        lamports: 2_039_280,
        data,
        owner: spl_token::ID,
        executable: false,
        rent_epoch: 0,
    }
}

// ============================================================================
// PoP authority wrappers
// ============================================================================

struct CountingAuthority {
    inner: LocalPopAuthority,
    calls: AtomicUsize,
}

#[async_trait]
impl PopAuthority for CountingAuthority {
    async fn request_proof(&self, request: &PopProofRequest) -> Result<PopProofResponse, ClaimError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.request_proof(request).await
    }
}

/// Rewrites the version byte of an otherwise valid proof.
struct VersionRewritingAuthority {
    inner: LocalPopAuthority,
    version: u8,
}

#[async_trait]
impl PopAuthority for VersionRewritingAuthority {
    async fn request_proof(&self, request: &PopProofRequest) -> Result<PopProofResponse, ClaimError> {
        let mut response = self.inner.request_proof(request).await?;
        let mut message = BASE64.decode(&response.message_base64).unwrap();
        message[0] = self.version;
        response.message_base64 = BASE64.encode(message);
        Ok(response)
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    ledger: Arc<MockLedger>,
    deriver: AddressDeriver,
    coordinates: GrantCoordinates,
    grant: Pubkey,
    vault: Pubkey,
    pop_signer: Keypair,
    claimer: Keypair,
}

impl Fixture {
    fn new(vault_balance: u64) -> Self {
        let ledger = Arc::new(MockLedger::default());
        let deriver = AddressDeriver::new(grant_program::ID);
        let authority = Pubkey::new_unique();
        let coordinates = GrantCoordinates {
            authority,
            mint: Pubkey::new_unique(),
            grant_id: 7,
        };
        let (grant, bump) = deriver.grant_at(&coordinates).unwrap();
        let (vault, _) = deriver.vault(&grant).unwrap();
        let pop_signer = Keypair::new();

        ledger.put(
            grant,
            anchor_account(&Grant {
                authority,
                mint: coordinates.mint,
                vault,
                grant_id: coordinates.grant_id,
                amount_per_period: AMOUNT,
                period_seconds: PERIOD,
                start_ts: unix_now() - 5,
                expires_at: 0,
                bump,
                ..Grant::default()
            }),
        );
        ledger.put(vault, token_account(coordinates.mint, vault, vault_balance));
        let (pop_config, pop_config_bump) = deriver.pop_config(&authority).unwrap();
        ledger.put(
            pop_config,
            anchor_account(&PopConfig {
                authority,
                signer_pubkey: pop_signer.pubkey(),
                bump: pop_config_bump,
            }),
        );

        Self {
            ledger,
            deriver,
            coordinates,
            grant,
            vault,
            pop_signer,
            claimer: Keypair::new(),
        }
    }

    fn shared_ledger(&self) -> Arc<dyn LedgerRpc> {
        self.ledger.clone()
    }

    fn local_authority(&self, version: PopVersion) -> LocalPopAuthority {
        LocalPopAuthority::new(
            self.pop_signer.insecure_clone(),
            version,
            self.shared_ledger(),
            self.deriver,
        )
    }

    fn counting_authority(&self) -> Arc<CountingAuthority> {
        Arc::new(CountingAuthority {
            inner: self.local_authority(PopVersion::V2),
            calls: AtomicUsize::new(0),
        })
    }

    fn config(&self) -> ClientConfig {
        ClientConfig {
            default_grant: Some(DefaultGrant {
                authority: self.coordinates.authority.to_string(),
                mint: self.coordinates.mint.to_string(),
                grant_id: self.coordinates.grant_id,
            }),
            submit: fast_policy(),
            ..ClientConfig::default()
        }
    }

    fn client(&self, authority: Arc<dyn PopAuthority>) -> ClaimClient {
        ClaimClient::new(&self.config(), self.shared_ledger(), authority).unwrap()
    }

    fn builder(&self, authority: Arc<dyn PopAuthority>) -> ClaimTransactionBuilder {
        ClaimTransactionBuilder::new(self.shared_ledger(), authority, self.deriver, "event")
            .with_default_grant(Some(self.coordinates))
    }

    fn signer(&self) -> ClaimSigner {
        ClaimSigner::in_process(self.claimer.insecure_clone())
    }

    fn request(&self) -> ClaimRequest {
        ClaimRequest::new(self.claimer.pubkey())
    }

    async fn claimer_balance(&self) -> Option<u64> {
        let ata = associated_token_address(&self.claimer.pubkey(), &self.coordinates.mint);
        token_balance(self.ledger.as_ref(), &ata).await.unwrap()
    }

    async fn vault_balance(&self) -> u64 {
        token_balance(self.ledger.as_ref(), &self.vault)
            .await
            .unwrap()
            .unwrap()
    }
}

fn fast_policy() -> SubmitPolicy {
    SubmitPolicy {
        simulate: true,
        max_send_attempts: 4,
        send_backoff_ms: 10,
        confirm_timeout_ms: 2_000,
        confirm_poll_interval_ms: 50,
        fallback_poll_attempts: 3,
        rpc_timeout_ms: 1_000,
        proof_timeout_ms: 1_000,
        signer_timeout_ms: 1_000,
        ..SubmitPolicy::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_first_claim_pays_once_and_records_receipt() {
    let fx = Fixture::new(10 * AMOUNT);
    let client = fx.client(fx.counting_authority());

    let outcome = client.claim(&fx.request(), &fx.signer()).await.unwrap();
    assert_eq!(outcome.grant, fx.grant);
    assert_eq!(outcome.period_index, 0);
    assert_eq!(outcome.amount, AMOUNT);
    assert!(!outcome.already_landed);

    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
    assert_eq!(fx.vault_balance().await, 9 * AMOUNT);

    let receipt = fetch_receipt(fx.ledger.as_ref(), &outcome.receipt)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(receipt.claimer, fx.claimer.pubkey());
    assert_eq!(receipt.amount, AMOUNT);

    let (pop_state, _) = fx.deriver.pop_state(&fx.grant).unwrap();
    let state = fetch_pop_state(fx.ledger.as_ref(), &pop_state)
        .await
        .unwrap()
        .unwrap();
    assert!(state.initialized);
    assert_eq!(state.entries, 1);
    assert_eq!(state.last_global_hash, receipt.entry_hash);

    let status = client.status(None, &fx.claimer.pubkey()).await.unwrap();
    assert!(status.claimed);
    assert_eq!(status.vault_balance, Some(9 * AMOUNT));
}

#[tokio::test(start_paused = true)]
async fn test_second_claim_in_same_period_is_rejected() {
    let fx = Fixture::new(10 * AMOUNT);
    let authority = fx.counting_authority();
    let client = fx.client(authority.clone());

    client.claim(&fx.request(), &fx.signer()).await.unwrap();
    let err = client.claim(&fx.request(), &fx.signer()).await.unwrap_err();
    match err {
        ClaimError::AlreadyClaimedThisPeriod {
            period_index,
            next_eligible_at,
        } => {
            assert_eq!(period_index, 0);
            assert!(next_eligible_at > unix_now());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(authority.calls.load(Ordering::SeqCst), 1);
    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
}

#[tokio::test(start_paused = true)]
async fn test_ledger_rejects_replay_with_fresh_proof() {
    let fx = Fixture::new(10 * AMOUNT);
    let builder = fx.builder(fx.counting_authority());
    let submitter = TransactionSubmitter::new(fx.shared_ledger(), fast_policy());
    let signer = fx.signer();

    // Both pass client-side eligibility before either lands.
    let first = builder.build(&fx.request()).await.unwrap();
    let second = builder.build(&fx.request()).await.unwrap();
    assert_eq!(first.addresses.receipt, second.addresses.receipt);

    let signed = signer
        .sign(first.transaction, fast_policy().signer_timeout())
        .await
        .unwrap();
    submitter
        .submit(&signed, first.last_valid_block_height, first.addresses.receipt)
        .await
        .unwrap();

    let signed = signer
        .sign(second.transaction, fast_policy().signer_timeout())
        .await
        .unwrap();
    let err = submitter
        .submit(&signed, second.last_valid_block_height, second.addresses.receipt)
        .await
        .unwrap_err();
    assert!(matches!(err, ClaimError::SimulationFailed { .. }), "{err:?}");

    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
    assert_eq!(fx.vault_balance().await, 9 * AMOUNT);
}

#[tokio::test(start_paused = true)]
async fn test_empty_vault_fails_before_proof_or_signature() {
    let fx = Fixture::new(0);
    let authority = fx.counting_authority();
    let client = fx.client(authority.clone());

    let err = client.claim(&fx.request(), &fx.signer()).await.unwrap_err();
    assert!(
        matches!(
            err,
            ClaimError::InsufficientVaultBalance {
                balance: 0,
                required: AMOUNT
            }
        ),
        "{err:?}"
    );
    assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
    assert_eq!(fx.ledger.sends(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_pop_version_is_rejected() {
    let fx = Fixture::new(10 * AMOUNT);
    let client = fx.client(Arc::new(VersionRewritingAuthority {
        inner: fx.local_authority(PopVersion::V2),
        version: 3,
    }));

    let err = client.claim(&fx.request(), &fx.signer()).await.unwrap_err();
    assert!(
        matches!(err, ClaimError::UnsupportedPopVersion { version: 3 }),
        "{err:?}"
    );
    assert_eq!(fx.ledger.sends(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_v1_proofs_are_accepted() {
    let fx = Fixture::new(10 * AMOUNT);
    let client = fx.client(Arc::new(fx.local_authority(PopVersion::V1)));

    client.claim(&fx.request(), &fx.signer()).await.unwrap();
    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
}

#[tokio::test(start_paused = true)]
async fn test_resubmitting_landed_transaction_is_idempotent() {
    let fx = Fixture::new(10 * AMOUNT);
    let built = fx
        .builder(fx.counting_authority())
        .build(&fx.request())
        .await
        .unwrap();
    let signed = fx
        .signer()
        .sign(built.transaction, fast_policy().signer_timeout())
        .await
        .unwrap();
    let submitter = TransactionSubmitter::new(fx.shared_ledger(), fast_policy());

    let first = submitter
        .submit(&signed, built.last_valid_block_height, built.addresses.receipt)
        .await
        .unwrap();
    assert!(!first.already_landed);
    assert_eq!(first.units_consumed, Some(42_000));

    let second = submitter
        .submit(&signed, built.last_valid_block_height, built.addresses.receipt)
        .await
        .unwrap();
    assert!(second.already_landed);
    assert_eq!(second.signature, first.signature);
    assert_eq!(second.send_attempts, 0);
    assert_eq!(fx.ledger.sends(), 1);
    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
}

#[tokio::test(start_paused = true)]
async fn test_transient_send_errors_are_retried() {
    let fx = Fixture::new(10 * AMOUNT);
    fx.ledger.fail_next_sends(2);
    let client = fx.client(fx.counting_authority());

    client.claim(&fx.request(), &fx.signer()).await.unwrap();
    assert_eq!(fx.ledger.sends(), 3);
    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
}

#[tokio::test(start_paused = true)]
async fn test_send_gives_up_after_max_attempts() {
    let fx = Fixture::new(10 * AMOUNT);
    fx.ledger.fail_next_sends(10);
    let client = fx.client(fx.counting_authority());

    let err = client.claim(&fx.request(), &fx.signer()).await.unwrap_err();
    assert!(err.is_transient(), "{err:?}");
    assert!(err.is_safe_to_retry());
    assert_eq!(fx.ledger.sends(), fast_policy().max_send_attempts);
    assert_eq!(fx.claimer_balance().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_uncertain_confirmation_resolved_by_receipt() {
    let fx = Fixture::new(10 * AMOUNT);
    fx.ledger.hide_status();
    let client = fx.client(fx.counting_authority());

    let outcome = client.claim(&fx.request(), &fx.signer()).await.unwrap();
    assert_eq!(fx.ledger.sends(), 1);
    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
    assert!(fetch_receipt(fx.ledger.as_ref(), &outcome.receipt)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_missing_pop_config_is_reported() {
    let fx = Fixture::new(10 * AMOUNT);
    let (pop_config, _) = fx.deriver.pop_config(&fx.coordinates.authority).unwrap();
    fx.ledger.remove(&pop_config);
    let authority = fx.counting_authority();
    let client = fx.client(authority.clone());

    let err = client.claim(&fx.request(), &fx.signer()).await.unwrap_err();
    assert!(matches!(err, ClaimError::PopNotConfigured { .. }), "{err:?}");
    assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_missing_explicit_grant_does_not_fall_back_to_default() {
    let fx = Fixture::new(10 * AMOUNT);
    let client = fx.client(fx.counting_authority());
    let missing = GrantCoordinates {
        grant_id: 99,
        ..fx.coordinates
    };

    let err = client
        .claim(&fx.request().for_grant(missing), &fx.signer())
        .await
        .unwrap_err();
    let (expected, _) = fx.deriver.grant_at(&missing).unwrap();
    assert!(
        matches!(err, ClaimError::GrantNotFound { grant } if grant == expected),
        "{err:?}"
    );
    assert_eq!(fx.claimer_balance().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_no_grant_configured() {
    let fx = Fixture::new(10 * AMOUNT);
    let config = ClientConfig {
        submit: fast_policy(),
        ..ClientConfig::default()
    };
    let client = ClaimClient::new(&config, fx.shared_ledger(), fx.counting_authority()).unwrap();

    let err = client.claim(&fx.request(), &fx.signer()).await.unwrap_err();
    assert!(matches!(err, ClaimError::NoGrantConfigured), "{err:?}");
}

#[tokio::test(start_paused = true)]
async fn test_signer_must_be_claimer() {
    let fx = Fixture::new(10 * AMOUNT);
    let authority = fx.counting_authority();
    let client = fx.client(authority.clone());

    let err = client
        .claim(&fx.request(), &ClaimSigner::in_process(Keypair::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ClaimError::SignerMismatch { .. }), "{err:?}");
    assert_eq!(authority.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_allowlisted_grant_requires_membership_proof() {
    let fx = Fixture::new(10 * AMOUNT);
    let members = vec![fx.claimer.pubkey(), Pubkey::new_unique(), Pubkey::new_unique()];
    let tree = AllowlistTree::new(&members).unwrap();

    let mut grant: Grant = read_anchor(&fx.ledger.state.lock().unwrap().accounts, &fx.grant).unwrap();
    grant.merkle_root = tree.root();
    fx.ledger.put(fx.grant, anchor_account(&grant));

    let client = fx.client(fx.counting_authority());
    let err = client.claim(&fx.request(), &fx.signer()).await.unwrap_err();
    assert!(matches!(err, ClaimError::NotInAllowlist { .. }), "{err:?}");

    let request = fx
        .request()
        .with_allowlist_proof(tree.proof(&fx.claimer.pubkey()).unwrap());
    client.claim(&request, &fx.signer()).await.unwrap();
    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
}

/// Build and sign a claim for the fixture's claimer without submitting it.
async fn signed_claim(fx: &Fixture) -> (Transaction, u64, Pubkey) {
    let built = fx
        .builder(fx.counting_authority())
        .build(&fx.request())
        .await
        .unwrap();
    let signed = fx
        .signer()
        .sign(built.transaction, fast_policy().signer_timeout())
        .await
        .unwrap();
    (signed, built.last_valid_block_height, built.addresses.receipt)
}

#[tokio::test(start_paused = true)]
async fn test_send_timeout_after_landing_is_confirmed_not_reported_lost() {
    let fx = Fixture::new(10 * AMOUNT);
    fx.ledger.with_state(|state| state.timeouts_after_landing = 10);
    let client = fx.client(fx.counting_authority());

    let outcome = client.claim(&fx.request(), &fx.signer()).await.unwrap();
    assert_eq!(fx.ledger.sends(), fast_policy().max_send_attempts);
    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
    assert!(fetch_receipt(fx.ledger.as_ref(), &outcome.receipt)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_send_timeout_without_landing_is_uncertain() {
    let fx = Fixture::new(10 * AMOUNT);
    fx.ledger.with_state(|state| state.timeouts_before_landing = 10);
    let client = fx.client(fx.counting_authority());

    let err = client.claim(&fx.request(), &fx.signer()).await.unwrap_err();
    assert!(
        matches!(err, ClaimError::ConfirmationUncertain { .. }),
        "{err:?}"
    );
    assert!(!err.is_safe_to_retry());
    assert_eq!(fx.claimer_balance().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_failure_seen_while_polling_ends_confirmation() {
    let fx = Fixture::new(10 * AMOUNT);
    let (signed, last_valid, receipt) = signed_claim(&fx).await;
    fx.ledger.with_state(|state| {
        state.scripted_statuses = VecDeque::from([
            // initial idempotence check
            Ok(SignatureState::Unknown),
            // primary confirmation gives up
            Err(ClaimError::Rpc {
                message: "503 Service Unavailable".to_string(),
                transient: true,
            }),
            Ok(SignatureState::Failed("custom program error: 0x1".to_string())),
        ]);
    });
    let submitter = TransactionSubmitter::new(fx.shared_ledger(), fast_policy());

    let err = submitter
        .submit(&signed, last_valid, receipt)
        .await
        .unwrap_err();
    assert!(
        matches!(&err, ClaimError::TransactionFailed { message, .. } if message.contains("0x1")),
        "{err:?}"
    );
    assert_eq!(fx.ledger.status_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_blockhash_expiry_reports_expired() {
    let fx = Fixture::new(10 * AMOUNT);
    let (signed, last_valid, receipt) = signed_claim(&fx).await;
    fx.ledger.with_state(|state| {
        state.drop_sends = true;
        state.block_height = last_valid + 1;
    });
    let submitter = TransactionSubmitter::new(fx.shared_ledger(), fast_policy());

    let err = submitter
        .submit(&signed, last_valid, receipt)
        .await
        .unwrap_err();
    assert!(matches!(err, ClaimError::Expired { .. }), "{err:?}");
    assert!(err.is_safe_to_retry());
    assert_eq!(fx.claimer_balance().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_simulation_does_not_block_sending() {
    let fx = Fixture::new(10 * AMOUNT);
    let (signed, last_valid, receipt) = signed_claim(&fx).await;
    fx.ledger
        .with_state(|state| state.simulation_unavailable = true);
    let submitter = TransactionSubmitter::new(fx.shared_ledger(), fast_policy());

    let outcome = submitter.submit(&signed, last_valid, receipt).await.unwrap();
    assert_eq!(outcome.units_consumed, None);
    assert_eq!(outcome.send_attempts, 1);
    assert_eq!(fx.claimer_balance().await, Some(AMOUNT));
}

#[tokio::test(start_paused = true)]
async fn test_simulation_failure_keeps_last_log_lines() {
    let fx = Fixture::new(10 * AMOUNT);
    let mut grant: Grant =
        read_anchor(&fx.ledger.state.lock().unwrap().accounts, &fx.grant).unwrap();
    grant.paused = true;
    fx.ledger.put(fx.grant, anchor_account(&grant));
    let (signed, last_valid, receipt) = signed_claim(&fx).await;
    let submitter = TransactionSubmitter::new(fx.shared_ledger(), fast_policy());

    let err = submitter
        .submit(&signed, last_valid, receipt)
        .await
        .unwrap_err();
    match err {
        ClaimError::SimulationFailed {
            message,
            logs,
            units_consumed,
        } => {
            assert_eq!(message, "GrantPaused");
            assert_eq!(logs.len(), grant_client::submit::SIMULATION_LOG_TAIL);
            assert_eq!(logs.last().unwrap(), "Program log: GrantPaused");
            assert_eq!(logs[0], "Program log: step 31");
            assert_eq!(units_consumed, Some(1_000));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(fx.ledger.sends(), 0);
}
