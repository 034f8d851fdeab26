// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory chain for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;

use super::client::{ChainClient, ChainError, SignatureState};
use super::types::ASSOCIATED_TOKEN_PROGRAM_ID;

type Hook = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct MockState {
    native: HashMap<Pubkey, u64>,
    token_accounts: HashMap<Pubkey, u64>,
    submitted: Vec<Transaction>,
    submit_attempts: u32,
    submit_failures: VecDeque<ChainError>,
    pending_polls: u32,
    onchain_failure: Option<String>,
    block_height: u64,
    on_confirmation: Option<Hook>,
}

/// Scriptable `ChainClient`.
///
/// Submitted transactions confirm immediately unless told otherwise, and
/// associated token account creations are applied on submit.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_native(&self, address: Pubkey, lamports: u64) {
        self.state.lock().unwrap().native.insert(address, lamports);
    }

    /// Create (or overwrite) a token account holding `amount`.
    pub fn set_token_account(&self, token_account: Pubkey, amount: u64) {
        self.state
            .lock()
            .unwrap()
            .token_accounts
            .insert(token_account, amount);
    }

    pub fn fail_next_submits(&self, count: usize, err: ChainError) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..count {
            state.submit_failures.push_back(err.clone());
        }
    }

    /// Report `Pending` for this many status checks before confirming.
    pub fn set_pending_polls(&self, polls: u32) {
        self.state.lock().unwrap().pending_polls = polls;
    }

    pub fn set_onchain_failure(&self, reason: &str) {
        self.state.lock().unwrap().onchain_failure = Some(reason.to_string());
    }

    /// Run `hook` the next time a status check reports `Confirmed`.
    pub fn on_next_confirmation(&self, hook: impl FnOnce() + Send + 'static) {
        self.state.lock().unwrap().on_confirmation = Some(Box::new(hook));
    }

    pub fn set_block_height(&self, height: u64) {
        self.state.lock().unwrap().block_height = height;
    }

    pub fn submit_attempts(&self) -> u32 {
        self.state.lock().unwrap().submit_attempts
    }

    pub fn submitted(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn latest_blockhash(&self) -> Result<(Hash, u64), ChainError> {
        let height = self.state.lock().unwrap().block_height;
        Ok((Hash::new_from_array([7u8; 32]), height + 150))
    }

    async fn submit_transaction(
        &self,
        transaction: &Transaction,
    ) -> Result<Signature, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.submit_attempts += 1;
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }

        let message = &transaction.message;
        for ix in &message.instructions {
            let program = message.account_keys[ix.program_id_index as usize];
            if program == ASSOCIATED_TOKEN_PROGRAM_ID {
                if let Some(&index) = ix.accounts.get(1) {
                    let ata = message.account_keys[index as usize];
                    state.token_accounts.entry(ata).or_insert(0);
                }
            }
        }

        state.submitted.push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn signature_status(
        &self,
        _signature: &Signature,
    ) -> Result<SignatureState, ChainError> {
        let hook = {
            let mut state = self.state.lock().unwrap();
            if let Some(reason) = &state.onchain_failure {
                return Ok(SignatureState::Failed(reason.clone()));
            }
            if state.pending_polls > 0 {
                state.pending_polls -= 1;
                return Ok(SignatureState::Pending);
            }
            state.on_confirmation.take()
        };
        if let Some(hook) = hook {
            hook();
        }
        Ok(SignatureState::Confirmed)
    }

    async fn block_height(&self) -> Result<u64, ChainError> {
        Ok(self.state.lock().unwrap().block_height)
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError> {
        let state = self.state.lock().unwrap();
        Ok(state.token_accounts.contains_key(address) || state.native.contains_key(address))
    }

    async fn native_balance(&self, address: &Pubkey) -> Result<u64, ChainError> {
        Ok(self.state.lock().unwrap().native.get(address).copied().unwrap_or(0))
    }

    async fn token_account_balance(&self, token_account: &Pubkey) -> Result<u64, ChainError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .token_accounts
            .get(token_account)
            .copied()
            .unwrap_or(0))
    }
}
