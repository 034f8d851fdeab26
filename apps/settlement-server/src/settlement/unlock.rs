// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Paid chapter and content unlocks.
//!
//! Custodial unlocks are signed and settled in one call. Unlocks paid from
//! an external wallet take two: the first returns the unsigned message and
//! keeps it as a quote, the second takes the wallet's signature over that
//! exact message, submits it and records the unlock.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use super::{SettlementError, SettlementResult, SettlementService};
use crate::chain::{parse_address, Beneficiary, CurrencySpec, PaymentLeg, UnsignedTransaction};
use crate::models::{Currency, PaymentType, WHOLE_CONTENT};
use crate::pricing::quote_amount;
use crate::storage::{
    CatalogRepository, PaymentRecord, PendingRecord, UnlockRecord, UnlockRepository,
};
use crate::vault::load_signer;

const ACTION: &str = "unlock";

/// Split weights, out of 100.
const TREASURY_SHARE: u64 = 20;
const OPERATIONS_SHARE: u64 = 5;
const BURN_SHARE: u64 = 5;
const AUTHOR_SHARE: u64 = 70;

/// How long an unsigned external payment is kept. Outlives the blockhash.
fn quote_ttl() -> Duration {
    Duration::minutes(5)
}

#[derive(Debug, Clone)]
pub struct UnlockRequest {
    pub user_id: String,
    pub content_id: String,
    pub chapter_id: String,
    pub payment_type: PaymentType,
    pub currency: Currency,
    /// Payer wallet for the non-custodial path; the caller signs
    pub external_payer: Option<String>,
}

/// Signature from an external wallet over a quoted unlock message.
#[derive(Debug, Clone)]
pub struct SignedUnlockRequest {
    pub user_id: String,
    pub content_id: String,
    pub chapter_id: String,
    pub payment_type: PaymentType,
    /// Base58 payer signature
    pub signature: String,
}

/// Unsigned payment handed back to an external signer.
#[derive(Debug, Clone)]
pub struct PendingSignature {
    pub message_base64: String,
    pub payer: Pubkey,
    pub amount: u64,
    pub decimals: u8,
    pub legs: Vec<PaymentLeg>,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone)]
pub enum UnlockOutcome {
    /// An active grant already covers the request; nothing was charged
    AlreadyUnlocked(UnlockRecord),
    Settled {
        payment: PaymentRecord,
        unlock: UnlockRecord,
    },
    AwaitingSignature(PendingSignature),
}

/// What an unlock payment buys, fixed when the payment is built.
#[derive(Debug, Clone)]
struct UnlockTerms {
    user_id: String,
    content_id: String,
    chapter_ref: String,
    payment_type: PaymentType,
    currency: Currency,
    decimals: u8,
    amount: u64,
    payer_address: String,
}

impl UnlockTerms {
    fn records(
        &self,
        signature: &str,
        now: DateTime<Utc>,
        period: Duration,
    ) -> (PaymentRecord, UnlockRecord) {
        let payment = PaymentRecord {
            signature: signature.to_string(),
            payer_address: self.payer_address.clone(),
            user_id: self.user_id.clone(),
            content_id: self.content_id.clone(),
            chapter_ref: self.chapter_ref.clone(),
            amount: self.amount,
            currency: self.currency,
            decimals: self.decimals,
            payment_type: self.payment_type,
            created_at: now,
        };
        let unlock = UnlockRecord {
            user_id: self.user_id.clone(),
            content_id: self.content_id.clone(),
            chapter_ref: self.chapter_ref.clone(),
            payment_type: self.payment_type,
            signature: signature.to_string(),
            unlocked_at: now,
            expires_at: self.payment_type.is_time_limited().then(|| now + period),
        };
        (payment, unlock)
    }

    fn key(&self) -> QuoteKey {
        (
            self.user_id.clone(),
            self.content_id.clone(),
            self.chapter_ref.clone(),
        )
    }
}

type QuoteKey = (String, String, String);

struct ExternalQuote {
    terms: UnlockTerms,
    payer: Pubkey,
    unsigned: UnsignedTransaction,
    quoted_at: DateTime<Utc>,
}

/// Unsigned external payments awaiting a wallet signature, one per
/// (user, content, chapter_ref). A newer quote replaces an older one.
#[derive(Default)]
pub(super) struct ExternalQuotes {
    quotes: Mutex<HashMap<QuoteKey, ExternalQuote>>,
}

impl ExternalQuotes {
    fn insert(&self, quote: ExternalQuote) {
        let mut quotes = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = quote.quoted_at - quote_ttl();
        quotes.retain(|_, q| q.quoted_at > cutoff);
        quotes.insert(quote.terms.key(), quote);
    }

    /// Take the quote for `key` if `accept` approves it; otherwise leave it.
    fn take_if(
        &self,
        key: &QuoteKey,
        now: DateTime<Utc>,
        accept: impl FnOnce(&ExternalQuote) -> SettlementResult<()>,
    ) -> SettlementResult<ExternalQuote> {
        let mut quotes = self.quotes.lock().unwrap_or_else(|e| e.into_inner());
        let quote = quotes
            .get(key)
            .filter(|q| now - q.quoted_at <= quote_ttl())
            .ok_or_else(|| SettlementError::NotFound("pending unlock payment".to_string()))?;
        accept(quote)?;
        quotes
            .remove(key)
            .ok_or_else(|| SettlementError::NotFound("pending unlock payment".to_string()))
    }
}

/// Beneficiaries of an unlock payment. The author comes last and absorbs
/// the rounding residual.
pub fn unlock_beneficiaries(
    treasury: Pubkey,
    operations: Pubkey,
    author: Pubkey,
    currency: Currency,
) -> Vec<Beneficiary> {
    if currency.is_burnable() {
        vec![
            Beneficiary::account(treasury, TREASURY_SHARE),
            Beneficiary::account(operations, OPERATIONS_SHARE),
            Beneficiary::burn(BURN_SHARE),
            Beneficiary::account(author, AUTHOR_SHARE),
        ]
    } else {
        vec![
            Beneficiary::account(treasury, TREASURY_SHARE + BURN_SHARE),
            Beneficiary::account(operations, OPERATIONS_SHARE),
            Beneficiary::account(author, AUTHOR_SHARE),
        ]
    }
}

/// Chapter reference an unlock is stored under.
fn chapter_ref(payment_type: PaymentType, chapter_id: &str) -> String {
    if payment_type.is_time_limited() {
        WHOLE_CONTENT.to_string()
    } else {
        chapter_id.to_string()
    }
}

impl SettlementService {
    /// Active unlock covering a chapter, if any.
    pub fn access(
        &self,
        user_id: &str,
        content_id: &str,
        chapter_id: &str,
    ) -> SettlementResult<Option<UnlockRecord>> {
        Ok(UnlockRepository::new(&self.ledger).active_unlock(
            user_id,
            content_id,
            chapter_id,
            Utc::now(),
        )?)
    }

    /// Pay for and record an unlock.
    pub async fn unlock(&self, request: UnlockRequest) -> SettlementResult<UnlockOutcome> {
        let _guard = self.begin(&request.user_id, ACTION)?;
        self.settle_open(&request.user_id, ACTION).await?;

        let catalog = CatalogRepository::new(&self.ledger);
        let content = catalog
            .get_content(&request.content_id)?
            .ok_or_else(|| SettlementError::NotFound(format!("content {}", request.content_id)))?;
        let chapter = catalog
            .get_chapter(&request.content_id, &request.chapter_id)?
            .ok_or_else(|| SettlementError::NotFound(format!("chapter {}", request.chapter_id)))?;
        if !chapter.lock_policy.accepts(request.payment_type) {
            return Err(SettlementError::PaymentTypeMismatch {
                payment_type: request.payment_type,
            });
        }
        let author = parse_address(&content.author_address).map_err(|_| {
            SettlementError::Validation(format!(
                "content {} has an invalid author address",
                content.content_id
            ))
        })?;

        let chapter_ref = chapter_ref(request.payment_type, &request.chapter_id);
        let unlocks = UnlockRepository::new(&self.ledger);
        if let Some(existing) =
            unlocks.active_unlock(&request.user_id, &request.content_id, &chapter_ref, Utc::now())?
        {
            return Ok(UnlockOutcome::AlreadyUnlocked(existing));
        }

        let spec = self.tokens.spec(request.currency);
        let amount = quote_amount(
            self.prices.as_ref(),
            &spec,
            self.config.prices.for_type(request.payment_type),
        )
        .await?;

        let (payer, account) = match &request.external_payer {
            Some(raw) => {
                let address = parse_address(raw).map_err(|_| {
                    SettlementError::Validation(format!("invalid payer address: {raw}"))
                })?;
                (address, None)
            }
            None => {
                let account = self.custodial_account(&request.user_id)?;
                (parse_address(&account.chain_address)?, Some(account))
            }
        };

        self.check_payer_funds(&payer, &spec, amount).await?;

        let beneficiaries = unlock_beneficiaries(
            self.treasury_address(),
            self.wallets.operations,
            author,
            request.currency,
        );
        let unsigned = self
            .builder
            .build(&payer, &beneficiaries, amount, &spec)
            .await?;

        let terms = UnlockTerms {
            user_id: request.user_id.clone(),
            content_id: request.content_id.clone(),
            chapter_ref: chapter_ref.clone(),
            payment_type: request.payment_type,
            currency: request.currency,
            decimals: spec.decimals,
            amount,
            payer_address: payer.to_string(),
        };

        let Some(account) = account else {
            tracing::info!(
                user_id = %request.user_id,
                content_id = %request.content_id,
                payer = %payer,
                amount,
                "Unlock awaiting external signature"
            );
            let pending = PendingSignature {
                message_base64: unsigned.message_base64(),
                payer,
                amount,
                decimals: spec.decimals,
                legs: unsigned.legs.clone(),
                last_valid_block_height: unsigned.last_valid_block_height,
            };
            self.quotes.insert(ExternalQuote {
                terms,
                payer,
                unsigned,
                quoted_at: Utc::now(),
            });
            return Ok(UnlockOutcome::AwaitingSignature(pending));
        };

        let signer = load_signer(&self.vault, &account)?;

        if let Some(existing) =
            unlocks.active_unlock(&request.user_id, &request.content_id, &chapter_ref, Utc::now())?
        {
            return Ok(UnlockOutcome::AlreadyUnlocked(existing));
        }

        let period = self.config.unlock_period;
        let pending = |signature: &str| {
            let (payment, unlock) = terms.records(signature, Utc::now(), period);
            PendingRecord::Unlock { payment, unlock }
        };
        let signature = self.sign_and_send(unsigned, &signer, pending).await?;
        self.record_unlock(&terms, signature)
    }

    /// Submit an externally signed unlock payment quoted by [`Self::unlock`].
    ///
    /// The signature must verify against the quoted message, so the legs
    /// the wallet signed are exactly the legs that were returned.
    pub async fn submit_signed_unlock(
        &self,
        request: SignedUnlockRequest,
    ) -> SettlementResult<UnlockOutcome> {
        let _guard = self.begin(&request.user_id, ACTION)?;

        let signature: Signature = request.signature.trim().parse().map_err(|_| {
            SettlementError::Validation("signature is not a valid base58 signature".to_string())
        })?;
        let key = (
            request.user_id.clone(),
            request.content_id.clone(),
            chapter_ref(request.payment_type, &request.chapter_id),
        );
        let quote = self.quotes.take_if(&key, Utc::now(), |quote| {
            let message = quote.unsigned.transaction.message.serialize();
            if signature.verify(quote.payer.as_ref(), &message) {
                Ok(())
            } else {
                Err(SettlementError::Validation(
                    "signature does not match the pending unlock payment".to_string(),
                ))
            }
        })?;
        let terms = quote.terms;

        self.settle_open(&terms.user_id, ACTION).await?;
        if let Some(existing) = UnlockRepository::new(&self.ledger).active_unlock(
            &terms.user_id,
            &terms.content_id,
            &terms.chapter_ref,
            Utc::now(),
        )? {
            return Ok(UnlockOutcome::AlreadyUnlocked(existing));
        }

        let mut transaction = quote.unsigned.transaction;
        let Some(slot) = transaction.signatures.first_mut() else {
            return Err(SettlementError::Validation(
                "quoted transaction has no signature slot".to_string(),
            ));
        };
        *slot = signature;

        let period = self.config.unlock_period;
        let pending = |signature: &str| {
            let (payment, unlock) = terms.records(signature, Utc::now(), period);
            PendingRecord::Unlock { payment, unlock }
        };
        let signature = self
            .send_signed(
                &transaction,
                signature,
                quote.unsigned.last_valid_block_height,
                pending,
            )
            .await?;
        self.record_unlock(&terms, signature)
    }

    /// Write the payment and unlock rows for a confirmed payment.
    fn record_unlock(
        &self,
        terms: &UnlockTerms,
        signature: String,
    ) -> SettlementResult<UnlockOutcome> {
        let (payment, unlock) = terms.records(&signature, Utc::now(), self.config.unlock_period);

        if let Err(err) = UnlockRepository::new(&self.ledger).record(&payment, &unlock) {
            self.park_discrepancy(
                &signature,
                PendingRecord::Unlock {
                    payment: payment.clone(),
                    unlock: unlock.clone(),
                },
                &err,
            );
            return Err(SettlementError::RecordingFailed { signature });
        }

        tracing::info!(
            user_id = %terms.user_id,
            content_id = %terms.content_id,
            chapter_ref = %unlock.chapter_ref,
            signature = %signature,
            amount = terms.amount,
            currency = %terms.currency,
            "Unlock settled"
        );
        Ok(UnlockOutcome::Settled { payment, unlock })
    }

    /// Payer must cover the amount and keep the fee reserve.
    async fn check_payer_funds(
        &self,
        payer: &Pubkey,
        spec: &CurrencySpec,
        amount: u64,
    ) -> SettlementResult<()> {
        let reserve = self.config.fee_reserve_lamports;
        let lamports = self.chain.native_balance(payer).await?;

        if spec.is_native() {
            let required = amount.saturating_add(reserve);
            if lamports < required {
                return Err(SettlementError::InsufficientOnChainBalance {
                    required,
                    available: lamports,
                });
            }
            return Ok(());
        }

        let tokens = self.live_balance(payer, spec).await?;
        if tokens < amount {
            return Err(SettlementError::InsufficientOnChainBalance {
                required: amount,
                available: tokens,
            });
        }
        if lamports < reserve {
            return Err(SettlementError::InsufficientOnChainBalance {
                required: reserve,
                available: lamports,
            });
        }
        Ok(())
    }
}
