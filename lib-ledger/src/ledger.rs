//! Account ledger
//!
//! The only component that mutates balances. Every update is a
//! read-modify-write guarded by the bytes it read, retried on conflict, so
//! concurrent credits to one user never lose an update even when they run
//! on different workers.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use lib_storage::StorageBackend;
use lib_types::{Amount, Clock, Reward, UserId};

use crate::account::{Balances, UserAccount};
use crate::codec::{decode, user_key, USER_PREFIX};
use crate::errors::{LedgerError, LedgerResult};
use crate::txn::LedgerTxn;

/// Attempts before a contended update gives up
pub const MAX_TXN_ATTEMPTS: u32 = 16;

/// Result of binding a referrer to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferralBinding {
    Bound,
    /// The account already has a referrer, which is kept
    AlreadyBound(UserId),
    SelfReferral,
    UnknownReferrer,
}

/// ELMAS to TL conversion receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conversion {
    pub tokens_spent: Amount,
    pub currency_received: Amount,
    pub balances: Balances,
}

pub struct AccountLedger<B: StorageBackend> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
}

impl<B: StorageBackend> Clone for AccountLedger<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<B: StorageBackend> AccountLedger<B> {
    pub fn new(backend: Arc<B>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start a multi-record transaction at the current time
    pub fn begin(&self) -> LedgerTxn<'_, B> {
        LedgerTxn::new(self.backend.as_ref(), self.clock.today(), self.clock.now_secs())
    }

    /// Read an account without creating it
    pub async fn find(&self, user_id: UserId) -> LedgerResult<Option<UserAccount>> {
        match self.backend.get(&user_key(user_id)).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Upsert-on-read: returns the account, creating it on first touch.
    pub async fn get_or_create(&self, user_id: UserId) -> LedgerResult<UserAccount> {
        let ((), account) = self.update(user_id, |_| Ok(())).await?;
        Ok(account)
    }

    pub async fn balances(&self, user_id: UserId) -> LedgerResult<Balances> {
        Ok(self.get_or_create(user_id).await?.balances())
    }

    /// Add both components of `delta` to the user's balances
    pub async fn credit(&self, user_id: UserId, delta: Reward) -> LedgerResult<Balances> {
        let ((), account) = self.update(user_id, |account| account.credit(delta)).await?;
        debug!(user = %user_id, currency = %delta.currency, token = %delta.token, "credited");
        Ok(account.balances())
    }

    /// Subtract `delta`; fails with `InsufficientBalance` if either balance
    /// would go negative.
    pub async fn debit(&self, user_id: UserId, delta: Reward) -> LedgerResult<Balances> {
        let ((), account) = self.update(user_id, |account| account.debit(delta)).await?;
        debug!(user = %user_id, currency = %delta.currency, token = %delta.token, "debited");
        Ok(account.balances())
    }

    /// Apply `f` to the user's account and persist it, retrying on conflict.
    ///
    /// `f` may run more than once; an error from `f` aborts without writing.
    pub async fn update<T, F>(&self, user_id: UserId, mut f: F) -> LedgerResult<(T, UserAccount)>
    where
        T: Send,
        F: FnMut(&mut UserAccount) -> LedgerResult<T> + Send,
    {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut txn = self.begin();
            let account = txn.account(user_id).await?;
            let out = f(account)?;
            let snapshot = account.clone();

            match txn.commit().await {
                Ok(()) => return Ok((out, snapshot)),
                Err(e) if e.is_conflict() => {
                    debug!(user = %user_id, attempt, "account update conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(user = %user_id, "account update gave up after {} attempts", MAX_TXN_ATTEMPTS);
        Err(LedgerError::Contention(format!("user {user_id}")))
    }

    /// Record who referred `user_id`. The first referrer wins; it is never
    /// overwritten, and must already have an account.
    pub async fn set_referrer(&self, user_id: UserId, referrer: UserId) -> LedgerResult<ReferralBinding> {
        if user_id == referrer {
            return Ok(ReferralBinding::SelfReferral);
        }
        if !self.backend.contains(&user_key(referrer)).await? {
            return Ok(ReferralBinding::UnknownReferrer);
        }

        let (binding, _) = self
            .update(user_id, |account| {
                Ok(match account.referred_by {
                    Some(existing) => ReferralBinding::AlreadyBound(existing),
                    None => {
                        account.referred_by = Some(referrer);
                        ReferralBinding::Bound
                    }
                })
            })
            .await?;

        if binding == ReferralBinding::Bound {
            debug!(user = %user_id, referrer = %referrer, "referrer bound");
        }
        Ok(binding)
    }

    /// Sell `tokens` ELMAS for TL at `price` TL per ELMAS, atomically.
    pub async fn convert_tokens(&self, user_id: UserId, tokens: Amount, price: Amount) -> LedgerResult<Conversion> {
        if tokens.is_zero() {
            return Err(LedgerError::InvalidAmount("conversion amount must be positive".to_string()));
        }
        let currency = tokens.checked_mul_price(price).ok_or(LedgerError::Overflow)?;
        if currency.is_zero() {
            return Err(LedgerError::InvalidAmount(format!(
                "{tokens} ELMAS is worth less than the smallest TL unit"
            )));
        }

        let ((), account) = self
            .update(user_id, |account| {
                account.debit(Reward::new(Amount::ZERO, tokens))?;
                account.credit(Reward::new(currency, Amount::ZERO))
            })
            .await?;

        debug!(user = %user_id, tokens = %tokens, currency = %currency, "converted tokens");
        Ok(Conversion {
            tokens_spent: tokens,
            currency_received: currency,
            balances: account.balances(),
        })
    }

    pub async fn count_accounts(&self) -> LedgerResult<usize> {
        Ok(self
            .backend
            .scan_prefix(USER_PREFIX.as_bytes(), Some(usize::MAX))
            .await?
            .len())
    }
}
