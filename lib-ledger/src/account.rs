//! User account record

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lib_types::{Amount, Reward, UserId};

use crate::errors::{LedgerError, LedgerResult};

const REFERRAL_CODE_PREFIX: &str = "ELMAS";
const REFERRAL_CODE_DIGITS: usize = 6;

/// Both balances of one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// TL
    pub spendable_balance: Amount,
    /// ELMAS
    pub reward_token_balance: Amount,
}

/// Persisted account. Created on first touch, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub spendable_balance: Amount,
    pub reward_token_balance: Amount,
    /// Set at most once
    pub referred_by: Option<UserId>,
    pub daily_ad_count: u32,
    pub last_reset_date: NaiveDate,
    pub created_at: u64,
}

impl UserAccount {
    pub fn new(user_id: UserId, today: NaiveDate, now_secs: u64) -> Self {
        Self {
            user_id,
            spendable_balance: Amount::ZERO,
            reward_token_balance: Amount::ZERO,
            referred_by: None,
            daily_ad_count: 0,
            last_reset_date: today,
            created_at: now_secs,
        }
    }

    pub fn balances(&self) -> Balances {
        Balances {
            spendable_balance: self.spendable_balance,
            reward_token_balance: self.reward_token_balance,
        }
    }

    /// `ELMAS` followed by the last six digits of the user id
    pub fn referral_code(&self) -> String {
        let digits = self.user_id.get().unsigned_abs().to_string();
        let tail = &digits[digits.len().saturating_sub(REFERRAL_CODE_DIGITS)..];
        format!("{REFERRAL_CODE_PREFIX}{tail}")
    }

    /// Lazy daily reset. Returns true if the counter was cleared.
    pub fn roll_daily(&mut self, today: NaiveDate) -> bool {
        if self.last_reset_date != today {
            self.daily_ad_count = 0;
            self.last_reset_date = today;
            true
        } else {
            false
        }
    }

    /// Ads counted today, without mutating the record
    pub fn ads_watched_on(&self, today: NaiveDate) -> u32 {
        if self.last_reset_date == today {
            self.daily_ad_count
        } else {
            0
        }
    }

    pub fn credit(&mut self, delta: Reward) -> LedgerResult<()> {
        let currency = self
            .spendable_balance
            .checked_add(delta.currency)
            .ok_or(LedgerError::Overflow)?;
        let token = self
            .reward_token_balance
            .checked_add(delta.token)
            .ok_or(LedgerError::Overflow)?;
        self.spendable_balance = currency;
        self.reward_token_balance = token;
        Ok(())
    }

    /// Both components are checked before either is applied.
    pub fn debit(&mut self, delta: Reward) -> LedgerResult<()> {
        let currency = self
            .spendable_balance
            .checked_sub(delta.currency)
            .ok_or(LedgerError::InsufficientBalance {
                have: self.spendable_balance,
                need: delta.currency,
            })?;
        let token = self
            .reward_token_balance
            .checked_sub(delta.token)
            .ok_or(LedgerError::InsufficientBalance {
                have: self.reward_token_balance,
                need: delta.token,
            })?;
        self.spendable_balance = currency;
        self.reward_token_balance = token;
        Ok(())
    }
}
