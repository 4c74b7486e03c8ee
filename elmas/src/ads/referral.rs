//! Referral fan-out
//!
//! Runs inside the settlement transaction: the referrer's credit is staged in
//! the same [`LedgerTxn`] that seals the session, so it commits exactly when
//! the payout does and a replayed claim can never reach it again.

use tracing::debug;

use lib_ledger::{LedgerResult, LedgerTxn};
use lib_storage::StorageBackend;
use lib_types::{Bps, Reward, UserId, MAX_BPS};

use super::types::ReferralCredit;

/// Default referrer share: 10%
pub const DEFAULT_REFERRAL_SHARE_BPS: Bps = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferralPolicy {
    share_bps: Bps,
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        Self {
            share_bps: DEFAULT_REFERRAL_SHARE_BPS,
        }
    }
}

impl ReferralPolicy {
    /// Shares above 100% are capped at 100%
    pub fn new(share_bps: Bps) -> Self {
        Self {
            share_bps: share_bps.min(MAX_BPS),
        }
    }

    pub fn share_bps(&self) -> Bps {
        self.share_bps
    }

    /// Referrer's cut of `reward`, rounded down per component
    pub fn share_of(&self, reward: Reward) -> Reward {
        reward.apply_bps(self.share_bps)
    }

    /// Stage the referrer credit for a settlement of `reward` by `user_id`.
    ///
    /// Returns `None` when there is no referrer or the share rounds to zero.
    pub async fn fan_out<B: StorageBackend + ?Sized>(
        &self,
        txn: &mut LedgerTxn<'_, B>,
        user_id: UserId,
        referred_by: Option<UserId>,
        reward: Reward,
    ) -> LedgerResult<Option<ReferralCredit>> {
        let referrer = match referred_by {
            Some(referrer) if referrer != user_id => referrer,
            _ => return Ok(None),
        };

        let amount = self.share_of(reward);
        if amount.is_zero() {
            return Ok(None);
        }

        txn.account(referrer).await?.credit(amount)?;
        debug!(user = %user_id, referrer = %referrer, currency = %amount.currency, token = %amount.token, "referral share staged");
        Ok(Some(ReferralCredit { referrer, amount }))
    }
}
