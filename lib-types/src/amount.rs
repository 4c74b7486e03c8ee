//! Fixed-point balance amounts.
//!
//! Both TL and ELMAS balances are stored as integer atomic units with
//! [`AMOUNT_DECIMALS`] decimal places. Percentages are basis points.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decimal places carried by every [`Amount`]
pub const AMOUNT_DECIMALS: u32 = 8;

/// Atomic units in one whole TL / ELMAS
pub const ATOMIC_UNITS_PER_COIN: u64 = 100_000_000;

/// Basis points for percentage calculations (10000 = 100%)
pub type Bps = u16;

/// Maximum basis points (100%)
pub const MAX_BPS: Bps = 10_000;

/// Errors produced when parsing decimal amounts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("amount is empty")]
    Empty,

    #[error("amount is not a non-negative decimal number: {0}")]
    Invalid(String),

    #[error("amount has more than {AMOUNT_DECIMALS} decimal places")]
    TooPrecise,

    #[error("amount overflows the supported range")]
    Overflow,
}

/// Non-negative decimal amount in atomic units
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_atomic(units: u64) -> Self {
        Self(units)
    }

    pub const fn atomic(&self) -> u64 {
        self.0
    }

    /// Whole coins, `None` on overflow
    pub fn from_whole(coins: u64) -> Option<Self> {
        coins.checked_mul(ATOMIC_UNITS_PER_COIN).map(Amount)
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// `floor(self * bps / 10_000)`
    pub fn apply_bps(self, bps: Bps) -> Amount {
        let scaled = (self.0 as u128) * (bps as u128) / (MAX_BPS as u128);
        Amount(scaled as u64)
    }

    /// Multiply by a per-coin price, e.g. ELMAS amount times TL-per-ELMAS.
    ///
    /// Rounds toward zero. `None` on overflow.
    pub fn checked_mul_price(self, price: Amount) -> Option<Amount> {
        let product = (self.0 as u128) * (price.0 as u128) / (ATOMIC_UNITS_PER_COIN as u128);
        u64::try_from(product).ok().map(Amount)
    }

    /// Render with exactly `decimals` places, truncating extra precision.
    pub fn to_fixed(&self, decimals: u32) -> String {
        let decimals = decimals.min(AMOUNT_DECIMALS);
        let whole = self.0 / ATOMIC_UNITS_PER_COIN;
        if decimals == 0 {
            return whole.to_string();
        }
        let frac = (self.0 % ATOMIC_UNITS_PER_COIN) / 10u64.pow(AMOUNT_DECIMALS - decimals);
        format!("{}.{:0width$}", whole, frac, width = decimals as usize)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / ATOMIC_UNITS_PER_COIN;
        let frac = self.0 % ATOMIC_UNITS_PER_COIN;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:08}", frac);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AmountParseError::Empty);
        }

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        let digits_only = |part: &str| part.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !digits_only(whole) || !digits_only(frac) {
            return Err(AmountParseError::Invalid(s.to_string()));
        }
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountParseError::TooPrecise);
        }

        let whole_units: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountParseError::Overflow)?
        };
        let frac_units: u64 = if frac.is_empty() {
            0
        } else {
            let raw: u64 = frac.parse().map_err(|_| AmountParseError::Invalid(s.to_string()))?;
            raw * 10u64.pow(AMOUNT_DECIMALS - frac.len() as u32)
        };

        whole_units
            .checked_mul(ATOMIC_UNITS_PER_COIN)
            .and_then(|v| v.checked_add(frac_units))
            .map(Amount)
            .ok_or(AmountParseError::Overflow)
    }
}

// ============================================================================
// REWARD PAIR
// ============================================================================

/// A (TL, ELMAS) pair. Ad rewards, credits and balances all move both
/// components together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reward {
    /// Spendable TL component
    pub currency: Amount,
    /// ELMAS token component
    pub token: Amount,
}

impl Reward {
    pub const ZERO: Reward = Reward {
        currency: Amount::ZERO,
        token: Amount::ZERO,
    };

    pub const fn new(currency: Amount, token: Amount) -> Self {
        Self { currency, token }
    }

    pub fn is_zero(&self) -> bool {
        self.currency.is_zero() && self.token.is_zero()
    }

    pub fn checked_add(self, other: Reward) -> Option<Reward> {
        Some(Reward {
            currency: self.currency.checked_add(other.currency)?,
            token: self.token.checked_add(other.token)?,
        })
    }

    /// `None` if either component would go negative
    pub fn checked_sub(self, other: Reward) -> Option<Reward> {
        Some(Reward {
            currency: self.currency.checked_sub(other.currency)?,
            token: self.token.checked_sub(other.token)?,
        })
    }

    pub fn apply_bps(self, bps: Bps) -> Reward {
        Reward {
            currency: self.currency.apply_bps(bps),
            token: self.token.apply_bps(bps),
        }
    }
}
