//! ELMAS node primitives.
//! Stable, transport-neutral, behavior-light.
//!
//! Rule: balances are integer atomic units. Never floats.

pub mod amount;
pub mod clock;
pub mod primitives;

pub use amount::{Amount, AmountParseError, Bps, Reward, AMOUNT_DECIMALS, ATOMIC_UNITS_PER_COIN, MAX_BPS};
pub use clock::{Clock, ManualClock, SystemClock};
pub use primitives::{AdId, IdParseError, SessionId, UserId};
