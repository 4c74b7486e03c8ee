//! Account ledger for the ELMAS node
//!
//! Owns per-user TL and ELMAS balances, the referral link and the daily ad
//! counter. Nothing else writes `user:` records.

pub mod account;
pub mod codec;
pub mod errors;
pub mod ledger;
pub mod txn;

pub use account::{Balances, UserAccount};
pub use errors::{LedgerError, LedgerResult};
pub use ledger::{AccountLedger, Conversion, ReferralBinding, MAX_TXN_ATTEMPTS};
pub use txn::LedgerTxn;
