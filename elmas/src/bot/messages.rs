//! Plain-language rendering of outcomes, shared by the bot and the HTTP API

use std::time::Duration;

use lib_identity::VerifyError;
use lib_ledger::{Balances, Conversion};
use lib_types::{Amount, Reward};

use crate::ads::{AdOffer, ClaimOutcome, RequestOutcome, Settlement, StartOutcome};

fn tl(amount: Amount) -> String {
    format!("{} TL", amount.to_fixed(2))
}

fn elmas(amount: Amount) -> String {
    format!("{amount} ELMAS")
}

fn reward(reward: &Reward) -> String {
    match (reward.currency.is_zero(), reward.token.is_zero()) {
        (false, false) => format!("{} + {}", tl(reward.currency), elmas(reward.token)),
        (false, true) => tl(reward.currency),
        (true, false) => elmas(reward.token),
        (true, true) => "nothing".to_string(),
    }
}

pub fn offer(offer: &AdOffer) -> String {
    format!(
        "📺 {}\nWatch for {} seconds, then claim {}.",
        offer.ad_title,
        offer.required_seconds,
        reward(&Reward::new(offer.reward_currency, offer.reward_token)),
    )
}

pub fn request_outcome(outcome: &RequestOutcome) -> String {
    match outcome {
        RequestOutcome::Created(o) => offer(o),
        RequestOutcome::NoAdAvailable => "No ads are available right now. Please try again later.".to_string(),
        RequestOutcome::DailyCapReached { limit } => {
            format!("You have watched {limit} ads today, the daily limit. Come back tomorrow.")
        }
    }
}

pub fn start_outcome(outcome: &StartOutcome) -> String {
    match outcome {
        StartOutcome::Started { remaining_secs } => countdown(*remaining_secs),
        StartOutcome::AlreadyStarted { remaining_secs } => {
            format!("Already started. {}", countdown(*remaining_secs))
        }
        StartOutcome::NotFound => not_found(),
        StartOutcome::UserMismatch => user_mismatch(),
        StartOutcome::Expired => expired(),
    }
}

pub fn countdown(remaining_secs: u64) -> String {
    if remaining_secs == 0 {
        "✅ Done! You can claim your reward now.".to_string()
    } else {
        format!("⏳ {remaining_secs} seconds left.")
    }
}

pub fn settlement(settlement: &Settlement) -> String {
    format!(
        "🎉 You earned {}.\nBalance: {}",
        reward(&Reward::new(settlement.reward_currency, settlement.reward_token)),
        balance_line(&settlement.new_balances),
    )
}

pub fn claim_outcome(outcome: &ClaimOutcome) -> String {
    match outcome {
        ClaimOutcome::Paid(s) => settlement(s),
        ClaimOutcome::TooEarly { remaining_secs } => {
            format!("Not yet. Please watch for {remaining_secs} more seconds.")
        }
        ClaimOutcome::AlreadyPaid { balances, .. } => {
            format!("This reward was already paid.\nBalance: {}", balance_line(balances))
        }
        ClaimOutcome::NotFound => not_found(),
        ClaimOutcome::UserMismatch => user_mismatch(),
        ClaimOutcome::DailyCapReached { limit, .. } => {
            format!("You reached the daily limit of {limit} rewarded ads. Come back tomorrow.")
        }
        ClaimOutcome::Expired => expired(),
        ClaimOutcome::AdUnavailable => "This ad is no longer running, so it cannot be rewarded.".to_string(),
        ClaimOutcome::Unauthenticated(e) => unauthenticated(e),
    }
}

fn balance_line(balances: &Balances) -> String {
    format!(
        "{} | {}",
        tl(balances.spendable_balance),
        elmas(balances.reward_token_balance)
    )
}

pub fn wallet(balances: &Balances) -> String {
    format!(
        "💰 Wallet\nTL: {}\nELMAS: {}",
        balances.spendable_balance.to_fixed(2),
        balances.reward_token_balance
    )
}

pub fn referral(code: &str, link: &str, share_bps: u16) -> String {
    format!(
        "👥 Your referral code: {code}\nShare this link: {link}\nYou earn {}% of every reward your friends collect.",
        Amount::from_atomic(u64::from(share_bps) * 1_000_000)
    )
}

pub fn conversion(conversion: &Conversion) -> String {
    format!(
        "Converted {} to {}.\nBalance: {}",
        elmas(conversion.tokens_spent),
        tl(conversion.currency_received),
        balance_line(&conversion.balances),
    )
}

pub fn not_found() -> String {
    "That ad session does not exist.".to_string()
}

pub fn user_mismatch() -> String {
    "That ad session belongs to someone else.".to_string()
}

pub fn expired() -> String {
    "That ad session has expired. Request a new ad to keep earning.".to_string()
}

pub fn unauthenticated(error: &VerifyError) -> String {
    match error {
        VerifyError::Expired => "Your login has expired. Please reopen the app.".to_string(),
        _ => "We could not verify your Telegram login. Please reopen the app.".to_string(),
    }
}

pub fn rate_limited(retry_after: Duration) -> String {
    format!("Too many requests. Please wait {} seconds.", retry_after.as_secs())
}

pub fn internal_error() -> String {
    "Something went wrong. Please try again.".to_string()
}
