//! Transport-agnostic bot dispatcher
//!
//! Turns a chat message or a button callback into a reply. Delivering
//! updates and rendering replies is left to whatever Telegram client drives
//! the node; everything stateful goes through the session manager and the
//! ledger.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use lib_ledger::{LedgerError, ReferralBinding};
use lib_storage::StorageBackend;
use lib_types::{Amount, UserId};

use super::commands::{parse_callback, parse_command, BotCommand, CallbackAction, BUTTON_REFERRAL, BUTTON_WALLET, BUTTON_WATCH_AD};
use super::messages;
use super::pending::{PendingAction, PendingStore, PromptError, PromptStep};
use crate::ads::{AdSessionManager, CatalogError, ClaimOutcome, RequestOutcome, SessionError, StartOutcome};

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Prompt(#[from] PromptError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotUpdate {
    Message { user_id: UserId, text: String },
    Callback { user_id: UserId, data: String },
}

impl BotUpdate {
    pub fn user_id(&self) -> UserId {
        match self {
            BotUpdate::Message { user_id, .. } | BotUpdate::Callback { user_id, .. } => *user_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Button {
    /// Opens the Mini App at `url`
    WebApp { label: String, url: String },
    Callback { label: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReply {
    pub text: String,
    pub buttons: Vec<Button>,
    /// Show the main menu keyboard
    pub show_menu: bool,
}

impl BotReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            buttons: Vec::new(),
            show_menu: false,
        }
    }

    pub fn menu(text: impl Into<String>) -> Self {
        Self {
            show_menu: true,
            ..Self::text(text)
        }
    }

    fn with_button(mut self, button: Button) -> Self {
        self.buttons.push(button);
        self
    }
}

/// Labels of the main menu keyboard
pub const MAIN_MENU: [&str; 3] = [BUTTON_WATCH_AD, BUTTON_WALLET, BUTTON_REFERRAL];

pub struct BotDispatcher<B: StorageBackend> {
    manager: Arc<AdSessionManager<B>>,
    pending: PendingStore<B>,
    admin_ids: Vec<UserId>,
    bot_username: String,
    token_price: Amount,
}

impl<B: StorageBackend> BotDispatcher<B> {
    pub fn new(
        manager: Arc<AdSessionManager<B>>,
        admin_ids: Vec<UserId>,
        bot_username: impl Into<String>,
        token_price: Amount,
    ) -> Self {
        Self {
            pending: PendingStore::new(manager.ledger().backend().clone()),
            manager,
            admin_ids,
            bot_username: bot_username.into(),
            token_price,
        }
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub fn referral_link(&self, user_id: UserId) -> String {
        format!("https://t.me/{}?start={}", self.bot_username, user_id)
    }

    /// Handle one update. Failures are logged and rendered as a generic
    /// message; nothing partial is ever committed.
    pub async fn handle(&self, update: BotUpdate) -> BotReply {
        let user_id = update.user_id();
        match self.try_handle(update).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(user = %user_id, error = %e, "bot update failed");
                BotReply::text(messages::internal_error())
            }
        }
    }

    async fn try_handle(&self, update: BotUpdate) -> Result<BotReply, BotError> {
        match update {
            BotUpdate::Message { user_id, text } => self.on_command(user_id, parse_command(&text)).await,
            BotUpdate::Callback { user_id, data } => match parse_callback(&data) {
                Some(action) => self.on_callback(user_id, action).await,
                None => {
                    debug!(user = %user_id, data = %data, "unknown callback");
                    Ok(BotReply::text("Unknown action."))
                }
            },
        }
    }

    async fn on_command(&self, user_id: UserId, command: BotCommand) -> Result<BotReply, BotError> {
        let ledger = self.manager.ledger();
        match command {
            BotCommand::Start { referrer } => {
                ledger.get_or_create(user_id).await?;
                if let Some(referrer) = referrer {
                    let binding = ledger.set_referrer(user_id, referrer).await?;
                    info!(user = %user_id, referrer = %referrer, ?binding, "start with referral");
                    if binding == ReferralBinding::Bound {
                        return Ok(BotReply::menu(
                            "Welcome to ELMAS! You joined through a friend's invite. Watch ads to earn TL and ELMAS.",
                        ));
                    }
                }
                Ok(BotReply::menu("Welcome to ELMAS! Watch ads to earn TL and ELMAS."))
            }
            BotCommand::WatchAd => {
                let outcome = self.manager.request_ad(user_id).await?;
                let text = messages::request_outcome(&outcome);
                Ok(match outcome {
                    RequestOutcome::Created(offer) => BotReply::text(text)
                        .with_button(Button::WebApp {
                            label: "▶️ Watch".to_string(),
                            url: offer.watch_url.clone(),
                        })
                        .with_button(Button::Callback {
                            label: "⏱ Start timer".to_string(),
                            data: CallbackAction::Start(offer.session_id).data(),
                        })
                        .with_button(Button::Callback {
                            label: "✅ Claim".to_string(),
                            data: CallbackAction::Claim(offer.session_id).data(),
                        }),
                    _ => BotReply::menu(text),
                })
            }
            BotCommand::Wallet => {
                let balances = self.manager.get_balances(user_id).await?;
                Ok(BotReply::menu(messages::wallet(&balances)))
            }
            BotCommand::Referral => {
                let account = ledger.get_or_create(user_id).await?;
                Ok(BotReply::menu(messages::referral(
                    &account.referral_code(),
                    &self.referral_link(user_id),
                    self.manager.config().referral_share_bps,
                )))
            }
            BotCommand::Convert(None) => Ok(BotReply::text("Usage: /convert <ELMAS amount>, e.g. /convert 100")),
            BotCommand::Convert(Some(tokens)) => match ledger.convert_tokens(user_id, tokens, self.token_price).await {
                Ok(conversion) => Ok(BotReply::menu(messages::conversion(&conversion))),
                Err(LedgerError::InsufficientBalance { have, .. }) => Ok(BotReply::menu(format!(
                    "Not enough ELMAS. You have {have} ELMAS."
                ))),
                Err(LedgerError::InvalidAmount(reason)) => Ok(BotReply::text(format!("Cannot convert: {reason}."))),
                Err(e) => Err(e.into()),
            },
            BotCommand::Admin => {
                if !self.is_admin(user_id) {
                    return Ok(BotReply::text("This command is for admins only."));
                }
                self.admin_summary().await
            }
            BotCommand::NewAd => {
                if !self.is_admin(user_id) {
                    return Ok(BotReply::text("This command is for admins only."));
                }
                let state = PendingAction::AwaitingAdTitle;
                self.pending.set(user_id, &state).await?;
                Ok(BotReply::text(format!("New ad. {}\nSend /cancel to stop.", state.prompt())))
            }
            BotCommand::Cancel => {
                self.pending.clear(user_id).await?;
                Ok(BotReply::menu("Cancelled."))
            }
            BotCommand::Help => Ok(BotReply::menu(
                "Tap 📺 Watch ad, watch until the timer ends, then claim your reward.\n/wallet shows your balance, /referral your invite link, /convert <amount> sells ELMAS for TL.",
            )),
            BotCommand::Text(text) => self.on_text(user_id, &text).await,
        }
    }

    async fn on_text(&self, user_id: UserId, text: &str) -> Result<BotReply, BotError> {
        let state = self.pending.get(user_id).await?;
        if state.is_none() || !self.is_admin(user_id) {
            return Ok(BotReply::menu("Menu:"));
        }

        match state.advance(text) {
            Ok(PromptStep::Next(next)) => {
                self.pending.set(user_id, &next).await?;
                Ok(BotReply::text(next.prompt()))
            }
            Ok(PromptStep::Complete(new_ad)) => {
                let reply = match self.manager.catalog().create(new_ad).await {
                    Ok(ad) => BotReply::menu(format!(
                        "Ad #{} \"{}\" created ({} s).",
                        ad.id, ad.title, ad.required_seconds
                    )),
                    Err(CatalogError::InvalidAd(reason)) => BotReply::menu(format!("Ad rejected: {reason}.")),
                    Err(e) => return Err(e.into()),
                };
                self.pending.clear(user_id).await?;
                Ok(reply)
            }
            Err(PromptError::InvalidInput(reason)) => {
                Ok(BotReply::text(format!("{reason}. {}", state.prompt())))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn on_callback(&self, user_id: UserId, action: CallbackAction) -> Result<BotReply, BotError> {
        match action {
            CallbackAction::Start(sid) => {
                let outcome = self.manager.start_session(sid, user_id).await?;
                let reply = BotReply::text(messages::start_outcome(&outcome));
                Ok(match outcome {
                    StartOutcome::Started { .. } | StartOutcome::AlreadyStarted { .. } => {
                        reply.with_button(Button::Callback {
                            label: "✅ Claim".to_string(),
                            data: CallbackAction::Claim(sid).data(),
                        })
                    }
                    _ => reply,
                })
            }
            CallbackAction::Claim(sid) => {
                let outcome = self.manager.claim_session(sid, user_id, None).await?;
                let reply = BotReply::text(messages::claim_outcome(&outcome));
                Ok(match outcome {
                    ClaimOutcome::TooEarly { .. } => reply.with_button(Button::Callback {
                        label: "✅ Claim".to_string(),
                        data: CallbackAction::Claim(sid).data(),
                    }),
                    _ => BotReply {
                        show_menu: true,
                        ..reply
                    },
                })
            }
        }
    }

    async fn admin_summary(&self) -> Result<BotReply, BotError> {
        let users = self.manager.ledger().count_accounts().await?;
        let ads = self.manager.catalog().list().await?;
        let now = self.manager.clock().now_secs();
        let eligible = ads.iter().filter(|ad| ad.is_eligible(now)).count();
        let metrics = self.manager.metrics().snapshot();
        Ok(BotReply::text(format!(
            "🛠 Admin\nUsers: {users}\nAds: {} ({eligible} running)\nSessions created: {}\nRewards paid: {}",
            ads.len(),
            metrics.sessions_created,
            metrics.claims_paid,
        )))
    }
}
