//! Ad session manager
//!
//! Owns the session lifecycle: request, start, claim and settle. Each
//! transition is one guarded batch write over the records it read, so two
//! claims racing on the same session (different workers, double taps, a
//! replayed callback) produce exactly one payout. The loser re-reads and
//! reports `AlreadyPaid`.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use lib_identity::{generate_session_id, InitDataVerifier, VerifyError};
use lib_ledger::{AccountLedger, Balances, LedgerError, LedgerTxn, MAX_TXN_ATTEMPTS};
use lib_storage::{BatchOp, Guard, StorageBackend, StorageError};
use lib_types::{Clock, Reward, SessionId, UserId};

use super::catalog::{AdCatalog, CatalogError};
use super::metrics::{AdMetrics, RejectionType};
use super::referral::{ReferralPolicy, DEFAULT_REFERRAL_SHARE_BPS};
use super::types::{AdOffer, AdSession, Advertisement, InvalidTransition, SessionStatus, Settlement};
use crate::store::{decode, encode, session_key};

pub const DEFAULT_DAILY_AD_LIMIT: u32 = 50;
pub const DEFAULT_GRACE_SECS: u64 = 180;
pub const DEFAULT_WATCH_PATH: &str = "/webapp/watch.html";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    #[error("Too many concurrent updates to session {0}")]
    Contention(SessionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub daily_ad_limit: u32,
    /// Seconds after the required watch time before an unclaimed session expires
    pub grace_secs: u64,
    pub referral_share_bps: u16,
    pub watch_base_url: String,
    pub watch_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            daily_ad_limit: DEFAULT_DAILY_AD_LIMIT,
            grace_secs: DEFAULT_GRACE_SECS,
            referral_share_bps: DEFAULT_REFERRAL_SHARE_BPS,
            watch_base_url: String::new(),
            watch_path: DEFAULT_WATCH_PATH.to_string(),
        }
    }
}

impl SessionConfig {
    pub fn watch_url(&self, session_id: &SessionId) -> String {
        format!(
            "{}{}?sid={}",
            self.watch_base_url.trim_end_matches('/'),
            self.watch_path,
            session_id.to_hex()
        )
    }
}

/// Identity proof attached to a claim, tagged with the signer that made it
#[derive(Debug, Clone, Copy)]
pub enum SignedPayload<'a> {
    /// Mini App `initData`
    WebApp(&'a str),
    /// Login widget / Bot API payload
    Login(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Created(AdOffer),
    NoAdAvailable,
    DailyCapReached { limit: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { remaining_secs: u64 },
    AlreadyStarted { remaining_secs: u64 },
    NotFound,
    UserMismatch,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Paid(Settlement),
    TooEarly { remaining_secs: u64 },
    AlreadyPaid { credited: Reward, balances: Balances },
    NotFound,
    UserMismatch,
    /// Sealed with no credit because the daily limit was already reached
    DailyCapReached { limit: u32, balances: Balances },
    Expired,
    AdUnavailable,
    Unauthenticated(VerifyError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    Found(SessionView),
    NotFound,
    UserMismatch,
}

/// Polling view of a session for the web countdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub required_seconds: u32,
    pub remaining_secs: u64,
    pub deadline: u64,
    pub credited: Reward,
}

impl SessionView {
    pub fn of(session: &AdSession, now: u64) -> Self {
        let remaining_secs = match session.status {
            SessionStatus::Created | SessionStatus::Started => session.remaining_secs(now),
            _ => 0,
        };
        Self {
            session_id: session.session_id,
            status: session.status,
            required_seconds: session.required_seconds,
            remaining_secs,
            deadline: session.deadline,
            credited: session.credited,
        }
    }
}

pub struct AdSessionManager<B: StorageBackend> {
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    ledger: AccountLedger<B>,
    catalog: AdCatalog<B>,
    verifier: Arc<InitDataVerifier>,
    referral: ReferralPolicy,
    metrics: Arc<AdMetrics>,
    config: SessionConfig,
}

impl<B: StorageBackend> AdSessionManager<B> {
    pub fn new(
        backend: Arc<B>,
        clock: Arc<dyn Clock>,
        verifier: Arc<InitDataVerifier>,
        config: SessionConfig,
    ) -> Self {
        Self {
            ledger: AccountLedger::new(backend.clone(), clock.clone()),
            catalog: AdCatalog::new(backend.clone(), clock.clone()),
            referral: ReferralPolicy::new(config.referral_share_bps),
            metrics: Arc::new(AdMetrics::new()),
            backend,
            clock,
            verifier,
            config,
        }
    }

    pub fn ledger(&self) -> &AccountLedger<B> {
        &self.ledger
    }

    pub fn catalog(&self) -> &AdCatalog<B> {
        &self.catalog
    }

    pub fn metrics(&self) -> &Arc<AdMetrics> {
        &self.metrics
    }

    pub fn verifier(&self) -> &Arc<InitDataVerifier> {
        &self.verifier
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a new session on a randomly chosen eligible ad
    pub async fn request_ad(&self, user_id: UserId) -> Result<RequestOutcome, SessionError> {
        let now = self.clock.now_secs();
        let account = self.ledger.get_or_create(user_id).await?;

        let limit = self.config.daily_ad_limit;
        if account.ads_watched_on(self.clock.today()) >= limit {
            debug!(user = %user_id, limit, "daily ad limit reached");
            return Ok(RequestOutcome::DailyCapReached { limit });
        }

        let Some(ad) = self.catalog.pick_eligible_ad().await? else {
            self.metrics.record_no_ad_available();
            return Ok(RequestOutcome::NoAdAvailable);
        };

        let session_id = generate_session_id(user_id, now);
        let session = AdSession::new(
            session_id,
            user_id,
            ad.id,
            ad.required_seconds,
            now,
            self.config.grace_secs,
        );
        let key = session_key(&session_id);
        self.backend
            .write_batch_guarded(
                &[Guard::absent(key.clone())],
                &[BatchOp::put(key, encode(&session)?)],
            )
            .await
            .inspect_err(|e| {
                error!(session = %session_id, user = %user_id, transition = "create", error = %e, "session write failed")
            })?;

        self.metrics.record_session_created();
        info!(session = %session_id, user = %user_id, ad = %ad.id, seconds = ad.required_seconds, "ad session created");

        Ok(RequestOutcome::Created(self.offer(&session, &ad)))
    }

    fn offer(&self, session: &AdSession, ad: &Advertisement) -> AdOffer {
        AdOffer {
            session_id: session.session_id,
            ad_title: ad.title.clone(),
            content_reference: ad.content_reference.clone(),
            required_seconds: session.required_seconds,
            reward_currency: ad.reward.currency,
            reward_token: ad.reward.token,
            watch_url: self.config.watch_url(&session.session_id),
        }
    }

    /// Mark the session as started; the watch timer runs from here.
    pub async fn start_session(&self, session_id: SessionId, user_id: UserId) -> Result<StartOutcome, SessionError> {
        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let now = self.clock.now_secs();
            let Some((raw, mut session)) = self.load(&session_id).await? else {
                self.metrics.record_rejection(RejectionType::NotFound);
                return Ok(StartOutcome::NotFound);
            };
            if session.user_id != user_id {
                warn!(session = %session_id, user = %user_id, owner = %session.user_id, "start by non-owner");
                self.metrics.record_rejection(RejectionType::UserMismatch);
                return Ok(StartOutcome::UserMismatch);
            }

            let status = session.status;
            match status {
                SessionStatus::Expired => return Ok(StartOutcome::Expired),
                _ if session.is_overdue(now) => {
                    self.expire(&raw, &mut session, now).await?;
                    return Ok(StartOutcome::Expired);
                }
                SessionStatus::Created => {}
                _ => {
                    return Ok(StartOutcome::AlreadyStarted {
                        remaining_secs: session.remaining_secs(now),
                    })
                }
            }
            if session.too_late_to_start(now) {
                // Left in Created; a claim timed from creation can still pay
                debug!(session = %session_id, user = %user_id, deadline = session.deadline, "start too close to deadline");
                self.metrics.record_rejection(RejectionType::Expired);
                return Ok(StartOutcome::Expired);
            }

            session.advance(SessionStatus::Started, now)?;
            match self.swap(&raw, &session).await {
                Ok(()) => {
                    self.metrics.record_session_started();
                    debug!(session = %session_id, user = %user_id, "ad session started");
                    return Ok(StartOutcome::Started {
                        remaining_secs: session.remaining_secs(now),
                    });
                }
                Err(e) if e.is_conflict() => {
                    debug!(session = %session_id, attempt, "start conflicted, retrying");
                }
                Err(e) => {
                    error!(session = %session_id, user = %user_id, transition = "start", error = %e, "session write failed");
                    return Err(e.into());
                }
            }
        }
        Err(SessionError::Contention(session_id))
    }

    /// Claim the reward for a session.
    ///
    /// When `payload` is given it must verify and name the same user. The
    /// claim folds completion into settlement: a session that was never
    /// explicitly started is timed from its creation.
    pub async fn claim_session(
        &self,
        session_id: SessionId,
        user_id: UserId,
        payload: Option<SignedPayload<'_>>,
    ) -> Result<ClaimOutcome, SessionError> {
        if let Some(payload) = payload {
            let verified = match payload {
                SignedPayload::WebApp(raw) => self.verifier.verify_web_app_init_data(raw, self.clock.now_secs()),
                SignedPayload::Login(raw) => self.verifier.verify_login_payload(raw, self.clock.now_secs()),
            };
            match verified {
                Err(e) => {
                    warn!(session = %session_id, user = %user_id, reason = e.reason(), "claim payload rejected");
                    self.metrics.record_rejection(RejectionType::Unauthenticated);
                    return Ok(ClaimOutcome::Unauthenticated(e));
                }
                Ok(identity) if identity.user_id() != user_id => {
                    warn!(session = %session_id, user = %user_id, signed = %identity.user_id(), "claim payload names another user");
                    self.metrics.record_rejection(RejectionType::UserMismatch);
                    return Ok(ClaimOutcome::UserMismatch);
                }
                Ok(_) => {}
            }
        }

        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let now = self.clock.now_secs();
            let Some((raw, mut session)) = self.load(&session_id).await? else {
                self.metrics.record_rejection(RejectionType::NotFound);
                return Ok(ClaimOutcome::NotFound);
            };
            if session.user_id != user_id {
                warn!(session = %session_id, user = %user_id, owner = %session.user_id, "claim by non-owner");
                self.metrics.record_rejection(RejectionType::UserMismatch);
                return Ok(ClaimOutcome::UserMismatch);
            }

            let status = session.status;
            match status {
                SessionStatus::Paid => {
                    self.metrics.record_already_paid();
                    return Ok(ClaimOutcome::AlreadyPaid {
                        credited: session.credited,
                        balances: self.ledger.balances(user_id).await?,
                    });
                }
                SessionStatus::Expired => {
                    self.metrics.record_rejection(RejectionType::Expired);
                    return Ok(ClaimOutcome::Expired);
                }
                _ if session.is_overdue(now) => {
                    self.expire(&raw, &mut session, now).await?;
                    self.metrics.record_rejection(RejectionType::Expired);
                    return Ok(ClaimOutcome::Expired);
                }
                _ => {}
            }

            let remaining_secs = session.remaining_secs(now);
            if remaining_secs > 0 {
                debug!(session = %session_id, user = %user_id, remaining_secs, "claim too early");
                self.metrics.record_rejection(RejectionType::TooEarly);
                return Ok(ClaimOutcome::TooEarly { remaining_secs });
            }

            let ad = self
                .catalog
                .get(session.ad_id)
                .await?
                .filter(|ad| ad.is_eligible(now));
            let Some(ad) = ad else {
                info!(session = %session_id, ad = %session.ad_id, "ad withdrawn before settlement");
                self.expire(&raw, &mut session, now).await?;
                self.metrics.record_rejection(RejectionType::AdUnavailable);
                return Ok(ClaimOutcome::AdUnavailable);
            };

            match self.settle(&raw, &mut session, &ad, now).await {
                Ok(outcome) => return Ok(outcome),
                Err(SessionError::Ledger(e)) if e.is_conflict() => {
                    debug!(session = %session_id, attempt, "settlement conflicted, retrying");
                }
                Err(e) => {
                    error!(session = %session_id, user = %user_id, transition = "settle", error = %e, "settlement failed");
                    return Err(e);
                }
            }
        }

        warn!(session = %session_id, "settlement gave up after {} attempts", MAX_TXN_ATTEMPTS);
        Err(SessionError::Contention(session_id))
    }

    /// One settlement attempt: seal the session, credit the owner and the
    /// referrer in a single guarded write.
    async fn settle(
        &self,
        raw: &[u8],
        session: &mut AdSession,
        ad: &Advertisement,
        now: u64,
    ) -> Result<ClaimOutcome, SessionError> {
        let key = session_key(&session.session_id);
        let user_id = session.user_id;
        let limit = self.config.daily_ad_limit;

        let mut txn = LedgerTxn::new(self.backend.as_ref(), self.clock.today(), now);
        txn.guard(Guard::new(key.clone(), Some(raw.to_vec())));

        let account = txn.account(user_id).await?;
        let capped = account.daily_ad_count >= limit;
        let referred_by = account.referred_by;
        let credited = if capped {
            Reward::ZERO
        } else {
            account.credit(ad.reward)?;
            account.daily_ad_count = account.daily_ad_count.saturating_add(1);
            ad.reward
        };
        let balances = account.balances();

        let referral = if capped {
            None
        } else {
            self.referral.fan_out(&mut txn, user_id, referred_by, credited).await?
        };

        if session.status != SessionStatus::Completed {
            session.advance(SessionStatus::Completed, now)?;
        }
        session.advance(SessionStatus::Paid, now)?;
        session.credited = credited;
        session.capped = capped;
        session.referral = referral;

        txn.put(key, encode(&*session)?);
        txn.commit().await?;

        if capped {
            info!(session = %session.session_id, user = %user_id, limit, "session sealed over daily limit");
            self.metrics.record_claim_capped();
            return Ok(ClaimOutcome::DailyCapReached { limit, balances });
        }

        self.metrics.record_claim_paid();
        if let Some(credit) = &referral {
            self.metrics.record_referral_credit();
            info!(session = %session.session_id, referrer = %credit.referrer, currency = %credit.amount.currency, token = %credit.amount.token, "referral credited");
        }
        info!(session = %session.session_id, user = %user_id, currency = %credited.currency, token = %credited.token, "ad reward paid");

        Ok(ClaimOutcome::Paid(Settlement {
            session_id: session.session_id,
            reward_currency: credited.currency,
            reward_token: credited.token,
            new_balances: balances,
            referral,
            paid_at: now,
        }))
    }

    /// Session record, with lazy expiry applied
    pub async fn get_session(&self, session_id: SessionId) -> Result<Option<AdSession>, SessionError> {
        let Some((raw, mut session)) = self.load(&session_id).await? else {
            return Ok(None);
        };
        let now = self.clock.now_secs();
        if !session.status.is_terminal() && session.is_overdue(now) {
            self.expire(&raw, &mut session, now).await?;
        }
        Ok(Some(session))
    }

    /// Countdown view for the session owner. Ownership is checked on the
    /// stored record, so only the owner's poll can trigger lazy expiry.
    pub async fn session_status(&self, session_id: SessionId, user_id: UserId) -> Result<StatusOutcome, SessionError> {
        let Some((raw, mut session)) = self.load(&session_id).await? else {
            return Ok(StatusOutcome::NotFound);
        };
        if session.user_id != user_id {
            warn!(session = %session_id, user = %user_id, owner = %session.user_id, "status read by non-owner");
            self.metrics.record_rejection(RejectionType::UserMismatch);
            return Ok(StatusOutcome::UserMismatch);
        }
        let now = self.clock.now_secs();
        if !session.status.is_terminal() && session.is_overdue(now) {
            self.expire(&raw, &mut session, now).await?;
        }
        Ok(StatusOutcome::Found(SessionView::of(&session, now)))
    }

    pub async fn get_balances(&self, user_id: UserId) -> Result<Balances, SessionError> {
        Ok(self.ledger.balances(user_id).await?)
    }

    async fn load(&self, session_id: &SessionId) -> Result<Option<(Vec<u8>, AdSession)>, SessionError> {
        match self.backend.get(&session_key(session_id)).await? {
            Some(raw) => {
                let session = decode(&raw)?;
                Ok(Some((raw, session)))
            }
            None => Ok(None),
        }
    }

    async fn swap(&self, raw: &[u8], session: &AdSession) -> Result<(), StorageError> {
        let encoded = encode(session).map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        self.backend
            .compare_and_swap(&session_key(&session.session_id), Some(raw), Some(&encoded))
            .await
    }

    /// Move an overdue or orphaned session to `Expired`. Losing the race to
    /// another transition is fine: whatever won is the session's state.
    async fn expire(&self, raw: &[u8], session: &mut AdSession, now: u64) -> Result<(), SessionError> {
        session.advance(SessionStatus::Expired, now)?;
        match self.swap(raw, session).await {
            Ok(()) => {
                self.metrics.record_session_expired();
                debug!(session = %session.session_id, user = %session.user_id, "ad session expired");
                Ok(())
            }
            Err(e) if e.is_conflict() => Ok(()),
            Err(e) => {
                error!(session = %session.session_id, user = %session.user_id, transition = "expire", error = %e, "session write failed");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::catalog::NewAd;
    use lib_identity::sign_web_app_init_data;
    use lib_storage::MemoryBackend;
    use lib_types::{Amount, ManualClock};

    const TOKEN: &str = "123456:TEST-TOKEN";
    const T0: u64 = 1_700_000_000;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    async fn manager() -> (AdSessionManager<MemoryBackend>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let manager = AdSessionManager::new(
            Arc::new(MemoryBackend::new()),
            clock.clone(),
            Arc::new(InitDataVerifier::new(TOKEN, Some(86_400))),
            SessionConfig {
                watch_base_url: "https://elmas.example.com/".to_string(),
                ..Default::default()
            },
        );
        manager
            .catalog()
            .create(NewAd {
                title: "Spot".to_string(),
                content_reference: "https://cdn.example.com/spot.mp4".to_string(),
                required_seconds: Some(15),
                reward: Reward::new(amt("0.25"), amt("5")),
                is_active: true,
                expires_at: None,
            })
            .await
            .unwrap();
        (manager, clock)
    }

    async fn offer(manager: &AdSessionManager<MemoryBackend>, user: UserId) -> AdOffer {
        match manager.request_ad(user).await.unwrap() {
            RequestOutcome::Created(offer) => offer,
            other => panic!("expected offer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_offer_carries_watch_url() {
        let (manager, _) = manager().await;
        let offer = offer(&manager, UserId(7)).await;
        assert_eq!(offer.required_seconds, 15);
        assert_eq!(
            offer.watch_url,
            format!("https://elmas.example.com/webapp/watch.html?sid={}", offer.session_id.to_hex())
        );
    }

    #[tokio::test]
    async fn test_start_then_claim_times_from_start() {
        let (manager, clock) = manager().await;
        let offer = offer(&manager, UserId(7)).await;

        clock.advance(5);
        assert_eq!(
            manager.start_session(offer.session_id, UserId(7)).await.unwrap(),
            StartOutcome::Started { remaining_secs: 15 }
        );
        assert_eq!(
            manager.start_session(offer.session_id, UserId(7)).await.unwrap(),
            StartOutcome::AlreadyStarted { remaining_secs: 15 }
        );

        clock.advance(12);
        assert_eq!(
            manager.claim_session(offer.session_id, UserId(7), None).await.unwrap(),
            ClaimOutcome::TooEarly { remaining_secs: 3 }
        );

        clock.advance(3);
        let outcome = manager.claim_session(offer.session_id, UserId(7), None).await.unwrap();
        let ClaimOutcome::Paid(settlement) = outcome else {
            panic!("expected paid, got {outcome:?}");
        };
        assert_eq!(settlement.new_balances.spendable_balance, amt("0.25"));
        assert_eq!(settlement.new_balances.reward_token_balance, amt("5"));
    }

    #[tokio::test]
    async fn test_claim_with_signed_payload_checks_user() {
        let (manager, clock) = manager().await;
        let offer = offer(&manager, UserId(7)).await;
        clock.advance(16);

        let auth_date = clock.now_secs().to_string();
        let other = sign_web_app_init_data(TOKEN, &[("auth_date", &auth_date), ("user", r#"{"id":8}"#)]);
        assert_eq!(
            manager
                .claim_session(offer.session_id, UserId(7), Some(SignedPayload::WebApp(&other)))
                .await
                .unwrap(),
            ClaimOutcome::UserMismatch
        );

        let bad = sign_web_app_init_data("999:OTHER", &[("auth_date", &auth_date), ("user", r#"{"id":7}"#)]);
        assert_eq!(
            manager
                .claim_session(offer.session_id, UserId(7), Some(SignedPayload::WebApp(&bad)))
                .await
                .unwrap(),
            ClaimOutcome::Unauthenticated(VerifyError::BadHash)
        );

        let good = sign_web_app_init_data(TOKEN, &[("auth_date", &auth_date), ("user", r#"{"id":7}"#)]);
        assert!(matches!(
            manager
                .claim_session(offer.session_id, UserId(7), Some(SignedPayload::WebApp(&good)))
                .await
                .unwrap(),
            ClaimOutcome::Paid(_)
        ));
    }

    #[tokio::test]
    async fn test_overdue_session_expires_lazily() {
        let (manager, clock) = manager().await;
        let offer = offer(&manager, UserId(7)).await;

        clock.advance(15 + 180 + 1);
        let StatusOutcome::Found(view) = manager.session_status(offer.session_id, UserId(7)).await.unwrap() else {
            panic!("owner should see the session");
        };
        assert_eq!(view.status, SessionStatus::Expired);
        assert_eq!(
            manager.claim_session(offer.session_id, UserId(7), None).await.unwrap(),
            ClaimOutcome::Expired
        );
        assert_eq!(
            manager.start_session(offer.session_id, UserId(7)).await.unwrap(),
            StartOutcome::Expired
        );
        assert_eq!(manager.get_balances(UserId(7)).await.unwrap(), Balances::default());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (manager, _) = manager().await;
        let sid = SessionId::new([9; 32]);
        assert_eq!(manager.claim_session(sid, UserId(1), None).await.unwrap(), ClaimOutcome::NotFound);
        assert_eq!(manager.start_session(sid, UserId(1)).await.unwrap(), StartOutcome::NotFound);
        assert_eq!(manager.session_status(sid, UserId(1)).await.unwrap(), StatusOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_no_ad_available() {
        let (manager, _) = manager().await;
        manager
            .catalog()
            .set_active(lib_types::AdId(1), false)
            .await
            .unwrap();
        assert_eq!(manager.request_ad(UserId(7)).await.unwrap(), RequestOutcome::NoAdAvailable);
        assert_eq!(manager.metrics().snapshot().no_ad_available, 1);
    }
}
