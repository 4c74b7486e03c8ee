//! HTTP handlers for the Mini App
//!
//! Every `/api` route identifies the caller from Mini App init data in the
//! `X-Telegram-Init-Data` header (or `Authorization: tma <initData>`).
//! Protocol outcomes are returned as JSON with an `outcome` code and a
//! plain-language `message`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, warn};

use lib_identity::{VerifiedIdentity, VerifyError};
use lib_ledger::Balances;
use lib_storage::StorageBackend;
use lib_types::{Amount, SessionId};

use super::ApiState;
use crate::ads::{
    ClaimOutcome, RateLimitResult, RequestOutcome, SessionError, SignedPayload, StartOutcome, StatusOutcome,
};
use crate::bot::messages;

pub const INIT_DATA_HEADER: &str = "x-telegram-init-data";
const TMA_AUTH_SCHEME: &str = "tma ";

#[derive(Debug)]
pub enum ApiError {
    MissingInitData,
    Unauthenticated(VerifyError),
    BadSessionId,
    BadRequest(String),
    RateLimited { retry_after: Duration },
    Forbidden,
    Internal,
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        error!(error = %e, "request failed");
        ApiError::Internal
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::MissingInitData => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "Open this page from the ELMAS bot.".to_string(),
            ),
            ApiError::Unauthenticated(e) => (StatusCode::UNAUTHORIZED, "unauthenticated", messages::unauthenticated(e)),
            ApiError::BadSessionId => (StatusCode::BAD_REQUEST, "bad_request", "Malformed session id.".to_string()),
            ApiError::BadRequest(reason) => (StatusCode::BAD_REQUEST, "bad_request", reason.clone()),
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                messages::rate_limited(*retry_after),
            ),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "Admins only.".to_string()),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                messages::internal_error(),
            ),
        };

        let body = Json(json!({ "outcome": code, "message": message }));
        match self {
            ApiError::RateLimited { retry_after } => (
                status,
                [(header::RETRY_AFTER, retry_after.as_secs().to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

type ApiResult = Result<Response, ApiError>;

fn init_data(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(INIT_DATA_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(value);
    }
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(TMA_AUTH_SCHEME))
}

/// Verify the caller and apply the per-user rate limit
async fn authenticate<B: StorageBackend>(state: &ApiState<B>, headers: &HeaderMap) -> Result<VerifiedIdentity, ApiError> {
    let raw = init_data(headers).ok_or(ApiError::MissingInitData)?;
    let now = state.manager.clock().now_secs();
    let identity = state
        .manager
        .verifier()
        .verify_web_app_init_data(raw, now)
        .map_err(|e| {
            warn!(reason = e.reason(), "rejected init data");
            ApiError::Unauthenticated(e)
        })?;

    if let RateLimitResult::Denied { reason, retry_after } = state.limiter.check_user(identity.user_id()).await {
        warn!(user = %identity.user_id(), %reason, "user rate limited");
        state.manager.metrics().record_rate_limit_denial();
        return Err(ApiError::RateLimited { retry_after });
    }
    Ok(identity)
}

fn parse_session_id(raw: &str) -> Result<SessionId, ApiError> {
    raw.parse().map_err(|_| ApiError::BadSessionId)
}

fn amount(a: Amount) -> String {
    a.to_string()
}

fn balances_json(b: &Balances) -> Value {
    json!({
        "spendable_balance": amount(b.spendable_balance),
        "reward_token_balance": amount(b.reward_token_balance),
    })
}

fn outcome_response(status: StatusCode, mut body: Value, message: String) -> Response {
    if let Value::Object(map) = &mut body {
        map.insert("message".to_string(), Value::String(message));
    }
    (status, Json(body)).into_response()
}

/// GET /health
pub async fn health_handler() -> &'static str {
    "ok"
}

/// GET /metrics, admins only
pub async fn metrics_handler<B: StorageBackend + 'static>(
    State(state): State<ApiState<B>>,
    headers: HeaderMap,
) -> ApiResult {
    let identity = authenticate(&state, &headers).await?;
    if !state.dispatcher.is_admin(identity.user_id()) {
        warn!(user = %identity.user_id(), "metrics read by non-admin");
        return Err(ApiError::Forbidden);
    }
    Ok(Json(state.manager.metrics().snapshot()).into_response())
}

/// GET /api/me
pub async fn me_handler<B: StorageBackend + 'static>(
    State(state): State<ApiState<B>>,
    headers: HeaderMap,
) -> ApiResult {
    let identity = authenticate(&state, &headers).await?;
    let user_id = identity.user_id();
    let account = state
        .manager
        .ledger()
        .get_or_create(user_id)
        .await
        .map_err(|e| ApiError::from(SessionError::from(e)))?;
    let today = state.manager.clock().today();

    Ok(Json(json!({
        "user_id": user_id.get(),
        "first_name": identity.user.first_name,
        "username": identity.user.username,
        "referral_code": account.referral_code(),
        "referral_link": format!("https://t.me/{}?start={}", state.bot_username, user_id),
        "balances": balances_json(&account.balances()),
        "ads_today": account.ads_watched_on(today),
        "daily_limit": state.manager.config().daily_ad_limit,
        "token_tl_price": amount(state.token_price),
    }))
    .into_response())
}

/// POST /api/ad/request
pub async fn request_ad_handler<B: StorageBackend + 'static>(
    State(state): State<ApiState<B>>,
    headers: HeaderMap,
) -> ApiResult {
    let identity = authenticate(&state, &headers).await?;
    let outcome = state.manager.request_ad(identity.user_id()).await?;
    let message = messages::request_outcome(&outcome);

    let body = match outcome {
        RequestOutcome::Created(offer) => json!({
            "outcome": "created",
            "session_id": offer.session_id.to_hex(),
            "ad_title": offer.ad_title,
            "content_reference": offer.content_reference,
            "required_seconds": offer.required_seconds,
            "reward_currency": amount(offer.reward_currency),
            "reward_token": amount(offer.reward_token),
            "watch_url": offer.watch_url,
        }),
        RequestOutcome::NoAdAvailable => json!({ "outcome": "no_ad_available" }),
        RequestOutcome::DailyCapReached { limit } => json!({ "outcome": "daily_cap_reached", "limit": limit }),
    };
    Ok(outcome_response(StatusCode::OK, body, message))
}

/// POST /api/ad/:sid/start
pub async fn start_handler<B: StorageBackend + 'static>(
    State(state): State<ApiState<B>>,
    Path(sid): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let identity = authenticate(&state, &headers).await?;
    let session_id = parse_session_id(&sid)?;
    let outcome = state.manager.start_session(session_id, identity.user_id()).await?;
    let message = messages::start_outcome(&outcome);

    let (status, body) = match outcome {
        StartOutcome::Started { remaining_secs } => (
            StatusCode::OK,
            json!({ "outcome": "started", "remaining_secs": remaining_secs }),
        ),
        StartOutcome::AlreadyStarted { remaining_secs } => (
            StatusCode::OK,
            json!({ "outcome": "already_started", "remaining_secs": remaining_secs }),
        ),
        StartOutcome::NotFound => (StatusCode::NOT_FOUND, json!({ "outcome": "not_found" })),
        StartOutcome::UserMismatch => (StatusCode::FORBIDDEN, json!({ "outcome": "user_mismatch" })),
        StartOutcome::Expired => (StatusCode::OK, json!({ "outcome": "expired" })),
    };
    Ok(outcome_response(status, body, message))
}

/// Optional claim body: a login-widget payload signed for the same user
#[derive(Debug, Default, Deserialize)]
pub struct ClaimRequest {
    #[serde(default)]
    pub login_payload: Option<String>,
}

/// POST /api/ad/:sid/claim
pub async fn claim_handler<B: StorageBackend + 'static>(
    State(state): State<ApiState<B>>,
    Path(sid): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let identity = authenticate(&state, &headers).await?;
    let session_id = parse_session_id(&sid)?;
    let request: ClaimRequest = if body.is_empty() {
        ClaimRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("invalid claim body: {e}")))?
    };

    let payload = request.login_payload.as_deref().map(SignedPayload::Login);
    let outcome = state
        .manager
        .claim_session(session_id, identity.user_id(), payload)
        .await?;
    let message = messages::claim_outcome(&outcome);

    let (status, body) = match outcome {
        ClaimOutcome::Paid(settlement) => (
            StatusCode::OK,
            json!({
                "outcome": "paid",
                "reward_currency": amount(settlement.reward_currency),
                "reward_token": amount(settlement.reward_token),
                "balances": balances_json(&settlement.new_balances),
                "paid_at": settlement.paid_at,
            }),
        ),
        ClaimOutcome::TooEarly { remaining_secs } => (
            StatusCode::OK,
            json!({ "outcome": "too_early", "remaining_secs": remaining_secs }),
        ),
        ClaimOutcome::AlreadyPaid { balances, .. } => (
            StatusCode::OK,
            json!({ "outcome": "already_paid", "balances": balances_json(&balances) }),
        ),
        ClaimOutcome::NotFound => (StatusCode::NOT_FOUND, json!({ "outcome": "not_found" })),
        ClaimOutcome::UserMismatch => (StatusCode::FORBIDDEN, json!({ "outcome": "user_mismatch" })),
        ClaimOutcome::DailyCapReached { limit, balances } => (
            StatusCode::OK,
            json!({ "outcome": "daily_cap_reached", "limit": limit, "balances": balances_json(&balances) }),
        ),
        ClaimOutcome::Expired => (StatusCode::OK, json!({ "outcome": "expired" })),
        ClaimOutcome::AdUnavailable => (StatusCode::OK, json!({ "outcome": "ad_unavailable" })),
        ClaimOutcome::Unauthenticated(e) => (
            StatusCode::UNAUTHORIZED,
            json!({ "outcome": "unauthenticated", "reason": e.reason() }),
        ),
    };
    Ok(outcome_response(status, body, message))
}

/// GET /api/ad/:sid
pub async fn session_status_handler<B: StorageBackend + 'static>(
    State(state): State<ApiState<B>>,
    Path(sid): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    let identity = authenticate(&state, &headers).await?;
    let session_id = parse_session_id(&sid)?;

    let view = match state.manager.session_status(session_id, identity.user_id()).await? {
        StatusOutcome::Found(view) => view,
        StatusOutcome::NotFound => {
            return Ok(outcome_response(
                StatusCode::NOT_FOUND,
                json!({ "outcome": "not_found" }),
                messages::not_found(),
            ))
        }
        StatusOutcome::UserMismatch => {
            return Ok(outcome_response(
                StatusCode::FORBIDDEN,
                json!({ "outcome": "user_mismatch" }),
                messages::user_mismatch(),
            ))
        }
    };
    Ok(Json(json!({
        "session_id": view.session_id.to_hex(),
        "status": view.status.as_str(),
        "required_seconds": view.required_seconds,
        "remaining_secs": view.remaining_secs,
        "deadline": view.deadline,
    }))
    .into_response())
}
