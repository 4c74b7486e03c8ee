//! Mini App HTTP API
//!
//! axum router with per-IP rate limiting, CORS, tracing, timeouts and a
//! body size limit, served with graceful shutdown.

pub mod handlers;
pub mod webhook;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use lib_storage::StorageBackend;
use lib_types::Amount;

use crate::ads::{AdSessionManager, ClaimRateLimiter, RateLimitResult};
use crate::bot::{messages, BotDispatcher};
use crate::config::ServerConfig;
use handlers::{
    claim_handler, health_handler, me_handler, metrics_handler, request_ad_handler, session_status_handler,
    start_handler,
};
use webhook::webhook_handler;

/// Interval between rate limiter sweeps
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared handler state
pub struct ApiState<B: StorageBackend> {
    pub manager: Arc<AdSessionManager<B>>,
    pub dispatcher: Arc<BotDispatcher<B>>,
    pub limiter: Arc<ClaimRateLimiter>,
    pub token_price: Amount,
    pub bot_username: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` on webhook calls
    pub webhook_secret: Option<String>,
}

impl<B: StorageBackend> Clone for ApiState<B> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            dispatcher: self.dispatcher.clone(),
            limiter: self.limiter.clone(),
            token_price: self.token_price,
            bot_username: self.bot_username.clone(),
            webhook_secret: self.webhook_secret.clone(),
        }
    }
}

/// Per-IP rate limiting middleware
async fn rate_limit_middleware(
    State(limiter): State<Arc<ClaimRateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();

    if let RateLimitResult::Denied { reason, retry_after } = limiter.check_ip(ip).await {
        warn!(ip = %ip, %reason, "Rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [("Retry-After", retry_after.as_secs().to_string())],
            messages::rate_limited(retry_after),
        )
            .into_response();
    }

    next.run(request).await
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);
    }

    let parsed: Vec<_> = origins.iter().filter_map(|origin| origin.parse().ok()).collect();
    if parsed.is_empty() {
        warn!("No valid CORS origins configured, using restrictive policy");
        CorsLayer::new().allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new().allow_origin(parsed).allow_methods(Any).allow_headers(Any)
    }
}

/// Build the application router
pub fn router<B: StorageBackend + 'static>(state: ApiState<B>, config: &ServerConfig) -> Router {
    let limiter = state.limiter.clone();

    // Layer order is bottom-up: the last added layer is outermost
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler::<B>))
        .route("/api/me", get(me_handler::<B>))
        .route("/api/ad/request", post(request_ad_handler::<B>))
        .route("/api/ad/:sid", get(session_status_handler::<B>))
        .route("/api/ad/:sid/start", post(start_handler::<B>))
        .route("/api/ad/:sid/claim", post(claim_handler::<B>))
        .route("/bot/webhook", post(webhook_handler::<B>))
        .layer(build_cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(axum::extract::DefaultBodyLimit::max(config.max_body_bytes))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` flips to true
pub async fn serve(
    listener: TcpListener,
    app: Router,
    limiter: Arc<ClaimRateLimiter>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("HTTP API listening on {}", addr);

    let mut sweep_shutdown = shutdown.clone();
    let sweeper = tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    limiter.cleanup_expired().await;
                    debug!("rate limiter swept");
                }
                _ = sweep_shutdown.changed() => break,
            }
        }
    });

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
            info!("HTTP API received shutdown signal");
        })
        .await
        .context("HTTP server error")?;

    sweeper.abort();
    info!("HTTP API stopped");
    Ok(())
}
