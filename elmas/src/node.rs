//! Node wiring: one storage backend shared by the ledger, catalog, session
//! manager, bot dispatcher and HTTP API.

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use lib_storage::StorageBackend;
use lib_types::Clock;

use crate::ads::{AdSessionManager, ClaimRateLimiter};
use crate::api::{self, ApiState};
use crate::bot::BotDispatcher;
use crate::config::{ConfigError, NodeConfig};

pub struct ElmasNode<B: StorageBackend> {
    config: NodeConfig,
    manager: Arc<AdSessionManager<B>>,
    dispatcher: Arc<BotDispatcher<B>>,
    limiter: Arc<ClaimRateLimiter>,
}

impl<B: StorageBackend + 'static> ElmasNode<B> {
    pub fn new(backend: Arc<B>, clock: Arc<dyn Clock>, config: NodeConfig) -> Result<Self, ConfigError> {
        let token_price = config.token_price()?;
        let manager = Arc::new(AdSessionManager::new(
            backend,
            clock,
            Arc::new(config.verifier()),
            config.session_config(),
        ));
        let dispatcher = Arc::new(BotDispatcher::new(
            manager.clone(),
            config.admin_ids(),
            config.telegram.bot_username.clone(),
            token_price,
        ));
        let limiter = Arc::new(ClaimRateLimiter::new(config.rate_limit_config()));

        Ok(Self {
            config,
            manager,
            dispatcher,
            limiter,
        })
    }

    pub fn manager(&self) -> &Arc<AdSessionManager<B>> {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Arc<BotDispatcher<B>> {
        &self.dispatcher
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Insert the configured `[[ads]]` if the catalog is empty
    pub async fn seed_catalog(&self) -> Result<usize> {
        if !self.config.catalog.seed_on_start {
            return Ok(0);
        }
        let seeds = self.config.seed_ads()?;
        let added = self
            .manager
            .catalog()
            .seed(&seeds)
            .await
            .context("failed to seed ad catalog")?;
        if added > 0 {
            info!("Seeded {} ad(s) into the catalog", added);
        }
        Ok(added)
    }

    pub fn api_state(&self) -> Result<ApiState<B>, ConfigError> {
        Ok(ApiState {
            manager: self.manager.clone(),
            dispatcher: self.dispatcher.clone(),
            limiter: self.limiter.clone(),
            token_price: self.config.token_price()?,
            bot_username: self.config.telegram.bot_username.clone(),
            webhook_secret: self.config.telegram.webhook_secret.clone(),
        })
    }

    pub fn router(&self) -> Result<Router, ConfigError> {
        Ok(api::router(self.api_state()?, &self.config.server))
    }

    /// Seed the catalog and serve the HTTP API until `shutdown` fires
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        self.seed_catalog().await?;

        let bind = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;

        info!("ELMAS node starting");
        info!("  Daily ad limit: {}", self.config.rewards.daily_ad_limit);
        info!("  Referral share: {} bps", self.config.rewards.referral_share_bps);
        info!("  Watch URL base: {}{}", self.config.catalog.web_base_url, self.config.catalog.watch_path);
        info!("  Admins: {}", self.config.telegram.admin_ids.len());

        api::serve(listener, self.router()?, self.limiter.clone(), shutdown).await
    }
}
