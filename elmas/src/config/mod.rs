//! Node configuration
//!
//! One TOML file with optional sections; anything missing falls back to
//! defaults. Environment variables override the file and CLI flags override
//! both.
//!
//! ```toml
//! [server]
//! port = 10000
//!
//! [telegram]
//! bot_token = "123456:ABC"
//! bot_username = "ElmasBot"
//! admin_ids = [1001]
//!
//! [rewards]
//! daily_ad_limit = 50
//! referral_share_bps = 1000
//!
//! [[ads]]
//! title = "Launch spot"
//! content_reference = "https://cdn.example.com/launch.mp4"
//! required_seconds = 15
//! reward_tl = "0.25"
//! reward_elmas = "5"
//! ```

pub mod environment;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use lib_identity::InitDataVerifier;
use lib_types::{Amount, Reward, UserId, MAX_BPS};

use crate::ads::{NewAd, RateLimitConfig, SessionConfig, DEFAULT_REFERRAL_SHARE_BPS};

pub const DEFAULT_CONFIG_FILE: &str = "elmas.toml";

/// Configuration validation error
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
    /// Empty allows any origin
    pub cors_origins: Vec<String>,
    pub rate_limit_per_ip: u32,
    pub rate_limit_per_user: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10_000,
            request_timeout_secs: 30,
            max_body_bytes: 64 * 1024,
            cors_origins: Vec::new(),
            rate_limit_per_ip: 100,
            rate_limit_per_user: 30,
            rate_limit_window_secs: 60,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub bot_username: String,
    pub admin_ids: Vec<i64>,
    /// `auth_date` freshness window; 0 disables the check
    pub init_data_max_age_secs: u64,
    /// Secret token registered with `setWebhook`
    pub webhook_secret: Option<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            bot_username: "ElmasBot".to_string(),
            admin_ids: Vec::new(),
            init_data_max_age_secs: 86_400,
            webhook_secret: None,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("bot_username", &self.bot_username)
            .field("admin_ids", &self.admin_ids)
            .field("init_data_max_age_secs", &self.init_data_max_age_secs)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardsConfig {
    pub daily_ad_limit: u32,
    pub referral_share_bps: u16,
    pub grace_secs: u64,
    /// TL paid per ELMAS on conversion, decimal string
    pub token_price: String,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            daily_ad_limit: 50,
            referral_share_bps: DEFAULT_REFERRAL_SHARE_BPS,
            grace_secs: 180,
            token_price: "0.0001".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Public origin of the Mini App, e.g. `https://elmas.example.com`
    pub web_base_url: String,
    pub watch_path: String,
    /// Insert `[[ads]]` entries when the catalog is empty
    pub seed_on_start: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            web_base_url: "http://localhost:10000".to_string(),
            watch_path: crate::ads::session::DEFAULT_WATCH_PATH.to_string(),
            seed_on_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub tree: String,
    pub cache_capacity_bytes: u64,
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            tree: "elmas".to_string(),
            cache_capacity_bytes: 64 * 1024 * 1024,
            in_memory: false,
        }
    }
}

/// `[[ads]]` seed entry; amounts are decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSeed {
    pub title: String,
    pub content_reference: String,
    #[serde(default)]
    pub required_seconds: Option<u32>,
    #[serde(default = "zero_amount")]
    pub reward_tl: String,
    #[serde(default = "zero_amount")]
    pub reward_elmas: String,
    #[serde(default = "enabled")]
    pub is_active: bool,
    #[serde(default)]
    pub expires_at: Option<u64>,
}

fn zero_amount() -> String {
    "0".to_string()
}

fn enabled() -> bool {
    true
}

impl AdSeed {
    pub fn to_new_ad(&self) -> Result<NewAd, ConfigError> {
        let currency: Amount = self
            .reward_tl
            .parse()
            .map_err(|e| ConfigError::invalid(format!("ads[{}].reward_tl", self.title), e))?;
        let token: Amount = self
            .reward_elmas
            .parse()
            .map_err(|e| ConfigError::invalid(format!("ads[{}].reward_elmas", self.title), e))?;
        let new_ad = NewAd {
            title: self.title.clone(),
            content_reference: self.content_reference.clone(),
            required_seconds: self.required_seconds,
            reward: Reward::new(currency, token),
            is_active: self.is_active,
            expires_at: self.expires_at,
        };
        new_ad
            .validate()
            .map_err(|e| ConfigError::invalid(format!("ads[{}]", self.title), e))?;
        Ok(new_ad)
    }
}

/// Complete node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub rewards: RewardsConfig,
    pub catalog: CatalogConfig,
    pub storage: StorageConfig,
    pub ads: Vec<AdSeed>,
}

/// Command line overrides
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub in_memory: bool,
}

impl NodeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read `path` if it exists, defaults otherwise
    pub async fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            info!("CLI override: port = {}", port);
            self.server.port = port;
        }
        if let Some(dir) = &args.data_dir {
            info!("CLI override: data_dir = {}", dir.display());
            self.storage.data_dir = dir.clone();
        }
        if args.in_memory {
            self.storage.in_memory = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::Missing("telegram.bot_token (or BOT_TOKEN)"));
        }
        if self.server.port == 0 {
            return Err(ConfigError::invalid("server.port", "must be non-zero"));
        }
        if self.rewards.referral_share_bps > MAX_BPS {
            return Err(ConfigError::invalid(
                "rewards.referral_share_bps",
                format!("must be at most {MAX_BPS}"),
            ));
        }
        if self.rewards.daily_ad_limit == 0 {
            return Err(ConfigError::invalid("rewards.daily_ad_limit", "must be positive"));
        }
        let price = self.token_price()?;
        if price.is_zero() {
            return Err(ConfigError::invalid("rewards.token_price", "must be positive"));
        }
        if !self.catalog.watch_path.starts_with('/') {
            return Err(ConfigError::invalid("catalog.watch_path", "must start with '/'"));
        }
        self.seed_ads()?;
        Ok(())
    }

    pub fn token_price(&self) -> Result<Amount, ConfigError> {
        self.rewards
            .token_price
            .parse()
            .map_err(|e| ConfigError::invalid("rewards.token_price", e))
    }

    pub fn seed_ads(&self) -> Result<Vec<NewAd>, ConfigError> {
        self.ads.iter().map(AdSeed::to_new_ad).collect()
    }

    pub fn admin_ids(&self) -> Vec<UserId> {
        self.telegram.admin_ids.iter().copied().map(UserId).collect()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            daily_ad_limit: self.rewards.daily_ad_limit,
            grace_secs: self.rewards.grace_secs,
            referral_share_bps: self.rewards.referral_share_bps,
            watch_base_url: self.catalog.web_base_url.clone(),
            watch_path: self.catalog.watch_path.clone(),
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests_per_ip: self.server.rate_limit_per_ip,
            max_requests_per_user: self.server.rate_limit_per_user,
            window_duration: Duration::from_secs(self.server.rate_limit_window_secs),
            ..Default::default()
        }
    }

    pub fn verifier(&self) -> InitDataVerifier {
        let max_age = match self.telegram.init_data_max_age_secs {
            0 => None,
            secs => Some(secs),
        };
        InitDataVerifier::new(&self.telegram.bot_token, max_age)
    }
}

/// Load, override and validate the node configuration
pub async fn load_configuration(args: &CliArgs) -> Result<NodeConfig, ConfigError> {
    let path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = NodeConfig::from_file(&path).await?;
    config.apply_env_overrides()?;
    config.apply_cli_overrides(args);
    config.validate()?;

    info!(
        port = config.server.port,
        ads = config.ads.len(),
        admins = config.telegram.admin_ids.len(),
        in_memory = config.storage.in_memory,
        "configuration validated"
    );
    Ok(config)
}
