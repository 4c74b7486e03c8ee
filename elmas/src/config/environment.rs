//! Environment variable overrides

use std::path::PathBuf;
use tracing::info;

use super::{ConfigError, NodeConfig};

pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_ADMIN_ID: &str = "ADMIN_ID";
pub const ENV_WEB_BASE_URL: &str = "WEB_BASE_URL";
pub const ENV_WATCH_PATH: &str = "WEBAPP_WATCH_PATH";
pub const ENV_PORT: &str = "PORT";
pub const ENV_DATA_DIR: &str = "DATA_DIR";

impl NodeConfig {
    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; empty values are ignored
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(token) = get(ENV_BOT_TOKEN) {
            info!("Environment override: {}", ENV_BOT_TOKEN);
            self.telegram.bot_token = token;
        }
        if let Some(ids) = get(ENV_ADMIN_ID) {
            self.telegram.admin_ids = parse_admin_ids(&ids)?;
            info!("Environment override: {} ({} ids)", ENV_ADMIN_ID, self.telegram.admin_ids.len());
        }
        if let Some(url) = get(ENV_WEB_BASE_URL) {
            info!("Environment override: {} = {}", ENV_WEB_BASE_URL, url);
            self.catalog.web_base_url = url;
        }
        if let Some(path) = get(ENV_WATCH_PATH) {
            info!("Environment override: {} = {}", ENV_WATCH_PATH, path);
            self.catalog.watch_path = path;
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port.parse().map_err(|e| ConfigError::Invalid {
                key: ENV_PORT.to_string(),
                reason: format!("{e}"),
            })?;
            info!("Environment override: {} = {}", ENV_PORT, self.server.port);
        }
        if let Some(dir) = get(ENV_DATA_DIR) {
            info!("Environment override: {} = {}", ENV_DATA_DIR, dir);
            self.storage.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// Comma separated Telegram ids
fn parse_admin_ids(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|e| ConfigError::Invalid {
                key: ENV_ADMIN_ID.to_string(),
                reason: format!("{s}: {e}"),
            })
        })
        .collect()
}
