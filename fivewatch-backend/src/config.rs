use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} must be a Discord channel id, got '{value}'")]
    InvalidChannelId { key: &'static str, value: String },
}

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    /// Env: DISCORD_TOKEN (required)
    pub discord_token: String,

    /// Host of the monitored FiveM server
    /// Env: FIVEM_SERVER_IP (required)
    pub fivem_host: String,

    /// Port of the FiveM HTTP endpoints
    /// Env: FIVEM_SERVER_PORT (default: 30120)
    pub fivem_port: u16,

    /// Channel holding the status and player list messages
    /// Env: CHANNEL_ID (required)
    pub channel_id: u64,

    /// Channel receiving online/offline notifications
    /// Env: ADMIN_CHANNEL_ID (required)
    pub admin_channel_id: u64,

    /// Publish paginated player list messages below the status message
    /// Env: SHOW_PLAYER_LIST (default: false)
    pub show_player_list: bool,

    /// Players per player list message
    /// Env: PLAYER_PAGE_SIZE (default: 30)
    pub player_page_size: usize,

    /// Time between automatic poll cycles
    /// Env: UPDATE_INTERVAL_SECS (default: 60)
    pub update_interval: Duration,

    /// Minimum time between two manual refreshes
    /// Env: REFRESH_COOLDOWN_SECS (default: 30)
    pub refresh_cooldown: Duration,

    /// Timeout for each request to the FiveM server
    /// Env: FETCH_TIMEOUT_SECS (default: 5)
    pub fetch_timeout: Duration,

    /// HTTP API port
    /// Env: PORT (default: 3001)
    pub port: u16,

    /// Database file path
    /// Env: DATABASE_PATH (default: "fivewatch.db")
    pub database_path: String,

    /// HTTP API request timeout
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Sliding window length for the read API limiter
    /// Env: RATE_LIMIT_WINDOW_SECS (default: 10)
    pub rate_limit_window: Duration,

    /// Requests allowed per client inside one window
    /// Env: RATE_LIMIT_MAX_REQUESTS (default: 40)
    pub rate_limit_max_requests: usize,

    /// How long a client is blocked after exceeding the limit
    /// Env: RATE_LIMIT_BLOCK_SECS (default: 10)
    pub rate_limit_block: Duration,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv(); //for debugging mostly
        let defaults = Self::default();
        Ok(Self {
            discord_token: required("DISCORD_TOKEN")?,
            fivem_host: required("FIVEM_SERVER_IP")?,
            fivem_port: env_or_default("FIVEM_SERVER_PORT", defaults.fivem_port),
            channel_id: channel_id("CHANNEL_ID")?,
            admin_channel_id: channel_id("ADMIN_CHANNEL_ID")?,
            show_player_list: env_or_default("SHOW_PLAYER_LIST", defaults.show_player_list),
            player_page_size: env_or_default("PLAYER_PAGE_SIZE", defaults.player_page_size)
                .max(1),
            update_interval: env_secs("UPDATE_INTERVAL_SECS", defaults.update_interval),
            refresh_cooldown: env_secs("REFRESH_COOLDOWN_SECS", defaults.refresh_cooldown),
            fetch_timeout: env_secs("FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
            port: env_or_default("PORT", defaults.port),
            database_path: env_or_default_string("DATABASE_PATH", &defaults.database_path),
            request_timeout: env_secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            rate_limit_window: env_secs("RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window),
            rate_limit_max_requests: env_or_default(
                "RATE_LIMIT_MAX_REQUESTS",
                defaults.rate_limit_max_requests,
            ),
            rate_limit_block: env_secs("RATE_LIMIT_BLOCK_SECS", defaults.rate_limit_block),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            fivem_host: "127.0.0.1".to_string(),
            fivem_port: 30120,
            channel_id: 0,
            admin_channel_id: 0,
            show_player_list: false,
            player_page_size: 30,
            update_interval: Duration::from_secs(60),
            refresh_cooldown: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(5),
            port: 3001,
            database_path: "fivewatch.db".to_string(),
            request_timeout: Duration::from_secs(30),
            rate_limit_window: Duration::from_secs(10),
            rate_limit_max_requests: 40,
            rate_limit_block: Duration::from_secs(10),
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}

/// Whole seconds from the environment, never zero
fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or_default(key, default.as_secs()).max(1))
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn channel_id(key: &'static str) -> Result<u64, ConfigError> {
    let value = required(key)?;
    match value.trim().parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(ConfigError::InvalidChannelId { key, value }),
    }
}
