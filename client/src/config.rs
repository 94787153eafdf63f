//! Configuration management for the client.

use roam_engine::StoreConfig;
use std::env;
use std::time::Duration;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Roam API, without a trailing slash
    pub api_url: String,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Page size, search debounce and poll interval for the stores
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("ROAM_API_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingApiUrl)?
            .trim_end_matches('/')
            .to_string();

        let mut store = StoreConfig::default();
        if let Some(page_size) = number(&lookup, "ROAM_PAGE_SIZE")? {
            store = store.with_page_size(page_size as u32);
        }
        if let Some(ms) = number(&lookup, "ROAM_SEARCH_DEBOUNCE_MS")? {
            store = store.with_search_debounce(Duration::from_millis(ms));
        }
        if let Some(ms) = number(&lookup, "ROAM_POLL_INTERVAL_MS")? {
            store = store.with_poll_interval(Duration::from_millis(ms));
        }

        let auth_token = lookup("ROAM_AUTH_TOKEN").filter(|token| !token.is_empty());

        Ok(Self {
            api_url,
            auth_token,
            store,
        })
    }
}

fn number(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<u64>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map(|n| Some(u64::from(n)))
            .map_err(|_| ConfigError::InvalidNumber(key)),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ROAM_API_URL environment variable is required")]
    MissingApiUrl,

    #[error("Invalid {0} value")]
    InvalidNumber(&'static str),
}
