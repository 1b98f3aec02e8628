//! Client configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::Result;
use crate::store::{StorageConfig, TokenPolicy};
use crate::types::ApiUrl;

/// Backend used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:3001";

/// Environment variable overriding the backend base URL.
pub const API_URL_ENV: &str = "LANYARD_API_URL";

/// Environment variable selecting a durable credential directory.
pub const DATA_DIR_ENV: &str = "LANYARD_DATA_DIR";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to build a [`SessionController`](crate::SessionController).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use lanyard::{ApiUrl, ClientConfig};
///
/// let config = ClientConfig::new(ApiUrl::new("https://api.example.com").unwrap())
///     .with_request_timeout(Duration::from_secs(10));
/// assert_eq!(config.api_url.as_str(), "https://api.example.com/");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: ApiUrl,
    pub request_timeout: Duration,
    /// Upper bound on the best-effort backend revoke during logout.
    pub logout_timeout: Duration,
    pub token_policy: TokenPolicy,
    pub storage: StorageConfig,
}

impl ClientConfig {
    pub fn new(api_url: ApiUrl) -> Self {
        Self {
            api_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            logout_timeout: DEFAULT_LOGOUT_TIMEOUT,
            token_policy: TokenPolicy::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Read `LANYARD_API_URL` and `LANYARD_DATA_DIR`.
    ///
    /// Unset variables fall back to the defaults; an invalid URL is an error.
    pub fn from_env() -> Result<Self> {
        let api_url = match env::var(API_URL_ENV) {
            Ok(value) if !value.trim().is_empty() => ApiUrl::new(value.trim())?,
            _ => ApiUrl::new(DEFAULT_API_URL)?,
        };

        let mut config = Self::new(api_url);
        if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|dir| !dir.is_empty()) {
            config.storage = StorageConfig::Durable {
                dir: PathBuf::from(dir),
            };
        }
        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    pub fn with_token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = policy;
        self
    }

    pub fn with_storage(mut self, storage: StorageConfig) -> Self {
        self.storage = storage;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        // DEFAULT_API_URL is a valid loopback URL.
        let api_url = DEFAULT_API_URL
            .parse()
            .unwrap_or_else(|_| unreachable!("default API URL is valid"));
        Self::new(api_url)
    }
}
