//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Production REST API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.wonderpush.com/v1";

/// SDK version string reported to the server with every request.
pub const SDK_VERSION: &str = concat!("Rust-", env!("CARGO_PKG_VERSION"));

/// Delay between attempts when an access token fetch fails.
pub const DEFAULT_TOKEN_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before retrying a request whose access token was rejected.
pub const DEFAULT_BAD_AUTH_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Quiet period before flushing pending installation properties.
pub const DEFAULT_PROPERTIES_MIN_DELAY: Duration = Duration::from_millis(5_000);

/// Longest a pending installation property write may wait before flushing.
pub const DEFAULT_PROPERTIES_MAX_DELAY: Duration = Duration::from_millis(20_000);

/// Settings for a [`WonderPushClient`](crate::client::WonderPushClient).
///
/// Only `client_id` is mandatory. Without a `client_secret` the client can
/// still issue unsigned GET requests but every other method will fail at
/// signing time. Without `storage_dir` credentials and pending property
/// writes live in memory only and are lost on restart.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub base_url: String,
    pub device_platform: String,
    pub device_model: String,
    pub device_id: Option<String>,
    pub storage_dir: Option<PathBuf>,
    /// Extra attempts after the first failed token fetch. `0` means a single
    /// attempt per fetch cycle.
    pub token_fetch_retries: u32,
    pub token_retry_interval: Duration,
    pub bad_auth_retry_interval: Duration,
    pub properties_min_delay: Duration,
    pub properties_max_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            device_platform: std::env::consts::OS.to_string(),
            device_model: default_device_model(),
            device_id: None,
            storage_dir: None,
            token_fetch_retries: 0,
            token_retry_interval: DEFAULT_TOKEN_RETRY_INTERVAL,
            bad_auth_retry_interval: DEFAULT_BAD_AUTH_RETRY_INTERVAL,
            properties_min_delay: DEFAULT_PROPERTIES_MIN_DELAY,
            properties_max_delay: DEFAULT_PROPERTIES_MAX_DELAY,
        }
    }
}

impl ClientConfig {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Assigns a freshly generated UUID as the device identifier.
    pub fn with_random_device_id(mut self) -> Self {
        self.device_id = Some(uuid::Uuid::new_v4().to_string());
        self
    }

    pub fn with_token_fetch_retries(mut self, retries: u32) -> Self {
        self.token_fetch_retries = retries;
        self
    }
}

fn default_device_model() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
