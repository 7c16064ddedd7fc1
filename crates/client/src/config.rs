//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

/// How concurrent 401 responses share the refresh call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshStrategy {
    /// The first 401 starts a refresh; every other 401 that arrives while it
    /// is outstanding awaits the same call.
    #[default]
    SingleFlight,
    /// Every 401 runs its own refresh call, unserialized.
    Independent,
}

impl RefreshStrategy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "single-flight" | "single_flight" | "singleflight" => Some(Self::SingleFlight),
            "independent" => Some(Self::Independent),
            _ => None,
        }
    }
}

/// Settings shared by the gateway, the transport and the session store.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the API. Empty means relative to the page origin.
    pub base_url: String,
    /// Path of the token refresh endpoint; 401s on this path are never refreshed.
    pub refresh_path: String,
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    pub refresh_strategy: RefreshStrategy,
    /// Prefix for persisted keys.
    pub storage_namespace: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            refresh_path: "/api/auth/token/refresh/".to_string(),
            request_timeout: Duration::from_secs(30),
            refresh_strategy: RefreshStrategy::SingleFlight,
            storage_namespace: "circle".to_string(),
        }
    }
}

impl ClientConfig {
    /// Read configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CIRCLE_API_BASE_URL`: API origin (default: relative)
    /// - `CIRCLE_REFRESH_PATH`: refresh endpoint path (default: "/api/auth/token/refresh/")
    /// - `CIRCLE_REQUEST_TIMEOUT_SECS`: per-request timeout (default: 30)
    /// - `CIRCLE_REFRESH_STRATEGY`: "single-flight" | "independent" (default: "single-flight")
    /// - `CIRCLE_STORAGE_NAMESPACE`: persisted key prefix (default: "circle")
    ///
    /// Unparseable values fall back to the default. On wasm there is no
    /// process environment and the defaults are returned.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    #[cfg(target_arch = "wasm32")]
    pub fn from_env() -> Self {
        Self::default()
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup("CIRCLE_API_BASE_URL").unwrap_or(defaults.base_url),
            refresh_path: lookup("CIRCLE_REFRESH_PATH").unwrap_or(defaults.refresh_path),
            request_timeout: lookup("CIRCLE_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            refresh_strategy: lookup("CIRCLE_REFRESH_STRATEGY")
                .and_then(|v| RefreshStrategy::parse(&v))
                .unwrap_or(defaults.refresh_strategy),
            storage_namespace: lookup("CIRCLE_STORAGE_NAMESPACE")
                .unwrap_or(defaults.storage_namespace),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_refresh_strategy(mut self, strategy: RefreshStrategy) -> Self {
        self.refresh_strategy = strategy;
        self
    }

    pub fn with_storage_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.storage_namespace = namespace.into();
        self
    }

    /// Whether `path` targets the refresh endpoint, ignoring query and trailing slash.
    pub fn is_refresh_path(&self, path: &str) -> bool {
        let path = path.split('?').next().unwrap_or(path);
        let path = match url::Url::parse(path) {
            Ok(url) => url.path().to_string(),
            Err(_) => path.to_string(),
        };
        normalize(&path) == normalize(&self.refresh_path)
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches('/').trim_end_matches('/')
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
