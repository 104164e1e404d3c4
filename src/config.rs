use std::env;
use std::time::Duration;

pub const BYBIT_API_URL: &str = "https://api.bybit.com";

#[derive(Debug, Clone)]
pub struct FundingConfig {
    /// Exchange REST base used in direct mode.
    pub api_url: String,
    /// When set, rows are fetched from this backend instead of the exchange.
    pub backend_url: Option<String>,
    pub category: String,
    pub quote_coin: String,
    pub page_limit: u32,
    pub refresh_interval: Duration,
    pub timeout_ms: u64,
    pub default_notional: String,
    pub server_addr: String,
}

impl Default for FundingConfig {
    fn default() -> Self {
        Self {
            api_url: BYBIT_API_URL.to_string(),
            backend_url: None,
            category: "linear".to_string(),
            quote_coin: "USDT".to_string(),
            page_limit: 1000,
            refresh_interval: Duration::from_secs(30),
            timeout_ms: 10_000,
            default_notional: "1000".to_string(),
            server_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

impl FundingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Blank or unparsable
    /// values keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let refresh_secs = get("FUNDING_REFRESH_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0);

        Self {
            api_url: get("FUNDING_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            backend_url: get("FUNDING_BACKEND_URL").map(|u| u.trim_end_matches('/').to_string()),
            refresh_interval: refresh_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.refresh_interval),
            timeout_ms: get("FUNDING_TIMEOUT_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            default_notional: get("FUNDING_NOTIONAL").unwrap_or(defaults.default_notional),
            server_addr: get("FUNDING_SERVER_ADDR").unwrap_or(defaults.server_addr),
            ..defaults
        }
    }

    pub fn refresh_secs(&self) -> u64 {
        self.refresh_interval.as_secs().max(1)
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
    }
}
