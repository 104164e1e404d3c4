pub mod backend;
pub mod bybit;
pub mod types;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;

use crate::clock::Clock;
use crate::config::FundingConfig;
use crate::error::FundingError;
use backend::BackendSource;
use bybit::BybitSource;
use types::FundingSnapshot;

#[async_trait]
pub trait FundingSource: Send + Sync {
    /// Fetches the full table for `notional`. Any failure discards partial results.
    async fn fetch_rows(&self, notional: Decimal) -> Result<FundingSnapshot, FundingError>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub enum DataSource {
    Direct(BybitSource),
    Backend(BackendSource),
}

impl DataSource {
    /// Picks backend mode when a backend URL is configured, direct mode otherwise.
    pub fn from_config(
        config: &FundingConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, FundingError> {
        let client = config.http_client().map_err(|source| FundingError::Network {
            endpoint: "client".to_string(),
            source,
        })?;

        Ok(match &config.backend_url {
            Some(url) => DataSource::Backend(BackendSource::new(client, url)),
            None => DataSource::Direct(BybitSource::new(client, config, clock)),
        })
    }
}

#[async_trait]
impl FundingSource for DataSource {
    async fn fetch_rows(&self, notional: Decimal) -> Result<FundingSnapshot, FundingError> {
        match self {
            DataSource::Direct(s) => s.fetch_rows(notional).await,
            DataSource::Backend(s) => s.fetch_rows(notional).await,
        }
    }

    fn describe(&self) -> String {
        match self {
            DataSource::Direct(s) => s.describe(),
            DataSource::Backend(s) => s.describe(),
        }
    }
}

pub(crate) fn build_url(base: &str, path: &str, params: &[(&str, &str)]) -> Result<Url, FundingError> {
    let raw = format!("{}{}", base.trim_end_matches('/'), path);
    Url::parse_with_params(&raw, params).map_err(|e| FundingError::InvalidUrl {
        url: raw.clone(),
        message: e.to_string(),
    })
}

/// GETs `url` and decodes the body, mapping each failure stage to its own error.
pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: Url,
    endpoint: &str,
) -> Result<T, FundingError> {
    tracing::debug!(%url, "GET {}", endpoint);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FundingError::Network {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FundingError::Http {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            detail: error_detail(&body),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|source| FundingError::Network {
            endpoint: endpoint.to_string(),
            source,
        })?;

    serde_json::from_str(&body).map_err(|e| FundingError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

const MAX_DETAIL_CHARS: usize = 200;

/// Pulls the message out of an error body: the `error` field of a JSON object
/// (as `funding-server` sends it), otherwise the trimmed text, truncated.
pub(crate) fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("error")?.as_str().map(str::to_string));
    let detail = from_json.unwrap_or_else(|| body.trim().to_string());
    detail.chars().take(MAX_DETAIL_CHARS).collect()
}
