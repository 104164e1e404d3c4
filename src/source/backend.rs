use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use super::types::FundingSnapshot;
use super::{build_url, get_json, FundingSource};
use crate::error::FundingError;

pub const FUNDING_PATH: &str = "/funding";

/// Fetches finished rows from a `funding-server` style backend.
#[derive(Debug, Clone)]
pub struct BackendSource {
    client: reqwest::Client,
    base_url: String,
}

impl BackendSource {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FundingSource for BackendSource {
    async fn fetch_rows(&self, notional: Decimal) -> Result<FundingSnapshot, FundingError> {
        let notional_param = notional.normalize().to_string();
        let url = build_url(&self.base_url, FUNDING_PATH, &[("notional", notional_param.as_str())])?;

        let snapshot: FundingSnapshot = get_json(&self.client, url, "funding").await?;

        info!(
            rows = snapshot.count,
            backend_elapsed = snapshot.elapsed_seconds,
            "backend fetch complete"
        );
        Ok(snapshot)
    }

    fn describe(&self) -> String {
        format!("backend {}", self.base_url)
    }
}
