use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::types::{FundingRow, FundingSnapshot, Instrument, TickerSnapshot};
use super::{build_url, get_json, FundingSource};
use crate::clock::Clock;
use crate::config::FundingConfig;
use crate::error::FundingError;
use crate::metrics;

const INSTRUMENTS_PATH: &str = "/v5/market/instruments-info";
const TICKERS_PATH: &str = "/v5/market/tickers";
const PERPETUAL_CONTRACT: &str = "LinearPerpetual";

/// Talks to the Bybit v5 public market-data API directly.
#[derive(Clone)]
pub struct BybitSource {
    client: reqwest::Client,
    api_url: String,
    category: String,
    quote_coin: String,
    page_limit: u32,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BybitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitSource")
            .field("api_url", &self.api_url)
            .field("category", &self.category)
            .field("quote_coin", &self.quote_coin)
            .field("page_limit", &self.page_limit)
            .finish_non_exhaustive()
    }
}

impl BybitSource {
    pub fn new(client: reqwest::Client, config: &FundingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            category: config.category.clone(),
            quote_coin: config.quote_coin.clone(),
            page_limit: config.page_limit,
            clock,
        }
    }

    /// Pages through instruments-info until the cursor runs out, keeping
    /// perpetuals quoted in the configured coin.
    pub async fn fetch_instruments(&self) -> Result<Vec<Instrument>, FundingError> {
        let limit = self.page_limit.to_string();
        let mut instruments = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut params = vec![
                ("category", self.category.as_str()),
                ("status", "Trading"),
                ("limit", limit.as_str()),
            ];
            if let Some(cursor) = cursor.as_deref() {
                params.push(("cursor", cursor));
            }

            let url = build_url(&self.api_url, INSTRUMENTS_PATH, &params)?;
            let page: InstrumentsResult = self.call(url, "instruments-info").await?;
            pages += 1;

            for raw in page.list {
                if raw.contract_type.as_deref() != Some(PERPETUAL_CONTRACT) {
                    continue;
                }
                if raw.quote_coin.as_deref() != Some(self.quote_coin.as_str()) {
                    continue;
                }
                let Some(symbol) = raw.symbol.filter(|s| !s.is_empty()) else {
                    continue;
                };

                instruments.push(Instrument {
                    symbol,
                    category: self.category.clone(),
                    quote_coin: self.quote_coin.clone(),
                    contract_type: PERPETUAL_CONTRACT.to_string(),
                });
            }

            cursor = page.next_page_cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        debug!(pages, count = instruments.len(), "instruments fetched");
        Ok(instruments)
    }

    /// Fetches every ticker in the category in one call, indexed by symbol.
    pub async fn fetch_tickers(&self) -> Result<HashMap<String, TickerSnapshot>, FundingError> {
        let url = build_url(&self.api_url, TICKERS_PATH, &[("category", self.category.as_str())])?;
        let result: TickersResult = self.call(url, "tickers").await?;

        let tickers = result
            .list
            .into_iter()
            .filter_map(RawTicker::into_snapshot)
            .map(|t| (t.symbol.clone(), t))
            .collect::<HashMap<_, _>>();

        debug!(count = tickers.len(), "tickers fetched");
        Ok(tickers)
    }

    async fn call<T: DeserializeOwned + Default>(
        &self,
        url: url::Url,
        endpoint: &str,
    ) -> Result<T, FundingError> {
        let envelope: ApiResponse = get_json(&self.client, url, endpoint).await?;

        if envelope.ret_code != 0 {
            warn!(
                code = envelope.ret_code,
                message = %envelope.ret_msg,
                "{} returned an application error",
                endpoint
            );
            return Err(FundingError::Api {
                endpoint: endpoint.to_string(),
                code: envelope.ret_code,
                message: envelope.ret_msg,
            });
        }

        match envelope.result {
            Some(result) if !result.is_null() => {
                serde_json::from_value(result).map_err(|e| FundingError::Decode {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                })
            }
            _ => Ok(T::default()),
        }
    }

    /// Runs a full direct-mode fetch. With `require_instruments`, an empty
    /// instrument listing is an error rather than an empty table.
    pub async fn fetch_snapshot(
        &self,
        notional: Decimal,
        require_instruments: bool,
    ) -> Result<FundingSnapshot, FundingError> {
        let started = Instant::now();

        let (instruments, tickers) =
            futures::try_join!(self.fetch_instruments(), self.fetch_tickers())?;
        if require_instruments && instruments.is_empty() {
            return Err(FundingError::NoInstruments);
        }

        let now = self.clock.now();
        let data = join_rows(&instruments, &tickers, notional, now.timestamp_millis());
        let elapsed_seconds = started.elapsed().as_secs_f64();

        info!(
            instruments = instruments.len(),
            rows = data.len(),
            elapsed_seconds,
            "direct fetch complete"
        );

        Ok(FundingSnapshot {
            notional,
            count: data.len(),
            elapsed_seconds,
            generated_at: now.to_rfc3339(),
            data,
        })
    }
}

/// Joins instruments with tickers, computes metrics and sorts by rate descending.
/// Instruments without a ticker are skipped.
pub fn join_rows(
    instruments: &[Instrument],
    tickers: &HashMap<String, TickerSnapshot>,
    notional: Decimal,
    now_ms: i64,
) -> Vec<FundingRow> {
    let mut rows = instruments
        .iter()
        .filter_map(|instrument| {
            tickers
                .get(&instrument.symbol)
                .map(|ticker| metrics::build_row(instrument, ticker, notional, now_ms))
        })
        .collect::<Vec<_>>();

    rows.sort_by(|a, b| b.funding_rate_pct.cmp(&a.funding_rate_pct));
    rows
}

#[async_trait]
impl FundingSource for BybitSource {
    async fn fetch_rows(&self, notional: Decimal) -> Result<FundingSnapshot, FundingError> {
        self.fetch_snapshot(notional, false).await
    }

    fn describe(&self) -> String {
        format!("Bybit {} ({})", self.category, self.api_url)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct InstrumentsResult {
    #[serde(default)]
    list: Vec<RawInstrument>,
    #[serde(rename = "nextPageCursor", default)]
    next_page_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInstrument {
    symbol: Option<String>,
    #[serde(rename = "contractType")]
    contract_type: Option<String>,
    #[serde(rename = "quoteCoin")]
    quote_coin: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TickersResult {
    #[serde(default)]
    list: Vec<RawTicker>,
}

#[derive(Debug, Deserialize)]
struct RawTicker {
    symbol: Option<String>,
    #[serde(rename = "lastPrice")]
    last_price: Option<String>,
    #[serde(rename = "indexPrice")]
    index_price: Option<String>,
    #[serde(rename = "markPrice")]
    mark_price: Option<String>,
    #[serde(rename = "fundingRate")]
    funding_rate: Option<String>,
    #[serde(rename = "nextFundingTime")]
    next_funding_time: Option<String>,
    #[serde(rename = "fundingIntervalHour")]
    funding_interval_hour: Option<String>,
}

impl RawTicker {
    fn into_snapshot(self) -> Option<TickerSnapshot> {
        let symbol = self.symbol.filter(|s| !s.is_empty())?;
        Some(TickerSnapshot {
            symbol,
            last_price: self.last_price.as_deref().and_then(metrics::parse_decimal),
            index_price: self.index_price.as_deref().and_then(metrics::parse_decimal),
            mark_price: self.mark_price.as_deref().and_then(metrics::parse_decimal),
            funding_rate: metrics::parse_rate(self.funding_rate.as_deref()),
            next_funding_time: metrics::parse_epoch_ms(self.next_funding_time.as_deref()),
            funding_interval_hours: metrics::parse_interval(self.funding_interval_hour.as_deref()),
        })
    }
}
