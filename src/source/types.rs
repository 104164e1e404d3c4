use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum FundingDirection {
    #[serde(rename = "Long pays Short")]
    LongPaysShort,
    #[serde(rename = "Short pays Long")]
    ShortPaysLong,
    #[serde(rename = "Neutral")]
    Neutral,
}

impl FundingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingDirection::LongPaysShort => "Long pays Short",
            FundingDirection::ShortPaysLong => "Short pays Long",
            FundingDirection::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for FundingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub symbol: String,
    pub category: String,
    pub quote_coin: String,
    pub contract_type: String,
}

/// Ticker fields after lenient parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerSnapshot {
    pub symbol: String,
    pub last_price: Option<Decimal>,
    pub index_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub funding_rate: Decimal,
    pub next_funding_time: Option<i64>,
    pub funding_interval_hours: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FundingRow {
    pub symbol: String,
    pub category: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub notional: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub funding_rate_pct: Decimal,
    pub direction: FundingDirection,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_per_cycle: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_per_hour: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub last_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub index_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub mark_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::float")]
    pub funding_interval_hours: Decimal,
    pub time_remaining: String,
}

/// One complete fetch. Also the JSON body served by the backend.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FundingSnapshot {
    #[serde(with = "rust_decimal::serde::float")]
    pub notional: Decimal,
    pub count: usize,
    pub elapsed_seconds: f64,
    pub generated_at: String,
    pub data: Vec<FundingRow>,
}
