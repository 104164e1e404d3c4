use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::FundingError;
use crate::source::types::{FundingDirection, FundingRow, Instrument, TickerSnapshot};

pub const DEFAULT_INTERVAL_HOURS: Decimal = Decimal::from_parts(8, 0, 0, false, 0);

pub fn direction(rate: Decimal) -> FundingDirection {
    if rate > Decimal::ZERO {
        FundingDirection::LongPaysShort
    } else if rate < Decimal::ZERO {
        FundingDirection::ShortPaysLong
    } else {
        FundingDirection::Neutral
    }
}

/// Values that overflow the decimal range count as 0, like any other
/// malformed upstream number.
pub fn cost_per_cycle(notional: Decimal, rate: Decimal) -> Decimal {
    notional.checked_mul(rate).unwrap_or(Decimal::ZERO)
}

pub fn cost_per_hour(per_cycle: Decimal, interval_hours: Decimal) -> Decimal {
    per_cycle.checked_div(interval_hours).unwrap_or(Decimal::ZERO)
}

pub fn rate_pct(rate: Decimal) -> Decimal {
    rate.checked_mul(Decimal::ONE_HUNDRED).unwrap_or(Decimal::ZERO)
}

/// Formats the time left until `next_ms` as `HH:MM:SS`. Hours are not capped at 24.
pub fn format_time_remaining(next_ms: Option<i64>, now_ms: i64) -> String {
    let Some(next_ms) = next_ms else {
        return "-".to_string();
    };

    let diff = next_ms.saturating_sub(now_ms) / 1000;
    if diff <= 0 {
        return "00:00:00".to_string();
    }

    let hours = diff / 3600;
    let minutes = (diff % 3600) / 60;
    let seconds = diff % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

pub fn parse_rate(raw: Option<&str>) -> Decimal {
    raw.and_then(parse_decimal).unwrap_or(Decimal::ZERO)
}

pub fn parse_interval(raw: Option<&str>) -> Decimal {
    raw.and_then(parse_decimal)
        .filter(|hours| *hours > Decimal::ZERO)
        .unwrap_or(DEFAULT_INTERVAL_HOURS)
}

pub fn parse_epoch_ms(raw: Option<&str>) -> Option<i64> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse().ok())
}

/// Parses user input into a positive notional. Accepts a decimal comma.
pub fn parse_notional(input: &str) -> Result<Decimal, FundingError> {
    let normalized = input.trim().replace(',', ".");
    match parse_decimal(&normalized) {
        Some(notional) if notional > Decimal::ZERO => Ok(notional),
        _ => Err(FundingError::InvalidNotional(input.trim().to_string())),
    }
}

pub fn build_row(
    instrument: &Instrument,
    ticker: &TickerSnapshot,
    notional: Decimal,
    now_ms: i64,
) -> FundingRow {
    let per_cycle = cost_per_cycle(notional, ticker.funding_rate);

    FundingRow {
        symbol: instrument.symbol.clone(),
        category: instrument.category.clone(),
        notional,
        funding_rate_pct: rate_pct(ticker.funding_rate),
        direction: direction(ticker.funding_rate),
        cost_per_cycle: per_cycle,
        cost_per_hour: cost_per_hour(per_cycle, ticker.funding_interval_hours),
        last_price: ticker.last_price,
        index_price: ticker.index_price,
        mark_price: ticker.mark_price,
        funding_interval_hours: ticker.funding_interval_hours,
        time_remaining: format_time_remaining(ticker.next_funding_time, now_ms),
    }
}
