use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::backend::BackendSource;
use super::bybit::BybitSource;
use super::types::FundingDirection;
use super::{error_detail, DataSource, FundingSource};
use crate::clock::FixedClock;
use crate::config::FundingConfig;
use crate::error::FundingError;
use crate::server::{router, ServerState};

const NOW_MS: i64 = 1_700_000_000_000;

#[derive(Clone)]
enum TickerReply {
    Json(StatusCode, Value),
    Raw(&'static str),
}

/// In-process stand-in for the Bybit v5 market endpoints.
#[derive(Clone)]
struct FakeExchange {
    pages: Arc<Vec<Value>>,
    tickers: TickerReply,
    instrument_calls: Arc<AtomicUsize>,
}

impl FakeExchange {
    fn new(pages: Vec<Value>, tickers: Value) -> Self {
        Self {
            pages: Arc::new(pages),
            tickers: TickerReply::Json(StatusCode::OK, tickers),
            instrument_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn calls(&self) -> usize {
        self.instrument_calls.load(Ordering::SeqCst)
    }
}

async fn instruments_handler(
    State(fake): State<FakeExchange>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    fake.instrument_calls.fetch_add(1, Ordering::SeqCst);
    assert_eq!(params.get("category").map(String::as_str), Some("linear"));
    assert_eq!(params.get("status").map(String::as_str), Some("Trading"));

    let index = params
        .get("cursor")
        .and_then(|c| c.trim_start_matches("page-").parse::<usize>().ok())
        .unwrap_or(0);
    Json(fake.pages[index].clone())
}

async fn tickers_handler(State(fake): State<FakeExchange>) -> Response {
    match fake.tickers {
        TickerReply::Json(status, body) => (status, Json(body)).into_response(),
        TickerReply::Raw(body) => (StatusCode::OK, body).into_response(),
    }
}

async fn serve(app: Router) -> Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{}", addr))
}

async fn serve_exchange(fake: FakeExchange) -> Result<String> {
    let app = Router::new()
        .route("/v5/market/instruments-info", get(instruments_handler))
        .route("/v5/market/tickers", get(tickers_handler))
        .with_state(fake);
    serve(app).await
}

fn direct_source(api_url: &str) -> BybitSource {
    let config = FundingConfig {
        api_url: api_url.to_string(),
        ..FundingConfig::default()
    };
    BybitSource::new(
        reqwest::Client::new(),
        &config,
        Arc::new(FixedClock::from_millis(NOW_MS)),
    )
}

fn ok(result: Value) -> Value {
    json!({ "retCode": 0, "retMsg": "OK", "result": result })
}

fn instrument(symbol: &str, contract_type: &str, quote: &str) -> Value {
    json!({ "symbol": symbol, "contractType": contract_type, "quoteCoin": quote, "status": "Trading" })
}

fn ticker(symbol: &str, rate: &str, interval: &str) -> Value {
    json!({
        "symbol": symbol,
        "lastPrice": "100.5",
        "indexPrice": "100.4",
        "markPrice": "100.45",
        "fundingRate": rate,
        "nextFundingTime": (NOW_MS + 3_661_000).to_string(),
        "fundingIntervalHour": interval,
    })
}

fn paged_exchange() -> FakeExchange {
    FakeExchange::new(
        vec![
            ok(json!({
                "list": [
                    instrument("BTCUSDT", "LinearPerpetual", "USDT"),
                    instrument("ETHPERP", "LinearPerpetual", "USDC"),
                    instrument("BTCUSDT-29MAR", "LinearFutures", "USDT"),
                ],
                "nextPageCursor": "page-1",
            })),
            ok(json!({ "list": [], "nextPageCursor": "page-2" })),
            ok(json!({
                "list": [
                    instrument("SOLUSDT", "LinearPerpetual", "USDT"),
                    instrument("DOGEUSDT", "LinearPerpetual", "USDT"),
                    instrument("", "LinearPerpetual", "USDT"),
                ],
                "nextPageCursor": "",
            })),
        ],
        ok(json!({
            "category": "linear",
            "list": [
                ticker("SOLUSDT", "-0.0002", "4"),
                ticker("BTCUSDT", "0.0001", "8"),
                ticker("ETHPERP", "0.0005", "8"),
            ],
        })),
    )
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn test_direct_mode_pages_joins_and_sorts() -> Result<()> {
    let fake = paged_exchange();
    let url = serve_exchange(fake.clone()).await?;

    let snapshot = direct_source(&url).fetch_rows(dec("1000")).await?;

    assert_eq!(fake.calls(), 3);
    assert_eq!(snapshot.count, 2);
    let symbols: Vec<_> = snapshot.data.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, ["BTCUSDT", "SOLUSDT"]);

    let btc = &snapshot.data[0];
    assert_eq!(btc.funding_rate_pct, dec("0.01"));
    assert_eq!(btc.cost_per_cycle, dec("0.1"));
    assert_eq!(btc.cost_per_hour, dec("0.0125"));
    assert_eq!(btc.time_remaining, "01:01:01");
    assert_eq!(btc.mark_price, Some(dec("100.45")));

    let sol = &snapshot.data[1];
    assert_eq!(sol.direction, FundingDirection::ShortPaysLong);
    assert_eq!(sol.cost_per_hour, dec("-0.05"));
    Ok(())
}

#[tokio::test]
async fn test_pagination_stops_on_missing_cursor_with_no_instruments() -> Result<()> {
    let fake = FakeExchange::new(vec![ok(json!({ "list": [] }))], ok(json!({ "list": [] })));
    let url = serve_exchange(fake.clone()).await?;

    let instruments = direct_source(&url).fetch_instruments().await?;
    assert!(instruments.is_empty());
    assert_eq!(fake.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_nonzero_ret_code_is_application_error() -> Result<()> {
    let mut fake = paged_exchange();
    fake.tickers = TickerReply::Json(
        StatusCode::OK,
        json!({ "retCode": 10001, "retMsg": "params error", "result": {} }),
    );
    let url = serve_exchange(fake).await?;

    let err = direct_source(&url).fetch_rows(dec("1000")).await.unwrap_err();
    match err {
        FundingError::Api { code, message, .. } => {
            assert_eq!(code, 10001);
            assert_eq!(message, "params error");
        }
        other => panic!("expected application error, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_http_status_and_decode_failures() -> Result<()> {
    let mut fake = paged_exchange();
    fake.tickers = TickerReply::Json(StatusCode::SERVICE_UNAVAILABLE, json!({}));
    let url = serve_exchange(fake).await?;
    let err = direct_source(&url).fetch_rows(dec("1000")).await.unwrap_err();
    assert!(matches!(err, FundingError::Http { status: 503, .. }), "{:?}", err);

    let mut fake = paged_exchange();
    fake.tickers = TickerReply::Raw("<html>not json</html>");
    let url = serve_exchange(fake).await?;
    let err = direct_source(&url).fetch_rows(dec("1000")).await.unwrap_err();
    assert!(matches!(err, FundingError::Decode { .. }), "{:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_network_failure() -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let err = direct_source(&format!("http://{}", addr))
        .fetch_rows(dec("1000"))
        .await
        .unwrap_err();
    assert!(matches!(err, FundingError::Network { .. }), "{:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_backend_mode_round_trip() -> Result<()> {
    let exchange_url = serve_exchange(paged_exchange()).await?;
    let backend_url = serve(router(ServerState::new(direct_source(&exchange_url), "1000"))).await?;

    let config = FundingConfig {
        backend_url: Some(backend_url),
        ..FundingConfig::default()
    };
    let source = DataSource::from_config(&config, Arc::new(FixedClock::from_millis(NOW_MS)))?;
    assert!(matches!(source, DataSource::Backend(_)));

    let snapshot = source.fetch_rows(dec("2000")).await?;
    assert_eq!(snapshot.notional, dec("2000"));
    assert_eq!(snapshot.count, 2);
    assert_eq!(snapshot.data[0].symbol, "BTCUSDT");
    assert_eq!(snapshot.data[0].cost_per_cycle, dec("0.2"));
    assert_eq!(snapshot.data[0].direction, FundingDirection::LongPaysShort);
    assert_eq!(snapshot.data[1].last_price, Some(dec("100.5")));
    assert_eq!(snapshot.data[1].time_remaining, "01:01:01");
    Ok(())
}

#[tokio::test]
async fn test_backend_rejects_bad_notional_and_reports_upstream() -> Result<()> {
    let exchange_url = serve_exchange(paged_exchange()).await?;
    let backend_url = serve(router(ServerState::new(direct_source(&exchange_url), "1000"))).await?;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/funding?notional=-5", backend_url))
        .send()
        .await?;
    assert_eq!(resp.status().as_u16(), 400);

    let resp = client.get(format!("{}/funding", backend_url)).send().await?;
    assert_eq!(resp.status().as_u16(), 200);
    let body: Value = resp.json().await?;
    assert_eq!(body["notional"], json!(1000.0));
    assert_eq!(body["data"][0]["direction"], json!("Long pays Short"));

    let resp = client.get(format!("{}/health", backend_url)).send().await?;
    assert_eq!(resp.status().as_u16(), 200);

    let mut failing = paged_exchange();
    failing.tickers = TickerReply::Json(
        StatusCode::BAD_GATEWAY,
        json!({ "error": "bybit maintenance" }),
    );
    let failing_url = serve_exchange(failing).await?;
    let backend_url = serve(router(ServerState::new(direct_source(&failing_url), "1000"))).await?;
    let resp = client.get(format!("{}/funding", backend_url)).send().await?;
    assert_eq!(resp.status().as_u16(), 502);

    let err = BackendSource::new(client.clone(), &backend_url)
        .fetch_rows(dec("1000"))
        .await
        .unwrap_err();
    match &err {
        FundingError::Http { status, detail, .. } => {
            assert_eq!(*status, 502);
            assert_eq!(detail, "HTTP 502 from tickers: bybit maintenance");
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "HTTP 502 from funding: HTTP 502 from tickers: bybit maintenance"
    );
    Ok(())
}

#[tokio::test]
async fn test_backend_requires_instruments() -> Result<()> {
    let empty = FakeExchange::new(vec![ok(json!({ "list": [] }))], ok(json!({ "list": [] })));
    let exchange_url = serve_exchange(empty).await?;
    let backend_url = serve(router(ServerState::new(direct_source(&exchange_url), "1000"))).await?;

    let resp = reqwest::get(format!("{}/funding?notional=1000", backend_url)).await?;
    assert_eq!(resp.status().as_u16(), 500);

    let err = BackendSource::new(reqwest::Client::new(), &backend_url)
        .fetch_rows(dec("1000"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "HTTP 500 from funding: No perpetual contracts found");
    Ok(())
}

#[test]
fn test_error_detail_prefers_json_error_field() {
    assert_eq!(error_detail(r#"{"error":"bad notional"}"#), "bad notional");
    assert_eq!(error_detail("  upstream down \n"), "upstream down");
    assert_eq!(error_detail(""), "");
    assert_eq!(error_detail(&"x".repeat(500)).len(), 200);
}

#[tokio::test]
async fn test_overflowing_rate_does_not_abort_fetch() -> Result<()> {
    let fake = FakeExchange::new(
        vec![ok(json!({ "list": [instrument("BTCUSDT", "LinearPerpetual", "USDT")] }))],
        ok(json!({ "list": [ticker("BTCUSDT", "1e27", "8")] })),
    );
    let url = serve_exchange(fake).await?;

    let snapshot = direct_source(&url).fetch_rows(dec("1000")).await?;
    assert_eq!(snapshot.count, 1);
    assert_eq!(snapshot.data[0].funding_rate_pct, Decimal::ZERO);
    assert_eq!(snapshot.data[0].cost_per_cycle, Decimal::ZERO);
    Ok(())
}
