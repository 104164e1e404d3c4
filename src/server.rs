use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::error::{panic_message, FundingError};
use crate::metrics::parse_notional;
use crate::source::backend::FUNDING_PATH;
use crate::source::bybit::BybitSource;
use crate::source::types::FundingSnapshot;

#[derive(Clone)]
pub struct ServerState {
    source: Arc<BybitSource>,
    default_notional: String,
}

impl ServerState {
    pub fn new(source: BybitSource, default_notional: &str) -> Self {
        Self {
            source: Arc::new(source),
            default_notional: default_notional.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FundingQuery {
    #[serde(default)]
    notional: Option<String>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route(FUNDING_PATH, get(funding))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

async fn funding(
    State(state): State<ServerState>,
    Query(query): Query<FundingQuery>,
) -> Result<Json<FundingSnapshot>, FundingError> {
    let raw = query
        .notional
        .unwrap_or_else(|| state.default_notional.clone());
    let notional = parse_notional(&raw)?;

    let snapshot = state.source.fetch_snapshot(notional, true).await?;
    info!(
        %notional,
        count = snapshot.count,
        elapsed_seconds = snapshot.elapsed_seconds,
        "served /funding"
    );
    Ok(Json(snapshot))
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    FundingError::FetchPanicked(panic_message(panic.as_ref())).into_response()
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

impl IntoResponse for FundingError {
    fn into_response(self) -> Response {
        let status = match &self {
            FundingError::InvalidNotional(_) => StatusCode::BAD_REQUEST,
            FundingError::NoInstruments
            | FundingError::InvalidUrl { .. }
            | FundingError::FetchPanicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
            FundingError::Network { .. }
            | FundingError::Http { .. }
            | FundingError::Decode { .. }
            | FundingError::Api { .. } => StatusCode::BAD_GATEWAY,
        };

        if status != StatusCode::BAD_REQUEST {
            error!("/funding failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
