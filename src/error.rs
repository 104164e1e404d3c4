use std::any::Any;

#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    #[error("Invalid notional: {0:?} (expected a positive number, e.g. 1000)")]
    InvalidNotional(String),

    #[error("Network error calling {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// `detail` is the `error` field of a JSON error body, or the start of the raw body.
    #[error("HTTP {status} from {endpoint}{}", with_detail(.detail))]
    Http {
        endpoint: String,
        status: u16,
        detail: String,
    },

    #[error("Failed to decode JSON from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("retCode {code} from {endpoint}: {message}")]
    Api {
        endpoint: String,
        code: i64,
        message: String,
    },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("No perpetual contracts found")]
    NoInstruments,

    #[error("Fetch aborted: {0}")]
    FetchPanicked(String),
}

impl FundingError {
    /// Validation errors block the action before any request is made.
    pub fn is_validation(&self) -> bool {
        matches!(self, FundingError::InvalidNotional(_))
    }
}

fn with_detail(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {}", detail)
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
