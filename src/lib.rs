pub mod app;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod refresh;
pub mod server;
pub mod source;
pub mod table;
pub mod ui;

pub use config::FundingConfig;
pub use error::FundingError;
