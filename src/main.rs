use anyhow::{Context, Result};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, Stdout};
use std::sync::Arc;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, EnvFilter};

use funding_monitor::app::App;
use funding_monitor::clock::SystemClock;
use funding_monitor::refresh::RefreshCoordinator;
use funding_monitor::source::{DataSource, FundingSource};
use funding_monitor::FundingConfig;

/// Logs go to a file so they never draw over the terminal UI.
pub fn init_file_logging() {
    let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "funding-monitor.log");

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(false)
        .with_line_number(true)
        .with_file(true)
        .compact()
        .try_init();
}

/// Owns the terminal while the UI runs and restores it on drop.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_file_logging();

    let config = FundingConfig::from_env();
    let source = DataSource::from_config(&config, Arc::new(SystemClock))
        .context("configuring data source")?;
    info!(source = %source.describe(), refresh_secs = config.refresh_secs(), "starting funding monitor");

    let (coordinator, events) = RefreshCoordinator::new(
        Arc::new(source),
        Arc::new(SystemClock),
        config.refresh_interval,
    );
    let mut app = App::new(coordinator, events, &config.default_notional);

    let mut guard = TerminalGuard::new()?;
    let result = app.run(&mut guard.terminal).await;
    drop(guard);

    info!("funding monitor stopped");
    result
}
