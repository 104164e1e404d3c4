use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{panic_message, FundingError};
use crate::metrics::parse_notional;
use crate::source::types::FundingSnapshot;
use crate::source::FundingSource;

pub const MANUAL_STATUS: &str = "Fetching funding data...";
pub const AUTO_STATUS: &str = "Refreshing automatically...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Manual,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Loading,
}

#[derive(Debug)]
pub enum RefreshEvent {
    /// The refresh timer fired.
    Tick,
    Completed {
        seq: u64,
        trigger: RefreshTrigger,
        result: Result<FundingSnapshot, FundingError>,
    },
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Rendered {
        trigger: RefreshTrigger,
        snapshot: FundingSnapshot,
    },
    Failed {
        trigger: RefreshTrigger,
        message: String,
    },
    /// An older response arrived after a newer one had already settled.
    Stale { seq: u64 },
}

/// Countdown and refresh tasks. Dropping the schedule aborts both.
///
/// Each schedule owns its countdown cell; a stopped schedule's cell is never read.
struct Schedule {
    remaining: Arc<AtomicU64>,
    countdown: JoinHandle<()>,
    refresh: JoinHandle<()>,
}

impl Schedule {
    fn spawn(period: Duration, events: UnboundedSender<RefreshEvent>) -> Self {
        let full = period.as_secs().max(1);
        let countdown = Arc::new(AtomicU64::new(full));

        let second = Duration::from_secs(1);
        let now = Instant::now();
        let mut second_ticker = interval_at(now + second, second);
        second_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut period_ticker = interval_at(now + period, period);
        period_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let remaining = countdown.clone();
        let ticking = countdown.clone();
        let countdown_task = tokio::spawn(async move {
            loop {
                second_ticker.tick().await;
                let _ = ticking.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    Some(if n <= 1 { full } else { n - 1 })
                });
            }
        });

        let refresh_task = tokio::spawn(async move {
            loop {
                period_ticker.tick().await;
                countdown.store(full, Ordering::SeqCst);
                if events.send(RefreshEvent::Tick).is_err() {
                    break;
                }
            }
        });

        Self {
            remaining,
            countdown: countdown_task,
            refresh: refresh_task,
        }
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        self.countdown.abort();
        self.refresh.abort();
    }
}

pub struct RefreshCoordinator {
    source: Arc<dyn FundingSource>,
    clock: Arc<dyn Clock>,
    period: Duration,
    events: UnboundedSender<RefreshEvent>,
    schedule: Option<Schedule>,
    next_seq: u64,
    latest_settled: u64,
    in_flight: usize,
    status: String,
    last_updated: Option<DateTime<Utc>>,
}

impl RefreshCoordinator {
    pub fn new(
        source: Arc<dyn FundingSource>,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> (Self, UnboundedReceiver<RefreshEvent>) {
        let (events, receiver) = unbounded_channel();
        let coordinator = Self {
            source,
            clock,
            period,
            events,
            schedule: None,
            next_seq: 0,
            latest_settled: 0,
            in_flight: 0,
            status: "Enter a notional and press Enter to load funding data.".to_string(),
            last_updated: None,
        };
        (coordinator, receiver)
    }

    /// Arms the countdown and refresh timers, replacing any running ones.
    pub fn start(&mut self) {
        self.stop();
        self.schedule = Some(Schedule::spawn(self.period, self.events.clone()));
        debug!(period_secs = self.period.as_secs(), "refresh schedule started");
    }

    pub fn stop(&mut self) {
        if self.schedule.take().is_some() {
            debug!("refresh schedule stopped");
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.schedule.is_some()
    }

    /// Seconds until the next auto refresh, or `None` when no schedule is armed.
    pub fn countdown_secs(&self) -> Option<u64> {
        self.schedule
            .as_ref()
            .map(|schedule| schedule.remaining.load(Ordering::SeqCst))
            .filter(|secs| *secs > 0)
    }

    pub fn countdown_display(&self) -> String {
        self.countdown_secs()
            .map(|secs| format!("{}s", secs))
            .unwrap_or_else(|| "-".to_string())
    }

    pub fn state(&self) -> RefreshState {
        if self.in_flight > 0 {
            RefreshState::Loading
        } else {
            RefreshState::Idle
        }
    }

    /// The manual trigger is disabled while any fetch is in flight.
    pub fn can_trigger(&self) -> bool {
        self.state() == RefreshState::Idle
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn source_name(&self) -> String {
        self.source.describe()
    }

    /// Validates `notional_input` and spawns a fetch. Returns the sequence number
    /// of the started fetch, or `None` when a manual trigger is ignored because
    /// the control is disabled. Invalid input starts nothing.
    pub fn trigger(
        &mut self,
        trigger: RefreshTrigger,
        notional_input: &str,
    ) -> Result<Option<u64>, FundingError> {
        let notional = match parse_notional(notional_input) {
            Ok(notional) => notional,
            Err(e) => {
                warn!(input = notional_input, ?trigger, "refresh blocked by invalid notional");
                self.status = e.to_string();
                return Err(e);
            }
        };

        if trigger == RefreshTrigger::Manual && !self.can_trigger() {
            debug!("manual refresh ignored while loading");
            return Ok(None);
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        self.in_flight += 1;
        self.status = match trigger {
            RefreshTrigger::Manual => MANUAL_STATUS.to_string(),
            RefreshTrigger::Auto => AUTO_STATUS.to_string(),
        };

        let source = self.source.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(source.fetch_rows(notional))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => Err(FundingError::FetchPanicked(panic_message(panic.as_ref()))),
            };
            let _ = events.send(RefreshEvent::Completed {
                seq,
                trigger,
                result,
            });
        });

        debug!(seq, ?trigger, %notional, "refresh started");
        Ok(Some(seq))
    }

    /// Applies a finished fetch. Manual successes (re)start the schedule; failures
    /// leave it as it was.
    pub fn complete(
        &mut self,
        seq: u64,
        trigger: RefreshTrigger,
        result: Result<FundingSnapshot, FundingError>,
    ) -> RefreshOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);

        if seq < self.latest_settled {
            info!(seq, latest = self.latest_settled, "discarding stale response");
            return RefreshOutcome::Stale { seq };
        }
        self.latest_settled = seq;

        match result {
            Ok(snapshot) => {
                self.status = format!("Updated successfully. Coins: {}", snapshot.count);
                self.last_updated = Some(self.clock.now());
                if trigger == RefreshTrigger::Manual {
                    self.start();
                }
                RefreshOutcome::Rendered { trigger, snapshot }
            }
            Err(e) => {
                error!(seq, ?trigger, "refresh failed: {}", e);
                let message = format!("Refresh failed: {}", e);
                self.status = message.clone();
                RefreshOutcome::Failed { trigger, message }
            }
        }
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}
