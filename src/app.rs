use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::backend::Backend;
use ratatui::Terminal;
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use crate::refresh::{RefreshCoordinator, RefreshEvent, RefreshOutcome, RefreshTrigger};
use crate::table::{FundingTable, COLUMNS};
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Input,
    Table,
}

/// Values shown in the info panel after a successful refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct InfoPanel {
    pub notional: Decimal,
    pub coins: usize,
    pub elapsed_seconds: f64,
}

pub struct App {
    pub coordinator: RefreshCoordinator,
    events: UnboundedReceiver<RefreshEvent>,
    pub table: FundingTable,
    pub input: String,
    pub focus: Focus,
    pub selected_column: usize,
    pub scroll: usize,
    pub info: Option<InfoPanel>,
    /// Blocking prompt; any key dismisses it.
    pub alert: Option<String>,
    pub should_quit: bool,
}

impl App {
    pub fn new(
        coordinator: RefreshCoordinator,
        events: UnboundedReceiver<RefreshEvent>,
        notional: &str,
    ) -> Self {
        Self {
            coordinator,
            events,
            table: FundingTable::new(),
            input: notional.to_string(),
            focus: Focus::Input,
            selected_column: 2,
            scroll: 0,
            info: None,
            alert: None,
            should_quit: false,
        }
    }

    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        self.refresh(RefreshTrigger::Manual);

        while !self.should_quit {
            terminal.draw(|f| ui::draw(f, self))?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key);
                    }
                }
            }

            self.drain_events();
        }

        self.coordinator.stop();
        Ok(())
    }

    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    pub fn handle_event(&mut self, event: RefreshEvent) {
        match event {
            RefreshEvent::Tick => {
                // The status line carries the error; auto refreshes raise no prompt.
                if let Err(e) = self.coordinator.trigger(RefreshTrigger::Auto, &self.input) {
                    debug!("auto refresh skipped: {}", e);
                }
            }
            RefreshEvent::Completed {
                seq,
                trigger,
                result,
            } => match self.coordinator.complete(seq, trigger, result) {
                RefreshOutcome::Rendered { snapshot, .. } => {
                    self.table.render(&snapshot.data);
                    self.scroll = 0;
                    self.info = Some(InfoPanel {
                        notional: snapshot.notional,
                        coins: snapshot.count,
                        elapsed_seconds: snapshot.elapsed_seconds,
                    });
                }
                RefreshOutcome::Failed { .. } | RefreshOutcome::Stale { .. } => {}
            },
        }
    }

    pub fn refresh(&mut self, trigger: RefreshTrigger) {
        if let Err(e) = self.coordinator.trigger(trigger, &self.input) {
            self.alert = Some(e.to_string());
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        if self.alert.take().is_some() {
            return;
        }

        match self.focus {
            Focus::Input => match key.code {
                KeyCode::Enter => self.refresh(RefreshTrigger::Manual),
                KeyCode::Backspace => {
                    self.input.pop();
                }
                KeyCode::Tab | KeyCode::Esc => self.focus = Focus::Table,
                KeyCode::Char(c) => self.input.push(c),
                _ => {}
            },
            Focus::Table => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
                KeyCode::Char('r') => self.refresh(RefreshTrigger::Manual),
                KeyCode::Char('e') | KeyCode::Tab => self.focus = Focus::Input,
                KeyCode::Left => self.selected_column = self.selected_column.saturating_sub(1),
                KeyCode::Right => {
                    self.selected_column = (self.selected_column + 1).min(COLUMNS.len() - 1)
                }
                KeyCode::Enter | KeyCode::Char('s') => {
                    if let Some(order) = self.table.sort_by(self.selected_column) {
                        info!(column = COLUMNS[self.selected_column].title, ?order, "table sorted");
                    }
                }
                KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
                KeyCode::Down => {
                    self.scroll = (self.scroll + 1).min(self.table.len().saturating_sub(1))
                }
                KeyCode::PageUp => self.scroll = self.scroll.saturating_sub(20),
                KeyCode::PageDown => {
                    self.scroll = (self.scroll + 20).min(self.table.len().saturating_sub(1))
                }
                _ => {}
            },
        }
    }
}
