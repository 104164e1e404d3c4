use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

use crate::app::{App, Focus};
use crate::refresh::RefreshState;
use crate::source::types::FundingDirection;
use crate::table::{COLUMNS, DIRECTION_COLUMN};

pub fn draw(f: &mut Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Notional input + status
            Constraint::Length(4), // Info panel
            Constraint::Min(0),    // Funding table
            Constraint::Length(1), // Help
        ])
        .split(f.area());

    draw_controls(f, app, chunks[0]);
    draw_info(f, app, chunks[1]);
    draw_table(f, app, chunks[2]);

    let help = match app.focus {
        Focus::Input => "Enter: refresh  Tab/Esc: table  Ctrl+C: quit",
        Focus::Table => "←/→: column  Enter/s: sort  ↑/↓: scroll  r: refresh  e: edit notional  q: quit",
    };
    f.render_widget(
        Paragraph::new(help).style(Style::default().fg(Color::DarkGray)),
        chunks[3],
    );

    if let Some(alert) = &app.alert {
        draw_alert(f, alert);
    }
}

fn draw_controls(f: &mut Frame<'_>, app: &App, area: Rect) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(30), Constraint::Min(0)])
        .split(area);

    let input_style = if app.focus == Focus::Input {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let button = if app.coordinator.can_trigger() {
        Span::raw(" [Refresh]")
    } else {
        Span::styled(" [Refresh]", Style::default().fg(Color::DarkGray))
    };
    let input = Paragraph::new(Line::from(vec![Span::raw(app.input.as_str()), button]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(input_style)
                .title("Notional (USDT)"),
        );
    f.render_widget(input, cols[0]);

    let status_style = match app.coordinator.state() {
        RefreshState::Loading => Style::default().fg(Color::Yellow),
        RefreshState::Idle => Style::default(),
    };
    let status = Paragraph::new(app.coordinator.status())
        .style(status_style)
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status, cols[1]);
}

fn draw_info(f: &mut Frame<'_>, app: &App, area: Rect) {
    let (notional, coins, elapsed) = match &app.info {
        Some(info) => (
            format!("{:.2}", info.notional),
            info.coins.to_string(),
            format!("{:.2}s", info.elapsed_seconds),
        ),
        None => ("-".to_string(), "-".to_string(), "-".to_string()),
    };
    let last_updated = app
        .coordinator
        .last_updated()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string());

    let text = vec![
        Line::from(format!(
            "Notional: {}   Coins: {}   Elapsed: {}   Next refresh: {}",
            notional,
            coins,
            elapsed,
            app.coordinator.countdown_display()
        )),
        Line::from(format!(
            "Source: {}   Last updated: {}",
            app.coordinator.source_name(),
            last_updated
        )),
    ];
    let info = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Funding"));
    f.render_widget(info, area);
}

fn badge_style(direction: FundingDirection) -> Style {
    match direction {
        FundingDirection::LongPaysShort => Style::default().fg(Color::Green),
        FundingDirection::ShortPaysLong => Style::default().fg(Color::Red),
        FundingDirection::Neutral => Style::default().fg(Color::Gray),
    }
}

fn draw_table(f: &mut Frame<'_>, app: &App, area: Rect) {
    let header = Row::new(COLUMNS.iter().enumerate().map(|(i, column)| {
        let title = match app.table.sort_state(i) {
            Some(order) => format!("{} {}", column.title, order.indicator()),
            None => column.title.to_string(),
        };
        let mut style = Style::default().add_modifier(Modifier::BOLD);
        if app.focus == Focus::Table && i == app.selected_column {
            style = style.fg(Color::Black).bg(Color::Cyan);
        }
        Cell::from(title).style(style)
    }))
    .style(Style::default().fg(Color::Cyan));

    let rows = app.table.rows().iter().skip(app.scroll).map(|row| {
        Row::new(row.cells.iter().enumerate().map(|(i, cell)| {
            if i == DIRECTION_COLUMN {
                Cell::from(cell.as_str()).style(badge_style(row.badge))
            } else {
                Cell::from(cell.as_str())
            }
        }))
    });

    let widths = COLUMNS
        .iter()
        .map(|c| Constraint::Length(c.width))
        .collect::<Vec<_>>();

    let title = if app.table.is_empty() {
        "Rates (no data)".to_string()
    } else {
        format!("Rates ({}/{})", (app.scroll + 1).min(app.table.len()), app.table.len())
    };

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(table, area);
}

fn draw_alert(f: &mut Frame<'_>, message: &str) {
    let area = centered_rect(50, 5, f.area());
    let popup = Paragraph::new(vec![
        Line::from(message),
        Line::from(""),
        Line::from(Span::styled(
            "Press any key to continue",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .alignment(Alignment::Center)
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red))
            .title("Invalid input"),
    );
    f.render_widget(Clear, area);
    f.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
