use std::cmp::Ordering;

use crate::source::types::{FundingDirection, FundingRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn indicator(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "▲",
            SortOrder::Descending => "▼",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub title: &'static str,
    pub kind: ColumnKind,
    pub width: u16,
}

pub const COLUMNS: [Column; 12] = [
    Column { title: "Symbol", kind: ColumnKind::Text, width: 16 },
    Column { title: "Category", kind: ColumnKind::Text, width: 9 },
    Column { title: "Funding %", kind: ColumnKind::Numeric, width: 11 },
    Column { title: "Direction", kind: ColumnKind::Text, width: 16 },
    Column { title: "Cost/Cycle", kind: ColumnKind::Numeric, width: 12 },
    Column { title: "Cost/Hour", kind: ColumnKind::Numeric, width: 12 },
    Column { title: "Last", kind: ColumnKind::Numeric, width: 12 },
    Column { title: "Index", kind: ColumnKind::Numeric, width: 12 },
    Column { title: "Mark", kind: ColumnKind::Numeric, width: 12 },
    Column { title: "Interval (h)", kind: ColumnKind::Numeric, width: 12 },
    Column { title: "Remaining", kind: ColumnKind::Text, width: 10 },
    Column { title: "Notional", kind: ColumnKind::Numeric, width: 12 },
];

pub const DIRECTION_COLUMN: usize = 3;

/// A row as displayed: cell text plus the direction badge.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRow {
    pub cells: Vec<String>,
    pub badge: FundingDirection,
}

impl RenderedRow {
    pub fn from_row(row: &FundingRow) -> Self {
        let price = |p: Option<rust_decimal::Decimal>| p.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());

        Self {
            cells: vec![
                row.symbol.clone(),
                row.category.clone(),
                format!("{:.6}", row.funding_rate_pct),
                row.direction.to_string(),
                format!("{:.6}", row.cost_per_cycle),
                format!("{:.6}", row.cost_per_hour),
                price(row.last_price),
                price(row.index_price),
                price(row.mark_price),
                row.funding_interval_hours.normalize().to_string(),
                row.time_remaining.clone(),
                format!("{:.2}", row.notional),
            ],
            badge: row.direction,
        }
    }
}

#[derive(Debug)]
pub struct FundingTable {
    rows: Vec<RenderedRow>,
    sort_state: [Option<SortOrder>; COLUMNS.len()],
}

impl Default for FundingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FundingTable {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            sort_state: [None; COLUMNS.len()],
        }
    }

    /// Replaces every rendered row. Header sort indicators are left as they are.
    pub fn render(&mut self, rows: &[FundingRow]) {
        self.rows.clear();
        self.rows.extend(rows.iter().map(RenderedRow::from_row));
    }

    pub fn rows(&self) -> &[RenderedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sort_state(&self, column: usize) -> Option<SortOrder> {
        self.sort_state.get(column).copied().flatten()
    }

    /// Sorts the rendered rows by `column`, toggling its direction. The first
    /// sort on a column is ascending. Other columns lose their indicator.
    pub fn sort_by(&mut self, column: usize) -> Option<SortOrder> {
        let spec = COLUMNS.get(column)?;

        let was_ascending = self.sort_state[column] == Some(SortOrder::Ascending);
        let order = if was_ascending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };

        self.sort_state = [None; COLUMNS.len()];
        self.sort_state[column] = Some(order);

        let kind = spec.kind;
        self.rows.sort_by(|a, b| {
            let ordering = compare_cells(kind, &a.cells[column], &b.cells[column]);
            match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            }
        });

        Some(order)
    }
}

fn compare_cells(kind: ColumnKind, a: &str, b: &str) -> Ordering {
    match kind {
        ColumnKind::Numeric => numeric_key(a)
            .partial_cmp(&numeric_key(b))
            .unwrap_or(Ordering::Equal),
        ColumnKind::Text => text_key(a).cmp(&text_key(b)),
    }
}

/// Unparsable cells ("-") sort as zero.
fn numeric_key(cell: &str) -> f64 {
    cell.replace('%', "")
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| !v.is_nan())
        .unwrap_or(0.0)
}

fn text_key(cell: &str) -> String {
    cell.replace('%', "").trim().to_lowercase()
}
