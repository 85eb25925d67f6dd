use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a sheet-owning container (a workbook).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed cell value as seen at the backend boundary.
///
/// Reads of computed values never yield `Formula`; it only appears in the
/// raw contents a backend keeps for formula cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDateTime),
    Formula(String),
    Error(String),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    pub fn is_date(&self) -> bool {
        matches!(self, CellValue::Date(_))
    }

    /// Display text of the value, `None` for empty cells.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) if s.is_empty() => None,
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Number(n) => Some(format_number(*n)),
            CellValue::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            CellValue::Date(d) => Some(d.format("%Y-%m-%d %H:%M:%S").to_string()),
            CellValue::Formula(f) => Some(f.clone()),
            CellValue::Error(e) => Some(e.clone()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub type Grid = Vec<Vec<CellValue>>;

/// A rectangular block of cells, 1-based rows and columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetRegion {
    pub first_row: u32,
    pub first_col: u32,
    pub rows: u32,
    pub cols: u32,
}

impl SheetRegion {
    pub fn new(first_row: u32, first_col: u32, rows: u32, cols: u32) -> Self {
        Self {
            first_row,
            first_col,
            rows,
            cols,
        }
    }

    pub fn cell(row: u32, col: u32) -> Self {
        Self::new(row, col, 1, 1)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn last_row(&self) -> u32 {
        self.first_row + self.rows.saturating_sub(1)
    }

    pub fn last_col(&self) -> u32 {
        self.first_col + self.cols.saturating_sub(1)
    }

    pub fn contains(&self, row: u32, col: u32) -> bool {
        !self.is_empty()
            && row >= self.first_row
            && row <= self.last_row()
            && col >= self.first_col
            && col <= self.last_col()
    }

    /// A1-style rendering, e.g. `A3:AI3002`.
    pub fn a1(&self) -> String {
        let start = cell_address(self.first_col, self.first_row);
        if self.rows <= 1 && self.cols <= 1 {
            start
        } else {
            format!("{}:{}", start, cell_address(self.last_col(), self.last_row()))
        }
    }
}

impl fmt::Display for SheetRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.a1())
    }
}

pub fn column_letter(mut col: u32) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut result = 0u32;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        result = result
            .checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    Some(result)
}

pub fn cell_address(col: u32, row: u32) -> String {
    format!("{}{}", column_letter(col), row)
}

/// Parse `B12` / `$B$12` into `(col, row)`.
pub fn parse_cell_address(address: &str) -> Option<(u32, u32)> {
    let cleaned: String = address.chars().filter(|c| *c != '$').collect();
    let split = cleaned.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = cleaned.split_at(split);
    let col = column_index(letters)?;
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col, row))
}

fn serial_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("serial epoch valid")
}

/// Excel 1900-system serial to timestamp.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let millis = (serial * 86_400_000.0).round() as i64;
    serial_epoch().checked_add_signed(Duration::milliseconds(millis))
}

pub fn datetime_to_serial(value: NaiveDateTime) -> f64 {
    let delta = value - serial_epoch();
    delta.num_milliseconds() as f64 / 86_400_000.0
}
