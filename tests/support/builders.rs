#![allow(dead_code)]
use sheet_mirror::model::{datetime_to_serial, parse_cell_address};
use umya_spreadsheet::{NumberingFormat, Spreadsheet, Worksheet};

#[derive(Clone, Debug)]
pub enum CellVal {
    Text(String),
    Num(f64),
    Date(f64),
    Formula(String),
    Empty,
}

impl From<&str> for CellVal {
    fn from(s: &str) -> Self {
        CellVal::Text(s.to_string())
    }
}

impl From<f64> for CellVal {
    fn from(n: f64) -> Self {
        CellVal::Num(n)
    }
}

impl From<i32> for CellVal {
    fn from(n: i32) -> Self {
        CellVal::Num(n as f64)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .expect("valid date")
}

pub fn date_val(y: i32, m: u32, d: u32) -> CellVal {
    CellVal::Date(datetime_to_serial(date(y, m, d)))
}

fn set_cell(sheet: &mut Worksheet, col: u32, row: u32, val: &CellVal) {
    match val {
        CellVal::Text(s) => {
            sheet.get_cell_mut((col, row)).set_value_string(s.clone());
        }
        CellVal::Num(n) => {
            sheet.get_cell_mut((col, row)).set_value_number(*n);
        }
        CellVal::Date(serial) => {
            sheet.get_cell_mut((col, row)).set_value_number(*serial);
            sheet
                .get_style_mut((col, row))
                .get_number_format_mut()
                .set_format_code(NumberingFormat::FORMAT_DATE_YYYYMMDD2);
        }
        CellVal::Formula(f) => {
            sheet.get_cell_mut((col, row)).set_formula(f.clone());
        }
        CellVal::Empty => {}
    }
}

pub fn sheet_mut<'a>(book: &'a mut Spreadsheet, name: &str) -> &'a mut Worksheet {
    book.get_sheet_by_name_mut(name).expect("sheet exists")
}

/// Write `rows` starting at column A of `first_row`.
pub fn fill_rows(sheet: &mut Worksheet, first_row: u32, rows: &[Vec<CellVal>]) {
    for (r, row) in rows.iter().enumerate() {
        for (c, val) in row.iter().enumerate() {
            set_cell(sheet, 1 + c as u32, first_row + r as u32, val);
        }
    }
}

pub fn fill_sparse(sheet: &mut Worksheet, cells: &[(&str, CellVal)]) {
    for (cell_ref, val) in cells {
        let (col, row) = parse_cell_address(cell_ref).expect("valid cell ref");
        set_cell(sheet, col, row, val);
    }
}

/// Formula cell with a cached result, as a spreadsheet application saves it.
pub fn set_cached_formula(sheet: &mut Worksheet, cell_ref: &str, formula: &str, cached: f64) {
    let (col, row) = parse_cell_address(cell_ref).expect("valid cell ref");
    let cell = sheet.get_cell_mut((col, row));
    cell.set_formula(formula.to_string());
    cell.get_cell_value_mut()
        .set_formula_result_default(cached.to_string());
}
